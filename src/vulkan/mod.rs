//! Vulkan plumbing: instance, surface, device, memory and synchronisation helpers.

pub mod allocator;
pub mod device;
pub mod instance;
pub mod surface;
pub mod sync;

pub use allocator::{Allocator, GpuBuffer, GpuImage, MemoryLocation};
pub use device::VulkanDevice;
pub use instance::VulkanInstance;
pub use surface::NativeWindow;
