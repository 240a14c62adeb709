//! A small Vulkan renderer that keeps a single mesh spinning in an X11 window.
//!
//! The interesting part is the lifecycle: device bring-up, a one-shot static
//! upload gated on a fence, a fixed-depth ring of in-flight frames, and
//! swapchain recreation whenever the surface goes stale.

pub mod app;
pub mod error;
pub mod renderer;
pub mod vulkan;

pub use error::{check, RenderError, Result, VkContext};

pub mod prelude {
    pub use crate::app::{Event, FixedTimestep, Spinner};
    pub use crate::error::{RenderError, Result};
    pub use crate::renderer::{
        FrameOutcome, Renderer, RendererConfig, RendererFlags, ResourceTracker, Scene,
        StaticGeometry, TransformDelivery,
    };
    pub use crate::vulkan::NativeWindow;
}
