pub mod config;
pub mod descriptors;
pub mod frame;
pub mod geometry;
#[cfg(feature = "gltf_loading")]
pub mod mesh;
pub mod pipeline;
pub mod pipeline_cache;
#[allow(clippy::module_inception)]
pub mod renderer;
pub mod scene;
pub mod swapchain;
pub mod tracker;
pub mod upload;

pub use config::{RendererConfig, RendererFlags, TransformDelivery};
pub use frame::{AcquireOutcome, FrameDriver, FrameOutcome, FrameRing, FrameScheduler, SurfaceStatus};
pub use geometry::{ColorVertex, LightingBlock, NormalVertex, StaticGeometry, VertexLayout};
pub use renderer::Renderer;
pub use scene::{Scene, Transforms};
pub use tracker::{ResourceKind, ResourceTracker};
