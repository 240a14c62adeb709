use std::path::PathBuf;

use ash::vk;
use thiserror::Error;

/// Every failure the renderer can surface.
///
/// Surface staleness (`SUBOPTIMAL_KHR` / `ERROR_OUT_OF_DATE_KHR`) is deliberately
/// absent: it is reported through [`crate::renderer::SurfaceStatus`] instead.
#[derive(Error, Debug)]
pub enum RenderError {
    /// A Vulkan call returned an unexpected result code.
    #[error("{context}: {result}")]
    Vulkan {
        context: &'static str,
        result: vk::Result,
    },

    /// The Vulkan loader could not be found or initialised.
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// The environment cannot host the renderer at all.
    #[error("Unsupported environment: {0}")]
    Unsupported(String),

    /// Static payloads do not fit the staging buffer.
    #[error("Static payload of {required} bytes exceeds staging capacity of {capacity} bytes")]
    StagingOverflow { required: u64, capacity: u64 },

    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Shader error: {0}")]
    Shader(String),

    #[error("Mesh error: {0}")]
    Mesh(String),
}

impl RenderError {
    /// The wrapped API result code, if this is an API failure.
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            RenderError::Vulkan { result, .. } => Some(*result),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;

/// Attaches a static description to raw `ash` results.
pub trait VkContext<T> {
    fn context(self, context: &'static str) -> Result<T>;
}

impl<T> VkContext<T> for std::result::Result<T, vk::Result> {
    fn context(self, context: &'static str) -> Result<T> {
        self.map_err(|result| RenderError::Vulkan { context, result })
    }
}

/// Treats `SUCCESS` as the degenerate no-error case and everything else as fatal.
pub fn check(result: vk::Result, context: &'static str) -> Result<()> {
    match result {
        vk::Result::SUCCESS => Ok(()),
        result => Err(RenderError::Vulkan { context, result }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_not_an_error() {
        assert!(check(vk::Result::SUCCESS, "noop").is_ok());
    }

    #[test]
    fn other_codes_keep_their_result() {
        let err = check(vk::Result::ERROR_DEVICE_LOST, "submit").unwrap_err();
        assert_eq!(err.vk_result(), Some(vk::Result::ERROR_DEVICE_LOST));
        assert!(err.to_string().starts_with("submit"));
    }

    #[test]
    fn context_maps_ash_errors() {
        let raw: std::result::Result<(), vk::Result> = Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        let err = raw.context("Failed to create fence").unwrap_err();
        assert!(matches!(
            err,
            RenderError::Vulkan {
                context: "Failed to create fence",
                result: vk::Result::ERROR_OUT_OF_HOST_MEMORY
            }
        ));
    }
}
