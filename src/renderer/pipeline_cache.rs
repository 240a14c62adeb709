use std::path::{Path, PathBuf};

use ash::{vk, Device};

use super::tracker::{ResourceKind, ResourceTracker};
use crate::{RenderError, Result, VkContext};

/// Pipeline cache seeded from, and persisted back to, a single file.
///
/// The file is only a hint: a missing, unreadable or rejected blob falls back
/// to an empty cache.
pub struct PipelineCache {
    cache: vk::PipelineCache,
    cache_file: PathBuf,
}

impl PipelineCache {
    pub fn with_persistence(device: &Device, tracker: &ResourceTracker, cache_file: PathBuf) -> Result<Self> {
        let initial_data = read_hint(&cache_file);

        let seeded = if initial_data.is_empty() {
            None
        } else {
            let create_info = vk::PipelineCacheCreateInfo::default().initial_data(&initial_data);
            match unsafe { device.create_pipeline_cache(&create_info, None) } {
                Ok(cache) => Some(cache),
                Err(e) => {
                    log::warn!("Driver rejected pipeline cache {}: {e}", cache_file.display());
                    None
                }
            }
        };

        let cache = match seeded {
            Some(cache) => cache,
            None => unsafe {
                device
                    .create_pipeline_cache(&vk::PipelineCacheCreateInfo::default(), None)
                    .context("Failed to create pipeline cache")?
            },
        };
        tracker.created(ResourceKind::PipelineCache);

        Ok(Self { cache, cache_file })
    }

    pub fn handle(&self) -> vk::PipelineCache {
        self.cache
    }

    pub fn get_data(&self, device: &Device) -> Result<Vec<u8>> {
        unsafe {
            device
                .get_pipeline_cache_data(self.cache)
                .context("Failed to read pipeline cache data")
        }
    }

    /// Writes the driver's current blob to the cache file, returning its size.
    pub fn save(&self, device: &Device) -> Result<usize> {
        let data = self.get_data(device)?;
        write_blob(&self.cache_file, &data)?;
        log::info!(
            "Saved pipeline cache ({} bytes) to: {}",
            data.len(),
            self.cache_file.display()
        );
        Ok(data.len())
    }

    /// # Safety
    /// No pipeline creation may be using the cache.
    pub unsafe fn destroy(&mut self, device: &Device, tracker: &ResourceTracker) {
        device.destroy_pipeline_cache(self.cache, None);
        self.cache = vk::PipelineCache::null();
        tracker.destroyed(ResourceKind::PipelineCache);
    }
}

/// Reads a cache blob if one exists. Never fails: problems only cost a cold start.
pub fn read_hint(path: &Path) -> Vec<u8> {
    if !path.exists() {
        log::debug!("No existing pipeline cache at: {}", path.display());
        return Vec::new();
    }

    match std::fs::read(path) {
        Ok(data) => {
            log::info!("Loaded pipeline cache ({} bytes) from: {}", data.len(), path.display());
            data
        }
        Err(e) => {
            log::warn!("Failed to load pipeline cache: {e}");
            Vec::new()
        }
    }
}

pub fn write_blob(path: &Path, data: &[u8]) -> Result<()> {
    let io_error = |source| RenderError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    std::fs::write(path, data).map_err(io_error)
}
