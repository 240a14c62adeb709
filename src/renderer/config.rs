use std::path::PathBuf;

use ash::vk;
use bitflags::bitflags;

use super::geometry::LightingBlock;

pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;
pub const DEFAULT_IMAGE_COUNT: u32 = 3;
pub const DEPTH_FORMAT: vk::Format = vk::Format::D16_UNORM;
pub const FIELD_OF_VIEW: f32 = std::f32::consts::FRAC_PI_4;
pub const NEAR_CLIP_PLANE: f32 = 0.1;
pub const PIPELINE_CACHE_FILENAME: &str = "pipelinecache.bin";
pub const SHADER_DIR: &str = "shaders";
pub const STAGING_BUFFER_SIZE: vk::DeviceSize = 1 << 20;
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

bitflags! {
    /// Opt-in diagnostics. Unknown bits are dropped, so the default is always "no diagnostics".
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RendererFlags: u32 {
        const VALIDATION = 1 << 0;
        const GPU_ASSISTED = 1 << 1;
    }
}

impl RendererFlags {
    /// GPU-assisted validation runs inside the validation layer, so it implies it.
    pub const fn wants_validation(self) -> bool {
        !self.is_empty()
    }
}

/// How per-frame transforms reach the vertex shader.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TransformDelivery {
    /// `vkCmdPushConstants` recorded into each command buffer.
    #[default]
    PushConstants,
    /// A host-visible uniform buffer with one aligned region per frame slot,
    /// bound with a dynamic offset.
    FrameUniform,
}

#[derive(Clone, Debug)]
pub struct RendererConfig {
    pub flags: RendererFlags,
    pub frames_in_flight: usize,
    pub preferred_image_count: u32,
    pub staging_capacity: vk::DeviceSize,
    pub pipeline_cache_path: PathBuf,
    pub shader_dir: PathBuf,
    pub transforms: TransformDelivery,
    pub lighting: Option<LightingBlock>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            flags: RendererFlags::empty(),
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            preferred_image_count: DEFAULT_IMAGE_COUNT,
            staging_capacity: STAGING_BUFFER_SIZE,
            pipeline_cache_path: PathBuf::from(PIPELINE_CACHE_FILENAME),
            shader_dir: PathBuf::from(SHADER_DIR),
            transforms: TransformDelivery::PushConstants,
            lighting: None,
        }
    }
}

impl RendererConfig {
    pub fn with_flags(mut self, flags: RendererFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames.max(1);
        self
    }

    pub fn with_staging_capacity(mut self, bytes: vk::DeviceSize) -> Self {
        self.staging_capacity = bytes;
        self
    }

    pub fn with_pipeline_cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.pipeline_cache_path = path.into();
        self
    }

    pub fn with_shader_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.shader_dir = dir.into();
        self
    }

    pub fn with_transforms(mut self, transforms: TransformDelivery) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn with_lighting(mut self, lighting: LightingBlock) -> Self {
        self.lighting = Some(lighting);
        self
    }

    /// Reads `VFIGHTER_*` overrides from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a configuration from `VFIGHTER_*` variables supplied by `lookup`.
    ///
    /// Boolean switches are on only when set to `1`. Unparsable numbers are
    /// ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = |name: &str| lookup(name).is_some_and(|value| value == "1");
        let number = |name: &str| -> Option<u64> {
            let value = lookup(name)?;
            match value.parse() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    log::warn!("Ignoring {name}={value}: not a number");
                    None
                }
            }
        };

        let mut flags = RendererFlags::empty();
        flags.set(RendererFlags::VALIDATION, enabled("VFIGHTER_VALIDATION"));
        flags.set(RendererFlags::GPU_ASSISTED, enabled("VFIGHTER_GPU_ASSISTED"));

        let mut config = Self::default().with_flags(flags);
        if enabled("VFIGHTER_FRAME_UNIFORM") {
            config = config.with_transforms(TransformDelivery::FrameUniform);
        }
        if let Some(frames) = number("VFIGHTER_FRAMES_IN_FLIGHT") {
            config = config.with_frames_in_flight(frames as usize);
        }
        if let Some(bytes) = number("VFIGHTER_STAGING_BYTES") {
            config = config.with_staging_capacity(bytes);
        }
        if let Some(dir) = lookup("VFIGHTER_SHADER_DIR") {
            config = config.with_shader_dir(dir);
        }
        if let Some(path) = lookup("VFIGHTER_PIPELINE_CACHE") {
            config = config.with_pipeline_cache_path(path);
        }
        config
    }

    pub(crate) fn ring_depth(&self) -> usize {
        self.frames_in_flight.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_flag_bits_are_dropped() {
        let flags = RendererFlags::from_bits_truncate(0xffff_fff0);
        assert_eq!(flags, RendererFlags::empty());
        assert!(!flags.wants_validation());
    }

    #[test]
    fn gpu_assisted_implies_validation() {
        let flags = RendererFlags::GPU_ASSISTED;
        assert!(flags.wants_validation());
        assert!(!flags.contains(RendererFlags::VALIDATION));

        let both = RendererFlags::VALIDATION | RendererFlags::GPU_ASSISTED;
        assert!(both.contains(RendererFlags::GPU_ASSISTED));
        assert_eq!((both & RendererFlags::VALIDATION).bits(), 1);
    }

    #[test]
    fn defaults_are_production_safe() {
        let config = RendererConfig::default();
        assert_eq!(config.flags, RendererFlags::empty());
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.transforms, TransformDelivery::PushConstants);
        assert_eq!(config.pipeline_cache_path, PathBuf::from("pipelinecache.bin"));
    }

    #[test]
    fn ring_depth_never_zero() {
        let mut config = RendererConfig::default();
        config.frames_in_flight = 0;
        assert_eq!(config.ring_depth(), 1);
        assert_eq!(RendererConfig::default().with_frames_in_flight(0).frames_in_flight, 1);
    }

    fn lookup_from(vars: &'static [(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        move |name| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = RendererConfig::from_lookup(lookup_from(&[]));
        assert_eq!(config.flags, RendererFlags::empty());
        assert_eq!(config.transforms, TransformDelivery::PushConstants);
        assert_eq!(config.staging_capacity, STAGING_BUFFER_SIZE);
        assert_eq!(config.shader_dir, PathBuf::from(SHADER_DIR));
    }

    #[test]
    fn environment_overrides_every_knob() {
        let config = RendererConfig::from_lookup(lookup_from(&[
            ("VFIGHTER_VALIDATION", "1"),
            ("VFIGHTER_GPU_ASSISTED", "1"),
            ("VFIGHTER_FRAME_UNIFORM", "1"),
            ("VFIGHTER_FRAMES_IN_FLIGHT", "3"),
            ("VFIGHTER_STAGING_BYTES", "4096"),
            ("VFIGHTER_SHADER_DIR", "/opt/vfighter/shaders"),
            ("VFIGHTER_PIPELINE_CACHE", "/tmp/cache.bin"),
        ]));
        assert_eq!(config.flags, RendererFlags::VALIDATION | RendererFlags::GPU_ASSISTED);
        assert_eq!(config.transforms, TransformDelivery::FrameUniform);
        assert_eq!(config.ring_depth(), 3);
        assert_eq!(config.staging_capacity, 4096);
        assert_eq!(config.shader_dir, PathBuf::from("/opt/vfighter/shaders"));
        assert_eq!(config.pipeline_cache_path, PathBuf::from("/tmp/cache.bin"));
    }

    #[test]
    fn switches_need_exactly_one() {
        let config = RendererConfig::from_lookup(lookup_from(&[
            ("VFIGHTER_VALIDATION", "yes"),
            ("VFIGHTER_FRAME_UNIFORM", "0"),
            ("VFIGHTER_STAGING_BYTES", "lots"),
        ]));
        assert!(!config.flags.wants_validation());
        assert_eq!(config.transforms, TransformDelivery::PushConstants);
        assert_eq!(config.staging_capacity, STAGING_BUFFER_SIZE);
    }

    #[test]
    fn lighting_builder_sets_block() {
        let block = LightingBlock {
            ambient: [0.2; 4],
            ..LightingBlock::default()
        };
        assert_eq!(RendererConfig::default().with_lighting(block).lighting, Some(block));
    }
}
