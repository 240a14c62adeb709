use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec3};

use super::config::{FIELD_OF_VIEW, NEAR_CLIP_PLANE};

/// Per-tick scene state. Owned by the caller; the renderer only reads it.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Scene {
    pub camera_location: Vec3,
    pub model_location: Vec3,
    pub model_rotation: Quat,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            camera_location: Vec3::ZERO,
            model_location: Vec3::new(0.0, 0.0, 5.0),
            model_rotation: Quat::IDENTITY,
        }
    }
}

impl Scene {
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.model_rotation, self.model_location)
    }

    /// The camera always looks down +Z with +Y up.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_lh(self.camera_location, self.camera_location + Vec3::Z, Vec3::Y)
    }

    pub fn transforms(&self, aspect_ratio: f32) -> Transforms {
        Transforms {
            model_view: self.view_matrix() * self.model_matrix(),
            projection: projection_matrix(aspect_ratio),
        }
    }
}

/// Infinite left-handed perspective with zero-to-one depth, Y flipped for
/// Vulkan's top-left framebuffer origin.
pub fn projection_matrix(aspect_ratio: f32) -> Mat4 {
    let mut projection = Mat4::perspective_infinite_lh(FIELD_OF_VIEW, aspect_ratio, NEAR_CLIP_PLANE);
    projection.y_axis.y = -projection.y_axis.y;
    projection
}

/// Vertex-stage transforms, laid out identically for push constants and the
/// per-frame uniform region.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Transforms {
    pub model_view: Mat4,
    pub projection: Mat4,
}

impl Transforms {
    pub const SIZE: u32 = std::mem::size_of::<Transforms>() as u32;
}
