use std::mem::{offset_of, size_of};

use ash::vk;
use bytemuck::{Pod, Zeroable};

/// Position plus an 8-bit RGB colour. The fourth colour byte is padding and is
/// never read by the vertex fetch.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct ColorVertex {
    pub position: [f32; 3],
    pub color: [u8; 4],
}

impl ColorVertex {
    pub const fn new(position: [f32; 3], rgb: [u8; 3]) -> Self {
        Self {
            position,
            color: [rgb[0], rgb[1], rgb[2], 0],
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct NormalVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VertexLayout {
    PositionColor,
    PositionNormal,
}

impl VertexLayout {
    pub fn stride(self) -> u32 {
        match self {
            VertexLayout::PositionColor => size_of::<ColorVertex>() as u32,
            VertexLayout::PositionNormal => size_of::<NormalVertex>() as u32,
        }
    }

    pub fn binding_description(self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(self.stride())
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    pub fn attribute_descriptions(self) -> [vk::VertexInputAttributeDescription; 2] {
        let (position, second, second_format) = match self {
            VertexLayout::PositionColor => (
                offset_of!(ColorVertex, position),
                offset_of!(ColorVertex, color),
                vk::Format::R8G8B8_UNORM,
            ),
            VertexLayout::PositionNormal => (
                offset_of!(NormalVertex, position),
                offset_of!(NormalVertex, normal),
                vk::Format::R32G32B32_SFLOAT,
            ),
        };

        [
            vk::VertexInputAttributeDescription::default()
                .location(0)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(position as u32),
            vk::VertexInputAttributeDescription::default()
                .location(1)
                .binding(0)
                .format(second_format)
                .offset(second as u32),
        ]
    }

    /// Base name of the SPIR-V pair under the shader directory.
    pub fn shader_stem(self) -> &'static str {
        match self {
            VertexLayout::PositionColor => "main",
            VertexLayout::PositionNormal => "mesh",
        }
    }
}

/// Small uniform block read by the lit shaders. Every member is a `vec4` so the
/// host layout matches std140 without padding rules.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct LightingBlock {
    pub light_direction: [f32; 4],
    pub light_color: [f32; 4],
    pub ambient: [f32; 4],
}

impl Default for LightingBlock {
    fn default() -> Self {
        Self {
            light_direction: [-0.577, -0.577, 0.577, 0.0],
            light_color: [1.0, 1.0, 1.0, 1.0],
            ambient: [0.1, 0.1, 0.1, 1.0],
        }
    }
}

/// Immutable draw data uploaded once at startup.
#[derive(Clone, Debug)]
pub struct StaticGeometry {
    layout: VertexLayout,
    vertices: Vec<u8>,
    vertex_count: u32,
    indices: Option<Vec<u16>>,
}

impl StaticGeometry {
    pub fn indexed(vertices: &[ColorVertex], indices: &[u16]) -> Self {
        Self {
            layout: VertexLayout::PositionColor,
            vertices: bytemuck::cast_slice(vertices).to_vec(),
            vertex_count: vertices.len() as u32,
            indices: Some(indices.to_vec()),
        }
    }

    /// A flat, non-indexed triangle list.
    pub fn mesh(vertices: &[NormalVertex]) -> Self {
        Self {
            layout: VertexLayout::PositionNormal,
            vertices: bytemuck::cast_slice(vertices).to_vec(),
            vertex_count: vertices.len() as u32,
            indices: None,
        }
    }

    /// The coloured quad drawn when no mesh is supplied.
    pub fn demo_quad() -> Self {
        const VERTICES: [ColorVertex; 4] = [
            ColorVertex::new([-1.0, -1.0, -1.0], [0, 0, 0]),
            ColorVertex::new([1.0, -1.0, -1.0], [255, 0, 0]),
            ColorVertex::new([-1.0, 1.0, -1.0], [0, 255, 0]),
            ColorVertex::new([1.0, 1.0, -1.0], [255, 255, 0]),
        ];
        const INDICES: [u16; 6] = [0, 1, 2, 3, 2, 1];
        Self::indexed(&VERTICES, &INDICES)
    }

    pub fn layout(&self) -> VertexLayout {
        self.layout
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        &self.vertices
    }

    pub fn index_bytes(&self) -> Option<&[u8]> {
        self.indices.as_deref().map(bytemuck::cast_slice)
    }

    pub fn is_indexed(&self) -> bool {
        self.indices.is_some()
    }

    /// Element count of the single draw call: indices when indexed, vertices otherwise.
    pub fn draw_count(&self) -> u32 {
        match &self.indices {
            Some(indices) => indices.len() as u32,
            None => self.vertex_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_vertex_layout() {
        let attributes = VertexLayout::PositionColor.attribute_descriptions();
        assert_eq!(VertexLayout::PositionColor.stride(), 16);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[1].format, vk::Format::R8G8B8_UNORM);
    }

    #[test]
    fn normal_vertex_layout() {
        let attributes = VertexLayout::PositionNormal.attribute_descriptions();
        assert_eq!(VertexLayout::PositionNormal.stride(), 24);
        assert_eq!(attributes[1].offset, 12);
        assert_eq!(attributes[1].location, 1);
        assert_eq!(attributes[1].format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn demo_quad_is_two_triangles() {
        let quad = StaticGeometry::demo_quad();
        assert_eq!(quad.draw_count(), 6);
        assert_eq!(quad.index_bytes().map(<[u8]>::len), Some(12));
        assert_eq!(quad.vertex_bytes().len(), 64);
    }

    #[test]
    fn meshes_draw_every_vertex() {
        let vertices = vec![
            NormalVertex {
                position: [0.0; 3],
                normal: [0.0, 0.0, -1.0],
            };
            9
        ];
        let mesh = StaticGeometry::mesh(&vertices);
        assert!(!mesh.is_indexed());
        assert_eq!(mesh.draw_count(), 9);
        assert_eq!(mesh.layout().shader_stem(), "mesh");
    }

    #[test]
    fn lighting_block_is_std140_sized() {
        assert_eq!(size_of::<LightingBlock>(), 48);
    }
}
