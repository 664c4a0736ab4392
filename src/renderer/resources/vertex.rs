use std::mem::{offset_of, size_of};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Interleaved vertex matching the inputs of `simple_shader.vert`
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub texcoord: Vec2,
}

impl Vertex {
    pub const fn new(position: [f32; 3], color: [f32; 3], texcoord: [f32; 2]) -> Self {
        Self {
            position: Vec3::from_array(position),
            color: Vec3::from_array(color),
            texcoord: Vec2::from_array(texcoord),
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Self, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Self, texcoord) as u32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 32);
        assert_eq!(Vertex::binding_description().stride, 32);
        assert_eq!(Vertex::binding_description().input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_attribute_layout() {
        let attrs = Vertex::attribute_descriptions();
        let locations = attrs.iter().map(|a| a.location).collect::<Vec<_>>();
        let offsets = attrs.iter().map(|a| a.offset).collect::<Vec<_>>();
        assert_eq!(locations, [0, 1, 2]);
        assert_eq!(offsets, [0, 12, 24]);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
        assert!(attrs.iter().all(|a| a.binding == 0));
    }
}
