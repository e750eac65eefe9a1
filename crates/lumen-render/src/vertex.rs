//! Vertex types for 3D rendering

use bytemuck::{Pod, Zeroable};

use crate::gpu::{AttributeFormat, VertexAttribute, VertexLayout};

/// Lit mesh vertex with position and normal
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl MeshVertex {
    pub fn new(position: [f32; 3], normal: [f32; 3]) -> Self {
        Self { position, normal }
    }

    /// Layout matching the `position` and `normal` inputs of the mesh shaders
    pub fn layout() -> VertexLayout {
        VertexLayout {
            stride: std::mem::size_of::<Self>() as u32,
            attributes: vec![
                VertexAttribute {
                    name: "position",
                    offset: 0,
                    format: AttributeFormat::Float3,
                },
                VertexAttribute {
                    name: "normal",
                    offset: 12,
                    format: AttributeFormat::Float3,
                },
            ],
        }
    }
}

/// Simple sky vertex with just position
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SkyVertex {
    pub position: [f32; 3],
}

impl SkyVertex {
    pub fn new(position: [f32; 3]) -> Self {
        Self { position }
    }

    pub fn layout() -> VertexLayout {
        VertexLayout {
            stride: std::mem::size_of::<Self>() as u32,
            attributes: vec![VertexAttribute {
                name: "position",
                offset: 0,
                format: AttributeFormat::Float3,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_cover_the_whole_vertex() {
        for layout in [MeshVertex::layout(), SkyVertex::layout()] {
            let end = layout
                .attributes
                .iter()
                .map(|a| a.offset + a.format.size())
                .max()
                .unwrap();
            assert_eq!(end, layout.stride);
        }
    }
}
