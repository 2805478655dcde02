//! Vertex formats.

use bytemuck::{Pod, Zeroable};

/// Interleaved surface vertex: position, texture coordinate, normal.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SurfaceVertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
    pub normal: [f32; 3],
}

impl SurfaceVertex {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn new(position: [f32; 3], tex_coord: [f32; 2], normal: [f32; 3]) -> Self {
        Self {
            position,
            tex_coord,
            normal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_is_tightly_packed() {
        assert_eq!(SurfaceVertex::SIZE, 8 * 4);
    }
}
