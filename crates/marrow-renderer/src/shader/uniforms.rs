//! Uniform block layouts.
//!
//! Grouped uniform data for buffer uploads. Field order keeps every
//! vec4/mat4 on a 16-byte boundary so the structs match their std140
//! declarations without inserted padding.

use bytemuck::{Pod, Zeroable};

use crate::matrix::{Mat4, MAT4_IDENTITY};

/// Per-frame uniform data: screen geometry and the animation clock.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FrameUniforms {
    pub logical_width: f32,
    pub logical_height: f32,
    pub pixel_width: f32,
    pub pixel_height: f32,
    /// Engine tick count driving static/pulsate animation.
    pub time: f32,
    pub _pad: [f32; 3],
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            logical_width: 640.0,
            logical_height: 480.0,
            pixel_width: 640.0,
            pixel_height: 480.0,
            time: 0.0,
            _pad: [0.0; 3],
        }
    }
}

/// Per-draw uniform data: the full contract every surface shader
/// receives. Snapshotted into the draw cache per batch.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SurfaceUniforms {
    pub modelview: Mat4,
    pub modelview_projection: Mat4,
    pub modelview_inverse: Mat4,
    pub texture_matrix: Mat4,

    pub color: [f32; 4],
    pub fog_color: [f32; 4],
    pub clip_plane0: [f32; 4],
    pub clip_plane1: [f32; 4],
    pub clip_plane5: [f32; 4],
    pub media_plane: [f32; 4],
    /// Surface tangent + handedness sign, for bump mapping.
    pub tangent: [f32; 4],

    pub flare: f32,
    pub self_luminosity: f32,
    pub wobble: f32,
    pub pulsate: f32,

    pub depth: f32,
    pub glow: f32,
    pub bloom_scale: f32,
    pub bloom_shift: f32,

    pub visibility: f32,
    pub strict_depth: f32,
    pub scale_x: f32,
    pub scale_y: f32,

    pub offset_x: f32,
    pub offset_y: f32,
    pub time: f32,
    pub use_static: f32,

    pub use_fog: f32,
    pub yaw: f32,
    pub pitch: f32,
    pub _pad: f32,
}

impl Default for SurfaceUniforms {
    fn default() -> Self {
        Self {
            modelview: MAT4_IDENTITY,
            modelview_projection: MAT4_IDENTITY,
            modelview_inverse: MAT4_IDENTITY,
            texture_matrix: MAT4_IDENTITY,
            color: [1.0, 1.0, 1.0, 1.0],
            fog_color: [0.0, 0.0, 0.0, 1.0],
            clip_plane0: [0.0; 4],
            clip_plane1: [0.0; 4],
            clip_plane5: [0.0; 4],
            media_plane: [0.0; 4],
            tangent: [0.0, 1.0, 0.0, 1.0],
            flare: 0.0,
            self_luminosity: 1.0,
            wobble: 0.0,
            pulsate: 0.0,
            depth: 0.0,
            glow: 0.0,
            bloom_scale: 0.0,
            bloom_shift: 0.0,
            visibility: 1.0,
            strict_depth: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            time: 0.0,
            use_static: 1.0,
            use_fog: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            _pad: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem;

    #[test]
    fn test_surface_uniforms_std140_size() {
        // 4 mat4 + 7 vec4 + 20 scalars, no inserted padding.
        assert_eq!(mem::size_of::<SurfaceUniforms>(), 4 * 64 + 7 * 16 + 20 * 4);
        assert_eq!(mem::size_of::<SurfaceUniforms>() % 16, 0);
    }

    #[test]
    fn test_frame_uniforms_size() {
        assert_eq!(mem::size_of::<FrameUniforms>() % 16, 0);
    }
}
