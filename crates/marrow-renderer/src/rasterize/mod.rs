//! Surface rasterization.
//!
//! Consumes the visibility system's sorted node list and turns each
//! node's floors, ceilings, walls, sprites, and models into batched
//! draw calls, in two layers: the diffuse pass and (bloom enabled) the
//! glow pass that feeds the blur/bloom composite.

mod clip;
mod object;
mod surface;
mod transfer;
mod tree;
mod viewer;

pub use clip::ClipState;
pub use transfer::{calc_wobble, transfer_offset};
pub(crate) use viewer::screen_to_clip_matrix;

use std::collections::HashMap;
use std::sync::Arc;

use marrow_common::shapes::{
    BlendType, OpacityType, ShapeDescriptor, TransferMode,
};
use marrow_common::world::{
    Angle, Fixed, LongVector2d, WorldDistance, WorldPoint2d, WorldPoint3d, ANGLE_TO_DEGREES,
    ANGLE_TO_RADIANS,
};

use crate::config::RendererConfig;
use crate::framebuffer::{BloomBlur, FramebufferSwapper};
use crate::geometry::DrawCache;
use crate::gpu::DescriptorArena;
use crate::matrix::MatrixStack;
use crate::shader::{PipelineManager, ShaderRegistry};
use crate::state::RenderState;
use crate::texture::ResolvedTexture;

/// Which layer a routine is rendering into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStep {
    Diffuse,
    Glow,
}

/// Per-frame camera and player description.
#[derive(Debug, Clone, Copy)]
pub struct ViewData {
    pub origin: WorldPoint3d,
    pub yaw: Angle,
    pub pitch: Angle,
    /// Sub-unit aim carried past the binary angle resolution.
    pub yaw_fraction: f32,
    pub pitch_fraction: f32,
    pub tick_count: i32,
    pub screen_width: i32,
    pub screen_height: i32,
    pub pixel_scale: f32,
    pub maximum_depth_intensity: Fixed,
    pub natural_light_intensity: Fixed,
    pub under_media: bool,
    pub show_weapons_in_hand: bool,
    pub infravision: bool,
    pub invincibility: bool,
}

impl Default for ViewData {
    fn default() -> Self {
        Self {
            origin: WorldPoint3d::default(),
            yaw: 0,
            pitch: 0,
            yaw_fraction: 0.0,
            pitch_fraction: 0.0,
            tick_count: 0,
            screen_width: 640,
            screen_height: 480,
            pixel_scale: 1.0,
            maximum_depth_intensity: 0,
            natural_light_intensity: marrow_common::world::FIXED_ONE,
            under_media: false,
            show_weapons_in_hand: true,
            infravision: false,
            invincibility: false,
        }
    }
}

impl ViewData {
    pub fn yaw_degrees(&self) -> f32 {
        (self.yaw as f32 + self.yaw_fraction) * ANGLE_TO_DEGREES
    }

    pub fn yaw_radians(&self) -> f32 {
        (self.yaw as f32 + self.yaw_fraction) * ANGLE_TO_RADIANS
    }

    pub fn pitch_radians(&self) -> f32 {
        (self.pitch as f32 + self.pitch_fraction) * ANGLE_TO_RADIANS
    }
}

/// Fog preset for the current medium, resolved by the caller per frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FogState {
    pub present: bool,
    pub affects_landscapes: bool,
    pub color: [f32; 4],
}

// ============================================================
// Visible-node input model
// ============================================================

/// A screen-space window segment with its clip boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClippingWindow {
    pub x0: i16,
    pub x1: i16,
    pub left: LongVector2d,
    pub right: LongVector2d,
}

#[derive(Debug, Clone, Default)]
pub struct Polygon {
    /// Resolved endpoint coordinates, counterclockwise.
    pub endpoints: Vec<WorldPoint2d>,
}

/// A floor or ceiling.
#[derive(Debug, Clone, Copy)]
pub struct HorizontalSurface {
    pub height: WorldDistance,
    pub origin: WorldPoint2d,
    pub texture: ShapeDescriptor,
    pub transfer_mode: TransferMode,
    pub lightsource_index: usize,
}

/// A wall trapezoid between two posts.
#[derive(Debug, Clone, Copy)]
pub struct VerticalSurface {
    pub p0: LongVector2d,
    pub p1: LongVector2d,
    pub h0: WorldDistance,
    pub h1: WorldDistance,
    pub hmax: WorldDistance,
    pub length: WorldDistance,
    pub texture: ShapeDescriptor,
    /// Texture-space offsets from the side definition.
    pub x0: WorldDistance,
    pub y0: WorldDistance,
    pub transfer_mode: TransferMode,
    pub lightsource_index: usize,
    pub ambient_delta: Fixed,
    /// True when open void lies behind this side.
    pub void_present: bool,
}

/// Liquid boundary through a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Media {
    pub height: WorldDistance,
}

/// A sprite or model to render inside a node.
#[derive(Debug, Clone)]
pub struct RenderObject {
    pub rect: RectangleDefinition,
    pub clipping_windows: Vec<ClippingWindow>,
}

/// World placement and appearance of one object.
#[derive(Debug, Clone)]
pub struct RectangleDefinition {
    pub position: WorldPoint3d,
    pub azimuth: Angle,
    pub scale: f32,
    pub horiz_scale: f32,
    pub shape: ShapeDescriptor,
    pub transfer_mode: TransferMode,
    pub transfer_data: i32,
    pub shadeless: bool,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub ambient_shade: Fixed,
    /// World-space extent of the sprite rectangle.
    pub world_left: i32,
    pub world_right: i32,
    pub world_top: i32,
    pub world_bottom: i32,
    /// Present for skinned 3d models instead of a flat sprite.
    pub model: Option<Arc<ModelData>>,
}

impl Default for RectangleDefinition {
    fn default() -> Self {
        Self {
            position: WorldPoint3d::default(),
            azimuth: 0,
            scale: 1.0,
            horiz_scale: 1.0,
            shape: ShapeDescriptor(0),
            transfer_mode: TransferMode::Normal,
            transfer_data: 0,
            shadeless: false,
            flip_horizontal: false,
            flip_vertical: false,
            ambient_shade: marrow_common::world::FIXED_ONE,
            world_left: 0,
            world_right: 0,
            world_top: 0,
            world_bottom: 0,
            model: None,
        }
    }
}

/// A skinned model shared between objects.
#[derive(Debug, Clone, Default)]
pub struct ModelData {
    pub positions: Vec<[f32; 3]>,
    pub tex_coords: Vec<[f32; 2]>,
    pub normals: Vec<[f32; 3]>,
    pub indices: Vec<u16>,
    /// Negative renders counterclockwise-front, positive clockwise,
    /// zero double-sided.
    pub sidedness: i32,
    skins: HashMap<u16, SkinData>,
}

impl ModelData {
    pub fn with_skins(mut self, skins: impl IntoIterator<Item = (u16, SkinData)>) -> Self {
        self.skins = skins.into_iter().collect();
        self
    }

    pub fn skin(&self, clut: u16) -> Option<&SkinData> {
        self.skins.get(&clut)
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// One color-table variant of a model's texture set.
#[derive(Debug, Clone)]
pub struct SkinData {
    pub normal: ResolvedTexture,
    pub glow: Option<ResolvedTexture>,
    pub bump: Option<ResolvedTexture>,
    pub opacity: OpacityType,
    pub normal_blend: BlendType,
    pub glow_blend: BlendType,
    pub bloom_scale: f32,
    pub bloom_shift: f32,
    pub glow_bloom_scale: f32,
    pub glow_bloom_shift: f32,
    pub min_glow_intensity: f32,
}

/// The visibility system's output for one polygon, surfaces resolved.
#[derive(Debug, Clone, Default)]
pub struct SortedNode {
    pub polygon: Polygon,
    pub floor: Option<HorizontalSurface>,
    pub ceiling: Option<HorizontalSurface>,
    pub sides: Vec<VerticalSurface>,
    pub objects: Vec<RenderObject>,
    pub clipping_windows: Vec<ClippingWindow>,
    pub media: Option<Media>,
}

/// A weapon-in-hand element, already positioned in screen space.
#[derive(Debug, Clone, Copy)]
pub struct ViewerSprite {
    pub shape: ShapeDescriptor,
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
    pub clip_left: i32,
    pub clip_right: i32,
    pub clip_top: i32,
    pub clip_bottom: i32,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub transfer_mode: TransferMode,
    pub transfer_data: i32,
    pub ambient_shade: Fixed,
}

// ============================================================
// Parasite de-fighting
// ============================================================

/// Objects sharing a world Y coordinate z-fight; give each duplicate a
/// slightly deeper bias so they resolve in submission order.
#[derive(Debug, Default)]
pub(crate) struct ParasiteTracker {
    object_y: WorldDistance,
    object_count: i32,
}

impl ParasiteTracker {
    pub fn reset(&mut self) {
        self.object_y = 0;
        self.object_count = 0;
    }

    /// Depth offset for an object at this Y coordinate.
    pub fn offset_for(&mut self, y: WorldDistance) -> f32 {
        if y == self.object_y {
            self.object_count += 1;
            self.object_count as f32 * -1.0
        } else {
            self.object_count = 0;
            self.object_y = y;
            0.0
        }
    }
}

// ============================================================
// The rasterizer
// ============================================================

/// The shader rasterization backend. Owns every piece of render state
/// the draw routines touch.
pub struct ShaderRasterizer {
    pub(crate) config: RendererConfig,
    pub shaders: ShaderRegistry,
    pub pipelines: PipelineManager,
    pub matrix: MatrixStack,
    pub state: RenderState,
    pub cache: DrawCache,
    pub(crate) descriptors: DescriptorArena,
    pub(crate) clip: ClipState,
    pub(crate) bloom: Option<BloomBlur>,
    pub(crate) swapper: FramebufferSwapper,
    pub(crate) weapon_flare: f32,
    pub(crate) self_luminosity: f32,
    pub(crate) parasites: ParasiteTracker,
    pub(crate) frame: crate::shader::FrameUniforms,
}

impl ShaderRasterizer {
    /// Per-frame uniform block, refreshed by `render_tree`.
    pub fn frame_uniforms(&self) -> &crate::shader::FrameUniforms {
        &self.frame
    }

    /// Borrow everything a 2D blit needs, targeting the scene buffer.
    pub fn blit_context(&mut self) -> crate::blitter::Blit2D<'_> {
        let Self {
            state,
            matrix,
            shaders,
            pipelines,
            descriptors,
            config,
            swapper,
            ..
        } = self;
        crate::blitter::Blit2D {
            state,
            matrix,
            shaders,
            pipelines,
            descriptors,
            config,
            target: Some(swapper.draw_target()),
        }
    }

    /// Run `f` under a pushed copy of one matrix stack; the pop is
    /// unconditional, so routines cannot leave the stack unbalanced.
    pub(crate) fn scoped_matrix<R>(
        &mut self,
        mode: crate::matrix::MatrixMode,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.matrix.push(mode);
        let result = f(self);
        self.matrix.pop(mode);
        result
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::*;
    use marrow_common::shapes::ShadingMode;
    use marrow_common::world::{FIXED_ONE, WORLD_ONE};

    use crate::texture::{
        LandscapeOptions, ResolvedTexture, TextureCategory, TextureHandle, TextureSource,
    };

    /// Asset stub: every shape resolves (unless told not to) to a
    /// distinct CPU-side texture.
    #[derive(Default)]
    pub struct FakeScene {
        pub fail_resolve: bool,
        pub resolve_count: usize,
        pub glow_mapped: bool,
    }

    impl TextureSource for FakeScene {
        fn resolve(
            &mut self,
            shape: ShapeDescriptor,
            _category: TextureCategory,
            _shading: ShadingMode,
        ) -> Option<ResolvedTexture> {
            if self.fail_resolve {
                return None;
            }
            self.resolve_count += 1;
            let mut resolved = ResolvedTexture {
                handle: TextureHandle(shape.0 as u64 + 1),
                width: 128,
                height: 128,
                ..ResolvedTexture::default()
            };
            if self.glow_mapped {
                resolved.glow = Some(crate::texture::GlowMap {
                    handle: TextureHandle(shape.0 as u64 + 0x1_0000),
                    gpu: None,
                    blend: BlendType::Add,
                    bloom_scale: 1.0,
                    bloom_shift: 0.0,
                    min_intensity: 0.1,
                });
            }
            Some(resolved)
        }

        fn translate_animated(&self, shape: ShapeDescriptor) -> ShapeDescriptor {
            shape
        }

        fn light_intensity(&self, _lightsource_index: usize) -> Fixed {
            FIXED_ONE / 2
        }

        fn landscape_options(&self, _shape: ShapeDescriptor) -> LandscapeOptions {
            LandscapeOptions::default()
        }
    }

    pub fn wide_window() -> ClippingWindow {
        ClippingWindow {
            x0: 0,
            x1: 640,
            left: LongVector2d { i: 1, j: 1 },
            right: LongVector2d { i: -1, j: 1 },
        }
    }

    pub fn interior_window() -> ClippingWindow {
        ClippingWindow {
            x0: 100,
            x1: 400,
            left: LongVector2d { i: 2, j: 1 },
            right: LongVector2d { i: -2, j: 1 },
        }
    }

    fn square_polygon() -> Polygon {
        Polygon {
            endpoints: vec![
                WorldPoint2d { x: 0, y: 0 },
                WorldPoint2d { x: WORLD_ONE, y: 0 },
                WorldPoint2d {
                    x: WORLD_ONE,
                    y: WORLD_ONE,
                },
                WorldPoint2d { x: 0, y: WORLD_ONE },
            ],
        }
    }

    fn sprite_object() -> RenderObject {
        RenderObject {
            rect: RectangleDefinition {
                position: WorldPoint3d {
                    x: WORLD_ONE / 2,
                    y: WORLD_ONE / 2,
                    z: WORLD_ONE / 2,
                },
                shape: ShapeDescriptor::new(3, 0, 7),
                world_left: -128,
                world_right: 128,
                world_top: 128,
                world_bottom: -128,
                ..RectangleDefinition::default()
            },
            clipping_windows: vec![wide_window()],
        }
    }

    /// One node with a floor, ceiling, wall, and sprite.
    pub fn simple_node() -> SortedNode {
        SortedNode {
            polygon: square_polygon(),
            floor: Some(HorizontalSurface {
                height: 0,
                origin: WorldPoint2d::default(),
                texture: ShapeDescriptor::new(1, 0, 1),
                transfer_mode: TransferMode::Normal,
                lightsource_index: 0,
            }),
            ceiling: Some(HorizontalSurface {
                height: WORLD_ONE,
                origin: WorldPoint2d::default(),
                texture: ShapeDescriptor::new(1, 0, 2),
                transfer_mode: TransferMode::Normal,
                lightsource_index: 0,
            }),
            sides: vec![VerticalSurface {
                p0: LongVector2d { i: 0, j: 0 },
                p1: LongVector2d { i: WORLD_ONE, j: 0 },
                h0: 0,
                h1: WORLD_ONE,
                hmax: WORLD_ONE,
                length: WORLD_ONE,
                texture: ShapeDescriptor::new(1, 0, 3),
                x0: 0,
                y0: 0,
                transfer_mode: TransferMode::Normal,
                lightsource_index: 0,
                ambient_delta: 0,
                void_present: false,
            }],
            objects: vec![sprite_object()],
            clipping_windows: vec![wide_window()],
            media: None,
        }
    }

    /// A node whose first window is interior, so both its clip planes
    /// enable during rendering.
    pub fn two_window_node() -> SortedNode {
        let mut node = simple_node();
        node.clipping_windows = vec![interior_window(), wide_window()];
        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parasite_offsets_decrease_for_stacked_objects() {
        let mut tracker = ParasiteTracker::default();
        tracker.reset();
        assert_eq!(tracker.offset_for(100), 0.0);
        assert_eq!(tracker.offset_for(100), -1.0);
        assert_eq!(tracker.offset_for(100), -2.0);
    }

    #[test]
    fn test_parasite_counter_resets_on_new_y() {
        let mut tracker = ParasiteTracker::default();
        tracker.reset();
        assert_eq!(tracker.offset_for(100), 0.0);
        assert_eq!(tracker.offset_for(100), -1.0);
        assert_eq!(tracker.offset_for(200), 0.0);
        assert_eq!(tracker.offset_for(200), -1.0);
    }

    #[test]
    fn test_view_angle_conversions() {
        let view = ViewData {
            yaw: 128,
            ..ViewData::default()
        };
        // A quarter circle is 90 degrees.
        assert!((view.yaw_degrees() - 90.0).abs() < 1e-4);
        assert!((view.yaw_radians() - std::f32::consts::FRAC_PI_2).abs() < 1e-5);
    }

    #[test]
    fn test_model_skin_lookup() {
        let model = ModelData::default().with_skins([(
            2u16,
            SkinData {
                normal: ResolvedTexture::default(),
                glow: None,
                bump: None,
                opacity: OpacityType::Crisp,
                normal_blend: BlendType::Crossfade,
                glow_blend: BlendType::Add,
                bloom_scale: 1.0,
                bloom_shift: 0.0,
                glow_bloom_scale: 1.0,
                glow_bloom_shift: 0.0,
                min_glow_intensity: 0.0,
            },
        )]);
        assert!(model.skin(2).is_some());
        assert!(model.skin(0).is_none());
    }
}
