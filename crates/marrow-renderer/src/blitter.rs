//! Tiled 2D blitter for UI overlay compositing.
//!
//! Splits an arbitrary-size source image into power-of-two tiles no
//! larger than the maximum texture dimension, smears each tile's edge
//! pixels outward so linear filtering never samples a seam, and draws
//! scaled/rotated/tinted sub-rectangles to the screen. GPU textures are
//! created lazily on first draw and torn down together; a process-wide
//! epoch lets a context-loss event invalidate every live blitter with
//! one call.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use image::RgbaImage;
use parking_lot::Mutex;

use marrow_common::shapes::BlendType;

use crate::config::RendererConfig;
use crate::framebuffer::RenderTarget;
use crate::gpu::{self, GpuTexture};
use crate::matrix::{MatrixMode, MatrixStack};
use crate::shader::{PipelineManager, ShaderRegistry};
use crate::state::RenderState;

/// Largest tile edge, matching the most conservative texture limit the
/// engine still supports.
pub const BLITTER_TILE_SIZE: i32 = 256;

/// Tile floor under the texture-fix compatibility flag.
const TEXTURE_FIX_MIN_TILE: i32 = 128;

/// Screen-space rectangle, fractional for scaling.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ImageRect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl ImageRect {
    pub fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }
}

/// One tile's placement within the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

/// Everything a blit needs from the renderer, borrowed for one call.
pub struct Blit2D<'a> {
    pub state: &'a mut RenderState,
    pub matrix: &'a mut MatrixStack,
    pub shaders: &'a mut ShaderRegistry,
    pub pipelines: &'a mut PipelineManager,
    pub descriptors: &'a mut crate::gpu::DescriptorArena,
    pub config: &'a RendererConfig,
    /// Overlay destination; `None` leaves the draw geometry-only.
    pub target: Option<&'a RenderTarget>,
}

pub struct Blitter {
    id: u64,
    surface: Option<RgbaImage>,
    /// Nominal source size; differs from the surface size when the
    /// caller pre-scaled the image.
    scaled_width: u32,
    scaled_height: u32,
    /// Rotation about the destination center, degrees clockwise.
    pub rotation: f32,
    pub tint: [f32; 4],
    tile_width: i32,
    tile_height: i32,
    tiles: Vec<TileRect>,
    textures: Vec<Option<GpuTexture>>,
    textures_loaded: bool,
    loaded_epoch: u64,
    load_count: usize,
    quads_submitted: usize,
}

impl Default for Blitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Blitter {
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            surface: None,
            scaled_width: 0,
            scaled_height: 0,
            rotation: 0.0,
            tint: [1.0, 1.0, 1.0, 1.0],
            tile_width: 0,
            tile_height: 0,
            tiles: Vec::new(),
            textures: Vec::new(),
            textures_loaded: false,
            loaded_epoch: 0,
            load_count: 0,
            quads_submitted: 0,
        }
    }

    /// Adopt a source image. Any existing tiles are dropped.
    pub fn load(&mut self, surface: RgbaImage) {
        self.unload_textures();
        self.scaled_width = surface.width();
        self.scaled_height = surface.height();
        self.surface = Some(surface);
    }

    /// Declare the nominal size of a pre-scaled source, so `draw` can
    /// take sub-rectangles in original coordinates.
    pub fn set_scaled_size(&mut self, width: u32, height: u32) {
        self.scaled_width = width;
        self.scaled_height = height;
    }

    pub fn loaded(&self) -> bool {
        self.surface.is_some()
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn tiles(&self) -> &[TileRect] {
        &self.tiles
    }

    pub fn tile_dimensions(&self) -> (i32, i32) {
        (self.tile_width, self.tile_height)
    }

    pub(crate) fn load_count(&self) -> usize {
        self.load_count
    }

    pub(crate) fn quads_submitted(&self) -> usize {
        self.quads_submitted
    }

    /// Cut the source into tiles and upload them. Runs once per load
    /// and again after an invalidation; a missing surface is a no-op.
    fn load_textures(&mut self, texture_fix: bool) {
        if self.textures_loaded {
            return;
        }
        let surface = match &self.surface {
            Some(s) => s,
            None => return,
        };
        let (src_w, src_h) = (surface.width() as i32, surface.height() as i32);

        let (tile_w, tile_h) = tile_dimensions(src_w, src_h, texture_fix);
        self.tile_width = tile_w;
        self.tile_height = tile_h;
        self.tiles = compute_tiles(src_w, src_h, tile_w, tile_h);

        self.textures.clear();
        for tile in &self.tiles {
            let mut pixels = RgbaImage::new(tile_w as u32, tile_h as u32);
            copy_tile(surface, &mut pixels, tile);
            smear_tile_edges(&mut pixels, tile.w as u32, tile.h as u32);
            self.textures
                .push(gpu::create_texture_rgba(tile_w as u32, tile_h as u32, &pixels));
        }

        register(self.id);
        self.textures_loaded = true;
        self.loaded_epoch = invalidation_epoch();
        self.load_count += 1;
    }

    fn unload_textures(&mut self) {
        if !self.textures_loaded {
            return;
        }
        deregister(self.id);
        for texture in self.textures.drain(..).flatten() {
            texture.release();
        }
        self.tiles.clear();
        self.textures_loaded = false;
    }

    /// Drop the source image and the GPU tiles.
    pub fn unload(&mut self) {
        self.unload_textures();
        self.surface = None;
    }

    /// Blit `src` (in nominal source coordinates) to `dst` in screen
    /// space, scaled, rotated about the destination center, and tinted.
    /// Render state touched here is restored on every exit path.
    pub fn draw(&mut self, ctx: &mut Blit2D<'_>, dst: ImageRect, src: ImageRect) {
        if !self.loaded() {
            return;
        }
        if self.textures_loaded && self.loaded_epoch != invalidation_epoch() {
            // A context loss hit since the last draw; rebuild.
            self.unload_textures();
        }
        self.load_textures(ctx.config.texture_fix);
        if !self.textures_loaded {
            return;
        }

        // Snapshot around the tiled draw; every exit path below lands
        // back here with the entry state.
        let saved_state = *ctx.state;
        ctx.matrix.push(MatrixMode::ModelView);
        self.draw_tiles(ctx, dst, src);
        ctx.matrix.pop(MatrixMode::ModelView);
        *ctx.state = saved_state;
    }

    fn draw_tiles(&mut self, ctx: &mut Blit2D<'_>, dst: ImageRect, src: ImageRect) {
        let surface_w = self.surface.as_ref().map(|s| s.width()).unwrap_or(0) as f32;
        let surface_h = self.surface.as_ref().map(|s| s.height()).unwrap_or(0) as f32;

        // Disable everything but alpha blending and clipping.
        ctx.state.depth_test = false;
        ctx.state.blend = Some(BlendType::Crossfade);
        ctx.state.fog = false;
        ctx.state.texture_2d = true;

        // Map nominal coordinates onto the (possibly pre-scaled) surface.
        let mut src = src;
        if self.scaled_width != 0 && surface_w != self.scaled_width as f32 {
            src.x = src.x * surface_w / self.scaled_width as f32;
            src.w = src.w * surface_w / self.scaled_width as f32;
        }
        if self.scaled_height != 0 && surface_h != self.scaled_height as f32 {
            src.y = src.y * surface_h / self.scaled_height as f32;
            src.h = src.h * surface_h / self.scaled_height as f32;
        }
        if src.w <= 0.0 || src.h <= 0.0 {
            return;
        }

        let x_scale = dst.w / src.w;
        let y_scale = dst.h / src.h;

        if self.rotation.abs() > 0.1 {
            let cx = dst.x + dst.w / 2.0;
            let cy = dst.y + dst.h / 2.0;
            ctx.matrix.translatef(cx, cy, 0.0);
            ctx.matrix.rotatef_z(self.rotation);
            ctx.matrix.translatef(-cx, -cy, 0.0);
        }
        ctx.matrix
            .color4f(self.tint[0], self.tint[1], self.tint[2], self.tint[3]);

        for i in 0..self.tiles.len() {
            let tile = self.tiles[i];
            // Skip tiles outside the requested sub-rectangle.
            if src.x > (tile.x + tile.w) as f32
                || src.x + src.w < tile.x as f32
                || src.y > (tile.y + tile.h) as f32
                || src.y + src.h < tile.y as f32
            {
                continue;
            }

            let tx = (src.x - tile.x as f32).max(0.0);
            let ty = (src.y - tile.y as f32).max(0.0);
            let tw = (tile.w as f32).min(src.x + src.w - tile.x as f32) - tx;
            let th = (tile.h as f32).min(src.y + src.h - tile.y as f32) - ty;

            let u_min = tx / self.tile_width as f32;
            let u_max = (tx + tw) / self.tile_width as f32;
            let v_min = ty / self.tile_height as f32;
            let v_max = (ty + th) / self.tile_height as f32;

            let left = ((tile.x as f32 + tx) * x_scale) + (dst.x - src.x * x_scale);
            let right = left + tw * x_scale;
            let top = ((tile.y as f32 + ty) * y_scale) + (dst.y - src.y * y_scale);
            let bottom = top + th * y_scale;

            self.quads_submitted += 1;
            draw_textured_rect(
                ctx,
                self.textures.get(i).copied().flatten(),
                ImageRect::new(left, top, right - left, bottom - top),
                [u_min, v_min, u_max, v_max],
            );
        }
    }
}

impl Drop for Blitter {
    fn drop(&mut self) {
        self.unload();
    }
}

/// Submit one textured screen-space quad through the rect shader.
fn draw_textured_rect(
    ctx: &mut Blit2D<'_>,
    texture: Option<GpuTexture>,
    rect: ImageRect,
    uv: [f32; 4],
) {
    use crate::geometry::SurfaceVertex;
    use crate::matrix::mat4_multiply;
    use crate::shader::{PipelineVariant, ShaderKind, SurfaceUniforms};
    use ash::vk;

    ctx.shaders.enable(ShaderKind::Rect);
    let result = (|| {
        let target = ctx.target?;
        let texture = texture?;
        let pipeline = ctx
            .pipelines
            .get_or_create(ShaderKind::Rect, PipelineVariant::Ui)?;
        let (pipeline, layout) = (pipeline.pipeline, pipeline.layout);

        let screen_to_clip =
            crate::rasterize::screen_to_clip_matrix(target.width() as i32, target.height() as i32);
        let uniforms = SurfaceUniforms {
            modelview: ctx.matrix.modelview(),
            modelview_projection: mat4_multiply(&screen_to_clip, &ctx.matrix.modelview()),
            color: ctx.matrix.color(),
            ..SurfaceUniforms::default()
        };

        let [u0, v0, u1, v1] = uv;
        let (x0, y0) = (rect.x, rect.y);
        let (x1, y1) = (rect.x + rect.w, rect.y + rect.h);
        let n = [0.0, 0.0, 1.0];
        let corners = [
            SurfaceVertex::new([x0, y0, 0.0], [u0, v0], n),
            SurfaceVertex::new([x1, y0, 0.0], [u1, v0], n),
            SurfaceVertex::new([x1, y1, 0.0], [u1, v1], n),
            SurfaceVertex::new([x0, y1, 0.0], [u0, v1], n),
        ];
        let vertices = [
            corners[0], corners[1], corners[2], corners[0], corners[2], corners[3],
        ];

        let set_layout = ctx.pipelines.descriptor_set_layout()?;
        let uniform_buffer = gpu::upload_transient_uniforms(bytemuck::bytes_of(&uniforms))?;
        let set = ctx.descriptors.bind_draw(
            set_layout,
            uniform_buffer,
            std::mem::size_of::<SurfaceUniforms>() as u64,
            Some((texture.view, texture.sampler)),
        )?;
        let dst_view = target.color_view()?;

        gpu::with_device(|gpu_ctx| {
            // SAFETY: main thread; all handles came from this device.
            unsafe {
                let bytes: &[u8] = bytemuck::cast_slice(&vertices);
                let (vertex_buffer, memory) = match gpu::create_host_buffer(
                    gpu_ctx,
                    bytes,
                    vk::BufferUsageFlags::VERTEX_BUFFER,
                ) {
                    Some(pair) => pair,
                    None => return,
                };
                gpu::defer_release(gpu::Release::Buffer(vertex_buffer));
                gpu::defer_release(gpu::Release::Memory(memory));

                let cmd = match gpu_ctx.begin_single_time() {
                    Some(c) => c,
                    None => return,
                };
                if let Some(image) = target.color_image() {
                    gpu::transition_image(
                        gpu_ctx,
                        cmd,
                        image,
                        vk::ImageLayout::UNDEFINED,
                        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    );
                }
                let color_attachment = vk::RenderingAttachmentInfo::default()
                    .image_view(dst_view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::LOAD)
                    .store_op(vk::AttachmentStoreOp::STORE);
                let color_attachments = [color_attachment];
                let rendering_info = vk::RenderingInfo::default()
                    .render_area(vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent: vk::Extent2D {
                            width: target.width(),
                            height: target.height(),
                        },
                    })
                    .layer_count(1)
                    .color_attachments(&color_attachments);
                gpu_ctx.device.cmd_begin_rendering(cmd, &rendering_info);

                gpu_ctx
                    .device
                    .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
                let viewport = vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: target.width() as f32,
                    height: target.height() as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                };
                gpu_ctx.device.cmd_set_viewport(cmd, 0, &[viewport]);
                let scissor = vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: vk::Extent2D {
                        width: target.width(),
                        height: target.height(),
                    },
                };
                gpu_ctx.device.cmd_set_scissor(cmd, 0, &[scissor]);
                gpu_ctx
                    .device
                    .cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer], &[0]);
                gpu_ctx.device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    layout,
                    0,
                    &[set],
                    &[],
                );
                gpu_ctx.device.cmd_draw(cmd, vertices.len() as u32, 1, 0, 0);

                gpu_ctx.device.cmd_end_rendering(cmd);
                gpu_ctx.end_single_time(cmd);
            }
        });
        Some(())
    })();
    let _ = result;
    ctx.shaders.disable();
}

// ============================================================
// Tiling math
// ============================================================

fn next_power_of_two(n: i32) -> i32 {
    (n.max(1) as u32).next_power_of_two() as i32
}

/// Tile edge lengths for a source: next power of two, capped at the
/// maximum texture size, floored under the texture-fix flag.
pub fn tile_dimensions(src_w: i32, src_h: i32, texture_fix: bool) -> (i32, i32) {
    let mut tile_w = next_power_of_two(src_w).min(BLITTER_TILE_SIZE);
    let mut tile_h = next_power_of_two(src_h).min(BLITTER_TILE_SIZE);
    if texture_fix {
        tile_w = tile_w.max(TEXTURE_FIX_MIN_TILE);
        tile_h = tile_h.max(TEXTURE_FIX_MIN_TILE);
    }
    (tile_w, tile_h)
}

/// Grid of tile rectangles covering a `src_w` x `src_h` image.
pub fn compute_tiles(src_w: i32, src_h: i32, tile_w: i32, tile_h: i32) -> Vec<TileRect> {
    let h_tiles = (src_w + tile_w - 1) / tile_w;
    let v_tiles = (src_h + tile_h - 1) / tile_h;
    let mut tiles = Vec::with_capacity((h_tiles * v_tiles) as usize);
    for y in 0..v_tiles {
        for x in 0..h_tiles {
            tiles.push(TileRect {
                x: x * tile_w,
                y: y * tile_h,
                w: tile_w.min(src_w - x * tile_w),
                h: tile_h.min(src_h - y * tile_h),
            });
        }
    }
    tiles
}

/// Copy one tile's pixels out of the source image.
fn copy_tile(src: &RgbaImage, dst: &mut RgbaImage, tile: &TileRect) {
    for row in 0..tile.h as u32 {
        for col in 0..tile.w as u32 {
            let pixel = *src.get_pixel(tile.x as u32 + col, tile.y as u32 + row);
            dst.put_pixel(col, row, pixel);
        }
    }
}

/// Smear a tile's rightmost valid column and bottom valid row out to
/// the padded boundary, with alpha forced to zero, so edge filtering
/// pulls in matching colors instead of garbage.
pub fn smear_tile_edges(tile: &mut RgbaImage, valid_w: u32, valid_h: u32) {
    let (full_w, full_h) = (tile.width(), tile.height());
    if valid_w == 0 || valid_h == 0 {
        return;
    }

    for row in 0..valid_h.min(full_h) {
        let edge = *tile.get_pixel(valid_w - 1, row);
        for col in valid_w..full_w {
            tile.put_pixel(col, row, image::Rgba([edge[0], edge[1], edge[2], 0]));
        }
    }

    for row in valid_h..full_h {
        for col in 0..full_w {
            let edge = *tile.get_pixel(col, valid_h - 1);
            tile.put_pixel(col, row, image::Rgba([edge[0], edge[1], edge[2], 0]));
        }
    }
}

// ============================================================
// Context-loss registry
// ============================================================

fn registry() -> &'static Mutex<HashSet<u64>> {
    static REGISTRY: OnceLock<Mutex<HashSet<u64>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashSet::new()))
}

static INVALIDATION_EPOCH: AtomicU64 = AtomicU64::new(0);

fn invalidation_epoch() -> u64 {
    INVALIDATION_EPOCH.load(Ordering::Acquire)
}

fn register(id: u64) {
    registry().lock().insert(id);
}

fn deregister(id: u64) {
    registry().lock().remove(&id);
}

/// Blitters with live GPU tiles.
pub fn live_blitter_count() -> usize {
    registry().lock().len()
}

/// Invalidate every live blitter's GPU textures (context loss or
/// resize). Each blitter releases its stale tiles and recreates them
/// on its next draw.
pub fn stop_textures() {
    INVALIDATION_EPOCH.fetch_add(1, Ordering::AcqRel);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker_image(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgba([200, 40, 40, 255])
            } else {
                image::Rgba([40, 40, 200, 255])
            }
        })
    }

    fn blit_harness() -> (
        RenderState,
        MatrixStack,
        ShaderRegistry,
        PipelineManager,
        crate::gpu::DescriptorArena,
        RendererConfig,
    ) {
        (
            RenderState::default(),
            MatrixStack::new(),
            ShaderRegistry::new().unwrap(),
            PipelineManager::new(),
            crate::gpu::DescriptorArena::new(),
            RendererConfig::default(),
        )
    }

    #[test]
    fn test_tile_dimensions_power_of_two_capped() {
        assert_eq!(tile_dimensions(100, 40, false), (128, 64));
        assert_eq!(tile_dimensions(640, 480, false), (256, 256));
        assert_eq!(tile_dimensions(256, 256, false), (256, 256));
        assert_eq!(tile_dimensions(1, 1, false), (1, 1));
    }

    #[test]
    fn test_tile_dimensions_texture_fix_floor() {
        assert_eq!(tile_dimensions(40, 20, true), (128, 128));
        assert_eq!(tile_dimensions(640, 480, true), (256, 256));
    }

    #[test]
    fn test_tile_count_matches_ceil_division() {
        for (w, h, tw, th) in [(640, 480, 256, 256), (256, 256, 256, 256), (257, 1, 256, 1)] {
            let tiles = compute_tiles(w, h, tw, th);
            let expected = (w + tw - 1) / tw * ((h + th - 1) / th);
            assert_eq!(tiles.len() as i32, expected);
        }
    }

    #[test]
    fn test_tiles_lie_within_source() {
        let (w, h) = (600, 300);
        for tile in compute_tiles(w, h, 256, 256) {
            assert!(tile.x >= 0 && tile.x < w);
            assert!(tile.y >= 0 && tile.y < h);
            assert!(tile.w > 0 && tile.x + tile.w <= w);
            assert!(tile.h > 0 && tile.y + tile.h <= h);
        }
    }

    #[test]
    fn test_smear_copies_rgb_zeroes_alpha() {
        let mut tile = RgbaImage::new(8, 8);
        for y in 0..5 {
            for x in 0..6 {
                tile.put_pixel(x, y, image::Rgba([x as u8 * 10, y as u8 * 10, 77, 255]));
            }
        }
        smear_tile_edges(&mut tile, 6, 5);

        // Columns beyond the valid width carry the last valid column's
        // color, alpha zero.
        for y in 0..5 {
            let edge = *tile.get_pixel(5, y);
            for x in 6..8 {
                let p = *tile.get_pixel(x, y);
                assert_eq!(&p.0[..3], &edge.0[..3]);
                assert_eq!(p[3], 0);
            }
        }
        // Rows below the valid height mirror the last valid row.
        for y in 5..8 {
            for x in 0..8 {
                let above = *tile.get_pixel(x, 4);
                let p = *tile.get_pixel(x, y);
                assert_eq!(&p.0[..3], &above.0[..3]);
                assert_eq!(p[3], 0);
            }
        }
    }

    #[test]
    fn test_lazy_tiling_on_first_draw() {
        let (mut state, mut matrix, mut shaders, mut pipelines, mut descriptors, config) = blit_harness();
        let mut blitter = Blitter::new();
        blitter.load(checker_image(600, 300));
        assert_eq!(blitter.tile_count(), 0);

        let mut ctx = Blit2D {
            state: &mut state,
            matrix: &mut matrix,
            shaders: &mut shaders,
            pipelines: &mut pipelines,
            descriptors: &mut descriptors,
            config: &config,
            target: None,
        };
        blitter.draw(
            &mut ctx,
            ImageRect::new(0.0, 0.0, 600.0, 300.0),
            ImageRect::new(0.0, 0.0, 600.0, 300.0),
        );
        // 600x300 with 256-px tiles: 3 x 2.
        assert_eq!(blitter.tile_count(), 6);
        assert_eq!(blitter.load_count(), 1);
        assert_eq!(blitter.quads_submitted(), 6);
    }

    #[test]
    fn test_draw_culls_tiles_outside_sub_rect() {
        let (mut state, mut matrix, mut shaders, mut pipelines, mut descriptors, config) = blit_harness();
        let mut blitter = Blitter::new();
        blitter.load(checker_image(600, 300));
        let mut ctx = Blit2D {
            state: &mut state,
            matrix: &mut matrix,
            shaders: &mut shaders,
            pipelines: &mut pipelines,
            descriptors: &mut descriptors,
            config: &config,
            target: None,
        };
        // A sub-rectangle inside the first tile only.
        blitter.draw(
            &mut ctx,
            ImageRect::new(0.0, 0.0, 64.0, 64.0),
            ImageRect::new(10.0, 10.0, 64.0, 64.0),
        );
        assert_eq!(blitter.quads_submitted(), 1);
    }

    #[test]
    fn test_draw_restores_state_on_all_paths() {
        let (mut state, mut matrix, mut shaders, mut pipelines, mut descriptors, config) = blit_harness();
        let original = state;
        let before_mv = matrix.modelview();

        let mut blitter = Blitter::new();
        blitter.load(checker_image(64, 64));
        blitter.rotation = 45.0;
        {
            let mut ctx = Blit2D {
                state: &mut state,
                matrix: &mut matrix,
                shaders: &mut shaders,
                pipelines: &mut pipelines,
                descriptors: &mut descriptors,
                config: &config,
                target: None,
            };
            blitter.draw(
                &mut ctx,
                ImageRect::new(5.0, 5.0, 32.0, 32.0),
                ImageRect::new(0.0, 0.0, 64.0, 64.0),
            );
            // Early-return path: zero-size source.
            blitter.draw(
                &mut ctx,
                ImageRect::new(0.0, 0.0, 32.0, 32.0),
                ImageRect::new(0.0, 0.0, 0.0, 0.0),
            );
        }
        assert_eq!(state, original);
        assert_eq!(matrix.modelview(), before_mv);

        // An unloaded blitter is also a clean no-op.
        let mut empty = Blitter::new();
        let mut ctx = Blit2D {
            state: &mut state,
            matrix: &mut matrix,
            shaders: &mut shaders,
            pipelines: &mut pipelines,
            descriptors: &mut descriptors,
            config: &config,
            target: None,
        };
        empty.draw(
            &mut ctx,
            ImageRect::new(0.0, 0.0, 8.0, 8.0),
            ImageRect::new(0.0, 0.0, 8.0, 8.0),
        );
        assert_eq!(state, original);
    }

    #[test]
    fn test_stop_textures_forces_reload() {
        let (mut state, mut matrix, mut shaders, mut pipelines, mut descriptors, config) = blit_harness();
        let mut blitter = Blitter::new();
        blitter.load(checker_image(64, 64));
        let mut ctx = Blit2D {
            state: &mut state,
            matrix: &mut matrix,
            shaders: &mut shaders,
            pipelines: &mut pipelines,
            descriptors: &mut descriptors,
            config: &config,
            target: None,
        };
        let full = ImageRect::new(0.0, 0.0, 64.0, 64.0);
        blitter.draw(&mut ctx, full, full);
        assert_eq!(blitter.load_count(), 1);

        blitter.draw(&mut ctx, full, full);
        assert_eq!(blitter.load_count(), 1);

        stop_textures();
        blitter.draw(&mut ctx, full, full);
        assert_eq!(blitter.load_count(), 2);
    }

    #[test]
    fn test_registry_tracks_loaded_blitters() {
        let (mut state, mut matrix, mut shaders, mut pipelines, mut descriptors, config) = blit_harness();
        let id;
        {
            let mut blitter = Blitter::new();
            id = blitter.id;
            blitter.load(checker_image(16, 16));
            assert!(!registry().lock().contains(&id));
            let mut ctx = Blit2D {
                state: &mut state,
                matrix: &mut matrix,
                shaders: &mut shaders,
                pipelines: &mut pipelines,
                descriptors: &mut descriptors,
                config: &config,
                target: None,
            };
            let full = ImageRect::new(0.0, 0.0, 16.0, 16.0);
            blitter.draw(&mut ctx, full, full);
            assert!(registry().lock().contains(&id));
        }
        // Dropping the blitter deregisters it.
        assert!(!registry().lock().contains(&id));
    }

    #[test]
    fn test_scaled_source_maps_sub_rects() {
        let (mut state, mut matrix, mut shaders, mut pipelines, mut descriptors, config) = blit_harness();
        let mut blitter = Blitter::new();
        // Surface is 300x150 but presents as 600x300.
        blitter.load(checker_image(300, 150));
        blitter.set_scaled_size(600, 300);
        let mut ctx = Blit2D {
            state: &mut state,
            matrix: &mut matrix,
            shaders: &mut shaders,
            pipelines: &mut pipelines,
            descriptors: &mut descriptors,
            config: &config,
            target: None,
        };
        // Right half in nominal coordinates: maps to x >= 150 on the
        // surface, which spans tiles 0 and 1 horizontally.
        blitter.draw(
            &mut ctx,
            ImageRect::new(0.0, 0.0, 300.0, 150.0),
            ImageRect::new(300.0, 0.0, 300.0, 150.0),
        );
        assert!(blitter.quads_submitted() >= 1);
    }
}
