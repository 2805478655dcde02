//! Frame orchestration: render_tree and render_node.

use ash::vk;
use log::{debug, warn};

use marrow_common::world::{pin, FIXED_ONE};

use crate::config::RendererConfig;
use crate::framebuffer::{BloomBlur, FramebufferSwapper, RenderTarget};
use crate::geometry::{DrawCache, SurfaceBatch};
use crate::gpu::{self, DescriptorArena};
use crate::matrix::{MatrixStack, CLIP_PLANE_LEFT, CLIP_PLANE_RIGHT};
use crate::shader::{
    PipelineManager, PipelineVariant, ShaderKind, ShaderRegistry, SurfaceUniforms, Uniform,
};
use crate::state::RenderState;
use crate::RenderError;

use super::object::flicker_color;
use super::{
    ClipState, FogState, ParasiteTracker, RenderStep, ShaderRasterizer, SortedNode, ViewData,
    ViewerSprite,
};

/// Glow accumulates at a fixed logical width; height follows the
/// screen's aspect ratio.
const BLOOM_BUFFER_WIDTH: u32 = 640;

impl ShaderRasterizer {
    /// Build the rasterizer. Happens once after the device, shaders,
    /// and texture tables are set up.
    pub fn setup(
        config: RendererConfig,
        screen_width: u32,
        screen_height: u32,
    ) -> Result<Self, RenderError> {
        let shaders = ShaderRegistry::new()?;

        // The whole post-process stage hinges on both of its shaders;
        // checked once, here.
        let blur_available =
            shaders.get(ShaderKind::Blur).is_some() && shaders.get(ShaderKind::Bloom).is_some();
        let bloom = if config.bloom && blur_available {
            let h = BLOOM_BUFFER_WIDTH * screen_height.max(1) / screen_width.max(1);
            Some(BloomBlur::new(BLOOM_BUFFER_WIDTH, h))
        } else {
            if config.bloom {
                warn!("blur/bloom shaders missing; glow pass disabled");
            }
            None
        };
        if bloom.is_none() {
            debug!("bloom disabled; glow pass will be skipped");
        }

        Ok(Self {
            config,
            shaders,
            pipelines: PipelineManager::new(),
            matrix: MatrixStack::new(),
            state: RenderState::default(),
            cache: DrawCache::new(),
            descriptors: DescriptorArena::new(),
            clip: ClipState::default(),
            bloom,
            swapper: FramebufferSwapper::new(screen_width, screen_height),
            weapon_flare: 0.0,
            self_luminosity: 1.0,
            parasites: ParasiteTracker::default(),
            frame: crate::shader::FrameUniforms::default(),
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// The scene accumulation buffer the frame composes into.
    pub fn scene_swapper(&mut self) -> &mut FramebufferSwapper {
        &mut self.swapper
    }

    pub fn bloom_pass_count(&self) -> Option<i32> {
        self.bloom.as_ref().map(|b| b.last_pass_count())
    }

    /// Render the visible tree: the diffuse layer over every node plus
    /// the viewer sprites, then the glow layer and the blur/bloom
    /// composite when enabled.
    pub fn render_tree(
        &mut self,
        scene: &mut dyn crate::texture::TextureSource,
        view: &ViewData,
        fog: Option<FogState>,
        nodes: &[SortedNode],
        viewer_sprites: &[ViewerSprite],
    ) {
        self.weapon_flare = pin(
            view.maximum_depth_intensity - view.natural_light_intensity,
            0,
            FIXED_ONE,
        ) as f32
            / FIXED_ONE as f32;
        self.self_luminosity =
            pin(view.natural_light_intensity, 0, FIXED_ONE) as f32 / FIXED_ONE as f32;

        self.prime_frame_shaders(view, fog);

        self.clip
            .begin_frame(nodes.iter().flat_map(|n| n.clipping_windows.iter()));

        self.cache.reset_stats();
        self.descriptors.reset();

        for node in nodes {
            self.render_node(scene, view, node, RenderStep::Diffuse);
        }
        self.flush_layer(RenderStep::Diffuse);

        self.render_viewer_sprite_layer(scene, view, viewer_sprites, RenderStep::Diffuse);
        self.flush_layer(RenderStep::Diffuse);

        if self.bloom.is_some() {
            if let Some(bloom) = self.bloom.as_mut() {
                bloom.begin();
            }
            self.cache.start_gathering_lights();
            if view.invincibility {
                // Invincibility strobes a light just over the player.
                self.cache.add_light(
                    [
                        view.origin.x as f32,
                        view.origin.y as f32,
                        view.origin.z as f32 + 200.0,
                    ],
                    2000.0,
                    flicker_color(view.tick_count),
                );
            }

            for node in nodes {
                self.render_node(scene, view, node, RenderStep::Glow);
            }
            self.cache.finish_gathering_lights();
            self.flush_layer(RenderStep::Glow);

            self.render_viewer_sprite_layer(scene, view, viewer_sprites, RenderStep::Glow);
            self.flush_layer(RenderStep::Glow);

            let Self {
                bloom,
                shaders,
                pipelines,
                matrix,
                swapper,
                ..
            } = self;
            if let Some(bloom) = bloom.as_mut() {
                bloom.end();
                bloom.draw(shaders, pipelines, matrix, swapper);
            }
        }

        self.state.alpha_threshold = 0.5;
        gpu::drain_releases();
    }

    /// Stage the per-frame uniforms on the shaders that read them.
    fn prime_frame_shaders(&mut self, view: &ViewData, fog: Option<FogState>) {
        let tick = view.tick_count as f32;
        self.frame = crate::shader::FrameUniforms {
            logical_width: view.screen_width as f32,
            logical_height: view.screen_height as f32,
            pixel_width: view.screen_width as f32 * view.pixel_scale,
            pixel_height: view.screen_height as f32 * view.pixel_scale,
            time: tick,
            _pad: [0.0; 3],
        };
        let use_static = if self.config.flat_static { 0.0 } else { 1.0 };
        for kind in [ShaderKind::StaticEffect, ShaderKind::StaticEffectBloom] {
            let s = self.shaders.enable(kind);
            s.set_float(Uniform::Time, tick);
            s.set_float(Uniform::UseStatic, use_static);
        }
        let s = self.shaders.enable(ShaderKind::Rect);
        s.set_float(Uniform::Time, tick);

        let use_fog = self.config.fog
            && fog
                .map(|f| f.present && f.affects_landscapes)
                .unwrap_or(false);
        if let Some(f) = fog {
            self.matrix.set_fog_color(f.color);
        }
        self.state.fog = use_fog;

        let yaw = view.yaw_radians();
        let pitch = view.pitch_radians();
        for kind in [ShaderKind::Landscape, ShaderKind::LandscapeBloom] {
            let s = self.shaders.enable(kind);
            s.set_float(Uniform::UseFog, if use_fog { 1.0 } else { 0.0 });
            s.set_float(Uniform::Yaw, yaw);
            s.set_float(Uniform::Pitch, pitch);
        }
        self.shaders.disable();
    }

    /// Render every surface and object of one node.
    pub fn render_node(
        &mut self,
        scene: &mut dyn crate::texture::TextureSource,
        view: &ViewData,
        node: &SortedNode,
        step: RenderStep,
    ) {
        // Parasitic-object detection restarts per node.
        self.parasites.reset();

        let window = node.clipping_windows.first().copied().unwrap_or_default();

        if let Some(floor) = &node.floor {
            self.render_node_floor_or_ceiling(
                scene,
                view,
                &window,
                &node.polygon,
                floor,
                false,
                step,
            );
        }
        if let Some(ceiling) = &node.ceiling {
            self.render_node_floor_or_ceiling(
                scene,
                view,
                &window,
                &node.polygon,
                ceiling,
                true,
                step,
            );
        }
        for side in &node.sides {
            self.render_node_side(scene, view, &window, side, step);
        }
        for object in &node.objects {
            // Objects straddling a liquid render above and below the
            // boundary in separate passes.
            self.render_node_object(scene, view, object, node.media, false, step);
            self.render_node_object(scene, view, object, node.media, true, step);
        }

        self.matrix.disable_plane(CLIP_PLANE_LEFT);
        self.matrix.disable_plane(CLIP_PLANE_RIGHT);
    }

    /// Flush the draw cache into the active layer's buffer.
    pub fn flush_layer(&mut self, step: RenderStep) {
        let Self {
            cache,
            pipelines,
            descriptors,
            bloom,
            swapper,
            ..
        } = self;
        let fallback = swapper.draw_target();
        let target = match step {
            RenderStep::Diffuse => fallback,
            RenderStep::Glow => bloom
                .as_ref()
                .map(|b| b.swapper().draw_target())
                .unwrap_or(fallback),
        };
        cache.draw_all(|batch, vertex_buffer| {
            replay_batch(pipelines, descriptors, target, batch, vertex_buffer);
        });
    }
}

/// Replay one texture batch into `target`. A no-op without a device;
/// draws whose shader has no attached bytecode are skipped.
fn replay_batch(
    pipelines: &mut PipelineManager,
    descriptors: &mut DescriptorArena,
    target: &RenderTarget,
    batch: &SurfaceBatch,
    vertex_buffer: Option<vk::Buffer>,
) {
    let dst_view = match target.color_view() {
        Some(v) => v,
        None => return,
    };
    let vertex_buffer = match vertex_buffer {
        Some(b) => b,
        None => return,
    };

    // Bake pipelines and descriptor sets before recording.
    struct Prepared {
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
        set: Option<vk::DescriptorSet>,
        first_vertex: u32,
        vertex_count: u32,
    }
    let mut prepared: Vec<Prepared> = Vec::with_capacity(batch.draws.len());
    for draw in &batch.draws {
        let variant = PipelineVariant::for_blend(draw.blend);
        let (pipeline, layout) = match pipelines.get_or_create(draw.shader, variant) {
            Some(p) => (p.pipeline, p.layout),
            None => {
                warn!("no pipeline for {:?}/{:?}; draw skipped", draw.shader, variant);
                continue;
            }
        };
        let set = pipelines.descriptor_set_layout().and_then(|layout| {
            let uniform = gpu::upload_transient_uniforms(bytemuck::bytes_of(&draw.uniforms))?;
            descriptors.bind_draw(
                layout,
                uniform,
                std::mem::size_of::<SurfaceUniforms>() as u64,
                draw.texture_gpu.map(|t| (t.0.view, t.0.sampler)),
            )
        });
        prepared.push(Prepared {
            pipeline,
            layout,
            set,
            first_vertex: draw.first_vertex,
            vertex_count: draw.vertex_count,
        });
    }
    if prepared.is_empty() {
        return;
    }

    gpu::with_device(|ctx| {
        // SAFETY: main thread; every handle came from this device.
        unsafe {
            let cmd = match ctx.begin_single_time() {
                Some(c) => c,
                None => return,
            };

            if let Some(image) = target.color_image() {
                gpu::transition_image(
                    ctx,
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
            ctx.device.cmd_begin_rendering(cmd, &rendering_info);

            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: target.width() as f32,
                height: target.height() as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            };
            ctx.device.cmd_set_viewport(cmd, 0, &[viewport]);
            let scissor = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: target.width(),
                    height: target.height(),
                },
            };
            ctx.device.cmd_set_scissor(cmd, 0, &[scissor]);
            ctx.device
                .cmd_bind_vertex_buffers(cmd, 0, &[vertex_buffer], &[0]);

            for p in &prepared {
                ctx.device
                    .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, p.pipeline);
                if let Some(set) = p.set {
                    ctx.device.cmd_bind_descriptor_sets(
                        cmd,
                        vk::PipelineBindPoint::GRAPHICS,
                        p.layout,
                        0,
                        &[set],
                        &[],
                    );
                }
                ctx.device.cmd_draw(cmd, p.vertex_count, 1, p.first_vertex, 0);
            }

            ctx.device.cmd_end_rendering(cmd);
            ctx.end_single_time(cmd);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rasterize::tests_support::*;

    #[test]
    fn test_setup_without_bloom_has_no_glow_buffer() {
        let config = RendererConfig {
            bloom: false,
            ..RendererConfig::default()
        };
        let ras = ShaderRasterizer::setup(config, 640, 480).unwrap();
        assert!(ras.bloom.is_none());
    }

    #[test]
    fn test_bloom_buffer_follows_aspect_ratio() {
        let ras = ShaderRasterizer::setup(RendererConfig::default(), 800, 600).unwrap();
        let bloom = ras.bloom.as_ref().unwrap();
        assert_eq!(bloom.swapper().width(), 640);
        assert_eq!(bloom.swapper().height(), 480);
    }

    #[test]
    fn test_render_tree_runs_bloom_default_passes() {
        let mut ras = ShaderRasterizer::setup(RendererConfig::default(), 640, 480).unwrap();
        let mut scene = FakeScene::default();
        let view = ViewData::default();
        let nodes = [simple_node()];
        ras.render_tree(&mut scene, &view, None, &nodes, &[]);
        assert_eq!(ras.bloom_pass_count(), Some(5));
    }

    #[test]
    fn test_render_tree_without_bloom_skips_glow() {
        let config = RendererConfig {
            bloom: false,
            ..RendererConfig::default()
        };
        let mut ras = ShaderRasterizer::setup(config, 640, 480).unwrap();
        let mut scene = FakeScene::default();
        let view = ViewData::default();
        let nodes = [simple_node()];
        ras.render_tree(&mut scene, &view, None, &nodes, &[]);
        assert_eq!(ras.bloom_pass_count(), None);
        // Diffuse only: every resolve was a diffuse-layer resolve.
        assert!(scene.resolve_count > 0);
    }

    #[test]
    fn test_render_tree_flushes_all_geometry() {
        let mut ras = ShaderRasterizer::setup(RendererConfig::default(), 640, 480).unwrap();
        let mut scene = FakeScene::default();
        let view = ViewData::default();
        let nodes = [simple_node(), simple_node()];
        ras.render_tree(&mut scene, &view, None, &nodes, &[]);
        assert_eq!(ras.cache.pending_draws(), 0);
        assert_eq!(ras.cache.pending_vertices(), 0);
        let stats = ras.cache.stats();
        assert!(stats.flushes >= 2);
        assert!(stats.surfaces > 0);
    }

    #[test]
    fn test_render_node_disables_window_planes_on_exit() {
        let mut ras = ShaderRasterizer::setup(RendererConfig::default(), 640, 480).unwrap();
        let mut scene = FakeScene::default();
        let view = ViewData::default();
        let node = two_window_node();
        ras.clip
            .begin_frame(node.clipping_windows.iter());
        ras.render_node(&mut scene, &view, &node, RenderStep::Diffuse);
        assert!(!ras.matrix.plane(CLIP_PLANE_LEFT).enabled);
        assert!(!ras.matrix.plane(CLIP_PLANE_RIGHT).enabled);
    }

    #[test]
    fn test_missing_texture_skips_surface_gracefully() {
        let mut ras = ShaderRasterizer::setup(RendererConfig::default(), 640, 480).unwrap();
        let mut scene = FakeScene {
            fail_resolve: true,
            ..FakeScene::default()
        };
        let view = ViewData::default();
        let nodes = [simple_node()];
        ras.render_tree(&mut scene, &view, None, &nodes, &[]);
        assert_eq!(ras.cache.stats().surfaces, 0);
        // State restored despite the early returns.
        assert_eq!(ras.state.alpha_threshold, 0.5);
        assert!(ras.shaders.current().is_none());
    }
}
