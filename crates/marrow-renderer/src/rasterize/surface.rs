//! Floor, ceiling, and wall render routines.

use marrow_common::shapes::{ShadingMode, TextureTransfer, TransferMode};
use marrow_common::world::{world_fractional_part, FIXED_ONE, WORLD_ONE};

use crate::matrix::{mat4_multiply, mat4_scaling, mat4_translation, Mat4, MatrixMode};
use crate::shader::{MatrixUniform, ShaderKind, SurfaceUniforms, Uniform, Vec4Uniform};
use crate::state::{TextureFilter, WrapMode};
use crate::texture::{
    texture_transfer_for, LandscapeOptions, TextureBinding, TextureCategory, TextureSource,
};

use super::{
    calc_wobble, transfer_offset, ClippingWindow, HorizontalSurface, Polygon, RenderStep,
    ShaderRasterizer, VerticalSurface, ViewData,
};

/// A circle is 2π radians.
const RADIAN_TO_CIRCLE: f64 = 1.0 / std::f64::consts::TAU;

/// Walls with solid geometry behind them get pulled toward the viewer a
/// touch, so decals and overlays behind the surface never bleed through.
const SOLID_SIDE_DEPTH_BIAS: f32 = -2.0;

impl ShaderRasterizer {
    /// Resolve a wall-family texture and enable its shader, staging the
    /// shared uniform contract. Returns the binding and the enabled
    /// shader kind, or `None` when the shape doesn't resolve.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn setup_wall_texture(
        &mut self,
        scene: &mut dyn TextureSource,
        view: &ViewData,
        texture: marrow_common::shapes::ShapeDescriptor,
        transfer_mode: TransferMode,
        pulsate: f32,
        wobble: f32,
        intensity: f32,
        offset: f32,
        step: RenderStep,
    ) -> Option<(TextureBinding, ShaderKind)> {
        let mut flare = self.weapon_flare;
        let shading = if view.infravision {
            ShadingMode::Infravision
        } else {
            ShadingMode::Normal
        };
        let mut shadeless = view.infravision;

        self.matrix.color4f(intensity, intensity, intensity, 1.0);

        let mut category = TextureCategory::Wall;
        let mut landscape: Option<LandscapeOptions> = None;
        let mut shader: Option<ShaderKind> = None;
        match transfer_mode {
            TransferMode::Static => {
                shadeless = true;
                flare = -1.0;
                shader = Some(shader_for_step(ShaderKind::StaticEffect, step));
            }
            TransferMode::Landscape | TransferMode::BigLandscape => {
                category = TextureCategory::Landscape;
                landscape = Some(scene.landscape_options(texture));
                shader = Some(shader_for_step(ShaderKind::Landscape, step));
            }
            _ => {
                if shadeless {
                    // Infravision flattens the shade: white in the
                    // diffuse layer, black in the glow layer.
                    if step == RenderStep::Diffuse {
                        self.matrix.color4f(1.0, 1.0, 1.0, 1.0);
                    } else {
                        self.matrix.color4f(0.0, 0.0, 0.0, 1.0);
                    }
                    flare = -1.0;
                }
            }
        }

        let shader = shader.unwrap_or_else(|| {
            if self.config.bump_mapping {
                shader_for_step(ShaderKind::Bump, step)
            } else {
                shader_for_step(ShaderKind::Wall, step)
            }
        });

        let resolved = scene.resolve(texture, category, shading)?;

        let binding = TextureBinding {
            shape: texture,
            category,
            transfer: if transfer_mode == TransferMode::Static {
                TextureTransfer::StaticEffect
            } else if category == TextureCategory::Landscape {
                TextureTransfer::Landscape
            } else {
                texture_transfer_for(TransferMode::Normal)
            },
            transfer_data: 0,
            shadeless,
            resolved,
            landscape,
        };

        self.load_texture_matrix(&binding);
        self.apply_wall_sampling(&binding);

        let config_npot = self.config.npot_textures;
        let self_luminosity = self.self_luminosity;
        let program = self.shaders.enable(shader);
        if let Some(opts) = landscape {
            let tex_scale = binding.resolved.u_scale.abs() as f64;
            let horiz_scale = f64::from(1u32 << opts.horiz_exp.max(0) as u32);
            let scale_x = horiz_scale * if config_npot { 1.0 } else { tex_scale } * RADIAN_TO_CIRCLE;
            let offset_x = horiz_scale
                * (0.25
                    + opts.azimuth as f64 / f64::from(marrow_common::world::FULL_CIRCLE));

            let adjusted_vert_exp = opts.vert_exp + opts.asp_rat_exp;
            let vert_scale = if adjusted_vert_exp >= 0 {
                f64::from(1u32 << adjusted_vert_exp as u32)
            } else {
                1.0 / f64::from(1u32 << (-adjusted_vert_exp) as u32)
            };
            let scale_y = vert_scale * tex_scale * RADIAN_TO_CIRCLE;
            let offset_y = (0.5 + binding.resolved.u_offset as f64) * tex_scale;

            program.set_float(Uniform::ScaleX, scale_x as f32);
            program.set_float(Uniform::OffsetX, offset_x as f32);
            program.set_float(Uniform::ScaleY, scale_y as f32);
            program.set_float(Uniform::OffsetY, offset_y as f32);
        }

        if step == RenderStep::Glow {
            if binding.category == TextureCategory::Landscape {
                program.set_float(Uniform::BloomScale, binding.resolved.landscape_bloom);
            } else {
                program.set_float(Uniform::BloomScale, binding.resolved.bloom_scale);
                program.set_float(Uniform::BloomShift, binding.resolved.bloom_shift);
            }
        }
        program.set_float(Uniform::Flare, flare);
        program.set_float(Uniform::SelfLuminosity, self_luminosity);
        program.set_float(Uniform::Pulsate, pulsate);
        program.set_float(Uniform::Wobble, wobble);
        program.set_float(Uniform::Depth, offset);
        program.set_float(Uniform::Glow, 0.0);

        Some((binding, shader))
    }

    /// Wrap and filter state for a wall-family binding. Landscapes
    /// repeat horizontally and mirror vertically so the horizon can
    /// fold instead of seam.
    fn apply_wall_sampling(&mut self, binding: &TextureBinding) {
        if binding.category == TextureCategory::Landscape {
            self.state.wrap_s = WrapMode::Repeat;
            self.state.wrap_t = WrapMode::MirroredRepeat;
            self.state.filter = TextureFilter::Linear;
        } else {
            self.state.wrap_s = WrapMode::Repeat;
            self.state.wrap_t = WrapMode::Repeat;
            self.state.filter = if self.config.classic_visuals {
                TextureFilter::NearestMipmap
            } else {
                TextureFilter::LinearMipmap
            };
        }
    }

    /// Load the shape's scale/offset into the texture matrix.
    pub(crate) fn load_texture_matrix(&mut self, binding: &TextureBinding) {
        let scale = mat4_scaling(binding.resolved.u_scale, binding.resolved.v_scale, 1.0);
        let translate = mat4_translation(binding.resolved.u_offset, binding.resolved.v_offset, 0.0);
        let m: Mat4 = mat4_multiply(&translate, &scale);
        self.matrix.matrix_mode(MatrixMode::Texture);
        self.matrix.load_matrix(&m);
        self.matrix.matrix_mode(MatrixMode::ModelView);
    }

    /// Restore the texture matrix after a surface, leaving modelview
    /// current.
    pub(crate) fn restore_texture_matrix(&mut self) {
        self.matrix.matrix_mode(MatrixMode::Texture);
        self.matrix.load_identity();
        self.matrix.matrix_mode(MatrixMode::ModelView);
    }

    /// Stage the per-draw uniforms every surface shader receives and
    /// snapshot them for the cache.
    pub(crate) fn stage_common_uniforms(&mut self, tangent: [f32; 4]) -> SurfaceUniforms {
        let modelview = self.matrix.modelview();
        let mvp = self.matrix.modelview_projection();
        let inverse = self.matrix.modelview_inverse();
        let texture = self.matrix.texture();
        let color = self.matrix.color();
        let fog = self.matrix.fog_color();
        let plane0 = self.matrix.plane_uniform(crate::matrix::CLIP_PLANE_LEFT);
        let plane1 = self.matrix.plane_uniform(crate::matrix::CLIP_PLANE_RIGHT);
        let plane5 = self.matrix.plane_uniform(crate::matrix::CLIP_PLANE_MEDIA);
        let media = self.matrix.plane_uniform(crate::matrix::MEDIA_PLANE);

        if let Some(program) = self.shaders.current_mut() {
            program.set_matrix4(MatrixUniform::ModelView, &modelview);
            program.set_matrix4(MatrixUniform::ModelViewProjection, &mvp);
            program.set_matrix4(MatrixUniform::ModelViewInverse, &inverse);
            program.set_matrix4(MatrixUniform::Texture, &texture);
            program.set_vec4(Vec4Uniform::Color, color);
            program.set_vec4(Vec4Uniform::FogColor, fog);
            program.set_vec4(Vec4Uniform::ClipPlane0, plane0);
            program.set_vec4(Vec4Uniform::ClipPlane1, plane1);
            program.set_vec4(Vec4Uniform::ClipPlane5, plane5);
            program.set_vec4(Vec4Uniform::MediaPlane, media);
            program.set_vec4(Vec4Uniform::TexCoords4, tangent);
            program.surface_uniforms()
        } else {
            SurfaceUniforms::default()
        }
    }

    /// Render one floor or ceiling polygon.
    pub fn render_node_floor_or_ceiling(
        &mut self,
        scene: &mut dyn TextureSource,
        view: &ViewData,
        window: &ClippingWindow,
        polygon: &Polygon,
        surface: &HorizontalSurface,
        ceiling: bool,
        step: RenderStep,
    ) {
        let offset = 0.0;

        let texture = scene.translate_animated(surface.texture);
        let intensity =
            scene.light_intensity(surface.lightsource_index) as f32 / (FIXED_ONE - 1) as f32;
        let wobble = calc_wobble(surface.transfer_mode, view.tick_count);
        // Wobble and pulsate behave the same on horizontal surfaces;
        // the stronger pulsate reads closer to the software renderer.
        let setup = self.setup_wall_texture(
            scene,
            view,
            texture,
            surface.transfer_mode,
            wobble * 4.0,
            0.0,
            intensity,
            offset,
            step,
        );
        let (binding, shader) = match setup {
            Some(pair) => pair,
            None => return,
        };

        if binding.is_blended() && !self.config.classic_visuals {
            self.state.set_blended(binding.normal_blend());
        } else {
            self.state.set_opaque();
        }

        let vertex_count = polygon.endpoints.len();
        if vertex_count < 3 {
            self.shaders.disable();
            self.restore_texture_matrix();
            return;
        }

        self.clip.clip_to_window(&mut self.matrix, view, window);

        let (x, y) = transfer_offset(surface.transfer_mode, view.tick_count);

        let (normal, sign) = if ceiling {
            ([0.0, 0.0, -1.0], 1.0)
        } else {
            ([0.0, 0.0, 1.0], -1.0)
        };
        let tangent = [0.0, 1.0, 0.0, sign];

        let mut positions = Vec::with_capacity(vertex_count);
        let mut tex_coords = Vec::with_capacity(vertex_count);
        for i in 0..vertex_count {
            // Ceilings wind in reverse so their front face points down.
            let vertex = if ceiling {
                polygon.endpoints[vertex_count - 1 - i]
            } else {
                polygon.endpoints[i]
            };
            positions.push([vertex.x as f32, vertex.y as f32, surface.height as f32]);
            tex_coords.push([
                (vertex.x + surface.origin.x + x) as f32 / WORLD_ONE as f32,
                (vertex.y + surface.origin.y + y) as f32 / WORLD_ONE as f32,
            ]);
        }

        let blend = self.state.blend;
        let uniforms = self.stage_common_uniforms(tangent);
        self.cache.queue_surface(
            shader,
            blend,
            binding.resolved.handle,
            binding.resolved.gpu,
            uniforms,
            &positions,
            &tex_coords,
            normal,
        );

        if let Some((glow_shader, glow_texture, glow_gpu)) =
            self.setup_glow(&binding, wobble, self.weapon_flare, offset, step)
        {
            let blend = self.state.blend;
            let uniforms = self.stage_common_uniforms(tangent);
            self.cache.queue_surface(
                glow_shader,
                blend,
                glow_texture,
                glow_gpu,
                uniforms,
                &positions,
                &tex_coords,
                normal,
            );
        }

        self.shaders.disable();
        self.restore_texture_matrix();
    }

    /// Render one wall trapezoid.
    pub fn render_node_side(
        &mut self,
        scene: &mut dyn TextureSource,
        view: &ViewData,
        window: &ClippingWindow,
        surface: &VerticalSurface,
        step: RenderStep,
    ) {
        let offset = if surface.void_present {
            0.0
        } else {
            SOLID_SIDE_DEPTH_BIAS
        };

        let texture = scene.translate_animated(surface.texture);
        let intensity = (scene.light_intensity(surface.lightsource_index)
            + surface.ambient_delta) as f32
            / (FIXED_ONE - 1) as f32;
        let mut wobble = calc_wobble(surface.transfer_mode, view.tick_count);
        let mut pulsate = 0.0;
        if surface.transfer_mode == TransferMode::Pulsate {
            pulsate = wobble;
            wobble = 0.0;
        }
        let setup = self.setup_wall_texture(
            scene,
            view,
            texture,
            surface.transfer_mode,
            pulsate,
            wobble,
            intensity,
            offset,
            step,
        );
        let (binding, shader) = match setup {
            Some(pair) => pair,
            None => return,
        };

        if binding.is_blended() {
            self.state.set_blended(binding.normal_blend());
        } else {
            self.state.set_opaque();
        }

        let h = surface.h1.min(surface.hmax);
        if h <= surface.h0 {
            self.shaders.disable();
            self.restore_texture_matrix();
            return;
        }

        self.clip.clip_to_window(&mut self.matrix, view, window);

        let z_top = (h + view.origin.z) as f32;
        let z_bottom = (surface.h0 + view.origin.z) as f32;
        let (p0x, p0y) = (surface.p0.i as f32, surface.p0.j as f32);
        let (p1x, p1y) = (surface.p1.i as f32, surface.p1.j as f32);

        let div = WORLD_ONE as f64;
        let dx = (surface.p1.i - surface.p0.i) as f64 / surface.length as f64;
        let dy = (surface.p1.j - surface.p0.j) as f64 / surface.length as f64;

        let (x, y) = transfer_offset(surface.transfer_mode, view.tick_count);
        let x0 = world_fractional_part(surface.x0) - x;
        let t_offset = (surface.h1 + view.origin.z + world_fractional_part(surface.y0) - y) as f64;

        let normal = [-dy as f32, dx as f32, 0.0];
        let tangent = [dx as f32, dy as f32, 0.0, 1.0];

        let positions = [
            [p0x, p0y, z_top],
            [p1x, p1y, z_top],
            [p1x, p1y, z_bottom],
            [p0x, p0y, z_bottom],
        ];
        let mut tex_coords = [[0.0f32; 2]; 4];
        for (i, tc) in tex_coords.iter_mut().enumerate() {
            let p2 = if i == 1 || i == 2 {
                surface.length as f64
            } else {
                0.0
            };
            let z = positions[i][2] as f64;
            tc[0] = ((t_offset - z) / div) as f32;
            tc[1] = ((x0 as f64 + p2) / div) as f32;
        }

        let blend = self.state.blend;
        let uniforms = self.stage_common_uniforms(tangent);
        self.cache.queue_surface(
            shader,
            blend,
            binding.resolved.handle,
            binding.resolved.gpu,
            uniforms,
            &positions,
            &tex_coords,
            normal,
        );

        if let Some((glow_shader, glow_texture, glow_gpu)) =
            self.setup_glow(&binding, wobble, self.weapon_flare, offset, step)
        {
            let blend = self.state.blend;
            let uniforms = self.stage_common_uniforms(tangent);
            self.cache.queue_surface(
                glow_shader,
                blend,
                glow_texture,
                glow_gpu,
                uniforms,
                &positions,
                &tex_coords,
                normal,
            );
        }

        self.shaders.disable();
        self.restore_texture_matrix();
    }

    /// Switch to the glow-map second pass for a textured surface, if it
    /// has one. Returns the shader and glow texture to queue with.
    pub(crate) fn setup_glow(
        &mut self,
        binding: &TextureBinding,
        wobble: f32,
        flare: f32,
        offset: f32,
        step: RenderStep,
    ) -> Option<(
        ShaderKind,
        crate::texture::TextureHandle,
        Option<crate::texture::GpuTextureRef>,
    )> {
        if binding.transfer != TextureTransfer::Textured || !binding.is_glow_mapped() {
            return None;
        }
        let glow = binding.resolved.glow?;

        let shader = if binding.category == TextureCategory::Wall {
            if self.config.bump_mapping {
                shader_for_step(ShaderKind::Bump, step)
            } else {
                shader_for_step(ShaderKind::Wall, step)
            }
        } else {
            shader_for_step(ShaderKind::Sprite, step)
        };

        self.state.set_blended(glow.blend);

        let self_luminosity = self.self_luminosity;
        let program = self.shaders.enable(shader);
        if step == RenderStep::Glow {
            program.set_float(Uniform::BloomScale, glow.bloom_scale);
            program.set_float(Uniform::BloomShift, glow.bloom_shift);
        }
        program.set_float(Uniform::Flare, flare);
        program.set_float(Uniform::SelfLuminosity, self_luminosity);
        program.set_float(Uniform::Wobble, wobble);
        program.set_float(Uniform::Depth, offset - 1.0);
        program.set_float(Uniform::Glow, glow.min_intensity);

        Some((shader, glow.handle, glow.gpu))
    }
}

/// The diffuse shader or its bloom twin, by render step.
pub(crate) fn shader_for_step(kind: ShaderKind, step: RenderStep) -> ShaderKind {
    match step {
        RenderStep::Diffuse => kind,
        RenderStep::Glow => kind.bloom_variant(),
    }
}
