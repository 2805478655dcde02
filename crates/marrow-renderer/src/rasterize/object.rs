//! Sprite and skinned-model render routines.

use marrow_common::shapes::{OpacityType, ShadingMode, TextureTransfer, TransferMode};
use marrow_common::world::{pin, ANGLE_TO_DEGREES, FIXED_ONE};

use crate::matrix::{MatrixMode, CLIP_PLANE_MEDIA};
use crate::shader::{ShaderKind, Uniform};
use crate::state::{TextureFilter, Winding, WrapMode};
use crate::texture::{texture_transfer_for, TextureBinding, TextureCategory, TextureSource};

use super::surface::shader_for_step;
use super::{
    Media, ModelData, RectangleDefinition, RenderObject, RenderStep, ShaderRasterizer, ViewData,
};

/// Radius of the courtesy light every rendered object contributes to
/// the glow gather.
const OBJECT_LIGHT_RADIUS: f32 = 1000.0;

impl ShaderRasterizer {
    /// Resolve a sprite-family texture and enable its shader. `None`
    /// aborts the draw without residual state.
    pub(crate) fn setup_sprite_texture(
        &mut self,
        scene: &mut dyn TextureSource,
        view: &ViewData,
        rect: &RectangleDefinition,
        category: TextureCategory,
        offset: f32,
        step: RenderStep,
    ) -> Option<(TextureBinding, ShaderKind)> {
        let shade = pin(rect.ambient_shade, 0, FIXED_ONE) as f32 / FIXED_ONE as f32;
        self.matrix.color4f(shade, shade, shade, 1.0);

        let mut flare = self.weapon_flare;
        let mut shadeless = rect.shadeless;
        let mut shader: Option<ShaderKind> = None;

        match texture_transfer_for(rect.transfer_mode) {
            TextureTransfer::StaticEffect => {
                shadeless = true;
                flare = -1.0;
                shader = Some(shader_for_step(ShaderKind::StaticEffect, step));
                // Teleport static throws flickering light on the floor.
                self.cache.add_light(
                    [
                        rect.position.x as f32,
                        rect.position.y as f32,
                        rect.position.z as f32 + 100.0,
                    ],
                    2000.0,
                    flicker_color(view.tick_count),
                );
            }
            TextureTransfer::Tinted => {
                flare = -1.0;
                shader = Some(shader_for_step(ShaderKind::Tinted, step));
            }
            TextureTransfer::Solid => {
                self.matrix.color4f(0.0, 1.0, 0.0, 1.0);
            }
            TextureTransfer::Textured => {
                if shadeless {
                    if step == RenderStep::Diffuse {
                        self.matrix.color4f(1.0, 1.0, 1.0, 1.0);
                    } else {
                        self.matrix.color4f(0.0, 0.0, 0.0, 1.0);
                    }
                    flare = -1.0;
                }
            }
            TextureTransfer::Landscape => {
                // A transfer mode no sprite should carry; flag it.
                self.matrix.color4f(0.0, 0.0, 1.0, 1.0);
            }
        }

        let shader = shader.unwrap_or_else(|| shader_for_step(ShaderKind::Sprite, step));

        let shading = if view.infravision {
            ShadingMode::Infravision
        } else {
            ShadingMode::Normal
        };
        let resolved = scene.resolve(rect.shape, category, shading)?;

        let binding = TextureBinding {
            shape: rect.shape,
            category,
            transfer: texture_transfer_for(rect.transfer_mode),
            transfer_data: rect.transfer_data,
            shadeless,
            resolved,
            landscape: None,
        };

        self.load_texture_matrix(&binding);

        let self_luminosity = self.self_luminosity;
        let force_depth = self.config.force_sprite_depth;
        let program = self.shaders.enable(shader);
        if rect.transfer_mode == TransferMode::Tinted {
            program.set_float(Uniform::Visibility, 1.0 - rect.transfer_data as f32 / 32.0);
        }
        if step == RenderStep::Glow {
            program.set_float(Uniform::BloomScale, binding.resolved.bloom_scale);
            program.set_float(Uniform::BloomShift, binding.resolved.bloom_shift);
        }
        program.set_float(Uniform::Flare, flare);
        program.set_float(Uniform::SelfLuminosity, self_luminosity);
        program.set_float(Uniform::Pulsate, 0.0);
        program.set_float(Uniform::Wobble, 0.0);
        program.set_float(Uniform::Depth, offset);
        program.set_float(Uniform::StrictDepthMode, if force_depth { 1.0 } else { 0.0 });
        program.set_float(Uniform::Glow, 0.0);
        program.set_float(Uniform::LogicalWidth, view.screen_width as f32);
        program.set_float(Uniform::LogicalHeight, view.screen_height as f32);
        program.set_float(
            Uniform::PixelWidth,
            view.screen_width as f32 * view.pixel_scale,
        );
        program.set_float(
            Uniform::PixelHeight,
            view.screen_height as f32 * view.pixel_scale,
        );

        Some((binding, shader))
    }

    /// Render one object through each of its clip windows, splitting
    /// above/below a liquid boundary into separate passes.
    pub fn render_node_object(
        &mut self,
        scene: &mut dyn TextureSource,
        view: &ViewData,
        object: &RenderObject,
        media: Option<Media>,
        other_side_of_media: bool,
        step: RenderStep,
    ) {
        if object.clipping_windows.is_empty() {
            return;
        }

        match media {
            Some(media) => {
                let h = media.height as f32;
                let plane = if view.under_media ^ other_side_of_media {
                    [0.0, 0.0, -1.0, h]
                } else {
                    [0.0, 0.0, 1.0, -h]
                };
                self.matrix.clip_plane(CLIP_PLANE_MEDIA, plane);
                self.matrix.enable_plane(CLIP_PLANE_MEDIA);
            }
            None => {
                // Without a liquid there is no second side to draw.
                if other_side_of_media {
                    return;
                }
            }
        }

        for win in &object.clipping_windows {
            self.clip.clip_to_window(&mut self.matrix, view, win);
            self.render_object_in_window(scene, view, &object.rect, step);
        }

        self.matrix.disable_plane(CLIP_PLANE_MEDIA);
    }

    fn render_object_in_window(
        &mut self,
        scene: &mut dyn TextureSource,
        view: &ViewData,
        rect: &RectangleDefinition,
        step: RenderStep,
    ) {
        // Sprites blend against walls already drawn; the wall batches
        // must land first.
        self.flush_layer(step);

        self.cache.add_light(
            [
                rect.position.x as f32,
                rect.position.y as f32,
                rect.position.z as f32,
            ],
            OBJECT_LIGHT_RADIUS,
            [1.0, 1.0, 1.0, 1.0],
        );

        if let Some(model) = rect.model.clone() {
            let weapon_flare = self.weapon_flare;
            let clut = rect.shape.clut();
            self.scoped_matrix(MatrixMode::ModelView, |this| {
                this.matrix.translatef(
                    rect.position.x as f32,
                    rect.position.y as f32,
                    rect.position.z as f32,
                );
                this.matrix.rotatef_z(rect.azimuth as f32 * ANGLE_TO_DEGREES);
                let horiz = rect.scale * rect.horiz_scale;
                this.matrix.scalef(horiz, horiz, rect.scale);
                this.render_model(scene, view, rect, &model, clut, weapon_flare, step);
            });
            return;
        }

        let force_depth = self.config.force_sprite_depth;
        let state_snapshot = self.state;
        self.scoped_matrix(MatrixMode::ModelView, |this| {
            this.matrix.translatef(
                rect.position.x as f32,
                rect.position.y as f32,
                rect.position.z as f32,
            );
            // Billboard: face the viewer's yaw.
            this.matrix.rotatef_z(view.yaw_degrees());

            let offset = if force_depth {
                this.parasites.offset_for(rect.position.y)
            } else {
                // Painter's order, not the depth buffer.
                this.state.depth_test = false;
                0.0
            };

            let _ = this.draw_sprite_quad(scene, view, rect, offset, step);
        });
        self.state = state_snapshot;
        self.shaders.disable();
    }

    fn draw_sprite_quad(
        &mut self,
        scene: &mut dyn TextureSource,
        view: &ViewData,
        rect: &RectangleDefinition,
        offset: f32,
        step: RenderStep,
    ) -> Option<()> {
        let (binding, shader) =
            self.setup_sprite_texture(scene, view, rect, TextureCategory::Inhabitant, offset, step)?;

        self.state.wrap_s = WrapMode::ClampToEdge;
        self.state.wrap_t = WrapMode::ClampToEdge;
        self.state.filter = if self.config.classic_visuals {
            TextureFilter::NearestMipmap
        } else {
            TextureFilter::LinearMipmap
        };

        let resolved = &binding.resolved;
        let (mut u0, mut u1) = (resolved.u_offset, resolved.u_scale + resolved.u_offset);
        if rect.flip_vertical {
            std::mem::swap(&mut u0, &mut u1);
        }
        let (mut v0, mut v1) = (resolved.v_offset, resolved.v_scale + resolved.v_offset);
        if rect.flip_horizontal {
            std::mem::swap(&mut v0, &mut v1);
        }

        if binding.is_blended() || binding.transfer == TextureTransfer::Tinted {
            self.state.set_blended(binding.normal_blend());
        } else {
            self.state.set_opaque();
        }

        let left = rect.world_left as f32 * rect.horiz_scale * rect.scale;
        let right = rect.world_right as f32 * rect.horiz_scale * rect.scale;
        let top = rect.world_top as f32 * rect.scale;
        let bottom = rect.world_bottom as f32 * rect.scale;

        // The quad lives in the x=0 plane after the billboard rotation.
        let positions = [
            [0.0, left, top],
            [0.0, right, top],
            [0.0, right, bottom],
            [0.0, left, bottom],
        ];
        let tex_coords = [[u0, v0], [u0, v1], [u1, v1], [u1, v0]];
        let normal = [1.0, 0.0, 0.0];
        let tangent = [0.0, 0.0, 1.0, 1.0];

        let uniforms = self.stage_common_uniforms(tangent);
        self.cache.queue_surface(
            shader,
            self.state.blend,
            resolved.handle,
            resolved.gpu,
            uniforms,
            &positions,
            &tex_coords,
            normal,
        );

        if let Some((glow_shader, glow_texture, glow_gpu)) =
            self.setup_glow(&binding, 0.0, self.weapon_flare, offset, step)
        {
            let uniforms = self.stage_common_uniforms(tangent);
            self.cache.queue_surface(
                glow_shader,
                self.state.blend,
                glow_texture,
                glow_gpu,
                uniforms,
                &positions,
                &tex_coords,
                normal,
            );
        }

        self.restore_texture_matrix();
        Some(())
    }

    /// Render a skinned model in place of a sprite. Returns false when
    /// the skin for this color table is missing.
    pub(crate) fn render_model(
        &mut self,
        scene: &mut dyn TextureSource,
        view: &ViewData,
        rect: &RectangleDefinition,
        model: &ModelData,
        clut: u16,
        flare: f32,
        step: RenderStep,
    ) -> bool {
        let _ = (scene, view);
        let skin = match model.skin(clut) {
            Some(s) => s.clone(),
            None => return false,
        };

        let state_snapshot = self.state;

        if model.sidedness < 0 {
            self.state.cull_face = true;
            self.state.front_face = Winding::CounterClockwise;
        } else if model.sidedness > 0 {
            self.state.cull_face = true;
            self.state.front_face = Winding::Clockwise;
        } else {
            self.state.cull_face = false;
        }

        if skin.opacity != OpacityType::Crisp || rect.transfer_mode == TransferMode::Tinted {
            self.state.set_blended(skin.normal_blend);
        } else {
            self.state.set_opaque();
        }

        let shade = pin(rect.ambient_shade, 0, FIXED_ONE) as f32 / FIXED_ONE as f32;
        self.matrix.color4f(shade, shade, shade, 1.0);

        let mut flare = flare;
        let mut shader: Option<ShaderKind> = None;
        let mut can_glow = false;
        match texture_transfer_for(rect.transfer_mode) {
            TextureTransfer::StaticEffect => {
                flare = -1.0;
                shader = Some(shader_for_step(ShaderKind::StaticEffect, step));
            }
            TextureTransfer::Tinted => {
                flare = -1.0;
                shader = Some(shader_for_step(ShaderKind::Tinted, step));
            }
            TextureTransfer::Solid => {
                self.matrix.color4f(0.0, 1.0, 0.0, 1.0);
            }
            TextureTransfer::Textured => {
                if rect.shadeless {
                    if step == RenderStep::Diffuse {
                        self.matrix.color4f(1.0, 1.0, 1.0, 1.0);
                    } else {
                        self.matrix.color4f(0.0, 0.0, 0.0, 1.0);
                    }
                    flare = -1.0;
                } else {
                    can_glow = true;
                }
            }
            TextureTransfer::Landscape => {
                self.matrix.color4f(0.0, 0.0, 1.0, 1.0);
            }
        }
        let shader = shader.unwrap_or_else(|| {
            if self.config.bump_mapping {
                shader_for_step(ShaderKind::Bump, step)
            } else {
                shader_for_step(ShaderKind::Wall, step)
            }
        });

        let self_luminosity = self.self_luminosity;
        let program = self.shaders.enable(shader);
        if rect.transfer_mode == TransferMode::Tinted {
            program.set_float(Uniform::Visibility, 1.0 - rect.transfer_data as f32 / 32.0);
        }
        if step == RenderStep::Glow {
            program.set_float(Uniform::BloomScale, skin.bloom_scale);
            program.set_float(Uniform::BloomShift, skin.bloom_shift);
        }
        program.set_float(Uniform::Flare, flare);
        program.set_float(Uniform::SelfLuminosity, self_luminosity);
        program.set_float(Uniform::Wobble, 0.0);
        program.set_float(Uniform::Depth, 0.0);
        program.set_float(Uniform::Glow, 0.0);

        let tangent = [1.0, 0.0, 0.0, 1.0];
        let uniforms = self.stage_common_uniforms(tangent);
        self.cache.queue_indexed(
            shader,
            self.state.blend,
            skin.normal.handle,
            skin.normal.gpu,
            uniforms,
            &model.positions,
            &model.tex_coords,
            &model.normals,
            &model.indices,
        );

        if can_glow {
            if let Some(glow) = skin.glow.as_ref() {
                self.state.set_blended(skin.glow_blend);
                let program = self.shaders.enable(shader);
                program.set_float(Uniform::Glow, skin.min_glow_intensity);
                if step == RenderStep::Glow {
                    program.set_float(Uniform::BloomScale, skin.glow_bloom_scale);
                    program.set_float(Uniform::BloomShift, skin.glow_bloom_shift);
                }
                let uniforms = self.stage_common_uniforms(tangent);
                self.cache.queue_indexed(
                    shader,
                    self.state.blend,
                    glow.handle,
                    glow.gpu,
                    uniforms,
                    &model.positions,
                    &model.tex_coords,
                    &model.normals,
                    &model.indices,
                );
            }
        }

        // Back to the default sidedness for whatever draws next.
        self.state = state_snapshot;
        self.shaders.disable();
        true
    }
}

/// Deterministic flicker color for static-effect lighting; varies with
/// the tick so the light strobes without a RNG in the render path.
pub(crate) fn flicker_color(tick: i32) -> [f32; 4] {
    let hash =
        |n: i32| -> f32 { ((n.wrapping_mul(2654435761u32 as i32) >> 8) & 0xff) as f32 / 255.0 };
    [hash(tick), hash(tick + 7), hash(tick + 13), 1.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flicker_color_deterministic_and_bounded() {
        for tick in 0..256 {
            let a = flicker_color(tick);
            let b = flicker_color(tick);
            assert_eq!(a, b);
            for c in a {
                assert!((0.0..=1.0).contains(&c));
            }
        }
    }
}
