//! Viewer sprite layer: weapons in hand.
//!
//! A screen-space pass drawn after the world. The caller positions each
//! element (placement depends on player state the renderer never sees);
//! this layer clips, textures, and submits them under an orthographic
//! projection, with the usual glow second pass.

use crate::matrix::{mat4_scaling, mat4_translation, mat4_multiply, Mat4, MatrixMode};
use crate::texture::{TextureCategory, TextureSource};

use super::{RectangleDefinition, RenderStep, ShaderRasterizer, ViewData, ViewerSprite};

impl ShaderRasterizer {
    /// Draw every weapon-in-hand element for this layer.
    pub fn render_viewer_sprite_layer(
        &mut self,
        scene: &mut dyn TextureSource,
        view: &ViewData,
        sprites: &[ViewerSprite],
        step: RenderStep,
    ) {
        if !view.show_weapons_in_hand {
            return;
        }

        let screen_to_clip = screen_to_clip_matrix(view.screen_width, view.screen_height);

        self.scoped_matrix(MatrixMode::Texture, |this| {
            this.scoped_matrix(MatrixMode::Projection, |this| {
                this.matrix.matrix_mode(MatrixMode::Projection);
                this.matrix.load_matrix(&screen_to_clip);
                this.scoped_matrix(MatrixMode::ModelView, |this| {
                    this.matrix.matrix_mode(MatrixMode::ModelView);
                    this.matrix.load_identity();

                    for sprite in sprites {
                        this.render_viewer_sprite(scene, view, sprite, step);
                    }
                });
            });
        });

        self.shaders.disable();
        self.matrix.matrix_mode(MatrixMode::ModelView);
    }

    /// Draw one weapon element, clipped to its window.
    pub(crate) fn render_viewer_sprite(
        &mut self,
        scene: &mut dyn TextureSource,
        view: &ViewData,
        sprite: &ViewerSprite,
        step: RenderStep,
    ) {
        // Clipped corners.
        let left = sprite.x0.max(sprite.clip_left);
        let top = sprite.y0.max(sprite.clip_top);
        let right = sprite.x1.min(sprite.clip_right);
        let bottom = sprite.y1.min(sprite.clip_bottom);

        // Completely clipped away?
        if right <= left || bottom <= top {
            return;
        }

        let rect = RectangleDefinition {
            shape: sprite.shape,
            transfer_mode: sprite.transfer_mode,
            transfer_data: sprite.transfer_data,
            ambient_shade: sprite.ambient_shade,
            flip_horizontal: sprite.flip_horizontal,
            flip_vertical: sprite.flip_vertical,
            ..RectangleDefinition::default()
        };

        let state_snapshot = self.state;
        let setup =
            self.setup_sprite_texture(scene, view, &rect, TextureCategory::WeaponInHand, 0.0, step);
        let (binding, shader) = match setup {
            Some(pair) => pair,
            None => {
                self.state = state_snapshot;
                return;
            }
        };

        // The scanline direction runs down the sprite (u), the
        // line-to-line direction runs rightward (v).
        let resolved = &binding.resolved;
        let u_scale = resolved.u_scale / (sprite.y1 - sprite.y0) as f32;
        let v_scale = resolved.v_scale / (sprite.x1 - sprite.x0) as f32;

        let (u_top, u_bottom) = if sprite.flip_vertical {
            (
                resolved.u_offset + u_scale * (sprite.y1 - top) as f32,
                resolved.u_offset + u_scale * (sprite.y1 - bottom) as f32,
            )
        } else {
            (
                resolved.u_offset + u_scale * (top - sprite.y0) as f32,
                resolved.u_offset + u_scale * (bottom - sprite.y0) as f32,
            )
        };
        let (v_left, v_right) = if sprite.flip_horizontal {
            (
                resolved.v_offset + v_scale * (sprite.x1 - left) as f32,
                resolved.v_offset + v_scale * (sprite.x1 - right) as f32,
            )
        } else {
            (
                resolved.v_offset + v_scale * (left - sprite.x0) as f32,
                resolved.v_offset + v_scale * (right - sprite.x0) as f32,
            )
        };

        if binding.is_blended()
            || binding.transfer == marrow_common::shapes::TextureTransfer::Tinted
        {
            self.state.set_blended(binding.normal_blend());
        } else {
            self.state.set_opaque();
        }
        // Weapons in hand always blend over the world, and sit in the
        // foreground regardless of world depth.
        self.state.depth_test = false;

        // Foreground depth of 1, winding matched to world geometry.
        let positions = [
            [left as f32, top as f32, 1.0],
            [right as f32, top as f32, 1.0],
            [right as f32, bottom as f32, 1.0],
            [left as f32, bottom as f32, 1.0],
        ];
        let tex_coords = [
            [u_top, v_left],
            [u_top, v_right],
            [u_bottom, v_right],
            [u_bottom, v_left],
        ];
        let normal = [0.0, 0.0, 1.0];
        let tangent = [0.0, 1.0, 0.0, 1.0];

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
            self.setup_glow(&binding, 0.0, self.weapon_flare, 0.0, step)
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

        self.state = state_snapshot;
        self.shaders.disable();
        self.restore_texture_matrix();
    }
}

/// Orthographic map from screen pixels (origin top-left, y down) to
/// clip space.
pub(crate) fn screen_to_clip_matrix(width: i32, height: i32) -> Mat4 {
    let scale = mat4_scaling(2.0 / width as f32, -2.0 / height as f32, 1.0);
    let translate = mat4_translation(-1.0, 1.0, 0.0);
    mat4_multiply(&translate, &scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::mat4_transform_point;

    #[test]
    fn test_screen_to_clip_corners() {
        let m = screen_to_clip_matrix(640, 480);
        let tl = mat4_transform_point(&m, [0.0, 0.0, 0.0]);
        assert!((tl[0] + 1.0).abs() < 1e-6);
        assert!((tl[1] - 1.0).abs() < 1e-6);
        let br = mat4_transform_point(&m, [640.0, 480.0, 0.0]);
        assert!((br[0] - 1.0).abs() < 1e-6);
        assert!((br[1] + 1.0).abs() < 1e-6);
        let center = mat4_transform_point(&m, [320.0, 240.0, 0.0]);
        assert!(center[0].abs() < 1e-6 && center[1].abs() < 1e-6);
    }
}
