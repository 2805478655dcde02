//! Texture resolution boundary and per-draw bindings.
//!
//! The asset subsystem owns shapes, shading tables, and GPU images; the
//! renderer reaches it through [`TextureSource`]. What a draw routine
//! holds is a [`TextureBinding`]: one surface's resolved texture plus
//! the transfer/blend/bloom metadata needed to draw it, built fresh per
//! draw call and thrown away afterwards.

use marrow_common::shapes::{
    BlendType, ShadingMode, ShapeDescriptor, TextureTransfer, TransferMode,
};
use marrow_common::world::{Angle, Fixed};

use crate::gpu::GpuTexture;

/// Stable identity for a resolved texture, used as a batching key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureHandle(pub u64);

/// Which texture table a shape resolves through. Decides wrap/filter
/// defaults and which shader family draws it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureCategory {
    #[default]
    Wall,
    Landscape,
    Inhabitant,
    WeaponInHand,
}

/// Glow-map metadata attached to a resolved texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlowMap {
    pub handle: TextureHandle,
    pub gpu: Option<GpuTextureRef>,
    pub blend: BlendType,
    pub bloom_scale: f32,
    pub bloom_shift: f32,
    /// Glow shows through even in darkness down to this intensity.
    pub min_intensity: f32,
}

/// Copyable view of a GPU texture for binding at flush time.
#[derive(Clone, Copy)]
pub struct GpuTextureRef(pub GpuTexture);

impl std::fmt::Debug for GpuTextureRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("GpuTextureRef")
    }
}

impl PartialEq for GpuTextureRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.image == other.0.image
    }
}

/// What the asset subsystem hands back for one shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedTexture {
    pub handle: TextureHandle,
    pub gpu: Option<GpuTextureRef>,
    pub width: u32,
    pub height: u32,
    /// Texture-space scale/offset of the shape within its sheet.
    pub u_scale: f32,
    pub u_offset: f32,
    pub v_scale: f32,
    pub v_offset: f32,
    pub is_blended: bool,
    pub normal_blend: BlendType,
    pub bloom_scale: f32,
    pub bloom_shift: f32,
    /// Landscape surfaces use a flat bloom level instead of scale/shift.
    pub landscape_bloom: f32,
    pub glow: Option<GlowMap>,
}

impl Default for ResolvedTexture {
    fn default() -> Self {
        Self {
            handle: TextureHandle(0),
            gpu: None,
            width: 0,
            height: 0,
            u_scale: 1.0,
            u_offset: 0.0,
            v_scale: 1.0,
            v_offset: 0.0,
            is_blended: false,
            normal_blend: BlendType::Crossfade,
            bloom_scale: 0.0,
            bloom_shift: 0.0,
            landscape_bloom: 0.0,
            glow: None,
        }
    }
}

/// Horizon-texture presentation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LandscapeOptions {
    /// log2 horizontal repeats around a full turn.
    pub horiz_exp: i16,
    pub vert_exp: i16,
    pub vert_repeat: i16,
    /// Aspect-ratio correction exponent.
    pub asp_rat_exp: i16,
    /// Rotation of the landscape around the vertical axis.
    pub azimuth: Angle,
}

/// The renderer's window into the asset subsystem.
pub trait TextureSource {
    /// Resolve a shape into a bound texture. `None` means "don't draw
    /// this frame's instance of this surface".
    fn resolve(
        &mut self,
        shape: ShapeDescriptor,
        category: TextureCategory,
        shading: ShadingMode,
    ) -> Option<ResolvedTexture>;

    /// Substitute the current animation frame for an animated texture.
    fn translate_animated(&self, shape: ShapeDescriptor) -> ShapeDescriptor;

    /// Current intensity of a light source, in fixed point.
    fn light_intensity(&self, lightsource_index: usize) -> Fixed;

    fn landscape_options(&self, shape: ShapeDescriptor) -> LandscapeOptions;
}

/// One surface's resolved draw inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureBinding {
    pub shape: ShapeDescriptor,
    pub category: TextureCategory,
    pub transfer: TextureTransfer,
    pub transfer_data: i32,
    pub shadeless: bool,
    pub resolved: ResolvedTexture,
    pub landscape: Option<LandscapeOptions>,
}

impl TextureBinding {
    pub fn is_blended(&self) -> bool {
        self.resolved.is_blended
    }

    pub fn is_glow_mapped(&self) -> bool {
        self.resolved.glow.is_some()
    }

    pub fn normal_blend(&self) -> BlendType {
        self.resolved.normal_blend
    }
}

/// Map a surface transfer mode onto the texture family it samples as.
pub fn texture_transfer_for(mode: TransferMode) -> TextureTransfer {
    match mode {
        TransferMode::Static => TextureTransfer::StaticEffect,
        TransferMode::Tinted => TextureTransfer::Tinted,
        TransferMode::Solid => TextureTransfer::Solid,
        TransferMode::Landscape | TransferMode::BigLandscape => TextureTransfer::Landscape,
        _ => TextureTransfer::Textured,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_mapping() {
        assert_eq!(
            texture_transfer_for(TransferMode::Static),
            TextureTransfer::StaticEffect
        );
        assert_eq!(
            texture_transfer_for(TransferMode::Landscape),
            TextureTransfer::Landscape
        );
        assert_eq!(
            texture_transfer_for(TransferMode::Wobble),
            TextureTransfer::Textured
        );
        assert_eq!(
            texture_transfer_for(TransferMode::Normal),
            TextureTransfer::Textured
        );
    }

    #[test]
    fn test_binding_glow_detection() {
        let mut binding = TextureBinding {
            shape: ShapeDescriptor::new(1, 0, 4),
            category: TextureCategory::Wall,
            transfer: TextureTransfer::Textured,
            transfer_data: 0,
            shadeless: false,
            resolved: ResolvedTexture::default(),
            landscape: None,
        };
        assert!(!binding.is_glow_mapped());
        binding.resolved.glow = Some(GlowMap {
            handle: TextureHandle(9),
            gpu: None,
            blend: BlendType::Add,
            bloom_scale: 1.0,
            bloom_shift: 0.0,
            min_intensity: 0.25,
        });
        assert!(binding.is_glow_mapped());
    }
}
