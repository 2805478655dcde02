//! Renderer feature flags.
//!
//! Mirrors the engine's graphics preferences; the rasterizer holds one
//! of these for the lifetime of the GL context and reads it per frame.

/// Feature flags controlling optional render paths.
///
/// A disabled flag skips its code path entirely; nothing here can fail
/// at draw time.
#[derive(Debug, Clone, Copy)]
pub struct RendererConfig {
    /// Distance fog on landscape-affecting media.
    pub fog: bool,
    /// Glow pass + separable blur/bloom composite.
    pub bloom: bool,
    /// Tangent-space bump mapping on walls and models.
    pub bump_mapping: bool,
    /// Nearest-neighbor filtering and opaque media, approximating the
    /// software renderer's look.
    pub classic_visuals: bool,
    /// Pad blitter tiles up to 128px for drivers that mishandle small
    /// power-of-two textures.
    pub texture_fix: bool,
    /// Depth-sort sprites strictly, de-fighting stacked objects with a
    /// per-duplicate depth bias.
    pub force_sprite_depth: bool,
    /// Render the static effect as a flat fill instead of noise.
    pub flat_static: bool,
    /// Device supports non-power-of-two texture dimensions.
    pub npot_textures: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            fog: true,
            bloom: true,
            bump_mapping: false,
            classic_visuals: false,
            texture_fix: false,
            force_sprite_depth: false,
            flat_static: false,
            npot_textures: true,
        }
    }
}
