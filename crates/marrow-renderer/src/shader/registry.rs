//! Shader program registry.
//!
//! A fixed enumeration of shader variants — a diffuse/bloom pair per
//! geometry kind plus the post-process utilities — each with CPU-staged
//! uniform values. Routines enable a program, stage its uniforms, and
//! the draw cache snapshots the staged block when geometry is queued.

use std::collections::HashMap;

use crate::matrix::{Mat4, MAT4_IDENTITY};
use crate::shader::SurfaceUniforms;
use crate::RenderError;

/// Symbolic shader variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Wall/floor/ceiling surfaces.
    Wall,
    WallBloom,
    /// Walls with tangent-space bump mapping.
    Bump,
    BumpBloom,
    /// Billboarded sprites and weapon overlays.
    Sprite,
    SpriteBloom,
    /// Horizon textures wrapped around the view direction.
    Landscape,
    LandscapeBloom,
    /// Random-noise fill for teleport/failure effects.
    StaticEffect,
    StaticEffectBloom,
    /// Alpha-faded tint for cloaked objects.
    Tinted,
    TintedBloom,
    /// Textured screen-space rectangles (blitter, overlays).
    Rect,
    /// Separable blur filter pass.
    Blur,
    /// Additive bloom composite pass.
    Bloom,
}

impl ShaderKind {
    /// The glow-pass counterpart of a diffuse shader. Utility shaders
    /// have no bloom variant and return themselves.
    pub fn bloom_variant(self) -> ShaderKind {
        match self {
            ShaderKind::Wall => ShaderKind::WallBloom,
            ShaderKind::Bump => ShaderKind::BumpBloom,
            ShaderKind::Sprite => ShaderKind::SpriteBloom,
            ShaderKind::Landscape => ShaderKind::LandscapeBloom,
            ShaderKind::StaticEffect => ShaderKind::StaticEffectBloom,
            ShaderKind::Tinted => ShaderKind::TintedBloom,
            other => other,
        }
    }
}

/// Scalar uniform slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Uniform {
    Time,
    Flare,
    SelfLuminosity,
    Wobble,
    Pulsate,
    Depth,
    Glow,
    BloomScale,
    BloomShift,
    Visibility,
    UseStatic,
    UseFog,
    Yaw,
    Pitch,
    ScaleX,
    ScaleY,
    OffsetX,
    OffsetY,
    Pass,
    StrictDepthMode,
    LogicalWidth,
    LogicalHeight,
    PixelWidth,
    PixelHeight,
}

const SCALAR_COUNT: usize = Uniform::PixelHeight as usize + 1;

/// vec4 uniform slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vec4Uniform {
    Color,
    FogColor,
    ClipPlane0,
    ClipPlane1,
    ClipPlane5,
    MediaPlane,
    TexCoords4,
}

const VEC4_COUNT: usize = Vec4Uniform::TexCoords4 as usize + 1;

/// mat4 uniform slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixUniform {
    ModelView,
    ModelViewProjection,
    ModelViewInverse,
    Texture,
}

const MATRIX_COUNT: usize = MatrixUniform::Texture as usize + 1;

/// One compiled-source shader variant with its staged uniform values.
pub struct ShaderProgram {
    kind: ShaderKind,
    vertex_source: &'static str,
    fragment_source: &'static str,
    floats: [f32; SCALAR_COUNT],
    vec4s: [[f32; 4]; VEC4_COUNT],
    matrices: [Mat4; MATRIX_COUNT],
    /// Blur pass count carried by the bloom shader; negative = unset.
    passes: i32,
}

impl ShaderProgram {
    fn from_source(
        kind: ShaderKind,
        vertex_source: &'static str,
        fragment_source: &'static str,
    ) -> Result<Self, RenderError> {
        if vertex_source.is_empty() || fragment_source.is_empty() {
            return Err(RenderError::ShaderCompilation(format!(
                "empty source for {:?}",
                kind
            )));
        }
        let mut floats = [0.0f32; SCALAR_COUNT];
        floats[Uniform::SelfLuminosity as usize] = 1.0;
        floats[Uniform::Visibility as usize] = 1.0;
        floats[Uniform::ScaleX as usize] = 1.0;
        floats[Uniform::ScaleY as usize] = 1.0;
        Ok(Self {
            kind,
            vertex_source,
            fragment_source,
            floats,
            vec4s: [[0.0; 4]; VEC4_COUNT],
            matrices: [MAT4_IDENTITY; MATRIX_COUNT],
            passes: -1,
        })
    }

    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    pub fn vertex_source(&self) -> &'static str {
        self.vertex_source
    }

    pub fn fragment_source(&self) -> &'static str {
        self.fragment_source
    }

    pub fn set_float(&mut self, u: Uniform, value: f32) {
        self.floats[u as usize] = value;
    }

    pub fn float(&self, u: Uniform) -> f32 {
        self.floats[u as usize]
    }

    pub fn set_vec4(&mut self, u: Vec4Uniform, value: [f32; 4]) {
        self.vec4s[u as usize] = value;
    }

    pub fn vec4(&self, u: Vec4Uniform) -> [f32; 4] {
        self.vec4s[u as usize]
    }

    pub fn set_matrix4(&mut self, u: MatrixUniform, value: &Mat4) {
        self.matrices[u as usize] = *value;
    }

    pub fn matrix4(&self, u: MatrixUniform) -> &Mat4 {
        &self.matrices[u as usize]
    }

    /// Blur pass count configured on this shader; negative when unset.
    pub fn passes(&self) -> i32 {
        self.passes
    }

    pub fn set_passes(&mut self, passes: i32) {
        self.passes = passes;
    }

    /// Snapshot the staged uniforms as a buffer-ready block.
    pub fn surface_uniforms(&self) -> SurfaceUniforms {
        SurfaceUniforms {
            modelview: self.matrices[MatrixUniform::ModelView as usize],
            modelview_projection: self.matrices[MatrixUniform::ModelViewProjection as usize],
            modelview_inverse: self.matrices[MatrixUniform::ModelViewInverse as usize],
            texture_matrix: self.matrices[MatrixUniform::Texture as usize],
            color: self.vec4s[Vec4Uniform::Color as usize],
            fog_color: self.vec4s[Vec4Uniform::FogColor as usize],
            clip_plane0: self.vec4s[Vec4Uniform::ClipPlane0 as usize],
            clip_plane1: self.vec4s[Vec4Uniform::ClipPlane1 as usize],
            clip_plane5: self.vec4s[Vec4Uniform::ClipPlane5 as usize],
            media_plane: self.vec4s[Vec4Uniform::MediaPlane as usize],
            tangent: self.vec4s[Vec4Uniform::TexCoords4 as usize],
            flare: self.float(Uniform::Flare),
            self_luminosity: self.float(Uniform::SelfLuminosity),
            wobble: self.float(Uniform::Wobble),
            pulsate: self.float(Uniform::Pulsate),
            depth: self.float(Uniform::Depth),
            glow: self.float(Uniform::Glow),
            bloom_scale: self.float(Uniform::BloomScale),
            bloom_shift: self.float(Uniform::BloomShift),
            visibility: self.float(Uniform::Visibility),
            strict_depth: self.float(Uniform::StrictDepthMode),
            scale_x: self.float(Uniform::ScaleX),
            scale_y: self.float(Uniform::ScaleY),
            offset_x: self.float(Uniform::OffsetX),
            offset_y: self.float(Uniform::OffsetY),
            time: self.float(Uniform::Time),
            use_static: self.float(Uniform::UseStatic),
            use_fog: self.float(Uniform::UseFog),
            yaw: self.float(Uniform::Yaw),
            pitch: self.float(Uniform::Pitch),
            _pad: 0.0,
        }
    }
}

/// All shader programs, plus which one is currently enabled.
pub struct ShaderRegistry {
    programs: HashMap<ShaderKind, ShaderProgram>,
    current: Option<ShaderKind>,
}

impl ShaderRegistry {
    /// Build the registry with every variant loaded.
    pub fn new() -> Result<Self, RenderError> {
        let mut registry = Self {
            programs: HashMap::new(),
            current: None,
        };
        registry.load_all()?;
        Ok(registry)
    }

    fn load_all(&mut self) -> Result<(), RenderError> {
        use ShaderKind::*;

        self.insert(Wall, WALL_VERT, WALL_FRAG)?;
        self.insert(WallBloom, WALL_VERT, WALL_BLOOM_FRAG)?;
        self.insert(Bump, WALL_VERT, BUMP_FRAG)?;
        // The glow pass flattens bump lighting; the wall bloom shader
        // reads the same vertex layout.
        self.insert(BumpBloom, WALL_VERT, WALL_BLOOM_FRAG)?;

        self.insert(Sprite, SPRITE_VERT, SPRITE_FRAG)?;
        self.insert(SpriteBloom, SPRITE_VERT, SPRITE_BLOOM_FRAG)?;

        self.insert(Landscape, LANDSCAPE_VERT, LANDSCAPE_FRAG)?;
        self.insert(LandscapeBloom, LANDSCAPE_VERT, LANDSCAPE_BLOOM_FRAG)?;

        self.insert(StaticEffect, SPRITE_VERT, STATIC_EFFECT_FRAG)?;
        self.insert(StaticEffectBloom, SPRITE_VERT, STATIC_EFFECT_FRAG)?;
        self.insert(Tinted, SPRITE_VERT, TINTED_FRAG)?;
        self.insert(TintedBloom, SPRITE_VERT, TINTED_FRAG)?;

        self.insert(Rect, RECT_VERT, RECT_FRAG)?;
        self.insert(Blur, BLUR_VERT, BLUR_FRAG)?;
        self.insert(Bloom, BLUR_VERT, BLOOM_FRAG)?;
        Ok(())
    }

    fn insert(
        &mut self,
        kind: ShaderKind,
        vert: &'static str,
        frag: &'static str,
    ) -> Result<(), RenderError> {
        self.programs
            .insert(kind, ShaderProgram::from_source(kind, vert, frag)?);
        Ok(())
    }

    pub fn get(&self, kind: ShaderKind) -> Option<&ShaderProgram> {
        self.programs.get(&kind)
    }

    pub fn get_mut(&mut self, kind: ShaderKind) -> Option<&mut ShaderProgram> {
        self.programs.get_mut(&kind)
    }

    /// Enable a shader for subsequent uniform staging and draws.
    pub fn enable(&mut self, kind: ShaderKind) -> &mut ShaderProgram {
        self.current = Some(kind);
        // Every kind is inserted at construction.
        self.programs.get_mut(&kind).unwrap()
    }

    pub fn disable(&mut self) {
        self.current = None;
    }

    /// The last shader enabled and not yet disabled.
    pub fn current(&self) -> Option<ShaderKind> {
        self.current
    }

    pub fn current_mut(&mut self) -> Option<&mut ShaderProgram> {
        let kind = self.current?;
        self.programs.get_mut(&kind)
    }
}

// ============================================================================
// Shader sources
// ============================================================================

const WALL_VERT: &str = include_str!("../../shaders/wall.vert.glsl");
const WALL_FRAG: &str = include_str!("../../shaders/wall.frag.glsl");
const WALL_BLOOM_FRAG: &str = include_str!("../../shaders/wall_bloom.frag.glsl");
const BUMP_FRAG: &str = include_str!("../../shaders/bump.frag.glsl");
const SPRITE_VERT: &str = include_str!("../../shaders/sprite.vert.glsl");
const SPRITE_FRAG: &str = include_str!("../../shaders/sprite.frag.glsl");
const SPRITE_BLOOM_FRAG: &str = include_str!("../../shaders/sprite_bloom.frag.glsl");
const LANDSCAPE_VERT: &str = include_str!("../../shaders/landscape.vert.glsl");
const LANDSCAPE_FRAG: &str = include_str!("../../shaders/landscape.frag.glsl");
const LANDSCAPE_BLOOM_FRAG: &str = include_str!("../../shaders/landscape_bloom.frag.glsl");
const STATIC_EFFECT_FRAG: &str = include_str!("../../shaders/static_effect.frag.glsl");
const TINTED_FRAG: &str = include_str!("../../shaders/tinted.frag.glsl");
const RECT_VERT: &str = include_str!("../../shaders/rect.vert.glsl");
const RECT_FRAG: &str = include_str!("../../shaders/rect.frag.glsl");
const BLUR_VERT: &str = include_str!("../../shaders/blur.vert.glsl");
const BLUR_FRAG: &str = include_str!("../../shaders/blur.frag.glsl");
const BLOOM_FRAG: &str = include_str!("../../shaders/bloom.frag.glsl");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_all_variants() {
        let registry = ShaderRegistry::new().unwrap();
        for kind in [
            ShaderKind::Wall,
            ShaderKind::WallBloom,
            ShaderKind::Bump,
            ShaderKind::BumpBloom,
            ShaderKind::Sprite,
            ShaderKind::SpriteBloom,
            ShaderKind::Landscape,
            ShaderKind::LandscapeBloom,
            ShaderKind::StaticEffect,
            ShaderKind::StaticEffectBloom,
            ShaderKind::Tinted,
            ShaderKind::TintedBloom,
            ShaderKind::Rect,
            ShaderKind::Blur,
            ShaderKind::Bloom,
        ] {
            assert!(registry.get(kind).is_some(), "missing {:?}", kind);
        }
    }

    #[test]
    fn test_bloom_variant_pairing() {
        assert_eq!(ShaderKind::Wall.bloom_variant(), ShaderKind::WallBloom);
        assert_eq!(ShaderKind::Sprite.bloom_variant(), ShaderKind::SpriteBloom);
        assert_eq!(ShaderKind::Blur.bloom_variant(), ShaderKind::Blur);
    }

    #[test]
    fn test_enable_tracks_current() {
        let mut registry = ShaderRegistry::new().unwrap();
        assert!(registry.current().is_none());
        registry.enable(ShaderKind::Wall);
        assert_eq!(registry.current(), Some(ShaderKind::Wall));
        registry.disable();
        assert!(registry.current().is_none());
    }

    #[test]
    fn test_uniform_staging_roundtrip() {
        let mut registry = ShaderRegistry::new().unwrap();
        let s = registry.enable(ShaderKind::Sprite);
        s.set_float(Uniform::Flare, 0.25);
        s.set_vec4(Vec4Uniform::Color, [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(s.float(Uniform::Flare), 0.25);
        let block = s.surface_uniforms();
        assert_eq!(block.flare, 0.25);
        assert_eq!(block.color, [0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn test_passes_default_unset() {
        let registry = ShaderRegistry::new().unwrap();
        assert!(registry.get(ShaderKind::Bloom).unwrap().passes() < 0);
    }
}
