// shapes.rs — shape descriptors and transfer modes shared between the
// asset subsystem and the renderer.

// ============================================================
// Shape descriptors
// ============================================================

/// Packed reference to one frame of one shape in one collection.
///
/// Layout: bits 13..15 select the color lookup table, bits 8..12 the
/// collection, bits 0..7 the shape within the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeDescriptor(pub u16);

pub const MAXIMUM_COLLECTIONS: u16 = 32;
pub const MAXIMUM_SHAPES_PER_COLLECTION: u16 = 256;
pub const MAXIMUM_CLUTS_PER_COLLECTION: u16 = 8;

impl ShapeDescriptor {
    pub fn new(collection: u16, clut: u16, shape: u16) -> Self {
        ShapeDescriptor(
            ((clut % MAXIMUM_CLUTS_PER_COLLECTION) << 13)
                | ((collection % MAXIMUM_COLLECTIONS) << 8)
                | (shape % MAXIMUM_SHAPES_PER_COLLECTION),
        )
    }

    #[inline]
    pub fn collection(self) -> u16 {
        (self.0 >> 8) & (MAXIMUM_COLLECTIONS - 1)
    }

    #[inline]
    pub fn clut(self) -> u16 {
        self.0 >> 13
    }

    #[inline]
    pub fn shape(self) -> u16 {
        self.0 & (MAXIMUM_SHAPES_PER_COLLECTION - 1)
    }
}

// ============================================================
// Transfer modes
// ============================================================

/// Per-surface/per-object texture transfer mode. Decides shader choice,
/// texture animation, and the wobble/pulsate modulation inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransferMode {
    #[default]
    Normal,
    /// Random-noise fill (teleport, failure states). Shadeless.
    Static,
    /// Alpha-faded tint (cloaked objects); fade comes from transfer data.
    Tinted,
    /// Flat solid fill, used as a visual error marker.
    Solid,
    /// Sky/horizon texture wrapped around the view direction.
    Landscape,
    /// Landscape with doubled horizontal repeat.
    BigLandscape,
    HorizontalSlide,
    FastHorizontalSlide,
    VerticalSlide,
    FastVerticalSlide,
    /// Pseudo-random 2d drift built from summed trig taps.
    Wander,
    FastWander,
    /// Triangle-wave vertex displacement along the normal.
    Wobble,
    FastWobble,
    /// Triangle-wave brightness modulation.
    Pulsate,
}

/// What a resolved texture binding actually samples as; derived from the
/// surface transfer mode in the setup routines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureTransfer {
    #[default]
    Textured,
    StaticEffect,
    Tinted,
    Solid,
    Landscape,
}

/// Shading-table family selector for texture resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadingMode {
    #[default]
    Normal,
    Infravision,
}

// ============================================================
// Blend types
// ============================================================

/// Blend function selection carried in texture/skin metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendType {
    /// src_alpha, one_minus_src_alpha
    #[default]
    Crossfade,
    /// src_alpha, one
    Add,
    /// one, one_minus_src_alpha
    CrossfadePremult,
    /// one, one
    AddPremult,
}

/// How a model skin's alpha channel is meant to be rasterized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpacityType {
    /// Hard-edged alpha test.
    #[default]
    Crisp,
    /// Smooth alpha blending.
    Flat,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_descriptor_roundtrip() {
        let d = ShapeDescriptor::new(17, 3, 200);
        assert_eq!(d.collection(), 17);
        assert_eq!(d.clut(), 3);
        assert_eq!(d.shape(), 200);
    }

    #[test]
    fn test_shape_descriptor_wraps_out_of_range() {
        let d = ShapeDescriptor::new(MAXIMUM_COLLECTIONS + 1, 0, 0);
        assert_eq!(d.collection(), 1);
    }

    #[test]
    fn test_transfer_mode_default() {
        assert_eq!(TransferMode::default(), TransferMode::Normal);
        assert_eq!(TextureTransfer::default(), TextureTransfer::Textured);
    }
}
