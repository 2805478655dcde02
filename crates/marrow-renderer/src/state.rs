//! Dynamic render state and scoped restoration.
//!
//! Blend, alpha-test, depth, cull, fog, and texture sampling state as a
//! plain value. A [`StateGuard`] snapshots the value and writes it back
//! on drop, so every exit path of a draw routine restores the state it
//! entered with.

use std::ops::{Deref, DerefMut};

use marrow_common::shapes::BlendType;

/// Texture minification/magnification filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilter {
    /// Plain linear, for non-mipmapped landscapes.
    Linear,
    LinearMipmap,
    /// Classic-visuals point sampling.
    NearestMipmap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    Repeat,
    MirroredRepeat,
    ClampToEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winding {
    Clockwise,
    CounterClockwise,
}

/// The dynamic state a draw call runs under.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    /// Blend function; `None` draws opaque.
    pub blend: Option<BlendType>,
    /// Alpha-test threshold (fragments at or below are discarded).
    pub alpha_threshold: f32,
    pub depth_test: bool,
    pub depth_write: bool,
    pub cull_face: bool,
    pub front_face: Winding,
    pub fog: bool,
    pub texture_2d: bool,
    pub filter: TextureFilter,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            blend: None,
            alpha_threshold: 0.5,
            depth_test: true,
            depth_write: true,
            cull_face: true,
            front_face: Winding::Clockwise,
            fog: false,
            texture_2d: true,
            filter: TextureFilter::LinearMipmap,
            wrap_s: WrapMode::Repeat,
            wrap_t: WrapMode::Repeat,
        }
    }
}

impl RenderState {
    /// Snapshot the current state and restore it when the guard drops.
    pub fn guard(&mut self) -> StateGuard<'_> {
        let saved = *self;
        StateGuard { state: self, saved }
    }

    /// Blended draw with the soft alpha threshold the glow paths use.
    pub fn set_blended(&mut self, blend: BlendType) {
        self.blend = Some(blend);
        self.alpha_threshold = 0.001;
    }

    /// Opaque draw with the hard alpha cutout.
    pub fn set_opaque(&mut self) {
        self.blend = None;
        self.alpha_threshold = 0.5;
    }
}

/// Restores a [`RenderState`] snapshot on drop.
pub struct StateGuard<'a> {
    state: &'a mut RenderState,
    saved: RenderState,
}

impl Deref for StateGuard<'_> {
    type Target = RenderState;
    fn deref(&self) -> &RenderState {
        self.state
    }
}

impl DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut RenderState {
        self.state
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        *self.state = self.saved;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_restores_on_drop() {
        let mut state = RenderState::default();
        let original = state;
        {
            let mut g = state.guard();
            g.set_blended(BlendType::Add);
            g.depth_test = false;
            g.fog = true;
            g.filter = TextureFilter::NearestMipmap;
            assert_ne!(*g, original);
        }
        assert_eq!(state, original);
    }

    #[test]
    fn test_guard_restores_on_early_return() {
        fn draws_then_bails(state: &mut RenderState) -> Option<()> {
            let mut g = state.guard();
            g.cull_face = false;
            g.wrap_s = WrapMode::ClampToEdge;
            None?;
            Some(())
        }
        let mut state = RenderState::default();
        let original = state;
        assert!(draws_then_bails(&mut state).is_none());
        assert_eq!(state, original);
    }

    #[test]
    fn test_nested_guards_restore_in_order() {
        let mut state = RenderState::default();
        let original = state;
        {
            let mut outer = state.guard();
            outer.depth_test = false;
            let mid = *outer;
            {
                let mut inner = outer.guard();
                inner.fog = true;
            }
            assert_eq!(*outer, mid);
        }
        assert_eq!(state, original);
    }

    #[test]
    fn test_blend_presets() {
        let mut state = RenderState::default();
        state.set_blended(BlendType::Crossfade);
        assert_eq!(state.blend, Some(BlendType::Crossfade));
        assert_eq!(state.alpha_threshold, 0.001);
        state.set_opaque();
        assert_eq!(state.blend, None);
        assert_eq!(state.alpha_threshold, 0.5);
    }
}
