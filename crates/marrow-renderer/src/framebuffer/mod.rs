//! Offscreen render targets and the bloom post-process.

mod bloom;
mod render_target;
mod swapper;

pub use bloom::{BloomBlur, DEFAULT_BLOOM_PASSES};
pub use render_target::RenderTarget;
pub use swapper::FramebufferSwapper;
