//! Marrow shader rasterization backend.
//!
//! Walks a visibility-sorted node list and issues textured, lit,
//! fog-aware draw calls through a Vulkan pipeline, with a separable
//! blur/bloom post-process and a tiled 2D blitter for UI compositing.
//!
//! The backend owns all of its render state explicitly: matrix stacks,
//! clip planes, and blend/depth/cull state live in context values that
//! are passed to each routine and restored by scoped guards, never in
//! process globals.

#![allow(clippy::too_many_arguments, clippy::float_cmp)]

pub mod blitter;
pub mod config;
pub mod framebuffer;
pub mod geometry;
pub mod gpu;
pub mod matrix;
pub mod rasterize;
pub mod shader;
pub mod state;
pub mod texture;

pub use config::RendererConfig;
pub use rasterize::ShaderRasterizer;

/// Errors that can occur while setting the renderer up.
///
/// Per-draw failures never surface here; a draw that cannot find its
/// texture or skin simply returns without drawing.
#[derive(Debug)]
pub enum RenderError {
    /// Shader compilation failed.
    ShaderCompilation(String),
    /// Vulkan error.
    Vulkan(String),
    /// Resource not found.
    NotFound(String),
    /// Generic error.
    Other(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::ShaderCompilation(msg) => write!(f, "Shader compilation error: {}", msg),
            RenderError::Vulkan(msg) => write!(f, "Vulkan error: {}", msg),
            RenderError::NotFound(name) => write!(f, "Resource not found: {}", name),
            RenderError::Other(msg) => write!(f, "Render error: {}", msg),
        }
    }
}

impl std::error::Error for RenderError {}
