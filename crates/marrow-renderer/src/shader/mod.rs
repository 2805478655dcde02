//! Shader registry and uniform staging.

mod pipeline;
mod registry;
mod uniforms;

pub use pipeline::{GraphicsPipeline, PipelineManager, PipelineVariant};
pub use registry::{ShaderKind, ShaderProgram, ShaderRegistry, Uniform, Vec4Uniform, MatrixUniform};
pub use uniforms::{FrameUniforms, SurfaceUniforms};
