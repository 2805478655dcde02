//! Separable blur + additive bloom composite.
//!
//! Owns the glow accumulation double-buffer. `begin` activates it for
//! the glow render pass; `draw` runs the configured number of
//! horizontal+vertical blur passes and additively composites each round
//! into the destination buffer; `end` swaps. Purely visual: with no
//! device or no shaders, the pass structure still executes and the
//! screen simply keeps the diffuse image.

use crate::matrix::MatrixStack;
use crate::shader::{
    MatrixUniform, PipelineManager, PipelineVariant, ShaderKind, ShaderRegistry, Uniform,
};

use super::FramebufferSwapper;

/// Pass count used when the bloom shader does not carry its own.
pub const DEFAULT_BLOOM_PASSES: i32 = 5;

pub struct BloomBlur {
    swapper: FramebufferSwapper,
    last_pass_count: i32,
}

impl BloomBlur {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            swapper: FramebufferSwapper::new(width, height),
            last_pass_count: 0,
        }
    }

    /// Activate the glow accumulation buffer.
    pub fn begin(&mut self) {
        self.swapper.activate();
    }

    /// Release the accumulation buffer.
    pub fn end(&mut self) {
        self.swapper.swap();
    }

    pub fn swapper(&self) -> &FramebufferSwapper {
        &self.swapper
    }

    /// Number of passes the most recent `draw` executed.
    pub fn last_pass_count(&self) -> i32 {
        self.last_pass_count
    }

    /// Blur the accumulated glow and composite it into `dest`.
    ///
    /// Each pass: horizontal blur, vertical blur (both re-staging the
    /// offset/pass uniforms), then an additive composite of the current
    /// contents. Returns the number of passes executed.
    pub fn draw(
        &mut self,
        shaders: &mut ShaderRegistry,
        pipelines: &mut PipelineManager,
        matrix: &MatrixStack,
        dest: &mut FramebufferSwapper,
    ) -> i32 {
        let mut passes = shaders
            .get(ShaderKind::Bloom)
            .map(|s| s.passes())
            .unwrap_or(-1);
        if passes < 0 {
            passes = DEFAULT_BLOOM_PASSES;
        }

        let model_projection = matrix.modelview_projection();

        for i in 0..passes {
            let pass = (i + 1) as f32;

            let blur = shaders.enable(ShaderKind::Blur);
            blur.set_matrix4(MatrixUniform::ModelViewProjection, &model_projection);
            blur.set_float(Uniform::OffsetX, 1.0);
            blur.set_float(Uniform::OffsetY, 0.0);
            blur.set_float(Uniform::Pass, pass);
            let pipeline = pipelines.get_or_create(ShaderKind::Blur, PipelineVariant::PostProcess);
            self.swapper.filter(pipeline);

            let blur = shaders.enable(ShaderKind::Blur);
            blur.set_float(Uniform::OffsetX, 0.0);
            blur.set_float(Uniform::OffsetY, 1.0);
            blur.set_float(Uniform::Pass, pass);
            let pipeline = pipelines.get_or_create(ShaderKind::Blur, PipelineVariant::PostProcess);
            self.swapper.filter(pipeline);

            let bloom = shaders.enable(ShaderKind::Bloom);
            bloom.set_matrix4(MatrixUniform::ModelViewProjection, &model_projection);
            bloom.set_float(Uniform::Pass, pass);
            let pipeline = pipelines.get_or_create(ShaderKind::Bloom, PipelineVariant::Additive);
            dest.blend_from(&self.swapper, pipeline);

            shaders.disable();
        }

        self.last_pass_count = passes;
        passes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn harness() -> (ShaderRegistry, PipelineManager, MatrixStack, FramebufferSwapper) {
        (
            ShaderRegistry::new().unwrap(),
            PipelineManager::new(),
            MatrixStack::new(),
            FramebufferSwapper::new(64, 64),
        )
    }

    #[test]
    fn test_default_pass_count_is_five() {
        let (mut shaders, mut pipelines, matrix, mut dest) = harness();
        let mut bloom = BloomBlur::new(64, 64);
        bloom.begin();
        let passes = bloom.draw(&mut shaders, &mut pipelines, &matrix, &mut dest);
        bloom.end();
        assert_eq!(passes, DEFAULT_BLOOM_PASSES);
        assert_eq!(bloom.last_pass_count(), 5);
        // Two filters per pass on the glow buffer.
        assert_eq!(bloom.swapper().filter_ops(), 10);
        // One composite per pass into the destination.
        assert_eq!(dest.filter_ops(), 5);
    }

    #[test]
    fn test_explicit_pass_count_wins() {
        let (mut shaders, mut pipelines, matrix, mut dest) = harness();
        shaders.get_mut(ShaderKind::Bloom).unwrap().set_passes(3);
        let mut bloom = BloomBlur::new(64, 64);
        bloom.begin();
        let passes = bloom.draw(&mut shaders, &mut pipelines, &matrix, &mut dest);
        assert_eq!(passes, 3);
        assert_eq!(dest.filter_ops(), 3);
    }

    #[test]
    fn test_zero_pass_count_runs_nothing() {
        let (mut shaders, mut pipelines, matrix, mut dest) = harness();
        shaders.get_mut(ShaderKind::Bloom).unwrap().set_passes(0);
        let mut bloom = BloomBlur::new(64, 64);
        let passes = bloom.draw(&mut shaders, &mut pipelines, &matrix, &mut dest);
        assert_eq!(passes, 0);
        assert_eq!(dest.filter_ops(), 0);
    }

    #[test]
    fn test_begin_end_leaves_buffer_swapped() {
        let mut bloom = BloomBlur::new(64, 64);
        let start = bloom.swapper().current_index();
        bloom.begin();
        bloom.end();
        assert_ne!(bloom.swapper().current_index(), start);
    }
}
