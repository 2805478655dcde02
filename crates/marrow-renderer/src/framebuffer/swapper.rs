//! Double-buffered offscreen target.
//!
//! Two equally-sized render targets; exactly one is "current" at any
//! time. `current` holds the last completed contents and is what gets
//! sampled; `draw_target` is where the next round of drawing lands.
//! `swap` promotes the draw target to current. A filter step draws the
//! current contents into the draw target through a fullscreen pipeline
//! and swaps, so repeated filters ping-pong between the two.

use ash::vk;

use crate::gpu;
use crate::shader::GraphicsPipeline;

use super::RenderTarget;

pub struct FramebufferSwapper {
    targets: [RenderTarget; 2],
    current: usize,
    filter_ops: usize,
}

impl FramebufferSwapper {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            targets: [RenderTarget::new(width, height), RenderTarget::new(width, height)],
            current: 0,
            filter_ops: 0,
        }
    }

    pub fn width(&self) -> u32 {
        self.targets[0].width()
    }

    pub fn height(&self) -> u32 {
        self.targets[0].height()
    }

    /// Last completed contents; the sampling source.
    pub fn current(&self) -> &RenderTarget {
        &self.targets[self.current]
    }

    /// Where the next round of drawing lands.
    pub fn draw_target(&self) -> &RenderTarget {
        &self.targets[1 - self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Number of filter/composite passes executed since creation.
    pub fn filter_ops(&self) -> usize {
        self.filter_ops
    }

    /// Clear the draw target, ready to accumulate a new layer.
    pub fn activate(&mut self) {
        run_fullscreen_pass(self.draw_target(), None, None, true);
    }

    /// Promote the draw target to current.
    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Draw the current contents into the draw target through
    /// `pipeline`, then promote the result.
    pub fn filter(&mut self, pipeline: Option<&GraphicsPipeline>) {
        let (src, dst) = (&self.targets[self.current], &self.targets[1 - self.current]);
        run_fullscreen_pass(dst, Some(src), pipeline, true);
        self.swap();
        self.filter_ops += 1;
    }

    /// Composite another swapper's current contents onto this one's
    /// draw target, without swapping. Blending comes baked into the
    /// pipeline (additive for the bloom composite).
    pub fn blend_from(&mut self, src: &FramebufferSwapper, pipeline: Option<&GraphicsPipeline>) {
        run_fullscreen_pass(self.draw_target(), Some(src.current()), pipeline, false);
        self.filter_ops += 1;
    }
}

/// Record and submit one fullscreen triangle pass. Degrades to a no-op
/// without a device, a source view, or a pipeline (clears still run so
/// `activate` works with a device but no shaders).
fn run_fullscreen_pass(
    dst: &RenderTarget,
    src: Option<&RenderTarget>,
    pipeline: Option<&GraphicsPipeline>,
    clear: bool,
) {
    let dst_view = match dst.color_view() {
        Some(v) => v,
        None => return,
    };
    let (width, height) = (dst.width(), dst.height());

    gpu::with_device(|ctx| {
        // SAFETY: main thread, valid context; images were created from it.
        unsafe {
            let cmd = match ctx.begin_single_time() {
                Some(c) => c,
                None => return,
            };

            if let Some(src) = src {
                if let Some(image) = src.color_image() {
                    gpu::transition_image(
                        ctx,
                        cmd,
                        image,
                        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    );
                }
            }
            if let Some(image) = dst.color_image() {
                gpu::transition_image(
                    ctx,
                    cmd,
                    image,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                );
            }

            let load_op = if clear {
                vk::AttachmentLoadOp::CLEAR
            } else {
                vk::AttachmentLoadOp::LOAD
            };
            let color_attachment = vk::RenderingAttachmentInfo::default()
                .image_view(dst_view)
                .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .load_op(load_op)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: [0.0, 0.0, 0.0, 1.0],
                    },
                });
            let color_attachments = [color_attachment];
            let rendering_info = vk::RenderingInfo::default()
                .render_area(vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: vk::Extent2D { width, height },
                })
                .layer_count(1)
                .color_attachments(&color_attachments);

            ctx.device.cmd_begin_rendering(cmd, &rendering_info);

            if let Some(p) = pipeline {
                ctx.device
                    .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, p.pipeline);
                let viewport = vk::Viewport {
                    x: 0.0,
                    y: 0.0,
                    width: width as f32,
                    height: height as f32,
                    min_depth: 0.0,
                    max_depth: 1.0,
                };
                ctx.device.cmd_set_viewport(cmd, 0, &[viewport]);
                let scissor = vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: vk::Extent2D { width, height },
                };
                ctx.device.cmd_set_scissor(cmd, 0, &[scissor]);
                ctx.device.cmd_draw(cmd, 3, 1, 0, 0);
            }

            ctx.device.cmd_end_rendering(cmd);
            ctx.end_single_time(cmd);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_current_after_swaps() {
        let mut swapper = FramebufferSwapper::new(64, 64);
        assert_eq!(swapper.current_index(), 0);
        swapper.swap();
        assert_eq!(swapper.current_index(), 1);
        swapper.swap();
        assert_eq!(swapper.current_index(), 0);
    }

    #[test]
    fn test_filter_toggles_current_and_counts() {
        let mut swapper = FramebufferSwapper::new(64, 64);
        swapper.filter(None);
        assert_eq!(swapper.current_index(), 1);
        assert_eq!(swapper.filter_ops(), 1);
        swapper.filter(None);
        assert_eq!(swapper.current_index(), 0);
        assert_eq!(swapper.filter_ops(), 2);
    }

    #[test]
    fn test_blend_from_does_not_swap() {
        let mut dest = FramebufferSwapper::new(64, 64);
        let src = FramebufferSwapper::new(64, 64);
        dest.blend_from(&src, None);
        assert_eq!(dest.current_index(), 0);
        assert_eq!(dest.filter_ops(), 1);
    }
}
