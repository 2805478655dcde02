//! Graphics pipeline management.
//!
//! Blend/depth/cull state is baked into pipelines at creation time;
//! draw routines express dynamic state as a [`PipelineVariant`] and the
//! manager hands back the matching baked pipeline. SPIR-V arrives from
//! the platform layer at startup — a shader with no attached bytecode
//! simply has no pipelines, and every draw that needs one skips.

use std::collections::HashMap;

use ash::vk;

use marrow_common::shapes::BlendType;

use crate::gpu;
use crate::shader::ShaderKind;

/// Pre-defined pipeline state variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineVariant {
    /// Depth test on, depth write on, cull back, no blend.
    Opaque,
    /// Depth test on, depth write off, no cull, src_alpha / 1-src_alpha.
    AlphaBlend,
    /// Depth test on, depth write off, no cull, src_alpha / one.
    Additive,
    /// One / 1-src_alpha, for premultiplied sources.
    PremultBlend,
    /// One / one.
    PremultAdditive,
    /// Depth off, alpha blend. For 2D overlays.
    Ui,
    /// Depth off, no blend. For fullscreen filter passes.
    PostProcess,
}

impl PipelineVariant {
    /// The variant a surface draw runs under for a given blend mode.
    pub fn for_blend(blend: Option<BlendType>) -> Self {
        match blend {
            None => PipelineVariant::Opaque,
            Some(BlendType::Crossfade) => PipelineVariant::AlphaBlend,
            Some(BlendType::Add) => PipelineVariant::Additive,
            Some(BlendType::CrossfadePremult) => PipelineVariant::PremultBlend,
            Some(BlendType::AddPremult) => PipelineVariant::PremultAdditive,
        }
    }

    fn blend_attachment(self) -> vk::PipelineColorBlendAttachmentState {
        use vk::BlendFactor as F;
        let (enable, src, dst) = match self {
            PipelineVariant::Opaque => (false, F::ONE, F::ZERO),
            PipelineVariant::AlphaBlend | PipelineVariant::Ui => {
                (true, F::SRC_ALPHA, F::ONE_MINUS_SRC_ALPHA)
            }
            PipelineVariant::Additive => (true, F::SRC_ALPHA, F::ONE),
            PipelineVariant::PremultBlend => (true, F::ONE, F::ONE_MINUS_SRC_ALPHA),
            PipelineVariant::PremultAdditive => (true, F::ONE, F::ONE),
            PipelineVariant::PostProcess => (false, F::ONE, F::ZERO),
        };
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(enable)
            .src_color_blend_factor(src)
            .dst_color_blend_factor(dst)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(F::ONE)
            .dst_alpha_blend_factor(F::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
    }

    fn depth_test(self) -> bool {
        !matches!(self, PipelineVariant::Ui | PipelineVariant::PostProcess)
    }

    fn depth_write(self) -> bool {
        self == PipelineVariant::Opaque
    }

    fn cull(self) -> vk::CullModeFlags {
        if self == PipelineVariant::Opaque {
            vk::CullModeFlags::BACK
        } else {
            vk::CullModeFlags::NONE
        }
    }
}

/// A baked pipeline and its layout.
pub struct GraphicsPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

struct ShaderModules {
    vert: vk::ShaderModule,
    frag: vk::ShaderModule,
}

/// Creates and caches one pipeline per (shader, variant) pair.
pub struct PipelineManager {
    modules: HashMap<ShaderKind, ShaderModules>,
    pipelines: HashMap<(ShaderKind, PipelineVariant), GraphicsPipeline>,
    descriptor_set_layout: Option<vk::DescriptorSetLayout>,
    pipeline_layout: Option<vk::PipelineLayout>,
    color_format: vk::Format,
}

impl Default for PipelineManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineManager {
    pub fn new() -> Self {
        Self {
            modules: HashMap::new(),
            pipelines: HashMap::new(),
            descriptor_set_layout: None,
            pipeline_layout: None,
            color_format: vk::Format::R8G8B8A8_UNORM,
        }
    }

    /// Attach platform-compiled SPIR-V for one shader kind.
    pub fn attach_spirv(&mut self, kind: ShaderKind, vert: &[u32], frag: &[u32]) -> bool {
        let modules = gpu::with_device(|ctx| {
            // SAFETY: main thread, valid context.
            unsafe {
                let vert_info = vk::ShaderModuleCreateInfo::default().code(vert);
                let frag_info = vk::ShaderModuleCreateInfo::default().code(frag);
                let vert = ctx.device.create_shader_module(&vert_info, None).ok()?;
                let frag = match ctx.device.create_shader_module(&frag_info, None) {
                    Ok(m) => m,
                    Err(_) => {
                        ctx.device.destroy_shader_module(vert, None);
                        return None;
                    }
                };
                Some(ShaderModules { vert, frag })
            }
        })
        .flatten();
        match modules {
            Some(m) => {
                self.modules.insert(kind, m);
                true
            }
            None => false,
        }
    }

    /// Whether bytecode for a kind has been attached.
    pub fn has_modules(&self, kind: ShaderKind) -> bool {
        self.modules.contains_key(&kind)
    }

    /// Look up (creating on first use) the pipeline for a pair. `None`
    /// when the shader has no bytecode or no device is installed.
    pub fn get_or_create(
        &mut self,
        kind: ShaderKind,
        variant: PipelineVariant,
    ) -> Option<&GraphicsPipeline> {
        if !self.pipelines.contains_key(&(kind, variant)) {
            let pipeline = self.create_pipeline(kind, variant)?;
            self.pipelines.insert((kind, variant), pipeline);
        }
        self.pipelines.get(&(kind, variant))
    }

    pub fn get(&self, kind: ShaderKind, variant: PipelineVariant) -> Option<&GraphicsPipeline> {
        self.pipelines.get(&(kind, variant))
    }

    /// The shared per-draw descriptor set layout, once any pipeline has
    /// been created.
    pub fn descriptor_set_layout(&self) -> Option<vk::DescriptorSetLayout> {
        self.descriptor_set_layout
    }

    fn ensure_layout(&mut self) -> Option<vk::PipelineLayout> {
        if let Some(layout) = self.pipeline_layout {
            return Some(layout);
        }
        let created = gpu::with_device(|ctx| {
            // SAFETY: main thread, valid context.
            unsafe {
                let bindings = [
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(0)
                        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                        .descriptor_count(1)
                        .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT),
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(1)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .descriptor_count(1)
                        .stage_flags(vk::ShaderStageFlags::FRAGMENT),
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(2)
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .descriptor_count(1)
                        .stage_flags(vk::ShaderStageFlags::FRAGMENT),
                ];
                let set_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
                let set_layout = ctx.device.create_descriptor_set_layout(&set_info, None).ok()?;
                let set_layouts = [set_layout];
                let layout_info =
                    vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
                let layout = match ctx.device.create_pipeline_layout(&layout_info, None) {
                    Ok(l) => l,
                    Err(_) => {
                        ctx.device.destroy_descriptor_set_layout(set_layout, None);
                        return None;
                    }
                };
                Some((set_layout, layout))
            }
        })
        .flatten()?;
        self.descriptor_set_layout = Some(created.0);
        self.pipeline_layout = Some(created.1);
        Some(created.1)
    }

    fn create_pipeline(
        &mut self,
        kind: ShaderKind,
        variant: PipelineVariant,
    ) -> Option<GraphicsPipeline> {
        let layout = self.ensure_layout()?;
        let modules = self.modules.get(&kind)?;
        let (vert, frag) = (modules.vert, modules.frag);
        let color_format = self.color_format;

        gpu::with_device(|ctx| {
            // SAFETY: main thread, valid context.
            unsafe {
                let entry = c"main";
                let stages = [
                    vk::PipelineShaderStageCreateInfo::default()
                        .stage(vk::ShaderStageFlags::VERTEX)
                        .module(vert)
                        .name(entry),
                    vk::PipelineShaderStageCreateInfo::default()
                        .stage(vk::ShaderStageFlags::FRAGMENT)
                        .module(frag)
                        .name(entry),
                ];

                let binding_descs = [vk::VertexInputBindingDescription::default()
                    .binding(0)
                    .stride(crate::geometry::SurfaceVertex::SIZE as u32)
                    .input_rate(vk::VertexInputRate::VERTEX)];
                let attr_descs = [
                    vk::VertexInputAttributeDescription::default()
                        .location(0)
                        .format(vk::Format::R32G32B32_SFLOAT)
                        .offset(0),
                    vk::VertexInputAttributeDescription::default()
                        .location(1)
                        .format(vk::Format::R32G32_SFLOAT)
                        .offset(12),
                    vk::VertexInputAttributeDescription::default()
                        .location(2)
                        .format(vk::Format::R32G32B32_SFLOAT)
                        .offset(20),
                ];
                let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
                    .vertex_binding_descriptions(&binding_descs)
                    .vertex_attribute_descriptions(&attr_descs);

                let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
                    .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

                let viewport_state = vk::PipelineViewportStateCreateInfo::default()
                    .viewport_count(1)
                    .scissor_count(1);

                let raster = vk::PipelineRasterizationStateCreateInfo::default()
                    .polygon_mode(vk::PolygonMode::FILL)
                    .cull_mode(variant.cull())
                    .front_face(vk::FrontFace::CLOCKWISE)
                    .line_width(1.0);

                let multisample = vk::PipelineMultisampleStateCreateInfo::default()
                    .rasterization_samples(vk::SampleCountFlags::TYPE_1);

                let depth = vk::PipelineDepthStencilStateCreateInfo::default()
                    .depth_test_enable(variant.depth_test())
                    .depth_write_enable(variant.depth_write())
                    .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL);

                let attachments = [variant.blend_attachment()];
                let blend = vk::PipelineColorBlendStateCreateInfo::default()
                    .attachments(&attachments);

                let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
                let dynamic =
                    vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

                let color_formats = [color_format];
                let mut rendering =
                    vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);

                let info = vk::GraphicsPipelineCreateInfo::default()
                    .stages(&stages)
                    .vertex_input_state(&vertex_input)
                    .input_assembly_state(&input_assembly)
                    .viewport_state(&viewport_state)
                    .rasterization_state(&raster)
                    .multisample_state(&multisample)
                    .depth_stencil_state(&depth)
                    .color_blend_state(&blend)
                    .dynamic_state(&dynamic)
                    .layout(layout)
                    .push_next(&mut rendering);

                ctx.device
                    .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
                    .ok()
                    .map(|pipelines| GraphicsPipeline {
                        pipeline: pipelines[0],
                        layout,
                    })
            }
        })
        .flatten()
    }

    pub fn shutdown(&mut self) {
        gpu::with_device(|ctx| {
            // SAFETY: main thread; all objects came from this device.
            unsafe {
                for (_, p) in self.pipelines.drain() {
                    ctx.device.destroy_pipeline(p.pipeline, None);
                }
                for (_, m) in self.modules.drain() {
                    ctx.device.destroy_shader_module(m.vert, None);
                    ctx.device.destroy_shader_module(m.frag, None);
                }
                if let Some(l) = self.pipeline_layout.take() {
                    ctx.device.destroy_pipeline_layout(l, None);
                }
                if let Some(l) = self.descriptor_set_layout.take() {
                    ctx.device.destroy_descriptor_set_layout(l, None);
                }
            }
        });
        self.pipelines.clear();
        self.modules.clear();
    }
}

impl Drop for PipelineManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_for_blend() {
        assert_eq!(PipelineVariant::for_blend(None), PipelineVariant::Opaque);
        assert_eq!(
            PipelineVariant::for_blend(Some(BlendType::Crossfade)),
            PipelineVariant::AlphaBlend
        );
        assert_eq!(
            PipelineVariant::for_blend(Some(BlendType::Add)),
            PipelineVariant::Additive
        );
        assert_eq!(
            PipelineVariant::for_blend(Some(BlendType::AddPremult)),
            PipelineVariant::PremultAdditive
        );
    }

    #[test]
    fn test_no_device_means_no_pipelines() {
        let mut manager = PipelineManager::new();
        assert!(!manager.attach_spirv(ShaderKind::Wall, &[0x0723_0203], &[0x0723_0203]));
        assert!(!manager.has_modules(ShaderKind::Wall));
        assert!(manager
            .get_or_create(ShaderKind::Wall, PipelineVariant::Opaque)
            .is_none());
    }

    #[test]
    fn test_opaque_writes_depth_others_do_not() {
        assert!(PipelineVariant::Opaque.depth_write());
        assert!(!PipelineVariant::AlphaBlend.depth_write());
        assert!(!PipelineVariant::Ui.depth_test());
    }
}
