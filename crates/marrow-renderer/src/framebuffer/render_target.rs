//! Offscreen color render target.
//!
//! A sampled color attachment sized once at creation. GPU resources are
//! created only when a device is installed; the target's dimensions and
//! identity stay valid either way so the pass logic above is unaffected.

use ash::vk;

use crate::gpu::{self, Release};

pub struct RenderTarget {
    color: Option<vk::Image>,
    color_view: Option<vk::ImageView>,
    color_memory: Option<vk::DeviceMemory>,
    sampler: Option<vk::Sampler>,
    width: u32,
    height: u32,
}

impl Default for RenderTarget {
    fn default() -> Self {
        Self {
            color: None,
            color_view: None,
            color_memory: None,
            sampler: None,
            width: 0,
            height: 0,
        }
    }
}

impl RenderTarget {
    pub fn new(width: u32, height: u32) -> Self {
        let mut target = Self::default();
        target.width = width;
        target.height = height;
        target.create_resources();
        target
    }

    fn create_resources(&mut self) {
        if self.width == 0 || self.height == 0 {
            return;
        }
        let (width, height) = (self.width, self.height);
        let created = gpu::with_device(|ctx| {
            // SAFETY: main thread, valid context.
            unsafe {
                let color_info = vk::ImageCreateInfo::default()
                    .image_type(vk::ImageType::TYPE_2D)
                    .format(vk::Format::R8G8B8A8_UNORM)
                    .extent(vk::Extent3D { width, height, depth: 1 })
                    .mip_levels(1)
                    .array_layers(1)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .tiling(vk::ImageTiling::OPTIMAL)
                    .usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED)
                    .sharing_mode(vk::SharingMode::EXCLUSIVE)
                    .initial_layout(vk::ImageLayout::UNDEFINED);
                let image = ctx.device.create_image(&color_info, None).ok()?;

                let mem_reqs = ctx.device.get_image_memory_requirements(image);
                let mem_type = match gpu::find_memory_type(
                    ctx,
                    mem_reqs.memory_type_bits,
                    vk::MemoryPropertyFlags::DEVICE_LOCAL,
                ) {
                    Some(t) => t,
                    None => {
                        ctx.device.destroy_image(image, None);
                        return None;
                    }
                };
                let alloc = vk::MemoryAllocateInfo::default()
                    .allocation_size(mem_reqs.size)
                    .memory_type_index(mem_type);
                let memory = match ctx.device.allocate_memory(&alloc, None) {
                    Ok(m) => m,
                    Err(_) => {
                        ctx.device.destroy_image(image, None);
                        return None;
                    }
                };
                if ctx.device.bind_image_memory(image, memory, 0).is_err() {
                    ctx.device.free_memory(memory, None);
                    ctx.device.destroy_image(image, None);
                    return None;
                }

                let view_info = vk::ImageViewCreateInfo::default()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(vk::Format::R8G8B8A8_UNORM)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                let view = match ctx.device.create_image_view(&view_info, None) {
                    Ok(v) => v,
                    Err(_) => {
                        ctx.device.free_memory(memory, None);
                        ctx.device.destroy_image(image, None);
                        return None;
                    }
                };

                let sampler_info = vk::SamplerCreateInfo::default()
                    .mag_filter(vk::Filter::LINEAR)
                    .min_filter(vk::Filter::LINEAR)
                    .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                    .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
                    .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE);
                let sampler = match ctx.device.create_sampler(&sampler_info, None) {
                    Ok(s) => s,
                    Err(_) => {
                        ctx.device.destroy_image_view(view, None);
                        ctx.device.free_memory(memory, None);
                        ctx.device.destroy_image(image, None);
                        return None;
                    }
                };

                Some((image, view, memory, sampler))
            }
        })
        .flatten();

        if let Some((image, view, memory, sampler)) = created {
            self.color = Some(image);
            self.color_view = Some(view);
            self.color_memory = Some(memory);
            self.sampler = Some(sampler);
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn color_image(&self) -> Option<vk::Image> {
        self.color
    }

    pub fn color_view(&self) -> Option<vk::ImageView> {
        self.color_view
    }

    pub fn sampler(&self) -> Option<vk::Sampler> {
        self.sampler
    }

    pub fn destroy(&mut self) {
        if let Some(s) = self.sampler.take() {
            gpu::defer_release(Release::Sampler(s));
        }
        if let Some(v) = self.color_view.take() {
            gpu::defer_release(Release::ImageView(v));
        }
        if let Some(i) = self.color.take() {
            gpu::defer_release(Release::Image(i));
        }
        if let Some(m) = self.color_memory.take() {
            gpu::defer_release(Release::Memory(m));
        }
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        self.destroy();
    }
}
