//! Vulkan device management.
//!
//! A single compact context (instance, physical device, logical device,
//! graphics queue) installed once at startup. Everything GPU-facing goes
//! through [`with_device`], which returns `None` when no device is
//! installed — the logic layer above keeps working, which is also what
//! makes it unit-testable off the render thread.

#![allow(static_mut_refs)] // single-threaded engine, main-thread access only

use ash::{vk, Device, Entry, Instance};
use crossbeam::queue::SegQueue;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::sync::OnceLock;

use crate::RenderError;

pub const ENGINE_NAME: &CStr = c"marrow";
pub const REQUIRED_VK_VERSION: u32 = vk::API_VERSION_1_3;

/// Main Vulkan context holding the core Vulkan objects.
pub struct VulkanContext {
    pub entry: Entry,
    pub instance: Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: Device,
    pub graphics_queue: vk::Queue,
    pub queue_family_index: u32,
    pub device_properties: vk::PhysicalDeviceProperties,
    command_pool: vk::CommandPool,
}

impl VulkanContext {
    /// Create a new Vulkan context.
    ///
    /// # Safety
    /// `display_handle` must be a live display connection; must be called
    /// from the main thread.
    pub unsafe fn new(
        display_handle: raw_window_handle::RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<Self, RenderError> {
        let entry = Entry::linked();

        let api_version = entry
            .try_enumerate_instance_version()
            .map_err(|e| RenderError::Vulkan(format!("enumerate instance version: {:?}", e)))?
            .unwrap_or(vk::API_VERSION_1_0);
        if api_version < REQUIRED_VK_VERSION {
            return Err(RenderError::Vulkan(format!(
                "Vulkan 1.3 required, but only {}.{}.{} available",
                vk::api_version_major(api_version),
                vk::api_version_minor(api_version),
                vk::api_version_patch(api_version)
            )));
        }

        let app_info = vk::ApplicationInfo::default()
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 0, 9, 0))
            .api_version(REQUIRED_VK_VERSION);

        let extensions = ash_window::enumerate_required_extensions(display_handle)
            .map_err(|e| RenderError::Vulkan(format!("required extensions: {:?}", e)))?
            .to_vec();

        let layer_names: Vec<CString> = if enable_validation {
            vec![CString::new("VK_LAYER_KHRONOS_validation")
                .map_err(|e| RenderError::Other(e.to_string()))?]
        } else {
            vec![]
        };
        let layer_name_ptrs: Vec<*const c_char> = layer_names.iter().map(|n| n.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_name_ptrs);

        let instance = entry
            .create_instance(&create_info, None)
            .map_err(|e| RenderError::Vulkan(format!("create instance: {:?}", e)))?;

        let (physical_device, queue_family_index) =
            Self::pick_physical_device(&instance).ok_or_else(|| {
                RenderError::Vulkan("no Vulkan device with a graphics queue".into())
            })?;
        let device_properties = instance.get_physical_device_properties(physical_device);

        let queue_priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family_index)
            .queue_priorities(&queue_priorities)];

        let mut vk13_features =
            vk::PhysicalDeviceVulkan13Features::default().dynamic_rendering(true);
        let device_extensions = [ash::khr::swapchain::NAME.as_ptr()];
        let device_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&device_extensions)
            .push_next(&mut vk13_features);

        let device = instance
            .create_device(physical_device, &device_info, None)
            .map_err(|e| RenderError::Vulkan(format!("create device: {:?}", e)))?;
        let graphics_queue = device.get_device_queue(queue_family_index, 0);

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);
        let command_pool = device
            .create_command_pool(&pool_info, None)
            .map_err(|e| RenderError::Vulkan(format!("create command pool: {:?}", e)))?;

        Ok(Self {
            entry,
            instance,
            physical_device,
            device,
            graphics_queue,
            queue_family_index,
            device_properties,
            command_pool,
        })
    }

    unsafe fn pick_physical_device(instance: &Instance) -> Option<(vk::PhysicalDevice, u32)> {
        let devices = instance.enumerate_physical_devices().ok()?;
        let mut fallback = None;
        for pd in devices {
            let families = instance.get_physical_device_queue_family_properties(pd);
            let graphics = match families
                .iter()
                .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            {
                Some(g) => g as u32,
                None => continue,
            };
            let props = instance.get_physical_device_properties(pd);
            if props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
                return Some((pd, graphics));
            }
            fallback.get_or_insert((pd, graphics));
        }
        fallback
    }

    /// Begin a one-shot command buffer for uploads and transitions.
    ///
    /// # Safety
    /// Main thread only; the returned buffer must be finished with
    /// [`Self::end_single_time`].
    pub unsafe fn begin_single_time(&self) -> Option<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let cmd = self.device.allocate_command_buffers(&alloc_info).ok()?[0];
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        if self.device.begin_command_buffer(cmd, &begin_info).is_err() {
            self.device
                .free_command_buffers(self.command_pool, &[cmd]);
            return None;
        }
        Some(cmd)
    }

    /// Submit a one-shot command buffer and wait for it to retire.
    ///
    /// # Safety
    /// `cmd` must have come from [`Self::begin_single_time`].
    pub unsafe fn end_single_time(&self, cmd: vk::CommandBuffer) {
        if self.device.end_command_buffer(cmd).is_ok() {
            let buffers = [cmd];
            let submit = vk::SubmitInfo::default().command_buffers(&buffers);
            if self
                .device
                .queue_submit(self.graphics_queue, &[submit], vk::Fence::null())
                .is_ok()
            {
                let _ = self.device.queue_wait_idle(self.graphics_queue);
            }
        }
        self.device.free_command_buffers(self.command_pool, &[cmd]);
    }
}

/// Find a memory type index satisfying `type_bits` and `flags`.
pub fn find_memory_type(
    ctx: &VulkanContext,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    // SAFETY: physical device handle is valid for the context's lifetime.
    let props = unsafe {
        ctx.instance
            .get_physical_device_memory_properties(ctx.physical_device)
    };
    (0..props.memory_type_count).find(|&i| {
        (type_bits & (1 << i)) != 0
            && props.memory_types[i as usize].property_flags.contains(flags)
    })
}

// ============================================================================
// Global device storage
// ============================================================================

/// The global Vulkan context, installed during renderer startup.
///
/// SAFETY: the engine is single-threaded; all access happens on the
/// main thread.
static mut VULKAN_CTX: Option<VulkanContext> = None;

/// Install the Vulkan device. Called once by the platform layer.
///
/// # Safety
/// Must be called from the main thread, before any rendering occurs.
pub unsafe fn install_device(ctx: VulkanContext) {
    VULKAN_CTX = Some(ctx);
}

/// Tear down the Vulkan device.
///
/// # Safety
/// Must be called from the main thread, after all rendering has stopped.
pub unsafe fn shutdown_device() {
    drain_releases();
    if let Some(ctx) = VULKAN_CTX.take() {
        let _ = ctx.device.device_wait_idle();
        ctx.device.destroy_command_pool(ctx.command_pool, None);
        ctx.device.destroy_device(None);
        ctx.instance.destroy_instance(None);
    }
}

/// Access the Vulkan context, if one is installed.
pub fn with_device<R>(f: impl FnOnce(&VulkanContext) -> R) -> Option<R> {
    // SAFETY: single-threaded engine, all access from the main thread.
    unsafe { VULKAN_CTX.as_ref().map(f) }
}

/// Whether a device is installed.
pub fn device_available() -> bool {
    // SAFETY: single-threaded engine, all access from the main thread.
    unsafe { VULKAN_CTX.is_some() }
}

// ============================================================================
// Deferred resource release
// ============================================================================

/// A GPU object queued for destruction once the frame retires.
pub enum Release {
    Buffer(vk::Buffer),
    Memory(vk::DeviceMemory),
    Image(vk::Image),
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
}

// SAFETY: handles are plain ids; destruction happens on the main thread.
unsafe impl Send for Release {}
unsafe impl Sync for Release {}

fn release_queue() -> &'static SegQueue<Release> {
    static QUEUE: OnceLock<SegQueue<Release>> = OnceLock::new();
    QUEUE.get_or_init(SegQueue::new)
}

/// Queue a GPU object for destruction at the next [`drain_releases`].
pub fn defer_release(r: Release) {
    release_queue().push(r);
}

/// Destroy everything queued by [`defer_release`]. Called once per frame
/// and on shutdown. A no-op without a device (handles are dropped).
pub fn drain_releases() {
    let queue = release_queue();
    if with_device(|ctx| {
        // SAFETY: main thread; the handles were created from this device.
        unsafe {
            while let Some(r) = queue.pop() {
                match r {
                    Release::Buffer(b) => ctx.device.destroy_buffer(b, None),
                    Release::Memory(m) => ctx.device.free_memory(m, None),
                    Release::Image(i) => ctx.device.destroy_image(i, None),
                    Release::ImageView(v) => ctx.device.destroy_image_view(v, None),
                    Release::Sampler(s) => ctx.device.destroy_sampler(s, None),
                }
            }
        }
    })
    .is_none()
    {
        while queue.pop().is_some() {}
    }
}

// ============================================================================
// Texture upload
// ============================================================================

/// A sampled 2d RGBA texture with its backing memory.
#[derive(Clone, Copy)]
pub struct GpuTexture {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub memory: vk::DeviceMemory,
    pub sampler: vk::Sampler,
}

impl GpuTexture {
    /// Queue the texture's objects for deferred destruction.
    pub fn release(self) {
        defer_release(Release::Sampler(self.sampler));
        defer_release(Release::ImageView(self.view));
        defer_release(Release::Image(self.image));
        defer_release(Release::Memory(self.memory));
    }
}

/// Upload an RGBA8 pixel buffer as a sampled texture. Returns `None` when
/// no device is installed or any allocation fails.
pub fn create_texture_rgba(width: u32, height: u32, pixels: &[u8]) -> Option<GpuTexture> {
    debug_assert_eq!(pixels.len(), (width * height * 4) as usize);
    with_device(|ctx| {
        // SAFETY: main thread, valid context.
        unsafe { create_texture_rgba_inner(ctx, width, height, pixels) }
    })
    .flatten()
}

unsafe fn create_texture_rgba_inner(
    ctx: &VulkanContext,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> Option<GpuTexture> {
    let image_info = vk::ImageCreateInfo::default()
        .image_type(vk::ImageType::TYPE_2D)
        .format(vk::Format::R8G8B8A8_UNORM)
        .extent(vk::Extent3D { width, height, depth: 1 })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);
    let image = ctx.device.create_image(&image_info, None).ok()?;

    let mem_reqs = ctx.device.get_image_memory_requirements(image);
    let mem_type = match find_memory_type(
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
    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(mem_reqs.size)
        .memory_type_index(mem_type);
    let memory = match ctx.device.allocate_memory(&alloc_info, None) {
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

    // Stage and copy.
    let staging = create_host_buffer(ctx, pixels, vk::BufferUsageFlags::TRANSFER_SRC);
    let (staging_buffer, staging_memory) = match staging {
        Some(pair) => pair,
        None => {
            ctx.device.free_memory(memory, None);
            ctx.device.destroy_image(image, None);
            return None;
        }
    };

    if let Some(cmd) = ctx.begin_single_time() {
        transition_image(ctx, cmd, image, vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        let region = vk::BufferImageCopy::default()
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_extent(vk::Extent3D { width, height, depth: 1 });
        ctx.device.cmd_copy_buffer_to_image(
            cmd,
            staging_buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
        transition_image(ctx, cmd, image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        ctx.end_single_time(cmd);
    }
    ctx.device.destroy_buffer(staging_buffer, None);
    ctx.device.free_memory(staging_memory, None);

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

    Some(GpuTexture { image, view, memory, sampler })
}

/// Create a host-visible buffer pre-filled with `bytes`.
pub unsafe fn create_host_buffer(
    ctx: &VulkanContext,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> Option<(vk::Buffer, vk::DeviceMemory)> {
    let buffer_info = vk::BufferCreateInfo::default()
        .size(bytes.len() as vk::DeviceSize)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let buffer = ctx.device.create_buffer(&buffer_info, None).ok()?;

    let mem_reqs = ctx.device.get_buffer_memory_requirements(buffer);
    let mem_type = match find_memory_type(
        ctx,
        mem_reqs.memory_type_bits,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    ) {
        Some(t) => t,
        None => {
            ctx.device.destroy_buffer(buffer, None);
            return None;
        }
    };
    let alloc_info = vk::MemoryAllocateInfo::default()
        .allocation_size(mem_reqs.size)
        .memory_type_index(mem_type);
    let memory = match ctx.device.allocate_memory(&alloc_info, None) {
        Ok(m) => m,
        Err(_) => {
            ctx.device.destroy_buffer(buffer, None);
            return None;
        }
    };
    if ctx.device.bind_buffer_memory(buffer, memory, 0).is_err() {
        ctx.device.free_memory(memory, None);
        ctx.device.destroy_buffer(buffer, None);
        return None;
    }
    match ctx
        .device
        .map_memory(memory, 0, bytes.len() as vk::DeviceSize, vk::MemoryMapFlags::empty())
    {
        Ok(ptr) => {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
            ctx.device.unmap_memory(memory);
        }
        Err(_) => {
            ctx.device.free_memory(memory, None);
            ctx.device.destroy_buffer(buffer, None);
            return None;
        }
    }
    Some((buffer, memory))
}

/// Upload a uniform block to a transient host buffer, queued for
/// release when the frame drains. `None` without a device.
pub fn upload_transient_uniforms(bytes: &[u8]) -> Option<vk::Buffer> {
    with_device(|ctx| {
        // SAFETY: main thread, valid context.
        unsafe {
            let (buffer, memory) =
                create_host_buffer(ctx, bytes, vk::BufferUsageFlags::UNIFORM_BUFFER)?;
            defer_release(Release::Buffer(buffer));
            defer_release(Release::Memory(memory));
            Some(buffer)
        }
    })
    .flatten()
}

/// Record a color-aspect layout transition.
pub unsafe fn transition_image(
    ctx: &VulkanContext,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    use vk::{AccessFlags as A, ImageLayout as L, PipelineStageFlags as S};
    let (src_access, dst_access, src_stage, dst_stage) = match (old_layout, new_layout) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => {
            (A::empty(), A::TRANSFER_WRITE, S::TOP_OF_PIPE, S::TRANSFER)
        }
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            (A::TRANSFER_WRITE, A::SHADER_READ, S::TRANSFER, S::FRAGMENT_SHADER)
        }
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL) => (
            A::empty(),
            A::COLOR_ATTACHMENT_WRITE,
            S::TOP_OF_PIPE,
            S::COLOR_ATTACHMENT_OUTPUT,
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            A::COLOR_ATTACHMENT_WRITE,
            A::SHADER_READ,
            S::COLOR_ATTACHMENT_OUTPUT,
            S::FRAGMENT_SHADER,
        ),
        (L::SHADER_READ_ONLY_OPTIMAL, L::COLOR_ATTACHMENT_OPTIMAL) => (
            A::SHADER_READ,
            A::COLOR_ATTACHMENT_WRITE,
            S::FRAGMENT_SHADER,
            S::COLOR_ATTACHMENT_OUTPUT,
        ),
        _ => return,
    };

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    ctx.device.cmd_pipeline_barrier(
        cmd,
        src_stage,
        dst_stage,
        vk::DependencyFlags::empty(),
        &[],
        &[],
        &[barrier],
    );
}

// ============================================================================
// Descriptor arena
// ============================================================================

/// A reset-per-frame pool of descriptor sets for per-draw bindings.
pub struct DescriptorArena {
    pool: Option<vk::DescriptorPool>,
}

impl Default for DescriptorArena {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorArena {
    const MAX_SETS: u32 = 4096;

    pub fn new() -> Self {
        let pool = with_device(|ctx| {
            // SAFETY: main thread, valid context.
            unsafe {
                let sizes = [
                    vk::DescriptorPoolSize {
                        ty: vk::DescriptorType::UNIFORM_BUFFER,
                        descriptor_count: Self::MAX_SETS,
                    },
                    vk::DescriptorPoolSize {
                        ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                        descriptor_count: Self::MAX_SETS * 2,
                    },
                ];
                let info = vk::DescriptorPoolCreateInfo::default()
                    .max_sets(Self::MAX_SETS)
                    .pool_sizes(&sizes);
                ctx.device.create_descriptor_pool(&info, None).ok()
            }
        })
        .flatten();
        Self { pool }
    }

    /// Recycle every set handed out since the last reset.
    pub fn reset(&mut self) {
        if let Some(pool) = self.pool {
            with_device(|ctx| {
                // SAFETY: main thread; no set from this pool is in flight
                // once the frame's submissions have retired.
                unsafe {
                    let _ = ctx
                        .device
                        .reset_descriptor_pool(pool, vk::DescriptorPoolResetFlags::empty());
                }
            });
        }
    }

    /// Allocate one set and write a uniform buffer plus an optional
    /// sampled texture into it.
    pub fn bind_draw(
        &mut self,
        layout: vk::DescriptorSetLayout,
        uniform_buffer: vk::Buffer,
        uniform_size: u64,
        texture: Option<(vk::ImageView, vk::Sampler)>,
    ) -> Option<vk::DescriptorSet> {
        let pool = self.pool?;
        with_device(|ctx| {
            // SAFETY: main thread, valid context.
            unsafe {
                let layouts = [layout];
                let alloc = vk::DescriptorSetAllocateInfo::default()
                    .descriptor_pool(pool)
                    .set_layouts(&layouts);
                let set = ctx.device.allocate_descriptor_sets(&alloc).ok()?[0];

                let buffer_info = [vk::DescriptorBufferInfo {
                    buffer: uniform_buffer,
                    offset: 0,
                    range: uniform_size,
                }];
                let mut writes = vec![vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_info)];

                let image_info;
                if let Some((view, sampler)) = texture {
                    image_info = [vk::DescriptorImageInfo {
                        sampler,
                        image_view: view,
                        image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    }];
                    writes.push(
                        vk::WriteDescriptorSet::default()
                            .dst_set(set)
                            .dst_binding(1)
                            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                            .image_info(&image_info),
                    );
                }

                ctx.device.update_descriptor_sets(&writes, &[]);
                Some(set)
            }
        })
        .flatten()
    }

    pub fn destroy(&mut self) {
        if let Some(pool) = self.pool.take() {
            with_device(|ctx| {
                // SAFETY: main thread; sets die with the pool.
                unsafe { ctx.device.destroy_descriptor_pool(pool, None) }
            });
        }
    }
}

impl Drop for DescriptorArena {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_device_installed_by_default() {
        assert!(!device_available());
        assert!(with_device(|_| ()).is_none());
    }

    #[test]
    fn test_drain_releases_without_device_drops_handles() {
        defer_release(Release::Buffer(vk::Buffer::null()));
        defer_release(Release::Image(vk::Image::null()));
        drain_releases();
        assert!(release_queue().is_empty());
    }

    #[test]
    fn test_texture_upload_without_device_is_none() {
        let pixels = vec![0u8; 4 * 4 * 4];
        assert!(create_texture_rgba(4, 4, &pixels).is_none());
    }
}
