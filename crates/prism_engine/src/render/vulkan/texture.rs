//! Vulkan texture management
//!
//! Sampled images for 2D textures and cube maps, uploaded through a
//! staging buffer with the usual layout transitions.

use ash::{vk, Device};

use crate::assets::ImageData;
use crate::render::vulkan::buffer::{find_memory_type, Buffer};
use crate::render::vulkan::context::VulkanContext;
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Sampled texture with image, view, and sampler
pub struct TextureImage {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    image_view: vk::ImageView,
    sampler: vk::Sampler,
    /// Combined image sampler set, bound at draw time
    descriptor_set: vk::DescriptorSet,
}

const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

impl TextureImage {
    /// Upload a single RGBA image as a 2D texture
    pub fn new_2d(
        context: &VulkanContext,
        image_data: &ImageData,
        descriptor_set: vk::DescriptorSet,
    ) -> VulkanResult<Self> {
        Self::new(context, std::slice::from_ref(image_data), false, descriptor_set)
    }

    /// Upload six RGBA faces (+X, -X, +Y, -Y, +Z, -Z) as a cube map
    pub fn new_cube(
        context: &VulkanContext,
        faces: &[ImageData; 6],
        descriptor_set: vk::DescriptorSet,
    ) -> VulkanResult<Self> {
        Self::new(context, faces, true, descriptor_set)
    }

    fn new(
        context: &VulkanContext,
        layers: &[ImageData],
        cube: bool,
        descriptor_set: vk::DescriptorSet,
    ) -> VulkanResult<Self> {
        let device = context.device().clone();
        let instance = context.instance();
        let physical_device = context.physical().device;

        let width = layers[0].width;
        let height = layers[0].height;
        let layer_count = layers.len() as u32;
        let layer_size = (width as vk::DeviceSize) * (height as vk::DeviceSize) * 4;

        // Staging offsets and copy regions assume every layer carries
        // exactly width*height RGBA pixels
        for (i, layer) in layers.iter().enumerate() {
            if layer.width != width
                || layer.height != height
                || layer.pixels.len() as vk::DeviceSize != layer_size
            {
                return Err(VulkanError::InvalidData(format!(
                    "layer {i} is {}x{} ({} bytes), expected {width}x{height}",
                    layer.width,
                    layer.height,
                    layer.pixels.len()
                )));
            }
        }

        // Staging buffer with all layers packed tightly
        let staging = Buffer::new(
            device.clone(),
            instance,
            physical_device,
            layer_size * layer_count as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let mut packed = Vec::with_capacity((layer_size as usize) * layers.len());
        for layer in layers {
            packed.extend_from_slice(&layer.pixels);
        }
        staging.write_data(&packed)?;

        let flags = if cube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };
        let image_create_info = vk::ImageCreateInfo::builder()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(layer_count)
            .format(TEXTURE_FORMAT)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);
        let image = unsafe {
            device
                .create_image(&image_create_info, None)
                .map_err(VulkanError::Api)?
        };

        let memory_requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type_index = find_memory_type(
            instance,
            physical_device,
            memory_requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(memory_requirements.size)
            .memory_type_index(memory_type_index);
        let memory = unsafe {
            device
                .allocate_memory(&alloc_info, None)
                .map_err(VulkanError::Api)?
        };
        unsafe {
            device
                .bind_image_memory(image, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        let subresource_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count,
        };

        context.submit_one_shot(|cmd| {
            transition_layout(
                &device,
                cmd,
                image,
                subresource_range,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );

            let regions: Vec<vk::BufferImageCopy> = (0..layer_count)
                .map(|layer| {
                    vk::BufferImageCopy::builder()
                        .buffer_offset(layer_size * layer as vk::DeviceSize)
                        .image_subresource(vk::ImageSubresourceLayers {
                            aspect_mask: vk::ImageAspectFlags::COLOR,
                            mip_level: 0,
                            base_array_layer: layer,
                            layer_count: 1,
                        })
                        .image_extent(vk::Extent3D {
                            width,
                            height,
                            depth: 1,
                        })
                        .build()
                })
                .collect();
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.handle(),
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &regions,
                );
            }

            transition_layout(
                &device,
                cmd,
                image,
                subresource_range,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        })?;

        let view_type = if cube {
            vk::ImageViewType::CUBE
        } else {
            vk::ImageViewType::TYPE_2D
        };
        let view_create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(view_type)
            .format(TEXTURE_FORMAT)
            .subresource_range(subresource_range);
        let image_view = unsafe {
            device
                .create_image_view(&view_create_info, None)
                .map_err(VulkanError::Api)?
        };

        let address_mode = if cube {
            vk::SamplerAddressMode::CLAMP_TO_EDGE
        } else {
            vk::SamplerAddressMode::REPEAT
        };
        let sampler_create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR);
        let sampler = unsafe {
            device
                .create_sampler(&sampler_create_info, None)
                .map_err(VulkanError::Api)?
        };

        // Point the texture's descriptor set at the new image
        let image_info = vk::DescriptorImageInfo::builder()
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .image_view(image_view)
            .sampler(sampler)
            .build();
        let image_infos = [image_info];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(descriptor_set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_infos)
            .build();
        unsafe {
            device.update_descriptor_sets(&[write], &[]);
        }

        Ok(Self {
            device,
            image,
            memory,
            image_view,
            sampler,
            descriptor_set,
        })
    }

    /// The combined image sampler descriptor set for this texture
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }
}

impl Drop for TextureImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
            self.device.destroy_image_view(self.image_view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

fn transition_layout(
    device: &Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    subresource_range: vk::ImageSubresourceRange,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) {
    let (src_access, dst_access, src_stage, dst_stage) = match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        _ => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::empty(),
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        ),
    };

    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .build();

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}
