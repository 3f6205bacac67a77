//! Graphics pipeline construction
//!
//! Builds fill and wireframe variants of each pipeline against the
//! engine's fixed-function state: triangle list, back-face culling,
//! counter-clockwise front face, no blending, dynamic viewport and
//! scissor. Depth writes are a dynamic state when the extension is
//! available so the skybox can disable them at record time.

use std::ffi::CStr;

use ash::{vk, Device};

use crate::render::device::{PipelineDesc, PushConstantRange, ShaderStages, VertexFormat};
use crate::render::vulkan::{VulkanError, VulkanResult};

/// Map seam-level shader stages onto Vulkan stage flags
pub fn stage_flags(stages: ShaderStages) -> vk::ShaderStageFlags {
    match stages {
        ShaderStages::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStages::Fragment => vk::ShaderStageFlags::FRAGMENT,
        ShaderStages::VertexAndFragment => {
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        }
    }
}

/// Convert seam-level push constant ranges
pub fn push_constant_ranges(ranges: &[PushConstantRange]) -> Vec<vk::PushConstantRange> {
    ranges
        .iter()
        .map(|range| vk::PushConstantRange {
            stage_flags: stage_flags(range.stages),
            offset: range.offset,
            size: range.size,
        })
        .collect()
}

/// A pipeline and its wireframe twin sharing one layout
pub struct PipelinePair {
    device: Device,
    /// Filled rasterization variant
    pub fill: vk::Pipeline,
    /// Line rasterization variant, absent when the GPU lacks
    /// `fillModeNonSolid`
    pub line: Option<vk::Pipeline>,
}

impl PipelinePair {
    /// Build both variants of a pipeline
    pub fn new(
        device: Device,
        render_pass: vk::RenderPass,
        layout: vk::PipelineLayout,
        vert_module: vk::ShaderModule,
        frag_module: vk::ShaderModule,
        desc: &PipelineDesc,
        fill_mode_non_solid: bool,
        dynamic_depth_write: bool,
    ) -> VulkanResult<Self> {
        let fill = Self::build(
            &device,
            render_pass,
            layout,
            vert_module,
            frag_module,
            desc,
            vk::PolygonMode::FILL,
            dynamic_depth_write,
        )?;

        let line = if fill_mode_non_solid {
            match Self::build(
                &device,
                render_pass,
                layout,
                vert_module,
                frag_module,
                desc,
                vk::PolygonMode::LINE,
                dynamic_depth_write,
            ) {
                Ok(pipeline) => Some(pipeline),
                Err(e) => {
                    unsafe { device.destroy_pipeline(fill, None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self { device, fill, line })
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        device: &Device,
        render_pass: vk::RenderPass,
        layout: vk::PipelineLayout,
        vert_module: vk::ShaderModule,
        frag_module: vk::ShaderModule,
        desc: &PipelineDesc,
        polygon_mode: vk::PolygonMode,
        dynamic_depth_write: bool,
    ) -> VulkanResult<vk::Pipeline> {
        let entry_point: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };
        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vert_module)
                .name(entry_point)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(frag_module)
                .name(entry_point)
                .build(),
        ];

        let binding_descriptions = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: desc.vertex_layout.stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let attribute_descriptions: Vec<vk::VertexInputAttributeDescription> = desc
            .vertex_layout
            .attributes
            .iter()
            .map(|attr| vk::VertexInputAttributeDescription {
                location: attr.location,
                binding: 0,
                format: match attr.format {
                    VertexFormat::Float2 => vk::Format::R32G32_SFLOAT,
                    VertexFormat::Float3 => vk::Format::R32G32B32_SFLOAT,
                },
                offset: attr.offset,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Dynamic, so counts only
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(polygon_mode)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let (depth_test, depth_write) = match desc.depth {
            Some(state) => (state.test, state.write),
            None => (false, false),
        };
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(depth_test)
            .depth_write_enable(depth_write)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();
        let attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&attachments);

        let mut dynamic_states = vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        if desc.depth.is_some() && dynamic_depth_write {
            dynamic_states.push(vk::DynamicState::DEPTH_WRITE_ENABLE_EXT);
        }
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device
                .create_graphics_pipelines(
                    vk::PipelineCache::null(),
                    &[pipeline_info.build()],
                    None,
                )
                .map_err(|(_, e)| VulkanError::Api(e))?
        };
        Ok(pipelines[0])
    }
}

impl Drop for PipelinePair {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.fill, None);
            if let Some(line) = self.line {
                self.device.destroy_pipeline(line, None);
            }
        }
    }
}
