//! Pipeline layout, shader module, and compute pipeline construction.

use std::marker::PhantomData;

use ash::vk;

use crate::binding::DescriptorLayout;
use crate::device::ComputeDevice;
use crate::error::VulkanError;

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Entry point every kernel must export.
pub const ENTRY_POINT: &std::ffi::CStr = c"main";

/// Cheap structural check done before handing words to the driver.
/// Says nothing about whether the kernel is correct.
pub fn check_spirv_header(code: &[u32]) -> Result<(), VulkanError> {
    let reason = match code.first() {
        None => "empty SPIR-V binary".to_string(),
        Some(&SPIRV_MAGIC) if code.len() >= 5 => return Ok(()),
        Some(&SPIRV_MAGIC) => format!("SPIR-V header truncated ({} words)", code.len()),
        Some(&word) => format!("bad SPIR-V magic {:#010x}", word),
    };
    Err(VulkanError::ShaderModuleCreationFailed { reason, result: None })
}

/// Pipeline layout referencing exactly one descriptor set layout.
pub struct PipelineLayout<'d> {
    gpu: &'d ComputeDevice,
    layout: vk::PipelineLayout,
}

impl<'d> PipelineLayout<'d> {
    pub fn new(gpu: &'d ComputeDevice, set_layout: &DescriptorLayout<'_>) -> Result<Self, VulkanError> {
        let set_layouts = [set_layout.handle()];
        let info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
        let layout = unsafe { gpu.raw().create_pipeline_layout(&info, None)? };
        Ok(Self { gpu, layout })
    }

    pub(crate) fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout<'_> {
    fn drop(&mut self) {
        unsafe { self.gpu.raw().destroy_pipeline_layout(self.layout, None) };
    }
}

/// Shader module; only needed until the pipeline is created.
struct ShaderModule<'d> {
    gpu: &'d ComputeDevice,
    module: vk::ShaderModule,
}

impl<'d> ShaderModule<'d> {
    fn new(gpu: &'d ComputeDevice, code: &[u32]) -> Result<Self, VulkanError> {
        check_spirv_header(code)?;
        let info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { gpu.raw().create_shader_module(&info, None) }
            .map_err(|e| VulkanError::ShaderModuleCreationFailed {
                reason: e.to_string(),
                result: Some(e),
            })?;
        Ok(Self { gpu, module })
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe { self.gpu.raw().destroy_shader_module(self.module, None) };
    }
}

/// Executable compute pipeline built from a kernel's `main` entry point.
///
/// Borrows its [`PipelineLayout`], which must stay alive while the pipeline
/// is bound.
pub struct ComputePipeline<'l> {
    gpu: &'l ComputeDevice,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    _layout: PhantomData<&'l PipelineLayout<'l>>,
}

impl<'l> ComputePipeline<'l> {
    /// Build a pipeline from SPIR-V words. The shader module is destroyed
    /// before returning.
    pub fn new(
        gpu: &'l ComputeDevice,
        layout: &'l PipelineLayout<'_>,
        code: &[u32],
    ) -> Result<Self, VulkanError> {
        let module = ShaderModule::new(gpu, code)?;

        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(module.module)
            .name(ENTRY_POINT);
        let info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(layout.handle());

        let pipelines = unsafe {
            gpu.raw()
                .create_compute_pipelines(vk::PipelineCache::null(), &[info], None)
        }
        .map_err(|(_, e)| VulkanError::PipelineCreationFailed(e))?;
        let pipeline = *pipelines
            .first()
            .ok_or(VulkanError::PipelineCreationFailed(vk::Result::ERROR_UNKNOWN))?;

        log::debug!("compute pipeline created from {} SPIR-V words", code.len());
        Ok(Self {
            gpu,
            pipeline,
            layout: layout.handle(),
            _layout: PhantomData,
        })
    }

    pub(crate) fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub(crate) fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for ComputePipeline<'_> {
    fn drop(&mut self) {
        unsafe { self.gpu.raw().destroy_pipeline(self.pipeline, None) };
    }
}
