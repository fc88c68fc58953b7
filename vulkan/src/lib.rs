//! vkdispatch Vulkan compute runtime.
//!
//! One device, one queue, one dispatch. [`ComputeDevice`] selects the device;
//! [`run_dispatch`] wires a storage buffer, descriptor set and compute
//! pipeline together, submits a single dispatch and reads the buffer back.
//! The individual steps are public for callers that need to drive them
//! separately.

pub mod binding;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod gpu_run;
pub mod memory;
pub mod pipeline;
pub mod readback;

#[cfg(test)]
pub(crate) mod test_kernels;

pub use binding::{
    Buffer, DescriptorLayout, DescriptorPool, DescriptorSet, STORAGE_BINDING, STORAGE_MEMORY_FLAGS,
};
pub use device::{ComputeDevice, DeviceInfo, QUEUE_FAMILY_INDEX};
pub use dispatch::{CommandBuffer, CommandBufferState, CommandPool};
pub use error::VulkanError;
pub use gpu_run::{run_dispatch, DispatchParams, InitialContents};
pub use memory::{find_memory_type_index, AllocatedMemory};
pub use pipeline::{check_spirv_header, ComputePipeline, PipelineLayout, ENTRY_POINT, SPIRV_MAGIC};
pub use readback::{read_f32, with_mapped_f32, MappedMemory};

pub use ash::vk;
