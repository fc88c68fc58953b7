//! Memory type selection and device memory allocation.

use std::cell::Cell;

use ash::vk;

use crate::device::ComputeDevice;
use crate::error::VulkanError;

/// Find the lowest memory type index allowed by `type_bits` whose property
/// flags contain every bit of `required`.
///
/// Overlap is not enough: a type with HOST_VISIBLE alone does not satisfy
/// HOST_VISIBLE | HOST_COHERENT.
pub fn find_memory_type_index(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32, VulkanError> {
    let count = (properties.memory_type_count as usize).min(vk::MAX_MEMORY_TYPES);
    properties.memory_types[..count]
        .iter()
        .enumerate()
        .find(|(i, ty)| type_bits & (1 << i) != 0 && ty.property_flags.contains(required))
        .map(|(i, _)| i as u32)
        .ok_or(VulkanError::NoSuitableMemoryType { type_bits, required })
}

/// A dedicated device memory allocation.
///
/// Freed on drop. Borrowing the [`ComputeDevice`] keeps it from outliving
/// the device.
pub struct AllocatedMemory<'d> {
    gpu: &'d ComputeDevice,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    type_index: u32,
    property_flags: vk::MemoryPropertyFlags,
    pub(crate) mapped: Cell<bool>,
}

impl ComputeDevice {
    /// Pick a memory type for `requirements` and allocate `requirements.size`
    /// bytes from it.
    ///
    /// Selection failure is returned before any allocation call is made.
    pub fn allocate(
        &self,
        requirements: &vk::MemoryRequirements,
        required: vk::MemoryPropertyFlags,
    ) -> Result<AllocatedMemory<'_>, VulkanError> {
        let type_index = find_memory_type_index(
            self.memory_properties(),
            requirements.memory_type_bits,
            required,
        )?;
        let property_flags = self.memory_properties().memory_types[type_index as usize].property_flags;

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(type_index);
        let memory = unsafe { self.raw().allocate_memory(&alloc_info, None)? };

        log::debug!(
            "allocated {} bytes from memory type {} ({:?})",
            requirements.size,
            type_index,
            property_flags
        );

        Ok(AllocatedMemory {
            gpu: self,
            memory,
            size: requirements.size,
            type_index,
            property_flags,
            mapped: Cell::new(false),
        })
    }
}

impl<'d> AllocatedMemory<'d> {
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn type_index(&self) -> u32 {
        self.type_index
    }

    pub fn property_flags(&self) -> vk::MemoryPropertyFlags {
        self.property_flags
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.get()
    }

    pub(crate) fn handle(&self) -> vk::DeviceMemory {
        self.memory
    }

    pub(crate) fn device(&self) -> &'d ComputeDevice {
        self.gpu
    }
}

impl Drop for AllocatedMemory<'_> {
    fn drop(&mut self) {
        unsafe { self.gpu.raw().free_memory(self.memory, None) };
    }
}
