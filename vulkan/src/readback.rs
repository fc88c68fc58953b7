//! Scoped host mapping of device memory.

use std::ffi::c_void;

use ash::vk;
use bytemuck::Pod;

use crate::binding::Buffer;
use crate::error::VulkanError;
use crate::memory::AllocatedMemory;

/// A live host mapping. Unmapped on drop, including during unwinding.
pub struct MappedMemory<'m> {
    memory: &'m AllocatedMemory<'m>,
    ptr: *mut c_void,
    len: usize,
}

impl<'d> AllocatedMemory<'d> {
    /// Map the first `len` bytes into host address space.
    ///
    /// Fails with `NotHostVisible` if the memory type cannot be mapped and
    /// with `InvalidState` if a mapping is already live.
    pub fn map(&self, len: vk::DeviceSize) -> Result<MappedMemory<'_>, VulkanError> {
        if !self.property_flags().contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(VulkanError::NotHostVisible { type_index: self.type_index() });
        }
        if len > self.size() {
            return Err(VulkanError::invalid_state(format!(
                "cannot map {} bytes of a {} byte allocation",
                len,
                self.size()
            )));
        }
        if self.mapped.replace(true) {
            return Err(VulkanError::invalid_state("memory is already mapped"));
        }
        let mapped = unsafe {
            self.device()
                .raw()
                .map_memory(self.handle(), 0, len, vk::MemoryMapFlags::empty())
        };
        match mapped {
            Ok(ptr) => Ok(MappedMemory {
                memory: self,
                ptr,
                len: len as usize,
            }),
            Err(e) => {
                self.mapped.set(false);
                Err(e.into())
            }
        }
    }

    /// Copy `values` to the start of the allocation through a scoped mapping.
    pub fn write_f32(&self, values: &[f32]) -> Result<(), VulkanError> {
        let bytes: &[u8] = bytemuck::cast_slice(values);
        let mut mapped = self.map(bytes.len() as vk::DeviceSize)?;
        mapped.bytes_mut().copy_from_slice(bytes);
        Ok(())
    }
}

impl<'m> MappedMemory<'m> {
    pub fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr as *const u8, self.len) }
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr as *mut u8, self.len) }
    }

    /// View the mapping as `T` elements. The length must be a multiple of
    /// `size_of::<T>()`.
    pub fn as_slice<T: Pod>(&self) -> Result<&[T], VulkanError> {
        bytemuck::try_cast_slice(self.bytes())
            .map_err(|e| VulkanError::invalid_state(format!("mapped range is not a [{}]: {e}", std::any::type_name::<T>())))
    }
}

impl Drop for MappedMemory<'_> {
    fn drop(&mut self) {
        unsafe { self.memory.device().raw().unmap_memory(self.memory.handle()) };
        self.memory.mapped.set(false);
    }
}

/// Map the buffer's memory over the buffer's size, hand the contents to
/// `read` as `size / 4` floats, and unmap once `read` returns.
pub fn with_mapped_f32<R>(
    buffer: &Buffer<'_>,
    read: impl FnOnce(&[f32]) -> R,
) -> Result<R, VulkanError> {
    let mapped = buffer.memory()?.map(buffer.size())?;
    let values = mapped.as_slice::<f32>()?;
    Ok(read(values))
}

/// Owned copy of the buffer contents as floats.
pub fn read_f32(buffer: &Buffer<'_>) -> Result<Vec<f32>, VulkanError> {
    with_mapped_f32(buffer, |values| values.to_vec())
}
