//! Storage buffers, their memory binding, and the descriptor objects that
//! expose them to a compute kernel.

use std::cell::Cell;
use std::marker::PhantomData;

use ash::vk;

use crate::device::ComputeDevice;
use crate::error::VulkanError;
use crate::memory::AllocatedMemory;

/// Binding slot the storage buffer occupies in the descriptor set.
pub const STORAGE_BINDING: u32 = 0;

/// Host-visible and coherent so readback needs no flush or invalidate;
/// device-local so the kernel reads it at full speed.
pub const STORAGE_MEMORY_FLAGS: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw()
        | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw()
        | vk::MemoryPropertyFlags::DEVICE_LOCAL.as_raw(),
);

/// A buffer and, once bound, the memory backing it.
///
/// Starts unbound. [`Buffer::bind_memory`] succeeds once; the buffer owns
/// its memory from then on and frees it after destroying itself.
pub struct Buffer<'d> {
    gpu: &'d ComputeDevice,
    buffer: vk::Buffer,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory: Option<AllocatedMemory<'d>>,
}

impl ComputeDevice {
    /// Create an unbound buffer of `size` bytes.
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Buffer<'_>, VulkanError> {
        if size == 0 {
            return Err(VulkanError::invalid_state("buffer size must be non-zero"));
        }
        let info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = unsafe { self.raw().create_buffer(&info, None)? };
        log::debug!("created buffer of {} bytes ({:?})", size, usage);
        Ok(Buffer {
            gpu: self,
            buffer,
            size,
            usage,
            memory: None,
        })
    }

    /// Create a storage buffer and bind freshly allocated memory to it.
    ///
    /// Memory must satisfy [`STORAGE_MEMORY_FLAGS`]; if the device has no such
    /// type the call fails with `NoSuitableMemoryType` and nothing is
    /// allocated.
    pub fn create_storage_buffer(&self, size: vk::DeviceSize) -> Result<Buffer<'_>, VulkanError> {
        let mut buffer = self.create_buffer(size, vk::BufferUsageFlags::STORAGE_BUFFER)?;
        let requirements = buffer.memory_requirements();
        let memory = self.allocate(&requirements, STORAGE_MEMORY_FLAGS)?;
        buffer.bind_memory(memory)?;
        Ok(buffer)
    }
}

impl<'d> Buffer<'d> {
    pub fn memory_requirements(&self) -> vk::MemoryRequirements {
        unsafe { self.gpu.raw().get_buffer_memory_requirements(self.buffer) }
    }

    /// Bind `memory` at offset 0. A buffer is bound exactly once.
    pub fn bind_memory(&mut self, memory: AllocatedMemory<'d>) -> Result<(), VulkanError> {
        if self.memory.is_some() {
            return Err(VulkanError::invalid_state("buffer already has memory bound"));
        }
        if memory.size() < self.memory_requirements().size {
            return Err(VulkanError::invalid_state(format!(
                "allocation of {} bytes is smaller than the buffer requires",
                memory.size()
            )));
        }
        unsafe { self.gpu.raw().bind_buffer_memory(self.buffer, memory.handle(), 0)? };
        self.memory = Some(memory);
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.memory.is_some()
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// The bound memory, or `InvalidState` if the buffer is still unbound.
    pub fn memory(&self) -> Result<&AllocatedMemory<'d>, VulkanError> {
        self.memory
            .as_ref()
            .ok_or_else(|| VulkanError::invalid_state("buffer has no memory bound"))
    }

    pub(crate) fn handle(&self) -> vk::Buffer {
        self.buffer
    }
}

impl Drop for Buffer<'_> {
    fn drop(&mut self) {
        // The buffer goes first; the memory field is freed right after.
        unsafe { self.gpu.raw().destroy_buffer(self.buffer, None) };
    }
}

/// Descriptor set layout with a single storage buffer at binding 0,
/// visible to the compute stage.
pub struct DescriptorLayout<'d> {
    gpu: &'d ComputeDevice,
    layout: vk::DescriptorSetLayout,
}

impl<'d> DescriptorLayout<'d> {
    pub fn storage_buffer(gpu: &'d ComputeDevice) -> Result<Self, VulkanError> {
        let bindings = [vk::DescriptorSetLayoutBinding::default()
            .binding(STORAGE_BINDING)
            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::COMPUTE)];
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe { gpu.raw().create_descriptor_set_layout(&info, None)? };
        Ok(Self { gpu, layout })
    }

    /// Descriptors declared by this layout, as pool sizes.
    pub fn pool_sizes(&self) -> [vk::DescriptorPoolSize; 1] {
        [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count(1)]
    }

    pub(crate) fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorLayout<'_> {
    fn drop(&mut self) {
        unsafe { self.gpu.raw().destroy_descriptor_set_layout(self.layout, None) };
    }
}

/// Descriptor pool sized for exactly the sets it was created for.
///
/// Allocating past `capacity` fails with `DescriptorPoolExhausted` rather
/// than relying on driver behavior.
pub struct DescriptorPool<'d> {
    gpu: &'d ComputeDevice,
    pool: vk::DescriptorPool,
    capacity: u32,
    allocated: Cell<u32>,
}

impl<'d> DescriptorPool<'d> {
    /// Pool holding exactly one set of `layout`.
    pub fn for_layout(gpu: &'d ComputeDevice, layout: &DescriptorLayout<'_>) -> Result<Self, VulkanError> {
        let pool_sizes = layout.pool_sizes();
        let info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(1)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { gpu.raw().create_descriptor_pool(&info, None)? };
        Ok(Self {
            gpu,
            pool,
            capacity: 1,
            allocated: Cell::new(0),
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn allocated(&self) -> u32 {
        self.allocated.get()
    }

    pub fn allocate_set(&self, layout: &DescriptorLayout<'_>) -> Result<DescriptorSet<'_>, VulkanError> {
        if self.allocated.get() >= self.capacity {
            return Err(VulkanError::DescriptorPoolExhausted {
                capacity: self.capacity,
                result: None,
            });
        }
        let layouts = [layout.handle()];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.gpu.raw().allocate_descriptor_sets(&info) }.map_err(|e| match e {
            vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL => {
                VulkanError::DescriptorPoolExhausted {
                    capacity: self.capacity,
                    result: Some(e),
                }
            }
            other => VulkanError::Backend(other),
        })?;
        let set = *sets
            .first()
            .ok_or_else(|| VulkanError::invalid_state("driver returned no descriptor set"))?;
        self.allocated.set(self.allocated.get() + 1);
        Ok(DescriptorSet {
            gpu: self.gpu,
            set,
            written: false,
            _scope: PhantomData,
        })
    }
}

impl Drop for DescriptorPool<'_> {
    fn drop(&mut self) {
        // Frees every set allocated from the pool.
        unsafe { self.gpu.raw().destroy_descriptor_pool(self.pool, None) };
    }
}

/// A descriptor set allocated from a [`DescriptorPool`].
///
/// `'a` covers the pool and, once written, the buffer it references, so
/// the set cannot be used after either is gone.
pub struct DescriptorSet<'a> {
    gpu: &'a ComputeDevice,
    set: vk::DescriptorSet,
    written: bool,
    _scope: PhantomData<&'a ()>,
}

impl<'a> DescriptorSet<'a> {
    /// Point binding 0 at the whole of `buffer`. Written once; the buffer
    /// must already have memory bound.
    pub fn write_storage_buffer<'b>(self, buffer: &'b Buffer<'_>) -> Result<DescriptorSet<'b>, VulkanError>
    where
        'a: 'b,
    {
        if self.written {
            return Err(VulkanError::invalid_state("descriptor set already written"));
        }
        if !buffer.is_bound() {
            return Err(VulkanError::invalid_state("cannot reference a buffer with no memory bound"));
        }
        let buffer_infos = [vk::DescriptorBufferInfo::default()
            .buffer(buffer.handle())
            .offset(0)
            .range(buffer.size())];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(self.set)
            .dst_binding(STORAGE_BINDING)
            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
            .buffer_info(&buffer_infos);
        unsafe { self.gpu.raw().update_descriptor_sets(&[write], &[]) };
        Ok(DescriptorSet {
            gpu: self.gpu,
            set: self.set,
            written: true,
            _scope: PhantomData,
        })
    }

    pub fn is_written(&self) -> bool {
        self.written
    }

    pub(crate) fn handle(&self) -> vk::DescriptorSet {
        self.set
    }
}
