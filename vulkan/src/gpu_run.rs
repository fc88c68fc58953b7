//! Single-shot compute dispatch over one storage buffer.
//!
//! Creates the storage buffer, binds it to a descriptor set, builds the
//! pipeline, records one dispatch, submits it, waits for the queue to go
//! idle and reads the buffer back. GPU objects are locals, so they are
//! destroyed in reverse order of creation when the function returns.

use ash::vk;

use crate::binding::{DescriptorLayout, DescriptorPool};
use crate::device::ComputeDevice;
use crate::dispatch::CommandPool;
use crate::error::VulkanError;
use crate::pipeline::{ComputePipeline, PipelineLayout};
use crate::readback;

/// Host-side contents written to the storage buffer before dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum InitialContents {
    /// Leave the allocation as the driver returned it.
    Uninitialized,
    Zeroed,
    /// `values[i] = i`
    Index,
    Values(Vec<f32>),
}

/// Parameters of one dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchParams {
    /// Work-group count along X. The kernel is expected to declare the same
    /// `local_size_x`, so `local_size * local_size` elements are covered.
    pub local_size: u32,
    pub initial: InitialContents,
}

impl DispatchParams {
    pub fn new(local_size: u32) -> Self {
        Self {
            local_size,
            initial: InitialContents::Index,
        }
    }

    pub fn with_initial(mut self, initial: InitialContents) -> Self {
        self.initial = initial;
        self
    }

    pub fn element_count(&self) -> u64 {
        self.local_size as u64 * self.local_size as u64
    }

    /// Bytes needed for `element_count` floats, or `InvalidState` if that
    /// does not fit a `DeviceSize`.
    pub fn buffer_size(&self) -> Result<vk::DeviceSize, VulkanError> {
        self.element_count()
            .checked_mul(std::mem::size_of::<f32>() as u64)
            .ok_or_else(|| {
                VulkanError::invalid_state(format!(
                    "buffer for local size {} overflows a device size",
                    self.local_size
                ))
            })
    }

    fn initial_values(&self) -> Result<Option<Vec<f32>>, VulkanError> {
        let n = usize::try_from(self.element_count()).map_err(|_| {
            VulkanError::invalid_state(format!("{} elements do not fit in host memory", self.element_count()))
        })?;
        Ok(match &self.initial {
            InitialContents::Uninitialized => None,
            InitialContents::Zeroed => Some(vec![0.0; n]),
            InitialContents::Index => Some((0..n).map(|i| i as f32).collect()),
            InitialContents::Values(values) if values.len() == n => Some(values.clone()),
            InitialContents::Values(values) => {
                return Err(VulkanError::invalid_state(format!(
                    "expected {} initial values, got {}",
                    n,
                    values.len()
                )))
            }
        })
    }
}

/// Run `code` once over a fresh storage buffer and return its contents.
pub fn run_dispatch(
    gpu: &ComputeDevice,
    code: &[u32],
    params: &DispatchParams,
) -> Result<Vec<f32>, VulkanError> {
    if params.local_size == 0 {
        return Err(VulkanError::invalid_state("local size must be non-zero"));
    }
    let buffer_size = params.buffer_size()?;
    gpu.info().check_dispatch(params.local_size, buffer_size)?;

    // ── Buffer + memory ──────────────────────────────────────────────────────
    let buffer = gpu.create_storage_buffer(buffer_size)?;
    if let Some(values) = params.initial_values()? {
        buffer.memory()?.write_f32(&values)?;
    }

    // ── Descriptor layout, pool & set ────────────────────────────────────────
    let set_layout = DescriptorLayout::storage_buffer(gpu)?;
    let descriptor_pool = DescriptorPool::for_layout(gpu, &set_layout)?;
    let descriptor_set = descriptor_pool
        .allocate_set(&set_layout)?
        .write_storage_buffer(&buffer)?;

    // ── Pipeline ─────────────────────────────────────────────────────────────
    let pipeline_layout = PipelineLayout::new(gpu, &set_layout)?;
    let pipeline = ComputePipeline::new(gpu, &pipeline_layout, code)?;

    // ── Record, submit & wait ────────────────────────────────────────────────
    let command_pool = CommandPool::new(gpu)?;
    let mut cmd = command_pool.allocate()?;
    cmd.record_dispatch(&pipeline, &descriptor_set, params.local_size)?;
    gpu.submit_and_wait(&mut cmd)?;

    // ── Readback ─────────────────────────────────────────────────────────────
    let output = readback::read_f32(&buffer)?;
    log::info!(
        "dispatch of ({}, 1, 1) work groups complete, {} values read back",
        params.local_size,
        output.len()
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::STORAGE_MEMORY_FLAGS;
    use crate::test_kernels;

    fn get_gpu() -> Option<ComputeDevice> {
        let gpu = match ComputeDevice::new() {
            Ok(g) => g,
            Err(_) => { eprintln!("Skipping dispatch test — no Vulkan device"); return None }
        };
        // Storage memory needs a DEVICE_LOCAL | HOST_VISIBLE | HOST_COHERENT type.
        let has_storage_type = {
            let props = gpu.memory_properties();
            props.memory_types[..props.memory_type_count as usize]
                .iter()
                .any(|t| t.property_flags.contains(STORAGE_MEMORY_FLAGS))
        };
        if !has_storage_type {
            eprintln!("Skipping dispatch test — no device-local host-visible memory");
            return None;
        }
        Some(gpu)
    }

    #[test]
    fn test_params_sizes() {
        let params = DispatchParams::new(8);
        assert_eq!(params.element_count(), 64);
        assert_eq!(params.buffer_size().unwrap(), 256);
    }

    #[test]
    fn test_huge_local_size_does_not_overflow() {
        let params = DispatchParams::new(u32::MAX);
        assert_eq!(params.element_count(), u32::MAX as u64 * u32::MAX as u64);
        assert!(matches!(params.buffer_size(), Err(VulkanError::InvalidState(_))));
    }

    #[test]
    fn test_initial_values() {
        let index = DispatchParams::new(2).initial_values().unwrap().unwrap();
        assert_eq!(index, vec![0.0, 1.0, 2.0, 3.0]);

        let zeroed = DispatchParams::new(2).with_initial(InitialContents::Zeroed);
        assert_eq!(zeroed.initial_values().unwrap().unwrap(), vec![0.0; 4]);

        let none = DispatchParams::new(2).with_initial(InitialContents::Uninitialized);
        assert_eq!(none.initial_values().unwrap(), None);

        let short = DispatchParams::new(2).with_initial(InitialContents::Values(vec![1.0]));
        assert!(matches!(short.initial_values(), Err(VulkanError::InvalidState(_))));
    }

    #[test]
    fn test_identity_kernel_round_trips_values() {
        let gpu = match get_gpu() { Some(g) => g, None => return };
        let input: Vec<f32> = (0..64).map(|i| (i as f32) * 1.5 - 7.0).collect();
        let params = DispatchParams::new(8).with_initial(InitialContents::Values(input.clone()));
        let output = run_dispatch(&gpu, &test_kernels::scale_kernel(8, 1.0), &params).unwrap();
        assert_eq!(output.len(), 64);
        assert_eq!(output, input);
    }

    #[test]
    fn test_doubling_kernel() {
        let gpu = match get_gpu() { Some(g) => g, None => return };
        let params = DispatchParams::new(8);
        let output = run_dispatch(&gpu, &test_kernels::scale_kernel(8, 2.0), &params).unwrap();
        let expected: Vec<f32> = (0..64).map(|i| 2.0 * i as f32).collect();
        assert_eq!(output, expected);
    }

    #[test]
    fn test_recorded_but_unsubmitted_has_no_effect() {
        let gpu = match get_gpu() { Some(g) => g, None => return };
        let params = DispatchParams::new(8);
        let input: Vec<f32> = (0..64).map(|i| i as f32).collect();

        let buffer = gpu.create_storage_buffer(params.buffer_size().unwrap()).unwrap();
        buffer.memory().unwrap().write_f32(&input).unwrap();
        let set_layout = DescriptorLayout::storage_buffer(&gpu).unwrap();
        let pool = DescriptorPool::for_layout(&gpu, &set_layout).unwrap();
        let set = pool.allocate_set(&set_layout).unwrap().write_storage_buffer(&buffer).unwrap();
        let layout = PipelineLayout::new(&gpu, &set_layout).unwrap();
        let pipeline = ComputePipeline::new(&gpu, &layout, &test_kernels::scale_kernel(8, 2.0)).unwrap();
        let command_pool = CommandPool::new(&gpu).unwrap();
        let mut cmd = command_pool.allocate().unwrap();
        cmd.record_dispatch(&pipeline, &set, params.local_size).unwrap();

        assert_eq!(readback::read_f32(&buffer).unwrap(), input);
    }

    #[test]
    fn test_malformed_kernel_is_reported() {
        let gpu = match get_gpu() { Some(g) => g, None => return };
        let err = run_dispatch(&gpu, &[1, 2, 3], &DispatchParams::new(8)).unwrap_err();
        assert!(matches!(err, VulkanError::ShaderModuleCreationFailed { result: None, .. }), "{err}");
    }

    #[test]
    fn test_oversized_dispatch_fails_before_allocation() {
        let gpu = match get_gpu() { Some(g) => g, None => return };
        let code = test_kernels::scale_kernel(8, 1.0);

        let err = run_dispatch(&gpu, &code, &DispatchParams::new(u32::MAX)).unwrap_err();
        assert!(matches!(err, VulkanError::InvalidState(_)), "{err}");

        // Larger than any device's work-group size; 40 GB of host floats.
        let err = run_dispatch(&gpu, &code, &DispatchParams::new(100_000)).unwrap_err();
        assert!(matches!(err, VulkanError::DeviceLimitExceeded { .. }), "{err}");
    }

    #[test]
    fn test_zero_local_size_is_rejected() {
        let gpu = match get_gpu() { Some(g) => g, None => return };
        let err = run_dispatch(&gpu, &test_kernels::scale_kernel(8, 1.0), &DispatchParams::new(0));
        assert!(matches!(err, Err(VulkanError::InvalidState(_))));
    }
}
