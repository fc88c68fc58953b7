//! Vulkan instance creation, physical device selection, and logical device setup.

use ash::vk;

use crate::error::VulkanError;

/// Queue family used for every submission. Selection is not scored.
pub const QUEUE_FAMILY_INDEX: u32 = 0;

/// Owns the Vulkan instance, the selected physical device, the logical
/// device and its single queue.
///
/// Every GPU object created by this crate borrows the `ComputeDevice`, so
/// the borrow checker keeps them from outliving it.
pub struct ComputeDevice {
    _entry: ash::Entry,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    info: DeviceInfo,
}

impl ComputeDevice {
    /// Load Vulkan, create an instance, take the first enumerated device
    /// and create a logical device with one queue from family 0.
    pub fn new() -> Result<Self, VulkanError> {
        let entry = unsafe { ash::Entry::load()? };

        let app_info = vk::ApplicationInfo::default()
            .application_name(c"vkdispatch")
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"vkdispatch")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_1);
        let instance_info = vk::InstanceCreateInfo::default().application_info(&app_info);

        let instance = unsafe { entry.create_instance(&instance_info, None)? };

        // `entry` owns the loader library and must outlive every call made
        // through `instance`, including the destroy on the error path.
        match unsafe { Self::init(&instance) } {
            Ok(selected) => Ok(Self {
                _entry: entry,
                instance,
                physical_device: selected.physical_device,
                device: selected.device,
                queue: selected.queue,
                memory_properties: selected.memory_properties,
                info: selected.info,
            }),
            Err(e) => {
                unsafe { instance.destroy_instance(None) };
                drop(entry);
                Err(e)
            }
        }
    }

    unsafe fn init(instance: &ash::Instance) -> Result<SelectedDevice, VulkanError> {
        let physical_devices = instance.enumerate_physical_devices()?;
        for (i, &pd) in physical_devices.iter().enumerate() {
            let props = instance.get_physical_device_properties(pd);
            log::debug!("device {}: {}", i, DeviceInfo::from_properties(&props).name);
        }

        let physical_device = select_first(&physical_devices)?;

        let properties = instance.get_physical_device_properties(physical_device);
        let info = DeviceInfo::from_properties(&properties);

        let families = instance.get_physical_device_queue_family_properties(physical_device);
        match families.get(QUEUE_FAMILY_INDEX as usize) {
            Some(family) if family.queue_flags.contains(vk::QueueFlags::COMPUTE) => {}
            Some(family) => log::warn!(
                "queue family {} on {} does not advertise COMPUTE ({:?})",
                QUEUE_FAMILY_INDEX,
                info.name,
                family.queue_flags
            ),
            None => {
                return Err(VulkanError::invalid_state(format!(
                    "{} exposes no queue families",
                    info.name
                )))
            }
        }

        let priorities = [1.0f32];
        let queue_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(QUEUE_FAMILY_INDEX)
            .queue_priorities(&priorities)];
        let device_info = vk::DeviceCreateInfo::default().queue_create_infos(&queue_infos);

        let device = instance.create_device(physical_device, &device_info, None)?;
        let queue = device.get_device_queue(QUEUE_FAMILY_INDEX, 0);
        let memory_properties = instance.get_physical_device_memory_properties(physical_device);

        log::info!(
            "selected {} ({}, Vulkan {}.{})",
            info.name,
            info.device_type,
            info.api_version_major,
            info.api_version_minor
        );

        Ok(SelectedDevice {
            physical_device,
            device,
            queue,
            memory_properties,
            info,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.info.name
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Memory type table of the selected device, queried once at creation.
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    pub fn queue_family_index(&self) -> u32 {
        QUEUE_FAMILY_INDEX
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub(crate) fn raw(&self) -> &ash::Device {
        &self.device
    }

    pub(crate) fn queue(&self) -> vk::Queue {
        self.queue
    }
}

/// Everything `init` creates under an instance it does not own.
struct SelectedDevice {
    physical_device: vk::PhysicalDevice,
    device: ash::Device,
    queue: vk::Queue,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    info: DeviceInfo,
}

/// First device in enumeration order, no preference for discrete GPUs.
fn select_first(physical_devices: &[vk::PhysicalDevice]) -> Result<vk::PhysicalDevice, VulkanError> {
    physical_devices.first().copied().ok_or(VulkanError::NoDeviceFound)
}

impl Drop for ComputeDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}

/// Snapshot of the selected device's identity and compute limits.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub name: String,
    pub device_type: &'static str,
    pub api_version_major: u32,
    pub api_version_minor: u32,
    pub vendor_id: u32,
    pub device_id: u32,
    pub max_compute_work_group_count: [u32; 3],
    pub max_compute_work_group_size: [u32; 3],
    pub max_compute_work_group_invocations: u32,
    pub max_storage_buffer_range: u32,
}

impl DeviceInfo {
    fn from_properties(props: &vk::PhysicalDeviceProperties) -> Self {
        let name = props
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| String::from("<unnamed device>"));
        Self {
            name,
            device_type: device_type_name(props.device_type),
            api_version_major: vk::api_version_major(props.api_version),
            api_version_minor: vk::api_version_minor(props.api_version),
            vendor_id: props.vendor_id,
            device_id: props.device_id,
            max_compute_work_group_count: props.limits.max_compute_work_group_count,
            max_compute_work_group_size: props.limits.max_compute_work_group_size,
            max_compute_work_group_invocations: props.limits.max_compute_work_group_invocations,
            max_storage_buffer_range: props.limits.max_storage_buffer_range,
        }
    }

    /// Check a dispatch of `local_size` work groups, each of `local_size`
    /// invocations along X, over `buffer_size` bytes against the device
    /// limits.
    pub fn check_dispatch(&self, local_size: u32, buffer_size: vk::DeviceSize) -> Result<(), VulkanError> {
        let checks = [
            ("work-group count", local_size as u64, self.max_compute_work_group_count[0] as u64),
            ("work-group size", local_size as u64, self.max_compute_work_group_size[0] as u64),
            (
                "work-group invocations",
                local_size as u64,
                self.max_compute_work_group_invocations as u64,
            ),
            ("storage buffer range", buffer_size, self.max_storage_buffer_range as u64),
        ];
        for (what, requested, limit) in checks {
            if requested > limit {
                return Err(VulkanError::DeviceLimitExceeded { what, requested, limit });
            }
        }
        Ok(())
    }
}

fn device_type_name(ty: vk::PhysicalDeviceType) -> &'static str {
    match ty {
        vk::PhysicalDeviceType::INTEGRATED_GPU => "integrated",
        vk::PhysicalDeviceType::DISCRETE_GPU => "discrete",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "virtual",
        vk::PhysicalDeviceType::CPU => "cpu",
        vk::PhysicalDeviceType::OTHER => "other",
        _ => "unknown",
    }
}
