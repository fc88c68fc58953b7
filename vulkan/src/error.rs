//! Error type shared by every GPU operation in this crate.

use ash::vk;
use thiserror::Error;

/// Error type for Vulkan compute operations.
#[derive(Debug, Error)]
pub enum VulkanError {
    /// The Vulkan loader library could not be found or loaded.
    #[error("failed to load Vulkan loader: {0}")]
    Loading(#[from] ash::LoadingError),

    /// Enumeration returned no physical devices.
    #[error("no Vulkan-capable device found")]
    NoDeviceFound,

    /// No memory type is both allowed by the resource and carries every
    /// required property bit.
    #[error("no memory type in mask {type_bits:#x} satisfies {required:?}")]
    NoSuitableMemoryType {
        type_bits: u32,
        required: vk::MemoryPropertyFlags,
    },

    /// More descriptor sets were requested than the pool was sized for.
    /// `result` is set when the driver reported the exhaustion.
    #[error("descriptor pool exhausted ({capacity} set(s) provisioned)")]
    DescriptorPoolExhausted {
        capacity: u32,
        result: Option<vk::Result>,
    },

    /// Malformed binary. `result` is set when the driver rejected it, and
    /// unset when the header check failed before any driver call.
    #[error("shader module creation failed: {reason}")]
    ShaderModuleCreationFailed {
        reason: String,
        result: Option<vk::Result>,
    },

    #[error("compute pipeline creation failed: {0}")]
    PipelineCreationFailed(vk::Result),

    /// An object was used out of order, e.g. a second memory bind or
    /// recording into a pending command buffer.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A dispatch or buffer size exceeds what the device supports.
    #[error("{what} of {requested} exceeds the device limit of {limit}")]
    DeviceLimitExceeded {
        what: &'static str,
        requested: u64,
        limit: u64,
    },

    /// A host mapping was requested on memory without HOST_VISIBLE.
    #[error("memory type {type_index} is not host visible")]
    NotHostVisible { type_index: u32 },

    /// Any other Vulkan API failure.
    #[error("Vulkan error: {0}")]
    Backend(#[from] vk::Result),
}

impl VulkanError {
    /// True when the error originates in the Vulkan API or loader rather
    /// than in the pipeline's own bookkeeping.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            VulkanError::Backend(_)
                | VulkanError::Loading(_)
                | VulkanError::PipelineCreationFailed(_)
                | VulkanError::ShaderModuleCreationFailed { result: Some(_), .. }
                | VulkanError::DescriptorPoolExhausted { result: Some(_), .. }
        )
    }

    pub(crate) fn invalid_state(msg: impl Into<String>) -> Self {
        VulkanError::InvalidState(msg.into())
    }
}
