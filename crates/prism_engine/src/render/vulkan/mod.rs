//! Explicit Vulkan device backend
//!
//! RAII wrappers over the raw API plus the [`VulkanDevice`]
//! implementation of the device seam. Everything here assumes single
//! threaded use after construction; the device may be constructed on
//! one thread and moved to the render thread before any frame work.

use ash::vk;
use thiserror::Error;

use crate::render::device::DeviceError;

mod buffer;
mod context;
mod device;
mod framebuffer;
mod pipeline;
mod render_pass;
mod shader;
mod swapchain;
mod sync;
mod texture;

pub use context::VulkanContext;
pub use device::VulkanDevice;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Vulkan context initialization failed
    #[error("initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("no suitable memory type found")]
    NoSuitableMemoryType,

    /// Upload data does not fit the destination resource
    #[error("invalid upload data: {0}")]
    InvalidData(String),

    /// A handle passed through the device seam resolves to nothing
    #[error("unknown resource handle: {0}")]
    UnknownHandle(u64),
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

impl From<VulkanError> for DeviceError {
    fn from(err: VulkanError) -> Self {
        match err {
            VulkanError::Api(vk::Result::ERROR_OUT_OF_DATE_KHR) => DeviceError::SwapchainOutOfDate,
            VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
            | VulkanError::Api(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
            | VulkanError::NoSuitableMemoryType
            | VulkanError::InvalidData(_) => DeviceError::Allocation(err.to_string()),
            other => DeviceError::Api(other.to_string()),
        }
    }
}
