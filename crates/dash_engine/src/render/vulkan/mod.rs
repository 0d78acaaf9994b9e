//! Vulkan zero-copy frame import (Linux)
//!
//! A headless [`GpuContext`] and an [`ImageImporter`](crate::render::ImageImporter)
//! that turns camera DMA-BUFs into `VkImage`s sharing the camera's memory.

#![allow(unsafe_code)]

pub mod dmabuf_import;
pub mod gpu_context;

pub use dmabuf_import::VulkanImageImporter;
pub use gpu_context::{GpuContext, GpuError};
