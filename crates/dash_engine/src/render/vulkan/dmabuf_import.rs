//! DMA-BUF to `VkImage` import
//!
//! Steps per buffer: create an image declared as external DMA-BUF memory,
//! import a duplicate of the buffer's fd as device memory, bind it and create
//! a view. No pixel data is copied. Layout transitions are left to the
//! renderer that samples the image.

use std::collections::HashMap;
use std::os::fd::{AsRawFd, BorrowedFd, IntoRawFd};
use std::sync::Arc;

use ash::vk;

use super::gpu_context::GpuContext;
use crate::render::{ImageImporter, ImportError, TextureRef};
use crate::vision::ExternalBuffer;

const DRM_FORMAT_MOD_LINEAR: u64 = 0;

struct ImportedImage {
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
}

/// Imports camera buffers as sampleable Vulkan images
pub struct VulkanImageImporter {
    context: Arc<GpuContext>,
    format: vk::Format,
    bytes_per_pixel: u32,
    next_id: u64,
    images: HashMap<TextureRef, ImportedImage>,
}

impl VulkanImageImporter {
    /// Create an importer for linear images of `format`
    pub fn new(context: Arc<GpuContext>, format: vk::Format, bytes_per_pixel: u32) -> Self {
        Self { context, format, bytes_per_pixel, next_id: 0, images: HashMap::new() }
    }

    /// Importer for packed 8-bit RGB camera frames
    pub fn rgb(context: Arc<GpuContext>) -> Self {
        Self::new(context, vk::Format::R8G8B8_UNORM, 3)
    }

    /// View of an imported texture
    pub fn image_view(&self, texture: TextureRef) -> Option<vk::ImageView> {
        self.images.get(&texture).map(|image| image.view)
    }

    fn check_layout(&self, buffer: &ExternalBuffer) -> Result<(), ImportError> {
        buffer.validate()?;
        let row = min_row_pitch(buffer, self.bytes_per_pixel)?;
        // plain linear tiling cannot describe a custom pitch or offset
        let packed = buffer.offset == 0 && buffer.stride == row;
        if !self.context.supports_explicit_modifiers() && !packed {
            return Err(ImportError::InvalidBuffer(format!(
                "buffer {} needs an explicit layout (offset {}, stride {}) the device cannot express",
                buffer.id, buffer.offset, buffer.stride
            )));
        }
        Ok(())
    }

    unsafe fn create_image(&self, buffer: &ExternalBuffer) -> Result<vk::Image, ImportError> {
        let device = self.context.device();

        let mut external_info = vk::ExternalMemoryImageCreateInfo::builder()
            .handle_types(vk::ExternalMemoryHandleTypeFlags::DMA_BUF_EXT);
        let plane_layout = vk::SubresourceLayout {
            offset: buffer.offset,
            size: 0,
            row_pitch: u64::from(buffer.stride),
            array_pitch: 0,
            depth_pitch: 0,
        };
        let mut modifier_info = vk::ImageDrmFormatModifierExplicitCreateInfoEXT::builder()
            .drm_format_modifier(DRM_FORMAT_MOD_LINEAR)
            .plane_layouts(std::slice::from_ref(&plane_layout));

        let mut create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(self.format)
            .extent(vk::Extent3D { width: buffer.width, height: buffer.height, depth: 1 })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .usage(vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .push_next(&mut external_info);

        create_info = if self.context.supports_explicit_modifiers() {
            create_info
                .tiling(vk::ImageTiling::DRM_FORMAT_MODIFIER_EXT)
                .push_next(&mut modifier_info)
        } else {
            create_info.tiling(vk::ImageTiling::LINEAR)
        };

        device
            .create_image(&create_info, None)
            .map_err(|e| ImportError::Gpu(format!("vkCreateImage failed: {e:?}")))
    }

    unsafe fn import_memory(&self, buffer: &ExternalBuffer, image: vk::Image) -> Result<vk::DeviceMemory, ImportError> {
        let device = self.context.device();
        let requirements = device.get_image_memory_requirements(image);

        // Vulkan takes ownership of the fd on success, so hand it a duplicate
        let owned = BorrowedFd::borrow_raw(buffer.fd)
            .try_clone_to_owned()
            .map_err(|e| ImportError::InvalidBuffer(format!("cannot duplicate fd {}: {e}", buffer.fd)))?;

        let fd_bits = self
            .context
            .dma_buf_memory_type_bits(owned.as_raw_fd())
            .map_err(|e| ImportError::Gpu(format!("vkGetMemoryFdPropertiesKHR failed: {e:?}")))?;
        let memory_type = self
            .context
            .find_memory_type(requirements.memory_type_bits & fd_bits)
            .ok_or_else(|| ImportError::Gpu("no memory type accepts this buffer".to_string()))?;

        let mut import_info = vk::ImportMemoryFdInfoKHR::builder()
            .handle_type(vk::ExternalMemoryHandleTypeFlags::DMA_BUF_EXT)
            .fd(owned.as_raw_fd());
        let mut dedicated = vk::MemoryDedicatedAllocateInfo::builder().image(image);
        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type)
            .push_next(&mut import_info)
            .push_next(&mut dedicated);

        let memory = device
            .allocate_memory(&allocate_info, None)
            .map_err(|e| ImportError::Gpu(format!("vkAllocateMemory (DMA-BUF import) failed: {e:?}")))?;
        // the driver owns the duplicate now
        let _ = owned.into_raw_fd();
        Ok(memory)
    }

    unsafe fn import_dmabuf(&self, buffer: &ExternalBuffer) -> Result<ImportedImage, ImportError> {
        let device = self.context.device();
        let image = self.create_image(buffer)?;

        let memory = match self.import_memory(buffer, image) {
            Ok(memory) => memory,
            Err(err) => {
                device.destroy_image(image, None);
                return Err(err);
            }
        };

        if let Err(e) = device.bind_image_memory(image, memory, 0) {
            device.free_memory(memory, None);
            device.destroy_image(image, None);
            return Err(ImportError::Gpu(format!("vkBindImageMemory failed: {e:?}")));
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = match device.create_image_view(&view_info, None) {
            Ok(view) => view,
            Err(e) => {
                device.free_memory(memory, None);
                device.destroy_image(image, None);
                return Err(ImportError::Gpu(format!("vkCreateImageView failed: {e:?}")));
            }
        };

        Ok(ImportedImage { image, memory, view })
    }

    unsafe fn destroy(&self, imported: ImportedImage) {
        let device = self.context.device();
        device.destroy_image_view(imported.view, None);
        device.destroy_image(imported.image, None);
        device.free_memory(imported.memory, None);
    }
}

impl ImageImporter for VulkanImageImporter {
    fn import(&mut self, buffer: &ExternalBuffer) -> Result<TextureRef, ImportError> {
        self.check_layout(buffer)?;
        let imported = unsafe { self.import_dmabuf(buffer)? };

        self.next_id += 1;
        let texture = TextureRef::from_raw(self.next_id);
        self.images.insert(texture, imported);
        log::debug!("Imported buffer {} (fd {}) as texture {}", buffer.id, buffer.fd, texture.raw());
        Ok(texture)
    }

    fn release(&mut self, texture: TextureRef) {
        if let Some(imported) = self.images.remove(&texture) {
            unsafe { self.destroy(imported) };
        }
    }

    fn live_handles(&self) -> usize {
        self.images.len()
    }
}

impl Drop for VulkanImageImporter {
    fn drop(&mut self) {
        let images: Vec<_> = self.images.drain().map(|(_, imported)| imported).collect();
        for imported in images {
            unsafe { self.destroy(imported) };
        }
    }
}

/// Bytes one row of `buffer` occupies, checked against its stride
fn min_row_pitch(buffer: &ExternalBuffer, bytes_per_pixel: u32) -> Result<u32, ImportError> {
    let row = buffer.width.checked_mul(bytes_per_pixel).ok_or_else(|| {
        ImportError::InvalidBuffer(format!("buffer {} width {} overflows a row", buffer.id, buffer.width))
    })?;
    if buffer.stride < row {
        return Err(ImportError::InvalidBuffer(format!(
            "stride {} too small for {} pixels of {} bytes",
            buffer.stride, buffer.width, bytes_per_pixel
        )));
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(width: u32, stride: u32) -> ExternalBuffer {
        ExternalBuffer { id: 7, fd: 3, size: u64::from(stride) * 4, offset: 0, stride, width, height: 4 }
    }

    #[test]
    fn test_row_pitch_for_packed_rgb() {
        assert_eq!(min_row_pitch(&buffer(1164, 3492), 3), Ok(3492));
        assert_eq!(min_row_pitch(&buffer(1164, 3584), 3), Ok(3492));
    }

    #[test]
    fn test_row_pitch_rejects_short_stride() {
        assert!(matches!(min_row_pitch(&buffer(1164, 1164), 3), Err(ImportError::InvalidBuffer(_))));
    }

    #[test]
    fn test_row_pitch_rejects_overflowing_width() {
        let wide = buffer(u32::MAX / 2, u32::MAX);
        assert!(matches!(min_row_pitch(&wide, 3), Err(ImportError::InvalidBuffer(_))));
    }
}
