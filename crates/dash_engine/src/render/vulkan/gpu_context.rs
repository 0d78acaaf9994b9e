//! Headless Vulkan device able to import DMA-BUF memory

use std::ffi::{CStr, CString};

use ash::extensions::khr::ExternalMemoryFd;
use ash::{vk, Device, Entry, Instance};

const EXT_EXTERNAL_MEMORY_FD: &CStr = c"VK_KHR_external_memory_fd";
const EXT_EXTERNAL_MEMORY_DMA_BUF: &CStr = c"VK_EXT_external_memory_dma_buf";
const EXT_IMAGE_DRM_FORMAT_MODIFIER: &CStr = c"VK_EXT_image_drm_format_modifier";
const EXT_IMAGE_FORMAT_LIST: &CStr = c"VK_KHR_image_format_list";

/// GPU context creation errors. These are fatal and only occur before the loop starts.
#[derive(thiserror::Error, Debug)]
pub enum GpuError {
    /// The Vulkan loader could not be found
    #[error("failed to load Vulkan: {0}")]
    Load(String),
    /// A Vulkan call failed
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),
    /// No device supports zero-copy import
    #[error("no GPU supports DMA-BUF import")]
    NoSuitableDevice,
    /// Bad application name
    #[error("invalid application name: {0}")]
    InvalidName(String),
}

impl From<vk::Result> for GpuError {
    fn from(result: vk::Result) -> Self {
        GpuError::Api(result)
    }
}

/// Instance, device and queue used for frame imports
pub struct GpuContext {
    _entry: Entry,
    instance: Instance,
    physical_device: vk::PhysicalDevice,
    device: Device,
    queue_family: u32,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    external_memory_fd: ExternalMemoryFd,
    explicit_modifiers: bool,
}

impl GpuContext {
    /// Create a context on the first device with DMA-BUF import support
    pub fn new(app_name: &str) -> Result<Self, GpuError> {
        let entry = unsafe { Entry::load() }.map_err(|e| GpuError::Load(e.to_string()))?;

        let app_name = CString::new(app_name).map_err(|e| GpuError::InvalidName(e.to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"dash_engine")
            .api_version(vk::API_VERSION_1_1);
        let create_info = vk::InstanceCreateInfo::builder().application_info(&app_info);
        let instance = unsafe { entry.create_instance(&create_info, None)? };

        match Self::open_device(&instance) {
            Ok((physical_device, queue_family, explicit_modifiers, device)) => {
                let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };
                let external_memory_fd = ExternalMemoryFd::new(&instance, &device);
                Ok(Self {
                    _entry: entry,
                    instance,
                    physical_device,
                    device,
                    queue_family,
                    memory_properties,
                    external_memory_fd,
                    explicit_modifiers,
                })
            }
            Err(err) => {
                unsafe { instance.destroy_instance(None) };
                Err(err)
            }
        }
    }

    fn open_device(instance: &Instance) -> Result<(vk::PhysicalDevice, u32, bool, Device), GpuError> {
        let devices = unsafe { instance.enumerate_physical_devices()? };

        for physical_device in devices {
            let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device)? };
            let has = |name: &CStr| {
                extensions
                    .iter()
                    .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == name)
            };
            if !has(EXT_EXTERNAL_MEMORY_FD) || !has(EXT_EXTERNAL_MEMORY_DMA_BUF) {
                continue;
            }
            let explicit_modifiers = has(EXT_IMAGE_DRM_FORMAT_MODIFIER) && has(EXT_IMAGE_FORMAT_LIST);

            let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
            let Some(queue_family) = families
                .iter()
                .position(|family| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                .map(|index| index as u32)
            else {
                continue;
            };

            let mut enabled = vec![EXT_EXTERNAL_MEMORY_FD.as_ptr(), EXT_EXTERNAL_MEMORY_DMA_BUF.as_ptr()];
            if explicit_modifiers {
                enabled.push(EXT_IMAGE_DRM_FORMAT_MODIFIER.as_ptr());
                enabled.push(EXT_IMAGE_FORMAT_LIST.as_ptr());
            }

            let priorities = [1.0];
            let queue_info = vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(queue_family)
                .queue_priorities(&priorities)
                .build();
            let create_info = vk::DeviceCreateInfo::builder()
                .queue_create_infos(std::slice::from_ref(&queue_info))
                .enabled_extension_names(&enabled);

            let device = unsafe { instance.create_device(physical_device, &create_info, None)? };

            let properties = unsafe { instance.get_physical_device_properties(physical_device) };
            log::info!(
                "Selected GPU {} for frame import (explicit modifiers: {})",
                unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy(),
                explicit_modifiers
            );
            return Ok((physical_device, queue_family, explicit_modifiers, device));
        }

        Err(GpuError::NoSuitableDevice)
    }

    /// Logical device
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Physical device
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Graphics queue family index
    pub fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Whether images can be created with an explicit DRM modifier layout
    pub fn supports_explicit_modifiers(&self) -> bool {
        self.explicit_modifiers
    }

    /// Memory types usable for importing `fd`
    pub(crate) fn dma_buf_memory_type_bits(&self, fd: i32) -> Result<u32, vk::Result> {
        let properties = unsafe {
            self.external_memory_fd
                .get_memory_fd_properties(vk::ExternalMemoryHandleTypeFlags::DMA_BUF_EXT, fd)?
        };
        Ok(properties.memory_type_bits)
    }

    /// First memory type allowed by `type_bits`, device-local preferred
    pub(crate) fn find_memory_type(&self, type_bits: u32) -> Option<u32> {
        let candidates = |flags: vk::MemoryPropertyFlags| {
            (0..self.memory_properties.memory_type_count).find(|&i| {
                type_bits & (1 << i) != 0
                    && self
                        .memory_properties
                        .memory_types
                        .get(i as usize)
                        .is_some_and(|ty| ty.property_flags.contains(flags))
            })
        };
        candidates(vk::MemoryPropertyFlags::DEVICE_LOCAL).or_else(|| candidates(vk::MemoryPropertyFlags::empty()))
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
