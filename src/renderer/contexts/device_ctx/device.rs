use std::ffi::{c_char, CStr};
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::instance::{RenderInstance, RenderSurface};
use crate::renderer::contexts::device_ctx::queue::{Queue, QueueFamilyIndices};
use crate::renderer::error::RenderError;

/// Logical device plus the capability snapshot of the physical device behind it
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,

    pub graphics_queue: Queue,
    pub present_queue: Queue,

    // Per-frame command buffers are re-recorded, so the pool allows individual resets
    pub command_pool: vk::CommandPool,
}

impl RenderDevice {
    pub fn new(
        instance: &RenderInstance,
        surface: &RenderSurface,
    ) -> Result<Self> {
        let (physical_device, queue_families) = Self::select_physical_device(
            &instance.instance,
            surface,
        )?;

        let (properties, memory_properties) = unsafe {
            (
                instance.instance.get_physical_device_properties(physical_device),
                instance.instance.get_physical_device_memory_properties(physical_device),
            )
        };
        log::info!(
            "Selected physical device: {:?} ({:?})",
            properties.device_name_as_c_str().unwrap_or(c"<unnamed>"),
            properties.device_type,
        );

        let (
            logical_device,
            graphics_queue,
            present_queue,
        ) = Self::create_logical_device(
            &instance.instance,
            physical_device,
            queue_families,
        )?;

        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(graphics_queue.family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = match unsafe { logical_device.create_command_pool(&command_pool_info, None) } {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { logical_device.destroy_device(None) };
                return Err(RenderError::creation("command pool")(e).into());
            }
        };

        Ok(Self {
            logical: Arc::new(logical_device),
            physical: physical_device,
            properties,
            memory_properties,
            queue_families,
            graphics_queue,
            present_queue,
            command_pool,
        })
    }

    pub fn allocate_command_buffers(&self, count: u32) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        let buffers = unsafe {
            self.logical
                .allocate_command_buffers(&info)
                .map_err(RenderError::creation("command buffers"))?
        };
        Ok(buffers)
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.logical.device_wait_idle()? };
        Ok(())
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: &RenderSurface,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let devices = unsafe { instance.enumerate_physical_devices()? };
        log::debug!("Found {} physical device(s)", devices.len());

        devices
            .into_iter()
            // Filter out devices that cannot present through a swapchain
            .filter(|device| Self::supports_required_extensions(instance, *device))
            .find_map(|device| {
                let families = unsafe {
                    instance.get_physical_device_queue_family_properties(device)
                };
                let indices = QueueFamilyIndices::find(&families, |i| unsafe {
                    surface
                        .loader
                        .get_physical_device_surface_support(device, i, surface.surface)
                        .unwrap_or(false)
                });
                indices.is_complete().then_some((device, indices))
            })
            .ok_or_else(|| RenderError::DeviceSelectionFailure.into())
    }

    fn supports_required_extensions(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
        let supported = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .unwrap_or_default()
        };
        Self::get_required_device_extensions().iter().all(|req_ext| {
            let found = supported
                .iter()
                .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == *req_ext));
            if !found {
                log::warn!("Device extension not supported: {:?}", req_ext);
            }
            found
        })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: QueueFamilyIndices,
    ) -> Result<(ash::Device, Queue, Queue)> {
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics, queue_families.present)
        else {
            return Err(RenderError::DeviceSelectionFailure.into());
        };

        // One queue per distinct family; a single submit call covers all recorded work
        let queue_priorities = [1.0];
        let queue_create_infos = queue_families
            .unique()
            .into_iter()
            .map(|index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(index)
                    .queue_priorities(&queue_priorities)
            })
            .collect::<smallvec::SmallVec<[_; 2]>>();

        let enabled_extension_names = Self::get_required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();
        let enabled_features = vk::PhysicalDeviceFeatures::default();

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .enabled_features(&enabled_features);

        let device = unsafe {
            instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(RenderError::creation("logical device"))?
        };

        let graphics_queue = unsafe {
            Queue::new(graphics_family, device.get_device_queue(graphics_family, 0))
        };
        let present_queue = unsafe {
            Queue::new(present_family, device.get_device_queue(present_family, 0))
        };

        Ok((device, graphics_queue, present_queue))
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            self.logical.destroy_command_pool(self.command_pool, None);
            self.logical.destroy_device(None);
        }
    }
}
