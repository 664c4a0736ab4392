use std::sync::Arc;
use ash::prelude::VkResult;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::error::RenderError;
use crate::renderer::resources::image::create_image_view;

/// What the surface reports for the selected physical device
#[derive(Debug, Clone, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(dev_ctx: &RenderDeviceContext) -> Result<Self> {
        let loader = &dev_ctx.surface.loader;
        let surface = dev_ctx.surface.surface;
        let physical = dev_ctx.device.physical;
        let query_err = |what: &str| {
            let what = what.to_owned();
            move |e: vk::Result| RenderError::PresentationQueryFailure(format!("{}: {}", what, e))
        };

        unsafe {
            Ok(Self {
                capabilities: loader
                    .get_physical_device_surface_capabilities(physical, surface)
                    .map_err(query_err("capabilities"))?,
                formats: loader
                    .get_physical_device_surface_formats(physical, surface)
                    .map_err(query_err("formats"))?,
                present_modes: loader
                    .get_physical_device_surface_present_modes(physical, surface)
                    .map_err(query_err("present modes"))?,
            })
        }
    }
}

/// The presentable images, one view per image
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,

    device: Arc<ash::Device>,
}

impl Swapchain {
    pub fn new(
        dev_ctx: &RenderDeviceContext,
        support: &SurfaceSupport,
        requested: vk::Extent2D,
        prefer_mailbox: bool,
    ) -> Result<Self> {
        let format = choose_surface_format(&support.formats)?;
        let present_mode = choose_present_mode(&support.present_modes, prefer_mailbox)?;
        let extent = choose_extent(&support.capabilities, requested.width, requested.height);
        let min_image_count = choose_image_count(&support.capabilities);

        let capabilities = &support.capabilities;
        let pre_transform = if capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            capabilities.current_transform
        };

        let queue_families = dev_ctx.device.queue_families.unique();
        // Graphics and present on different families share the images concurrently
        let (sharing_mode, queue_family_indices) = if queue_families.len() > 1 {
            (vk::SharingMode::CONCURRENT, &queue_families[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &queue_families[..0])
        };

        let device = dev_ctx.device.logical.clone();
        let swapchain_loader = ash::khr::swapchain::Device::new(
            &dev_ctx.instance.instance,
            &device,
        );
        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(dev_ctx.surface.surface)
            .min_image_count(min_image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(queue_family_indices)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .image_array_layers(1);

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&swapchain_info, None)
                .map_err(RenderError::creation("swapchain"))?
        };

        let mut chain = Self {
            swapchain,
            swapchain_loader,
            images: Vec::new(),
            image_views: Vec::new(),
            format,
            present_mode,
            extent,
            device,
        };
        // Views are created into `chain` so a failure part-way still destroys the earlier ones
        chain.images = unsafe {
            chain.swapchain_loader.get_swapchain_images(chain.swapchain)?
        };
        for &image in &chain.images {
            let view = create_image_view(
                &chain.device,
                image,
                format.format,
                vk::ImageAspectFlags::COLOR,
            )?;
            chain.image_views.push(view);
        }

        log::info!(
            "Swapchain created: {} images, {}x{}, {:?}, {:?}",
            chain.images.len(),
            extent.width,
            extent.height,
            format.format,
            present_mode,
        );

        Ok(chain)
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Returns the image index and whether the swapchain is suboptimal
    pub fn acquire_next_image(&self, signal: vk::Semaphore) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                signal,
                vk::Fence::null(),
            )
        }
    }

    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for view in self.image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Prefers BGRA8 sRGB with a nonlinear sRGB color space, otherwise the first reported format
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR, RenderError> {
    formats
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
        .ok_or_else(|| RenderError::PresentationQueryFailure("surface reports no formats".into()))
}

/// MAILBOX when offered and wanted, otherwise FIFO, which every surface must support
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    prefer_mailbox: bool,
) -> Result<vk::PresentModeKHR, RenderError> {
    if present_modes.is_empty() {
        return Err(RenderError::PresentationQueryFailure("surface reports no present modes".into()));
    }
    if prefer_mailbox && present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        Ok(vk::PresentModeKHR::MAILBOX)
    } else {
        Ok(vk::PresentModeKHR::FIFO)
    }
}

/// Requested window size clamped into the surface's supported extent range
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: width.clamp(min.width, max.width.max(min.width)),
        height: height.clamp(min.height, max.height.max(min.height)),
    }
}

/// One more than the minimum, capped when the surface reports a maximum
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32, min_extent: (u32, u32), max_extent: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            min_image_extent: vk::Extent2D { width: min_extent.0, height: min_extent.1 },
            max_image_extent: vk::Extent2D { width: max_extent.0, height: max_extent.1 },
            ..Default::default()
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(selected.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_choose_surface_format_needs_matching_color_space() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT,
            },
        ];
        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_surface_format_empty_fails() {
        assert!(matches!(
            choose_surface_format(&[]),
            Err(RenderError::PresentationQueryFailure(_))
        ));
    }

    #[test]
    fn test_choose_present_mode_prefers_mailbox() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes, true).unwrap(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(choose_present_mode(&modes, false).unwrap(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_present_mode_fallback_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes, true).unwrap(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_present_mode_none_is_fatal() {
        assert!(choose_present_mode(&[], true).is_err());
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let caps = capabilities(2, 3, (100, 100), (2000, 2000));
        let extent = choose_extent(&caps, 3000, 50);
        assert_eq!((extent.width, extent.height), (2000, 100));
        let extent = choose_extent(&caps, 800, 600);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_choose_image_count() {
        assert_eq!(choose_image_count(&capabilities(2, 3, (1, 1), (1, 1))), 3);
        assert_eq!(choose_image_count(&capabilities(2, 2, (1, 1), (1, 1))), 2);
        assert_eq!(choose_image_count(&capabilities(2, 8, (1, 1), (1, 1))), 3);
        // 0 means no upper limit
        assert_eq!(choose_image_count(&capabilities(3, 0, (1, 1), (1, 1))), 4);
    }

    #[test]
    fn test_image_count_within_surface_bounds() {
        for min in 1..6 {
            for max in [0, min, min + 1, min + 4] {
                let count = choose_image_count(&capabilities(min, max, (1, 1), (1, 1)));
                assert!(count >= min);
                if max > 0 {
                    assert!(count <= max);
                }
            }
        }
    }

    #[test]
    fn test_fixed_480_surface() {
        let caps = capabilities(2, 3, (480, 480), (480, 480));
        assert_eq!(choose_image_count(&caps), 3);
        let extent = choose_extent(&caps, 480, 480);
        assert_eq!((extent.width, extent.height), (480, 480));
    }
}
