pub mod frame;
pub mod swapchain;

use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::{eyre, WrapErr};
use crate::renderer::config::{RenderConfig, MAX_FRAMES_IN_FLIGHT};
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::frame_ctx::frame::{FrameRing, FrameSync};
use crate::renderer::contexts::frame_ctx::swapchain::{SurfaceSupport, Swapchain};
use crate::renderer::resources::image::{choose_depth_format, GpuImage};

/// Responsibilities:
/// - Negotiate and own the swapchain, its image views, and the shared depth buffer
/// - Own one synchronization triple per frame in flight and the slot cursor over them
///
/// Resizing is not handled; the window is created non-resizable.
pub struct PresentationChain {
    pub frames: Vec<FrameSync>,
    ring: FrameRing,
    pub depth_format: vk::Format,
    pub depth: GpuImage,
    pub swapchain: Swapchain,
}

impl PresentationChain {
    pub fn new(
        dev_ctx: &RenderDeviceContext,
        config: &RenderConfig,
    ) -> Result<Self> {
        let support = SurfaceSupport::query(dev_ctx)?;
        log::debug!(
            "Surface: {} format(s), present modes {:?}, image count {}..{}",
            support.formats.len(),
            support.present_modes,
            support.capabilities.min_image_count,
            support.capabilities.max_image_count,
        );

        let swapchain = Swapchain::new(
            dev_ctx,
            &support,
            vk::Extent2D {
                width: config.window_width,
                height: config.window_height,
            },
            config.prefer_mailbox,
        )?;

        let depth_format = choose_depth_format(dev_ctx)?;
        let depth = GpuImage::new_depth(dev_ctx, depth_format, swapchain.extent)
            .wrap_err("Failed to create depth buffer")?;
        log::debug!("Depth buffer format: {:?}", depth_format);

        let frames = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(dev_ctx.device.logical.clone()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            frames,
            ring: FrameRing::new(MAX_FRAMES_IN_FLIGHT),
            depth_format,
            depth,
            swapchain,
        })
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn format(&self) -> vk::Format {
        self.swapchain.format.format
    }

    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    pub fn current_frame(&self) -> usize {
        self.ring.current()
    }

    pub fn current_sync(&self) -> &FrameSync {
        &self.frames[self.ring.current()]
    }

    /// Acquires the next image, signalling the current slot's image-available semaphore.
    ///
    /// The slot's fence must already have been waited on.
    pub fn acquire_next(&self) -> Result<u32> {
        let sync = self.current_sync();
        match self.swapchain.acquire_next_image(sync.image_available) {
            Ok((image_index, suboptimal)) => {
                if suboptimal {
                    log::trace!("Swapchain is suboptimal for the surface");
                }
                Ok(image_index)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                Err(eyre!("Swapchain is out of date and recreation is not supported"))
            }
            Err(e) => Err(e).wrap_err("Failed to acquire swapchain image"),
        }
    }

    pub fn present(&self, queue: vk::Queue, image_index: u32) -> Result<()> {
        let sync = self.current_sync();
        match self.swapchain.present(queue, image_index, sync.render_finished) {
            Ok(suboptimal) => {
                if suboptimal {
                    log::trace!("Presented to a suboptimal swapchain");
                }
                Ok(())
            }
            Err(e) => Err(e).wrap_err("Failed to present swapchain image"),
        }
    }

    pub fn advance_frame(&mut self) -> usize {
        self.ring.advance()
    }
}
