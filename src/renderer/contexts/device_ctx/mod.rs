pub mod instance;
pub mod device;
pub mod queue;
pub mod transfer_ctx;

use color_eyre::Result;
use winit::window::Window;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::instance::{RenderInstance, RenderSurface};
use crate::renderer::contexts::device_ctx::transfer_ctx::TransferContext;

/// Responsibilities:
/// - Manage the Vulkan instance, surface, device, and queues
/// - Own the command pool that per-frame and one-shot command buffers come from
///
/// Created first and dropped last; field order is the teardown order.
pub struct RenderDeviceContext {
    pub device: RenderDevice,
    pub surface: RenderSurface,
    pub instance: RenderInstance,
}

impl RenderDeviceContext {
    pub fn new(
        window: &Window,
        config: &RenderConfig,
    ) -> Result<Self> {
        let instance = RenderInstance::new(window, config.enable_validation)?;
        let surface = instance.create_surface(window)?;
        let device = RenderDevice::new(&instance, &surface)?;

        Ok(Self {
            device,
            surface,
            instance,
        })
    }

    pub fn transfer(&self) -> TransferContext<'_> {
        TransferContext::new(
            &self.device.logical,
            self.device.command_pool,
            self.device.graphics_queue,
        )
    }
}
