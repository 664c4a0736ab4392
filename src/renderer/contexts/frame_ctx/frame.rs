use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::error::RenderError;

/// Synchronization triple for one frame slot
pub struct FrameSync {
    // Signals when the acquired swapchain image is ready to be rendered to.
    pub image_available: vk::Semaphore,

    // Signals when rendering commands have finished, gating presentation.
    pub render_finished: vk::Semaphore,

    // Signals when all of this slot's submitted work has finished on the GPU.
    pub in_flight: vk::Fence,

    device: Arc<ash::Device>,
}

impl FrameSync {
    pub fn new(device: Arc<ash::Device>) -> Result<Self> {
        let mut sync = Self {
            image_available: vk::Semaphore::null(),
            render_finished: vk::Semaphore::null(),
            in_flight: vk::Fence::null(),
            device,
        };

        // Filled in one by one; Drop skips handles that are still null
        unsafe {
            sync.image_available = sync.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(RenderError::sync("image-available semaphore"))?;
            sync.render_finished = sync.device
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                .map_err(RenderError::sync("render-finished semaphore"))?;
            // Created signaled so the very first wait returns immediately
            sync.in_flight = sync.device
                .create_fence(
                    &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                    None,
                )
                .map_err(RenderError::sync("in-flight fence"))?;
        }

        Ok(sync)
    }

    /// Blocks until the slot's previous submission has completed
    pub fn wait(&self) -> Result<()> {
        unsafe {
            self.device.wait_for_fences(&[self.in_flight], true, u64::MAX)?;
        }
        Ok(())
    }

    /// Unsignals the fence. Only valid right before a submit that will signal it again.
    pub fn reset(&self) -> Result<()> {
        unsafe {
            self.device.reset_fences(&[self.in_flight])?;
        }
        Ok(())
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            if self.in_flight != vk::Fence::null() {
                self.device.destroy_fence(self.in_flight, None);
            }
            if self.render_finished != vk::Semaphore::null() {
                self.device.destroy_semaphore(self.render_finished, None);
            }
            if self.image_available != vk::Semaphore::null() {
                self.device.destroy_semaphore(self.image_available, None);
            }
        }
    }
}

/// Cursor over the frame-in-flight slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRing {
    current: usize,
    len: usize,
}

impl FrameRing {
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "frame ring needs at least one slot");
        Self { current: 0, len }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    /// Moves to the next slot and returns it
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.len;
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_starts_at_zero() {
        assert_eq!(FrameRing::new(2).current(), 0);
    }

    #[test]
    fn test_ring_advance_stores_next_index() {
        let mut ring = FrameRing::new(2);
        ring.advance();
        assert_eq!(ring.current(), 1);
        ring.advance();
        assert_eq!(ring.current(), 0);
    }

    #[test]
    fn test_ring_stays_in_range_and_repeats() {
        for len in 1..5 {
            let mut ring = FrameRing::new(len);
            let slots = (0..4 * len)
                .map(|_| {
                    let slot = ring.current();
                    ring.advance();
                    slot
                })
                .collect::<Vec<_>>();
            assert!(slots.iter().all(|&s| s < len));
            for n in 0..slots.len() - len {
                assert_eq!(slots[n], slots[n + len]);
            }
        }
    }

    #[test]
    #[should_panic]
    fn test_empty_ring_is_rejected() {
        let _ = FrameRing::new(0);
    }
}
