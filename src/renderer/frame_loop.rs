use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use crate::renderer::config::MAX_FRAMES_IN_FLIGHT;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::frame_ctx::PresentationChain;
use crate::renderer::contexts::pipeline_ctx::render_pass::RenderPassPlan;
use crate::renderer::error::RenderError;
use crate::renderer::scene::{FrameUpdateData, SceneObject};

/// Where the current frame slot is in its wait/acquire/record/submit cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    #[default]
    Idle,
    FenceWaited,
    Acquired,
    Recording,
    Recorded,
    Submitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    WaitFence,
    ResetFrame,
    BeginRecord,
    Dispatch,
    EndRecord,
    Submit,
    Present,
}

impl FramePhase {
    pub fn next(self, step: FrameStep) -> Result<FramePhase, RenderError> {
        use FramePhase::*;
        use FrameStep::*;

        match (self, step) {
            (Idle, WaitFence) => Ok(FenceWaited),
            (FenceWaited, ResetFrame) => Ok(Acquired),
            (Acquired, BeginRecord) => Ok(Recording),
            (Recording, Dispatch) => Ok(Recording),
            (Recording, EndRecord) => Ok(Recorded),
            (Recorded, Submit) => Ok(Submitted),
            (Submitted, Present) => Ok(Idle),
            (phase, step) => Err(RenderError::InvalidFrameStep { step, phase }),
        }
    }
}

/// Host-side operations on the current frame slot's fence, image and command buffer
pub trait FrameSlot {
    fn wait_fence(&self) -> Result<()>;
    fn acquire_image(&self) -> Result<u32>;
    fn reset_command_buffer(&self) -> Result<()>;
    fn reset_fence(&self) -> Result<()>;
}

/// Phase tracking for one frame at a time. A step's work only runs when the step is
/// legal in the current phase, and the phase only moves once that work succeeds.
#[derive(Debug, Default)]
pub struct FrameCycle {
    phase: FramePhase,
}

impl FrameCycle {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    pub fn advance<T>(&mut self, step: FrameStep, work: impl FnOnce() -> Result<T>) -> Result<T> {
        let next = self.phase.next(step)?;
        let out = work()?;
        self.phase = next;
        Ok(out)
    }

    /// Waits for the slot's fence, acquires an image, and only then resets the slot's
    /// command buffer. The fence itself stays signaled.
    pub fn reset_frame(&mut self, slot: &impl FrameSlot) -> Result<u32> {
        self.advance(FrameStep::WaitFence, || slot.wait_fence())?;
        self.advance(FrameStep::ResetFrame, || {
            let image_index = slot.acquire_image()?;
            slot.reset_command_buffer()?;
            Ok(image_index)
        })
    }

    /// Unsignals the slot's fence immediately before the submit that signals it again,
    /// so an abandoned frame never leaves a fence nothing will signal.
    pub fn submit(&mut self, slot: &impl FrameSlot, submit: impl FnOnce() -> Result<()>) -> Result<()> {
        self.advance(FrameStep::Submit, || {
            slot.reset_fence()?;
            submit()
        })
    }
}

/// The live slot of a presentation chain
struct ChainSlot<'a> {
    chain: &'a PresentationChain,
    device: &'a ash::Device,
    command_buffer: vk::CommandBuffer,
}

impl FrameSlot for ChainSlot<'_> {
    fn wait_fence(&self) -> Result<()> {
        self.chain.current_sync().wait()
    }

    fn acquire_image(&self) -> Result<u32> {
        self.chain.acquire_next()
    }

    fn reset_command_buffer(&self) -> Result<()> {
        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())?;
        }
        Ok(())
    }

    fn reset_fence(&self) -> Result<()> {
        self.chain.current_sync().reset()
    }
}

/// Responsibilities:
/// - Own one primary command buffer per frame slot
/// - Drive a frame through wait, acquire, record, dispatch, submit and present, in that order
pub struct FrameLoop {
    command_buffers: Vec<vk::CommandBuffer>,
    cycle: FrameCycle,
    image_index: u32,
    clear_color: [f32; 4],
    device: Arc<ash::Device>,
}

impl FrameLoop {
    pub fn new(
        dev: &RenderDevice,
        clear_color: [f32; 4],
    ) -> Result<Self> {
        // Freed along with the device's command pool
        let command_buffers = dev.allocate_command_buffers(MAX_FRAMES_IN_FLIGHT as u32)?;

        Ok(Self {
            command_buffers,
            cycle: FrameCycle::new(),
            image_index: 0,
            clear_color,
            device: dev.logical.clone(),
        })
    }

    /// Runs every step for one displayed frame
    pub fn run_frame(
        &mut self,
        dev: &RenderDevice,
        chain: &mut PresentationChain,
        plan: &RenderPassPlan,
        scene: &mut SceneObject,
        pipeline_layout: vk::PipelineLayout,
        elapsed_secs: f32,
    ) -> Result<()> {
        self.reset_frame(chain)?;
        self.begin_record(chain, plan)?;
        self.dispatch(chain, scene, pipeline_layout, elapsed_secs)?;
        self.end_record(chain)?;
        self.submit_and_present(dev, chain)
    }

    pub fn reset_frame(&mut self, chain: &PresentationChain) -> Result<()> {
        let slot = ChainSlot {
            chain,
            device: &self.device,
            command_buffer: self.command_buffers[chain.current_frame()],
        };
        self.image_index = self.cycle.reset_frame(&slot)?;
        log::trace!("Frame slot {} acquired image {}", chain.current_frame(), self.image_index);
        Ok(())
    }

    pub fn begin_record(
        &mut self,
        chain: &PresentationChain,
        plan: &RenderPassPlan,
    ) -> Result<()> {
        let device = &self.device;
        let cmd = self.command_buffers[chain.current_frame()];
        let image_index = self.image_index;
        let clear_color = self.clear_color;

        self.cycle.advance(FrameStep::BeginRecord, || {
            let framebuffer = plan.framebuffer(image_index)?;
            let extent = chain.extent();

            let clear_values = clear_values(clear_color);
            let render_area = vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            };
            let render_pass_info = vk::RenderPassBeginInfo::default()
                .render_pass(plan.render_pass)
                .framebuffer(framebuffer)
                .render_area(render_area)
                .clear_values(&clear_values);

            let viewport = full_viewport(extent);

            unsafe {
                device
                    .begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::default())
                    .wrap_err("Failed to begin command buffer")?;
                device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
                device.cmd_set_viewport(cmd, 0, &[viewport]);
                device.cmd_set_scissor(cmd, 0, &[render_area]);
            }
            Ok(())
        })
    }

    pub fn dispatch(
        &mut self,
        chain: &PresentationChain,
        scene: &mut SceneObject,
        pipeline_layout: vk::PipelineLayout,
        elapsed_secs: f32,
    ) -> Result<()> {
        let frame_index = chain.current_frame();
        let data = FrameUpdateData {
            frame_index,
            command_buffer: self.command_buffers[frame_index],
            pipeline_layout,
            elapsed_secs,
        };
        self.cycle.advance(FrameStep::Dispatch, || scene.dispatch_frame(&data))
    }

    pub fn end_record(&mut self, chain: &PresentationChain) -> Result<()> {
        let device = &self.device;
        let cmd = self.command_buffers[chain.current_frame()];

        self.cycle.advance(FrameStep::EndRecord, || {
            unsafe {
                device.cmd_end_render_pass(cmd);
                device
                    .end_command_buffer(cmd)
                    .wrap_err("Failed to record command buffer")?;
            }
            Ok(())
        })
    }

    pub fn submit_and_present(
        &mut self,
        dev: &RenderDevice,
        chain: &mut PresentationChain,
    ) -> Result<()> {
        let image_index = self.image_index;
        {
            let device: &ash::Device = &self.device;
            let slot = ChainSlot {
                chain: &*chain,
                device,
                command_buffer: self.command_buffers[chain.current_frame()],
            };

            let sync = chain.current_sync();
            let wait_semaphores = [sync.image_available];
            let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
            let signal_semaphores = [sync.render_finished];
            let command_buffers = [slot.command_buffer];
            let submit_info = vk::SubmitInfo::default()
                .wait_semaphores(&wait_semaphores)
                .wait_dst_stage_mask(&wait_stages)
                .command_buffers(&command_buffers)
                .signal_semaphores(&signal_semaphores);

            self.cycle.submit(&slot, || {
                unsafe {
                    device
                        .queue_submit(
                            dev.graphics_queue.handle,
                            std::slice::from_ref(&submit_info),
                            sync.in_flight,
                        )
                        .wrap_err("Failed to submit draw command buffer")?;
                }
                Ok(())
            })?;
        }

        self.cycle.advance(FrameStep::Present, || {
            chain.present(dev.present_queue.handle, image_index)
        })?;
        chain.advance_frame();
        Ok(())
    }
}

fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue { float32: color },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
        },
    ]
}

fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use color_eyre::eyre::eyre;

    const CYCLE: [FrameStep; 7] = [
        FrameStep::WaitFence,
        FrameStep::ResetFrame,
        FrameStep::BeginRecord,
        FrameStep::Dispatch,
        FrameStep::EndRecord,
        FrameStep::Submit,
        FrameStep::Present,
    ];

    /// Slot whose fence is only signaled again by a successful submit
    struct FakeSlot {
        calls: RefCell<Vec<&'static str>>,
        fence_signaled: Cell<bool>,
        fail_acquire: bool,
    }

    impl FakeSlot {
        fn new() -> Self {
            Self {
                calls: RefCell::default(),
                fence_signaled: Cell::new(true),
                fail_acquire: false,
            }
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.borrow().clone()
        }
    }

    impl FrameSlot for FakeSlot {
        fn wait_fence(&self) -> Result<()> {
            self.calls.borrow_mut().push("wait_fence");
            if !self.fence_signaled.get() {
                return Err(eyre!("waiting on a fence nothing will signal"));
            }
            Ok(())
        }

        fn acquire_image(&self) -> Result<u32> {
            self.calls.borrow_mut().push("acquire_image");
            if self.fail_acquire {
                return Err(eyre!("Swapchain is out of date"));
            }
            Ok(2)
        }

        fn reset_command_buffer(&self) -> Result<()> {
            self.calls.borrow_mut().push("reset_command_buffer");
            Ok(())
        }

        fn reset_fence(&self) -> Result<()> {
            self.calls.borrow_mut().push("reset_fence");
            self.fence_signaled.set(false);
            Ok(())
        }
    }

    fn record(cycle: &mut FrameCycle) {
        for step in [FrameStep::BeginRecord, FrameStep::Dispatch, FrameStep::EndRecord] {
            cycle.advance(step, || Ok(())).unwrap();
        }
    }

    #[test]
    fn test_full_cycle_returns_to_idle() {
        let mut phase = FramePhase::Idle;
        for _ in 0..3 {
            for step in CYCLE {
                phase = phase.next(step).unwrap();
            }
            assert_eq!(phase, FramePhase::Idle);
        }
    }

    #[test]
    fn test_cycle_visits_every_phase() {
        let mut phase = FramePhase::Idle;
        let visited: Vec<_> = CYCLE
            .iter()
            .map(|&step| {
                phase = phase.next(step).unwrap();
                phase
            })
            .collect();
        assert_eq!(
            visited,
            vec![
                FramePhase::FenceWaited,
                FramePhase::Acquired,
                FramePhase::Recording,
                FramePhase::Recording,
                FramePhase::Recorded,
                FramePhase::Submitted,
                FramePhase::Idle,
            ]
        );
    }

    #[test]
    fn test_begin_record_requires_acquired_image() {
        let err = FramePhase::FenceWaited.next(FrameStep::BeginRecord).unwrap_err();
        assert!(matches!(
            err,
            RenderError::InvalidFrameStep { step: FrameStep::BeginRecord, phase: FramePhase::FenceWaited }
        ));
    }

    #[test]
    fn test_reset_only_after_fence_wait() {
        for phase in [
            FramePhase::Idle,
            FramePhase::Acquired,
            FramePhase::Recording,
            FramePhase::Recorded,
            FramePhase::Submitted,
        ] {
            assert!(phase.next(FrameStep::ResetFrame).is_err(), "{phase:?}");
        }
        assert!(FramePhase::FenceWaited.next(FrameStep::ResetFrame).is_ok());
    }

    #[test]
    fn test_dispatch_only_while_recording() {
        assert!(FramePhase::Recording.next(FrameStep::Dispatch).is_ok());
        assert!(FramePhase::Acquired.next(FrameStep::Dispatch).is_err());
        assert!(FramePhase::Recorded.next(FrameStep::Dispatch).is_err());
    }

    #[test]
    fn test_no_double_submit_or_early_present() {
        assert!(FramePhase::Submitted.next(FrameStep::Submit).is_err());
        assert!(FramePhase::Recording.next(FrameStep::Submit).is_err());
        assert!(FramePhase::Recorded.next(FrameStep::Present).is_err());
    }

    #[test]
    fn test_command_buffer_reset_follows_fence_wait() {
        let slot = FakeSlot::new();
        let mut cycle = FrameCycle::new();

        assert_eq!(cycle.reset_frame(&slot).unwrap(), 2);
        assert_eq!(slot.calls(), vec!["wait_fence", "acquire_image", "reset_command_buffer"]);
        assert_eq!(cycle.phase(), FramePhase::Acquired);
    }

    #[test]
    fn test_rejected_step_does_no_work() {
        let mut cycle = FrameCycle::new();
        let ran = Cell::new(false);

        let result = cycle.advance(FrameStep::ResetFrame, || {
            ran.set(true);
            Ok(())
        });
        assert!(result.is_err());
        assert!(!ran.get());
        assert_eq!(cycle.phase(), FramePhase::Idle);
    }

    #[test]
    fn test_fence_reset_happens_right_before_submit() {
        let slot = FakeSlot::new();
        let mut cycle = FrameCycle::new();

        cycle.reset_frame(&slot).unwrap();
        record(&mut cycle);
        assert!(slot.fence_signaled.get());

        cycle
            .submit(&slot, || {
                slot.calls.borrow_mut().push("queue_submit");
                slot.fence_signaled.set(true);
                Ok(())
            })
            .unwrap();
        assert_eq!(
            slot.calls()[3..],
            ["reset_fence", "queue_submit"]
        );
        cycle.advance(FrameStep::Present, || Ok(())).unwrap();
        assert_eq!(cycle.phase(), FramePhase::Idle);
    }

    #[test]
    fn test_failed_acquire_leaves_fence_signaled() {
        let slot = FakeSlot {
            fail_acquire: true,
            ..FakeSlot::new()
        };
        let mut cycle = FrameCycle::new();

        assert!(cycle.reset_frame(&slot).is_err());
        assert!(!slot.calls().contains(&"reset_command_buffer"));
        assert!(slot.fence_signaled.get());
        // Teardown waits on the slot and must not block
        assert!(slot.wait_fence().is_ok());
    }

    #[test]
    fn test_failed_recording_leaves_fence_signaled() {
        let slot = FakeSlot::new();
        let mut cycle = FrameCycle::new();

        cycle.reset_frame(&slot).unwrap();
        cycle.advance(FrameStep::BeginRecord, || Ok(())).unwrap();
        let failed = cycle.advance(FrameStep::Dispatch, || -> Result<()> {
            Err(eyre!("component update failed"))
        });

        assert!(failed.is_err());
        assert_eq!(cycle.phase(), FramePhase::Recording);
        assert!(!slot.calls().contains(&"reset_fence"));
        assert!(slot.wait_fence().is_ok());
    }

    #[test]
    fn test_clear_values_color_then_depth() {
        let values = clear_values([0.0, 0.0, 0.0, 1.0]);
        unsafe {
            assert_eq!(values[0].color.float32, [0.0, 0.0, 0.0, 1.0]);
            assert_eq!(values[1].depth_stencil.depth, 1.0);
            assert_eq!(values[1].depth_stencil.stencil, 0);
        }
    }

    #[test]
    fn test_viewport_covers_extent() {
        let viewport = full_viewport(vk::Extent2D { width: 480, height: 320 });
        assert_eq!((viewport.width, viewport.height), (480.0, 320.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }
}
