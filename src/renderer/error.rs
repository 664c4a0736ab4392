use ash::vk;
use thiserror::Error;
use crate::renderer::frame_loop::{FramePhase, FrameStep};

/// Failure classes raised by the renderer core.
///
/// Everything is surfaced through `color_eyre::Result`; these variants exist so
/// callers and tests can `downcast_ref` the decisions the core makes on its own.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("No physical device supports both graphics and presentation to the surface")]
    DeviceSelectionFailure,

    #[error("Failed to create {what}: {source}")]
    ResourceCreationFailure {
        what: &'static str,
        #[source]
        source: vk::Result,
    },

    #[error("Failed to create {what}: {source}")]
    SynchronizationFailure {
        what: &'static str,
        #[source]
        source: vk::Result,
    },

    #[error("No memory type matches filter {type_filter:#b} with properties {properties:?}")]
    MemoryTypeNotFound {
        type_filter: u32,
        properties: vk::MemoryPropertyFlags,
    },

    #[error("Unsupported layout transition {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    #[error("Surface query failed: {0}")]
    PresentationQueryFailure(String),

    #[error("None of the candidate formats {candidates:?} support {features:?}")]
    UnsupportedFormat {
        candidates: Vec<vk::Format>,
        features: vk::FormatFeatureFlags,
    },

    #[error("Frame step {step:?} is not valid while the frame is {phase:?}")]
    InvalidFrameStep {
        step: FrameStep,
        phase: FramePhase,
    },
}

impl RenderError {
    pub fn creation(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |source| Self::ResourceCreationFailure { what, source }
    }

    pub fn sync(what: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |source| Self::SynchronizationFailure { what, source }
    }
}
