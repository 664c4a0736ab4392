use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::transfer_ctx::TransferContext;
use crate::renderer::error::RenderError;
use crate::renderer::resources::buffer::GpuBuffer;
use crate::renderer::resources::memory::DeviceMemory;

/// Depth formats from most to least precise
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

pub struct ImageCreateInfo {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub properties: vk::MemoryPropertyFlags,
}

/// Image, its memory, and a 2D view over it
pub struct GpuImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub aspect: vk::ImageAspectFlags,

    memory: DeviceMemory,
    device: Arc<ash::Device>,
}

impl GpuImage {
    // NOTE: The image comes back in UNDEFINED layout with no contents.
    pub fn new(
        dev: &RenderDevice,
        create_info: &ImageCreateInfo,
    ) -> Result<Self> {
        let device = dev.logical.clone();

        let image = {
            let info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(create_info.format)
                .extent(vk::Extent3D {
                    width: create_info.extent.width,
                    height: create_info.extent.height,
                    depth: 1,
                })
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(create_info.usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            unsafe {
                device
                    .create_image(&info, None)
                    .map_err(RenderError::creation("image"))?
            }
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory = match DeviceMemory::allocate(
            device.clone(),
            &dev.memory_properties,
            requirements,
            create_info.properties,
        ) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let bound = unsafe { device.bind_image_memory(image, memory.memory, 0) }
            .map_err(RenderError::creation("image memory binding"))
            .and_then(|_| {
                create_image_view(&device, image, create_info.format, create_info.aspect)
            });
        let view = match bound {
            Ok(view) => view,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e.into());
            }
        };

        Ok(Self {
            image,
            view,
            extent: create_info.extent,
            aspect: create_info.aspect,

            memory,
            device,
        })
    }

    /// Create a shader-readable RGBA8 image from tightly packed pixels
    pub fn new_texture(
        dev_ctx: &RenderDeviceContext,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(color_eyre::eyre::eyre!(
                "Texture data is {} bytes, expected {} for {}x{} RGBA8",
                pixels.len(),
                expected,
                width,
                height,
            ));
        }

        let image = Self::new(
            &dev_ctx.device,
            &ImageCreateInfo {
                format: vk::Format::R8G8B8A8_SRGB,
                extent: vk::Extent2D { width, height },
                usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
                aspect: vk::ImageAspectFlags::COLOR,
                properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            },
        )?;
        image.upload(dev_ctx, pixels)?;

        Ok(image)
    }

    /// Create a depth attachment in DEPTH_STENCIL_ATTACHMENT_OPTIMAL layout
    pub fn new_depth(
        dev_ctx: &RenderDeviceContext,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let aspect = if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        };
        // The view only ever reads depth
        let image = Self::new(
            &dev_ctx.device,
            &ImageCreateInfo {
                format,
                extent,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                aspect: vk::ImageAspectFlags::DEPTH,
                properties: vk::MemoryPropertyFlags::DEVICE_LOCAL,
            },
        )?;

        dev_ctx.transfer().immediate_submit(|cmd, device| {
            transition_layout(
                device,
                cmd,
                image.image,
                aspect,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            )?;
            Ok(())
        })?;

        Ok(image)
    }

    fn upload(
        &self,
        dev_ctx: &RenderDeviceContext,
        pixels: &[u8],
    ) -> Result<()> {
        let mut staging = GpuBuffer::new_mapped(
            &dev_ctx.device,
            pixels.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        staging.write(pixels, 0)?;

        let transfer = dev_ctx.transfer();
        transfer.immediate_submit(|cmd, device| {
            transition_layout(
                device,
                cmd,
                self.image,
                self.aspect,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )?;
            Ok(())
        })?;
        copy_buffer_to_image(&transfer, &staging, self)?;
        transfer.immediate_submit(|cmd, device| {
            transition_layout(
                device,
                cmd,
                self.image,
                self.aspect,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )?;
            Ok(())
        })?;

        log::debug!("Uploaded {}x{} texture", self.extent.width, self.extent.height);

        Ok(())
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
        }
    }
}

pub fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<vk::ImageView, RenderError> {
    let info = vk::ImageViewCreateInfo::default()
        .view_type(vk::ImageViewType::TYPE_2D)
        .image(image)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    unsafe {
        device
            .create_image_view(&info, None)
            .map_err(RenderError::creation("image view"))
    }
}

pub fn copy_buffer_to_image(
    transfer: &TransferContext,
    src: &GpuBuffer,
    dst: &GpuImage,
) -> Result<()> {
    transfer.immediate_submit(|cmd, device| {
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: dst.aspect,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width: dst.extent.width,
                height: dst.extent.height,
                depth: 1,
            },
        };
        unsafe {
            device.cmd_copy_buffer_to_image(
                cmd,
                src.buffer,
                dst.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
        Ok(())
    })
}

/// Access masks and pipeline stages for one layout transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

impl LayoutTransition {
    /// Looks up the fixed barrier table. Pairs outside it are a configuration error.
    pub fn lookup(
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    ) -> Result<Self, RenderError> {
        use vk::ImageLayout as L;

        match (old, new) {
            (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => Ok(Self {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            }),
            (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => Ok(Self {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            }),
            (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => Ok(Self {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            }),
            (old, new) => Err(RenderError::UnsupportedLayoutTransition { old, new }),
        }
    }
}

/// Records a pipeline barrier moving `image` from `old` to `new`.
pub fn transition_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> Result<(), RenderError> {
    let transition = LayoutTransition::lookup(old, new)?;

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(transition.src_access)
        .dst_access_mask(transition.dst_access);

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            transition.src_stage,
            transition.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }

    Ok(())
}

/// First candidate whose tiling features include all of `features`.
///
/// `query` stands in for `vkGetPhysicalDeviceFormatProperties`.
pub fn choose_format<F>(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    mut query: F,
) -> Result<vk::Format, RenderError>
where
    F: FnMut(vk::Format) -> vk::FormatProperties,
{
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let props = query(format);
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
        .ok_or_else(|| RenderError::UnsupportedFormat {
            candidates: candidates.to_vec(),
            features,
        })
}

pub fn choose_depth_format(dev_ctx: &RenderDeviceContext) -> Result<vk::Format, RenderError> {
    let instance = &dev_ctx.instance.instance;
    let physical = dev_ctx.device.physical;
    choose_format(
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        |format| unsafe { instance.get_physical_device_format_properties(physical, format) },
    )
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    format == vk::Format::D32_SFLOAT_S8_UINT || format == vk::Format::D24_UNORM_S8_UINT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_to_transfer_dst() {
        let t = LayoutTransition::lookup(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ).unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::empty());
        assert_eq!(t.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn test_transition_to_shader_read() {
        let t = LayoutTransition::lookup(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ).unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(t.src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_upload_transitions_are_distinct() {
        let first = LayoutTransition::lookup(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ).unwrap();
        let second = LayoutTransition::lookup(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_untabulated_transition_fails() {
        let pairs = [
            (vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL),
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::UNDEFINED),
            (vk::ImageLayout::PRESENT_SRC_KHR, vk::ImageLayout::GENERAL),
        ];
        for (old, new) in pairs {
            let result = LayoutTransition::lookup(old, new);
            assert!(matches!(
                result,
                Err(RenderError::UnsupportedLayoutTransition { old: o, new: n }) if o == old && n == new
            ));
        }
    }

    fn depth_support(supported: &'static [vk::Format]) -> impl FnMut(vk::Format) -> vk::FormatProperties {
        move |format| vk::FormatProperties {
            optimal_tiling_features: if supported.contains(&format) {
                vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::FormatFeatureFlags::empty()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_choose_format_prefers_earliest_candidate() {
        let format = choose_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            depth_support(&[vk::Format::D24_UNORM_S8_UINT, vk::Format::D32_SFLOAT]),
        );
        assert_eq!(format.ok(), Some(vk::Format::D32_SFLOAT));
    }

    #[test]
    fn test_choose_format_falls_through_to_supported() {
        let format = choose_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            depth_support(&[vk::Format::D24_UNORM_S8_UINT]),
        );
        assert_eq!(format.ok(), Some(vk::Format::D24_UNORM_S8_UINT));
    }

    #[test]
    fn test_choose_format_checks_requested_tiling() {
        // Supported only with optimal tiling, so a linear query must fail
        let format = choose_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::LINEAR,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            depth_support(&[vk::Format::D32_SFLOAT]),
        );
        assert!(format.is_err());
    }

    #[test]
    fn test_choose_format_fails_when_nothing_qualifies() {
        let format = choose_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            depth_support(&[]),
        );
        assert!(matches!(format, Err(RenderError::UnsupportedFormat { .. })));
    }

    #[test]
    fn test_has_stencil_component() {
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(has_stencil_component(vk::Format::D24_UNORM_S8_UINT));
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
    }
}
