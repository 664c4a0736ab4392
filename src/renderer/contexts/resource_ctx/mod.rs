pub mod descriptor_set_layout_builder;

use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use gpu_descriptor::DescriptorTotalCount;
use smallvec::SmallVec;
use crate::renderer::error::RenderError;

/// How many descriptor sets of one layout a component needs from the shared pool
#[derive(Debug, Clone)]
pub struct DescriptorDemand {
    pub bindings: SmallVec<[(vk::DescriptorType, u32); 4]>,
    pub per_frame: bool,
}

impl DescriptorDemand {
    pub fn set_count(&self, frames_in_flight: usize) -> u32 {
        if self.per_frame {
            frames_in_flight as u32
        } else {
            1
        }
    }
}

/// Pool capacity derived once from every demand up front
#[derive(Debug, Clone, Copy)]
pub struct DescriptorPoolPlan {
    pub counts: DescriptorTotalCount,
    pub max_sets: u32,
}

pub fn plan_descriptor_pool(
    demands: &[DescriptorDemand],
    frames_in_flight: usize,
) -> Result<DescriptorPoolPlan> {
    let mut counts = DescriptorTotalCount::default();
    let mut max_sets = 0;

    for demand in demands {
        let sets = demand.set_count(frames_in_flight);
        max_sets += sets;
        for &(ty, count) in &demand.bindings {
            *count_slot(&mut counts, ty)? += count * sets;
        }
    }

    Ok(DescriptorPoolPlan { counts, max_sets })
}

fn count_slot(counts: &mut DescriptorTotalCount, ty: vk::DescriptorType) -> Result<&mut u32> {
    Ok(match ty {
        vk::DescriptorType::SAMPLER => &mut counts.sampler,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER => &mut counts.combined_image_sampler,
        vk::DescriptorType::SAMPLED_IMAGE => &mut counts.sampled_image,
        vk::DescriptorType::STORAGE_IMAGE => &mut counts.storage_image,
        vk::DescriptorType::UNIFORM_TEXEL_BUFFER => &mut counts.uniform_texel_buffer,
        vk::DescriptorType::STORAGE_TEXEL_BUFFER => &mut counts.storage_texel_buffer,
        vk::DescriptorType::UNIFORM_BUFFER => &mut counts.uniform_buffer,
        vk::DescriptorType::STORAGE_BUFFER => &mut counts.storage_buffer,
        vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC => &mut counts.uniform_buffer_dynamic,
        vk::DescriptorType::STORAGE_BUFFER_DYNAMIC => &mut counts.storage_buffer_dynamic,
        vk::DescriptorType::INPUT_ATTACHMENT => &mut counts.input_attachment,
        other => return Err(eyre!("Descriptor type {:?} is not supported by the pool", other)),
    })
}

/// Non-zero pool sizes, in a fixed type order
pub fn pool_sizes(counts: &DescriptorTotalCount) -> SmallVec<[vk::DescriptorPoolSize; 11]> {
    [
        (vk::DescriptorType::SAMPLER, counts.sampler),
        (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, counts.combined_image_sampler),
        (vk::DescriptorType::SAMPLED_IMAGE, counts.sampled_image),
        (vk::DescriptorType::STORAGE_IMAGE, counts.storage_image),
        (vk::DescriptorType::UNIFORM_TEXEL_BUFFER, counts.uniform_texel_buffer),
        (vk::DescriptorType::STORAGE_TEXEL_BUFFER, counts.storage_texel_buffer),
        (vk::DescriptorType::UNIFORM_BUFFER, counts.uniform_buffer),
        (vk::DescriptorType::STORAGE_BUFFER, counts.storage_buffer),
        (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, counts.uniform_buffer_dynamic),
        (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, counts.storage_buffer_dynamic),
        (vk::DescriptorType::INPUT_ATTACHMENT, counts.input_attachment),
    ]
        .into_iter()
        .filter(|&(_, count)| count != 0)
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize { ty, descriptor_count })
        .collect()
}

/// Responsibilities:
/// - Own the single descriptor pool, sized from the plan at startup
/// - Hand out sets until the planned capacity is used up
pub struct RenderResourceContext {
    pub pool: vk::DescriptorPool,
    plan: DescriptorPoolPlan,
    allocated_sets: u32,
    device: Arc<ash::Device>,
}

impl RenderResourceContext {
    pub fn new(
        device: Arc<ash::Device>,
        plan: DescriptorPoolPlan,
    ) -> Result<Self> {
        let sizes = pool_sizes(&plan.counts);
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(plan.max_sets)
            .pool_sizes(&sizes);
        let pool = unsafe {
            device
                .create_descriptor_pool(&pool_info, None)
                .map_err(RenderError::creation("descriptor pool"))?
        };
        log::debug!("Descriptor pool created: {} sets, {:?}", plan.max_sets, sizes);

        Ok(Self {
            pool,
            plan,
            allocated_sets: 0,
            device,
        })
    }

    pub fn allocate_sets(&mut self, layouts: &[vk::DescriptorSetLayout]) -> Result<Vec<vk::DescriptorSet>> {
        let requested = layouts.len() as u32;
        if self.allocated_sets + requested > self.plan.max_sets {
            return Err(eyre!(
                "Descriptor pool planned for {} sets, {} already allocated, {} more requested",
                self.plan.max_sets,
                self.allocated_sets,
                requested,
            ));
        }

        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);
        let sets = unsafe {
            self.device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(RenderError::creation("descriptor sets"))?
        };
        self.allocated_sets += requested;

        Ok(sets)
    }
}

impl Drop for RenderResourceContext {
    fn drop(&mut self) {
        // Sets go with the pool
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn uniform_per_frame() -> DescriptorDemand {
        DescriptorDemand {
            bindings: smallvec![(vk::DescriptorType::UNIFORM_BUFFER, 1)],
            per_frame: true,
        }
    }

    fn static_sampler() -> DescriptorDemand {
        DescriptorDemand {
            bindings: smallvec![(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1)],
            per_frame: false,
        }
    }

    #[test]
    fn test_plan_counts_per_frame_and_static_sets() {
        let plan = plan_descriptor_pool(&[uniform_per_frame(), static_sampler()], 2).unwrap();
        assert_eq!(plan.max_sets, 3);
        assert_eq!(plan.counts.uniform_buffer, 2);
        assert_eq!(plan.counts.combined_image_sampler, 1);
        assert_eq!(plan.counts.storage_buffer, 0);
    }

    #[test]
    fn test_plan_scales_with_frames_in_flight() {
        let plan = plan_descriptor_pool(&[uniform_per_frame(), static_sampler()], 3).unwrap();
        assert_eq!(plan.max_sets, 4);
        assert_eq!(plan.counts.uniform_buffer, 3);
    }

    #[test]
    fn test_plan_multiplies_binding_counts() {
        let demand = DescriptorDemand {
            bindings: smallvec![
                (vk::DescriptorType::UNIFORM_BUFFER, 2),
                (vk::DescriptorType::SAMPLER, 1),
            ],
            per_frame: true,
        };
        let plan = plan_descriptor_pool(&[demand], 2).unwrap();
        assert_eq!(plan.counts.uniform_buffer, 4);
        assert_eq!(plan.counts.sampler, 2);
    }

    #[test]
    fn test_empty_plan() {
        let plan = plan_descriptor_pool(&[], 2).unwrap();
        assert_eq!(plan.max_sets, 0);
        assert!(pool_sizes(&plan.counts).is_empty());
    }

    #[test]
    fn test_unsupported_type_is_rejected() {
        let demand = DescriptorDemand {
            bindings: smallvec![(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR, 1)],
            per_frame: false,
        };
        assert!(plan_descriptor_pool(&[demand], 2).is_err());
    }

    #[test]
    fn test_pool_sizes_skip_zero_counts() {
        let plan = plan_descriptor_pool(&[uniform_per_frame(), static_sampler()], 2).unwrap();
        let sizes = pool_sizes(&plan.counts);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].ty, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
        assert_eq!(sizes[0].descriptor_count, 1);
        assert_eq!(sizes[1].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[1].descriptor_count, 2);
    }
}
