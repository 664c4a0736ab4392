use std::ptr::NonNull;
use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::error::RenderError;

/// Index of the first memory type allowed by `type_filter` whose flags contain all of `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32, RenderError> {
    let count = memory_properties.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);
    (0..count)
        .find(|&i| {
            let allowed = type_filter & (1 << i) != 0;
            let flags = memory_properties.memory_types[i as usize].property_flags;
            allowed && flags.contains(properties)
        })
        .ok_or(RenderError::MemoryTypeNotFound {
            type_filter,
            properties,
        })
}

/// A `vkDeviceMemory` block, unmapped and freed on drop
pub struct DeviceMemory {
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    mapped: Option<MappedRange>,
    device: Arc<ash::Device>,
}

impl DeviceMemory {
    pub fn allocate(
        device: Arc<ash::Device>,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let memory_type_index = find_memory_type(
            memory_properties,
            requirements.memory_type_bits,
            properties,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);
        let memory = unsafe {
            device
                .allocate_memory(&alloc_info, None)
                .map_err(RenderError::creation("device memory"))?
        };
        log::debug!(
            "Allocated {} bytes from memory type {} ({:?})",
            requirements.size,
            memory_type_index,
            properties,
        );

        Ok(Self {
            memory,
            size: requirements.size,
            mapped: None,
            device,
        })
    }

    /// Maps the whole block once; later calls return the same mapping.
    pub fn map(&mut self) -> Result<&mut MappedRange> {
        if self.mapped.is_none() {
            let ptr = unsafe {
                self.device.map_memory(self.memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())?
            };
            let ptr = NonNull::new(ptr.cast::<u8>())
                .ok_or_else(|| color_eyre::eyre::eyre!("vkMapMemory returned a null pointer"))?;
            self.mapped = Some(unsafe { MappedRange::from_raw_parts(ptr, self.size as usize) });
        }
        self.mapped
            .as_mut()
            .ok_or_else(|| color_eyre::eyre::eyre!("Memory is not mapped"))
    }

    pub fn unmap(&mut self) {
        if self.mapped.take().is_some() {
            unsafe { self.device.unmap_memory(self.memory) };
        }
    }
}

impl Drop for DeviceMemory {
    fn drop(&mut self) {
        self.unmap();
        unsafe {
            self.device.free_memory(self.memory, None);
        }
    }
}

/// A host-visible byte range that `presser` can copy plain data into.
///
/// Without `HOST_COHERENT` memory the caller is responsible for flushing.
pub struct MappedRange {
    ptr: NonNull<u8>,
    size: usize,
}

impl MappedRange {
    /// # Safety
    /// `ptr` must be valid for reads and writes of `size` bytes for as long as the range lives.
    pub unsafe fn from_raw_parts(ptr: NonNull<u8>, size: usize) -> Self {
        Self { ptr, size }
    }

    pub fn write<T: Copy>(
        &mut self,
        data: &[T],
        start_offset: usize,
    ) -> Result<presser::CopyRecord> {
        Ok(presser::copy_from_slice_to_offset(data, self, start_offset)?)
    }

    #[cfg(test)]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }
}

unsafe impl presser::Slab for MappedRange {
    fn base_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    fn base_ptr_mut(&mut self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.size
    }
}
