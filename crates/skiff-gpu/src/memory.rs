//! Host-visible buffers backed by gpu-allocator.

use crate::error::{GpuError, Result};
use ash::vk;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use gpu_allocator::{AllocatorDebugSettings, MemoryLocation};
use std::sync::Arc;

/// Device memory allocator for one logical device.
pub struct GpuAllocator {
    allocator: Option<Allocator>,
    device: Arc<ash::Device>,
}

impl GpuAllocator {
    /// Create an allocator for `device`.
    ///
    /// # Safety
    /// The instance, device, and physical device must be valid.
    pub unsafe fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: (*device).clone(),
            physical_device,
            debug_settings: AllocatorDebugSettings {
                log_leaks_on_shutdown: true,
                ..Default::default()
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;

        Ok(Self {
            allocator: Some(allocator),
            device,
        })
    }

    fn inner(&mut self) -> Result<&mut Allocator> {
        self.allocator
            .as_mut()
            .ok_or_else(|| GpuError::InvalidState("Allocator already shut down".to_string()))
    }

    /// Create a host-visible buffer holding a copy of `data`.
    pub fn upload<T: bytemuck::Pod>(
        &mut self,
        data: &[T],
        usage: vk::BufferUsageFlags,
        name: &str,
    ) -> Result<HostBuffer> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        if bytes.is_empty() {
            return Err(GpuError::InvalidState(format!("Buffer '{name}' would be empty")));
        }
        let device = Arc::clone(&self.device);
        let allocator = self.inner()?;

        let buffer_info = vk::BufferCreateInfo::default()
            .size(bytes.len() as u64)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let handle = unsafe { device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.get_buffer_memory_requirements(handle) };

        let allocated = allocator.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::CpuToGpu,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let mut allocation = match allocated {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.destroy_buffer(handle, None) };
                return Err(GpuError::AllocationFailed(e.to_string()));
            }
        };

        let filled = unsafe {
            device.bind_buffer_memory(handle, allocation.memory(), allocation.offset())
        }
        .map_err(GpuError::from)
        .and_then(|()| fill(&mut allocation, bytes));

        if let Err(e) = filled {
            if let Err(free) = allocator.free(allocation) {
                tracing::warn!("Freeing '{name}' after a failed upload: {free}");
            }
            unsafe { device.destroy_buffer(handle, None) };
            return Err(e);
        }

        Ok(HostBuffer {
            handle,
            allocation: Some(allocation),
        })
    }

    /// Release a buffer. Freeing twice is a no-op.
    pub fn free(&mut self, buffer: &mut HostBuffer) -> Result<()> {
        if let Some(allocation) = buffer.allocation.take() {
            self.inner()?
                .free(allocation)
                .map_err(|e| GpuError::AllocationFailed(e.to_string()))?;
        }

        if buffer.handle != vk::Buffer::null() {
            unsafe { self.device.destroy_buffer(buffer.handle, None) };
            buffer.handle = vk::Buffer::null();
        }

        Ok(())
    }

    /// Drop the allocator, returning its memory blocks to the device.
    ///
    /// Must run before the device is destroyed. Outstanding allocations are
    /// logged as leaks.
    pub fn shutdown(&mut self) {
        self.allocator = None;
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn fill(allocation: &mut Allocation, bytes: &[u8]) -> Result<()> {
    let mapped = allocation
        .mapped_slice_mut()
        .ok_or_else(|| GpuError::InvalidState("Buffer memory is not mapped".to_string()))?;
    let dst = mapped
        .get_mut(..bytes.len())
        .ok_or_else(|| GpuError::InvalidState("Allocation smaller than its buffer".to_string()))?;
    dst.copy_from_slice(bytes);
    Ok(())
}

/// Buffer in host-visible memory, written once at creation.
pub struct HostBuffer {
    handle: vk::Buffer,
    allocation: Option<Allocation>,
}

impl HostBuffer {
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }
}
