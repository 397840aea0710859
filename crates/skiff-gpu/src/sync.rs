//! Synchronization primitives and the Vulkan frame slot.

use crate::command::CommandPool;
use crate::error::{GpuError, Result};
use ash::vk;

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Upper bound on a frame fence wait (10 seconds).
///
/// The GPU is expected to always retire work; running past this is treated
/// as a lost device.
pub const FRAME_FENCE_TIMEOUT_NS: u64 = 10_000_000_000;

/// Create a semaphore.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_semaphore(device: &ash::Device) -> Result<vk::Semaphore> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = device.create_semaphore(&create_info, None)?;
    Ok(semaphore)
}

/// Create a fence.
///
/// # Safety
/// The device must be valid.
pub unsafe fn create_fence(device: &ash::Device, signaled: bool) -> Result<vk::Fence> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };

    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = device.create_fence(&create_info, None)?;
    Ok(fence)
}

/// Wait for a fence to be signaled.
///
/// An expired timeout is reported as [`GpuError::DeviceLost`].
///
/// # Safety
/// The device and fence must be valid.
#[cfg_attr(
    feature = "profiling-tracy",
    tracing::instrument(level = "trace", skip_all)
)]
pub unsafe fn wait_for_fence(device: &ash::Device, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
    match device.wait_for_fences(&[fence], true, timeout_ns) {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(GpuError::DeviceLost(format!(
            "Frame fence not signaled after {} ms",
            timeout_ns / 1_000_000
        ))),
        Err(vk::Result::ERROR_DEVICE_LOST) => {
            Err(GpuError::DeviceLost("Device lost while waiting for a frame".to_string()))
        }
        Err(e) => Err(GpuError::from(e)),
    }
}

/// Reset a fence to unsignaled state.
///
/// # Safety
/// The device and fence must be valid.
#[cfg_attr(
    feature = "profiling-tracy",
    tracing::instrument(level = "trace", skip_all)
)]
pub unsafe fn reset_fence(device: &ash::Device, fence: vk::Fence) -> Result<()> {
    device.reset_fences(&[fence])?;
    Ok(())
}

/// Synchronization objects and command buffer for one frame in flight.
///
/// Slots are indexed by frame counter, not by swapchain image, and survive
/// swapchain rebuilds.
pub struct FrameSlot {
    /// Signaled when the acquired image is ready to be rendered to.
    pub image_acquired: vk::Semaphore,
    /// Signaled when this slot's submission finished rendering.
    pub render_complete: vk::Semaphore,
    /// Signaled when the GPU retired this slot's submission.
    pub in_flight: vk::Fence,
    /// Reset and re-recorded every time the slot is used.
    pub command_buffer: vk::CommandBuffer,
}

impl FrameSlot {
    /// Create a slot. The fence starts signaled so the first wait returns at once.
    ///
    /// # Safety
    /// The device must be valid and the pool must belong to it.
    pub unsafe fn new(device: &ash::Device, pool: &CommandPool) -> Result<Self> {
        let image_acquired = create_semaphore(device)?;
        let render_complete = match create_semaphore(device) {
            Ok(semaphore) => semaphore,
            Err(e) => {
                device.destroy_semaphore(image_acquired, None);
                return Err(e);
            }
        };
        let in_flight = match create_fence(device, true) {
            Ok(fence) => fence,
            Err(e) => {
                device.destroy_semaphore(image_acquired, None);
                device.destroy_semaphore(render_complete, None);
                return Err(e);
            }
        };
        let command_buffer =
            match pool.allocate_command_buffer(device, vk::CommandBufferLevel::PRIMARY) {
                Ok(cmd) => cmd,
                Err(e) => {
                    device.destroy_semaphore(image_acquired, None);
                    device.destroy_semaphore(render_complete, None);
                    device.destroy_fence(in_flight, None);
                    return Err(e);
                }
            };

        Ok(Self {
            image_acquired,
            render_complete,
            in_flight,
            command_buffer,
        })
    }

    /// Create the full set of slots.
    ///
    /// # Safety
    /// The device must be valid and the pool must belong to it.
    pub unsafe fn create_all(
        device: &ash::Device,
        pool: &CommandPool,
    ) -> Result<[Self; MAX_FRAMES_IN_FLIGHT]> {
        let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            match Self::new(device, pool) {
                Ok(slot) => slots.push(slot),
                Err(e) => {
                    for slot in &slots {
                        slot.destroy(device);
                    }
                    return Err(e);
                }
            }
        }

        slots
            .try_into()
            .map_err(|_| GpuError::InvalidState("Frame slot count mismatch".to_string()))
    }

    /// Destroy the synchronization objects. The command buffer is freed with its pool.
    ///
    /// # Safety
    /// The device must be valid and the slot must not be in use.
    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_semaphore(self.image_acquired, None);
        device.destroy_semaphore(self.render_complete, None);
        device.destroy_fence(self.in_flight, None);
    }
}
