//! Per-window GPU context: the selected device, its queues and allocator.

use crate::capabilities::GpuCapabilities;
use crate::device::{select_physical_device, QueueFamilyIndices, REQUIRED_DEVICE_EXTENSIONS};
use crate::error::Result;
use crate::instance::GpuInstance;
use crate::memory::GpuAllocator;
use crate::surface::Surface;
use ash::vk;
use parking_lot::Mutex;
use std::ffi::c_char;
use std::sync::Arc;

/// Logical device and queues owned by one window.
///
/// Created once when the window is initialized and never recreated on
/// resize. Dropping it waits for the device to go idle.
pub struct GpuContext {
    pub(crate) physical_device: vk::PhysicalDevice,
    pub(crate) device: Arc<ash::Device>,
    pub(crate) capabilities: GpuCapabilities,
    pub(crate) allocator: Mutex<GpuAllocator>,
    pub(crate) swapchain_loader: ash::khr::swapchain::Device,

    pub(crate) queue_families: QueueFamilyIndices,
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) present_queue: vk::Queue,

    // Dropped after the device.
    pub(crate) instance: Arc<GpuInstance>,
}

impl GpuContext {
    /// Get the Vulkan device handle.
    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    /// Get the physical device handle.
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Get the shared instance.
    pub fn instance(&self) -> &Arc<GpuInstance> {
        &self.instance
    }

    /// Get GPU capabilities.
    pub fn capabilities(&self) -> &GpuCapabilities {
        &self.capabilities
    }

    /// Get the graphics queue.
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Get the present queue. May alias the graphics queue.
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Get the resolved queue families.
    pub fn queue_families(&self) -> QueueFamilyIndices {
        self.queue_families
    }

    /// Get the swapchain extension loader.
    pub fn swapchain_loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    /// Get access to the GPU allocator.
    pub fn allocator(&self) -> &Mutex<GpuAllocator> {
        &self.allocator
    }

    /// Wait for device to be idle.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device.device_wait_idle()?;
        }
        Ok(())
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();

            // Shutdown allocator BEFORE destroying device
            self.allocator.lock().shutdown();

            self.device.destroy_device(None);
        }
        tracing::debug!("Logical device destroyed");
    }
}

/// Builder for creating a GPU context against a shared instance.
pub struct GpuContextBuilder {
    instance: Arc<GpuInstance>,
}

impl GpuContextBuilder {
    /// Create a new builder.
    pub fn new(instance: Arc<GpuInstance>) -> Self {
        Self { instance }
    }

    /// Select a device able to present to `surface` and create it.
    ///
    /// Failure here is fatal for the window; it is never retried.
    pub fn build(self, surface: &Surface) -> Result<GpuContext> {
        let selected = unsafe { select_physical_device(&self.instance, surface.handle()) }?;

        tracing::info!("Selected GPU: {}", selected.capabilities.summary());
        tracing::debug!(
            graphics = selected.queue_families.graphics,
            present = selected.queue_families.present,
            "Queue families resolved"
        );

        let device = unsafe {
            create_device(
                self.instance.instance(),
                selected.physical_device,
                &selected.queue_families,
            )?
        };

        let graphics_queue = unsafe { device.get_device_queue(selected.queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(selected.queue_families.present, 0) };

        let device = Arc::new(device);

        let allocator = unsafe {
            GpuAllocator::new(
                self.instance.instance(),
                device.clone(),
                selected.physical_device,
            )
        };
        let allocator = match allocator {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e);
            }
        };

        let swapchain_loader = ash::khr::swapchain::Device::new(self.instance.instance(), &device);

        Ok(GpuContext {
            physical_device: selected.physical_device,
            device,
            capabilities: selected.capabilities,
            allocator: Mutex::new(allocator),
            swapchain_loader,
            queue_families: selected.queue_families,
            graphics_queue,
            present_queue,
            instance: self.instance,
        })
    }
}

/// Create the logical device with one queue per distinct family.
///
/// # Safety
/// The instance and physical device must be valid.
unsafe fn create_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_families: &QueueFamilyIndices,
) -> Result<ash::Device> {
    let queue_priority = 1.0_f32;
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(std::slice::from_ref(&queue_priority))
        })
        .collect();

    let extension_names: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .map(|ext| ext.as_ptr())
        .collect();

    let features = vk::PhysicalDeviceFeatures::default();

    let device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&features);

    let device = instance.create_device(physical_device, &device_create_info, None)?;

    Ok(device)
}
