//! Physical device selection.
//!
//! Selection is split into a query step, which turns every enumerated GPU
//! into a [`DeviceCandidate`], and [`pick_device`], a pure policy over those
//! candidates.

use crate::capabilities::GpuCapabilities;
use crate::error::{GpuError, Result};
use crate::instance::GpuInstance;
use ash::vk;
use std::ffi::CStr;

/// Device extensions every candidate must support.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// What a single queue family can do for this surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilySupport {
    pub graphics: bool,
    pub present: bool,
}

/// Resolved graphics and present queue families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Resolve queue families, preferring one family that does both.
    ///
    /// Falls back to the first graphics family and the first present family.
    pub fn resolve(families: &[QueueFamilySupport]) -> Option<Self> {
        if let Some(both) = families.iter().position(|f| f.graphics && f.present) {
            let index = both as u32;
            return Some(Self {
                graphics: index,
                present: index,
            });
        }

        let graphics = families.iter().position(|f| f.graphics)?;
        let present = families.iter().position(|f| f.present)?;

        Some(Self {
            graphics: graphics as u32,
            present: present as u32,
        })
    }

    /// Whether graphics and present run on the same family.
    pub fn is_shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// A physical device as seen by the selection policy.
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub device_type: vk::PhysicalDeviceType,
    pub queue_families: Option<QueueFamilyIndices>,
    pub extensions_supported: bool,
    pub has_surface_formats: bool,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl DeviceCandidate {
    /// Can render to and present on the surface.
    pub fn is_suitable(&self) -> bool {
        self.queue_families.is_some()
            && self.extensions_supported
            && self.has_surface_formats
            && !self.present_modes.is_empty()
    }
}

/// Pick a device: the first suitable discrete GPU, else the first suitable one.
///
/// A chosen device whose surface lacks FIFO violates the presentation contract
/// and fails with [`GpuError::NoPresentMode`].
pub fn pick_device(candidates: &[DeviceCandidate]) -> Result<usize> {
    let chosen = candidates
        .iter()
        .position(|c| c.is_suitable() && c.device_type == vk::PhysicalDeviceType::DISCRETE_GPU)
        .or_else(|| candidates.iter().position(DeviceCandidate::is_suitable))
        .ok_or(GpuError::NoSuitableDevice)?;

    if !candidates[chosen]
        .present_modes
        .contains(&vk::PresentModeKHR::FIFO)
    {
        return Err(GpuError::NoPresentMode);
    }

    Ok(chosen)
}

/// The physical device chosen for a window.
pub struct SelectedDevice {
    pub physical_device: vk::PhysicalDevice,
    pub capabilities: GpuCapabilities,
    pub queue_families: QueueFamilyIndices,
}

/// Enumerate physical devices and select one able to present to `surface`.
///
/// # Safety
/// The instance and surface must be valid.
pub unsafe fn select_physical_device(
    instance: &GpuInstance,
    surface: vk::SurfaceKHR,
) -> Result<SelectedDevice> {
    let devices = instance.instance().enumerate_physical_devices()?;

    if devices.is_empty() {
        return Err(GpuError::NoSuitableDevice);
    }

    let mut candidates = Vec::with_capacity(devices.len());
    let mut capabilities = Vec::with_capacity(devices.len());

    for &device in &devices {
        let caps = GpuCapabilities::query(instance.instance(), device);
        let candidate = query_candidate(instance, device, surface, &caps);

        tracing::debug!(
            device = %caps.device_name,
            suitable = candidate.is_suitable(),
            "Found physical device"
        );

        candidates.push(candidate);
        capabilities.push(caps);
    }

    let index = pick_device(&candidates)?;
    let queue_families = candidates[index]
        .queue_families
        .ok_or(GpuError::NoSuitableDevice)?;

    Ok(SelectedDevice {
        physical_device: devices[index],
        capabilities: capabilities.swap_remove(index),
        queue_families,
    })
}

unsafe fn query_candidate(
    instance: &GpuInstance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    caps: &GpuCapabilities,
) -> DeviceCandidate {
    let surface_loader = instance.surface_loader();

    let families = instance
        .instance()
        .get_physical_device_queue_family_properties(device)
        .iter()
        .enumerate()
        .map(|(i, family)| {
            let present = surface_loader
                .get_physical_device_surface_support(device, i as u32, surface)
                .unwrap_or(false);
            QueueFamilySupport {
                graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                present,
            }
        })
        .collect::<Vec<_>>();

    let extensions_supported = caps.supports_extensions(REQUIRED_DEVICE_EXTENSIONS);

    // Surface queries are only meaningful once the swapchain extension is known to exist.
    let (has_surface_formats, present_modes) = if extensions_supported {
        surface_support(
            &caps.device_name,
            surface_loader.get_physical_device_surface_formats(device, surface),
            surface_loader.get_physical_device_surface_present_modes(device, surface),
        )
    } else {
        (false, Vec::new())
    };

    DeviceCandidate {
        device_type: caps.device_type,
        queue_families: QueueFamilyIndices::resolve(&families),
        extensions_supported,
        has_surface_formats,
        present_modes,
    }
}

/// Surface format and present mode support, empty when either query failed.
fn surface_support(
    device_name: &str,
    formats: ash::prelude::VkResult<Vec<vk::SurfaceFormatKHR>>,
    present_modes: ash::prelude::VkResult<Vec<vk::PresentModeKHR>>,
) -> (bool, Vec<vk::PresentModeKHR>) {
    match (formats, present_modes) {
        (Ok(formats), Ok(modes)) => (!formats.is_empty(), modes),
        (Err(e), _) | (_, Err(e)) => {
            tracing::debug!(device = %device_name, "Surface query failed: {e}");
            (false, Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPHICS: QueueFamilySupport = QueueFamilySupport {
        graphics: true,
        present: false,
    };
    const PRESENT: QueueFamilySupport = QueueFamilySupport {
        graphics: false,
        present: true,
    };
    const BOTH: QueueFamilySupport = QueueFamilySupport {
        graphics: true,
        present: true,
    };

    fn candidate(device_type: vk::PhysicalDeviceType) -> DeviceCandidate {
        DeviceCandidate {
            device_type,
            queue_families: Some(QueueFamilyIndices {
                graphics: 0,
                present: 0,
            }),
            extensions_supported: true,
            has_surface_formats: true,
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    #[test]
    fn prefers_shared_family() {
        let indices = QueueFamilyIndices::resolve(&[GRAPHICS, PRESENT, BOTH]).unwrap();
        assert_eq!(indices.graphics, 2);
        assert_eq!(indices.present, 2);
        assert!(indices.is_shared());
        assert_eq!(indices.unique(), vec![2]);
    }

    #[test]
    fn separate_families_when_needed() {
        let indices = QueueFamilyIndices::resolve(&[PRESENT, GRAPHICS]).unwrap();
        assert_eq!(indices.graphics, 1);
        assert_eq!(indices.present, 0);
        assert!(!indices.is_shared());
        assert_eq!(indices.unique(), vec![1, 0]);
    }

    #[test]
    fn missing_present_family() {
        assert!(QueueFamilyIndices::resolve(&[GRAPHICS, GRAPHICS]).is_none());
        assert!(QueueFamilyIndices::resolve(&[]).is_none());
    }

    #[test]
    fn prefers_discrete_gpu() {
        let candidates = [
            candidate(vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU),
        ];
        assert_eq!(pick_device(&candidates).unwrap(), 1);
    }

    #[test]
    fn falls_back_to_first_suitable() {
        let mut unsuitable = candidate(vk::PhysicalDeviceType::DISCRETE_GPU);
        unsuitable.extensions_supported = false;

        let candidates = [
            unsuitable,
            candidate(vk::PhysicalDeviceType::CPU),
            candidate(vk::PhysicalDeviceType::INTEGRATED_GPU),
        ];
        assert_eq!(pick_device(&candidates).unwrap(), 1);
    }

    #[test]
    fn no_suitable_device() {
        let mut no_queue = candidate(vk::PhysicalDeviceType::DISCRETE_GPU);
        no_queue.queue_families = None;
        let mut no_formats = candidate(vk::PhysicalDeviceType::INTEGRATED_GPU);
        no_formats.has_surface_formats = false;

        assert!(matches!(
            pick_device(&[no_queue, no_formats]),
            Err(GpuError::NoSuitableDevice)
        ));
        assert!(matches!(pick_device(&[]), Err(GpuError::NoSuitableDevice)));
    }

    #[test]
    fn missing_fifo_is_contract_violation() {
        let mut mailbox_only = candidate(vk::PhysicalDeviceType::DISCRETE_GPU);
        mailbox_only.present_modes = vec![vk::PresentModeKHR::MAILBOX];

        assert!(matches!(
            pick_device(&[mailbox_only]),
            Err(GpuError::NoPresentMode)
        ));
    }

    #[test]
    fn failed_surface_query_leaves_device_unsuitable() {
        let formats = vec![vk::SurfaceFormatKHR::default()];
        let modes = vec![vk::PresentModeKHR::FIFO];

        assert_eq!(
            surface_support("ok", Ok(formats.clone()), Ok(modes.clone())),
            (true, modes.clone())
        );
        assert_eq!(
            surface_support("lost", Err(vk::Result::ERROR_SURFACE_LOST_KHR), Ok(modes.clone())),
            (false, Vec::new())
        );
        assert_eq!(
            surface_support("oom", Ok(formats), Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY)),
            (false, Vec::new())
        );
    }

    #[test]
    fn device_with_failed_surface_query_is_skipped() {
        let (has_surface_formats, present_modes) = surface_support(
            "broken",
            Err(vk::Result::ERROR_INITIALIZATION_FAILED),
            Err(vk::Result::ERROR_INITIALIZATION_FAILED),
        );
        let broken = DeviceCandidate {
            has_surface_formats,
            present_modes,
            ..candidate(vk::PhysicalDeviceType::DISCRETE_GPU)
        };
        assert!(!broken.is_suitable());

        let candidates = [broken, candidate(vk::PhysicalDeviceType::INTEGRATED_GPU)];
        assert_eq!(pick_device(&candidates).unwrap(), 1);
    }
}
