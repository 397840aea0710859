//! What a physical device reports about itself.

use ash::vk;
use std::collections::HashSet;
use std::ffi::{c_char, CStr};
use std::fmt;

/// GPU vendor, from the PCI vendor ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Apple,
    Other(u32),
}

impl GpuVendor {
    pub fn from_vendor_id(id: u32) -> Self {
        match id {
            0x10DE => Self::Nvidia,
            0x1002 => Self::Amd,
            0x8086 => Self::Intel,
            0x106B => Self::Apple,
            other => Self::Other(other),
        }
    }
}

/// Properties of one physical device, as used by device selection and logs.
#[derive(Debug, Clone)]
pub struct GpuCapabilities {
    pub vendor: GpuVendor,
    pub device_name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    /// Sum of device-local heaps.
    pub device_local_memory_mb: u64,
    pub extensions: HashSet<String>,
}

impl GpuCapabilities {
    /// Query a physical device.
    ///
    /// A device whose extensions cannot be enumerated reports none.
    ///
    /// # Safety
    /// The instance and physical device must be valid.
    pub unsafe fn query(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = instance.get_physical_device_properties(physical_device);
        let memory = instance.get_physical_device_memory_properties(physical_device);
        let extensions = instance
            .enumerate_device_extension_properties(physical_device)
            .unwrap_or_default();

        Self::from_properties(&properties, &memory, &extensions)
    }

    /// Build from already-queried Vulkan structures.
    pub fn from_properties(
        properties: &vk::PhysicalDeviceProperties,
        memory: &vk::PhysicalDeviceMemoryProperties,
        extensions: &[vk::ExtensionProperties],
    ) -> Self {
        let device_local_memory_mb = memory
            .memory_heaps
            .iter()
            .take(memory.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size / (1024 * 1024))
            .sum();

        Self {
            vendor: GpuVendor::from_vendor_id(properties.vendor_id),
            device_name: fixed_string(&properties.device_name),
            device_type: properties.device_type,
            api_version: properties.api_version,
            device_local_memory_mb,
            extensions: extensions
                .iter()
                .map(|ext| fixed_string(&ext.extension_name))
                .collect(),
        }
    }

    pub fn is_discrete(&self) -> bool {
        self.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }

    /// Every named extension is available.
    pub fn supports_extensions(&self, required: &[&CStr]) -> bool {
        required.iter().all(|ext| {
            ext.to_str()
                .is_ok_and(|name| self.extensions.contains(name))
        })
    }

    /// One-line description for logs.
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for GpuCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, {:?}) - Vulkan {}.{}.{} - {} MB VRAM",
            self.device_name,
            self.vendor,
            self.device_type,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.device_local_memory_mb,
        )
    }
}

/// Decode a NUL-terminated fixed-size Vulkan string.
fn fixed_string(chars: &[c_char]) -> String {
    let bytes: Vec<u8> = chars
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed<const N: usize>(s: &str) -> [c_char; N] {
        let mut out = [0 as c_char; N];
        for (dst, byte) in out.iter_mut().zip(s.bytes()) {
            *dst = byte as c_char;
        }
        out
    }

    fn extension(name: &str) -> vk::ExtensionProperties {
        vk::ExtensionProperties {
            extension_name: fixed(name),
            spec_version: 1,
        }
    }

    fn sample() -> GpuCapabilities {
        let properties = vk::PhysicalDeviceProperties {
            vendor_id: 0x1002,
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            api_version: vk::API_VERSION_1_2,
            device_name: fixed("Test GPU"),
            ..Default::default()
        };

        let mut memory = vk::PhysicalDeviceMemoryProperties {
            memory_heap_count: 2,
            ..Default::default()
        };
        memory.memory_heaps[0] = vk::MemoryHeap {
            size: 8 * 1024 * 1024 * 1024,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };
        memory.memory_heaps[1] = vk::MemoryHeap {
            size: 16 * 1024 * 1024 * 1024,
            flags: vk::MemoryHeapFlags::empty(),
        };
        // Beyond memory_heap_count, so ignored.
        memory.memory_heaps[2] = vk::MemoryHeap {
            size: 1024 * 1024 * 1024,
            flags: vk::MemoryHeapFlags::DEVICE_LOCAL,
        };

        GpuCapabilities::from_properties(&properties, &memory, &[extension("VK_KHR_swapchain")])
    }

    #[test]
    fn vendor_identification() {
        assert_eq!(GpuVendor::from_vendor_id(0x10DE), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_vendor_id(0x1002), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_vendor_id(0x8086), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_vendor_id(0x1234), GpuVendor::Other(0x1234));
    }

    #[test]
    fn decoded_from_vulkan_structures() {
        let caps = sample();
        assert_eq!(caps.device_name, "Test GPU");
        assert_eq!(caps.vendor, GpuVendor::Amd);
        assert!(caps.is_discrete());
        assert_eq!(caps.device_local_memory_mb, 8192);
    }

    #[test]
    fn extension_support() {
        let caps = sample();
        assert!(caps.supports_extensions(&[ash::khr::swapchain::NAME]));
        assert!(caps.supports_extensions(&[]));
        assert!(!caps.supports_extensions(&[
            ash::khr::swapchain::NAME,
            ash::khr::dynamic_rendering::NAME
        ]));
    }

    #[test]
    fn summary_mentions_device() {
        let summary = sample().summary();
        assert!(summary.starts_with("Test GPU"));
        assert!(summary.contains("Vulkan 1.2.0"));
        assert!(summary.contains("8192 MB"));
    }
}
