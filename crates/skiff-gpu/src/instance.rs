//! Vulkan instance creation.
//!
//! One [`GpuInstance`] is created per process and shared read-only by every
//! window; each window selects its own device against it.

use crate::error::{GpuError, Result};
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::{c_char, c_void, CStr, CString};

/// Validation layers to enable in debug builds.
pub fn validation_layers() -> Vec<&'static CStr> {
    vec![
        // Standard validation layer
        c"VK_LAYER_KHRONOS_validation",
    ]
}

/// Shared Vulkan instance with the surface extension loader.
pub struct GpuInstance {
    // Entry must be kept alive for the lifetime of the instance
    entry: ash::Entry,
    instance: ash::Instance,
    surface_loader: ash::khr::surface::Instance,
    debug: Option<DebugMessenger>,
}

struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl GpuInstance {
    /// Create the instance with every surface extension the display needs.
    pub fn new(app_name: &str, display: RawDisplayHandle, enable_validation: bool) -> Result<Self> {
        let entry =
            unsafe { ash::Entry::load() }.map_err(|e| GpuError::LoadVulkan(e.to_string()))?;

        let app_name = CString::new(app_name)
            .map_err(|e| GpuError::InvalidState(format!("Invalid application name: {e}")))?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"Skiff")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        let mut extension_names = ash_window::enumerate_required_extensions(display)
            .map_err(|e| GpuError::SurfaceCreation(format!("Unsupported display: {e}")))?
            .to_vec();
        if enable_validation {
            extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
        }
        #[cfg(target_os = "macos")]
        extension_names.push(ash::khr::portability_enumeration::NAME.as_ptr());

        let layers = if enable_validation {
            unsafe { available_validation_layers(&entry)? }
        } else {
            vec![]
        };
        let layer_names: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

        // Required for MoltenVK on macOS
        #[cfg(target_os = "macos")]
        let create_flags = vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR;
        #[cfg(not(target_os = "macos"))]
        let create_flags = vk::InstanceCreateFlags::empty();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_names)
            .flags(create_flags);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let debug = if enable_validation {
            match unsafe { create_debug_messenger(&entry, &instance) } {
                Ok(debug) => Some(debug),
                Err(e) => {
                    tracing::warn!("Debug messenger unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        tracing::info!(
            validation = enable_validation,
            "Vulkan instance created"
        );

        Ok(Self {
            entry,
            instance,
            surface_loader,
            debug,
        })
    }

    /// Get the Vulkan instance handle.
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Get the surface extension loader.
    pub fn surface_loader(&self) -> &ash::khr::surface::Instance {
        &self.surface_loader
    }

    /// Get the Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }
}

impl Drop for GpuInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some(debug) = self.debug.take() {
                debug
                    .loader
                    .destroy_debug_utils_messenger(debug.messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        tracing::debug!("Vulkan instance destroyed");
    }
}

/// Filter the requested validation layers down to the installed ones.
unsafe fn available_validation_layers(entry: &ash::Entry) -> Result<Vec<&'static CStr>> {
    let available_layers = entry.enumerate_instance_layer_properties()?;

    Ok(validation_layers()
        .into_iter()
        .filter(|layer| {
            let found = available_layers.iter().any(|props| {
                let name = CStr::from_ptr(props.layer_name.as_ptr());
                name == *layer
            });
            if !found {
                tracing::warn!("Validation layer {:?} not available", layer);
            }
            found
        })
        .collect())
}

unsafe fn create_debug_messenger(
    entry: &ash::Entry,
    instance: &ash::Instance,
) -> Result<DebugMessenger> {
    let loader = ash::ext::debug_utils::Instance::new(entry, instance);

    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(vulkan_debug_callback));

    let messenger = loader.create_debug_utils_messenger(&create_info, None)?;

    Ok(DebugMessenger { loader, messenger })
}

/// Forward validation messages into `tracing`.
unsafe extern "system" fn vulkan_debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        tracing::error!(target: "vulkan", ?message_type, "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        tracing::warn!(target: "vulkan", ?message_type, "{message}");
    } else {
        tracing::debug!(target: "vulkan", ?message_type, "{message}");
    }

    vk::FALSE
}
