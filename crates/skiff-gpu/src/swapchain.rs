//! Swapchain management.
//!
//! Format, present mode, extent and image count are chosen by pure functions
//! of a [`SurfaceCapabilities`] snapshot, so rebuilding against unchanged
//! capabilities always negotiates the same swapchain.

use crate::context::GpuContext;
use crate::error::{GpuError, Result};
use crate::frame::{AcquireOutcome, PresentOutcome};
use crate::surface::{Surface, SurfaceCapabilities};
use ash::vk;

/// Surface formats tried in order, all paired with [`PREFERRED_COLOR_SPACE`].
pub const PREFERRED_SURFACE_FORMATS: [vk::Format; 4] = [
    vk::Format::B8G8R8A8_UNORM,
    vk::Format::R8G8B8A8_UNORM,
    vk::Format::B8G8R8_UNORM,
    vk::Format::R8G8B8_UNORM,
];

/// Color space required for a preferred format to match.
pub const PREFERRED_COLOR_SPACE: vk::ColorSpaceKHR = vk::ColorSpaceKHR::SRGB_NONLINEAR;

/// `current_extent` value meaning the swapchain extent decides the surface size.
pub const EXTENT_FROM_WINDOW: u32 = u32::MAX;

/// How frames are paced against the display.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PresentPreference {
    /// FIFO: wait for vertical blank.
    #[default]
    Vsync,
    /// Mailbox when available: render unthrottled, present the newest image.
    Unlimited,
}

/// Select the surface format.
///
/// Returns `None` only when the surface reports no formats at all.
pub fn select_surface_format(available: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    // A lone UNDEFINED entry means the surface has no preference.
    if let [only] = available {
        if only.format == vk::Format::UNDEFINED {
            return Some(vk::SurfaceFormatKHR {
                format: PREFERRED_SURFACE_FORMATS[0],
                color_space: PREFERRED_COLOR_SPACE,
            });
        }
    }

    PREFERRED_SURFACE_FORMATS
        .iter()
        .find_map(|&wanted| {
            available
                .iter()
                .find(|f| f.format == wanted && f.color_space == PREFERRED_COLOR_SPACE)
                .copied()
        })
        .or_else(|| available.first().copied())
}

/// Select the present mode.
///
/// FIFO is the guaranteed fallback; a surface without it is rejected.
pub fn select_present_mode(
    available: &[vk::PresentModeKHR],
    preference: PresentPreference,
) -> Result<vk::PresentModeKHR> {
    if preference == PresentPreference::Unlimited && available.contains(&vk::PresentModeKHR::MAILBOX)
    {
        return Ok(vk::PresentModeKHR::MAILBOX);
    }

    if available.contains(&vk::PresentModeKHR::FIFO) {
        Ok(vk::PresentModeKHR::FIFO)
    } else {
        Err(GpuError::NoPresentMode)
    }
}

/// Calculate the swapchain extent in pixels.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: vk::Extent2D,
) -> vk::Extent2D {
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;

    if capabilities.current_extent.width == EXTENT_FROM_WINDOW {
        // Any size in range is accepted; follow the window.
        vk::Extent2D {
            width: framebuffer_size.width.clamp(min.width, max.width.max(min.width)),
            height: framebuffer_size.height.clamp(min.height, max.height.max(min.height)),
        }
    } else {
        // Fixed-size surfaces report min == max == current.
        vk::Extent2D {
            width: framebuffer_size.width.max(min.width).min(max.width),
            height: framebuffer_size.height.max(min.height).min(max.height),
        }
    }
}

/// Number of images to request: one more than the minimum, capped by the maximum.
///
/// `overlay_min` raises the request for collaborators that need more images.
/// A `max_image_count` of zero means unbounded.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, overlay_min: u32) -> u32 {
    let count = (capabilities.min_image_count + 1).max(overlay_min);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

fn select_composite_alpha(supported: vk::CompositeAlphaFlagsKHR) -> vk::CompositeAlphaFlagsKHR {
    [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::INHERIT,
    ]
    .into_iter()
    .find(|&flag| supported.contains(flag))
    .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Everything negotiated for one swapchain build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainPlan {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

impl SwapchainPlan {
    /// Negotiate a swapchain against a capability snapshot.
    ///
    /// Returns `Ok(None)` when the window is minimized (zero extent on either
    /// axis): nothing should be created until the size is nonzero again.
    pub fn negotiate(
        caps: &SurfaceCapabilities,
        framebuffer_size: vk::Extent2D,
        preference: PresentPreference,
        overlay_min_images: u32,
    ) -> Result<Option<Self>> {
        if framebuffer_size.width == 0 || framebuffer_size.height == 0 {
            return Ok(None);
        }

        let extent = choose_extent(&caps.capabilities, framebuffer_size);
        if extent.width == 0 || extent.height == 0 {
            return Ok(None);
        }

        let surface_format = select_surface_format(&caps.formats).ok_or_else(|| {
            GpuError::SwapchainCreation("Surface reports no formats".to_string())
        })?;
        let present_mode = select_present_mode(&caps.present_modes, preference)?;

        Ok(Some(Self {
            surface_format,
            present_mode,
            extent,
            image_count: choose_image_count(&caps.capabilities, overlay_min_images),
            pre_transform: caps.capabilities.current_transform,
            composite_alpha: select_composite_alpha(caps.capabilities.supported_composite_alpha),
        }))
    }
}

/// Swapchain wrapper.
///
/// `images` and `image_views` are always the same length and index-aligned.
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a new swapchain, chaining `old_swapchain` when given.
    ///
    /// # Safety
    /// All handles must be valid.
    pub unsafe fn new(
        gpu: &GpuContext,
        surface: vk::SurfaceKHR,
        plan: &SwapchainPlan,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<Self> {
        let queue_families = gpu.queue_families();
        let family_indices = queue_families.unique();

        // Images are shared without ownership transfers when the families differ.
        let sharing_mode = if queue_families.is_shared() {
            vk::SharingMode::EXCLUSIVE
        } else {
            vk::SharingMode::CONCURRENT
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(plan.image_count)
            .image_format(plan.surface_format.format)
            .image_color_space(plan.surface_format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(plan.pre_transform)
            .composite_alpha(plan.composite_alpha)
            .present_mode(plan.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain.unwrap_or(vk::SwapchainKHR::null()));

        let loader = gpu.swapchain_loader();
        let swapchain = loader
            .create_swapchain(&create_info, None)
            .map_err(|e| GpuError::SwapchainCreation(e.to_string()))?;

        let mut this = Self {
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format: plan.surface_format.format,
            present_mode: plan.present_mode,
            extent: plan.extent,
        };

        if let Err(e) = this.create_views(gpu.device(), loader) {
            this.destroy(gpu.device(), loader);
            return Err(e);
        }

        Ok(this)
    }

    unsafe fn create_views(
        &mut self,
        device: &ash::Device,
        loader: &ash::khr::swapchain::Device,
    ) -> Result<()> {
        let images = loader.get_swapchain_images(self.swapchain)?;
        self.image_views.reserve(images.len());

        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.format)
                .components(vk::ComponentMapping::default())
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .base_mip_level(0)
                        .level_count(1)
                        .base_array_layer(0)
                        .layer_count(1),
                );

            self.image_views
                .push(device.create_image_view(&view_info, None)?);
        }

        self.images = images;
        Ok(())
    }

    /// Number of presentable images.
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Acquire the next image, signaling `semaphore` when it is ready.
    ///
    /// # Safety
    /// All handles must be valid.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn acquire_next_image(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<AcquireOutcome> {
        let result = swapchain_loader.acquire_next_image(
            self.swapchain,
            timeout_ns,
            semaphore,
            vk::Fence::null(),
        );

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            // OUT_OF_DATE means no image was acquired and the semaphore stays unsignaled.
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(vk::Result::TIMEOUT) => Err(GpuError::DeviceLost(
                "Timed out acquiring a swapchain image".to_string(),
            )),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Present an image.
    ///
    /// # Safety
    /// All handles must be valid.
    #[cfg_attr(
        feature = "profiling-tracy",
        tracing::instrument(level = "trace", skip_all)
    )]
    pub unsafe fn present(
        &self,
        swapchain_loader: &ash::khr::swapchain::Device,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<PresentOutcome> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match swapchain_loader.queue_present(queue, &present_info) {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(GpuError::from(e)),
        }
    }

    /// Release the image views. Images are owned by the driver.
    ///
    /// # Safety
    /// No in-flight work may reference the views.
    unsafe fn destroy_views(&mut self, device: &ash::Device) {
        for view in self.image_views.drain(..) {
            device.destroy_image_view(view, None);
        }
        self.images.clear();
    }

    /// Destroy the swapchain.
    ///
    /// # Safety
    /// All handles must be valid and swapchain must not be in use.
    pub unsafe fn destroy(&mut self, device: &ash::Device, loader: &ash::khr::swapchain::Device) {
        self.destroy_views(device);
        loader.destroy_swapchain(self.swapchain, None);
        self.swapchain = vk::SwapchainKHR::null();
    }
}

/// Whether a usable swapchain exists after a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainState {
    Ready,
    /// Zero-sized window; nothing was created.
    Minimized,
}

/// Owns the presentable-image chain of one window.
///
/// The device is never touched here; only the swapchain and its views are
/// created and destroyed.
pub struct SwapchainManager {
    swapchain: Option<Swapchain>,
    preference: PresentPreference,
    overlay_min_images: u32,
    generation: u64,
}

impl SwapchainManager {
    /// Create a manager with no swapchain yet.
    pub fn new(preference: PresentPreference, overlay_min_images: u32) -> Self {
        Self {
            swapchain: None,
            preference,
            overlay_min_images,
            generation: 0,
        }
    }

    /// The current swapchain, if the window is not minimized.
    pub fn current(&self) -> Option<&Swapchain> {
        self.swapchain.as_ref()
    }

    /// Number of swapchains built so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Query fresh capabilities and build a swapchain.
    ///
    /// Any existing swapchain is chained as the previous one and retired.
    pub fn build(
        &mut self,
        gpu: &GpuContext,
        surface: &Surface,
        framebuffer_size: vk::Extent2D,
    ) -> Result<SwapchainState> {
        let caps = surface.capabilities(gpu.physical_device())?;
        let plan = SwapchainPlan::negotiate(
            &caps,
            framebuffer_size,
            self.preference,
            self.overlay_min_images,
        )?;

        let mut previous = self.swapchain.take();

        let Some(plan) = plan else {
            if let Some(old) = previous.as_mut() {
                unsafe { old.destroy(gpu.device(), gpu.swapchain_loader()) };
            }
            tracing::debug!("Window minimized, swapchain build skipped");
            return Ok(SwapchainState::Minimized);
        };

        let created = unsafe {
            Swapchain::new(
                gpu,
                surface.handle(),
                &plan,
                previous.as_ref().map(|s| s.swapchain),
            )
        };

        // The retired swapchain goes away whether or not its successor was created.
        if let Some(old) = previous.as_mut() {
            unsafe { old.destroy(gpu.device(), gpu.swapchain_loader()) };
        }

        let swapchain = created?;
        self.generation += 1;

        tracing::info!(
            generation = self.generation,
            "Swapchain built: {}x{} ({} images, {:?}, {:?})",
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.image_count(),
            swapchain.format,
            swapchain.present_mode,
        );

        self.swapchain = Some(swapchain);
        Ok(SwapchainState::Ready)
    }

    /// Wait for the device to go idle, then destroy the swapchain and its views.
    pub fn destroy(&mut self, gpu: &GpuContext) -> Result<()> {
        gpu.wait_idle()?;
        if let Some(mut swapchain) = self.swapchain.take() {
            unsafe { swapchain.destroy(gpu.device(), gpu.swapchain_loader()) };
        }
        Ok(())
    }

    /// Tear down and build again, chaining the old swapchain.
    ///
    /// Safe to call repeatedly while minimized: it returns
    /// [`SwapchainState::Minimized`] and leaves no swapchain behind.
    pub fn rebuild(
        &mut self,
        gpu: &GpuContext,
        surface: &Surface,
        framebuffer_size: vk::Extent2D,
    ) -> Result<SwapchainState> {
        gpu.wait_idle()?;

        // Views go first; the handle itself stays alive until its successor exists.
        if let Some(swapchain) = self.swapchain.as_mut() {
            unsafe { swapchain.destroy_views(gpu.device()) };
        }

        self.build(gpu, surface, framebuffer_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn capabilities(min_images: u32, max_images: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_images,
            max_image_count: max_images,
            current_extent: vk::Extent2D {
                width: EXTENT_FROM_WINDOW,
                height: EXTENT_FROM_WINDOW,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            ..Default::default()
        }
    }

    fn snapshot(present_modes: Vec<vk::PresentModeKHR>) -> SurfaceCapabilities {
        SurfaceCapabilities {
            capabilities: capabilities(2, 3),
            formats: vec![
                format(vk::Format::R8G8B8A8_SRGB, PREFERRED_COLOR_SPACE),
                format(vk::Format::B8G8R8A8_UNORM, PREFERRED_COLOR_SPACE),
            ],
            present_modes,
        }
    }

    const WINDOW: vk::Extent2D = vk::Extent2D {
        width: 1280,
        height: 720,
    };

    #[test]
    fn prefers_bgra_unorm_srgb() {
        let available = [
            format(vk::Format::R8G8B8A8_UNORM, PREFERRED_COLOR_SPACE),
            format(vk::Format::B8G8R8A8_UNORM, PREFERRED_COLOR_SPACE),
        ];
        assert_eq!(
            select_surface_format(&available).unwrap().format,
            vk::Format::B8G8R8A8_UNORM
        );
    }

    #[test]
    fn preference_list_checked_in_order() {
        let available = [
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
            format(vk::Format::R8G8B8_UNORM, PREFERRED_COLOR_SPACE),
            format(vk::Format::R8G8B8A8_UNORM, PREFERRED_COLOR_SPACE),
        ];
        assert_eq!(
            select_surface_format(&available).unwrap().format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn falls_back_to_first_format() {
        let available = [
            format(vk::Format::A2B10G10R10_UNORM_PACK32, PREFERRED_COLOR_SPACE),
            format(vk::Format::R16G16B16A16_SFLOAT, PREFERRED_COLOR_SPACE),
        ];
        assert_eq!(select_surface_format(&available), Some(available[0]));
        assert_eq!(select_surface_format(&[]), None);
    }

    #[test]
    fn undefined_format_means_any() {
        let available = [format(vk::Format::UNDEFINED, PREFERRED_COLOR_SPACE)];
        let chosen = select_surface_format(&available).unwrap();
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(chosen.color_space, PREFERRED_COLOR_SPACE);
    }

    #[test]
    fn fifo_only_surface() {
        let modes = [vk::PresentModeKHR::FIFO];
        for preference in [PresentPreference::Vsync, PresentPreference::Unlimited] {
            assert_eq!(
                select_present_mode(&modes, preference).unwrap(),
                vk::PresentModeKHR::FIFO
            );
        }
    }

    #[test]
    fn mailbox_only_when_unlimited() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(
            select_present_mode(&modes, PresentPreference::Unlimited).unwrap(),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            select_present_mode(&modes, PresentPreference::Vsync).unwrap(),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn missing_fifo_rejected() {
        assert!(matches!(
            select_present_mode(&[vk::PresentModeKHR::MAILBOX], PresentPreference::Vsync),
            Err(GpuError::NoPresentMode)
        ));
    }

    #[test]
    fn extent_follows_window_when_unconstrained() {
        let caps = capabilities(2, 3);
        assert_eq!(choose_extent(&caps, WINDOW), WINDOW);

        let huge = vk::Extent2D {
            width: 10_000,
            height: 50,
        };
        assert_eq!(
            choose_extent(&caps, huge),
            vk::Extent2D {
                width: 4096,
                height: 50
            }
        );
    }

    #[test]
    fn extent_clamped_to_fixed_surface() {
        let fixed = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: fixed,
            min_image_extent: fixed,
            max_image_extent: fixed,
            ..capabilities(2, 3)
        };
        assert_eq!(choose_extent(&caps, WINDOW), fixed);
    }

    #[test]
    fn image_count_scenarios() {
        assert_eq!(choose_image_count(&capabilities(2, 3), 2), 3);
        assert_eq!(choose_image_count(&capabilities(3, 0), 2), 4);
        assert_eq!(choose_image_count(&capabilities(2, 2), 2), 2);
        assert_eq!(choose_image_count(&capabilities(1, 8), 4), 4);
    }

    #[test]
    fn image_count_stays_in_range() {
        for min in 1..8 {
            for max in 0..10 {
                if max != 0 && max < min {
                    continue;
                }
                let count = choose_image_count(&capabilities(min, max), 0);
                assert!(count >= min, "min={min} max={max} count={count}");
                if max > 0 {
                    assert!(count <= max, "min={min} max={max} count={count}");
                }
            }
        }
    }

    #[test]
    fn negotiation_is_deterministic() {
        let caps = snapshot(vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]);
        let first = SwapchainPlan::negotiate(&caps, WINDOW, PresentPreference::Unlimited, 2)
            .unwrap()
            .unwrap();
        let second = SwapchainPlan::negotiate(&caps, WINDOW, PresentPreference::Unlimited, 2)
            .unwrap()
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.surface_format.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(first.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(first.extent, WINDOW);
        assert_eq!(first.image_count, 3);
        assert_eq!(first.composite_alpha, vk::CompositeAlphaFlagsKHR::OPAQUE);
    }

    #[test]
    fn zero_extent_is_skipped() {
        let caps = snapshot(vec![vk::PresentModeKHR::FIFO]);
        for size in [
            vk::Extent2D {
                width: 0,
                height: 720,
            },
            vk::Extent2D {
                width: 1280,
                height: 0,
            },
        ] {
            let plan =
                SwapchainPlan::negotiate(&caps, size, PresentPreference::Vsync, 2).unwrap();
            assert!(plan.is_none());
        }

        let plan = SwapchainPlan::negotiate(&caps, WINDOW, PresentPreference::Vsync, 2).unwrap();
        assert!(plan.is_some());
    }

    #[test]
    fn minimized_fixed_surface_is_skipped() {
        let zero = vk::Extent2D {
            width: 0,
            height: 0,
        };
        let mut caps = snapshot(vec![vk::PresentModeKHR::FIFO]);
        caps.capabilities.current_extent = zero;
        caps.capabilities.min_image_extent = zero;
        caps.capabilities.max_image_extent = zero;

        let plan = SwapchainPlan::negotiate(&caps, WINDOW, PresentPreference::Vsync, 2).unwrap();
        assert!(plan.is_none());
    }

    #[test]
    fn negotiation_without_formats_fails() {
        let mut caps = snapshot(vec![vk::PresentModeKHR::FIFO]);
        caps.formats.clear();
        assert!(matches!(
            SwapchainPlan::negotiate(&caps, WINDOW, PresentPreference::Vsync, 2),
            Err(GpuError::SwapchainCreation(_))
        ));
    }
}
