//! Frame-time bar drawn over the scene.
//!
//! A strip along the top edge whose length follows the smoothed frame time:
//! a full-width bar is two 60 Hz frame budgets.

use std::time::Instant;

use ash::vk;
use skiff_app::{OverlayTarget, UiOverlay};

const FRAME_BUDGET_MS: f32 = 1000.0 / 60.0;
const BAR_HEIGHT: u32 = 6;
const SMOOTHING: f32 = 0.1;

const GREEN: [f32; 4] = [0.2, 0.8, 0.3, 1.0];
const YELLOW: [f32; 4] = [0.9, 0.8, 0.2, 1.0];
const RED: [f32; 4] = [0.9, 0.2, 0.2, 1.0];

#[derive(Debug, Default)]
pub struct FrameTimeBar {
    extent: vk::Extent2D,
    last_record: Option<Instant>,
    frame_ms: f32,
}

impl FrameTimeBar {
    /// Fold a new sample into the moving average.
    fn sample(&mut self, ms: f32) {
        self.frame_ms = if self.frame_ms == 0.0 {
            ms
        } else {
            self.frame_ms + (ms - self.frame_ms) * SMOOTHING
        };
    }
}

impl UiOverlay for FrameTimeBar {
    fn swapchain_rebuilt(
        &mut self,
        _device: &ash::Device,
        target: &OverlayTarget,
    ) -> skiff_gpu::Result<()> {
        self.extent = target.extent;
        tracing::debug!(
            width = target.extent.width,
            height = target.extent.height,
            images = target.image_count,
            "Overlay target changed"
        );
        Ok(())
    }

    fn record(
        &mut self,
        device: &ash::Device,
        command_buffer: vk::CommandBuffer,
        extent: vk::Extent2D,
    ) {
        let now = Instant::now();
        if let Some(last) = self.last_record.replace(now) {
            self.sample(now.duration_since(last).as_secs_f32() * 1000.0);
        }

        let Some(rect) = bar_rect(self.frame_ms, extent) else {
            return;
        };

        let attachments = [vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: bar_color(self.frame_ms),
                },
            },
        }];
        let rects = [vk::ClearRect {
            rect,
            base_array_layer: 0,
            layer_count: 1,
        }];

        unsafe { device.cmd_clear_attachments(command_buffer, &attachments, &rects) };
    }
}

/// Bar rectangle for a frame time, `None` when there is nothing to draw.
fn bar_rect(frame_ms: f32, extent: vk::Extent2D) -> Option<vk::Rect2D> {
    let fraction = (frame_ms / (2.0 * FRAME_BUDGET_MS)).clamp(0.0, 1.0);
    let width = (fraction * extent.width as f32) as u32;
    if width == 0 || extent.height < BAR_HEIGHT {
        return None;
    }

    Some(vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: vk::Extent2D {
            width,
            height: BAR_HEIGHT,
        },
    })
}

fn bar_color(frame_ms: f32) -> [f32; 4] {
    if frame_ms <= FRAME_BUDGET_MS {
        GREEN
    } else if frame_ms <= 2.0 * FRAME_BUDGET_MS {
        YELLOW
    } else {
        RED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const EXTENT: vk::Extent2D = vk::Extent2D {
        width: 1000,
        height: 600,
    };

    #[test]
    fn bar_grows_with_frame_time() {
        let half = bar_rect(FRAME_BUDGET_MS, EXTENT).unwrap();
        assert_eq!(half.extent.width, 500);
        assert_eq!(half.extent.height, BAR_HEIGHT);
        assert_eq!((half.offset.x, half.offset.y), (0, 0));

        let full = bar_rect(10.0 * FRAME_BUDGET_MS, EXTENT).unwrap();
        assert_eq!(full.extent.width, EXTENT.width);
    }

    #[test]
    fn nothing_to_draw() {
        assert!(bar_rect(0.0, EXTENT).is_none());
        assert!(bar_rect(FRAME_BUDGET_MS, vk::Extent2D::default()).is_none());
        let short = vk::Extent2D {
            width: 1000,
            height: BAR_HEIGHT - 1,
        };
        assert!(bar_rect(FRAME_BUDGET_MS, short).is_none());
    }

    #[test]
    fn color_reflects_budget() {
        assert_eq!(bar_color(8.0), GREEN);
        assert_eq!(bar_color(FRAME_BUDGET_MS), GREEN);
        assert_eq!(bar_color(25.0), YELLOW);
        assert_eq!(bar_color(50.0), RED);
    }

    #[test]
    fn samples_are_smoothed() {
        let mut bar = FrameTimeBar::default();
        bar.sample(10.0);
        assert_abs_diff_eq!(bar.frame_ms, 10.0);
        bar.sample(20.0);
        assert_abs_diff_eq!(bar.frame_ms, 11.0, epsilon = 1e-5);
    }
}
