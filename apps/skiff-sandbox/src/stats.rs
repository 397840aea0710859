//! Frame rate shown in the window title.

use skiff_app::{System, WindowContext};

/// Frames counted over a window of at least one second.
#[derive(Debug, Default)]
struct FpsCounter {
    frames: u32,
    elapsed: f32,
}

impl FpsCounter {
    /// Record one frame. Returns the average rate once a second has passed.
    fn record(&mut self, dt: f32) -> Option<f32> {
        self.frames += 1;
        self.elapsed += dt;
        if self.elapsed < 1.0 {
            return None;
        }

        let fps = self.frames as f32 / self.elapsed;
        *self = Self::default();
        Some(fps)
    }
}

/// Rewrites the window title with the frame rate once a second.
pub struct FrameStats {
    title: String,
    counter: FpsCounter,
}

impl FrameStats {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            counter: FpsCounter::default(),
        }
    }
}

impl System for FrameStats {
    fn name(&self) -> &'static str {
        "frame-stats"
    }

    fn start(&mut self, _ctx: &WindowContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn tick(&mut self, ctx: &WindowContext, dt: f32) -> anyhow::Result<()> {
        if let Some(fps) = self.counter.record(dt) {
            ctx.window
                .set_title(&format!("{} - {fps:.0} fps ({:.2} ms)", self.title, 1000.0 / fps));
        }
        Ok(())
    }

    fn stop(&mut self, _ctx: &WindowContext) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn reports_once_per_second() {
        let mut counter = FpsCounter::default();
        let reports: Vec<f32> = (0..250).filter_map(|_| counter.record(0.01)).collect();

        // 100 frames of 10 ms fill each second, give or take rounding.
        assert_eq!(reports.len(), 2);
        for fps in reports {
            assert_abs_diff_eq!(fps, 100.0, epsilon = 1.5);
        }
    }

    #[test]
    fn slow_frame_reports_immediately() {
        let mut counter = FpsCounter::default();
        assert_abs_diff_eq!(counter.record(2.0).unwrap(), 0.5);
        assert!(counter.record(0.5).is_none());
    }
}
