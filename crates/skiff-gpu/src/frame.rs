//! Per-frame acquire / submit / present protocol.
//!
//! [`FrameSynchronizer`] drives one tick at a time against a [`FrameBackend`].
//! For tick `f` it uses slot `f % MAX_FRAMES_IN_FLIGHT`:
//!
//! 1. wait for the slot fence (the only blocking point),
//! 2. acquire an image with the slot's acquire semaphore,
//! 3. reset the slot fence,
//! 4. record and submit, signaling the render-complete semaphore and the fence,
//! 5. present, waiting on the render-complete semaphore.
//!
//! A swapchain found stale during a tick (out-of-date or suboptimal on
//! acquire or present) is rebuilt at the start of the next tick, before its
//! acquire. A polled resize flag is handled the same way.

use crate::error::Result;
use crate::swapchain::SwapchainState;
use crate::sync::MAX_FRAMES_IN_FLIGHT;

/// Result of asking the presentation engine for an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired; the acquire semaphore will be signaled.
    Acquired { image_index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface. Nothing was acquired.
    OutOfDate,
}

/// Result of a present request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    /// Whether the swapchain must be rebuilt.
    pub fn is_stale(self) -> bool {
        !matches!(self, Self::Presented)
    }
}

/// Why a tick produced no frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The window has a zero-sized framebuffer.
    Minimized,
    /// Acquire reported an out-of-date swapchain.
    OutOfDate,
}

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented {
        frame: u64,
        slot: usize,
        image_index: u32,
    },
    Skipped(SkipReason),
}

/// CPU-side view of a slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlotState {
    /// No submission pending, or its fence was observed signaled.
    #[default]
    Idle,
    /// Work was submitted and has not been waited on yet.
    Submitted,
}

/// Device operations the frame protocol is built from.
///
/// Implemented by the window renderer over Vulkan and by a simulated GPU in
/// tests.
pub trait FrameBackend {
    /// Per-slot synchronization objects.
    type Slot;

    /// Block until the slot's fence is signaled.
    fn wait_for_fence(&mut self, slot: &Self::Slot) -> Result<()>;

    /// Return the slot's fence to the unsignaled state.
    fn reset_fence(&mut self, slot: &Self::Slot) -> Result<()>;

    /// Acquire the next presentable image, signaling the slot's acquire semaphore.
    fn acquire_next_image(&mut self, slot: &Self::Slot) -> Result<AcquireOutcome>;

    /// Record the slot's command buffer for `image_index` and submit it.
    fn record_and_submit(&mut self, slot: &Self::Slot, image_index: u32) -> Result<()>;

    /// Present `image_index` once the slot's render-complete semaphore is signaled.
    fn present(&mut self, slot: &Self::Slot, image_index: u32) -> Result<PresentOutcome>;

    /// Wait for idle, destroy the swapchain and everything derived from it, and build again.
    fn rebuild_swapchain(&mut self) -> Result<SwapchainState>;
}

/// Owns the frame slots and runs the per-frame protocol.
pub struct FrameSynchronizer<S> {
    slots: [S; MAX_FRAMES_IN_FLIGHT],
    states: [SlotState; MAX_FRAMES_IN_FLIGHT],
    frame: u64,
    stale: bool,
    minimized: bool,
    rebuilds: u64,
}

impl<S> FrameSynchronizer<S> {
    /// Create a synchronizer over a fixed set of slots.
    pub fn new(slots: [S; MAX_FRAMES_IN_FLIGHT]) -> Self {
        Self {
            slots,
            states: [SlotState::Idle; MAX_FRAMES_IN_FLIGHT],
            frame: 0,
            stale: false,
            minimized: false,
            rebuilds: 0,
        }
    }

    /// Frame counter of the next tick.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Slot used by frame `frame`.
    pub fn slot_index(frame: u64) -> usize {
        (frame % MAX_FRAMES_IN_FLIGHT as u64) as usize
    }

    /// State of slot `index`.
    pub fn slot_state(&self, index: usize) -> SlotState {
        self.states[index]
    }

    /// Whether a rebuild is scheduled for the next tick.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Number of swapchain rebuilds performed.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Schedule a rebuild before the next acquire.
    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// The slots, for teardown after the device is idle.
    pub fn slots(&self) -> &[S; MAX_FRAMES_IN_FLIGHT] {
        &self.slots
    }

    /// Run one tick.
    ///
    /// `resized` is the window's resize flag for this tick; the caller clears
    /// it afterwards. The frame counter advances whether or not a frame is
    /// produced.
    pub fn tick<B>(&mut self, backend: &mut B, resized: bool) -> Result<FrameOutcome>
    where
        B: FrameBackend<Slot = S>,
    {
        let frame = self.frame;
        self.frame += 1;

        if resized {
            self.stale = true;
        }

        if self.stale || self.minimized {
            let state = backend.rebuild_swapchain()?;
            self.rebuilds += 1;
            self.stale = false;
            // Every fence is signaled after the idle wait inside the rebuild.
            self.states = [SlotState::Idle; MAX_FRAMES_IN_FLIGHT];

            if state == SwapchainState::Minimized {
                if !self.minimized {
                    tracing::debug!(frame, "Rendering paused while minimized");
                }
                self.minimized = true;
                return Ok(FrameOutcome::Skipped(SkipReason::Minimized));
            }
            self.minimized = false;
        }

        let slot_index = Self::slot_index(frame);
        let slot = &self.slots[slot_index];

        let _span = tracing::trace_span!("frame", frame, slot = slot_index).entered();

        backend.wait_for_fence(slot)?;
        self.states[slot_index] = SlotState::Idle;

        let image_index = match backend.acquire_next_image(slot)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => {
                if suboptimal {
                    self.stale = true;
                }
                image_index
            }
            AcquireOutcome::OutOfDate => {
                // The fence keeps its signaled state so the slot stays usable.
                tracing::debug!(frame, "Swapchain out of date on acquire");
                self.stale = true;
                return Ok(FrameOutcome::Skipped(SkipReason::OutOfDate));
            }
        };

        backend.reset_fence(slot)?;
        backend.record_and_submit(slot, image_index)?;
        self.states[slot_index] = SlotState::Submitted;

        if backend.present(slot, image_index)?.is_stale() {
            tracing::debug!(frame, "Swapchain stale on present");
            self.stale = true;
        }

        Ok(FrameOutcome::Presented {
            frame,
            slot: slot_index,
            image_index,
        })
    }
}
