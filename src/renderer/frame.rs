//! Frame pacing.
//!
//! [`FrameScheduler`] owns the ring of in-flight slots and runs the per-tick
//! state machine: acquire, throttle on the slot fence, record, submit,
//! present, and recreate the swapchain when the surface went stale. The GPU
//! side sits behind [`FrameDriver`] so the ordering can be exercised without
//! a device.

use ash::vk;
use log::debug;

use super::scene::Scene;
use crate::{RenderError, Result};

/// Result of asking the swapchain for the next image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// The image can be rendered to; `suboptimal` asks for recreation afterwards.
    Ready { image: u32, suboptimal: bool },
    /// Nothing was acquired and the swapchain must be rebuilt first.
    OutOfDate,
}

/// Health of the surface as reported by presentation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SurfaceStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl SurfaceStatus {
    pub fn is_stale(self) -> bool {
        self != SurfaceStatus::Optimal
    }
}

/// What a single tick ended up doing.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// The swapchain was rebuilt at the end of the tick.
    Recreated { presented: bool },
}

impl FrameOutcome {
    pub fn presented(self) -> bool {
        matches!(
            self,
            FrameOutcome::Presented | FrameOutcome::Recreated { presented: true }
        )
    }
}

/// Splits `vkAcquireNextImageKHR` results into staleness and real failures.
pub fn classify_acquire(result: std::result::Result<(u32, bool), vk::Result>) -> Result<AcquireOutcome> {
    match result {
        Ok((image, suboptimal)) => Ok(AcquireOutcome::Ready { image, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(result) => Err(RenderError::Vulkan {
            context: "Failed to acquire swapchain image",
            result,
        }),
    }
}

/// Splits `vkQueuePresentKHR` results into staleness and real failures.
pub fn classify_present(result: std::result::Result<bool, vk::Result>) -> Result<SurfaceStatus> {
    match result {
        Ok(false) => Ok(SurfaceStatus::Optimal),
        Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(SurfaceStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::OutOfDate),
        Err(result) => Err(RenderError::Vulkan {
            context: "Failed to present swapchain image",
            result,
        }),
    }
}

/// Fixed-depth round-robin cursor over frame slots.
#[derive(Clone, Debug)]
pub struct FrameRing {
    depth: usize,
    next: usize,
    frames: u64,
}

impl FrameRing {
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            next: 0,
            frames: 0,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Total slots handed out so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn advance(&mut self) -> usize {
        let slot = self.next;
        self.next = (self.next + 1) % self.depth;
        self.frames += 1;
        slot
    }
}

/// GPU operations the scheduler sequences. Slot indices are always `< ring depth`.
pub trait FrameDriver {
    fn acquire(&mut self) -> Result<AcquireOutcome>;

    /// Blocks until the slot's last submission has completed.
    fn wait_fence(&mut self, slot: usize) -> Result<()>;

    fn reset_fence(&mut self, slot: usize) -> Result<()>;

    fn record(&mut self, slot: usize, image: u32, scene: &Scene) -> Result<()>;

    /// Submits the slot's command buffer, signalling its fence.
    fn submit(&mut self, slot: usize, image: u32) -> Result<()>;

    fn present(&mut self, image: u32) -> Result<SurfaceStatus>;

    /// Destroys and recreates the swapchain. Every slot fence has signalled.
    fn rebuild_swapchain(&mut self) -> Result<()>;
}

pub struct FrameScheduler {
    ring: FrameRing,
    presented: u64,
    recreations: u64,
}

impl FrameScheduler {
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            ring: FrameRing::new(frames_in_flight),
            presented: 0,
            recreations: 0,
        }
    }

    pub fn ring(&self) -> &FrameRing {
        &self.ring
    }

    pub fn frames_presented(&self) -> u64 {
        self.presented
    }

    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    pub fn tick<D: FrameDriver + ?Sized>(&mut self, driver: &mut D, scene: &Scene) -> Result<FrameOutcome> {
        let (image, mut stale) = match driver.acquire()? {
            AcquireOutcome::Ready { image, suboptimal } => (image, suboptimal),
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date at acquire");
                self.recreate(driver)?;
                return Ok(FrameOutcome::Recreated { presented: false });
            }
        };

        let slot = self.ring.advance();
        driver.wait_fence(slot)?;
        driver.reset_fence(slot)?;

        driver.record(slot, image, scene)?;
        driver.submit(slot, image)?;

        let status = driver.present(image)?;
        self.presented += 1;
        if status.is_stale() {
            debug!("Swapchain {status:?} at present");
        }
        stale |= status.is_stale();

        if stale {
            self.recreate(driver)?;
            Ok(FrameOutcome::Recreated { presented: true })
        } else {
            Ok(FrameOutcome::Presented)
        }
    }

    /// Waits for every slot's outstanding work without resetting any fence.
    pub fn drain<D: FrameDriver + ?Sized>(&self, driver: &mut D) -> Result<()> {
        for slot in 0..self.ring.depth() {
            driver.wait_fence(slot)?;
        }
        Ok(())
    }

    fn recreate<D: FrameDriver + ?Sized>(&mut self, driver: &mut D) -> Result<()> {
        self.drain(driver)?;
        driver.rebuild_swapchain()?;
        self.recreations += 1;
        Ok(())
    }
}
