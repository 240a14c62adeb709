//! Live GPU handle accounting.
//!
//! Every handle the renderer creates is counted here by kind and uncounted when
//! it is destroyed, so teardown and swapchain recreation can be checked for
//! leaks without a validation layer.

use std::collections::BTreeMap;
use std::fmt;

use parking_lot::Mutex;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Instance,
    DebugMessenger,
    Surface,
    Device,
    Allocator,
    Buffer,
    Image,
    ImageView,
    Framebuffer,
    Semaphore,
    Fence,
    CommandPool,
    ShaderModule,
    PipelineCache,
    PipelineLayout,
    DescriptorSetLayout,
    DescriptorPool,
    RenderPass,
    Pipeline,
    Swapchain,
}

/// Thread-safe counter of live handles, shared between the renderer and observers.
#[derive(Default)]
pub struct ResourceTracker {
    live: Mutex<BTreeMap<ResourceKind, usize>>,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self, kind: ResourceKind) {
        self.created_n(kind, 1);
    }

    pub fn created_n(&self, kind: ResourceKind, count: usize) {
        if count == 0 {
            return;
        }
        *self.live.lock().entry(kind).or_insert(0) += count;
    }

    pub fn destroyed(&self, kind: ResourceKind) {
        self.destroyed_n(kind, 1);
    }

    pub fn destroyed_n(&self, kind: ResourceKind, count: usize) {
        if count == 0 {
            return;
        }
        let mut live = self.live.lock();
        match live.get_mut(&kind) {
            Some(n) if *n >= count => {
                *n -= count;
                if *n == 0 {
                    live.remove(&kind);
                }
            }
            _ => {
                log::error!("Destroyed {count} {kind:?} handle(s) that were never tracked");
                debug_assert!(false, "untracked {kind:?} destroyed");
            }
        }
    }

    pub fn live(&self, kind: ResourceKind) -> usize {
        self.live.lock().get(&kind).copied().unwrap_or(0)
    }

    pub fn total_live(&self) -> usize {
        self.live.lock().values().sum()
    }

    pub fn snapshot(&self) -> BTreeMap<ResourceKind, usize> {
        self.live.lock().clone()
    }
}

impl fmt::Debug for ResourceTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.snapshot()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_balance_out() {
        let tracker = ResourceTracker::new();
        tracker.created_n(ResourceKind::Framebuffer, 3);
        tracker.created(ResourceKind::Fence);
        assert_eq!(tracker.live(ResourceKind::Framebuffer), 3);
        assert_eq!(tracker.total_live(), 4);

        tracker.destroyed_n(ResourceKind::Framebuffer, 3);
        tracker.destroyed(ResourceKind::Fence);
        assert_eq!(tracker.total_live(), 0);
        assert!(tracker.snapshot().is_empty());
    }

    #[test]
    fn zero_counts_are_ignored() {
        let tracker = ResourceTracker::new();
        tracker.created_n(ResourceKind::Image, 0);
        tracker.destroyed_n(ResourceKind::Image, 0);
        assert_eq!(tracker.total_live(), 0);
    }
}
