use std::collections::{HashMap, VecDeque};

use super::source::{FrameSource, ImageList};
use super::types::SwapchainHandle;

/// Per-swapchain image bookkeeping.
///
/// Tracks three things per swapchain handle:
/// - the cached list of native textures backing it (populated once at
///   creation, lazily re-enumerated if a runtime created the swapchain
///   outside the observed hook)
/// - the FIFO of acquired-but-not-yet-released image indices
/// - the single most recently released index
///
/// Only the most recent release is retained; a consumer that does not poll
/// every frame loses intermediate releases. Presentation order is expected to
/// use each image before acquiring the next, so in practice one slot is
/// enough.
#[derive(Default)]
pub struct SwapchainImageTracker {
    images: HashMap<SwapchainHandle, ImageList>,
    acquired: HashMap<SwapchainHandle, VecDeque<u32>>,
    last_released: HashMap<SwapchainHandle, u32>,
}

impl SwapchainImageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches the enumerated backing textures for a newly created swapchain.
    pub fn on_create(&mut self, swapchain: SwapchainHandle, images: ImageList) {
        log::debug!(
            "cached {} swapchain images for {:#x} (create)",
            images.len(),
            swapchain.0
        );
        self.images.insert(swapchain, images);
    }

    /// Records an acquired image index.
    pub fn on_acquire(&mut self, swapchain: SwapchainHandle, index: u32) {
        self.acquired.entry(swapchain).or_default().push_back(index);
    }

    /// Pops the oldest acquired index and records it as the last release.
    ///
    /// Returns the released index, or `None` when the host released without a
    /// matching acquire (left unrecorded rather than guessed).
    pub fn on_release(&mut self, swapchain: SwapchainHandle) -> Option<u32> {
        let index = self.acquired.get_mut(&swapchain)?.pop_front()?;
        self.last_released.insert(swapchain, index);
        log::debug!("swapchain {:#x} released image index {}", swapchain.0, index);
        Some(index)
    }

    /// Erases all bookkeeping for a destroyed swapchain.
    pub fn on_destroy(&mut self, swapchain: SwapchainHandle) {
        self.images.remove(&swapchain);
        self.acquired.remove(&swapchain);
        self.last_released.remove(&swapchain);
    }

    /// The most recently released image index, if any.
    pub fn last_released(&self, swapchain: SwapchainHandle) -> Option<u32> {
        self.last_released.get(&swapchain).copied()
    }

    /// The cached texture list, re-enumerating through the host on a miss.
    pub fn resolve(
        &mut self,
        swapchain: SwapchainHandle,
        source: &dyn FrameSource,
    ) -> Option<&ImageList> {
        if !self.images.contains_key(&swapchain) {
            let images = source.enumerate_images(swapchain)?;
            log::debug!(
                "cached {} swapchain images for {:#x} (fallback)",
                images.len(),
                swapchain.0
            );
            self.images.insert(swapchain, images);
        }
        self.images.get(&swapchain)
    }

    /// Drops everything (process/layer teardown).
    pub fn clear(&mut self) {
        self.images.clear();
        self.acquired.clear();
        self.last_released.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubSource {
        count: usize,
    }

    impl FrameSource for StubSource {
        fn enumerate_images(&self, _swapchain: SwapchainHandle) -> Option<ImageList> {
            Some((0..self.count).map(|_| None).collect())
        }
    }

    struct EmptySource;

    impl FrameSource for EmptySource {
        fn enumerate_images(&self, _swapchain: SwapchainHandle) -> Option<ImageList> {
            None
        }
    }

    const SC: SwapchainHandle = SwapchainHandle(0x10);

    // ── acquire/release FIFO ──────────────────────────────────────────────

    #[test]
    fn release_pops_fifo_and_records_last() {
        let mut t = SwapchainImageTracker::new();
        for i in [0, 1, 2] {
            t.on_acquire(SC, i);
        }
        assert_eq!(t.on_release(SC), Some(0));
        assert_eq!(t.on_release(SC), Some(1));
        assert_eq!(t.last_released(SC), Some(1));
        assert_eq!(t.acquired.get(&SC).unwrap().iter().copied().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn release_without_acquire_records_nothing() {
        let mut t = SwapchainImageTracker::new();
        assert_eq!(t.on_release(SC), None);
        assert_eq!(t.last_released(SC), None);
    }

    #[test]
    fn last_released_is_a_snapshot_not_a_history() {
        let mut t = SwapchainImageTracker::new();
        t.on_acquire(SC, 0);
        t.on_acquire(SC, 1);
        t.on_release(SC);
        t.on_release(SC);
        // Only the most recent release survives.
        assert_eq!(t.last_released(SC), Some(1));
    }

    // ── lifetime ──────────────────────────────────────────────────────────

    #[test]
    fn destroy_erases_all_bookkeeping() {
        let mut t = SwapchainImageTracker::new();
        t.on_create(SC, vec![None, None]);
        t.on_acquire(SC, 0);
        t.on_release(SC);
        t.on_destroy(SC);
        assert!(t.images.is_empty());
        assert!(t.acquired.is_empty());
        assert_eq!(t.last_released(SC), None);
    }

    // ── resolve ───────────────────────────────────────────────────────────

    #[test]
    fn resolve_prefers_cached_list() {
        let mut t = SwapchainImageTracker::new();
        t.on_create(SC, vec![None, None, None]);
        // Stub would produce 1 entry; the cached 3-entry list must win.
        let list = t.resolve(SC, &StubSource { count: 1 }).unwrap();
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn resolve_enumerates_on_miss_and_caches() {
        let mut t = SwapchainImageTracker::new();
        assert_eq!(t.resolve(SC, &StubSource { count: 2 }).unwrap().len(), 2);
        // Second resolve must not re-enumerate.
        assert_eq!(t.resolve(SC, &EmptySource).unwrap().len(), 2);
    }

    #[test]
    fn resolve_fails_when_host_cannot_enumerate() {
        let mut t = SwapchainImageTracker::new();
        assert!(t.resolve(SC, &EmptySource).is_none());
    }
}
