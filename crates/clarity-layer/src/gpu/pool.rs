use std::collections::HashMap;

use crate::frame::SwapchainHandle;
use crate::gpu::format;

/// Pool key: one scratch pair per (swapchain, array slice).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub swapchain: SwapchainHandle,
    pub array_index: u32,
}

/// Ping-pong scratch pair plus the geometry it was created for.
///
/// Contents do not survive recreation; callers must not assume persistence
/// across a geometry or format change.
pub struct TempTextures {
    pub input: wgpu::Texture,
    pub output: wgpu::Texture,
    width: u32,
    height: u32,
    /// Source format the pair was negotiated from (not the scratch format).
    source_format: wgpu::TextureFormat,
    /// Bumped on every (re)creation; diagnostic for reuse verification.
    generation: u64,
}

impl TempTextures {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn matches(&self, width: u32, height: u32, source_format: wgpu::TextureFormat) -> bool {
        self.width == width && self.height == height && self.source_format == source_format
    }
}

/// Pool of per-(swapchain, slice) scratch texture pairs.
///
/// Entries persist across frames to amortize allocation and are destroyed
/// when the owning swapchain is destroyed.
#[derive(Default)]
pub struct TempTexturePool {
    entries: HashMap<PoolKey, TempTextures>,
    generation: u64,
}

impl TempTexturePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the scratch pair for `key`, (re)creating both textures when
    /// the stored geometry/format diverges from the request.
    ///
    /// `None` when the source format has no scratch equivalent.
    pub fn acquire(
        &mut self,
        device: &wgpu::Device,
        key: PoolKey,
        width: u32,
        height: u32,
        source_format: wgpu::TextureFormat,
    ) -> Option<&TempTextures> {
        let scratch = format::scratch_format(source_format)?;

        let needs_create = self
            .entries
            .get(&key)
            .is_none_or(|entry| !entry.matches(width, height, source_format));

        if needs_create {
            self.generation += 1;
            log::debug!(
                "scratch pair (re)created for swapchain {:#x} slice {}: {}x{} {:?} (gen {})",
                key.swapchain.0,
                key.array_index,
                width,
                height,
                scratch,
                self.generation
            );
            let input = create_scratch(device, "clarity scratch input", width, height, scratch);
            let output = create_scratch(device, "clarity scratch output", width, height, scratch);
            self.entries.insert(
                key,
                TempTextures {
                    input,
                    output,
                    width,
                    height,
                    source_format,
                    generation: self.generation,
                },
            );
        }

        self.entries.get(&key)
    }

    /// Drops every entry belonging to a destroyed swapchain.
    pub fn retire_swapchain(&mut self, swapchain: SwapchainHandle) {
        self.entries.retain(|key, _| key.swapchain != swapchain);
    }

    /// Drops everything (layer teardown).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Single-slice, single-mip, GPU-only texture usable as both a sampled view
/// and a write-only storage view, plus both copy directions.
fn create_scratch(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    scratch: wgpu::TextureFormat,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: scratch,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::request_test_device;

    const KEY: PoolKey = PoolKey {
        swapchain: SwapchainHandle(0x20),
        array_index: 0,
    };

    // ── reuse ──

    #[test]
    fn identical_acquires_reuse_the_pair() {
        let Some((device, _queue)) = request_test_device() else { return };
        let mut pool = TempTexturePool::new();
        let fmt = wgpu::TextureFormat::Rgba8Unorm;
        let first = pool.acquire(&device, KEY, 256, 256, fmt).unwrap().generation();
        let second = pool.acquire(&device, KEY, 256, 256, fmt).unwrap().generation();
        assert_eq!(first, second);
    }

    #[test]
    fn geometry_change_recreates_the_pair() {
        let Some((device, _queue)) = request_test_device() else { return };
        let mut pool = TempTexturePool::new();
        let fmt = wgpu::TextureFormat::Rgba8Unorm;
        let first = pool.acquire(&device, KEY, 256, 256, fmt).unwrap().generation();
        let resized = pool.acquire(&device, KEY, 128, 256, fmt).unwrap();
        assert_ne!(resized.generation(), first);
        assert_eq!(resized.input.width(), 128);
        assert_eq!(resized.output.width(), 128);
    }

    #[test]
    fn source_format_change_recreates_the_pair() {
        let Some((device, _queue)) = request_test_device() else { return };
        let mut pool = TempTexturePool::new();
        let first = pool
            .acquire(&device, KEY, 64, 64, wgpu::TextureFormat::Rgba8Unorm)
            .unwrap()
            .generation();
        let swapped = pool
            .acquire(&device, KEY, 64, 64, wgpu::TextureFormat::Rgba16Float)
            .unwrap();
        assert_ne!(swapped.generation(), first);
        assert_eq!(swapped.input.format(), wgpu::TextureFormat::Rgba16Float);
    }

    #[test]
    fn distinct_slices_get_distinct_pairs() {
        let Some((device, _queue)) = request_test_device() else { return };
        let mut pool = TempTexturePool::new();
        let fmt = wgpu::TextureFormat::Rgba8Unorm;
        let other = PoolKey { array_index: 1, ..KEY };
        let a = pool.acquire(&device, KEY, 64, 64, fmt).unwrap().generation();
        let b = pool.acquire(&device, other, 64, 64, fmt).unwrap().generation();
        assert_ne!(a, b);
        // Neither key evicted the other.
        assert_eq!(pool.acquire(&device, KEY, 64, 64, fmt).unwrap().generation(), a);
    }

    // ── lifetime ──

    #[test]
    fn retire_swapchain_drops_its_entries() {
        let Some((device, _queue)) = request_test_device() else { return };
        let mut pool = TempTexturePool::new();
        let fmt = wgpu::TextureFormat::Rgba8Unorm;
        let first = pool.acquire(&device, KEY, 64, 64, fmt).unwrap().generation();
        pool.retire_swapchain(KEY.swapchain);
        assert!(pool.entries.is_empty());
        // A fresh acquire after retirement is a new pair.
        let second = pool.acquire(&device, KEY, 64, 64, fmt).unwrap().generation();
        assert_ne!(second, first);
    }

    #[test]
    fn unsupported_source_format_yields_no_pair() {
        let Some((device, _queue)) = request_test_device() else { return };
        let mut pool = TempTexturePool::new();
        assert!(pool
            .acquire(&device, KEY, 64, 64, wgpu::TextureFormat::R32Float)
            .is_none());
        assert!(pool.entries.is_empty());
    }
}
