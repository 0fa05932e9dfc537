//! GPU side of the layer:
//!
//! - [`format`] — the supported swapchain formats and their scratch/storage
//!   negotiation.
//! - [`pool`] — pooled ping-pong scratch textures per (swapchain, slice).
//! - [`shaders`] — lazily built shader cache, constant buffers and per-format
//!   pipeline specialization.
//! - [`timing`] — optional timestamp-query frame cost measurement.
//! - [`dispatch`] — the per-view pass chain: copy-in, sharpen, FakeHDR,
//!   levels, copy-out.

pub mod dispatch;
pub mod format;
pub mod pool;
pub mod shaders;
pub mod timing;

pub use dispatch::{FrameTarget, Outcome, PassContext, SkipReason};
pub use pool::{PoolKey, TempTexturePool};
pub use shaders::ShaderCache;
pub use timing::GpuTimer;

/// Best-effort device for GPU-backed tests; tests return early without one.
#[cfg(test)]
pub(crate) fn request_test_device() -> Option<(wgpu::Device, wgpu::Queue)> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    let adapter =
        pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions::default()))
            .ok()?;
    let optional = wgpu::Features::TIMESTAMP_QUERY
        | wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS
        | wgpu::Features::BGRA8UNORM_STORAGE;
    let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
        label: Some("clarity test device"),
        required_features: adapter.features() & optional,
        required_limits: wgpu::Limits::default(),
        experimental_features: wgpu::ExperimentalFeatures::disabled(),
        memory_hints: wgpu::MemoryHints::Performance,
        trace: wgpu::Trace::Off,
    }))
    .ok()?;
    Some((device, queue))
}
