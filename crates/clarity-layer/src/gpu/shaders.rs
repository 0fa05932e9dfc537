use std::collections::HashMap;
use std::num::NonZeroU64;
use std::path::PathBuf;

use bytemuck::{Pod, Zeroable};

use crate::config::EffectConfig;
use crate::gpu::format;

/// Primary filter constants, derived from (strength, full width, full height).
///
/// 32 bytes; `peak` is the precomputed negative-lobe scale and is zero at
/// strength zero, which makes the kernel an exact identity.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct CasConstants {
    pub input_size: [f32; 2],
    pub inv_input_size: [f32; 2],
    pub sharpness: f32,
    pub peak: f32,
    pub _pad: [f32; 2],
}

impl CasConstants {
    /// `strength` is the per-pass shader strength, already saturated to 1.0.
    pub fn new(strength: f32, width: u32, height: u32) -> Self {
        let s = strength.clamp(0.0, 1.0);
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        Self {
            input_size: [w, h],
            inv_input_size: [1.0 / w, 1.0 / h],
            sharpness: s,
            peak: s / (8.0 - 3.0 * s),
            _pad: [0.0; 2],
        }
    }
}

/// Overlay flags plus the sub-rectangle every dispatch addresses. 32 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct RectConstants {
    pub flags: u32,
    pub off_x: u32,
    pub off_y: u32,
    pub ext_x: u32,
    pub ext_y: u32,
    pub _pad: [u32; 3],
}

/// FakeHDR pass constants. 32 bytes.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct FakeHdrConstants {
    pub power: f32,
    pub radius1: f32,
    pub radius2: f32,
    pub _pad: f32,
    pub off_x: u32,
    pub off_y: u32,
    pub ext_x: u32,
    pub ext_y: u32,
}

/// Levels pass constants. 32 bytes, no rectangle (the pass addresses pixels
/// from the dispatch grid origin).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct LevelsConstants {
    pub in_black: f32,
    pub in_white: f32,
    pub out_black: f32,
    pub out_white: f32,
    pub gamma: f32,
    pub _pad: [f32; 3],
}

const UNIFORM_SIZE: u64 = 32;

const STORAGE_FORMAT_TOKEN: &str = "{{STORAGE_FORMAT}}";

/// Dynamically updated constant buffers, created once per session.
pub struct UniformBuffers {
    pub cas: wgpu::Buffer,
    pub rect: wgpu::Buffer,
    pub fake_hdr: Option<wgpu::Buffer>,
    pub levels: Option<wgpu::Buffer>,
}

/// Compute pipelines specialized for one scratch storage format class.
pub struct PipelineSet {
    pub cas_layout: wgpu::BindGroupLayout,
    pub cas: wgpu::ComputePipeline,
    pub fake_hdr: Option<(wgpu::BindGroupLayout, wgpu::ComputePipeline)>,
    pub levels: Option<(wgpu::BindGroupLayout, wgpu::ComputePipeline)>,
}

enum CacheState {
    Uninit,
    Ready,
    Failed,
}

#[derive(Copy, Clone)]
enum Secondary {
    FakeHdr,
    Levels,
}

impl Secondary {
    fn name(self) -> &'static str {
        match self {
            Secondary::FakeHdr => "fakehdr",
            Secondary::Levels => "levels",
        }
    }
}

/// Lazily created, idempotent shader and constant-buffer cache for one
/// session's device.
///
/// The first successful `ensure` loads everything this cache needs from disk
/// and is never repeated; a failed attempt sets a sticky failure flag so
/// subsequent frames short-circuit instead of re-running expensive setup.
/// The two secondary passes degrade individually: a missing or broken
/// secondary shader disables that pass for the session's remaining lifetime
/// while the primary filter keeps working.
pub struct ShaderCache {
    shader_dir: PathBuf,
    fake_hdr_wanted: bool,
    levels_wanted: bool,

    state: CacheState,
    /// Number of load attempts; must stay at 1 after the first call.
    attempts: u32,

    primary_binary: Option<Vec<u8>>,
    primary_text: Option<String>,
    fake_hdr_text: Option<String>,
    levels_text: Option<String>,

    buffers: Option<UniformBuffers>,
    pipelines: HashMap<wgpu::TextureFormat, PipelineSet>,
}

impl ShaderCache {
    pub fn new(config: &EffectConfig) -> Self {
        Self {
            shader_dir: config.shader_dir.clone(),
            fake_hdr_wanted: config.fake_hdr.enabled,
            levels_wanted: config.levels.enabled,
            state: CacheState::Uninit,
            attempts: 0,
            primary_binary: None,
            primary_text: None,
            fake_hdr_text: None,
            levels_text: None,
            buffers: None,
            pipelines: HashMap::new(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, CacheState::Ready)
    }

    /// Whether the FakeHDR pass is still available for this session.
    pub fn fake_hdr_available(&self) -> bool {
        self.fake_hdr_text.is_some()
    }

    /// Whether the levels pass is still available for this session.
    pub fn levels_available(&self) -> bool {
        self.levels_text.is_some()
    }

    pub fn buffers(&self) -> Option<&UniformBuffers> {
        self.buffers.as_ref()
    }

    /// Loads shader assets and creates the constant buffers, once.
    ///
    /// Returns readiness. Work happens at most once; afterwards this is a
    /// state check.
    pub fn ensure(&mut self, device: &wgpu::Device) -> bool {
        match self.state {
            CacheState::Ready => return true,
            CacheState::Failed => return false,
            CacheState::Uninit => {}
        }
        self.attempts += 1;

        let spv_path = self.shader_dir.join("cas.spv");
        let wgsl_path = self.shader_dir.join("cas.wgsl");
        self.primary_binary = std::fs::read(&spv_path).ok().filter(|b| !b.is_empty());
        self.primary_text = std::fs::read_to_string(&wgsl_path).ok();

        if self.primary_binary.is_none() && self.primary_text.is_none() {
            log::error!(
                "primary filter shader missing ({} / {}); sharpening disabled for this session",
                spv_path.display(),
                wgsl_path.display()
            );
            self.state = CacheState::Failed;
            return false;
        }
        if self.primary_binary.is_some() {
            log::info!("primary filter loaded (precompiled): {}", spv_path.display());
        } else {
            log::info!("primary filter source loaded: {}", wgsl_path.display());
        }

        if self.fake_hdr_wanted {
            let path = self.shader_dir.join("fakehdr.wgsl");
            self.fake_hdr_text = std::fs::read_to_string(&path).ok();
            if self.fake_hdr_text.is_none() {
                log::warn!("FakeHDR shader missing at {}; fakehdr disabled", path.display());
            }
        }
        if self.levels_wanted {
            let path = self.shader_dir.join("levels.wgsl");
            self.levels_text = std::fs::read_to_string(&path).ok();
            if self.levels_text.is_none() {
                log::warn!("Levels shader missing at {}; levels disabled", path.display());
            }
        }

        self.buffers = Some(UniformBuffers {
            cas: create_uniform(device, "clarity cas constants"),
            rect: create_uniform(device, "clarity rect constants"),
            fake_hdr: self
                .fake_hdr_text
                .is_some()
                .then(|| create_uniform(device, "clarity fakehdr constants")),
            levels: self
                .levels_text
                .is_some()
                .then(|| create_uniform(device, "clarity levels constants")),
        });

        self.state = CacheState::Ready;
        true
    }

    /// Pipelines for one scratch format class, built on first use.
    ///
    /// A primary pipeline failure is sticky (every later call fails fast);
    /// a secondary pipeline failure only disables that pass.
    pub fn pipelines_for(
        &mut self,
        device: &wgpu::Device,
        scratch: wgpu::TextureFormat,
    ) -> Option<&PipelineSet> {
        if !matches!(self.state, CacheState::Ready) {
            return None;
        }
        if self.pipelines.contains_key(&scratch) {
            return self.pipelines.get(&scratch);
        }

        let token = format::storage_token(scratch)?;

        let cas_layout = kernel_layout(device, "clarity cas bgl", scratch, true);
        let cas = match self.build_primary(device, scratch, token, &cas_layout) {
            Ok(pipeline) => pipeline,
            Err(msg) => {
                log::error!("primary filter pipeline failed ({token}): {msg}");
                self.state = CacheState::Failed;
                return None;
            }
        };

        let fake_hdr = self.build_secondary(device, Secondary::FakeHdr, scratch, token);
        let levels = self.build_secondary(device, Secondary::Levels, scratch, token);

        self.pipelines.insert(
            scratch,
            PipelineSet { cas_layout, cas, fake_hdr, levels },
        );
        self.pipelines.get(&scratch)
    }

    fn build_primary(
        &self,
        device: &wgpu::Device,
        scratch: wgpu::TextureFormat,
        token: &str,
        layout: &wgpu::BindGroupLayout,
    ) -> Result<wgpu::ComputePipeline, String> {
        // Precompiled binaries bake their storage format; only the rgba8unorm
        // class can use one directly. Other classes specialize from source.
        if scratch == wgpu::TextureFormat::Rgba8Unorm {
            if let Some(binary) = &self.primary_binary {
                let source = wgpu::util::make_spirv(binary);
                match build_pipeline(device, "clarity cas pipeline", source, layout) {
                    Ok(pipeline) => return Ok(pipeline),
                    Err(msg) => {
                        log::warn!("precompiled primary filter unusable ({msg}); trying source");
                    }
                }
            }
        }
        let text = self
            .primary_text
            .as_ref()
            .ok_or_else(|| format!("no WGSL source to specialize for {token}"))?;
        let specialized = text.replace(STORAGE_FORMAT_TOKEN, token);
        build_pipeline(
            device,
            "clarity cas pipeline",
            wgpu::ShaderSource::Wgsl(specialized.into()),
            layout,
        )
    }

    fn secondary_source(&mut self, which: Secondary) -> &mut Option<String> {
        match which {
            Secondary::FakeHdr => &mut self.fake_hdr_text,
            Secondary::Levels => &mut self.levels_text,
        }
    }

    fn build_secondary(
        &mut self,
        device: &wgpu::Device,
        which: Secondary,
        scratch: wgpu::TextureFormat,
        token: &str,
    ) -> Option<(wgpu::BindGroupLayout, wgpu::ComputePipeline)> {
        let name = which.name();
        let text = self.secondary_source(which).as_ref()?.clone();
        let layout = kernel_layout(device, &format!("clarity {name} bgl"), scratch, false);
        let specialized = text.replace(STORAGE_FORMAT_TOKEN, token);
        match build_pipeline(
            device,
            &format!("clarity {name} pipeline"),
            wgpu::ShaderSource::Wgsl(specialized.into()),
            &layout,
        ) {
            Ok(pipeline) => Some((layout, pipeline)),
            Err(msg) => {
                log::warn!("{name} shader failed to build ({msg}); {name} disabled");
                *self.secondary_source(which) = None;
                None
            }
        }
    }

    #[cfg(test)]
    fn attempts(&self) -> u32 {
        self.attempts
    }
}

fn create_uniform(device: &wgpu::Device, label: &str) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: UNIFORM_SIZE,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Bind group layout shared by every kernel: sampled source, write-only
/// storage destination, one 32-byte uniform, plus a second uniform for the
/// primary filter's rectangle constants.
fn kernel_layout(
    device: &wgpu::Device,
    label: &str,
    scratch: wgpu::TextureFormat,
    with_rect: bool,
) -> wgpu::BindGroupLayout {
    let uniform = |binding: u32| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(UNIFORM_SIZE),
        },
        count: None,
    };

    let mut entries = vec![
        wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        },
        wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: scratch,
                view_dimension: wgpu::TextureViewDimension::D2,
            },
            count: None,
        },
        uniform(2),
    ];
    if with_rect {
        entries.push(uniform(3));
    }

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    })
}

/// Builds a compute pipeline with validation errors trapped in an error
/// scope, so a broken shader asset degrades instead of reaching the
/// uncaptured-error handler.
fn build_pipeline(
    device: &wgpu::Device,
    label: &str,
    source: wgpu::ShaderSource<'_>,
    bind_layout: &wgpu::BindGroupLayout,
) -> Result<wgpu::ComputePipeline, String> {
    let error_scope = device.push_error_scope(wgpu::ErrorFilter::Validation);

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source,
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[bind_layout],
        immediate_size: 0,
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: &module,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });

    match pollster::block_on(error_scope.pop()) {
        None => Ok(pipeline),
        Some(err) => Err(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::request_test_device;
    use std::path::Path;

    fn config_with_dir(dir: &Path) -> EffectConfig {
        let mut config = EffectConfig::default();
        config.shader_dir = dir.to_path_buf();
        config.fake_hdr.enabled = true;
        config.levels.enabled = true;
        config
    }

    fn repo_shader_dir() -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("shaders")
    }

    #[test]
    fn constants_are_16_byte_aligned_32_byte_layouts() {
        assert_eq!(std::mem::size_of::<CasConstants>(), 32);
        assert_eq!(std::mem::size_of::<RectConstants>(), 32);
        assert_eq!(std::mem::size_of::<FakeHdrConstants>(), 32);
        assert_eq!(std::mem::size_of::<LevelsConstants>(), 32);
    }

    #[test]
    fn zero_strength_has_zero_peak() {
        let c = CasConstants::new(0.0, 1024, 768);
        assert_eq!(c.peak, 0.0);
        assert_eq!(c.input_size, [1024.0, 768.0]);
    }

    #[test]
    fn strength_saturates_at_one() {
        let a = CasConstants::new(1.0, 64, 64);
        let b = CasConstants::new(5.0, 64, 64);
        assert_eq!(a.peak, b.peak);
    }

    #[test]
    fn ensure_is_idempotent_and_builds_once() {
        let Some((device, _queue)) = request_test_device() else { return };
        let mut cache = ShaderCache::new(&config_with_dir(&repo_shader_dir()));
        assert!(cache.ensure(&device));
        assert!(cache.ensure(&device));
        assert_eq!(cache.attempts(), 1);
        assert!(cache.buffers().unwrap().fake_hdr.is_some());
        assert!(cache.buffers().unwrap().levels.is_some());
    }

    #[test]
    fn missing_primary_shader_fails_sticky() {
        let Some((device, _queue)) = request_test_device() else { return };
        let dir = std::env::temp_dir().join(format!("clarity-empty-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut cache = ShaderCache::new(&config_with_dir(&dir));
        assert!(!cache.ensure(&device));
        assert!(!cache.ensure(&device));
        assert_eq!(cache.attempts(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_secondary_disables_only_that_pass() {
        let Some((device, _queue)) = request_test_device() else { return };
        let dir = std::env::temp_dir().join(format!("clarity-partial-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::copy(repo_shader_dir().join("cas.wgsl"), dir.join("cas.wgsl")).unwrap();
        std::fs::copy(repo_shader_dir().join("levels.wgsl"), dir.join("levels.wgsl")).unwrap();

        let mut cache = ShaderCache::new(&config_with_dir(&dir));
        assert!(cache.ensure(&device));
        assert!(!cache.fake_hdr_available());
        assert!(cache.levels_available());

        let set = cache.pipelines_for(&device, wgpu::TextureFormat::Rgba8Unorm).unwrap();
        assert!(set.fake_hdr.is_none());
        assert!(set.levels.is_some());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn broken_secondary_shader_degrades() {
        let Some((device, _queue)) = request_test_device() else { return };
        let dir = std::env::temp_dir().join(format!("clarity-broken-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::copy(repo_shader_dir().join("cas.wgsl"), dir.join("cas.wgsl")).unwrap();
        std::fs::write(dir.join("levels.wgsl"), "this is not wgsl {").unwrap();

        let mut cache = ShaderCache::new(&config_with_dir(&dir));
        assert!(cache.ensure(&device));
        let set = cache.pipelines_for(&device, wgpu::TextureFormat::Rgba8Unorm).unwrap();
        assert!(set.levels.is_none());
        assert!(!cache.levels_available());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn pipelines_are_cached_per_format_class() {
        let Some((device, _queue)) = request_test_device() else { return };
        let mut cache = ShaderCache::new(&config_with_dir(&repo_shader_dir()));
        assert!(cache.ensure(&device));
        assert!(cache.pipelines_for(&device, wgpu::TextureFormat::Rgba8Unorm).is_some());
        assert!(cache.pipelines_for(&device, wgpu::TextureFormat::Rgba16Float).is_some());
        assert_eq!(cache.pipelines.len(), 2);
    }
}
