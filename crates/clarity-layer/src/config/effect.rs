use std::path::PathBuf;

/// Levels/gamma pass settings (applied after sharpening and FakeHDR).
#[derive(Debug, Clone, PartialEq)]
pub struct LevelsConfig {
    pub enabled: bool,
    pub in_black: f32,
    pub in_white: f32,
    pub out_black: f32,
    pub out_white: f32,
    pub gamma: f32,
}

impl Default for LevelsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            in_black: 0.0,
            in_white: 1.0,
            out_black: 0.0,
            out_white: 1.0,
            gamma: 1.0,
        }
    }
}

/// FakeHDR tone-map pass settings (applied after sharpening, before levels).
#[derive(Debug, Clone, PartialEq)]
pub struct FakeHdrConfig {
    pub enabled: bool,
    pub power: f32,
    pub radius1: f32,
    pub radius2: f32,
}

impl Default for FakeHdrConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            power: 1.30,
            radius1: 0.793,
            radius2: 0.87,
        }
    }
}

/// Resolved per-session effect configuration.
///
/// Immutable after session creation: the resolver runs once when the session
/// is created and the result is owned by that session for its lifetime.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectConfig {
    /// Sharpening strength, >= 0. Values above 1.0 saturate the per-pass
    /// shader strength and instead add extra sharpening passes.
    pub sharpness: f32,

    /// Debug overlay request. Resolved and logged, but the dispatch engine
    /// always submits the overlay flags as zero in production builds.
    pub debug_overlay: bool,

    /// Frame budget for debug border/overlay drawing.
    pub debug_frames_max: u32,

    pub levels: LevelsConfig,
    pub fake_hdr: FakeHdrConfig,

    /// Directory holding the compute shader assets.
    pub shader_dir: PathBuf,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            sharpness: 0.6,
            debug_overlay: false,
            debug_frames_max: 60,
            levels: LevelsConfig::default(),
            fake_hdr: FakeHdrConfig::default(),
            shader_dir: PathBuf::from("shaders"),
        }
    }
}
