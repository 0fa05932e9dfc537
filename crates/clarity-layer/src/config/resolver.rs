use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use super::effect::EffectConfig;

/// Environment variable overrides (highest precedence).
const ENV_SHARPNESS: &str = "XR_CAS_SHARPNESS";
const ENV_DEBUG_FRAMES: &str = "XR_CAS_DEBUG_FRAMES";
const ENV_DEBUG_OVERLAY: &str = "XR_CAS_DEBUG_OVERLAY";
const ENV_SHADER_DIR: &str = "XR_CAS_SHADER_DIR";

const CONFIG_FILE_NAME: &str = "config.cfg";

/// Where configuration is read from.
///
/// Carried explicitly (instead of touching process globals inside the
/// resolver) so precedence is testable and a host can relocate the files.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Environment snapshot. Keys are matched exactly.
    pub env: HashMap<String, String>,
    /// Per-user config file (first match wins over the install file).
    pub user_path: Option<PathBuf>,
    /// Installation directory; holds the fallback config file and the
    /// `shaders` asset subdirectory.
    pub install_dir: Option<PathBuf>,
}

impl ConfigSources {
    /// Snapshot of the running process: real environment, per-user config
    /// location, and the directory the component is installed in.
    pub fn from_process() -> Self {
        let env: HashMap<String, String> = std::env::vars().collect();

        let user_path = user_config_dir(&env).map(|dir| dir.join(CONFIG_FILE_NAME));
        let install_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf));

        Self { env, user_path, install_dir }
    }

    fn install_path(&self) -> Option<PathBuf> {
        self.install_dir.as_ref().map(|dir| dir.join(CONFIG_FILE_NAME))
    }

    /// First value found for `file_key`, walking env -> per-user file ->
    /// per-install file. Each level is consulted only when the previous one
    /// yields nothing; a malformed value therefore shadows lower levels.
    fn lookup(
        &self,
        env_key: Option<&str>,
        file_key: &str,
        user: &HashMap<String, String>,
        install: &HashMap<String, String>,
    ) -> Option<String> {
        if let Some(key) = env_key {
            if let Some(v) = self.env.get(key) {
                return Some(v.clone());
            }
        }
        if let Some(v) = user.get(file_key) {
            return Some(v.clone());
        }
        install.get(file_key).cloned()
    }
}

fn user_config_dir(env: &HashMap<String, String>) -> Option<PathBuf> {
    if let Some(xdg) = env.get("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(xdg).join("clarity"));
    }
    if let Some(local) = env.get("LOCALAPPDATA").filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(local).join("clarity"));
    }
    env.get("HOME")
        .filter(|v| !v.is_empty())
        .map(|home| PathBuf::from(home).join(".config").join("clarity"))
}

/// Parses a line-oriented `key=value` file into a lowercase-keyed map.
///
/// Blank lines and lines starting with `#` or `;` are comments; keys and
/// values are whitespace-trimmed; unmatched lines are ignored.
fn parse_config_file(path: &Path) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let Ok(text) = fs::read_to_string(path) else {
        return map;
    };
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        map.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    map
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Resolves the effect configuration from the given sources.
///
/// Numeric fields fail closed: a value that does not parse keeps the default.
/// Also performs the config-file side effects: the per-user file is created
/// with documented defaults when absent, and older files missing the FakeHDR
/// section get it appended (additive migration, never destructive).
pub fn resolve(sources: &ConfigSources) -> EffectConfig {
    if let Some(user_path) = &sources.user_path {
        if let Err(err) = ensure_default_config(user_path) {
            log::warn!("could not create default config at {}: {err}", user_path.display());
        }
    }

    let user = sources
        .user_path
        .as_deref()
        .map(parse_config_file)
        .unwrap_or_default();
    let install = sources
        .install_path()
        .as_deref()
        .map(parse_config_file)
        .unwrap_or_default();

    let mut config = EffectConfig::default();

    let get = |env_key: Option<&str>, file_key: &str| -> Option<String> {
        sources.lookup(env_key, file_key, &user, &install)
    };
    let get_f32 = |env_key: Option<&str>, file_key: &str, default: f32| -> f32 {
        get(env_key, file_key)
            .and_then(|v| v.parse::<f32>().ok())
            .unwrap_or(default)
    };

    config.sharpness =
        get_f32(Some(ENV_SHARPNESS), "sharpness", config.sharpness).max(0.0);

    if let Some(v) = get(Some(ENV_DEBUG_OVERLAY), "debug_overlay") {
        config.debug_overlay = parse_bool(&v);
    }
    config.debug_frames_max = get(Some(ENV_DEBUG_FRAMES), "debug_frames")
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(config.debug_frames_max);

    if let Some(v) = get(None, "levels_enable") {
        config.levels.enabled = parse_bool(&v);
    }
    config.levels.in_black = get_f32(None, "levels_in_black", config.levels.in_black);
    config.levels.in_white = get_f32(None, "levels_in_white", config.levels.in_white);
    config.levels.out_black = get_f32(None, "levels_out_black", config.levels.out_black);
    config.levels.out_white = get_f32(None, "levels_out_white", config.levels.out_white);
    config.levels.gamma = get_f32(None, "levels_gamma", config.levels.gamma);

    if let Some(v) = get(None, "fakehdr_enable") {
        config.fake_hdr.enabled = parse_bool(&v);
    }
    config.fake_hdr.power = get_f32(None, "fakehdr_power", config.fake_hdr.power);
    config.fake_hdr.radius1 = get_f32(None, "fakehdr_radius1", config.fake_hdr.radius1);
    config.fake_hdr.radius2 = get_f32(None, "fakehdr_radius2", config.fake_hdr.radius2);

    config.shader_dir = sources
        .env
        .get(ENV_SHADER_DIR)
        .map(PathBuf::from)
        .or_else(|| sources.install_dir.as_ref().map(|dir| dir.join("shaders")))
        .unwrap_or_else(|| PathBuf::from("shaders"));

    log::info!("sharpness set to {:.3}", config.sharpness);
    log::info!(
        "debug: overlay={} frames={}",
        config.debug_overlay as u32,
        config.debug_frames_max
    );

    config
}

const DEFAULT_CONFIG: &str = "\
# Clarity layer configuration
# Sharpening strength (>=0). Values >1.0 apply multiple sharpening passes.
sharpness=0.6

# Debug overlay (0/1) and number of frames for border/overlay
debug_overlay=0
debug_frames=60

# Optional Levels pass (applied after sharpening)
levels_enable=0
levels_in_black=0.0
levels_in_white=1.0
levels_out_black=0.0
levels_out_white=1.0
levels_gamma=1.0
";

const FAKEHDR_SECTION: &str = "\

# Optional FakeHDR pass (applied after sharpening, before Levels)
fakehdr_enable=0
fakehdr_power=1.30
fakehdr_radius1=0.793
fakehdr_radius2=0.87
";

/// Creates the per-user config with documented defaults, or appends the
/// FakeHDR section to an existing file that predates it.
pub fn ensure_default_config(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;
        file.write_all(FAKEHDR_SECTION.as_bytes())?;
        log::info!("created default config at {}", path.display());
        return Ok(());
    }

    let existing = fs::read_to_string(path)?;
    if !existing.contains("fakehdr_enable") {
        let mut file = fs::OpenOptions::new().append(true).open(path)?;
        file.write_all(FAKEHDR_SECTION.as_bytes())?;
        log::info!("appended FakeHDR defaults to existing config");
    }
    Ok(())
}
