//! Shell configuration – reads/writes `~/.replicant/config.toml`.

use replicant_kernel::CollisionPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted user configuration stored in `~/.replicant/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Framerate requested from the simulator when the replicant spawns.
    #[serde(default = "default_target_framerate")]
    pub target_framerate: u32,

    /// Half the side length of the simulated room, in metres.
    #[serde(default = "default_room_half_extent")]
    pub room_half_extent: f32,

    /// Collision policy applied to the shell's replicant.
    #[serde(default)]
    pub collision: CollisionPolicy,

    /// Round-trip budget for a single shell command.
    #[serde(default = "default_max_ticks")]
    pub max_ticks: u64,
}

fn default_target_framerate() -> u32 {
    100
}
fn default_room_half_extent() -> f32 {
    4.0
}
fn default_max_ticks() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_framerate: default_target_framerate(),
            room_half_extent: default_room_half_extent(),
            collision: CollisionPolicy::default(),
            max_ticks: default_max_ticks(),
        }
    }
}

/// Return the path to `~/.replicant/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".replicant").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `REPLICANT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `REPLICANT_FRAMERATE` | `target_framerate` |
/// | `REPLICANT_ROOM` | `room_half_extent` |
/// | `REPLICANT_MAX_TICKS` | `max_ticks` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("REPLICANT_FRAMERATE")
        && let Ok(framerate) = v.parse::<u32>()
        && framerate > 0
    {
        cfg.target_framerate = framerate;
    }
    if let Ok(v) = std::env::var("REPLICANT_ROOM")
        && let Ok(half_extent) = v.parse::<f32>()
        && half_extent.is_finite()
        && half_extent > 0.0
    {
        cfg.room_half_extent = half_extent;
    }
    if let Ok(v) = std::env::var("REPLICANT_MAX_TICKS")
        && let Ok(ticks) = v.parse::<u64>()
    {
        cfg.max_ticks = ticks;
    }
}

/// Save the config to disk, creating `~/.replicant/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
