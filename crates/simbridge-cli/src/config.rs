//! Configuration vault – reads/writes `~/.simbridge/config.toml`.

use serde::{Deserialize, Serialize};
use simbridge_types::BridgeConfig;
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted user configuration stored in `~/.simbridge/config.toml`.
///
/// Scalar fields come first so that `toml` can emit the `[bridge]` table
/// after them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Uniform motor level sent by the hover policy.
    #[serde(default = "default_hover_level")]
    pub hover_level: f64,

    /// Log one line for every N camera frames.
    #[serde(default = "default_log_every_frames")]
    pub log_every_frames: u64,

    /// Endpoints, image geometry and timeouts.
    #[serde(default)]
    pub bridge: BridgeConfig,
}

fn default_hover_level() -> f64 {
    simbridge_policy::DEFAULT_HOVER_LEVEL
}
fn default_log_every_frames() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hover_level: default_hover_level(),
            log_every_frames: default_log_every_frames(),
            bridge: BridgeConfig::default(),
        }
    }
}

/// Return the path to `~/.simbridge/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".simbridge").join("config.toml")
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

/// Apply `SIMBRIDGE_*` environment variable overrides to `cfg`.
///
/// Values that fail to parse are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `SIMBRIDGE_HOST` | `bridge.host` |
/// | `SIMBRIDGE_MOTOR_PORT` | `bridge.motor_port` |
/// | `SIMBRIDGE_TELEMETRY_PORT` | `bridge.telemetry_port` |
/// | `SIMBRIDGE_IMAGE_PORT` | `bridge.image_port` |
/// | `SIMBRIDGE_IMAGE_ROWS` | `bridge.image_rows` |
/// | `SIMBRIDGE_IMAGE_COLS` | `bridge.image_cols` |
/// | `SIMBRIDGE_DEMAND_COUNT` | `bridge.demand_count` |
/// | `SIMBRIDGE_HOVER_LEVEL` | `hover_level` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SIMBRIDGE_HOST")
        && !v.trim().is_empty()
    {
        cfg.bridge.host = v.trim().to_string();
    }
    override_parsed("SIMBRIDGE_MOTOR_PORT", &mut cfg.bridge.motor_port);
    override_parsed("SIMBRIDGE_TELEMETRY_PORT", &mut cfg.bridge.telemetry_port);
    override_parsed("SIMBRIDGE_IMAGE_PORT", &mut cfg.bridge.image_port);
    override_parsed("SIMBRIDGE_IMAGE_ROWS", &mut cfg.bridge.image_rows);
    override_parsed("SIMBRIDGE_IMAGE_COLS", &mut cfg.bridge.image_cols);
    override_parsed("SIMBRIDGE_DEMAND_COUNT", &mut cfg.bridge.demand_count);
    override_parsed("SIMBRIDGE_HOVER_LEVEL", &mut cfg.hover_level);
}

fn override_parsed<T: std::str::FromStr>(var: &str, field: &mut T) {
    if let Ok(v) = std::env::var(var)
        && let Ok(parsed) = v.trim().parse::<T>()
    {
        *field = parsed;
    }
}

/// Save the config to disk, creating `~/.simbridge/` if necessary.
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
    // Owner-only read/write (rw-------) on Unix.
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env-override tests mutate process-global state.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_default_config() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, Config::default());
        assert_eq!(loaded.bridge.motor_port, 5000);
        assert_eq!(loaded.bridge.telemetry_port, 5001);
        assert_eq!(loaded.bridge.image_port, 5002);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "hover_level = 0.4\n\n[bridge]\nimage_rows = 120\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.hover_level, 0.4);
        assert_eq!(loaded.log_every_frames, 30);
        assert_eq!(loaded.bridge.image_rows, 120);
        assert_eq!(loaded.bridge.image_cols, 640);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "hover_level = \"high\"\n").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn config_path_points_to_simbridge_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".simbridge"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_changes_host_and_ports() {
        let _guard = ENV_LOCK.lock().unwrap();
        // SAFETY: serialised by ENV_LOCK.
        unsafe {
            std::env::set_var("SIMBRIDGE_HOST", "10.0.0.7");
            std::env::set_var("SIMBRIDGE_MOTOR_PORT", "6000");
            std::env::set_var("SIMBRIDGE_IMAGE_ROWS", "240");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.bridge.host, "10.0.0.7");
        assert_eq!(cfg.bridge.motor_port, 6000);
        assert_eq!(cfg.bridge.image_rows, 240);
        unsafe {
            std::env::remove_var("SIMBRIDGE_HOST");
            std::env::remove_var("SIMBRIDGE_MOTOR_PORT");
            std::env::remove_var("SIMBRIDGE_IMAGE_ROWS");
        }
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_values() {
        let _guard = ENV_LOCK.lock().unwrap();
        // SAFETY: serialised by ENV_LOCK.
        unsafe {
            std::env::set_var("SIMBRIDGE_TELEMETRY_PORT", "not-a-port");
            std::env::set_var("SIMBRIDGE_DEMAND_COUNT", "-3");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg, Config::default());
        unsafe {
            std::env::remove_var("SIMBRIDGE_TELEMETRY_PORT");
            std::env::remove_var("SIMBRIDGE_DEMAND_COUNT");
        }
    }

    #[test]
    fn apply_env_overrides_changes_hover_level() {
        let _guard = ENV_LOCK.lock().unwrap();
        // SAFETY: serialised by ENV_LOCK.
        unsafe { std::env::set_var("SIMBRIDGE_HOVER_LEVEL", "0.75") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.hover_level, 0.75);
        unsafe { std::env::remove_var("SIMBRIDGE_HOVER_LEVEL") };
    }
}
