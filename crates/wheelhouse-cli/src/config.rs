//! Robot description – reads the TOML file passed with `--config`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use wheelhouse_devices::DeviceConfig;
use wheelhouse_middleware::{ManagerConfig, RetryPolicy};

/// Everything needed to bring the robot up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotConfig {
    /// Sleep between manager ticks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Only probe serial ports whose name starts with this, e.g. `/dev/ttyACM`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_port_prefix: Option<String>,

    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

fn default_poll_interval_ms() -> u64 {
    ManagerConfig::default().poll_interval_ms
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            retry: RetryPolicy::default(),
            serial_port_prefix: None,
            devices: Vec::new(),
        }
    }
}

impl RobotConfig {
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            poll_interval_ms: self.poll_interval_ms,
            retry: self.retry,
        }
    }
}

/// Load the config from `path` and apply environment overrides.
pub fn load(path: &Path) -> Result<RobotConfig, String> {
    let mut cfg = load_from(path)?;
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from `path` exactly as written.
pub(crate) fn load_from(path: &Path) -> Result<RobotConfig, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))
}

/// Apply `WHEELHOUSE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `WHEELHOUSE_POLL_INTERVAL_MS` | `poll_interval_ms` |
/// | `WHEELHOUSE_MAX_RETRIES` | `retry.max_attempts` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut RobotConfig) {
    if let Ok(v) = std::env::var("WHEELHOUSE_POLL_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.poll_interval_ms = ms;
    }
    if let Ok(v) = std::env::var("WHEELHOUSE_MAX_RETRIES")
        && let Ok(n) = v.parse::<u32>()
    {
        cfg.retry.max_attempts = n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
poll_interval_ms = 20

[retry]
max_attempts = 5

[[devices]]
kind = "indicator_light"
name = "status"
line = 4

[[devices]]
kind = "drivetrain"
name = "wheels"

[devices.serial]
internal_device_name = "drive"
"#;

    fn write(dir: &tempfile::TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("robot.toml");
        fs::write(&path, body).expect("write config");
        path
    }

    #[test]
    fn sample_config_parses_with_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let cfg = load_from(&write(&dir, SAMPLE)).expect("load");

        assert_eq!(cfg.poll_interval_ms, 20);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.base_backoff_ms, 100);
        assert_eq!(cfg.devices.len(), 2);
        assert_eq!(cfg.devices[0].kind(), "indicator_light");
        assert_eq!(cfg.devices[1].name(), "wheels");
    }

    #[test]
    fn empty_file_is_an_empty_robot() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let cfg = load_from(&write(&dir, "")).expect("load");
        assert_eq!(cfg, RobotConfig::default());
        assert_eq!(cfg.manager_config(), ManagerConfig::default());
    }

    #[test]
    fn unknown_device_kind_is_a_parse_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = load_from(&write(&dir, "[[devices]]\nkind = \"jetpack\"\nname = \"x\"\n")).unwrap_err();
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn missing_file_is_reported_with_its_path() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = load_from(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.contains("nope.toml"));
    }

    // Environment variables are process-wide, so both overrides are
    // exercised in one test.
    #[test]
    fn apply_env_overrides_sets_valid_values_and_ignores_junk() {
        // SAFETY: no other test in this crate touches these variables.
        unsafe {
            std::env::set_var("WHEELHOUSE_POLL_INTERVAL_MS", "5");
            std::env::set_var("WHEELHOUSE_MAX_RETRIES", "lots");
        }
        let mut cfg = RobotConfig::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.poll_interval_ms, 5);
        assert_eq!(cfg.retry.max_attempts, RetryPolicy::default().max_attempts);

        // SAFETY: as above.
        unsafe {
            std::env::set_var("WHEELHOUSE_MAX_RETRIES", "1");
        }
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.retry.max_attempts, 1);

        // SAFETY: as above.
        unsafe {
            std::env::remove_var("WHEELHOUSE_POLL_INTERVAL_MS");
            std::env::remove_var("WHEELHOUSE_MAX_RETRIES");
        }
    }
}
