//! Configuration vault – reads/writes `~/.warden/config.toml`.
//!
//! Every section and field has a default, so a partial file (or none at
//! all) is valid.  Environment overrides are applied once after loading;
//! nothing reads the environment after startup.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use warden_middleware::{ChannelConfig, LinkConfig};
use warden_perception::VisibilityConfig;
use warden_runtime::{Features, FogConfig, PursuitConfig};
use warden_types::WardenError;

/// Persisted configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub features: Features,
    pub channel: ChannelConfig,
    pub visibility: VisibilityConfig,
    pub movement: PursuitConfig,
    pub fog: FogConfig,
    pub link: LinkConfig,
}

impl Config {
    /// Force the desktop feature set when the host is not in immersive
    /// mode.  Runs after environment overrides, so it wins over them.
    pub fn apply_mode(&mut self, immersive: bool) {
        if !immersive {
            self.features = Features::desktop();
        }
    }
}

/// Return the path to `~/.warden/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".warden").join("config.toml")
}

/// Load the config from `path`.  Returns `None` if the file does not exist.
pub fn load_from(path: &Path) -> Result<Option<Config>, WardenError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| WardenError::io(format!("read config at {}", path.display()), e))?;
    let cfg: Config = toml::from_str(&raw)
        .map_err(|e| WardenError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Save the config to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), WardenError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| WardenError::io(format!("create {}", parent.display()), e))?;
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| WardenError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(path, raw)
        .map_err(|e| WardenError::io(format!("write config at {}", path.display()), e))
}

/// Apply `WARDEN_*` and `ROBOT_*` environment overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `WARDEN_RX_PORT` | `channel.rx_port` |
/// | `WARDEN_TX_PORT` | `channel.tx_port` |
/// | `WARDEN_REMOTE_IP` | `channel.remote_ip` |
/// | `WARDEN_SEND_HZ` | `channel.send_hz` |
/// | `ROBOT_IS_ENABLED` | `features.enabled` |
/// | `ROBOT_IS_AGGRESSIVE` | `features.aggressive` |
/// | `ROBOT_IS_DISTRACTING` | `features.distracting` |
/// | `ROBOT_FOG_ENABLED` | `features.fog` |
///
/// Feature flags take `1` (on) or `0` (off).  Values that do not parse are
/// ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(port) = parsed::<u16>(&lookup, "WARDEN_RX_PORT") {
        cfg.channel.rx_port = port;
    }
    if let Some(port) = parsed::<u16>(&lookup, "WARDEN_TX_PORT") {
        cfg.channel.tx_port = port;
    }
    if let Some(ip) = parsed::<IpAddr>(&lookup, "WARDEN_REMOTE_IP") {
        cfg.channel.remote_ip = ip;
    }
    if let Some(hz) = parsed::<f32>(&lookup, "WARDEN_SEND_HZ")
        && hz.is_finite()
        && hz > 0.0
    {
        cfg.channel.send_hz = hz;
    }

    if let Some(on) = flag(&lookup, "ROBOT_IS_ENABLED") {
        cfg.features.enabled = on;
    }
    if let Some(on) = flag(&lookup, "ROBOT_IS_AGGRESSIVE") {
        cfg.features.aggressive = on;
    }
    if let Some(on) = flag(&lookup, "ROBOT_IS_DISTRACTING") {
        cfg.features.distracting = on;
    }
    if let Some(on) = flag(&lookup, "ROBOT_FOG_ENABLED") {
        cfg.features.fog = on;
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

/// `1` is on, `0` is off, anything else is no override.
fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    match lookup(key).as_deref().map(str::trim) {
        Some("1") => Some(true),
        Some("0") => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::{IpAddr, Ipv4Addr};

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.channel.rx_port, 8000);
        assert_eq!(loaded.fog.max, 30);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[channel]\ntx_port = 9001\n\n[movement]\nmax_speed = 10.0\n",
        )
        .unwrap();

        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.channel.tx_port, 9001);
        assert_eq!(cfg.channel.rx_port, 8000);
        assert_eq!(cfg.movement.max_speed, 10.0);
        assert_eq!(cfg.movement.follow_distance, 49.21);
        assert_eq!(cfg.visibility.probe_max, 5.0);
        assert_eq!(cfg.link.end_after_secs, 10.0);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[channel\nrx_port = ").unwrap();
        assert!(matches!(load_from(&path), Err(WardenError::Config(_))));
    }

    #[test]
    fn config_path_points_to_warden_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".warden"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn env_overrides_channel_fields() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            env(&[
                ("WARDEN_RX_PORT", "9100"),
                ("WARDEN_TX_PORT", "9101"),
                ("WARDEN_REMOTE_IP", "10.0.0.7"),
                ("WARDEN_SEND_HZ", "4"),
            ]),
        );
        assert_eq!(cfg.channel.rx_port, 9100);
        assert_eq!(cfg.channel.tx_port, 9101);
        assert_eq!(cfg.channel.remote_ip, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(cfg.channel.send_hz, 4.0);
    }

    #[test]
    fn env_overrides_parse_each_field_as_its_own_type() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            env(&[
                ("WARDEN_TX_PORT", " 7001 "),
                ("WARDEN_REMOTE_IP", " ::1"),
                ("WARDEN_SEND_HZ", "2.5 "),
                ("ROBOT_FOG_ENABLED", " 0"),
            ]),
        );
        assert_eq!(cfg.channel.rx_port, 8000);
        assert_eq!(cfg.channel.tx_port, 7001);
        assert_eq!(cfg.channel.remote_ip, "::1".parse::<IpAddr>().unwrap());
        assert_eq!(cfg.channel.send_hz, 2.5);
        assert!(!cfg.features.fog);
    }

    #[test]
    fn env_overrides_ignore_invalid_values() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            env(&[
                ("WARDEN_RX_PORT", "not-a-port"),
                ("WARDEN_REMOTE_IP", "host.local"),
                ("WARDEN_SEND_HZ", "-2"),
                ("ROBOT_IS_ENABLED", "yes"),
            ]),
        );
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn env_flags_use_one_and_zero() {
        let mut cfg = Config::default();
        apply_overrides(
            &mut cfg,
            env(&[
                ("ROBOT_IS_ENABLED", "0"),
                ("ROBOT_IS_AGGRESSIVE", "1"),
                ("ROBOT_IS_DISTRACTING", "0"),
                ("ROBOT_FOG_ENABLED", "0"),
            ]),
        );
        assert_eq!(
            cfg.features,
            Features {
                enabled: false,
                aggressive: true,
                distracting: false,
                fog: false,
            }
        );
    }

    #[test]
    fn desktop_mode_forces_default_features() {
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, env(&[("ROBOT_IS_AGGRESSIVE", "1")]));
        cfg.apply_mode(true);
        assert!(cfg.features.aggressive);
        cfg.apply_mode(false);
        assert_eq!(cfg.features, Features::desktop());
    }
}
