use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::KrakenConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["kraken.toml", "kraken.yaml", "kraken.yml", "kraken.json"];

/// Override for the config directory, set via `set_config_dir()`.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

fn override_slot() -> MutexGuard<'static, Option<PathBuf>> {
    CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Restrict discovery to `path`; project-local and user-global locations are
/// skipped while the override is set.
pub fn set_config_dir(path: PathBuf) {
    *override_slot() = Some(path);
}

/// Clear the config directory override, restoring default discovery.
pub fn clear_config_dir() {
    *override_slot() = None;
}

fn config_dir_override() -> Option<PathBuf> {
    override_slot().clone()
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<KrakenConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))
}

/// Load `explicit` when given (errors are fatal), otherwise discover.
pub fn load_or_discover(explicit: Option<&Path>) -> anyhow::Result<KrakenConfig> {
    match explicit {
        Some(path) => {
            debug!(path = %path.display(), "loading explicit config");
            load_config(path)
        },
        None => Ok(discover_and_load()),
    }
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./kraken.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/kraken/kraken.{toml,yaml,yml,json}` (user-global)
///
/// Returns `KrakenConfig::default()` if no file is found or the file found
/// does not parse.
pub fn discover_and_load() -> KrakenConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return KrakenConfig::default();
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            KrakenConfig::default()
        },
    }
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return first_existing(&dir);
    }
    first_existing(Path::new(".")).or_else(|| config_dir().and_then(|dir| first_existing(&dir)))
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

/// Returns the config directory: override, or `~/.config/kraken/`.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return Some(dir);
    }
    directories::BaseDirs::new().map(|d| d.home_dir().join(".config").join("kraken"))
}

/// Render a config as TOML, the format `kraken config` prints.
pub fn to_toml(config: &KrakenConfig) -> anyhow::Result<String> {
    toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serialize config: {e}"))
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<KrakenConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[cfg(test)]
mod tests {
    use {super::*, std::fs};

    #[test]
    fn loads_each_format() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            ("kraken.toml", "[rpc]\nport = 7100\n"),
            ("kraken.yaml", "rpc:\n  port: 7100\n"),
            ("kraken.json", r#"{"rpc": {"port": 7100}}"#),
        ];
        for (name, body) in cases {
            let path = dir.path().join(name);
            fs::write(&path, body).unwrap();
            let cfg = load_config(&path).unwrap();
            assert_eq!(cfg.rpc.port, 7100, "{name}");
            assert_eq!(cfg.rpc.bind, "0.0.0.0", "{name}");
        }
    }

    #[test]
    fn substitutes_env_before_parsing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kraken.toml");
        fs::write(
            &path,
            "[rpc]\nbind = \"${KRAKEN_UNSET_BIND_XYZ:-127.0.0.1}\"\nport = 7200\n",
        )
        .unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.rpc.bind, "127.0.0.1");
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kraken.ini");
        fs::write(&path, "port=1").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unsupported config format"), "{err}");
    }

    #[test]
    fn explicit_path_errors_are_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_or_discover(Some(&missing)).is_err());

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "[rpc\nport = ").unwrap();
        assert!(load_or_discover(Some(&bad)).is_err());
    }

    #[test]
    fn discovery_honours_override_dir() {
        let dir = tempfile::tempdir().unwrap();
        set_config_dir(dir.path().to_path_buf());

        // Empty override dir: defaults, no fall-through to other locations.
        assert_eq!(discover_and_load(), KrakenConfig::default());

        fs::write(dir.path().join("kraken.yml"), "rpc:\n  port: 7300\n").unwrap();
        assert_eq!(discover_and_load().rpc.port, 7300);

        // Broken file falls back to defaults rather than failing.
        fs::write(dir.path().join("kraken.toml"), "rpc = [").unwrap();
        assert_eq!(discover_and_load(), KrakenConfig::default());

        clear_config_dir();
    }

    #[test]
    fn toml_output_round_trips() {
        let cfg = KrakenConfig::default();
        let text = to_toml(&cfg).unwrap();
        assert!(text.contains("port = 7000"), "{text}");
        assert_eq!(toml::from_str::<KrakenConfig>(&text).unwrap(), cfg);
    }
}
