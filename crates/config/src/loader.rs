use std::path::{Path, PathBuf};

use tracing::{debug, warn};

#[cfg(feature = "metrics")]
use herald_metrics::{config as config_metrics, counter, labels};

use crate::{Error, Result, env_subst::substitute_env, schema::HeraldConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["herald.toml", "herald.yaml", "herald.yml", "herald.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<HeraldConfig> {
    let raw = read_substituted(path)?;
    let parsed = parse_config(&raw, path);
    #[cfg(feature = "metrics")]
    if let Err(ref e) = parsed {
        counter!(config_metrics::PARSE_ERRORS_TOTAL, labels::FORMAT => e.format()).increment(1);
    }
    parsed
}

/// Read the file and expand `${ENV_VAR}` placeholders.
pub(crate) fn read_substituted(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::read(path, e))?;
    Ok(substitute_env(&raw))
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./herald.{toml,yaml,yml,json}`
/// 2. `<user config dir>/herald/herald.{toml,yaml,yml,json}`
///
/// Falls back to `HeraldConfig::default()` when nothing is found or the file
/// does not parse.
pub fn discover_and_load() -> (HeraldConfig, Option<PathBuf>) {
    let Some(path) = find_config_file() else {
        debug!("no config file found, using defaults");
        return (HeraldConfig::default(), None);
    };
    debug!(path = %path.display(), "loading config");
    match load_config(&path) {
        Ok(cfg) => (cfg, Some(path)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            (HeraldConfig::default(), Some(path))
        },
    }
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists());
    if local.is_some() {
        return local;
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/herald/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "herald").map(|d| d.config_dir().to_path_buf())
}

pub(crate) fn parse_config(raw: &str, path: &Path) -> Result<HeraldConfig> {
    match extension(path) {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::unsupported_format(other)),
    }
}

/// Parse into a generic JSON value, used for unknown-field detection.
pub(crate) fn parse_config_value(raw: &str, path: &Path) -> Result<serde_json::Value> {
    match extension(path) {
        "toml" => {
            let v: toml::Value = toml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "yaml" | "yml" => {
            let v: serde_yaml::Value = serde_yaml::from_str(raw)?;
            Ok(serde_json::to_value(v)?)
        },
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::unsupported_format(other)),
    }
}

fn extension(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("toml")
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("herald.toml", "[modules.players]\ntargets = [\"channel:1\"]\n")]
    #[case("herald.yaml", "modules:\n  players:\n    targets: [\"channel:1\"]\n")]
    #[case("herald.json", r#"{"modules":{"players":{"targets":["channel:1"]}}}"#)]
    fn loads_every_format(#[case] name: &str, #[case] body: &str) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.module("players").unwrap().targets, vec!["channel:1"]);
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("herald.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = load_config(Path::new("/definitely/not/here/herald.toml")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}
