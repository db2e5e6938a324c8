use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{
    env_subst::substitute_env,
    error::{Error, Result},
    schema::TetherConfig,
};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["tether.toml", "tether.yaml", "tether.yml", "tether.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> Result<TetherConfig> {
    let raw = std::fs::read_to_string(path).map_err(|source| Error::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config.
///
/// Search order:
/// 1. `config_dir_override/tether.{toml,yaml,yml,json}` when given
/// 2. `./tether.{toml,yaml,yml,json}` (project-local)
/// 3. the user config dir
///
/// Returns `TetherConfig::default()` if no file is found or the file fails to parse.
pub fn discover_and_load(config_dir_override: Option<&Path>) -> TetherConfig {
    if let Some(path) = find_config_file(config_dir_override) {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    TetherConfig::default()
}

fn find_config_file(config_dir_override: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = config_dir_override {
        return first_existing(dir);
    }
    first_existing(Path::new(".")).or_else(|| config_dir().and_then(|d| first_existing(&d)))
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// The user-global config directory (`~/.config/tether/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "tether").map(|d| d.config_dir().to_path_buf())
}

/// The user-global data directory; falls back to `./.tether` when the platform
/// has no home directory.
pub fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "tether")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".tether"))
}

/// Serialize `config` to TOML under `dir` (or the user config dir).
///
/// Creates parent directories if needed. Returns the path written to.
pub fn save_config(config: &TetherConfig, dir: Option<&Path>) -> Result<PathBuf> {
    let dir = match dir {
        Some(d) => d.to_path_buf(),
        None => config_dir().ok_or(Error::NoConfigDir)?,
    };
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("tether.toml");
    let toml_str = toml::to_string_pretty(config)?;
    std::fs::write(&path, toml_str)?;
    debug!(path = %path.display(), "saved config");
    Ok(path)
}

fn parse_config(raw: &str, path: &Path) -> Result<TetherConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        other => Err(Error::UnsupportedFormat(other.to_string())),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_each_format() {
        let dir = tempfile::tempdir().unwrap();

        let toml_path = dir.path().join("a.toml");
        std::fs::write(&toml_path, "[server]\nport = 1234\n").unwrap();
        assert_eq!(load_config(&toml_path).unwrap().server.port, 1234);

        let yaml_path = dir.path().join("a.yaml");
        std::fs::write(&yaml_path, "bridge:\n  forward_timeout_secs: 5\n").unwrap();
        assert_eq!(
            load_config(&yaml_path).unwrap().bridge.forward_timeout_secs,
            5
        );

        let json_path = dir.path().join("a.json");
        std::fs::write(&json_path, r#"{"helper":{"url":"http://h:1"}}"#).unwrap();
        assert_eq!(load_config(&json_path).unwrap().helper.url, "http://h:1");
    }

    #[test]
    fn rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.ini");
        std::fs::write(&path, "x=1").unwrap();
        assert!(matches!(
            load_config(&path),
            Err(Error::UnsupportedFormat(ext)) if ext == "ini"
        ));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_config(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }

    #[test]
    fn override_dir_is_searched_and_saved_to() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(discover_and_load(Some(dir.path())), TetherConfig::default());

        let mut cfg = TetherConfig::default();
        cfg.server.port = 5555;
        let written = save_config(&cfg, Some(dir.path())).unwrap();
        assert_eq!(written, dir.path().join("tether.toml"));
        assert_eq!(discover_and_load(Some(dir.path())).server.port, 5555);
    }

    #[test]
    fn broken_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("tether.toml"), "[server\nport=").unwrap();
        assert_eq!(discover_and_load(Some(dir.path())), TetherConfig::default());
    }
}
