use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigLoadError;
use crate::models::MoverConfig;
use crate::validation::{ConfigWarnings, apply_guard_rails};

/// Location used on Unraid when nothing else is specified.
pub const DEFAULT_CONFIG_PATH: &str =
    "/boot/config/plugins/user.scripts/smart_mover_config.json";
pub const CONFIG_PATH_ENV: &str = "TIERMOVER_CONFIG_PATH";
pub const JELLYFIN_URL_ENV: &str = "JELLYFIN_URL";
pub const JELLYFIN_API_KEY_ENV: &str = "JELLYFIN_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from an existing file.
    File(PathBuf),
    /// No file existed; defaults were used and written to this path.
    CreatedDefault(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::File(path) | ConfigSource::CreatedDefault(path) => {
                path
            }
        }
    }
}

/// A validated configuration plus what it took to produce it.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: MoverConfig,
    pub warnings: ConfigWarnings,
    pub source: ConfigSource,
    pub env_file_loaded: bool,
    /// Environment variables that replaced file values.
    pub env_overrides: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
    use_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            path: None,
            use_env: true,
        }
    }

    /// Uses `path` instead of the environment or the built-in default.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Ignores `.env`, `TIERMOVER_CONFIG_PATH` and the Jellyfin overrides.
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    pub fn resolve_path(&self) -> PathBuf {
        if let Some(path) = &self.path {
            return path.clone();
        }
        if self.use_env
            && let Ok(raw) = env::var(CONFIG_PATH_ENV)
            && !raw.trim().is_empty()
        {
            return PathBuf::from(raw.trim());
        }
        PathBuf::from(DEFAULT_CONFIG_PATH)
    }

    /// Reads, overrides and validates the configuration.
    ///
    /// A missing file is not an error: defaults are written to the resolved
    /// path so the operator has something to edit. Without credentials
    /// those defaults then fail validation with
    /// [`ConfigLoadError::DefaultsWritten`].
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = if self.use_env {
            match dotenvy::dotenv() {
                Ok(_) => true,
                Err(err) if err.not_found() => false,
                Err(err) => return Err(err.into()),
            }
        } else {
            false
        };

        let path = self.resolve_path();
        let mut warnings = ConfigWarnings::default();
        let (mut config, source) = if path.exists() {
            (load_from_file(&path)?, ConfigSource::File(path))
        } else {
            let config = MoverConfig::default();
            if let Err(err) = write_defaults(&path, &config) {
                warnings.add_with_hint(
                    "config_file",
                    format!(
                        "config file {} does not exist and defaults could not be written: {err}",
                        path.display()
                    ),
                    "Create the file by hand or point --config somewhere writable",
                );
            }
            (config, ConfigSource::CreatedDefault(path))
        };

        let env_overrides = if self.use_env {
            apply_env_overrides_from(&mut config, |key| env::var(key).ok())
        } else {
            Vec::new()
        };

        match apply_guard_rails(&config) {
            Ok(found) => warnings.extend(found),
            Err(err) => {
                return Err(match source {
                    ConfigSource::CreatedDefault(path) => {
                        ConfigLoadError::DefaultsWritten { path, source: err }
                    }
                    ConfigSource::File(_) => err.into(),
                });
            }
        }

        Ok(ConfigLoad {
            config,
            warnings,
            source,
            env_file_loaded,
            env_overrides,
        })
    }
}

/// Parses a config file, choosing the format from its extension.
pub fn load_from_file(path: &Path) -> Result<MoverConfig, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    let parse_err = |reason: String| ConfigLoadError::Parse {
        path: path.to_path_buf(),
        reason,
    };

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => {
            serde_json::from_str(&contents).map_err(|e| parse_err(e.to_string()))
        }
        Some("toml") | Some("tml") => {
            toml::from_str(&contents).map_err(|e| parse_err(e.to_string()))
        }
        _ => parse_from_str(&contents).map_err(parse_err),
    }
}

/// Tries JSON first, since that is what the defaults file uses, then TOML.
pub fn parse_from_str(contents: &str) -> Result<MoverConfig, String> {
    serde_json::from_str(contents).or_else(|json_err| {
        toml::from_str(contents).map_err(|toml_err| {
            format!("json error: {json_err}; toml error: {toml_err}")
        })
    })
}

/// Replaces the Jellyfin URL and key with non-empty values from `lookup`.
/// Returns the names of the variables that were applied.
pub fn apply_env_overrides_from<F>(
    config: &mut MoverConfig,
    lookup: F,
) -> Vec<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    let mut applied = Vec::new();
    let non_empty = |key: &str| {
        lookup(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    if let Some(url) = non_empty(JELLYFIN_URL_ENV) {
        config.jellyfin_url = url;
        applied.push(JELLYFIN_URL_ENV);
    }
    if let Some(key) = non_empty(JELLYFIN_API_KEY_ENV) {
        config.jellyfin_api_key = key;
        applied.push(JELLYFIN_API_KEY_ENV);
    }
    applied
}

fn write_defaults(path: &Path, config: &MoverConfig) -> Result<(), String> {
    let rendered = match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") | Some("tml") => {
            toml::to_string_pretty(config).map_err(|e| e.to_string())?
        }
        _ => serde_json::to_string_pretty(config).map_err(|e| e.to_string())?,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    fs::write(path, rendered + "\n").map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn overrides_apply_only_non_empty_values() {
        let vars: HashMap<&str, &str> = [
            (JELLYFIN_URL_ENV, " http://jf:8096 "),
            (JELLYFIN_API_KEY_ENV, "   "),
        ]
        .into_iter()
        .collect();
        let mut config = MoverConfig {
            jellyfin_api_key: "from-file".into(),
            ..MoverConfig::default()
        };

        let applied = apply_env_overrides_from(&mut config, |key| {
            vars.get(key).map(|v| v.to_string())
        });

        assert_eq!(applied, vec![JELLYFIN_URL_ENV]);
        assert_eq!(config.jellyfin_url, "http://jf:8096");
        assert_eq!(config.jellyfin_api_key, "from-file");
    }

    #[test]
    fn extensionless_files_accept_either_format() {
        let json = r#"{"jellyfin_url": "http://a", "cache_threshold": 80}"#;
        assert_eq!(parse_from_str(json).unwrap().cache_threshold, 80.0);

        let toml = "jellyfin_url = \"http://a\"\ncheck_interval = 15\n";
        assert_eq!(parse_from_str(toml).unwrap().check_interval, 15);

        let err = parse_from_str("cache_threshold: [").unwrap_err();
        assert!(err.contains("json error"));
        assert!(err.contains("toml error"));
    }

    #[test]
    fn explicit_path_wins() {
        let loader = ConfigLoader::new().with_path("/tmp/explicit.json");
        assert_eq!(loader.resolve_path(), PathBuf::from("/tmp/explicit.json"));
    }
}
