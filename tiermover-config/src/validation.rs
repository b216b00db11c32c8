use std::fmt;
use std::path::PathBuf;

use thiserror::Error;
use url::Url;

use super::models::MoverConfig;

const LOW_THRESHOLD_PERCENT: f64 = 50.0;
const SHORT_INTERVAL_MINUTES: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("{field} is required")]
    Missing { field: &'static str },
    #[error("jellyfin_url '{url}' is not a valid http(s) URL: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("cache_threshold must be between 0 and 100, got {value}")]
    ThresholdOutOfRange { value: f64 },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error(
        "cache_path {} and array_path {} must be distinct, non-nested tiers",
        cache.display(),
        array.display()
    )]
    OverlappingTiers { cache: PathBuf, array: PathBuf },
}

/// A setting the daemon accepts but that is likely to misbehave.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigWarning {
    /// Config key the warning is about, or `config_file` for the file itself.
    pub field: &'static str,
    pub message: String,
    pub hint: Option<String>,
}

impl fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " ({hint})")?;
        }
        Ok(())
    }
}

/// Warnings in the order they were raised.
#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings(Vec<ConfigWarning>);

impl ConfigWarnings {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.push(ConfigWarning {
            field,
            message: message.into(),
            hint: None,
        });
    }

    pub fn add_with_hint(
        &mut self,
        field: &'static str,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) {
        self.0.push(ConfigWarning {
            field,
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConfigWarning> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether any warning concerns `field`.
    pub fn mentions(&self, field: &str) -> bool {
        self.0.iter().any(|warning| warning.field == field)
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.0.extend(other.0);
    }
}

impl<'a> IntoIterator for &'a ConfigWarnings {
    type Item = &'a ConfigWarning;
    type IntoIter = std::slice::Iter<'a, ConfigWarning>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Rejects configurations the daemon cannot run with and collects
/// warnings for ones that are merely suspicious.
pub fn apply_guard_rails(
    config: &MoverConfig,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    if config.jellyfin_url.trim().is_empty() {
        return Err(ConfigGuardRailError::Missing {
            field: "jellyfin_url",
        });
    }
    if config.jellyfin_api_key.trim().is_empty() {
        return Err(ConfigGuardRailError::Missing {
            field: "jellyfin_api_key",
        });
    }
    validate_url(&config.jellyfin_url)?;

    if !(0.0..=100.0).contains(&config.cache_threshold) {
        return Err(ConfigGuardRailError::ThresholdOutOfRange {
            value: config.cache_threshold,
        });
    }
    if config.check_interval == 0 {
        return Err(ConfigGuardRailError::Zero {
            field: "check_interval",
        });
    }
    if config.http_timeout_secs == 0 {
        return Err(ConfigGuardRailError::Zero {
            field: "http_timeout_secs",
        });
    }
    if config.max_parallel_moves == 0 {
        return Err(ConfigGuardRailError::Zero {
            field: "max_parallel_moves",
        });
    }
    if config.log_max_files == 0 {
        return Err(ConfigGuardRailError::Zero {
            field: "log_max_files",
        });
    }
    if config.retry.max_attempts == 0 {
        return Err(ConfigGuardRailError::Zero {
            field: "retry.max_attempts",
        });
    }

    let cache = &config.cache_path;
    let array = &config.array_path;
    if cache == array || cache.starts_with(array) || array.starts_with(cache) {
        return Err(ConfigGuardRailError::OverlappingTiers {
            cache: cache.clone(),
            array: array.clone(),
        });
    }

    if config.cache_threshold < LOW_THRESHOLD_PERCENT {
        warnings.add_with_hint(
            "cache_threshold",
            format!(
                "set to {}%; consumed media will be evicted almost every cycle",
                config.cache_threshold
            ),
            "Typical values are 80-95",
        );
    }
    if config.check_interval < SHORT_INTERVAL_MINUTES {
        warnings.add(
            "check_interval",
            format!(
                "set to {} minute(s); each over-threshold cycle queries Jellyfin and walks the whole cache",
                config.check_interval
            ),
        );
    }
    if config.max_parallel_moves > 1 {
        warnings.add_with_hint(
            "max_parallel_moves",
            format!(
                "set to {}; concurrent copies compete for array disk bandwidth",
                config.max_parallel_moves
            ),
            "Parity-protected arrays usually move fastest with 1",
        );
    }

    Ok(warnings)
}

fn validate_url(raw: &str) -> Result<(), ConfigGuardRailError> {
    let invalid = |reason: String| ConfigGuardRailError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}
