//! Run configuration: optional TOML file, CLI overrides and identity override.
//!
//! Every key is optional. A missing file at the default location is not an
//! error; a missing file named explicitly on the command line is.
//!
//! ```toml
//! output = "out/snapshot.json"
//! log_file = "aggregator.log"
//! delay_floor_secs = 3
//! max_pages = 4
//! lookback_days = 60
//! lookahead_days = 90
//! undated = "keep"
//!
//! [enrichment]
//! enabled = true
//! delay_ms = 1000
//!
//! [sources.metalstorm-new]
//! genres = ["doom", "sludge"]
//!
//! [sources.musicbrainz]
//! enabled = false
//! ```

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::dates::DateWindow;
use crate::enrich::{DEFAULT_ENRICHMENT_BASE_URL, DEFAULT_ENRICHMENT_DELAY};
use crate::fetch::{CONNECT_TIMEOUT_SECS, DEFAULT_DELAY_FLOOR, IdentityPair, READ_TIMEOUT_SECS};
use crate::model::SourceId;
use crate::sources::{ALL_SOURCES, adapter_for};
use crate::user_agent::{FALLBACK_BROWSER_USER_AGENT, default_api_user_agent};

/// Default snapshot path, relative to the working directory.
pub const DEFAULT_OUTPUT: &str = "snapshot.json";
/// Default hard cap on pages per paginated pass.
pub const DEFAULT_MAX_PAGES: u32 = 4;
/// Default number of days before today kept in the window.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 60;
/// Default number of days after today kept in the window.
pub const DEFAULT_LOOKAHEAD_DAYS: u32 = 90;

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file '{path}' does not exist")]
    Missing { path: PathBuf },

    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config value for `{field}`: {value}. Expected {expected}")]
    Invalid {
        field: String,
        value: String,
        expected: String,
    },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, value: impl ToString, expected: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            value: value.to_string(),
            expected: expected.into(),
        }
    }
}

/// What to do with releases whose date could not be parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndatedPolicy {
    /// Keep them; they sort after every dated release.
    #[default]
    Keep,
    /// Drop them before output.
    Drop,
}

/// `[enrichment]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnrichmentFileConfig {
    pub enabled: Option<bool>,
    pub delay_ms: Option<u64>,
    pub base_url: Option<String>,
}

/// `[sources.<name>]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceFileConfig {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    pub genres: Option<Vec<String>>,
}

/// TOML-backed file configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub output: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub delay_floor_secs: Option<u64>,
    pub max_pages: Option<u32>,
    pub lookback_days: Option<u32>,
    pub lookahead_days: Option<u32>,
    pub undated: Option<UndatedPolicy>,
    pub connect_timeout_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    #[serde(default)]
    pub enrichment: EnrichmentFileConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceFileConfig>,
}

impl FileConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_range(
            "delay_floor_secs",
            self.delay_floor_secs,
            DEFAULT_DELAY_FLOOR.as_secs(),
            300,
        )?;
        validate_range("max_pages", self.max_pages.map(u64::from), 1, 50)?;
        validate_range("lookback_days", self.lookback_days.map(u64::from), 0, 3650)?;
        validate_range("lookahead_days", self.lookahead_days.map(u64::from), 0, 3650)?;
        validate_range("connect_timeout_secs", self.connect_timeout_secs, 1, 3600)?;
        validate_range("read_timeout_secs", self.read_timeout_secs, 1, 3600)?;
        validate_range("enrichment.delay_ms", self.enrichment.delay_ms, 0, 60_000)?;
        validate_base_url("enrichment.base_url", self.enrichment.base_url.as_deref())?;

        for (name, source) in &self.sources {
            let Ok(source_id) = name.parse::<SourceId>() else {
                return Err(ConfigError::invalid(
                    "sources",
                    name,
                    "one of metal-archives, metalstorm-upcoming, metalstorm-new, musicbrainz",
                ));
            };
            validate_base_url(&format!("sources.{name}.base_url"), source.base_url.as_deref())?;
            let Some(genres) = &source.genres else {
                continue;
            };
            if !adapter_for(source_id, None).sweeps_genres() {
                return Err(ConfigError::invalid(
                    format!("sources.{name}.genres"),
                    format!("{genres:?}"),
                    "no genres (this source has no genre filter)",
                ));
            }
            if genres.iter().any(|g| g.trim().is_empty()) {
                return Err(ConfigError::invalid(
                    format!("sources.{name}.genres"),
                    format!("{genres:?}"),
                    "non-blank genre tags",
                ));
            }
        }
        Ok(())
    }
}

fn validate_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(min..=max).contains(&value) {
        return Err(ConfigError::invalid(field, value, format!("range {min}..={max}")));
    }
    Ok(())
}

fn validate_base_url(field: &str, value: Option<&str>) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    match url::Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host_str().is_some() => Ok(()),
        _ => Err(ConfigError::invalid(field, value, "an http(s) URL")),
    }
}

/// Config file contents plus where they came from.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    pub path: Option<PathBuf>,
    pub config: FileConfig,
    pub loaded_from_file: bool,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/release-aggregator/config.toml`
/// 2. `$HOME/.config/release-aggregator/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("release-aggregator")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("release-aggregator")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the explicit config file, or the default one if it exists.
///
/// # Errors
///
/// Returns [`ConfigError`] when an explicit file is missing or any file cannot
/// be read, parsed or validated.
pub fn load_config(explicit: Option<&Path>) -> Result<LoadedConfig, ConfigError> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(ConfigError::Missing {
                path: path.to_path_buf(),
            });
        }
        return Ok(LoadedConfig {
            path: Some(path.to_path_buf()),
            config: load_file_config(path)?,
            loaded_from_file: true,
        });
    }

    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(path_ref) if path_ref.exists() => {
            let config = load_file_config(path_ref)?;
            Ok(LoadedConfig {
                path,
                config,
                loaded_from_file: true,
            })
        }
        _ => {
            debug!(path = ?path, "no config file; using defaults");
            Ok(LoadedConfig {
                path,
                config: FileConfig::default(),
                loaded_from_file: false,
            })
        }
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    FileConfig::from_toml_str(&raw, path)
}

/// One enabled source with its overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub source: SourceId,
    pub base_url: Option<String>,
    /// Configured genre passes; `None` means the adapter's defaults.
    pub genres: Option<Vec<String>>,
}

/// Enrichment step settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentSettings {
    pub enabled: bool,
    pub delay: Duration,
    pub base_url: String,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            delay: DEFAULT_ENRICHMENT_DELAY,
            base_url: DEFAULT_ENRICHMENT_BASE_URL.to_string(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub output: Option<PathBuf>,
}

/// Everything a run needs, resolved once at startup and passed explicitly.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Browser identities for listing sites.
    pub browser_identities: IdentityPair,
    /// Application identity for API sources.
    pub api_identity: String,
    pub delay_floor: Duration,
    pub as_of: NaiveDate,
    pub window: DateWindow,
    pub max_pages: u32,
    pub undated: UndatedPolicy,
    pub enrichment: EnrichmentSettings,
    /// Enabled sources in run order.
    pub sources: Vec<SourceSettings>,
    pub output: PathBuf,
    pub log_file: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
}

impl RunConfig {
    /// Defaults for every value, windowed around `as_of`.
    #[must_use]
    pub fn defaults(browser_identity: impl Into<String>, as_of: NaiveDate) -> Self {
        Self::resolve(
            &FileConfig::default(),
            &CliOverrides::default(),
            browser_identity,
            as_of,
        )
    }

    /// Merges file values and CLI overrides over defaults.
    #[must_use]
    pub fn resolve(
        file: &FileConfig,
        cli: &CliOverrides,
        browser_identity: impl Into<String>,
        as_of: NaiveDate,
    ) -> Self {
        let window = DateWindow::around(
            as_of,
            file.lookback_days.unwrap_or(DEFAULT_LOOKBACK_DAYS),
            file.lookahead_days.unwrap_or(DEFAULT_LOOKAHEAD_DAYS),
        );

        let sources = ALL_SOURCES
            .iter()
            .filter_map(|&source| {
                let overrides = file.sources.get(source.as_str());
                if overrides.and_then(|o| o.enabled) == Some(false) {
                    debug!(source = %source, "source disabled by config");
                    return None;
                }
                Some(SourceSettings {
                    source,
                    base_url: overrides.and_then(|o| o.base_url.clone()),
                    genres: overrides.and_then(|o| o.genres.clone()),
                })
            })
            .collect();

        let defaults = EnrichmentSettings::default();
        let enrichment = EnrichmentSettings {
            enabled: file.enrichment.enabled.unwrap_or(defaults.enabled),
            delay: file
                .enrichment
                .delay_ms
                .map_or(defaults.delay, Duration::from_millis),
            base_url: file
                .enrichment
                .base_url
                .clone()
                .unwrap_or(defaults.base_url),
        };

        Self {
            browser_identities: IdentityPair::new(
                browser_identity,
                Some(FALLBACK_BROWSER_USER_AGENT.to_string()),
            ),
            api_identity: default_api_user_agent(),
            delay_floor: file
                .delay_floor_secs
                .map_or(DEFAULT_DELAY_FLOOR, Duration::from_secs)
                .max(DEFAULT_DELAY_FLOOR),
            as_of,
            window,
            max_pages: file.max_pages.unwrap_or(DEFAULT_MAX_PAGES),
            undated: file.undated.unwrap_or_default(),
            enrichment,
            sources,
            output: cli
                .output
                .clone()
                .or_else(|| file.output.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            log_file: file.log_file.clone(),
            connect_timeout_secs: file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
            read_timeout_secs: file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
        }
    }
}
