//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{num::NonZeroU32, path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{CacheConfig, DEFAULT_HISTORY_LIMIT, DEFAULT_PAGE_LIMIT};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio";
const ENV_PREFIX: &str = "FOLIO";
const MAX_HISTORY_LIMIT: u64 = 1 << 20;

/// Command-line arguments for the folio binary.
#[derive(Debug, Parser)]
#[command(
    name = "folio",
    version,
    about = "Paginated result cache with object normalization"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print the canonical cache key of a query.
    Fingerprint(FingerprintArgs),
    /// Apply a JSON-lines event log and print every resulting window.
    Replay(ReplayArgs),
    /// Page through a resource of a JSON dataset using the cache.
    Browse(BrowseArgs),
}

#[derive(Debug, Args, Clone)]
pub struct FingerprintArgs {
    /// Resource the query targets, e.g. `collections`.
    pub resource: String,

    /// URL query string, e.g. `q=ports&filter:schema=Person`.
    #[arg(default_value = "")]
    pub search: String,

    /// Pagination context key separating otherwise identical queries.
    #[arg(long, value_name = "NAME")]
    pub namespace: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct ReplayArgs {
    /// Event log, one JSON event per line.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct BrowseArgs {
    /// JSON dataset served in place of a remote server.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub dataset: PathBuf,

    /// Resource to list.
    pub resource: String,

    /// URL query string applied to the listing.
    #[arg(default_value = "")]
    pub search: String,

    /// Number of pages to load, the first included.
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub pages: u32,

    /// Pagination context key.
    #[arg(long, value_name = "NAME")]
    pub namespace: Option<String>,

    /// Write the applied events to FILE as JSON lines, ready for `replay`.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub record: Option<PathBuf>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the page size used when a query sets none.
    #[arg(long = "cache-page-limit", value_name = "COUNT", global = true)]
    pub cache_page_limit: Option<u64>,

    /// Override how many applied events are kept for replay.
    #[arg(long = "cache-history-limit", value_name = "COUNT", global = true)]
    pub cache_history_limit: Option<u64>,

    /// Prune deleted records from cached windows immediately.
    #[arg(
        long = "cache-prune-on-delete",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub cache_prune_on_delete: Option<bool>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub default_page_limit: NonZeroU32,
    pub history_limit: usize,
    pub prune_on_delete: bool,
}

impl Settings {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::from(&self.cache)
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &GlobalOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(limit) = overrides.cache_page_limit {
            self.cache.default_page_limit = Some(limit);
        }
        if let Some(limit) = overrides.cache_history_limit {
            self.cache.history_limit = Some(limit);
        }
        if let Some(prune) = overrides.cache_prune_on_delete {
            self.cache.prune_on_delete = Some(prune);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings { logging, cache } = raw;

        let logging = build_logging_settings(logging)?;
        let cache = build_cache_settings(cache)?;

        Ok(Self { logging, cache })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let default_page_limit = non_zero_u32(
        cache
            .default_page_limit
            .unwrap_or(u64::from(DEFAULT_PAGE_LIMIT)),
        "cache.default_page_limit",
    )?;

    let history_limit = cache
        .history_limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT as u64);
    if history_limit > MAX_HISTORY_LIMIT {
        return Err(LoadError::invalid(
            "cache.history_limit",
            format!("must not exceed {MAX_HISTORY_LIMIT}"),
        ));
    }
    let history_limit: usize = history_limit.try_into().map_err(|_| {
        LoadError::invalid("cache.history_limit", "value exceeds supported range")
    })?;

    Ok(CacheSettings {
        default_page_limit,
        history_limit,
        prune_on_delete: cache.prune_on_delete.unwrap_or(false),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    default_page_limit: Option<u64>,
    history_limit: Option<u64>,
    prune_on_delete: Option<bool>,
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}
