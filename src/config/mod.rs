//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{CliArgs, Command, DatabaseOverride, MigrateArgs, ServeArgs, ServeOverrides};

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "techreport";
const ENV_PREFIX: &str = "TECHREPORT";
/// Port variable set by container platforms such as Cloud Run.
const PLATFORM_PORT_VAR: &str = "PORT";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_ANALYTICS_PROJECT: &str = "httparchive";
const DEFAULT_ANALYTICS_DATASET: &str = "reports";
const DEFAULT_ANALYTICS_LOCATION: &str = "US";
const DEFAULT_ANALYTICS_ENDPOINT: &str = "https://bigquery.googleapis.com/bigquery/v2/";
const DEFAULT_ANALYTICS_TOKEN_ENDPOINT: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const DEFAULT_ANALYTICS_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_ANALYTICS_MAX_BYTES_BILLED: u64 = 100_000_000;
const DEFAULT_CACHE_RESULT_TTL_SECS: u64 = 60 * 60;
const DEFAULT_CACHE_DATE_TTL_SECS: u64 = 60 * 60;
const DEFAULT_CACHE_MAX_SIZE: usize = 5000;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub analytics: AnalyticsSettings,
    pub cache: CacheSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
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
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct AnalyticsSettings {
    pub project: String,
    pub dataset: String,
    pub location: String,
    pub endpoint: Url,
    pub token_endpoint: Url,
    /// Static bearer token; when absent one is fetched from `token_endpoint`.
    pub access_token: Option<String>,
    pub timeout: Duration,
    pub maximum_bytes_billed: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub result_ttl: Duration,
    pub date_ttl: Duration,
    pub max_size: NonZeroUsize,
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
    raw.apply_platform_port(std::env::var(PLATFORM_PORT_VAR).ok().as_deref())?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    analytics: RawAnalyticsSettings,
    cache: RawCacheSettings,
}

impl RawSettings {
    /// `PORT` outranks files and `TECHREPORT__*`, but not an explicit CLI flag.
    fn apply_platform_port(&mut self, port: Option<&str>) -> Result<(), LoadError> {
        let Some(port) = port.map(str::trim).filter(|port| !port.is_empty()) else {
            return Ok(());
        };
        let port = port
            .parse::<u16>()
            .map_err(|err| LoadError::invalid("PORT", format!("failed to parse: {err}")))?;
        self.server.port = Some(port);
        Ok(())
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(project) = overrides.analytics_project.as_ref() {
            self.analytics.project = Some(project.clone());
        }
        if let Some(dataset) = overrides.analytics_dataset.as_ref() {
            self.analytics.dataset = Some(dataset.clone());
        }
        if let Some(seconds) = overrides.cache_result_ttl_seconds {
            self.cache.result_ttl_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.cache_date_ttl_seconds {
            self.cache.date_ttl_seconds = Some(seconds);
        }
        if let Some(max) = overrides.cache_max_size {
            self.cache.max_size = Some(max);
        }

        self.apply_database_override(&DatabaseOverride {
            database_url: overrides.database_url.clone(),
        });
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            analytics,
            cache,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            analytics: build_analytics_settings(analytics)?,
            cache: build_cache_settings(cache)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }
    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_analytics_settings(
    analytics: RawAnalyticsSettings,
) -> Result<AnalyticsSettings, LoadError> {
    let project = non_empty(analytics.project, DEFAULT_ANALYTICS_PROJECT, "analytics.project")?;
    let dataset = non_empty(analytics.dataset, DEFAULT_ANALYTICS_DATASET, "analytics.dataset")?;
    let location = non_empty(
        analytics.location,
        DEFAULT_ANALYTICS_LOCATION,
        "analytics.location",
    )?;

    let endpoint = parse_base_url(
        analytics.endpoint.as_deref().unwrap_or(DEFAULT_ANALYTICS_ENDPOINT),
        "analytics.endpoint",
    )?;
    let token_endpoint = Url::parse(
        analytics
            .token_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_ANALYTICS_TOKEN_ENDPOINT),
    )
    .map_err(|err| LoadError::invalid("analytics.token_endpoint", err.to_string()))?;

    let access_token = analytics.access_token.and_then(|token| {
        let trimmed = token.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let timeout_ms = analytics.timeout_ms.unwrap_or(DEFAULT_ANALYTICS_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "analytics.timeout_ms",
            "must be greater than zero",
        ));
    }

    let maximum_bytes_billed = NonZeroU64::new(
        analytics
            .maximum_bytes_billed
            .unwrap_or(DEFAULT_ANALYTICS_MAX_BYTES_BILLED),
    )
    .ok_or_else(|| {
        LoadError::invalid("analytics.maximum_bytes_billed", "must be greater than zero")
    })?;

    Ok(AnalyticsSettings {
        project,
        dataset,
        location,
        endpoint,
        token_endpoint,
        access_token,
        timeout: Duration::from_millis(timeout_ms),
        maximum_bytes_billed,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let result_ttl = cache
        .result_ttl_seconds
        .unwrap_or(DEFAULT_CACHE_RESULT_TTL_SECS);
    if result_ttl == 0 {
        return Err(LoadError::invalid(
            "cache.result_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let date_ttl = cache.date_ttl_seconds.unwrap_or(DEFAULT_CACHE_DATE_TTL_SECS);
    if date_ttl == 0 {
        return Err(LoadError::invalid(
            "cache.date_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let max_size = NonZeroUsize::new(cache.max_size.unwrap_or(DEFAULT_CACHE_MAX_SIZE))
        .ok_or_else(|| LoadError::invalid("cache.max_size", "must be greater than zero"))?;

    Ok(CacheSettings {
        result_ttl: Duration::from_secs(result_ttl),
        date_ttl: Duration::from_secs(date_ttl),
        max_size,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAnalyticsSettings {
    project: Option<String>,
    dataset: Option<String>,
    location: Option<String>,
    endpoint: Option<String>,
    token_endpoint: Option<String>,
    access_token: Option<String>,
    timeout_ms: Option<u64>,
    maximum_bytes_billed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    result_ttl_seconds: Option<u64>,
    date_ttl_seconds: Option<u64>,
    max_size: Option<usize>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Parse a base URL, forcing a trailing slash so `join` appends instead of replacing.
fn parse_base_url(raw: &str, key: &'static str) -> Result<Url, LoadError> {
    let mut url = Url::parse(raw).map_err(|err| LoadError::invalid(key, err.to_string()))?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn non_empty(
    value: Option<String>,
    default: &str,
    key: &'static str,
) -> Result<String, LoadError> {
    match value {
        None => Ok(default.to_string()),
        Some(value) if value.trim().is_empty() => {
            Err(LoadError::invalid(key, "must not be empty"))
        }
        Some(value) => Ok(value.trim().to_string()),
    }
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
