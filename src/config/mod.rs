//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::NonZeroU32,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use apalis_cron::Schedule;
use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::CacheConfig;
use crate::store::collections;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "verdant";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_BROKER_HOST: &str = "127.0.0.1";
const DEFAULT_BROKER_PORT: u16 = 1883;
const DEFAULT_BROKER_CLIENT_ID: &str = "verdant-backend";
const DEFAULT_BROKER_QUEUE_CAPACITY: usize = 64;
const DEFAULT_ACK_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETENTION_WINDOW_DAYS: u32 = 7;
const DEFAULT_RETENTION_BATCH_SIZE: usize = 500;
const DEFAULT_RETENTION_SCHEDULE: &str = "0 0 0 * * *";

/// Command-line arguments for the Verdant binary.
#[derive(Debug, Parser)]
#[command(name = "verdant", version, about = "Verdant telemetry and control backend")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "VERDANT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Verdant HTTP service, broker bridge and scheduled jobs.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    #[command(name = "migrate")]
    Migrate(MigrateArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Toggle the read-through cache.
    #[arg(
        long = "cache-enabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enabled: Option<bool>,

    /// Override the cache capacity in entries.
    #[arg(long = "cache-capacity", value_name = "COUNT")]
    pub cache_capacity: Option<usize>,

    /// Override the cache entry TTL.
    #[arg(long = "cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Override the expired-entry sweep cadence.
    #[arg(long = "cache-purge-interval-seconds", value_name = "SECONDS")]
    pub cache_purge_interval_seconds: Option<u64>,

    /// Override the MQTT broker host.
    #[arg(long = "broker-host", value_name = "HOST")]
    pub broker_host: Option<String>,

    /// Override the MQTT broker port.
    #[arg(long = "broker-port", value_name = "PORT")]
    pub broker_port: Option<u16>,

    /// Override the MQTT client id.
    #[arg(long = "broker-client-id", value_name = "ID")]
    pub broker_client_id: Option<String>,

    /// Override the command acknowledgement timeout.
    #[arg(long = "broker-ack-timeout-seconds", value_name = "SECONDS")]
    pub broker_ack_timeout_seconds: Option<u64>,

    /// Override the retention window.
    #[arg(long = "retention-window-days", value_name = "DAYS")]
    pub retention_window_days: Option<u32>,

    /// Override the retention delete batch size.
    #[arg(long = "retention-batch-size", value_name = "COUNT")]
    pub retention_batch_size: Option<usize>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheConfig,
    pub broker: BrokerSettings,
    pub retention: RetentionSettings,
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
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub queue_capacity: usize,
    pub ack_timeout_seconds: u64,
}

impl BrokerSettings {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_seconds)
    }
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_BROKER_HOST.to_string(),
            port: DEFAULT_BROKER_PORT,
            username: None,
            password: None,
            client_id: DEFAULT_BROKER_CLIENT_ID.to_string(),
            queue_capacity: DEFAULT_BROKER_QUEUE_CAPACITY,
            ack_timeout_seconds: DEFAULT_ACK_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetentionSettings {
    pub window_days: u32,
    /// Collections subject to the rolling window. Registry collections
    /// (plants, sensors, actuators) are never governed.
    pub collections: Vec<String>,
    pub batch_size: usize,
    pub schedule: String,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_RETENTION_WINDOW_DAYS,
            collections: governed_collections(),
            batch_size: DEFAULT_RETENTION_BATCH_SIZE,
            schedule: DEFAULT_RETENTION_SCHEDULE.to_string(),
        }
    }
}

fn governed_collections() -> Vec<String> {
    vec![
        collections::SENSOR_LOGS.to_string(),
        collections::ENVIRONMENTAL_DATA.to_string(),
        collections::ACTION_LOGS.to_string(),
    ]
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

    builder = builder.add_source(Environment::with_prefix("VERDANT").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

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
    cache: RawCacheSettings,
    broker: RawBrokerSettings,
    retention: RawRetentionSettings,
}

impl RawSettings {
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
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(enabled) = overrides.cache_enabled {
            self.cache.enabled = Some(enabled);
        }
        if let Some(capacity) = overrides.cache_capacity {
            self.cache.capacity = Some(capacity);
        }
        if let Some(ttl) = overrides.cache_ttl_seconds {
            self.cache.ttl_seconds = Some(ttl);
        }
        if let Some(interval) = overrides.cache_purge_interval_seconds {
            self.cache.purge_interval_seconds = Some(interval);
        }
        if let Some(host) = overrides.broker_host.as_ref() {
            self.broker.host = Some(host.clone());
        }
        if let Some(port) = overrides.broker_port {
            self.broker.port = Some(port);
        }
        if let Some(client_id) = overrides.broker_client_id.as_ref() {
            self.broker.client_id = Some(client_id.clone());
        }
        if let Some(timeout) = overrides.broker_ack_timeout_seconds {
            self.broker.ack_timeout_seconds = Some(timeout);
        }
        if let Some(days) = overrides.retention_window_days {
            self.retention.window_days = Some(days);
        }
        if let Some(batch) = overrides.retention_batch_size {
            self.retention.batch_size = Some(batch);
        }
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
            cache,
            broker,
            retention,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            cache: build_cache_settings(cache)?,
            broker: build_broker_settings(broker)?,
            retention: build_retention_settings(retention)?,
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

    let candidate = format!("{host}:{port}");
    let addr = candidate
        .parse()
        .map_err(|err| LoadError::invalid("server.addr", format!("invalid address `{candidate}`: {err}")))?;

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

    let max_value = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = NonZeroU32::new(max_value).ok_or_else(|| {
        LoadError::invalid("database.max_connections", "must be greater than zero")
    })?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheConfig, LoadError> {
    let defaults = CacheConfig::default();
    let capacity = cache.capacity.unwrap_or(defaults.capacity);
    if capacity == 0 {
        return Err(LoadError::invalid(
            "cache.capacity",
            "must be greater than zero",
        ));
    }

    Ok(CacheConfig {
        enabled: cache.enabled.unwrap_or(defaults.enabled),
        capacity,
        ttl_seconds: cache.ttl_seconds.unwrap_or(defaults.ttl_seconds),
        purge_interval_seconds: cache
            .purge_interval_seconds
            .unwrap_or(defaults.purge_interval_seconds),
    })
}

fn build_broker_settings(broker: RawBrokerSettings) -> Result<BrokerSettings, LoadError> {
    let defaults = BrokerSettings::default();

    let port = broker.port.unwrap_or(defaults.port);
    if port == 0 {
        return Err(LoadError::invalid(
            "broker.port",
            "port must be greater than zero",
        ));
    }

    let queue_capacity = broker.queue_capacity.unwrap_or(defaults.queue_capacity);
    if queue_capacity == 0 {
        return Err(LoadError::invalid(
            "broker.queue_capacity",
            "must be greater than zero",
        ));
    }

    let ack_timeout_seconds = broker
        .ack_timeout_seconds
        .unwrap_or(defaults.ack_timeout_seconds);
    if ack_timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "broker.ack_timeout_seconds",
            "must be greater than zero",
        ));
    }

    let client_id = broker.client_id.unwrap_or(defaults.client_id);
    if client_id.trim().is_empty() {
        return Err(LoadError::invalid(
            "broker.client_id",
            "client id must not be empty",
        ));
    }

    Ok(BrokerSettings {
        host: broker.host.unwrap_or(defaults.host),
        port,
        username: broker.username,
        password: broker.password,
        client_id,
        queue_capacity,
        ack_timeout_seconds,
    })
}

fn build_retention_settings(
    retention: RawRetentionSettings,
) -> Result<RetentionSettings, LoadError> {
    let window_days = retention
        .window_days
        .unwrap_or(DEFAULT_RETENTION_WINDOW_DAYS);
    if window_days == 0 {
        return Err(LoadError::invalid(
            "retention.window_days",
            "must be at least one day",
        ));
    }

    let batch_size = retention
        .batch_size
        .unwrap_or(DEFAULT_RETENTION_BATCH_SIZE);
    if batch_size == 0 {
        return Err(LoadError::invalid(
            "retention.batch_size",
            "must be greater than zero",
        ));
    }

    let collections = match retention.collections {
        Some(collections) if !collections.is_empty() => collections,
        _ => governed_collections(),
    };

    let schedule = retention
        .schedule
        .unwrap_or_else(|| DEFAULT_RETENTION_SCHEDULE.to_string());
    Schedule::from_str(&schedule).map_err(|err| {
        LoadError::invalid("retention.schedule", format!("invalid cron expression: {err}"))
    })?;

    Ok(RetentionSettings {
        window_days,
        collections,
        batch_size,
        schedule,
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
struct RawCacheSettings {
    enabled: Option<bool>,
    capacity: Option<usize>,
    ttl_seconds: Option<u64>,
    purge_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBrokerSettings {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    client_id: Option<String>,
    queue_capacity: Option<usize>,
    ack_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRetentionSettings {
    window_days: Option<u32>,
    collections: Option<Vec<String>>,
    batch_size: Option<usize>,
    schedule: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_a_complete_deployment() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

        assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
        assert_eq!(settings.logging.level, LevelFilter::INFO);
        assert!(matches!(settings.logging.format, LogFormat::Compact));
        assert!(settings.database.url.is_none());
        assert!(settings.cache.enabled);
        assert_eq!(settings.broker.port, DEFAULT_BROKER_PORT);
        assert_eq!(settings.retention.window_days, 7);
        assert_eq!(settings.retention.batch_size, 500);
        assert_eq!(settings.retention.collections.len(), 3);
        assert_eq!(settings.retention.schedule, DEFAULT_RETENTION_SCHEDULE);
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            retention_window_days: Some(14),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert_eq!(settings.retention.window_days, 14);
    }

    #[test]
    fn zero_retention_window_is_rejected() {
        let mut raw = RawSettings::default();
        raw.retention.window_days = Some(0);
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid { key: "retention.window_days", .. })
        ));
    }

    #[test]
    fn bad_cron_expression_is_rejected() {
        let mut raw = RawSettings::default();
        raw.retention.schedule = Some("every day at midnight".to_string());
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid { key: "retention.schedule", .. })
        ));
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["verdant"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "verdant",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--broker-host",
            "mqtt.internal",
            "--database-url",
            "postgres://override",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(serve.overrides.broker_host.as_deref(), Some("mqtt.internal"));
                assert_eq!(
                    serve.overrides.database_url.as_deref(),
                    Some("postgres://override")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_migrate_arguments() {
        let args = CliArgs::parse_from([
            "verdant",
            "migrate",
            "--database-url",
            "postgres://example",
        ]);

        match args.command.expect("migrate command") {
            Command::Migrate(migrate) => {
                assert_eq!(
                    migrate.database.database_url.as_deref(),
                    Some("postgres://example")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn empty_database_url_collapses_to_none() {
        let mut raw = RawSettings::default();
        raw.database.url = Some("   ".to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(settings.database.url.is_none());
    }
}
