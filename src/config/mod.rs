//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::application::pagination::DEFAULT_PER_PAGE;
use crate::domain::search::SearchTuning;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "quire";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_SITE_TITLE: &str = "My Blog";
const DEFAULT_SITE_DESCRIPTION: &str = "New posts of my blog.";
const DEFAULT_PUBLIC_URL: &str = "http://127.0.0.1:8000/";
const DEFAULT_MAIL_FROM: &str = "admin@localhost";
const DEFAULT_MAIL_TIMEOUT_SECS: u64 = 10;

/// Command-line arguments for the Quire binary.
#[derive(Debug, Parser)]
#[command(name = "quire", version, about = "Quire blog server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "QUIRE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(Box<ServeArgs>),
    /// Apply pending database migrations and exit.
    Migrate(MigrateArgs),
    /// Import tags, posts and comments from a TOML archive.
    Import(ImportArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
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

    /// Override the public URL used in feeds and shared links.
    #[arg(long = "site-public-url", value_name = "URL")]
    pub site_public_url: Option<String>,

    /// Override the number of posts per listing page.
    #[arg(long = "listing-page-size", value_name = "COUNT")]
    pub listing_page_size: Option<u32>,

    /// Override the mail transport (log|webhook).
    #[arg(long = "mail-transport", value_name = "TRANSPORT")]
    pub mail_transport: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct MigrateArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,
}

#[derive(Debug, Args, Clone)]
pub struct ImportArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    /// Path to the archive to import.
    #[arg(value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub file: PathBuf,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub site: SiteSettings,
    pub listing: ListingSettings,
    pub search: SearchTuning,
    pub mail: MailSettings,
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
pub struct SiteSettings {
    pub title: String,
    pub description: String,
    pub public_url: Url,
}

#[derive(Debug, Clone)]
pub struct ListingSettings {
    pub page_size: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct MailSettings {
    pub from: String,
    pub transport: MailTransport,
}

#[derive(Debug, Clone)]
pub enum MailTransport {
    /// Write messages to the log instead of delivering them.
    Log,
    /// POST messages as JSON to an HTTP endpoint.
    Webhook {
        url: Url,
        token: Option<String>,
        timeout: Duration,
    },
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

    builder = builder.add_source(Environment::with_prefix("QUIRE").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Migrate(args)) => raw.apply_database_override(&args.database),
        Some(Command::Import(args)) => raw.apply_database_override(&args.database),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    site: RawSiteSettings,
    listing: RawListingSettings,
    search: RawSearchSettings,
    mail: RawMailSettings,
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
        if let Some(url) = overrides.site_public_url.as_ref() {
            self.site.public_url = Some(url.clone());
        }
        if let Some(size) = overrides.listing_page_size {
            self.listing.page_size = Some(size);
        }
        if let Some(transport) = overrides.mail_transport.as_ref() {
            self.mail.transport = Some(transport.clone());
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
            site,
            listing,
            search,
            mail,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            site: build_site_settings(site)?,
            listing: build_listing_settings(listing)?,
            search: build_search_settings(search)?,
            mail: build_mail_settings(mail)?,
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
        .map_err(|reason| LoadError::invalid("server.host", reason))?;

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
    let url = non_blank(database.url);
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

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let title = non_blank(site.title).unwrap_or_else(|| DEFAULT_SITE_TITLE.to_string());
    let description = site
        .description
        .unwrap_or_else(|| DEFAULT_SITE_DESCRIPTION.to_string());
    let raw_url = non_blank(site.public_url).unwrap_or_else(|| DEFAULT_PUBLIC_URL.to_string());
    let public_url = parse_http_url(&raw_url, "site.public_url")?;

    Ok(SiteSettings {
        title,
        description,
        public_url,
    })
}

fn build_listing_settings(listing: RawListingSettings) -> Result<ListingSettings, LoadError> {
    let page_size = non_zero_u32(
        listing.page_size.unwrap_or(DEFAULT_PER_PAGE.get()).into(),
        "listing.page_size",
    )?;
    Ok(ListingSettings { page_size })
}

fn build_search_settings(search: RawSearchSettings) -> Result<SearchTuning, LoadError> {
    let defaults = SearchTuning::default();
    let tuning = SearchTuning {
        title_weight: search.title_weight.unwrap_or(defaults.title_weight),
        body_weight: search.body_weight.unwrap_or(defaults.body_weight),
        rank_threshold: search.rank_threshold.unwrap_or(defaults.rank_threshold),
        trigram_threshold: search
            .trigram_threshold
            .unwrap_or(defaults.trigram_threshold),
    };
    tuning
        .validate()
        .map_err(|err| LoadError::invalid("search", err.to_string()))?;
    Ok(tuning)
}

fn build_mail_settings(mail: RawMailSettings) -> Result<MailSettings, LoadError> {
    let from = non_blank(mail.from).unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string());

    let transport = match non_blank(mail.transport).as_deref() {
        None | Some("log") => MailTransport::Log,
        Some("webhook") => {
            let raw_url = non_blank(mail.webhook_url).ok_or_else(|| {
                LoadError::invalid("mail.webhook_url", "required when transport is `webhook`")
            })?;
            let url = parse_http_url(&raw_url, "mail.webhook_url")?;
            let timeout_secs = mail.timeout_seconds.unwrap_or(DEFAULT_MAIL_TIMEOUT_SECS);
            if timeout_secs == 0 {
                return Err(LoadError::invalid(
                    "mail.timeout_seconds",
                    "must be greater than zero",
                ));
            }
            MailTransport::Webhook {
                url,
                token: non_blank(mail.webhook_token),
                timeout: Duration::from_secs(timeout_secs),
            }
        }
        Some(other) => {
            return Err(LoadError::invalid(
                "mail.transport",
                format!("unknown transport `{other}` (expected `log` or `webhook`)"),
            ));
        }
    };

    Ok(MailSettings { from, transport })
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
struct RawSiteSettings {
    title: Option<String>,
    description: Option<String>,
    public_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawListingSettings {
    page_size: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSearchSettings {
    title_weight: Option<f32>,
    body_weight: Option<f32>,
    rank_threshold: Option<f32>,
    trigram_threshold: Option<f32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawMailSettings {
    from: Option<String>,
    transport: Option<String>,
    webhook_url: Option<String>,
    webhook_token: Option<String>,
    timeout_seconds: Option<u64>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn parse_http_url(value: &str, key: &'static str) -> Result<Url, LoadError> {
    let url = Url::parse(value)
        .map_err(|err| LoadError::invalid(key, format!("invalid URL `{value}`: {err}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(LoadError::invalid(
            key,
            format!("unsupported scheme `{other}`"),
        )),
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

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve_without_any_source() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
        assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
        assert_eq!(settings.listing.page_size.get(), 3);
        assert_eq!(settings.search, SearchTuning::default());
        assert_eq!(settings.mail.from, "admin@localhost");
        assert!(matches!(settings.mail.transport, MailTransport::Log));
        assert!(settings.database.url.is_none());
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());
        raw.listing.page_size = Some(10);

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            listing_page_size: Some(5),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert_eq!(settings.listing.page_size.get(), 5);
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        raw.apply_serve_overrides(&ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        });
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let mut raw = RawSettings::default();
        raw.listing.page_size = Some(0);
        let err = Settings::from_raw(raw).expect_err("invalid page size");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "listing.page_size",
                ..
            }
        ));
    }

    #[test]
    fn search_thresholds_are_validated() {
        let mut raw = RawSettings::default();
        raw.search.rank_threshold = Some(2.0);
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid { key: "search", .. })
        ));
    }

    #[test]
    fn webhook_transport_requires_url() {
        let mut raw = RawSettings::default();
        raw.mail.transport = Some("webhook".to_string());
        assert!(matches!(
            Settings::from_raw(raw.clone()),
            Err(LoadError::Invalid {
                key: "mail.webhook_url",
                ..
            })
        ));

        raw.mail.webhook_url = Some("https://mail.example.com/send".to_string());
        raw.mail.webhook_token = Some("  ".to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");
        match settings.mail.transport {
            MailTransport::Webhook { url, token, timeout } => {
                assert_eq!(url.as_str(), "https://mail.example.com/send");
                assert!(token.is_none());
                assert_eq!(timeout, Duration::from_secs(DEFAULT_MAIL_TIMEOUT_SECS));
            }
            MailTransport::Log => panic!("expected webhook transport"),
        }
    }

    #[test]
    fn unknown_mail_transport_is_rejected() {
        let mut raw = RawSettings::default();
        raw.mail.transport = Some("smtp".to_string());
        assert!(Settings::from_raw(raw).is_err());
    }

    #[test]
    fn public_url_must_be_http() {
        let mut raw = RawSettings::default();
        raw.site.public_url = Some("ftp://example.com".to_string());
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid {
                key: "site.public_url",
                ..
            })
        ));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["quire"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_import_arguments() {
        let args = CliArgs::parse_from([
            "quire",
            "import",
            "--database-url",
            "postgres://example",
            "/tmp/content.toml",
        ]);

        match args.command.expect("import command") {
            Command::Import(import) => {
                assert_eq!(
                    import.database.database_url.as_deref(),
                    Some("postgres://example")
                );
                assert_eq!(import.file, std::path::Path::new("/tmp/content.toml"));
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "quire",
            "serve",
            "--server-host",
            "0.0.0.0",
            "--site-public-url",
            "https://blog.example.com",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
                assert_eq!(
                    serve.overrides.site_public_url.as_deref(),
                    Some("https://blog.example.com")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }
}
