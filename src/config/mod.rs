//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{net::SocketAddr, num::NonZeroUsize, str::FromStr};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "patchwork";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_RENDER_QUEUE_CAPACITY: usize = 256;
const DEFAULT_ERROR_ROUTE: &str = "/error";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub protocol: ProtocolSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
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
pub struct RenderSettings {
    pub queue_capacity: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct ProtocolSettings {
    /// Root-relative path fragment requests are sent to after a 5xx.
    pub error_route: String,
    pub redirect_fragment_errors: bool,
    pub antiforgery: bool,
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self {
            error_route: DEFAULT_ERROR_ROUTE.to_string(),
            redirect_fragment_errors: true,
            antiforgery: true,
        }
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

    builder = builder.add_source(Environment::with_prefix("PATCHWORK").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Routes) | None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    render: RawRenderSettings,
    protocol: RawProtocolSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(capacity) = overrides.render_queue_capacity {
            self.render.queue_capacity = Some(capacity);
        }
        if let Some(route) = overrides.protocol_error_route.as_ref() {
            self.protocol.error_route = Some(route.clone());
        }
        if let Some(enabled) = overrides.protocol_redirect_fragment_errors {
            self.protocol.redirect_fragment_errors = Some(enabled);
        }
        if let Some(enabled) = overrides.protocol_antiforgery {
            self.protocol.antiforgery = Some(enabled);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            render,
            protocol,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            render: build_render_settings(render)?,
            protocol: build_protocol_settings(protocol)?,
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

    Ok(ServerSettings { addr })
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

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let capacity = render
        .queue_capacity
        .unwrap_or(DEFAULT_RENDER_QUEUE_CAPACITY);
    let queue_capacity = NonZeroUsize::new(capacity)
        .ok_or_else(|| LoadError::invalid("render.queue_capacity", "must be greater than zero"))?;

    Ok(RenderSettings { queue_capacity })
}

fn build_protocol_settings(protocol: RawProtocolSettings) -> Result<ProtocolSettings, LoadError> {
    let defaults = ProtocolSettings::default();

    let error_route = match protocol.error_route {
        Some(route) => {
            let trimmed = route.trim();
            if !trimmed.starts_with('/') {
                return Err(LoadError::invalid(
                    "protocol.error_route",
                    "route must be root-relative",
                ));
            }
            if trimmed.contains('?') {
                return Err(LoadError::invalid(
                    "protocol.error_route",
                    "route must not carry a query string",
                ));
            }
            trimmed.to_string()
        }
        None => defaults.error_route,
    };

    Ok(ProtocolSettings {
        error_route,
        redirect_fragment_errors: protocol
            .redirect_fragment_errors
            .unwrap_or(defaults.redirect_fragment_errors),
        antiforgery: protocol.antiforgery.unwrap_or(defaults.antiforgery),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    queue_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawProtocolSettings {
    error_route: Option<String>,
    redirect_fragment_errors: Option<bool>,
    antiforgery: Option<bool>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
