use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the patchwork binary.
#[derive(Debug, Parser)]
#[command(name = "patchwork", version, about = "Patchwork partial-update server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PATCHWORK_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(Box<ServeArgs>),
    /// Print the registered route table and exit.
    Routes,
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

    /// Override the number of render jobs that may wait for the render worker.
    #[arg(long = "render-queue-capacity", value_name = "COUNT")]
    pub render_queue_capacity: Option<usize>,

    /// Override the route fragment requests are redirected to after a server error.
    #[arg(long = "protocol-error-route", value_name = "PATH")]
    pub protocol_error_route: Option<String>,

    /// Toggle the redirect header on failed fragment responses.
    #[arg(
        long = "protocol-redirect-fragment-errors",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub protocol_redirect_fragment_errors: Option<bool>,

    /// Toggle antiforgery token issuance and validation.
    #[arg(
        long = "protocol-antiforgery",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub protocol_antiforgery: Option<bool>,
}
