//! Clap derive structures for the `devportal` CLI.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// devportal -- talk to a device-management portal from the command line
#[derive(Debug, Parser)]
#[command(
    name = "devportal",
    version,
    about = "Send requests and stream uploads to a device-management portal",
    long_about = "A thin CLI over the devportal client core.\n\n\
        Requests are authenticated with the profile's credentials, carry the\n\
        portal's anti-forgery token on mutating verbs, and print the response\n\
        body to stdout.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Device profile to use
    #[arg(long, short = 'p', env = "DEVPORTAL_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Portal address (overrides profile)
    #[arg(long, short = 'a', env = "DEVPORTAL_ADDRESS", global = true)]
    pub address: Option<String>,

    /// Username for basic auth (overrides profile)
    #[arg(long, short = 'u', global = true)]
    pub username: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "DEVPORTAL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Accept any TLS certificate the device presents
    #[arg(long, short = 'k', env = "DEVPORTAL_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds (no timeout by default)
    #[arg(long, env = "DEVPORTAL_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Commands ─────────────────────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send a GET request
    Get(RequestArgs),

    /// Send a POST request (query-string payload, optional raw body)
    Post(PostArgs),

    /// Send a DELETE request
    #[command(alias = "rm")]
    Delete(RequestArgs),

    /// Upload files as a streamed multipart/form-data POST
    #[command(alias = "up")]
    Upload(UploadArgs),

    /// Inspect configuration
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct RequestArgs {
    /// API path relative to the portal root (e.g. api/os/info)
    pub path: String,

    #[command(flatten)]
    pub query: QueryArgs,

    /// Print the body exactly as received (no JSON pretty-printing)
    #[arg(long)]
    pub raw: bool,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Query parameter as key=value (repeatable)
    #[arg(long = "query", short = 'Q', value_name = "KEY=VALUE", value_parser = parse_pair)]
    pub pairs: Vec<(String, String)>,

    /// Query parameter whose value is sent base64-encoded (repeatable)
    #[arg(long, value_name = "KEY=VALUE", value_parser = parse_pair)]
    pub hex64: Vec<(String, String)>,
}

#[derive(Debug, Args)]
pub struct PostArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Send this file as the request body
    #[arg(long, value_name = "FILE")]
    pub body: Option<PathBuf>,

    /// Content type for --body
    #[arg(long, default_value = "application/json", requires = "body")]
    pub content_type: String,

    /// Treat a success body that isn't JSON as success
    #[arg(long)]
    pub tolerant: bool,
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    /// API path relative to the portal root
    pub path: String,

    /// Files to upload, in order
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub query: QueryArgs,

    /// Open files up front and upload them as handles instead of paths
    #[arg(long)]
    pub handles: bool,

    /// Print the body exactly as received
    #[arg(long)]
    pub raw: bool,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,
    /// Print the effective configuration as TOML
    Show,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .filter(|(key, _)| !key.is_empty())
        .map(|(key, value)| (key.to_owned(), value.to_owned()))
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))
}
