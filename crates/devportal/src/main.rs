mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use devportal_api::{ConnectionContext, PortalClient, TransportConfig};
use devportal_config::{ConfigError, Profile, TrustSetting};

use crate::cli::{Cli, Command, GlobalOpts};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't need a portal connection
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        cmd => {
            let (context, transport) = build_connection(&cli.global)?;
            let client = PortalClient::new(context, &transport)?;

            tracing::debug!(command = ?cmd, "dispatching command");
            commands::dispatch(cmd, &client, &cli.global).await
        }
    }
}

/// Resolve the active profile, apply CLI overrides, and build the
/// connection context.
fn build_connection(
    global: &GlobalOpts,
) -> Result<(ConnectionContext, TransportConfig), CliError> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(devportal_config::config_path);
    let cfg = devportal_config::load_config_from(&path)?;

    let (profile_name, mut profile) = match cfg.profile(global.profile.as_deref()) {
        Ok((name, profile)) => (name, profile.clone()),
        // An explicit address works without any config file
        Err(ConfigError::UnknownProfile { name }) if global.address.is_some() => {
            (name, Profile::default())
        }
        Err(ConfigError::UnknownProfile { name }) => {
            if cfg.profiles.is_empty() {
                return Err(CliError::NoConfig {
                    path: path.display().to_string(),
                });
            }
            let mut available: Vec<&str> = cfg.profiles.keys().map(String::as_str).collect();
            available.sort_unstable();
            return Err(CliError::ProfileNotFound {
                name,
                available: available.join(", "),
            });
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(ref address) = global.address {
        profile.address.clone_from(address);
    }
    if let Some(ref username) = global.username {
        profile.username = Some(username.clone());
    }
    if global.insecure {
        profile.trust = Some(TrustSetting::AcceptAny);
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }

    Ok(devportal_config::profile_to_connection(
        &profile,
        &profile_name,
        &cfg.defaults,
    )?)
}
