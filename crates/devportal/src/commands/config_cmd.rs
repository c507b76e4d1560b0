//! Config subcommand handlers.

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let path = global
        .config
        .clone()
        .unwrap_or_else(devportal_config::config_path);

    match args.command {
        ConfigCommand::Path => {
            println!("{}", path.display());
            Ok(())
        }

        ConfigCommand::Show => {
            let mut cfg = devportal_config::load_config_from(&path)?;
            // Never echo plaintext passwords
            for profile in cfg.profiles.values_mut() {
                if profile.password.is_some() {
                    profile.password = Some("********".into());
                }
            }
            let rendered = toml::to_string_pretty(&cfg).map_err(|e| CliError::Validation {
                field: "config".into(),
                reason: format!("failed to serialize config: {e}"),
            })?;
            print!("{rendered}");
            Ok(())
        }
    }
}
