//! Command handlers.

pub mod config_cmd;
pub mod request;
pub mod upload;

use devportal_api::{PortalClient, QueryString, hex64_encode};

use crate::cli::{Command, GlobalOpts, QueryArgs};
use crate::error::CliError;

/// Route a connected command to its handler.
pub async fn dispatch(
    cmd: Command,
    client: &PortalClient,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Get(args) => request::get(args, client, global).await,
        Command::Post(args) => request::post(args, client, global).await,
        Command::Delete(args) => request::delete(args, client, global).await,
        Command::Upload(args) => upload::handle(args, client, global).await,
        Command::Config(args) => config_cmd::handle(args, global),
    }
}

/// Build the query string: plain pairs first, then base64-encoded ones.
pub(crate) fn query_of(args: &QueryArgs) -> QueryString {
    args.pairs
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .chain(args.hex64.iter().map(|(k, v)| (k.clone(), hex64_encode(v))))
        .collect()
}
