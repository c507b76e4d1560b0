//! Response body rendering.

use std::io::Write;

use bytes::Bytes;
use devportal_api::Outcome;

use crate::error::CliError;

/// Print a response body to stdout.
///
/// Bodies are expected to be JSON and are pretty-printed; `raw` writes the
/// bytes untouched. "No content" is noted on stderr unless `quiet`.
pub fn print_body(body: Option<Bytes>, raw: bool, quiet: bool) -> Result<(), CliError> {
    match body {
        None => {
            if !quiet {
                eprintln!("(no content)");
            }
            Ok(())
        }
        Some(bytes) if raw => write_raw(&bytes),
        Some(bytes) => {
            let value = Outcome::<serde_json::Value>::decode(Some(bytes)).into_result()?;
            print_json(&value)
        }
    }
}

/// Print a tolerated outcome: JSON pretty-printed, anything else as-is.
pub fn print_outcome(outcome: Outcome<serde_json::Value>, quiet: bool) -> Result<(), CliError> {
    match outcome {
        Outcome::Parsed(value) => print_json(&value),
        Outcome::NoContent => print_body(None, false, quiet),
        Outcome::NonConforming { message, body } => {
            tracing::info!(%message, "response body is not JSON");
            write_raw(&body)
        }
    }
}

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    let pretty = serde_json::to_string_pretty(value).map_err(std::io::Error::other)?;
    let mut out = std::io::stdout().lock();
    writeln!(out, "{pretty}")?;
    Ok(())
}

fn write_raw(bytes: &[u8]) -> Result<(), CliError> {
    let mut out = std::io::stdout().lock();
    out.write_all(bytes)?;
    if !bytes.ends_with(b"\n") {
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}
