//! Multipart upload handler with a progress bar.

use std::path::Path;

use indicatif::{ProgressBar, ProgressStyle};

use devportal_api::{FileItem, MultipartEncoder, PortalClient};

use crate::cli::{GlobalOpts, UploadArgs};
use crate::commands::query_of;
use crate::error::CliError;
use crate::output;

const BAR_TEMPLATE: &str =
    "{spinner} [{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes} ({bytes_per_sec})";

pub async fn handle(
    args: UploadArgs,
    client: &PortalClient,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut items = Vec::with_capacity(args.files.len());
    for path in &args.files {
        items.push(describe(path, args.handles).await?);
    }

    let encoder = MultipartEncoder::new(items);
    let total = encoder.compute_length();
    tracing::debug!(files = args.files.len(), total, "starting upload");

    let bar = if global.quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(total)
    };
    bar.set_style(
        ProgressStyle::with_template(BAR_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let reporter = bar.clone();
    let result = client
        .upload_multipart(
            &args.path,
            &query_of(&args.query),
            encoder,
            Some(Box::new(move |written| reporter.set_position(written))),
        )
        .await;

    match result {
        Ok(body) => {
            bar.finish_and_clear();
            output::print_body(body, args.raw, global.quiet)
        }
        Err(e) => {
            bar.abandon();
            Err(e.into())
        }
    }
}

/// Describe one file, either by path (opened when streamed) or as an
/// already-open handle.
async fn describe(path: &Path, as_handle: bool) -> Result<FileItem, CliError> {
    if !as_handle {
        return Ok(FileItem::from_path(path).await?);
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CliError::Validation {
            field: "file".into(),
            reason: format!("path has no file name: {}", path.display()),
        })?;
    let file = std::fs::File::open(path)?;
    Ok(FileItem::from_handle(name, file)?)
}
