//! Raw GET / POST / DELETE handlers.

use devportal_api::PortalClient;

use crate::cli::{GlobalOpts, PostArgs, RequestArgs};
use crate::commands::query_of;
use crate::error::CliError;
use crate::output;

pub async fn get(
    args: RequestArgs,
    client: &PortalClient,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let body = client.get(&args.path, &query_of(&args.query)).await?;
    output::print_body(body, args.raw, global.quiet)
}

pub async fn delete(
    args: RequestArgs,
    client: &PortalClient,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let body = client.delete(&args.path, &query_of(&args.query)).await?;
    output::print_body(body, args.raw, global.quiet)
}

pub async fn post(
    args: PostArgs,
    client: &PortalClient,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let PostArgs {
        request,
        body,
        content_type,
        tolerant,
    } = args;
    let query = query_of(&request.query);

    if let Some(path) = body {
        let payload = tokio::fs::read(&path).await?;
        tracing::debug!(file = %path.display(), len = payload.len(), %content_type, "posting raw body");
        let response = client
            .post_body(&request.path, &query, payload, &content_type)
            .await?;
        return output::print_body(response, request.raw || tolerant, global.quiet);
    }

    if tolerant && !request.raw {
        let outcome = client
            .post_tolerant::<serde_json::Value>(&request.path, &query)
            .await?;
        return output::print_outcome(outcome, global.quiet);
    }

    let response = client.post(&request.path, &query).await?;
    output::print_body(response, request.raw, global.quiet)
}
