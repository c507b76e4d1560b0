// Portal HTTP client
//
// Wraps `reqwest::Client` with portal URL construction, credential and
// anti-forgery token handling, streamed multipart uploads, and failure
// mapping. Endpoint wrappers are thin callers of the verbs defined here.

use bytes::Bytes;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::connection::{CSRF_HEADER, ConnectionContext};
use crate::endpoint::{QueryString, build_endpoint};
use crate::error::{Error, map_failure};
use crate::multipart::{MultipartEncoder, ProgressFn};
use crate::outcome::Outcome;
use crate::source::FileItem;
use crate::transport::TransportConfig;

/// Lifecycle of a single exchange with the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestPhase {
    Idle,
    Sending,
    AwaitingResponse,
    Success,
    Failed,
}

impl RequestPhase {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Sending)
                | (Self::Sending, Self::AwaitingResponse | Self::Failed)
                | (Self::AwaitingResponse, Self::Success | Self::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Tracks and logs the phase of one request.
struct Exchange<'a> {
    method: &'a Method,
    url: &'a Url,
    phase: RequestPhase,
}

impl<'a> Exchange<'a> {
    fn new(method: &'a Method, url: &'a Url) -> Self {
        Self {
            method,
            url,
            phase: RequestPhase::Idle,
        }
    }

    fn advance(&mut self, next: RequestPhase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {:?} -> {next:?}",
            self.phase
        );
        debug!(method = %self.method, url = %self.url, from = ?self.phase, to = ?next, "request phase");
        self.phase = next;
    }
}

/// Body attached to an outgoing request.
struct OutgoingBody {
    body: reqwest::Body,
    content_type: String,
    length: Option<u64>,
}

/// Async client for a device portal.
///
/// Holds one [`ConnectionContext`] for the lifetime of the device session.
/// Mutating requests (POST, DELETE, uploads) are serialized through an
/// internal gate so the anti-forgery token captured from one response is the
/// one sent with the next; GETs run concurrently.
pub struct PortalClient {
    http: reqwest::Client,
    context: ConnectionContext,
    mutation_gate: Mutex<()>,
}

impl PortalClient {
    /// Create a new client from a `TransportConfig`.
    ///
    /// If the config doesn't already include a cookie jar, one is created
    /// automatically (the portal keeps session state in cookies).
    pub fn new(context: ConnectionContext, transport: &TransportConfig) -> Result<Self, Error> {
        let config = if transport.cookie_jar.is_some() {
            transport.clone()
        } else {
            transport.clone().with_cookie_jar()
        };
        let http = config.build_client(context.trust())?;
        Ok(Self::with_client(http, context))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    ///
    /// The trust policy in `context` is not applied; the caller owns the
    /// client's TLS configuration.
    pub fn with_client(http: reqwest::Client, context: ConnectionContext) -> Self {
        Self {
            http,
            context,
            mutation_gate: Mutex::new(()),
        }
    }

    pub fn context(&self) -> &ConnectionContext {
        &self.context
    }

    /// The underlying HTTP client.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Full URI for an API path on this portal.
    pub fn endpoint(&self, api_path: &str, query: &QueryString) -> Result<Url, Error> {
        build_endpoint(self.context.base_url(), api_path, query)
    }

    // ── Verbs ────────────────────────────────────────────────────────

    /// GET an API path, returning the body (`None` for no content).
    pub async fn get(&self, api_path: &str, query: &QueryString) -> Result<Option<Bytes>, Error> {
        let url = self.endpoint(api_path, query)?;
        self.execute(Method::GET, url, None).await
    }

    /// GET an API path and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        api_path: &str,
        query: &QueryString,
    ) -> Result<T, Error> {
        let body = self.get(api_path, query).await?;
        Outcome::decode(body).into_result()
    }

    /// POST with the payload in the query string and no body.
    pub async fn post(&self, api_path: &str, query: &QueryString) -> Result<Option<Bytes>, Error> {
        let url = self.endpoint(api_path, query)?;
        self.execute(Method::POST, url, None).await
    }

    /// POST and decode the JSON response strictly.
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        api_path: &str,
        query: &QueryString,
    ) -> Result<T, Error> {
        let body = self.post(api_path, query).await?;
        Outcome::decode(body).into_result()
    }

    /// POST to an endpoint known to answer with non-JSON bodies on success.
    ///
    /// Application and transport failures are still errors; a body that
    /// does not decode comes back as [`Outcome::NonConforming`].
    pub async fn post_tolerant<T: DeserializeOwned>(
        &self,
        api_path: &str,
        query: &QueryString,
    ) -> Result<Outcome<T>, Error> {
        let body = self.post(api_path, query).await?;
        let outcome = Outcome::decode(body);
        if let Outcome::NonConforming { ref message, .. } = outcome {
            debug!(api_path, %message, "tolerating non-conforming success body");
        }
        Ok(outcome)
    }

    /// POST a caller-supplied body with an explicit content type.
    pub async fn post_body(
        &self,
        api_path: &str,
        query: &QueryString,
        body: impl Into<reqwest::Body>,
        content_type: &str,
    ) -> Result<Option<Bytes>, Error> {
        let url = self.endpoint(api_path, query)?;
        let body = OutgoingBody {
            body: body.into(),
            content_type: content_type.to_owned(),
            length: None,
        };
        self.execute(Method::POST, url, Some(body)).await
    }

    /// DELETE with the payload in the query string.
    pub async fn delete(&self, api_path: &str, query: &QueryString) -> Result<Option<Bytes>, Error> {
        let url = self.endpoint(api_path, query)?;
        self.execute(Method::DELETE, url, None).await
    }

    /// Upload files as a streamed `multipart/form-data` POST.
    pub async fn upload(
        &self,
        api_path: &str,
        query: &QueryString,
        files: Vec<FileItem>,
        progress: Option<ProgressFn>,
    ) -> Result<Option<Bytes>, Error> {
        self.upload_multipart(api_path, query, MultipartEncoder::new(files), progress)
            .await
    }

    /// Upload a prepared encoder (e.g. when the caller needs its length
    /// up front for progress display).
    pub async fn upload_multipart(
        &self,
        api_path: &str,
        query: &QueryString,
        encoder: MultipartEncoder,
        progress: Option<ProgressFn>,
    ) -> Result<Option<Bytes>, Error> {
        let platform = self.context.platform();
        if encoder.items().iter().any(|f| !platform.accepts(f.kind())) {
            return Err(Error::UnsupportedOperation(
                "uploading from raw file paths is not supported on this platform; pass a managed file handle",
            ));
        }

        let url = self.endpoint(api_path, query)?;
        let length = encoder.compute_length();
        debug!(
            files = encoder.items().len(),
            length,
            boundary = encoder.boundary(),
            "prepared multipart upload"
        );

        let body = OutgoingBody {
            content_type: encoder.content_type(),
            length: Some(length),
            body: reqwest::Body::wrap_stream(encoder.into_stream(progress)),
        };
        self.execute(Method::POST, url, Some(body)).await
    }

    // ── Request execution ────────────────────────────────────────────

    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<OutgoingBody>,
    ) -> Result<Option<Bytes>, Error> {
        let mutating = is_mutating(&method);
        let _gate = if mutating {
            Some(self.mutation_gate.lock().await)
        } else {
            None
        };

        debug!("{method} {url}");
        let mut exchange = Exchange::new(&method, &url);

        let mut builder = self.http.request(method.clone(), url.clone());
        if let Some(creds) = self.context.credentials() {
            builder = builder.basic_auth(&creds.username, Some(creds.password.expose_secret()));
        }
        if mutating {
            builder = self.apply_csrf(builder);
        }
        if let Some(outgoing) = body {
            builder = builder
                .header(CONTENT_TYPE, outgoing.content_type)
                .body(outgoing.body);
            if let Some(length) = outgoing.length {
                builder = builder.header(CONTENT_LENGTH, length);
            }
        }

        exchange.advance(RequestPhase::Sending);
        let resp = match builder.send().await {
            Ok(resp) => resp,
            Err(e) => {
                exchange.advance(RequestPhase::Failed);
                return Err(unwrap_body_error(e));
            }
        };
        exchange.advance(RequestPhase::AwaitingResponse);

        // The token may rotate on any response, including failures.
        self.context.tokens().capture(resp.headers());

        let status = resp.status();
        if !status.is_success() {
            exchange.advance(RequestPhase::Failed);
            let body = resp.bytes().await.unwrap_or_default();
            return Err(map_failure(status, body));
        }

        let body = match resp.bytes().await {
            Ok(body) => body,
            Err(e) => {
                exchange.advance(RequestPhase::Failed);
                return Err(Error::Transport(e));
            }
        };
        exchange.advance(RequestPhase::Success);

        if status == StatusCode::NO_CONTENT || body.is_empty() {
            Ok(None)
        } else {
            Ok(Some(body))
        }
    }

    /// Apply the stored anti-forgery token to a request builder.
    fn apply_csrf(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.context.tokens().current() {
            Some(token) => builder.header(CSRF_HEADER, token),
            None => builder,
        }
    }
}

fn is_mutating(method: &Method) -> bool {
    !matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Surface encoder failures (I/O, length mismatch) that reqwest wrapped
/// while pulling the streamed body, instead of a generic transport error.
fn unwrap_body_error(err: reqwest::Error) -> Error {
    let mut source = std::error::Error::source(&err);
    while let Some(inner) = source {
        if inner.is::<Error>() {
            break;
        }
        source = inner.source();
    }

    let encoder_error = match source.and_then(|inner| inner.downcast_ref::<Error>()) {
        Some(Error::SourceLengthMismatch {
            name,
            declared,
            actual,
        }) => Some(Error::SourceLengthMismatch {
            name: name.clone(),
            declared: *declared,
            actual: *actual,
        }),
        Some(Error::Io(io)) => {
            debug!(error = %io, source = ?io.get_ref(), "upload body read failed");
            Some(Error::Io(std::io::Error::new(io.kind(), io.to_string())))
        }
        _ => None,
    };
    encoder_error.unwrap_or(Error::Transport(err))
}
