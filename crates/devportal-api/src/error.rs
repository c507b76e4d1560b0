use bytes::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Top-level error type for the `devportal-api` crate.
///
/// Failures fall into four families, none of which are retried inside the
/// crate: transport (connection, TLS, trust rejection), application (the
/// portal answered with a non-2xx status), non-conforming responses (a 2xx
/// whose body does not decode), and platform capability (an operation the
/// current platform cannot perform, raised before any network activity).
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// The portal rejected the credentials (HTTP 401).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, rejected
    /// certificate, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS configuration or certificate loading error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Local I/O failure while reading an upload source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Portal ──────────────────────────────────────────────────────
    /// Structured error reported by the portal in the response body.
    #[error("Portal error (HTTP {status}): {message}")]
    Portal {
        status: u16,
        code: Option<i64>,
        message: String,
        reason: Option<String>,
    },

    /// Non-2xx response whose body could not be parsed as a portal error.
    #[error("HTTP {status} ({} byte body)", .body.len())]
    Http { status: u16, body: Bytes },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// An upload source produced a different number of bytes than it
    /// declared, so the advertised content length would be wrong.
    #[error("Upload source '{name}' declared {declared} bytes but produced {actual}")]
    SourceLengthMismatch {
        name: String,
        declared: u64,
        actual: u64,
    },

    // ── Platform ────────────────────────────────────────────────────
    /// Operation not supported on this platform.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),
}

impl Error {
    /// HTTP status associated with this error, if the portal answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Portal { status, .. } | Self::Http { status, .. } => Some(*status),
            Self::Authentication { .. } => Some(StatusCode::UNAUTHORIZED.as_u16()),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Returns `true` if the request never produced a portal response
    /// (connection, TLS, or trust-policy failure).
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Transport(e) => e.status().is_none(),
            Self::Tls(_) => true,
            _ => false,
        }
    }

    /// Returns `true` if the portal rejected the request with a non-2xx status.
    pub fn is_application(&self) -> bool {
        matches!(
            self,
            Self::Authentication { .. } | Self::Portal { .. } | Self::Http { .. }
        )
    }

    /// Returns `true` if a success response carried a body that did not decode.
    pub fn is_non_conforming(&self) -> bool {
        matches!(self, Self::Deserialization { .. })
    }

    /// Returns `true` if the operation is unavailable on this platform.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedOperation(_))
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND.as_u16())
    }

    /// Extract the portal error code, if available.
    pub fn portal_code(&self) -> Option<i64> {
        match self {
            Self::Portal { code, .. } => *code,
            _ => None,
        }
    }
}

// ── Failure mapping ─────────────────────────────────────────────────

/// Error payload the portal returns alongside non-2xx statuses.
#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PortalErrorBody {
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    reason: Option<String>,
}

/// Convert a failed response into a typed error.
///
/// The body is parsed best-effort: anything that is not a portal error
/// object (HTML error pages, truncated JSON, binary noise) degrades to
/// [`Error::Http`] carrying the raw status and bytes.
pub fn map_failure(status: StatusCode, body: Bytes) -> Error {
    let parsed = serde_json::from_slice::<PortalErrorBody>(&body)
        .ok()
        .filter(|b| b.error_message.is_some() || b.reason.is_some());

    if status == StatusCode::UNAUTHORIZED {
        let message = parsed
            .and_then(|b| b.error_message.or(b.reason))
            .unwrap_or_else(|| "credentials rejected by the portal".into());
        return Error::Authentication { message };
    }

    match parsed {
        Some(b) => Error::Portal {
            status: status.as_u16(),
            code: b.error_code.or(b.code),
            message: b
                .error_message
                .or_else(|| b.reason.clone())
                .unwrap_or_default(),
            reason: b.reason,
        },
        None => Error::Http {
            status: status.as_u16(),
            body,
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn structured_body_maps_to_portal_error() {
        let body = Bytes::from_static(
            br#"{"ErrorCode":-2147024809,"Code":400,"ErrorMessage":"The parameter is incorrect.","Success":false}"#,
        );
        let err = map_failure(StatusCode::BAD_REQUEST, body);

        match err {
            Error::Portal {
                status,
                code,
                ref message,
                ..
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, Some(-2_147_024_809));
                assert_eq!(message, "The parameter is incorrect.");
            }
            other => panic!("expected Portal error, got: {other:?}"),
        }
    }

    #[test]
    fn reason_only_body_uses_reason_as_message() {
        let body = Bytes::from_static(br#"{"Reason":"Package not found"}"#);
        let err = map_failure(StatusCode::NOT_FOUND, body);

        assert!(err.is_not_found());
        match err {
            Error::Portal {
                message, reason, ..
            } => {
                assert_eq!(message, "Package not found");
                assert_eq!(reason.as_deref(), Some("Package not found"));
            }
            other => panic!("expected Portal error, got: {other:?}"),
        }
    }

    #[test]
    fn malformed_body_degrades_to_http_error() {
        let body = Bytes::from_static(b"<html>500 Internal Server Error</html>");
        let err = map_failure(StatusCode::INTERNAL_SERVER_ERROR, body.clone());

        match err {
            Error::Http { status, body: raw } => {
                assert_eq!(status, 500);
                assert_eq!(raw, body);
            }
            other => panic!("expected Http error, got: {other:?}"),
        }
    }

    #[test]
    fn truncated_json_and_empty_object_degrade() {
        for raw in [&b"{\"ErrorMessage\": \"oops"[..], b"{}", b"", b"\xff\xfe"] {
            let err = map_failure(StatusCode::BAD_GATEWAY, Bytes::copy_from_slice(raw));
            assert!(
                matches!(err, Error::Http { status: 502, .. }),
                "unexpected mapping for {raw:?}: {err:?}"
            );
        }
    }

    #[test]
    fn unauthorized_maps_to_authentication() {
        let err = map_failure(StatusCode::UNAUTHORIZED, Bytes::new());
        assert!(matches!(err, Error::Authentication { .. }));
        assert_eq!(err.status(), Some(401));
        assert!(err.is_application());
    }

    #[test]
    fn unsupported_is_not_transport() {
        let err = Error::UnsupportedOperation("nope");
        assert!(err.is_unsupported());
        assert!(!err.is_transport());
        assert_eq!(err.status(), None);
    }
}
