//! CLI error types with miette diagnostics.
//!
//! Maps `devportal_api::Error` and `ConfigError` into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use devportal_api::Error as ApiError;
use devportal_config::ConfigError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const UNSUPPORTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to portal at {url}")]
    #[diagnostic(
        code(devportal::connection_failed),
        help(
            "Check that the device is reachable and the portal is enabled.\n\
             URL: {url}"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: ApiError,
    },

    #[error("TLS setup failed: {reason}")]
    #[diagnostic(
        code(devportal::tls_error),
        help(
            "Devices usually present a self-signed certificate.\n\
             Use --insecure (-k), or set trust = \"pinned\" with pinned_cert in your profile."
        )
    )]
    TlsError { reason: String },

    #[error("Request timed out")]
    #[diagnostic(
        code(devportal::timeout),
        help("Increase the timeout with --timeout or check the device's responsiveness.")
    )]
    Timeout,

    // ── Authentication ───────────────────────────────────────────────

    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(devportal::auth_failed),
        help(
            "Verify the username and password for this device.\n\
             Set DEVPORTAL_PASSWORD or store the password in the system keyring."
        )
    )]
    AuthFailed { message: String },

    #[error("No password configured for profile '{profile}'")]
    #[diagnostic(
        code(devportal::no_credentials),
        help(
            "Set password_env or password in the profile, export DEVPORTAL_PASSWORD,\n\
             or store it in the keyring under service 'devportal', user '{profile}/password'."
        )
    )]
    NoCredentials { profile: String },

    // ── Portal responses ─────────────────────────────────────────────

    #[error("Not found (HTTP 404): {message}")]
    #[diagnostic(code(devportal::not_found))]
    NotFound { message: String },

    #[error("Portal error (HTTP {status}): {message}")]
    #[diagnostic(code(devportal::portal_error))]
    Portal {
        status: u16,
        message: String,
        #[help]
        detail: Option<String>,
    },

    #[error("Unexpected response body: {message}")]
    #[diagnostic(
        code(devportal::non_conforming),
        help("Retry with --tolerant if this endpoint is known to answer with non-JSON bodies.")
    )]
    NonConforming { message: String },

    // ── Unsupported ──────────────────────────────────────────────────

    #[error("Operation not supported: {reason}")]
    #[diagnostic(
        code(devportal::unsupported),
        help("This profile is sandboxed. Retry with --handles to upload from open file handles.")
    )]
    Unsupported { reason: String },

    // ── Uploads ──────────────────────────────────────────────────────

    #[error("File '{name}' changed during upload: expected {declared} bytes, read {actual}")]
    #[diagnostic(code(devportal::source_changed))]
    SourceChanged {
        name: String,
        declared: u64,
        actual: u64,
    },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(devportal::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(devportal::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Or pass the device address directly with --address."
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("Configuration file not found")]
    #[diagnostic(
        code(devportal::no_config),
        help(
            "Pass the device address with --address, or create a profile.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error(transparent)]
    #[diagnostic(code(devportal::config))]
    Config(Box<ConfigError>),

    // ── IO ───────────────────────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::TlsError { .. } => exit_code::CONNECTION,
            Self::Timeout => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Unsupported { .. } => exit_code::UNSUPPORTED,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ApiError → CliError mapping ─────────────────────────────────────

impl From<ApiError> for CliError {
    fn from(err: ApiError) -> Self {
        if err.is_not_found() {
            return Self::NotFound {
                message: api_message(&err),
            };
        }

        if let ApiError::Transport(ref e) = err {
            if e.is_timeout() {
                return Self::Timeout;
            }
            if e.status().is_none() {
                let url = e.url().map_or_else(|| "(unknown)".into(), ToString::to_string);
                return Self::ConnectionFailed { url, source: err };
            }
        }

        match err {
            ApiError::Tls(reason) => Self::TlsError { reason },
            ApiError::Authentication { message } => Self::AuthFailed { message },
            ApiError::UnsupportedOperation(reason) => Self::Unsupported {
                reason: reason.into(),
            },
            ApiError::SourceLengthMismatch {
                name,
                declared,
                actual,
            } => Self::SourceChanged {
                name,
                declared,
                actual,
            },
            ApiError::Deserialization { message, .. } => Self::NonConforming { message },
            ApiError::InvalidUrl(e) => Self::Validation {
                field: "path".into(),
                reason: e.to_string(),
            },
            ApiError::Io(e) => Self::Io(e),
            ApiError::Portal {
                status,
                code,
                message,
                reason,
            } => Self::Portal {
                status,
                message,
                detail: portal_detail(code, reason),
            },
            other => Self::Portal {
                status: other.status().unwrap_or_default(),
                message: api_message(&other),
                detail: None,
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Certificate { path, source } => Self::TlsError {
                reason: format!("{}: {source}", path.display()),
            },
            other => Self::Config(Box::new(other)),
        }
    }
}

fn api_message(err: &ApiError) -> String {
    match err {
        ApiError::Portal { message, .. } => message.clone(),
        ApiError::Http { body, .. } => {
            let text = String::from_utf8_lossy(body);
            let preview: String = text.chars().take(200).collect();
            if preview.trim().is_empty() {
                "(empty body)".into()
            } else {
                preview
            }
        }
        other => other.to_string(),
    }
}

fn portal_detail(code: Option<i64>, reason: Option<String>) -> Option<String> {
    match (code, reason) {
        (Some(code), Some(reason)) => Some(format!("{reason} (code {code})")),
        (Some(code), None) => Some(format!("Portal error code {code}")),
        (None, reason) => reason,
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn not_found_maps_to_exit_code() {
        let err = CliError::from(ApiError::Http {
            status: 404,
            body: Bytes::from_static(b"missing"),
        });
        assert!(matches!(err, CliError::NotFound { .. }));
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
    }

    #[test]
    fn unsupported_maps_to_exit_code() {
        let err = CliError::from(ApiError::UnsupportedOperation("raw paths"));
        assert_eq!(err.exit_code(), exit_code::UNSUPPORTED);
    }

    #[test]
    fn portal_detail_combines_code_and_reason() {
        assert_eq!(
            portal_detail(Some(-1), Some("Busy".into())).as_deref(),
            Some("Busy (code -1)")
        );
        assert_eq!(portal_detail(None, None), None);
    }
}
