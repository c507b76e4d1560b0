// Shared transport configuration for building reqwest::Client instances.
//
// The trust decision comes from the connection context; everything else
// (timeout, cookie jar, user agent) lives here.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use tracing::warn;

use crate::error::Error;
use crate::trust::{self, TrustMode};

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("devportal/", env!("CARGO_PKG_VERSION"));

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Whole-request timeout. `None` (the default) means requests never
    /// time out on their own; large uploads can take arbitrarily long.
    pub timeout: Option<Duration>,
    pub cookie_jar: Option<Arc<Jar>>,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            cookie_jar: None,
            user_agent: USER_AGENT.to_owned(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` that decides certificate trust per `trust`.
    pub fn build_client(&self, trust: &TrustMode) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder().user_agent(self.user_agent.as_str());

        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        match trust {
            TrustMode::System => {}
            TrustMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TrustMode::Policy(policy) => {
                let tls = trust::policy_tls_config(Arc::clone(policy))?;
                builder = builder.use_preconfigured_tls(tls);
            }
            TrustMode::DangerAcceptInvalid => {
                warn!("TLS certificate verification disabled");
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        if let Some(ref jar) = self.cookie_jar {
            builder = builder.cookie_provider(Arc::clone(jar));
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Set a whole-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Create a config with a fresh cookie jar (for portal session cookies).
    pub fn with_cookie_jar(mut self) -> Self {
        self.cookie_jar = Some(Arc::new(Jar::default()));
        self
    }
}
