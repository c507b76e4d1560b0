use secrecy::SecretString;

use crate::source::SourceKind;

/// Transport-level credentials for the portal (HTTP basic auth).
///
/// Kept separate from the anti-forgery token: credentials authenticate the
/// caller, the token proves a mutating request belongs to the session.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<SecretString>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// The runtime the client is hosted in.
///
/// Decides which [`SourceKind`]s an upload may use. Chosen once when the
/// [`ConnectionContext`](crate::ConnectionContext) is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Platform {
    /// Full filesystem access: raw paths and managed handles both work.
    #[default]
    Desktop,
    /// App-container runtime without raw path access. Only files handed
    /// over as managed handles (or in-memory buffers) can be uploaded.
    Sandboxed,
}

impl Platform {
    /// Whether an upload source of the given kind can be streamed here.
    pub fn accepts(self, kind: SourceKind) -> bool {
        match self {
            Self::Desktop => true,
            Self::Sandboxed => kind != SourceKind::RawPath,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sandboxed_rejects_raw_paths_only() {
        assert!(!Platform::Sandboxed.accepts(SourceKind::RawPath));
        assert!(Platform::Sandboxed.accepts(SourceKind::ManagedHandle));
        assert!(Platform::Sandboxed.accepts(SourceKind::Memory));
    }

    #[test]
    fn desktop_accepts_everything() {
        for kind in [SourceKind::RawPath, SourceKind::ManagedHandle, SourceKind::Memory] {
            assert!(Platform::Desktop.accepts(kind));
        }
    }
}
