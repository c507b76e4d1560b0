// devportal-api: Async Rust client core for device-management portals
//
// Authenticated transport (credentials, certificate trust policy,
// anti-forgery token rotation), streamed multipart uploads, and typed
// failure mapping. Endpoint wrappers live with their callers.

pub mod auth;
pub mod client;
pub mod connection;
pub mod endpoint;
pub mod error;
pub mod multipart;
pub mod outcome;
pub mod source;
pub mod transport;
pub mod trust;

pub use auth::{Credentials, Platform};
pub use client::{PortalClient, RequestPhase};
pub use connection::{ConnectionContext, TokenStore};
pub use endpoint::{QueryString, build_endpoint, hex64_encode};
pub use error::Error;
pub use multipart::{MultipartEncoder, ProgressFn};
pub use outcome::Outcome;
pub use source::{FileItem, FileSource, HandleSource, MemorySource, PathSource, SourceKind};
pub use transport::TransportConfig;
pub use trust::{PeerCertificate, PinnedCertificates, TrustMode, TrustPolicy};
