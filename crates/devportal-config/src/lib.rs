//! Shared configuration for devportal tools.
//!
//! TOML profiles (one per device), credential resolution (env + keyring +
//! plaintext), and translation into a `devportal_api::ConnectionContext`
//! plus `TransportConfig`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use devportal_api::{
    ConnectionContext, Credentials, PinnedCertificates, Platform, TransportConfig, TrustMode,
};

/// Keyring service name; entries are keyed `<profile>/password`.
pub const KEYRING_SERVICE: &str = "devportal";

/// Environment variable consulted for the password when a profile has no
/// `password_env` of its own.
pub const PASSWORD_ENV: &str = "DEVPORTAL_PASSWORD";

/// Environment variable consulted for the username when a profile has none.
pub const USERNAME_ENV: &str = "DEVPORTAL_USERNAME";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found in config")]
    UnknownProfile { name: String },

    #[error("no password configured for profile '{profile}'")]
    NoCredentials { profile: String },

    #[error("failed to load certificate {path}: {source}")]
    Certificate {
        path: PathBuf,
        source: devportal_api::Error,
    },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Look up a profile by name, falling back to `default_profile`.
    pub fn profile(&self, name: Option<&str>) -> Result<(String, &Profile), ConfigError> {
        let name = name
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into());

        self.profiles
            .get(&name)
            .map(|p| (name.clone(), p))
            .ok_or(ConfigError::UnknownProfile { name })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Defaults {
    /// Certificate trust applied when a profile doesn't set its own.
    #[serde(default)]
    pub trust: TrustSetting,

    /// Whole-request timeout in seconds. Unset means no timeout.
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// How the device's TLS certificate is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TrustSetting {
    /// Platform root store (plus `ca_cert` when given).
    #[default]
    System,
    /// Accept whatever certificate the device presents.
    AcceptAny,
    /// Accept only the certificate(s) in `pinned_cert`.
    Pinned,
}

/// A named device profile.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Portal base URL (e.g., "https://192.168.1.42").
    pub address: String,

    /// Username for basic auth.
    pub username: Option<String>,

    /// Password (plaintext; prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable name containing the password.
    pub password_env: Option<String>,

    /// Override the default trust setting.
    pub trust: Option<TrustSetting>,

    /// PEM file with the device certificate(s) for `trust = "pinned"`.
    pub pinned_cert: Option<PathBuf>,

    /// Path to a custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Host can only upload from managed file handles, not raw paths.
    #[serde(default)]
    pub sandboxed: bool,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "devportal", "devportal").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("devportal");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from `path` + environment.
///
/// Environment overrides use the `DEVPORTAL_` prefix with `__` between
/// nesting levels (`DEVPORTAL_DEFAULTS__TIMEOUT=60`).
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("DEVPORTAL_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve the password from the credential chain.
pub fn resolve_password(profile: &Profile, profile_name: &str) -> Result<SecretString, ConfigError> {
    // 1. Profile's password_env, then the global env var
    let env_names = profile.password_env.as_deref().into_iter().chain([PASSWORD_ENV]);
    for env_name in env_names {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/password")) {
        if let Ok(pw) = entry.get_password() {
            return Ok(SecretString::from(pw));
        }
    }

    // 3. Plaintext in config
    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Resolve basic-auth credentials. A profile without a username talks to
/// the portal unauthenticated.
pub fn resolve_credentials(
    profile: &Profile,
    profile_name: &str,
) -> Result<Option<Credentials>, ConfigError> {
    let Some(username) = profile
        .username
        .clone()
        .or_else(|| std::env::var(USERNAME_ENV).ok())
    else {
        return Ok(None);
    };

    let password = resolve_password(profile, profile_name)?;
    Ok(Some(Credentials::new(username, password)))
}

/// Translate the profile's trust fields into a `TrustMode`.
pub fn resolve_trust(profile: &Profile, defaults: &Defaults) -> Result<TrustMode, ConfigError> {
    match profile.trust.unwrap_or(defaults.trust) {
        TrustSetting::AcceptAny => Ok(TrustMode::DangerAcceptInvalid),
        TrustSetting::Pinned => {
            let path = profile
                .pinned_cert
                .as_ref()
                .ok_or_else(|| ConfigError::Validation {
                    field: "pinned_cert".into(),
                    reason: "required when trust = \"pinned\"".into(),
                })?;
            let pinned = PinnedCertificates::from_pem_file(path).map_err(|source| {
                ConfigError::Certificate {
                    path: path.clone(),
                    source,
                }
            })?;
            Ok(TrustMode::policy(pinned))
        }
        TrustSetting::System => Ok(profile
            .ca_cert
            .clone()
            .map_or(TrustMode::System, TrustMode::CustomCa)),
    }
}

/// Build the connection context and transport settings for a profile.
pub fn profile_to_connection(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<(ConnectionContext, TransportConfig), ConfigError> {
    let url: url::Url = profile
        .address
        .parse()
        .map_err(|_| ConfigError::Validation {
            field: "address".into(),
            reason: format!("invalid URL: {}", profile.address),
        })?;

    let platform = if profile.sandboxed {
        Platform::Sandboxed
    } else {
        Platform::Desktop
    };

    let mut context = ConnectionContext::new(url)
        .with_trust(resolve_trust(profile, defaults)?)
        .with_platform(platform);
    if let Some(credentials) = resolve_credentials(profile, profile_name)? {
        context = context.with_credentials(credentials);
    }

    let mut transport = TransportConfig::default().with_cookie_jar();
    if let Some(secs) = profile.timeout.or(defaults.timeout) {
        transport = transport.with_timeout(Duration::from_secs(secs));
    }

    Ok((context, transport))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SAMPLE: &str = r#"
default_profile = "lab"

[defaults]
trust = "accept-any"
timeout = 45

[profiles.lab]
address = "https://192.168.1.42"
username = "admin"
password = "plain"
password_env = "DEVPORTAL_TEST_UNSET_PASSWORD_VAR"

[profiles.bench]
address = "http://127.0.0.1:10080"
trust = "system"
timeout = 5
sandboxed = true
"#;

    fn write_sample() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_profiles_from_toml() {
        let (_dir, path) = write_sample();
        let config = load_config_from(&path).unwrap();

        assert_eq!(config.default_profile.as_deref(), Some("lab"));
        assert_eq!(config.defaults.trust, TrustSetting::AcceptAny);
        assert_eq!(config.defaults.timeout, Some(45));
        assert_eq!(config.profiles.len(), 2);
        assert!(config.profiles["bench"].sandboxed);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();

        assert_eq!(config.default_profile.as_deref(), Some("default"));
        assert!(config.profiles.is_empty());
        assert_eq!(config.defaults.trust, TrustSetting::System);
    }

    #[test]
    fn profile_lookup_uses_default_name() {
        let (_dir, path) = write_sample();
        let config = load_config_from(&path).unwrap();

        let (name, profile) = config.profile(None).unwrap();
        assert_eq!(name, "lab");
        assert_eq!(profile.address, "https://192.168.1.42");

        assert!(matches!(
            config.profile(Some("nope")),
            Err(ConfigError::UnknownProfile { .. })
        ));
    }

    #[test]
    fn pinned_profile_parses_certificate_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[profiles.default]\naddress = \"https://10.0.0.9\"\ntrust = \"pinned\"\npinned_cert = \"/etc/devportal/device.pem\"\n",
        )
        .unwrap();

        let loaded = load_config_from(&path).unwrap();
        let profile = &loaded.profiles["default"];
        assert_eq!(profile.trust, Some(TrustSetting::Pinned));
        assert_eq!(
            profile.pinned_cert.as_deref(),
            Some(Path::new("/etc/devportal/device.pem"))
        );
    }

    #[test]
    fn trust_resolution() {
        let defaults = Defaults::default();

        let profile = Profile::default();
        assert!(matches!(
            resolve_trust(&profile, &defaults).unwrap(),
            TrustMode::System
        ));

        let profile = Profile {
            ca_cert: Some(PathBuf::from("/tmp/ca.pem")),
            ..Profile::default()
        };
        assert!(matches!(
            resolve_trust(&profile, &defaults).unwrap(),
            TrustMode::CustomCa(_)
        ));

        let profile = Profile {
            trust: Some(TrustSetting::AcceptAny),
            ..Profile::default()
        };
        assert!(matches!(
            resolve_trust(&profile, &defaults).unwrap(),
            TrustMode::DangerAcceptInvalid
        ));
    }

    #[test]
    fn pinned_trust_requires_certificate() {
        let profile = Profile {
            trust: Some(TrustSetting::Pinned),
            ..Profile::default()
        };
        let result = resolve_trust(&profile, &Defaults::default());
        assert!(matches!(result, Err(ConfigError::Validation { .. })));

        let profile = Profile {
            trust: Some(TrustSetting::Pinned),
            pinned_cert: Some(PathBuf::from("/nonexistent/device.pem")),
            ..Profile::default()
        };
        let result = resolve_trust(&profile, &Defaults::default());
        assert!(matches!(result, Err(ConfigError::Certificate { .. })));
    }

    #[test]
    fn profile_builds_connection() {
        let (_dir, path) = write_sample();
        let config = load_config_from(&path).unwrap();

        let (context, transport) =
            profile_to_connection(&config.profiles["bench"], "bench", &config.defaults).unwrap();
        assert_eq!(context.base_url().as_str(), "http://127.0.0.1:10080/");
        assert_eq!(context.platform(), Platform::Sandboxed);
        assert!(matches!(context.trust(), TrustMode::System));
        assert_eq!(transport.timeout, Some(Duration::from_secs(5)));
        assert!(transport.cookie_jar.is_some());
    }

    #[test]
    fn plaintext_password_is_last_resort() {
        let (_dir, path) = write_sample();
        let config = load_config_from(&path).unwrap();
        let profile = &config.profiles["lab"];

        let credentials = resolve_credentials(profile, "devportal-test-lab")
            .unwrap()
            .unwrap();
        assert_eq!(credentials.username, "admin");
    }

    #[test]
    fn invalid_address_is_validation_error() {
        let profile = Profile {
            address: "not a url".into(),
            ..Profile::default()
        };
        let result = profile_to_connection(&profile, "x", &Defaults::default());
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }
}
