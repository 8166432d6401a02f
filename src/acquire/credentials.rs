//! Kaggle API credential resolution.
//!
//! Sources are tried in a fixed order: an explicit `kaggle.json`, the
//! `KAGGLE_USERNAME`/`KAGGLE_KEY` pair, the Kaggle config directory, and the OS
//! keyring. The API key is never logged.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::app_dirs;

pub const KAGGLE_USERNAME_ENV: &str = "KAGGLE_USERNAME";
pub const KAGGLE_KEY_ENV: &str = "KAGGLE_KEY";
pub const KAGGLE_CONFIG_DIR_ENV: &str = "KAGGLE_CONFIG_DIR";
pub const DISABLE_KEYRING_ENV: &str = "ASL_DISABLE_KEYRING";
pub const CREDENTIALS_FILE_NAME: &str = "kaggle.json";

const KEYRING_SERVICE: &str = "asl_classifier";
const KEYRING_KEY: &str = "asl_classifier_kaggle_credentials";

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error(
        "No Kaggle credentials found: pass a kaggle.json file, set {KAGGLE_USERNAME_ENV} and \
         {KAGGLE_KEY_ENV}, or place kaggle.json in {searched}"
    )]
    Missing { searched: PathBuf },
    #[error("Failed to read credentials from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Malformed credentials from {origin}: {reason}")]
    Malformed { origin: String, reason: String },
    #[error("Failed to install credentials to {path}: {source}")]
    Install {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Keyring unavailable: {0}")]
    Keyring(String),
    #[error("Dataset host rejected the credentials (HTTP {status})")]
    Rejected { status: u16 },
}

/// A Kaggle username and API key, in the shape of `kaggle.json`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KaggleCredentials {
    pub username: String,
    pub key: String,
}

impl fmt::Debug for KaggleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KaggleCredentials")
            .field("username", &self.username)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl KaggleCredentials {
    pub fn new(username: impl Into<String>, key: impl Into<String>) -> Result<Self, CredentialError> {
        let credentials = Self {
            username: username.into().trim().to_string(),
            key: key.into().trim().to_string(),
        };
        credentials.check("arguments")?;
        Ok(credentials)
    }

    fn from_json(bytes: &[u8], origin: &str) -> Result<Self, CredentialError> {
        let parsed: Self = serde_json::from_slice(bytes).map_err(|err| CredentialError::Malformed {
            origin: origin.to_string(),
            reason: err.to_string(),
        })?;
        Self::new(parsed.username, parsed.key).map_err(|_| CredentialError::Malformed {
            origin: origin.to_string(),
            reason: "username and key must be non-empty".into(),
        })
    }

    fn check(&self, origin: &str) -> Result<(), CredentialError> {
        if self.username.is_empty() || self.key.is_empty() {
            return Err(CredentialError::Malformed {
                origin: origin.to_string(),
                reason: "username and key must be non-empty".into(),
            });
        }
        Ok(())
    }

    /// Value for an HTTP `Authorization` header.
    pub fn basic_auth_header(&self) -> String {
        let raw = format!("{}:{}", self.username, self.key);
        format!(
            "Basic {}",
            base64::engine::general_purpose::STANDARD.encode(raw)
        )
    }
}

/// Where resolved credentials came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    ExplicitFile(PathBuf),
    Environment,
    ConfigFile(PathBuf),
    Keyring,
}

/// Resolves credentials from the configured sources.
#[derive(Debug, Clone)]
pub struct CredentialResolver {
    explicit_file: Option<PathBuf>,
    env_pair: Option<(String, String)>,
    config_dir: PathBuf,
    use_keyring: bool,
}

impl CredentialResolver {
    /// Resolver reading the process environment.
    pub fn from_env() -> Self {
        let username = std::env::var(KAGGLE_USERNAME_ENV).ok();
        let key = std::env::var(KAGGLE_KEY_ENV).ok();
        Self {
            explicit_file: None,
            env_pair: username.zip(key),
            config_dir: default_config_dir(),
            use_keyring: !keyring_disabled(),
        }
    }

    /// Resolver with no environment pair and no keyring, reading `config_dir`.
    pub fn isolated(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            explicit_file: None,
            env_pair: None,
            config_dir: config_dir.into(),
            use_keyring: false,
        }
    }

    pub fn with_explicit_file(mut self, path: Option<PathBuf>) -> Self {
        self.explicit_file = path;
        self
    }

    pub fn with_env_pair(mut self, username: &str, key: &str) -> Self {
        self.env_pair = Some((username.to_string(), key.to_string()));
        self
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CREDENTIALS_FILE_NAME)
    }

    pub fn resolve(&self) -> Result<(KaggleCredentials, CredentialSource), CredentialError> {
        if let Some(path) = &self.explicit_file {
            let credentials = read_credentials_file(path)?;
            self.install(&credentials)?;
            return Ok((credentials, CredentialSource::ExplicitFile(path.clone())));
        }
        if let Some((username, key)) = &self.env_pair
            && !username.trim().is_empty()
            && !key.trim().is_empty()
        {
            let credentials = KaggleCredentials::new(username.as_str(), key.as_str())?;
            return Ok((credentials, CredentialSource::Environment));
        }
        let config_file = self.config_file();
        if config_file.is_file() {
            let credentials = read_credentials_file(&config_file)?;
            restrict_permissions(&config_file);
            return Ok((credentials, CredentialSource::ConfigFile(config_file)));
        }
        if self.use_keyring
            && let Some(credentials) = keyring_get()?
        {
            return Ok((credentials, CredentialSource::Keyring));
        }
        Err(CredentialError::Missing {
            searched: config_file,
        })
    }

    /// Copy `credentials` into the Kaggle config directory, owner-readable only.
    pub fn install(&self, credentials: &KaggleCredentials) -> Result<PathBuf, CredentialError> {
        let path = self.config_file();
        fs::create_dir_all(&self.config_dir).map_err(|source| CredentialError::Install {
            path: self.config_dir.clone(),
            source,
        })?;
        let json = serde_json::to_vec(credentials).map_err(|err| CredentialError::Malformed {
            origin: "install".into(),
            reason: err.to_string(),
        })?;
        write_private_file(&path, &json).map_err(|source| CredentialError::Install {
            path: path.clone(),
            source,
        })?;
        info!("Installed Kaggle credentials to {}", path.display());
        Ok(path)
    }
}

/// Store credentials in the OS keyring for later runs.
pub fn remember_in_keyring(credentials: &KaggleCredentials) -> Result<(), CredentialError> {
    if keyring_disabled() {
        return Err(CredentialError::Keyring("keyring disabled".into()));
    }
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_KEY)
        .map_err(|err| CredentialError::Keyring(err.to_string()))?;
    let json = serde_json::to_string(credentials)
        .map_err(|err| CredentialError::Keyring(err.to_string()))?;
    entry
        .set_password(&json)
        .map_err(|err| CredentialError::Keyring(err.to_string()))
}

/// `$KAGGLE_CONFIG_DIR`, else `~/.kaggle`.
pub fn default_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(KAGGLE_CONFIG_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return PathBuf::from(dir);
    }
    app_dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".kaggle")
}

fn read_credentials_file(path: &Path) -> Result<KaggleCredentials, CredentialError> {
    let bytes = fs::read(path).map_err(|source| CredentialError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    KaggleCredentials::from_json(&bytes, &path.display().to_string())
}

fn keyring_get() -> Result<Option<KaggleCredentials>, CredentialError> {
    let entry = match keyring::Entry::new(KEYRING_SERVICE, KEYRING_KEY) {
        Ok(entry) => entry,
        Err(err) => {
            debug!("Keyring unavailable: {err}");
            return Ok(None);
        }
    };
    match entry.get_password() {
        Ok(json) => KaggleCredentials::from_json(json.as_bytes(), "keyring").map(Some),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(err) => {
            debug!("Keyring lookup failed: {err}");
            Ok(None)
        }
    }
}

fn keyring_disabled() -> bool {
    std::env::var(DISABLE_KEYRING_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn write_private_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    let mut file = fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    file.write_all(bytes)?;
    restrict_permissions(path);
    Ok(())
}

fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    #[cfg(not(unix))]
    let _ = path;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const JSON: &[u8] = br#"{"username":"signer","key":"0123abcd"}"#;

    #[test]
    fn explicit_file_wins_and_is_installed() {
        let temp = tempdir().unwrap();
        let explicit = temp.path().join("download.json");
        fs::write(&explicit, JSON).unwrap();
        let config_dir = temp.path().join(".kaggle");
        let resolver = CredentialResolver::isolated(&config_dir)
            .with_env_pair("env-user", "env-key")
            .with_explicit_file(Some(explicit.clone()));

        let (credentials, source) = resolver.resolve().unwrap();
        assert_eq!(credentials.username, "signer");
        assert_eq!(source, CredentialSource::ExplicitFile(explicit));
        let installed = config_dir.join(CREDENTIALS_FILE_NAME);
        assert!(installed.is_file());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&installed).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn environment_pair_precedes_config_file() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(CREDENTIALS_FILE_NAME), JSON).unwrap();
        let resolver = CredentialResolver::isolated(temp.path()).with_env_pair("env-user", "k");
        let (credentials, source) = resolver.resolve().unwrap();
        assert_eq!(credentials.username, "env-user");
        assert_eq!(source, CredentialSource::Environment);
    }

    #[test]
    fn falls_back_to_config_file() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(CREDENTIALS_FILE_NAME), JSON).unwrap();
        let resolver = CredentialResolver::isolated(temp.path()).with_env_pair("", "");
        let (credentials, source) = resolver.resolve().unwrap();
        assert_eq!(credentials.key, "0123abcd");
        assert!(matches!(source, CredentialSource::ConfigFile(_)));
    }

    #[test]
    fn missing_everywhere_is_an_error() {
        let temp = tempdir().unwrap();
        let err = CredentialResolver::isolated(temp.path()).resolve().unwrap_err();
        assert!(matches!(err, CredentialError::Missing { .. }));
    }

    #[test]
    fn malformed_file_is_reported() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join(CREDENTIALS_FILE_NAME), br#"{"username":"x"}"#).unwrap();
        let err = CredentialResolver::isolated(temp.path()).resolve().unwrap_err();
        assert!(matches!(err, CredentialError::Malformed { .. }));
    }

    #[test]
    fn debug_output_hides_key() {
        let credentials = KaggleCredentials::new("signer", "secret-key").unwrap();
        assert!(!format!("{credentials:?}").contains("secret-key"));
        assert_eq!(credentials.basic_auth_header(), "Basic c2lnbmVyOnNlY3JldC1rZXk=");
    }
}
