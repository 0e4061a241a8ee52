use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::config::env_vars::{expand_env_vars, expand_optional};
use crate::constants::{
    DEFAULT_CONNECTION_TIMEOUT_SECS, S3_DEFAULT_ENDPOINT_SCHEME, S3_DEFAULT_REGION,
};
use crate::models::{ClientIdentity, Credentials, TlsMode, TlsSettings};

/// Adapter-wide settings, usually loaded from YAML.
///
/// ```yaml
/// staging_dir: /var/tmp/una
/// default_timeout_secs: 15
/// object_storage:
///   region: eu-west-1
///   endpoint_scheme: https
/// profiles:
///   backup:
///     user: deploy
///     private_key_path: ${HOME}/.ssh/id_rsa
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Where downloads are staged; the system temp directory when unset.
    pub staging_dir: Option<PathBuf>,
    pub default_timeout_secs: u64,
    pub object_storage: ObjectStorageConfig,
    pub profiles: BTreeMap<String, CredentialProfile>,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            staging_dir: None,
            default_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            object_storage: ObjectStorageConfig::default(),
            profiles: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStorageConfig {
    pub region: String,
    /// Scheme used to reach the endpoint named by the destination host.
    pub endpoint_scheme: String,
}

impl Default for ObjectStorageConfig {
    fn default() -> Self {
        Self {
            region: S3_DEFAULT_REGION.to_string(),
            endpoint_scheme: S3_DEFAULT_ENDPOINT_SCHEME.to_string(),
        }
    }
}

/// Named credential set. Secrets referenced by path are read when the
/// profile is turned into [`Credentials`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialProfile {
    pub user: String,
    pub password: Option<String>,
    /// PEM RSA private key for SFTP.
    pub private_key_path: Option<String>,
    pub private_key_passphrase: Option<String>,
    /// PKCS#12 client identity for HTTPS and FTPS.
    pub tls_identity_path: Option<String>,
    pub tls_identity_password: Option<String>,
    /// Extra PEM root certificate.
    pub tls_ca_path: Option<String>,
    pub tls_accept_invalid_certs: bool,
    pub tls_mode: TlsMode,
}

impl CredentialProfile {
    fn uses_tls(&self) -> bool {
        self.tls_identity_path.is_some() || self.tls_ca_path.is_some() || self.tls_accept_invalid_certs
    }

    pub fn to_credentials(&self) -> Result<Credentials> {
        let mut credentials = Credentials {
            user: self.user.clone(),
            password: self.password.clone(),
            tls_mode: self.tls_mode,
            ..Default::default()
        };

        if let Some(path) = &self.private_key_path {
            let key = fs::read_to_string(path)
                .context(format!("Failed to read private key: {}", path))?;
            credentials = credentials.with_private_key(key, self.private_key_passphrase.clone());
        }

        if self.uses_tls() {
            let identity = match &self.tls_identity_path {
                Some(path) => Some(ClientIdentity::Pkcs12 {
                    der: fs::read(path)
                        .context(format!("Failed to read TLS identity: {}", path))?,
                    password: self.tls_identity_password.clone().unwrap_or_default(),
                }),
                None => None,
            };

            let root_certificate_pem = match &self.tls_ca_path {
                Some(path) => Some(
                    fs::read(path).context(format!("Failed to read CA certificate: {}", path))?,
                ),
                None => None,
            };

            credentials.tls = Some(TlsSettings {
                identity,
                root_certificate_pem,
                accept_invalid_certs: self.tls_accept_invalid_certs,
            });
        }

        Ok(credentials)
    }

    fn process_environment_variables(&mut self) {
        self.user = expand_env_vars(&self.user);
        expand_optional(&mut self.password);
        expand_optional(&mut self.private_key_path);
        expand_optional(&mut self.private_key_passphrase);
        expand_optional(&mut self.tls_identity_path);
        expand_optional(&mut self.tls_identity_password);
        expand_optional(&mut self.tls_ca_path);
    }
}

impl AdapterConfig {
    /// Load configuration from a YAML file, expanding environment variables.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let mut config: AdapterConfig =
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
        config.process_environment_variables();

        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn process_environment_variables(&mut self) {
        if let Some(dir) = &self.staging_dir {
            self.staging_dir = Some(PathBuf::from(expand_env_vars(&dir.to_string_lossy())));
        }
        for profile in self.profiles.values_mut() {
            profile.process_environment_variables();
        }
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn profile(&self, name: &str) -> Result<&CredentialProfile> {
        self.profiles.get(name).ok_or_else(|| {
            anyhow!(
                "Unknown credential profile '{}' (known: {})",
                name,
                self.profiles.keys().cloned().collect::<Vec<_>>().join(", ")
            )
        })
    }
}

/// Load the configuration at `path`, or the defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<AdapterConfig> {
    match path {
        Some(path) => AdapterConfig::from_yaml_file(path),
        None => Ok(AdapterConfig::default()),
    }
}
