//! config::schema
//!
//! Configuration schema types.
//!
//! # Validation
//!
//! Values are validated after parsing: `type` must name a known backend and
//! `default_service` must refer to a configured service.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::forge::ForgeProvider;

/// The configuration file.
///
/// # Example
///
/// ```toml
/// default_service = "github.com"
///
/// [services."github.com"]
/// token = "ghp_..."
///
/// [services."https://gitlab.example.com"]
/// type = "gitlab"
/// token = "glpat-..."
/// ssl_verify = false
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ForgeworkConfig {
    /// Key of the service used when a command names none
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_service: Option<String>,

    /// Services by key (hostname or instance URL)
    pub services: BTreeMap<String, ServiceEntry>,
}

impl ForgeworkConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(default) = &self.default_service {
            if !self.services.contains_key(default) {
                return Err(ConfigError::InvalidValue(format!(
                    "default_service '{}' is not a configured service",
                    default
                )));
            }
        }

        for (key, entry) in &self.services {
            entry.validate(key)?;
        }

        Ok(())
    }
}

/// One configured service.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceEntry {
    /// Backend name ("github" or "gitlab"); inferred from the key when unset
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// API token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Web URL of the instance; defaults to the key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_url: Option<String>,

    /// Explicit API base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    /// Refuse write operations
    pub read_only: bool,

    /// Verify TLS certificates (GitLab)
    pub ssl_verify: bool,

    /// GitHub App id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_app_id: Option<String>,

    /// GitHub App private key (PEM)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_app_private_key: Option<String>,

    /// Path to the GitHub App private key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_app_private_key_path: Option<PathBuf>,
}

impl Default for ServiceEntry {
    fn default() -> Self {
        Self {
            kind: None,
            token: None,
            instance_url: None,
            api_base: None,
            read_only: false,
            ssl_verify: true,
            github_app_id: None,
            github_app_private_key: None,
            github_app_private_key_path: None,
        }
    }
}

// Custom Debug to avoid exposing secrets
impl fmt::Debug for ServiceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEntry")
            .field("kind", &self.kind)
            .field("has_token", &self.token.is_some())
            .field("instance_url", &self.instance_url)
            .field("api_base", &self.api_base)
            .field("read_only", &self.read_only)
            .field("ssl_verify", &self.ssl_verify)
            .field("github_app_id", &self.github_app_id)
            .field("has_private_key", &self.github_app_private_key.is_some())
            .field("github_app_private_key_path", &self.github_app_private_key_path)
            .finish()
    }
}

impl ServiceEntry {
    /// Validate the entry stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self, key: &str) -> Result<(), ConfigError> {
        if key.trim().is_empty() {
            return Err(ConfigError::InvalidValue("service key cannot be empty".into()));
        }

        let provider = match &self.kind {
            Some(kind) => Some(ForgeProvider::parse(kind).ok_or_else(|| {
                let names: Vec<&str> = ForgeProvider::all().iter().map(|p| p.name()).collect();
                ConfigError::InvalidValue(format!(
                    "service '{}': invalid type '{}', must be one of: {}",
                    key,
                    kind,
                    names.join(", ")
                ))
            })?),
            None => None,
        };

        if matches!(&self.token, Some(t) if t.is_empty()) {
            return Err(ConfigError::InvalidValue(format!(
                "service '{}': token cannot be empty",
                key
            )));
        }

        if matches!(&self.instance_url, Some(u) if url::Url::parse(u).is_err()) {
            return Err(ConfigError::InvalidValue(format!(
                "service '{}': instance_url must be an absolute URL",
                key
            )));
        }

        let has_app_settings = self.github_app_private_key.is_some()
            || self.github_app_private_key_path.is_some();
        if provider == Some(ForgeProvider::GitLab) && (self.github_app_id.is_some() || has_app_settings)
        {
            return Err(ConfigError::InvalidValue(format!(
                "service '{}': github_app_* settings require a GitHub service",
                key
            )));
        }
        if has_app_settings && self.github_app_id.is_none() {
            return Err(ConfigError::InvalidValue(format!(
                "service '{}': github_app_private_key requires github_app_id",
                key
            )));
        }

        Ok(())
    }
}
