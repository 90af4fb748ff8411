//! forge::factory
//!
//! Backend selection and service construction.
//!
//! # Provider Detection
//!
//! A URL is mapped to a backend by looking for a known key in its hostname.
//! The default mapping is:
//! - `github.com` → GitHub
//! - `gitlab` → GitLab (matches gitlab.com, gitlab.gnome.org, ...)
//!
//! Callers can add keys for self-hosted instances or override the defaults
//! with a mapping update.
//!
//! # Example
//!
//! ```ignore
//! use forgework::forge::{get_project, ForgeProvider};
//!
//! let project = get_project(
//!     "https://git.example.com/team/tool",
//!     &[("git.example.com", ForgeProvider::GitLab)],
//!     &[],
//! )
//! .await?;
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::github::GithubService;
use super::gitlab::GitlabService;
use super::parsing::parse_git_repo;
use super::traits::{ForgeError, GitProject, GitService};
use crate::config::ServiceEntry;

/// Supported forge backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForgeProvider {
    /// github.com and GitHub Enterprise
    GitHub,
    /// gitlab.com and self-hosted GitLab
    GitLab,
}

impl ForgeProvider {
    /// Every supported backend.
    ///
    /// ```
    /// use forgework::forge::ForgeProvider;
    ///
    /// assert!(ForgeProvider::all().contains(&ForgeProvider::GitLab));
    /// ```
    pub fn all() -> &'static [ForgeProvider] {
        &[ForgeProvider::GitHub, ForgeProvider::GitLab]
    }

    /// The name used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            ForgeProvider::GitHub => "github",
            ForgeProvider::GitLab => "gitlab",
        }
    }

    /// Parse a provider name, case-insensitively.
    ///
    /// ```
    /// use forgework::forge::ForgeProvider;
    ///
    /// assert_eq!(ForgeProvider::parse("GitLab"), Some(ForgeProvider::GitLab));
    /// assert_eq!(ForgeProvider::parse("pagure"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "github" => Some(ForgeProvider::GitHub),
            "gitlab" => Some(ForgeProvider::GitLab),
            _ => None,
        }
    }
}

impl std::fmt::Display for ForgeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ordered hostname-key → provider mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceMapping {
    entries: Vec<(String, ForgeProvider)>,
}

impl Default for ServiceMapping {
    fn default() -> Self {
        Self {
            entries: vec![
                ("github.com".to_string(), ForgeProvider::GitHub),
                ("gitlab".to_string(), ForgeProvider::GitLab),
            ],
        }
    }
}

impl ServiceMapping {
    /// The default mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `update`: existing keys change provider in place, new keys are
    /// appended.
    pub fn with_update(mut self, update: &[(&str, ForgeProvider)]) -> Self {
        for (key, provider) in update {
            self.insert(key, *provider);
        }
        self
    }

    /// Set the provider for `key`.
    pub fn insert(&mut self, key: &str, provider: ForgeProvider) {
        let key = key_hostname(key);
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = provider,
            None => self.entries.push((key, provider)),
        }
    }

    /// Provider of the first key contained in `hostname`.
    pub fn lookup(&self, hostname: &str) -> Option<ForgeProvider> {
        self.entries
            .iter()
            .find(|(key, _)| hostname.contains(key.as_str()))
            .map(|(_, provider)| *provider)
    }

    /// The mapping entries in match order.
    pub fn entries(&self) -> &[(String, ForgeProvider)] {
        &self.entries
    }
}

/// Host part of a mapping key; keys may be written as URLs.
fn key_hostname(key: &str) -> String {
    match url::Url::parse(key) {
        Ok(url) if key.contains("://") => url
            .host_str()
            .map(str::to_string)
            .unwrap_or_else(|| key.to_string()),
        _ => key.trim_end_matches('/').to_string(),
    }
}

/// The backend serving `url`.
///
/// # Errors
///
/// - `InvalidUrl` if `url` cannot be parsed
/// - `NoMatchingService` if no mapping key matches the hostname
///
/// # Example
///
/// ```
/// use forgework::forge::{get_service_provider, ForgeProvider};
///
/// assert_eq!(
///     get_service_provider("https://gitlab.gnome.org/GNOME/gtk", &[]).unwrap(),
///     ForgeProvider::GitLab
/// );
/// assert_eq!(
///     get_service_provider("https://src.example.org/a/b", &[("src.example.org", ForgeProvider::GitHub)])
///         .unwrap(),
///     ForgeProvider::GitHub
/// );
/// ```
pub fn get_service_provider(
    url: &str,
    mapping_update: &[(&str, ForgeProvider)],
) -> Result<ForgeProvider, ForgeError> {
    let parsed = parse_git_repo(url).ok_or_else(|| ForgeError::InvalidUrl(url.to_string()))?;
    ServiceMapping::new()
        .with_update(mapping_update)
        .lookup(&parsed.hostname)
        .ok_or_else(|| ForgeError::NoMatchingService("No matching service was found.".into()))
}

/// A service with default settings for `instance_url`.
pub fn service_for_instance(
    provider: ForgeProvider,
    instance_url: &str,
    token: Option<String>,
) -> Arc<dyn GitService> {
    match provider {
        ForgeProvider::GitHub => {
            Arc::new(GithubService::new(token).with_instance_url(instance_url))
        }
        ForgeProvider::GitLab => {
            Arc::new(GitlabService::new(token).with_instance_url(instance_url))
        }
    }
}

/// The project `url` points at.
///
/// The hostnames of `custom_instances` are added to the mapping, so a
/// self-hosted instance is recognized whatever its name. `mapping_update`
/// is applied after them and wins. With `custom_instances`, the first
/// instance of the right backend whose hostname matches the URL serves the
/// project. Without them a default anonymous service for the URL's instance
/// is created.
///
/// # Errors
///
/// - `NoMatchingService` if no backend or no custom instance matches
/// - `InvalidUrl` if the URL has no namespace
pub async fn get_project(
    url: &str,
    mapping_update: &[(&str, ForgeProvider)],
    custom_instances: &[Arc<dyn GitService>],
) -> Result<Box<dyn GitProject>, ForgeError> {
    let instance_hosts: Vec<(String, ForgeProvider)> = custom_instances
        .iter()
        .filter_map(|s| s.hostname().map(|host| (host, s.provider())))
        .collect();
    let mut update: Vec<(&str, ForgeProvider)> = instance_hosts
        .iter()
        .map(|(host, provider)| (host.as_str(), *provider))
        .collect();
    update.extend_from_slice(mapping_update);

    let provider = get_service_provider(url, &update)?;
    let parsed = parse_git_repo(url).ok_or_else(|| ForgeError::InvalidUrl(url.to_string()))?;

    let service = if custom_instances.is_empty() {
        debug!(%provider, instance = %parsed.instance_url(), "using default service");
        service_for_instance(provider, &parsed.instance_url(), None)
    } else {
        custom_instances
            .iter()
            .find(|s| {
                s.provider() == provider
                    && s.hostname().as_deref() == Some(parsed.hostname.as_str())
            })
            .cloned()
            .ok_or_else(|| {
                ForgeError::NoMatchingService(format!(
                    "Instance of type {} matching instance url '{}' was not provided.",
                    provider, url
                ))
            })?
    };

    service.get_project_from_url(url).await
}

/// Build one service per configuration entry, in key order.
///
/// An entry with a `type` uses that backend and its key as the default
/// instance URL. An entry without one is matched by key against the default
/// mapping.
///
/// # Errors
///
/// `NoMatchingService` if a type is unknown or a key matches no backend.
pub fn services_from_config(
    entries: &BTreeMap<String, ServiceEntry>,
) -> Result<Vec<Arc<dyn GitService>>, ForgeError> {
    let mapping = ServiceMapping::new();
    let mut services = Vec::with_capacity(entries.len());

    for (key, entry) in entries {
        let provider = match entry.kind.as_deref() {
            Some(kind) => ForgeProvider::parse(kind).ok_or_else(|| {
                ForgeError::NoMatchingService(format!(
                    "No matching service was found for type '{}'.",
                    kind
                ))
            })?,
            None => mapping.lookup(&key_hostname(key)).ok_or_else(|| {
                ForgeError::NoMatchingService(format!(
                    "No matching service was found for url '{}'.",
                    key
                ))
            })?,
        };

        let instance_url = entry
            .instance_url
            .clone()
            .unwrap_or_else(|| key_instance_url(key));
        debug!(%key, %provider, %instance_url, "configuring service");
        services.push(build_service(provider, &instance_url, entry));
    }

    Ok(services)
}

/// `https://{key}` unless the key already carries a scheme.
fn key_instance_url(key: &str) -> String {
    let key = key.trim_end_matches('/');
    if key.contains("://") {
        key.to_string()
    } else {
        format!("https://{}", key)
    }
}

fn build_service(
    provider: ForgeProvider,
    instance_url: &str,
    entry: &ServiceEntry,
) -> Arc<dyn GitService> {
    match provider {
        ForgeProvider::GitHub => {
            let mut service = GithubService::new(entry.token.clone())
                .with_instance_url(instance_url)
                .read_only(entry.read_only);
            if let Some(api_base) = &entry.api_base {
                service = service.with_api_base(api_base);
            }
            if let Some(app_id) = &entry.github_app_id {
                service = service.with_github_app(
                    app_id,
                    entry.github_app_private_key.clone(),
                    entry.github_app_private_key_path.clone(),
                );
            }
            Arc::new(service)
        }
        ForgeProvider::GitLab => {
            let mut service = GitlabService::new(entry.token.clone())
                .with_instance_url(instance_url)
                .read_only(entry.read_only)
                .ssl_verify(entry.ssl_verify);
            if let Some(api_base) = &entry.api_base {
                service = service.with_api_base(api_base);
            }
            Arc::new(service)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod forge_provider {
        use super::*;

        #[test]
        fn all_includes_both() {
            let all = ForgeProvider::all();
            assert!(all.contains(&ForgeProvider::GitHub));
            assert!(all.contains(&ForgeProvider::GitLab));
        }

        #[test]
        fn parse_is_case_insensitive() {
            assert_eq!(ForgeProvider::parse("github"), Some(ForgeProvider::GitHub));
            assert_eq!(ForgeProvider::parse("GITLAB"), Some(ForgeProvider::GitLab));
        }

        #[test]
        fn parse_unknown() {
            assert_eq!(ForgeProvider::parse("pagure"), None);
            assert_eq!(ForgeProvider::parse(""), None);
        }

        #[test]
        fn display() {
            assert_eq!(format!("{}", ForgeProvider::GitHub), "github");
            assert_eq!(format!("{}", ForgeProvider::GitLab), "gitlab");
        }
    }

    mod service_mapping {
        use super::*;

        #[test]
        fn defaults() {
            let mapping = ServiceMapping::new();
            assert_eq!(mapping.lookup("github.com"), Some(ForgeProvider::GitHub));
            assert_eq!(mapping.lookup("gitlab.com"), Some(ForgeProvider::GitLab));
            assert_eq!(mapping.lookup("gitlab.gnome.org"), Some(ForgeProvider::GitLab));
            assert_eq!(mapping.lookup("pagure.io"), None);
        }

        #[test]
        fn update_overrides_in_place() {
            let mapping = ServiceMapping::new().with_update(&[("gitlab", ForgeProvider::GitHub)]);
            assert_eq!(mapping.entries().len(), 2);
            assert_eq!(mapping.lookup("gitlab.com"), Some(ForgeProvider::GitHub));
        }

        #[test]
        fn update_appends_new_keys() {
            let mapping =
                ServiceMapping::new().with_update(&[("https://git.example.com/", ForgeProvider::GitLab)]);
            assert_eq!(mapping.entries().len(), 3);
            assert_eq!(mapping.entries()[2].0, "git.example.com");
            assert_eq!(mapping.lookup("git.example.com"), Some(ForgeProvider::GitLab));
        }
    }

    mod get_service_provider {
        use super::*;

        #[test]
        fn github_urls() {
            for url in [
                "https://github.com/packit/ogr",
                "git@github.com:packit/ogr.git",
                "github.com/packit/ogr",
            ] {
                assert_eq!(get_service_provider(url, &[]).unwrap(), ForgeProvider::GitHub);
            }
        }

        #[test]
        fn gitlab_urls() {
            assert_eq!(
                get_service_provider("https://gitlab.com/a/b", &[]).unwrap(),
                ForgeProvider::GitLab
            );
            assert_eq!(
                get_service_provider("git@gitlab.gnome.org:GNOME/gtk.git", &[]).unwrap(),
                ForgeProvider::GitLab
            );
        }

        #[test]
        fn unknown_host() {
            let err = get_service_provider("https://pagure.io/ogr/ogr", &[]).unwrap_err();
            assert_eq!(err.to_string(), "No matching service was found.");
        }

        #[test]
        fn mapping_update_adds_host() {
            assert_eq!(
                get_service_provider(
                    "https://pagure.io/ogr/ogr",
                    &[("pagure.io", ForgeProvider::GitLab)]
                )
                .unwrap(),
                ForgeProvider::GitLab
            );
        }

        #[test]
        fn unparseable_url() {
            assert!(matches!(
                get_service_provider("", &[]),
                Err(ForgeError::InvalidUrl(_))
            ));
        }
    }

    mod get_project {
        use super::*;

        #[tokio::test]
        async fn default_service_for_url() {
            let project = get_project("https://github.com/packit/ogr", &[], &[])
                .await
                .unwrap();
            assert_eq!(project.service_name(), "github");
            assert_eq!(project.full_repo_name(), "packit/ogr");
        }

        #[tokio::test]
        async fn nested_gitlab_namespace() {
            let project = get_project("https://gitlab.com/a/b/c/project.git", &[], &[])
                .await
                .unwrap();
            assert_eq!(project.service_name(), "gitlab");
            assert_eq!(project.namespace(), "a/b/c");
            assert_eq!(project.repo(), "project");
        }

        #[tokio::test]
        async fn custom_instance_is_used() {
            let instance: Arc<dyn GitService> = Arc::new(
                GitlabService::new(Some("token".into()))
                    .with_instance_url("https://gitlab.example.com"),
            );
            let project = get_project(
                "https://gitlab.example.com/team/tool",
                &[],
                &[instance],
            )
            .await
            .unwrap();
            assert_eq!(project.service_name(), "gitlab");
            assert_eq!(project.full_repo_name(), "team/tool");
        }

        #[tokio::test]
        async fn self_hosted_instance_without_known_name() {
            let gitlab: Arc<dyn GitService> = Arc::new(
                GitlabService::new(None).with_instance_url("https://git.example.com"),
            );
            let enterprise: Arc<dyn GitService> =
                Arc::new(GithubService::new(None).with_instance_url("https://ghe.corp.com"));
            let instances = [gitlab, enterprise];

            let project = get_project("https://git.example.com/team/tool", &[], &instances)
                .await
                .unwrap();
            assert_eq!(project.service_name(), "gitlab");

            let project = get_project("git@ghe.corp.com:org/app.git", &[], &instances)
                .await
                .unwrap();
            assert_eq!(project.service_name(), "github");
            assert_eq!(project.full_repo_name(), "org/app");
        }

        #[tokio::test]
        async fn mapping_update_beats_instance_hosts() {
            let instance: Arc<dyn GitService> = Arc::new(
                GitlabService::new(None).with_instance_url("https://git.example.com"),
            );
            let err = get_project(
                "https://git.example.com/team/tool",
                &[("git.example.com", ForgeProvider::GitHub)],
                &[instance],
            )
            .await
            .unwrap_err();
            assert!(err.to_string().starts_with("Instance of type github"));
        }

        #[test]
        fn plain_http_github_com_uses_public_api() {
            let service = service_for_instance(ForgeProvider::GitHub, "http://github.com", None);
            assert_eq!(service.instance_url(), "https://github.com");
        }

        #[tokio::test]
        async fn missing_custom_instance() {
            let instance: Arc<dyn GitService> = Arc::new(GithubService::new(None));
            let err = get_project("https://gitlab.com/a/b", &[], &[instance])
                .await
                .unwrap_err();
            assert_eq!(
                err.to_string(),
                "Instance of type gitlab matching instance url 'https://gitlab.com/a/b' was not provided."
            );
        }

        #[tokio::test]
        async fn url_without_namespace() {
            let result = get_project("https://github.com/ogr", &[], &[]).await;
            assert!(matches!(result, Err(ForgeError::InvalidUrl(_))));
        }
    }

    mod services_from_config {
        use super::*;

        fn entry(kind: Option<&str>) -> ServiceEntry {
            ServiceEntry {
                kind: kind.map(str::to_string),
                token: Some("abc".into()),
                ..ServiceEntry::default()
            }
        }

        #[test]
        fn key_matched_against_mapping() {
            let mut entries = BTreeMap::new();
            entries.insert("github.com".to_string(), entry(None));
            entries.insert("gitlab.gnome.org".to_string(), entry(None));

            let services = services_from_config(&entries).unwrap();
            assert_eq!(services.len(), 2);
            assert_eq!(services[0].name(), "github");
            assert_eq!(services[0].instance_url(), "https://github.com");
            assert_eq!(services[1].name(), "gitlab");
            assert_eq!(services[1].instance_url(), "https://gitlab.gnome.org");
        }

        #[test]
        fn explicit_type_uses_key_as_instance_url() {
            let mut entries = BTreeMap::new();
            entries.insert("https://git.example.com".to_string(), entry(Some("gitlab")));

            let services = services_from_config(&entries).unwrap();
            assert_eq!(services[0].provider(), ForgeProvider::GitLab);
            assert_eq!(services[0].instance_url(), "https://git.example.com");
        }

        #[test]
        fn explicit_instance_url_wins() {
            let mut entries = BTreeMap::new();
            entries.insert(
                "work".to_string(),
                ServiceEntry {
                    instance_url: Some("https://ghe.example.com".into()),
                    ..entry(Some("github"))
                },
            );

            let services = services_from_config(&entries).unwrap();
            assert_eq!(services[0].instance_url(), "https://ghe.example.com");
        }

        #[test]
        fn unknown_type() {
            let mut entries = BTreeMap::new();
            entries.insert("https://pagure.io".to_string(), entry(Some("pagure")));

            let err = services_from_config(&entries).err().unwrap();
            assert_eq!(
                err.to_string(),
                "No matching service was found for type 'pagure'."
            );
        }

        #[test]
        fn unknown_url() {
            let mut entries = BTreeMap::new();
            entries.insert("pagure.io".to_string(), entry(None));

            let err = services_from_config(&entries).err().unwrap();
            assert_eq!(
                err.to_string(),
                "No matching service was found for url 'pagure.io'."
            );
        }

        #[test]
        fn read_only_flag_carried() {
            let mut entries = BTreeMap::new();
            entries.insert(
                "github.com".to_string(),
                ServiceEntry {
                    read_only: true,
                    ..entry(None)
                },
            );
            let services = services_from_config(&entries).unwrap();
            assert!(services[0].is_read_only());
        }
    }
}
