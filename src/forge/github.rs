//! forge::github
//!
//! GitHub backend using the REST v3 API.
//!
//! # Design
//!
//! [`GithubService`] owns a shared [`GithubClient`]. Projects and users
//! created by the service hold a clone of it, so a later
//! [`GitService::change_token`] is seen by every object created before it.
//!
//! Pull request conversation comments are GitHub issue comments, so both
//! PR and issue comments come from `/issues/{n}/comments`.
//!
//! # Enterprise
//!
//! [`GithubService::with_instance_url`] points the service at a GitHub
//! Enterprise host; the API base becomes `{instance}/api/v3`.
//!
//! # Example
//!
//! ```ignore
//! use forgework::forge::github::GithubService;
//! use forgework::forge::GitService;
//!
//! let service = GithubService::new(Some("ghp_xxx".into()));
//! let project = service.get_project("packit", "ogr");
//! let info = project.get_pr_info(42).await?;
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::factory::ForgeProvider;
use super::traits::{
    Comment, CommentKind, ForgeError, GitProject, GitService, GitUser, PrStatus, PullRequestInfo,
};

/// Default GitHub API base URL.
const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Web URL of github.com.
const DEFAULT_INSTANCE_URL: &str = "https://github.com";

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "forgework";

/// Page size for list endpoints.
const PER_PAGE: usize = 100;

/// Whether `instance_url` points at github.com itself.
fn is_github_com(instance_url: &str) -> bool {
    url::Url::parse(instance_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.") == "github.com"))
        .unwrap_or(false)
}

/// Low-level REST client shared by a service and its projects.
pub struct GithubClient {
    /// HTTP client for making requests
    http: Client,
    /// API base URL (configurable for GitHub Enterprise and tests)
    api_base: String,
    /// Current token; `None` means anonymous access
    token: RwLock<Option<String>>,
}

// Custom Debug to avoid exposing the token
impl fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubClient")
            .field("api_base", &self.api_base)
            .field("has_token", &self.token().is_some())
            .finish()
    }
}

impl GithubClient {
    fn new(api_base: impl Into<String>, token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: RwLock::new(token),
        }
    }

    /// API base URL requests go to.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn token(&self) -> Option<String> {
        match self.token.read() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_token(&self, token: Option<String>) {
        match self.token.write() {
            Ok(mut current) => *current = token,
            Err(poisoned) => *poisoned.into_inner() = token,
        }
    }

    /// Build common headers for API requests.
    fn headers(&self) -> Result<HeaderMap, ForgeError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.token() {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ForgeError::AuthFailed("token contains invalid characters".into()))?;
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        Ok(headers)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ForgeError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self
            .http
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;
        handle_response(response).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ForgeError> {
        let url = self.url(path);
        debug!(%url, "POST");
        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;
        handle_response(response).await
    }

    /// Fetch every page of a list endpoint.
    async fn get_all_pages<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ForgeError> {
        let url = self.url(path);
        let per_page = PER_PAGE.to_string();
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            debug!(%url, page, "GET page");
            let response = self
                .http
                .get(&url)
                .headers(self.headers()?)
                .query(&[("per_page", per_page.as_str()), ("page", &page.to_string())])
                .send()
                .await
                .map_err(|e| ForgeError::NetworkError(e.to_string()))?;
            let batch: Vec<T> = handle_response(response).await?;
            let done = batch.len() < PER_PAGE;
            items.extend(batch);
            if done {
                return Ok(items);
            }
            page += 1;
        }
    }
}

/// Handle API response, mapping errors appropriately.
async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, ForgeError> {
    let status = response.status();

    if status.is_success() {
        response.json().await.map_err(|e| ForgeError::ApiError {
            status: status.as_u16(),
            message: format!("Failed to parse response: {}", e),
        })
    } else {
        Err(error_from_response(response, status).await)
    }
}

/// Map an error response from the API.
async fn error_from_response(response: Response, status: StatusCode) -> ForgeError {
    // GitHub Apps use X-Accepted-GitHub-Permissions, classic OAuth uses X-Accepted-OAuth-Scopes.
    let required = response
        .headers()
        .get("X-Accepted-GitHub-Permissions")
        .or_else(|| response.headers().get("X-Accepted-OAuth-Scopes"))
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let message = match response.json::<GitHubErrorResponse>().await {
        Ok(err) => err.message,
        Err(_) => "Unknown error".to_string(),
    };

    match status {
        StatusCode::UNAUTHORIZED => ForgeError::AuthFailed("Invalid or expired token".into()),
        StatusCode::FORBIDDEN => match required {
            Some(required) => {
                ForgeError::AuthFailed(format!("Permission denied: {} [required: {}]", message, required))
            }
            None => ForgeError::AuthFailed(format!("Permission denied: {}", message)),
        },
        StatusCode::NOT_FOUND => ForgeError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => ForgeError::RateLimited,
        _ if status.is_server_error() => ForgeError::ApiError {
            status: status.as_u16(),
            message: format!("GitHub server error: {}", message),
        },
        _ => ForgeError::ApiError {
            status: status.as_u16(),
            message,
        },
    }
}

// --------------------------------------------------------------------------
// Service
// --------------------------------------------------------------------------

/// Connection to github.com or a GitHub Enterprise instance.
#[derive(Clone)]
pub struct GithubService {
    client: Arc<GithubClient>,
    instance_url: String,
    read_only: bool,
    github_app_id: Option<String>,
    github_app_private_key: Option<String>,
    github_app_private_key_path: Option<PathBuf>,
}

impl GithubService {
    /// A github.com service. `None` means anonymous access.
    ///
    /// ```
    /// use forgework::forge::github::GithubService;
    /// use forgework::forge::GitService;
    ///
    /// let service = GithubService::new(Some("ghp_xxx".into()));
    /// assert_eq!(service.instance_url(), "https://github.com");
    /// assert!(!service.is_read_only());
    /// ```
    pub fn new(token: Option<String>) -> Self {
        Self {
            client: Arc::new(GithubClient::new(DEFAULT_API_BASE, token)),
            instance_url: DEFAULT_INSTANCE_URL.to_string(),
            read_only: false,
            github_app_id: None,
            github_app_private_key: None,
            github_app_private_key_path: None,
        }
    }

    /// Point the service at another instance.
    ///
    /// Any host other than github.com is treated as GitHub Enterprise with
    /// the API under `/api/v3`. github.com is matched by host, whatever the
    /// scheme.
    pub fn with_instance_url(self, instance_url: impl Into<String>) -> Self {
        let instance_url = instance_url.into().trim_end_matches('/').to_string();
        if is_github_com(&instance_url) {
            return Self {
                instance_url: DEFAULT_INSTANCE_URL.to_string(),
                ..self.with_api_base(DEFAULT_API_BASE)
            };
        }

        let api_base = format!("{}/api/v3", instance_url);
        Self {
            instance_url,
            ..self.with_api_base(api_base)
        }
    }

    /// Send API requests to `api_base` instead of the default.
    pub fn with_api_base(self, api_base: impl Into<String>) -> Self {
        let token = self.client.token();
        Self {
            client: Arc::new(GithubClient::new(api_base, token)),
            ..self
        }
    }

    /// Refuse write operations.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Record GitHub App credentials.
    ///
    /// The private key is given inline or as a path to a PEM file.
    pub fn with_github_app(
        mut self,
        app_id: impl Into<String>,
        private_key: Option<String>,
        private_key_path: Option<PathBuf>,
    ) -> Self {
        self.github_app_id = Some(app_id.into());
        self.github_app_private_key = private_key;
        self.github_app_private_key_path = private_key_path;
        self
    }

    /// Current token, if any.
    pub fn token(&self) -> Option<String> {
        self.client.token()
    }

    /// The shared REST client.
    pub fn client(&self) -> &GithubClient {
        &self.client
    }

    /// Configured GitHub App id.
    pub fn github_app_id(&self) -> Option<&str> {
        self.github_app_id.as_deref()
    }

    /// Configured path of the GitHub App private key.
    pub fn github_app_private_key_path(&self) -> Option<&Path> {
        self.github_app_private_key_path.as_deref()
    }

    /// The GitHub App private key.
    ///
    /// Returns the inline key when set, otherwise the contents of the key
    /// file, otherwise `None`.
    ///
    /// # Errors
    ///
    /// `ForgeError::GithubApi` when a key path is configured but the file
    /// does not exist or cannot be read.
    pub fn github_app_private_key(&self) -> Result<Option<String>, ForgeError> {
        if let Some(key) = &self.github_app_private_key {
            return Ok(Some(key.clone()));
        }

        let Some(path) = &self.github_app_private_key_path else {
            return Ok(None);
        };

        if !path.is_file() {
            return Err(ForgeError::GithubApi(format!(
                "File with the github-app private key ({}) does not exist.",
                path.display()
            )));
        }

        std::fs::read_to_string(path).map(Some).map_err(|e| {
            ForgeError::GithubApi(format!(
                "Cannot read the github-app private key ({}): {}",
                path.display(),
                e
            ))
        })
    }

    /// Concrete project handle.
    pub fn project(&self, namespace: &str, repo: &str) -> GithubProject {
        GithubProject {
            service: self.clone(),
            namespace: namespace.to_string(),
            repo: repo.to_string(),
        }
    }
}

impl fmt::Debug for GithubService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubService")
            .field("instance_url", &self.instance_url)
            .field("api_base", &self.client.api_base)
            .field("read_only", &self.read_only)
            .field("has_token", &self.token().is_some())
            .field("github_app_id", &self.github_app_id)
            .field("has_private_key", &self.github_app_private_key.is_some())
            .field("github_app_private_key_path", &self.github_app_private_key_path)
            .finish()
    }
}

/// Configuration summary with secrets masked.
impl fmt::Display for GithubService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GithubService(read_only={}", self.read_only)?;
        if self.instance_url != DEFAULT_INSTANCE_URL {
            write!(f, ", instance_url='{}'", self.instance_url)?;
        }
        if self.token().is_some() {
            write!(f, ", token='***'")?;
        }
        if let Some(id) = &self.github_app_id {
            write!(f, ", github_app_id='{}'", id)?;
        }
        if self.github_app_private_key.is_some() {
            write!(f, ", github_app_private_key='***'")?;
        }
        if let Some(path) = &self.github_app_private_key_path {
            write!(f, ", github_app_private_key_path='{}'", path.display())?;
        }
        write!(f, ")")
    }
}

impl PartialEq for GithubService {
    fn eq(&self, other: &Self) -> bool {
        self.token() == other.token()
            && self.instance_url == other.instance_url
            && self.read_only == other.read_only
            && self.github_app_id == other.github_app_id
            && self.github_app_private_key == other.github_app_private_key
            && self.github_app_private_key_path == other.github_app_private_key_path
    }
}

impl Eq for GithubService {}

impl Hash for GithubService {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.token().hash(state);
        self.instance_url.hash(state);
        self.read_only.hash(state);
        self.github_app_id.hash(state);
        self.github_app_private_key.hash(state);
        self.github_app_private_key_path.hash(state);
    }
}

#[async_trait]
impl GitService for GithubService {
    fn name(&self) -> &'static str {
        "github"
    }

    fn provider(&self) -> ForgeProvider {
        ForgeProvider::GitHub
    }

    fn instance_url(&self) -> &str {
        &self.instance_url
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn change_token(&self, new_token: &str) {
        debug!(instance = %self.instance_url, "changing GitHub token");
        self.client.set_token(Some(new_token.to_string()));
    }

    fn get_project(&self, namespace: &str, repo: &str) -> Box<dyn GitProject> {
        Box::new(self.project(namespace, repo))
    }

    fn user(&self) -> Box<dyn GitUser> {
        Box::new(GithubUser {
            service: self.clone(),
        })
    }

    async fn project_create(
        &self,
        repo: &str,
        namespace: Option<&str>,
    ) -> Result<Box<dyn GitProject>, ForgeError> {
        if self.read_only {
            warn!(repo, ?namespace, "read-only mode, not creating repository");
            return Err(ForgeError::ReadOnly(format!(
                "would create repository '{}'",
                repo
            )));
        }

        let body = CreateRepoBody { name: repo };
        let created: GitHubRepository = match namespace {
            Some(namespace) => {
                match self
                    .client
                    .get::<GitHubOrganization>(&format!("orgs/{}", namespace))
                    .await
                {
                    Ok(_) => {}
                    Err(ForgeError::NotFound(_)) => {
                        return Err(ForgeError::GithubApi(format!(
                            "Group {} not found.",
                            namespace
                        )));
                    }
                    Err(e) => return Err(e),
                }
                self.client
                    .post(&format!("orgs/{}/repos", namespace), &body)
                    .await?
            }
            None => self.client.post("user/repos", &body).await?,
        };

        let owner = namespace.unwrap_or(&created.owner.login);
        info!(owner, repo = %created.name, url = %created.html_url, "created GitHub repository");
        Ok(Box::new(self.project(owner, repo)))
    }
}

// --------------------------------------------------------------------------
// Project & User
// --------------------------------------------------------------------------

/// A repository on GitHub.
#[derive(Debug, Clone, PartialEq)]
pub struct GithubProject {
    service: GithubService,
    namespace: String,
    repo: String,
}

impl GithubProject {
    /// The owning service.
    pub fn service(&self) -> &GithubService {
        &self.service
    }

    fn repo_path(&self, path: &str) -> String {
        format!("repos/{}/{}/{}", self.namespace, self.repo, path)
    }

    async fn issue_comments(&self, number: u64, kind: CommentKind) -> Result<Vec<Comment>, ForgeError> {
        let raw: Vec<GitHubIssueComment> = self
            .service
            .client
            .get_all_pages(&self.repo_path(&format!("issues/{}/comments", number)))
            .await?;
        Ok(raw.into_iter().map(|c| c.into_comment(kind)).collect())
    }
}

#[async_trait]
impl GitProject for GithubProject {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn repo(&self) -> &str {
        &self.repo
    }

    fn service_name(&self) -> &'static str {
        "github"
    }

    fn is_read_only(&self) -> bool {
        self.service.read_only
    }

    async fn get_all_pr_comments(&self, pr_id: u64) -> Result<Vec<Comment>, ForgeError> {
        self.issue_comments(pr_id, CommentKind::PullRequest).await
    }

    async fn get_all_issue_comments(&self, issue_id: u64) -> Result<Vec<Comment>, ForgeError> {
        self.issue_comments(issue_id, CommentKind::Issue).await
    }

    async fn get_pr_info(&self, pr_id: u64) -> Result<PullRequestInfo, ForgeError> {
        let pr: GitHubPullRequest = self
            .service
            .client
            .get(&self.repo_path(&format!("pulls/{}", pr_id)))
            .await?;
        Ok(pr.into())
    }
}

/// The user a GitHub service is authenticated as.
#[derive(Debug, Clone)]
pub struct GithubUser {
    service: GithubService,
}

#[async_trait]
impl GitUser for GithubUser {
    async fn get_username(&self) -> Result<String, ForgeError> {
        let user: GitHubUser = self.service.client.get("user").await?;
        Ok(user.login)
    }
}

// --------------------------------------------------------------------------
// API types
// --------------------------------------------------------------------------

#[derive(Serialize)]
struct CreateRepoBody<'a> {
    name: &'a str,
}

/// GitHub error response format.
#[derive(Deserialize)]
struct GitHubErrorResponse {
    message: String,
}

#[derive(Deserialize)]
struct GitHubUser {
    login: String,
}

#[derive(Deserialize)]
struct GitHubOrganization {
    #[allow(dead_code)]
    login: String,
}

#[derive(Deserialize)]
struct GitHubRepository {
    name: String,
    html_url: String,
    owner: GitHubUser,
}

#[derive(Deserialize)]
struct GitHubIssueComment {
    id: u64,
    /// `None` for deleted accounts
    user: Option<GitHubUser>,
    body: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl GitHubIssueComment {
    fn into_comment(self, kind: CommentKind) -> Comment {
        let edited = (self.updated_at != self.created_at).then_some(self.updated_at);
        Comment {
            kind,
            id: self.id,
            author: self.user.map(|u| u.login).unwrap_or_else(|| "ghost".to_string()),
            body: self.body.unwrap_or_default(),
            created: self.created_at,
            edited,
        }
    }
}

#[derive(Deserialize)]
struct GitHubRef {
    #[serde(rename = "ref")]
    ref_name: String,
}

#[derive(Deserialize)]
struct GitHubPullRequest {
    number: u64,
    title: String,
    body: Option<String>,
    user: Option<GitHubUser>,
    state: String,
    merged: Option<bool>,
    merged_at: Option<String>,
    html_url: String,
    head: GitHubRef,
    base: GitHubRef,
}

impl From<GitHubPullRequest> for PullRequestInfo {
    fn from(pr: GitHubPullRequest) -> Self {
        let status = if pr.merged.unwrap_or(false) || pr.merged_at.is_some() {
            PrStatus::Merged
        } else if pr.state == "closed" {
            PrStatus::Closed
        } else {
            PrStatus::Open
        };

        PullRequestInfo {
            id: pr.number,
            title: pr.title,
            description: pr.body,
            author: pr.user.map(|u| u.login).unwrap_or_else(|| "ghost".to_string()),
            status,
            url: pr.html_url,
            source_branch: pr.head.ref_name,
            target_branch: pr.base.ref_name,
        }
    }
}
