//! forge::gitlab
//!
//! GitLab backend using the REST v4 API.
//!
//! # Design
//!
//! The HTTP client is not built when the service is constructed. The first
//! call that needs the network goes through [`GitlabService::connection`],
//! which builds the client, checks the token against `GET /user` and caches
//! the result. [`GitService::change_token`] drops the cached connection so
//! the next call authenticates again with the new token.
//!
//! Projects and groups are addressed by their URL-encoded full path, so
//! nested groups (`group/subgroup/project`) work without an id lookup.
//!
//! # Example
//!
//! ```ignore
//! use forgework::forge::gitlab::GitlabService;
//! use forgework::forge::GitService;
//!
//! let service = GitlabService::new(Some("glpat-xxx".into()))
//!     .with_instance_url("https://gitlab.gnome.org");
//! let project = service.get_project("GNOME", "gtk");
//! let comments = project.get_all_pr_comments(1).await?;
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::factory::ForgeProvider;
use super::traits::{
    Comment, CommentKind, ForgeError, GitProject, GitService, GitUser, PrStatus, PullRequestInfo,
};

/// Web URL of gitlab.com.
const DEFAULT_INSTANCE_URL: &str = "https://gitlab.com";

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "forgework";

/// Page size for list endpoints.
const PER_PAGE: usize = 100;

/// Note listing order: oldest first.
const NOTES_ORDER: [(&str, &str); 2] = [("sort", "asc"), ("order_by", "created_at")];

/// State shared between a service and the projects it hands out.
struct Shared {
    token: RwLock<Option<String>>,
    connection: Mutex<Option<Arc<GitlabConnection>>>,
}

impl Shared {
    fn token(&self) -> Option<String> {
        match self.token.read() {
            Ok(token) => token.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn cached_connection(&self) -> Option<Arc<GitlabConnection>> {
        match self.connection.lock() {
            Ok(conn) => conn.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store_connection(&self, conn: Option<Arc<GitlabConnection>>) {
        match self.connection.lock() {
            Ok(mut current) => *current = conn,
            Err(poisoned) => *poisoned.into_inner() = conn,
        }
    }
}

/// An initialized, authenticated GitLab client.
pub struct GitlabConnection {
    http: Client,
    api_base: String,
    token: Option<String>,
    username: Option<String>,
}

// Custom Debug to avoid exposing the token
impl fmt::Debug for GitlabConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitlabConnection")
            .field("api_base", &self.api_base)
            .field("has_token", &self.token.is_some())
            .field("username", &self.username)
            .finish()
    }
}

impl GitlabConnection {
    /// Build the HTTP client and check the token.
    async fn open(
        api_base: &str,
        token: Option<String>,
        ssl_verify: bool,
    ) -> Result<Self, ForgeError> {
        let http = Client::builder()
            .danger_accept_invalid_certs(!ssl_verify)
            .build()
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;

        let mut conn = Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
            username: None,
        };

        if conn.token.is_some() {
            let user: GitLabUser = conn.get("user").await?;
            debug!(username = %user.username, "authenticated to GitLab");
            conn.username = Some(user.username);
        }

        Ok(conn)
    }

    /// API base URL requests go to.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Username the token belongs to, if a token was set.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    fn headers(&self) -> Result<HeaderMap, ForgeError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(token)
                .map_err(|_| ForgeError::AuthFailed("token contains invalid characters".into()))?;
            headers.insert("PRIVATE-TOKEN", value);
        }
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
        Ok(headers)
    }

    fn request(&self, builder: RequestBuilder) -> Result<RequestBuilder, ForgeError> {
        Ok(builder.headers(self.headers()?))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ForgeError> {
        let url = self.url(path);
        debug!(%url, "GET");
        let response = self
            .request(self.http.get(&url))?
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
            .request(self.http.post(&url))?
            .json(body)
            .send()
            .await
            .map_err(|e| ForgeError::NetworkError(e.to_string()))?;
        handle_response(response).await
    }

    /// Fetch every page of a list endpoint.
    async fn get_all_pages<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, ForgeError> {
        let url = self.url(path);
        let per_page = PER_PAGE.to_string();
        let mut items = Vec::new();
        let mut page = 1u32;

        loop {
            debug!(%url, page, "GET page");
            let response = self
                .request(self.http.get(&url))?
                .query(query)
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

/// GitLab reports errors as `{"message": ...}` or `{"error": ...}`, where
/// `message` may also be an object of validation errors.
async fn error_from_response(response: Response, status: StatusCode) -> ForgeError {
    let message = match response.json::<serde_json::Value>().await {
        Ok(body) => match body.get("message").or_else(|| body.get("error")) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "Unknown error".to_string(),
        },
        Err(_) => "Unknown error".to_string(),
    };

    match status {
        StatusCode::UNAUTHORIZED => ForgeError::AuthFailed("Invalid or expired token".into()),
        StatusCode::FORBIDDEN => ForgeError::AuthFailed(format!("Permission denied: {}", message)),
        StatusCode::NOT_FOUND => ForgeError::NotFound(message),
        StatusCode::TOO_MANY_REQUESTS => ForgeError::RateLimited,
        _ if status.is_server_error() => ForgeError::ApiError {
            status: status.as_u16(),
            message: format!("GitLab server error: {}", message),
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

/// Connection settings for gitlab.com or a self-hosted GitLab.
#[derive(Clone)]
pub struct GitlabService {
    shared: Arc<Shared>,
    instance_url: String,
    api_base: String,
    read_only: bool,
    ssl_verify: bool,
}

impl GitlabService {
    /// A gitlab.com service. `None` means anonymous access.
    ///
    /// No request is made until the first operation needs one.
    ///
    /// ```
    /// use forgework::forge::gitlab::GitlabService;
    /// use forgework::forge::GitService;
    ///
    /// let service = GitlabService::new(None);
    /// assert_eq!(service.instance_url(), "https://gitlab.com");
    /// assert!(!service.is_connected());
    /// ```
    pub fn new(token: Option<String>) -> Self {
        let shared = Shared {
            token: RwLock::new(token),
            connection: Mutex::new(None),
        };
        Self {
            shared: Arc::new(shared),
            instance_url: DEFAULT_INSTANCE_URL.to_string(),
            api_base: format!("{}/api/v4", DEFAULT_INSTANCE_URL),
            read_only: false,
            ssl_verify: true,
        }
    }

    /// Point the service at another GitLab instance.
    pub fn with_instance_url(self, instance_url: impl Into<String>) -> Self {
        let instance_url = instance_url.into().trim_end_matches('/').to_string();
        let api_base = format!("{}/api/v4", instance_url);
        Self {
            instance_url,
            ..self.with_api_base(api_base)
        }
    }

    /// Send API requests to `api_base` instead of `{instance}/api/v4`.
    pub fn with_api_base(self, api_base: impl Into<String>) -> Self {
        let fresh = Self::new(self.token());
        Self {
            shared: fresh.shared,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            ..self
        }
    }

    /// Refuse write operations.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Verify TLS certificates (default `true`).
    pub fn ssl_verify(mut self, ssl_verify: bool) -> Self {
        self.ssl_verify = ssl_verify;
        self
    }

    /// Current token, if any.
    pub fn token(&self) -> Option<String> {
        self.shared.token()
    }

    /// API base URL requests go to.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Whether TLS certificates are verified.
    pub fn verifies_ssl(&self) -> bool {
        self.ssl_verify
    }

    /// Whether an authenticated connection is cached.
    pub fn is_connected(&self) -> bool {
        self.shared.cached_connection().is_some()
    }

    /// The authenticated connection, created on first use.
    ///
    /// # Errors
    ///
    /// - `AuthFailed` if the token is rejected
    /// - `NetworkError` if the instance cannot be reached
    pub async fn connection(&self) -> Result<Arc<GitlabConnection>, ForgeError> {
        if let Some(conn) = self.shared.cached_connection() {
            return Ok(conn);
        }

        debug!(instance = %self.instance_url, "connecting to GitLab");
        let conn = Arc::new(
            GitlabConnection::open(&self.api_base, self.token(), self.ssl_verify).await?,
        );
        self.shared.store_connection(Some(Arc::clone(&conn)));
        Ok(conn)
    }

    /// Concrete project handle.
    pub fn project(&self, namespace: &str, repo: &str) -> GitlabProject {
        GitlabProject {
            service: self.clone(),
            namespace: namespace.to_string(),
            repo: repo.to_string(),
        }
    }
}

impl fmt::Debug for GitlabService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitlabService")
            .field("instance_url", &self.instance_url)
            .field("api_base", &self.api_base)
            .field("read_only", &self.read_only)
            .field("ssl_verify", &self.ssl_verify)
            .field("has_token", &self.token().is_some())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Configuration summary with the token masked.
impl fmt::Display for GitlabService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GitlabService(read_only={}, ssl_verify={}, instance_url='{}'",
            self.read_only, self.ssl_verify, self.instance_url
        )?;
        if self.token().is_some() {
            write!(f, ", token='***'")?;
        }
        write!(f, ")")
    }
}

impl PartialEq for GitlabService {
    fn eq(&self, other: &Self) -> bool {
        self.token() == other.token()
            && self.instance_url == other.instance_url
            && self.read_only == other.read_only
            && self.ssl_verify == other.ssl_verify
    }
}

impl Eq for GitlabService {}

impl Hash for GitlabService {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.token().hash(state);
        self.instance_url.hash(state);
        self.read_only.hash(state);
        self.ssl_verify.hash(state);
    }
}

#[async_trait]
impl GitService for GitlabService {
    fn name(&self) -> &'static str {
        "gitlab"
    }

    fn provider(&self) -> ForgeProvider {
        ForgeProvider::GitLab
    }

    fn instance_url(&self) -> &str {
        &self.instance_url
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn change_token(&self, new_token: &str) {
        debug!(instance = %self.instance_url, "changing GitLab token");
        match self.shared.token.write() {
            Ok(mut current) => *current = Some(new_token.to_string()),
            Err(poisoned) => *poisoned.into_inner() = Some(new_token.to_string()),
        }
        self.shared.store_connection(None);
    }

    fn get_project(&self, namespace: &str, repo: &str) -> Box<dyn GitProject> {
        Box::new(self.project(namespace, repo))
    }

    fn user(&self) -> Box<dyn GitUser> {
        Box::new(GitlabUser {
            service: self.clone(),
        })
    }

    async fn project_create(
        &self,
        repo: &str,
        namespace: Option<&str>,
    ) -> Result<Box<dyn GitProject>, ForgeError> {
        if self.read_only {
            warn!(repo, ?namespace, "read-only mode, not creating project");
            return Err(ForgeError::ReadOnly(format!(
                "would create project '{}'",
                repo
            )));
        }

        let conn = self.connection().await?;
        let namespace_id = match namespace {
            Some(namespace) => {
                let path = format!("groups/{}", urlencoding::encode(namespace));
                match conn.get::<GitLabGroup>(&path).await {
                    Ok(group) => Some(group.id),
                    Err(ForgeError::NotFound(_)) => {
                        return Err(ForgeError::GitlabApi(format!(
                            "Group {} not found.",
                            namespace
                        )));
                    }
                    Err(e) => return Err(e),
                }
            }
            None => None,
        };

        let created: GitLabProject = conn
            .post(
                "projects",
                &CreateProjectBody {
                    name: repo,
                    namespace_id,
                },
            )
            .await?;

        info!(
            namespace = %created.namespace.full_path,
            project = %created.path,
            url = %created.web_url,
            "created GitLab project"
        );
        Ok(Box::new(
            self.project(&created.namespace.full_path, &created.path),
        ))
    }
}

// --------------------------------------------------------------------------
// Project & User
// --------------------------------------------------------------------------

/// A project on GitLab.
#[derive(Debug, Clone, PartialEq)]
pub struct GitlabProject {
    service: GitlabService,
    namespace: String,
    repo: String,
}

impl GitlabProject {
    /// The owning service.
    pub fn service(&self) -> &GitlabService {
        &self.service
    }

    /// `projects/{encoded full path}/{path}`
    fn project_path(&self, path: &str) -> String {
        let full = format!("{}/{}", self.namespace, self.repo);
        format!("projects/{}/{}", urlencoding::encode(&full), path)
    }

    async fn notes(&self, path: &str, kind: CommentKind) -> Result<Vec<Comment>, ForgeError> {
        let conn = self.service.connection().await?;
        let raw: Vec<GitLabNote> = conn
            .get_all_pages(&self.project_path(path), &NOTES_ORDER)
            .await?;
        Ok(raw.into_iter().map(|n| n.into_comment(kind)).collect())
    }
}

#[async_trait]
impl GitProject for GitlabProject {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn repo(&self) -> &str {
        &self.repo
    }

    fn service_name(&self) -> &'static str {
        "gitlab"
    }

    fn is_read_only(&self) -> bool {
        self.service.read_only
    }

    async fn get_all_pr_comments(&self, pr_id: u64) -> Result<Vec<Comment>, ForgeError> {
        self.notes(
            &format!("merge_requests/{}/notes", pr_id),
            CommentKind::PullRequest,
        )
        .await
    }

    async fn get_all_issue_comments(&self, issue_id: u64) -> Result<Vec<Comment>, ForgeError> {
        self.notes(&format!("issues/{}/notes", issue_id), CommentKind::Issue)
            .await
    }

    async fn get_pr_info(&self, pr_id: u64) -> Result<PullRequestInfo, ForgeError> {
        let conn = self.service.connection().await?;
        let mr: GitLabMergeRequest = conn
            .get(&self.project_path(&format!("merge_requests/{}", pr_id)))
            .await?;
        Ok(mr.into())
    }
}

/// The user a GitLab service is authenticated as.
#[derive(Debug, Clone)]
pub struct GitlabUser {
    service: GitlabService,
}

#[async_trait]
impl GitUser for GitlabUser {
    async fn get_username(&self) -> Result<String, ForgeError> {
        let conn = self.service.connection().await?;
        match conn.username() {
            Some(username) => Ok(username.to_string()),
            None => Err(ForgeError::AuthRequired),
        }
    }
}

// --------------------------------------------------------------------------
// API types
// --------------------------------------------------------------------------

#[derive(Serialize)]
struct CreateProjectBody<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace_id: Option<u64>,
}

#[derive(Deserialize)]
struct GitLabUser {
    username: String,
}

#[derive(Deserialize)]
struct GitLabGroup {
    id: u64,
}

#[derive(Deserialize)]
struct GitLabNamespace {
    full_path: String,
}

#[derive(Deserialize)]
struct GitLabProject {
    path: String,
    web_url: String,
    namespace: GitLabNamespace,
}

#[derive(Deserialize)]
struct GitLabNote {
    id: u64,
    body: String,
    author: GitLabUser,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl GitLabNote {
    fn into_comment(self, kind: CommentKind) -> Comment {
        let edited = self.updated_at.filter(|updated| *updated != self.created_at);
        Comment {
            kind,
            id: self.id,
            author: self.author.username,
            body: self.body,
            created: self.created_at,
            edited,
        }
    }
}

#[derive(Deserialize)]
struct GitLabMergeRequest {
    iid: u64,
    title: String,
    description: Option<String>,
    author: GitLabUser,
    /// `opened`, `closed`, `merged` or `locked`
    state: String,
    web_url: String,
    source_branch: String,
    target_branch: String,
}

impl From<GitLabMergeRequest> for PullRequestInfo {
    fn from(mr: GitLabMergeRequest) -> Self {
        let status = match mr.state.as_str() {
            "merged" => PrStatus::Merged,
            "closed" => PrStatus::Closed,
            _ => PrStatus::Open,
        };

        PullRequestInfo {
            id: mr.iid,
            title: mr.title,
            description: mr.description,
            author: mr.author.username,
            status,
            url: mr.web_url,
            source_branch: mr.source_branch,
            target_branch: mr.target_branch,
        }
    }
}
