//! forge::traits
//!
//! The shared object model: services, projects, users and comments.
//!
//! # Design
//!
//! Every backend implements the same three traits:
//!
//! - [`GitService`]: a connection to one forge instance. Owns the token and
//!   the read-only flag, hands out projects and users, creates projects.
//! - [`GitProject`]: one repository. Backends supply the raw comment fetches
//!   (`get_all_pr_comments`, `get_all_issue_comments`) and `get_pr_info`;
//!   the filtering and search operations are provided methods shared by all
//!   backends.
//! - [`GitUser`]: the authenticated identity.
//!
//! The traits are async because every backend call is network I/O. Calls are
//! still issued one at a time; nothing here spawns work.
//!
//! # Example
//!
//! ```ignore
//! use forgework::forge::{CommentFilter, GitService};
//! use forgework::forge::github::GithubService;
//!
//! let service = GithubService::new(Some(token));
//! let project = service.get_project("packit", "ogr");
//!
//! let filter = CommentFilter::new().author("alice").reversed(true);
//! for comment in project.get_pr_comments(42, &filter).await? {
//!     println!("{}: {}", comment.author, comment.body);
//! }
//! ```

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use super::comments::{self, SearchMatch, SearchTarget};
use super::factory::ForgeProvider;
use super::parsing::parse_git_repo;

/// Errors from forge operations.
#[derive(Debug, Clone, Error)]
pub enum ForgeError {
    /// A GitHub-specific failure with a descriptive message.
    #[error("GitHub API error: {0}")]
    GithubApi(String),

    /// A GitLab-specific failure with a descriptive message.
    #[error("GitLab API error: {0}")]
    GitlabApi(String),

    /// Authentication is required but not available.
    #[error("authentication required")]
    AuthRequired,

    /// Authentication failed (invalid token, expired, insufficient permissions).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    NetworkError(String),

    /// A write was refused because the service is read-only.
    #[error("read-only mode: {0}")]
    ReadOnly(String),

    /// A filter pattern is not a valid regular expression.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// A repository URL could not be parsed.
    #[error("invalid repository url: {0}")]
    InvalidUrl(String),

    /// No backend matches a URL, type name or instance list.
    #[error("{0}")]
    NoMatchingService(String),
}

/// Whether a comment belongs to an issue or a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    Issue,
    PullRequest,
}

impl fmt::Display for CommentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommentKind::Issue => write!(f, "issue"),
            CommentKind::PullRequest => write!(f, "pull request"),
        }
    }
}

/// A single comment as delivered by the backend.
///
/// Comments are snapshots: every fetch builds new values and nothing writes
/// them back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Comment {
    /// Issue or pull request comment
    pub kind: CommentKind,
    /// Backend identifier of the comment
    pub id: u64,
    /// Login/username of the author
    pub author: String,
    /// Comment text
    pub body: String,
    /// Creation time
    pub created: DateTime<Utc>,
    /// Last edit time, when it differs from creation
    pub edited: Option<DateTime<Utc>>,
}

/// Pull request (merge request) state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrStatus {
    /// Open and awaiting review/merge
    Open,
    /// Closed without being merged
    Closed,
    /// Merged
    Merged,
}

impl fmt::Display for PrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrStatus::Open => write!(f, "open"),
            PrStatus::Closed => write!(f, "closed"),
            PrStatus::Merged => write!(f, "merged"),
        }
    }
}

/// Pull request details needed by the search pipeline and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequestInfo {
    /// PR number (GitLab: the project-scoped iid)
    pub id: u64,
    /// PR title
    pub title: String,
    /// PR description, if any
    pub description: Option<String>,
    /// Login/username of the author
    pub author: String,
    /// Current state
    pub status: PrStatus,
    /// Web URL
    pub url: String,
    /// Branch with the changes
    pub source_branch: String,
    /// Branch to merge into
    pub target_branch: String,
}

/// Reordering and filtering applied to a fetched comment list.
///
/// An empty pattern or author counts as unset. When both are set a comment
/// has to satisfy both.
///
/// # Example
///
/// ```
/// use forgework::forge::CommentFilter;
///
/// let filter = CommentFilter::new()
///     .pattern("LGTM")
///     .unwrap()
///     .author("alice")
///     .reversed(true);
/// assert!(filter.is_filtering());
/// assert!(filter.reverse);
///
/// assert!(CommentFilter::new().pattern("([").is_err());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommentFilter {
    /// Regex searched in the comment body
    pub pattern: Option<Regex>,
    /// Exact author match
    pub author: Option<String>,
    /// Newest comment first
    pub reverse: bool,
}

impl CommentFilter {
    /// A filter that passes every comment through in backend order.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only keep comments whose body contains a match for `pattern`.
    ///
    /// # Errors
    ///
    /// Returns `ForgeError::InvalidPattern` if `pattern` is not a valid regex.
    pub fn pattern(mut self, pattern: &str) -> Result<Self, ForgeError> {
        if pattern.is_empty() {
            self.pattern = None;
            return Ok(self);
        }
        let regex = Regex::new(pattern).map_err(|e| ForgeError::InvalidPattern(e.to_string()))?;
        self.pattern = Some(regex);
        Ok(self)
    }

    /// Only keep comments written by `author`.
    pub fn author(mut self, author: impl Into<String>) -> Self {
        let author = author.into();
        self.author = if author.is_empty() { None } else { Some(author) };
        self
    }

    /// Return comments newest first.
    pub fn reversed(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    /// Whether a pattern or author is set.
    pub fn is_filtering(&self) -> bool {
        self.pattern.is_some() || self.author.is_some()
    }

    /// Run the filter over a fetched comment list.
    pub fn apply(&self, comments: Vec<Comment>) -> Vec<Comment> {
        comments::select_comments(comments, self)
    }
}

/// A connection to one forge instance.
///
/// Implementations are cheap to clone and share token state with the
/// projects they hand out.
#[async_trait]
pub trait GitService: Send + Sync + fmt::Debug + fmt::Display {
    /// Backend name ("github", "gitlab").
    fn name(&self) -> &'static str;

    /// Backend kind, used by the factory to match instances.
    fn provider(&self) -> ForgeProvider;

    /// Web URL of the instance, e.g. `https://github.com`.
    fn instance_url(&self) -> &str;

    /// Host part of [`GitService::instance_url`].
    fn hostname(&self) -> Option<String> {
        url::Url::parse(self.instance_url())
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
    }

    /// Whether write operations are refused.
    fn is_read_only(&self) -> bool;

    /// Replace the token used by this service and its projects.
    fn change_token(&self, new_token: &str);

    /// The project `namespace/repo` on this instance. No request is made.
    fn get_project(&self, namespace: &str, repo: &str) -> Box<dyn GitProject>;

    /// The authenticated user.
    fn user(&self) -> Box<dyn GitUser>;

    /// Create a repository under `namespace`, or under the authenticated user
    /// when `namespace` is `None`.
    ///
    /// # Errors
    ///
    /// - The backend-specific API error if `namespace` does not exist
    /// - `ReadOnly` if the service is read-only
    async fn project_create(
        &self,
        repo: &str,
        namespace: Option<&str>,
    ) -> Result<Box<dyn GitProject>, ForgeError>;

    /// The project `repo` in the authenticated user's namespace.
    async fn get_fork_project(&self, repo: &str) -> Result<Box<dyn GitProject>, ForgeError> {
        let username = self.user().get_username().await?;
        Ok(self.get_project(&username, repo))
    }

    /// The project a repository URL points at.
    async fn get_project_from_url(&self, url: &str) -> Result<Box<dyn GitProject>, ForgeError> {
        let parsed = parse_git_repo(url).ok_or_else(|| ForgeError::InvalidUrl(url.to_string()))?;
        let namespace = parsed.namespace.ok_or_else(|| {
            ForgeError::InvalidUrl(format!("{} (missing namespace)", url))
        })?;
        Ok(self.get_project(&namespace, &parsed.repo))
    }
}

/// A single repository on a forge.
#[async_trait]
pub trait GitProject: Send + Sync + fmt::Debug {
    /// Owning user or group.
    fn namespace(&self) -> &str;

    /// Repository name.
    fn repo(&self) -> &str;

    /// Backend name of the owning service.
    fn service_name(&self) -> &'static str;

    /// Whether the owning service is read-only.
    fn is_read_only(&self) -> bool;

    /// Repository name with namespace, e.g. `rpms/python-docker-py`.
    fn full_repo_name(&self) -> String {
        format!("{}/{}", self.namespace(), self.repo())
    }

    /// Every comment of a pull request, oldest first.
    async fn get_all_pr_comments(&self, pr_id: u64) -> Result<Vec<Comment>, ForgeError>;

    /// Every comment of an issue, oldest first.
    async fn get_all_issue_comments(&self, issue_id: u64) -> Result<Vec<Comment>, ForgeError>;

    /// Pull request details.
    async fn get_pr_info(&self, pr_id: u64) -> Result<PullRequestInfo, ForgeError>;

    /// Pull request comments after reordering and filtering.
    async fn get_pr_comments(
        &self,
        pr_id: u64,
        filter: &CommentFilter,
    ) -> Result<Vec<Comment>, ForgeError> {
        let all = self.get_all_pr_comments(pr_id).await?;
        Ok(filter.apply(all))
    }

    /// Issue comments after reordering and filtering.
    async fn get_issue_comments(
        &self,
        issue_id: u64,
        filter: &CommentFilter,
    ) -> Result<Vec<Comment>, ForgeError> {
        let all = self.get_all_issue_comments(issue_id).await?;
        Ok(filter.apply(all))
    }

    /// First match of `pattern` in the pull request comments and description.
    ///
    /// Comments are searched in the order `get_pr_comments` returns them for
    /// `reverse`. With `description`, the description goes in front of the
    /// first comment when `reverse` is false and after the last one when it
    /// is true.
    async fn search_in_pr(
        &self,
        pr_id: u64,
        pattern: &Regex,
        reverse: bool,
        description: bool,
    ) -> Result<Option<SearchMatch>, ForgeError> {
        let filter = CommentFilter::new().reversed(reverse);
        let all_comments = self.get_pr_comments(pr_id, &filter).await?;

        let description_text = if description {
            Some(self.get_pr_info(pr_id).await?.description.unwrap_or_default())
        } else {
            None
        };

        let mut targets: Vec<SearchTarget<'_>> =
            all_comments.iter().map(SearchTarget::Comment).collect();
        if let Some(text) = description_text.as_deref() {
            if reverse {
                targets.push(SearchTarget::Description(text));
            } else {
                targets.insert(0, SearchTarget::Description(text));
            }
        }

        Ok(comments::search_in_comments(targets, pattern))
    }
}

/// The identity a service is authenticated as.
#[async_trait]
pub trait GitUser: Send + Sync + fmt::Debug {
    /// Login/username of the authenticated user.
    async fn get_username(&self) -> Result<String, ForgeError>;
}
