//! forge::mock
//!
//! In-memory service for deterministic testing.
//!
//! # Design
//!
//! [`MockService`] implements [`GitService`] over stored pull requests and
//! comments. It impersonates a backend (`ForgeProvider`) so the factory
//! treats it like a real instance, records every operation, and can be told
//! to fail a given operation.
//!
//! # Example
//!
//! ```
//! use forgework::forge::mock::MockService;
//! use forgework::forge::{CommentFilter, ForgeProvider, GitService};
//!
//! # tokio_test::block_on(async {
//! let service = MockService::new(ForgeProvider::GitHub);
//! service.add_pr_comment("packit", "ogr", 1, "alice", "LGTM");
//! service.add_pr_comment("packit", "ogr", 1, "bob", "/packit build");
//!
//! let project = service.get_project("packit", "ogr");
//! let filter = CommentFilter::new().author("bob");
//! let comments = project.get_pr_comments(1, &filter).await.unwrap();
//! assert_eq!(comments.len(), 1);
//! assert_eq!(comments[0].body, "/packit build");
//! # });
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};

use super::factory::ForgeProvider;
use super::traits::{
    Comment, CommentKind, ForgeError, GitProject, GitService, GitUser, PrStatus, PullRequestInfo,
};

/// Mock service for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone)]
pub struct MockService {
    provider: ForgeProvider,
    instance_url: String,
    read_only: bool,
    /// Internal state shared across clones.
    inner: Arc<Mutex<MockServiceInner>>,
}

/// Internal mutable state.
#[derive(Debug, Default)]
struct MockServiceInner {
    token: Option<String>,
    username: String,
    /// Namespaces that exist besides the user's own.
    namespaces: BTreeSet<String>,
    /// Projects by `namespace/repo`.
    projects: HashMap<String, MockRepo>,
    /// Next comment id to assign.
    next_comment_id: u64,
    /// Method to fail on (for testing error paths).
    fail_on: Option<FailOn>,
    /// Recorded operations for verification.
    operations: Vec<MockOperation>,
}

#[derive(Debug, Default)]
struct MockRepo {
    prs: HashMap<u64, PullRequestInfo>,
    pr_comments: HashMap<u64, Vec<Comment>>,
    issue_comments: HashMap<u64, Vec<Comment>>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    /// Fail comment listing (PR and issue) with the given error.
    GetComments(ForgeError),
    /// Fail get_pr_info with the given error.
    GetPrInfo(ForgeError),
    /// Fail project_create with the given error.
    ProjectCreate(ForgeError),
    /// Fail get_username with the given error.
    GetUsername(ForgeError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    GetPrComments {
        project: String,
        pr_id: u64,
    },
    GetIssueComments {
        project: String,
        issue_id: u64,
    },
    GetPrInfo {
        project: String,
        pr_id: u64,
    },
    ProjectCreate {
        repo: String,
        namespace: Option<String>,
    },
    GetUsername,
    ChangeToken,
}

/// Base timestamp for generated comments; each new comment is one minute later.
fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
}

impl MockService {
    /// Create an empty mock impersonating `provider`.
    pub fn new(provider: ForgeProvider) -> Self {
        let instance_url = match provider {
            ForgeProvider::GitHub => "https://github.com",
            ForgeProvider::GitLab => "https://gitlab.com",
        };
        Self {
            provider,
            instance_url: instance_url.to_string(),
            read_only: false,
            inner: Arc::new(Mutex::new(MockServiceInner {
                username: "mock-user".to_string(),
                next_comment_id: 1,
                ..MockServiceInner::default()
            })),
        }
    }

    /// Serve a different instance URL.
    pub fn with_instance_url(mut self, instance_url: impl Into<String>) -> Self {
        self.instance_url = instance_url.into();
        self
    }

    /// Refuse write operations.
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Set the authenticated user.
    pub fn with_username(self, username: impl Into<String>) -> Self {
        self.inner.lock().unwrap().username = username.into();
        self
    }

    /// Make `namespace` an existing group/organization.
    pub fn with_namespace(self, namespace: impl Into<String>) -> Self {
        self.inner.lock().unwrap().namespaces.insert(namespace.into());
        self
    }

    /// Configure the mock to fail on a specific operation.
    ///
    /// ```
    /// use forgework::forge::mock::{FailOn, MockService};
    /// use forgework::forge::{ForgeError, ForgeProvider};
    ///
    /// let service = MockService::new(ForgeProvider::GitLab)
    ///     .fail_on(FailOn::GetComments(ForgeError::RateLimited));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.inner.lock().unwrap().fail_on = Some(fail_on);
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.inner.lock().unwrap().fail_on = None;
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.inner.lock().unwrap().operations.clone()
    }

    /// Clear recorded operations.
    pub fn clear_operations(&self) {
        self.inner.lock().unwrap().operations.clear();
    }

    /// Current token.
    pub fn token(&self) -> Option<String> {
        self.inner.lock().unwrap().token.clone()
    }

    /// Whether `namespace/repo` exists.
    pub fn has_project(&self, namespace: &str, repo: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .projects
            .contains_key(&format!("{}/{}", namespace, repo))
    }

    /// Store a pull request.
    pub fn add_pr(&self, namespace: &str, repo: &str, pr: PullRequestInfo) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .projects
            .entry(format!("{}/{}", namespace, repo))
            .or_default()
            .prs
            .insert(pr.id, pr);
    }

    /// Store an open pull request with the given description.
    pub fn add_simple_pr(&self, namespace: &str, repo: &str, pr_id: u64, description: Option<&str>) {
        let pr = PullRequestInfo {
            id: pr_id,
            title: format!("PR #{}", pr_id),
            description: description.map(str::to_string),
            author: "mock-user".to_string(),
            status: PrStatus::Open,
            url: format!("{}/{}/{}/pull/{}", self.instance_url, namespace, repo, pr_id),
            source_branch: format!("pr-{}", pr_id),
            target_branch: "main".to_string(),
        };
        self.add_pr(namespace, repo, pr);
    }

    /// Append a comment to a pull request. Returns the comment id.
    pub fn add_pr_comment(
        &self,
        namespace: &str,
        repo: &str,
        pr_id: u64,
        author: &str,
        body: &str,
    ) -> u64 {
        self.add_comment(namespace, repo, pr_id, CommentKind::PullRequest, author, body)
    }

    /// Append a comment to an issue. Returns the comment id.
    pub fn add_issue_comment(
        &self,
        namespace: &str,
        repo: &str,
        issue_id: u64,
        author: &str,
        body: &str,
    ) -> u64 {
        self.add_comment(namespace, repo, issue_id, CommentKind::Issue, author, body)
    }

    fn add_comment(
        &self,
        namespace: &str,
        repo: &str,
        number: u64,
        kind: CommentKind,
        author: &str,
        body: &str,
    ) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_comment_id;
        inner.next_comment_id += 1;

        let comment = Comment {
            kind,
            id,
            author: author.to_string(),
            body: body.to_string(),
            created: base_time() + Duration::minutes(id as i64),
            edited: None,
        };

        let project = inner
            .projects
            .entry(format!("{}/{}", namespace, repo))
            .or_default();
        let list = match kind {
            CommentKind::PullRequest => &mut project.pr_comments,
            CommentKind::Issue => &mut project.issue_comments,
        };
        list.entry(number).or_default().push(comment);
        id
    }

    /// Concrete project handle.
    pub fn project(&self, namespace: &str, repo: &str) -> MockProject {
        MockProject {
            service: self.clone(),
            namespace: namespace.to_string(),
            repo: repo.to_string(),
        }
    }

    /// Record an operation.
    fn record(&self, op: MockOperation) {
        self.inner.lock().unwrap().operations.push(op);
    }

    /// Check if we should fail and return the error if so.
    fn check_fail(&self, expected: &str) -> Option<ForgeError> {
        let inner = self.inner.lock().unwrap();
        match &inner.fail_on {
            Some(FailOn::GetComments(e)) if expected == "get_comments" => Some(e.clone()),
            Some(FailOn::GetPrInfo(e)) if expected == "get_pr_info" => Some(e.clone()),
            Some(FailOn::ProjectCreate(e)) if expected == "project_create" => Some(e.clone()),
            Some(FailOn::GetUsername(e)) if expected == "get_username" => Some(e.clone()),
            _ => None,
        }
    }

    /// Backend-specific "missing namespace" error.
    fn namespace_not_found(&self, namespace: &str) -> ForgeError {
        let message = format!("Group {} not found.", namespace);
        match self.provider {
            ForgeProvider::GitHub => ForgeError::GithubApi(message),
            ForgeProvider::GitLab => ForgeError::GitlabApi(message),
        }
    }
}

impl fmt::Display for MockService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MockService(provider={}, instance_url='{}', read_only={})",
            self.provider, self.instance_url, self.read_only
        )
    }
}

#[async_trait]
impl GitService for MockService {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn provider(&self) -> ForgeProvider {
        self.provider
    }

    fn instance_url(&self) -> &str {
        &self.instance_url
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn change_token(&self, new_token: &str) {
        self.record(MockOperation::ChangeToken);
        self.inner.lock().unwrap().token = Some(new_token.to_string());
    }

    fn get_project(&self, namespace: &str, repo: &str) -> Box<dyn GitProject> {
        Box::new(self.project(namespace, repo))
    }

    fn user(&self) -> Box<dyn GitUser> {
        Box::new(MockUser {
            service: self.clone(),
        })
    }

    async fn project_create(
        &self,
        repo: &str,
        namespace: Option<&str>,
    ) -> Result<Box<dyn GitProject>, ForgeError> {
        self.record(MockOperation::ProjectCreate {
            repo: repo.to_string(),
            namespace: namespace.map(str::to_string),
        });

        if self.read_only {
            return Err(ForgeError::ReadOnly(format!(
                "would create project '{}'",
                repo
            )));
        }
        if let Some(e) = self.check_fail("project_create") {
            return Err(e);
        }

        let mut inner = self.inner.lock().unwrap();
        let owner = match namespace {
            Some(ns) if ns != inner.username && !inner.namespaces.contains(ns) => {
                return Err(self.namespace_not_found(ns));
            }
            Some(ns) => ns.to_string(),
            None => inner.username.clone(),
        };

        let key = format!("{}/{}", owner, repo);
        if inner.projects.contains_key(&key) {
            return Err(ForgeError::ApiError {
                status: 422,
                message: format!("{} already exists", key),
            });
        }
        inner.projects.insert(key, MockRepo::default());
        drop(inner);

        Ok(Box::new(self.project(&owner, repo)))
    }
}

/// A project stored in a [`MockService`].
#[derive(Debug, Clone)]
pub struct MockProject {
    service: MockService,
    namespace: String,
    repo: String,
}

impl MockProject {
    fn comments(&self, number: u64, kind: CommentKind) -> Vec<Comment> {
        let inner = self.service.inner.lock().unwrap();
        inner
            .projects
            .get(&self.full_repo_name())
            .and_then(|p| match kind {
                CommentKind::PullRequest => p.pr_comments.get(&number),
                CommentKind::Issue => p.issue_comments.get(&number),
            })
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl GitProject for MockProject {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn repo(&self) -> &str {
        &self.repo
    }

    fn service_name(&self) -> &'static str {
        "mock"
    }

    fn is_read_only(&self) -> bool {
        self.service.read_only
    }

    async fn get_all_pr_comments(&self, pr_id: u64) -> Result<Vec<Comment>, ForgeError> {
        self.service.record(MockOperation::GetPrComments {
            project: self.full_repo_name(),
            pr_id,
        });
        if let Some(e) = self.service.check_fail("get_comments") {
            return Err(e);
        }
        Ok(self.comments(pr_id, CommentKind::PullRequest))
    }

    async fn get_all_issue_comments(&self, issue_id: u64) -> Result<Vec<Comment>, ForgeError> {
        self.service.record(MockOperation::GetIssueComments {
            project: self.full_repo_name(),
            issue_id,
        });
        if let Some(e) = self.service.check_fail("get_comments") {
            return Err(e);
        }
        Ok(self.comments(issue_id, CommentKind::Issue))
    }

    async fn get_pr_info(&self, pr_id: u64) -> Result<PullRequestInfo, ForgeError> {
        self.service.record(MockOperation::GetPrInfo {
            project: self.full_repo_name(),
            pr_id,
        });
        if let Some(e) = self.service.check_fail("get_pr_info") {
            return Err(e);
        }

        let inner = self.service.inner.lock().unwrap();
        inner
            .projects
            .get(&self.full_repo_name())
            .and_then(|p| p.prs.get(&pr_id))
            .cloned()
            .ok_or_else(|| ForgeError::NotFound(format!("pull request #{}", pr_id)))
    }
}

/// The authenticated user of a [`MockService`].
#[derive(Debug, Clone)]
pub struct MockUser {
    service: MockService,
}

#[async_trait]
impl GitUser for MockUser {
    async fn get_username(&self) -> Result<String, ForgeError> {
        self.service.record(MockOperation::GetUsername);
        if let Some(e) = self.service.check_fail("get_username") {
            return Err(e);
        }
        Ok(self.service.inner.lock().unwrap().username.clone())
    }
}
