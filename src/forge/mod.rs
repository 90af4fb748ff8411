//! forge
//!
//! One object model over GitHub and GitLab.
//!
//! # Architecture
//!
//! The [`GitService`], [`GitProject`] and [`GitUser`] traits define what every
//! backend offers. Callers get a service from the [`get_project`] /
//! [`services_from_config`] factory functions or construct one directly, and
//! then work only with the traits.
//!
//! Comment filtering and PR search live in `comments` and are shared by all
//! backends; a backend only supplies raw, oldest-first comment lists.
//!
//! # Modules
//!
//! - `traits`: the object model and [`ForgeError`]
//! - `comments`: the filter pipeline and regex search
//! - `parsing`: repository URL parsing
//! - `factory`: backend selection and service construction
//! - [`github`]: GitHub REST v3 backend
//! - [`gitlab`]: GitLab REST v4 backend
//! - [`mock`]: in-memory backend for deterministic testing
//!
//! # Example
//!
//! ```ignore
//! use forgework::forge::{get_project, CommentFilter};
//! use regex::Regex;
//!
//! let project = get_project("https://github.com/packit/ogr", &[], &[]).await?;
//!
//! let filter = CommentFilter::new().pattern("/packit")?.reversed(true);
//! let commands = project.get_pr_comments(42, &filter).await?;
//!
//! let pattern = Regex::new(r"Fixes #(\d+)")?;
//! if let Some(found) = project.search_in_pr(42, &pattern, false, true).await? {
//!     println!("fixes issue {}", found.group(1).unwrap_or("?"));
//! }
//! ```

mod comments;
mod factory;
pub mod github;
pub mod gitlab;
pub mod mock;
mod parsing;
mod traits;

pub use comments::{
    filter_comments, search_in_comments, select_comments, MatchSource, SearchMatch, SearchTarget,
};
pub use factory::{
    get_project, get_service_provider, service_for_instance, services_from_config,
    ForgeProvider, ServiceMapping,
};
pub use parsing::{parse_git_repo, RepoUrl};
pub use traits::*;
