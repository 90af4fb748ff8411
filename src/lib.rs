//! forgework - one object model for GitHub and GitLab
//!
//! forgework lets calling code work with repositories, pull requests and
//! comments without caring which forge hosts them. The `fw` binary exposes
//! the common operations on the command line.
//!
//! # Architecture
//!
//! - [`forge`] - Service/Project/User traits, the GitHub and GitLab backends,
//!   the comment pipeline and the backend factory
//! - [`config`] - TOML configuration of named service instances
//! - [`cli`] - Command-line interface layer (parses args, delegates to forge)
//! - [`ui`] - Terminal output helpers
//!
//! # Example
//!
//! ```ignore
//! use forgework::forge::{get_project, CommentFilter};
//!
//! let project = get_project("https://gitlab.com/group/project", &[], &[]).await?;
//! let filter = CommentFilter::new().author("alice");
//! for comment in project.get_pr_comments(1, &filter).await? {
//!     println!("{}", comment.body);
//! }
//! ```

pub mod cli;
pub mod config;
pub mod forge;
pub mod ui;
