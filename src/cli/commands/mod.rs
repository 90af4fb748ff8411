//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Loads the configuration and builds the services it needs
//! 2. Runs the forge operation
//! 3. Formats and displays output
//!
//! # Async Commands
//!
//! Forge operations are async because they involve network I/O. Each
//! network command creates a `tokio::runtime::Runtime` and uses `block_on`
//! to run within the sync context.

mod comments;
mod completion;
mod create_project;
mod search;
mod services;
mod whoami;

// Re-export command functions for testing and direct invocation
pub use comments::comments;
pub use completion::completion;
pub use create_project::create_project;
pub use search::search;
pub use services::services;
pub use whoami::whoami;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::cli::args::Command;
use crate::cli::Context;
use crate::config::Config;
use crate::forge::{services_from_config, GitService};

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<()> {
    match command {
        Command::Comments {
            url,
            pr,
            issue,
            filter,
            author,
            reverse,
            json,
        } => {
            let target = match (pr, issue) {
                (Some(pr), _) => comments::Target::PullRequest(pr),
                (None, Some(issue)) => comments::Target::Issue(issue),
                (None, None) => anyhow::bail!("either --pr or --issue is required"),
            };
            comments::comments(
                ctx,
                &url,
                target,
                filter.as_deref(),
                author.as_deref(),
                reverse,
                json,
            )
        }
        Command::Search {
            url,
            pr,
            pattern,
            reverse,
            no_description,
            json,
        } => search::search(ctx, &url, pr, &pattern, reverse, !no_description, json),
        Command::CreateProject {
            repo,
            namespace,
            service,
        } => create_project::create_project(ctx, &repo, namespace.as_deref(), service.as_deref()),
        Command::Whoami { service } => whoami::whoami(ctx, service.as_deref()),
        Command::Services => services::services(ctx),
        Command::Completion { shell } => completion::completion(shell),
    }
}

/// Every configured service, in key order.
fn configured_services(config: &Config) -> Result<Vec<Arc<dyn GitService>>> {
    services_from_config(config.services()).context("invalid service configuration")
}

/// The configured service `key`, or the default service.
fn configured_service(config: &Config, key: Option<&str>) -> Result<Arc<dyn GitService>> {
    let (key, entry) = config.service(key)?;
    let single = BTreeMap::from([(key.to_string(), entry.clone())]);
    let mut services = services_from_config(&single)
        .with_context(|| format!("invalid configuration for service '{}'", key))?;
    services
        .pop()
        .with_context(|| format!("service '{}' could not be built", key))
}
