//! cli::commands::comments
//!
//! List pull request or issue comments.
//!
//! # Example
//!
//! ```bash
//! # Every comment of PR 42, oldest first
//! fw comments https://github.com/packit/ogr --pr 42
//!
//! # Only alice's comments mentioning a bug, newest first
//! fw comments https://github.com/packit/ogr --pr 42 --filter bug --author alice --reverse
//! ```

use anyhow::{Context as _, Result};

use super::configured_services;
use crate::cli::Context;
use crate::forge::{get_project, Comment, CommentFilter};
use crate::ui::output;

/// What to list comments of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    PullRequest(u64),
    Issue(u64),
}

/// Run the comments command.
///
/// This is a synchronous wrapper that uses tokio to run the async implementation.
pub fn comments(
    ctx: &Context,
    url: &str,
    target: Target,
    pattern: Option<&str>,
    author: Option<&str>,
    reverse: bool,
    json: bool,
) -> Result<()> {
    let mut filter = CommentFilter::new().reversed(reverse);
    if let Some(pattern) = pattern {
        filter = filter.pattern(pattern)?;
    }
    if let Some(author) = author {
        filter = filter.author(author);
    }

    let rt = tokio::runtime::Runtime::new()?;
    let comments = rt.block_on(comments_async(ctx, url, target, &filter))?;

    if json {
        output::print_json(&comments)?;
        return Ok(());
    }

    if comments.is_empty() {
        output::print("No comments.", ctx.verbosity());
        return Ok(());
    }

    for comment in &comments {
        println!("{}", format_comment(comment));
    }
    Ok(())
}

async fn comments_async(
    ctx: &Context,
    url: &str,
    target: Target,
    filter: &CommentFilter,
) -> Result<Vec<Comment>> {
    let config = ctx.load_config()?;
    let services = configured_services(&config)?;
    let project = get_project(url, &[], &services)
        .await
        .with_context(|| format!("cannot open project '{}'", url))?;

    output::debug(
        format!("fetching comments of {:?} in {}", target, project.full_repo_name()),
        ctx.verbosity(),
    );

    let comments = match target {
        Target::PullRequest(id) => project.get_pr_comments(id, filter).await?,
        Target::Issue(id) => project.get_issue_comments(id, filter).await?,
    };
    Ok(comments)
}

/// Header line plus indented body.
fn format_comment(comment: &Comment) -> String {
    let mut header = format!(
        "#{} {} ({})",
        comment.id,
        comment.author,
        comment.created.format("%Y-%m-%d %H:%M")
    );
    if comment.edited.is_some() {
        header.push_str(" [edited]");
    }

    let body = output::indent(&comment.body, "    ");
    format!("{}\n{}\n", header, body)
}
