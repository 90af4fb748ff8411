//! cli::commands::search
//!
//! Find the first regex match in a pull request's comments and description.

use anyhow::{bail, Context as _, Result};
use regex::Regex;

use super::configured_services;
use crate::cli::Context;
use crate::forge::{get_project, MatchSource, SearchMatch};
use crate::ui::output;

/// Run the search command.
///
/// Fails when nothing matches, so scripts can test the exit status.
pub fn search(
    ctx: &Context,
    url: &str,
    pr_id: u64,
    pattern: &str,
    reverse: bool,
    description: bool,
    json: bool,
) -> Result<()> {
    let regex = Regex::new(pattern).with_context(|| format!("invalid pattern '{}'", pattern))?;

    let rt = tokio::runtime::Runtime::new()?;
    let found = rt.block_on(search_async(ctx, url, pr_id, &regex, reverse, description))?;

    let Some(found) = found else {
        bail!("no match for '{}' in pull request #{}", pattern, pr_id);
    };

    if json {
        output::print_json(&found)?;
    } else {
        println!("{}", describe_match(&found));
    }
    Ok(())
}

async fn search_async(
    ctx: &Context,
    url: &str,
    pr_id: u64,
    regex: &Regex,
    reverse: bool,
    description: bool,
) -> Result<Option<SearchMatch>> {
    let config = ctx.load_config()?;
    let services = configured_services(&config)?;
    let project = get_project(url, &[], &services)
        .await
        .with_context(|| format!("cannot open project '{}'", url))?;

    Ok(project
        .search_in_pr(pr_id, regex, reverse, description)
        .await?)
}

/// Where the match is, what matched, and the capture groups.
fn describe_match(found: &SearchMatch) -> String {
    let location = match &found.source {
        MatchSource::Description => "description".to_string(),
        MatchSource::Comment { id, author } => format!("comment #{} by {}", id, author),
    };

    let mut lines = vec![format!("{}: {}", location, found.matched)];
    for (index, group) in found.groups.iter().enumerate() {
        lines.push(format!(
            "  group {}: {}",
            index + 1,
            group.as_deref().unwrap_or("<none>")
        ));
    }
    lines.join("\n")
}
