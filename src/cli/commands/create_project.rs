//! cli::commands::create_project
//!
//! Create a repository on a configured service.
//!
//! # Example
//!
//! ```bash
//! fw create-project my-tool
//! fw create-project my-tool --namespace team --service https://gitlab.example.com
//! ```

use anyhow::{Context as _, Result};

use super::configured_service;
use crate::cli::Context;
use crate::ui::output;

/// Run the create-project command.
pub fn create_project(
    ctx: &Context,
    repo: &str,
    namespace: Option<&str>,
    service_key: Option<&str>,
) -> Result<()> {
    let config = ctx.load_config()?;
    let service = configured_service(&config, service_key)?;
    output::debug(format!("creating '{}' via {}", repo, service), ctx.verbosity());

    let rt = tokio::runtime::Runtime::new()?;
    let project = rt
        .block_on(service.project_create(repo, namespace))
        .with_context(|| format!("failed to create project '{}'", repo))?;

    output::success(
        format!(
            "Created {} on {}",
            project.full_repo_name(),
            service.instance_url()
        ),
        ctx.verbosity(),
    );
    Ok(())
}
