//! whoami command - Show the authenticated user of a configured service

use anyhow::Result;

use super::configured_service;
use crate::cli::Context;

/// Run the whoami command.
pub fn whoami(ctx: &Context, service_key: Option<&str>) -> Result<()> {
    let config = ctx.load_config()?;
    let service = configured_service(&config, service_key)?;

    let rt = tokio::runtime::Runtime::new()?;
    let username = rt.block_on(service.user().get_username())?;

    println!("{}", username);
    Ok(())
}
