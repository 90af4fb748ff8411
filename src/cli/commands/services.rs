//! cli::commands::services
//!
//! List configured services with secrets masked.

use anyhow::Result;

use super::configured_services;
use crate::cli::Context;
use crate::ui::output;

/// Run the services command.
pub fn services(ctx: &Context) -> Result<()> {
    let config = ctx.load_config()?;
    let verbosity = ctx.verbosity();

    match config.loaded_from() {
        Some(path) => output::debug(format!("config: {}", path.display()), verbosity),
        None => {
            output::print("No configuration file found.", verbosity);
            return Ok(());
        }
    }

    let services = configured_services(&config)?;
    if services.is_empty() {
        output::print("No services configured.", verbosity);
        return Ok(());
    }

    if config.default_service().is_none() {
        output::warn(
            "no default_service set; create-project and whoami need --service",
            verbosity,
        );
    }

    for (key, service) in config.services().keys().zip(&services) {
        let marker = if config.default_service() == Some(key.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{} {} [{}] {}", marker, key, service.name(), service);
    }
    Ok(())
}
