//! cli
//!
//! Command-line interface layer for forgework.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Set up logging
//! - Delegate to command handlers
//!
//! The CLI layer is thin. Handlers load the configuration, build services
//! through [`crate::forge`] and format the results.

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use std::path::PathBuf;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::ui::output::Verbosity;

/// Settings shared by every command.
#[derive(Debug, Clone, Default)]
pub struct Context {
    /// Explicit configuration file
    pub config_path: Option<PathBuf>,
    /// Debug output enabled
    pub debug: bool,
    /// Minimal output
    pub quiet: bool,
}

impl Context {
    /// Output verbosity for the global flags.
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.debug)
    }

    /// Load the configuration for this invocation.
    pub fn load_config(&self) -> Result<Config> {
        Ok(Config::load(self.config_path.as_deref())?)
    }
}

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`.
pub fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let ctx = Context {
        config_path: cli.config.clone(),
        debug: cli.debug,
        quiet: cli.quiet,
    };
    init_logging(ctx.verbosity());

    commands::dispatch(cli.command, &ctx)
}

/// Install the tracing subscriber. `RUST_LOG` overrides the flag-derived level.
fn init_logging(verbosity: Verbosity) {
    let default = match verbosity {
        Verbosity::Quiet => "forgework=error",
        Verbosity::Normal => "forgework=warn",
        Verbosity::Debug => "forgework=debug",
    };

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init();
}
