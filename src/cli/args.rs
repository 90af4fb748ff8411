//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--config <path>`: Use this configuration file
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// fw - one command line for GitHub and GitLab
#[derive(Parser, Debug)]
#[command(name = "fw")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (default: the XDG and home locations)
    #[arg(long, global = true, value_name = "PATH", env = "FORGEWORK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List pull request or issue comments
    #[command(
        name = "comments",
        long_about = "List the comments of a pull request or an issue.\n\n\
            Comments are shown oldest first. --reverse shows the newest first; \
            the order is applied before --filter and --author.",
        after_help = "\
EXAMPLES:
    # Every comment of a pull request
    fw comments https://github.com/packit/ogr --pr 42

    # Newest first, only bot commands from one person
    fw comments https://gitlab.com/group/project --pr 7 --filter '^/packit' --author alice --reverse

    # Issue comments as JSON
    fw comments git@github.com:packit/ogr.git --issue 12 --json"
    )]
    Comments {
        /// Repository URL (https, ssh or scp-like)
        url: String,

        /// Pull request number
        #[arg(long, conflicts_with = "issue", required_unless_present = "issue")]
        pr: Option<u64>,

        /// Issue number
        #[arg(long)]
        issue: Option<u64>,

        /// Only comments whose body matches this regex
        #[arg(long, value_name = "REGEX")]
        filter: Option<String>,

        /// Only comments by this author
        #[arg(long)]
        author: Option<String>,

        /// Newest comment first
        #[arg(long)]
        reverse: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Find the first regex match in a pull request
    #[command(
        name = "search",
        long_about = "Search a pull request's comments and description for a regex.\n\n\
            Reports the first match. The description is searched before the first \
            comment, or after the last one with --reverse.",
        after_help = "\
EXAMPLES:
    # Which issue does the PR fix?
    fw search https://github.com/packit/ogr --pr 42 'Fixes #(\\d+)'

    # Latest /packit command, ignoring the description
    fw search https://github.com/packit/ogr --pr 42 '^/packit (\\w+)' --reverse --no-description"
    )]
    Search {
        /// Repository URL (https, ssh or scp-like)
        url: String,

        /// Pull request number
        #[arg(long)]
        pr: u64,

        /// Regex to search for
        pattern: String,

        /// Search newest comment first, description last
        #[arg(long)]
        reverse: bool,

        /// Do not search the description
        #[arg(long)]
        no_description: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a repository
    #[command(
        name = "create-project",
        after_help = "\
EXAMPLES:
    # In your own namespace on the default service
    fw create-project my-tool

    # In a group on a configured GitLab instance
    fw create-project my-tool --namespace team --service https://gitlab.example.com"
    )]
    CreateProject {
        /// Repository name
        repo: String,

        /// Organization or group; defaults to the authenticated user
        #[arg(long)]
        namespace: Option<String>,

        /// Configured service key; defaults to default_service
        #[arg(long, value_name = "KEY")]
        service: Option<String>,
    },

    /// Show the authenticated user
    Whoami {
        /// Configured service key; defaults to default_service
        #[arg(long, value_name = "KEY")]
        service: Option<String>,
    },

    /// List configured services
    Services,

    /// Generate shell completion scripts
    #[command(
        name = "completion",
        after_help = "\
EXAMPLES:
    # Bash (add to ~/.bashrc)
    fw completion bash >> ~/.bashrc

    # Zsh (add to ~/.zshrc)
    fw completion zsh >> ~/.zshrc

    # Fish
    fw completion fish > ~/.config/fish/completions/fw.fish"
    )]
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}
