//! ui::output
//!
//! Printing helpers shared by the commands.
//!
//! `--quiet` suppresses status and warnings but never results or errors.
//! JSON results are printed unconditionally so scripts can rely on them.

use std::fmt::Display;

use serde::Serialize;

/// How chatty the CLI is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Debug,
}

impl Verbosity {
    /// `--quiet` wins over `--debug`.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        match (quiet, debug) {
            (true, _) => Verbosity::Quiet,
            (false, true) => Verbosity::Debug,
            (false, false) => Verbosity::Normal,
        }
    }

    fn shows_status(self) -> bool {
        self != Verbosity::Quiet
    }
}

/// Status line on stdout.
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity.shows_status() {
        println!("{}", message);
    }
}

/// Debug line on stderr, only with `--debug`.
pub fn debug(message: impl Display, verbosity: Verbosity) {
    if verbosity == Verbosity::Debug {
        eprintln!("[debug] {}", message);
    }
}

pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity.shows_status() {
        eprintln!("warning: {}", message);
    }
}

/// Confirmation of a completed change.
pub fn success(message: impl Display, verbosity: Verbosity) {
    if verbosity.shows_status() {
        println!("✓ {}", message);
    }
}

/// Pretty-printed JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Prefix every line of `text`. An empty text yields an empty string.
pub fn indent(text: &str, prefix: &str) -> String {
    text.lines()
        .map(|line| format!("{}{}", prefix, line))
        .collect::<Vec<_>>()
        .join("\n")
}
