//! ui
//!
//! Terminal output helpers.
//!
//! Results and status lines go to stdout; warnings and errors go to stderr so
//! that `--json` output stays machine-readable.

pub mod output;
