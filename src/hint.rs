//! # Terminal Colour Hints
//!
//! A thin wrapper around [`colored`] so the rest of the pipeline never
//! touches ANSI escape codes directly (§6, §7: "diagnostics go to
//! standard output via a coloured-hint helper"). Kept deliberately tiny,
//! one function per hint kind used elsewhere in the crate.

use colored::Colorize;

/// Print a diagnostic line in red, the way the source's `redHint` does.
pub fn red_hint(message: &str) {
    println!("{}", message.red());
}
