//! Wisp interpreter entry point.
//!
//! Thin CLI glue around [`wisp_runtime::run_source`] (§6): load the one
//! source-path argument, compile and run it, and print any diagnostic
//! through the colour-hint helper. Per §6/§9, the process always exits 0:
//! a compile or runtime error is advisory output, not a process failure,
//! and a malformed argument list just prints a usage line and returns.

use std::env;
use std::fs;

use wisp_runtime::hint::red_hint;
use wisp_runtime::run_source;

fn usage() -> String {
    format!("Usage: {} <source-path>", env!("CARGO_BIN_NAME"))
}

/// Read a source file into an owned string (§6 "File format"). No trailing
/// sentinel is appended; the scanner checks the cursor against the
/// buffer's length instead of scanning for a terminator byte.
fn load_source(path: &str) -> Result<String, std::io::Error> {
    fs::read_to_string(path)
}

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() != 2 {
        println!("{}", usage());
        return;
    }

    let source = match load_source(&args[1]) {
        Ok(source) => source,
        Err(err) => {
            red_hint(&format!("Could not read '{}': {}", args[1], err));
            return;
        }
    };

    if let Err(err) = run_source(&source) {
        red_hint(&err.to_string());
    }
}
