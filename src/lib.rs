//! # Wisp
//!
//! A small dynamically-typed scripting language with first-class
//! functions and lexical closures (§1). Source is compiled straight to
//! bytecode by [`compiler::compile`] (no intermediate AST) and executed
//! in-process by [`vm::Vm`].
//!
//! [`run_source`] is the single embeddable entry point: it owns the
//! string interner shared between compile time and run time, wires a
//! freshly compiled program into a fresh VM, and reports either flavor
//! of failure through [`error::InterpretError`]. [`run_source_to`] is the
//! same pipeline with the `print` sink parameterized, which `run_source`
//! delegates to. It's useful for embedders and tests that want to capture
//! output instead of writing to the process's real stdout.

pub mod chunk;
pub mod compiler;
pub mod error;
pub mod hint;
pub mod object;
pub mod scanner;
pub mod table;
pub mod value;
pub mod vm;

use std::io::Write;

use object::Interner;

/// Compile and run a Wisp program, printing to real standard output.
///
/// Returns `Err` for either a failed compile (every diagnostic collected,
/// not just the first) or a runtime error that halted execution partway
/// through (§6, §7). Whatever the program printed before a runtime error
/// has already reached stdout; there is no rollback.
pub fn run_source(source: &str) -> Result<(), error::InterpretError> {
    run_source_to(source, std::io::stdout())
}

/// Compile and run a Wisp program, directing `print` output to `sink`
/// instead of real standard output. This is what `run_source` delegates
/// to; it is exposed separately so the end-to-end test suite can capture
/// a program's printed output without touching the process's actual
/// stdout.
pub fn run_source_to<W: Write>(source: &str, sink: W) -> Result<(), error::InterpretError> {
    let mut interner = Interner::new();
    let function = compiler::compile(source, &mut interner)?;
    let mut machine = vm::Vm::with_writer(interner, sink);
    machine.interpret(function)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_surfaces_as_interpret_error() {
        let result = run_source("var = 1;");
        assert!(matches!(result, Err(error::InterpretError::Compile(_))));
    }

    #[test]
    fn runtime_error_surfaces_as_interpret_error() {
        let result = run_source("print undefined_name;");
        assert!(matches!(result, Err(error::InterpretError::Runtime(_))));
    }

    #[test]
    fn well_formed_program_runs_to_completion() {
        assert!(run_source("print 1 + 1;").is_ok());
    }
}
