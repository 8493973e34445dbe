//! # Error Types
//!
//! Two error families surface to the embedder (§7): a [`CompileError`]
//! collecting every diagnostic produced while compiling a source buffer,
//! and a [`RuntimeError`] describing why the dispatch loop halted early.
//! Both carry a source line and implement `Display`/`std::error::Error`
//! so callers can treat them uniformly.

use std::fmt;

/// A single compile-time diagnostic: a message tied to the source line the
/// parser was looking at when it noticed the problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub line: u32,
    pub message: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[line {}] Error: {}", self.line, self.message)
    }
}

impl std::error::Error for CompileError {}

/// Every diagnostic gathered by one `compile()` call. Compilation keeps
/// going after the first error (§4.2, §7) so a program with several
/// mistakes reports all of them in one pass.
#[derive(Debug, Clone, Default)]
pub struct CompileErrors(pub Vec<CompileError>);

impl CompileErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

/// A failure raised inside the VM's dispatch loop (§4.3, §7). Halts
/// execution immediately; there is no `try`/`catch` surface to recover
/// from it within the interpreted language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub line: u32,
    pub message: String,
}

impl RuntimeError {
    pub fn new(line: u32, message: impl Into<String>) -> Self {
        RuntimeError {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\n[line {}] in script", self.message, self.line)
    }
}

impl std::error::Error for RuntimeError {}

/// Top-level error returned by [`crate::run_source`], uniting the two
/// halves of the pipeline behind one type so the CLI layer can match on
/// it once.
#[derive(Debug)]
pub enum InterpretError {
    Compile(CompileErrors),
    Runtime(RuntimeError),
}

impl fmt::Display for InterpretError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterpretError::Compile(errs) => write!(f, "{}", errs),
            InterpretError::Runtime(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for InterpretError {}

impl From<CompileErrors> for InterpretError {
    fn from(errs: CompileErrors) -> Self {
        InterpretError::Compile(errs)
    }
}

impl From<RuntimeError> for InterpretError {
    fn from(err: RuntimeError) -> Self {
        InterpretError::Runtime(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_error_displays_line_and_message() {
        let err = CompileError {
            line: 3,
            message: "Expect ';' after expression.".to_string(),
        };
        assert_eq!(err.to_string(), "[line 3] Error: Expect ';' after expression.");
    }

    #[test]
    fn compile_errors_join_multiple_diagnostics_with_newlines() {
        let errs = CompileErrors(vec![
            CompileError { line: 1, message: "a".to_string() },
            CompileError { line: 2, message: "b".to_string() },
        ]);
        assert_eq!(errs.to_string(), "[line 1] Error: a\n[line 2] Error: b");
    }
}
