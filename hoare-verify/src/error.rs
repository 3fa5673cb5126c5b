#![forbid(unsafe_code)]

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// A malformed annotation or program that makes a function unverifiable.
///
/// Raised before any solver work for the affected function starts.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum SpecError {
    #[error("undefined {kind} `{name}` referenced in `{function}`")]
    #[diagnostic(code(hoare::spec), help("declare `{name}` in the module"))]
    UndefinedReference {
        kind: &'static str,
        name: String,
        function: String,
    },

    #[error("`{name}` expects {expected} argument(s), got {found} (in `{function}`)")]
    #[diagnostic(code(hoare::spec))]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        function: String,
    },

    #[error("call to `{callee}` yields {count} value(s) where exactly one is required (in `{function}`)")]
    #[diagnostic(
        code(hoare::spec),
        help("multi-value calls may only appear as the whole right-hand side of an assignment")
    )]
    ResultCount {
        callee: String,
        count: usize,
        function: String,
    },

    #[error("assignment in `{function}` has {targets} target(s) but {values} value(s)")]
    #[diagnostic(code(hoare::spec))]
    AssignmentArity {
        targets: usize,
        values: usize,
        function: String,
    },

    #[error("`{name}` is not declared in `{function}`")]
    #[diagnostic(code(hoare::spec))]
    UnknownVariable { name: String, function: String },
}

#[derive(Debug, Error, Diagnostic)]
pub enum SolverError {
    #[error("SMT solver binary not found: {}", .0.display())]
    #[diagnostic(
        code(hoare::solver),
        help("install z3 or point `[solver] path` in hoare.toml at an SMT-LIB solver")
    )]
    NotFound(PathBuf),

    #[error("SMT solver process failed: {0}")]
    #[diagnostic(code(hoare::solver))]
    Process(String),

    #[error("unexpected SMT solver output: {0}")]
    #[diagnostic(code(hoare::solver))]
    Parse(String),

    #[error("SMT backend error: {0}")]
    #[diagnostic(code(hoare::solver))]
    Backend(String),
}

#[derive(Debug, Error, Diagnostic)]
pub enum VerifyError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Solver(#[from] SolverError),
}
