#![forbid(unsafe_code)]

use std::path::PathBuf;

use crate::error::SolverError;
use crate::term::{Sort, Term};

pub mod cli;
pub(crate) mod sexp;
#[cfg(feature = "z3")]
pub mod z3_native;

pub use cli::{CliSolver, CliSolverFactory};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SatResult {
    Sat,
    Unsat,
    /// The solver gave up; carries its reason (e.g. `timeout`).
    Unknown(String),
}

/// Raw model values keyed by symbol, in request order.
///
/// Values are kept as SMT-LIB text; [`crate::report::WitnessValue`] gives
/// them structure.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Model {
    pub values: Vec<(String, String)>,
}

impl Model {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

/// One incremental solver scope.
pub trait Solver {
    fn assert(&mut self, term: &Term) -> Result<(), SolverError>;

    fn push(&mut self);

    /// Drops every assertion made since the matching [`push`](Solver::push).
    fn pop(&mut self);

    fn check(&mut self) -> Result<SatResult, SolverError>;

    /// Values of `symbols` in the model of the last `sat` check.
    fn model(&mut self, symbols: &[(String, Sort)]) -> Result<Model, SolverError>;

    /// `check`, plus the values of `symbols` when the answer is `sat`.
    /// Backends that cannot keep a model between calls answer both at once.
    fn check_with_model(
        &mut self,
        symbols: &[(String, Sort)],
    ) -> Result<(SatResult, Option<Model>), SolverError> {
        let result = self.check()?;
        let model = match result {
            SatResult::Sat => Some(self.model(symbols)?),
            _ => None,
        };
        Ok((result, model))
    }
}

/// Hands out independent [`Solver`] scopes. There is no process-wide solver;
/// callers pass a factory by reference.
pub trait SolverFactory: Sync {
    fn name(&self) -> &str;

    /// A fresh scope sharing no assertions with any other.
    fn create(&self) -> Result<Box<dyn Solver>, SolverError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SmtProfile {
    /// Short per-query timeout for interactive use.
    Fast,
    /// CI-friendly medium timeout.
    #[default]
    Ci,
    /// Long timeout for quantifier-heavy modules.
    Thorough,
}

impl SmtProfile {
    pub fn timeout_ms(self) -> u64 {
        match self {
            SmtProfile::Fast => 1_000,
            SmtProfile::Ci => 5_000,
            SmtProfile::Thorough => 30_000,
        }
    }
}

/// How to run an SMT-LIB solver binary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SolverConfig {
    pub path: PathBuf,
    /// Per-query timeout; 0 disables it.
    pub timeout_ms: u64,
    pub extra_args: Vec<String>,
}

const BINARY: &str = "z3";
const COMMON_PATHS: &[&str] = &["/opt/homebrew/bin/z3", "/usr/local/bin/z3", "/usr/bin/z3"];

impl SolverConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timeout_ms: SmtProfile::default().timeout_ms(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_profile(self, profile: SmtProfile) -> Self {
        self.with_timeout(profile.timeout_ms())
    }

    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Looks for `z3` on `PATH`, then in common install locations.
    pub fn auto_detect() -> Result<Self, SolverError> {
        let on_path = std::env::var_os("PATH")
            .map(|paths| {
                std::env::split_paths(&paths)
                    .map(|dir| dir.join(BINARY))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();

        on_path
            .into_iter()
            .chain(COMMON_PATHS.iter().map(PathBuf::from))
            .find(|candidate| candidate.is_file())
            .map(Self::new)
            .ok_or_else(|| SolverError::NotFound(PathBuf::from(BINARY)))
    }

    pub fn validate(&self) -> Result<(), SolverError> {
        if !self.path.exists() {
            return Err(SolverError::NotFound(self.path.clone()));
        }
        Ok(())
    }

    /// Command-line arguments for reading a script from stdin.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec!["-in".to_string()];
        if self.timeout_ms > 0 {
            args.push(format!("-t:{}", self.timeout_ms));
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}
