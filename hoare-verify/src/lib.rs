#![forbid(unsafe_code)]

pub mod axioms;
pub mod encode;
pub mod error;
pub mod report;
pub mod solver;
pub mod subst;
pub mod term;
pub mod verify;
pub mod wellformed;
pub mod wp;

pub use axioms::{AxiomRegistry, AxiomSupplier, InductionHypothesis};
pub use encode::{Encoder, Env};
pub use error::{SolverError, SpecError, VerifyError};
pub use report::{
    Counterexample, FunctionReport, ModuleReport, VcOutcome, VcReport, Verdict, WitnessValue,
};
pub use solver::{
    CliSolver, CliSolverFactory, Model, SatResult, SmtProfile, Solver, SolverConfig, SolverFactory,
};
#[cfg(feature = "z3")]
pub use solver::z3_native::{Z3Factory, Z3Solver};
pub use subst::Substitution;
pub use term::{Sort, Term};
pub use verify::{Verifier, VerifyOptions};
pub use wellformed::check_function;
pub use wp::{Vc, VcKind, WpTransformer, function_vcs};
