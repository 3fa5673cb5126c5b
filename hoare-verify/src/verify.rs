#![forbid(unsafe_code)]

use std::time::{Duration, Instant};

use hoare_ast::{Binding, FunctionDef, Module};
use rayon::prelude::*;
use tracing::{debug, info, info_span, warn};

use crate::axioms::AxiomRegistry;
use crate::encode::{DEFAULT_MAX_DEPTH, Encoder, binding_env};
use crate::error::VerifyError;
use crate::report::{
    Counterexample, FunctionReport, ModuleReport, VcOutcome, VcReport, Verdict, WitnessValue,
};
use crate::solver::{Model, SatResult, Solver, SolverFactory};
use crate::term::{Sort, Term};
use crate::wellformed::check_function;
use crate::wp::{Vc, function_vcs};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyOptions {
    /// Nesting limit for quantifier, formula and call unfolding.
    pub max_unfold_depth: usize,
    /// Verify functions concurrently on the rayon pool.
    pub parallel: bool,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            max_unfold_depth: DEFAULT_MAX_DEPTH,
            parallel: true,
        }
    }
}

/// Checks well-formedness, generates VCs, and discharges each VC in its own
/// push/pop scope of one solver per function.
pub struct Verifier<'f> {
    factory: &'f dyn SolverFactory,
    axioms: AxiomRegistry,
    options: VerifyOptions,
}

impl<'f> Verifier<'f> {
    pub fn new(factory: &'f dyn SolverFactory) -> Self {
        Self {
            factory,
            axioms: AxiomRegistry::default(),
            options: VerifyOptions::default(),
        }
    }

    pub fn with_options(mut self, options: VerifyOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_axioms(mut self, axioms: AxiomRegistry) -> Self {
        self.axioms = axioms;
        self
    }

    pub fn options(&self) -> &VerifyOptions {
        &self.options
    }

    /// Verifies every function; the module holds iff all of them do.
    pub fn verify_module(&self, module: &Module) -> ModuleReport {
        let functions = if self.options.parallel {
            module
                .functions
                .par_iter()
                .map(|f| self.verify_function(module, f))
                .collect()
        } else {
            module
                .functions
                .iter()
                .map(|f| self.verify_function(module, f))
                .collect()
        };
        ModuleReport { functions }
    }

    pub fn verify_function(&self, module: &Module, function: &FunctionDef) -> FunctionReport {
        let span = info_span!("verify", function = %function.name, backend = self.factory.name());
        let _guard = span.enter();

        let vcs = match check_function(module, function).and_then(|()| function_vcs(module, function)) {
            Ok(vcs) => vcs,
            Err(err) => {
                warn!(%err, "specification error");
                return FunctionReport {
                    function: function.name.clone(),
                    vcs: Vec::new(),
                    result: Err(err.into()),
                };
            }
        };
        debug!(count = vcs.len(), "generated verification conditions");

        let mut reports = Vec::with_capacity(vcs.len());
        let result = self.discharge(module, function, &vcs, &mut reports);
        reports.extend(vcs[reports.len()..].iter().map(|vc| VcReport {
            kind: vc.kind,
            outcome: VcOutcome::NotChecked,
            elapsed: Duration::ZERO,
        }));

        match &result {
            Ok(Verdict::Verified) => info!("verified"),
            Ok(Verdict::Falsified(cex)) => info!(vc = %cex.vc, %cex, "falsified"),
            Ok(Verdict::Inconclusive(reason)) => warn!(%reason, "inconclusive"),
            Err(err) => warn!(%err, "verification aborted"),
        }
        FunctionReport {
            function: function.name.clone(),
            vcs: reports,
            result,
        }
    }

    /// Checks `vcs` in order, stopping at the first one that is not proved.
    fn discharge(
        &self,
        module: &Module,
        function: &FunctionDef,
        vcs: &[Vc],
        reports: &mut Vec<VcReport>,
    ) -> Result<Verdict, VerifyError> {
        let mut solver = self.factory.create()?;
        let mut encoder = Encoder::new(module, function, &self.axioms, self.factory)
            .with_max_depth(self.options.max_unfold_depth);
        let env = binding_env(function);

        let mut assumptions = match &function.requires {
            Some(requires) => vec![encoder.encode_predicate(requires, &env, 0)?],
            None => Vec::new(),
        };
        assumptions.extend(encoder.take_side_assertions());

        for vc in vcs {
            let start = Instant::now();
            let goal = encoder.encode_predicate(&vc.predicate, &env, 0)?;
            let side = encoder.take_side_assertions();
            debug!(kind = %vc.kind, vc = %vc.predicate, "checking");

            solver.push();
            let checked = check_scope(
                solver.as_mut(),
                &assumptions,
                &side,
                goal,
                &symbols(function),
            );
            let outcome = match checked {
                Ok((SatResult::Sat, model)) => Ok(Verdict::Falsified(counterexample(
                    function,
                    vc,
                    &model.unwrap_or_default(),
                ))),
                Ok((SatResult::Unsat, _)) => Ok(Verdict::Verified),
                Ok((SatResult::Unknown(reason), _)) => Ok(Verdict::Inconclusive(reason)),
                Err(err) => Err(err),
            };
            solver.pop();

            let elapsed = start.elapsed();
            let verdict = outcome?;
            let vc_outcome = match &verdict {
                Verdict::Verified => VcOutcome::Proved,
                Verdict::Falsified(_) => VcOutcome::Refuted,
                Verdict::Inconclusive(reason) => VcOutcome::Unknown(reason.clone()),
            };
            debug!(kind = %vc.kind, outcome = %vc_outcome, ?elapsed, "checked");
            reports.push(VcReport {
                kind: vc.kind,
                outcome: vc_outcome,
                elapsed,
            });
            if verdict != Verdict::Verified {
                return Ok(verdict);
            }
        }
        Ok(Verdict::Verified)
    }
}

/// Asserts the scope's facts and the negated goal, then checks. The model
/// comes back with a `sat` answer.
fn check_scope(
    solver: &mut dyn Solver,
    assumptions: &[Term],
    side: &[Term],
    goal: Term,
    symbols: &[(String, Sort)],
) -> Result<(SatResult, Option<Model>), VerifyError> {
    for fact in assumptions.iter().chain(side) {
        solver.assert(fact)?;
    }
    solver.assert(&Term::not(goal))?;
    Ok(solver.check_with_model(symbols)?)
}

fn symbols(function: &FunctionDef) -> Vec<(String, Sort)> {
    function
        .bindings()
        .map(|b| (b.name.clone(), Sort::from(b.ty)))
        .collect()
}

fn counterexample(function: &FunctionDef, vc: &Vc, model: &Model) -> Counterexample {
    let values = |bindings: &[Binding]| -> Vec<(String, WitnessValue)> {
        bindings
            .iter()
            .map(|b| {
                let value = model
                    .get(&b.name)
                    .map(WitnessValue::parse)
                    .unwrap_or_else(|| WitnessValue::Raw("?".to_string()));
                (b.name.clone(), value)
            })
            .collect()
    };
    Counterexample {
        function: function.name.clone(),
        vc: vc.kind,
        params: values(&function.params),
        returns: values(&function.returns),
        locals: values(&function.locals),
    }
}
