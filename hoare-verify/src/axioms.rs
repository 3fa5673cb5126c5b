#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use hoare_ast::{CmpOp, Expr, FunctionDef, Predicate, VarType};

use crate::subst::{fresh_name, free_vars_expr};

/// Extra facts at a self-recursive call site, on top of the one unfolding of
/// the callee's postcondition. None of them is sound in general, so they are
/// opt-in per function.
pub trait AxiomSupplier: Send + Sync {
    fn name(&self) -> &str;

    /// Predicates assumed at a self-recursive call `callee(args)`, stated in
    /// the caller's scope.
    fn call_axioms(&self, callee: &FunctionDef, args: &[Expr]) -> Vec<Predicate>;
}

#[derive(Clone, Default)]
pub struct AxiomRegistry {
    suppliers: BTreeMap<String, Vec<Arc<dyn AxiomSupplier>>>,
}

impl AxiomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, function: impl Into<String>, supplier: Arc<dyn AxiomSupplier>) {
        self.suppliers.entry(function.into()).or_default().push(supplier);
    }

    /// Registers [`InductionHypothesis`] for each named function.
    pub fn with_induction<I, S>(mut self, functions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let supplier: Arc<dyn AxiomSupplier> = Arc::new(InductionHypothesis);
        for f in functions {
            self.register(f, Arc::clone(&supplier));
        }
        self
    }

    pub fn suppliers_for(&self, function: &str) -> &[Arc<dyn AxiomSupplier>] {
        self.suppliers.get(function).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.suppliers.is_empty()
    }
}

impl fmt::Debug for AxiomRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.suppliers
                    .iter()
                    .map(|(func, s)| (func, s.iter().map(|s| s.name()).collect::<Vec<_>>())),
            )
            .finish()
    }
}

/// For `f(a0, a1, ..)` with an `int` first parameter: the postcondition of
/// `f` holds for every first argument in `[0, a0)`.
///
/// `forall k: int. 0 <= k && k < a0 ==> f(k, a1, ..)`
#[derive(Clone, Copy, Debug, Default)]
pub struct InductionHypothesis;

impl AxiomSupplier for InductionHypothesis {
    fn name(&self) -> &str {
        "induction"
    }

    fn call_axioms(&self, callee: &FunctionDef, args: &[Expr]) -> Vec<Predicate> {
        let Some((first, rest)) = args.split_first() else {
            return Vec::new();
        };
        if callee.params.first().map(|p| p.ty) != Some(VarType::Int) {
            return Vec::new();
        }

        let taken = args.iter().flat_map(free_vars_expr).collect();
        let k = fresh_name("k", &taken);

        let range = Predicate::conj(
            Predicate::cmp(Expr::num(0), CmpOp::Le, Expr::var(&k)),
            Predicate::cmp(Expr::var(&k), CmpOp::Lt, first.clone()),
        );
        let smaller = std::iter::once(Expr::var(&k))
            .chain(rest.iter().cloned())
            .collect();
        let instance = Predicate::formula(callee.name.clone(), smaller);

        vec![Predicate::forall(k, VarType::Int, Predicate::imply(range, instance))]
    }
}
