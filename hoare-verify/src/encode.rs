#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use hoare_ast::{
    ArithOp, Binding, CmpOp, Expr, FormulaRef, FunctionDef, Module, Predicate, Quant, Quantifier,
};
use tracing::{debug, trace};

use crate::axioms::AxiomRegistry;
use crate::error::{SpecError, VerifyError};
use crate::solver::{SatResult, SolverFactory};
use crate::term::{Arith, Rel, Sort, Term};

/// Source names in scope, mapped to the terms they denote.
pub type Env = BTreeMap<String, Term>;

pub const DEFAULT_MAX_DEPTH: usize = 10;

/// One constant per parameter, return and local of `function`.
pub fn binding_env(function: &FunctionDef) -> Env {
    function
        .bindings()
        .map(|b| (b.name.clone(), Term::constant(b.name.clone(), b.ty.into())))
        .collect()
}

/// Name of the uninterpreted function standing for one result of `function`.
pub fn result_function(function: &str, ret: &str) -> String {
    format!("{function}.{ret}")
}

/// Lowers predicates and expressions into SMT terms.
///
/// Every `(callee, return)` pair is an uninterpreted function
/// `callee.return`; the callee's postcondition is assumed at the call site
/// through side assertions collected with [`Encoder::take_side_assertions`].
/// Quantifier bodies, formula bodies, callee postconditions and axiom
/// instances are encoded one level deeper, and past `max_depth` they collapse
/// to `true`.
pub struct Encoder<'a> {
    module: &'a Module,
    function: &'a FunctionDef,
    axioms: &'a AxiomRegistry,
    factory: &'a dyn SolverFactory,
    max_depth: usize,
    sink: Vec<Term>,
    /// Universally bound symbols enclosing the term being encoded.
    bound: Vec<(String, Sort)>,
    fresh: usize,
}

impl<'a> Encoder<'a> {
    pub fn new(
        module: &'a Module,
        function: &'a FunctionDef,
        axioms: &'a AxiomRegistry,
        factory: &'a dyn SolverFactory,
    ) -> Self {
        Self {
            module,
            function,
            axioms,
            factory,
            max_depth: DEFAULT_MAX_DEPTH,
            sink: Vec::new(),
            bound: Vec::new(),
            fresh: 0,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Side assertions produced since the last call.
    pub fn take_side_assertions(&mut self) -> Vec<Term> {
        std::mem::take(&mut self.sink)
    }

    fn next_id(&mut self) -> usize {
        self.fresh += 1;
        self.fresh
    }

    fn spec_err(&self, err: SpecError) -> VerifyError {
        VerifyError::Spec(err)
    }

    /// Records a side assertion, closed over the enclosing bound symbols.
    fn assume(&mut self, fact: Term) {
        if matches!(fact, Term::Bool(true)) {
            return;
        }
        let fact = if self.bound.is_empty() {
            fact
        } else {
            Term::Forall(self.bound.clone(), Box::new(fact))
        };
        trace!(%fact, "side assertion");
        self.sink.push(fact);
    }

    pub fn encode_predicate(
        &mut self,
        pred: &Predicate,
        env: &Env,
        depth: usize,
    ) -> Result<Term, VerifyError> {
        Ok(match pred {
            Predicate::True => Term::Bool(true),
            Predicate::False => Term::Bool(false),
            Predicate::Compare { left, op, right } => {
                let l = self.encode_expr(left, env, depth)?;
                let r = self.encode_expr(right, env, depth)?;
                match op {
                    CmpOp::Eq => Term::eq(l, r),
                    CmpOp::Ne => Term::not(Term::eq(l, r)),
                    CmpOp::Gt => Term::rel(Rel::Gt, l, r),
                    CmpOp::Lt => Term::rel(Rel::Lt, l, r),
                    CmpOp::Ge => Term::rel(Rel::Ge, l, r),
                    CmpOp::Le => Term::rel(Rel::Le, l, r),
                }
            }
            Predicate::Not(p) => Term::not(self.encode_predicate(p, env, depth)?),
            Predicate::And(l, r) => Term::and(vec![
                self.encode_predicate(l, env, depth)?,
                self.encode_predicate(r, env, depth)?,
            ]),
            Predicate::Or(l, r) => Term::or(vec![
                self.encode_predicate(l, env, depth)?,
                self.encode_predicate(r, env, depth)?,
            ]),
            Predicate::Implies(l, r) => Term::implies(
                self.encode_predicate(l, env, depth)?,
                self.encode_predicate(r, env, depth)?,
            ),
            Predicate::Paren(p) => self.encode_predicate(p, env, depth)?,
            Predicate::Quantifier(_) | Predicate::Formula(_) if depth > self.max_depth => {
                debug!(depth, "unfolding limit reached, assuming `{pred}`");
                Term::Bool(true)
            }
            Predicate::Quantifier(q) => match q.quant {
                Quant::Forall => self.encode_forall(q, env, depth)?,
                Quant::Exists => self.encode_exists(q, env, depth)?,
            },
            Predicate::Formula(r) => self.encode_formula_ref(r, env, depth)?,
        })
    }

    fn bind_fresh(&mut self, q: &Quantifier, env: &Env) -> (String, Sort, Env) {
        let id = self.next_id();
        let symbol = format!("{}!q{id}", q.var);
        let sort = Sort::from(q.ty);
        let mut inner = env.clone();
        inner.insert(q.var.clone(), Term::constant(symbol.clone(), sort));
        (symbol, sort, inner)
    }

    fn encode_forall(
        &mut self,
        q: &Quantifier,
        env: &Env,
        depth: usize,
    ) -> Result<Term, VerifyError> {
        let (symbol, sort, inner) = self.bind_fresh(q, env);
        self.bound.push((symbol.clone(), sort));
        let body = self.encode_predicate(&q.body, &inner, depth + 1);
        self.bound.pop();
        Ok(Term::Forall(vec![(symbol, sort)], Box::new(body?)))
    }

    /// Decided on the spot by a standalone query on the body: `false` when it
    /// is unsatisfiable, `true` otherwise.
    fn encode_exists(
        &mut self,
        q: &Quantifier,
        env: &Env,
        depth: usize,
    ) -> Result<Term, VerifyError> {
        let (_, _, inner) = self.bind_fresh(q, env);
        let mark = self.sink.len();
        let body = self.encode_predicate(&q.body, &inner, depth + 1)?;
        let side = self.sink.split_off(mark);

        let mut solver = self.factory.create()?;
        for fact in &side {
            solver.assert(fact)?;
        }
        solver.assert(&body)?;
        let result = solver.check()?;
        debug!(var = %q.var, ?result, "existential sub-query");
        Ok(Term::Bool(!matches!(result, SatResult::Unsat)))
    }

    fn encode_formula_ref(
        &mut self,
        r: &FormulaRef,
        env: &Env,
        depth: usize,
    ) -> Result<Term, VerifyError> {
        let module = self.module;
        if let Some(formula) = module.formula(&r.name) {
            let params = self.encode_args(&r.name, &formula.params, &r.args, env, depth)?;
            return self.encode_predicate(&formula.body, &params, depth + 1);
        }

        let Some(function) = module.function(&r.name) else {
            return Err(self.spec_err(SpecError::UndefinedReference {
                kind: "formula",
                name: r.name.clone(),
                function: self.function.name.clone(),
            }));
        };
        let args = self.encode_args(&r.name, &function.params, &r.args, env, depth)?;
        let Some(ensures) = &function.ensures else {
            return Ok(Term::Bool(true));
        };

        let arg_terms = function
            .params
            .iter()
            .filter_map(|p| args.get(&p.name).cloned())
            .collect::<Vec<_>>();
        let mut scope = args;
        for ret in &function.returns {
            let app = Term::App {
                func: result_function(&function.name, &ret.name),
                args: arg_terms.clone(),
                sort: ret.ty.into(),
            };
            scope.insert(ret.name.clone(), app);
        }
        self.encode_predicate(ensures, &scope, depth + 1)
    }

    /// Arity-checks `args` against `params` and binds each parameter to its
    /// encoded argument.
    fn encode_args(
        &mut self,
        name: &str,
        params: &[Binding],
        args: &[Expr],
        env: &Env,
        depth: usize,
    ) -> Result<Env, VerifyError> {
        if params.len() != args.len() {
            return Err(self.spec_err(SpecError::ArityMismatch {
                name: name.to_string(),
                expected: params.len(),
                found: args.len(),
                function: self.function.name.clone(),
            }));
        }
        params
            .iter()
            .zip(args)
            .map(|(p, a)| -> Result<(String, Term), VerifyError> {
                Ok((p.name.clone(), self.encode_expr(a, env, depth)?))
            })
            .collect()
    }

    pub fn encode_expr(&mut self, expr: &Expr, env: &Env, depth: usize) -> Result<Term, VerifyError> {
        Ok(match expr {
            Expr::Num(n) => Term::Int(*n),
            Expr::Var(name) => env.get(name).cloned().ok_or_else(|| {
                self.spec_err(SpecError::UnknownVariable {
                    name: name.clone(),
                    function: self.function.name.clone(),
                })
            })?,
            Expr::Neg(e) => Term::Neg(Box::new(self.encode_expr(e, env, depth)?)),
            Expr::Binary { op, left, right } => {
                let l = self.encode_expr(left, env, depth)?;
                let r = self.encode_expr(right, env, depth)?;
                let op = match op {
                    ArithOp::Add => Arith::Add,
                    ArithOp::Sub => Arith::Sub,
                    ArithOp::Mul => Arith::Mul,
                    ArithOp::Div => Arith::Div,
                };
                Term::arith(op, l, r)
            }
            Expr::Call { callee, args } => self.encode_call(callee, args, env, depth)?,
            Expr::Index { array, index } => Term::select(
                self.encode_expr(array, env, depth)?,
                self.encode_expr(index, env, depth)?,
            ),
            Expr::Update {
                array,
                index,
                value,
            } => Term::store(
                self.encode_expr(array, env, depth)?,
                self.encode_expr(index, env, depth)?,
                self.encode_expr(value, env, depth)?,
            ),
        })
    }

    fn encode_call(
        &mut self,
        callee: &str,
        args: &[Expr],
        env: &Env,
        depth: usize,
    ) -> Result<Term, VerifyError> {
        let module = self.module;
        let def = module.function(callee).ok_or_else(|| {
            self.spec_err(SpecError::UndefinedReference {
                kind: "function",
                name: callee.to_string(),
                function: self.function.name.clone(),
            })
        })?;
        let [ret] = def.returns.as_slice() else {
            return Err(self.spec_err(SpecError::ResultCount {
                callee: callee.to_string(),
                count: def.returns.len(),
                function: self.function.name.clone(),
            }));
        };

        let mut scope = self.encode_args(callee, &def.params, args, env, depth)?;
        let arg_terms = def
            .params
            .iter()
            .filter_map(|p| scope.get(&p.name).cloned())
            .collect::<Vec<_>>();
        let app = Term::App {
            func: result_function(callee, &ret.name),
            args: arg_terms,
            sort: ret.ty.into(),
        };
        if depth > self.max_depth {
            return Ok(app);
        }

        // Outside quantifiers the result gets a named constant, which shows
        // up in models; under a binder the application itself is used.
        let result = if self.bound.is_empty() {
            let id = self.next_id();
            let name = format!("{}_call_{callee}_{}_{id}", self.function.name, ret.name);
            let c = Term::constant(name, ret.ty.into());
            self.assume(Term::eq(c.clone(), app));
            c
        } else {
            app
        };

        if let Some(ensures) = &def.ensures {
            scope.insert(ret.name.clone(), result.clone());
            let fact = self.encode_predicate(ensures, &scope, depth + 1)?;
            self.assume(fact);
        }

        if callee == self.function.name {
            let axioms = self.axioms;
            for supplier in axioms.suppliers_for(callee) {
                for axiom in supplier.call_axioms(def, args) {
                    trace!(supplier = supplier.name(), %axiom, "call axiom");
                    let fact = self.encode_predicate(&axiom, env, depth + 1)?;
                    self.assume(fact);
                }
            }
        }

        Ok(result)
    }
}
