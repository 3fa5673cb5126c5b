#![forbid(unsafe_code)]

use std::collections::HashMap;

use tracing::debug;
use z3::ast::{self, Ast, Bool, Dynamic, Int};
use z3::{Config, Context, FuncDecl, Params, SatResult as Z3Result};

use super::{Model, SatResult, Solver, SolverFactory};
use crate::error::SolverError;
use crate::term::{Arith, Rel, Sort, Term};

thread_local! {
    static CONTEXT: &'static Context = {
        let mut cfg = Config::new();
        cfg.set_model_generation(true);
        Box::leak(Box::new(Context::new(&cfg)))
    };
}

fn context() -> &'static Context {
    CONTEXT.with(|ctx| *ctx)
}

fn z3_sort(ctx: &'static Context, sort: Sort) -> z3::Sort<'static> {
    match sort {
        Sort::Bool => z3::Sort::bool(ctx),
        Sort::Int => z3::Sort::int(ctx),
        Sort::Array => z3::Sort::array(ctx, &z3::Sort::int(ctx), &z3::Sort::int(ctx)),
    }
}

fn new_const(ctx: &'static Context, name: &str, sort: Sort) -> Dynamic<'static> {
    match sort {
        Sort::Bool => Bool::new_const(ctx, name).into(),
        Sort::Int => Int::new_const(ctx, name).into(),
        Sort::Array => {
            ast::Array::new_const(ctx, name, &z3::Sort::int(ctx), &z3::Sort::int(ctx)).into()
        }
    }
}

fn as_bool(d: Dynamic<'static>) -> Result<Bool<'static>, SolverError> {
    d.as_bool()
        .ok_or_else(|| SolverError::Backend(format!("expected Bool, got `{d}`")))
}

fn as_int(d: Dynamic<'static>) -> Result<Int<'static>, SolverError> {
    d.as_int()
        .ok_or_else(|| SolverError::Backend(format!("expected Int, got `{d}`")))
}

fn as_array(d: Dynamic<'static>) -> Result<ast::Array<'static>, SolverError> {
    d.as_array()
        .ok_or_else(|| SolverError::Backend(format!("expected Array, got `{d}`")))
}

/// In-process Z3. Each worker thread leaks one `Context` on first use, since
/// every z3 AST borrows its context.
pub struct Z3Solver {
    ctx: &'static Context,
    solver: z3::Solver<'static>,
    funcs: HashMap<String, FuncDecl<'static>>,
}

impl Z3Solver {
    pub fn new(timeout_ms: u64) -> Self {
        let ctx = context();
        let solver = z3::Solver::new(ctx);
        let mut params = Params::new(ctx);
        if timeout_ms > 0 {
            params.set_u32("timeout", u32::try_from(timeout_ms).unwrap_or(u32::MAX));
        }
        params.set_u32("smt.random_seed", 0);
        solver.set_params(&params);
        Self {
            ctx,
            solver,
            funcs: HashMap::new(),
        }
    }

    fn func(&mut self, name: &str, args: &[Term], sort: Sort) -> FuncDecl<'static> {
        let ctx = self.ctx;
        self.funcs
            .entry(name.to_string())
            .or_insert_with(|| {
                let domain = args.iter().map(|a| z3_sort(ctx, a.sort())).collect::<Vec<_>>();
                let domain_refs = domain.iter().collect::<Vec<_>>();
                FuncDecl::new(ctx, name, &domain_refs, &z3_sort(ctx, sort))
            })
            .clone()
    }

    fn translate(&mut self, term: &Term) -> Result<Dynamic<'static>, SolverError> {
        let ctx = self.ctx;
        Ok(match term {
            Term::Bool(b) => Bool::from_bool(ctx, *b).into(),
            Term::Int(n) => Int::from_i64(ctx, *n).into(),
            Term::Const(name, sort) => new_const(ctx, name, *sort),
            Term::Not(t) => as_bool(self.translate(t)?)?.not().into(),
            Term::And(ts) | Term::Or(ts) => {
                let parts = ts
                    .iter()
                    .map(|t| self.translate(t).and_then(as_bool))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs = parts.iter().collect::<Vec<_>>();
                match term {
                    Term::And(_) => Bool::and(ctx, &refs).into(),
                    _ => Bool::or(ctx, &refs).into(),
                }
            }
            Term::Implies(l, r) => {
                let l = as_bool(self.translate(l)?)?;
                let r = as_bool(self.translate(r)?)?;
                l.implies(&r).into()
            }
            Term::Eq(l, r) => {
                let l = self.translate(l)?;
                let r = self.translate(r)?;
                l._eq(&r).into()
            }
            Term::Rel(op, l, r) => {
                let l = as_int(self.translate(l)?)?;
                let r = as_int(self.translate(r)?)?;
                match op {
                    Rel::Lt => l.lt(&r),
                    Rel::Le => l.le(&r),
                    Rel::Gt => l.gt(&r),
                    Rel::Ge => l.ge(&r),
                }
                .into()
            }
            Term::Neg(t) => as_int(self.translate(t)?)?.unary_minus().into(),
            Term::Arith(op, l, r) => {
                let l = as_int(self.translate(l)?)?;
                let r = as_int(self.translate(r)?)?;
                match op {
                    Arith::Add => Int::add(ctx, &[&l, &r]),
                    Arith::Sub => Int::sub(ctx, &[&l, &r]),
                    Arith::Mul => Int::mul(ctx, &[&l, &r]),
                    Arith::Div => l.div(&r),
                }
                .into()
            }
            Term::Select(a, i) => {
                let a = as_array(self.translate(a)?)?;
                let i = self.translate(i)?;
                a.select(&i)
            }
            Term::Store(a, i, v) => {
                let a = as_array(self.translate(a)?)?;
                let i = self.translate(i)?;
                let v = self.translate(v)?;
                a.store(&i, &v).into()
            }
            Term::App { func, args, sort } => {
                let decl = self.func(func, args, *sort);
                let args = args
                    .iter()
                    .map(|a| self.translate(a))
                    .collect::<Result<Vec<_>, _>>()?;
                let refs = args.iter().map(|a| a as &dyn Ast<'static>).collect::<Vec<_>>();
                decl.apply(&refs)
            }
            Term::Forall(vars, body) => {
                let bound = vars
                    .iter()
                    .map(|(name, sort)| new_const(ctx, name, *sort))
                    .collect::<Vec<_>>();
                let body = as_bool(self.translate(body)?)?;
                let refs = bound.iter().map(|b| b as &dyn Ast<'static>).collect::<Vec<_>>();
                ast::forall_const(ctx, &refs, &[], &body).into()
            }
        })
    }
}

impl Solver for Z3Solver {
    fn assert(&mut self, term: &Term) -> Result<(), SolverError> {
        let b = as_bool(self.translate(term)?)?;
        self.solver.assert(&b);
        Ok(())
    }

    fn push(&mut self) {
        self.solver.push();
    }

    fn pop(&mut self) {
        self.solver.pop(1);
    }

    fn check(&mut self) -> Result<SatResult, SolverError> {
        let result = match self.solver.check() {
            Z3Result::Sat => SatResult::Sat,
            Z3Result::Unsat => SatResult::Unsat,
            Z3Result::Unknown => SatResult::Unknown(
                self.solver
                    .get_reason_unknown()
                    .unwrap_or_else(|| "unknown".to_string()),
            ),
        };
        debug!(?result, "check-sat (native)");
        Ok(result)
    }

    fn model(&mut self, symbols: &[(String, Sort)]) -> Result<Model, SolverError> {
        let model = self
            .solver
            .get_model()
            .ok_or_else(|| SolverError::Backend("no model available".to_string()))?;
        let values = symbols
            .iter()
            .map(|(name, sort)| {
                let c = new_const(self.ctx, name, *sort);
                let value = model
                    .eval(&c, true)
                    .map(|v: Dynamic<'static>| v.to_string())
                    .unwrap_or_else(|| c.to_string());
                (name.clone(), value)
            })
            .collect();
        Ok(Model { values })
    }
}

/// Produces [`Z3Solver`]s on the calling thread's context.
#[derive(Clone, Debug)]
pub struct Z3Factory {
    timeout_ms: u64,
}

impl Z3Factory {
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }
}

impl SolverFactory for Z3Factory {
    fn name(&self) -> &str {
        "z3-native"
    }

    fn create(&self) -> Result<Box<dyn Solver>, SolverError> {
        Ok(Box::new(Z3Solver::new(self.timeout_ms)))
    }
}
