#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fmt;

use hoare_ast::{Expr, FunctionDef, LValue, Module, Predicate, Statement};

use crate::error::SpecError;
use crate::subst::{Substitution, fresh_name, free_vars_pred};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VcKind {
    /// `requires ==> wp(body, ensures)`
    Entry,
    /// The invariant of loop N is preserved by one iteration.
    LoopPreserved(usize),
    /// The invariant of loop N and the negated guard establish what follows.
    LoopExit(usize),
}

impl VcKind {
    fn order_key(self) -> (usize, u8) {
        match self {
            VcKind::Entry => (0, 0),
            VcKind::LoopPreserved(n) => (n, 0),
            VcKind::LoopExit(n) => (n, 1),
        }
    }
}

impl fmt::Display for VcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VcKind::Entry => f.write_str("entry"),
            VcKind::LoopPreserved(n) => write!(f, "loop {n} preserved"),
            VcKind::LoopExit(n) => write!(f, "loop {n} exit"),
        }
    }
}

/// One verification condition of a function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vc {
    pub kind: VcKind,
    pub predicate: Predicate,
}

/// Weakest preconditions, for a postcondition `Q`:
/// - `e` (expression statement): `Q`
/// - `S1; S2`: `wp(S1, wp(S2, Q))`
/// - `x, a[i] = e1, e2`: `Q[x := e1, a := a[i := e2]]`, one simultaneous
///   substitution with every right-hand side read in the pre-state
/// - `x, y = f(args)`: `forall r.. ens_f[params := args, rets := r] ==>
///   Q[x := r1, y := r2]`
/// - `if c S1 else S2`: `(c ==> wp(S1, Q)) && (!c ==> wp(S2, Q))`
/// - `while c inv I S`: `I`, recording `I && c ==> wp(S, I)` and
///   `I && !c ==> Q` as side conditions
pub struct WpTransformer<'m> {
    module: &'m Module,
    function: &'m FunctionDef,
    side: Vec<Vc>,
    taken: BTreeSet<String>,
}

impl<'m> WpTransformer<'m> {
    pub fn new(module: &'m Module, function: &'m FunctionDef) -> Self {
        let taken = function.bindings().map(|b| b.name.clone()).collect();
        Self {
            module,
            function,
            side: Vec::new(),
            taken,
        }
    }

    /// Side conditions recorded so far, in the order loops were visited.
    pub fn side_conditions(&self) -> &[Vc] {
        &self.side
    }

    pub fn into_side_conditions(self) -> Vec<Vc> {
        self.side
    }

    /// Precondition of `stmt` for `post`. Loops inside `stmt` are numbered
    /// from `first_loop` in source order.
    pub fn wp(
        &mut self,
        stmt: &Statement,
        post: Predicate,
        first_loop: usize,
    ) -> Result<Predicate, SpecError> {
        match stmt {
            Statement::Expr(_) => Ok(post),
            Statement::Block(stmts) => {
                let mut starts = Vec::with_capacity(stmts.len());
                let mut next = first_loop;
                for s in stmts {
                    starts.push(next);
                    next += loop_count(s);
                }
                stmts
                    .iter()
                    .zip(starts)
                    .rev()
                    .try_fold(post, |q, (s, start)| self.wp(s, q, start))
            }
            Statement::Assign { targets, values } => self.assign(targets, values, post),
            Statement::If {
                cond,
                then,
                otherwise,
            } => {
                let c = Predicate::from(cond);
                let pre_then = self.wp(then, post.clone(), first_loop)?;
                let pre_else = match otherwise {
                    Some(s) => self.wp(s, post, first_loop + loop_count(then))?,
                    None => post,
                };
                Ok(Predicate::conj(
                    Predicate::imply(c.clone(), pre_then),
                    Predicate::imply(Predicate::negate(c), pre_else),
                ))
            }
            Statement::While {
                cond,
                invariant,
                body,
            } => {
                let inv = invariant.clone().unwrap_or(Predicate::True);
                let c = Predicate::from(cond);

                let pre_body = self.wp(body, inv.clone(), first_loop + 1)?;
                self.side.push(Vc {
                    kind: VcKind::LoopPreserved(first_loop),
                    predicate: Predicate::imply(
                        Predicate::conj(inv.clone(), c.clone()),
                        pre_body,
                    ),
                });
                self.side.push(Vc {
                    kind: VcKind::LoopExit(first_loop),
                    predicate: Predicate::imply(
                        Predicate::conj(inv.clone(), Predicate::negate(c)),
                        post,
                    ),
                });
                Ok(inv)
            }
        }
    }

    fn assign(
        &mut self,
        targets: &[LValue],
        values: &[Expr],
        post: Predicate,
    ) -> Result<Predicate, SpecError> {
        if let [Expr::Call { callee, args }] = values {
            let def = self.lookup(callee)?;
            if def.returns.len() >= 2 {
                return self.assign_call(targets, def, args, post);
            }
        }

        if targets.len() != values.len() {
            return Err(SpecError::AssignmentArity {
                targets: targets.len(),
                values: values.len(),
                function: self.function.name.clone(),
            });
        }
        let subst = assignment_substitution(targets.iter().zip(values.iter().cloned()));
        Ok(subst.apply_pred(&post))
    }

    fn assign_call(
        &mut self,
        targets: &[LValue],
        callee: &'m FunctionDef,
        args: &[Expr],
        post: Predicate,
    ) -> Result<Predicate, SpecError> {
        if targets.len() != callee.returns.len() {
            return Err(SpecError::AssignmentArity {
                targets: targets.len(),
                values: callee.returns.len(),
                function: self.function.name.clone(),
            });
        }
        if args.len() != callee.params.len() {
            return Err(SpecError::ArityMismatch {
                name: callee.name.clone(),
                expected: callee.params.len(),
                found: args.len(),
                function: self.function.name.clone(),
            });
        }

        self.taken.extend(free_vars_pred(&post));
        let fresh = callee
            .returns
            .iter()
            .map(|ret| {
                let name = fresh_name(&format!("{}_{}", callee.name, ret.name), &self.taken);
                self.taken.insert(name.clone());
                (name, ret.ty)
            })
            .collect::<Vec<_>>();

        let results = fresh.iter().map(|(name, _)| Expr::Var(name.clone()));
        let post = assignment_substitution(targets.iter().zip(results)).apply_pred(&post);

        let body = match &callee.ensures {
            Some(ens) => {
                let inst: Substitution = callee
                    .params
                    .iter()
                    .map(|p| p.name.clone())
                    .zip(args.iter().cloned())
                    .chain(
                        callee
                            .returns
                            .iter()
                            .zip(&fresh)
                            .map(|(ret, (name, _))| (ret.name.clone(), Expr::Var(name.clone()))),
                    )
                    .collect();
                Predicate::imply(inst.apply_pred(ens), post)
            }
            None => post,
        };

        Ok(fresh
            .into_iter()
            .rev()
            .fold(body, |acc, (name, ty)| Predicate::forall(name, ty, acc)))
    }

    fn lookup(&self, callee: &str) -> Result<&'m FunctionDef, SpecError> {
        self.module
            .function(callee)
            .ok_or_else(|| SpecError::UndefinedReference {
                kind: "function",
                name: callee.to_string(),
                function: self.function.name.clone(),
            })
    }
}

/// `x ↦ e` for variable targets, `a ↦ a[i := v]` for element targets, chained
/// left to right when one array is written more than once.
fn assignment_substitution<'a>(pairs: impl Iterator<Item = (&'a LValue, Expr)>) -> Substitution {
    let mut subst = Substitution::new();
    for (target, value) in pairs {
        match target {
            LValue::Var(name) => subst.insert(name.clone(), value),
            LValue::Index { array, index } => {
                let base = subst
                    .get(array)
                    .cloned()
                    .unwrap_or_else(|| Expr::Var(array.clone()));
                subst.insert(array.clone(), Expr::update(base, index.clone(), value));
            }
        }
    }
    subst
}

fn loop_count(stmt: &Statement) -> usize {
    match stmt {
        Statement::Assign { .. } | Statement::Expr(_) => 0,
        Statement::Block(stmts) => stmts.iter().map(loop_count).sum(),
        Statement::If {
            then, otherwise, ..
        } => loop_count(then) + otherwise.as_deref().map_or(0, loop_count),
        Statement::While { body, .. } => 1 + loop_count(body),
    }
}

/// The full VC set of `function`: the entry condition first, then the loop
/// side conditions by loop number.
pub fn function_vcs(module: &Module, function: &FunctionDef) -> Result<Vec<Vc>, SpecError> {
    let mut wp = WpTransformer::new(module, function);
    let post = function.ensures.clone().unwrap_or(Predicate::True);
    let pre = wp.wp(&function.body, post, 1)?;
    let requires = function.requires.clone().unwrap_or(Predicate::True);

    let mut vcs = vec![Vc {
        kind: VcKind::Entry,
        predicate: Predicate::imply(requires, pre),
    }];
    let mut side = wp.into_side_conditions();
    side.sort_by_key(|vc| vc.kind.order_key());
    vcs.extend(side);
    Ok(vcs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoare_ast::{Binding, CmpOp, Condition, VarType};

    fn func(body: Statement, ensures: Option<Predicate>) -> FunctionDef {
        FunctionDef {
            name: "f".to_string(),
            params: vec![Binding::int("x"), Binding::int("y")],
            returns: vec![Binding::int("r")],
            locals: vec![Binding::array("a")],
            body,
            requires: None,
            ensures,
        }
    }

    fn lt(l: Expr, r: Expr) -> Predicate {
        Predicate::cmp(l, CmpOp::Lt, r)
    }

    fn wp_of(body: Statement, post: Predicate) -> Predicate {
        let module = Module::default();
        let f = func(body.clone(), None);
        WpTransformer::new(&module, &f).wp(&body, post, 1).expect("wp")
    }

    #[test]
    fn expression_statement_is_skip() {
        let post = lt(Expr::var("x"), Expr::num(1));
        let out = wp_of(Statement::Expr(Expr::num(0)), post.clone());
        assert_eq!(out, post);
    }

    #[test]
    fn block_folds_right_to_left() {
        let body = Statement::Block(vec![
            Statement::assign("x", Expr::add(Expr::var("x"), Expr::num(1))),
            Statement::assign("y", Expr::var("x")),
        ]);
        let out = wp_of(body, lt(Expr::var("y"), Expr::num(5)));
        assert_eq!(out, lt(Expr::add(Expr::var("x"), Expr::num(1)), Expr::num(5)));
    }

    #[test]
    fn tuple_assignment_is_simultaneous() {
        let body = Statement::Assign {
            targets: vec![LValue::Var("x".into()), LValue::Var("y".into())],
            values: vec![Expr::var("y"), Expr::var("x")],
        };
        let out = wp_of(body, lt(Expr::var("x"), Expr::var("y")));
        assert_eq!(out, lt(Expr::var("y"), Expr::var("x")));
    }

    #[test]
    fn element_write_becomes_update() {
        let body = Statement::Assign {
            targets: vec![LValue::Index {
                array: "a".into(),
                index: Expr::var("x"),
            }],
            values: vec![Expr::var("y")],
        };
        let post = Predicate::cmp(Expr::index("a", Expr::var("x")), CmpOp::Eq, Expr::var("y"));
        let out = wp_of(body, post);
        let updated = Expr::update(Expr::var("a"), Expr::var("x"), Expr::var("y"));
        assert_eq!(
            out,
            Predicate::cmp(
                Expr::Index {
                    array: Box::new(updated),
                    index: Box::new(Expr::var("x")),
                },
                CmpOp::Eq,
                Expr::var("y"),
            )
        );
    }

    #[test]
    fn conditional_without_else() {
        let c = Condition::cmp(Expr::var("x"), CmpOp::Gt, Expr::num(0));
        let body = Statement::If {
            cond: c.clone(),
            then: Box::new(Statement::assign("y", Expr::var("x"))),
            otherwise: None,
        };
        let post = lt(Expr::num(0), Expr::var("y"));
        let out = wp_of(body, post.clone());
        let c = Predicate::from(&c);
        assert_eq!(
            out,
            Predicate::And(
                Box::new(Predicate::Implies(
                    Box::new(c.clone()),
                    Box::new(lt(Expr::num(0), Expr::var("x"))),
                )),
                Box::new(Predicate::Implies(
                    Box::new(Predicate::Not(Box::new(c))),
                    Box::new(post),
                )),
            )
        );
    }

    #[test]
    fn true_guard_selects_then_branch() {
        let then = Statement::assign("y", Expr::add(Expr::var("x"), Expr::num(1)));
        let otherwise = Statement::assign("y", Expr::num(0));
        let post = lt(Expr::var("x"), Expr::var("y"));

        let out = wp_of(
            Statement::If {
                cond: Condition::True,
                then: Box::new(then.clone()),
                otherwise: Some(Box::new(otherwise)),
            },
            post.clone(),
        );
        assert_eq!(out, wp_of(then, post));
    }

    #[test]
    fn loops_numbered_in_source_order() {
        let lp = |inv: i64| Statement::While {
            cond: Condition::cmp(Expr::var("x"), CmpOp::Lt, Expr::num(10)),
            invariant: Some(lt(Expr::var("x"), Expr::num(inv))),
            body: Box::new(Statement::assign("x", Expr::add(Expr::var("x"), Expr::num(1)))),
        };
        let body = Statement::Block(vec![lp(1), lp(2)]);
        let module = Module::default();
        let f = func(body, Some(Predicate::True));
        let vcs = function_vcs(&module, &f).expect("vcs");

        let kinds = vcs.iter().map(|vc| vc.kind).collect::<Vec<_>>();
        assert_eq!(
            kinds,
            [
                VcKind::Entry,
                VcKind::LoopPreserved(1),
                VcKind::LoopExit(1),
                VcKind::LoopPreserved(2),
                VcKind::LoopExit(2),
            ]
        );
        // Entry needs the first invariant.
        assert_eq!(vcs[0].predicate, lt(Expr::var("x"), Expr::num(1)));
        // Loop 1 exits into loop 2's invariant.
        let Predicate::Implies(_, exit_post) = &vcs[2].predicate else {
            panic!("exit vc is an implication");
        };
        assert_eq!(**exit_post, lt(Expr::var("x"), Expr::num(2)));
    }

    #[test]
    fn missing_invariant_is_true() {
        let body = Statement::While {
            cond: Condition::False,
            invariant: None,
            body: Box::new(Statement::Block(Vec::new())),
        };
        let module = Module::default();
        let f = func(body, Some(lt(Expr::var("r"), Expr::num(0))));
        let vcs = function_vcs(&module, &f).expect("vcs");
        assert_eq!(vcs[0].predicate, Predicate::True);
        assert_eq!(vcs.len(), 3);
    }

    #[test]
    fn multi_return_call_quantifies_results() {
        let pair = FunctionDef {
            name: "pair".to_string(),
            params: vec![Binding::int("n")],
            returns: vec![Binding::int("p"), Binding::int("q")],
            locals: Vec::new(),
            body: Statement::Block(Vec::new()),
            requires: None,
            ensures: Some(lt(Expr::var("p"), Expr::var("q"))),
        };
        let body = Statement::Assign {
            targets: vec![LValue::Var("x".into()), LValue::Var("y".into())],
            values: vec![Expr::call("pair", vec![Expr::var("x")])],
        };
        let caller = func(body.clone(), None);
        let module = Module {
            formulas: Vec::new(),
            functions: vec![pair, caller.clone()],
        };
        let post = lt(Expr::var("x"), Expr::var("y"));
        let out = WpTransformer::new(&module, &caller)
            .wp(&body, post, 1)
            .expect("wp");

        let expected = Predicate::forall(
            "pair_p_1",
            VarType::Int,
            Predicate::forall(
                "pair_q_1",
                VarType::Int,
                Predicate::Implies(
                    Box::new(lt(Expr::var("pair_p_1"), Expr::var("pair_q_1"))),
                    Box::new(lt(Expr::var("pair_p_1"), Expr::var("pair_q_1"))),
                ),
            ),
        );
        assert_eq!(out, expected);
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let body = Statement::Assign {
            targets: vec![LValue::Var("x".into())],
            values: vec![Expr::num(1), Expr::num(2)],
        };
        let module = Module::default();
        let f = func(body, None);
        let err = function_vcs(&module, &f).unwrap_err();
        assert!(matches!(err, SpecError::AssignmentArity { targets: 1, values: 2, .. }));
    }
}
