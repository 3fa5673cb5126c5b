#![forbid(unsafe_code)]

use std::collections::BTreeSet;

use hoare_ast::{Binding, Expr, FunctionDef, LValue, Module, Predicate, Statement};

use crate::error::SpecError;

/// Every call and formula reference reachable from `function`, transitively
/// through formula bodies and callee postconditions, must resolve, match its
/// arity, and yield as many values as its position takes.
pub fn check_function(module: &Module, function: &FunctionDef) -> Result<(), SpecError> {
    let mut checker = Checker {
        module,
        function,
        seen: BTreeSet::new(),
    };
    checker.seen.insert(function.name.clone());

    let params = names(&function.params);
    let mut contract = params.clone();
    contract.extend(names(&function.returns));
    let all = function.bindings().map(|b| b.name.clone()).collect::<Vec<_>>();

    if let Some(requires) = &function.requires {
        checker.pred(requires, &mut params.clone())?;
    }
    if let Some(ensures) = &function.ensures {
        checker.pred(ensures, &mut contract)?;
    }
    checker.stmt(&function.body, &mut all.clone())
}

fn names(bindings: &[Binding]) -> Vec<String> {
    bindings.iter().map(|b| b.name.clone()).collect()
}

struct Checker<'m> {
    module: &'m Module,
    function: &'m FunctionDef,
    /// Formulas and callee contracts already checked.
    seen: BTreeSet<String>,
}

impl<'m> Checker<'m> {
    fn stmt(&mut self, stmt: &Statement, scope: &mut Vec<String>) -> Result<(), SpecError> {
        match stmt {
            Statement::Block(stmts) => stmts.iter().try_for_each(|s| self.stmt(s, scope)),
            Statement::Assign { targets, values } => {
                for target in targets {
                    match target {
                        LValue::Var(name) => self.var(name, scope)?,
                        LValue::Index { array, index } => {
                            self.var(array, scope)?;
                            self.expr(index, scope)?;
                        }
                    }
                }
                let produced = match values.as_slice() {
                    [Expr::Call { callee, args }] => {
                        let def = self.callee(callee, args.len())?;
                        args.iter().try_for_each(|a| self.expr(a, scope))?;
                        self.contract(def)?;
                        if def.returns.is_empty() {
                            return Err(self.result_count(callee, 0));
                        }
                        def.returns.len()
                    }
                    values => {
                        values.iter().try_for_each(|v| self.expr(v, scope))?;
                        values.len()
                    }
                };
                if produced != targets.len() {
                    return Err(SpecError::AssignmentArity {
                        targets: targets.len(),
                        values: produced,
                        function: self.function.name.clone(),
                    });
                }
                Ok(())
            }
            Statement::If {
                cond,
                then,
                otherwise,
            } => {
                self.pred(&Predicate::from(cond), scope)?;
                self.stmt(then, scope)?;
                match otherwise {
                    Some(s) => self.stmt(s, scope),
                    None => Ok(()),
                }
            }
            Statement::While {
                cond,
                invariant,
                body,
            } => {
                self.pred(&Predicate::from(cond), scope)?;
                if let Some(inv) = invariant {
                    self.pred(inv, scope)?;
                }
                self.stmt(body, scope)
            }
            // The value of a top-level call is discarded, so any result
            // count is fine there.
            Statement::Expr(Expr::Call { callee, args }) => {
                let def = self.callee(callee, args.len())?;
                args.iter().try_for_each(|a| self.expr(a, scope))?;
                self.contract(def)
            }
            Statement::Expr(e) => self.expr(e, scope),
        }
    }

    fn pred(&mut self, pred: &Predicate, scope: &mut Vec<String>) -> Result<(), SpecError> {
        match pred {
            Predicate::True | Predicate::False => Ok(()),
            Predicate::Compare { left, right, .. } => {
                self.expr(left, scope)?;
                self.expr(right, scope)
            }
            Predicate::Not(p) | Predicate::Paren(p) => self.pred(p, scope),
            Predicate::And(l, r) | Predicate::Or(l, r) | Predicate::Implies(l, r) => {
                self.pred(l, scope)?;
                self.pred(r, scope)
            }
            Predicate::Quantifier(q) => {
                scope.push(q.var.clone());
                let res = self.pred(&q.body, scope);
                scope.pop();
                res
            }
            Predicate::Formula(r) => {
                r.args.iter().try_for_each(|a| self.expr(a, scope))?;
                let module = self.module;
                if let Some(formula) = module.formula(&r.name) {
                    self.arity(&r.name, formula.params.len(), r.args.len())?;
                    if self.seen.insert(format!("formula {}", r.name)) {
                        self.pred(&formula.body, &mut names(&formula.params))?;
                    }
                    return Ok(());
                }
                match module.function(&r.name) {
                    Some(def) => {
                        self.arity(&r.name, def.params.len(), r.args.len())?;
                        self.contract(def)
                    }
                    None => Err(SpecError::UndefinedReference {
                        kind: "formula",
                        name: r.name.clone(),
                        function: self.function.name.clone(),
                    }),
                }
            }
        }
    }

    /// Checks an expression in single-value position.
    fn expr(&mut self, expr: &Expr, scope: &mut Vec<String>) -> Result<(), SpecError> {
        match expr {
            Expr::Num(_) => Ok(()),
            Expr::Var(name) => self.var(name, scope),
            Expr::Neg(e) => self.expr(e, scope),
            Expr::Binary { left, right, .. } => {
                self.expr(left, scope)?;
                self.expr(right, scope)
            }
            Expr::Call { callee, args } => {
                let def = self.callee(callee, args.len())?;
                if def.returns.len() != 1 {
                    return Err(self.result_count(callee, def.returns.len()));
                }
                args.iter().try_for_each(|a| self.expr(a, scope))?;
                self.contract(def)
            }
            Expr::Index { array, index } => {
                self.expr(array, scope)?;
                self.expr(index, scope)
            }
            Expr::Update {
                array,
                index,
                value,
            } => {
                self.expr(array, scope)?;
                self.expr(index, scope)?;
                self.expr(value, scope)
            }
        }
    }

    fn var(&self, name: &str, scope: &[String]) -> Result<(), SpecError> {
        if scope.iter().any(|s| s == name) {
            Ok(())
        } else {
            Err(SpecError::UnknownVariable {
                name: name.to_string(),
                function: self.function.name.clone(),
            })
        }
    }

    fn callee(&self, name: &str, args: usize) -> Result<&'m FunctionDef, SpecError> {
        let def = self
            .module
            .function(name)
            .ok_or_else(|| SpecError::UndefinedReference {
                kind: "function",
                name: name.to_string(),
                function: self.function.name.clone(),
            })?;
        self.arity(name, def.params.len(), args)?;
        Ok(def)
    }

    /// The callee's postcondition is unfolded at use sites, so it must be
    /// well formed too.
    fn contract(&mut self, def: &'m FunctionDef) -> Result<(), SpecError> {
        if !self.seen.insert(def.name.clone()) {
            return Ok(());
        }
        match &def.ensures {
            Some(ensures) => {
                let mut scope = names(&def.params);
                scope.extend(names(&def.returns));
                self.pred(ensures, &mut scope)
            }
            None => Ok(()),
        }
    }

    fn arity(&self, name: &str, expected: usize, found: usize) -> Result<(), SpecError> {
        if expected == found {
            Ok(())
        } else {
            Err(SpecError::ArityMismatch {
                name: name.to_string(),
                expected,
                found,
                function: self.function.name.clone(),
            })
        }
    }

    fn result_count(&self, callee: &str, count: usize) -> SpecError {
        SpecError::ResultCount {
            callee: callee.to_string(),
            count,
            function: self.function.name.clone(),
        }
    }
}
