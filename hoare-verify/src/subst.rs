#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use hoare_ast::{Expr, FormulaRef, Predicate, Quantifier};

/// Simultaneous replacement of several variables. A replacement is never
/// rewritten by another entry of the same map, and binders are renamed
/// rather than capturing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Substitution {
    map: BTreeMap<String, Expr>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(var: impl Into<String>, replacement: Expr) -> Self {
        let mut s = Self::new();
        s.insert(var, replacement);
        s
    }

    /// Adds or replaces the entry for `var`.
    pub fn insert(&mut self, var: impl Into<String>, replacement: Expr) {
        self.map.insert(var.into(), replacement);
    }

    pub fn get(&self, var: &str) -> Option<&Expr> {
        self.map.get(var)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn apply_expr(&self, expr: &Expr) -> Expr {
        if self.is_empty() {
            return expr.clone();
        }
        match expr {
            Expr::Num(_) => expr.clone(),
            Expr::Var(name) => match self.map.get(name) {
                Some(replacement) => replacement.clone(),
                None => expr.clone(),
            },
            Expr::Neg(e) => Expr::Neg(Box::new(self.apply_expr(e))),
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(self.apply_expr(left)),
                right: Box::new(self.apply_expr(right)),
            },
            Expr::Call { callee, args } => Expr::Call {
                callee: callee.clone(),
                args: args.iter().map(|a| self.apply_expr(a)).collect(),
            },
            Expr::Index { array, index } => Expr::Index {
                array: Box::new(self.apply_expr(array)),
                index: Box::new(self.apply_expr(index)),
            },
            Expr::Update {
                array,
                index,
                value,
            } => Expr::Update {
                array: Box::new(self.apply_expr(array)),
                index: Box::new(self.apply_expr(index)),
                value: Box::new(self.apply_expr(value)),
            },
        }
    }

    pub fn apply_pred(&self, pred: &Predicate) -> Predicate {
        if self.is_empty() {
            return pred.clone();
        }
        let sub = |p: &Predicate| Box::new(self.apply_pred(p));
        match pred {
            Predicate::True | Predicate::False => pred.clone(),
            Predicate::Compare { left, op, right } => Predicate::Compare {
                left: self.apply_expr(left),
                op: *op,
                right: self.apply_expr(right),
            },
            Predicate::Not(p) => Predicate::Not(sub(p)),
            Predicate::And(l, r) => Predicate::And(sub(l), sub(r)),
            Predicate::Or(l, r) => Predicate::Or(sub(l), sub(r)),
            Predicate::Implies(l, r) => Predicate::Implies(sub(l), sub(r)),
            Predicate::Paren(p) => Predicate::Paren(sub(p)),
            Predicate::Quantifier(q) => self.apply_quantifier(q),
            Predicate::Formula(r) => Predicate::Formula(FormulaRef {
                name: r.name.clone(),
                args: r.args.iter().map(|a| self.apply_expr(a)).collect(),
            }),
        }
    }

    fn apply_quantifier(&self, q: &Quantifier) -> Predicate {
        let body_free = free_vars_pred(&q.body);

        // The binder shadows its own name; entries for variables that do not
        // occur in the body are irrelevant.
        let inner: Substitution = self
            .map
            .iter()
            .filter(|(var, _)| **var != q.var && body_free.contains(*var))
            .map(|(var, e)| (var.clone(), e.clone()))
            .collect();
        if inner.is_empty() {
            return Predicate::Quantifier(q.clone());
        }

        let captures = inner
            .map
            .values()
            .any(|e| free_vars_expr(e).contains(&q.var));
        if !captures {
            return Predicate::Quantifier(Quantifier {
                quant: q.quant,
                var: q.var.clone(),
                ty: q.ty,
                body: Box::new(inner.apply_pred(&q.body)),
            });
        }

        let mut taken = body_free;
        taken.extend(inner.map.keys().cloned());
        for e in inner.map.values() {
            taken.extend(free_vars_expr(e));
        }
        let fresh = fresh_name(&q.var, &taken);
        let renamed = Substitution::single(q.var.clone(), Expr::Var(fresh.clone())).apply_pred(&q.body);

        Predicate::Quantifier(Quantifier {
            quant: q.quant,
            var: fresh,
            ty: q.ty,
            body: Box::new(inner.apply_pred(&renamed)),
        })
    }
}

impl FromIterator<(String, Expr)> for Substitution {
    fn from_iter<I: IntoIterator<Item = (String, Expr)>>(iter: I) -> Self {
        Self {
            map: iter.into_iter().collect(),
        }
    }
}

/// First `<base>_<n>` (n ≥ 1) not in `taken`.
pub fn fresh_name(base: &str, taken: &BTreeSet<String>) -> String {
    (1u64..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| format!("{base}_"))
}

pub fn substitute_expr(expr: &Expr, var: &str, replacement: &Expr) -> Expr {
    Substitution::single(var, replacement.clone()).apply_expr(expr)
}

pub fn substitute_pred(pred: &Predicate, var: &str, replacement: &Expr) -> Predicate {
    Substitution::single(var, replacement.clone()).apply_pred(pred)
}

pub fn free_vars_expr(expr: &Expr) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_expr(expr, &mut out);
    out
}

pub fn free_vars_pred(pred: &Predicate) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_pred(pred, &mut out);
    out
}

pub fn occurs_free(var: &str, pred: &Predicate) -> bool {
    free_vars_pred(pred).contains(var)
}

fn collect_expr(expr: &Expr, out: &mut BTreeSet<String>) {
    match expr {
        Expr::Num(_) => {}
        Expr::Var(name) => {
            out.insert(name.clone());
        }
        Expr::Neg(e) => collect_expr(e, out),
        Expr::Binary { left, right, .. } => {
            collect_expr(left, out);
            collect_expr(right, out);
        }
        Expr::Call { args, .. } => args.iter().for_each(|a| collect_expr(a, out)),
        Expr::Index { array, index } => {
            collect_expr(array, out);
            collect_expr(index, out);
        }
        Expr::Update {
            array,
            index,
            value,
        } => {
            collect_expr(array, out);
            collect_expr(index, out);
            collect_expr(value, out);
        }
    }
}

fn collect_pred(pred: &Predicate, out: &mut BTreeSet<String>) {
    match pred {
        Predicate::True | Predicate::False => {}
        Predicate::Compare { left, right, .. } => {
            collect_expr(left, out);
            collect_expr(right, out);
        }
        Predicate::Not(p) | Predicate::Paren(p) => collect_pred(p, out),
        Predicate::And(l, r) | Predicate::Or(l, r) | Predicate::Implies(l, r) => {
            collect_pred(l, out);
            collect_pred(r, out);
        }
        Predicate::Quantifier(q) => {
            let mut inner = free_vars_pred(&q.body);
            inner.remove(&q.var);
            out.extend(inner);
        }
        Predicate::Formula(r) => r.args.iter().for_each(|a| collect_expr(a, out)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoare_ast::{CmpOp, VarType};

    fn gt(l: Expr, r: Expr) -> Predicate {
        Predicate::cmp(l, CmpOp::Gt, r)
    }

    #[test]
    fn replaces_free_occurrences() {
        let p = gt(Expr::add(Expr::var("x"), Expr::var("y")), Expr::var("x"));
        let out = substitute_pred(&p, "x", &Expr::num(3));
        assert_eq!(out, gt(Expr::add(Expr::num(3), Expr::var("y")), Expr::num(3)));
    }

    #[test]
    fn keeps_call_metadata() {
        let e = Expr::call("f", vec![Expr::var("x"), Expr::index("a", Expr::var("x"))]);
        let out = substitute_expr(&e, "x", &Expr::var("z"));
        assert_eq!(
            out,
            Expr::call("f", vec![Expr::var("z"), Expr::index("a", Expr::var("z"))])
        );
    }

    #[test]
    fn array_name_is_substitutable() {
        let e = Expr::index("a", Expr::var("i"));
        let upd = Expr::update(Expr::var("a"), Expr::num(0), Expr::num(7));
        let out = substitute_expr(&e, "a", &upd);
        assert_eq!(
            out,
            Expr::Index {
                array: Box::new(upd),
                index: Box::new(Expr::var("i")),
            }
        );
    }

    #[test]
    fn binder_shadows_substituted_variable() {
        let p = Predicate::forall("x", VarType::Int, gt(Expr::var("x"), Expr::num(0)));
        assert_eq!(substitute_pred(&p, "x", &Expr::num(5)), p);
    }

    #[test]
    fn binder_is_renamed_to_avoid_capture() {
        let p = Predicate::forall("x", VarType::Int, gt(Expr::var("x"), Expr::var("y")));
        let out = substitute_pred(&p, "y", &Expr::add(Expr::var("x"), Expr::num(1)));
        assert_eq!(
            out,
            Predicate::forall(
                "x_1",
                VarType::Int,
                gt(Expr::var("x_1"), Expr::add(Expr::var("x"), Expr::num(1))),
            )
        );
        assert!(occurs_free("x", &out));
    }

    #[test]
    fn rename_skips_names_already_in_use() {
        let body = gt(
            Expr::add(Expr::var("x"), Expr::var("x_1")),
            Expr::var("y"),
        );
        let p = Predicate::forall("x", VarType::Int, body);
        let out = substitute_pred(&p, "y", &Expr::var("x"));
        let Predicate::Quantifier(q) = out else {
            panic!("expected quantifier");
        };
        assert_eq!(q.var, "x_2");
    }

    #[test]
    fn simultaneous_substitution_swaps() {
        let p = Predicate::cmp(Expr::var("x"), CmpOp::Lt, Expr::var("y"));
        let s: Substitution = [
            ("x".to_string(), Expr::var("y")),
            ("y".to_string(), Expr::var("x")),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            s.apply_pred(&p),
            Predicate::cmp(Expr::var("y"), CmpOp::Lt, Expr::var("x"))
        );
    }

    #[test]
    fn formula_reference_substitutes_arguments_only() {
        let p = Predicate::formula("x", vec![Expr::var("x")]);
        let out = substitute_pred(&p, "x", &Expr::num(1));
        assert_eq!(out, Predicate::formula("x", vec![Expr::num(1)]));
    }

    #[test]
    fn free_vars_exclude_bound() {
        let p = Predicate::And(
            Box::new(Predicate::exists(
                "k",
                VarType::Int,
                gt(Expr::index("a", Expr::var("k")), Expr::var("n")),
            )),
            Box::new(gt(Expr::var("k"), Expr::num(0))),
        );
        let vars = free_vars_pred(&p);
        assert_eq!(
            vars.into_iter().collect::<Vec<_>>(),
            ["a", "k", "n"].map(String::from)
        );
    }
}
