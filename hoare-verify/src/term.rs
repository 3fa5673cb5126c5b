#![forbid(unsafe_code)]

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use hoare_ast::VarType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sort {
    Bool,
    Int,
    /// `(Array Int Int)`
    Array,
}

impl From<VarType> for Sort {
    fn from(ty: VarType) -> Self {
        match ty {
            VarType::Int => Sort::Int,
            VarType::IntArray => Sort::Array,
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => f.write_str("Bool"),
            Sort::Int => f.write_str("Int"),
            Sort::Array => f.write_str("(Array Int Int)"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Rel {
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Arith {
    Add,
    Sub,
    Mul,
    Div,
}

/// Many-sorted SMT term; `Display` prints SMT-LIB 2.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Term {
    Bool(bool),
    Int(i64),
    Const(String, Sort),
    Not(Box<Term>),
    And(Vec<Term>),
    Or(Vec<Term>),
    Implies(Box<Term>, Box<Term>),
    Eq(Box<Term>, Box<Term>),
    Rel(Rel, Box<Term>, Box<Term>),
    Neg(Box<Term>),
    Arith(Arith, Box<Term>, Box<Term>),
    Select(Box<Term>, Box<Term>),
    Store(Box<Term>, Box<Term>, Box<Term>),
    /// Uninterpreted function application.
    App {
        func: String,
        args: Vec<Term>,
        sort: Sort,
    },
    Forall(Vec<(String, Sort)>, Box<Term>),
}

impl Term {
    pub fn constant(name: impl Into<String>, sort: Sort) -> Self {
        Term::Const(name.into(), sort)
    }

    pub fn not(t: Term) -> Self {
        match t {
            Term::Bool(b) => Term::Bool(!b),
            t => Term::Not(Box::new(t)),
        }
    }

    pub fn and(terms: Vec<Term>) -> Self {
        Term::And(terms)
    }

    pub fn or(terms: Vec<Term>) -> Self {
        Term::Or(terms)
    }

    pub fn implies(l: Term, r: Term) -> Self {
        Term::Implies(Box::new(l), Box::new(r))
    }

    pub fn eq(l: Term, r: Term) -> Self {
        Term::Eq(Box::new(l), Box::new(r))
    }

    pub fn rel(op: Rel, l: Term, r: Term) -> Self {
        Term::Rel(op, Box::new(l), Box::new(r))
    }

    pub fn arith(op: Arith, l: Term, r: Term) -> Self {
        Term::Arith(op, Box::new(l), Box::new(r))
    }

    pub fn select(array: Term, index: Term) -> Self {
        Term::Select(Box::new(array), Box::new(index))
    }

    pub fn store(array: Term, index: Term, value: Term) -> Self {
        Term::Store(Box::new(array), Box::new(index), Box::new(value))
    }

    pub fn sort(&self) -> Sort {
        match self {
            Term::Bool(_)
            | Term::Not(_)
            | Term::And(_)
            | Term::Or(_)
            | Term::Implies(..)
            | Term::Eq(..)
            | Term::Rel(..)
            | Term::Forall(..) => Sort::Bool,
            Term::Int(_) | Term::Neg(_) | Term::Arith(..) | Term::Select(..) => Sort::Int,
            Term::Store(..) => Sort::Array,
            Term::Const(_, sort) | Term::App { sort, .. } => *sort,
        }
    }

    /// Free constants and uninterpreted functions, bound names excluded.
    pub fn declarations(&self) -> Declarations {
        let mut decls = Declarations::default();
        decls.add(self);
        decls
    }

    fn collect(&self, decls: &mut Declarations, bound: &mut Vec<String>) {
        match self {
            Term::Bool(_) | Term::Int(_) => {}
            Term::Const(name, sort) => {
                if !bound.contains(name) {
                    decls.consts.insert(name.clone(), *sort);
                }
            }
            Term::Not(t) | Term::Neg(t) => t.collect(decls, bound),
            Term::And(ts) | Term::Or(ts) => ts.iter().for_each(|t| t.collect(decls, bound)),
            Term::Implies(l, r)
            | Term::Eq(l, r)
            | Term::Rel(_, l, r)
            | Term::Arith(_, l, r)
            | Term::Select(l, r) => {
                l.collect(decls, bound);
                r.collect(decls, bound);
            }
            Term::Store(a, i, v) => {
                a.collect(decls, bound);
                i.collect(decls, bound);
                v.collect(decls, bound);
            }
            Term::App { func, args, sort } => {
                let arg_sorts = args.iter().map(Term::sort).collect();
                decls.funs.insert(func.clone(), (arg_sorts, *sort));
                args.iter().for_each(|t| t.collect(decls, bound));
            }
            Term::Forall(vars, body) => {
                let depth = bound.len();
                bound.extend(vars.iter().map(|(n, _)| n.clone()));
                body.collect(decls, bound);
                bound.truncate(depth);
            }
        }
    }
}

/// Symbols a set of terms needs declared before use.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Declarations {
    pub consts: BTreeMap<String, Sort>,
    pub funs: BTreeMap<String, (Vec<Sort>, Sort)>,
}

impl Declarations {
    pub fn add(&mut self, term: &Term) {
        term.collect(self, &mut Vec::new());
    }

    pub fn names(&self) -> BTreeSet<&str> {
        self.consts
            .keys()
            .chain(self.funs.keys())
            .map(String::as_str)
            .collect()
    }
}

impl fmt::Display for Declarations {
    /// One `declare-const`/`declare-fun` command per line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, sort) in &self.consts {
            writeln!(f, "(declare-const {} {sort})", symbol(name))?;
        }
        for (name, (args, ret)) in &self.funs {
            write!(f, "(declare-fun {} (", symbol(name))?;
            for (i, s) in args.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{s}")?;
            }
            writeln!(f, ") {ret})")?;
        }
        Ok(())
    }
}

const RESERVED: &[&str] = &[
    "_", "!", "as", "let", "exists", "forall", "match", "par", "assert", "true", "false", "not",
    "and", "or", "select", "store", "div", "mod", "ite", "distinct",
];

/// Renders `name` as an SMT-LIB symbol, quoting it with `|..|` when it is not
/// a valid simple symbol.
pub fn symbol(name: &str) -> Cow<'_, str> {
    let special = |c: char| "~!@$%^&*_-+=<>.?/".contains(c);
    let simple = !name.is_empty()
        && !name.starts_with(|c: char| c.is_ascii_digit())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || special(c))
        && !RESERVED.contains(&name);
    if simple {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("|{}|", name.replace('|', "_")))
    }
}

fn write_app(f: &mut fmt::Formatter<'_>, head: &str, args: &[&Term]) -> fmt::Result {
    write!(f, "({head}")?;
    for a in args {
        write!(f, " {a}")?;
    }
    f.write_str(")")
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Bool(b) => write!(f, "{b}"),
            Term::Int(n) if *n < 0 => write!(f, "(- {})", n.unsigned_abs()),
            Term::Int(n) => write!(f, "{n}"),
            Term::Const(name, _) => f.write_str(&symbol(name)),
            Term::Not(t) => write_app(f, "not", &[&**t]),
            Term::And(ts) | Term::Or(ts) => {
                let (head, unit) = match self {
                    Term::And(_) => ("and", "true"),
                    _ => ("or", "false"),
                };
                match ts.as_slice() {
                    [] => f.write_str(unit),
                    [t] => write!(f, "{t}"),
                    ts => write_app(f, head, &ts.iter().collect::<Vec<_>>()),
                }
            }
            Term::Implies(l, r) => write_app(f, "=>", &[&**l, &**r]),
            Term::Eq(l, r) => write_app(f, "=", &[&**l, &**r]),
            Term::Rel(op, l, r) => {
                let head = match op {
                    Rel::Lt => "<",
                    Rel::Le => "<=",
                    Rel::Gt => ">",
                    Rel::Ge => ">=",
                };
                write_app(f, head, &[&**l, &**r])
            }
            Term::Neg(t) => write_app(f, "-", &[&**t]),
            Term::Arith(op, l, r) => {
                let head = match op {
                    Arith::Add => "+",
                    Arith::Sub => "-",
                    Arith::Mul => "*",
                    Arith::Div => "div",
                };
                write_app(f, head, &[&**l, &**r])
            }
            Term::Select(a, i) => write_app(f, "select", &[&**a, &**i]),
            Term::Store(a, i, v) => write_app(f, "store", &[&**a, &**i, &**v]),
            Term::App { func, args, .. } if args.is_empty() => f.write_str(&symbol(func)),
            Term::App { func, args, .. } => {
                write_app(f, &symbol(func), &args.iter().collect::<Vec<_>>())
            }
            Term::Forall(vars, body) => {
                f.write_str("(forall (")?;
                for (i, (name, sort)) in vars.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "({} {sort})", symbol(name))?;
                }
                write!(f, ") {body})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(name: &str) -> Term {
        Term::constant(name, Sort::Int)
    }

    #[test]
    fn prints_smtlib() {
        let t = Term::implies(
            Term::rel(Rel::Le, Term::Int(-3), int("x")),
            Term::eq(
                Term::select(Term::constant("a", Sort::Array), int("x")),
                Term::arith(Arith::Div, int("x"), Term::Int(2)),
            ),
        );
        assert_eq!(
            t.to_string(),
            "(=> (<= (- 3) x) (= (select a x) (div x 2)))"
        );
    }

    #[test]
    fn degenerate_connectives() {
        assert_eq!(Term::and(Vec::new()).to_string(), "true");
        assert_eq!(Term::or(Vec::new()).to_string(), "false");
        assert_eq!(Term::and(vec![int("p")]).to_string(), "p");
        assert_eq!(Term::not(Term::Bool(true)), Term::Bool(false));
    }

    #[test]
    fn quotes_unusual_symbols() {
        assert_eq!(symbol("x!q1"), "x!q1");
        assert_eq!(symbol("sum.r"), "sum.r");
        assert_eq!(symbol("1x"), "|1x|");
        assert_eq!(symbol("and"), "|and|");
        assert_eq!(symbol("a b"), "|a b|");
    }

    #[test]
    fn declarations_skip_bound_names() {
        let body = Term::rel(
            Rel::Lt,
            int("k"),
            Term::App {
                func: "f.r".to_string(),
                args: vec![int("n")],
                sort: Sort::Int,
            },
        );
        let t = Term::and(vec![
            Term::Forall(vec![("k".to_string(), Sort::Int)], Box::new(body)),
            Term::eq(Term::constant("a", Sort::Array), Term::constant("b", Sort::Array)),
        ]);
        assert_eq!(t.sort(), Sort::Bool);

        let decls = t.declarations();
        assert_eq!(decls.names().into_iter().collect::<Vec<_>>(), ["a", "b", "f.r", "n"]);
        assert_eq!(
            decls.to_string(),
            "(declare-const a (Array Int Int))\n\
             (declare-const b (Array Int Int))\n\
             (declare-const n Int)\n\
             (declare-fun f.r (Int) Int)\n"
        );
        assert_eq!(t.to_string(), "(and (forall ((k Int)) (< k (f.r n))) (= a b))");
    }
}
