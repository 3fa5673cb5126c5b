#![forbid(unsafe_code)]

use std::fmt::{self, Display, Formatter};

use crate::{ArithOp, Binding, CmpOp, Condition, Expr, LValue, Predicate, Quant, VarType};

impl Display for VarType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            VarType::Int => f.write_str("int"),
            VarType::IntArray => f.write_str("int[]"),
        }
    }
}

impl Display for Binding {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.ty)
    }
}

impl Display for ArithOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        })
    }
}

impl Display for CmpOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Gt => ">",
            CmpOp::Lt => "<",
            CmpOp::Ge => ">=",
            CmpOp::Le => "<=",
        })
    }
}

impl Display for Quant {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Quant::Forall => f.write_str("forall"),
            Quant::Exists => f.write_str("exists"),
        }
    }
}

impl ArithOp {
    fn precedence(self) -> u8 {
        match self {
            ArithOp::Add | ArithOp::Sub => 1,
            ArithOp::Mul | ArithOp::Div => 2,
        }
    }
}

const EXPR_UNARY: u8 = 3;
const EXPR_ATOM: u8 = 4;

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::Num(n) if *n < 0 => EXPR_UNARY,
            Expr::Neg(_) => EXPR_UNARY,
            Expr::Binary { op, .. } => op.precedence(),
            _ => EXPR_ATOM,
        }
    }

    fn fmt_at(&self, f: &mut Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            f.write_str("(")?;
            self.fmt_at(f, 0)?;
            return f.write_str(")");
        }
        match self {
            Expr::Num(n) => write!(f, "{n}"),
            Expr::Var(name) => f.write_str(name),
            Expr::Neg(e) => {
                f.write_str("-")?;
                e.fmt_at(f, EXPR_ATOM)
            }
            Expr::Binary { op, left, right } => {
                let p = op.precedence();
                left.fmt_at(f, p)?;
                write!(f, " {op} ")?;
                right.fmt_at(f, p + 1)
            }
            Expr::Call { callee, args } => {
                write!(f, "{callee}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Expr::Index { array, index } => {
                array.fmt_at(f, EXPR_ATOM)?;
                write!(f, "[{index}]")
            }
            Expr::Update {
                array,
                index,
                value,
            } => {
                array.fmt_at(f, EXPR_ATOM)?;
                write!(f, "[{index} := {value}]")
            }
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.fmt_at(f, 0)
    }
}

impl Display for LValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LValue::Var(name) => f.write_str(name),
            LValue::Index { array, index } => write!(f, "{array}[{index}]"),
        }
    }
}

fn write_list<T: Display>(f: &mut Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

// Binding strength, loosest first. Quantifiers extend as far right as
// possible, so they sit below implication.
const PRED_QUANT: u8 = 0;
const PRED_IMPLIES: u8 = 1;
const PRED_OR: u8 = 2;
const PRED_AND: u8 = 3;
const PRED_NOT: u8 = 4;
const PRED_ATOM: u8 = 5;

impl Predicate {
    fn precedence(&self) -> u8 {
        match self {
            Predicate::Quantifier(_) => PRED_QUANT,
            Predicate::Implies(..) => PRED_IMPLIES,
            Predicate::Or(..) => PRED_OR,
            Predicate::And(..) => PRED_AND,
            Predicate::Not(_) => PRED_NOT,
            _ => PRED_ATOM,
        }
    }

    fn fmt_at(&self, f: &mut Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            f.write_str("(")?;
            self.fmt_at(f, PRED_QUANT)?;
            return f.write_str(")");
        }
        match self {
            Predicate::True => f.write_str("true"),
            Predicate::False => f.write_str("false"),
            Predicate::Compare { left, op, right } => write!(f, "{left} {op} {right}"),
            Predicate::Not(p) => {
                f.write_str("!")?;
                p.fmt_at(f, PRED_NOT)
            }
            Predicate::And(l, r) => {
                l.fmt_at(f, PRED_AND)?;
                f.write_str(" && ")?;
                r.fmt_at(f, PRED_AND + 1)
            }
            Predicate::Or(l, r) => {
                l.fmt_at(f, PRED_OR)?;
                f.write_str(" || ")?;
                r.fmt_at(f, PRED_OR + 1)
            }
            Predicate::Implies(l, r) => {
                l.fmt_at(f, PRED_IMPLIES + 1)?;
                f.write_str(" ==> ")?;
                r.fmt_at(f, PRED_QUANT)
            }
            Predicate::Paren(p) => write!(f, "({p})"),
            Predicate::Quantifier(q) => {
                write!(f, "{} {}: {}. ", q.quant, q.var, q.ty)?;
                q.body.fmt_at(f, PRED_QUANT)
            }
            Predicate::Formula(r) => {
                write!(f, "{}(", r.name)?;
                write_list(f, &r.args)?;
                f.write_str(")")
            }
        }
    }
}

impl Display for Predicate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.fmt_at(f, PRED_QUANT)
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Predicate::from(self).fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use crate::*;

    #[test]
    fn arithmetic_parenthesizes_only_when_needed() {
        let e = Expr::mul(
            Expr::add(Expr::var("a"), Expr::var("b")),
            Expr::sub(Expr::var("c"), Expr::num(1)),
        );
        assert_eq!(e.to_string(), "(a + b) * (c - 1)");

        let e = Expr::sub(Expr::sub(Expr::var("a"), Expr::var("b")), Expr::var("c"));
        assert_eq!(e.to_string(), "a - b - c");

        let e = Expr::sub(Expr::var("a"), Expr::sub(Expr::var("b"), Expr::var("c")));
        assert_eq!(e.to_string(), "a - (b - c)");

        let e = Expr::neg(Expr::add(Expr::var("x"), Expr::num(-2)));
        assert_eq!(e.to_string(), "-(x + -2)");
    }

    #[test]
    fn arrays_and_calls() {
        let e = Expr::update(
            Expr::var("a"),
            Expr::var("i"),
            Expr::call("f", vec![Expr::index("a", Expr::num(0)), Expr::var("n")]),
        );
        assert_eq!(e.to_string(), "a[i := f(a[0], n)]");
    }

    #[test]
    fn predicates_use_surface_syntax() {
        let le = Predicate::cmp(Expr::num(0), CmpOp::Le, Expr::var("k"));
        let lt = Predicate::cmp(Expr::var("k"), CmpOp::Lt, Expr::var("n"));
        let body = Predicate::Implies(
            Box::new(Predicate::And(Box::new(le), Box::new(lt))),
            Box::new(Predicate::formula("pos", vec![Expr::index("a", Expr::var("k"))])),
        );
        let p = Predicate::forall("k", VarType::Int, body);
        assert_eq!(
            p.to_string(),
            "forall k: int. 0 <= k && k < n ==> pos(a[k])"
        );

        let q = Predicate::And(Box::new(p), Box::new(Predicate::True));
        assert_eq!(
            q.to_string(),
            "(forall k: int. 0 <= k && k < n ==> pos(a[k])) && true"
        );
    }

    #[test]
    fn implication_is_right_associative() {
        let a = || Predicate::formula("a", Vec::new());
        let right = Predicate::Implies(
            Box::new(a()),
            Box::new(Predicate::Implies(Box::new(a()), Box::new(a()))),
        );
        assert_eq!(right.to_string(), "a() ==> a() ==> a()");

        let left = Predicate::Implies(
            Box::new(Predicate::Implies(Box::new(a()), Box::new(a()))),
            Box::new(a()),
        );
        assert_eq!(left.to_string(), "(a() ==> a()) ==> a()");
    }

    #[test]
    fn conditions_print_like_predicates() {
        let c = Condition::Not(Box::new(Condition::Or(
            Box::new(Condition::True),
            Box::new(Condition::cmp(Expr::var("x"), CmpOp::Ne, Expr::num(3))),
        )));
        assert_eq!(c.to_string(), "!(true || x != 3)");
    }
}
