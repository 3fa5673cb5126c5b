#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

mod fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarType {
    #[serde(rename = "int")]
    Int,
    #[serde(rename = "int[]")]
    IntArray,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: VarType,
}

impl Binding {
    pub fn int(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: VarType::Int,
        }
    }

    pub fn array(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: VarType::IntArray,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    #[serde(rename = "+")]
    Add,
    #[serde(rename = "-")]
    Sub,
    #[serde(rename = "*")]
    Mul,
    #[serde(rename = "/")]
    Div,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Num(i64),
    Var(String),
    Neg(Box<Expr>),
    Binary {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    /// `array[index]`
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    /// `array` with the element at `index` replaced by `value`.
    ///
    /// Never produced by the front end; element assignments become this node
    /// during WP computation.
    Update {
        array: Box<Expr>,
        index: Box<Expr>,
        value: Box<Expr>,
    },
}

impl Expr {
    pub fn num(value: i64) -> Self {
        Expr::Num(value)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn neg(e: Expr) -> Self {
        Expr::Neg(Box::new(e))
    }

    pub fn binary(op: ArithOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn add(left: Expr, right: Expr) -> Self {
        Self::binary(ArithOp::Add, left, right)
    }

    pub fn sub(left: Expr, right: Expr) -> Self {
        Self::binary(ArithOp::Sub, left, right)
    }

    pub fn mul(left: Expr, right: Expr) -> Self {
        Self::binary(ArithOp::Mul, left, right)
    }

    pub fn div(left: Expr, right: Expr) -> Self {
        Self::binary(ArithOp::Div, left, right)
    }

    pub fn call(callee: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: callee.into(),
            args,
        }
    }

    pub fn index(array: impl Into<String>, index: Expr) -> Self {
        Expr::Index {
            array: Box::new(Expr::Var(array.into())),
            index: Box::new(index),
        }
    }

    pub fn update(array: Expr, index: Expr, value: Expr) -> Self {
        Expr::Update {
            array: Box::new(array),
            index: Box::new(index),
            value: Box::new(value),
        }
    }
}

/// Boolean guard syntax of `if`/`while`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    True,
    False,
    Compare { left: Expr, op: CmpOp, right: Expr },
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Implies(Box<Condition>, Box<Condition>),
    Paren(Box<Condition>),
}

impl Condition {
    pub fn cmp(left: Expr, op: CmpOp, right: Expr) -> Self {
        Condition::Compare { left, op, right }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quant {
    Forall,
    Exists,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quantifier {
    pub quant: Quant,
    pub var: String,
    pub ty: VarType,
    pub body: Box<Predicate>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaRef {
    pub name: String,
    pub args: Vec<Expr>,
}

/// Annotation language: conditions plus quantifiers and formula references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    True,
    False,
    Compare { left: Expr, op: CmpOp, right: Expr },
    Not(Box<Predicate>),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Implies(Box<Predicate>, Box<Predicate>),
    Paren(Box<Predicate>),
    Quantifier(Quantifier),
    Formula(FormulaRef),
}

impl Predicate {
    pub fn cmp(left: Expr, op: CmpOp, right: Expr) -> Self {
        Predicate::Compare { left, op, right }
    }

    pub fn forall(var: impl Into<String>, ty: VarType, body: Predicate) -> Self {
        Predicate::Quantifier(Quantifier {
            quant: Quant::Forall,
            var: var.into(),
            ty,
            body: Box::new(body),
        })
    }

    pub fn exists(var: impl Into<String>, ty: VarType, body: Predicate) -> Self {
        Predicate::Quantifier(Quantifier {
            quant: Quant::Exists,
            var: var.into(),
            ty,
            body: Box::new(body),
        })
    }

    pub fn formula(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Predicate::Formula(FormulaRef {
            name: name.into(),
            args,
        })
    }

    /// Conjunction folding the boolean constants.
    pub fn conj(p: Predicate, q: Predicate) -> Predicate {
        match (p, q) {
            (Predicate::True, q) => q,
            (p, Predicate::True) => p,
            (Predicate::False, _) | (_, Predicate::False) => Predicate::False,
            (p, q) => Predicate::And(Box::new(p), Box::new(q)),
        }
    }

    /// Disjunction folding the boolean constants.
    pub fn disj(p: Predicate, q: Predicate) -> Predicate {
        match (p, q) {
            (Predicate::False, q) => q,
            (p, Predicate::False) => p,
            (Predicate::True, _) | (_, Predicate::True) => Predicate::True,
            (p, q) => Predicate::Or(Box::new(p), Box::new(q)),
        }
    }

    pub fn negate(p: Predicate) -> Predicate {
        match p {
            Predicate::True => Predicate::False,
            Predicate::False => Predicate::True,
            p => Predicate::Not(Box::new(p)),
        }
    }

    pub fn imply(p: Predicate, q: Predicate) -> Predicate {
        match (p, q) {
            (Predicate::True, q) => q,
            (Predicate::False, _) | (_, Predicate::True) => Predicate::True,
            (p, q) => Predicate::Implies(Box::new(p), Box::new(q)),
        }
    }
}

impl From<&Condition> for Predicate {
    fn from(cond: &Condition) -> Self {
        let lift = |c: &Condition| Box::new(Predicate::from(c));
        match cond {
            Condition::True => Predicate::True,
            Condition::False => Predicate::False,
            Condition::Compare { left, op, right } => Predicate::Compare {
                left: left.clone(),
                op: *op,
                right: right.clone(),
            },
            Condition::Not(c) => Predicate::Not(lift(c)),
            Condition::And(l, r) => Predicate::And(lift(l), lift(r)),
            Condition::Or(l, r) => Predicate::Or(lift(l), lift(r)),
            Condition::Implies(l, r) => Predicate::Implies(lift(l), lift(r)),
            Condition::Paren(c) => Predicate::Paren(lift(c)),
        }
    }
}

impl From<Condition> for Predicate {
    fn from(cond: Condition) -> Self {
        Predicate::from(&cond)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LValue {
    Var(String),
    Index { array: String, index: Expr },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    Assign {
        targets: Vec<LValue>,
        values: Vec<Expr>,
    },
    Block(Vec<Statement>),
    If {
        cond: Condition,
        then: Box<Statement>,
        #[serde(default, rename = "else")]
        otherwise: Option<Box<Statement>>,
    },
    While {
        cond: Condition,
        #[serde(default)]
        invariant: Option<Predicate>,
        body: Box<Statement>,
    },
    Expr(Expr),
}

impl Statement {
    /// `name = value`
    pub fn assign(name: impl Into<String>, value: Expr) -> Self {
        Statement::Assign {
            targets: vec![LValue::Var(name.into())],
            values: vec![value],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormulaDef {
    pub name: String,
    pub params: Vec<Binding>,
    pub body: Predicate,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<Binding>,
    #[serde(default)]
    pub returns: Vec<Binding>,
    #[serde(default)]
    pub locals: Vec<Binding>,
    pub body: Statement,
    #[serde(default)]
    pub requires: Option<Predicate>,
    #[serde(default)]
    pub ensures: Option<Predicate>,
}

impl FunctionDef {
    /// Parameters, then returns, then locals.
    pub fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.params
            .iter()
            .chain(self.returns.iter())
            .chain(self.locals.iter())
    }

    pub fn binding(&self, name: &str) -> Option<&Binding> {
        self.bindings().find(|b| b.name == name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    #[serde(default)]
    pub formulas: Vec<FormulaDef>,
    pub functions: Vec<FunctionDef>,
}

impl Module {
    pub fn formula(&self, name: &str) -> Option<&FormulaDef> {
        self.formulas.iter().find(|f| f.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name == name)
    }
}
