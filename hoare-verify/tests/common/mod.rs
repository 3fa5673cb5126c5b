#![allow(dead_code)]

use hoare_ast::{
    Binding, CmpOp, Condition, Expr, FunctionDef, LValue, Module, Predicate, Statement, VarType,
};
use proptest::prelude::*;

/// Integer expressions over `x`, `y`, `z`, `k` and reads of `a`.
pub fn expr() -> impl Strategy<Value = Expr> {
    let leaf = prop_oneof![
        (-5i64..5).prop_map(Expr::num),
        prop::sample::select(vec!["x", "y", "z", "k"]).prop_map(Expr::var),
    ];
    leaf.prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::add(l, r)),
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Expr::mul(l, r)),
            inner.clone().prop_map(Expr::neg),
            inner.prop_map(|i| Expr::index("a", i)),
        ]
    })
}

/// Predicates over [`expr`] that bind `k`, `y` or `z`.
pub fn pred() -> impl Strategy<Value = Predicate> {
    let leaf = prop_oneof![
        Just(Predicate::True),
        (expr(), expr()).prop_map(|(l, r)| Predicate::cmp(l, CmpOp::Le, r)),
        expr().prop_map(|e| Predicate::formula("p", vec![e])),
    ];
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(l, r)| Predicate::And(Box::new(l), Box::new(r))),
            (inner.clone(), inner.clone())
                .prop_map(|(l, r)| Predicate::Implies(Box::new(l), Box::new(r))),
            inner.clone().prop_map(|p| Predicate::Not(Box::new(p))),
            (prop::sample::select(vec!["k", "y"]), inner.clone())
                .prop_map(|(v, body)| Predicate::forall(v, VarType::Int, body)),
            (prop::sample::select(vec!["k", "z"]), inner)
                .prop_map(|(v, body)| Predicate::exists(v, VarType::Int, body)),
        ]
    })
}

fn cmp(l: Expr, op: CmpOp, r: Expr) -> Predicate {
    Predicate::cmp(l, op, r)
}

fn function(name: &str, params: Vec<Binding>, returns: Vec<Binding>) -> FunctionDef {
    FunctionDef {
        name: name.to_string(),
        params,
        returns,
        locals: Vec::new(),
        body: Statement::Block(Vec::new()),
        requires: None,
        ensures: None,
    }
}

/// `s = 2 * n` by repeated addition. Without `s == 2 * i` in the invariant
/// the exit condition no longer follows.
pub fn doubling(full_invariant: bool) -> Module {
    let i = || Expr::var("i");
    let s = || Expr::var("s");
    let n = || Expr::var("n");

    let mut invariant = Predicate::conj(
        cmp(Expr::num(0), CmpOp::Le, i()),
        cmp(i(), CmpOp::Le, n()),
    );
    if full_invariant {
        invariant = Predicate::conj(
            invariant,
            cmp(s(), CmpOp::Eq, Expr::mul(Expr::num(2), i())),
        );
    }

    let mut f = function("double", vec![Binding::int("n")], vec![Binding::int("s")]);
    f.locals = vec![Binding::int("i")];
    f.requires = Some(cmp(n(), CmpOp::Ge, Expr::num(0)));
    f.ensures = Some(cmp(s(), CmpOp::Eq, Expr::mul(Expr::num(2), n())));
    f.body = Statement::Block(vec![
        Statement::assign("i", Expr::num(0)),
        Statement::assign("s", Expr::num(0)),
        Statement::While {
            cond: Condition::cmp(i(), CmpOp::Lt, n()),
            invariant: Some(invariant),
            body: Box::new(Statement::Block(vec![
                Statement::assign("i", Expr::add(i(), Expr::num(1))),
                Statement::assign("s", Expr::add(s(), Expr::num(2))),
            ])),
        },
    ]);
    Module {
        formulas: Vec::new(),
        functions: vec![f],
    }
}

/// `sum = 0 + 1 + .. + (n - 1)`, stated without division as
/// `2 * sum == n * (n - 1)`. Dropping `i <= n` from the invariant lets the
/// loop counter overshoot at exit.
pub fn triangle(bounded: bool) -> Module {
    let i = || Expr::var("i");
    let sum = || Expr::var("sum");
    let n = || Expr::var("n");
    let twice = |e: Expr| Expr::mul(Expr::num(2), e);
    let pronic = |e: Expr| Expr::mul(e.clone(), Expr::sub(e, Expr::num(1)));

    let mut invariant = cmp(Expr::num(0), CmpOp::Le, i());
    if bounded {
        invariant = Predicate::conj(invariant, cmp(i(), CmpOp::Le, n()));
    }
    invariant = Predicate::conj(invariant, cmp(twice(sum()), CmpOp::Eq, pronic(i())));

    let mut f = function("triangle", vec![Binding::int("n")], vec![Binding::int("sum")]);
    f.locals = vec![Binding::int("i")];
    f.requires = Some(cmp(n(), CmpOp::Ge, Expr::num(0)));
    f.ensures = Some(cmp(twice(sum()), CmpOp::Eq, pronic(n())));
    f.body = Statement::Block(vec![
        Statement::assign("i", Expr::num(0)),
        Statement::assign("sum", Expr::num(0)),
        Statement::While {
            cond: Condition::cmp(i(), CmpOp::Lt, n()),
            invariant: Some(invariant),
            body: Box::new(Statement::Block(vec![
                Statement::assign("sum", Expr::add(sum(), i())),
                Statement::assign("i", Expr::add(i(), Expr::num(1))),
            ])),
        },
    ]);
    Module {
        formulas: Vec::new(),
        functions: vec![f],
    }
}

/// `a[i] = 5; r = a[j]` with `ensures r == 5`; holds only when `i == j` is
/// required.
pub fn array_write_read(same_index: bool) -> Module {
    let mut f = function(
        "poke",
        vec![Binding::array("a"), Binding::int("i"), Binding::int("j")],
        vec![Binding::int("r")],
    );
    if same_index {
        f.requires = Some(cmp(Expr::var("i"), CmpOp::Eq, Expr::var("j")));
    }
    f.ensures = Some(cmp(Expr::var("r"), CmpOp::Eq, Expr::num(5)));
    f.body = Statement::Block(vec![
        Statement::Assign {
            targets: vec![LValue::Index {
                array: "a".to_string(),
                index: Expr::var("i"),
            }],
            values: vec![Expr::num(5)],
        },
        Statement::assign("r", Expr::index("a", Expr::var("j"))),
    ]);
    Module {
        formulas: Vec::new(),
        functions: vec![f],
    }
}

/// `x, y = a, b; x, y = y, x` ends with the inputs exchanged.
pub fn swap() -> Module {
    let mut f = function(
        "swap",
        vec![Binding::int("a"), Binding::int("b")],
        vec![Binding::int("x"), Binding::int("y")],
    );
    f.ensures = Some(Predicate::conj(
        cmp(Expr::var("x"), CmpOp::Eq, Expr::var("b")),
        cmp(Expr::var("y"), CmpOp::Eq, Expr::var("a")),
    ));
    let pair = |l: &str, r: &str, vl: &str, vr: &str| Statement::Assign {
        targets: vec![LValue::Var(l.to_string()), LValue::Var(r.to_string())],
        values: vec![Expr::var(vl), Expr::var(vr)],
    };
    f.body = Statement::Block(vec![pair("x", "y", "a", "b"), pair("x", "y", "y", "x")]);
    Module {
        formulas: Vec::new(),
        functions: vec![f],
    }
}

/// `main` relies on the postcondition of `inc` and on a named formula.
pub fn calls() -> Module {
    let mut inc = function("inc", vec![Binding::int("v")], vec![Binding::int("w")]);
    inc.ensures = Some(cmp(
        Expr::var("w"),
        CmpOp::Eq,
        Expr::add(Expr::var("v"), Expr::num(1)),
    ));
    inc.body = Statement::assign("w", Expr::add(Expr::var("v"), Expr::num(1)));

    let mut main = function("main", vec![Binding::int("n")], vec![Binding::int("m")]);
    main.requires = Some(Predicate::formula("nonneg", vec![Expr::var("n")]));
    main.ensures = Some(Predicate::formula("positive", vec![Expr::var("m")]));
    main.body = Statement::assign("m", Expr::call("inc", vec![Expr::var("n")]));

    let unary = |name: &str, op: CmpOp| hoare_ast::FormulaDef {
        name: name.to_string(),
        params: vec![Binding::int("x")],
        body: cmp(Expr::var("x"), op, Expr::num(0)),
    };
    Module {
        formulas: vec![unary("nonneg", CmpOp::Ge), unary("positive", CmpOp::Gt)],
        functions: vec![inc, main],
    }
}
