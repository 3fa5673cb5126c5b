#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use crate::error::VerifyError;
use crate::solver::sexp::{self, Sexp};
use crate::wp::VcKind;

/// A model value mapped back to source types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WitnessValue {
    Int(i64),
    /// Every index holds `default` unless listed in `entries`.
    Array {
        default: Option<i64>,
        entries: BTreeMap<i64, i64>,
    },
    /// Anything the solver printed that has no simpler form.
    Raw(String),
}

impl WitnessValue {
    /// Parses solver output such as `5`, `(- 5)`,
    /// `((as const (Array Int Int)) 0)` or `(store a 1 2)`.
    pub fn parse(text: &str) -> Self {
        match sexp::parse_all(text).as_deref() {
            Ok([value]) => Self::from_sexp(value).unwrap_or_else(|| Self::Raw(text.trim().to_string())),
            _ => Self::Raw(text.trim().to_string()),
        }
    }

    fn from_sexp(value: &Sexp) -> Option<Self> {
        if let Some(n) = int_of(value) {
            return Some(Self::Int(n));
        }
        let (default, entries) = array_of(value)?;
        Some(Self::Array { default, entries })
    }
}

fn int_of(value: &Sexp) -> Option<i64> {
    match value {
        Sexp::Atom(a) => a.parse().ok(),
        Sexp::List(items) => match items.as_slice() {
            [Sexp::Atom(minus), Sexp::Atom(n)] if minus == "-" => {
                // `(- 9223372036854775808)` is still an i64.
                format!("-{n}").parse().ok()
            }
            _ => None,
        },
    }
}

fn array_of(value: &Sexp) -> Option<(Option<i64>, BTreeMap<i64, i64>)> {
    let items = value.as_list()?;
    match items {
        [Sexp::Atom(store), base, index, elem] if store == "store" => {
            let (default, mut entries) = array_of(base)?;
            entries.insert(int_of(index)?, int_of(elem)?);
            Some((default, entries))
        }
        [head, default] if is_const_array(head) => Some((Some(int_of(default)?), BTreeMap::new())),
        _ => None,
    }
}

/// `(as const (Array Int Int))`
fn is_const_array(head: &Sexp) -> bool {
    matches!(
        head.as_list(),
        Some([Sexp::Atom(a), Sexp::Atom(c), _]) if a == "as" && c == "const"
    )
}

impl fmt::Display for WitnessValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WitnessValue::Int(n) => write!(f, "{n}"),
            WitnessValue::Array { default, entries } => {
                f.write_str("[")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                if let Some(d) = default {
                    if !entries.is_empty() {
                        f.write_str(", ")?;
                    }
                    write!(f, "_: {d}")?;
                }
                f.write_str("]")
            }
            WitnessValue::Raw(s) => f.write_str(s),
        }
    }
}

/// Values refuting one VC, grouped the way the function declares them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Counterexample {
    pub function: String,
    pub vc: VcKind,
    pub params: Vec<(String, WitnessValue)>,
    pub returns: Vec<(String, WitnessValue)>,
    pub locals: Vec<(String, WitnessValue)>,
}

fn write_bindings(f: &mut fmt::Formatter<'_>, values: &[(String, WitnessValue)]) -> fmt::Result {
    for (i, (name, value)) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{name}={value}")?;
    }
    Ok(())
}

impl fmt::Display for Counterexample {
    /// `f(x=1, n=-1) -> r=0 [i=3]`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function)?;
        write_bindings(f, &self.params)?;
        f.write_str(")")?;
        if !self.returns.is_empty() {
            f.write_str(" -> ")?;
            write_bindings(f, &self.returns)?;
        }
        if !self.locals.is_empty() {
            f.write_str(" [")?;
            write_bindings(f, &self.locals)?;
            f.write_str("]")?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Verified,
    Falsified(Counterexample),
    /// The solver could not decide; carries its reason.
    Inconclusive(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VcOutcome {
    Proved,
    Refuted,
    Unknown(String),
    /// Skipped after an earlier VC of the same function failed or was
    /// inconclusive.
    NotChecked,
}

impl fmt::Display for VcOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VcOutcome::Proved => f.write_str("proved"),
            VcOutcome::Refuted => f.write_str("refuted"),
            VcOutcome::Unknown(reason) => write!(f, "unknown ({reason})"),
            VcOutcome::NotChecked => f.write_str("not checked"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VcReport {
    pub kind: VcKind,
    pub outcome: VcOutcome,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct FunctionReport {
    pub function: String,
    pub vcs: Vec<VcReport>,
    pub result: Result<Verdict, VerifyError>,
}

impl FunctionReport {
    pub fn is_verified(&self) -> bool {
        matches!(self.result, Ok(Verdict::Verified))
    }

    pub fn elapsed(&self) -> Duration {
        self.vcs.iter().map(|vc| vc.elapsed).sum()
    }

    pub fn counterexample(&self) -> Option<&Counterexample> {
        match &self.result {
            Ok(Verdict::Falsified(cex)) => Some(cex),
            _ => None,
        }
    }

    /// One line: `PROVED`, `FAILED`, `INCONCLUSIVE` or `ERROR`, then details.
    pub fn summary_line(&self) -> String {
        let ms = self.elapsed().as_millis();
        match &self.result {
            Ok(Verdict::Verified) => {
                format!("{} [PROVED] - {} VC(s) - {ms}ms", self.function, self.vcs.len())
            }
            Ok(Verdict::Falsified(cex)) => {
                format!("{} [FAILED ({})] - {ms}ms", self.function, cex.vc)
            }
            Ok(Verdict::Inconclusive(reason)) => {
                format!("{} [INCONCLUSIVE ({reason})] - {ms}ms", self.function)
            }
            Err(err) => format!("{} [ERROR] - {err}", self.function),
        }
    }
}

#[derive(Debug, Default)]
pub struct ModuleReport {
    pub functions: Vec<FunctionReport>,
}

impl ModuleReport {
    pub fn is_verified(&self) -> bool {
        self.functions.iter().all(FunctionReport::is_verified)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionReport> {
        self.functions.iter().find(|f| f.function == name)
    }

    /// Summary lines, each counterexample indented below its function.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for f in &self.functions {
            out.push_str(&f.summary_line());
            out.push('\n');
            if let Some(cex) = f.counterexample() {
                out.push_str(&format!("    counterexample: {cex}\n"));
            }
        }
        let proved = self.functions.iter().filter(|f| f.is_verified()).count();
        out.push_str(&format!(
            "{proved}/{} function(s) verified\n",
            self.functions.len()
        ));
        out
    }
}
