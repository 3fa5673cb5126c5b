#![forbid(unsafe_code)]

use std::path::Path;

use hoare_verify::{
    Counterexample, FunctionReport, ModuleReport, VcOutcome, Verdict, WitnessValue,
};
use miette::IntoDiagnostic;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub schema: &'static str,
    pub input: String,
    pub backend: String,
    pub ok: bool,
    pub functions: Vec<FunctionEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionEntry {
    pub name: String,
    /// `verified`, `falsified`, `inconclusive` or `error`.
    pub status: &'static str,
    pub elapsed_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterexample: Option<CounterexampleEntry>,
    pub vcs: Vec<VcEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VcEntry {
    pub kind: String,
    pub outcome: String,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterexampleEntry {
    pub vc: String,
    pub params: Vec<ValueEntry>,
    pub returns: Vec<ValueEntry>,
    pub locals: Vec<ValueEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValueEntry {
    pub name: String,
    pub value: serde_json::Value,
}

fn value_json(value: &WitnessValue) -> serde_json::Value {
    match value {
        WitnessValue::Int(n) => serde_json::json!(n),
        WitnessValue::Array { default, entries } => serde_json::json!({
            "default": default,
            "entries": entries
                .iter()
                .map(|(k, v)| serde_json::json!([k, v]))
                .collect::<Vec<_>>(),
        }),
        WitnessValue::Raw(text) => serde_json::json!({ "raw": text }),
    }
}

fn values(values: &[(String, WitnessValue)]) -> Vec<ValueEntry> {
    values
        .iter()
        .map(|(name, v)| ValueEntry {
            name: name.clone(),
            value: value_json(v),
        })
        .collect()
}

impl From<&Counterexample> for CounterexampleEntry {
    fn from(cex: &Counterexample) -> Self {
        Self {
            vc: cex.vc.to_string(),
            params: values(&cex.params),
            returns: values(&cex.returns),
            locals: values(&cex.locals),
        }
    }
}

impl From<&FunctionReport> for FunctionEntry {
    fn from(f: &FunctionReport) -> Self {
        let (status, reason) = match &f.result {
            Ok(Verdict::Verified) => ("verified", None),
            Ok(Verdict::Falsified(_)) => ("falsified", None),
            Ok(Verdict::Inconclusive(reason)) => ("inconclusive", Some(reason.clone())),
            Err(err) => ("error", Some(err.to_string())),
        };
        Self {
            name: f.function.clone(),
            status,
            elapsed_ms: f.elapsed().as_millis(),
            reason,
            counterexample: f.counterexample().map(CounterexampleEntry::from),
            vcs: f
                .vcs
                .iter()
                .map(|vc| VcEntry {
                    kind: vc.kind.to_string(),
                    outcome: match &vc.outcome {
                        VcOutcome::Unknown(_) => "unknown".to_string(),
                        other => other.to_string(),
                    },
                    elapsed_ms: vc.elapsed.as_millis(),
                })
                .collect(),
        }
    }
}

pub fn build_report(input: &Path, backend: &str, report: &ModuleReport) -> VerifyReport {
    VerifyReport {
        schema: "hoare.verify.v1",
        input: input.display().to_string(),
        backend: backend.to_string(),
        ok: report.is_verified(),
        functions: report.functions.iter().map(FunctionEntry::from).collect(),
    }
}

pub fn write_report(out_path: &Path, report: &VerifyReport) -> miette::Result<()> {
    let json = serde_json::to_string_pretty(report).into_diagnostic()?;
    std::fs::write(out_path, json).into_diagnostic()?;
    Ok(())
}
