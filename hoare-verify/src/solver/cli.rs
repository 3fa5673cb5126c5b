#![forbid(unsafe_code)]

use std::io::Write;
use std::process::{Command, Stdio};

use tracing::{debug, trace};

use super::sexp::{self, Sexp};
use super::{Model, SatResult, Solver, SolverConfig, SolverFactory};
use crate::error::SolverError;
use crate::term::{Declarations, Sort, Term, symbol};

/// SMT-LIB 2 solver run as a subprocess. Every check renders the live
/// assertion frames into a fresh script and pipes it to the solver binary.
#[derive(Debug)]
pub struct CliSolver {
    config: SolverConfig,
    frames: Vec<Vec<Term>>,
}

impl CliSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self {
            config,
            frames: vec![Vec::new()],
        }
    }

    pub fn with_default_config() -> Result<Self, SolverError> {
        Ok(Self::new(SolverConfig::auto_detect()?))
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// The script `check` would send, without the trailing commands.
    pub fn script(&self, extra: &[(String, Sort)]) -> String {
        let mut decls = Declarations::default();
        for t in self.frames.iter().flatten() {
            decls.add(t);
        }
        for (name, sort) in extra {
            decls.consts.entry(name.clone()).or_insert(*sort);
        }

        let mut script = String::from("(set-option :produce-models true)\n");
        script.push_str(&decls.to_string());
        for t in self.frames.iter().flatten() {
            script.push_str(&format!("(assert {t})\n"));
        }
        script
    }

    fn run(&self, script: &str) -> Result<Vec<Sexp>, SolverError> {
        let responses = self.exec(script)?;
        if let Some(msg) = responses.iter().find_map(error_message) {
            return Err(SolverError::Process(msg));
        }
        Ok(responses)
    }

    /// Raw responses; `(error ...)` entries are left to the caller.
    fn exec(&self, script: &str) -> Result<Vec<Sexp>, SolverError> {
        self.config.validate()?;
        trace!(%script, "solver input");

        let mut child = Command::new(&self.config.path)
            .args(self.config.build_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| SolverError::Process(format!("failed to start solver: {e}")))?;

        child
            .stdin
            .take()
            .ok_or_else(|| SolverError::Process("failed to open solver stdin".to_string()))?
            .write_all(script.as_bytes())
            .map_err(|e| SolverError::Process(format!("failed to write to solver stdin: {e}")))?;

        let output = child
            .wait_with_output()
            .map_err(|e| SolverError::Process(format!("failed to wait for solver: {e}")))?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        trace!(%stdout, "solver output");

        let responses = sexp::parse_all(&stdout)?;
        if responses.is_empty() {
            return Err(SolverError::Parse(format!(
                "empty solver output; stderr: {}",
                stderr.trim()
            )));
        }
        Ok(responses)
    }
}

fn error_message(response: &Sexp) -> Option<String> {
    match response.as_list()? {
        [head, msg] if head.as_atom() == Some("error") => {
            Some(msg.to_string().trim_matches('"').to_string())
        }
        _ => None,
    }
}

fn parse_status(response: &[Sexp]) -> Result<SatResult, SolverError> {
    match response.first().and_then(Sexp::as_atom) {
        Some("sat") => Ok(SatResult::Sat),
        Some("unsat") => Ok(SatResult::Unsat),
        Some("unknown") => Ok(SatResult::Unknown("unknown".to_string())),
        Some("timeout") => Ok(SatResult::Unknown("timeout".to_string())),
        _ => Err(SolverError::Parse(format!(
            "expected sat/unsat/unknown, got `{}`",
            response.first().map(Sexp::to_string).unwrap_or_default()
        ))),
    }
}

fn get_value_command(symbols: &[(String, Sort)]) -> String {
    let names = symbols
        .iter()
        .map(|(name, _)| symbol(name))
        .collect::<Vec<_>>()
        .join(" ");
    format!("(get-value ({names}))\n")
}

fn parse_values(response: Option<&Sexp>) -> Result<Model, SolverError> {
    if let Some(msg) = response.and_then(error_message) {
        return Err(SolverError::Process(msg));
    }
    let pairs = response
        .and_then(Sexp::as_list)
        .ok_or_else(|| SolverError::Parse("missing get-value response".to_string()))?;
    let values = pairs
        .iter()
        .map(|pair| match pair.as_list() {
            Some([name, value]) => Ok((name.to_string(), value.to_string())),
            _ => Err(SolverError::Parse(format!("malformed get-value entry `{pair}`"))),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Model { values })
}

/// Reads the answer to `(check-sat) (get-value ..) (get-info :reason-unknown)`.
/// The solver answers `get-value` with an error when there is no model, which
/// only matters after `sat`.
fn read_check_with_model(responses: &[Sexp]) -> Result<(SatResult, Option<Model>), SolverError> {
    let status = match parse_status(responses) {
        Ok(status) => status,
        Err(err) => {
            return Err(match responses.first().and_then(error_message) {
                Some(msg) => SolverError::Process(msg),
                None => err,
            });
        }
    };
    match status {
        SatResult::Sat => Ok((SatResult::Sat, Some(parse_values(responses.get(1))?))),
        SatResult::Unknown(_) => Ok((SatResult::Unknown(reason_unknown(responses)), None)),
        SatResult::Unsat => Ok((SatResult::Unsat, None)),
    }
}

impl Solver for CliSolver {
    fn assert(&mut self, term: &Term) -> Result<(), SolverError> {
        if term.sort() != Sort::Bool {
            return Err(SolverError::Backend(format!("cannot assert non-boolean term {term}")));
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.push(term.clone());
        }
        Ok(())
    }

    fn push(&mut self) {
        self.frames.push(Vec::new());
    }

    fn pop(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    fn check(&mut self) -> Result<SatResult, SolverError> {
        let mut script = self.script(&[]);
        script.push_str("(check-sat)\n(get-info :reason-unknown)\n");

        let responses = self.run(&script)?;
        let result = match parse_status(&responses)? {
            SatResult::Unknown(_) => SatResult::Unknown(reason_unknown(&responses)),
            other => other,
        };
        debug!(
            ?result,
            assertions = self.frames.iter().map(Vec::len).sum::<usize>(),
            "check-sat"
        );
        Ok(result)
    }

    fn model(&mut self, symbols: &[(String, Sort)]) -> Result<Model, SolverError> {
        if symbols.is_empty() {
            return Ok(Model::default());
        }
        let mut script = self.script(symbols);
        script.push_str("(check-sat)\n");
        script.push_str(&get_value_command(symbols));

        let responses = self.run(&script)?;
        if parse_status(&responses)? != SatResult::Sat {
            return Err(SolverError::Backend(
                "model requested but the query is no longer satisfiable".to_string(),
            ));
        }
        parse_values(responses.get(1))
    }

    fn check_with_model(
        &mut self,
        symbols: &[(String, Sort)],
    ) -> Result<(SatResult, Option<Model>), SolverError> {
        if symbols.is_empty() {
            let result = self.check()?;
            let model = (result == SatResult::Sat).then(Model::default);
            return Ok((result, model));
        }
        let mut script = self.script(symbols);
        script.push_str("(check-sat)\n");
        script.push_str(&get_value_command(symbols));
        script.push_str("(get-info :reason-unknown)\n");

        let responses = self.exec(&script)?;
        let (result, model) = read_check_with_model(&responses)?;
        debug!(
            ?result,
            assertions = self.frames.iter().map(Vec::len).sum::<usize>(),
            "check-sat with model"
        );
        Ok((result, model))
    }
}

/// Reason from `(:reason-unknown "...")`, if the solver sent one.
fn reason_unknown(responses: &[Sexp]) -> String {
    responses
        .iter()
        .filter_map(Sexp::as_list)
        .find_map(|items| match items {
            [key, reason] if key.as_atom() == Some(":reason-unknown") => {
                Some(reason.to_string().trim_matches('"').to_string())
            }
            _ => None,
        })
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Hands out [`CliSolver`]s sharing one configuration.
#[derive(Clone, Debug)]
pub struct CliSolverFactory {
    config: SolverConfig,
}

impl CliSolverFactory {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn auto_detect() -> Result<Self, SolverError> {
        Ok(Self::new(SolverConfig::auto_detect()?))
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }
}

impl SolverFactory for CliSolverFactory {
    fn name(&self) -> &str {
        "smtlib-cli"
    }

    fn create(&self) -> Result<Box<dyn Solver>, SolverError> {
        self.config.validate()?;
        Ok(Box::new(CliSolver::new(self.config.clone())))
    }
}
