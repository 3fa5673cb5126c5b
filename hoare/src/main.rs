#![forbid(unsafe_code)]

mod config;
mod report;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{Diagnostic, IntoDiagnostic};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use hoare_ast::{FunctionDef, Module};
use hoare_verify::encode::binding_env;
use hoare_verify::{
    CliSolver, CliSolverFactory, Encoder, SmtProfile, Solver, SolverConfig, SolverFactory, Sort,
    Term, Verifier, check_function, function_vcs,
};

use config::{Overrides, ResolvedConfig};

#[derive(Parser, Debug)]
#[command(name = "hoare", version, about = "Weakest-precondition verifier for annotated programs")]
struct Cli {
    /// Raise log verbosity (`-v` info, `-vv` debug, `-vvv` trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file. Defaults to the nearest `hoare.toml` above the module.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum SmtProfileArg {
    Fast,
    Ci,
    Thorough,
}

impl From<SmtProfileArg> for SmtProfile {
    fn from(v: SmtProfileArg) -> Self {
        match v {
            SmtProfileArg::Fast => SmtProfile::Fast,
            SmtProfileArg::Ci => SmtProfile::Ci,
            SmtProfileArg::Thorough => SmtProfile::Thorough,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum BackendArg {
    /// SMT-LIB2 over a solver subprocess
    Cli,
    /// In-process Z3 (needs the `z3` feature)
    Z3,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Verify every function of a module
    Verify {
        /// Module as JSON
        path: PathBuf,

        /// SMT solver profile: `fast`, `ci`, or `thorough`
        #[arg(long, value_enum)]
        profile: Option<SmtProfileArg>,

        /// Per-query timeout in milliseconds (overrides the profile)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Solver binary for the `cli` backend
        #[arg(long)]
        solver: Option<PathBuf>,

        #[arg(long, value_enum, default_value_t = BackendArg::Cli)]
        backend: BackendArg,

        /// Worker threads; `1` verifies functions one after another
        #[arg(long)]
        jobs: Option<usize>,

        /// Write a JSON report here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Print verification conditions
    Vcs {
        /// Module as JSON
        path: PathBuf,

        /// Only this function
        #[arg(long)]
        function: Option<String>,

        /// Print SMT-LIB2 queries instead of predicates
        #[arg(long, default_value_t = false)]
        smt: bool,
    },
}

#[derive(Debug, Error, Diagnostic)]
enum CliError {
    #[error("failed to read {path}")]
    #[diagnostic(code(hoare::input))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid module {path} at line {line}, column {column}: {message}")]
    #[diagnostic(code(hoare::input), help("the module must be JSON in the hoare-ast serde form"))]
    Parse {
        path: String,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("no function named `{0}` in the module")]
    #[diagnostic(code(hoare::input))]
    UnknownFunction(String),

    #[cfg_attr(feature = "z3", allow(dead_code))]
    #[error("this build has no native z3 backend")]
    #[diagnostic(code(hoare::backend), help("rebuild with `--features z3` or use `--backend cli`"))]
    NoNativeBackend,

    #[error("{failed} of {total} function(s) not verified")]
    #[diagnostic(code(hoare::verify))]
    NotVerified { failed: usize, total: usize },
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_module(path: &Path) -> Result<Module, CliError> {
    let raw = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|e| CliError::Parse {
        path: path.display().to_string(),
        line: e.line(),
        column: e.column(),
        message: e.to_string(),
    })
}

fn solver_config(cfg: &ResolvedConfig) -> Result<SolverConfig, hoare_verify::SolverError> {
    let base = match &cfg.solver_path {
        Some(path) => SolverConfig::new(path),
        None => SolverConfig::auto_detect()?,
    };
    Ok(base.with_timeout(cfg.timeout_ms()))
}

fn make_factory(backend: BackendArg, cfg: &ResolvedConfig) -> miette::Result<Box<dyn SolverFactory>> {
    match backend {
        BackendArg::Cli => Ok(Box::new(CliSolverFactory::new(solver_config(cfg)?))),
        #[cfg(feature = "z3")]
        BackendArg::Z3 => Ok(Box::new(hoare_verify::Z3Factory::new(cfg.timeout_ms()))),
        #[cfg(not(feature = "z3"))]
        BackendArg::Z3 => Err(CliError::NoNativeBackend.into()),
    }
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.cmd {
        Cmd::Verify {
            path,
            profile,
            timeout_ms,
            solver,
            backend,
            jobs,
            report: report_path,
        } => {
            let overrides = Overrides {
                solver_path: solver,
                profile: profile.map(SmtProfile::from),
                timeout_ms,
                jobs,
            };
            let cfg = config::load_config(&path, cli.config.as_deref())?.apply(&overrides);
            debug!(?cfg, "resolved configuration");

            if let Some(n) = jobs.filter(|n| *n > 1) {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build_global()
                    .into_diagnostic()?;
            }

            let module = load_module(&path)?;
            let factory = make_factory(backend, &cfg)?;
            info!(backend = factory.name(), functions = module.functions.len(), "verifying");

            let verifier = Verifier::new(factory.as_ref())
                .with_options(cfg.verify_options())
                .with_axioms(cfg.axioms());
            let result = verifier.verify_module(&module);
            print!("{}", result.render());

            if let Some(out) = report_path {
                let json = report::build_report(&path, factory.name(), &result);
                report::write_report(&out, &json)?;
                println!("wrote {}", out.display());
            }

            if result.is_verified() {
                Ok(())
            } else {
                let failed = result.functions.iter().filter(|f| !f.is_verified()).count();
                Err(CliError::NotVerified {
                    failed,
                    total: result.functions.len(),
                }
                .into())
            }
        }
        Cmd::Vcs {
            path,
            function,
            smt,
        } => {
            let cfg = config::load_config(&path, cli.config.as_deref())?;
            let module = load_module(&path)?;

            let selected: Vec<&FunctionDef> = match &function {
                Some(name) => vec![
                    module
                        .function(name)
                        .ok_or_else(|| CliError::UnknownFunction(name.clone()))?,
                ],
                None => module.functions.iter().collect(),
            };

            for f in selected {
                if smt {
                    print_smt(&module, f, &cfg)?;
                } else {
                    print_vcs(&module, f)?;
                }
            }
            Ok(())
        }
    }
}

fn print_vcs(module: &Module, function: &FunctionDef) -> miette::Result<()> {
    check_function(module, function)?;
    println!("{}:", function.name);
    for vc in function_vcs(module, function)? {
        println!("  [{}] {}", vc.kind, vc.predicate);
    }
    Ok(())
}

/// One self-contained query per VC, in the form the subprocess backend sends.
fn print_smt(module: &Module, function: &FunctionDef, cfg: &ResolvedConfig) -> miette::Result<()> {
    check_function(module, function)?;
    let vcs = function_vcs(module, function)?;

    // Only `exists` needs a live solver while encoding.
    let solver_cfg = solver_config(cfg).unwrap_or_else(|_| SolverConfig::new("z3"));
    let factory = CliSolverFactory::new(solver_cfg.clone());
    let axioms = cfg.axioms();
    let mut encoder =
        Encoder::new(module, function, &axioms, &factory).with_max_depth(cfg.max_unfold_depth);
    let env = binding_env(function);
    let symbols: Vec<(String, Sort)> = function
        .bindings()
        .map(|b| (b.name.clone(), Sort::from(b.ty)))
        .collect();

    let mut assumptions = match &function.requires {
        Some(requires) => vec![encoder.encode_predicate(requires, &env, 0)?],
        None => Vec::new(),
    };
    assumptions.extend(encoder.take_side_assertions());

    for vc in vcs {
        let goal = encoder.encode_predicate(&vc.predicate, &env, 0)?;
        let side = encoder.take_side_assertions();

        let mut query = CliSolver::new(solver_cfg.clone());
        for fact in assumptions.iter().chain(&side) {
            query.assert(fact)?;
        }
        query.assert(&Term::not(goal))?;
        println!("; {} {}", function.name, vc.kind);
        print!("{}", query.script(&symbols));
        println!("(check-sat)");
    }
    Ok(())
}
