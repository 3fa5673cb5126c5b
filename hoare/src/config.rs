#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use hoare_verify::{AxiomRegistry, SmtProfile, VerifyOptions};

pub const CONFIG_FILE: &str = "hoare.toml";

#[derive(Debug, Error, Diagnostic)]
#[error("config error: {message}")]
#[diagnostic(code(hoare::config))]
pub struct ConfigError {
    pub message: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileName {
    Fast,
    Ci,
    Thorough,
}

impl From<ProfileName> for SmtProfile {
    fn from(p: ProfileName) -> Self {
        match p {
            ProfileName::Fast => SmtProfile::Fast,
            ProfileName::Ci => SmtProfile::Ci,
            ProfileName::Thorough => SmtProfile::Thorough,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    solver: SolverSection,
    #[serde(default)]
    verify: VerifySection,
    #[serde(default)]
    axioms: AxiomsSection,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SolverSection {
    path: Option<String>,
    profile: Option<ProfileName>,
    timeout_ms: Option<u64>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct VerifySection {
    max_unfold_depth: Option<usize>,
    parallel: Option<bool>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct AxiomsSection {
    #[serde(default)]
    induction: Vec<String>,
}

/// Settings after merging `hoare.toml` with command-line overrides.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub config_path: Option<PathBuf>,
    /// Solver binary; auto-detected when unset.
    pub solver_path: Option<PathBuf>,
    pub profile: SmtProfile,
    /// Explicit per-query timeout, taking precedence over the profile.
    pub timeout_ms: Option<u64>,
    pub max_unfold_depth: usize,
    pub parallel: bool,
    pub induction: Vec<String>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        let options = VerifyOptions::default();
        Self {
            config_path: None,
            solver_path: None,
            profile: SmtProfile::default(),
            timeout_ms: None,
            max_unfold_depth: options.max_unfold_depth,
            parallel: options.parallel,
            induction: Vec::new(),
        }
    }
}

/// Flags that beat the config file when present.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub solver_path: Option<PathBuf>,
    pub profile: Option<SmtProfile>,
    pub timeout_ms: Option<u64>,
    pub jobs: Option<usize>,
}

impl ResolvedConfig {
    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms.unwrap_or_else(|| self.profile.timeout_ms())
    }

    pub fn verify_options(&self) -> VerifyOptions {
        VerifyOptions {
            max_unfold_depth: self.max_unfold_depth,
            parallel: self.parallel,
        }
    }

    pub fn axioms(&self) -> AxiomRegistry {
        AxiomRegistry::new().with_induction(self.induction.iter().cloned())
    }

    pub fn apply(mut self, overrides: &Overrides) -> Self {
        if let Some(path) = &overrides.solver_path {
            self.solver_path = Some(path.clone());
        }
        if let Some(profile) = overrides.profile {
            // An explicit profile on the command line also wins over a file timeout.
            self.profile = profile;
            self.timeout_ms = None;
        }
        if let Some(ms) = overrides.timeout_ms {
            self.timeout_ms = Some(ms);
        }
        if let Some(jobs) = overrides.jobs {
            self.parallel = jobs > 1;
        }
        self
    }
}

pub fn find_config(start: &Path) -> Option<PathBuf> {
    let mut cur = if start.is_file() {
        start.parent()?.to_path_buf()
    } else {
        start.to_path_buf()
    };

    loop {
        let candidate = cur.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        cur = cur.parent()?.to_path_buf();
    }
}

/// Reads `explicit` if given, otherwise the nearest `hoare.toml` above
/// `start`. No file at all yields the defaults.
pub fn load_config(start: &Path, explicit: Option<&Path>) -> Result<ResolvedConfig, ConfigError> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => match find_config(start) {
            Some(p) => p,
            None => return Ok(ResolvedConfig::default()),
        },
    };

    let raw = fs::read_to_string(&path).map_err(|e| ConfigError {
        message: format!("failed to read {}: {e}", path.display()),
    })?;
    let mut resolved = parse_config(&raw).map_err(|message| ConfigError {
        message: format!("failed to parse {}: {message}", path.display()),
    })?;

    // Relative solver paths are taken from the config's directory.
    let rebased = match (&resolved.solver_path, path.parent()) {
        (Some(solver), Some(dir)) if solver.is_relative() && solver.components().count() > 1 => {
            Some(dir.join(solver))
        }
        _ => None,
    };
    if rebased.is_some() {
        resolved.solver_path = rebased;
    }
    resolved.config_path = Some(path);
    Ok(resolved)
}

fn parse_config(raw: &str) -> Result<ResolvedConfig, String> {
    let parsed: ConfigFile = toml::from_str(raw).map_err(|e| e.to_string())?;
    let defaults = ResolvedConfig::default();

    if parsed.verify.max_unfold_depth == Some(0) {
        return Err("verify.max_unfold_depth must be at least 1".to_string());
    }

    Ok(ResolvedConfig {
        config_path: None,
        solver_path: parsed.solver.path.map(PathBuf::from),
        profile: parsed
            .solver
            .profile
            .map(SmtProfile::from)
            .unwrap_or(defaults.profile),
        timeout_ms: parsed.solver.timeout_ms,
        max_unfold_depth: parsed
            .verify
            .max_unfold_depth
            .unwrap_or(defaults.max_unfold_depth),
        parallel: parsed.verify.parallel.unwrap_or(defaults.parallel),
        induction: dedup(parsed.axioms.induction),
    })
}

fn dedup(names: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for n in names {
        if !out.contains(&n) {
            out.push(n);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[solver]
path = "/usr/bin/z3"
profile = "thorough"
timeout_ms = 1234

[verify]
max_unfold_depth = 4
parallel = false

[axioms]
induction = ["sum_rec", "sum_rec", "fact"]
"#;

    #[test]
    fn parses_every_section() {
        let cfg = parse_config(FULL).expect("config");
        assert_eq!(cfg.solver_path, Some(PathBuf::from("/usr/bin/z3")));
        assert_eq!(cfg.profile, SmtProfile::Thorough);
        assert_eq!(cfg.timeout_ms(), 1234);
        assert_eq!(cfg.max_unfold_depth, 4);
        assert!(!cfg.parallel);
        assert_eq!(cfg.induction, ["sum_rec", "fact"]);
        assert_eq!(cfg.axioms().suppliers_for("fact").len(), 1);
    }

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse_config("").expect("config");
        assert_eq!(cfg, ResolvedConfig::default());
        assert_eq!(cfg.timeout_ms(), SmtProfile::Ci.timeout_ms());
        assert_eq!(cfg.verify_options(), VerifyOptions::default());
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        assert!(parse_config("[solver]\nbinary = \"z3\"\n").is_err());
        assert!(parse_config("[solver]\nprofile = \"slow\"\n").is_err());
        assert!(parse_config("[verify]\nmax_unfold_depth = 0\n").is_err());
    }

    #[test]
    fn command_line_wins() {
        let cfg = parse_config(FULL).expect("config");
        let cfg = cfg.apply(&Overrides {
            solver_path: Some(PathBuf::from("/opt/z3")),
            profile: Some(SmtProfile::Fast),
            timeout_ms: None,
            jobs: Some(8),
        });
        assert_eq!(cfg.solver_path, Some(PathBuf::from("/opt/z3")));
        // profile flag drops the file's timeout
        assert_eq!(cfg.timeout_ms(), SmtProfile::Fast.timeout_ms());
        assert!(cfg.parallel);

        let cfg = cfg.apply(&Overrides {
            timeout_ms: Some(77),
            jobs: Some(1),
            ..Overrides::default()
        });
        assert_eq!(cfg.timeout_ms(), 77);
        assert!(!cfg.parallel);
    }

    #[test]
    fn finds_config_walking_up() {
        let root = std::env::temp_dir().join(format!("hoare-config-{}", std::process::id()));
        let nested = root.join("a").join("b");
        fs::create_dir_all(&nested).expect("mkdir");
        fs::write(root.join(CONFIG_FILE), "[verify]\nparallel = false\n").expect("write");
        let module = nested.join("m.json");
        fs::write(&module, "{}").expect("write");

        assert_eq!(find_config(&module), Some(root.join(CONFIG_FILE)));
        let cfg = load_config(&module, None).expect("load");
        assert!(!cfg.parallel);
        assert_eq!(cfg.config_path, Some(root.join(CONFIG_FILE)));

        let _ = fs::remove_dir_all(&root);
    }
}
