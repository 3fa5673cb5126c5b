use std::path::PathBuf;
use std::process::{Command, Output};

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn hoare(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hoare"))
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("run hoare")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn vcs_prints_entry_condition() {
    let path = fixture("swap.json");
    let out = hoare(&["vcs", path.to_str().expect("utf8 path")]);
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.starts_with("swap:\n"), "{text}");
    assert!(text.contains("[entry]"), "{text}");
    assert!(text.contains("b == b"), "{text}");
}

#[test]
fn vcs_lists_loop_conditions_in_order() {
    let path = fixture("doubling_weak.json");
    let out = hoare(&["vcs", path.to_str().expect("utf8 path"), "--function", "double"]);
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    let entry = text.find("[entry]").expect("entry");
    let preserved = text.find("[loop 1 preserved]").expect("preserved");
    let exit = text.find("[loop 1 exit]").expect("exit");
    assert!(entry < preserved && preserved < exit, "{text}");
}

#[test]
fn vcs_smt_emits_queries() {
    let path = fixture("swap.json");
    let out = hoare(&["vcs", path.to_str().expect("utf8 path"), "--smt"]);
    assert!(out.status.success(), "{}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("; swap entry"), "{text}");
    assert!(text.contains("(declare-const a Int)"), "{text}");
    assert!(text.contains("(assert (not "), "{text}");
    assert!(text.trim_end().ends_with("(check-sat)"), "{text}");
}

#[test]
fn unknown_function_is_rejected() {
    let path = fixture("swap.json");
    let out = hoare(&["vcs", path.to_str().expect("utf8 path"), "--function", "nope"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("no function named `nope`"));
}

#[test]
fn specification_errors_fail_the_run() {
    let path = fixture("bad_arity.json");
    let out = hoare(&["vcs", path.to_str().expect("utf8 path")]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("expects 1 argument(s), got 2"), "{}", stderr(&out));
}

#[test]
fn missing_module_file() {
    let out = hoare(&["verify", "/nonexistent/module.json", "--solver", "/nonexistent/z3"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("failed to read"), "{}", stderr(&out));
}

#[test]
fn missing_solver_reports_error_per_function() {
    let path = fixture("swap.json");
    let out = hoare(&["verify", path.to_str().expect("utf8 path"), "--solver", "/nonexistent/z3"]);
    assert!(!out.status.success());
    let text = stdout(&out);
    assert!(text.contains("swap [ERROR]"), "{text}");
    assert!(text.ends_with("0/1 function(s) verified\n"), "{text}");
}

#[test]
#[ignore = "needs z3 on PATH"]
fn verify_writes_json_report() {
    let report = std::env::temp_dir().join(format!("hoare-report-{}.json", std::process::id()));
    let path = fixture("swap.json");
    let out = hoare(&[
        "verify",
        path.to_str().expect("utf8 path"),
        "--profile",
        "fast",
        "--jobs",
        "1",
        "--report",
        report.to_str().expect("utf8 path"),
    ]);
    assert!(out.status.success(), "{}{}", stdout(&out), stderr(&out));
    assert!(stdout(&out).contains("swap [PROVED]"));

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&report).expect("report")).expect("json");
    assert_eq!(json["schema"], "hoare.verify.v1");
    assert_eq!(json["ok"], true);
    assert_eq!(json["functions"][0]["status"], "verified");
    let _ = std::fs::remove_file(&report);
}

#[test]
#[ignore = "needs z3 on PATH"]
fn weak_invariant_exits_nonzero_with_counterexample() {
    let path = fixture("doubling_weak.json");
    let out = hoare(&["verify", path.to_str().expect("utf8 path")]);
    assert!(!out.status.success());
    let text = stdout(&out);
    assert!(text.contains("double [FAILED (loop 1 exit)]"), "{text}");
    assert!(text.contains("    counterexample: double(n="), "{text}");
}
