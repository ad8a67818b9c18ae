//! Build command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[cfg(unix)]
#[test]
fn first_build_runs_everything() {
  let env = TestEnv::from_fixture("abc.yaml");

  env
    .sake_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Build complete").and(predicate::str::contains("Succeeded: 3")));

  assert_eq!(env.read_file("b.txt"), "a\n");
  assert!(env.state_path().join("hashstore.json").exists());
}

#[cfg(unix)]
#[test]
fn second_build_is_a_no_op() {
  let env = TestEnv::from_fixture("abc.yaml");
  env.sake_cmd().arg("build").assert().success();

  env
    .sake_cmd()
    .arg("build")
    .assert()
    .success()
    .stdout(predicate::str::contains("Nothing to do"));
}

#[cfg(unix)]
#[test]
fn edited_output_rebuilds_downstream() {
  let env = TestEnv::from_fixture("abc.yaml");
  env.sake_cmd().arg("build").assert().success();

  env.write_file("a.txt", "edited\n");

  let output = env.sake_cmd().args(["--json", "build"]).output().unwrap();
  assert!(output.status.success());
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["dirty"], serde_json::json!(["A"]));
  assert_eq!(json["plan"], serde_json::json!(["A", "B", "C"]));
  assert_eq!(json["result"]["status"], "all_succeeded");

  // A rewrote a.txt, so the hand edit is gone.
  assert_eq!(env.read_file("c.txt"), "a\n");
}

#[cfg(unix)]
#[test]
fn failure_skips_dependents_and_exits_nonzero() {
  let env = TestEnv::from_fixture("failing.yaml");

  env
    .sake_cmd()
    .args(["build", "-j", "1"])
    .assert()
    .code(1)
    .stdout(predicate::str::contains("Skipped: B, C"))
    .stderr(predicate::str::contains("broken"));

  assert!(!env.path("b.txt").exists());
  assert!(env.path("independent.txt").exists());
}

#[cfg(unix)]
#[test]
fn failure_json_reports_partial_failure() {
  let env = TestEnv::from_fixture("failing.yaml");

  let output = env.sake_cmd().args(["--json", "build"]).output().unwrap();
  assert_eq!(output.status.code(), Some(1));
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let result = &json["result"];
  assert_eq!(result["status"], "partial_failure");
  assert_eq!(result["failed"], serde_json::json!(["A"]));
  assert_eq!(result["skipped"], serde_json::json!(["B", "C"]));
  assert_eq!(result["per_target"]["A"]["exit_code"], 1);
  assert_eq!(result["per_target"]["independent"]["status"], "succeeded");
}

#[cfg(unix)]
#[test]
fn fail_fast_stops_dispatching() {
  let env = TestEnv::from_fixture("failing.yaml");

  env
    .sake_cmd()
    .args(["build", "-j", "1", "--fail-fast"])
    .assert()
    .code(1);

  assert!(!env.path("independent.txt").exists());
}

#[cfg(unix)]
#[test]
fn dry_run_runs_nothing() {
  let env = TestEnv::from_fixture("abc.yaml");

  env
    .sake_cmd()
    .args(["build", "--dry-run"])
    .assert()
    .success()
    .stdout(predicate::str::contains("3 target(s) would run"));

  assert!(!env.path("a.txt").exists());
  assert!(!env.state_path().join("hashstore.json").exists());
}

#[cfg(unix)]
#[test]
fn positional_targets_limit_the_build() {
  let env = TestEnv::from_fixture("abc.yaml");

  env.sake_cmd().args(["build", "B"]).assert().success();

  assert!(env.path("b.txt").exists());
  assert!(!env.path("c.txt").exists());
}

#[cfg(unix)]
#[test]
fn force_rebuilds_a_fresh_target() {
  let env = TestEnv::from_fixture("abc.yaml");
  env.sake_cmd().arg("build").assert().success();

  let output = env.sake_cmd().args(["--json", "build", "--force", "C"]).output().unwrap();
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["plan"], serde_json::json!(["C"]));
}

#[test]
fn unknown_target_is_rejected() {
  let env = TestEnv::from_fixture("abc.yaml");

  env
    .sake_cmd()
    .args(["build", "nope"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("unknown target"));
}

#[test]
fn cycle_is_rejected_before_running() {
  let env = TestEnv::from_fixture("cycle.yaml");

  env
    .sake_cmd()
    .arg("build")
    .assert()
    .code(2)
    .stderr(predicate::str::contains("dependency cycle detected"));
}

#[cfg(unix)]
#[test]
fn macros_and_overrides() {
  let env = TestEnv::from_fixture("macros.yaml");

  env.sake_cmd().arg("build").assert().success();
  assert_eq!(env.read_file("greeting.txt"), "hello\n");

  env
    .sake_cmd()
    .args(["-D", "GREETING=bonjour", "build"])
    .assert()
    .success();
  assert_eq!(env.read_file("greeting.txt"), "bonjour\n");
}

#[cfg(unix)]
#[test]
fn timeout_fails_target() {
  let env = TestEnv::from_fixture("abc.yaml");
  env.write_file("Sakefile.yaml", "slow:\n  formula: sleep 10\n");

  env
    .sake_cmd()
    .args(["build", "--timeout", "200ms"])
    .assert()
    .code(1)
    .stdout(predicate::str::contains("timed out"));
}
