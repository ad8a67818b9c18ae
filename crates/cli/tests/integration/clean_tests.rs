//! Clean command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[cfg(unix)]
#[test]
fn clean_removes_outputs_and_forces_rebuild() {
  let env = TestEnv::from_fixture("abc.yaml");
  env.sake_cmd().arg("build").assert().success();

  env
    .sake_cmd()
    .arg("clean")
    .assert()
    .success()
    .stdout(predicate::str::contains("Files removed: 3"));

  assert!(!env.path("a.txt").exists());
  env
    .sake_cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("3 target(s) would run"));
}

#[cfg(unix)]
#[test]
fn clean_single_target() {
  let env = TestEnv::from_fixture("abc.yaml");
  env.sake_cmd().arg("build").assert().success();

  env.sake_cmd().args(["clean", "C"]).assert().success();

  assert!(env.path("a.txt").exists());
  assert!(!env.path("c.txt").exists());

  let output = env.sake_cmd().args(["--json", "build"]).output().unwrap();
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json["plan"], serde_json::json!(["C"]));
}

#[test]
fn clean_unknown_target_fails() {
  let env = TestEnv::from_fixture("abc.yaml");

  env
    .sake_cmd()
    .args(["clean", "missing"])
    .assert()
    .code(2)
    .stderr(predicate::str::contains("unknown target 'missing'"));
}
