//! Status and list command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn status_before_first_build_lists_everything_stale() {
  let env = TestEnv::from_fixture("abc.yaml");

  env
    .sake_cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("3 target(s) would run").and(predicate::str::contains("A → B → C")));
}

#[cfg(unix)]
#[test]
fn status_after_build_is_fresh() {
  let env = TestEnv::from_fixture("abc.yaml");
  env.sake_cmd().arg("build").assert().success();

  env
    .sake_cmd()
    .arg("status")
    .assert()
    .success()
    .stdout(predicate::str::contains("All targets are up to date"));
}

#[cfg(unix)]
#[test]
fn status_json_attributes_change_to_producer() {
  let env = TestEnv::from_fixture("abc.yaml");
  env.sake_cmd().arg("build").assert().success();
  env.write_file("a.txt", "edited\n");

  let output = env.sake_cmd().args(["--json", "status"]).output().unwrap();
  assert!(output.status.success());
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

  let targets = json["targets"].as_array().unwrap();
  assert_eq!(targets[0]["id"], "A");
  assert_eq!(targets[0]["status"], "stale");
  assert!(targets[0]["reason"].as_str().unwrap().contains("changed"));
  assert_eq!(targets[1]["status"], "stale");
  assert!(targets[1]["reason"].is_null());
}

#[cfg(unix)]
#[test]
fn status_does_not_modify_state() {
  let env = TestEnv::from_fixture("abc.yaml");
  env.sake_cmd().arg("build").assert().success();
  let before = env.read_file("state/hashstore.json");

  env.write_file("a.txt", "edited\n");
  env.sake_cmd().arg("status").assert().success();

  assert_eq!(env.read_file("state/hashstore.json"), before);
}

#[test]
fn list_shows_help_text() {
  let env = TestEnv::from_fixture("abc.yaml");

  env
    .sake_cmd()
    .arg("list")
    .assert()
    .success()
    .stdout(predicate::str::contains("copy a.txt to b.txt"));
}

#[test]
fn list_json_includes_inferred_dependencies() {
  let env = TestEnv::from_fixture("abc.yaml");

  let output = env.sake_cmd().args(["--json", "list"]).output().unwrap();
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(json[1]["id"], "B");
  assert_eq!(json[1]["dependencies"], serde_json::json!(["A"]));
}
