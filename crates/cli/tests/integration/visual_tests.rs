//! Visual command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn dot_output_contains_edges() {
  let env = TestEnv::from_fixture("abc.yaml");

  env
    .sake_cmd()
    .arg("visual")
    .assert()
    .success()
    .stdout(predicate::str::contains("\"A\" -> \"B\"").and(predicate::str::contains("\"A\" -> \"C\"")));
}

#[test]
fn json_output_to_file() {
  let env = TestEnv::from_fixture("abc.yaml");
  let out = env.path("graph.json");

  env
    .sake_cmd()
    .args(["visual", "--format", "json", "-o"])
    .arg(&out)
    .assert()
    .success()
    .stdout(predicate::str::contains("Wrote graph"));

  let json: serde_json::Value = serde_json::from_str(&env.read_file("graph.json")).unwrap();
  assert_eq!(json["nodes"].as_array().unwrap().len(), 3);
  assert_eq!(json["edges"].as_array().unwrap().len(), 2);
  assert_eq!(json["nodes"][0]["status"], "stale");
}

#[cfg(unix)]
#[test]
fn statuses_reflect_last_build() {
  let env = TestEnv::from_fixture("abc.yaml");
  env.sake_cmd().arg("build").assert().success();

  let output = env.sake_cmd().args(["visual", "--format", "json"]).output().unwrap();
  let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  for node in json["nodes"].as_array().unwrap() {
    assert_eq!(node["status"], "fresh");
  }
}
