use predicates::prelude::*;

mod common;

#[test]
fn create_prints_a_sandbox_id() {
    let mut ctx = common::safespace();
    ctx.cmd
        .arg("create")
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^[0-9a-f-]{36}\n$").unwrap());
}

#[test]
fn create_then_health_reports_ok() {
    let ctx = common::safespace();
    ctx.new_cmd().arg("create").assert().success();

    ctx.new_cmd().arg("health").assert().success().stdout("ok\n");
}

#[test]
fn health_on_missing_root_fails() {
    let ctx = common::safespace();
    ctx.new_cmd()
        .arg("health")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no sandbox at"));
}
