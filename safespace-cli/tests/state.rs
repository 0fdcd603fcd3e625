use predicates::prelude::*;

mod common;

#[test]
fn persistent_create_then_save_then_list_round_trips() {
    let ctx = common::safespace();
    ctx.new_cmd()
        .arg("create")
        .arg("--mode")
        .arg("persistent")
        .arg("--name")
        .arg("cli-test-alpha")
        .assert()
        .success();

    ctx.new_cmd().arg("save").assert().success().stdout("saved\n");

    ctx.new_cmd()
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("cli-test-alpha"));

    ctx.new_cmd()
        .arg("load")
        .arg("--name")
        .arg("cli-test-alpha")
        .assert()
        .success();
}

#[test]
fn load_requires_id_or_name() {
    let ctx = common::safespace();
    ctx.new_cmd().arg("load").assert().failure();
}

#[test]
fn delete_unknown_id_fails() {
    let ctx = common::safespace();
    ctx.new_cmd()
        .arg("delete")
        .arg("not-a-real-id")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no saved sandbox"));
}
