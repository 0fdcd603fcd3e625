mod common;

#[test]
fn ephemeral_cleanup_removes_root() {
    let ctx = common::safespace();
    ctx.new_cmd().arg("create").assert().success();
    assert!(ctx.root().exists());

    ctx.new_cmd().arg("cleanup").assert().success();
    assert!(!ctx.root().exists());
}

#[test]
fn clean_cache_then_gc_succeed_on_fresh_sandbox() {
    let ctx = common::safespace();
    ctx.new_cmd().arg("create").assert().success();

    ctx.new_cmd().arg("clean-cache").assert().success();
    ctx.new_cmd().arg("gc").assert().success();
}
