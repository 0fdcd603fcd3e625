#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

pub struct TestContext {
    pub cmd: Command,
    pub root_dir: TempDir,
    pub config_dir: TempDir,
}

impl TestContext {
    pub fn root(&self) -> PathBuf {
        self.root_dir.path().join("sandbox")
    }

    pub fn new_cmd(&self) -> Command {
        let bin_path = env!("CARGO_BIN_EXE_safespace");
        let mut cmd = Command::new(bin_path);
        cmd.timeout(Duration::from_secs(30));
        cmd.arg("--root").arg(self.root());
        cmd.env("XDG_CONFIG_HOME", self.config_dir.path());
        cmd
    }
}

pub fn safespace() -> TestContext {
    let root_dir = tempfile::tempdir().expect("tempdir");
    let config_dir = tempfile::tempdir().expect("tempdir");

    let bin_path = env!("CARGO_BIN_EXE_safespace");
    let mut cmd = Command::new(bin_path);
    cmd.timeout(Duration::from_secs(30));
    cmd.arg("--root").arg(root_dir.path().join("sandbox"));
    cmd.env("XDG_CONFIG_HOME", config_dir.path());

    TestContext { cmd, root_dir, config_dir }
}
