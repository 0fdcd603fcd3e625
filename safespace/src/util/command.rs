//! Vetted subprocess launcher.
//!
//! Every external command in SafeSpace is built as an argv vector and run
//! here — nothing is ever interpolated into a shell string.

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::errors::{SafeSpaceError, SafeSpaceResult};

/// Captured result of running an external command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Run `argv[0]` with `argv[1..]`, capturing stdout/stderr. `argv` must be
/// non-empty.
pub async fn run_argv(argv: &[String]) -> SafeSpaceResult<CommandOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| SafeSpaceError::Internal("empty argv".to_string()))?;

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| {
            SafeSpaceError::ExternalCommandFailed(format!("spawn {}: {e}", program))
        })?;

    Ok(CommandOutput {
        status: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Run `argv` elevated via `sudo -S`, passing `password` on the child's
/// stdin rather than argv or environment. `password` is never logged.
pub async fn run_argv_sudo(argv: &[String], password: Option<&str>) -> SafeSpaceResult<CommandOutput> {
    let Some(password) = password else {
        return run_argv(argv).await;
    };

    let mut cmd = Command::new("sudo");
    cmd.arg("-S").arg("-p").arg("").args(argv);
    cmd.stdin(std::process::Stdio::piped());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());

    let mut child = cmd
        .spawn()
        .map_err(|e| SafeSpaceError::ExternalCommandFailed(format!("spawn sudo: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.write_all(format!("{password}\n").as_bytes()).await;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| SafeSpaceError::ExternalCommandFailed(format!("wait sudo: {e}")))?;

    Ok(CommandOutput {
        status: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_argv_captures_stdout() {
        let argv = vec!["echo".to_string(), "hello".to_string()];
        let out = run_argv(&argv).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn run_argv_reports_nonzero_exit() {
        let argv = vec!["false".to_string()];
        let out = run_argv(&argv).await.unwrap();
        assert!(!out.success());
    }

    #[tokio::test]
    async fn run_argv_rejects_empty() {
        let argv: Vec<String> = vec![];
        assert!(run_argv(&argv).await.is_err());
    }
}
