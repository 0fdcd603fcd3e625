//! Process validation utilities for PID-file checking.
//!
//! A PID file on its own is not proof of identity, only of existence.
//! SafeSpace's VM and container managers layer a liveness check
//! (`kill(pid, 0)`) over the PID file to tell "process running" from
//! "stale file left by a crashed process".

use std::path::Path;

use crate::errors::{SafeSpaceError, SafeSpaceResult};

/// Read a decimal PID from a pid file, tolerating a trailing newline.
pub fn read_pid_file(path: &Path) -> SafeSpaceResult<u32> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| SafeSpaceError::Internal(format!("reading pid file {}: {e}", path.display())))?;
    content
        .trim()
        .parse::<u32>()
        .map_err(|e| SafeSpaceError::Internal(format!("invalid pid in {}: {e}", path.display())))
}

/// Check whether a process with the given PID is alive, via a null signal.
pub fn is_process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

/// Send SIGTERM to a process, tolerating "no such process".
pub fn terminate(pid: u32) -> SafeSpaceResult<()> {
    let rc = unsafe { libc::kill(pid as i32, libc::SIGTERM) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.kind() == std::io::ErrorKind::NotFound || err.raw_os_error() == Some(libc::ESRCH) {
        return Ok(());
    }
    Err(SafeSpaceError::Internal(format!("terminate pid {pid}: {err}")))
}

/// Send SIGKILL to a process, tolerating "no such process".
pub fn kill(pid: u32) -> SafeSpaceResult<()> {
    let rc = unsafe { libc::kill(pid as i32, libc::SIGKILL) };
    if rc == 0 || !is_process_alive(pid) {
        return Ok(());
    }
    Err(SafeSpaceError::Internal(format!(
        "failed to kill pid {pid}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_pid_file_parses_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pid");
        std::fs::write(&path, "12345\n").unwrap();
        assert_eq!(read_pid_file(&path).unwrap(), 12345);
    }

    #[test]
    fn read_pid_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pid");
        std::fs::write(&path, "not-a-pid").unwrap();
        assert!(read_pid_file(&path).is_err());
    }

    #[test]
    fn current_process_is_alive() {
        let pid = std::process::id();
        assert!(is_process_alive(pid));
    }

    #[test]
    fn nonexistent_pid_is_not_alive() {
        // A PID unlikely to exist; if it happens to collide, this would be
        // a false positive in a very unusual environment.
        assert!(!is_process_alive(u32::MAX - 1));
    }

    #[test]
    fn terminate_tolerates_missing_process() {
        assert!(terminate(u32::MAX - 1).is_ok());
    }
}
