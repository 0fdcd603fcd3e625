//! Sandbox-root lock, preventing two `SandboxController`s from driving the
//! same root concurrently.
//!
//! An `flock(2)` non-blocking exclusive lock on a `.lock` file under the
//! root, released on drop.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::errors::SafeSpaceError;

#[derive(Debug)]
pub struct SandboxLock {
    file: File,
    path: PathBuf,
}

impl SandboxLock {
    pub fn acquire(root: &Path) -> Result<Self, SafeSpaceError> {
        std::fs::create_dir_all(root)?;
        let lock_path = root.join(".lock");

        let file = OpenOptions::new().create(true).write(true).open(&lock_path)?;

        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = file.as_raw_fd();
            let rc = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
            if rc != 0 {
                let err = std::io::Error::last_os_error();
                if err.kind() == std::io::ErrorKind::WouldBlock {
                    return Err(SafeSpaceError::PreconditionMissing(format!(
                        "another SafeSpace session already holds {}",
                        root.display()
                    )));
                }
                return Err(SafeSpaceError::Io(err));
            }
        }

        Ok(Self { file, path: lock_path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SandboxLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            let fd = self.file.as_raw_fd();
            unsafe {
                libc::flock(fd, libc::LOCK_UN);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_creates_lock_file() {
        let tmp = tempfile::tempdir().unwrap();
        let lock = SandboxLock::acquire(tmp.path()).unwrap();
        assert!(lock.path().exists());
    }

    #[test]
    fn second_acquire_on_same_root_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let _first = SandboxLock::acquire(tmp.path()).unwrap();
        assert!(SandboxLock::acquire(tmp.path()).is_err());
    }

    #[test]
    fn lock_is_released_on_drop() {
        let tmp = tempfile::tempdir().unwrap();
        {
            let _lock = SandboxLock::acquire(tmp.path()).unwrap();
        }
        assert!(SandboxLock::acquire(tmp.path()).is_ok());
    }
}
