//! Hierarchical error types for SafeSpace.
//!
//! Errors are categorized by recovery path, per the taxonomy in the design
//! document:
//! - [`SafeSpaceError::PreconditionMissing`]: a required host tool or
//!   permission is absent; abort the verb.
//! - [`SafeSpaceError::ExternalCommandFailed`]: a shelled-out command
//!   returned nonzero; surfaced with stderr.
//! - [`SafeSpaceError::IntegrityViolation`]: a SHA-256 mismatch on download
//!   or cache verification.
//!
//! Subsystem errors (`NetworkError`, `VmError`, `ContainerError`) convert
//! into `SafeSpaceError` via `#[from]` so callers can match on the top-level
//! enum without losing subsystem detail in the message.

use std::io;
use thiserror::Error;

pub type SafeSpaceResult<T> = Result<T, SafeSpaceError>;

/// Crate-wide error type returned by every public verb.
#[derive(Debug, Error)]
pub enum SafeSpaceError {
    /// A required binary, permission, or OS feature is missing.
    #[error("precondition missing: {0}")]
    PreconditionMissing(String),

    /// A path failed a permission check (mode, ownership, writability).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A shelled-out command returned a nonzero exit code.
    #[error("command failed: {0}")]
    ExternalCommandFailed(String),

    /// A SHA-256 mismatch was detected on download or cache verification.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    /// The on-disk cache index could not be parsed.
    #[error("index corruption: {0}")]
    IndexCorruption(String),

    /// The persistent state store failed an I/O or transaction.
    #[error("state store failure: {0}")]
    StateStoreFailure(String),

    /// A transient filesystem condition (EAGAIN, partial read) with no
    /// auto-retry policy.
    #[error("transient filesystem error: {0}")]
    TransientFilesystem(String),

    /// Network isolation subsystem error.
    #[error("network: {0}")]
    Network(#[from] NetworkError),

    /// VM manager subsystem error.
    #[error("vm: {0}")]
    Vm(#[from] VmError),

    /// Container manager subsystem error.
    #[error("container: {0}")]
    Container(#[from] ContainerError),

    /// Generic IO error (catch-all).
    #[error("io: {0}")]
    Io(#[from] io::Error),

    /// Internal invariant violation; should not normally surface to users.
    #[error("internal: {0}")]
    Internal(String),
}

/// Errors from establishing or shaping the network isolation path.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("{kind} already exists on this host: {detail}")]
    AlreadyExists { kind: &'static str, detail: String },

    #[error("{tool} not found on PATH")]
    ToolMissing { tool: &'static str },

    #[error("{command}: exit {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("unsupported platform for network isolation")]
    UnsupportedPlatform,

    #[error("invalid shaping parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: String },
}

/// Errors from the VM manager.
#[derive(Debug, Error)]
pub enum VmError {
    #[error("{tool} not found on PATH")]
    ToolMissing { tool: &'static str },

    #[error("base image checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("missing checksum sidecar for {url}")]
    MissingSidecar { url: String },

    #[error("disk image error: {0}")]
    Disk(String),

    #[error("{command}: exit {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("vm is not running")]
    NotRunning,

    #[error("vm already running with pid {0}")]
    AlreadyRunning(u32),
}

/// Errors from the container manager.
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("no supported container runtime found (tried: {0:?})")]
    NoRuntime(Vec<String>),

    #[error("{command}: exit {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("container is not running")]
    NotRunning,
}

impl From<serde_json::Error> for SafeSpaceError {
    fn from(err: serde_json::Error) -> Self {
        SafeSpaceError::IndexCorruption(err.to_string())
    }
}

impl From<rusqlite::Error> for SafeSpaceError {
    fn from(err: rusqlite::Error) -> Self {
        SafeSpaceError::StateStoreFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_error_converts_into_safespace_error() {
        let net_err = NetworkError::UnsupportedPlatform;
        let err: SafeSpaceError = net_err.into();
        assert!(matches!(err, SafeSpaceError::Network(_)));
        assert_eq!(err.to_string(), "network: unsupported platform for network isolation");
    }

    #[test]
    fn vm_error_converts_into_safespace_error() {
        let vm_err = VmError::NotRunning;
        let err: SafeSpaceError = vm_err.into();
        assert!(matches!(err, SafeSpaceError::Vm(_)));
    }

    #[test]
    fn container_error_converts_into_safespace_error() {
        let err: SafeSpaceError = ContainerError::NotRunning.into();
        assert!(matches!(err, SafeSpaceError::Container(_)));
    }
}
