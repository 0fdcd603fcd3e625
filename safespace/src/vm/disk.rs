//! Sparse qcow2 disk image creation.
//!
//! A disk is created by formatting a qcow2 header with `qcow2-rs` and
//! writing it to a new file, rather than shelling out to `qemu-img`. The
//! result is sparse — only the metadata clusters are materialized until
//! the guest actually writes data.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use qcow2_rs::meta::Qcow2Header;

use crate::errors::{SafeSpaceResult, VmError};

const CLUSTER_BITS: usize = 16;
const REFCOUNT_ORDER: u8 = 4;
const BLOCK_SIZE: usize = 512;

/// Create a sparse qcow2 disk of `size_bytes` at `path`, unless one already
/// exists there.
pub fn create_sparse_disk(path: &Path, size_bytes: u64) -> SafeSpaceResult<()> {
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let (rc_table, rc_block, _l1_table) =
        Qcow2Header::calculate_meta_params(size_bytes, CLUSTER_BITS, REFCOUNT_ORDER, BLOCK_SIZE);
    let clusters = 1 + rc_table.1 + rc_block.1;
    let buffer_size = ((clusters as usize) << CLUSTER_BITS) + BLOCK_SIZE;

    let mut header_buf = vec![0u8; buffer_size];
    Qcow2Header::format_qcow2(&mut header_buf, size_bytes, CLUSTER_BITS, REFCOUNT_ORDER, BLOCK_SIZE)
        .map_err(|e| VmError::Disk(format!("format qcow2 header: {e}")))?;

    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    file.write_all(&header_buf)?;
    Ok(())
}

/// Parse a human disk-size string (`"20G"`, `"512M"`) into bytes.
pub fn parse_size(spec: &str) -> SafeSpaceResult<u64> {
    let spec = spec.trim();
    let (digits, suffix) = spec.split_at(spec.trim_end_matches(char::is_alphabetic).len());
    let value: u64 = digits
        .parse()
        .map_err(|_| VmError::Disk(format!("invalid disk size {spec}")))?;
    let multiplier: u64 = match suffix.to_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" => 1024,
        "M" | "MB" => 1024 * 1024,
        "G" | "GB" => 1024 * 1024 * 1024,
        "T" | "TB" => 1024 * 1024 * 1024 * 1024,
        other => return Err(VmError::Disk(format!("unknown size suffix {other}")).into()),
    };
    Ok(value * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gigabyte_suffix() {
        assert_eq!(parse_size("20G").unwrap(), 20 * 1024 * 1024 * 1024);
    }

    #[test]
    fn parses_bare_byte_count() {
        assert_eq!(parse_size("512").unwrap(), 512);
    }

    #[test]
    fn rejects_unknown_suffix() {
        assert!(parse_size("5X").is_err());
    }

    #[test]
    fn creates_sparse_disk_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.qcow2");
        create_sparse_disk(&path, 1024 * 1024 * 1024).unwrap();
        assert!(path.exists());
        // Sparse: on-disk size is metadata-only, far smaller than the
        // virtual size.
        let actual = std::fs::metadata(&path).unwrap().len();
        assert!(actual < 10 * 1024 * 1024);
    }

    #[test]
    fn create_sparse_disk_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.qcow2");
        create_sparse_disk(&path, 1024 * 1024).unwrap();
        let first_len = std::fs::metadata(&path).unwrap().len();
        create_sparse_disk(&path, 999 * 1024 * 1024 * 1024).unwrap();
        let second_len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(first_len, second_len);
    }
}
