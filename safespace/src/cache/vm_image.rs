//! VM-image specialization over the generic cache.
//!
//! A narrow facade, not a subclass: it composes [`ArtifactCache`] and
//! [`Downloader`] rather than introducing a parallel type hierarchy.

use std::path::Path;

use crate::errors::{SafeSpaceResult, VmError};

use super::download::extract_sha256_token;
use super::{ArtifactCache, ArtifactType, Downloader};

pub struct VmImageStore {
    cache: ArtifactCache,
    downloader: Downloader,
}

impl VmImageStore {
    pub fn new(cache: ArtifactCache, byte_budget: u64) -> Self {
        let downloader = Downloader::new(cache.clone(), byte_budget);
        Self { cache, downloader }
    }

    /// Fetch `iso_url`'s base image, verified against the SHA-256 sidecar
    /// at `sidecar_url`. The sidecar URL is recorded in the artifact's
    /// custom metadata.
    pub async fn fetch_base_image(
        &self,
        iso_url: &str,
        sidecar_url: &str,
        out_path: &Path,
    ) -> SafeSpaceResult<bool> {
        let sidecar_body = reqwest::get(sidecar_url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| VmError::CommandFailed {
                command: format!("GET {sidecar_url}"),
                code: -1,
                stderr: e.to_string(),
            })?
            .text()
            .await
            .map_err(|e| VmError::CommandFailed {
                command: format!("read {sidecar_url}"),
                code: -1,
                stderr: e.to_string(),
            })?;

        let expected_hex = extract_sha256_token(&sidecar_body).ok_or_else(|| VmError::MissingSidecar {
            url: sidecar_url.to_string(),
        })?;

        let custom_meta = serde_json::json!({ "sha256_url": sidecar_url });
        self.downloader
            .download(iso_url, out_path, ArtifactType::VmImage, Some(&expected_hex), Some(custom_meta))
            .await
            .map_err(Into::into)
    }

    pub async fn contains(&self, key: &str) -> SafeSpaceResult<bool> {
        self.cache.contains(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sidecar_token_is_an_error_before_any_network_call() {
        let err = extract_sha256_token("no checksum here");
        assert!(err.is_none());
    }
}
