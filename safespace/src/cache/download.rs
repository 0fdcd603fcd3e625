//! Verified downloader: streams a URL to disk and checks its SHA-256
//! against an expected digest before the file is trusted.

use std::path::Path;

use crate::errors::{SafeSpaceError, SafeSpaceResult};

use super::{hash_bytes, ArtifactCache, ArtifactType};

/// Streams a URL to disk, verifies its hash when known, and commits it to
/// the cache.
pub struct Downloader {
    cache: ArtifactCache,
    byte_budget: u64,
}

/// Extract a 64-hex-character SHA-256 token from `hash=`/`sha256=` query
/// parameters on `url`, if present.
fn hex_from_url(url: &str) -> Option<String> {
    let query = url.split('?').nth(1)?;
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next()?;
        let value = parts.next()?;
        if (key == "hash" || key == "sha256") && is_sha256_hex(value) {
            return Some(value.to_lowercase());
        }
    }
    None
}

fn is_sha256_hex(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Extract the first 64-hex-digit token from free-form sidecar text (e.g.
/// `"<hex>  alpine.iso\n"`).
pub fn extract_sha256_token(text: &str) -> Option<String> {
    for token in text.split_whitespace() {
        if is_sha256_hex(token) {
            return Some(token.to_lowercase());
        }
    }
    None
}

impl Downloader {
    pub fn new(cache: ArtifactCache, byte_budget: u64) -> Self {
        Self { cache, byte_budget }
    }

    /// Download `url` to `out_path`, verifying against `expected_hex` when
    /// given (or discoverable from the URL's query string). Returns `true`
    /// on success. Temp staging files are cleaned up on every path.
    pub async fn download(
        &self,
        url: &str,
        out_path: &Path,
        artifact_type: ArtifactType,
        expected_hex: Option<&str>,
        custom_meta: Option<serde_json::Value>,
    ) -> SafeSpaceResult<bool> {
        let known_hex = expected_hex.map(str::to_string).or_else(|| hex_from_url(url));

        if let Some(hex) = &known_hex {
            if self.cache.contains(hex).await? {
                self.cache.get(hex, Some(out_path)).await?;
                return Ok(true);
            }
        }

        let staging_dir = self.cache.dir().await.join(".staging");
        std::fs::create_dir_all(&staging_dir)?;
        let tmp_path = staging_dir.join(format!("dl-{}", uuid::Uuid::new_v4()));

        let result = self
            .stream_to_file(url, &tmp_path, known_hex.as_deref())
            .await;

        let outcome = match result {
            Ok(()) => {
                let key = self
                    .cache
                    .put(&tmp_path, artifact_type, Some(url.to_string()), custom_meta, self.byte_budget)
                    .await?;
                self.cache.get(&key, Some(out_path)).await?;
                Ok(true)
            }
            Err(e) => Err(e),
        };

        let _ = std::fs::remove_file(&tmp_path);
        outcome
    }

    async fn stream_to_file(&self, url: &str, tmp_path: &Path, expected_hex: Option<&str>) -> SafeSpaceResult<()> {
        let client = reqwest::Client::new();
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| SafeSpaceError::TransientFilesystem(format!("download {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(SafeSpaceError::TransientFilesystem(format!(
                "download {url}: http {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SafeSpaceError::TransientFilesystem(format!("read body of {url}: {e}")))?;

        if let Some(expected) = expected_hex {
            let actual = hash_bytes(&bytes);
            if actual != expected {
                return Err(SafeSpaceError::IntegrityViolation(format!(
                    "expected {expected}, got {actual} for {url}"
                )));
            }
        }

        std::fs::write(tmp_path, &bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_hash_query_param() {
        let url = "https://example.com/file.iso?hash=e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(
            hex_from_url(url).as_deref(),
            Some("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }

    #[test]
    fn ignores_non_hex_query_values() {
        let url = "https://example.com/file.iso?hash=not-a-hash";
        assert_eq!(hex_from_url(url), None);
    }

    #[test]
    fn extracts_first_sha256_token_from_sidecar_text() {
        let text = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855  alpine.iso\n";
        assert_eq!(
            extract_sha256_token(text).as_deref(),
            Some("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }

    #[test]
    fn sidecar_with_no_hex_token_returns_none() {
        assert_eq!(extract_sha256_token("not a checksum file"), None);
    }
}
