//! SHA-256 content verification for downloaded artifacts.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Compute the lowercase hex SHA-256 digest of a file, streaming it in
/// fixed-size chunks so large archives never land in memory at once.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("open file for hash: {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf).context("hash file")?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Verify a file against an expected digest.
///
/// The expected value is canonicalized first: an optional `sha256:` prefix
/// is stripped and the remainder lowercased, so manifests may carry either
/// form.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    let expected = expected
        .strip_prefix("sha256:")
        .unwrap_or(expected)
        .to_ascii_lowercase();
    if actual != expected {
        bail!("sha256 mismatch: expected {expected} got {actual}");
    }
    Ok(())
}
