//! Utilities for working with `synth`.

/// Returns the sha256 digest of `bytes` as uppercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, bytes);
    data_encoding::HEXUPPER.encode(digest.as_ref())
}

/// Returns the sha256 digest of the file at the given path *if it exists*.
/// If the file does _not_ exist it returns `Ok(None)`.
pub fn sha256_digest(path: impl AsRef<std::path::Path>) -> anyhow::Result<Option<String>> {
    log::trace!("determining sha256 of {}", path.as_ref().display());
    if !path.as_ref().exists() {
        return Ok(None);
    }
    let contents = std::fs::read(path)?;
    Ok(Some(sha256_hex(&contents)))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn digest_of_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(None, sha256_digest(dir.path().join("nope.json")).unwrap());
    }

    #[test]
    fn digest_matches_file_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.json");
        std::fs::write(&path, b"{}").unwrap();
        assert_eq!(Some(sha256_hex(b"{}")), sha256_digest(&path).unwrap());
        assert_eq!(64, sha256_hex(b"{}").len());
    }
}
