#![forbid(unsafe_code)]

//! Process and request-level safety helpers.

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Fails fast when the backend is started as root. Running as a regular
/// unprivileged user keeps the data directory owned by the service account.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!(
            "{process} must not be run as root; use a regular user or a dedicated service account"
        );
    }
    Ok(())
}

/// Stable, non-reversible key for a viewer. Raw addresses never reach the
/// view log.
pub fn viewer_fingerprint(ip: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"vidvault-viewer:");
    hasher.update(ip.trim().as_bytes());
    hasher.finalize().to_hex().to_string()
}

/// Compares two secrets without short-circuiting on the first mismatch.
pub fn secrets_match(expected: &str, provided: &str) -> bool {
    blake3::hash(expected.as_bytes()) == blake3::hash(provided.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::Uid;

    #[test]
    fn ensure_not_root_allows_unprivileged_uid() {
        let uid = Uid::from_raw(1000);
        assert!(ensure_not_root_for(uid, "tester").is_ok());
    }

    #[test]
    fn ensure_not_root_rejects_root_uid() {
        let uid = Uid::from_raw(0);
        let err = ensure_not_root_for(uid, "tester").unwrap_err();
        assert!(err.to_string().contains("must not be run as root"));
    }

    #[test]
    fn fingerprint_is_stable_and_hides_the_address() {
        let first = viewer_fingerprint("203.0.113.7");
        assert_eq!(first, viewer_fingerprint(" 203.0.113.7 "));
        assert_ne!(first, viewer_fingerprint("203.0.113.8"));
        assert!(!first.contains("203"));
        assert_eq!(first.len(), 64);
    }

    #[test]
    fn secrets_match_compares_content() {
        assert!(secrets_match("hunter2", "hunter2"));
        assert!(!secrets_match("hunter2", "hunter3"));
        assert!(!secrets_match("hunter2", ""));
    }
}
