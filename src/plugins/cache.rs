//! Path-addressed build cache for synthesized plugin modules.
//!
//! An artifact at the computed output path is proof of a previous
//! successful build and is reused, unless one of the invalidation rules
//! fires:
//!
//! - the plugin source tree exists locally and something in it is newer
//!   than the artifact;
//! - a `<artifact>.sha256` stamp exists and no longer matches the artifact.
//!
//! Artifacts without a stamp (copied in by hand, built by another tool) are
//! trusted as-is. A source tree that cannot be scanned leaves freshness
//! unknown and falls through to the stamp check.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Extension appended to an artifact path to name its digest stamp.
pub const STAMP_EXTENSION: &str = "sha256";

/// Directories never scanned when computing source freshness.
const IGNORED_SOURCE_DIRS: &[&str] = &["target", ".git"];

/// Result of inspecting an artifact path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    /// No file at the artifact path; a build is required.
    Missing,
    /// The artifact can be reused without building.
    Fresh,
    /// The artifact exists but must be rebuilt.
    Stale(StaleReason),
}

impl CacheState {
    pub fn needs_build(self) -> bool {
        !matches!(self, CacheState::Fresh)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    SourceNewer,
    DigestMismatch,
}

/// Decide whether the artifact at `artifact` can be reused.
///
/// `source` is only consulted when it exists on this machine.
pub fn inspect(artifact: &Path, source: &Path) -> io::Result<CacheState> {
    let artifact_meta = match fs::metadata(artifact) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CacheState::Missing),
        Err(e) => return Err(e),
    };

    let artifact_mtime = artifact_meta.modified()?;
    match newest_mtime(source) {
        Ok(Some(source_mtime)) if source_mtime > artifact_mtime => {
            debug!(
                artifact = %artifact.display(),
                source = %source.display(),
                "Plugin source is newer than artifact"
            );
            return Ok(CacheState::Stale(StaleReason::SourceNewer));
        }
        Ok(_) => {}
        Err(e) => {
            warn!(
                source = %source.display(),
                error = %e,
                "Cannot scan plugin source, freshness unknown"
            );
        }
    }

    let stamp = stamp_path(artifact);
    match fs::read_to_string(&stamp) {
        Ok(recorded) => {
            if recorded.trim() != digest(artifact)? {
                debug!(artifact = %artifact.display(), "Artifact digest does not match stamp");
                return Ok(CacheState::Stale(StaleReason::DigestMismatch));
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    Ok(CacheState::Fresh)
}

/// Record the digest of a freshly built artifact next to it.
pub fn record(artifact: &Path) -> io::Result<()> {
    let hex_digest = digest(artifact)?;
    fs::write(stamp_path(artifact), format!("{}\n", hex_digest))
}

/// Path of the digest stamp belonging to `artifact`.
pub fn stamp_path(artifact: &Path) -> PathBuf {
    let mut stamp = artifact.as_os_str().to_owned();
    stamp.push(".");
    stamp.push(STAMP_EXTENSION);
    PathBuf::from(stamp)
}

/// Hex-encoded SHA-256 of a file.
pub fn digest(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Newest modification time of any file under `path`, or `None` when
/// `path` does not exist. Symlinks below `path` are skipped.
fn newest_mtime(path: &Path) -> io::Result<Option<SystemTime>> {
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    if !meta.is_dir() {
        return Ok(Some(meta.modified()?));
    }

    let mut newest = None;
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let entry_path = entry.path();
        let file_type = entry.file_type()?;
        // Symlinks are not followed; they may point back up the tree.
        if file_type.is_symlink() {
            continue;
        }
        if file_type.is_dir()
            && IGNORED_SOURCE_DIRS
                .iter()
                .any(|ignored| entry.file_name() == *ignored)
        {
            continue;
        }
        if let Some(mtime) = newest_mtime(&entry_path)? {
            newest = newest.max(Some(mtime));
        }
    }
    Ok(newest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn touch(path: &Path, contents: &str, mtime: SystemTime) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
        File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(mtime)
            .unwrap();
    }

    #[test]
    fn test_missing_artifact_needs_build() {
        let tmp = TempDir::new().unwrap();
        let state = inspect(&tmp.path().join("broker/rabbitmq.so"), tmp.path()).unwrap();
        assert_eq!(state, CacheState::Missing);
        assert!(state.needs_build());
    }

    #[test]
    fn test_existing_artifact_is_fresh() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("plugin/broker/rabbitmq.so");
        touch(&artifact, "module", SystemTime::now());

        let state = inspect(&artifact, &tmp.path().join("no-such-source")).unwrap();
        assert_eq!(state, CacheState::Fresh);
        assert!(!state.needs_build());
    }

    #[test]
    fn test_source_newer_than_artifact_is_stale() {
        let tmp = TempDir::new().unwrap();
        let now = SystemTime::now();
        let artifact = tmp.path().join("plugin/broker/rabbitmq.so");
        let source = tmp.path().join("src/broker/rabbitmq");
        touch(&artifact, "module", now - Duration::from_secs(120));
        touch(&source.join("src/lib.rs"), "fn main() {}", now);

        assert_eq!(
            inspect(&artifact, &source).unwrap(),
            CacheState::Stale(StaleReason::SourceNewer)
        );
    }

    #[test]
    fn test_source_older_than_artifact_is_fresh() {
        let tmp = TempDir::new().unwrap();
        let now = SystemTime::now();
        let artifact = tmp.path().join("plugin/broker/rabbitmq.so");
        let source = tmp.path().join("src/broker/rabbitmq");
        touch(&source.join("src/lib.rs"), "fn main() {}", now - Duration::from_secs(120));
        touch(&artifact, "module", now);

        assert_eq!(inspect(&artifact, &source).unwrap(), CacheState::Fresh);
    }

    #[test]
    fn test_target_dir_ignored_for_freshness() {
        let tmp = TempDir::new().unwrap();
        let now = SystemTime::now();
        let artifact = tmp.path().join("plugin/broker/rabbitmq.so");
        let source = tmp.path().join("src/broker/rabbitmq");
        touch(&source.join("Cargo.toml"), "[package]", now - Duration::from_secs(120));
        touch(&artifact, "module", now - Duration::from_secs(60));
        touch(&source.join("target/debug/out"), "build output", now);

        assert_eq!(inspect(&artifact, &source).unwrap(), CacheState::Fresh);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_in_source_is_not_followed() {
        let tmp = TempDir::new().unwrap();
        let now = SystemTime::now();
        let artifact = tmp.path().join("plugin/broker/rabbitmq.so");
        let source = tmp.path().join("src/broker/rabbitmq");
        touch(&source.join("src/lib.rs"), "fn main() {}", now - Duration::from_secs(120));
        std::os::unix::fs::symlink("..", source.join("up")).unwrap();
        touch(&artifact, "module", now);

        assert!(newest_mtime(&source).unwrap().is_some());
        assert_eq!(inspect(&artifact, &source).unwrap(), CacheState::Fresh);
    }

    #[test]
    fn test_unscannable_source_leaves_artifact_fresh() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("plugin/broker/rabbitmq.so");
        touch(&artifact, "module", SystemTime::now());
        // A path through a regular file fails with NotADirectory, not NotFound.
        let source = artifact.join("src");

        assert!(newest_mtime(&source).is_err());
        assert_eq!(inspect(&artifact, &source).unwrap(), CacheState::Fresh);
    }

    #[test]
    fn test_stamp_roundtrip_and_mismatch() {
        let tmp = TempDir::new().unwrap();
        let artifact = tmp.path().join("rabbitmq.so");
        fs::write(&artifact, "module v1").unwrap();
        record(&artifact).unwrap();

        assert!(stamp_path(&artifact).exists());
        assert_eq!(inspect(&artifact, tmp.path().join("none").as_path()).unwrap(), CacheState::Fresh);

        fs::write(&artifact, "module v2, truncated").unwrap();
        assert_eq!(
            inspect(&artifact, tmp.path().join("none").as_path()).unwrap(),
            CacheState::Stale(StaleReason::DigestMismatch)
        );
    }

    #[test]
    fn test_stamp_path_appends_extension() {
        assert_eq!(
            stamp_path(Path::new("plugin/broker/rabbitmq.so")),
            Path::new("plugin/broker/rabbitmq.so.sha256")
        );
    }

    #[test]
    fn test_digest_is_sha256_hex() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty");
        fs::write(&path, "").unwrap();
        assert_eq!(
            digest(&path).unwrap(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
