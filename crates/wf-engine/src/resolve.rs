//! Path resolution seam
//!
//! Turning a user-supplied path string into a loadable file belongs to the
//! host's resource layer. The engine only needs the outcome: an absolute path
//! or a failure, which it treats as a silent operator.

use std::path::{Path, PathBuf};

pub trait PathResolver: Send {
    /// Resolve a raw path string. `None` means the resource does not exist.
    fn resolve(&self, raw: &str) -> Option<PathBuf>;
}

/// Plain filesystem resolution: a path resolves iff it exists on disk.
pub struct FsResolver;

impl PathResolver for FsResolver {
    fn resolve(&self, raw: &str) -> Option<PathBuf> {
        if raw.is_empty() {
            return None;
        }
        let path = Path::new(raw);
        path.exists().then(|| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_path_does_not_resolve() {
        assert!(FsResolver.resolve("").is_none());
    }

    #[test]
    fn missing_file_does_not_resolve() {
        assert!(FsResolver.resolve("/nonexistent/sound.wav").is_none());
    }

    #[test]
    fn existing_file_resolves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        std::fs::write(&path, b"riff").unwrap();

        let resolved = FsResolver.resolve(path.to_str().unwrap());
        assert_eq!(resolved, Some(path));
    }
}
