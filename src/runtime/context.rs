use std::path::{Path, PathBuf};

use rand::Rng;

const PLACEHOLDER_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const PLACEHOLDER_LEN: usize = 32;

/// Random 32-character token used where no real fingerprint exists. It never
/// equals a hex digest, so it can never match a cache entry or a later
/// extraction.
pub fn placeholder_fingerprint() -> String {
    let mut rng = rand::thread_rng();
    (0..PLACEHOLDER_LEN)
        .map(|_| PLACEHOLDER_ALPHABET[rng.gen_range(0..PLACEHOLDER_ALPHABET.len())] as char)
        .collect()
}

/// What the orchestrator last decided to care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewContext {
    pub observed_path: PathBuf,
    pub preview_names: Vec<String>,
    pub content_fingerprint: String,
}

impl PreviewContext {
    pub fn new(
        observed_path: impl Into<PathBuf>,
        preview_names: Vec<String>,
        content_fingerprint: impl Into<String>,
    ) -> Self {
        Self {
            observed_path: observed_path.into(),
            preview_names,
            content_fingerprint: content_fingerprint.into(),
        }
    }

    /// Context for a path we could not (or chose not to) fingerprint.
    pub fn placeholder(observed_path: impl Into<PathBuf>) -> Self {
        Self::new(observed_path, Vec::new(), placeholder_fingerprint())
    }

    pub fn observes(&self, path: &Path) -> bool {
        self.observed_path == path
    }

    /// Substring containment of `path` in the observed path. A change
    /// reported for a directory that encloses the observed file counts as a
    /// change of that file.
    pub fn encloses(&self, path: &Path) -> bool {
        self.observed_path
            .to_string_lossy()
            .contains(path.to_string_lossy().as_ref())
    }
}
