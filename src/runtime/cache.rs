use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use crate::bus::Preview;

/// Last good preview set for a file and the fingerprint it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedPreviewSet {
    pub fingerprint: String,
    pub previews: Vec<Preview>,
}

/// Preview sets keyed by source path.
///
/// Unbounded unless a capacity is given, in which case the least recently
/// stored or looked-up path is evicted first.
#[derive(Debug, Default)]
pub struct PreviewCache {
    entries: HashMap<PathBuf, CachedPreviewSet>,
    recency: VecDeque<PathBuf>,
    capacity: Option<usize>,
}

impl PreviewCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            capacity: capacity.map(|c| c.max(1)),
            ..Self::default()
        }
    }

    pub fn lookup(&mut self, path: &Path) -> Option<&CachedPreviewSet> {
        if self.entries.contains_key(path) {
            self.touch(path);
        }
        self.entries.get(path)
    }

    pub fn store(&mut self, path: &Path, fingerprint: impl Into<String>, previews: Vec<Preview>) {
        self.entries.insert(
            path.to_path_buf(),
            CachedPreviewSet {
                fingerprint: fingerprint.into(),
                previews,
            },
        );
        self.touch(path);
        self.evict();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn touch(&mut self, path: &Path) {
        if self.capacity.is_none() {
            return;
        }
        if let Some(pos) = self.recency.iter().position(|p| p == path) {
            self.recency.remove(pos);
        }
        self.recency.push_back(path.to_path_buf());
    }

    fn evict(&mut self) {
        let Some(capacity) = self.capacity else {
            return;
        };
        while self.entries.len() > capacity {
            let Some(oldest) = self.recency.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            tracing::trace!("evicted cached previews for {}", oldest.display());
        }
    }
}
