//! Enrolled gallery persisted as `gallery.json`.
//!
//! The gallery is rebuilt wholesale by every encode run and read once at
//! daemon startup (or on an explicit reload). There is no incremental update.

use crate::fsutil;
use crate::types::{Embedding, GalleryEntry};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

const GALLERY_FORMAT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery file not found: {0}; run `facedash encode` first")]
    NotFound(String),
    #[error("gallery io: {0}")]
    Io(#[from] std::io::Error),
    #[error("gallery json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported gallery version {0} (expected {GALLERY_FORMAT_VERSION})")]
    UnsupportedVersion(u32),
    #[error("embedding dimension mismatch: entry {id} has {actual}, expected {expected}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },
}

#[derive(Serialize, Deserialize)]
struct GalleryFile {
    version: u32,
    entries: Vec<GalleryEntry>,
}

/// The enrolled set of (embedding, name) pairs.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a gallery file, validating version and embedding dimensions.
    pub fn load(path: &Path) -> Result<Self, GalleryError> {
        let raw = match std::fs::read(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GalleryError::NotFound(path.display().to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let file: GalleryFile = serde_json::from_slice(&raw)?;
        if file.version != GALLERY_FORMAT_VERSION {
            return Err(GalleryError::UnsupportedVersion(file.version));
        }

        if let Some(first) = file.entries.first() {
            let expected = first.embedding.dim();
            if let Some(bad) = file.entries.iter().find(|e| e.embedding.dim() != expected) {
                return Err(GalleryError::DimensionMismatch {
                    id: bad.id.clone(),
                    expected,
                    actual: bad.embedding.dim(),
                });
            }
        }

        let gallery = Self {
            entries: file.entries,
        };
        tracing::info!(
            path = %path.display(),
            encodings = gallery.len(),
            people = gallery.names().len(),
            "loaded gallery"
        );
        Ok(gallery)
    }

    /// Write the gallery, replacing any previous file atomically.
    pub fn save(&self, path: &Path) -> Result<(), GalleryError> {
        let file = GalleryFile {
            version: GALLERY_FORMAT_VERSION,
            entries: self.entries.clone(),
        };
        let json = serde_json::to_vec(&file)?;
        fsutil::write_atomic(path, &json)?;
        tracing::info!(path = %path.display(), encodings = self.len(), "saved gallery");
        Ok(())
    }

    /// Add an embedding labelled with `name`.
    pub fn push(&mut self, name: &str, embedding: Embedding, source: Option<String>) {
        self.entries.push(GalleryEntry {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            embedding,
            source,
            created_at: chrono::Utc::now().to_rfc3339(),
        });
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Unique person names in first-seen order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !names.contains(&entry.name.as_str()) {
                names.push(&entry.name);
            }
        }
        names
    }

    /// Number of entries per person, in first-seen order.
    pub fn counts(&self) -> Vec<(&str, usize)> {
        self.names()
            .into_iter()
            .map(|name| {
                let n = self.entries.iter().filter(|e| e.name == name).count();
                (name, n)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_preserves_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");

        let mut gallery = Gallery::new();
        gallery.push("ada", Embedding::new(vec![0.1, 0.2]), Some("ada/image_0.jpg".into()));
        gallery.push("bob", Embedding::new(vec![0.3, 0.4]), None);
        gallery.push("ada", Embedding::new(vec![0.5, 0.6]), None);
        gallery.save(&path).unwrap();

        let loaded = Gallery::load(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded.names(), vec!["ada", "bob"]);
        assert_eq!(loaded.counts(), vec![("ada", 2), ("bob", 1)]);
        assert_eq!(loaded.entries()[0].source.as_deref(), Some("ada/image_0.jpg"));
        assert_ne!(loaded.entries()[0].id, loaded.entries()[2].id);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Gallery::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, GalleryError::NotFound(_)));
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");
        std::fs::write(&path, r#"{"version": 99, "entries": []}"#).unwrap();
        let err = Gallery::load(&path).unwrap_err();
        assert!(matches!(err, GalleryError::UnsupportedVersion(99)));
    }

    #[test]
    fn test_load_rejects_mixed_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gallery.json");

        let mut gallery = Gallery::new();
        gallery.push("ada", Embedding::new(vec![0.1, 0.2]), None);
        gallery.push("bob", Embedding::new(vec![0.1, 0.2, 0.3]), None);
        gallery.save(&path).unwrap();

        let err = Gallery::load(&path).unwrap_err();
        assert!(matches!(
            err,
            GalleryError::DimensionMismatch { expected: 2, actual: 3, .. }
        ));
    }
}
