//! Enrollment image layout: `dataset/<name>/image_<n>.jpg`.

use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 2] = ["jpg", "png"];

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("invalid person name for a dataset directory: {0:?}")]
    InvalidName(String),
    #[error("dataset io: {0}")]
    Io(#[from] std::io::Error),
}

/// Totals for progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DatasetCounts {
    pub people: usize,
    pub images: usize,
}

pub struct Dataset {
    root: PathBuf,
}

impl Dataset {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for `name`, created if needed.
    pub fn person_dir(&self, name: &str) -> Result<PathBuf, DatasetError> {
        validate_name(name)?;
        let dir = self.root.join(name);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Path for the `index`-th capture of `name`.
    pub fn image_path(&self, name: &str, index: usize) -> Result<PathBuf, DatasetError> {
        Ok(self.person_dir(name)?.join(format!("image_{index}.jpg")))
    }

    /// Person directory names, sorted. A missing root is empty.
    pub fn people(&self) -> Result<Vec<String>, DatasetError> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut people = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    people.push(name.to_string());
                }
            }
        }
        people.sort();
        Ok(people)
    }

    /// Image files for `name` (`.jpg` / `.png`), sorted by file name.
    pub fn images(&self, name: &str) -> Result<Vec<PathBuf>, DatasetError> {
        validate_name(name)?;
        let mut images: Vec<PathBuf> = std::fs::read_dir(self.root.join(name))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && is_image(p))
            .collect();
        images.sort();
        Ok(images)
    }

    pub fn count(&self) -> Result<DatasetCounts, DatasetError> {
        let mut counts = DatasetCounts::default();
        for person in self.people()? {
            counts.people += 1;
            counts.images += self.images(&person)?.len();
        }
        Ok(counts)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e))
        .unwrap_or(false)
}

fn validate_name(name: &str) -> Result<(), DatasetError> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if ok {
        Ok(())
    } else {
        Err(DatasetError::InvalidName(name.to_string()))
    }
}
