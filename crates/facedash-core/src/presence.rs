//! Who is in front of the camera, shared between the daemon and the dashboard.
//!
//! The daemon is the only writer; the dashboard polls. Updates replace the
//! file atomically so a poll never sees a half-written name.

use crate::fsutil;
use crate::types::RecognizedFace;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Value stored when nobody has been recognized yet.
pub const UNKNOWN_USER: &str = "unknown";

#[derive(Error, Debug)]
pub enum PresenceError {
    #[error("presence io: {0}")]
    Io(#[from] std::io::Error),
}

/// The current-user file (`current_user.txt`).
#[derive(Debug, Clone)]
pub struct PresenceFile {
    path: PathBuf,
}

impl PresenceFile {
    /// Open the presence file, creating it with [`UNKNOWN_USER`] if missing.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PresenceError> {
        let file = Self { path: path.into() };
        if !file.path.exists() {
            fsutil::write_atomic(&file.path, UNKNOWN_USER.as_bytes())?;
        }
        Ok(file)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn update(&self, name: &str) -> Result<(), PresenceError> {
        fsutil::write_atomic(&self.path, name.trim().as_bytes())?;
        tracing::debug!(name, path = %self.path.display(), "presence updated");
        Ok(())
    }

    /// Current user name; [`UNKNOWN_USER`] when the file is unreadable or empty.
    pub fn current(&self) -> String {
        match std::fs::read_to_string(&self.path) {
            Ok(s) if !s.trim().is_empty() => s.trim().to_string(),
            Ok(_) => UNKNOWN_USER.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, path = %self.path.display(), "cannot read presence file");
                UNKNOWN_USER.to_string()
            }
        }
    }
}

/// A change of recognized user.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub previous: String,
    pub current: String,
    pub confidence: f32,
}

/// Tracks the last recognized name and reports changes.
#[derive(Debug)]
pub struct PresenceTracker {
    current: String,
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self {
            current: UNKNOWN_USER.to_string(),
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Feed the faces recognized in one frame.
    ///
    /// The first matched face whose name differs from the current one
    /// becomes current. Unknown faces never change state.
    pub fn observe(&mut self, faces: &[RecognizedFace]) -> Option<Transition> {
        let (name, confidence) = faces.iter().find_map(|face| {
            face.name()
                .filter(|n| *n != self.current)
                .map(|n| (n.to_string(), face.result.confidence))
        })?;

        let previous = std::mem::replace(&mut self.current, name.clone());
        Some(Transition {
            previous,
            current: name,
            confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, MatchResult};

    fn face(name: Option<&str>, confidence: f32) -> RecognizedFace {
        RecognizedFace {
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 10.0,
                height: 10.0,
                confidence: 0.9,
                landmarks: None,
            },
            result: MatchResult {
                matched: name.is_some(),
                distance: 1.0 - confidence,
                confidence,
                entry_id: name.map(|_| "id".to_string()),
                name: name.map(str::to_string),
            },
        }
    }

    #[test]
    fn test_presence_file_defaults_to_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let file = PresenceFile::open(dir.path().join("current_user.txt")).unwrap();
        assert_eq!(file.current(), UNKNOWN_USER);
    }

    #[test]
    fn test_presence_file_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("current_user.txt");
        let file = PresenceFile::open(&path).unwrap();
        file.update("ada\n").unwrap();
        assert_eq!(file.current(), "ada");

        // Re-opening keeps the existing value.
        let reopened = PresenceFile::open(&path).unwrap();
        assert_eq!(reopened.current(), "ada");
    }

    #[test]
    fn test_presence_file_unreadable_or_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("current_user.txt");
        let file = PresenceFile::open(&path).unwrap();

        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(file.current(), UNKNOWN_USER);

        std::fs::remove_file(&path).unwrap();
        assert_eq!(file.current(), UNKNOWN_USER);
    }

    #[test]
    fn test_tracker_reports_changes_only() {
        let mut tracker = PresenceTracker::new();

        let t = tracker.observe(&[face(Some("ada"), 0.6)]).unwrap();
        assert_eq!(t.previous, UNKNOWN_USER);
        assert_eq!(t.current, "ada");
        assert!((t.confidence - 0.6).abs() < 1e-6);

        assert!(tracker.observe(&[face(Some("ada"), 0.7)]).is_none());
        assert!(tracker.observe(&[face(None, 0.0)]).is_none());
        assert!(tracker.observe(&[]).is_none());
        assert_eq!(tracker.current(), "ada");

        let t = tracker.observe(&[face(Some("bob"), 0.5)]).unwrap();
        assert_eq!(t.previous, "ada");
        assert_eq!(tracker.current(), "bob");
    }

    #[test]
    fn test_tracker_skips_current_and_unknown_faces() {
        let mut tracker = PresenceTracker::new();
        tracker.observe(&[face(Some("ada"), 0.6)]);

        let t = tracker
            .observe(&[face(None, 0.0), face(Some("ada"), 0.9), face(Some("bob"), 0.4)])
            .unwrap();
        assert_eq!(t.current, "bob");
    }
}
