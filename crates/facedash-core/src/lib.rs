//! facedash-core — Face recognition and profile engine.
//!
//! Uses SCRFD for face detection and ArcFace for face embeddings, both
//! running via ONNX Runtime. Embeddings are matched against an enrolled
//! gallery by Euclidean distance; a match selects a profile from
//! `people.json` and is published through the presence file.

pub mod alignment;
pub mod config;
pub mod dataset;
pub mod detector;
pub mod fsutil;
pub mod gallery;
pub mod presence;
pub mod profile;
pub mod recognizer;
pub mod types;

pub use config::Settings;
pub use dataset::Dataset;
pub use detector::FaceDetector;
pub use gallery::Gallery;
pub use presence::{PresenceFile, PresenceTracker, Transition, UNKNOWN_USER};
pub use profile::{Gender, NewProfile, NewsCategory, Profile, ProfileStore};
pub use recognizer::FaceRecognizer;
pub use types::{
    BoundingBox, CosineMatcher, Embedding, EuclideanMatcher, GalleryEntry, MatchResult, Matcher,
    RecognizedFace,
};
