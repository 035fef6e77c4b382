use serde::{Deserialize, Serialize};

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    /// Euclidean distance between two embeddings.
    ///
    /// Vectors of different length are compared over their common prefix;
    /// the gallery rejects such entries on load, so this only matters for
    /// hand-built values.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Cosine similarity in [-1, 1]. Zero vectors have similarity 0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 {
            dot / denom
        } else {
            0.0
        }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// One enrolled sample: an embedding labelled with the person it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub id: String,
    pub name: String,
    pub embedding: Embedding,
    /// Image the embedding was computed from, relative to the dataset root.
    #[serde(default)]
    pub source: Option<String>,
    pub created_at: String,
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Distance to the closest gallery entry (0 for an empty gallery).
    pub distance: f32,
    /// `1 - distance`, clamped to [0, 1].
    pub confidence: f32,
    /// ID of the matched entry (if any).
    pub entry_id: Option<String>,
    /// Person name of the matched entry (if any).
    pub name: Option<String>,
}

impl MatchResult {
    pub fn no_match(distance: f32) -> Self {
        Self {
            matched: false,
            distance,
            confidence: confidence_from_distance(distance),
            entry_id: None,
            name: None,
        }
    }
}

fn confidence_from_distance(distance: f32) -> f32 {
    (1.0 - distance).clamp(0.0, 1.0)
}

/// Strategy for comparing a probe embedding against the enrolled gallery.
///
/// `max_distance` is exclusive: a best distance equal to it does not match.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[GalleryEntry], max_distance: f32)
        -> MatchResult;
}

/// Nearest neighbour by Euclidean distance over every gallery entry.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &[GalleryEntry],
        max_distance: f32,
    ) -> MatchResult {
        best_by(gallery, max_distance, |entry| {
            probe.euclidean_distance(&entry.embedding)
        })
    }
}

/// Nearest neighbour by cosine distance (`1 - similarity`).
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        gallery: &[GalleryEntry],
        max_distance: f32,
    ) -> MatchResult {
        best_by(gallery, max_distance, |entry| {
            1.0 - probe.similarity(&entry.embedding)
        })
    }
}

fn best_by<F>(gallery: &[GalleryEntry], max_distance: f32, distance: F) -> MatchResult
where
    F: Fn(&GalleryEntry) -> f32,
{
    let best = gallery
        .iter()
        .map(|entry| (entry, distance(entry)))
        .fold(None::<(&GalleryEntry, f32)>, |best, (entry, d)| match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((entry, d)),
        });

    match best {
        Some((entry, d)) if d < max_distance => MatchResult {
            matched: true,
            distance: d,
            confidence: confidence_from_distance(d),
            entry_id: Some(entry.id.clone()),
            name: Some(entry.name.clone()),
        },
        Some((_, d)) => MatchResult::no_match(d),
        None => MatchResult {
            matched: false,
            distance: 0.0,
            confidence: 0.0,
            entry_id: None,
            name: None,
        },
    }
}

/// A detected face after matching: where it is and who it is, if anyone.
#[derive(Debug, Clone)]
pub struct RecognizedFace {
    pub bbox: BoundingBox,
    pub result: MatchResult,
}

impl RecognizedFace {
    /// Name of the matched person, `None` for an unknown face.
    pub fn name(&self) -> Option<&str> {
        if self.result.matched {
            self.result.name.as_deref()
        } else {
            None
        }
    }
}
