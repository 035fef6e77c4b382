use anyhow::{bail, Context, Result};
use facedash_core::{Dataset, FaceDetector, FaceRecognizer, Gallery, Settings};
use facedash_hw::meminfo;
use image::{imageops::FilterType, DynamicImage, RgbImage};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::stop::StopFlag;

/// Images larger than this on either side are halved before detection.
const MAX_SIDE: u32 = 800;
const PROGRESS_EVERY: usize = 10;
const MEMORY_CHECK_EVERY: usize = 25;

#[derive(Debug)]
pub struct EncodeSummary {
    pub encodings: usize,
    pub people: usize,
    pub skipped: usize,
    pub gallery_path: PathBuf,
    pub elapsed: Duration,
}

/// Rebuild the gallery from every image in the dataset. Setting `stop`
/// abandons the run without touching the saved gallery.
pub fn run(settings: &Settings, stop: &StopFlag) -> Result<EncodeSummary> {
    let started = Instant::now();
    meminfo::warn_if_low(meminfo::LOW_MEMORY_MB);

    let dataset = Dataset::new(settings.dataset_dir());
    let counts = dataset.count()?;
    if counts.images == 0 {
        bail!(
            "no images under {}; run `facedash capture` first",
            dataset.root().display()
        );
    }
    tracing::info!(people = counts.people, images = counts.images, "encoding dataset");
    if stop.is_set() {
        bail!("encoding interrupted before it started");
    }

    let mut detector = FaceDetector::load(&settings.scrfd_model_path())
        .context("loading face detector")?
        .with_confidence_threshold(settings.detection_confidence);
    let mut recognizer =
        FaceRecognizer::load(&settings.arcface_model_path()).context("loading face recognizer")?;

    let mut gallery = Gallery::new();
    let mut processed = 0usize;
    let mut skipped = 0usize;

    for person in dataset.people()? {
        for path in dataset.images(&person)? {
            if stop.is_set() {
                bail!("encoding interrupted after {processed} of {} images; gallery left unchanged", counts.images);
            }
            processed += 1;
            if processed % PROGRESS_EVERY == 0 {
                tracing::info!(processed, total = counts.images, "encoding progress");
            }
            if processed % MEMORY_CHECK_EVERY == 0 {
                meminfo::warn_if_low(meminfo::CRITICAL_MEMORY_MB);
            }

            let image = match image::open(&path) {
                Ok(img) => downscale(img),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "unreadable image, skipping");
                    skipped += 1;
                    continue;
                }
            };

            let faces = match detector.detect(&image) {
                Ok(faces) if !faces.is_empty() => faces,
                Ok(_) => {
                    tracing::debug!(path = %path.display(), "no face found");
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "detection failed, skipping");
                    skipped += 1;
                    continue;
                }
            };

            let source = source_name(dataset.root(), &path);
            for face in &faces {
                match recognizer.extract(&image, face) {
                    Ok(embedding) => gallery.push(&person, embedding, Some(source.clone())),
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "embedding failed")
                    }
                }
            }
        }
    }

    let fallback = facedash_core::config::home_dir().join("gallery.json");
    let gallery_path = save_with_fallback(&gallery, &settings.gallery_path(), &fallback)?;

    Ok(EncodeSummary {
        encodings: gallery.len(),
        people: gallery.names().len(),
        skipped,
        gallery_path,
        elapsed: started.elapsed(),
    })
}

/// Halve images larger than [`MAX_SIDE`] on either side.
pub fn downscale(image: DynamicImage) -> RgbImage {
    if image.width() > MAX_SIDE || image.height() > MAX_SIDE {
        image
            .resize_exact(image.width() / 2, image.height() / 2, FilterType::Triangle)
            .to_rgb8()
    } else {
        image.to_rgb8()
    }
}

/// Save to `primary`; if that fails, save to `fallback`. Returns where it landed.
pub fn save_with_fallback(gallery: &Gallery, primary: &Path, fallback: &Path) -> Result<PathBuf> {
    match gallery.save(primary) {
        Ok(()) => Ok(primary.to_path_buf()),
        Err(e) => {
            tracing::warn!(
                path = %primary.display(),
                fallback = %fallback.display(),
                error = %e,
                "cannot write gallery, using fallback location"
            );
            gallery
                .save(fallback)
                .with_context(|| format!("writing gallery to {}", fallback.display()))?;
            Ok(fallback.to_path_buf())
        }
    }
}

fn source_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use facedash_core::Embedding;

    #[test]
    fn test_downscale_large_images_only() {
        let big = DynamicImage::new_rgb8(1280, 720);
        let out = downscale(big);
        assert_eq!(out.dimensions(), (640, 360));

        let tall = DynamicImage::new_rgb8(600, 900);
        assert_eq!(downscale(tall).dimensions(), (300, 450));

        let small = DynamicImage::new_rgb8(800, 600);
        assert_eq!(downscale(small).dimensions(), (800, 600));
    }

    #[test]
    fn test_save_with_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let mut gallery = Gallery::new();
        gallery.push("ada", Embedding::new(vec![1.0, 0.0]), None);

        let primary = dir.path().join("gallery.json");
        let fallback = dir.path().join("home").join("gallery.json");
        assert_eq!(save_with_fallback(&gallery, &primary, &fallback).unwrap(), primary);

        // a regular file where the parent directory should be
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, b"").unwrap();
        let unwritable = blocker.join("gallery.json");
        assert_eq!(
            save_with_fallback(&gallery, &unwritable, &fallback).unwrap(),
            fallback
        );
        assert_eq!(Gallery::load(&fallback).unwrap().len(), 1);
    }

    #[test]
    fn test_stop_abandons_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            data_dir: dir.path().to_path_buf(),
            model_dir: dir.path().join("models"),
            match_distance: 1.1,
            detection_confidence: 0.5,
        };
        let dataset = Dataset::new(settings.dataset_dir());
        DynamicImage::new_rgb8(8, 8)
            .save(dataset.image_path("ada", 0).unwrap())
            .unwrap();

        let stop = StopFlag::new();
        stop.trigger();
        let err = run(&settings, &stop).unwrap_err();
        assert!(err.to_string().contains("interrupted"), "{err}");
        assert!(!settings.gallery_path().exists());
    }

    #[test]
    fn test_source_name_is_relative() {
        let root = Path::new("/data/dataset");
        assert_eq!(
            source_name(root, Path::new("/data/dataset/ada/image_3.jpg")),
            "ada/image_3.jpg"
        );
    }
}
