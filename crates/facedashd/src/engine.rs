use facedash_core::{
    EuclideanMatcher, FaceDetector, FaceRecognizer, Gallery, Matcher, RecognizedFace,
};
use facedash_hw::Camera;
use image::RgbImage;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;

/// Consecutive capture failures tolerated before the engine gives up.
const MAX_CAPTURE_FAILURES: u32 = 10;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] facedash_hw::CameraError),
    #[error("detector error: {0}")]
    Detector(#[from] facedash_core::detector::DetectorError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
}

/// Faces recognized in one frame. Only frames with at least one face are sent.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub sequence: u32,
    pub faces: Vec<RecognizedFace>,
}

/// Counters shared with the D-Bus status method.
#[derive(Debug, Clone, Default)]
pub struct EngineStats {
    pub frames: u64,
    pub dark_frames: u64,
    pub faces: u64,
    pub fps: f64,
    pub gallery_entries: usize,
}

pub type SharedStats = Arc<Mutex<EngineStats>>;

/// Messages sent from the async side to the engine thread.
enum EngineCommand {
    ReplaceGallery(Gallery),
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
    stats: SharedStats,
}

impl EngineHandle {
    /// Swap in a freshly loaded gallery; takes effect on the next frame.
    pub async fn replace_gallery(&self, gallery: Gallery) -> Result<(), EngineError> {
        self.tx
            .send(EngineCommand::ReplaceGallery(gallery))
            .await
            .map_err(|_| EngineError::ChannelClosed)
    }

    pub fn stats(&self) -> EngineStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Everything the engine thread owns.
pub struct EngineParts {
    pub camera: Camera,
    pub detector: FaceDetector,
    pub recognizer: FaceRecognizer,
    pub gallery: Gallery,
    pub match_distance: f32,
    pub warmup_frames: usize,
    pub fps_update_interval: u64,
}

/// Spawn the recognition loop on a dedicated OS thread.
///
/// The loop runs until the report receiver is dropped or the camera fails
/// repeatedly. Dropping the receiver is how the daemon stops it.
pub fn spawn_engine(
    parts: EngineParts,
) -> Result<(EngineHandle, mpsc::Receiver<FrameReport>), EngineError> {
    let (cmd_tx, cmd_rx) = mpsc::channel::<EngineCommand>(4);
    let (report_tx, report_rx) = mpsc::channel::<FrameReport>(16);
    let stats = SharedStats::default();
    let thread_stats = stats.clone();

    std::thread::Builder::new()
        .name("facedash-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            if let Err(e) = run(parts, cmd_rx, report_tx, thread_stats) {
                tracing::error!(error = %e, "engine stopped");
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok((EngineHandle { tx: cmd_tx, stats }, report_rx))
}

fn run(
    parts: EngineParts,
    mut cmd_rx: mpsc::Receiver<EngineCommand>,
    report_tx: mpsc::Sender<FrameReport>,
    stats: SharedStats,
) -> Result<(), EngineError> {
    let EngineParts {
        camera,
        mut detector,
        mut recognizer,
        mut gallery,
        match_distance,
        warmup_frames,
        fps_update_interval,
    } = parts;

    let mut stream = camera.stream()?;
    if warmup_frames > 0 {
        tracing::info!(count = warmup_frames, "discarding warmup frames");
        stream.warm_up(warmup_frames);
    }

    set_gallery_size(&stats, gallery.len());
    let mut fps = FpsMeter::new(fps_update_interval);
    let mut failures = 0u32;

    loop {
        while let Ok(EngineCommand::ReplaceGallery(next)) = cmd_rx.try_recv() {
            tracing::info!(entries = next.len(), "gallery replaced");
            set_gallery_size(&stats, next.len());
            gallery = next;
        }

        let frame = match stream.next_frame() {
            Ok(frame) => {
                failures = 0;
                frame
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(error = %e, failures, "frame capture failed");
                if failures >= MAX_CAPTURE_FAILURES {
                    return Err(e.into());
                }
                continue;
            }
        };

        let rate = fps.tick(Instant::now());
        if let Some(rate) = rate {
            tracing::debug!(fps = %format!("{rate:.2}"), "recognition rate");
        }

        if frame.is_dark() {
            update_stats(&stats, rate, true, 0);
            continue;
        }

        let faces = recognize_frame(
            &frame.image,
            &mut detector,
            &mut recognizer,
            &EuclideanMatcher,
            &gallery,
            match_distance,
        )?;
        update_stats(&stats, rate, false, faces.len());

        if faces.is_empty() {
            continue;
        }
        let report = FrameReport {
            sequence: frame.sequence,
            faces,
        };
        if report_tx.blocking_send(report).is_err() {
            tracing::debug!("report receiver dropped");
            return Ok(());
        }
    }
}

/// Detect every face in `image` and match each against `gallery`.
///
/// A face whose embedding cannot be extracted is logged and skipped.
pub fn recognize_frame(
    image: &RgbImage,
    detector: &mut FaceDetector,
    recognizer: &mut FaceRecognizer,
    matcher: &dyn Matcher,
    gallery: &Gallery,
    match_distance: f32,
) -> Result<Vec<RecognizedFace>, EngineError> {
    let detections = detector.detect(image)?;
    let probes = detections.into_iter().filter_map(|bbox| {
        match recognizer.extract(image, &bbox) {
            Ok(embedding) => Some((bbox, embedding)),
            Err(e) => {
                tracing::debug!(error = %e, "skipping face");
                None
            }
        }
    });
    Ok(match_faces(probes, matcher, gallery, match_distance))
}

/// Match already-extracted embeddings against the gallery.
pub fn match_faces(
    probes: impl IntoIterator<Item = (facedash_core::BoundingBox, facedash_core::Embedding)>,
    matcher: &dyn Matcher,
    gallery: &Gallery,
    match_distance: f32,
) -> Vec<RecognizedFace> {
    probes
        .into_iter()
        .map(|(bbox, embedding)| RecognizedFace {
            result: matcher.compare(&embedding, gallery.entries(), match_distance),
            bbox,
        })
        .collect()
}

fn set_gallery_size(stats: &SharedStats, entries: usize) {
    if let Ok(mut s) = stats.lock() {
        s.gallery_entries = entries;
    }
}

fn update_stats(stats: &SharedStats, rate: Option<f64>, dark: bool, faces: usize) {
    if let Ok(mut s) = stats.lock() {
        s.frames += 1;
        if dark {
            s.dark_frames += 1;
        }
        s.faces += faces as u64;
        if let Some(rate) = rate {
            s.fps = rate;
        }
    }
}

/// Average frames per second since the meter started, reported every
/// `interval` frames.
#[derive(Debug)]
pub struct FpsMeter {
    start: Option<Instant>,
    frames: u64,
    interval: u64,
}

impl FpsMeter {
    pub fn new(interval: u64) -> Self {
        Self {
            start: None,
            frames: 0,
            interval: interval.max(1),
        }
    }

    pub fn tick(&mut self, now: Instant) -> Option<f64> {
        let start = *self.start.get_or_insert(now);
        self.frames += 1;
        if self.frames % self.interval != 0 {
            return None;
        }
        let elapsed = now.duration_since(start).as_secs_f64();
        (elapsed > 0.0).then(|| self.frames as f64 / elapsed)
    }
}
