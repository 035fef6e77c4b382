use anyhow::{bail, Context, Result};
use facedash_core::gallery::GalleryError;
use facedash_core::{FaceDetector, FaceRecognizer, Gallery, PresenceFile, PresenceTracker, Transition};
use facedash_hw::Camera;
use std::io::IsTerminal;
use std::sync::{Arc, Mutex};

mod config;
mod dbus_interface;
mod engine;
mod launcher;
mod logging;

use dbus_interface::{PresenceService, PresenceSnapshot, SharedPresence, BUS_NAME, OBJECT_PATH};
use engine::{EngineParts, FrameReport};
use launcher::{DashboardLauncher, LaunchOutcome};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::Config::load()?;
    let console = logging::console_level(
        !config.dashboard_command.is_empty(),
        std::io::stderr().is_terminal(),
    );
    let _log_guard = logging::init(config.log_file.as_deref(), console);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "facedashd starting");
    let settings = &config.settings;

    let gallery_path = settings.gallery_path();
    let gallery = match Gallery::load(&gallery_path) {
        Ok(g) if g.is_empty() => bail!(
            "gallery {} has no faces; run `facedash capture` and `facedash encode` first",
            gallery_path.display()
        ),
        Ok(g) => g,
        Err(GalleryError::NotFound(_)) => bail!(
            "gallery {} not found; run `facedash encode` first",
            gallery_path.display()
        ),
        Err(e) => return Err(e).context("loading gallery"),
    };

    let presence_file = PresenceFile::open(settings.presence_path())?;
    presence_file.update(facedash_core::UNKNOWN_USER)?;

    let scrfd_path = settings.scrfd_model_path();
    let detector = FaceDetector::load(&scrfd_path)
        .context("loading face detector")?
        .with_confidence_threshold(settings.detection_confidence);
    tracing::info!(path = %scrfd_path, "SCRFD detector loaded");

    let arcface_path = settings.arcface_model_path();
    let recognizer = FaceRecognizer::load(&arcface_path).context("loading face recognizer")?;
    tracing::info!(path = %arcface_path, "ArcFace recognizer loaded");

    let camera = Camera::open(&config.camera_device, config.camera_width, config.camera_height)
        .with_context(|| format!("opening camera {}", config.camera_device))?;

    let (engine, mut reports) = engine::spawn_engine(EngineParts {
        camera,
        detector,
        recognizer,
        gallery,
        match_distance: settings.match_distance,
        warmup_frames: config.warmup_frames,
        fps_update_interval: config.fps_update_interval,
    })?;

    let presence: SharedPresence = Arc::new(Mutex::new(PresenceSnapshot::default()));
    let connection = if config.dbus_enabled {
        let service = PresenceService {
            presence: presence.clone(),
            engine: engine.clone(),
            gallery_path: gallery_path.clone(),
            camera_device: config.camera_device.clone(),
        };
        match serve_dbus(service).await {
            Ok(conn) => {
                tracing::info!(name = BUS_NAME, path = OBJECT_PATH, "D-Bus service registered");
                Some(conn)
            }
            Err(e) => {
                tracing::warn!(error = %e, "D-Bus unavailable; continuing without it");
                None
            }
        }
    } else {
        None
    };

    let mut tracker = PresenceTracker::new();
    let mut launcher = DashboardLauncher::new(config.dashboard_command.clone())
        .with_stderr_log(settings.data_dir.join("dashboard.log"));

    tracing::info!("recognition session started");
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            report = reports.recv() => {
                let Some(report) = report else {
                    bail!("recognition engine stopped");
                };
                let Some(transition) = on_report(&mut tracker, &report) else {
                    continue;
                };
                if let Ok(mut p) = presence.lock() {
                    p.user = transition.current.clone();
                    p.confidence = transition.confidence;
                }
                if let Err(e) = presence_file.update(&transition.current) {
                    tracing::error!(error = %e, "failed to write presence file");
                }
                if let Some(conn) = &connection {
                    if let Err(e) = emit_user_changed(conn, &transition).await {
                        tracing::warn!(error = %e, "failed to emit UserChanged");
                    }
                }
                match launcher.ensure_running() {
                    Ok(LaunchOutcome::Disabled) => {}
                    Ok(outcome) => tracing::debug!(?outcome, "dashboard checked"),
                    Err(e) => tracing::error!(error = %e, "failed to launch dashboard"),
                }
            }
            _ = &mut shutdown => {
                tracing::info!("facedashd shutting down");
                break;
            }
        }
    }

    tracing::info!("recognition session ended");
    Ok(())
}

/// Feed one frame's faces to the tracker and log any change of user.
fn on_report(tracker: &mut PresenceTracker, report: &FrameReport) -> Option<Transition> {
    let unknown = report.faces.iter().filter(|f| !f.result.matched).count();
    if unknown > 0 {
        tracing::debug!(sequence = report.sequence, unknown, "unrecognized faces");
    }
    let transition = tracker.observe(&report.faces)?;
    tracing::info!(
        user = %transition.current,
        previous = %transition.previous,
        confidence = %format!("{:.2}", transition.confidence),
        "detected {} with confidence {:.2}",
        transition.current,
        transition.confidence
    );
    Some(transition)
}

async fn serve_dbus(service: PresenceService) -> zbus::Result<zbus::Connection> {
    zbus::connection::Builder::session()?
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
}

async fn emit_user_changed(conn: &zbus::Connection, transition: &Transition) -> zbus::Result<()> {
    let iface = conn
        .object_server()
        .interface::<_, PresenceService>(OBJECT_PATH)
        .await?;
    PresenceService::user_changed(
        iface.signal_emitter(),
        &transition.current,
        f64::from(transition.confidence),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use facedash_core::{BoundingBox, MatchResult, RecognizedFace};

    fn face(name: Option<&str>) -> RecognizedFace {
        RecognizedFace {
            bbox: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 20.0,
                height: 20.0,
                confidence: 0.9,
                landmarks: None,
            },
            result: MatchResult {
                matched: name.is_some(),
                distance: 0.3,
                confidence: 0.7,
                entry_id: None,
                name: name.map(str::to_string),
            },
        }
    }

    #[test]
    fn test_on_report_only_reports_changes() {
        let mut tracker = PresenceTracker::new();
        let report = |faces| FrameReport { sequence: 1, faces };

        let t = on_report(&mut tracker, &report(vec![face(None), face(Some("alice"))])).unwrap();
        assert_eq!(t.previous, "unknown");
        assert_eq!(t.current, "alice");

        assert!(on_report(&mut tracker, &report(vec![face(Some("alice"))])).is_none());
        assert!(on_report(&mut tracker, &report(vec![face(None)])).is_none());

        let t = on_report(&mut tracker, &report(vec![face(Some("bob"))])).unwrap();
        assert_eq!(t.previous, "alice");
    }
}
