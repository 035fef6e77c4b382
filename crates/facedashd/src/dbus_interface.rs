use crate::engine::EngineHandle;
use facedash_core::{Gallery, UNKNOWN_USER};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use zbus::interface;
use zbus::object_server::SignalEmitter;

pub const BUS_NAME: &str = "org.facedash.Presence1";
pub const OBJECT_PATH: &str = "/org/facedash/Presence1";

/// Last presence transition, shared between the main loop and D-Bus calls.
#[derive(Debug, Clone)]
pub struct PresenceSnapshot {
    pub user: String,
    pub confidence: f32,
}

impl Default for PresenceSnapshot {
    fn default() -> Self {
        Self {
            user: UNKNOWN_USER.to_string(),
            confidence: 0.0,
        }
    }
}

pub type SharedPresence = Arc<Mutex<PresenceSnapshot>>;

/// D-Bus interface for the facedash presence daemon.
///
/// Bus name: org.facedash.Presence1
/// Object path: /org/facedash/Presence1
pub struct PresenceService {
    pub presence: SharedPresence,
    pub engine: EngineHandle,
    pub gallery_path: PathBuf,
    pub camera_device: String,
}

#[interface(name = "org.facedash.Presence1")]
impl PresenceService {
    /// Name of the most recently recognized person, or "unknown".
    async fn current_user(&self) -> String {
        self.presence
            .lock()
            .map(|p| p.user.clone())
            .unwrap_or_else(|_| UNKNOWN_USER.to_string())
    }

    /// Return daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let presence = self
            .presence
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default();
        let stats = self.engine.stats();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "camera": self.camera_device,
            "current_user": presence.user,
            "confidence": presence.confidence,
            "gallery_entries": stats.gallery_entries,
            "frames": stats.frames,
            "dark_frames": stats.dark_frames,
            "faces": stats.faces,
            "fps": stats.fps,
        })
        .to_string())
    }

    /// Re-read the gallery file and hand it to the engine. Returns the entry count.
    async fn reload_gallery(&self) -> zbus::fdo::Result<u32> {
        tracing::info!(path = %self.gallery_path.display(), "reload_gallery requested");
        let gallery = Gallery::load(&self.gallery_path)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        let entries = gallery.len();
        self.engine
            .replace_gallery(gallery)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        Ok(u32::try_from(entries).unwrap_or(u32::MAX))
    }

    /// Emitted when a different person is recognized.
    #[zbus(signal)]
    pub async fn user_changed(
        emitter: &SignalEmitter<'_>,
        name: &str,
        confidence: f64,
    ) -> zbus::Result<()>;
}
