use anyhow::{Context, Result};
use facedash_core::Settings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Daemon configuration: optional TOML file, then `FACEDASH_*` overrides.
#[derive(Debug, Clone)]
pub struct Config {
    pub settings: Settings,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    pub camera_width: u32,
    pub camera_height: u32,
    /// Frames to discard after opening the camera (exposure settling).
    pub warmup_frames: usize,
    /// Log frames-per-second every this many frames.
    pub fps_update_interval: u64,
    /// Append-only recognition log; `None` disables file logging.
    pub log_file: Option<PathBuf>,
    /// Command started when someone is recognized; empty disables launching.
    pub dashboard_command: Vec<String>,
    /// Register the D-Bus presence service on the session bus.
    pub dbus_enabled: bool,
}

/// Keys accepted in `facedashd.toml`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub model_dir: Option<PathBuf>,
    pub match_distance: Option<f32>,
    pub detection_confidence: Option<f32>,
    pub camera_device: Option<String>,
    pub camera_width: Option<u32>,
    pub camera_height: Option<u32>,
    pub warmup_frames: Option<usize>,
    pub fps_update_interval: Option<u64>,
    pub log_file: Option<String>,
    pub dashboard_command: Option<Vec<String>>,
    pub dbus_enabled: Option<bool>,
}

impl FileConfig {
    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }
}

impl Config {
    /// Load from `$FACEDASH_CONFIG` (or `<data_dir>/facedashd.toml` when present)
    /// and the process environment.
    pub fn load() -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let settings = Settings::from_env();

        let file = match env("FACEDASH_CONFIG") {
            Some(path) => FileConfig::read(Path::new(&path))?,
            None => {
                let default_path = settings.data_dir.join("facedashd.toml");
                if default_path.exists() {
                    FileConfig::read(&default_path)?
                } else {
                    FileConfig::default()
                }
            }
        };

        Ok(Self::resolve(file, settings, env, default_dashboard_command()))
    }

    /// Layer `file` under the environment lookups in `env`.
    pub fn resolve(
        file: FileConfig,
        mut settings: Settings,
        env: impl Fn(&str) -> Option<String>,
        default_dashboard: Vec<String>,
    ) -> Self {
        // Settings::from_env already applied env values; the file only fills
        // in what the environment left unset.
        if env("FACEDASH_DATA_DIR").is_none() {
            if let Some(dir) = file.data_dir {
                if env("FACEDASH_MODEL_DIR").is_none() && file.model_dir.is_none() {
                    settings.model_dir = dir.join("models");
                }
                settings.data_dir = dir;
            }
        }
        if env("FACEDASH_MODEL_DIR").is_none() {
            if let Some(dir) = file.model_dir {
                settings.model_dir = dir;
            }
        }
        if parsed::<f32>(&env, "FACEDASH_MATCH_DISTANCE").is_none() {
            if let Some(d) = file.match_distance {
                settings.match_distance = d;
            }
        }
        if parsed::<f32>(&env, "FACEDASH_DETECTION_CONFIDENCE").is_none() {
            if let Some(c) = file.detection_confidence {
                settings.detection_confidence = c;
            }
        }

        let log_file = match env("FACEDASH_LOG_FILE").or(file.log_file) {
            Some(p) if p.is_empty() || p == "none" => None,
            Some(p) => Some(PathBuf::from(p)),
            None => Some(settings.data_dir.join("face_recognition_log.txt")),
        };

        let dashboard_command = match env("FACEDASH_DASHBOARD_CMD") {
            Some(cmd) => cmd.split_whitespace().map(str::to_string).collect(),
            None => file.dashboard_command.unwrap_or(default_dashboard),
        };

        Self {
            camera_device: env("FACEDASH_CAMERA_DEVICE")
                .or(file.camera_device)
                .unwrap_or_else(|| "/dev/video0".to_string()),
            camera_width: parsed(&env, "FACEDASH_CAMERA_WIDTH")
                .or(file.camera_width)
                .unwrap_or(640),
            camera_height: parsed(&env, "FACEDASH_CAMERA_HEIGHT")
                .or(file.camera_height)
                .unwrap_or(480),
            warmup_frames: parsed(&env, "FACEDASH_WARMUP_FRAMES")
                .or(file.warmup_frames)
                .unwrap_or(10),
            fps_update_interval: parsed(&env, "FACEDASH_FPS_INTERVAL")
                .or(file.fps_update_interval)
                .unwrap_or(10)
                .max(1),
            log_file,
            dashboard_command,
            dbus_enabled: env("FACEDASH_DBUS_ENABLED")
                .map(|v| v != "0")
                .or(file.dbus_enabled)
                .unwrap_or(true),
            settings,
        }
    }
}

fn parsed<T: FromStr>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    env(key).and_then(|v| v.trim().parse().ok())
}

/// `facedash dashboard`, using the CLI installed next to this binary.
fn default_dashboard_command() -> Vec<String> {
    let cli = std::env::current_exe()
        .map(|exe| exe.with_file_name("facedash"))
        .unwrap_or_else(|_| PathBuf::from("facedash"));
    vec![cli.to_string_lossy().into_owned(), "dashboard".to_string()]
}
