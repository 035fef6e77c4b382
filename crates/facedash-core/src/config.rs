use std::path::PathBuf;

/// Locations and matching thresholds shared by the daemon and the CLI.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Directory holding people.json, gallery.json, current_user.txt and dataset/.
    pub data_dir: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Euclidean distance below which a face matches a gallery entry.
    pub match_distance: f32,
    /// Minimum SCRFD score for a detection to be considered.
    pub detection_confidence: f32,
}

impl Settings {
    /// Load settings from `FACEDASH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("FACEDASH_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_dir());

        let model_dir = std::env::var("FACEDASH_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models"));

        Self {
            data_dir,
            model_dir,
            match_distance: env_parse("FACEDASH_MATCH_DISTANCE", 1.10),
            detection_confidence: env_parse("FACEDASH_DETECTION_CONFIDENCE", 0.5),
        }
    }

    pub fn people_path(&self) -> PathBuf {
        self.data_dir.join("people.json")
    }

    pub fn gallery_path(&self) -> PathBuf {
        self.data_dir.join("gallery.json")
    }

    pub fn presence_path(&self) -> PathBuf {
        self.data_dir.join("current_user.txt")
    }

    pub fn dataset_dir(&self) -> PathBuf {
        self.data_dir.join("dataset")
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> String {
        self.model_dir
            .join("w600k_r50.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

/// `$XDG_DATA_HOME/facedash`, falling back to `~/.local/share/facedash`.
pub fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
        .join("facedash")
}

pub fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

/// Parse an environment variable, falling back to `default` when unset or invalid.
pub fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
