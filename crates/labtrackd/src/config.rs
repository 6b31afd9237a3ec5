use std::path::PathBuf;

/// Which embedding pipeline the daemon runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorKind {
    /// ONNX encoder embeddings, Euclidean distance.
    Encoder,
    /// Landmark-geometry random projection, cosine distance.
    Landmarks,
}

/// Whether this daemon instance admits students or releases stations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Entry,
    Exit,
}

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Path to the cached hardware capability snapshot.
    pub capability_cache: PathBuf,
    pub extractor: ExtractorKind,
    /// Match tolerance override; `None` keeps the extractor's default.
    pub tolerance: Option<f32>,
    pub mode: Mode,
    /// Grade whose roster this session serves; `None` = first active grade.
    pub grade: Option<String>,
    /// Cedula of the staff member running the session.
    pub operator_cedula: String,
    pub operator_name: String,
    /// Session loop tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Run a recognition pass every Nth tick.
    pub recognition_stride: u64,
    /// Frames to discard at startup (camera AGC/AE stabilization).
    pub warmup_frames: usize,
}

impl Config {
    /// Load configuration from `LABTRACK_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("labtrack");

        let model_dir = std::env::var("LABTRACK_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/usr/share/labtrack/models"));

        let db_path = std::env::var("LABTRACK_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("labtrack.db"));

        let capability_cache = std::env::var("LABTRACK_CAPABILITY_CACHE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("capability.json"));

        let extractor = match std::env::var("LABTRACK_EXTRACTOR").as_deref() {
            Ok("landmarks") => ExtractorKind::Landmarks,
            _ => ExtractorKind::Encoder,
        };

        let mode = match std::env::var("LABTRACK_MODE").as_deref() {
            Ok("exit") => Mode::Exit,
            _ => Mode::Entry,
        };

        Self {
            camera_device: std::env::var("LABTRACK_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            db_path,
            capability_cache,
            extractor,
            tolerance: std::env::var("LABTRACK_TOLERANCE")
                .ok()
                .and_then(|v| v.parse().ok()),
            mode,
            grade: std::env::var("LABTRACK_GRADE").ok(),
            operator_cedula: std::env::var("LABTRACK_OPERATOR_CEDULA")
                .unwrap_or_else(|_| "0000000000".to_string()),
            operator_name: std::env::var("LABTRACK_OPERATOR_NAME")
                .unwrap_or_else(|_| "operator".to_string()),
            tick_interval_ms: env_u64("LABTRACK_TICK_INTERVAL_MS", 30),
            recognition_stride: env_u64("LABTRACK_RECOGNITION_STRIDE", 5),
            warmup_frames: env_usize("LABTRACK_WARMUP_FRAMES", 4),
        }
    }

    /// Path to the face detection model.
    pub fn detector_model_path(&self) -> String {
        self.model_dir
            .join("det_10g.onnx")
            .to_string_lossy()
            .into_owned()
    }

    /// Path to the 128-d face encoder model.
    pub fn encoder_model_path(&self) -> String {
        self.model_dir
            .join("mbf_128.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
