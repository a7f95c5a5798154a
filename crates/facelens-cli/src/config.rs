use std::path::PathBuf;

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Detection model file name inside `model_dir`.
    pub detector_model: String,
    /// Recognition model file name inside `model_dir`.
    pub recognizer_model: String,
    /// Font for box labels; the bundled font when unset.
    pub font_path: Option<PathBuf>,
    /// Cosine similarity at or above which two faces are labeled a match.
    pub match_threshold: f32,
    /// Directory for transient files; the system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from `FACELENS_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            model_dir: var("FACELENS_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(facelens_core::default_model_dir),
            detector_model: var("FACELENS_DETECTOR_MODEL")
                .unwrap_or_else(|| facelens_core::DETECTOR_MODEL_FILE.to_string()),
            recognizer_model: var("FACELENS_RECOGNIZER_MODEL")
                .unwrap_or_else(|| facelens_core::RECOGNIZER_MODEL_FILE.to_string()),
            font_path: var("FACELENS_FONT_PATH").map(PathBuf::from),
            match_threshold: var("FACELENS_MATCH_THRESHOLD")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.40),
            scratch_dir: var("FACELENS_SCRATCH_DIR").map(PathBuf::from),
        }
    }

    /// Path to the detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.detector_model)
    }

    /// Path to the recognition model.
    pub fn recognizer_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.recognizer_model)
    }
}
