use crate::acquisition::DEFAULT_MAX_IMAGE_BYTES;
use facematch_core::{DetectorBackend, DetectorError, DEFAULT_MATCH_THRESHOLD, DEFAULT_MAX_DIMENSION};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid FACEMATCH_BIND address {0:?}")]
    Bind(String),
    #[error("invalid FACEMATCH_DETECTOR: {0}")]
    Detector(#[from] DetectorError),
    #[error("invalid FACEMATCH_PREPROCESS {0:?} (expected memory or tempfile)")]
    Preprocess(String),
    #[error("FACEMATCH_MAX_DIMENSION must be > 0")]
    MaxDimension,
}

/// How downloaded images travel through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreprocessMode {
    /// Decode, downscale and crop in memory.
    #[default]
    Memory,
    /// Keep original bytes and crops as request-scoped temp files.
    TempFile,
}

impl FromStr for PreprocessMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "array" => Ok(PreprocessMode::Memory),
            "tempfile" | "file" => Ok(PreprocessMode::TempFile),
            other => Err(ConfigError::Preprocess(other.to_string())),
        }
    }
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 0.0.0.0:8000).
    pub bind: SocketAddr,
    /// Directory containing the detector and recognizer model files.
    pub model_dir: PathBuf,
    /// Face detector used to locate the face in each downloaded image.
    pub detector: DetectorBackend,
    pub preprocess: PreprocessMode,
    /// Cosine distance below which two faces match.
    pub match_threshold: f32,
    /// Longer-side bound applied to in-memory images.
    pub max_dimension: u32,
    pub fetch_timeout: Duration,
    /// Largest image body accepted from a URL.
    pub max_image_bytes: u64,
    /// Bound on each detection or verification call.
    pub inference_timeout: Duration,
    /// Parent directory for request-scoped scratch directories.
    pub temp_dir: PathBuf,
    /// Hide GPUs from the inference runtime.
    pub cpu_only: bool,
}

impl Config {
    /// Load configuration from `FACEMATCH_*` environment variables with defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_raw = lookup("FACEMATCH_BIND").unwrap_or_else(|| "0.0.0.0:8000".to_string());
        let bind = bind_raw.parse().map_err(|_| ConfigError::Bind(bind_raw.clone()))?;

        let detector = match lookup("FACEMATCH_DETECTOR") {
            Some(v) => v.parse()?,
            None => DetectorBackend::default(),
        };
        let preprocess = match lookup("FACEMATCH_PREPROCESS") {
            Some(v) => v.parse()?,
            None => PreprocessMode::default(),
        };

        let max_dimension = parsed(&lookup, "FACEMATCH_MAX_DIMENSION", DEFAULT_MAX_DIMENSION);
        if max_dimension == 0 {
            return Err(ConfigError::MaxDimension);
        }

        Ok(Self {
            bind,
            model_dir: lookup("FACEMATCH_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(facematch_core::default_model_dir),
            detector,
            preprocess,
            match_threshold: parsed(&lookup, "FACEMATCH_MATCH_THRESHOLD", DEFAULT_MATCH_THRESHOLD),
            max_dimension,
            fetch_timeout: Duration::from_secs(parsed(&lookup, "FACEMATCH_FETCH_TIMEOUT_SECS", 10)),
            max_image_bytes: parsed(&lookup, "FACEMATCH_MAX_IMAGE_BYTES", DEFAULT_MAX_IMAGE_BYTES),
            inference_timeout: Duration::from_secs(parsed(
                &lookup,
                "FACEMATCH_INFERENCE_TIMEOUT_SECS",
                30,
            )),
            temp_dir: lookup("FACEMATCH_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            cpu_only: lookup("FACEMATCH_CPU_ONLY").map(|v| v != "0").unwrap_or(true),
        })
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
