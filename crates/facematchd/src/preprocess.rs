//! Turning a URL into a cropped face, in memory or through temp files.

use crate::acquisition::{decode_image, sniff_format, ImageFetcher};
use crate::config::{Config, PreprocessMode};
use crate::engine::{EngineError, EngineHandle, FaceImage};
use crate::error::PipelineError;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Per-request scratch space. Dropping it removes every file created for the request.
pub struct Scratch {
    dir: Option<TempDir>,
}

impl Scratch {
    /// Scratch space that refuses file allocation.
    pub fn none() -> Self {
        Self { dir: None }
    }

    /// A fresh directory under `root`.
    pub fn in_dir(root: &Path) -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("facematch-").tempdir_in(root)?;
        Ok(Self { dir: Some(dir) })
    }

    /// Path for a file named `name` inside the scratch directory.
    pub fn path(&self, name: &str) -> Result<PathBuf, PipelineError> {
        self.dir
            .as_ref()
            .map(|d| d.path().join(name))
            .ok_or_else(|| PipelineError::Internal("no scratch directory for file-based preprocessing".into()))
    }
}

/// Fetches an image and extracts its face.
///
/// `label` distinguishes the two images of one request inside its scratch space.
#[allow(async_fn_in_trait)]
pub trait ImagePreprocessor {
    async fn prepare(&self, label: &str, url: &str, scratch: &Scratch) -> Result<FaceImage, PipelineError>;
}

/// Decode, downscale and crop entirely in memory.
pub struct InMemoryPreprocessor {
    fetcher: ImageFetcher,
    engine: EngineHandle,
    max_dimension: u32,
}

impl InMemoryPreprocessor {
    pub fn new(fetcher: ImageFetcher, engine: EngineHandle, max_dimension: u32) -> Self {
        Self { fetcher, engine, max_dimension }
    }
}

impl ImagePreprocessor for InMemoryPreprocessor {
    async fn prepare(&self, label: &str, url: &str, _scratch: &Scratch) -> Result<FaceImage, PipelineError> {
        let bytes = self
            .fetcher
            .fetch_bytes(url)
            .await
            .map_err(|e| PipelineError::acquisition(url, e))?;

        let max_dimension = self.max_dimension;
        let image = tokio::task::spawn_blocking(move || decode_image(&bytes, max_dimension))
            .await
            .map_err(|e| PipelineError::Internal(format!("decode task failed: {e}")))?
            .map_err(|e| PipelineError::acquisition(url, e))?;

        let crop = self.engine.extract(image).await.map_err(engine_error)?;
        tracing::debug!(label, confidence = crop.confidence, region = ?crop.region, "face extracted");
        Ok(FaceImage::Pixels(crop.image))
    }
}

/// Keep the original bytes on disk, detect from the file, and store the crop beside it.
pub struct TempFilePreprocessor {
    fetcher: ImageFetcher,
    engine: EngineHandle,
}

impl TempFilePreprocessor {
    pub fn new(fetcher: ImageFetcher, engine: EngineHandle) -> Self {
        Self { fetcher, engine }
    }
}

impl ImagePreprocessor for TempFilePreprocessor {
    async fn prepare(&self, label: &str, url: &str, scratch: &Scratch) -> Result<FaceImage, PipelineError> {
        let bytes = self
            .fetcher
            .fetch_bytes(url)
            .await
            .map_err(|e| PipelineError::acquisition(url, e))?;
        let format = sniff_format(&bytes).map_err(|e| PipelineError::acquisition(url, e))?;

        let source = scratch.path(&format!("{label}-source.{}", format.extensions_str().first().unwrap_or(&"img")))?;
        tokio::fs::write(&source, &bytes)
            .await
            .map_err(|e| PipelineError::Internal(format!("writing {}: {e}", source.display())))?;

        let crop = match self.engine.extract_file(source).await {
            Ok(crop) => crop,
            Err(EngineError::ReadImage { source, .. }) => {
                return Err(PipelineError::acquisition(url, source.into()));
            }
            Err(e) => return Err(engine_error(e)),
        };

        let path = scratch.path(&format!("{label}-face.png"))?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || crop.image.save_with_format(&target, ImageFormat::Png))
            .await
            .map_err(|e| PipelineError::Internal(format!("crop write task failed: {e}")))?
            .map_err(|e| PipelineError::Internal(format!("writing {}: {e}", path.display())))?;
        tracing::debug!(label, path = %path.display(), "face extracted");
        Ok(FaceImage::File(path))
    }
}

/// The preprocessing strategy selected by configuration.
pub enum Preprocessor {
    InMemory(InMemoryPreprocessor),
    TempFile(TempFilePreprocessor),
}

impl Preprocessor {
    pub fn from_config(config: &Config, fetcher: ImageFetcher, engine: EngineHandle) -> Self {
        match config.preprocess {
            PreprocessMode::Memory => {
                Preprocessor::InMemory(InMemoryPreprocessor::new(fetcher, engine, config.max_dimension))
            }
            PreprocessMode::TempFile => Preprocessor::TempFile(TempFilePreprocessor::new(fetcher, engine)),
        }
    }

    /// Scratch space for one request: a temp directory under `root` in file mode, nothing otherwise.
    pub fn scratch(&self, root: &Path) -> Result<Scratch, PipelineError> {
        match self {
            Preprocessor::InMemory(_) => Ok(Scratch::none()),
            Preprocessor::TempFile(_) => Scratch::in_dir(root)
                .map_err(|e| PipelineError::Internal(format!("creating scratch dir in {}: {e}", root.display()))),
        }
    }
}

impl ImagePreprocessor for Preprocessor {
    async fn prepare(&self, label: &str, url: &str, scratch: &Scratch) -> Result<FaceImage, PipelineError> {
        match self {
            Preprocessor::InMemory(p) => p.prepare(label, url, scratch).await,
            Preprocessor::TempFile(p) => p.prepare(label, url, scratch).await,
        }
    }
}

/// Map engine failures onto the client-facing taxonomy.
pub fn engine_error(err: EngineError) -> PipelineError {
    match err {
        EngineError::Extraction(e) => PipelineError::Detection(e),
        EngineError::Detector(e) => PipelineError::Detection(e.into()),
        EngineError::Verifier(e) => PipelineError::Verification(e),
        EngineError::Timeout(stage) => PipelineError::Timeout(stage),
        other => PipelineError::Internal(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::ExtractionError;

    #[test]
    fn scratch_dir_is_removed_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let scratch = Scratch::in_dir(root.path()).unwrap();
        let file = scratch.path("id-source.jpg").unwrap();
        std::fs::write(&file, b"bytes").unwrap();
        assert!(file.exists());

        drop(scratch);
        assert!(!file.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[test]
    fn scratch_none_refuses_paths() {
        assert!(matches!(Scratch::none().path("x"), Err(PipelineError::Internal(_))));
    }

    #[test]
    fn engine_errors_map_to_kinds() {
        assert_eq!(engine_error(EngineError::Extraction(ExtractionError::NoFace)).kind(), "detection_failed");
        assert_eq!(engine_error(EngineError::Timeout("detection")).kind(), "inference_timeout");
        assert_eq!(engine_error(EngineError::ChannelClosed).kind(), "internal_error");
        assert_eq!(engine_error(EngineError::MixedRepresentations).kind(), "internal_error");
    }
}
