use crate::config::Config;
use facematch_core::{
    extract_face, load_detector, verify_faces, ArcFaceVerifier, DetectorError, ExtractionError,
    FaceCrop, FaceDetector, FaceVerifier, Verdict, VerifierError,
};
use image::{DynamicImage, RgbImage};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),
    #[error("verifier error: {0}")]
    Verifier(#[from] VerifierError),
    #[error("failed to read image {path}: {source}")]
    ReadImage {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot compare an in-memory face with a file-backed face")]
    MixedRepresentations,
    #[error("{0} exceeded the inference timeout")]
    Timeout(&'static str),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// A cropped face, in the representation chosen by the preprocessing mode.
#[derive(Debug, Clone)]
pub enum FaceImage {
    Pixels(RgbImage),
    File(PathBuf),
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    ExtractImage {
        image: DynamicImage,
        reply: oneshot::Sender<Result<FaceCrop, EngineError>>,
    },
    ExtractFile {
        input: PathBuf,
        reply: oneshot::Sender<Result<FaceCrop, EngineError>>,
    },
    Verify {
        a: FaceImage,
        b: FaceImage,
        reply: oneshot::Sender<Result<Verdict, EngineError>>,
    },
}

impl EngineRequest {
    /// The caller stopped waiting, typically after its timeout fired.
    fn abandoned(&self) -> bool {
        match self {
            EngineRequest::ExtractImage { reply, .. } => reply.is_closed(),
            EngineRequest::ExtractFile { reply, .. } => reply.is_closed(),
            EngineRequest::Verify { reply, .. } => reply.is_closed(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            EngineRequest::ExtractImage { .. } => "extract_image",
            EngineRequest::ExtractFile { .. } => "extract_file",
            EngineRequest::Verify { .. } => "verify",
        }
    }
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    timeout: Duration,
}

impl EngineHandle {
    /// Detect and crop the best face in a decoded image.
    pub async fn extract(&self, image: DynamicImage) -> Result<FaceCrop, EngineError> {
        self.call("detection", |reply| EngineRequest::ExtractImage { image, reply })
            .await
    }

    /// Detect and crop the best face in the image file at `input`.
    pub async fn extract_file(&self, input: PathBuf) -> Result<FaceCrop, EngineError> {
        self.call("detection", |reply| EngineRequest::ExtractFile { input, reply })
            .await
    }

    /// Compare two cropped faces of the same representation.
    pub async fn verify(&self, a: FaceImage, b: FaceImage) -> Result<Verdict, EngineError> {
        self.call("verification", |reply| EngineRequest::Verify { a, b, reply })
            .await
    }

    async fn call<T>(
        &self,
        stage: &'static str,
        request: impl FnOnce(oneshot::Sender<Result<T, EngineError>>) -> EngineRequest,
    ) -> Result<T, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        // Queueing counts against the budget too.
        let exchange = async move {
            self.tx
                .send(request(reply_tx))
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            match reply_rx.await {
                Ok(result) => result,
                Err(_) => Err(EngineError::ChannelClosed),
            }
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(stage)),
        }
    }
}

/// Load the configured detector and the ArcFace verifier. Fails fast on missing models.
pub fn load_models(
    config: &Config,
) -> Result<(Box<dyn FaceDetector>, Box<dyn FaceVerifier>), EngineError> {
    let detector = load_detector(config.detector, &config.model_dir)?;
    let verifier = ArcFaceVerifier::load(&config.model_dir)?;
    tracing::info!(dir = %config.model_dir.display(), "ArcFace verifier loaded");
    Ok((detector, Box::new(verifier)))
}

/// Spawn the engine on a dedicated OS thread.
///
/// The thread owns the models and serves requests one at a time; each
/// caller waits at most `timeout` for its reply.
pub fn spawn_engine(
    mut detector: Box<dyn FaceDetector>,
    mut verifier: Box<dyn FaceVerifier>,
    threshold: f32,
    timeout: Duration,
) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    std::thread::Builder::new()
        .name("facematch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                if req.abandoned() {
                    tracing::debug!(request = req.kind(), "skipping abandoned request");
                    continue;
                }
                match req {
                    EngineRequest::ExtractImage { image, reply } => {
                        let result = extract_face(&image, detector.as_mut()).map_err(EngineError::from);
                        let _ = reply.send(result);
                    }
                    EngineRequest::ExtractFile { input, reply } => {
                        let result = read_image(&input)
                            .and_then(|image| Ok(extract_face(&image, detector.as_mut())?));
                        let _ = reply.send(result);
                    }
                    EngineRequest::Verify { a, b, reply } => {
                        let result = run_verify(verifier.as_mut(), a, b, threshold);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx, timeout })
}

fn read_image(path: &Path) -> Result<DynamicImage, EngineError> {
    image::open(path).map_err(|source| EngineError::ReadImage {
        path: path.to_path_buf(),
        source,
    })
}

fn run_verify(
    verifier: &mut dyn FaceVerifier,
    a: FaceImage,
    b: FaceImage,
    threshold: f32,
) -> Result<Verdict, EngineError> {
    let (a, b) = match (a, b) {
        (FaceImage::Pixels(a), FaceImage::Pixels(b)) => (a, b),
        (FaceImage::File(a), FaceImage::File(b)) => (read_image(&a)?.to_rgb8(), read_image(&b)?.to_rgb8()),
        _ => return Err(EngineError::MixedRepresentations),
    };
    Ok(verify_faces(verifier, &a, &b, threshold)?)
}
