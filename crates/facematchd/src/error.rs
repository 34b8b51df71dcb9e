use crate::acquisition::AcquisitionError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use facematch_core::{ExtractionError, VerifierError};
use serde::Serialize;
use thiserror::Error;

/// Terminal failure of a `/verify` request.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("image acquisition failed for {url}: {source}")]
    Acquisition {
        url: String,
        #[source]
        source: AcquisitionError,
    },
    #[error("face detection failed: {0}")]
    Detection(#[from] ExtractionError),
    #[error("{0} timed out")]
    Timeout(&'static str),
    #[error("face verification failed: {0}")]
    Verification(#[from] VerifierError),
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub detail: String,
}

impl PipelineError {
    pub fn acquisition(url: &str, source: AcquisitionError) -> Self {
        PipelineError::Acquisition { url: url.to_string(), source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            PipelineError::Acquisition { .. } => StatusCode::BAD_REQUEST,
            PipelineError::Detection(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PipelineError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Verification(_) | PipelineError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Acquisition { .. } => "acquisition_failed",
            PipelineError::Detection(_) => "detection_failed",
            PipelineError::Timeout(_) => "inference_timeout",
            PipelineError::Verification(_) => "verification_failed",
            PipelineError::Internal(_) => "internal_error",
        }
    }

    /// Client-facing message. Server faults get a fixed message; details stay in the log.
    fn detail(&self) -> String {
        match self {
            PipelineError::Verification(_) => "face verification failed".to_string(),
            PipelineError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self, "verify request failed");
        } else {
            tracing::warn!(kind = self.kind(), error = %self, "verify request rejected");
        }

        let body = ErrorBody {
            error: self.kind(),
            detail: self.detail(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::recognizer::RecognizerError;

    #[test]
    fn status_codes() {
        let acq = PipelineError::acquisition("http://x/a.jpg", AcquisitionError::NotAnImage);
        assert_eq!(acq.status(), StatusCode::BAD_REQUEST);
        assert_eq!(PipelineError::Detection(ExtractionError::NoFace).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(PipelineError::Timeout("detection").status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(PipelineError::Internal("x".into()).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn acquisition_detail_names_url() {
        let err = PipelineError::acquisition(
            "http://img.example/id.jpg",
            AcquisitionError::Status(reqwest::StatusCode::NOT_FOUND),
        );
        let detail = err.detail();
        assert!(detail.contains("acquisition failed"), "{detail}");
        assert!(detail.contains("http://img.example/id.jpg"), "{detail}");
        assert!(detail.contains("404"), "{detail}");
    }

    #[test]
    fn server_faults_hide_internals() {
        let err = PipelineError::Verification(VerifierError::Recognizer(
            RecognizerError::InferenceFailed("tensor shape [1, 7] at node 42".into()),
        ));
        assert_eq!(err.kind(), "verification_failed");
        assert!(!err.detail().contains("node 42"));
    }
}
