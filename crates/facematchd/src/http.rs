//! HTTP routes: `GET /` health check and `POST /verify`.

use crate::engine::EngineHandle;
use crate::error::PipelineError;
use crate::preprocess::{engine_error, ImagePreprocessor, Preprocessor};
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub const HEALTH_MESSAGE: &str = "Face Verification API is running.";

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub preprocessor: Arc<Preprocessor>,
    pub engine: EngineHandle,
    /// Parent of per-request scratch directories.
    pub temp_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub id_url: String,
    pub ref_url: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct VerifyResponse {
    #[serde(rename = "match")]
    pub matched: bool,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    message: &'static str,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/verify", post(verify))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { message: HEALTH_MESSAGE })
}

async fn verify(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>, PipelineError> {
    tracing::info!(id_url = %req.id_url, ref_url = %req.ref_url, "verify requested");

    // Owned by this request; removed on every exit path.
    let scratch = state.preprocessor.scratch(&state.temp_dir)?;

    // Both pipelines settle before anything can drop the scratch space.
    let (id_face, ref_face) = tokio::join!(
        state.preprocessor.prepare("id", &req.id_url, &scratch),
        state.preprocessor.prepare("ref", &req.ref_url, &scratch),
    );
    let (id_face, ref_face) = (id_face?, ref_face?);

    let verdict = state
        .engine
        .verify(id_face, ref_face)
        .await
        .map_err(engine_error)?;

    tracing::info!(distance = verdict.distance, matched = verdict.matched, "verify complete");
    Ok(Json(VerifyResponse { matched: verdict.matched }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::ImageFetcher;
    use crate::config::{Config, PreprocessMode};
    use crate::engine::tests::fake_engine;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::response::IntoResponse;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::Value;
    use std::io::Cursor;
    use std::time::Duration;
    use tower::ServiceExt;

    fn png(img: RgbImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn portrait(color: [u8; 3], width: u32, height: u32) -> Vec<u8> {
        let mut img = RgbImage::new(width, height);
        for y in height / 4..height / 2 {
            for x in width / 4..width / 2 {
                img.put_pixel(x, y, Rgb(color));
            }
        }
        png(img)
    }

    /// Serves fixture images on an ephemeral loopback port.
    async fn fixture_server() -> String {
        let alice = portrait([255, 255, 255], 200, 160);
        let alice_large = portrait([255, 255, 255], 2000, 1600);
        let bob = portrait([255, 255, 0], 200, 160);
        let blank = png(RgbImage::new(120, 120));

        let app = Router::new()
            .route("/alice.png", get(move || {
                let body = alice.clone();
                async move { body }
            }))
            .route("/alice-large.png", get(move || {
                let body = alice_large.clone();
                async move { body }
            }))
            .route("/bob.png", get(move || {
                let body = bob.clone();
                async move { body }
            }))
            .route("/blank.png", get(move || {
                let body = blank.clone();
                async move { body }
            }))
            .route("/page.html", get(|| async { "<html>hello</html>" }))
            .route("/broken", get(|| async { StatusCode::INTERNAL_SERVER_ERROR.into_response() }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    struct Harness {
        app: Router,
        base: String,
        temp_root: tempfile::TempDir,
    }

    async fn harness(mode: PreprocessMode, verifier_fails: bool, detect_delay: Duration) -> Harness {
        let base = fixture_server().await;
        let temp_root = tempfile::tempdir().unwrap();

        let mut config = Config::from_lookup(|_| None).unwrap();
        config.preprocess = mode;
        config.temp_dir = temp_root.path().to_path_buf();

        let timeout = if detect_delay.is_zero() {
            Duration::from_secs(5)
        } else {
            Duration::from_millis(200)
        };
        let engine = fake_engine(detect_delay, verifier_fails, timeout);
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(config.fetch_timeout)
            .build()
            .unwrap();
        let fetcher = ImageFetcher::with_client(client);
        let preprocessor = Preprocessor::from_config(&config, fetcher, engine.clone());

        let app = router(AppState {
            preprocessor: Arc::new(preprocessor),
            engine,
            temp_dir: config.temp_dir.clone(),
        });
        Harness { app, base, temp_root }
    }

    impl Harness {
        async fn verify(&self, id: &str, reference: &str) -> (StatusCode, Value) {
            let body = serde_json::json!({
                "id_url": format!("{}{id}", self.base),
                "ref_url": format!("{}{reference}", self.base),
            });
            self.post_json(body.to_string()).await
        }

        async fn post_json(&self, body: String) -> (StatusCode, Value) {
            let request = Request::builder()
                .method("POST")
                .uri("/verify")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .unwrap();
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, json)
        }

        fn leftover_temp_entries(&self) -> usize {
            std::fs::read_dir(self.temp_root.path()).unwrap().count()
        }
    }

    #[tokio::test]
    async fn health_check() {
        let h = harness(PreprocessMode::Memory, false, Duration::ZERO).await;
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json, serde_json::json!({ "message": HEALTH_MESSAGE }));
    }

    #[tokio::test]
    async fn same_person_matches() {
        let h = harness(PreprocessMode::Memory, false, Duration::ZERO).await;
        let (status, json) = h.verify("/alice.png", "/alice.png").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({ "match": true }));
    }

    #[tokio::test]
    async fn downscaled_source_still_matches() {
        let h = harness(PreprocessMode::Memory, false, Duration::ZERO).await;
        let (status, json) = h.verify("/alice-large.png", "/alice.png").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["match"], true);
    }

    #[tokio::test]
    async fn different_people_do_not_match() {
        let h = harness(PreprocessMode::Memory, false, Duration::ZERO).await;
        let (status, json) = h.verify("/alice.png", "/bob.png").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({ "match": false }));
    }

    #[tokio::test]
    async fn missing_image_is_acquisition_error() {
        let h = harness(PreprocessMode::Memory, false, Duration::ZERO).await;
        let (status, json) = h.verify("/missing.png", "/alice.png").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "acquisition_failed");
        assert!(json["detail"].as_str().unwrap().contains("acquisition failed"));
        assert!(json["detail"].as_str().unwrap().contains("404"));
    }

    #[tokio::test]
    async fn server_error_is_acquisition_error() {
        let h = harness(PreprocessMode::Memory, false, Duration::ZERO).await;
        let (status, json) = h.verify("/alice.png", "/broken").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "acquisition_failed");
    }

    #[tokio::test]
    async fn non_image_is_acquisition_error() {
        let h = harness(PreprocessMode::Memory, false, Duration::ZERO).await;
        let (status, json) = h.verify("/page.html", "/alice.png").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "acquisition_failed");
    }

    #[tokio::test]
    async fn blank_image_is_detection_error() {
        let h = harness(PreprocessMode::Memory, false, Duration::ZERO).await;
        let (status, json) = h.verify("/alice.png", "/blank.png").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(json["error"], "detection_failed");
        assert!(json["detail"].as_str().unwrap().contains("no face detected"));
    }

    #[tokio::test]
    async fn verifier_fault_is_generic_server_error() {
        let h = harness(PreprocessMode::Memory, true, Duration::ZERO).await;
        let (status, json) = h.verify("/alice.png", "/alice.png").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "verification_failed");
        assert!(!json["detail"].as_str().unwrap().contains("fake fault"));
    }

    #[tokio::test]
    async fn slow_detection_is_bounded() {
        let h = harness(PreprocessMode::Memory, false, Duration::from_secs(2)).await;
        let (status, json) = h.verify("/alice.png", "/bob.png").await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json["error"], "inference_timeout");
    }

    #[tokio::test]
    async fn missing_field_is_rejected() {
        let h = harness(PreprocessMode::Memory, false, Duration::ZERO).await;
        let (status, _) = h.post_json(r#"{"id_url": "http://x/a.png"}"#.to_string()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn tempfile_mode_matches_and_cleans_up() {
        let h = harness(PreprocessMode::TempFile, false, Duration::ZERO).await;

        let (status, json) = h.verify("/alice.png", "/alice.png").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({ "match": true }));
        assert_eq!(h.leftover_temp_entries(), 0);

        let (status, json) = h.verify("/alice.png", "/bob.png").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json, serde_json::json!({ "match": false }));
        assert_eq!(h.leftover_temp_entries(), 0);
    }

    #[tokio::test]
    async fn tempfile_mode_cleans_up_after_failures() {
        let h = harness(PreprocessMode::TempFile, false, Duration::ZERO).await;

        let (status, _) = h.verify("/alice.png", "/blank.png").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(h.leftover_temp_entries(), 0);

        let (status, _) = h.verify("/missing.png", "/alice.png").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(h.leftover_temp_entries(), 0);

        let (status, _) = h.verify("/page.html", "/alice.png").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(h.leftover_temp_entries(), 0);
    }

    #[tokio::test]
    async fn tempfile_mode_verifier_fault_cleans_up() {
        let h = harness(PreprocessMode::TempFile, true, Duration::ZERO).await;
        let (status, _) = h.verify("/alice.png", "/alice.png").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(h.leftover_temp_entries(), 0);
    }
}
