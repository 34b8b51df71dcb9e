//! Downloading and decoding the images named in a request.

use image::{DynamicImage, ImageFormat};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("server responded with {0}")]
    Status(reqwest::StatusCode),
    #[error("image exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("content is not a recognised image format")]
    NotAnImage,
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Default cap on a downloaded image body.
pub const DEFAULT_MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Shared HTTP client for image downloads. TLS certificates are always verified.
#[derive(Clone)]
pub struct ImageFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl ImageFetcher {
    /// Build a fetcher whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, AcquisitionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("facematchd/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }

    /// Refuse bodies larger than `max_bytes`.
    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// GET `url` and return the body. Any non-2xx status is an error.
    ///
    /// The body is read chunk by chunk and abandoned once it passes the cap,
    /// whether or not the server announced its length.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, AcquisitionError> {
        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::Status(status));
        }

        let limit = self.max_bytes;
        if response.content_length().is_some_and(|len| len > limit) {
            return Err(AcquisitionError::TooLarge { limit });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(AcquisitionError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }
        tracing::debug!(url, bytes = body.len(), "image downloaded");
        Ok(body)
    }
}

/// Identify the image container from its magic bytes.
pub fn sniff_format(bytes: &[u8]) -> Result<ImageFormat, AcquisitionError> {
    image::guess_format(bytes).map_err(|_| AcquisitionError::NotAnImage)
}

/// Decode `bytes` and bound the longer side to `max_dimension`.
pub fn decode_image(bytes: &[u8], max_dimension: u32) -> Result<DynamicImage, AcquisitionError> {
    let format = sniff_format(bytes)?;
    let image = image::load_from_memory_with_format(bytes, format)?;
    Ok(facematch_core::fit_within(image, max_dimension))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn decode_downscales_large_images() {
        let img = decode_image(&png(2000, 1000), 640).unwrap();
        assert_eq!((img.width(), img.height()), (640, 320));
    }

    #[test]
    fn decode_keeps_small_images() {
        let img = decode_image(&png(120, 90), 640).unwrap();
        assert_eq!((img.width(), img.height()), (120, 90));
    }

    #[test]
    fn non_image_content_rejected() {
        assert!(matches!(
            decode_image(b"<html>not found</html>", 640),
            Err(AcquisitionError::NotAnImage)
        ));
    }

    #[test]
    fn truncated_image_rejected() {
        let bytes = png(64, 64);
        assert!(matches!(
            decode_image(&bytes[..bytes.len() / 2], 640),
            Err(AcquisitionError::Decode(_))
        ));
    }

    fn loopback_fetcher() -> ImageFetcher {
        ImageFetcher::with_client(
            reqwest::Client::builder()
                .no_proxy()
                .timeout(Duration::from_secs(2))
                .build()
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn oversized_body_rejected() {
        let body = png(256, 256);
        let size = body.len() as u64;
        let app = axum::Router::new().route(
            "/big.png",
            axum::routing::get(move || {
                let body = body.clone();
                async move { body }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        let url = format!("http://{addr}/big.png");

        let capped = loopback_fetcher().with_max_bytes(size - 1);
        assert!(matches!(
            capped.fetch_bytes(&url).await,
            Err(AcquisitionError::TooLarge { limit }) if limit == size - 1
        ));

        let exact = loopback_fetcher().with_max_bytes(size);
        assert_eq!(exact.fetch_bytes(&url).await.unwrap().len() as u64, size);
    }

    #[tokio::test]
    async fn unreachable_host_is_request_error() {
        let fetcher = loopback_fetcher();
        // Port 9 (discard) on loopback is closed on test hosts.
        let result = fetcher.fetch_bytes("http://127.0.0.1:9/face.jpg").await;
        assert!(matches!(result, Err(AcquisitionError::Request(_))));
    }
}
