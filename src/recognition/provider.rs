//! Text Recognition Providers
//!
//! Defines the recognizer trait consumed by the extraction pipeline and the
//! HTTP implementation talking to the OCR engine process.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use parking_lot::RwLock;

use super::types::{
    DocumentMetadata, HealthResponse, MetadataRequest, MetadataResponse, OcrImageRequest,
    PageRequest, RecognitionError, RenderPageRequest, RenderResponse, TextResponse, RENDER_SCALE,
};

/// Text recognition capability
///
/// Every call is a suspension point of the extraction run. "No text" is never
/// an error: it is an empty string.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Liveness check
    async fn is_healthy(&self) -> bool;

    /// Direct text extraction for a page (1-indexed)
    async fn extract_text(&self, file_path: &str, page: u32) -> Result<String, RecognitionError>;

    /// Rasterize a page as PNG, `None` when the engine could not render it
    async fn render_page_image(
        &self,
        file_path: &str,
        page: u32,
    ) -> Result<Option<Vec<u8>>, RecognitionError>;

    /// Best-effort OCR of a PNG image
    async fn ocr(&self, image: &[u8], language_hint: &str) -> Result<String, RecognitionError>;

    /// Title, author and page count of a file
    async fn get_metadata(&self, file_path: &str) -> Result<DocumentMetadata, RecognitionError>;
}

/// Client for the OCR engine's HTTP API
pub struct HttpRecognizer {
    base_url: RwLock<String>,
    client: reqwest::Client,
}

impl HttpRecognizer {
    pub fn new(base_url: &str, request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                reqwest::Client::new()
            });

        Self {
            base_url: RwLock::new(base_url.trim_end_matches('/').to_string()),
            client,
        }
    }

    pub fn from_config(config: &crate::config::RecognitionConfig) -> Self {
        Self::new(&config.base_url(), config.request_timeout())
    }

    /// Point the client at the port the engine actually started on
    pub fn set_port(&self, port: u16) {
        *self.base_url.write() = format!("http://127.0.0.1:{}", port);
    }

    pub fn base_url(&self) -> String {
        self.base_url.read().clone()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.read(), path)
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, RecognitionError>
    where
        Req: serde::Serialize + Sync,
        Resp: serde::de::DeserializeOwned,
    {
        let response = self.client.post(self.url(path)).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RecognitionError::ApiError(format!(
                "{} returned {}: {}",
                path, status, body
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl TextRecognizer for HttpRecognizer {
    async fn is_healthy(&self) -> bool {
        match self.client.get(self.url("/health")).send().await {
            Ok(response) if response.status().is_success() => response
                .json::<HealthResponse>()
                .await
                .map(|health| health.is_ok())
                .unwrap_or(false),
            _ => false,
        }
    }

    async fn extract_text(&self, file_path: &str, page: u32) -> Result<String, RecognitionError> {
        let request = PageRequest {
            file_path: file_path.to_string(),
            page_num: page,
        };
        let result: TextResponse = self.post("/pdf/smart-extract", &request).await?;

        if !result.success {
            tracing::debug!(
                page,
                error = result.error.as_deref().unwrap_or(""),
                "Engine reported no extractable text"
            );
            return Ok(String::new());
        }

        Ok(result.text.unwrap_or_default())
    }

    async fn render_page_image(
        &self,
        file_path: &str,
        page: u32,
    ) -> Result<Option<Vec<u8>>, RecognitionError> {
        let request = RenderPageRequest {
            file_path: file_path.to_string(),
            page_num: page,
            scale: RENDER_SCALE,
        };
        let result: RenderResponse = self.post("/pdf/render-page", &request).await?;

        let encoded = match (result.success, result.image) {
            (true, Some(image)) => image,
            _ => return Ok(None),
        };

        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map(Some)
            .map_err(|e| RecognitionError::InvalidResponse(format!("Bad page image: {}", e)))
    }

    async fn ocr(&self, image: &[u8], language_hint: &str) -> Result<String, RecognitionError> {
        let request = OcrImageRequest {
            image: base64::engine::general_purpose::STANDARD.encode(image),
            lang: language_hint.to_string(),
        };
        let result: TextResponse = self.post("/ocr/image", &request).await?;

        if !result.success {
            return Ok(String::new());
        }

        Ok(result.text.unwrap_or_default().trim().to_string())
    }

    async fn get_metadata(&self, file_path: &str) -> Result<DocumentMetadata, RecognitionError> {
        let request = MetadataRequest {
            file_path: file_path.to_string(),
        };
        let result: MetadataResponse = self.post("/pdf/metadata", &request).await?;

        if !result.success {
            return Err(RecognitionError::ApiError(
                result
                    .error
                    .unwrap_or_else(|| "metadata request failed".to_string()),
            ));
        }

        let page_count = result.pages.ok_or_else(|| {
            RecognitionError::InvalidResponse("metadata without page count".to_string())
        })?;

        let title = result
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| file_stem(file_path));

        Ok(DocumentMetadata {
            title,
            author: result.author.filter(|a| !a.trim().is_empty()),
            page_count,
            file_size: result.file_size.unwrap_or(0),
        })
    }
}

/// File name without directory and extension, used as a fallback title
pub fn file_stem(file_path: &str) -> String {
    std::path::Path::new(file_path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string())
}
