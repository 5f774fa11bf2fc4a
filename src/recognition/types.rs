//! Text Recognition Types
//!
//! Wire types for the OCR engine's HTTP API and the errors of this boundary.

use serde::{Deserialize, Serialize};

/// Scale used when rasterizing a page for OCR
pub const RENDER_SCALE: f32 = 2.0;

/// Document metadata reported by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub title: String,
    pub author: Option<String>,
    pub page_count: u32,
    pub file_size: u64,
}

/// Health endpoint payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

impl HealthResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Request for a single page of a file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRequest {
    pub file_path: String,
    pub page_num: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRequest {
    pub file_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderPageRequest {
    pub file_path: String,
    pub page_num: u32,
    pub scale: f32,
}

/// OCR request carrying a base64 PNG
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrImageRequest {
    pub image: String,
    pub lang: String,
}

/// Response of `/pdf/smart-extract` and `/ocr/image`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextResponse {
    pub success: bool,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataResponse {
    pub success: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub pages: Option<u32>,
    #[serde(default)]
    pub file_size: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of `/pdf/render-page`, image is base64 encoded PNG
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderResponse {
    pub success: bool,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Text recognition error types
#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("Text recognition service not available: {0}")]
    Unavailable(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("OCR engine did not start within {0} ms")]
    StartupTimeout(u64),

    #[error("OCR engine exited during startup (code {0:?})")]
    ProcessExited(Option<i32>),

    #[error("Port {0} is occupied by another process")]
    PortOccupied(u16),

    #[error("OCR engine started but health check failed after {0} attempts")]
    HealthCheckFailed(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for RecognitionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            RecognitionError::Unavailable(err.to_string())
        } else if err.is_decode() {
            RecognitionError::InvalidResponse(err.to_string())
        } else {
            RecognitionError::ApiError(err.to_string())
        }
    }
}
