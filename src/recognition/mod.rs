//! Text Recognition Module
//!
//! Boundary to the external OCR engine: direct text extraction, page
//! rasterization, OCR, metadata and the engine's startup handshake.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bookmagic::recognition::{EngineLauncher, HttpRecognizer, TextRecognizer};
//!
//! let launcher = EngineLauncher::new(config.recognition.clone());
//! let port = launcher.start().await?;
//!
//! let recognizer = HttpRecognizer::from_config(&config.recognition);
//! recognizer.set_port(port);
//! let text = recognizer.extract_text("/books/novel.pdf", 1).await?;
//! ```

mod engine;
#[cfg(test)]
pub(crate) mod mock;
mod provider;
mod types;

pub use engine::EngineLauncher;
pub use provider::{file_stem, HttpRecognizer, TextRecognizer};
pub use types::{
    DocumentMetadata, HealthResponse, MetadataRequest, MetadataResponse, OcrImageRequest,
    PageRequest, RecognitionError, RenderPageRequest, RenderResponse, TextResponse, RENDER_SCALE,
};
