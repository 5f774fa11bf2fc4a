//! Extraction pipeline
//!
//! Turns a document into page content: direct text extraction per page with
//! an OCR fallback for scanned pages, scheduled in a fast first phase and a
//! batched background phase, cancellable at every page boundary.

mod cancel;
mod extractor;
mod page;
mod session;

pub use cancel::CancellationToken;
pub use extractor::{ExtractionOutcome, Extractor};
pub use page::PageExtractor;
pub use session::ExtractionSession;
