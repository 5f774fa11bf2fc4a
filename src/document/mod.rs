//! Document module
//!
//! The open book, its per-page content and the in-memory page store that the
//! extraction pipeline and the editor both write to.

mod store;
mod types;

pub use store::PageStore;
pub use types::{Document, ExtractionPhase, ExtractionProgress, PageContent};
