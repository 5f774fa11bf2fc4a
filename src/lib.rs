//! BookMagic Library
//!
//! Page acquisition for a personal PDF library: direct text extraction with
//! an OCR fallback, streamed into an in-memory page store in two phases, and
//! debounced persistence of the pages a reader edits.
//!
//! # Modules
//!
//! - `recognition`: client and process launcher for the external OCR engine
//! - `document`: document model and the shared page store
//! - `pipeline`: two-phase extraction with cancellation
//! - `autosave`: edit/save reconciliation
//! - `db`: SQLite catalog and saved pages
//! - `reader`: one open book, wiring the above together

pub mod autosave;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod reader;
pub mod recognition;

pub use error::{AppError, Result};
pub use reader::ReaderSession;
