//! Edit/save reconciliation
//!
//! Persists pages the editor changed, debounced while typing and on demand,
//! and exposes the save status the reader shows next to the editor.

mod reconciler;
mod status;

pub use reconciler::SaveReconciler;
pub use status::{SaveOutcome, SaveState, SaveStatus};
