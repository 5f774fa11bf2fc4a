//! Reader session for one open book
//!
//! Loads the document, restores saved pages, then runs extraction and the
//! auto-save worker side by side over a shared [`PageStore`]. This is the
//! surface the reader/editor UI drives: observables for pages, the current
//! page, progress and save state, plus navigation and editing commands.
//!
//! Dropping the session cancels its extraction run and auto-save worker.

use std::sync::Arc;

use tokio::sync::watch;

use crate::autosave::{SaveOutcome, SaveReconciler, SaveState};
use crate::config::Config;
use crate::db::PersistenceGateway;
use crate::document::{Document, ExtractionProgress, PageContent, PageStore};
use crate::error::{AppError, Result};
use crate::pipeline::{ExtractionSession, Extractor};
use crate::recognition::TextRecognizer;

pub struct ReaderSession {
    document: Document,
    store: PageStore,
    extraction: ExtractionSession,
    autosave: SaveReconciler,
    current_page: watch::Sender<u32>,
}

impl ReaderSession {
    /// Load a book and start extracting it
    ///
    /// Fails with [`AppError::BookNotFound`] for an unknown id and
    /// [`AppError::LoadFailed`] when the book or its page count cannot be
    /// loaded. Nothing is started in either case.
    pub async fn open(
        document_id: i64,
        gateway: Arc<dyn PersistenceGateway>,
        recognizer: Arc<dyn TextRecognizer>,
        config: &Config,
    ) -> Result<Self> {
        let mut document = match gateway.get_book(document_id).await {
            Ok(Some(document)) => document,
            Ok(None) => return Err(AppError::BookNotFound(document_id)),
            Err(e) => {
                tracing::error!(document_id, "Failed to load book: {}", e);
                return Err(AppError::LoadFailed(e.to_string()));
            }
        };

        if document.page_count == 0 {
            document.page_count = recover_page_count(&document, gateway.as_ref(), recognizer.as_ref()).await?;
        }

        let store = PageStore::new(document.id, document.page_count);
        let saved = gateway.saved_pages(document.id).await.map_err(|e| {
            tracing::error!(document_id, "Failed to load saved pages: {}", e);
            AppError::LoadFailed(e.to_string())
        })?;
        let restored = store.restore_saved(saved);

        tracing::info!(
            document_id,
            title = %document.title,
            total_pages = document.page_count,
            restored,
            "Opened book"
        );

        let extractor = Arc::new(Extractor::new(
            recognizer,
            &config.extraction,
            &config.recognition.language_hint,
        ));
        let extraction = ExtractionSession::new(extractor, document.clone(), store.clone());
        let autosave = SaveReconciler::new(store.clone(), gateway, config.autosave.clone());

        extraction.start();
        autosave.start();

        let (current_page, _) = watch::channel(1);
        Ok(Self {
            document,
            store,
            extraction,
            autosave,
            current_page,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn total_pages(&self) -> u32 {
        self.document.page_count
    }

    /// Page content sorted by page number
    pub fn pages(&self) -> Vec<PageContent> {
        self.store.snapshot()
    }

    pub fn page(&self, number: u32) -> Option<PageContent> {
        self.store.get(number)
    }

    pub fn current_page(&self) -> u32 {
        *self.current_page.borrow()
    }

    pub fn subscribe_current_page(&self) -> watch::Receiver<u32> {
        self.current_page.subscribe()
    }

    /// Content of the current page, `None` until it has been extracted
    pub fn current_content(&self) -> Option<String> {
        self.store.get(self.current_page()).map(|p| p.content)
    }

    pub fn progress(&self) -> ExtractionProgress {
        self.extraction.progress()
    }

    pub fn progress_percent(&self) -> u8 {
        self.extraction.progress().percent()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ExtractionProgress> {
        self.extraction.subscribe_progress()
    }

    pub fn is_extraction_complete(&self) -> bool {
        self.extraction.is_complete()
    }

    /// Last document-level extraction error, for the error banner
    pub fn last_error(&self) -> Option<Arc<AppError>> {
        self.extraction.last_error()
    }

    pub fn save_state(&self) -> SaveState {
        self.autosave.state()
    }

    pub fn subscribe_save_state(&self) -> watch::Receiver<SaveState> {
        self.autosave.subscribe()
    }

    /// Move to `page`, clamped to the document
    pub fn go_to_page(&self, page: u32) -> u32 {
        let page = page.clamp(1, self.total_pages().max(1));
        self.current_page.send_if_modified(|current| {
            let changed = *current != page;
            *current = page;
            changed
        });
        page
    }

    pub fn next_page(&self) -> u32 {
        self.go_to_page(self.current_page().saturating_add(1))
    }

    pub fn prev_page(&self) -> u32 {
        self.go_to_page(self.current_page().saturating_sub(1))
    }

    /// Restart extraction from page 1, keeping edited pages
    pub async fn retry_extraction(&self) -> bool {
        self.extraction.retry().await
    }

    pub fn edit_page_content(&self, page: u32, content: impl Into<String>) -> Result<()> {
        self.store.edit(page, content)
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.store.has_dirty()
    }

    pub async fn manual_save(&self) -> Result<SaveOutcome> {
        self.autosave.save_now().await
    }

    pub async fn retry_save(&self) -> Result<SaveOutcome> {
        self.autosave.retry().await
    }

    pub fn is_edit_mode(&self) -> bool {
        self.autosave.is_enabled()
    }

    /// Enter or leave edit mode; leaving with unsaved changes saves them
    pub async fn set_edit_mode(&self, enabled: bool) -> Result<SaveOutcome> {
        self.autosave.set_enabled(enabled).await
    }

    /// Stop background work before navigating away
    pub fn close(&self) {
        self.extraction.cancel();
        self.autosave.cancel();
        tracing::debug!(document_id = self.document.id, "Closed reader session");
    }
}

/// Ask the document itself for a page count the catalog does not have
async fn recover_page_count(
    document: &Document,
    gateway: &dyn PersistenceGateway,
    recognizer: &dyn TextRecognizer,
) -> Result<u32> {
    tracing::warn!(
        document_id = document.id,
        "Book has no page count, reading it from the file"
    );

    let page_count = match recognizer.get_metadata(&document.file_path).await {
        Ok(metadata) => metadata.page_count,
        Err(e) => {
            tracing::error!(document_id = document.id, "Failed to read metadata: {}", e);
            return Err(AppError::LoadFailed(e.to_string()));
        }
    };

    if page_count == 0 {
        return Err(AppError::LoadFailed(format!(
            "{} has no pages",
            document.file_path
        )));
    }

    if let Err(e) = gateway.update_page_count(document.id, page_count).await {
        tracing::warn!(document_id = document.id, "Failed to store page count: {}", e);
    }

    Ok(page_count)
}
