//! Two-phase document extraction
//!
//! Phase 1 (fast path) publishes the first pages one at a time so reading can
//! start right away. Phase 2 (background) walks the remainder in order and
//! publishes in batches to limit churn on large documents.
//!
//! Pages are processed strictly sequentially. The cancellation token is
//! checked before each page starts and again once its text is back.

use std::sync::Arc;

use tokio::sync::watch;

use super::cancel::CancellationToken;
use super::page::PageExtractor;
use crate::config::ExtractionConfig;
use crate::document::{Document, ExtractionPhase, ExtractionProgress, PageContent, PageStore};
use crate::error::Result;
use crate::recognition::TextRecognizer;

/// How an extraction run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Completed,
    Cancelled,
}

/// Fills a [`PageStore`] from the text recognition service
pub struct Extractor {
    pages: PageExtractor,
    fast_path_pages: u32,
    batch_size: u32,
}

impl Extractor {
    pub fn new(
        recognizer: Arc<dyn TextRecognizer>,
        config: &ExtractionConfig,
        language_hint: &str,
    ) -> Self {
        Self {
            pages: PageExtractor::new(recognizer, language_hint, config.min_text_chars),
            fast_path_pages: config.fast_path_pages,
            batch_size: config.batch_size.max(1),
        }
    }

    /// Extract every page of `document` into `store`
    ///
    /// Per-page failures become empty pages. An `Err` means the run itself
    /// broke and nothing after the failing publish was written.
    pub async fn run(
        &self,
        document: &Document,
        store: &PageStore,
        progress: &watch::Sender<ExtractionProgress>,
        token: &CancellationToken,
    ) -> Result<ExtractionOutcome> {
        let total = document.page_count;
        tracing::info!(
            document_id = document.id,
            total_pages = total,
            "Starting extraction"
        );

        if self.run_fast_path(document, store, progress, token).await? == ExtractionOutcome::Cancelled
            || self.run_background(document, store, progress, token).await? == ExtractionOutcome::Cancelled
        {
            return Ok(self.cancelled(document, progress));
        }

        progress.send_modify(|p| {
            p.pages_processed = total;
            p.phase = ExtractionPhase::Complete;
        });
        tracing::info!(document_id = document.id, "Extraction complete");
        Ok(ExtractionOutcome::Completed)
    }

    fn fast_path_end(&self, total: u32) -> u32 {
        self.fast_path_pages.min(total)
    }

    /// Pages `1..=min(fast_path_pages, total)`, each published as soon as it is ready
    pub(crate) async fn run_fast_path(
        &self,
        document: &Document,
        store: &PageStore,
        progress: &watch::Sender<ExtractionProgress>,
        token: &CancellationToken,
    ) -> Result<ExtractionOutcome> {
        let total = document.page_count;
        let end = self.fast_path_end(total);

        progress.send_replace(ExtractionProgress {
            pages_processed: 0,
            total_pages: total,
            phase: ExtractionPhase::FastPath,
        });

        for page in 1..=end {
            match self.next_page(document, store, page, token).await {
                PageResult::Cancelled => return Ok(ExtractionOutcome::Cancelled),
                PageResult::Skipped => {}
                PageResult::Ready(content) => {
                    store.apply_extracted(vec![content], token)?;
                }
            }
            progress.send_modify(|p| p.pages_processed = page);
        }

        tracing::info!(
            document_id = document.id,
            pages = end,
            "Fast path complete"
        );
        Ok(ExtractionOutcome::Completed)
    }

    /// Remaining pages, published every `batch_size` pages and at the last page
    pub(crate) async fn run_background(
        &self,
        document: &Document,
        store: &PageStore,
        progress: &watch::Sender<ExtractionProgress>,
        token: &CancellationToken,
    ) -> Result<ExtractionOutcome> {
        let total = document.page_count;
        let start = self.fast_path_end(total) + 1;
        if start > total {
            return Ok(ExtractionOutcome::Completed);
        }

        progress.send_modify(|p| p.phase = ExtractionPhase::Background);
        let mut pending = Vec::new();

        for page in start..=total {
            match self.next_page(document, store, page, token).await {
                PageResult::Cancelled => {
                    if !pending.is_empty() {
                        tracing::debug!(
                            document_id = document.id,
                            discarded = pending.len(),
                            "Dropping unpublished batch"
                        );
                    }
                    return Ok(ExtractionOutcome::Cancelled);
                }
                PageResult::Skipped => {}
                PageResult::Ready(content) => pending.push(content),
            }

            if page % self.batch_size == 0 || page == total {
                let batch = std::mem::take(&mut pending);
                if !batch.is_empty() {
                    let applied = store.apply_extracted(batch, token)?;
                    tracing::debug!(
                        document_id = document.id,
                        up_to = page,
                        applied,
                        "Published background batch"
                    );
                }
                progress.send_modify(|p| p.pages_processed = page);
            }
        }

        Ok(ExtractionOutcome::Completed)
    }

    async fn next_page(
        &self,
        document: &Document,
        store: &PageStore,
        page: u32,
        token: &CancellationToken,
    ) -> PageResult {
        if token.is_cancelled() {
            return PageResult::Cancelled;
        }

        if store.is_editor_owned(page) {
            tracing::debug!(page, "Skipping editor-owned page");
            return PageResult::Skipped;
        }

        let text = self.pages.process_page(&document.file_path, page).await;

        // The result may arrive after cancellation; never publish it
        if token.is_cancelled() {
            tracing::debug!(page, "Discarding page that resolved after cancellation");
            return PageResult::Cancelled;
        }

        tracing::debug!(page, chars = text.chars().count(), "Page extracted");
        PageResult::Ready(PageContent::extracted(page, text))
    }

    fn cancelled(
        &self,
        document: &Document,
        progress: &watch::Sender<ExtractionProgress>,
    ) -> ExtractionOutcome {
        progress.send_modify(|p| p.phase = ExtractionPhase::Cancelled);
        tracing::info!(document_id = document.id, "Extraction cancelled");
        ExtractionOutcome::Cancelled
    }
}

enum PageResult {
    Ready(PageContent),
    Skipped,
    Cancelled,
}
