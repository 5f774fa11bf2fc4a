//! In-memory page store for the open document
//!
//! Single source of truth for what the reader displays and the editor
//! mutates. Two writers share it:
//! - the extraction pipeline, through [`PageStore::apply_extracted`]
//! - the editor, through [`PageStore::edit`]
//!
//! Pages touched by the editor (edited in this session or restored from
//! storage) are editor-owned and never overwritten by extraction output.
//!
//! # Thread Safety
//!
//! State sits behind a `parking_lot::RwLock` that is never held across an
//! `.await`. Edits are announced on a `watch` channel carrying a revision
//! counter, which the auto-save worker debounces.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;

use super::types::PageContent;
use crate::error::{AppError, Result};
use crate::pipeline::CancellationToken;

#[derive(Default)]
struct StoreState {
    /// Keyed by page number, so reads are always in display order
    pages: BTreeMap<u32, PageContent>,
    editor_owned: BTreeSet<u32>,
}

/// Page content collection of one open document
#[derive(Clone)]
pub struct PageStore {
    inner: Arc<PageStoreInner>,
}

struct PageStoreInner {
    document_id: i64,
    total_pages: u32,
    state: RwLock<StoreState>,
    edits: watch::Sender<u64>,
}

impl PageStore {
    pub fn new(document_id: i64, total_pages: u32) -> Self {
        let (edits, _) = watch::channel(0);
        Self {
            inner: Arc::new(PageStoreInner {
                document_id,
                total_pages,
                state: RwLock::new(StoreState::default()),
                edits,
            }),
        }
    }

    pub fn document_id(&self) -> i64 {
        self.inner.document_id
    }

    pub fn total_pages(&self) -> u32 {
        self.inner.total_pages
    }

    fn check_range(&self, page: u32) -> Result<()> {
        if page == 0 || page > self.inner.total_pages {
            return Err(AppError::PageOutOfRange {
                page,
                total: self.inner.total_pages,
            });
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.read().pages.is_empty()
    }

    /// All pages sorted by page number
    pub fn snapshot(&self) -> Vec<PageContent> {
        self.inner.state.read().pages.values().cloned().collect()
    }

    pub fn get(&self, page: u32) -> Option<PageContent> {
        self.inner.state.read().pages.get(&page).cloned()
    }

    pub fn page_numbers(&self) -> Vec<u32> {
        self.inner.state.read().pages.keys().copied().collect()
    }

    pub fn is_editor_owned(&self, page: u32) -> bool {
        self.inner.state.read().editor_owned.contains(&page)
    }

    /// Seed pages loaded from storage; they take precedence over extraction
    pub fn restore_saved(&self, pages: impl IntoIterator<Item = PageContent>) -> usize {
        let mut state = self.inner.state.write();
        let mut restored = 0;
        for mut page in pages {
            if self.check_range(page.page_number).is_err() {
                tracing::warn!(
                    document_id = self.inner.document_id,
                    page = page.page_number,
                    "Ignoring saved page outside the document"
                );
                continue;
            }
            page.is_edited = false;
            state.editor_owned.insert(page.page_number);
            state.pages.insert(page.page_number, page);
            restored += 1;
        }
        restored
    }

    /// Publish a batch of extraction results
    ///
    /// Nothing is written once `token` is cancelled; the check happens under
    /// the write lock so it cannot interleave with [`PageStore::barrier`].
    /// Editor-owned pages are skipped. Returns the number of pages written.
    pub fn apply_extracted(
        &self,
        batch: Vec<PageContent>,
        token: &CancellationToken,
    ) -> Result<usize> {
        if let Some(bad) = batch.iter().find(|p| self.check_range(p.page_number).is_err()) {
            return Err(AppError::Extraction(format!(
                "page {} outside 1..={}",
                bad.page_number, self.inner.total_pages
            )));
        }

        let mut state = self.inner.state.write();
        if token.is_cancelled() {
            return Ok(0);
        }

        let mut applied = 0;
        for page in batch {
            if state.editor_owned.contains(&page.page_number) {
                tracing::debug!(
                    page = page.page_number,
                    "Keeping editor-owned content over extraction result"
                );
                continue;
            }
            state.pages.insert(
                page.page_number,
                PageContent::extracted(page.page_number, page.content),
            );
            applied += 1;
        }
        Ok(applied)
    }

    /// Replace a page's content from the editor, marking it dirty
    pub fn edit(&self, page: u32, content: impl Into<String>) -> Result<()> {
        self.check_range(page)?;
        {
            let mut state = self.inner.state.write();
            state.editor_owned.insert(page);
            state.pages.insert(page, PageContent::edited(page, content));
        }
        self.inner.edits.send_modify(|revision| *revision += 1);
        Ok(())
    }

    pub fn dirty_pages(&self) -> Vec<PageContent> {
        self.inner
            .state
            .read()
            .pages
            .values()
            .filter(|p| p.is_edited)
            .cloned()
            .collect()
    }

    pub fn has_dirty(&self) -> bool {
        self.inner.state.read().pages.values().any(|p| p.is_edited)
    }

    /// Clear the dirty flag of pages confirmed persisted
    ///
    /// A page edited again while its save was in flight stays dirty.
    pub fn mark_persisted(&self, persisted: &[PageContent]) -> usize {
        let mut state = self.inner.state.write();
        let mut cleared = 0;
        for saved in persisted {
            if let Some(page) = state.pages.get_mut(&saved.page_number) {
                if page.is_edited && page.content == saved.content {
                    page.is_edited = false;
                    cleared += 1;
                }
            }
        }
        cleared
    }

    /// Drop extraction output before a full restart, keeping editor-owned pages
    pub fn discard_extracted(&self) -> usize {
        let mut state = self.inner.state.write();
        let before = state.pages.len();
        let StoreState {
            pages,
            editor_owned,
        } = &mut *state;
        pages.retain(|number, _| editor_owned.contains(number));
        before - pages.len()
    }

    /// Wait for any in-flight write to finish
    pub fn barrier(&self) {
        drop(self.inner.state.write());
    }

    /// Wake edit subscribers without touching any page
    pub fn notify_edits(&self) {
        self.inner.edits.send_modify(|revision| *revision += 1);
    }

    pub fn subscribe_edits(&self) -> watch::Receiver<u64> {
        self.inner.edits.subscribe()
    }
}
