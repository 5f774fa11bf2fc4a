//! In-memory gateway for reconciler and reader tests

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::gateway::PersistenceGateway;
use crate::document::{Document, PageContent};
use crate::error::{AppError, Result};

#[derive(Default)]
pub struct MemoryGateway {
    books: HashMap<i64, Document>,
    fail_load: bool,
    failing_pages: Mutex<HashSet<u32>>,
    pub saved: Mutex<BTreeMap<(i64, u32), String>>,
    /// Every upsert attempt, including failed ones
    pub calls: Mutex<Vec<(u32, String)>>,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_book(mut self, document: Document) -> Self {
        self.books.insert(document.id, document);
        self
    }

    pub fn with_saved(self, book_id: i64, page: u32, content: &str) -> Self {
        self.saved.lock().insert((book_id, page), content.to_string());
        self
    }

    pub fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn fail_page(&self, page: u32) {
        self.failing_pages.lock().insert(page);
    }

    pub fn heal_page(&self, page: u32) {
        self.failing_pages.lock().remove(&page);
    }

    pub fn calls(&self) -> Vec<(u32, String)> {
        self.calls.lock().clone()
    }

    pub fn saved_content(&self, book_id: i64, page: u32) -> Option<String> {
        self.saved.lock().get(&(book_id, page)).cloned()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryGateway {
    async fn get_book(&self, id: i64) -> Result<Option<Document>> {
        if self.fail_load {
            return Err(AppError::Internal("catalog unavailable".to_string()));
        }
        Ok(self.books.get(&id).cloned())
    }

    async fn upsert_page_content(&self, book_id: i64, page_number: u32, content: &str) -> Result<()> {
        self.calls.lock().push((page_number, content.to_string()));
        if self.failing_pages.lock().contains(&page_number) {
            return Err(AppError::Save(format!("disk full writing page {}", page_number)));
        }
        self.saved
            .lock()
            .insert((book_id, page_number), content.to_string());
        Ok(())
    }

    async fn saved_pages(&self, book_id: i64) -> Result<Vec<PageContent>> {
        Ok(self
            .saved
            .lock()
            .iter()
            .filter(|((book, _), _)| *book == book_id)
            .map(|((_, page), content)| PageContent::extracted(*page, content.clone()))
            .collect())
    }

    async fn update_page_count(&self, _book_id: i64, _page_count: u32) -> Result<()> {
        Ok(())
    }
}
