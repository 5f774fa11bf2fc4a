//! Persistence gateway
//!
//! The reader only needs three calls from storage: load the book, load its
//! saved pages and upsert one page. Keeping them behind a trait lets the
//! reconciler run against SQLite or a scripted store.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::books::BookRepository;
use super::pages::PageRepository;
use crate::document::{Document, PageContent};
use crate::error::Result;

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Catalog entry for a book, `None` when it does not exist
    async fn get_book(&self, id: i64) -> Result<Option<Document>>;

    /// Idempotent per `(book, page)`
    async fn upsert_page_content(&self, book_id: i64, page_number: u32, content: &str) -> Result<()>;

    /// Persisted pages of a book in page order
    async fn saved_pages(&self, book_id: i64) -> Result<Vec<PageContent>>;

    /// Remember a page count recovered from the document itself
    async fn update_page_count(&self, book_id: i64, page_count: u32) -> Result<()>;
}

/// Gateway backed by the library database
#[derive(Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn get_book(&self, id: i64) -> Result<Option<Document>> {
        let book = BookRepository::new(&self.pool).get(id).await?;
        Ok(book.map(|b| b.into_document()))
    }

    async fn upsert_page_content(&self, book_id: i64, page_number: u32, content: &str) -> Result<()> {
        PageRepository::new(&self.pool)
            .upsert(book_id, page_number, content)
            .await
    }

    async fn saved_pages(&self, book_id: i64) -> Result<Vec<PageContent>> {
        let rows = PageRepository::new(&self.pool).list_for_book(book_id).await?;
        Ok(rows.into_iter().filter_map(|row| row.into_page_content()).collect())
    }

    async fn update_page_count(&self, book_id: i64, page_count: u32) -> Result<()> {
        BookRepository::new(&self.pool)
            .update_page_count(book_id, page_count)
            .await?;
        Ok(())
    }
}
