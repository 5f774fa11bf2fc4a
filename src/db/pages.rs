//! Saved page content database operations

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::document::PageContent;
use crate::error::Result;

/// Saved page record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SavedPage {
    pub book_id: i64,
    pub page_number: i64,
    pub content: String,
    pub updated_at: String,
}

impl SavedPage {
    /// Saved rows are persisted by definition, so they come back clean
    pub fn into_page_content(self) -> Option<PageContent> {
        let number = u32::try_from(self.page_number).ok()?;
        Some(PageContent::extracted(number, self.content))
    }
}

/// Page content repository
pub struct PageRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PageRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert or replace one page; last write wins
    pub async fn upsert(&self, book_id: i64, page_number: u32, content: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO book_pages (book_id, page_number, content, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(book_id, page_number) DO UPDATE SET
                content = excluded.content,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(book_id)
        .bind(i64::from(page_number))
        .bind(content)
        .bind(&now)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// All saved pages of a book in page order
    pub async fn list_for_book(&self, book_id: i64) -> Result<Vec<SavedPage>> {
        let pages = sqlx::query_as::<_, SavedPage>(
            r#"
            SELECT book_id, page_number, content, updated_at
            FROM book_pages
            WHERE book_id = ?
            ORDER BY page_number ASC
            "#,
        )
        .bind(book_id)
        .fetch_all(self.pool)
        .await?;

        Ok(pages)
    }
}
