//! Book catalog database operations

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::document::Document;
use crate::error::Result;

/// Book record
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
    pub file_path: String,
    pub page_count: i64,
    pub language: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Book {
    pub fn into_document(self) -> Document {
        Document {
            id: self.id,
            title: self.title,
            author: self.author,
            page_count: u32::try_from(self.page_count).unwrap_or(0),
            file_path: self.file_path,
        }
    }
}

/// Create book request
#[derive(Debug, Clone, Deserialize)]
pub struct NewBook {
    pub title: String,
    pub author: Option<String>,
    pub file_path: String,
    pub page_count: u32,
    pub language: Option<String>,
}

/// Book repository
pub struct BookRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> BookRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a specific book
    pub async fn get(&self, id: i64) -> Result<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, author, file_path, page_count, language, created_at, updated_at
            FROM books
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(book)
    }

    /// Add a book to the library
    pub async fn create(&self, data: &NewBook) -> Result<Book> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO books (title, author, file_path, page_count, language, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&data.title)
        .bind(&data.author)
        .bind(&data.file_path)
        .bind(i64::from(data.page_count))
        .bind(&data.language)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await?;

        let id = result.last_insert_rowid();
        self.get(id)
            .await?
            .ok_or_else(|| sqlx::Error::RowNotFound.into())
    }

    /// Record a page count learned after import
    pub async fn update_page_count(&self, id: i64, page_count: u32) -> Result<bool> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query("UPDATE books SET page_count = ?, updated_at = ? WHERE id = ?")
            .bind(i64::from(page_count))
            .bind(&now)
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
