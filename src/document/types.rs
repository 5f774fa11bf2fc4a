//! Document and page content types

use serde::{Deserialize, Serialize};

/// A book open for reading
///
/// Immutable for the duration of an extraction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub author: Option<String>,
    pub page_count: u32,
    pub file_path: String,
}

/// Text of one page (1-indexed)
///
/// An empty `content` is a valid value. `is_edited` means the content diverged
/// from extraction output and has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContent {
    pub page_number: u32,
    pub content: String,
    pub is_edited: bool,
}

impl PageContent {
    pub fn extracted(page_number: u32, content: impl Into<String>) -> Self {
        Self {
            page_number,
            content: content.into(),
            is_edited: false,
        }
    }

    pub fn edited(page_number: u32, content: impl Into<String>) -> Self {
        Self {
            page_number,
            content: content.into(),
            is_edited: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPhase {
    #[default]
    Idle,
    /// First pages, published one by one
    FastPath,
    /// Remaining pages, published in batches
    Background,
    Complete,
    Cancelled,
    Failed,
}

/// Derived progress of an extraction run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionProgress {
    pub pages_processed: u32,
    pub total_pages: u32,
    pub phase: ExtractionPhase,
}

impl ExtractionProgress {
    pub fn new(total_pages: u32) -> Self {
        Self {
            pages_processed: 0,
            total_pages,
            phase: ExtractionPhase::Idle,
        }
    }

    /// Rounded percentage in 0..=100
    pub fn percent(&self) -> u8 {
        if self.phase == ExtractionPhase::Complete {
            return 100;
        }
        if self.total_pages == 0 {
            return 0;
        }
        let ratio = f64::from(self.pages_processed.min(self.total_pages)) / f64::from(self.total_pages);
        (ratio * 100.0).round() as u8
    }

    pub fn is_complete(&self) -> bool {
        self.phase == ExtractionPhase::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_rounding() {
        let progress = ExtractionProgress {
            pages_processed: 1,
            total_pages: 3,
            phase: ExtractionPhase::FastPath,
        };
        assert_eq!(progress.percent(), 33);

        let progress = ExtractionProgress {
            pages_processed: 2,
            total_pages: 3,
            phase: ExtractionPhase::FastPath,
        };
        assert_eq!(progress.percent(), 67);
    }

    #[test]
    fn test_percent_edge_cases() {
        assert_eq!(ExtractionProgress::new(0).percent(), 0);

        let done = ExtractionProgress {
            pages_processed: 0,
            total_pages: 0,
            phase: ExtractionPhase::Complete,
        };
        assert_eq!(done.percent(), 100);
        assert!(done.is_complete());
    }

    #[test]
    fn test_page_content_serializes_camel_case() {
        let page = PageContent::edited(4, "X");
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["pageNumber"], 4);
        assert_eq!(json["isEdited"], true);
    }
}
