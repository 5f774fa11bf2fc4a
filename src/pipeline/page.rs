//! Per-page text acquisition: direct extraction with OCR fallback

use std::sync::Arc;

use crate::recognition::{RecognitionError, TextRecognizer};

/// Turns one page of a file into text
pub struct PageExtractor {
    recognizer: Arc<dyn TextRecognizer>,
    language_hint: String,
    min_text_chars: usize,
}

impl PageExtractor {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, language_hint: &str, min_text_chars: usize) -> Self {
        Self {
            recognizer,
            language_hint: language_hint.to_string(),
            min_text_chars,
        }
    }

    /// Trimmed text of `page`, empty when nothing could be recognized
    ///
    /// Never fails: any service error for this page yields an empty string.
    pub async fn process_page(&self, file_path: &str, page: u32) -> String {
        match self.try_process_page(file_path, page).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(page, "Failed to extract page: {}", e);
                String::new()
            }
        }
    }

    async fn try_process_page(&self, file_path: &str, page: u32) -> Result<String, RecognitionError> {
        let text = self.recognizer.extract_text(file_path, page).await?;

        if !self.is_insufficient(&text) {
            return Ok(text);
        }

        tracing::debug!(
            page,
            chars = text.trim().chars().count(),
            "Text is empty or minimal, attempting OCR"
        );

        let image = match self.recognizer.render_page_image(file_path, page).await? {
            Some(image) => image,
            None => {
                tracing::warn!(page, "Failed to render page image");
                return Ok(String::new());
            }
        };

        let recognized = self.recognizer.ocr(&image, &self.language_hint).await?;
        if recognized.trim().is_empty() {
            tracing::warn!(page, "OCR returned empty text");
            return Ok(String::new());
        }

        tracing::debug!(page, chars = recognized.chars().count(), "OCR succeeded");
        Ok(recognized)
    }

    /// Absent text or fewer trimmed characters than the threshold
    ///
    /// Scanned pages carry no text layer, or only page numbers and artifacts.
    fn is_insufficient(&self, text: &str) -> bool {
        text.trim().chars().count() < self.min_text_chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::mock::ScriptedRecognizer;

    fn extractor(recognizer: Arc<ScriptedRecognizer>) -> PageExtractor {
        PageExtractor::new(recognizer, "ara+eng", 20)
    }

    #[tokio::test]
    async fn test_short_text_falls_back_to_ocr() {
        let recognizer = Arc::new(
            ScriptedRecognizer::new()
                .with_text(3, "12345")
                .with_ocr(3, "Scanned page three"),
        );
        let pages = extractor(recognizer.clone());

        assert_eq!(pages.process_page("/b.pdf", 3).await, "Scanned page three");
        assert_eq!(recognizer.rendered_pages(), vec![3]);
        assert_eq!(
            recognizer.ocr_calls.lock().clone(),
            vec![(3, "ara+eng".to_string())]
        );
    }

    #[tokio::test]
    async fn test_long_text_skips_ocr() {
        let long = "a".repeat(200);
        let recognizer = Arc::new(ScriptedRecognizer::new().with_text(1, &long));
        let pages = extractor(recognizer.clone());

        assert_eq!(pages.process_page("/b.pdf", 1).await, long);
        assert!(recognizer.rendered_pages().is_empty());
        assert!(recognizer.ocr_pages().is_empty());
    }

    #[tokio::test]
    async fn test_threshold_counts_trimmed_characters() {
        let padded = format!("   {}   ", "b".repeat(19));
        let recognizer = Arc::new(ScriptedRecognizer::new().with_text(2, &padded));
        let pages = extractor(recognizer.clone());

        // 19 visible characters are still insufficient; OCR finds nothing either
        assert_eq!(pages.process_page("/b.pdf", 2).await, "");
        assert_eq!(recognizer.ocr_pages(), vec![2]);
    }

    #[tokio::test]
    async fn test_unrenderable_page_is_empty() {
        let recognizer = Arc::new(ScriptedRecognizer::new().with_text(5, " 17 ").unrenderable(5));
        let pages = extractor(recognizer.clone());

        assert_eq!(pages.process_page("/b.pdf", 5).await, "");
        assert_eq!(recognizer.rendered_pages(), vec![5]);
        assert!(recognizer.ocr_pages().is_empty());
    }

    #[tokio::test]
    async fn test_empty_ocr_drops_page_number_noise() {
        let recognizer = Arc::new(ScriptedRecognizer::new().with_text(6, "p. 6"));
        let pages = extractor(recognizer.clone());

        assert_eq!(pages.process_page("/b.pdf", 6).await, "");
        assert_eq!(recognizer.ocr_pages(), vec![6]);
    }

    #[tokio::test]
    async fn test_service_failure_yields_empty_page() {
        let recognizer = Arc::new(ScriptedRecognizer::new().failing(6));
        let pages = extractor(recognizer.clone());

        assert_eq!(pages.process_page("/b.pdf", 6).await, "");
        assert!(recognizer.rendered_pages().is_empty());
    }
}
