//! Scripted recognizer for pipeline tests

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use super::provider::TextRecognizer;
use super::types::{DocumentMetadata, RecognitionError};

/// Pauses `extract_text` for one page until released
#[derive(Clone, Default)]
pub struct PageGate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

/// Deterministic recognizer: digital text unless scripted otherwise
#[derive(Default)]
pub struct ScriptedRecognizer {
    texts: HashMap<u32, String>,
    ocr_texts: HashMap<u32, String>,
    failing: HashSet<u32>,
    unrenderable: HashSet<u32>,
    gates: HashMap<u32, PageGate>,
    metadata: Option<DocumentMetadata>,
    pub extract_calls: Mutex<Vec<u32>>,
    pub render_calls: Mutex<Vec<u32>>,
    pub ocr_calls: Mutex<Vec<(u32, String)>>,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn digital_text(page: u32) -> String {
        format!("Digital text layer of page {} with plenty of characters", page)
    }

    pub fn with_text(mut self, page: u32, text: &str) -> Self {
        self.texts.insert(page, text.to_string());
        self
    }

    pub fn with_ocr(mut self, page: u32, text: &str) -> Self {
        self.ocr_texts.insert(page, text.to_string());
        self
    }

    pub fn failing(mut self, page: u32) -> Self {
        self.failing.insert(page);
        self
    }

    pub fn unrenderable(mut self, page: u32) -> Self {
        self.unrenderable.insert(page);
        self
    }

    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn gated(mut self, page: u32) -> (Self, PageGate) {
        let gate = PageGate::default();
        self.gates.insert(page, gate.clone());
        (self, gate)
    }

    pub fn extracted_pages(&self) -> Vec<u32> {
        self.extract_calls.lock().clone()
    }

    pub fn rendered_pages(&self) -> Vec<u32> {
        self.render_calls.lock().clone()
    }

    pub fn ocr_pages(&self) -> Vec<u32> {
        self.ocr_calls.lock().iter().map(|(page, _)| *page).collect()
    }
}

#[async_trait]
impl TextRecognizer for ScriptedRecognizer {
    async fn is_healthy(&self) -> bool {
        true
    }

    async fn extract_text(&self, _file_path: &str, page: u32) -> Result<String, RecognitionError> {
        self.extract_calls.lock().push(page);

        if let Some(gate) = self.gates.get(&page) {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        if self.failing.contains(&page) {
            return Err(RecognitionError::Unavailable("connection refused".to_string()));
        }

        Ok(self
            .texts
            .get(&page)
            .cloned()
            .unwrap_or_else(|| Self::digital_text(page)))
    }

    async fn render_page_image(
        &self,
        _file_path: &str,
        page: u32,
    ) -> Result<Option<Vec<u8>>, RecognitionError> {
        self.render_calls.lock().push(page);
        if self.unrenderable.contains(&page) {
            return Ok(None);
        }
        Ok(Some(page.to_be_bytes().to_vec()))
    }

    async fn ocr(&self, image: &[u8], language_hint: &str) -> Result<String, RecognitionError> {
        let bytes: [u8; 4] = image
            .try_into()
            .map_err(|_| RecognitionError::InvalidResponse("unexpected image".to_string()))?;
        let page = u32::from_be_bytes(bytes);
        self.ocr_calls.lock().push((page, language_hint.to_string()));
        Ok(self.ocr_texts.get(&page).cloned().unwrap_or_default())
    }

    async fn get_metadata(&self, _file_path: &str) -> Result<DocumentMetadata, RecognitionError> {
        self.metadata
            .clone()
            .ok_or_else(|| RecognitionError::Unavailable("no metadata scripted".to_string()))
    }
}
