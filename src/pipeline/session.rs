//! Extraction session: one active run per open document
//!
//! Owns the run guard, the per-run cancellation token and the progress
//! channel. Starting while a run is active is ignored. Cancelling flips the
//! token and waits out any in-flight store write, so nothing from the old run
//! lands afterwards.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::cancel::CancellationToken;
use super::extractor::{ExtractionOutcome, Extractor};
use crate::document::{Document, ExtractionPhase, ExtractionProgress, PageStore};
use crate::error::AppError;

struct ActiveRun {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct ExtractionSession {
    extractor: Arc<Extractor>,
    document: Document,
    store: PageStore,
    progress: Arc<watch::Sender<ExtractionProgress>>,
    running: Arc<AtomicBool>,
    active: Mutex<Option<ActiveRun>>,
    /// Bumped by every external cancel, under the `active` lock
    cancels: AtomicU64,
    last_error: Arc<RwLock<Option<Arc<AppError>>>>,
}

impl ExtractionSession {
    pub fn new(extractor: Arc<Extractor>, document: Document, store: PageStore) -> Self {
        let (progress, _) = watch::channel(ExtractionProgress::new(document.page_count));
        Self {
            extractor,
            document,
            store,
            progress: Arc::new(progress),
            running: Arc::new(AtomicBool::new(false)),
            active: Mutex::new(None),
            cancels: AtomicU64::new(0),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Spawn an extraction run; returns `false` if one is already active
    pub fn start(&self) -> bool {
        self.start_run(None)
    }

    /// Start unless a cancel happened since `epoch` was read
    fn start_run(&self, epoch: Option<u64>) -> bool {
        let mut active = self.active.lock();
        if epoch.is_some_and(|epoch| self.cancels.load(Ordering::Acquire) != epoch) {
            tracing::debug!(
                document_id = self.document.id,
                "Session cancelled during restart, not starting"
            );
            return false;
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(
                document_id = self.document.id,
                "Extraction already running, ignoring start"
            );
            return false;
        }

        let token = CancellationToken::new();
        *self.last_error.write() = None;

        let extractor = self.extractor.clone();
        let document = self.document.clone();
        let store = self.store.clone();
        let progress = self.progress.clone();
        let running = self.running.clone();
        let last_error = self.last_error.clone();
        let run_token = token.clone();

        let handle = tokio::spawn(async move {
            let work = {
                let (document, store, progress) = (document.clone(), store.clone(), progress.clone());
                tokio::spawn(async move {
                    extractor.run(&document, &store, &progress, &run_token).await
                })
            };

            let result = match work.await {
                Ok(result) => result,
                Err(e) => Err(AppError::Extraction(format!("extraction task failed: {}", e))),
            };

            match result {
                Ok(ExtractionOutcome::Completed) | Ok(ExtractionOutcome::Cancelled) => {}
                Err(e) => {
                    tracing::error!(document_id = document.id, "Extraction failed: {}", e);
                    *last_error.write() = Some(Arc::new(e));
                    progress.send_modify(|p| p.phase = ExtractionPhase::Failed);
                }
            }

            running.store(false, Ordering::Release);
        });

        *active = Some(ActiveRun { token, handle });
        true
    }

    /// Stop the active run at the next page boundary
    ///
    /// Once this returns, the old run can no longer write to the store and a
    /// pending [`ExtractionSession::retry`] will not start a new one.
    pub fn cancel(&self) {
        let token = {
            let active = self.active.lock();
            self.cancels.fetch_add(1, Ordering::AcqRel);
            active.as_ref().map(|run| run.token.clone())
        };
        self.stop_token(token);
    }

    fn stop_token(&self, token: Option<CancellationToken>) {
        if let Some(token) = token {
            token.cancel();
            self.store.barrier();
        }
    }

    /// Full restart from page 1
    ///
    /// Extraction output and progress are dropped; editor-owned pages stay.
    pub async fn retry(&self) -> bool {
        let (epoch, previous) = {
            let mut active = self.active.lock();
            (self.cancels.load(Ordering::Acquire), active.take())
        };

        if let Some(run) = previous {
            self.stop_token(Some(run.token.clone()));
            if let Err(e) = run.handle.await {
                tracing::warn!(document_id = self.document.id, "Previous run ended abnormally: {}", e);
            }
        }

        if self.cancels.load(Ordering::Acquire) != epoch {
            tracing::debug!(document_id = self.document.id, "Retry abandoned after cancel");
            return false;
        }

        let discarded = self.store.discard_extracted();
        tracing::info!(
            document_id = self.document.id,
            discarded,
            "Retrying extraction from page 1"
        );
        self.progress
            .send_replace(ExtractionProgress::new(self.document.page_count));

        self.start_run(Some(epoch))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn progress(&self) -> ExtractionProgress {
        *self.progress.borrow()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ExtractionProgress> {
        self.progress.subscribe()
    }

    pub fn is_complete(&self) -> bool {
        self.progress.borrow().is_complete()
    }

    pub fn last_error(&self) -> Option<Arc<AppError>> {
        self.last_error.read().clone()
    }
}

impl Drop for ExtractionSession {
    fn drop(&mut self) {
        if let Some(run) = self.active.get_mut().as_ref() {
            run.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::recognition::mock::ScriptedRecognizer;

    fn session(recognizer: ScriptedRecognizer, pages: u32) -> (ExtractionSession, PageStore) {
        let document = Document {
            id: 9,
            title: "Session Book".to_string(),
            author: Some("Author".to_string()),
            page_count: pages,
            file_path: "/books/session.pdf".to_string(),
        };
        let store = PageStore::new(document.id, pages);
        let extractor = Arc::new(Extractor::new(
            Arc::new(recognizer),
            &ExtractionConfig::default(),
            "ara+eng",
        ));
        (ExtractionSession::new(extractor, document, store.clone()), store)
    }

    async fn wait_until_idle(session: &ExtractionSession) {
        let mut rx = session.subscribe_progress();
        let _ = rx
            .wait_for(|p| {
                matches!(
                    p.phase,
                    ExtractionPhase::Complete | ExtractionPhase::Cancelled | ExtractionPhase::Failed
                )
            })
            .await;
        while session.is_running() {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_run_to_completion() {
        let (session, store) = session(ScriptedRecognizer::new(), 23);
        assert!(session.start());
        wait_until_idle(&session).await;

        assert!(session.is_complete());
        assert_eq!(store.page_numbers(), (1..=23).collect::<Vec<_>>());
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn test_second_start_is_ignored_while_running() {
        let (recognizer, gate) = ScriptedRecognizer::new().gated(2);
        let (session, _store) = session(recognizer, 4);

        assert!(session.start());
        gate.entered.notified().await;
        assert!(!session.start());
        assert!(session.is_running());

        gate.release.notify_one();
        wait_until_idle(&session).await;
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn test_cancel_blocks_late_page() {
        let (recognizer, gate) = ScriptedRecognizer::new().gated(3);
        let (session, store) = session(recognizer, 30);

        session.start();
        gate.entered.notified().await;
        session.cancel();
        gate.release.notify_one();
        wait_until_idle(&session).await;

        assert_eq!(store.page_numbers(), vec![1, 2]);
        assert!(!session.is_complete());
        assert_eq!(session.progress().phase, ExtractionPhase::Cancelled);
    }

    #[tokio::test]
    async fn test_retry_reproduces_first_run() {
        let recognizer = ScriptedRecognizer::new()
            .with_text(3, "")
            .with_ocr(3, "Scanned three")
            .failing(12);
        let (session, store) = session(recognizer, 17);

        session.start();
        wait_until_idle(&session).await;
        let first = store.snapshot();

        assert!(session.retry().await);
        wait_until_idle(&session).await;

        assert_eq!(store.snapshot(), first);
        assert!(session.is_complete());
    }

    #[tokio::test]
    async fn test_retry_mid_run_keeps_edits() {
        let (recognizer, gate) = ScriptedRecognizer::new().gated(5);
        let (session, store) = session(recognizer, 8);

        session.start();
        gate.entered.notified().await;
        store.edit(2, "typed while extracting").unwrap();

        // Retry cancels the gated run; release it so the old task can finish
        let release = gate.release.clone();
        let retry = async {
            tokio::task::yield_now().await;
            release.notify_one();
        };
        let (restarted, _) = tokio::join!(session.retry(), retry);
        assert!(restarted);

        // The second run stops at the same gate
        gate.release.notify_one();
        wait_until_idle(&session).await;

        assert_eq!(store.len(), 8);
        assert_eq!(store.get(2).unwrap().content, "typed while extracting");
        assert!(store.get(2).unwrap().is_edited);
    }

    #[tokio::test]
    async fn test_cancel_during_retry_prevents_restart() {
        let (recognizer, gate) = ScriptedRecognizer::new().gated(3);
        let (session, store) = session(recognizer, 12);

        session.start();
        gate.entered.notified().await;

        // Cancel lands while retry is still waiting for the old run
        let release = gate.release.clone();
        let cancel = async {
            tokio::task::yield_now().await;
            session.cancel();
            release.notify_one();
        };
        let (restarted, _) = tokio::join!(session.retry(), cancel);

        assert!(!restarted);
        assert!(!session.is_running());
        assert_eq!(session.progress().phase, ExtractionPhase::Cancelled);
        assert_eq!(store.page_numbers(), vec![1, 2]);

        // A later retry starts normally
        gate.release.notify_one();
        assert!(session.retry().await);
        wait_until_idle(&session).await;
        assert!(session.is_complete());
        assert_eq!(store.len(), 12);
    }
}
