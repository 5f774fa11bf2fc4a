//! Debounced persistence of edited pages
//!
//! A worker task watches the store's edit revisions. Once edits stop for the
//! full debounce window (and editing is enabled) it saves every dirty page.
//! An immediate save cancels a pending debounce. Saves never overlap.
//!
//! Failures are tracked per page: pages the gateway confirmed are marked
//! clean, the rest stay dirty for the next attempt, and the status becomes
//! `Error` with the first failure retained.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use super::status::{SaveOutcome, SaveState, SaveStatus};
use crate::config::AutosaveConfig;
use crate::db::PersistenceGateway;
use crate::document::PageStore;
use crate::error::{AppError, Result};

struct Inner {
    store: PageStore,
    gateway: Arc<dyn PersistenceGateway>,
    config: AutosaveConfig,
    state: watch::Sender<SaveState>,
    enabled: AtomicBool,
    /// Bumped on every successful save so a stale idle reset is ignored
    generation: AtomicU64,
    save_lock: tokio::sync::Mutex<()>,
    flush: Notify,
}

pub struct SaveReconciler {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SaveReconciler {
    pub fn new(store: PageStore, gateway: Arc<dyn PersistenceGateway>, config: AutosaveConfig) -> Self {
        let (state, _) = watch::channel(SaveState::default());
        Self {
            inner: Arc::new(Inner {
                store,
                gateway,
                config,
                state,
                enabled: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                save_lock: tokio::sync::Mutex::new(()),
                flush: Notify::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Spawn the debounce worker; no-op if it is already running
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let inner = self.inner.clone();
        let edits = inner.store.subscribe_edits();
        *worker = Some(tokio::spawn(async move { inner.run_worker(edits).await }));
    }

    /// Stop auto-saving; a pending debounce never fires and the status is idle
    pub fn cancel(&self) {
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
            tracing::debug!(
                document_id = self.inner.store.document_id(),
                "Auto-save worker stopped"
            );
        }
        self.inner.state.send_if_modified(|s| {
            let changed = s.status != SaveStatus::Idle;
            s.status = SaveStatus::Idle;
            changed
        });
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Acquire)
    }

    /// Toggle auto-save
    ///
    /// Turning it off with unsaved edits saves right away. Turning it on with
    /// unsaved edits starts a fresh debounce window for them.
    pub async fn set_enabled(&self, enabled: bool) -> Result<SaveOutcome> {
        let was_enabled = self.inner.enabled.swap(enabled, Ordering::AcqRel);
        if was_enabled == enabled || !self.inner.store.has_dirty() {
            return Ok(SaveOutcome::Skipped);
        }
        if enabled {
            self.inner.store.notify_edits();
            return Ok(SaveOutcome::Skipped);
        }
        self.save_now().await
    }

    /// Save all dirty pages now, cancelling any pending debounce
    pub async fn save_now(&self) -> Result<SaveOutcome> {
        self.inner.flush.notify_waiters();
        self.inner.save().await
    }

    /// Re-attempt the current dirty set after a failure
    pub async fn retry(&self) -> Result<SaveOutcome> {
        tracing::info!(
            document_id = self.inner.store.document_id(),
            "Retrying save"
        );
        self.save_now().await
    }

    pub fn state(&self) -> SaveState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SaveState> {
        self.inner.state.subscribe()
    }
}

impl Drop for SaveReconciler {
    fn drop(&mut self) {
        if let Some(handle) = self.worker.get_mut().take() {
            handle.abort();
        }
    }
}

impl Inner {
    async fn run_worker(self: Arc<Self>, mut edits: watch::Receiver<u64>) {
        let debounce = self.config.debounce();

        loop {
            if edits.changed().await.is_err() {
                return;
            }

            // Restart the window on every edit until the editor goes quiet
            let quiet = loop {
                tokio::select! {
                    changed = timeout(debounce, edits.changed()) => match changed {
                        Ok(Ok(())) => continue,
                        Ok(Err(_)) => return,
                        Err(_) => break true,
                    },
                    _ = self.flush.notified() => break false,
                }
            };

            if !quiet {
                tracing::debug!("Pending auto-save superseded by immediate save");
                continue;
            }
            if !self.enabled.load(Ordering::Acquire) {
                tracing::debug!("Editing disabled, skipping auto-save");
                continue;
            }

            if let Err(e) = self.save().await {
                tracing::warn!("Auto-save failed: {}", e);
            }
        }
    }

    async fn save(self: &Arc<Self>) -> Result<SaveOutcome> {
        let _guard = self.save_lock.lock().await;

        let dirty = self.store.dirty_pages();
        if dirty.is_empty() {
            return Ok(SaveOutcome::Skipped);
        }

        let document_id = self.store.document_id();
        self.state.send_modify(|s| s.status = SaveStatus::Saving);
        tracing::debug!(document_id, pages = dirty.len(), "Saving edited pages");

        let attempted = dirty.len();
        let mut persisted = Vec::with_capacity(attempted);
        let mut first_error = None;

        for page in dirty {
            match self
                .gateway
                .upsert_page_content(document_id, page.page_number, &page.content)
                .await
            {
                Ok(()) => persisted.push(page),
                Err(e) => {
                    tracing::warn!(document_id, page = page.page_number, "Failed to save page: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        self.store.mark_persisted(&persisted);

        if let Some(e) = first_error {
            let failed = attempted - persisted.len();
            let summary = AppError::Save(format!("{} of {} pages failed: {}", failed, attempted, e));
            self.state.send_modify(|s| {
                s.status = SaveStatus::Error;
                s.error = Some(Arc::new(e));
            });
            return Err(summary);
        }

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.state.send_modify(|s| {
            s.status = SaveStatus::Saved;
            s.last_saved = Some(Utc::now());
            s.error = None;
        });
        tracing::info!(document_id, pages = persisted.len(), "Saved edited pages");

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(inner.config.saved_display()).await;
            inner.state.send_if_modified(|s| {
                let current = inner.generation.load(Ordering::Acquire) == generation;
                if current && s.status == SaveStatus::Saved {
                    s.status = SaveStatus::Idle;
                    return true;
                }
                false
            });
        });

        Ok(SaveOutcome::Saved {
            pages: persisted.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock::MemoryGateway;
    use std::time::Duration;
    use tokio::time::sleep;

    fn reconciler(pages: u32) -> (SaveReconciler, PageStore, Arc<MemoryGateway>) {
        let store = PageStore::new(1, pages);
        let gateway = Arc::new(MemoryGateway::new());
        let reconciler = SaveReconciler::new(store.clone(), gateway.clone(), AutosaveConfig::default());
        (reconciler, store, gateway)
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_edits_coalesce_into_one_save() {
        let (reconciler, store, gateway) = reconciler(10);
        reconciler.set_enabled(true).await.unwrap();
        reconciler.start();

        for i in 1..=5 {
            store.edit(3, format!("draft {}", i)).unwrap();
            sleep(Duration::from_millis(300)).await;
        }
        assert!(gateway.calls().is_empty());

        sleep(Duration::from_secs(3)).await;
        assert_eq!(gateway.calls(), vec![(3, "draft 5".to_string())]);
        assert!(!store.get(3).unwrap().is_edited);
    }

    #[tokio::test(start_paused = true)]
    async fn test_saved_returns_to_idle_after_display_window() {
        let (reconciler, store, _gateway) = reconciler(5);
        store.edit(1, "text").unwrap();

        let outcome = reconciler.save_now().await.unwrap();
        assert_eq!(outcome, SaveOutcome::Saved { pages: 1 });
        let state = reconciler.state();
        assert_eq!(state.status, SaveStatus::Saved);
        assert!(state.last_saved.is_some());

        sleep(Duration::from_millis(1900)).await;
        assert_eq!(reconciler.state().status, SaveStatus::Saved);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(reconciler.state().status, SaveStatus::Idle);
        assert!(reconciler.state().last_saved.is_some());
    }

    #[tokio::test]
    async fn test_nothing_dirty_is_a_no_op() {
        let (reconciler, _store, gateway) = reconciler(5);
        let rx = reconciler.subscribe();

        assert_eq!(reconciler.save_now().await.unwrap(), SaveOutcome::Skipped);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(reconciler.state().status, SaveStatus::Idle);
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failure_keeps_edits_and_retry_resends() {
        let (reconciler, store, gateway) = reconciler(5);
        gateway.fail_page(2);
        store.edit(1, "one").unwrap();
        store.edit(2, "two").unwrap();

        let err = reconciler.save_now().await.unwrap_err();
        assert!(matches!(err, AppError::Save(_)));

        let state = reconciler.state();
        assert_eq!(state.status, SaveStatus::Error);
        assert!(state.error_message().unwrap().contains("page 2"));
        assert!(!store.get(1).unwrap().is_edited);
        assert!(store.get(2).unwrap().is_edited);

        gateway.heal_page(2);
        assert_eq!(
            reconciler.retry().await.unwrap(),
            SaveOutcome::Saved { pages: 1 }
        );
        assert_eq!(
            gateway.calls(),
            vec![
                (1, "one".to_string()),
                (2, "two".to_string()),
                (2, "two".to_string()),
            ]
        );
        assert!(!store.has_dirty());
        let state = reconciler.state();
        assert_eq!(state.status, SaveStatus::Saved);
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_save_cancels_pending_debounce() {
        let (reconciler, store, gateway) = reconciler(5);
        reconciler.set_enabled(true).await.unwrap();
        reconciler.start();

        store.edit(4, "quick").unwrap();
        sleep(Duration::from_millis(500)).await;
        reconciler.save_now().await.unwrap();
        let mut rx = reconciler.subscribe();

        sleep(Duration::from_secs(5)).await;
        assert_eq!(gateway.calls().len(), 1);
        // Only the cosmetic Saved -> Idle reset happened
        assert_eq!(rx.borrow_and_update().status, SaveStatus::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_editing_never_auto_saves() {
        let (reconciler, store, gateway) = reconciler(5);
        reconciler.start();

        store.edit(2, "not in edit mode").unwrap();
        sleep(Duration::from_secs(5)).await;

        assert!(gateway.calls().is_empty());
        assert!(store.get(2).unwrap().is_edited);
    }

    #[tokio::test]
    async fn test_leaving_edit_mode_saves_immediately() {
        let (reconciler, store, gateway) = reconciler(5);
        reconciler.set_enabled(true).await.unwrap();
        store.edit(5, "last words").unwrap();

        let outcome = reconciler.set_enabled(false).await.unwrap();
        assert_eq!(outcome, SaveOutcome::Saved { pages: 1 });
        assert_eq!(gateway.saved_content(1, 5).as_deref(), Some("last words"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_save() {
        let (reconciler, store, gateway) = reconciler(5);
        reconciler.set_enabled(true).await.unwrap();
        reconciler.start();

        store.edit(1, "unsaved").unwrap();
        sleep(Duration::from_millis(500)).await;
        reconciler.cancel();
        sleep(Duration::from_secs(5)).await;

        assert!(gateway.calls().is_empty());
        assert!(store.has_dirty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_entering_edit_mode_schedules_earlier_edits() {
        let (reconciler, store, gateway) = reconciler(5);
        reconciler.start();

        store.edit(2, "typed before edit mode").unwrap();
        sleep(Duration::from_secs(5)).await;
        assert!(gateway.calls().is_empty());

        assert_eq!(reconciler.set_enabled(true).await.unwrap(), SaveOutcome::Skipped);
        sleep(Duration::from_secs(1)).await;
        assert!(gateway.calls().is_empty());

        sleep(Duration::from_secs(2)).await;
        assert_eq!(gateway.calls(), vec![(2, "typed before edit mode".to_string())]);
        assert!(!store.has_dirty());
    }

    #[tokio::test]
    async fn test_cancel_returns_status_to_idle() {
        let (reconciler, store, gateway) = reconciler(5);
        reconciler.start();
        gateway.fail_page(1);
        store.edit(1, "will not persist").unwrap();

        reconciler.save_now().await.unwrap_err();
        assert_eq!(reconciler.state().status, SaveStatus::Error);

        reconciler.cancel();
        assert_eq!(reconciler.state().status, SaveStatus::Idle);
        assert!(store.has_dirty());
    }
}
