//! Managers for the three kinds of audio source.
//!
//! Every manager owns a [`SourceCache`] of the records it last fetched, renders them
//! into one view container, and commits edits through the detection server. Text
//! edits go through a per-field [`Debouncer`]; toggles commit at once and revert on
//! failure.

pub mod microphone;
pub mod rtsp;
pub mod vban;

use async_trait::async_trait;
use common::api::WebhookTestRequest;
use common::sources::{SourceKind, SourceRecord};
use common::validation::validate_webhook_url;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

use crate::client::DetectionApi;
use crate::debounce::Debouncer;
use crate::error::{DashboardError, Result};
use crate::sequence::RequestSequencer;
use crate::view::{Control, Notification, Row, View};

pub use microphone::MicrophoneManager;
pub use rtsp::RtspManager;
pub use vban::VbanManager;

/// Collaborators shared by every source manager.
#[derive(Clone)]
pub struct SourceContext {
    pub api: Arc<dyn DetectionApi>,
    pub view: Arc<dyn View>,
    pub sequencer: Arc<RequestSequencer>,
    pub debounce: Duration,
}

impl SourceContext {
    pub fn new(api: Arc<dyn DetectionApi>, view: Arc<dyn View>, debounce: Duration) -> Self {
        Self {
            api,
            view,
            sequencer: Arc::new(RequestSequencer::new()),
            debounce,
        }
    }

    /// Fetch a list for `container`, showing a loading row meanwhile and an inline
    /// error row on failure. Returns `None` when a newer refresh already completed.
    pub(crate) async fn load<R, F>(
        &self,
        resource: &'static str,
        container: &Control,
        fetch: F,
    ) -> Result<Option<Vec<R>>>
    where
        R: Send,
        F: Future<Output = Result<Vec<R>>> + Send,
    {
        let ticket = self.sequencer.begin(resource);
        self.view
            .replace_rows(container, vec![Row::loading(format!("Loading {resource}..."))]);

        let fetched = fetch.await;
        if !self.sequencer.complete(resource, ticket) {
            debug!(resource, ticket, "stale list response dropped");
            return Ok(None);
        }

        match fetched {
            Ok(records) => Ok(Some(records)),
            Err(err) => {
                warn!(resource, error = %err, "failed to load sources");
                self.view.replace_rows(
                    container,
                    vec![Row::error(format!("Failed to load {resource}: {err}"))],
                );
                Err(err)
            }
        }
    }

    /// Notify the outcome of an action; errors are passed through.
    pub(crate) fn report<T>(&self, outcome: Result<T>, success: &str, failure: &str) -> Result<T> {
        match &outcome {
            Ok(_) => self.view.notify(Notification::success(success)),
            Err(DashboardError::Cancelled) => {}
            Err(err) => self
                .view
                .notify(Notification::error(format!("{failure}: {err}"))),
        }
        outcome
    }
}

/// Records of one source kind as last confirmed by the server.
#[derive(Debug)]
pub struct SourceCache<R> {
    records: RwLock<Vec<R>>,
    loaded: AtomicBool,
}

impl<R> Default for SourceCache<R> {
    fn default() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            loaded: AtomicBool::new(false),
        }
    }
}

impl<R: SourceRecord> SourceCache<R> {
    pub fn all(&self) -> Vec<R> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, id: &str) -> Option<R> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|record| record.record_id() == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn replace(&self, records: Vec<R>) {
        *self.records.write().unwrap_or_else(PoisonError::into_inner) = records;
        self.loaded.store(true, Ordering::SeqCst);
    }

    /// Whether a full list was received from the server at least once.
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// All records, or `None` before the first full list arrived.
    pub fn snapshot(&self) -> Option<Vec<R>> {
        self.is_loaded().then(|| self.all())
    }

    pub fn push(&self, record: R) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Apply `change` to the record `id`; returns the updated record.
    pub fn modify(&self, id: &str, change: impl FnOnce(&mut R)) -> Option<R> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let record = records.iter_mut().find(|record| record.record_id() == id)?;
        change(record);
        Some(record.clone())
    }

    pub fn remove(&self, id: &str) -> Option<R> {
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        let position = records.iter().position(|record| record.record_id() == id)?;
        Some(records.remove(position))
    }
}

/// Operations shared by the microphone, RTSP and VBAN managers.
#[async_trait]
pub trait SourceManager: Send + Sync {
    type Record: SourceRecord;
    type Draft: Send + 'static;
    type Patch: Send + 'static;

    fn kind(&self) -> SourceKind;

    fn context(&self) -> &SourceContext;

    fn cache(&self) -> &SourceCache<Self::Record>;

    /// Fetch the records from the server and render them.
    async fn list(&self) -> Result<Vec<Self::Record>>;

    /// Clear the container and show `records`, or a placeholder when there are none.
    fn render(&self, records: &[Self::Record]);

    async fn add(&self, _draft: Self::Draft) -> Result<Self::Record> {
        Err(DashboardError::Unsupported(format!(
            "{} sources cannot be added",
            self.kind()
        )))
    }

    /// Commit `patch` for record `id` immediately.
    async fn update(&self, id: &str, patch: Self::Patch) -> Result<()>;

    async fn delete(&self, _id: &str) -> Result<()> {
        Err(DashboardError::Unsupported(format!(
            "{} sources cannot be deleted",
            self.kind()
        )))
    }

    /// Fire one test call at `url`; no retry.
    async fn test_webhook(&self, url: &str) -> Result<()> {
        let outcome = match validate_webhook_url(url) {
            Ok(_) => {
                let request = WebhookTestRequest::new(self.kind(), url.trim());
                self.context().api.test_webhook(&request).await
            }
            Err(err) => Err(err.into()),
        };
        self.context()
            .report(outcome, "Webhook test succeeded", "Webhook test failed")
    }
}

/// Schedule `manager.update(id, patch)` after the debounce delay, superseding any
/// commit pending for the same `field`.
pub(crate) fn schedule<M, K>(
    manager: &Arc<M>,
    debouncer: &Debouncer<K>,
    field: K,
    id: String,
    patch: M::Patch,
) where
    M: SourceManager + 'static,
    K: Eq + std::hash::Hash + Clone + Send + std::fmt::Debug + 'static,
{
    let manager = Arc::clone(manager);
    debouncer.arm(field, async move {
        // failures are already reported to the view
        let _ = manager.update(&id, patch).await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::rtsp;
    use common::sources::RtspSource;

    #[test]
    fn test_cache_modify_and_remove() {
        let cache: SourceCache<RtspSource> = SourceCache::default();
        cache.replace(vec![rtsp("r1", "Door"), rtsp("r2", "Yard")]);

        let updated = cache.modify("r2", |s| s.enabled = true).unwrap();
        assert!(updated.enabled);
        assert!(cache.get("r2").unwrap().enabled);
        assert!(cache.modify("r9", |s| s.enabled = true).is_none());

        assert_eq!(cache.remove("r1").unwrap().name, "Door");
        assert_eq!(cache.len(), 1);
        assert!(cache.remove("r1").is_none());
    }

    #[test]
    fn test_cache_snapshot_waits_for_first_list() {
        let cache: SourceCache<RtspSource> = SourceCache::default();
        cache.push(rtsp("r1", "Door"));
        assert!(cache.snapshot().is_none());

        cache.replace(Vec::new());
        assert_eq!(cache.snapshot(), Some(Vec::new()));
    }
}
