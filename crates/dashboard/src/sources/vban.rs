use async_trait::async_trait;
use common::sources::{
    SavedVbanSource, SourceKind, SourceRecord, VbanSource, VbanSourcePatch, VbanUpdateRequest,
};
use common::validation::{validate_port, validate_webhook_url};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::{schedule, SourceCache, SourceContext, SourceManager};
use crate::debounce::Debouncer;
use crate::error::{DashboardError, Result};
use crate::view::{Control, Row, VbanField};

const DETECTED: &str = "VBAN sources";
const SAVED: &str = "saved VBAN sources";

/// Promote the detected source `id` into the saved list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VbanPromotion {
    pub id: String,
    pub webhook_url: String,
}

impl VbanPromotion {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            webhook_url: String::new(),
        }
    }
}

/// Detected VBAN streams (read-only, refreshed on demand) and the saved ones the user
/// promoted for detection. The trait record is the detected source; updates and
/// deletes address saved sources through the shared `vban_{stream}_{ip}_{port}` id.
pub struct VbanManager {
    ctx: SourceContext,
    detected: SourceCache<VbanSource>,
    saved: SourceCache<SavedVbanSource>,
    edits: Debouncer<(String, VbanField)>,
}

impl VbanManager {
    pub fn new(ctx: SourceContext) -> Self {
        let edits = Debouncer::new(ctx.debounce);
        Self {
            ctx,
            detected: SourceCache::default(),
            saved: SourceCache::default(),
            edits,
        }
    }

    pub fn saved(&self) -> &SourceCache<SavedVbanSource> {
        &self.saved
    }

    /// Load both lists concurrently.
    #[instrument(skip_all)]
    pub async fn init(&self) -> Result<()> {
        let (detected, saved) = tokio::join!(self.list(), self.list_saved());
        detected?;
        saved?;
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn list_saved(&self) -> Result<Vec<SavedVbanSource>> {
        let loaded = self
            .ctx
            .load(
                SAVED,
                &Control::SavedVbanList,
                self.ctx.api.list_saved_vban_sources(),
            )
            .await?;
        match loaded {
            Some(sources) => {
                self.saved.replace(sources.clone());
                self.render_saved(&sources);
                self.mark_saved();
                Ok(sources)
            }
            None => Ok(self.saved.all()),
        }
    }

    pub fn render_saved(&self, sources: &[SavedVbanSource]) {
        if sources.is_empty() {
            self.ctx.view.replace_rows(
                &Control::SavedVbanList,
                vec![Row::placeholder("No saved VBAN sources")],
            );
            return;
        }
        self.ctx.view.replace_rows(
            &Control::SavedVbanList,
            sources.iter().map(Self::saved_card).collect(),
        );
        for source in sources {
            self.show_webhook(source);
        }
    }

    /// A keystroke in a saved source's webhook input.
    pub fn edit_webhook_url(self: &Arc<Self>, id: &str, value: String) {
        let patch = VbanSourcePatch {
            webhook_url: Some(value),
            enabled: None,
        };
        schedule(
            self,
            &self.edits,
            (id.to_string(), VbanField::WebhookUrl),
            id.to_string(),
            patch,
        );
    }

    /// Drop a pending webhook commit and show the confirmed value again.
    pub fn discard_webhook_edit(&self, id: &str) -> bool {
        let dropped = self.edits.cancel(&(id.to_string(), VbanField::WebhookUrl));
        if let Some(source) = self.saved.get(id) {
            self.ctx.view.set_value(
                &Control::vban(id, VbanField::WebhookUrl),
                &source.webhook_url,
            );
        }
        dropped
    }

    /// Refresh the detected list every `period` until `shutdown` fires.
    pub fn spawn_refresh(
        self: &Arc<Self>,
        period: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("VBAN refresh stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        // failures are rendered inline
                        let _ = manager.list().await;
                    }
                }
            }
        })
    }

    /// Re-render detected rows so they show whether they are saved.
    fn mark_saved(&self) {
        let detected = self.detected.all();
        if !detected.is_empty() {
            self.render(&detected);
        }
    }

    fn detected_row(&self, source: &VbanSource) -> Row {
        let id = source.record_id();
        let mut text = source.describe();
        if self.saved.get(&id).is_some() {
            text.push_str(" [saved]");
        }
        Row::item(id, text)
    }

    fn saved_card(source: &SavedVbanSource) -> Row {
        let id = source.record_id();
        Row::card(
            id.as_str(),
            format!("{} ({}:{})", source.name, source.ip, source.port),
        )
        .with_text_field(
            Control::vban(id.as_str(), VbanField::WebhookUrl),
            source.webhook_url.as_str(),
        )
        .with_flag_field(Control::vban(id.as_str(), VbanField::Enabled), source.enabled)
        .with_flag_field(Control::ClapIndicator(id.clone()), false)
    }

    fn show_webhook(&self, source: &SavedVbanSource) {
        self.ctx.view.set_visible(
            &Control::vban(source.record_id(), VbanField::WebhookUrl),
            source.enabled,
        );
    }

    fn saved_source(&self, id: &str) -> Result<SavedVbanSource> {
        self.saved
            .get(id)
            .ok_or_else(|| DashboardError::Validation(format!("unknown saved VBAN source {id}")))
    }
}

#[async_trait]
impl SourceManager for VbanManager {
    type Record = VbanSource;
    type Draft = VbanPromotion;
    type Patch = VbanSourcePatch;

    fn kind(&self) -> SourceKind {
        SourceKind::Vban
    }

    fn context(&self) -> &SourceContext {
        &self.ctx
    }

    fn cache(&self) -> &SourceCache<VbanSource> {
        &self.detected
    }

    #[instrument(skip_all)]
    async fn list(&self) -> Result<Vec<VbanSource>> {
        let loaded = self
            .ctx
            .load(DETECTED, &Control::VbanList, self.ctx.api.list_vban_sources())
            .await?;
        match loaded {
            Some(sources) => {
                debug!(count = sources.len(), "VBAN sources detected");
                self.detected.replace(sources.clone());
                self.render(&sources);
                Ok(sources)
            }
            None => Ok(self.detected.all()),
        }
    }

    fn render(&self, sources: &[VbanSource]) {
        let rows = if sources.is_empty() {
            vec![Row::placeholder("No VBAN sources detected")]
        } else {
            sources.iter().map(|s| self.detected_row(s)).collect()
        };
        self.ctx.view.replace_rows(&Control::VbanList, rows);
    }

    /// Returns the detected source that was promoted.
    #[instrument(skip_all, fields(id = %draft.id))]
    async fn add(&self, draft: VbanPromotion) -> Result<VbanSource> {
        let outcome = async {
            let detected = self.detected.get(&draft.id).ok_or_else(|| {
                DashboardError::Validation(format!("unknown VBAN source {}", draft.id))
            })?;
            if self.saved.get(&draft.id).is_some() {
                return Err(DashboardError::Validation(format!(
                    "{} is already saved",
                    detected.name
                )));
            }
            validate_port(detected.port)?;
            let webhook_url = draft.webhook_url.trim();
            if !webhook_url.is_empty() {
                validate_webhook_url(webhook_url)?;
            }

            let saved = detected.to_saved(webhook_url);
            self.ctx.api.save_vban_source(&saved).await?;
            info!(name = %saved.name, ip = %saved.ip, "VBAN source saved");
            self.saved.push(saved.clone());
            self.ctx
                .view
                .append_row(&Control::SavedVbanList, Self::saved_card(&saved));
            self.show_webhook(&saved);
            self.mark_saved();
            Ok::<_, DashboardError>(detected)
        }
        .await;
        self.ctx
            .report(outcome, "VBAN source saved", "Failed to save VBAN source")
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn update(&self, id: &str, patch: VbanSourcePatch) -> Result<()> {
        let outcome = async {
            let source = self.saved_source(id)?;
            if let Some(url) = patch.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
                validate_webhook_url(url)?;
            }
            let request = VbanUpdateRequest {
                key: source.key(),
                patch: patch.clone(),
            };
            self.ctx.api.update_vban_source(&request).await
        }
        .await;

        match &outcome {
            Ok(()) => {
                if let Some(source) = self.saved.modify(id, |source| source.apply(&patch)) {
                    self.show_webhook(&source);
                }
            }
            Err(_) => {
                if let (Some(_), Some(confirmed)) = (patch.enabled, self.saved.get(id)) {
                    self.ctx.view.set_checked(
                        &Control::vban(id, VbanField::Enabled),
                        confirmed.enabled,
                    );
                }
            }
        }
        self.ctx
            .report(outcome, "VBAN source updated", "Failed to update VBAN source")
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn delete(&self, id: &str) -> Result<()> {
        let source = match self.saved_source(id) {
            Ok(source) => source,
            Err(err) => {
                return self
                    .ctx
                    .report(Err(err), "VBAN source removed", "Failed to remove VBAN source")
            }
        };
        if !self
            .ctx
            .view
            .confirm(&format!("Remove VBAN source \"{}\"?", source.name))
        {
            return Err(DashboardError::Cancelled);
        }

        let outcome = self.ctx.api.remove_vban_source(&source.key()).await;
        if outcome.is_ok() {
            self.saved.remove(id);
            self.ctx.view.remove_row(&Control::SavedVbanList, id);
            if self.saved.is_empty() {
                self.render_saved(&[]);
            }
            self.mark_saved();
        }
        self.ctx
            .report(outcome, "VBAN source removed", "Failed to remove VBAN source")
    }
}
