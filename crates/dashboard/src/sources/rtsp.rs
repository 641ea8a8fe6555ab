use async_trait::async_trait;
use common::sources::{NewRtspSource, RtspSource, RtspSourcePatch, SourceKind};
use common::validation::{
    validate_id, validate_name, validate_non_empty, validate_uri, validate_webhook_url,
};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{schedule, SourceCache, SourceContext, SourceManager};
use crate::debounce::Debouncer;
use crate::error::{DashboardError, Result};
use crate::view::{Control, Row, RtspField};

const RESOURCE: &str = "RTSP sources";
const ID_FIELD: &str = "RTSP source id";

pub struct RtspManager {
    ctx: SourceContext,
    cache: SourceCache<RtspSource>,
    edits: Debouncer<(String, RtspField)>,
}

impl RtspManager {
    pub fn new(ctx: SourceContext) -> Self {
        let edits = Debouncer::new(ctx.debounce);
        Self {
            ctx,
            cache: SourceCache::default(),
            edits,
        }
    }

    /// A keystroke in one of the card's text fields. The commit is debounced per
    /// field; a toggle of the enabled box goes through [`SourceManager::update`].
    pub fn edit_field(self: &Arc<Self>, id: &str, field: RtspField, value: String) {
        let patch = match field {
            RtspField::Name => RtspSourcePatch {
                name: Some(value),
                ..Default::default()
            },
            RtspField::Url => RtspSourcePatch {
                url: Some(value),
                ..Default::default()
            },
            RtspField::WebhookUrl => RtspSourcePatch {
                webhook_url: Some(value),
                ..Default::default()
            },
            RtspField::Enabled => return,
        };
        schedule(self, &self.edits, (id.to_string(), field), id.to_string(), patch);
    }

    /// The field lost focus or was cleared: drop its pending commit and show the
    /// confirmed value again.
    pub fn discard_edit(&self, id: &str, field: RtspField) -> bool {
        let dropped = self.edits.cancel(&(id.to_string(), field));
        if let Some(source) = self.cache.get(id) {
            let confirmed = match field {
                RtspField::Name => source.name,
                RtspField::Url => source.url,
                RtspField::WebhookUrl => source.webhook_url,
                RtspField::Enabled => return dropped,
            };
            self.ctx.view.set_value(&Control::rtsp(id, field), &confirmed);
        }
        dropped
    }

    pub fn has_pending_edits(&self) -> bool {
        self.edits.pending_count() > 0
    }

    fn card(source: &RtspSource) -> Row {
        let id = source.id.as_str();
        Row::card(id, source.name.as_str())
            .with_text_field(Control::rtsp(id, RtspField::Name), source.name.as_str())
            .with_text_field(Control::rtsp(id, RtspField::Url), source.url.as_str())
            .with_text_field(
                Control::rtsp(id, RtspField::WebhookUrl),
                source.webhook_url.as_str(),
            )
            .with_flag_field(Control::rtsp(id, RtspField::Enabled), source.enabled)
            .with_flag_field(Control::ClapIndicator(source.id.clone()), false)
    }

    fn show_webhook(&self, source: &RtspSource) {
        self.ctx.view.set_visible(
            &Control::rtsp(source.id.as_str(), RtspField::WebhookUrl),
            source.enabled,
        );
    }

    fn check_patch(patch: &RtspSourcePatch) -> Result<()> {
        if let Some(name) = &patch.name {
            validate_name(name, "name")?;
        }
        if let Some(url) = &patch.url {
            validate_non_empty(url, "RTSP URL")?;
            validate_uri(url, "RTSP URL")?;
        }
        if let Some(webhook_url) = patch.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
            validate_webhook_url(webhook_url)?;
        }
        Ok(())
    }
}

#[async_trait]
impl SourceManager for RtspManager {
    type Record = RtspSource;
    type Draft = NewRtspSource;
    type Patch = RtspSourcePatch;

    fn kind(&self) -> SourceKind {
        SourceKind::Rtsp
    }

    fn context(&self) -> &SourceContext {
        &self.ctx
    }

    fn cache(&self) -> &SourceCache<RtspSource> {
        &self.cache
    }

    #[instrument(skip_all)]
    async fn list(&self) -> Result<Vec<RtspSource>> {
        let loaded = self
            .ctx
            .load(RESOURCE, &Control::RtspList, self.ctx.api.list_rtsp_streams())
            .await?;
        match loaded {
            Some(sources) => {
                self.cache.replace(sources.clone());
                self.render(&sources);
                Ok(sources)
            }
            None => Ok(self.cache.all()),
        }
    }

    fn render(&self, sources: &[RtspSource]) {
        if sources.is_empty() {
            self.ctx.view.replace_rows(
                &Control::RtspList,
                vec![Row::placeholder("No RTSP sources configured")],
            );
            return;
        }
        self.ctx
            .view
            .replace_rows(&Control::RtspList, sources.iter().map(Self::card).collect());
        for source in sources {
            self.show_webhook(source);
        }
    }

    #[instrument(skip_all, fields(name = %draft.name))]
    async fn add(&self, draft: NewRtspSource) -> Result<RtspSource> {
        let outcome = async {
            validate_name(&draft.name, "name")?;
            validate_non_empty(&draft.url, "RTSP URL")?;
            validate_uri(&draft.url, "RTSP URL")?;
            if !draft.webhook_url.trim().is_empty() {
                validate_webhook_url(&draft.webhook_url)?;
            }
            let created = self.ctx.api.create_rtsp_stream(&draft).await?;
            info!(id = %created.id, "RTSP source added");
            self.cache.push(created.clone());
            self.ctx.view.append_row(&Control::RtspList, Self::card(&created));
            self.show_webhook(&created);
            Ok::<_, DashboardError>(created)
        }
        .await;
        self.ctx
            .report(outcome, "RTSP source added", "Failed to add RTSP source")
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn update(&self, id: &str, patch: RtspSourcePatch) -> Result<()> {
        let checked = validate_id(id, ID_FIELD)
            .map_err(DashboardError::from)
            .and_then(|()| Self::check_patch(&patch));
        let outcome = match checked {
            Ok(()) => self.ctx.api.update_rtsp_stream(id, &patch).await,
            Err(err) => Err(err),
        };

        match &outcome {
            Ok(()) => {
                if let Some(source) = self.cache.modify(id, |source| source.apply(&patch)) {
                    self.show_webhook(&source);
                }
            }
            Err(_) => {
                if let (Some(_), Some(confirmed)) = (patch.enabled, self.cache.get(id)) {
                    self.ctx.view.set_checked(
                        &Control::rtsp(id, RtspField::Enabled),
                        confirmed.enabled,
                    );
                }
            }
        }
        self.ctx
            .report(outcome, "RTSP source updated", "Failed to update RTSP source")
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn delete(&self, id: &str) -> Result<()> {
        if let Err(err) = validate_id(id, ID_FIELD) {
            return self.ctx.report(
                Err(err.into()),
                "RTSP source deleted",
                "Failed to delete RTSP source",
            );
        }
        let name = self
            .cache
            .get(id)
            .map(|source| source.name)
            .unwrap_or_else(|| id.to_string());
        if !self
            .ctx
            .view
            .confirm(&format!("Delete RTSP source \"{name}\"?"))
        {
            return Err(DashboardError::Cancelled);
        }

        let outcome = self.ctx.api.delete_rtsp_stream(id).await;
        if outcome.is_ok() {
            self.cache.remove(id);
            self.ctx.view.remove_row(&Control::RtspList, id);
            if self.cache.is_empty() {
                self.render(&[]);
            }
        }
        self.ctx
            .report(outcome, "RTSP source deleted", "Failed to delete RTSP source")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rtsp, FakeApi};
    use crate::view::{Document, NotificationLevel, RowKind, View};
    use std::time::Duration;

    fn setup(api: Arc<FakeApi>) -> (Arc<RtspManager>, Arc<Document>) {
        let document = Arc::new(Document::dashboard());
        let ctx = SourceContext::new(api, document.clone(), Duration::from_millis(500));
        (Arc::new(RtspManager::new(ctx)), document)
    }

    #[tokio::test]
    async fn test_empty_list_renders_placeholder() {
        let (manager, document) = setup(Arc::new(FakeApi::new()));

        assert!(manager.list().await.unwrap().is_empty());
        let rows = document.rows(&Control::RtspList);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, RowKind::Placeholder);
    }

    #[tokio::test]
    async fn test_list_failure_renders_error_row() {
        let api = Arc::new(FakeApi::new());
        api.fail("list_rtsp_streams");
        let (manager, document) = setup(api);

        assert!(manager.list().await.is_err());
        let rows = document.rows(&Control::RtspList);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].kind, RowKind::Error);
        assert!(rows[0].text.contains("list_rtsp_streams rejected"));
    }

    #[tokio::test]
    async fn test_list_renders_cards() {
        let api = Arc::new(FakeApi::new().with_rtsp(vec![rtsp("r1", "Door"), rtsp("r2", "Yard")]));
        let (manager, document) = setup(api);

        manager.list().await.unwrap();
        let rows = document.rows(&Control::RtspList);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].key, "r2");
        assert_eq!(
            document.value(&Control::rtsp("r1", RtspField::Url)).as_deref(),
            Some("rtsp://cam/r1")
        );
        assert!(document.has_control(&Control::ClapIndicator("r2".into())));
        // disabled sources hide their webhook field
        assert!(!document.is_visible(&Control::rtsp("r1", RtspField::WebhookUrl)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typing_sends_one_update() {
        let api = Arc::new(FakeApi::new().with_rtsp(vec![rtsp("r1", "Door")]));
        let (manager, _document) = setup(api.clone());
        manager.list().await.unwrap();

        for text in ["a", "ab", "abc"] {
            manager.edit_field("r1", RtspField::Name, text.to_string());
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(manager.has_pending_edits());
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(api.count("update_rtsp_stream"), 1);
        assert_eq!(api.state().rtsp[0].name, "abc");
        assert_eq!(manager.cache().get("r1").unwrap().name, "abc");
    }

    #[tokio::test]
    async fn test_failed_toggle_reverts_checkbox() {
        let api = Arc::new(FakeApi::new().with_rtsp(vec![rtsp("r1", "Door")]));
        let (manager, document) = setup(api.clone());
        manager.list().await.unwrap();
        api.fail("update_rtsp_stream");

        let control = Control::rtsp("r1", RtspField::Enabled);
        document.set_checked(&control, true);
        let patch = RtspSourcePatch {
            enabled: Some(true),
            ..Default::default()
        };

        assert!(manager.update("r1", patch).await.is_err());
        assert_eq!(document.checked(&control), Some(false));
        assert!(!manager.cache().get("r1").unwrap().enabled);
        assert_eq!(
            document.last_notification().unwrap().level,
            NotificationLevel::Error
        );
    }

    #[tokio::test]
    async fn test_add_rejects_shell_characters() {
        let api = Arc::new(FakeApi::new());
        let (manager, _document) = setup(api.clone());

        let draft = NewRtspSource {
            name: "Door".into(),
            url: "rtsp://cam/1; rm -rf /".into(),
            webhook_url: String::new(),
            enabled: false,
        };
        assert!(matches!(
            manager.add(draft).await,
            Err(DashboardError::Validation(_))
        ));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_add_replaces_placeholder() {
        let api = Arc::new(FakeApi::new());
        let (manager, document) = setup(api);
        manager.list().await.unwrap();

        let draft = NewRtspSource {
            name: "Door".into(),
            url: "rtsp://cam/1".into(),
            webhook_url: String::new(),
            enabled: true,
        };
        let created = manager.add(draft).await.unwrap();

        let rows = document.rows(&Control::RtspList);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, created.id);
        assert_eq!(manager.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_from_cache_and_view() {
        let api = Arc::new(FakeApi::new().with_rtsp(vec![rtsp("r1", "Door"), rtsp("r2", "Yard")]));
        let (manager, document) = setup(api.clone());
        manager.list().await.unwrap();

        manager.delete("r1").await.unwrap();

        assert!(manager.cache().get("r1").is_none());
        let rows = document.rows(&Control::RtspList);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "r2");
        assert!(!document.has_control(&Control::rtsp("r1", RtspField::Name)));
    }

    #[tokio::test]
    async fn test_declined_delete_sends_nothing() {
        let api = Arc::new(FakeApi::new().with_rtsp(vec![rtsp("r1", "Door")]));
        let (manager, document) = setup(api.clone());
        manager.list().await.unwrap();
        document.confirm_with(false);

        assert!(matches!(
            manager.delete("r1").await,
            Err(DashboardError::Cancelled)
        ));
        assert_eq!(api.count("delete_rtsp_stream"), 0);
        assert_eq!(manager.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_webhook_test_validates_locally() {
        let api = Arc::new(FakeApi::new());
        let (manager, _document) = setup(api.clone());

        assert!(manager.test_webhook("").await.is_err());
        assert!(manager.test_webhook("ftp://hooks").await.is_err());
        assert!(api.calls().is_empty());

        manager.test_webhook("http://hooks.local/rtsp").await.unwrap();
        assert_eq!(api.count("test_webhook"), 1);
    }

    #[tokio::test]
    async fn test_path_like_ids_never_reach_server() {
        let api = Arc::new(FakeApi::new().with_rtsp(vec![rtsp("r1", "Door")]));
        let (manager, document) = setup(api.clone());
        manager.list().await.unwrap();
        let calls = api.calls().len();

        assert!(matches!(
            manager.delete("../settings").await,
            Err(DashboardError::Validation(_))
        ));
        let patch = RtspSourcePatch {
            enabled: Some(true),
            ..Default::default()
        };
        assert!(matches!(
            manager.update("r1/../r2", patch).await,
            Err(DashboardError::Validation(_))
        ));
        assert_eq!(api.calls().len(), calls);
        assert_eq!(
            document.last_notification().unwrap().level,
            NotificationLevel::Error
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_discarded_edit_never_commits() {
        let api = Arc::new(FakeApi::new().with_rtsp(vec![rtsp("r1", "Door")]));
        let (manager, document) = setup(api.clone());
        manager.list().await.unwrap();

        let control = Control::rtsp("r1", RtspField::Name);
        document.set_value(&control, "Do");
        manager.edit_field("r1", RtspField::Name, "Do".into());
        assert!(manager.discard_edit("r1", RtspField::Name));
        assert!(!manager.has_pending_edits());
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(api.count("update_rtsp_stream"), 0);
        assert_eq!(document.value(&control).as_deref(), Some("Door"));
    }
}
