use async_trait::async_trait;
use common::settings::{DeviceSelection, MicrophonePatch};
use common::sources::{AudioSource, SourceKind};
use common::validation::validate_webhook_url;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, instrument};

use super::{schedule, SourceCache, SourceContext, SourceManager};
use crate::debounce::Debouncer;
use crate::error::{DashboardError, Result};
use crate::view::{Control, Row};

const RESOURCE: &str = "audio sources";

/// Microphone webhook as last confirmed by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MicrophoneWebhookState {
    pub webhook_url: String,
    pub enabled: bool,
}

/// Server-owned capture devices plus the microphone webhook.
///
/// Devices cannot be added or removed from the dashboard; only the webhook fields are
/// editable. Record ids are ignored by [`SourceManager::update`].
pub struct MicrophoneManager {
    ctx: SourceContext,
    cache: SourceCache<AudioSource>,
    webhook: RwLock<MicrophoneWebhookState>,
    edits: Debouncer<Control>,
}

impl MicrophoneManager {
    pub fn new(ctx: SourceContext) -> Self {
        let edits = Debouncer::new(ctx.debounce);
        Self {
            ctx,
            cache: SourceCache::default(),
            webhook: RwLock::new(MicrophoneWebhookState::default()),
            edits,
        }
    }

    pub fn webhook(&self) -> MicrophoneWebhookState {
        self.webhook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Read the webhook fields from the server into the controls.
    #[instrument(skip_all)]
    pub async fn load_webhook(&self) -> Result<MicrophoneWebhookState> {
        let (webhook_url, enabled) = tokio::try_join!(
            self.ctx.api.microphone_webhook(),
            self.ctx.api.microphone_enabled()
        )?;
        let state = MicrophoneWebhookState {
            webhook_url,
            enabled,
        };
        *self.webhook.write().unwrap_or_else(PoisonError::into_inner) = state.clone();
        self.show(&state);
        Ok(state)
    }

    /// A keystroke in the webhook URL input; committed once typing pauses.
    pub fn edit_webhook_url(self: &Arc<Self>, value: String) {
        let patch = MicrophonePatch {
            webhook_url: Some(value),
            ..Default::default()
        };
        schedule(
            self,
            &self.edits,
            Control::MicWebhookUrl,
            SourceKind::Microphone.to_string(),
            patch,
        );
    }

    /// Drop a pending webhook commit and restore the confirmed URL.
    pub fn discard_webhook_edit(&self) -> bool {
        let dropped = self.edits.cancel(&Control::MicWebhookUrl);
        self.ctx
            .view
            .set_value(&Control::MicWebhookUrl, &self.webhook().webhook_url);
        dropped
    }

    /// Point the select at the listed device matching `selection`, by name first and
    /// then by index.
    pub fn select(&self, selection: &DeviceSelection) -> bool {
        let sources = self.cache.all();
        let matched = sources
            .iter()
            .find(|source| source.name == selection.device_name)
            .or_else(|| {
                sources
                    .iter()
                    .find(|source| source.index == selection.device_index)
            });
        match matched {
            Some(source) => {
                let value = DeviceSelection::new(source.index.as_str(), source.name.as_str());
                self.ctx
                    .view
                    .set_value(&Control::MicroSource, &value.encode());
                true
            }
            None => {
                debug!(device = %selection.device_name, "selected microphone not available");
                false
            }
        }
    }

    fn show(&self, state: &MicrophoneWebhookState) {
        let view = &self.ctx.view;
        view.set_checked(&Control::MicWebhookEnabled, state.enabled);
        view.set_value(&Control::MicWebhookUrl, &state.webhook_url);
        view.set_visible(&Control::MicWebhookUrl, state.enabled);
    }

    fn option(source: &AudioSource) -> Row {
        let selection = DeviceSelection::new(source.index.as_str(), source.name.as_str());
        Row::item(selection.encode(), source.name.as_str())
    }
}

#[async_trait]
impl SourceManager for MicrophoneManager {
    type Record = AudioSource;
    type Draft = ();
    type Patch = MicrophonePatch;

    fn kind(&self) -> SourceKind {
        SourceKind::Microphone
    }

    fn context(&self) -> &SourceContext {
        &self.ctx
    }

    fn cache(&self) -> &SourceCache<AudioSource> {
        &self.cache
    }

    #[instrument(skip_all)]
    async fn list(&self) -> Result<Vec<AudioSource>> {
        let loaded = self
            .ctx
            .load(RESOURCE, &Control::MicroSource, self.ctx.api.list_audio_sources())
            .await?;
        match loaded {
            Some(sources) => {
                let microphones: Vec<_> = sources
                    .into_iter()
                    .filter(AudioSource::is_microphone)
                    .collect();
                self.cache.replace(microphones.clone());
                self.render(&microphones);
                Ok(microphones)
            }
            None => Ok(self.cache.all()),
        }
    }

    fn render(&self, microphones: &[AudioSource]) {
        let rows = if microphones.is_empty() {
            vec![Row::placeholder("No microphone found")]
        } else {
            microphones.iter().map(Self::option).collect()
        };
        self.ctx.view.replace_rows(&Control::MicroSource, rows);
    }

    #[instrument(skip_all)]
    async fn update(&self, _id: &str, patch: MicrophonePatch) -> Result<()> {
        let previous = self.webhook();
        let outcome = async {
            if let Some(url) = &patch.webhook_url {
                let url = url.trim();
                if !url.is_empty() {
                    validate_webhook_url(url)?;
                }
                self.ctx.api.set_microphone_webhook(url).await?;
                self.webhook
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .webhook_url = url.to_string();
            }
            if let Some(enabled) = patch.enabled {
                self.ctx.api.set_microphone_enabled(enabled).await?;
                self.webhook
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .enabled = enabled;
                self.ctx.view.set_visible(&Control::MicWebhookUrl, enabled);
            }
            Ok::<(), DashboardError>(())
        }
        .await;

        if outcome.is_err() && patch.enabled.is_some() {
            self.ctx
                .view
                .set_checked(&Control::MicWebhookEnabled, previous.enabled);
        }
        self.ctx.report(
            outcome,
            "Microphone webhook updated",
            "Failed to update microphone webhook",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{microphone, FakeApi};
    use crate::view::{Document, RowKind, View};
    use std::time::Duration;

    fn setup(api: Arc<FakeApi>) -> (Arc<MicrophoneManager>, Arc<Document>) {
        let document = Arc::new(Document::dashboard());
        let ctx = SourceContext::new(api, document.clone(), Duration::from_millis(500));
        (Arc::new(MicrophoneManager::new(ctx)), document)
    }

    #[tokio::test]
    async fn test_only_microphones_are_listed() {
        let loopback = AudioSource {
            kind: "loopback".into(),
            index: "9".into(),
            name: "Monitor".into(),
        };
        let api = Arc::new(
            FakeApi::new().with_audio_sources(vec![microphone("0", "Built-in"), loopback]),
        );
        let (manager, document) = setup(api);

        let listed = manager.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        let rows = document.rows(&Control::MicroSource);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, "0|Built-in");
    }

    #[tokio::test]
    async fn test_no_microphone_placeholder() {
        let (manager, document) = setup(Arc::new(FakeApi::new()));
        manager.list().await.unwrap();
        assert_eq!(
            document.rows(&Control::MicroSource)[0].kind,
            RowKind::Placeholder
        );
    }

    #[tokio::test]
    async fn test_select_known_device() {
        let api = Arc::new(FakeApi::new().with_audio_sources(vec![
            microphone("0", "Built-in"),
            microphone("3", "USB Mic"),
        ]));
        let (manager, document) = setup(api);
        manager.list().await.unwrap();

        assert!(manager.select(&DeviceSelection::new("3", "USB Mic")));
        assert_eq!(
            document.value(&Control::MicroSource).as_deref(),
            Some("3|USB Mic")
        );
        assert!(!manager.select(&DeviceSelection::new("7", "Gone")));

        // stale index, known name
        assert!(manager.select(&DeviceSelection::new("9", "Built-in")));
        assert_eq!(
            document.value(&Control::MicroSource).as_deref(),
            Some("0|Built-in")
        );
    }

    #[tokio::test]
    async fn test_load_webhook_fills_controls() {
        let api = Arc::new(FakeApi::new());
        {
            let mut state = api.state();
            state.microphone_webhook = "http://hooks.local/mic".into();
            state.microphone_enabled = true;
        }
        let (manager, document) = setup(api);

        manager.load_webhook().await.unwrap();
        assert_eq!(document.checked(&Control::MicWebhookEnabled), Some(true));
        assert_eq!(
            document.value(&Control::MicWebhookUrl).as_deref(),
            Some("http://hooks.local/mic")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_webhook_url_is_debounced() {
        let api = Arc::new(FakeApi::new());
        let (manager, _document) = setup(api.clone());

        for text in ["h", "ht", "http://hooks.local/x"] {
            manager.edit_webhook_url(text.to_string());
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(api.count("set_microphone_webhook"), 1);
        assert_eq!(api.state().microphone_webhook, "http://hooks.local/x");
        assert_eq!(manager.webhook().webhook_url, "http://hooks.local/x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_discarded_webhook_edit_is_not_sent() {
        let api = Arc::new(FakeApi::new());
        api.state().microphone_webhook = "http://hooks.local/mic".into();
        let (manager, document) = setup(api.clone());
        manager.load_webhook().await.unwrap();

        manager.edit_webhook_url("http://hooks.local/m".into());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(manager.discard_webhook_edit());
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(api.count("set_microphone_webhook"), 0);
        assert_eq!(
            document.value(&Control::MicWebhookUrl).as_deref(),
            Some("http://hooks.local/mic")
        );
    }

    #[tokio::test]
    async fn test_failed_toggle_reverts() {
        let api = Arc::new(FakeApi::new());
        api.fail("set_microphone_enabled");
        let (manager, document) = setup(api);
        document.set_checked(&Control::MicWebhookEnabled, true);

        let patch = MicrophonePatch {
            enabled: Some(true),
            ..Default::default()
        };
        assert!(manager.update("microphone", patch).await.is_err());
        assert_eq!(document.checked(&Control::MicWebhookEnabled), Some(false));
    }

    #[tokio::test]
    async fn test_devices_cannot_be_added_or_deleted() {
        let (manager, _document) = setup(Arc::new(FakeApi::new()));
        assert!(matches!(
            manager.add(()).await,
            Err(DashboardError::Unsupported(_))
        ));
        assert!(matches!(
            manager.delete("0").await,
            Err(DashboardError::Unsupported(_))
        ));
    }
}
