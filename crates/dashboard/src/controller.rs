//! The dashboard page: start-up sequence and user action dispatch.

use common::schema::validate_settings;
use common::settings::{DeviceSelection, MicrophonePatch, SettingsPatch};
use common::sources::{NewRtspSource, RtspSourcePatch, SourceKind, VbanSourcePatch};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::client::DetectionApi;
use crate::config::Config;
use crate::error::{DashboardError, Result};
use crate::indicator::FlashIndicator;
use crate::push::{run_push_channel, PushExit, PushHandler};
use crate::session::DetectionSession;
use crate::settings_model::{compare_with_view, render_settings, validate_view, SettingsModel};
use crate::sources::vban::VbanPromotion;
use crate::sources::{MicrophoneManager, RtspManager, SourceContext, SourceManager, VbanManager};
use crate::view::{Control, Notification, RtspField, VbanField, View};

/// Everything a user can do on the page.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    StartDetection,
    StopDetection,
    SaveSettings,
    /// The threshold slider moved; only the label follows.
    ThresholdInput(String),
    /// A global or microphone control was committed.
    ParameterChanged,
    SelectMicrophone(String),
    EditMicrophoneWebhook(String),
    /// The webhook input was blurred or cleared before its commit fired.
    DiscardMicrophoneWebhookEdit,
    ToggleMicrophoneWebhook(bool),
    RefreshMicrophones,
    RefreshRtsp,
    AddRtsp(NewRtspSource),
    EditRtsp {
        id: String,
        field: RtspField,
        value: String,
    },
    DiscardRtspEdit {
        id: String,
        field: RtspField,
    },
    ToggleRtsp {
        id: String,
        enabled: bool,
    },
    DeleteRtsp(String),
    RefreshVban,
    SaveVban(VbanPromotion),
    EditVbanWebhook {
        id: String,
        value: String,
    },
    DiscardVbanWebhookEdit(String),
    ToggleVban {
        id: String,
        enabled: bool,
    },
    RemoveVban(String),
    TestWebhook {
        source: SourceKind,
        url: String,
    },
}

pub struct Dashboard {
    config: Config,
    api: Arc<dyn DetectionApi>,
    view: Arc<dyn View>,
    model: Arc<SettingsModel>,
    session: Arc<DetectionSession>,
    microphone: Arc<MicrophoneManager>,
    rtsp: Arc<RtspManager>,
    vban: Arc<VbanManager>,
    push: Arc<PushHandler>,
    /// Set once settings were supplied at start-up; saving defaults would overwrite
    /// the server's configuration.
    seeded: AtomicBool,
    shutdown: CancellationToken,
}

impl Dashboard {
    pub fn new(config: Config, api: Arc<dyn DetectionApi>, view: Arc<dyn View>) -> Self {
        let ctx = SourceContext::new(Arc::clone(&api), Arc::clone(&view), config.debounce);
        let session = Arc::new(DetectionSession::new(Arc::clone(&api), Arc::clone(&view)));
        let flash = FlashIndicator::new(Arc::clone(&view), config.flash_duration);
        let push = Arc::new(PushHandler::new(
            Arc::clone(&view),
            Arc::clone(&session),
            flash,
            config.top_labels,
        ));

        Self {
            api,
            view,
            model: Arc::new(SettingsModel::default()),
            session,
            microphone: Arc::new(MicrophoneManager::new(ctx.clone())),
            rtsp: Arc::new(RtspManager::new(ctx.clone())),
            vban: Arc::new(VbanManager::new(ctx)),
            push,
            seeded: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn model(&self) -> &SettingsModel {
        &self.model
    }

    pub fn session(&self) -> &DetectionSession {
        &self.session
    }

    pub fn microphone(&self) -> &Arc<MicrophoneManager> {
        &self.microphone
    }

    pub fn rtsp(&self) -> &Arc<RtspManager> {
        &self.rtsp
    }

    pub fn vban(&self) -> &Arc<VbanManager> {
        &self.vban
    }

    pub fn push_handler(&self) -> &Arc<PushHandler> {
        &self.push
    }

    /// Start-up: check the page, load the embedded settings, fetch every source list
    /// and resync the detection flag. Missing controls abort with one diagnostic.
    #[instrument(skip_all)]
    pub async fn initialize(&self, embedded: &Value) -> Result<()> {
        let page = validate_view(self.view.as_ref());
        if !page.is_valid {
            let message = format!(
                "Dashboard cannot start, missing controls: {}",
                page.missing_elements.join(", ")
            );
            self.view.notify(Notification::error(message));
            return Err(DashboardError::MissingControls(page.missing_elements));
        }

        self.seeded.store(!embedded.is_null(), Ordering::SeqCst);
        let validation = validate_settings(embedded);
        for error in &validation.errors {
            warn!(error = %error, "embedded settings repaired");
        }
        self.model.replace(validation.settings);
        let settings = self.model.current();
        render_settings(self.view.as_ref(), &settings);

        let (microphones, webhook, rtsp, vban) = tokio::join!(
            self.microphone.list(),
            self.microphone.load_webhook(),
            self.rtsp.list(),
            self.vban.init(),
        );
        if microphones.is_ok() {
            self.microphone.select(&DeviceSelection::new(
                settings.microphone.device_index.as_str(),
                settings.microphone.audio_source.as_str(),
            ));
        }
        for (what, outcome) in [
            ("microphones", microphones.map(|_| ())),
            ("microphone webhook", webhook.map(|_| ())),
            ("RTSP sources", rtsp.map(|_| ())),
            ("VBAN sources", vban),
        ] {
            if let Err(err) = outcome {
                warn!(what, error = %err, "initial load failed");
            }
        }

        self.fold_sources();

        if let Err(err) = self.session.sync_status().await {
            debug!(error = %err, "detection status unavailable");
        }

        let drift = compare_with_view(self.view.as_ref(), &self.model.current());
        if drift.has_differences {
            debug!(differences = ?drift.differences, "view differs from settings");
        }
        info!(
            rtsp_sources = self.rtsp.cache().len(),
            detecting = self.session.is_detecting(),
            "dashboard ready"
        );
        Ok(())
    }

    /// Run one user action. Failures are already reported to the view; the error is
    /// returned for callers that need the outcome.
    #[instrument(skip_all)]
    pub async fn dispatch(&self, action: Action) -> Result<()> {
        debug!(?action, "dispatch");
        match action {
            Action::StartDetection => {
                self.ensure_seeded()?;
                self.fold_sources();
                self.session.start(&self.model).await
            }
            Action::StopDetection => self.session.stop().await,
            Action::SaveSettings | Action::ParameterChanged => self.save().await,
            Action::ThresholdInput(value) => {
                self.view.set_value(&Control::Threshold, &value);
                self.view.set_value(&Control::ThresholdValue, &value);
                Ok(())
            }
            Action::SelectMicrophone(value) => {
                self.view.set_value(&Control::MicroSource, &value);
                self.save().await
            }
            Action::EditMicrophoneWebhook(value) => {
                self.view.set_value(&Control::MicWebhookUrl, &value);
                self.microphone.edit_webhook_url(value);
                Ok(())
            }
            Action::DiscardMicrophoneWebhookEdit => {
                self.microphone.discard_webhook_edit();
                Ok(())
            }
            Action::ToggleMicrophoneWebhook(enabled) => {
                self.view.set_checked(&Control::MicWebhookEnabled, enabled);
                let patch = MicrophonePatch {
                    enabled: Some(enabled),
                    ..Default::default()
                };
                self.microphone
                    .update(SourceKind::Microphone.as_str(), patch)
                    .await
            }
            Action::RefreshMicrophones => self.microphone.list().await.map(|_| ()),
            Action::RefreshRtsp => self.rtsp.list().await.map(|_| ()),
            Action::AddRtsp(draft) => self.rtsp.add(draft).await.map(|_| ()),
            Action::EditRtsp { id, field, value } => {
                self.view.set_value(&Control::rtsp(id.as_str(), field), &value);
                self.rtsp.edit_field(&id, field, value);
                Ok(())
            }
            Action::DiscardRtspEdit { id, field } => {
                self.rtsp.discard_edit(&id, field);
                Ok(())
            }
            Action::ToggleRtsp { id, enabled } => {
                self.view
                    .set_checked(&Control::rtsp(id.as_str(), RtspField::Enabled), enabled);
                let patch = RtspSourcePatch {
                    enabled: Some(enabled),
                    ..Default::default()
                };
                self.rtsp.update(&id, patch).await
            }
            Action::DeleteRtsp(id) => self.rtsp.delete(&id).await,
            Action::RefreshVban => self.vban.list().await.map(|_| ()),
            Action::SaveVban(promotion) => self.vban.add(promotion).await.map(|_| ()),
            Action::EditVbanWebhook { id, value } => {
                self.view.set_value(
                    &Control::vban(id.as_str(), VbanField::WebhookUrl),
                    &value,
                );
                self.vban.edit_webhook_url(&id, value);
                Ok(())
            }
            Action::DiscardVbanWebhookEdit(id) => {
                self.vban.discard_webhook_edit(&id);
                Ok(())
            }
            Action::ToggleVban { id, enabled } => {
                self.view.set_checked(
                    &Control::vban(id.as_str(), VbanField::Enabled),
                    enabled,
                );
                let patch = VbanSourcePatch {
                    webhook_url: None,
                    enabled: Some(enabled),
                };
                self.vban.update(&id, patch).await
            }
            Action::RemoveVban(id) => self.vban.delete(&id).await,
            Action::TestWebhook { source, url } => match source {
                SourceKind::Microphone => self.microphone.test_webhook(&url).await,
                SourceKind::Rtsp => self.rtsp.test_webhook(&url).await,
                SourceKind::Vban => self.vban.test_webhook(&url).await,
            },
        }
    }

    async fn save(&self) -> Result<()> {
        self.ensure_seeded()?;
        self.fold_sources();
        self.model
            .save(self.api.as_ref(), self.view.as_ref())
            .await
            .map(|_| ())
    }

    /// Copy the source lists confirmed by the server into the model, so a save never
    /// sends a list that predates the last add, edit or delete. Lists that never
    /// loaded keep the model's value.
    fn fold_sources(&self) {
        self.model.update(SettingsPatch {
            rtsp_sources: self.rtsp.cache().snapshot(),
            saved_vban_sources: self.vban.saved().snapshot(),
            ..Default::default()
        });
    }

    fn ensure_seeded(&self) -> Result<()> {
        if self.seeded.load(Ordering::SeqCst) {
            return Ok(());
        }
        let message = "no settings were loaded, refusing to overwrite the server configuration";
        warn!("save refused, dashboard started without settings");
        self.view.notify(Notification::error(format!(
            "Failed to save settings: {message}"
        )));
        Err(DashboardError::Validation(message.to_string()))
    }

    /// Spawn the push channel and, when configured, the periodic VBAN refresh. Both
    /// stop on [`Self::shutdown`].
    pub fn spawn_background(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        let url = self.config.push_url.clone();
        let policy = self.config.reconnect;
        let handler = Arc::clone(&self.push);
        let shutdown = self.shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if run_push_channel(url, policy, handler, shutdown).await == PushExit::GaveUp {
                debug!("push channel unavailable");
            }
        }));

        if let Some(period) = self.config.vban_refresh {
            tasks.push(self.vban.spawn_refresh(period, self.shutdown.clone()));
        }
        tasks
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
