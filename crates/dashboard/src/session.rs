use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::client::DetectionApi;
use crate::error::Result;
use crate::settings_model::SettingsModel;
use crate::view::{Control, Notification, View};

/// Client-side view of the remote detection process. The server stays the source of
/// truth; [`DetectionSession::sync_status`] realigns the flag.
pub struct DetectionSession {
    api: Arc<dyn DetectionApi>,
    view: Arc<dyn View>,
    detecting: AtomicBool,
}

impl DetectionSession {
    pub fn new(api: Arc<dyn DetectionApi>, view: Arc<dyn View>) -> Self {
        Self {
            api,
            view,
            detecting: AtomicBool::new(false),
        }
    }

    pub fn is_detecting(&self) -> bool {
        self.detecting.load(Ordering::SeqCst)
    }

    /// Persist the settings, then start detection with them. Nothing is started when
    /// the save fails.
    #[instrument(skip_all)]
    pub async fn start(&self, model: &SettingsModel) -> Result<()> {
        let settings = model.save(self.api.as_ref(), self.view.as_ref()).await?;

        match self.api.start_detection(&settings).await {
            Ok(()) => {
                info!(
                    threshold = settings.global.threshold,
                    rtsp_sources = settings.rtsp_sources.len(),
                    "detection started"
                );
                self.set_detecting(true);
                self.view.notify(Notification::success("Detection started"));
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "detection not started");
                self.view
                    .notify(Notification::error(format!("Failed to start detection: {err}")));
                Err(err)
            }
        }
    }

    #[instrument(skip_all)]
    pub async fn stop(&self) -> Result<()> {
        match self.api.stop_detection().await {
            Ok(()) => {
                info!("detection stopped");
                self.set_detecting(false);
                self.view.notify(Notification::success("Detection stopped"));
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "detection not stopped");
                self.view
                    .notify(Notification::error(format!("Failed to stop detection: {err}")));
                Err(err)
            }
        }
    }

    /// Ask the server whether detection is running and mirror the answer.
    pub async fn sync_status(&self) -> Result<bool> {
        let status = self.api.status().await?;
        if let Some(error) = status.error.as_deref() {
            warn!(error, "detection server reports an error");
        }
        self.set_detecting(status.running);
        Ok(status.running)
    }

    fn set_detecting(&self, detecting: bool) {
        self.detecting.store(detecting, Ordering::SeqCst);
        self.view.set_visible(&Control::StartButton, !detecting);
        self.view.set_visible(&Control::StopButton, detecting);
    }
}
