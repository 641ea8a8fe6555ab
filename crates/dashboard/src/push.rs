//! Server-pushed detection events.
//!
//! [`PushHandler`] turns one [`PushEvent`] into view updates. [`run_push_channel`]
//! keeps a WebSocket open to the detection server and feeds every text frame to the
//! handler, reconnecting under a bounded [`ReconnectPolicy`].

use common::events::{
    ClapDetectedPayload, ClapPayload, DetectionPayload, LabelsPayload, PushEvent,
};
use common::sources::SourceKind;
use futures::StreamExt;
use reqwest::Url;
use std::sync::Arc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::ReconnectPolicy;
use crate::indicator::FlashIndicator;
use crate::session::DetectionSession;
use crate::view::{Control, Notification, Row, View, MICROPHONE_INDICATOR};

pub struct PushHandler {
    view: Arc<dyn View>,
    session: Arc<DetectionSession>,
    flash: FlashIndicator,
    top_labels: usize,
}

impl PushHandler {
    pub fn new(
        view: Arc<dyn View>,
        session: Arc<DetectionSession>,
        flash: FlashIndicator,
        top_labels: usize,
    ) -> Self {
        Self {
            view,
            session,
            flash,
            top_labels,
        }
    }

    /// Decode and apply one text frame. Frames that are not a known event are logged
    /// and ignored.
    pub fn handle_frame(&self, frame: &str) -> bool {
        match serde_json::from_str::<PushEvent>(frame) {
            Ok(event) => {
                self.handle(event);
                true
            }
            Err(err) => {
                debug!(error = %err, frame, "ignoring push frame");
                false
            }
        }
    }

    pub fn handle(&self, event: PushEvent) {
        debug!(event = event.kind().name(), "push event");
        match event {
            PushEvent::Clap(ClapPayload { source_id }) => {
                self.flash_source(source_id.as_deref(), None);
            }
            PushEvent::ClapDetected(ClapDetectedPayload {
                source_type,
                source_id,
            }) => {
                self.flash_source(Some(source_id.as_str()), Some(source_type.as_str()));
            }
            PushEvent::Labels(labels) => self.show_labels(&labels),
            PushEvent::DetectionEvent(detection) => self.show_detection(&detection),
        }
    }

    fn flash_source(&self, source_id: Option<&str>, source_type: Option<&str>) {
        let mut candidates = Vec::new();
        if let Some(id) = source_id.filter(|id| !id.is_empty()) {
            candidates.push(Control::ClapIndicator(id.to_string()));
        }
        if source_type == Some(SourceKind::Microphone.as_str()) {
            candidates.push(Control::ClapIndicator(MICROPHONE_INDICATOR.to_string()));
        }

        let target = candidates
            .into_iter()
            .find(|control| self.view.has_control(control))
            .unwrap_or(Control::DetectionDisplay);
        self.flash.flash(target);
    }

    fn show_labels(&self, labels: &LabelsPayload) {
        let rows = labels
            .top(self.top_labels)
            .iter()
            .map(|score| Row::item(score.label.as_str(), score.display()))
            .collect();
        self.view.set_visible(&Control::DetectedLabels, true);
        self.view.replace_rows(&Control::DetectedLabels, rows);
    }

    fn show_detection(&self, detection: &DetectionPayload) {
        if !self.session.is_detecting() {
            debug!(label = %detection.label, "detection event outside a session ignored");
            return;
        }
        self.view.set_value(
            &Control::DetectionDisplay,
            &format!("Detection: {}", detection.label),
        );
        if detection.is_clap() {
            self.flash.flash(Control::DetectionDisplay);
        }
    }
}

/// How the push channel ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushExit {
    Shutdown,
    /// Every reconnection attempt failed.
    GaveUp,
}

/// Keep the push channel open until `shutdown` fires or the reconnect policy is
/// exhausted. The attempt counter resets once a connection delivers its first frame;
/// a server that accepts and immediately hangs up still runs the policy down.
#[instrument(skip_all, fields(url = %url))]
pub async fn run_push_channel(
    url: Url,
    policy: ReconnectPolicy,
    handler: Arc<PushHandler>,
    shutdown: CancellationToken,
) -> PushExit {
    let mut attempt = 0u32;
    loop {
        let connected = tokio::select! {
            _ = shutdown.cancelled() => return PushExit::Shutdown,
            result = connect_async(url.as_str()) => result,
        };

        match connected {
            Ok((mut stream, _response)) => {
                info!("push channel connected");
                let mut delivered = false;
                loop {
                    let frame = tokio::select! {
                        _ = shutdown.cancelled() => {
                            let _ = stream.close(None).await;
                            return PushExit::Shutdown;
                        }
                        frame = stream.next() => frame,
                    };
                    match frame {
                        Some(Ok(Message::Close(_))) | None => {
                            info!("push channel closed by server");
                            break;
                        }
                        Some(Ok(message)) => {
                            if !delivered {
                                delivered = true;
                                if attempt > 0 && handler.session.is_detecting() {
                                    handler.view.notify(Notification::info(
                                        "Reconnected to the detection server",
                                    ));
                                }
                                attempt = 0;
                            }
                            if let Message::Text(text) = message {
                                handler.handle_frame(&text);
                            }
                        }
                        Some(Err(err)) => {
                            warn!(error = %err, "push channel read failed");
                            break;
                        }
                    }
                }
                if handler.session.is_detecting() {
                    handler
                        .view
                        .notify(Notification::error("Connection to the detection server lost"));
                }
            }
            Err(err) => {
                warn!(error = %err, attempt, "push channel connection failed");
                if handler.session.is_detecting() {
                    handler
                        .view
                        .notify(Notification::error("Connection to the detection server failed"));
                }
            }
        }

        attempt += 1;
        let Some(delay) = policy.delay_for(attempt) else {
            debug!(attempts = attempt - 1, "push channel reconnection abandoned");
            return PushExit::GaveUp;
        };
        debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting push channel");
        tokio::select! {
            _ = shutdown.cancelled() => return PushExit::Shutdown,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
