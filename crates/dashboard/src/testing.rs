//! In-process [`DetectionApi`] used by unit tests.

use async_trait::async_trait;
use common::api::{StatusResponse, WebhookTestRequest};
use common::settings::Settings;
use common::sources::{
    AudioSource, NewRtspSource, RtspSource, RtspSourcePatch, SavedVbanSource, VbanKey,
    VbanSource, VbanUpdateRequest,
};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use crate::client::DetectionApi;
use crate::error::{DashboardError, Result};

#[derive(Debug, Default)]
pub struct FakeState {
    pub audio_sources: Vec<AudioSource>,
    pub microphone_webhook: String,
    pub microphone_enabled: bool,
    pub rtsp: Vec<RtspSource>,
    pub vban: Vec<VbanSource>,
    pub saved_vban: Vec<SavedVbanSource>,
    pub saved_settings: Option<Settings>,
    pub running: bool,
    pub next_id: u32,
    /// Operation names in call order.
    pub calls: Vec<String>,
    /// Operations answering with a server error.
    pub failing: HashSet<&'static str>,
    pub unreachable: bool,
}

#[derive(Debug, Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rtsp(self, sources: Vec<RtspSource>) -> Self {
        self.state().rtsp = sources;
        self
    }

    pub fn with_vban(self, sources: Vec<VbanSource>) -> Self {
        self.state().vban = sources;
        self
    }

    pub fn with_saved_vban(self, sources: Vec<SavedVbanSource>) -> Self {
        self.state().saved_vban = sources;
        self
    }

    pub fn with_audio_sources(self, sources: Vec<AudioSource>) -> Self {
        self.state().audio_sources = sources;
        self
    }

    pub fn fail(&self, operation: &'static str) {
        self.state().failing.insert(operation);
    }

    pub fn go_offline(&self) {
        self.state().unreachable = true;
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.as_str() == operation)
            .count()
    }

    fn record(&self, operation: &'static str) -> Result<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        state.calls.push(operation.to_string());
        if state.unreachable {
            return Err(DashboardError::Transport("connection refused".into()));
        }
        if state.failing.contains(operation) {
            return Err(DashboardError::Server(format!("{operation} rejected")));
        }
        Ok(state)
    }
}

pub fn rtsp(id: &str, name: &str) -> RtspSource {
    RtspSource {
        id: id.to_string(),
        name: name.to_string(),
        url: format!("rtsp://cam/{id}"),
        webhook_url: String::new(),
        enabled: false,
    }
}

pub fn microphone(index: &str, name: &str) -> AudioSource {
    AudioSource {
        kind: "microphone".to_string(),
        index: index.to_string(),
        name: name.to_string(),
    }
}

pub fn detected_vban(name: &str, ip: &str) -> VbanSource {
    VbanSource {
        name: name.to_string(),
        ip: ip.to_string(),
        port: 6980,
        stream_name: name.to_string(),
        channels: Some(2),
        sample_rate: Some(48000),
    }
}

#[async_trait]
impl DetectionApi for FakeApi {
    async fn list_audio_sources(&self) -> Result<Vec<AudioSource>> {
        Ok(self.record("list_audio_sources")?.audio_sources.clone())
    }

    async fn microphone_webhook(&self) -> Result<String> {
        Ok(self.record("microphone_webhook")?.microphone_webhook.clone())
    }

    async fn set_microphone_webhook(&self, webhook_url: &str) -> Result<()> {
        self.record("set_microphone_webhook")?.microphone_webhook = webhook_url.to_string();
        Ok(())
    }

    async fn microphone_enabled(&self) -> Result<bool> {
        Ok(self.record("microphone_enabled")?.microphone_enabled)
    }

    async fn set_microphone_enabled(&self, enabled: bool) -> Result<()> {
        self.record("set_microphone_enabled")?.microphone_enabled = enabled;
        Ok(())
    }

    async fn list_rtsp_streams(&self) -> Result<Vec<RtspSource>> {
        Ok(self.record("list_rtsp_streams")?.rtsp.clone())
    }

    async fn create_rtsp_stream(&self, source: &NewRtspSource) -> Result<RtspSource> {
        let mut state = self.record("create_rtsp_stream")?;
        state.next_id += 1;
        let created = RtspSource {
            id: format!("s{}", state.next_id),
            name: source.name.clone(),
            url: source.url.clone(),
            webhook_url: source.webhook_url.clone(),
            enabled: source.enabled,
        };
        state.rtsp.push(created.clone());
        Ok(created)
    }

    async fn update_rtsp_stream(&self, id: &str, patch: &RtspSourcePatch) -> Result<()> {
        let mut state = self.record("update_rtsp_stream")?;
        match state.rtsp.iter_mut().find(|s| s.id == id) {
            Some(source) => {
                source.apply(patch);
                Ok(())
            }
            None => Err(DashboardError::Server(format!("stream {id} not found"))),
        }
    }

    async fn delete_rtsp_stream(&self, id: &str) -> Result<()> {
        let mut state = self.record("delete_rtsp_stream")?;
        state.rtsp.retain(|s| s.id != id);
        Ok(())
    }

    async fn list_vban_sources(&self) -> Result<Vec<VbanSource>> {
        Ok(self.record("list_vban_sources")?.vban.clone())
    }

    async fn list_saved_vban_sources(&self) -> Result<Vec<SavedVbanSource>> {
        Ok(self.record("list_saved_vban_sources")?.saved_vban.clone())
    }

    async fn save_vban_source(&self, source: &SavedVbanSource) -> Result<()> {
        self.record("save_vban_source")?
            .saved_vban
            .push(source.clone());
        Ok(())
    }

    async fn update_vban_source(&self, request: &VbanUpdateRequest) -> Result<()> {
        let mut state = self.record("update_vban_source")?;
        if let Some(source) = state
            .saved_vban
            .iter_mut()
            .find(|s| s.key() == request.key)
        {
            source.apply(&request.patch);
        }
        Ok(())
    }

    async fn remove_vban_source(&self, key: &VbanKey) -> Result<()> {
        let mut state = self.record("remove_vban_source")?;
        state.saved_vban.retain(|s| &s.key() != key);
        Ok(())
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.record("save_settings")?.saved_settings = Some(settings.clone());
        Ok(())
    }

    async fn start_detection(&self, _settings: &Settings) -> Result<()> {
        self.record("start_detection")?.running = true;
        Ok(())
    }

    async fn stop_detection(&self) -> Result<()> {
        self.record("stop_detection")?.running = false;
        Ok(())
    }

    async fn status(&self) -> Result<StatusResponse> {
        let running = self.record("status")?.running;
        Ok(StatusResponse {
            running,
            error: None,
        })
    }

    async fn test_webhook(&self, _request: &WebhookTestRequest) -> Result<()> {
        self.record("test_webhook")?;
        Ok(())
    }
}
