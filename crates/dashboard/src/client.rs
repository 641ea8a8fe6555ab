use async_trait::async_trait;
use common::api::{
    ApiResponse, ListEnvelope, MicrophoneEnabled, MicrophoneWebhook, StatusResponse,
    WebhookTestRequest,
};
use common::settings::Settings;
use common::sources::{
    AudioSource, NewRtspSource, RtspSource, RtspSourcePatch, SavedVbanSource, VbanKey,
    VbanSource, VbanUpdateRequest,
};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use telemetry::{CorrelationId, X_REQUEST_ID};
use tracing::{debug, instrument};

use crate::error::{DashboardError, Result};

/// Everything the dashboard asks of the detection server.
#[async_trait]
pub trait DetectionApi: Send + Sync {
    async fn list_audio_sources(&self) -> Result<Vec<AudioSource>>;
    async fn microphone_webhook(&self) -> Result<String>;
    async fn set_microphone_webhook(&self, webhook_url: &str) -> Result<()>;
    async fn microphone_enabled(&self) -> Result<bool>;
    async fn set_microphone_enabled(&self, enabled: bool) -> Result<()>;

    async fn list_rtsp_streams(&self) -> Result<Vec<RtspSource>>;
    async fn create_rtsp_stream(&self, source: &NewRtspSource) -> Result<RtspSource>;
    async fn update_rtsp_stream(&self, id: &str, patch: &RtspSourcePatch) -> Result<()>;
    async fn delete_rtsp_stream(&self, id: &str) -> Result<()>;

    async fn list_vban_sources(&self) -> Result<Vec<VbanSource>>;
    async fn list_saved_vban_sources(&self) -> Result<Vec<SavedVbanSource>>;
    async fn save_vban_source(&self, source: &SavedVbanSource) -> Result<()>;
    async fn update_vban_source(&self, request: &VbanUpdateRequest) -> Result<()>;
    async fn remove_vban_source(&self, key: &VbanKey) -> Result<()>;

    async fn save_settings(&self, settings: &Settings) -> Result<()>;
    async fn start_detection(&self, settings: &Settings) -> Result<()>;
    async fn stop_detection(&self) -> Result<()>;
    async fn status(&self) -> Result<StatusResponse>;

    async fn test_webhook(&self, request: &WebhookTestRequest) -> Result<()>;
}

pub struct HttpDetectionApi {
    base: Url,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// `POST /api/rtsp/stream` answers either the record or `{success, stream}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum CreatedStream {
    Wrapped {
        #[serde(alias = "source")]
        stream: RtspSource,
    },
    Bare(RtspSource),
}

impl HttpDetectionApi {
    pub fn new(base: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(timeout)
            .build()?;
        Ok(Self { base, client })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| DashboardError::Validation(format!("invalid endpoint {path}: {e}")))
    }

    /// Send one request and decode a JSON body. Non-2xx answers become
    /// [`DashboardError::Server`] carrying the server's `error` text when present.
    async fn call<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let request_id = CorrelationId::new();
        debug!(%method, %url, request_id = %request_id, "detection server request");

        let mut request = self
            .client
            .request(method, url)
            .header(X_REQUEST_ID, request_id.as_str());
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DashboardError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.json::<ErrorBody>().await.ok();
            return Err(status_error(status, body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| DashboardError::Server(format!("malformed response from {path}: {e}")))
    }

    /// Calls answering `{success, error?}`.
    async fn acknowledge<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<()>
    where
        B: Serialize + ?Sized + Sync,
    {
        let response: ApiResponse = self.call(method, path, body).await?;
        match response.failure() {
            Some(message) => Err(DashboardError::Server(message)),
            None => Ok(()),
        }
    }

    /// Like [`Self::acknowledge`], retrying once on `legacy` when `primary` is unknown
    /// to the server.
    async fn acknowledge_with_legacy<B>(
        &self,
        primary: &str,
        legacy: &str,
        body: Option<&B>,
    ) -> Result<()>
    where
        B: Serialize + ?Sized + Sync,
    {
        match self.acknowledge(Method::POST, primary, body).await {
            Err(DashboardError::Server(message)) if message == NOT_FOUND_MESSAGE => {
                debug!(primary, legacy, "falling back to legacy endpoint");
                self.acknowledge(Method::POST, legacy, body).await
            }
            other => other,
        }
    }

    async fn list<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let envelope: ListEnvelope<T> = self.call::<(), _>(Method::GET, path, None).await?;
        Ok(envelope.into_vec())
    }
}

const NOT_FOUND_MESSAGE: &str = "endpoint not found";

/// A 404 without an error text means the route itself is missing; one that carries
/// a text is the server's answer and is kept.
fn status_error(status: StatusCode, body: Option<ErrorBody>) -> DashboardError {
    let message = body.and_then(|b| b.error.or(b.message));
    match message {
        Some(message) => DashboardError::Server(message),
        None if status == StatusCode::NOT_FOUND => {
            DashboardError::Server(NOT_FOUND_MESSAGE.to_string())
        }
        None => DashboardError::Server(format!("server returned {status}")),
    }
}

#[async_trait]
impl DetectionApi for HttpDetectionApi {
    #[instrument(skip_all)]
    async fn list_audio_sources(&self) -> Result<Vec<AudioSource>> {
        self.list("/api/audio-sources").await
    }

    #[instrument(skip_all)]
    async fn microphone_webhook(&self) -> Result<String> {
        let body: MicrophoneWebhook = self
            .call::<(), _>(Method::GET, "/api/microphone/webhook", None)
            .await?;
        Ok(body.webhook_url)
    }

    #[instrument(skip_all)]
    async fn set_microphone_webhook(&self, webhook_url: &str) -> Result<()> {
        let body = MicrophoneWebhook {
            webhook_url: webhook_url.to_string(),
        };
        self.acknowledge(Method::PUT, "/api/microphone/webhook", Some(&body))
            .await
    }

    #[instrument(skip_all)]
    async fn microphone_enabled(&self) -> Result<bool> {
        let body: MicrophoneEnabled = self
            .call::<(), _>(Method::GET, "/api/microphone/enabled", None)
            .await?;
        Ok(body.enabled)
    }

    #[instrument(skip_all, fields(enabled = enabled))]
    async fn set_microphone_enabled(&self, enabled: bool) -> Result<()> {
        let body = MicrophoneEnabled { enabled };
        self.acknowledge(Method::PUT, "/api/microphone/enabled", Some(&body))
            .await
    }

    #[instrument(skip_all)]
    async fn list_rtsp_streams(&self) -> Result<Vec<RtspSource>> {
        self.list("/api/rtsp/streams").await
    }

    #[instrument(skip_all, fields(name = %source.name))]
    async fn create_rtsp_stream(&self, source: &NewRtspSource) -> Result<RtspSource> {
        let created: CreatedStream = self
            .call(Method::POST, "/api/rtsp/stream", Some(source))
            .await?;
        Ok(match created {
            CreatedStream::Wrapped { stream } => stream,
            CreatedStream::Bare(stream) => stream,
        })
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn update_rtsp_stream(&self, id: &str, patch: &RtspSourcePatch) -> Result<()> {
        self.acknowledge(Method::PUT, &format!("/api/rtsp/stream/{id}"), Some(patch))
            .await
    }

    #[instrument(skip_all, fields(id = %id))]
    async fn delete_rtsp_stream(&self, id: &str) -> Result<()> {
        self.acknowledge::<()>(Method::DELETE, &format!("/api/rtsp/stream/{id}"), None)
            .await
    }

    #[instrument(skip_all)]
    async fn list_vban_sources(&self) -> Result<Vec<VbanSource>> {
        self.list("/api/vban/sources").await
    }

    #[instrument(skip_all)]
    async fn list_saved_vban_sources(&self) -> Result<Vec<SavedVbanSource>> {
        self.list("/api/vban/saved-sources").await
    }

    #[instrument(skip_all, fields(name = %source.name, ip = %source.ip))]
    async fn save_vban_source(&self, source: &SavedVbanSource) -> Result<()> {
        self.acknowledge(Method::POST, "/api/vban/save", Some(source))
            .await
    }

    #[instrument(skip_all, fields(name = %request.key.name, ip = %request.key.ip))]
    async fn update_vban_source(&self, request: &VbanUpdateRequest) -> Result<()> {
        self.acknowledge(Method::PUT, "/api/vban/update", Some(request))
            .await
    }

    #[instrument(skip_all, fields(name = %key.name, ip = %key.ip))]
    async fn remove_vban_source(&self, key: &VbanKey) -> Result<()> {
        self.acknowledge(Method::DELETE, "/api/vban/remove", Some(key))
            .await
    }

    #[instrument(skip_all)]
    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.acknowledge_with_legacy("/api/settings/save", "/save_settings", Some(settings))
            .await
    }

    #[instrument(skip_all)]
    async fn start_detection(&self, settings: &Settings) -> Result<()> {
        self.acknowledge_with_legacy("/api/detection/start", "/start_detection", Some(settings))
            .await
    }

    #[instrument(skip_all)]
    async fn stop_detection(&self) -> Result<()> {
        self.acknowledge_with_legacy::<()>("/api/detection/stop", "/stop_detection", None)
            .await
    }

    #[instrument(skip_all)]
    async fn status(&self) -> Result<StatusResponse> {
        self.call::<(), _>(Method::GET, "/status", None).await
    }

    #[instrument(skip_all, fields(source = %request.source))]
    async fn test_webhook(&self, request: &WebhookTestRequest) -> Result<()> {
        self.acknowledge(Method::POST, "/api/webhook/test", Some(request))
            .await
    }
}
