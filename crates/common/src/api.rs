use serde::{Deserialize, Serialize};

use crate::sources::SourceKind;

/// Generic acknowledgement returned by the detection server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ApiResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            message: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            message: None,
        }
    }

    /// Failure message reported by the server, if the call did not succeed.
    pub fn failure(&self) -> Option<String> {
        if self.success {
            return None;
        }
        Some(
            self.error
                .clone()
                .unwrap_or_else(|| "request was not accepted".to_string()),
        )
    }
}

/// Response of `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StatusResponse {
    #[serde(default)]
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `POST /api/webhook/test`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebhookTestRequest {
    pub source: String,
    pub url: String,
}

impl WebhookTestRequest {
    pub fn new(source: SourceKind, url: impl Into<String>) -> Self {
        Self {
            source: source.to_string(),
            url: url.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MicrophoneWebhook {
    #[serde(default)]
    pub webhook_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MicrophoneEnabled {
    #[serde(default)]
    pub enabled: bool,
}

/// Some server versions wrap lists as `{"sources": [...]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
    Bare(Vec<T>),
    Sources { sources: Vec<T> },
    Streams { streams: Vec<T> },
}

impl<T> ListEnvelope<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListEnvelope::Bare(items) => items,
            ListEnvelope::Sources { sources } => sources,
            ListEnvelope::Streams { streams } => streams,
        }
    }
}
