use serde::{Deserialize, Serialize};

use crate::settings::{string_lenient, u16_lenient, DEFAULT_VBAN_PORT};

/// Source kinds as named by the detection server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Microphone,
    Rtsp,
    Vban,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Microphone => "microphone",
            SourceKind::Rtsp => "rtsp",
            SourceKind::Vban => "vban",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "microphone" | "mic" => Ok(SourceKind::Microphone),
            "rtsp" => Ok(SourceKind::Rtsp),
            "vban" => Ok(SourceKind::Vban),
            _ => Err(format!("Invalid source kind: {}", s)),
        }
    }
}

/// Anything a source manager can cache and render.
pub trait SourceRecord: Clone + Send + Sync + 'static {
    /// Stable identifier used for cache lookups and view rows.
    fn record_id(&self) -> String;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RtspSource {
    #[serde(deserialize_with = "string_lenient")]
    pub id: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub enabled: bool,
}

impl SourceRecord for RtspSource {
    fn record_id(&self) -> String {
        self.id.clone()
    }
}

/// Body of `POST /api/rtsp/stream`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NewRtspSource {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub enabled: bool,
}

/// Body of `PUT /api/rtsp/stream/{id}`; only set fields are sent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RtspSourcePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl RtspSource {
    pub fn apply(&mut self, patch: &RtspSourcePatch) {
        if let Some(v) = &patch.name {
            self.name = v.clone();
        }
        if let Some(v) = &patch.url {
            self.url = v.clone();
        }
        if let Some(v) = &patch.webhook_url {
            self.webhook_url = v.clone();
        }
        if let Some(v) = patch.enabled {
            self.enabled = v;
        }
    }
}

/// A VBAN stream currently announced on the network. Read-only snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VbanSource {
    pub name: String,
    pub ip: String,
    #[serde(default = "default_vban_port", deserialize_with = "u16_lenient")]
    pub port: u16,
    #[serde(default)]
    pub stream_name: String,
    #[serde(default)]
    pub channels: Option<u32>,
    #[serde(default)]
    pub sample_rate: Option<u32>,
}

impl VbanSource {
    pub fn stream(&self) -> &str {
        if self.stream_name.is_empty() {
            &self.name
        } else {
            &self.stream_name
        }
    }

    /// Human readable line, e.g. `Desk (10.0.0.4:6980) - 2 channels @ 48000Hz`.
    pub fn describe(&self) -> String {
        let mut text = format!("{} ({}:{})", self.name, self.ip, self.port);
        if let Some(channels) = self.channels {
            let plural = if channels > 1 { "s" } else { "" };
            text.push_str(&format!(" - {channels} channel{plural}"));
            if let Some(rate) = self.sample_rate {
                text.push_str(&format!(" @ {rate}Hz"));
            }
        }
        text
    }

    /// Promote the detected source into a persisted record.
    pub fn to_saved(&self, webhook_url: impl Into<String>) -> SavedVbanSource {
        SavedVbanSource {
            name: self.name.clone(),
            ip: self.ip.clone(),
            port: self.port,
            stream_name: self.stream().to_string(),
            webhook_url: webhook_url.into(),
            enabled: false,
        }
    }
}

impl SourceRecord for VbanSource {
    fn record_id(&self) -> String {
        vban_id(self.stream(), &self.ip, self.port)
    }
}

/// A VBAN source the user promoted for detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SavedVbanSource {
    pub name: String,
    pub ip: String,
    #[serde(default = "default_vban_port", deserialize_with = "u16_lenient")]
    pub port: u16,
    #[serde(default)]
    pub stream_name: String,
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub enabled: bool,
}

impl SavedVbanSource {
    pub fn key(&self) -> VbanKey {
        VbanKey {
            name: self.name.clone(),
            ip: self.ip.clone(),
            port: self.port,
        }
    }

    pub fn apply(&mut self, patch: &VbanSourcePatch) {
        if let Some(v) = &patch.webhook_url {
            self.webhook_url = v.clone();
        }
        if let Some(v) = patch.enabled {
            self.enabled = v;
        }
    }
}

impl SourceRecord for SavedVbanSource {
    fn record_id(&self) -> String {
        let stream = if self.stream_name.is_empty() {
            &self.name
        } else {
            &self.stream_name
        };
        vban_id(stream, &self.ip, self.port)
    }
}

/// Identifies a saved VBAN source on the server side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VbanKey {
    pub name: String,
    pub ip: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VbanSourcePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Body of `PUT /api/vban/update`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VbanUpdateRequest {
    #[serde(flatten)]
    pub key: VbanKey,
    #[serde(flatten)]
    pub patch: VbanSourcePatch,
}

/// Entry of `GET /api/audio-sources`. Only microphones are kept by the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioSource {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(
        default,
        alias = "device_index",
        alias = "id",
        deserialize_with = "string_lenient"
    )]
    pub index: String,
    #[serde(default)]
    pub name: String,
}

impl AudioSource {
    pub fn is_microphone(&self) -> bool {
        self.kind == SourceKind::Microphone.as_str()
    }
}

impl SourceRecord for AudioSource {
    fn record_id(&self) -> String {
        self.index.clone()
    }
}

/// Row identifier shared by detected and saved VBAN records.
pub fn vban_id(stream_name: &str, ip: &str, port: u16) -> String {
    format!("vban_{}_{}_{}", stream_name, ip, port)
}

fn default_vban_port() -> u16 {
    DEFAULT_VBAN_PORT
}
