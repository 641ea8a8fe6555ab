use serde::{Deserialize, Deserializer, Serialize};

use crate::sources::{RtspSource, SavedVbanSource};

pub const DEFAULT_THRESHOLD: f64 = 0.5;
pub const DEFAULT_DELAY: f64 = 1.0;
pub const DEFAULT_CHUNK_DURATION: f64 = 0.5;
pub const DEFAULT_BUFFER_DURATION: f64 = 1.0;
pub const DEFAULT_AUDIO_SOURCE: &str = "default";
pub const DEFAULT_DEVICE_INDEX: &str = "0";
pub const DEFAULT_VBAN_IP: &str = "0.0.0.0";
pub const DEFAULT_VBAN_PORT: u16 = 6980;

/// Complete dashboard configuration as persisted by the detection server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Settings {
    pub global: GlobalSettings,
    pub microphone: MicrophoneSettings,
    pub rtsp_sources: Vec<RtspSource>,
    pub saved_vban_sources: Vec<SavedVbanSource>,
    pub vban: VbanConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalSettings {
    #[serde(deserialize_with = "f64_lenient")]
    pub threshold: f64,
    #[serde(deserialize_with = "f64_lenient")]
    pub delay: f64,
    #[serde(default = "default_chunk_duration", deserialize_with = "f64_lenient")]
    pub chunk_duration: f64,
    #[serde(default = "default_buffer_duration", deserialize_with = "f64_lenient")]
    pub buffer_duration: f64,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            delay: DEFAULT_DELAY,
            chunk_duration: DEFAULT_CHUNK_DURATION,
            buffer_duration: DEFAULT_BUFFER_DURATION,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MicrophoneSettings {
    pub enabled: bool,
    pub webhook_url: String,
    pub audio_source: String,
    #[serde(deserialize_with = "string_lenient")]
    pub device_index: String,
}

impl Default for MicrophoneSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: String::new(),
            audio_source: DEFAULT_AUDIO_SOURCE.to_string(),
            device_index: DEFAULT_DEVICE_INDEX.to_string(),
        }
    }
}

/// Active VBAN listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VbanConfig {
    pub stream_name: String,
    pub ip: String,
    #[serde(deserialize_with = "u16_lenient")]
    pub port: u16,
    pub webhook_url: String,
    pub enabled: bool,
}

impl Default for VbanConfig {
    fn default() -> Self {
        Self {
            stream_name: String::new(),
            ip: DEFAULT_VBAN_IP.to_string(),
            port: DEFAULT_VBAN_PORT,
            webhook_url: String::new(),
            enabled: false,
        }
    }
}

/// Partial update applied section by section.
///
/// `global` and `microphone` are merged field by field. Array sections and `vban`
/// replace the current value wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub global: Option<GlobalPatch>,
    pub microphone: Option<MicrophonePatch>,
    pub rtsp_sources: Option<Vec<RtspSource>>,
    pub saved_vban_sources: Option<Vec<SavedVbanSource>>,
    pub vban: Option<VbanConfig>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GlobalPatch {
    pub threshold: Option<f64>,
    pub delay: Option<f64>,
    pub chunk_duration: Option<f64>,
    pub buffer_duration: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MicrophonePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_index: Option<String>,
}

impl Settings {
    pub fn apply(&mut self, patch: SettingsPatch) {
        if let Some(global) = patch.global {
            self.global.apply(global);
        }
        if let Some(microphone) = patch.microphone {
            self.microphone.apply(microphone);
        }
        if let Some(rtsp_sources) = patch.rtsp_sources {
            self.rtsp_sources = rtsp_sources;
        }
        if let Some(saved) = patch.saved_vban_sources {
            self.saved_vban_sources = saved;
        }
        if let Some(vban) = patch.vban {
            self.vban = vban;
        }
    }
}

impl GlobalSettings {
    fn apply(&mut self, patch: GlobalPatch) {
        if let Some(v) = patch.threshold {
            self.threshold = v;
        }
        if let Some(v) = patch.delay {
            self.delay = v;
        }
        if let Some(v) = patch.chunk_duration {
            self.chunk_duration = v;
        }
        if let Some(v) = patch.buffer_duration {
            self.buffer_duration = v;
        }
    }
}

impl MicrophoneSettings {
    pub fn apply(&mut self, patch: MicrophonePatch) {
        if let Some(v) = patch.enabled {
            self.enabled = v;
        }
        if let Some(v) = patch.webhook_url {
            self.webhook_url = v;
        }
        if let Some(v) = patch.audio_source {
            self.audio_source = v;
        }
        if let Some(v) = patch.device_index {
            self.device_index = v;
        }
    }
}

impl From<Settings> for SettingsPatch {
    fn from(settings: Settings) -> Self {
        Self {
            global: Some(GlobalPatch {
                threshold: Some(settings.global.threshold),
                delay: Some(settings.global.delay),
                chunk_duration: Some(settings.global.chunk_duration),
                buffer_duration: Some(settings.global.buffer_duration),
            }),
            microphone: Some(MicrophonePatch {
                enabled: Some(settings.microphone.enabled),
                webhook_url: Some(settings.microphone.webhook_url),
                audio_source: Some(settings.microphone.audio_source),
                device_index: Some(settings.microphone.device_index),
            }),
            rtsp_sources: Some(settings.rtsp_sources),
            saved_vban_sources: Some(settings.saved_vban_sources),
            vban: Some(settings.vban),
        }
    }
}

/// Microphone selection encoded as `"device_index|device_name"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSelection {
    pub device_index: String,
    pub device_name: String,
}

impl DeviceSelection {
    pub fn new(device_index: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            device_index: device_index.into(),
            device_name: device_name.into(),
        }
    }

    /// Parse a select value. A value without a separator is treated as a bare
    /// device name with the default index.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        match value.split_once('|') {
            Some((index, name)) => Some(Self::new(index.trim(), name.trim())),
            None => Some(Self::new(DEFAULT_DEVICE_INDEX, value)),
        }
    }

    pub fn encode(&self) -> String {
        format!("{}|{}", self.device_index, self.device_name)
    }
}

fn default_chunk_duration() -> f64 {
    DEFAULT_CHUNK_DURATION
}

fn default_buffer_duration() -> f64 {
    DEFAULT_BUFFER_DURATION
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    String(String),
}

pub(crate) fn f64_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("expected a number, got '{s}'"))),
    }
}

pub(crate) fn u16_lenient<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64_lenient(deserializer)?;
    if value.fract() != 0.0 || !(0.0..=f64::from(u16::MAX)).contains(&value) {
        return Err(serde::de::Error::custom(format!("invalid port {value}")));
    }
    Ok(value as u16)
}

pub(crate) fn string_lenient<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        String(String),
        Integer(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::String(s) => s,
        Raw::Integer(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    })
}
