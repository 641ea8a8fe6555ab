//! Events pushed by the detection server over the notification channel.
//!
//! Every frame is a JSON object `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::settings::string_lenient;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    Clap(ClapPayload),
    ClapDetected(ClapDetectedPayload),
    Labels(LabelsPayload),
    DetectionEvent(DetectionPayload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PushEventKind {
    Clap,
    ClapDetected,
    Labels,
    DetectionEvent,
}

impl PushEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            PushEventKind::Clap => "clap",
            PushEventKind::ClapDetected => "clap_detected",
            PushEventKind::Labels => "labels",
            PushEventKind::DetectionEvent => "detection_event",
        }
    }
}

impl PushEvent {
    pub fn kind(&self) -> PushEventKind {
        match self {
            PushEvent::Clap(_) => PushEventKind::Clap,
            PushEvent::ClapDetected(_) => PushEventKind::ClapDetected,
            PushEvent::Labels(_) => PushEventKind::Labels,
            PushEvent::DetectionEvent(_) => PushEventKind::DetectionEvent,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ClapPayload {
    #[serde(default, deserialize_with = "opt_string_lenient")]
    pub source_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClapDetectedPayload {
    pub source_type: String,
    #[serde(deserialize_with = "string_lenient")]
    pub source_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LabelsPayload {
    #[serde(default)]
    pub detected: Vec<LabelScore>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

impl LabelScore {
    /// `Hands (87%)`
    pub fn display(&self) -> String {
        format!("{} ({}%)", self.label, (self.score * 100.0).round() as i64)
    }
}

impl LabelsPayload {
    /// Highest scoring `n` labels, best first.
    pub fn top(&self, n: usize) -> Vec<LabelScore> {
        let mut labels = self.detected.clone();
        labels.sort_by(|a, b| b.score.total_cmp(&a.score));
        labels.truncate(n);
        labels
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DetectionPayload {
    pub label: String,
}

impl DetectionPayload {
    pub fn is_clap(&self) -> bool {
        self.label.to_lowercase().contains("clap")
    }
}

fn opt_string_lenient<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "string_lenient")] String);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
}
