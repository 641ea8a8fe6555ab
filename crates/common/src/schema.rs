//! Structural validation of raw settings documents.
//!
//! The server-embedded settings document may be partial or hand-edited. This module
//! checks every section against a static schema, back-fills missing fields from the
//! schema defaults, and reports each repair. It never fails: the returned
//! [`Settings`] is always complete.

use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::settings::{
    Settings, DEFAULT_AUDIO_SOURCE, DEFAULT_BUFFER_DURATION, DEFAULT_CHUNK_DURATION,
    DEFAULT_DELAY, DEFAULT_DEVICE_INDEX, DEFAULT_THRESHOLD, DEFAULT_VBAN_IP, DEFAULT_VBAN_PORT,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldType {
    Number,
    /// Whole number in the UDP port range.
    Port,
    Text,
    Flag,
    /// Either a string or a number, e.g. server-assigned ids.
    Identifier,
}

impl FieldType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::Number => numeric(value).is_some(),
            FieldType::Port => numeric(value)
                .is_some_and(|n| n.fract() == 0.0 && (0.0..=f64::from(u16::MAX)).contains(&n)),
            FieldType::Text => value.is_string(),
            FieldType::Flag => value.is_boolean(),
            FieldType::Identifier => value.is_string() || value.is_number(),
        }
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
enum Fallback {
    Float(f64),
    Port(u16),
    Text(&'static str),
    Flag(bool),
}

impl Fallback {
    fn to_value(self) -> Value {
        match self {
            Fallback::Float(v) => json!(v),
            Fallback::Port(v) => json!(v),
            Fallback::Text(v) => json!(v),
            Fallback::Flag(v) => json!(v),
        }
    }
}

struct FieldSchema {
    name: &'static str,
    kind: FieldType,
    default: Fallback,
    /// Optional fields are filled in silently when absent.
    required: bool,
}

impl FieldSchema {
    const fn required(name: &'static str, kind: FieldType, default: Fallback) -> Self {
        Self {
            name,
            kind,
            default,
            required: true,
        }
    }

    const fn optional(name: &'static str, kind: FieldType, default: Fallback) -> Self {
        Self {
            name,
            kind,
            default,
            required: false,
        }
    }
}

enum SectionKind {
    Object(&'static [FieldSchema]),
    Array(&'static [FieldSchema]),
}

struct SectionSchema {
    name: &'static str,
    kind: SectionKind,
}

const GLOBAL_FIELDS: &[FieldSchema] = &[
    FieldSchema::required("threshold", FieldType::Number, Fallback::Float(DEFAULT_THRESHOLD)),
    FieldSchema::required("delay", FieldType::Number, Fallback::Float(DEFAULT_DELAY)),
    FieldSchema::optional(
        "chunk_duration",
        FieldType::Number,
        Fallback::Float(DEFAULT_CHUNK_DURATION),
    ),
    FieldSchema::optional(
        "buffer_duration",
        FieldType::Number,
        Fallback::Float(DEFAULT_BUFFER_DURATION),
    ),
];

const MICROPHONE_FIELDS: &[FieldSchema] = &[
    FieldSchema::required("enabled", FieldType::Flag, Fallback::Flag(false)),
    FieldSchema::required("webhook_url", FieldType::Text, Fallback::Text("")),
    FieldSchema::required(
        "audio_source",
        FieldType::Text,
        Fallback::Text(DEFAULT_AUDIO_SOURCE),
    ),
    FieldSchema::required(
        "device_index",
        FieldType::Identifier,
        Fallback::Text(DEFAULT_DEVICE_INDEX),
    ),
];

const RTSP_ITEM_FIELDS: &[FieldSchema] = &[
    FieldSchema::required("id", FieldType::Identifier, Fallback::Text("")),
    FieldSchema::required("name", FieldType::Text, Fallback::Text("")),
    FieldSchema::required("url", FieldType::Text, Fallback::Text("")),
    FieldSchema::required("webhook_url", FieldType::Text, Fallback::Text("")),
    FieldSchema::required("enabled", FieldType::Flag, Fallback::Flag(false)),
];

const SAVED_VBAN_ITEM_FIELDS: &[FieldSchema] = &[
    FieldSchema::required("name", FieldType::Text, Fallback::Text("")),
    FieldSchema::required("ip", FieldType::Text, Fallback::Text("")),
    FieldSchema::required("port", FieldType::Port, Fallback::Port(DEFAULT_VBAN_PORT)),
    FieldSchema::required("stream_name", FieldType::Text, Fallback::Text("")),
    FieldSchema::required("webhook_url", FieldType::Text, Fallback::Text("")),
    FieldSchema::required("enabled", FieldType::Flag, Fallback::Flag(false)),
];

const VBAN_FIELDS: &[FieldSchema] = &[
    FieldSchema::required("stream_name", FieldType::Text, Fallback::Text("")),
    FieldSchema::required("ip", FieldType::Text, Fallback::Text(DEFAULT_VBAN_IP)),
    FieldSchema::required("port", FieldType::Port, Fallback::Port(DEFAULT_VBAN_PORT)),
    FieldSchema::required("webhook_url", FieldType::Text, Fallback::Text("")),
    FieldSchema::required("enabled", FieldType::Flag, Fallback::Flag(false)),
];

const SETTINGS_SCHEMA: &[SectionSchema] = &[
    SectionSchema {
        name: "global",
        kind: SectionKind::Object(GLOBAL_FIELDS),
    },
    SectionSchema {
        name: "microphone",
        kind: SectionKind::Object(MICROPHONE_FIELDS),
    },
    SectionSchema {
        name: "rtsp_sources",
        kind: SectionKind::Array(RTSP_ITEM_FIELDS),
    },
    SectionSchema {
        name: "saved_vban_sources",
        kind: SectionKind::Array(SAVED_VBAN_ITEM_FIELDS),
    },
    SectionSchema {
        name: "vban",
        kind: SectionKind::Object(VBAN_FIELDS),
    },
];

/// Outcome of [`validate_settings`].
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsValidation {
    pub settings: Settings,
    pub errors: Vec<String>,
    pub is_valid: bool,
}

/// Check `raw` against the settings schema, repairing what is missing.
pub fn validate_settings(raw: &Value) -> SettingsValidation {
    let mut errors = Vec::new();
    let mut root = match raw {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        _ => {
            errors.push("settings document must be an object".to_string());
            Map::new()
        }
    };

    for section in SETTINGS_SCHEMA {
        match section.kind {
            SectionKind::Object(fields) => {
                let entry = root
                    .entry(section.name)
                    .or_insert_with(|| Value::Object(Map::new()));
                if !entry.is_object() {
                    errors.push(format!("section {} must be an object", section.name));
                    *entry = Value::Object(Map::new());
                }
                if let Value::Object(map) = entry {
                    backfill(map, fields, &mut |field: &str, problem: &str| {
                        errors.push(format!("{problem} field {field} in section {}", section.name))
                    });
                }
            }
            SectionKind::Array(fields) => {
                let entry = root
                    .entry(section.name)
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !entry.is_array() {
                    errors.push(format!("section {} must be an array", section.name));
                    *entry = Value::Array(Vec::new());
                }
                if let Value::Array(items) = entry {
                    let mut repaired = Vec::with_capacity(items.len());
                    for (index, item) in items.drain(..).enumerate() {
                        let mut map = match item {
                            Value::Object(map) => map,
                            _ => {
                                errors.push(format!(
                                    "item {index} of {} must be an object",
                                    section.name
                                ));
                                continue;
                            }
                        };
                        backfill(&mut map, fields, &mut |field: &str, problem: &str| {
                            errors.push(format!(
                                "{problem} field {field} in item {index} of {}",
                                section.name
                            ))
                        });
                        repaired.push(Value::Object(map));
                    }
                    *items = repaired;
                }
            }
        }
    }

    let mut take = |name: &str| root.remove(name).unwrap_or(Value::Null);
    let (global, microphone, rtsp, saved_vban, vban) = (
        take("global"),
        take("microphone"),
        take("rtsp_sources"),
        take("saved_vban_sources"),
        take("vban"),
    );
    let settings = Settings {
        global: decode(global, "section global", &mut errors).unwrap_or_default(),
        microphone: decode(microphone, "section microphone", &mut errors).unwrap_or_default(),
        rtsp_sources: decode_items(rtsp, "rtsp_sources", &mut errors),
        saved_vban_sources: decode_items(saved_vban, "saved_vban_sources", &mut errors),
        vban: decode(vban, "section vban", &mut errors).unwrap_or_default(),
    };

    if !errors.is_empty() {
        warn!(count = errors.len(), "settings required repair");
    }

    SettingsValidation {
        is_valid: errors.is_empty(),
        settings,
        errors,
    }
}

/// Decode one repaired section. A section that still fails falls back to its
/// default alone; the other sections are kept.
fn decode<T: DeserializeOwned>(value: Value, what: &str, errors: &mut Vec<String>) -> Option<T> {
    match serde_json::from_value(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            errors.push(format!("{what} could not be decoded: {e}"));
            None
        }
    }
}

fn decode_items<T: DeserializeOwned>(value: Value, section: &str, errors: &mut Vec<String>) -> Vec<T> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| decode(item, &format!("item {index} of {section}"), errors))
        .collect()
}

fn backfill(
    map: &mut Map<String, Value>,
    fields: &[FieldSchema],
    report: &mut dyn FnMut(&str, &str),
) {
    for field in fields {
        match map.get(field.name) {
            None | Some(Value::Null) => {
                map.insert(field.name.to_string(), field.default.to_value());
                if field.required {
                    report(field.name, "missing");
                }
            }
            Some(value) if !field.kind.accepts(value) => {
                map.insert(field.name.to_string(), field.default.to_value());
                report(field.name, "invalid");
            }
            Some(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> Value {
        json!({
            "global": {"threshold": "0.6", "delay": 2.0},
            "microphone": {
                "enabled": true,
                "webhook_url": "http://hooks.local/mic",
                "audio_source": "USB",
                "device_index": "2"
            },
            "rtsp_sources": [
                {"id": "r1", "name": "porch", "url": "rtsp://porch", "webhook_url": "", "enabled": true}
            ],
            "saved_vban_sources": [],
            "vban": {"stream_name": "", "ip": "0.0.0.0", "port": 6980, "webhook_url": "", "enabled": false}
        })
    }

    #[test]
    fn test_complete_settings_are_valid() {
        let result = validate_settings(&complete());
        assert!(result.is_valid, "{:?}", result.errors);
        assert_eq!(result.settings.global.threshold, 0.6);
        assert_eq!(result.settings.rtsp_sources.len(), 1);
    }

    #[test]
    fn test_missing_field_gets_default() {
        let mut raw = complete();
        raw["global"].as_object_mut().unwrap().remove("delay");
        raw["microphone"]
            .as_object_mut()
            .unwrap()
            .remove("audio_source");

        let result = validate_settings(&raw);
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.settings.global.delay, DEFAULT_DELAY);
        assert_eq!(result.settings.microphone.audio_source, DEFAULT_AUDIO_SOURCE);
    }

    #[test]
    fn test_non_array_section_is_replaced() {
        let mut raw = complete();
        raw["rtsp_sources"] = json!({"id": "r1"});

        let result = validate_settings(&raw);
        assert!(!result.is_valid);
        assert!(result.settings.rtsp_sources.is_empty());
        assert!(result
            .errors
            .iter()
            .any(|e| e == "section rtsp_sources must be an array"));
    }

    #[test]
    fn test_array_items_are_backfilled() {
        let mut raw = complete();
        raw["saved_vban_sources"] = json!([{"name": "Desk", "ip": "10.0.0.4"}]);

        let result = validate_settings(&raw);
        assert!(!result.is_valid);
        let saved = &result.settings.saved_vban_sources[0];
        assert_eq!(saved.port, DEFAULT_VBAN_PORT);
        assert_eq!(saved.webhook_url, "");
        assert!(!saved.enabled);
    }

    #[test]
    fn test_empty_document_is_completed() {
        let result = validate_settings(&json!({}));
        assert!(!result.is_valid);
        assert_eq!(result.settings, Settings::default());
    }

    #[test]
    fn test_wrong_type_is_replaced() {
        let mut raw = complete();
        raw["global"]["threshold"] = json!("loud");
        raw["vban"]["enabled"] = json!("yes");

        let result = validate_settings(&raw);
        assert!(!result.is_valid);
        assert_eq!(result.settings.global.threshold, DEFAULT_THRESHOLD);
        assert!(!result.settings.vban.enabled);
    }

    #[test]
    fn test_out_of_range_port_keeps_other_fields() {
        let mut raw = complete();
        raw["global"]["threshold"] = json!(0.9);
        raw["saved_vban_sources"] = json!([
            {"name": "Desk", "ip": "10.0.0.4", "port": 70000, "stream_name": "Desk",
             "webhook_url": "", "enabled": true}
        ]);

        let result = validate_settings(&raw);
        assert!(!result.is_valid);
        assert_eq!(result.settings.global.threshold, 0.9);
        assert_eq!(result.settings.rtsp_sources.len(), 1);
        let saved = &result.settings.saved_vban_sources[0];
        assert_eq!(saved.port, DEFAULT_VBAN_PORT);
        assert!(saved.enabled);
        assert_eq!(
            result.errors,
            vec!["invalid field port in item 0 of saved_vban_sources".to_string()]
        );
    }

    #[test]
    fn test_bad_chunk_duration_keeps_other_fields() {
        let mut raw = complete();
        raw["global"]["chunk_duration"] = json!("fast");

        let result = validate_settings(&raw);
        assert!(!result.is_valid);
        assert_eq!(result.settings.global.threshold, 0.6);
        assert_eq!(result.settings.global.chunk_duration, DEFAULT_CHUNK_DURATION);
        assert_eq!(result.settings.microphone.audio_source, "USB");
        assert_eq!(
            result.errors,
            vec!["invalid field chunk_duration in section global".to_string()]
        );
    }

    #[test]
    fn test_absent_optional_fields_are_not_errors() {
        let result = validate_settings(&complete());
        assert!(result.is_valid);
        assert_eq!(result.settings.global.buffer_duration, DEFAULT_BUFFER_DURATION);
    }
}
