//! Client-side owner of the dashboard configuration.
//!
//! The model is authoritative; view controls are only read back on save and compared
//! for diagnostics.

use common::schema::validate_settings;
use common::settings::{DeviceSelection, Settings, SettingsPatch};
use common::sources::SourceRecord;
use common::validation::{parse_delay, parse_threshold, validate_webhook_url};
use std::sync::{PoisonError, RwLock};
use tracing::{info, instrument, warn};

use crate::client::DetectionApi;
use crate::error::{DashboardError, Result};
use crate::view::{Control, Notification, RtspField, VbanField, View};

#[derive(Debug, Default)]
pub struct SettingsModel {
    settings: RwLock<Settings>,
}

/// Outcome of [`compare_with_view`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewComparison {
    pub has_differences: bool,
    pub differences: Vec<String>,
}

/// Outcome of [`validate_view`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewValidation {
    pub is_valid: bool,
    pub missing_elements: Vec<String>,
}

impl SettingsModel {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    pub fn current(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update(&self, patch: SettingsPatch) {
        self.settings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .apply(patch);
    }

    pub fn replace(&self, settings: Settings) {
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }

    /// Read the view back, validate, and persist. The model only changes once the
    /// server accepted the new settings.
    #[instrument(skip_all)]
    pub async fn persist(&self, api: &dyn DetectionApi, view: &dyn View) -> Result<Settings> {
        let candidate = sync_from_view(view, &self.current())?;
        let raw = serde_json::to_value(&candidate).map_err(DashboardError::validation)?;
        let validation = validate_settings(&raw);
        if !validation.is_valid {
            return Err(DashboardError::Validation(validation.errors.join("; ")));
        }

        api.save_settings(&validation.settings).await?;
        self.replace(validation.settings.clone());
        info!(
            threshold = validation.settings.global.threshold,
            delay = validation.settings.global.delay,
            "settings saved"
        );
        Ok(validation.settings)
    }

    /// [`Self::persist`] reporting the outcome as a notification.
    pub async fn save(&self, api: &dyn DetectionApi, view: &dyn View) -> Result<Settings> {
        let outcome = self.persist(api, view).await;
        match &outcome {
            Ok(_) => view.notify(Notification::success("Settings saved")),
            Err(err) => {
                warn!(error = %err, "settings not saved");
                view.notify(Notification::error(format!("Failed to save settings: {err}")));
            }
        }
        outcome
    }

    pub async fn save_settings(&self, api: &dyn DetectionApi, view: &dyn View) -> bool {
        self.save(api, view).await.is_ok()
    }
}

/// Merge the values of the live controls into a copy of `settings`. Controls that are
/// not rendered keep the model's value.
pub fn sync_from_view(view: &dyn View, settings: &Settings) -> Result<Settings> {
    let mut synced = settings.clone();

    if let Some(value) = view.value(&Control::Threshold) {
        synced.global.threshold = parse_threshold(&value)?;
    }
    if let Some(value) = view.value(&Control::Delay) {
        synced.global.delay = parse_delay(&value)?;
    }

    if let Some(enabled) = view.checked(&Control::MicWebhookEnabled) {
        synced.microphone.enabled = enabled;
    }
    if let Some(url) = view.value(&Control::MicWebhookUrl) {
        synced.microphone.webhook_url = url.trim().to_string();
    }
    if synced.microphone.enabled && !synced.microphone.webhook_url.is_empty() {
        validate_webhook_url(&synced.microphone.webhook_url)?;
    }
    if let Some(selection) = view
        .value(&Control::MicroSource)
        .and_then(|value| DeviceSelection::parse(&value))
    {
        synced.microphone.device_index = selection.device_index;
        synced.microphone.audio_source = selection.device_name;
    }

    for source in &mut synced.rtsp_sources {
        let id = source.id.clone();
        let field = |field| Control::rtsp(id.clone(), field);
        if let Some(name) = view.value(&field(RtspField::Name)) {
            source.name = name;
        }
        if let Some(url) = view.value(&field(RtspField::Url)) {
            source.url = url;
        }
        if let Some(webhook_url) = view.value(&field(RtspField::WebhookUrl)) {
            source.webhook_url = webhook_url;
        }
        if let Some(enabled) = view.checked(&field(RtspField::Enabled)) {
            source.enabled = enabled;
        }
    }

    for source in &mut synced.saved_vban_sources {
        let id = source.record_id();
        if let Some(webhook_url) = view.value(&Control::vban(id.clone(), VbanField::WebhookUrl)) {
            source.webhook_url = webhook_url;
        }
        if let Some(enabled) = view.checked(&Control::vban(id, VbanField::Enabled)) {
            source.enabled = enabled;
        }
    }

    Ok(synced)
}

/// Write the model into the global and microphone controls.
pub fn render_settings(view: &dyn View, settings: &Settings) {
    let threshold = settings.global.threshold.to_string();
    view.set_value(&Control::Threshold, &threshold);
    view.set_value(&Control::ThresholdValue, &threshold);
    view.set_value(&Control::Delay, &settings.global.delay.to_string());
    view.set_checked(&Control::MicWebhookEnabled, settings.microphone.enabled);
    view.set_value(&Control::MicWebhookUrl, &settings.microphone.webhook_url);
}

/// Read-only diff between the model and what the controls currently show.
pub fn compare_with_view(view: &dyn View, settings: &Settings) -> ViewComparison {
    let mut differences = Vec::new();

    let mut numeric = |control: Control, label: &str, expected: f64| {
        if let Some(raw) = view.value(&control) {
            match raw.trim().parse::<f64>() {
                Ok(shown) if (shown - expected).abs() < f64::EPSILON => {}
                _ => differences.push(format!("{label}: model {expected}, view {raw}")),
            }
        }
    };
    numeric(Control::Threshold, "threshold", settings.global.threshold);
    numeric(Control::Delay, "delay", settings.global.delay);

    if let Some(enabled) = view.checked(&Control::MicWebhookEnabled) {
        if enabled != settings.microphone.enabled {
            differences.push(format!(
                "microphone webhook enabled: model {}, view {enabled}",
                settings.microphone.enabled
            ));
        }
    }
    if let Some(url) = view.value(&Control::MicWebhookUrl) {
        if url != settings.microphone.webhook_url {
            differences.push(format!(
                "microphone webhook url: model '{}', view '{url}'",
                settings.microphone.webhook_url
            ));
        }
    }
    if let Some(selection) = view
        .value(&Control::MicroSource)
        .and_then(|value| DeviceSelection::parse(&value))
    {
        if selection.device_name != settings.microphone.audio_source {
            differences.push(format!(
                "microphone source: model '{}', view '{}'",
                settings.microphone.audio_source, selection.device_name
            ));
        }
    }

    ViewComparison {
        has_differences: !differences.is_empty(),
        differences,
    }
}

pub fn validate_view(view: &dyn View) -> ViewValidation {
    let missing_elements: Vec<String> = Control::REQUIRED
        .iter()
        .filter(|control| !view.has_control(control))
        .map(Control::element_id)
        .collect();
    ViewValidation {
        is_valid: missing_elements.is_empty(),
        missing_elements,
    }
}
