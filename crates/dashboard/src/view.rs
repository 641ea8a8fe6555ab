//! The surface the dashboard renders into.
//!
//! [`View`] is the seam between dashboard logic and whatever displays it. Controls are
//! addressed by [`Control`]; list containers hold keyed [`Row`]s whose editable fields
//! become controls of their own while the row is rendered. [`Document`] is the
//! retained in-memory implementation used by the CLI and by tests.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RtspField {
    Name,
    Url,
    WebhookUrl,
    Enabled,
}

impl RtspField {
    fn suffix(&self) -> &'static str {
        match self {
            RtspField::Name => "name",
            RtspField::Url => "url",
            RtspField::WebhookUrl => "webhook",
            RtspField::Enabled => "enabled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VbanField {
    WebhookUrl,
    Enabled,
}

impl VbanField {
    fn suffix(&self) -> &'static str {
        match self {
            VbanField::WebhookUrl => "webhook",
            VbanField::Enabled => "enabled",
        }
    }
}

/// Key of the clap indicator next to the microphone select.
pub const MICROPHONE_INDICATOR: &str = "microphone";

/// Notifications a [`Document`] keeps; older ones are dropped first.
pub const MAX_NOTIFICATIONS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Control {
    Threshold,
    ThresholdValue,
    Delay,
    MicWebhookEnabled,
    MicWebhookUrl,
    /// Microphone select; its rows are the selectable devices.
    MicroSource,
    StartButton,
    StopButton,
    DetectionDisplay,
    DetectedLabels,
    RtspList,
    VbanList,
    SavedVbanList,
    /// Per-source clap indicator.
    ClapIndicator(String),
    RtspField { id: String, field: RtspField },
    VbanField { id: String, field: VbanField },
}

impl Control {
    /// Controls the dashboard cannot initialize without.
    pub const REQUIRED: [Control; 5] = [
        Control::Threshold,
        Control::Delay,
        Control::MicWebhookEnabled,
        Control::MicWebhookUrl,
        Control::MicroSource,
    ];

    pub fn rtsp(id: impl Into<String>, field: RtspField) -> Self {
        Control::RtspField {
            id: id.into(),
            field,
        }
    }

    pub fn vban(id: impl Into<String>, field: VbanField) -> Self {
        Control::VbanField {
            id: id.into(),
            field,
        }
    }

    /// Element id as used in the HTML dashboard, for diagnostics.
    pub fn element_id(&self) -> String {
        match self {
            Control::Threshold => "threshold".to_string(),
            Control::ThresholdValue => "threshold-value".to_string(),
            Control::Delay => "delay".to_string(),
            Control::MicWebhookEnabled => "webhook-mic-enabled".to_string(),
            Control::MicWebhookUrl => "webhook-mic-url".to_string(),
            Control::MicroSource => "micro_source".to_string(),
            Control::StartButton => "startButton".to_string(),
            Control::StopButton => "stopButton".to_string(),
            Control::DetectionDisplay => "detection_display".to_string(),
            Control::DetectedLabels => "detected_labels".to_string(),
            Control::RtspList => "rtsp-sources".to_string(),
            Control::VbanList => "vban-sources".to_string(),
            Control::SavedVbanList => "saved-vban-sources".to_string(),
            Control::ClapIndicator(id) => format!("clap-{id}"),
            Control::RtspField { id, field } => format!("rtsp-{id}-{}", field.suffix()),
            Control::VbanField { id, field } => format!("vban-{id}-{}", field.suffix()),
        }
    }
}

impl std::fmt::Display for Control {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.element_id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKind {
    /// Editable record card.
    Card,
    /// Selectable entry (select options, read-only list items).
    Item,
    /// Muted "nothing here" row.
    Placeholder,
    Loading,
    Error,
}

impl RowKind {
    fn is_transient(&self) -> bool {
        matches!(self, RowKind::Placeholder | RowKind::Loading | RowKind::Error)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub key: String,
    pub kind: RowKind,
    pub text: String,
    /// Editable controls owned by the row.
    pub fields: Vec<(Control, FieldValue)>,
}

impl Row {
    pub fn card(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: RowKind::Card,
            text: text.into(),
            fields: Vec::new(),
        }
    }

    pub fn item(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: RowKind::Item,
            text: text.into(),
            fields: Vec::new(),
        }
    }

    pub fn placeholder(text: impl Into<String>) -> Self {
        Self::transient(RowKind::Placeholder, text)
    }

    pub fn loading(text: impl Into<String>) -> Self {
        Self::transient(RowKind::Loading, text)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::transient(RowKind::Error, text)
    }

    fn transient(kind: RowKind, text: impl Into<String>) -> Self {
        Self {
            key: String::new(),
            kind,
            text: text.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_text_field(mut self, control: Control, value: impl Into<String>) -> Self {
        self.fields.push((control, FieldValue::Text(value.into())));
        self
    }

    pub fn with_flag_field(mut self, control: Control, checked: bool) -> Self {
        self.fields.push((control, FieldValue::Flag(checked)));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            at: Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message)
    }
}

pub trait View: Send + Sync {
    fn has_control(&self, control: &Control) -> bool;
    /// Current text value of an input; `None` when the control does not exist.
    fn value(&self, control: &Control) -> Option<String>;
    fn checked(&self, control: &Control) -> Option<bool>;
    fn set_value(&self, control: &Control, value: &str);
    fn set_checked(&self, control: &Control, checked: bool);
    fn set_visible(&self, control: &Control, visible: bool);
    /// Toggle the highlighted state (e.g. the clap animation class).
    fn set_active(&self, control: &Control, active: bool);
    /// Clear `container` and render `rows` in order.
    fn replace_rows(&self, container: &Control, rows: Vec<Row>);
    /// Append a row, dropping placeholder/loading/error rows first.
    fn append_row(&self, container: &Control, row: Row);
    /// Remove the row keyed `key`; returns whether it existed.
    fn remove_row(&self, container: &Control, key: &str) -> bool;
    /// Ask the user to confirm a destructive action.
    fn confirm(&self, prompt: &str) -> bool;
    fn notify(&self, notification: Notification);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlState {
    pub value: String,
    pub checked: bool,
    pub visible: bool,
    pub active: bool,
}

impl ControlState {
    fn shown() -> Self {
        Self {
            visible: true,
            ..Default::default()
        }
    }
}

#[derive(Debug, Default)]
struct DocumentState {
    controls: HashMap<Control, ControlState>,
    rows: HashMap<Control, Vec<Row>>,
    notifications: VecDeque<Notification>,
    confirm_answer: bool,
}

impl DocumentState {
    fn mount_fields(&mut self, row: &Row) {
        for (control, value) in &row.fields {
            let mut state = ControlState::shown();
            match value {
                FieldValue::Text(text) => state.value = text.clone(),
                FieldValue::Flag(checked) => state.checked = *checked,
            }
            self.controls.insert(control.clone(), state);
        }
    }

    fn unmount_fields(&mut self, row: &Row) {
        for (control, _) in &row.fields {
            self.controls.remove(control);
        }
    }
}

/// Retained in-memory [`View`].
#[derive(Debug, Default)]
pub struct Document {
    state: RwLock<DocumentState>,
}

impl Document {
    /// An empty document: no controls at all.
    pub fn new() -> Self {
        Self::default()
    }

    /// A document holding every control of the dashboard page.
    pub fn dashboard() -> Self {
        let document = Self::new();
        for control in [
            Control::Threshold,
            Control::ThresholdValue,
            Control::Delay,
            Control::MicWebhookEnabled,
            Control::MicWebhookUrl,
            Control::MicroSource,
            Control::StartButton,
            Control::StopButton,
            Control::DetectionDisplay,
            Control::DetectedLabels,
            Control::RtspList,
            Control::VbanList,
            Control::SavedVbanList,
            Control::ClapIndicator(MICROPHONE_INDICATOR.to_string()),
        ] {
            document.insert_control(control);
        }
        document.set_visible(&Control::StopButton, false);
        document.confirm_with(true);
        document
    }

    pub fn insert_control(&self, control: Control) {
        self.write()
            .controls
            .entry(control)
            .or_insert_with(ControlState::shown);
    }

    pub fn remove_control(&self, control: &Control) {
        let mut state = self.write();
        state.controls.remove(control);
        state.rows.remove(control);
    }

    /// Answer given to future [`View::confirm`] prompts.
    pub fn confirm_with(&self, answer: bool) {
        self.write().confirm_answer = answer;
    }

    pub fn control(&self, control: &Control) -> Option<ControlState> {
        self.read().controls.get(control).cloned()
    }

    pub fn is_visible(&self, control: &Control) -> bool {
        self.control(control).map(|c| c.visible).unwrap_or(false)
    }

    pub fn is_active(&self, control: &Control) -> bool {
        self.control(control).map(|c| c.active).unwrap_or(false)
    }

    pub fn rows(&self, container: &Control) -> Vec<Row> {
        self.read().rows.get(container).cloned().unwrap_or_default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.read().notifications.iter().cloned().collect()
    }

    pub fn last_notification(&self) -> Option<Notification> {
        self.read().notifications.back().cloned()
    }

    pub fn clear_notifications(&self) {
        self.write().notifications.clear();
    }

    fn read(&self) -> RwLockReadGuard<'_, DocumentState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, DocumentState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, control: &Control, apply: impl FnOnce(&mut ControlState)) {
        match self.write().controls.get_mut(control) {
            Some(state) => apply(state),
            None => debug!(control = %control, "update for missing control ignored"),
        }
    }
}

impl View for Document {
    fn has_control(&self, control: &Control) -> bool {
        self.read().controls.contains_key(control)
    }

    fn value(&self, control: &Control) -> Option<String> {
        self.read().controls.get(control).map(|c| c.value.clone())
    }

    fn checked(&self, control: &Control) -> Option<bool> {
        self.read().controls.get(control).map(|c| c.checked)
    }

    fn set_value(&self, control: &Control, value: &str) {
        self.update(control, |c| c.value = value.to_string());
    }

    fn set_checked(&self, control: &Control, checked: bool) {
        self.update(control, |c| c.checked = checked);
    }

    fn set_visible(&self, control: &Control, visible: bool) {
        self.update(control, |c| c.visible = visible);
    }

    fn set_active(&self, control: &Control, active: bool) {
        self.update(control, |c| c.active = active);
    }

    fn replace_rows(&self, container: &Control, rows: Vec<Row>) {
        let mut state = self.write();
        if !state.controls.contains_key(container) {
            debug!(container = %container, "render into missing container ignored");
            return;
        }
        if let Some(old) = state.rows.remove(container) {
            for row in &old {
                state.unmount_fields(row);
            }
        }
        for row in &rows {
            state.mount_fields(row);
        }
        state.rows.insert(container.clone(), rows);
    }

    fn append_row(&self, container: &Control, row: Row) {
        let mut state = self.write();
        if !state.controls.contains_key(container) {
            debug!(container = %container, "append into missing container ignored");
            return;
        }
        state.mount_fields(&row);
        let rows = state.rows.entry(container.clone()).or_default();
        rows.retain(|r| !r.kind.is_transient());
        rows.push(row);
    }

    fn remove_row(&self, container: &Control, key: &str) -> bool {
        let mut state = self.write();
        let removed = match state.rows.get_mut(container) {
            Some(rows) => match rows.iter().position(|r| r.key == key && !r.kind.is_transient()) {
                Some(index) => Some(rows.remove(index)),
                None => None,
            },
            None => None,
        };
        match removed {
            Some(row) => {
                state.unmount_fields(&row);
                true
            }
            None => false,
        }
    }

    fn confirm(&self, prompt: &str) -> bool {
        let answer = self.read().confirm_answer;
        debug!(prompt, answer, "confirmation requested");
        answer
    }

    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error => warn!(message = %notification.message, "notification"),
            _ => info!(message = %notification.message, "notification"),
        }
        let mut state = self.write();
        if state.notifications.len() == MAX_NOTIFICATIONS {
            state.notifications.pop_front();
        }
        state.notifications.push_back(notification);
    }
}
