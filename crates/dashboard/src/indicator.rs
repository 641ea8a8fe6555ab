use std::sync::Arc;
use std::time::Duration;

use crate::debounce::Debouncer;
use crate::view::{Control, View};

/// Briefly highlights a control; a new flash while active restarts the timer.
#[derive(Clone)]
pub struct FlashIndicator {
    view: Arc<dyn View>,
    timers: Debouncer<Control>,
}

impl FlashIndicator {
    pub fn new(view: Arc<dyn View>, duration: Duration) -> Self {
        Self {
            view,
            timers: Debouncer::new(duration),
        }
    }

    pub fn flash(&self, control: Control) {
        self.view.set_active(&control, true);
        let view = Arc::clone(&self.view);
        let reset = control.clone();
        self.timers.arm(control, async move {
            view.set_active(&reset, false);
        });
    }

    pub fn is_flashing(&self, control: &Control) -> bool {
        self.timers.is_pending(control)
    }
}
