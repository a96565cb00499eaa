//! Monitor → orchestrator notification contract

use parking_lot::Mutex;

use crate::types::MonitorLabels;

/// Receives edge-triggered verdict changes from monitors.
///
/// Called with the monitor's state lock held, so an implementation must not
/// call back into the same monitor synchronously.
pub trait Coordinator: Send + Sync {
    fn result_up(&self, monitor: &MonitorLabels);
    fn result_down(&self, monitor: &MonitorLabels, reason: Option<&str>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Up(MonitorLabels),
    Down(MonitorLabels, Option<String>),
}

/// Coordinator that keeps every notification, for tests and dry runs
#[derive(Debug, Default)]
pub struct RecordingCoordinator {
    notifications: Mutex<Vec<Notification>>,
}

impl RecordingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.notifications.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.lock().is_empty()
    }

    pub fn clear(&self) {
        self.notifications.lock().clear();
    }
}

impl Coordinator for RecordingCoordinator {
    fn result_up(&self, monitor: &MonitorLabels) {
        self.notifications
            .lock()
            .push(Notification::Up(monitor.clone()));
    }

    fn result_down(&self, monitor: &MonitorLabels, reason: Option<&str>) {
        self.notifications
            .lock()
            .push(Notification::Down(monitor.clone(), reason.map(str::to_string)));
    }
}
