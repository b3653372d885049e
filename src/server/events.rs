//! Events published by a running printer.

use serde::Serialize;

use crate::store::StoredImage;

/// Lifecycle state of the printer's TCP acceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl RunningState {
    pub fn is_running(self) -> bool {
        self == Self::Running
    }
}

/// Observer notification, delivered over a broadcast channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PrinterEvent {
    RunningStateChanged { state: RunningState, is_running: bool },
    LabelCreated { label: StoredImage },
}

impl PrinterEvent {
    pub fn state_changed(state: RunningState) -> Self {
        Self::RunningStateChanged {
            state,
            is_running: state.is_running(),
        }
    }
}
