//! Application-level orchestration.
//!
//! `panel` owns the run lifecycle state machine for one side panel; `controller` drives it
//! from UI commands, runs backend calls concurrently and emits views back to the UI.

mod controller;
mod panel;

#[cfg_attr(not(feature = "tui"), allow(unused_imports))]
pub(crate) use controller::{run_controller, PanelAction, PanelEvent, UiCommand};
pub(crate) use panel::LifecycleController;
