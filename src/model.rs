use serde::{Deserialize, Serialize};
use std::fmt;
use time::OffsetDateTime;

/// Snapshot of the cycle/session records for one item.
///
/// Always replaced as a whole when reconciling with the backend; never patched field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    #[serde(default)]
    pub cycle_id: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub session_started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub session_ended_at: Option<OffsetDateTime>,
}

impl RunState {
    pub fn has_active_cycle(&self) -> bool {
        self.cycle_id.is_some()
    }

    /// A session is open when it exists and has not been ended yet.
    pub fn has_open_session(&self) -> bool {
        self.session_id.is_some() && self.session_ended_at.is_none()
    }

    pub fn phase(&self) -> LifecyclePhase {
        match (self.has_active_cycle(), self.has_open_session()) {
            (false, _) => LifecyclePhase::NoCycle,
            (true, true) => LifecyclePhase::CycleOpenSession,
            (true, false) => LifecyclePhase::CycleClosedSession,
        }
    }

    /// Start timestamp of the open session, if any. Drives the live clock.
    pub fn open_session_start(&self) -> Option<OffsetDateTime> {
        if self.has_open_session() {
            self.session_started_at
        } else {
            None
        }
    }

    /// Check the structural invariants of a snapshot.
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.session_id.is_some() && self.cycle_id.is_none() {
            return Err(InvariantViolation::SessionWithoutCycle);
        }
        if let Some(ended) = self.session_ended_at {
            match self.session_started_at {
                None => return Err(InvariantViolation::EndedWithoutStart),
                Some(started) if ended < started => {
                    return Err(InvariantViolation::EndedBeforeStart)
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("session present without a cycle")]
    SessionWithoutCycle,
    #[error("session has an end timestamp but no start timestamp")]
    EndedWithoutStart,
    #[error("session ended before it started")]
    EndedBeforeStart,
}

/// Which branch of the panel a `RunState` maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecyclePhase {
    NoCycle,
    CycleOpenSession,
    /// Cycle exists but nothing is open. No actions until resume exists.
    CycleClosedSession,
}

impl LifecyclePhase {
    pub fn can_start(self) -> bool {
        matches!(self, LifecyclePhase::NoCycle)
    }

    pub fn can_stop(self) -> bool {
        matches!(self, LifecyclePhase::CycleOpenSession)
    }

    pub fn label(self) -> &'static str {
        match self {
            LifecyclePhase::NoCycle => "No cycle",
            LifecyclePhase::CycleOpenSession => "Session running",
            LifecyclePhase::CycleClosedSession => "Session already ended",
        }
    }
}

/// Something the user is tracking runs for. Supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunItem {
    pub id: String,
    pub title: String,
}

/// A status a new cycle can start in. Opaque to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatusOption {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub active: Option<bool>,
}

/// Score recorded when a session ends. Passed through to the backend untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Score {
    Number(f64),
    Text(String),
}

impl Score {
    /// Interpret raw user input: numbers stay numbers, anything else is kept as text.
    /// Blank input means "no score".
    pub fn from_input(raw: &str) -> Option<Score> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => Some(Score::Number(n)),
            _ => Some(Score::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Score::Number(n) => write!(f, "{n}"),
            Score::Text(s) => f.write_str(s),
        }
    }
}

/// Transient text inputs of the panel. Cleared on every successful load.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Drafts {
    pub start_note: String,
    pub end_score: String,
    pub end_note: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    StartNote,
    EndScore,
    EndNote,
}

impl Drafts {
    pub fn get(&self, field: DraftField) -> &str {
        match field {
            DraftField::StartNote => &self.start_note,
            DraftField::EndScore => &self.end_score,
            DraftField::EndNote => &self.end_note,
        }
    }

    pub fn set(&mut self, field: DraftField, value: String) {
        match field {
            DraftField::StartNote => self.start_note = value,
            DraftField::EndScore => self.end_score = value,
            DraftField::EndNote => self.end_note = value,
        }
    }
}

/// Render-ready view of the panel, derived from the controller state at a given instant.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelView {
    pub open: bool,
    pub item: Option<RunItem>,
    pub run: RunState,
    pub phase: LifecyclePhase,
    pub has_active_cycle: bool,
    pub has_open_session: bool,
    pub elapsed_secs: u64,
    /// `elapsed_secs` as `HH:MM:SS`.
    pub elapsed: String,
    pub clock_running: bool,
    pub drafts: Drafts,
}

impl Default for PanelView {
    fn default() -> Self {
        Self {
            open: false,
            item: None,
            run: RunState::default(),
            phase: LifecyclePhase::NoCycle,
            has_active_cycle: false,
            has_open_session: false,
            elapsed_secs: 0,
            elapsed: crate::clock::format_hms(0),
            clock_running: false,
            drafts: Drafts::default(),
        }
    }
}

/// Result of a controller operation as seen by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The result was committed to local state.
    Applied,
    /// Preconditions were not met; the backend was not called.
    Skipped,
    /// The panel moved on before the result arrived; it was discarded.
    Stale,
    /// The backend refused or failed; local state is unchanged.
    Rejected { reason: Option<String> },
}
