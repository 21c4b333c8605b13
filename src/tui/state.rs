use crate::model::{
    DraftField, LifecyclePhase, Outcome, PanelView, RunItem, RunStatusOption, Score,
};
use crate::orchestrator::{PanelAction, PanelEvent};
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};
use time::macros::format_description;
use time::OffsetDateTime;

/// Presentation state. Owned by the UI thread only.
///
/// The panel's run state comes from the controller as a `PanelView`; everything else here
/// (selection, status choice, `msg`, `loading`) belongs to the caller side of the panel.
pub struct UiState {
    pub items: Vec<RunItem>,
    pub selected: usize,
    pub statuses: Vec<RunStatusOption>,
    pub status_idx: Option<usize>,
    pub view: PanelView,
    pub msg: String,
    /// Set while a start or stop is outstanding; disables both actions.
    pub loading: bool,
    pub editing: Option<DraftField>,
    pub edit_buffer: String,
    pub show_help: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            selected: 0,
            statuses: Vec::new(),
            status_idx: None,
            view: PanelView::default(),
            msg: String::new(),
            loading: false,
            editing: None,
            edit_buffer: String::new(),
            show_help: false,
        }
    }
}

/// Index of the status a new cycle should default to: the active one, else the first.
pub fn default_status_index(statuses: &[RunStatusOption]) -> Option<usize> {
    if statuses.is_empty() {
        return None;
    }
    Some(
        statuses
            .iter()
            .position(|s| s.active == Some(true))
            .unwrap_or(0),
    )
}

pub fn fmt_timestamp(ts: Option<OffsetDateTime>) -> String {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    ts.and_then(|t| t.format(&fmt).ok())
        .unwrap_or_else(|| "-".into())
}

pub fn key_value_line(label: &str, value: &str) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("{label}: "), Style::default().fg(Color::Gray)),
        Span::raw(value.to_string()),
    ])
}

impl UiState {
    pub fn selected_item(&self) -> Option<&RunItem> {
        self.items.get(self.selected)
    }

    pub fn selected_status(&self) -> Option<&RunStatusOption> {
        self.status_idx.and_then(|i| self.statuses.get(i))
    }

    pub fn set_statuses(&mut self, statuses: Vec<RunStatusOption>) {
        self.status_idx = default_status_index(&statuses);
        self.statuses = statuses;
    }

    pub fn can_start(&self) -> bool {
        self.view.open
            && self.view.phase.can_start()
            && !self.loading
            && self.selected_status().is_some()
    }

    pub fn can_stop(&self) -> bool {
        self.view.open && self.view.phase.can_stop() && !self.loading
    }

    /// Move the item selection. Returns true when it changed.
    pub fn move_selection(&mut self, delta: isize) -> bool {
        if self.items.is_empty() {
            return false;
        }
        let max = self.items.len() - 1;
        let next = self.selected.saturating_add_signed(delta).min(max);
        let changed = next != self.selected;
        self.selected = next;
        changed
    }

    pub fn cycle_status(&mut self, delta: isize) {
        if self.statuses.is_empty() {
            return;
        }
        let n = self.statuses.len() as isize;
        let cur = self.status_idx.unwrap_or(0) as isize;
        self.status_idx = Some((cur + delta).rem_euclid(n) as usize);
    }

    /// Which draft a note edit targets in the current phase.
    pub fn note_field(&self) -> Option<DraftField> {
        match self.view.phase {
            LifecyclePhase::NoCycle => Some(DraftField::StartNote),
            LifecyclePhase::CycleOpenSession => Some(DraftField::EndNote),
            LifecyclePhase::CycleClosedSession => None,
        }
    }

    pub fn begin_edit(&mut self, field: DraftField) {
        self.edit_buffer = self.view.drafts.get(field).to_string();
        self.editing = Some(field);
    }

    /// Text to display for a draft, preferring the live edit buffer.
    pub fn draft_text(&self, field: DraftField) -> &str {
        if self.editing == Some(field) {
            &self.edit_buffer
        } else {
            self.view.drafts.get(field)
        }
    }

    pub fn end_score(&self) -> Option<Score> {
        Score::from_input(&self.view.drafts.end_score)
    }

    pub fn apply_event(&mut self, ev: PanelEvent) {
        match ev {
            PanelEvent::View(view) => {
                // Switching items or closing discards the old panel's inputs.
                let moved_on = view.item.as_ref().map(|i| &i.id)
                    != self.view.item.as_ref().map(|i| &i.id)
                    || view.open != self.view.open;
                if moved_on {
                    self.editing = None;
                    self.edit_buffer.clear();
                }
                self.view = *view;
            }
            PanelEvent::ActionFinished { action, result } => {
                if matches!(action, PanelAction::Start | PanelAction::Stop) {
                    self.loading = false;
                }
                match (action, result) {
                    (PanelAction::Start, Ok(Outcome::Applied)) => {
                        self.msg = "Run started".into();
                    }
                    (PanelAction::Stop, Ok(Outcome::Applied)) => {
                        self.msg = "Session stopped".into();
                    }
                    (PanelAction::Load, Ok(Outcome::Applied)) => {
                        // The controller cleared its drafts; an open edit would write old text back.
                        self.editing = None;
                        self.edit_buffer.clear();
                        self.msg.clear();
                    }
                    (action, Ok(Outcome::Rejected { reason })) => {
                        let what = match action {
                            PanelAction::Load => "Load",
                            PanelAction::Start => "Start",
                            PanelAction::Stop => "Stop",
                        };
                        self.msg = match reason {
                            Some(r) => format!("{what} failed: {r}"),
                            None => format!("{what} failed"),
                        };
                    }
                    (PanelAction::Start, Err(e)) => {
                        self.msg = format!("Start failed: {e}");
                    }
                    (_, Err(e)) => {
                        self.msg = e;
                    }
                    (_, Ok(Outcome::Skipped | Outcome::Stale)) => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunState;

    fn status(id: &str, active: Option<bool>) -> RunStatusOption {
        RunStatusOption {
            id: id.into(),
            name: id.to_uppercase(),
            active,
        }
    }

    fn open_view(run: RunState) -> PanelView {
        PanelView {
            open: true,
            item: Some(RunItem {
                id: "a".into(),
                title: "A".into(),
            }),
            phase: run.phase(),
            has_active_cycle: run.has_active_cycle(),
            has_open_session: run.has_open_session(),
            run,
            ..Default::default()
        }
    }

    #[test]
    fn default_status_prefers_active() {
        let statuses = vec![status("todo", None), status("playing", Some(true))];
        assert_eq!(default_status_index(&statuses), Some(1));
        assert_eq!(default_status_index(&[]), None);
    }

    #[test]
    fn start_requires_status_and_idle() {
        let mut ui = UiState {
            view: open_view(RunState::default()),
            ..Default::default()
        };
        assert!(!ui.can_start());
        ui.set_statuses(vec![status("todo", None)]);
        assert!(ui.can_start());
        ui.loading = true;
        assert!(!ui.can_start());
    }

    #[test]
    fn status_cycling_wraps() {
        let mut ui = UiState::default();
        ui.set_statuses(vec![status("a", None), status("b", None), status("c", None)]);
        ui.cycle_status(-1);
        assert_eq!(ui.selected_status().unwrap().id, "c");
        ui.cycle_status(1);
        assert_eq!(ui.selected_status().unwrap().id, "a");
    }

    #[test]
    fn finished_stop_clears_loading_and_reports_failure() {
        let mut ui = UiState {
            loading: true,
            ..Default::default()
        };
        ui.apply_event(PanelEvent::ActionFinished {
            action: PanelAction::Stop,
            result: Ok(Outcome::Rejected { reason: None }),
        });
        assert!(!ui.loading);
        assert_eq!(ui.msg, "Stop failed");
    }

    #[test]
    fn item_switch_cancels_editing() {
        let mut ui = UiState {
            view: open_view(RunState::default()),
            ..Default::default()
        };
        ui.begin_edit(DraftField::StartNote);
        ui.edit_buffer.push('x');
        let mut other = open_view(RunState::default());
        other.item = Some(RunItem {
            id: "b".into(),
            title: "B".into(),
        });
        ui.apply_event(PanelEvent::View(Box::new(other)));
        assert_eq!(ui.editing, None);
        assert!(ui.edit_buffer.is_empty());
    }

    #[test]
    fn selection_is_clamped() {
        let mut ui = UiState {
            items: vec![
                RunItem {
                    id: "a".into(),
                    title: "A".into(),
                },
                RunItem {
                    id: "b".into(),
                    title: "B".into(),
                },
            ],
            ..Default::default()
        };
        assert!(!ui.move_selection(-1));
        assert!(ui.move_selection(5));
        assert_eq!(ui.selected_item().unwrap().id, "b");
    }

    #[test]
    fn applied_load_cancels_editing() {
        let mut ui = UiState {
            view: open_view(RunState::default()),
            ..Default::default()
        };
        ui.begin_edit(DraftField::StartNote);
        ui.edit_buffer.push_str("old text");
        ui.apply_event(PanelEvent::ActionFinished {
            action: PanelAction::Load,
            result: Ok(Outcome::Applied),
        });
        assert_eq!(ui.editing, None);
        assert!(ui.edit_buffer.is_empty());

        ui.begin_edit(DraftField::StartNote);
        ui.edit_buffer.push_str("kept");
        ui.apply_event(PanelEvent::ActionFinished {
            action: PanelAction::Load,
            result: Ok(Outcome::Stale),
        });
        assert_eq!(ui.editing, Some(DraftField::StartNote));
        assert_eq!(ui.draft_text(DraftField::StartNote), "kept");
    }
}
