//! Text summary builder for CLI output.
//!
//! Formats a panel view into human-readable lines for text mode.

use crate::model::{LifecyclePhase, PanelView};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn fmt_ts(ts: Option<OffsetDateTime>) -> String {
    ts.and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| "-".into())
}

/// Build a text summary from a panel view.
pub(crate) fn build_text_summary(view: &PanelView) -> TextSummary {
    let mut lines = Vec::new();

    if let Some(item) = view.item.as_ref() {
        lines.push(format!("Item: {} ({})", item.title, item.id));
    }
    lines.push(format!("State: {}", view.phase.label()));

    let run = &view.run;
    if let Some(cycle_id) = run.cycle_id.as_deref() {
        lines.push(format!("Cycle: {cycle_id}"));
    }
    if let Some(session_id) = run.session_id.as_deref() {
        lines.push(format!("Session: {session_id}"));
        lines.push(format!("Started: {}", fmt_ts(run.session_started_at)));
        lines.push(format!("Ended: {}", fmt_ts(run.session_ended_at)));
    }
    if view.has_open_session {
        lines.push(format!("Elapsed: {}", view.elapsed));
    }

    let next = match view.phase {
        LifecyclePhase::NoCycle => "start (--start <STATUS_ID>)",
        LifecyclePhase::CycleOpenSession => "stop (--stop)",
        LifecyclePhase::CycleClosedSession => "none",
    };
    lines.push(format!("Next: {next}"));

    TextSummary { lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RunItem, RunState};
    use time::macros::datetime;

    #[test]
    fn open_session_summary_shows_clock_and_stop() {
        let run = RunState {
            cycle_id: Some("c1".into()),
            session_id: Some("s1".into()),
            session_started_at: Some(datetime!(2024-05-01 10:00 UTC)),
            session_ended_at: None,
        };
        let view = PanelView {
            open: true,
            item: Some(RunItem {
                id: "a".into(),
                title: "Celeste".into(),
            }),
            phase: run.phase(),
            has_active_cycle: true,
            has_open_session: true,
            elapsed_secs: 125,
            elapsed: "00:02:05".into(),
            clock_running: true,
            run,
            ..Default::default()
        };
        let lines = build_text_summary(&view).lines;
        assert_eq!(lines[0], "Item: Celeste (a)");
        assert!(lines.contains(&"Started: 2024-05-01T10:00:00Z".to_string()));
        assert!(lines.contains(&"Ended: -".to_string()));
        assert!(lines.contains(&"Elapsed: 00:02:05".to_string()));
        assert_eq!(lines.last().unwrap(), "Next: stop (--stop)");
    }

    #[test]
    fn empty_view_offers_start() {
        let lines = build_text_summary(&PanelView::default()).lines;
        assert_eq!(lines, vec!["State: No cycle", "Next: start (--start <STATUS_ID>)"]);
    }
}
