//! Panel orchestration loop.
//!
//! Turns UI commands into controller operations, runs them concurrently, and emits
//! render-ready views back to presentation layers. Also owns the 1 Hz clock tick.

use super::panel::LifecycleController;
use crate::clock::SessionTicker;
use crate::model::{DraftField, Outcome, PanelView, RunItem, Score};
use anyhow::Result;
use time::OffsetDateTime;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::task::JoinSet;

/// Commands emitted by UI layers.
#[derive(Debug, Clone)]
pub(crate) enum UiCommand {
    /// Open the panel for an item, or switch the open panel to another item.
    Open(RunItem),
    Close,
    Reload,
    SetDraft(DraftField, String),
    Start {
        status_id: String,
        note: String,
    },
    Stop {
        score: Option<Score>,
        note: String,
    },
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PanelAction {
    Load,
    Start,
    Stop,
}

/// Events emitted back to UI layers.
#[derive(Debug, Clone)]
pub(crate) enum PanelEvent {
    View(Box<PanelView>),
    /// An asynchronous operation settled. Errors are the backend's own text.
    ActionFinished {
        action: PanelAction,
        result: Result<Outcome, String>,
    },
}

type Settled = (PanelAction, Result<Outcome, String>);

/// Keep the ticker in step with the view: one ticker per open session, none otherwise.
fn sync_ticker(view: &PanelView, ticker: &mut Option<SessionTicker>) {
    let wanted = if view.clock_running {
        view.run.session_id.as_deref()
    } else {
        None
    };
    match wanted {
        Some(id) if ticker.as_ref().map(SessionTicker::session_id) == Some(id) => {}
        Some(id) => *ticker = Some(SessionTicker::new(id.to_string())),
        None => *ticker = None,
    }
}

async fn emit_view(
    ctl: &LifecycleController,
    event_tx: &UnboundedSender<PanelEvent>,
    ticker: &mut Option<SessionTicker>,
) {
    let view = ctl.view(OffsetDateTime::now_utc()).await;
    sync_ticker(&view, ticker);
    let _ = event_tx.send(PanelEvent::View(Box::new(view)));
}

/// Drive the panel from UI commands until `Quit` (or the command channel closes).
///
/// Quit waits for in-flight operations so a stop that already reached the backend is
/// not cut off mid-write.
pub(crate) async fn run_controller(
    ctl: LifecycleController,
    event_tx: UnboundedSender<PanelEvent>,
    mut cmd_rx: UnboundedReceiver<UiCommand>,
) -> Result<()> {
    let mut in_flight: JoinSet<Settled> = JoinSet::new();
    let mut ticker: Option<SessionTicker> = None;
    let mut quit_pending = false;

    emit_view(&ctl, &event_tx, &mut ticker).await;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv(), if !quit_pending => {
                match cmd {
                    Some(UiCommand::Open(item)) => {
                        if let Some(ticket) = ctl.open(item).await {
                            let ctl = ctl.clone();
                            in_flight.spawn(async move {
                                (PanelAction::Load, Ok(ctl.load_for(&ticket).await))
                            });
                        }
                        emit_view(&ctl, &event_tx, &mut ticker).await;
                    }
                    Some(UiCommand::Close) => {
                        ctl.close().await;
                        emit_view(&ctl, &event_tx, &mut ticker).await;
                    }
                    Some(UiCommand::Reload) => {
                        let ctl = ctl.clone();
                        in_flight.spawn(async move { (PanelAction::Load, Ok(ctl.load().await)) });
                    }
                    Some(UiCommand::SetDraft(field, value)) => {
                        ctl.set_draft(field, value).await;
                        emit_view(&ctl, &event_tx, &mut ticker).await;
                    }
                    Some(UiCommand::Start { status_id, note }) => {
                        let ctl = ctl.clone();
                        in_flight.spawn(async move {
                            let res = ctl
                                .start(&status_id, &note)
                                .await
                                .map_err(|e| format!("{e:#}"));
                            (PanelAction::Start, res)
                        });
                    }
                    Some(UiCommand::Stop { score, note }) => {
                        let ctl = ctl.clone();
                        in_flight.spawn(async move {
                            (PanelAction::Stop, Ok(ctl.stop(score, &note).await))
                        });
                    }
                    Some(UiCommand::Quit) | None => {
                        quit_pending = true;
                    }
                }
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                match joined {
                    Ok((action, result)) => {
                        let _ = event_tx.send(PanelEvent::ActionFinished { action, result });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "panel operation task failed");
                    }
                }
                emit_view(&ctl, &event_tx, &mut ticker).await;
            }
            // Ticks only wake the renderer; elapsed time is recomputed from the start timestamp.
            _ = async {
                match ticker.as_mut() {
                    Some(t) => t.tick().await,
                    None => futures::future::pending().await,
                }
            } => {
                emit_view(&ctl, &event_tx, &mut ticker).await;
            }
        }

        if quit_pending && in_flight.is_empty() {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LifecyclePhase, RunState};
    use crate::orchestrator::panel::tests::{item, open_state, ScriptedBackend};
    use std::sync::Arc;
    use tokio::sync::mpsc;
    use tokio::time::Duration;

    fn spawn_controller(
        backend: &Arc<ScriptedBackend>,
    ) -> (
        UnboundedSender<UiCommand>,
        UnboundedReceiver<PanelEvent>,
        tokio::task::JoinHandle<Result<()>>,
    ) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let ctl = LifecycleController::new(backend.clone());
        let handle = tokio::spawn(run_controller(ctl, event_tx, cmd_rx));
        (cmd_tx, event_rx, handle)
    }

    async fn next_finished(rx: &mut UnboundedReceiver<PanelEvent>) -> Settled {
        loop {
            match rx.recv().await.expect("controller alive") {
                PanelEvent::ActionFinished { action, result } => return (action, result),
                PanelEvent::View(_) => {}
            }
        }
    }

    async fn next_view(rx: &mut UnboundedReceiver<PanelEvent>) -> PanelView {
        loop {
            if let PanelEvent::View(v) = rx.recv().await.expect("controller alive") {
                return *v;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn clock_ticks_while_open_and_stops_after_stop() {
        let now = OffsetDateTime::now_utc();
        let backend = Arc::new(ScriptedBackend::default().with_state("a", open_state(now)));
        *backend.stop_result.lock().unwrap() = Some(Ok(true));
        let (cmd_tx, mut rx, handle) = spawn_controller(&backend);

        cmd_tx.send(UiCommand::Open(item("a"))).unwrap();
        assert_eq!(
            next_finished(&mut rx).await,
            (PanelAction::Load, Ok(Outcome::Applied))
        );
        let view = next_view(&mut rx).await;
        assert_eq!(view.phase, LifecyclePhase::CycleOpenSession);
        assert!(view.clock_running);

        // Paused time auto-advances to each tick; every tick produces a fresh view.
        for _ in 0..3 {
            assert!(next_view(&mut rx).await.clock_running);
        }

        backend.set_state(
            "a",
            RunState {
                session_ended_at: Some(now + time::Duration::seconds(600)),
                ..open_state(now)
            },
        );
        cmd_tx
            .send(UiCommand::Stop {
                score: Some(Score::Number(8.5)),
                note: "good run".into(),
            })
            .unwrap();
        assert_eq!(
            next_finished(&mut rx).await,
            (PanelAction::Stop, Ok(Outcome::Applied))
        );
        let view = next_view(&mut rx).await;
        assert_eq!(view.phase, LifecyclePhase::CycleClosedSession);
        assert!(!view.clock_running);

        let quiet = tokio::time::timeout(Duration::from_secs(10), rx.recv()).await;
        assert!(quiet.is_err(), "no ticks expected once the session ended");

        cmd_tx.send(UiCommand::Quit).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn closing_the_panel_stops_the_clock() {
        let now = OffsetDateTime::now_utc();
        let backend = Arc::new(ScriptedBackend::default().with_state("a", open_state(now)));
        let (cmd_tx, mut rx, handle) = spawn_controller(&backend);

        cmd_tx.send(UiCommand::Open(item("a"))).unwrap();
        next_finished(&mut rx).await;
        assert!(next_view(&mut rx).await.clock_running);

        cmd_tx.send(UiCommand::Close).unwrap();
        // A tick that was already due may still be delivered before the close lands.
        let view = loop {
            let v = next_view(&mut rx).await;
            if !v.open {
                break v;
            }
        };
        assert!(!view.clock_running);
        assert!(tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .is_err());

        drop(cmd_tx);
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn start_failure_is_reported_to_the_caller() {
        let backend = Arc::new(ScriptedBackend::default());
        *backend.start_result.lock().unwrap() = Some(Err("status missing".into()));
        let (cmd_tx, mut rx, handle) = spawn_controller(&backend);

        cmd_tx.send(UiCommand::Open(item("a"))).unwrap();
        next_finished(&mut rx).await;
        cmd_tx
            .send(UiCommand::Start {
                status_id: "todo".into(),
                note: String::new(),
            })
            .unwrap();
        let (action, result) = next_finished(&mut rx).await;
        assert_eq!(action, PanelAction::Start);
        assert!(result.unwrap_err().contains("status missing"));
        assert_eq!(next_view(&mut rx).await.phase, LifecyclePhase::NoCycle);

        cmd_tx.send(UiCommand::Quit).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn quit_waits_for_in_flight_operations() {
        let backend = Arc::new(ScriptedBackend::default());
        let gate = backend.gate("a");
        let (cmd_tx, mut rx, handle) = spawn_controller(&backend);

        cmd_tx.send(UiCommand::Open(item("a"))).unwrap();
        cmd_tx.send(UiCommand::Quit).unwrap();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(!handle.is_finished());

        gate.notify_one();
        handle.await.unwrap().unwrap();
        assert_eq!(
            next_finished(&mut rx).await,
            (PanelAction::Load, Ok(Outcome::Applied))
        );
    }

    #[tokio::test]
    async fn drafts_round_trip_through_views() {
        let backend = Arc::new(ScriptedBackend::default());
        let (cmd_tx, mut rx, handle) = spawn_controller(&backend);

        cmd_tx.send(UiCommand::Open(item("a"))).unwrap();
        next_finished(&mut rx).await;
        cmd_tx
            .send(UiCommand::SetDraft(DraftField::StartNote, "warmup".into()))
            .unwrap();
        let view = next_view(&mut rx).await;
        let view = if view.drafts.start_note.is_empty() {
            next_view(&mut rx).await
        } else {
            view
        };
        assert_eq!(view.drafts.start_note, "warmup");

        cmd_tx.send(UiCommand::Quit).unwrap();
        handle.await.unwrap().unwrap();
    }
}
