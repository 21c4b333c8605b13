//! Run lifecycle controller for one side panel.
//!
//! Holds the panel's `RunState` and drafts, and folds backend results back in. Every
//! asynchronous result is tagged with the `Ticket` it was started under; opening, closing
//! or switching items bumps the generation so late results for an older ticket are dropped.
//! Within one generation only the newest load (or a start that lands after it) is applied.

use crate::backend::{non_blank, RunBackend};
use crate::clock;
use crate::model::{DraftField, Drafts, Outcome, PanelView, RunItem, RunState, Score};
use anyhow::Result;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;

/// Identifies the (open, item) pair an operation was started for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
    item_id: String,
}

#[derive(Debug, Default)]
struct PanelState {
    open: bool,
    item: Option<RunItem>,
    generation: u64,
    /// Bumped when a load is issued or a start result is applied.
    load_seq: u64,
    run: RunState,
    drafts: Drafts,
}

impl PanelState {
    fn ticket(&self) -> Option<Ticket> {
        if !self.open {
            return None;
        }
        self.item.as_ref().map(|item| Ticket {
            generation: self.generation,
            item_id: item.id.clone(),
        })
    }

    fn is_current(&self, ticket: &Ticket) -> bool {
        self.open && self.generation == ticket.generation
    }

    /// Drop everything scoped to the previous (open, item) pair.
    fn advance(&mut self) {
        self.generation += 1;
        self.run = RunState::default();
        self.drafts = Drafts::default();
    }

    fn view(&self, now: OffsetDateTime) -> PanelView {
        let started = self.run.open_session_start();
        let elapsed_secs = clock::elapsed_since(started, now);
        PanelView {
            open: self.open,
            item: self.item.clone(),
            run: self.run.clone(),
            phase: self.run.phase(),
            has_active_cycle: self.run.has_active_cycle(),
            has_open_session: self.run.has_open_session(),
            elapsed_secs,
            elapsed: clock::format_hms(elapsed_secs),
            clock_running: self.open && started.is_some(),
            drafts: self.drafts.clone(),
        }
    }
}

/// Cheap to clone; clones share the same panel.
#[derive(Clone)]
pub struct LifecycleController {
    backend: Arc<dyn RunBackend>,
    state: Arc<Mutex<PanelState>>,
}

impl LifecycleController {
    pub fn new(backend: Arc<dyn RunBackend>) -> Self {
        Self {
            backend,
            state: Arc::new(Mutex::new(PanelState::default())),
        }
    }

    /// Open the panel for `item`, or switch the open panel to it.
    ///
    /// Returns the ticket to load under when this was a transition, `None` when the panel
    /// was already open on the same item.
    pub async fn open(&self, item: RunItem) -> Option<Ticket> {
        let mut st = self.state.lock().await;
        let same_item = st.item.as_ref().is_some_and(|cur| cur.id == item.id);
        if st.open && same_item {
            st.item = Some(item);
            return None;
        }
        st.advance();
        st.open = true;
        tracing::debug!(item_id = %item.id, generation = st.generation, "panel opened");
        st.item = Some(item);
        st.ticket()
    }

    /// Close the panel. In-flight results for the old ticket will be discarded.
    pub async fn close(&self) {
        let mut st = self.state.lock().await;
        if !st.open {
            return;
        }
        st.advance();
        st.open = false;
        tracing::debug!(generation = st.generation, "panel closed");
    }

    /// Ticket for the current (open, item) pair, if the panel is open.
    pub async fn current_ticket(&self) -> Option<Ticket> {
        self.state.lock().await.ticket()
    }

    pub async fn view(&self, now: OffsetDateTime) -> PanelView {
        self.state.lock().await.view(now)
    }

    pub async fn set_draft(&self, field: DraftField, value: String) {
        self.state.lock().await.drafts.set(field, value);
    }

    /// Load the authoritative state for the current item.
    pub async fn load(&self) -> Outcome {
        match self.current_ticket().await {
            Some(ticket) => self.load_for(&ticket).await,
            None => Outcome::Skipped,
        }
    }

    /// Load for a specific ticket; the result is only committed if the ticket is still current.
    ///
    /// A load issued later (or a start applied meanwhile) supersedes this one.
    pub async fn load_for(&self, ticket: &Ticket) -> Outcome {
        let seq = {
            let mut st = self.state.lock().await;
            if !st.is_current(ticket) {
                return Outcome::Stale;
            }
            st.load_seq += 1;
            st.load_seq
        };
        let res = self.backend.load_state(&ticket.item_id).await;
        let mut st = self.state.lock().await;
        if !st.is_current(ticket) || st.load_seq != seq {
            tracing::debug!(item_id = %ticket.item_id, seq, "discarding stale load");
            return Outcome::Stale;
        }
        match res {
            Ok(run) => {
                tracing::debug!(item_id = %ticket.item_id, phase = ?run.phase(), "run state loaded");
                st.run = run;
                st.drafts = Drafts::default();
                Outcome::Applied
            }
            Err(e) => {
                tracing::warn!(item_id = %ticket.item_id, error = %format!("{e:#}"), "load failed");
                Outcome::Rejected {
                    reason: Some(format!("{e:#}")),
                }
            }
        }
    }

    /// Start a cycle and its first session for the current item.
    ///
    /// A blank `status_id` or a closed panel is a no-op. Backend failures are returned to
    /// the caller with local state untouched.
    pub async fn start(&self, status_id: &str, note: &str) -> Result<Outcome> {
        let Some(status_id) = non_blank(status_id) else {
            return Ok(Outcome::Skipped);
        };
        let Some(ticket) = self.current_ticket().await else {
            return Ok(Outcome::Skipped);
        };

        let run = self
            .backend
            .start(&ticket.item_id, status_id, non_blank(note))
            .await
            .map_err(|e| {
                tracing::warn!(item_id = %ticket.item_id, status_id, error = %format!("{e:#}"), "start failed");
                e
            })?;

        let mut st = self.state.lock().await;
        if !st.is_current(&ticket) {
            tracing::debug!(item_id = %ticket.item_id, "discarding stale start result");
            return Ok(Outcome::Stale);
        }
        tracing::info!(item_id = %ticket.item_id, status_id, session_id = ?run.session_id, "run started");
        // Loads issued before this point read pre-start state.
        st.load_seq += 1;
        st.run = run;
        Ok(Outcome::Applied)
    }

    /// Stop the open session, then reload so the displayed end time is what the backend stored.
    pub async fn stop(&self, score: Option<Score>, note: &str) -> Outcome {
        let (ticket, session_id) = {
            let st = self.state.lock().await;
            match (st.ticket(), st.run.session_id.clone()) {
                (Some(ticket), Some(session_id)) => (ticket, session_id),
                _ => return Outcome::Skipped,
            }
        };

        let stopped = match self
            .backend
            .stop(&session_id, score.as_ref(), non_blank(note))
            .await
        {
            Ok(stopped) => stopped,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %format!("{e:#}"), "stop failed");
                return Outcome::Rejected {
                    reason: Some(format!("{e:#}")),
                };
            }
        };
        if !stopped {
            tracing::warn!(session_id = %session_id, "backend refused to stop session");
            return Outcome::Rejected { reason: None };
        }

        tracing::info!(session_id = %session_id, "session stopped; reloading");
        self.load_for(&ticket).await
    }
}
