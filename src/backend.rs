//! Persistence capabilities consumed by the lifecycle controller.
//!
//! The controller never talks to storage directly; it is handed a `RunBackend` so the
//! transport can be swapped (file store, remote API, test double).

use crate::model::{RunItem, RunState, RunStatusOption, Score};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait RunBackend: Send + Sync {
    /// Fetch the current cycle/session snapshot for an item.
    async fn load_state(&self, item_id: &str) -> Result<RunState>;

    /// Create a cycle in `status_id` together with its first session and return the new snapshot.
    async fn start(&self, item_id: &str, status_id: &str, note: Option<&str>) -> Result<RunState>;

    /// Close a session. `Ok(false)` means the backend refused.
    async fn stop(&self, session_id: &str, score: Option<&Score>, note: Option<&str>)
        -> Result<bool>;
}

/// Statuses a cycle can start in. Owned by the caller, not the controller.
#[async_trait]
pub trait StatusCatalog: Send + Sync {
    async fn statuses(&self) -> Result<Vec<RunStatusOption>>;

    /// Create the default statuses when none exist yet. Returns the resulting list.
    async fn ensure_default_statuses(&self) -> Result<Vec<RunStatusOption>>;
}

#[async_trait]
pub trait ItemCatalog: Send + Sync {
    async fn items(&self) -> Result<Vec<RunItem>>;

    async fn add_item(&self, title: &str) -> Result<RunItem>;
}

/// Blank user input is treated as absent.
pub(crate) fn non_blank(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}
