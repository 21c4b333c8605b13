//! JSON file store for items, statuses, cycles and sessions.
//!
//! The whole document is kept in memory and rewritten atomically after every mutation.
//! A mutation only reaches the in-memory copy once the write succeeded.

use crate::backend::{non_blank, ItemCatalog, RunBackend, StatusCatalog};
use crate::model::{RunItem, RunState, RunStatusOption, Score};
use anyhow::Result;
use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unknown item: {0}")]
    UnknownItem(String),
    #[error("unknown status: {0}")]
    UnknownStatus(String),
    #[error("item {0} already has a cycle")]
    CycleExists(String),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{path} is not a valid run store: {source}")]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CycleRecord {
    id: String,
    item_id: String,
    status_id: String,
    #[serde(with = "time::serde::rfc3339")]
    started_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    id: String,
    cycle_id: String,
    #[serde(with = "time::serde::rfc3339")]
    started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    ended_at: Option<OffsetDateTime>,
    #[serde(default)]
    start_note: Option<String>,
    #[serde(default)]
    score: Option<Score>,
    #[serde(default)]
    end_note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    items: Vec<RunItem>,
    #[serde(default)]
    statuses: Vec<RunStatusOption>,
    #[serde(default)]
    cycles: Vec<CycleRecord>,
    #[serde(default)]
    sessions: Vec<SessionRecord>,
}

impl StoreData {
    fn snapshot(&self, item_id: &str) -> RunState {
        // Records are appended in time order; on equal timestamps the later record wins.
        let Some(cycle) = self
            .cycles
            .iter()
            .filter(|c| c.item_id == item_id)
            .max_by_key(|c| c.started_at)
        else {
            return RunState::default();
        };
        let session = self
            .sessions
            .iter()
            .filter(|s| s.cycle_id == cycle.id)
            .max_by_key(|s| s.started_at);
        RunState {
            cycle_id: Some(cycle.id.clone()),
            session_id: session.map(|s| s.id.clone()),
            session_started_at: session.map(|s| s.started_at),
            session_ended_at: session.and_then(|s| s.ended_at),
        }
    }
}

/// Default store location under the platform data directory.
pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("playrun")
        .join("runs.json")
}

/// Random identifier with a readable prefix, e.g. `cyc-3f9a1c0b2d4e5f60`.
fn gen_id(prefix: &str) -> String {
    let mut b = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut b);
    format!("{prefix}-{:016x}", u64::from_le_bytes(b))
}

pub struct FileStore {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let data = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| {
                StoreError::Malformed {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(source) => return Err(StoreError::Read { path, source }),
        };
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, data: &StoreData) -> Result<(), StoreError> {
        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        let json = serde_json::to_vec_pretty(data).map_err(|e| write_err(e.into()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    /// Apply `f` to a copy of `data`, persist the copy, then adopt it.
    async fn commit<T>(
        &self,
        data: &mut StoreData,
        f: impl FnOnce(&mut StoreData) -> T,
    ) -> Result<T, StoreError> {
        let mut next = data.clone();
        let out = f(&mut next);
        self.persist(&next).await?;
        *data = next;
        Ok(out)
    }
}

#[async_trait]
impl RunBackend for FileStore {
    async fn load_state(&self, item_id: &str) -> Result<RunState> {
        let data = self.data.lock().await;
        if !data.items.iter().any(|i| i.id == item_id) {
            return Err(StoreError::UnknownItem(item_id.to_string()).into());
        }
        let state = data.snapshot(item_id);
        if let Err(violation) = state.check_invariants() {
            tracing::warn!(item_id, %violation, "stored run state violates invariants");
        }
        Ok(state)
    }

    async fn start(&self, item_id: &str, status_id: &str, note: Option<&str>) -> Result<RunState> {
        let mut data = self.data.lock().await;
        if !data.items.iter().any(|i| i.id == item_id) {
            return Err(StoreError::UnknownItem(item_id.to_string()).into());
        }
        if !data.statuses.iter().any(|s| s.id == status_id) {
            return Err(StoreError::UnknownStatus(status_id.to_string()).into());
        }
        if data.cycles.iter().any(|c| c.item_id == item_id) {
            return Err(StoreError::CycleExists(item_id.to_string()).into());
        }

        let now = OffsetDateTime::now_utc();
        let cycle = CycleRecord {
            id: gen_id("cyc"),
            item_id: item_id.to_string(),
            status_id: status_id.to_string(),
            started_at: now,
        };
        let session = SessionRecord {
            id: gen_id("ses"),
            cycle_id: cycle.id.clone(),
            started_at: now,
            ended_at: None,
            start_note: note.and_then(non_blank).map(str::to_string),
            score: None,
            end_note: None,
        };
        let state = self
            .commit(&mut data, |d| {
                d.cycles.push(cycle);
                d.sessions.push(session);
                d.snapshot(item_id)
            })
            .await?;
        tracing::info!(item_id, status_id, cycle_id = ?state.cycle_id, session_id = ?state.session_id, "cycle started");
        Ok(state)
    }

    async fn stop(
        &self,
        session_id: &str,
        score: Option<&Score>,
        note: Option<&str>,
    ) -> Result<bool> {
        let mut data = self.data.lock().await;
        let Some(session) = data.sessions.iter().find(|s| s.id == session_id) else {
            tracing::warn!(session_id, "stop requested for unknown session");
            return Ok(false);
        };
        if session.ended_at.is_some() {
            tracing::warn!(session_id, "stop requested for a session that already ended");
            return Ok(false);
        }
        let ended_at = OffsetDateTime::now_utc().max(session.started_at);
        let score = score.cloned();
        let end_note = note.and_then(non_blank).map(str::to_string);
        self.commit(&mut data, |d| {
            if let Some(session) = d.sessions.iter_mut().find(|s| s.id == session_id) {
                session.ended_at = Some(ended_at);
                session.score = score;
                session.end_note = end_note;
            }
        })
        .await?;
        tracing::info!(session_id, "session stopped");
        Ok(true)
    }
}

#[async_trait]
impl StatusCatalog for FileStore {
    async fn statuses(&self) -> Result<Vec<RunStatusOption>> {
        Ok(self.data.lock().await.statuses.clone())
    }

    async fn ensure_default_statuses(&self) -> Result<Vec<RunStatusOption>> {
        let mut data = self.data.lock().await;
        if data.statuses.is_empty() {
            let defaults: Vec<RunStatusOption> = [("todo", "Todo"), ("playing", "Playing"), ("done", "Done")]
                .into_iter()
                .map(|(id, name)| RunStatusOption {
                    id: id.to_string(),
                    name: name.to_string(),
                    active: Some(id == "playing"),
                })
                .collect();
            self.commit(&mut data, |d| d.statuses = defaults).await?;
            tracing::info!("provisioned default statuses");
        }
        Ok(data.statuses.clone())
    }
}

#[async_trait]
impl ItemCatalog for FileStore {
    async fn items(&self) -> Result<Vec<RunItem>> {
        Ok(self.data.lock().await.items.clone())
    }

    async fn add_item(&self, title: &str) -> Result<RunItem> {
        let title = non_blank(title).ok_or_else(|| anyhow::anyhow!("item title is empty"))?;
        let mut data = self.data.lock().await;
        let item = RunItem {
            id: gen_id("itm"),
            title: title.to_string(),
        };
        self.commit(&mut data, |d| d.items.push(item.clone())).await?;
        Ok(item)
    }
}
