//! Durable per-process progress log.
//!
//! Events live in an external key/value store under `process:<id>` (an
//! append-only list) with a separate `process:STATUS:<id>` terminal flag.
//! Appends after `mark_finished` are permitted — the final summary events are
//! written around the same instant — but `is_finished` is authoritative for
//! stream termination.

pub mod bus;

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::config::RedisConfig;
use crate::domain::ProgressEvent;

const FINISHED: &str = "finished";

fn events_key(process_id: &str) -> String {
    format!("process:{process_id}")
}

fn status_key(process_id: &str) -> String {
    format!("process:STATUS:{process_id}")
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Append one event to the process's ordered log.
    async fn append(&self, process_id: &str, event: &ProgressEvent) -> Result<()>;

    /// The full ordered event sequence since creation.
    async fn list(&self, process_id: &str) -> Result<Vec<ProgressEvent>>;

    /// Idempotently set the terminal flag.
    async fn mark_finished(&self, process_id: &str) -> Result<()>;

    /// Whether the terminal flag is set; an absent key reads as false.
    async fn is_finished(&self, process_id: &str) -> Result<bool>;
}

// ── Redis-backed store ───────────────────────────────────────────────

pub struct RedisProgressStore {
    conn: ConnectionManager,
}

impl RedisProgressStore {
    /// Connect using a managed connection that reconnects on failure.
    pub async fn connect(cfg: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(cfg.url()).context("invalid redis url")?;
        let conn = ConnectionManager::new(client)
            .await
            .context("failed to connect to redis")?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl ProgressStore for RedisProgressStore {
    async fn append(&self, process_id: &str, event: &ProgressEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .rpush(events_key(process_id), payload)
            .await
            .context("failed to append progress event")?;
        Ok(())
    }

    async fn list(&self, process_id: &str) -> Result<Vec<ProgressEvent>> {
        let mut conn = self.conn.clone();
        let rows: Vec<String> = conn
            .lrange(events_key(process_id), 0, -1)
            .await
            .context("failed to read progress events")?;
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_str(&row) {
                Ok(event) => events.push(event),
                Err(err) => tracing::error!(%err, "skipping undecodable progress event"),
            }
        }
        Ok(events)
    }

    async fn mark_finished(&self, process_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set(status_key(process_id), FINISHED)
            .await
            .context("failed to mark process as finished")?;
        Ok(())
    }

    async fn is_finished(&self, process_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let status: Option<String> = conn
            .get(status_key(process_id))
            .await
            .context("failed to read process status")?;
        Ok(status.as_deref() == Some(FINISHED))
    }
}

// ── In-memory store ──────────────────────────────────────────────────

/// Keeps the same key-space shape as the redis store; used by tests and as a
/// stand-in when no external store is available.
#[derive(Default)]
pub struct MemoryProgressStore {
    entries: Mutex<HashMap<String, Vec<String>>>,
    status: Mutex<HashMap<String, String>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn append(&self, process_id: &str, event: &ProgressEvent) -> Result<()> {
        let payload = serde_json::to_string(event)?;
        self.entries
            .lock()
            .expect("progress entries lock")
            .entry(events_key(process_id))
            .or_default()
            .push(payload);
        Ok(())
    }

    async fn list(&self, process_id: &str) -> Result<Vec<ProgressEvent>> {
        let rows = self
            .entries
            .lock()
            .expect("progress entries lock")
            .get(&events_key(process_id))
            .cloned()
            .unwrap_or_default();
        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_str(&row) {
                Ok(event) => events.push(event),
                Err(err) => tracing::error!(%err, "skipping undecodable progress event"),
            }
        }
        Ok(events)
    }

    async fn mark_finished(&self, process_id: &str) -> Result<()> {
        self.status
            .lock()
            .expect("progress status lock")
            .insert(status_key(process_id), FINISHED.to_string());
        Ok(())
    }

    async fn is_finished(&self, process_id: &str) -> Result<bool> {
        Ok(self
            .status
            .lock()
            .expect("progress status lock")
            .get(&status_key(process_id))
            .map(String::as_str)
            == Some(FINISHED))
    }
}
