//! Per-room playback state, kept either in process memory or in SQLite.
//!
//! The state outlives any connection: a room is created here first and
//! only then can clients join it.

use std::{str::FromStr, sync::Arc};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::info;

use crate::error::AppResult;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS room_state (
    room_id    TEXT PRIMARY KEY,
    url        TEXT,
    is_playing INTEGER NOT NULL DEFAULT 0,
    started_at INTEGER,
    paused_at  INTEGER
)";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub url:        Option<String>,
    pub is_playing: bool,
    pub started_at: Option<i64>,   // epoch ms; now - started_at = elapsed while playing
    pub paused_at:  Option<i64>,   // epoch ms of the last pause
}

impl PlaybackState {
    pub fn has_media(&self) -> bool {
        self.url.as_deref().is_some_and(|u| !u.is_empty())
    }

    /// Paused with a frozen offset.
    pub fn is_paused(&self) -> bool { !self.is_playing && self.paused_at.is_some() }

    /// Playback position in milliseconds at server time `now`.
    pub fn elapsed_ms(&self, now: i64) -> Option<i64> {
        let started = self.started_at?;
        match self.paused_at {
            Some(p) if !self.is_playing => Some(p.saturating_sub(started)),
            _ if self.is_playing        => Some(now.saturating_sub(started)),
            _                           => None,
        }
    }

    pub fn apply(&mut self, patch: StatePatch) {
        if let Some(url) = patch.url { self.url = Some(url); }
        if let Some(p) = patch.is_playing { self.is_playing = p; }
        if let Some(s) = patch.started_at { self.started_at = s; }
        if let Some(p) = patch.paused_at { self.paused_at = p; }
    }
}

/// Merge update: `None` leaves a field alone, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub url:        Option<String>,
    pub is_playing: Option<bool>,
    pub started_at: Option<Option<i64>>,
    pub paused_at:  Option<Option<i64>>,
}

#[derive(Clone)]
pub enum Store {
    Memory(Arc<DashMap<String, PlaybackState>>),
    Sqlite(SqlitePool),
}

type Row = (Option<String>, bool, Option<i64>, Option<i64>);

fn from_row((url, is_playing, started_at, paused_at): Row) -> PlaybackState {
    PlaybackState { url, is_playing, started_at, paused_at }
}

impl Store {
    pub fn memory() -> Self { Store::Memory(Arc::default()) }

    pub async fn sqlite(url: &str) -> AppResult<Self> {
        let opts = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let mut pool = SqlitePoolOptions::new();
        // every in-memory connection is its own database
        if url.contains(":memory:") {
            pool = pool.max_connections(1).idle_timeout(None).max_lifetime(None);
        }
        let pool = pool.connect_with(opts).await?;
        sqlx::query(SCHEMA).execute(&pool).await?;
        info!(url, "playback state stored in sqlite");
        Ok(Store::Sqlite(pool))
    }

    pub async fn exists(&self, room: &str) -> AppResult<bool> {
        match self {
            Store::Memory(map) => Ok(map.contains_key(room)),
            Store::Sqlite(pool) => {
                let hit: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM room_state WHERE room_id = ?")
                    .bind(room)
                    .fetch_optional(pool)
                    .await?;
                Ok(hit.is_some())
            }
        }
    }

    pub async fn get_or_create(&self, room: &str) -> AppResult<PlaybackState> {
        match self {
            Store::Memory(map) => Ok(map.entry(room.to_owned()).or_default().clone()),
            Store::Sqlite(pool) => {
                sqlx::query("INSERT OR IGNORE INTO room_state (room_id) VALUES (?)")
                    .bind(room)
                    .execute(pool)
                    .await?;
                let row: Row = sqlx::query_as(
                    "SELECT url, is_playing, started_at, paused_at FROM room_state WHERE room_id = ?",
                )
                .bind(room)
                .fetch_one(pool)
                .await?;
                Ok(from_row(row))
            }
        }
    }

    /// Merges `patch` into the room's state, creating it first if needed.
    pub async fn update(&self, room: &str, patch: StatePatch) -> AppResult<PlaybackState> {
        match self {
            Store::Memory(map) => {
                let mut st = map.entry(room.to_owned()).or_default();
                st.apply(patch);
                Ok(st.clone())
            }
            Store::Sqlite(pool) => {
                let mut tx = pool.begin().await?;
                sqlx::query("INSERT OR IGNORE INTO room_state (room_id) VALUES (?)")
                    .bind(room)
                    .execute(&mut *tx)
                    .await?;
                let row: Row = sqlx::query_as(
                    "SELECT url, is_playing, started_at, paused_at FROM room_state WHERE room_id = ?",
                )
                .bind(room)
                .fetch_one(&mut *tx)
                .await?;

                let mut st = from_row(row);
                st.apply(patch);

                sqlx::query(
                    "UPDATE room_state SET url = ?, is_playing = ?, started_at = ?, paused_at = ? WHERE room_id = ?",
                )
                .bind(&st.url)
                .bind(st.is_playing)
                .bind(st.started_at)
                .bind(st.paused_at)
                .bind(room)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                Ok(st)
            }
        }
    }
}
