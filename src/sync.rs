//! Playback synchronisation: the wire messages, the per-room state machine
//! and the hub that ties the registry and the store together.
//!
//! All timestamps are server epoch milliseconds supplied by the caller as
//! `now`, so every client converges on one clock.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    error::{ActionError, AppResult},
    registry::{Conn, Registry, Role},
    store::{PlaybackState, StatePatch, Store},
};

/* ------------ 上行：客戶端動作 ------------ */
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Play,
    Pause,
    ChangeUrl { url: String },
    Seek { time: f64 },           // seconds
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind:    String,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)] struct UrlPayload  { url: String }
#[derive(Deserialize)] struct SeekPayload { time: f64 }

/// Longest offset a `SEEK` may ask for: one year of media.
pub const MAX_SEEK_SECS: f64 = 365.0 * 24.0 * 3600.0;

fn payload<T: serde::de::DeserializeOwned>(action: &'static str, v: Value) -> Result<T, ActionError> {
    serde_json::from_value(v).map_err(|e| ActionError::Payload { action, reason: e.to_string() })
}

impl Action {
    pub fn parse(raw: &str) -> Result<Self, ActionError> {
        let env: Envelope = serde_json::from_str(raw)?;
        match env.kind.as_str() {
            "PLAY"  => Ok(Action::Play),
            "PAUSE" => Ok(Action::Pause),
            "CHANGE_URL" => {
                let UrlPayload { url } = payload("CHANGE_URL", env.payload)?;
                let url = url.trim();
                if url.is_empty() {
                    return Err(ActionError::Payload { action: "CHANGE_URL", reason: "url is empty".into() });
                }
                Ok(Action::ChangeUrl { url: url.to_owned() })
            }
            "SEEK" => {
                let SeekPayload { time } = payload("SEEK", env.payload)?;
                if !time.is_finite() || !(0.0..=MAX_SEEK_SECS).contains(&time) {
                    return Err(ActionError::Payload { action: "SEEK", reason: format!("bad time {time}") });
                }
                Ok(Action::Seek { time })
            }
            other => Err(ActionError::Unknown(other.to_owned())),
        }
    }
}

/* ------------ 下行：伺服器訊息 ------------ */
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Snapshot {
    #[serde(flatten)]
    pub state:       PlaybackState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seek_to:     Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMsg {
    YouAre    { role: Role },
    RoomUsers { users: Vec<Role>, count: usize },
    SyncState(Snapshot),
    Play      { started_at: i64, seek_to: f64, server_time: i64 },
    Pause     { paused_at: i64 },
    ChangeUrl { url: String, started_at: i64 },
    Seek      { time: f64 },
    Error     { message: String },
}

impl ServerMsg {
    pub fn frame(&self) -> String { serde_json::to_string(self).unwrap_or_default() }
}

fn secs(ms: i64) -> f64 { ms as f64 / 1000.0 }

/// Join-time view of the room. A playing state gets the offset the new
/// client has to seek to.
pub fn snapshot(state: PlaybackState, now: i64) -> Snapshot {
    let seek_to = state.is_playing.then(|| state.elapsed_ms(now)).flatten().map(secs);
    Snapshot { server_time: seek_to.map(|_| now), seek_to, state }
}

/// One step of the state machine. `None` means the action is ignored:
/// no state change and nothing broadcast.
pub fn transition(state: &PlaybackState, action: &Action, now: i64) -> Option<(StatePatch, ServerMsg)> {
    match action {
        Action::Play => {
            if !state.has_media() { return None; }
            let started_at = if state.is_paused() {
                now.saturating_sub(state.elapsed_ms(now).unwrap_or(0))
            } else {
                now
            };
            let patch = StatePatch {
                is_playing: Some(true),
                started_at: Some(Some(started_at)),
                paused_at:  Some(None),
                ..Default::default()
            };
            Some((patch, ServerMsg::Play { started_at, seek_to: secs(now.saturating_sub(started_at)), server_time: now }))
        }
        Action::Pause => {
            // a second pause must not stretch the frozen offset
            let paused_at = match state.paused_at {
                Some(p) if !state.is_playing => p,
                _ => now,
            };
            let patch = StatePatch { is_playing: Some(false), paused_at: Some(Some(paused_at)), ..Default::default() };
            Some((patch, ServerMsg::Pause { paused_at }))
        }
        Action::ChangeUrl { url } => {
            let patch = StatePatch {
                url:        Some(url.clone()),
                is_playing: Some(true),
                started_at: Some(Some(now)),
                paused_at:  Some(None),
            };
            Some((patch, ServerMsg::ChangeUrl { url: url.clone(), started_at: now }))
        }
        Action::Seek { time } => {
            let mut patch = StatePatch {
                started_at: Some(Some(now.saturating_sub((time * 1000.0).round() as i64))),
                ..Default::default()
            };
            if state.is_paused() {
                patch.paused_at = Some(Some(now));
            }
            Some((patch, ServerMsg::Seek { time: *time }))
        }
    }
}

/* ------------ Hub ------------ */
#[derive(Clone)]
pub struct SyncHub {
    registry: Registry,
    store:    Store,
}

impl SyncHub {
    pub fn new(registry: Registry, store: Store) -> Self { Self { registry, store } }

    pub fn registry(&self) -> &Registry { &self.registry }

    /// Admits `conn`, tells it its role, refreshes everyone's roster and
    /// hands the newcomer a clock-compensated snapshot.
    pub async fn join(&self, room: &str, conn: &Conn, now: i64) -> AppResult<()> {
        let turn = self.registry.connect(conn, room);
        let _turn = turn.lock().await;

        let Some(role) = self.registry.role_of(conn.id, room) else {
            warn!(room, conn = %conn.id, "connection gone before join completed");
            return Ok(());
        };
        debug!(room, conn = %conn.id, ?role, "joined");
        conn.send(ServerMsg::YouAre { role }.frame());
        self.deliver(room, &self.roster_msg(room), None);

        let mut state = self.store.get_or_create(room).await?;
        if state.is_playing && state.started_at.is_none() {
            state = self
                .store
                .update(room, StatePatch { started_at: Some(Some(now)), ..Default::default() })
                .await?;
        }
        conn.send(ServerMsg::SyncState(snapshot(state, now)).frame());
        Ok(())
    }

    /// Applies one inbound frame. Bad frames are answered with `ERROR`
    /// to the sender only; store failures are returned.
    pub async fn dispatch(&self, room: &str, conn: &Conn, raw: &str, now: i64) -> AppResult<()> {
        let action = match Action::parse(raw) {
            Ok(a) => a,
            Err(e) => {
                warn!(room, conn = %conn.id, error = %e, "action rejected");
                conn.send(ServerMsg::Error { message: e.to_string() }.frame());
                return Ok(());
            }
        };

        let Some(turn) = self.registry.turn(room) else { return Ok(()) };
        let _turn = turn.lock().await;

        let state = self.store.get_or_create(room).await?;
        let Some((patch, event)) = transition(&state, &action, now) else {
            debug!(room, ?action, "ignored");
            return Ok(());
        };
        self.store.update(room, patch).await?;
        self.deliver(room, &event, None);
        Ok(())
    }

    /// Disconnect sequence; safe to call more than once.
    pub async fn leave(&self, room: &str, id: Uuid) {
        let Some(turn) = self.registry.turn(room) else { return };
        let _turn = turn.lock().await;
        if self.registry.disconnect(id, room) {
            debug!(room, conn = %id, "left");
            self.deliver(room, &self.roster_msg(room), None);
        }
    }

    fn roster_msg(&self, room: &str) -> ServerMsg {
        let (users, count) = self.registry.roster(room);
        ServerMsg::RoomUsers { users, count }
    }

    /// Broadcasts `msg`; recipients whose transport is gone are dropped
    /// from the room and the survivors get a fresh roster.
    fn deliver(&self, room: &str, msg: &ServerMsg, exclude: Option<Uuid>) {
        let mut dead = self.registry.broadcast(&msg.frame(), room, exclude);
        while !dead.is_empty() {
            for id in dead {
                warn!(room, conn = %id, "dropping dead connection");
                self.registry.disconnect(id, room);
            }
            dead = self.registry.broadcast(&self.roster_msg(room).frame(), room, None);
        }
    }
}
