//! Room membership: who is in which room and who is admin.
//!
//! Each room lives in its own `DashMap` entry, so membership changes in one
//! room never contend with another. Every operation here is synchronous;
//! delivery is an enqueue into the recipient's outbox.

use std::{collections::VecDeque, sync::Arc};

use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

/* ------------ 連線 ------------ */
pub type Outbox = mpsc::UnboundedSender<String>;

/// One live connection: an identity plus the sending half of its outbox.
#[derive(Debug, Clone)]
pub struct Conn {
    pub id: Uuid,
    tx:     Outbox,
}

impl Conn {
    pub fn new(tx: Outbox) -> Self { Self { id: Uuid::new_v4(), tx } }

    /// `false` once the writer side of the transport is gone.
    pub fn send(&self, frame: String) -> bool { self.tx.send(frame).is_ok() }
}

impl PartialEq for Conn {
    fn eq(&self, other: &Self) -> bool { self.id == other.id }
}
impl Eq for Conn {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { Admin, Member }

/// Serialises "read state, mutate, broadcast" for a single room.
pub type Turn = Arc<Mutex<()>>;

/* ------------ 房間 ------------ */
struct Room {
    admin:   Conn,
    members: VecDeque<Conn>,          // join order, admin excluded
    turn:    Turn,
}

impl Room {
    fn open(admin: Conn) -> Self {
        Self { admin, members: VecDeque::new(), turn: Turn::default() }
    }

    fn tracks(&self, id: Uuid) -> bool {
        self.admin.id == id || self.members.iter().any(|m| m.id == id)
    }

    fn conns(&self) -> impl Iterator<Item = &Conn> {
        std::iter::once(&self.admin).chain(self.members.iter())
    }
}

#[derive(Clone, Default)]
pub struct Registry {
    rooms: Arc<DashMap<String, Room>>,
}

impl Registry {
    /// Admits `conn`; the first connection of a room becomes its admin.
    /// Admitting an already tracked connection changes nothing.
    pub fn connect(&self, conn: &Conn, room: &str) -> Turn {
        match self.rooms.entry(room.to_owned()) {
            Entry::Occupied(mut e) => {
                let r = e.get_mut();
                if !r.tracks(conn.id) {
                    r.members.push_back(conn.clone());
                    debug!(room, conn = %conn.id, "member joined");
                }
                r.turn.clone()
            }
            Entry::Vacant(e) => {
                info!(room, admin = %conn.id, "room opened");
                e.insert(Room::open(conn.clone())).turn.clone()
            }
        }
    }

    /// Removes `id` from the room. A departing admin hands over to the
    /// longest-waiting member; the last departure drops the room.
    /// Returns whether anything was removed.
    pub fn disconnect(&self, id: Uuid, room: &str) -> bool {
        let Entry::Occupied(mut e) = self.rooms.entry(room.to_owned()) else {
            return false;
        };

        if e.get().admin.id == id {
            match e.get_mut().members.pop_front() {
                Some(next) => {
                    info!(room, admin = %next.id, "admin promoted");
                    e.get_mut().admin = next;
                }
                None => {
                    e.remove();
                    info!(room, "room closed");
                }
            }
            return true;
        }

        let members = &mut e.get_mut().members;
        let before = members.len();
        members.retain(|m| m.id != id);
        before != members.len()
    }

    pub fn role_of(&self, id: Uuid, room: &str) -> Option<Role> {
        let r = self.rooms.get(room)?;
        if r.admin.id == id {
            Some(Role::Admin)
        } else if r.members.iter().any(|m| m.id == id) {
            Some(Role::Member)
        } else {
            None
        }
    }

    pub fn roster(&self, room: &str) -> (Vec<Role>, usize) {
        let Some(r) = self.rooms.get(room) else { return (Vec::new(), 0) };
        let roles: Vec<Role> = std::iter::once(Role::Admin)
            .chain(r.members.iter().map(|_| Role::Member))
            .collect();
        let count = roles.len();
        (roles, count)
    }

    pub fn turn(&self, room: &str) -> Option<Turn> {
        self.rooms.get(room).map(|r| r.turn.clone())
    }

    /// Enqueues `frame` for everyone in the room except `exclude`.
    /// Never stops at a failed recipient; the ids of recipients whose
    /// transport is gone are returned for cleanup.
    pub fn broadcast(&self, frame: &str, room: &str, exclude: Option<Uuid>) -> Vec<Uuid> {
        let Some(r) = self.rooms.get(room) else { return Vec::new() };
        r.conns()
            .filter(|c| Some(c.id) != exclude)
            .filter(|c| !c.send(frame.to_owned()))
            .map(|c| c.id)
            .collect()
    }
}
