//! Workspace rooms and event relay.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use codehive_core::{ConnectionId, WorkspaceId};

use crate::events::ServerEvent;

type Room = HashMap<ConnectionId, UnboundedSender<ServerEvent>>;

/// Per-workspace rooms of live connections.
///
/// Events are pushed into each member's channel; a connection whose channel
/// is closed is dropped from the room on the next send that reaches it.
/// One connection may sit in several rooms at once.
#[derive(Default)]
pub struct CollabHub {
    rooms: RwLock<HashMap<WorkspaceId, Room>>,
    memberships: RwLock<HashMap<ConnectionId, HashSet<WorkspaceId>>>,
}

impl CollabHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a workspace room and announce it to the existing
    /// members. The joiner does not receive its own announcement.
    pub fn join(
        &self,
        workspace_id: WorkspaceId,
        connection_id: ConnectionId,
        sender: UnboundedSender<ServerEvent>,
        user_id: JsonValue,
    ) {
        self.rooms
            .write()
            .unwrap()
            .entry(workspace_id)
            .or_default()
            .insert(connection_id, sender);
        self.memberships
            .write()
            .unwrap()
            .entry(connection_id)
            .or_default()
            .insert(workspace_id);

        info!(%workspace_id, %connection_id, "connection joined workspace");

        self.broadcast(
            workspace_id,
            connection_id,
            ServerEvent::UserJoined {
                user_id,
                timestamp: Utc::now().timestamp_millis(),
            },
        );
    }

    /// Relay an edit to every other member of the room.
    pub fn content_change(
        &self,
        workspace_id: WorkspaceId,
        sender: ConnectionId,
        delta: JsonValue,
        version: JsonValue,
    ) {
        self.broadcast(
            workspace_id,
            sender,
            ServerEvent::ContentUpdated { delta, version },
        );
    }

    /// Relay a cursor movement to every other member of the room.
    pub fn cursor_update(
        &self,
        workspace_id: WorkspaceId,
        sender: ConnectionId,
        user_id: JsonValue,
        position: JsonValue,
    ) {
        self.broadcast(
            workspace_id,
            sender,
            ServerEvent::CursorMoved { user_id, position },
        );
    }

    /// Remove a connection from every room it joined. Empty rooms are
    /// dropped. Idempotent: disconnecting an unknown connection is a no-op.
    pub fn disconnect(&self, connection_id: ConnectionId) {
        let Some(workspaces) = self.memberships.write().unwrap().remove(&connection_id) else {
            return;
        };

        let mut rooms = self.rooms.write().unwrap();
        for workspace_id in workspaces {
            if let Some(room) = rooms.get_mut(&workspace_id) {
                room.remove(&connection_id);
                if room.is_empty() {
                    rooms.remove(&workspace_id);
                }
            }
        }

        info!(%connection_id, "connection disconnected");
    }

    /// Number of live connections in a workspace room.
    pub fn room_size(&self, workspace_id: WorkspaceId) -> usize {
        self.rooms
            .read()
            .unwrap()
            .get(&workspace_id)
            .map(Room::len)
            .unwrap_or(0)
    }

    /// Send an event to every room member except `sender`, pruning members
    /// whose channel has closed.
    fn broadcast(&self, workspace_id: WorkspaceId, sender: ConnectionId, event: ServerEvent) {
        let mut dead: Vec<ConnectionId> = Vec::new();
        {
            let rooms = self.rooms.read().unwrap();
            let Some(room) = rooms.get(&workspace_id) else {
                return;
            };
            for (id, tx) in room {
                if *id == sender {
                    continue;
                }
                if tx.send(event.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }

        for id in dead {
            debug!(%workspace_id, connection_id = %id, "pruning closed connection");
            self.disconnect(id);
        }
    }
}
