// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! In-process operation authority.
//!
//! Holds the canonical state of every diagram room, validates and orders operations, keeps
//! per-participant undo/redo stacks and fans results out to room members. Used by the demo
//! binary and the integration tests; a networked server speaks the same [`ClientMessage`] /
//! [`ServerEvent`] protocol.

use std::collections::{BTreeMap, VecDeque};

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::model::{ClientId, DiagramId, DiagramState, ParticipantId};
use crate::ops::{apply_operation, MutationIntent, OpKind, Operation, OperationTracker};
use crate::protocol::{
    ChannelEvent, ClientMessage, Conflict, HistoryAction, HistoryBlocked, HistoryError,
    RedoApplied, ServerEvent, UndoApplied,
};

mod plan;

use plan::{plan_patch, Plan};

const HISTORY_LIMIT: usize = 64;
const AUTHORITY_CLIENT_ID: &str = "authority";
pub const MULTI_USER_HISTORY_REASON: &str =
    "undo/redo is disabled while multiple users are editing this diagram";

#[derive(Debug, Clone)]
struct HistoryEntry {
    operation: Operation,
    inverse: Vec<MutationIntent>,
}

#[derive(Debug, Default)]
struct History {
    undo: VecDeque<HistoryEntry>,
    redo: VecDeque<HistoryEntry>,
}

impl History {
    fn push_undo(&mut self, entry: HistoryEntry) {
        self.undo.push_back(entry);
        while self.undo.len() > HISTORY_LIMIT {
            self.undo.pop_front();
        }
    }

    fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }
}

#[derive(Debug, Clone)]
struct LastWrite {
    client_id: ClientId,
    timestamp: u64,
}

#[derive(Debug, Default)]
struct Room {
    state: DiagramState,
    /// Join order.
    members: Vec<ClientId>,
    histories: BTreeMap<ClientId, History>,
    last_writes: BTreeMap<String, LastWrite>,
}

#[derive(Debug)]
struct Connection {
    outbox: UnboundedSender<ChannelEvent>,
    room: Option<DiagramId>,
}

/// A message from one connection, as seen by the authority's event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message { client_id: ClientId, message: ClientMessage },
    Disconnect { client_id: ClientId, reason: String },
}

/// Operations applied by the authority on its own behalf (cascades, inverses).
struct Executed {
    cascade: Vec<Operation>,
    inverse: Vec<MutationIntent>,
}

#[derive(Debug)]
pub struct Authority {
    stamper: OperationTracker,
    rooms: BTreeMap<DiagramId, Room>,
    connections: BTreeMap<ClientId, Connection>,
}

impl Default for Authority {
    fn default() -> Self {
        Self::new()
    }
}

impl Authority {
    pub fn new() -> Self {
        Self {
            stamper: OperationTracker::new(ClientId::new_unchecked(AUTHORITY_CLIENT_ID)),
            rooms: BTreeMap::new(),
            connections: BTreeMap::new(),
        }
    }

    /// Seeds the canonical state of a room before anyone joins.
    pub fn with_diagram(mut self, diagram_id: DiagramId, state: DiagramState) -> Self {
        self.rooms.entry(diagram_id).or_default().state = state;
        self
    }

    pub fn state(&self, diagram_id: &DiagramId) -> Option<&DiagramState> {
        self.rooms.get(diagram_id).map(|room| &room.state)
    }

    pub fn members(&self, diagram_id: &DiagramId) -> Vec<ClientId> {
        self.rooms.get(diagram_id).map(|room| room.members.clone()).unwrap_or_default()
    }

    /// Registers a connection and tells it that it is connected.
    pub fn connect(&mut self, client_id: ClientId, outbox: UnboundedSender<ChannelEvent>) {
        info!(%client_id, "connection opened");
        if outbox.send(ChannelEvent::Connected).is_err() {
            debug!(%client_id, "connection closed before it was registered");
            return;
        }
        self.connections.insert(client_id, Connection { outbox, room: None });
    }

    pub fn disconnect(&mut self, client_id: &ClientId, reason: &str) {
        self.leave_room(client_id);
        if let Some(connection) = self.connections.remove(client_id) {
            info!(%client_id, %reason, "connection closed");
            let _ = connection
                .outbox
                .send(ChannelEvent::Disconnected { reason: reason.to_owned() });
        }
    }

    pub fn handle(&mut self, client_id: &ClientId, message: ClientMessage) {
        debug!(%client_id, event = message.name(), "inbound");
        match message {
            ClientMessage::Join(diagram_id) => self.join(client_id, diagram_id),
            ClientMessage::Operation(operation) => self.submit(client_id, operation),
            ClientMessage::Undo => self.undo(client_id),
            ClientMessage::Redo => self.redo(client_id),
        }
    }

    fn join(&mut self, client_id: &ClientId, diagram_id: DiagramId) {
        let Some(connection) = self.connections.get(client_id) else {
            warn!(%client_id, "join from unknown connection");
            return;
        };
        if connection.room.as_ref() == Some(&diagram_id) {
            return;
        }
        self.leave_room(client_id);

        let room = self.rooms.entry(diagram_id.clone()).or_default();
        room.members.push(client_id.clone());
        let members = room.members.clone();
        if let Some(connection) = self.connections.get_mut(client_id) {
            connection.room = Some(diagram_id.clone());
        }
        info!(%client_id, %diagram_id, members = members.len(), "joined room");

        for member in members.iter().filter(|member| *member != client_id) {
            self.send(client_id, ServerEvent::UserJoined { user_id: participant(member) });
        }
        for member in &members {
            self.send(member, ServerEvent::UserJoined { user_id: participant(client_id) });
        }
    }

    fn leave_room(&mut self, client_id: &ClientId) {
        let Some(diagram_id) =
            self.connections.get_mut(client_id).and_then(|connection| connection.room.take())
        else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&diagram_id) else {
            return;
        };
        room.members.retain(|member| member != client_id);
        let members = room.members.clone();
        info!(%client_id, %diagram_id, members = members.len(), "left room");

        for member in &members {
            self.send(member, ServerEvent::UserLeft { user_id: participant(client_id) });
        }
    }

    fn submit(&mut self, client_id: &ClientId, operation: Operation) {
        let Some(diagram_id) = self.room_of(client_id) else {
            self.reject(client_id, operation, "not joined to a diagram".to_owned());
            return;
        };
        if operation.client_id() != client_id {
            self.reject(client_id, operation, "operation client id does not match connection".to_owned());
            return;
        }

        let Some(room) = self.rooms.get_mut(&diagram_id) else {
            return;
        };
        let executed = match execute(&mut self.stamper, room, &operation) {
            Ok(executed) => executed,
            Err(reason) => {
                self.reject(client_id, operation, reason);
                return;
            }
        };

        let conflicts = record_write(room, &operation);
        let history = room.histories.entry(client_id.clone()).or_default();
        history.push_undo(HistoryEntry { operation: operation.clone(), inverse: executed.inverse });
        history.redo.clear();
        let members = room.members.clone();

        info!(%operation, cascade = executed.cascade.len(), "operation applied");
        for cascaded in &executed.cascade {
            self.broadcast(&members, None, cascaded);
        }
        self.send(client_id, ServerEvent::OperationConfirmed { operation: operation.clone() });
        if !conflicts.is_empty() {
            warn!(%operation, conflicts = conflicts.len(), "concurrent write on the same field");
            self.send(
                client_id,
                ServerEvent::OperationConflict { operation: operation.clone(), conflicts },
            );
        }
        self.broadcast(&members, Some(client_id), &operation);
    }

    fn reject(&self, client_id: &ClientId, operation: Operation, reason: String) {
        warn!(%operation, %reason, "operation rejected");
        self.send(client_id, ServerEvent::OperationRejected { operation, reason });
    }

    fn undo(&mut self, client_id: &ClientId) {
        let Some(diagram_id) = self.history_room(client_id, HistoryAction::Undo) else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&diagram_id) else {
            return;
        };
        let history = room.histories.entry(client_id.clone()).or_default();
        let Some(entry) = history.undo.pop_back() else {
            self.send(client_id, ServerEvent::UndoError(HistoryError { error: "nothing to undo".to_owned() }));
            return;
        };

        let inverse = entry
            .inverse
            .iter()
            .cloned()
            .map(|intent| self.stamper.create_operation(intent))
            .collect::<Vec<_>>();
        let mut candidate = room.state.clone();
        for operation in &inverse {
            if let Err(err) = apply_operation(&mut candidate, operation) {
                warn!(%operation, %err, "undo could not be applied");
                self.send(client_id, ServerEvent::UndoError(HistoryError { error: err.to_string() }));
                return;
            }
        }
        room.state = candidate;

        let history = room.histories.entry(client_id.clone()).or_default();
        let (can_undo, can_redo) = (history.can_undo(), true);
        history.redo.push_back(entry.clone());
        let members = room.members.clone();

        let Some((first, rest)) = inverse.split_first() else {
            return;
        };
        info!(undone = %entry.operation, "undo applied");
        self.send(
            client_id,
            ServerEvent::UndoSuccess(UndoApplied {
                undone_operation: entry.operation,
                inverse_operation: first.clone(),
                can_undo,
                can_redo,
            }),
        );
        for operation in rest {
            self.send(client_id, ServerEvent::RemoteOperation { operation: operation.clone() });
        }
        for operation in &inverse {
            self.broadcast(&members, Some(client_id), operation);
        }
    }

    fn redo(&mut self, client_id: &ClientId) {
        let Some(diagram_id) = self.history_room(client_id, HistoryAction::Redo) else {
            return;
        };
        let Some(room) = self.rooms.get_mut(&diagram_id) else {
            return;
        };
        let history = room.histories.entry(client_id.clone()).or_default();
        let Some(entry) = history.redo.pop_back() else {
            self.send(client_id, ServerEvent::RedoError(HistoryError { error: "nothing to redo".to_owned() }));
            return;
        };

        let executed = match execute(&mut self.stamper, room, &entry.operation) {
            Ok(executed) => executed,
            Err(reason) => {
                warn!(operation = %entry.operation, %reason, "redo could not be applied");
                self.send(client_id, ServerEvent::RedoError(HistoryError { error: reason }));
                return;
            }
        };
        record_write(room, &entry.operation);

        let history = room.histories.entry(client_id.clone()).or_default();
        history.push_undo(HistoryEntry { operation: entry.operation.clone(), inverse: executed.inverse });
        let (can_undo, can_redo) = (true, history.can_redo());
        let members = room.members.clone();

        info!(redone = %entry.operation, "redo applied");
        for cascaded in &executed.cascade {
            self.broadcast(&members, None, cascaded);
        }
        self.send(
            client_id,
            ServerEvent::RedoSuccess(RedoApplied {
                redone_operation: entry.operation.clone(),
                can_undo,
                can_redo,
            }),
        );
        self.broadcast(&members, Some(client_id), &entry.operation);
    }

    /// The requester's room, provided history is currently allowed there.
    fn history_room(&self, client_id: &ClientId, action: HistoryAction) -> Option<DiagramId> {
        let Some(diagram_id) = self.room_of(client_id) else {
            let error = HistoryError { error: "not joined to a diagram".to_owned() };
            let event = match action {
                HistoryAction::Undo => ServerEvent::UndoError(error),
                HistoryAction::Redo => ServerEvent::RedoError(error),
            };
            self.send(client_id, event);
            return None;
        };

        let user_count = self.rooms.get(&diagram_id).map_or(0, |room| room.members.len());
        if user_count > 1 {
            info!(%client_id, %action, user_count, "history blocked");
            let blocked = HistoryBlocked { reason: MULTI_USER_HISTORY_REASON.to_owned(), user_count };
            let event = match action {
                HistoryAction::Undo => ServerEvent::UndoBlocked(blocked),
                HistoryAction::Redo => ServerEvent::RedoBlocked(blocked),
            };
            self.send(client_id, event);
            return None;
        }
        Some(diagram_id)
    }

    fn room_of(&self, client_id: &ClientId) -> Option<DiagramId> {
        self.connections.get(client_id).and_then(|connection| connection.room.clone())
    }

    /// Sends `operation` as `diagram:operation` to every member except `skip`.
    fn broadcast(&self, members: &[ClientId], skip: Option<&ClientId>, operation: &Operation) {
        for member in members.iter().filter(|member| Some(*member) != skip) {
            self.send(member, ServerEvent::RemoteOperation { operation: operation.clone() });
        }
    }

    fn send(&self, client_id: &ClientId, event: ServerEvent) {
        let Some(connection) = self.connections.get(client_id) else {
            return;
        };
        if connection.outbox.send(ChannelEvent::Server(event)).is_err() {
            debug!(%client_id, "dropping event for closed connection");
        }
    }
}

/// Validates `operation`, then applies its cascade and the operation itself to a copy of the
/// room state. The room only changes when every step succeeds.
fn execute(
    stamper: &mut OperationTracker,
    room: &mut Room,
    operation: &Operation,
) -> Result<Executed, String> {
    let Plan { cascade, inverse } = plan_patch(&room.state, operation.patch())?;
    let cascade = cascade
        .into_iter()
        .map(|intent| stamper.create_operation(intent))
        .collect::<Vec<_>>();

    let mut candidate = room.state.clone();
    for step in cascade.iter().chain(std::iter::once(operation)) {
        apply_operation(&mut candidate, step).map_err(|err| err.to_string())?;
    }
    room.state = candidate;

    Ok(Executed { cascade, inverse })
}

/// Records a replace as the latest write of its path. Returns the overlapping writes: another
/// client already wrote the same path with a newer timestamp.
fn record_write(room: &mut Room, operation: &Operation) -> Vec<Conflict> {
    if operation.kind() != OpKind::Replace {
        return Vec::new();
    }
    let path = operation.path();
    let mut conflicts = Vec::new();

    if let Some(last) = room.last_writes.get(&path) {
        if last.client_id != *operation.client_id() && last.timestamp > operation.timestamp() {
            conflicts.push(Conflict {
                path: path.clone(),
                client_id: last.client_id.clone(),
                timestamp: last.timestamp,
            });
            return conflicts;
        }
    }
    room.last_writes.insert(
        path,
        LastWrite { client_id: operation.client_id().clone(), timestamp: operation.timestamp() },
    );
    conflicts
}

fn participant(client_id: &ClientId) -> ParticipantId {
    ParticipantId::new_unchecked(client_id.as_str())
}

/// Drives `authority` from `inbound` until every sender is dropped.
pub async fn run_authority(authority: &mut Authority, mut inbound: UnboundedReceiver<Inbound>) {
    info!("authority event loop started");
    while let Some(event) = inbound.recv().await {
        match event {
            Inbound::Message { client_id, message } => authority.handle(&client_id, message),
            Inbound::Disconnect { client_id, reason } => authority.disconnect(&client_id, &reason),
        }
    }
    info!("authority event loop stopped");
}

/// Tags every message a client sends with its id and forwards it to the authority loop.
/// Reports a disconnect once the client side is dropped.
pub async fn forward_client(
    client_id: ClientId,
    mut outbound: UnboundedReceiver<ClientMessage>,
    inbound: UnboundedSender<Inbound>,
) {
    while let Some(message) = outbound.recv().await {
        let forwarded = Inbound::Message { client_id: client_id.clone(), message };
        if inbound.send(forwarded).is_err() {
            return;
        }
    }
    let _ = inbound.send(Inbound::Disconnect { client_id, reason: "client closed".to_owned() });
}
