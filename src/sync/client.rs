// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::config::SyncConfig;
use super::notice::{Notice, NotificationSink};
use super::presence::PresenceTracker;
use super::transport::Channel;
use crate::merge::{merge_delta, DiagramDelta, MergeOutcome, MergeSummary};
use crate::model::{
    ClientId, DiagramElement, DiagramId, DiagramSnapshot, DiagramState, ElementChanges, ElementId,
    Position, Relationship, RelationshipChanges, RelationshipId,
};
use crate::ops::{
    apply_operation, now_millis, ElementField, MutationIntent, Operation, OperationTracker,
    RelationshipField, StateDelta,
};
use crate::protocol::{
    ChannelEvent, ClientMessage, HistoryAction, HistoryBlocked, RedoApplied, ServerEvent,
    UndoApplied,
};

pub const TIMED_OUT_REASON: &str = "timed out";
const MULTI_USER_REASON: &str = "undo/redo is only available while you are the only active user";

type ConfirmedFn = Box<dyn FnOnce(&Operation) + Send>;
type RejectedFn = Box<dyn FnOnce(&Operation, &str) + Send>;

/// Optional per-operation completion hooks, resolved at most once.
#[derive(Default)]
pub struct Callbacks {
    on_confirmed: Option<ConfirmedFn>,
    on_rejected: Option<RejectedFn>,
}

impl Callbacks {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn on_confirmed(mut self, callback: impl FnOnce(&Operation) + Send + 'static) -> Self {
        self.on_confirmed = Some(Box::new(callback));
        self
    }

    pub fn on_rejected(mut self, callback: impl FnOnce(&Operation, &str) + Send + 'static) -> Self {
        self.on_rejected = Some(Box::new(callback));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.on_confirmed.is_none() && self.on_rejected.is_none()
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_confirmed", &self.on_confirmed.is_some())
            .field("on_rejected", &self.on_rejected.is_some())
            .finish()
    }
}

#[derive(Debug)]
struct PendingEntry {
    operation: Operation,
    callbacks: Callbacks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connected,
}

/// Client-side state machine between local intents and the operation authority.
///
/// Owns the diagram state and is its only writer for single-operation events. State changes
/// come from confirmed and remote operations; the one optimistic path is [`Self::move_element`].
pub struct SyncClient<C, N> {
    diagram_id: DiagramId,
    tracker: OperationTracker,
    state: DiagramState,
    log: VecDeque<Operation>,
    log_capacity: usize,
    pending: HashMap<u64, PendingEntry>,
    pending_timeout_ms: Option<u64>,
    presence: PresenceTracker,
    status: ConnectionStatus,
    can_undo: bool,
    can_redo: bool,
    channel: C,
    sink: N,
}

impl<C, N> SyncClient<C, N>
where
    C: Channel,
    N: NotificationSink,
{
    pub fn new(config: &SyncConfig, channel: C, sink: N) -> Self {
        Self::with_state(config, DiagramState::new(), channel, sink)
    }

    pub fn with_state(config: &SyncConfig, state: DiagramState, channel: C, sink: N) -> Self {
        let status = if channel.is_connected() {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        };
        Self {
            diagram_id: config.diagram_id.clone(),
            tracker: OperationTracker::new(config.resolve_client_id()),
            state,
            log: VecDeque::new(),
            log_capacity: config.operation_log_capacity,
            pending: HashMap::new(),
            pending_timeout_ms: config.pending_timeout_ms,
            presence: PresenceTracker::new(),
            status,
            can_undo: false,
            can_redo: false,
            channel,
            sink,
        }
    }

    pub fn diagram_id(&self) -> &DiagramId {
        &self.diagram_id
    }

    pub fn client_id(&self) -> &ClientId {
        self.tracker.client_id()
    }

    pub fn state(&self) -> &DiagramState {
        &self.state
    }

    /// Recent operations, most recent first.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.log.iter()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_timeout_ms(&self) -> Option<u64> {
        self.pending_timeout_ms
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn is_single_user(&self) -> bool {
        self.presence.is_single_user()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn can_undo(&self) -> bool {
        self.can_undo
    }

    pub fn can_redo(&self) -> bool {
        self.can_redo
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn sink(&self) -> &N {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut N {
        &mut self.sink
    }

    /// Flattened copy of the current state for persistence.
    pub fn snapshot(&self) -> DiagramSnapshot {
        self.state.snapshot(now_millis())
    }

    /// Stamps `intent`, records it in the recent-operations log and, when connected, sends it.
    ///
    /// Callbacks are registered under the operation's sequence number even when the channel is
    /// down; nothing is queued for later delivery.
    pub fn submit(&mut self, intent: MutationIntent, callbacks: Callbacks) -> Operation {
        let operation = self.tracker.create_operation(intent);
        self.record(operation.clone());

        if !callbacks.is_empty() {
            self.pending.insert(
                operation.sequence_number(),
                PendingEntry { operation: operation.clone(), callbacks },
            );
        }

        if self.is_connected() {
            if let Err(err) = self.channel.send(ClientMessage::Operation(operation.clone())) {
                warn!(%operation, %err, "failed to send operation");
            }
        } else {
            debug!(%operation, "not connected; operation recorded locally only");
        }

        operation
    }

    /// A `Disconnected` event wins over a channel that still reports itself open.
    fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected && self.channel.is_connected()
    }

    fn record(&mut self, operation: Operation) {
        self.log.push_front(operation);
        self.log.truncate(self.log_capacity);
    }

    pub fn handle(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                info!(diagram_id = %self.diagram_id, "connected; joining diagram room");
                self.status = ConnectionStatus::Connected;
                if let Err(err) = self.channel.send(ClientMessage::Join(self.diagram_id.clone())) {
                    warn!(%err, "failed to join diagram room");
                }
            }
            ChannelEvent::Disconnected { reason } => {
                warn!(%reason, pending = self.pending.len(), "disconnected");
                self.status = ConnectionStatus::Disconnected;
                self.presence.clear();
            }
            ChannelEvent::Server(event) => self.handle_server_event(event),
        }
    }

    pub fn handle_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::OperationConfirmed { operation } => self.on_confirmed(operation),
            ServerEvent::OperationRejected { operation, reason } => {
                self.on_rejected(operation, &reason)
            }
            ServerEvent::OperationConflict { operation, conflicts } => {
                warn!(%operation, conflicts = conflicts.len(), "conflict reported");
                self.sink.notify(Notice::OperationConflict {
                    description: operation.description().to_owned(),
                    conflicts: conflicts.len(),
                });
            }
            ServerEvent::RemoteOperation { operation } => {
                debug!(%operation, "remote operation");
                self.record(operation.clone());
                self.apply(&operation);
            }
            ServerEvent::UserJoined { user_id } => {
                self.presence.join(user_id);
            }
            ServerEvent::UserLeft { user_id } => {
                self.presence.leave(&user_id);
            }
            ServerEvent::UndoSuccess(UndoApplied { inverse_operation, can_undo, can_redo, .. }) => {
                self.apply(&inverse_operation);
                self.can_undo = can_undo;
                self.can_redo = can_redo;
                self.sink.notify(Notice::HistoryApplied { action: HistoryAction::Undo });
            }
            ServerEvent::RedoSuccess(RedoApplied { redone_operation, can_undo, can_redo }) => {
                self.apply(&redone_operation);
                self.can_undo = can_undo;
                self.can_redo = can_redo;
                self.sink.notify(Notice::HistoryApplied { action: HistoryAction::Redo });
            }
            ServerEvent::UndoError(error) => {
                warn!(error = %error.error, "undo failed");
                self.can_undo = false;
                self.sink.notify(Notice::HistoryFailed { action: HistoryAction::Undo, error: error.error });
            }
            ServerEvent::RedoError(error) => {
                warn!(error = %error.error, "redo failed");
                self.can_redo = false;
                self.sink.notify(Notice::HistoryFailed { action: HistoryAction::Redo, error: error.error });
            }
            ServerEvent::UndoBlocked(blocked) => self.notify_blocked(HistoryAction::Undo, blocked),
            ServerEvent::RedoBlocked(blocked) => self.notify_blocked(HistoryAction::Redo, blocked),
        }
    }

    fn on_confirmed(&mut self, operation: Operation) {
        debug!(%operation, "operation confirmed");
        self.apply(&operation);
        self.can_undo = true;
        self.can_redo = false;

        if let Some(entry) = self.take_pending(&operation) {
            if let Some(on_confirmed) = entry.callbacks.on_confirmed {
                on_confirmed(&operation);
            }
        }
    }

    fn on_rejected(&mut self, operation: Operation, reason: &str) {
        warn!(%operation, %reason, "operation rejected");
        if let Some(entry) = self.take_pending(&operation) {
            if let Some(on_rejected) = entry.callbacks.on_rejected {
                on_rejected(&operation, reason);
            }
        }
        self.sink.notify(Notice::OperationRejected {
            description: operation.description().to_owned(),
            reason: reason.to_owned(),
        });
    }

    fn take_pending(&mut self, operation: &Operation) -> Option<PendingEntry> {
        if operation.client_id() != self.tracker.client_id() {
            return None;
        }
        self.pending.remove(&operation.sequence_number())
    }

    fn notify_blocked(&mut self, action: HistoryAction, blocked: HistoryBlocked) {
        warn!(%action, reason = %blocked.reason, user_count = blocked.user_count, "history blocked by authority");
        self.sink.notify(Notice::HistoryBlocked {
            action,
            reason: blocked.reason,
            user_count: blocked.user_count,
        });
    }

    /// Applies one confirmed or remote operation in arrival order. A failure is logged and
    /// surfaced; the session continues.
    fn apply(&mut self, operation: &Operation) -> Option<StateDelta> {
        match apply_operation(&mut self.state, operation) {
            Ok(delta) => Some(delta),
            Err(err) => {
                warn!(%operation, %err, "operation not applied");
                self.sink.notify(Notice::ApplyFailed {
                    description: operation.description().to_owned(),
                    error: err.to_string(),
                });
                None
            }
        }
    }

    pub fn undo(&mut self) -> bool {
        self.request_history(HistoryAction::Undo)
    }

    pub fn redo(&mut self) -> bool {
        self.request_history(HistoryAction::Redo)
    }

    /// Request-only: the resulting state change arrives later as an authority event.
    fn request_history(&mut self, action: HistoryAction) -> bool {
        if !self.is_connected() {
            warn!(%action, "no connection");
            self.sink.notify(Notice::HistoryUnavailable { action });
            return false;
        }
        if !self.presence.is_single_user() {
            let user_count = self.presence.count();
            info!(%action, user_count, "history gated by collaboration mode");
            self.sink.notify(Notice::HistoryBlocked {
                action,
                reason: MULTI_USER_REASON.to_owned(),
                user_count,
            });
            return false;
        }

        let message = match action {
            HistoryAction::Undo => ClientMessage::Undo,
            HistoryAction::Redo => ClientMessage::Redo,
        };
        match self.channel.send(message) {
            Ok(()) => true,
            Err(err) => {
                warn!(%action, %err, "failed to send history request");
                false
            }
        }
    }

    /// Force-rejects pending entries older than the configured timeout. Returns how many
    /// entries were expired.
    pub fn expire_pending(&mut self, now: u64) -> usize {
        let Some(timeout) = self.pending_timeout_ms else {
            return 0;
        };
        let expired = self
            .pending
            .iter()
            .filter(|(_, entry)| now.saturating_sub(entry.operation.timestamp()) >= timeout)
            .map(|(sequence_number, _)| *sequence_number)
            .collect::<Vec<_>>();

        for sequence_number in &expired {
            if let Some(entry) = self.pending.remove(sequence_number) {
                warn!(operation = %entry.operation, "pending operation timed out");
                if let Some(on_rejected) = entry.callbacks.on_rejected {
                    on_rejected(&entry.operation, TIMED_OUT_REASON);
                }
                self.sink.notify(Notice::OperationRejected {
                    description: entry.operation.description().to_owned(),
                    reason: TIMED_OUT_REASON.to_owned(),
                });
            }
        }
        expired.len()
    }

    /// Merges a batch delta into the owned state and surfaces the summary.
    pub fn merge_delta(&mut self, delta: &DiagramDelta) -> MergeSummary {
        let (elements, relationships) = std::mem::take(&mut self.state).into_parts();
        let MergeOutcome { elements, relationships, summary } =
            merge_delta(delta, elements, relationships);
        self.state = DiagramState::from_parts(elements, relationships);

        info!(%summary, "delta merged");
        self.sink.notify(Notice::DeltaMerged { summary: summary.clone() });
        summary
    }

    pub fn add_element(&mut self, element: DiagramElement, callbacks: Callbacks) -> Operation {
        self.submit(MutationIntent::add_element(element), callbacks)
    }

    pub fn remove_element(&mut self, element_id: &ElementId) -> Operation {
        let name = self
            .state
            .element(element_id.as_str())
            .map(|element| element.name().to_owned())
            .unwrap_or_else(|| element_id.to_string());
        self.submit(MutationIntent::remove_element(element_id.clone(), &name), Callbacks::none())
    }

    /// One `replace` per field present in `changes`. Coordinates travel together as
    /// `position`, sizes as `dimensions`.
    pub fn update_element(&mut self, element_id: &ElementId, changes: &ElementChanges) -> Vec<Operation> {
        let name = self
            .state
            .element(element_id.as_str())
            .map(|element| element.name().to_owned())
            .unwrap_or_else(|| element_id.to_string());

        let mut replaces: Vec<(ElementField, Value, String)> = Vec::new();
        if let Some(new_name) = &changes.name {
            replaces.push((
                ElementField::Name,
                json!(new_name),
                format!("\"{name}\" renamed to \"{new_name}\""),
            ));
        }
        if changes.x.is_some() || changes.y.is_some() {
            replaces.push((
                ElementField::Position,
                point_value(changes.x, changes.y),
                format!("element \"{name}\" moved"),
            ));
        }
        if let Some(attributes) = &changes.attributes {
            replaces.push((ElementField::Attributes, json!(attributes), format!("attributes of \"{name}\" changed")));
        }
        if let Some(methods) = &changes.methods {
            replaces.push((ElementField::Methods, json!(methods), format!("methods of \"{name}\" changed")));
        }
        if let Some(parent) = &changes.parent_container_id {
            let description = match parent {
                Some(package_id) => format!("element \"{name}\" assigned to package \"{package_id}\""),
                None => format!("element \"{name}\" removed from its package"),
            };
            replaces.push((ElementField::Parent, json!(parent), description));
        }
        if let Some(stereotype) = &changes.stereotype {
            let description = match stereotype {
                Some(value) => format!("stereotype of \"{name}\" changed to \"{value}\""),
                None => format!("stereotype of \"{name}\" removed"),
            };
            replaces.push((ElementField::Stereotype, json!(stereotype), description));
        }
        if let Some(contained) = &changes.contained_element_ids {
            replaces.push((
                ElementField::Contained,
                json!(contained),
                format!("contained elements of \"{name}\" changed"),
            ));
        }
        if changes.width.is_some() || changes.height.is_some() {
            let mut dimensions = serde_json::Map::new();
            if let Some(width) = changes.width {
                dimensions.insert("width".to_owned(), json!(width));
            }
            if let Some(height) = changes.height {
                dimensions.insert("height".to_owned(), json!(height));
            }
            replaces.push((
                ElementField::Dimensions,
                Value::Object(dimensions),
                format!("dimensions of \"{name}\" changed"),
            ));
        }
        if let Some(kind) = changes.kind {
            replaces.push((ElementField::Kind, json!(kind), format!("\"{name}\" changed to {kind}")));
        }

        replaces
            .into_iter()
            .map(|(field, value, description)| {
                self.submit(
                    MutationIntent::replace_element_field(element_id.clone(), field, value, description),
                    Callbacks::none(),
                )
            })
            .collect()
    }

    pub fn assign_to_package(&mut self, element_id: &ElementId, package_id: Option<&ElementId>) -> Vec<Operation> {
        let changes = ElementChanges {
            parent_container_id: Some(package_id.cloned()),
            ..ElementChanges::default()
        };
        self.update_element(element_id, &changes)
    }

    /// The drag path: applies the new position locally right away, then submits it like any
    /// other edit. Returns `None` when the element is unknown or already at `position`.
    pub fn move_element(&mut self, element_id: &ElementId, position: Position) -> Option<Operation> {
        let element = self.state.elements_mut().get_mut(element_id)?;
        if !element.set_position(position) {
            debug!(element_id = %element_id, "drag ended at current position");
            return None;
        }
        let name = element.name().to_owned();
        Some(self.submit(
            MutationIntent::replace_element_field(
                element_id.clone(),
                ElementField::Position,
                point_value(Some(position.x), Some(position.y)),
                format!("element \"{name}\" moved"),
            ),
            Callbacks::none(),
        ))
    }

    pub fn add_relationship(&mut self, relationship: Relationship, callbacks: Callbacks) -> Operation {
        self.submit(MutationIntent::add_relationship(relationship), callbacks)
    }

    pub fn remove_relationship(&mut self, relationship_id: &RelationshipId) -> Operation {
        self.submit(MutationIntent::remove_relationship(relationship_id.clone()), Callbacks::none())
    }

    /// One `replace` per field present in `changes`.
    pub fn update_relationship(
        &mut self,
        relationship_id: &RelationshipId,
        changes: &RelationshipChanges,
    ) -> Vec<Operation> {
        let text_fields = [
            (RelationshipField::Label, &changes.label),
            (RelationshipField::FullLabel, &changes.full_label),
            (RelationshipField::SourceMultiplicity, &changes.source_multiplicity),
            (RelationshipField::TargetMultiplicity, &changes.target_multiplicity),
            (RelationshipField::SourceRole, &changes.source_role),
            (RelationshipField::TargetRole, &changes.target_role),
        ];
        let mut replaces = text_fields
            .into_iter()
            .filter_map(|(field, value)| value.as_ref().map(|value| (field, json!(value))))
            .collect::<Vec<_>>();
        if let Some(kind) = changes.kind {
            replaces.push((RelationshipField::Kind, json!(kind)));
        }

        replaces
            .into_iter()
            .map(|(field, value)| {
                self.submit(
                    MutationIntent::replace_relationship_field(relationship_id.clone(), field, value),
                    Callbacks::none(),
                )
            })
            .collect()
    }
}

fn point_value(x: Option<f64>, y: Option<f64>) -> Value {
    let mut point = serde_json::Map::new();
    if let Some(x) = x {
        point.insert("x".to_owned(), json!(x));
    }
    if let Some(y) = y {
        point.insert("y".to_owned(), json!(y));
    }
    Value::Object(point)
}
