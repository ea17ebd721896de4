// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Room-scoped channel protocol.
//!
//! One closed enum per direction. On the wire every message is `{"event": <name>, "data":
//! <payload>}` with the event names the browser editor uses.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{ClientId, DiagramId, ParticipantId};
use crate::ops::Operation;

/// Client → authority intents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "diagram:join")]
    Join(DiagramId),
    #[serde(rename = "diagram:operation")]
    Operation(Operation),
    #[serde(rename = "diagram:undo")]
    Undo,
    #[serde(rename = "diagram:redo")]
    Redo,
}

impl ClientMessage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => "diagram:join",
            Self::Operation(_) => "diagram:operation",
            Self::Undo => "diagram:undo",
            Self::Redo => "diagram:redo",
        }
    }
}

/// Authority → client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "operation:confirmed")]
    OperationConfirmed { operation: Operation },
    #[serde(rename = "operation:rejected")]
    OperationRejected { operation: Operation, reason: String },
    #[serde(rename = "operation:conflict")]
    OperationConflict {
        operation: Operation,
        #[serde(default)]
        conflicts: Vec<Conflict>,
    },
    /// An operation originated by another participant, in authority order.
    #[serde(rename = "diagram:operation")]
    RemoteOperation { operation: Operation },
    #[serde(rename = "user:joined")]
    UserJoined {
        #[serde(rename = "userId")]
        user_id: ParticipantId,
    },
    #[serde(rename = "user:left", alias = "user:leave")]
    UserLeft {
        #[serde(rename = "userId")]
        user_id: ParticipantId,
    },
    #[serde(rename = "undo:success")]
    UndoSuccess(UndoApplied),
    #[serde(rename = "undo:error")]
    UndoError(HistoryError),
    #[serde(rename = "undo:blocked")]
    UndoBlocked(HistoryBlocked),
    #[serde(rename = "redo:success")]
    RedoSuccess(RedoApplied),
    #[serde(rename = "redo:error")]
    RedoError(HistoryError),
    #[serde(rename = "redo:blocked")]
    RedoBlocked(HistoryBlocked),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OperationConfirmed { .. } => "operation:confirmed",
            Self::OperationRejected { .. } => "operation:rejected",
            Self::OperationConflict { .. } => "operation:conflict",
            Self::RemoteOperation { .. } => "diagram:operation",
            Self::UserJoined { .. } => "user:joined",
            Self::UserLeft { .. } => "user:left",
            Self::UndoSuccess(_) => "undo:success",
            Self::UndoError(_) => "undo:error",
            Self::UndoBlocked(_) => "undo:blocked",
            Self::RedoSuccess(_) => "redo:success",
            Self::RedoError(_) => "redo:error",
            Self::RedoBlocked(_) => "redo:blocked",
        }
    }
}

/// A concurrent write that overlapped the reported operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub path: String,
    pub client_id: ClientId,
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UndoApplied {
    pub undone_operation: Operation,
    pub inverse_operation: Operation,
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedoApplied {
    pub redone_operation: Operation,
    pub can_undo: bool,
    pub can_redo: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryError {
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryBlocked {
    pub reason: String,
    pub user_count: usize,
}

/// What a transport hands to the client's event loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected { reason: String },
    Server(ServerEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryAction {
    Undo,
    Redo,
}

impl HistoryAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ClientMessage, HistoryBlocked, ServerEvent};
    use crate::model::DiagramId;

    #[test]
    fn client_messages_use_browser_event_names() {
        let join = ClientMessage::Join(DiagramId::new("d1").expect("diagram id"));
        assert_eq!(
            serde_json::to_value(&join).expect("serialize"),
            json!({"event": "diagram:join", "data": "d1"})
        );
        assert_eq!(
            serde_json::to_value(ClientMessage::Undo).expect("serialize"),
            json!({"event": "diagram:undo"})
        );
    }

    #[test]
    fn server_events_decode_camel_case_payloads() {
        let event: ServerEvent = serde_json::from_value(json!({
            "event": "redo:blocked",
            "data": {"reason": "several users", "userCount": 3},
        }))
        .expect("event");
        assert_eq!(
            event,
            ServerEvent::RedoBlocked(HistoryBlocked { reason: "several users".to_owned(), user_count: 3 })
        );
        assert_eq!(event.name(), "redo:blocked");
    }

    #[test]
    fn user_left_accepts_legacy_leave_name() {
        let event: ServerEvent = serde_json::from_value(json!({
            "event": "user:leave",
            "data": {"userId": "u2"},
        }))
        .expect("event");
        assert!(matches!(event, ServerEvent::UserLeft { ref user_id } if user_id.as_str() == "u2"));
    }

    #[test]
    fn conflict_without_details_decodes() {
        let event: ServerEvent = serde_json::from_value(json!({
            "event": "operation:conflict",
            "data": {"operation": {
                "op": "remove", "path": "/relationships/r1", "clientId": "c1",
                "timestamp": 5, "sequenceNumber": 2,
            }},
        }))
        .expect("event");
        let ServerEvent::OperationConflict { conflicts, operation } = event else {
            panic!("expected conflict");
        };
        assert!(conflicts.is_empty());
        assert_eq!(operation.sequence_number(), 2);
    }
}
