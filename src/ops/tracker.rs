// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use super::{EntityRef, ElementField, Operation, Patch, RelationshipField};
use crate::model::{ClientId, DiagramElement, ElementId, Relationship, RelationshipId};

/// Milliseconds since the Unix epoch; `0` if the clock reads before it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// An unstamped mutation: what the user wants to change plus an audit description.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationIntent {
    patch: Patch,
    description: String,
}

impl MutationIntent {
    pub fn new(patch: Patch, description: impl Into<String>) -> Self {
        Self { patch, description: description.into() }
    }

    pub fn add_element(element: DiagramElement) -> Self {
        let description = format!("{} \"{}\" added", element.kind(), element.name());
        Self::new(Patch::AddElement(element), description)
    }

    pub fn remove_element(element_id: ElementId, element_name: &str) -> Self {
        Self::new(
            Patch::Remove(EntityRef::Element(element_id)),
            format!("element \"{element_name}\" removed"),
        )
    }

    pub fn replace_element_field(
        element_id: ElementId,
        field: ElementField,
        value: Value,
        description: impl Into<String>,
    ) -> Self {
        Self::new(Patch::ReplaceElementField { element_id, field, value }, description)
    }

    pub fn add_relationship(relationship: Relationship) -> Self {
        let description = format!("{} relationship created", relationship.kind());
        Self::new(Patch::AddRelationship(relationship), description)
    }

    pub fn remove_relationship(relationship_id: RelationshipId) -> Self {
        Self::new(Patch::Remove(EntityRef::Relationship(relationship_id)), "relationship removed")
    }

    pub fn replace_relationship_field(
        relationship_id: RelationshipId,
        field: RelationshipField,
        value: Value,
    ) -> Self {
        let description = format!("relationship field \"{field}\" updated");
        Self::new(Patch::ReplaceRelationshipField { relationship_id, field, value }, description)
    }

    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Stamps intents with the session's client id, the wall clock and a per-session sequence
/// number. Sequence numbers start at 1, strictly increase and are never reused.
#[derive(Debug, Clone)]
pub struct OperationTracker {
    client_id: ClientId,
    next_sequence: u64,
}

impl OperationTracker {
    pub fn new(client_id: ClientId) -> Self {
        Self { client_id, next_sequence: 1 }
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// The sequence number the next operation will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn create_operation(&mut self, intent: MutationIntent) -> Operation {
        self.create_operation_at(intent, now_millis())
    }

    pub fn create_operation_at(&mut self, intent: MutationIntent, timestamp: u64) -> Operation {
        let sequence_number = self.next_sequence;
        self.next_sequence += 1;
        Operation::new(
            intent.patch,
            self.client_id.clone(),
            timestamp,
            sequence_number,
            intent.description,
        )
    }
}
