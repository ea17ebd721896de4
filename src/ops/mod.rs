// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Diagram operations.
//!
//! An [`Operation`] is an immutable, stamped mutation record. Its [`Patch`] is a closed tagged
//! union so the apply site matches exhaustively; the JSON-Patch-like wire form (`op`, `path`,
//! `value`, `from`) is only produced and parsed at the serde boundary. Applying an operation
//! produces a coarse [`StateDelta`] that renderers can use to refresh derived state.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;
use tracing::debug;

use crate::model::{
    ClientId, ContainmentError, DiagramElement, DiagramState, ElementId, ElementKind, Position,
    Relationship, RelationshipId, RelationshipKind, Size,
};

pub mod path;
mod tracker;

pub use path::{DiagramPath, ElementField, PathError, RelationshipField};
pub use tracker::{now_millis, MutationIntent, OperationTracker};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Add,
    Remove,
    Replace,
    Move,
    Copy,
    Test,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Replace => "replace",
            Self::Move => "move",
            Self::Copy => "copy",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one entity in a diagram.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityRef {
    Element(ElementId),
    Relationship(RelationshipId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element(id) => write!(f, "element {id}"),
            Self::Relationship(id) => write!(f, "relationship {id}"),
        }
    }
}

/// The structural mutation carried by an operation.
///
/// `Move`, `Copy` and `Test` exist on the wire but are not applied to diagram state; their paths
/// are kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    AddElement(DiagramElement),
    AddRelationship(Relationship),
    Remove(EntityRef),
    ReplaceElementField { element_id: ElementId, field: ElementField, value: Value },
    ReplaceRelationshipField {
        relationship_id: RelationshipId,
        field: RelationshipField,
        value: Value,
    },
    Move { from: String, path: String },
    Copy { from: String, path: String },
    Test { path: String, value: Value },
}

impl Patch {
    pub fn kind(&self) -> OpKind {
        match self {
            Self::AddElement(_) | Self::AddRelationship(_) => OpKind::Add,
            Self::Remove(_) => OpKind::Remove,
            Self::ReplaceElementField { .. } | Self::ReplaceRelationshipField { .. } => {
                OpKind::Replace
            }
            Self::Move { .. } => OpKind::Move,
            Self::Copy { .. } => OpKind::Copy,
            Self::Test { .. } => OpKind::Test,
        }
    }

    /// Wire path of this patch.
    pub fn path(&self) -> String {
        match self {
            Self::AddElement(_) => DiagramPath::Elements.to_string(),
            Self::AddRelationship(_) => DiagramPath::Relationships.to_string(),
            Self::Remove(EntityRef::Element(id)) => DiagramPath::Element(id.clone()).to_string(),
            Self::Remove(EntityRef::Relationship(id)) => {
                DiagramPath::Relationship(id.clone()).to_string()
            }
            Self::ReplaceElementField { element_id, field, .. } => {
                DiagramPath::ElementField(element_id.clone(), field.clone()).to_string()
            }
            Self::ReplaceRelationshipField { relationship_id, field, .. } => {
                DiagramPath::RelationshipField(relationship_id.clone(), field.clone()).to_string()
            }
            Self::Move { path, .. } | Self::Copy { path, .. } | Self::Test { path, .. } => {
                path.clone()
            }
        }
    }

    /// The entity this patch targets, if it targets one.
    pub fn target(&self) -> Option<EntityRef> {
        match self {
            Self::AddElement(element) => Some(EntityRef::Element(element.id().clone())),
            Self::AddRelationship(relationship) => {
                Some(EntityRef::Relationship(relationship.id().clone()))
            }
            Self::Remove(target) => Some(target.clone()),
            Self::ReplaceElementField { element_id, .. } => {
                Some(EntityRef::Element(element_id.clone()))
            }
            Self::ReplaceRelationshipField { relationship_id, .. } => {
                Some(EntityRef::Relationship(relationship_id.clone()))
            }
            Self::Move { .. } | Self::Copy { .. } | Self::Test { .. } => None,
        }
    }

    fn parse(
        op: OpKind,
        path: String,
        value: Option<Value>,
        from: Option<String>,
    ) -> Result<Self, OperationError> {
        match op {
            OpKind::Move | OpKind::Copy => {
                let Some(from) = from else {
                    return Err(OperationError::MissingFrom { op, path });
                };
                Ok(if op == OpKind::Move { Self::Move { from, path } } else { Self::Copy { from, path } })
            }
            OpKind::Test => {
                let Some(value) = value else {
                    return Err(OperationError::MissingValue { op, path });
                };
                Ok(Self::Test { path, value })
            }
            OpKind::Add => {
                let parsed = path.parse::<DiagramPath>().map_err(OperationError::Path)?;
                let Some(value) = value else {
                    return Err(OperationError::MissingValue { op, path });
                };
                let invalid = |err: serde_json::Error| OperationError::InvalidValue {
                    path: path.clone(),
                    message: err.to_string(),
                };
                match parsed {
                    DiagramPath::Elements => {
                        Ok(Self::AddElement(serde_json::from_value(value).map_err(invalid)?))
                    }
                    DiagramPath::Relationships => {
                        Ok(Self::AddRelationship(serde_json::from_value(value).map_err(invalid)?))
                    }
                    _ => Err(OperationError::PathMismatch { op, path: path.clone() }),
                }
            }
            OpKind::Remove => match path.parse::<DiagramPath>().map_err(OperationError::Path)? {
                DiagramPath::Element(id) => Ok(Self::Remove(EntityRef::Element(id))),
                DiagramPath::Relationship(id) => Ok(Self::Remove(EntityRef::Relationship(id))),
                _ => Err(OperationError::PathMismatch { op, path }),
            },
            OpKind::Replace => {
                // A cleared optional field travels without a value.
                let value = value.unwrap_or(Value::Null);
                match path.parse::<DiagramPath>().map_err(OperationError::Path)? {
                    DiagramPath::ElementField(element_id, field) => {
                        Ok(Self::ReplaceElementField { element_id, field, value })
                    }
                    DiagramPath::RelationshipField(relationship_id, field) => {
                        Ok(Self::ReplaceRelationshipField { relationship_id, field, value })
                    }
                    _ => Err(OperationError::PathMismatch { op, path }),
                }
            }
        }
    }

    fn wire_value(&self) -> Option<Value> {
        match self {
            Self::AddElement(element) => Some(serde_json::to_value(element).unwrap_or_default()),
            Self::AddRelationship(relationship) => {
                Some(serde_json::to_value(relationship).unwrap_or_default())
            }
            Self::ReplaceElementField { value, .. }
            | Self::ReplaceRelationshipField { value, .. }
            | Self::Test { value, .. } => Some(value.clone()),
            Self::Remove(_) | Self::Move { .. } | Self::Copy { .. } => None,
        }
    }

    fn wire_from(&self) -> Option<String> {
        match self {
            Self::Move { from, .. } | Self::Copy { from, .. } => Some(from.clone()),
            _ => None,
        }
    }
}

/// A stamped, immutable mutation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawOperation", into = "RawOperation")]
pub struct Operation {
    patch: Patch,
    client_id: ClientId,
    timestamp: u64,
    sequence_number: u64,
    description: String,
}

impl Operation {
    pub fn new(
        patch: Patch,
        client_id: ClientId,
        timestamp: u64,
        sequence_number: u64,
        description: impl Into<String>,
    ) -> Self {
        Self { patch, client_id, timestamp, sequence_number, description: description.into() }
    }

    pub fn patch(&self) -> &Patch {
        &self.patch
    }

    pub fn kind(&self) -> OpKind {
        self.patch.kind()
    }

    pub fn path(&self) -> String {
        self.patch.path()
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (client={}, seq={})",
            self.kind(),
            self.path(),
            self.client_id,
            self.sequence_number
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOperation {
    op: OpKind,
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    from: Option<String>,
    client_id: ClientId,
    timestamp: u64,
    sequence_number: u64,
    #[serde(default)]
    description: String,
}

impl TryFrom<RawOperation> for Operation {
    type Error = OperationError;

    fn try_from(raw: RawOperation) -> Result<Self, Self::Error> {
        let patch = Patch::parse(raw.op, raw.path, raw.value, raw.from)?;
        Ok(Self {
            patch,
            client_id: raw.client_id,
            timestamp: raw.timestamp,
            sequence_number: raw.sequence_number,
            description: raw.description,
        })
    }
}

impl From<Operation> for RawOperation {
    fn from(operation: Operation) -> Self {
        Self {
            op: operation.patch.kind(),
            path: operation.patch.path(),
            value: operation.patch.wire_value(),
            from: operation.patch.wire_from(),
            client_id: operation.client_id,
            timestamp: operation.timestamp,
            sequence_number: operation.sequence_number,
            description: operation.description,
        }
    }
}

/// Why a wire operation could not be turned into a typed [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub enum OperationError {
    Path(PathError),
    PathMismatch { op: OpKind, path: String },
    MissingValue { op: OpKind, path: String },
    MissingFrom { op: OpKind, path: String },
    InvalidValue { path: String, message: String },
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(err) => write!(f, "{err}"),
            Self::PathMismatch { op, path } => write!(f, "'{op}' cannot target {path:?}"),
            Self::MissingValue { op, path } => write!(f, "'{op}' at {path:?} requires a value"),
            Self::MissingFrom { op, path } => write!(f, "'{op}' at {path:?} requires 'from'"),
            Self::InvalidValue { path, message } => {
                write!(f, "invalid value for {path:?}: {message}")
            }
        }
    }
}

impl std::error::Error for OperationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Path(err) => Some(err),
            _ => None,
        }
    }
}

/// Minimal delta describing which entities changed as the result of applying one operation.
///
/// Coarse on purpose: it reports only added/removed/updated [`EntityRef`]s, sorted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateDelta {
    pub added: SmallVec<[EntityRef; 1]>,
    pub removed: SmallVec<[EntityRef; 1]>,
    pub updated: SmallVec<[EntityRef; 2]>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

#[derive(Debug, Default)]
struct DeltaBuilder {
    added: BTreeSet<EntityRef>,
    removed: BTreeSet<EntityRef>,
    updated: BTreeSet<EntityRef>,
}

impl DeltaBuilder {
    fn record_added(&mut self, entity: EntityRef) {
        self.removed.remove(&entity);
        self.updated.remove(&entity);
        self.added.insert(entity);
    }

    fn record_removed(&mut self, entity: EntityRef) {
        self.added.remove(&entity);
        self.updated.remove(&entity);
        self.removed.insert(entity);
    }

    fn record_updated(&mut self, entity: EntityRef) {
        if self.added.contains(&entity) || self.removed.contains(&entity) {
            return;
        }
        self.updated.insert(entity);
    }

    fn finish(self) -> StateDelta {
        StateDelta {
            added: self.added.into_iter().collect(),
            removed: self.removed.into_iter().collect(),
            updated: self.updated.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyError {
    UnsupportedOp { op: OpKind, path: String },
    UnsupportedField { path: DiagramPath },
    InvalidValue { path: DiagramPath, message: String },
    Containment(ContainmentError),
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedOp { op, path } => {
                write!(f, "unsupported op kind ({op}, path={path})")
            }
            Self::UnsupportedField { path } => write!(f, "unsupported field (path={path})"),
            Self::InvalidValue { path, message } => {
                write!(f, "invalid value (path={path}): {message}")
            }
            Self::Containment(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Containment(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ContainmentError> for ApplyError {
    fn from(err: ContainmentError) -> Self {
        Self::Containment(err)
    }
}

/// The single state-mutation entry point for operations.
///
/// Idempotent for duplicate deliveries: an add whose id already exists and a replace that
/// writes the value already held both yield an empty delta. Removing an element never touches
/// relationships; the authority sends those removals itself.
pub fn apply_operation(
    state: &mut DiagramState,
    operation: &Operation,
) -> Result<StateDelta, ApplyError> {
    apply_patch(state, operation.patch())
}

pub fn apply_patch(state: &mut DiagramState, patch: &Patch) -> Result<StateDelta, ApplyError> {
    let mut delta = DeltaBuilder::default();

    match patch {
        Patch::AddElement(element) => {
            let entity = EntityRef::Element(element.id().clone());
            let parent = element.parent_container_id().cloned();
            if state.insert_element(element.clone()) {
                delta.record_added(entity);
                if let Some(parent) = parent {
                    delta.record_updated(EntityRef::Element(parent));
                }
            } else {
                debug!(%entity, "skipping duplicate add");
            }
        }
        Patch::AddRelationship(relationship) => {
            let entity = EntityRef::Relationship(relationship.id().clone());
            if state.insert_relationship(relationship.clone()) {
                delta.record_added(entity);
            } else {
                debug!(%entity, "skipping duplicate add");
            }
        }
        Patch::Remove(EntityRef::Element(element_id)) => {
            match state.remove_element(element_id) {
                Some(removed) => {
                    if let Some(parent) = removed.parent_container_id() {
                        delta.record_updated(EntityRef::Element(parent.clone()));
                    }
                    for member in removed.contained_element_ids() {
                        delta.record_updated(EntityRef::Element(member.clone()));
                    }
                    delta.record_removed(EntityRef::Element(element_id.clone()));
                }
                None => debug!(element_id = %element_id, "remove of unknown element ignored"),
            }
        }
        Patch::Remove(EntityRef::Relationship(relationship_id)) => {
            if state.remove_relationship(relationship_id).is_some() {
                delta.record_removed(EntityRef::Relationship(relationship_id.clone()));
            } else {
                debug!(relationship_id = %relationship_id, "remove of unknown relationship ignored");
            }
        }
        Patch::ReplaceElementField { element_id, field, value } => {
            replace_element_field(state, element_id, field, value, &mut delta)?;
        }
        Patch::ReplaceRelationshipField { relationship_id, field, value } => {
            replace_relationship_field(state, relationship_id, field, value, &mut delta)?;
        }
        Patch::Move { path, .. } | Patch::Copy { path, .. } | Patch::Test { path, .. } => {
            return Err(ApplyError::UnsupportedOp { op: patch.kind(), path: path.clone() });
        }
    }

    Ok(delta.finish())
}

// Field-level replace implementation for elements and relationships.
include!("ops_impl.rs");
