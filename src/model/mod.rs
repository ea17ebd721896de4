// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Core data model.
//!
//! A diagram is a set of typed elements (classes, interfaces, packages, ...) and typed
//! relationships between them, plus the flattened snapshot handed to persistence.

pub mod element;
#[cfg(test)]
pub(crate) mod fixtures;
pub mod ids;
pub mod relationship;
pub mod state;

pub use element::{DiagramElement, ElementChanges, ElementKind, Position, Size};
pub use ids::{
    ClientId, DiagramId, ElementId, Id, IdError, ParticipantId, RelationshipId,
};
pub use relationship::{Relationship, RelationshipChanges, RelationshipKind};
pub use state::{ContainmentError, DiagramSnapshot, DiagramState, LoadReport, SNAPSHOT_VERSION};
