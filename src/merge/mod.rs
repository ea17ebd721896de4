// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Batch deltas (AI output, file import) merged into local state.
//!
//! Unlike operations, a delta is not confirmed by the authority item by item, so the merger
//! enforces referential integrity itself: relationships are only added when both endpoints
//! exist after the element additions, and removing an element removes every relationship
//! touching it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{
    DiagramElement, DiagramState, ElementChanges, ElementId, Relationship, RelationshipChanges,
    RelationshipId,
};

mod parse;

pub use parse::DeltaParseError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementUpdate {
    pub id: ElementId,
    #[serde(default)]
    pub changes: ElementChanges,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipUpdate {
    pub id: RelationshipId,
    #[serde(default)]
    pub changes: RelationshipChanges,
}

/// A batch of heterogeneous changes applied as one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiagramDelta {
    pub new_elements: Vec<DiagramElement>,
    pub new_relationships: Vec<Relationship>,
    pub remove_element_ids: Vec<ElementId>,
    pub remove_relationship_ids: Vec<RelationshipId>,
    pub update_elements: Vec<ElementUpdate>,
    pub update_relationships: Vec<RelationshipUpdate>,
    /// Items already dropped while parsing; carried into the merge summary.
    #[serde(skip)]
    pub malformed: Vec<DroppedItem>,
}

impl DiagramDelta {
    pub fn is_empty(&self) -> bool {
        self.new_elements.is_empty()
            && self.new_relationships.is_empty()
            && self.remove_element_ids.is_empty()
            && self.remove_relationship_ids.is_empty()
            && self.update_elements.is_empty()
            && self.update_relationships.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaSection {
    NewElements,
    NewRelationships,
    RemoveElementIds,
    RemoveRelationshipIds,
    UpdateElements,
    UpdateRelationships,
}

impl DeltaSection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NewElements => "newElements",
            Self::NewRelationships => "newRelationships",
            Self::RemoveElementIds => "removeElementIds",
            Self::RemoveRelationshipIds => "removeRelationshipIds",
            Self::UpdateElements => "updateElements",
            Self::UpdateRelationships => "updateRelationships",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    Malformed { message: String },
    DanglingEndpoint { source_id: ElementId, target_id: ElementId },
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed { message } => write!(f, "malformed: {message}"),
            Self::DanglingEndpoint { source_id, target_id } => {
                write!(f, "dangling endpoint (source={source_id}, target={target_id})")
            }
        }
    }
}

/// A delta item that was not merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedItem {
    pub section: DeltaSection,
    /// Position within the section.
    pub index: usize,
    pub id: Option<String>,
    pub reason: DropReason,
}

impl fmt::Display for DroppedItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.section.as_str(), self.index)?;
        if let Some(id) = &self.id {
            write!(f, " (id={id})")?;
        }
        write!(f, ": {}", self.reason)
    }
}

/// Counts per entity type plus everything that was dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub elements_added: usize,
    pub relationships_added: usize,
    pub elements_removed: usize,
    /// Includes relationships removed because an endpoint was removed.
    pub relationships_removed: usize,
    pub cascaded_relationships: usize,
    pub elements_updated: usize,
    pub relationships_updated: usize,
    /// Additions whose id already existed.
    pub duplicates_skipped: usize,
    /// Updates and removals whose target does not exist.
    pub unmatched: usize,
    pub dropped: Vec<DroppedItem>,
}

impl MergeSummary {
    pub fn is_empty(&self) -> bool {
        self.elements_added == 0
            && self.relationships_added == 0
            && self.elements_removed == 0
            && self.relationships_removed == 0
            && self.elements_updated == 0
            && self.relationships_updated == 0
            && self.dropped.is_empty()
    }

    pub fn dangling_dropped(&self) -> usize {
        self.dropped
            .iter()
            .filter(|item| matches!(item.reason, DropReason::DanglingEndpoint { .. }))
            .count()
    }
}

impl fmt::Display for MergeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [
            count_phrase(self.elements_added, "new element", "new elements"),
            count_phrase(self.relationships_added, "new relationship", "new relationships"),
            count_phrase(self.elements_removed, "element removed", "elements removed"),
            count_phrase(self.relationships_removed, "relationship removed", "relationships removed"),
            count_phrase(self.elements_updated, "element updated", "elements updated"),
            count_phrase(self.relationships_updated, "relationship updated", "relationships updated"),
            count_phrase(self.dropped.len(), "item dropped", "items dropped"),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>();

        if parts.is_empty() {
            f.write_str("no changes")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

fn count_phrase(count: usize, singular: &str, plural: &str) -> Option<String> {
    match count {
        0 => None,
        1 => Some(format!("1 {singular}")),
        n => Some(format!("{n} {plural}")),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub elements: BTreeMap<ElementId, DiagramElement>,
    pub relationships: BTreeMap<RelationshipId, Relationship>,
    pub summary: MergeSummary,
}

/// Applies `delta` onto the given collections, in this order:
///
/// 1. element additions (existing ids skipped),
/// 2. relationship additions, checked against the elements *after* step 1; dangling ones are
///    dropped and only allow-listed fields are kept,
/// 3. element removals, cascading to every relationship that touches a removed element,
/// 4. relationship removals,
/// 5. shallow element updates (unknown ids ignored),
/// 6. relationship updates restricted to labels and multiplicities.
///
/// Never fails as a whole; offending items are dropped and reported in the summary.
pub fn merge_delta(
    delta: &DiagramDelta,
    elements: BTreeMap<ElementId, DiagramElement>,
    relationships: BTreeMap<RelationshipId, Relationship>,
) -> MergeOutcome {
    let mut state = DiagramState::from_parts(elements, relationships);
    let mut summary = MergeSummary { dropped: delta.malformed.clone(), ..MergeSummary::default() };

    // Container references resolve against the whole batch, so a member may precede its package.
    let mut memberships = Vec::new();
    for element in &delta.new_elements {
        let mut detached = element.clone();
        let parent = detached.parent_container_id().cloned();
        detached.set_parent_container_id(None);
        if state.insert_element(detached) {
            summary.elements_added += 1;
            if let Some(parent) = parent {
                memberships.push((element.id().clone(), parent));
            }
        } else {
            debug!(element_id = %element.id(), "delta element already present");
            summary.duplicates_skipped += 1;
        }
    }
    for (element_id, package_id) in &memberships {
        if let Err(err) = state.assign_parent(element_id, Some(package_id)) {
            warn!(element_id = %element_id, %err, "dropping container reference of delta element");
        }
    }

    for (index, relationship) in delta.new_relationships.iter().enumerate() {
        if state.relationship(relationship.id().as_str()).is_some() {
            debug!(relationship_id = %relationship.id(), "delta relationship already present");
            summary.duplicates_skipped += 1;
            continue;
        }
        if !state.resolves(relationship) {
            warn!(
                relationship_id = %relationship.id(),
                source = %relationship.source_id(),
                target = %relationship.target_id(),
                "dropping delta relationship with dangling endpoint"
            );
            summary.dropped.push(DroppedItem {
                section: DeltaSection::NewRelationships,
                index,
                id: Some(relationship.id().to_string()),
                reason: DropReason::DanglingEndpoint {
                    source_id: relationship.source_id().clone(),
                    target_id: relationship.target_id().clone(),
                },
            });
            continue;
        }
        state.insert_relationship(relationship.allow_listed());
        summary.relationships_added += 1;
    }

    let mut removed_elements = BTreeSet::new();
    for element_id in &delta.remove_element_ids {
        if state.remove_element(element_id).is_some() {
            removed_elements.insert(element_id.clone());
            summary.elements_removed += 1;
        } else {
            summary.unmatched += 1;
        }
    }
    if !removed_elements.is_empty() {
        let cascade = state
            .relationships()
            .values()
            .filter(|relationship| {
                removed_elements.contains(relationship.source_id())
                    || removed_elements.contains(relationship.target_id())
            })
            .map(|relationship| relationship.id().clone())
            .collect::<Vec<_>>();
        for relationship_id in cascade {
            debug!(relationship_id = %relationship_id, "cascading removal to relationship");
            state.remove_relationship(&relationship_id);
            summary.cascaded_relationships += 1;
            summary.relationships_removed += 1;
        }
    }

    for relationship_id in &delta.remove_relationship_ids {
        if state.remove_relationship(relationship_id).is_some() {
            summary.relationships_removed += 1;
        } else {
            summary.unmatched += 1;
        }
    }

    for update in &delta.update_elements {
        match state.update_element(&update.id, &update.changes) {
            Some(true) => summary.elements_updated += 1,
            Some(false) => {}
            None => {
                debug!(element_id = %update.id, "update for unknown element ignored");
                summary.unmatched += 1;
            }
        }
    }

    for update in &delta.update_relationships {
        match state.update_relationship(&update.id, &update.changes.allow_listed()) {
            Some(true) => summary.relationships_updated += 1,
            Some(false) => {}
            None => {
                debug!(relationship_id = %update.id, "update for unknown relationship ignored");
                summary.unmatched += 1;
            }
        }
    }

    let (elements, relationships) = state.into_parts();
    MergeOutcome { elements, relationships, summary }
}
