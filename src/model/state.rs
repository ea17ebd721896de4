// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::element::{DiagramElement, ElementChanges};
use super::ids::{ElementId, RelationshipId};
use super::relationship::{Relationship, RelationshipChanges};

pub const SNAPSHOT_VERSION: u32 = 1;

/// The diagram state a client renders from.
///
/// Elements and relationships are keyed by id. Writers are the sync client (one operation at a
/// time) and the delta merger (batches); renderers only ever see clones or shared borrows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiagramState {
    elements: BTreeMap<ElementId, DiagramElement>,
    relationships: BTreeMap<RelationshipId, Relationship>,
}

impl DiagramState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(
        elements: BTreeMap<ElementId, DiagramElement>,
        relationships: BTreeMap<RelationshipId, Relationship>,
    ) -> Self {
        Self { elements, relationships }
    }

    pub fn into_parts(
        self,
    ) -> (BTreeMap<ElementId, DiagramElement>, BTreeMap<RelationshipId, Relationship>) {
        (self.elements, self.relationships)
    }

    pub fn elements(&self) -> &BTreeMap<ElementId, DiagramElement> {
        &self.elements
    }

    pub fn elements_mut(&mut self) -> &mut BTreeMap<ElementId, DiagramElement> {
        &mut self.elements
    }

    pub fn relationships(&self) -> &BTreeMap<RelationshipId, Relationship> {
        &self.relationships
    }

    pub fn relationships_mut(&mut self) -> &mut BTreeMap<RelationshipId, Relationship> {
        &mut self.relationships
    }

    pub fn element(&self, element_id: &str) -> Option<&DiagramElement> {
        self.elements.get(element_id)
    }

    pub fn relationship(&self, relationship_id: &str) -> Option<&Relationship> {
        self.relationships.get(relationship_id)
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty() && self.relationships.is_empty()
    }

    /// Inserts a new element keyed by its own id. Returns `false` if the id is already taken.
    ///
    /// A container reference that does not resolve to a package is cleared; a valid one is
    /// mirrored into the package's member list.
    pub fn insert_element(&mut self, mut element: DiagramElement) -> bool {
        if self.elements.contains_key(element.id()) {
            return false;
        }

        let parent = element.parent_container_id().cloned();
        element.set_parent_container_id(None);
        let element_id = element.id().clone();
        self.elements.insert(element_id.clone(), element);

        if let Some(parent) = parent {
            if let Err(err) = self.assign_parent(&element_id, Some(&parent)) {
                warn!(element_id = %element_id, %err, "dropping container reference of new element");
            }
        }
        true
    }

    /// Removes an element and detaches it from package membership in both directions.
    ///
    /// Relationships are left alone: callers decide whether removal cascades.
    pub fn remove_element(&mut self, element_id: &ElementId) -> Option<DiagramElement> {
        let removed = self.elements.remove(element_id)?;

        if let Some(parent) = removed.parent_container_id() {
            if let Some(package) = self.elements.get_mut(parent) {
                package.contained_element_ids_mut().retain(|id| id != element_id);
            }
        }
        for member_id in removed.contained_element_ids() {
            if let Some(member) = self.elements.get_mut(member_id) {
                if member.parent_container_id() == Some(element_id) {
                    member.set_parent_container_id(None);
                }
            }
        }

        Some(removed)
    }

    pub fn insert_relationship(&mut self, relationship: Relationship) -> bool {
        if self.relationships.contains_key(relationship.id()) {
            return false;
        }
        self.relationships.insert(relationship.id().clone(), relationship);
        true
    }

    pub fn remove_relationship(&mut self, relationship_id: &RelationshipId) -> Option<Relationship> {
        self.relationships.remove(relationship_id)
    }

    /// Whether both endpoints of `relationship` exist.
    pub fn resolves(&self, relationship: &Relationship) -> bool {
        self.elements.contains_key(relationship.source_id())
            && self.elements.contains_key(relationship.target_id())
    }

    pub fn dangling_relationships(&self) -> Vec<RelationshipId> {
        self.relationships
            .values()
            .filter(|relationship| !self.resolves(relationship))
            .map(|relationship| relationship.id().clone())
            .collect()
    }

    /// Ids of relationships that start or end at `element_id`.
    pub fn relationships_touching(&self, element_id: &ElementId) -> Vec<RelationshipId> {
        self.relationships
            .values()
            .filter(|relationship| relationship.touches(element_id))
            .map(|relationship| relationship.id().clone())
            .collect()
    }

    /// Moves `element_id` into `package_id` (or out of any package when `None`).
    ///
    /// Keeps the package's member list in sync: the id is appended to the new package and
    /// removed from every other package. Returns whether the assignment changed.
    pub fn assign_parent(
        &mut self,
        element_id: &ElementId,
        package_id: Option<&ElementId>,
    ) -> Result<bool, ContainmentError> {
        let Some(element) = self.elements.get(element_id) else {
            return Err(ContainmentError::UnknownElement { element_id: element_id.clone() });
        };
        let current = element.parent_container_id().cloned();

        if let Some(package_id) = package_id {
            if package_id == element_id {
                return Err(ContainmentError::SelfContainment { element_id: element_id.clone() });
            }
            match self.elements.get(package_id) {
                Some(package) if package.is_package() => {}
                Some(_) => {
                    return Err(ContainmentError::NotAPackage { package_id: package_id.clone() })
                }
                None => {
                    return Err(ContainmentError::UnknownPackage { package_id: package_id.clone() })
                }
            }
        }

        let mut changed = current.as_ref() != package_id;
        for (candidate_id, candidate) in self.elements.iter_mut() {
            if !candidate.is_package() {
                continue;
            }
            let members = candidate.contained_element_ids_mut();
            if Some(candidate_id) == package_id {
                if !members.contains(element_id) {
                    members.push(element_id.clone());
                    changed = true;
                }
            } else if members.contains(element_id) {
                members.retain(|id| id != element_id);
                changed = true;
            }
        }

        if let Some(element) = self.elements.get_mut(element_id) {
            element.set_parent_container_id(package_id.cloned());
        }
        Ok(changed)
    }

    /// Shallow-merges `changes` onto an element. Returns `None` for an unknown id, otherwise
    /// whether anything changed. An invalid container assignment is logged and skipped.
    pub fn update_element(&mut self, element_id: &ElementId, changes: &ElementChanges) -> Option<bool> {
        let element = self.elements.get_mut(element_id)?;
        let mut changed = changes.apply_local_fields(element);

        if let Some(parent) = &changes.parent_container_id {
            match self.assign_parent(element_id, parent.as_ref()) {
                Ok(parent_changed) => changed |= parent_changed,
                Err(err) => warn!(element_id = %element_id, %err, "ignoring container change"),
            }
        }
        Some(changed)
    }

    pub fn update_relationship(
        &mut self,
        relationship_id: &RelationshipId,
        changes: &RelationshipChanges,
    ) -> Option<bool> {
        let relationship = self.relationships.get_mut(relationship_id)?;
        Some(changes.apply_to(relationship))
    }

    pub fn snapshot(&self, last_modified: u64) -> DiagramSnapshot {
        DiagramSnapshot {
            elements: self.elements.clone(),
            relationships: self.relationships.clone(),
            version: SNAPSHOT_VERSION,
            last_modified,
        }
    }

    /// Builds a state from a persisted snapshot, dropping relationships whose endpoints do not
    /// resolve.
    pub fn from_snapshot(snapshot: DiagramSnapshot) -> (Self, LoadReport) {
        let DiagramSnapshot { elements, relationships, .. } = snapshot;
        let mut state = Self { elements, relationships: BTreeMap::new() };
        let mut report = LoadReport::default();

        for (relationship_id, relationship) in relationships {
            if state.resolves(&relationship) {
                state.relationships.insert(relationship_id, relationship);
            } else {
                warn!(
                    relationship_id = %relationship_id,
                    source = %relationship.source_id(),
                    target = %relationship.target_id(),
                    "dropping relationship with dangling endpoint on load"
                );
                report.dropped_relationships.push(relationship_id);
            }
        }

        (state, report)
    }
}

/// Flattened, persistence-ready copy of a diagram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramSnapshot {
    #[serde(default)]
    pub elements: BTreeMap<ElementId, DiagramElement>,
    #[serde(default)]
    pub relationships: BTreeMap<RelationshipId, Relationship>,
    #[serde(default = "snapshot_version")]
    pub version: u32,
    #[serde(default)]
    pub last_modified: u64,
}

fn snapshot_version() -> u32 {
    SNAPSHOT_VERSION
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub dropped_relationships: Vec<RelationshipId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainmentError {
    UnknownElement { element_id: ElementId },
    UnknownPackage { package_id: ElementId },
    NotAPackage { package_id: ElementId },
    SelfContainment { element_id: ElementId },
}

impl fmt::Display for ContainmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownElement { element_id } => write!(f, "element not found (id={element_id})"),
            Self::UnknownPackage { package_id } => write!(f, "package not found (id={package_id})"),
            Self::NotAPackage { package_id } => {
                write!(f, "container is not a package (id={package_id})")
            }
            Self::SelfContainment { element_id } => {
                write!(f, "element cannot contain itself (id={element_id})")
            }
        }
    }
}

impl std::error::Error for ContainmentError {}

#[cfg(test)]
mod tests {
    use super::{ContainmentError, DiagramSnapshot, DiagramState};
    use crate::model::{
        DiagramElement, ElementChanges, ElementId, ElementKind, Relationship, RelationshipId,
        RelationshipKind,
    };

    fn eid(value: &str) -> ElementId {
        ElementId::new(value).expect("element id")
    }

    fn rid(value: &str) -> RelationshipId {
        RelationshipId::new(value).expect("relationship id")
    }

    fn state_with_package() -> DiagramState {
        let mut state = DiagramState::new();
        state.insert_element(DiagramElement::new(eid("pkg"), ElementKind::Package, "domain"));
        state.insert_element(DiagramElement::new(eid("pkg2"), ElementKind::Package, "infra"));
        state.insert_element(DiagramElement::new(eid("a"), ElementKind::Class, "A"));
        state.insert_element(DiagramElement::new(eid("b"), ElementKind::Class, "B"));
        state
    }

    #[test]
    fn insert_element_refuses_duplicate_ids() {
        let mut state = DiagramState::new();
        assert!(state.insert_element(DiagramElement::new(eid("a"), ElementKind::Class, "A")));
        assert!(!state.insert_element(DiagramElement::new(eid("a"), ElementKind::Class, "Other")));
        assert_eq!(state.element("a").map(DiagramElement::name), Some("A"));
    }

    #[test]
    fn assign_parent_moves_membership_between_packages() {
        let mut state = state_with_package();

        assert_eq!(state.assign_parent(&eid("a"), Some(&eid("pkg"))), Ok(true));
        assert_eq!(state.element("pkg").expect("pkg").contained_element_ids(), &[eid("a")]);

        assert_eq!(state.assign_parent(&eid("a"), Some(&eid("pkg2"))), Ok(true));
        assert!(state.element("pkg").expect("pkg").contained_element_ids().is_empty());
        assert_eq!(state.element("pkg2").expect("pkg2").contained_element_ids(), &[eid("a")]);
        assert_eq!(state.element("a").expect("a").parent_container_id(), Some(&eid("pkg2")));

        assert_eq!(state.assign_parent(&eid("a"), Some(&eid("pkg2"))), Ok(false));

        assert_eq!(state.assign_parent(&eid("a"), None), Ok(true));
        assert!(state.element("pkg2").expect("pkg2").contained_element_ids().is_empty());
        assert_eq!(state.element("a").expect("a").parent_container_id(), None);
    }

    #[test]
    fn assign_parent_rejects_non_packages() {
        let mut state = state_with_package();
        assert_eq!(
            state.assign_parent(&eid("a"), Some(&eid("b"))),
            Err(ContainmentError::NotAPackage { package_id: eid("b") })
        );
        assert_eq!(
            state.assign_parent(&eid("a"), Some(&eid("missing"))),
            Err(ContainmentError::UnknownPackage { package_id: eid("missing") })
        );
        assert_eq!(state.element("a").expect("a").parent_container_id(), None);
    }

    #[test]
    fn insert_element_links_valid_container_and_clears_invalid_one() {
        let mut state = state_with_package();

        let mut member: DiagramElement = serde_json::from_value(serde_json::json!({
            "id": "c", "className": "C", "elementType": "class", "parentPackageId": "pkg",
        }))
        .expect("element");
        assert!(state.insert_element(member.clone()));
        assert_eq!(state.element("pkg").expect("pkg").contained_element_ids(), &[eid("c")]);

        member = serde_json::from_value(serde_json::json!({
            "id": "d", "className": "D", "elementType": "class", "parentPackageId": "a",
        }))
        .expect("element");
        assert!(state.insert_element(member));
        assert_eq!(state.element("d").expect("d").parent_container_id(), None);
    }

    #[test]
    fn remove_element_detaches_members_but_keeps_relationships() {
        let mut state = state_with_package();
        state.assign_parent(&eid("a"), Some(&eid("pkg"))).expect("assign");
        state.insert_relationship(Relationship::new(
            rid("r1"),
            eid("a"),
            eid("pkg"),
            RelationshipKind::Dependency,
        ));

        state.remove_element(&eid("pkg")).expect("removed");
        assert_eq!(state.element("a").expect("a").parent_container_id(), None);
        assert!(state.relationship("r1").is_some());
        assert_eq!(state.dangling_relationships(), vec![rid("r1")]);
    }

    #[test]
    fn update_element_routes_container_through_assignment() {
        let mut state = state_with_package();
        let changes = ElementChanges {
            name: Some("A2".to_owned()),
            parent_container_id: Some(Some(eid("pkg"))),
            ..Default::default()
        };

        assert_eq!(state.update_element(&eid("a"), &changes), Some(true));
        assert_eq!(state.element("a").expect("a").name(), "A2");
        assert_eq!(state.element("pkg").expect("pkg").contained_element_ids(), &[eid("a")]);
        assert_eq!(state.update_element(&eid("missing"), &changes), None);
    }

    #[test]
    fn from_snapshot_filters_dangling_relationships() {
        let mut state = state_with_package();
        state.insert_relationship(Relationship::new(rid("ok"), eid("a"), eid("b"), RelationshipKind::Association));
        state.insert_relationship(Relationship::new(rid("bad"), eid("a"), eid("ghost"), RelationshipKind::Association));

        let json = serde_json::to_string(&state.snapshot(42)).expect("serialize");
        let snapshot: DiagramSnapshot = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(snapshot.version, 1);
        assert_eq!(snapshot.last_modified, 42);

        let (loaded, report) = DiagramState::from_snapshot(snapshot);
        assert_eq!(report.dropped_relationships, vec![rid("bad")]);
        assert!(loaded.relationship("ok").is_some());
        assert!(loaded.relationship("bad").is_none());
        assert_eq!(loaded.elements().len(), 4);
    }
}
