// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Validation and inverse computation against the canonical state.

use serde_json::{json, Value};

use crate::model::{DiagramElement, DiagramState, ElementId, Relationship};
use crate::ops::{ElementField, EntityRef, MutationIntent, Patch, RelationshipField};

/// What executing one operation entails besides the operation itself.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Plan {
    /// Applied and broadcast before the operation.
    pub(crate) cascade: Vec<MutationIntent>,
    /// Restores the pre-operation state when applied in order.
    pub(crate) inverse: Vec<MutationIntent>,
}

pub(crate) fn plan_patch(state: &DiagramState, patch: &Patch) -> Result<Plan, String> {
    match patch {
        Patch::AddElement(element) => plan_add_element(state, element),
        Patch::AddRelationship(relationship) => plan_add_relationship(state, relationship),
        Patch::Remove(EntityRef::Element(element_id)) => plan_remove_element(state, element_id),
        Patch::Remove(EntityRef::Relationship(relationship_id)) => {
            let relationship = state
                .relationship(relationship_id.as_str())
                .ok_or_else(|| format!("relationship {relationship_id} not found"))?;
            Ok(Plan {
                cascade: Vec::new(),
                inverse: vec![MutationIntent::add_relationship(relationship.clone())],
            })
        }
        Patch::ReplaceElementField { element_id, field, .. } => {
            let element = state
                .element(element_id.as_str())
                .ok_or_else(|| format!("element {element_id} not found"))?;
            let previous = element_field_value(element, field)
                .ok_or_else(|| format!("unsupported element field '{field}'"))?;
            Ok(Plan {
                cascade: Vec::new(),
                inverse: vec![MutationIntent::replace_element_field(
                    element_id.clone(),
                    field.clone(),
                    previous,
                    format!("\"{}\" {field} restored", element.name()),
                )],
            })
        }
        Patch::ReplaceRelationshipField { relationship_id, field, value } => {
            let relationship = state
                .relationship(relationship_id.as_str())
                .ok_or_else(|| format!("relationship {relationship_id} not found"))?;
            if matches!(field, RelationshipField::Source | RelationshipField::Target) {
                let endpoint = value.as_str().unwrap_or_default();
                if state.element(endpoint).is_none() {
                    return Err(format!("{field} element {endpoint} not found"));
                }
            }
            let previous = relationship_field_value(relationship, field)
                .ok_or_else(|| format!("unsupported relationship field '{field}'"))?;
            Ok(Plan {
                cascade: Vec::new(),
                inverse: vec![MutationIntent::replace_relationship_field(
                    relationship_id.clone(),
                    field.clone(),
                    previous,
                )],
            })
        }
        Patch::Move { .. } | Patch::Copy { .. } | Patch::Test { .. } => {
            Err(format!("unsupported operation '{}'", patch.kind()))
        }
    }
}

fn plan_add_element(state: &DiagramState, element: &DiagramElement) -> Result<Plan, String> {
    if state.element(element.id().as_str()).is_some() {
        return Err(format!("element {} already exists", element.id()));
    }
    if let Some(package_id) = element.parent_container_id() {
        match state.element(package_id.as_str()) {
            Some(package) if package.is_package() => {}
            Some(_) => return Err(format!("container {package_id} is not a package")),
            None => return Err(format!("package {package_id} not found")),
        }
    }
    Ok(Plan {
        cascade: Vec::new(),
        inverse: vec![MutationIntent::remove_element(element.id().clone(), element.name())],
    })
}

fn plan_add_relationship(state: &DiagramState, relationship: &Relationship) -> Result<Plan, String> {
    if state.relationship(relationship.id().as_str()).is_some() {
        return Err(format!("relationship {} already exists", relationship.id()));
    }
    if state.element(relationship.source_id().as_str()).is_none() {
        return Err(format!("source element {} not found", relationship.source_id()));
    }
    if state.element(relationship.target_id().as_str()).is_none() {
        return Err(format!("target element {} not found", relationship.target_id()));
    }
    Ok(Plan {
        cascade: Vec::new(),
        inverse: vec![MutationIntent::remove_relationship(relationship.id().clone())],
    })
}

/// Relationships touching the element go first; undo re-adds the element, then its
/// relationships, then re-links package members.
fn plan_remove_element(state: &DiagramState, element_id: &ElementId) -> Result<Plan, String> {
    let element = state
        .element(element_id.as_str())
        .ok_or_else(|| format!("element {element_id} not found"))?;

    let touching = state
        .relationships_touching(element_id)
        .into_iter()
        .filter_map(|relationship_id| state.relationship(relationship_id.as_str()))
        .collect::<Vec<_>>();

    let cascade = touching
        .iter()
        .map(|relationship| MutationIntent::remove_relationship(relationship.id().clone()))
        .collect();

    let mut inverse = vec![MutationIntent::add_element(element.clone())];
    inverse.extend(
        touching
            .iter()
            .map(|relationship| MutationIntent::add_relationship((*relationship).clone())),
    );
    inverse.extend(element.contained_element_ids().iter().filter_map(|member_id| {
        let member = state.element(member_id.as_str())?;
        Some(MutationIntent::replace_element_field(
            member_id.clone(),
            ElementField::Parent,
            json!(element_id),
            format!("\"{}\" returned to package \"{}\"", member.name(), element.name()),
        ))
    }));

    Ok(Plan { cascade, inverse })
}

fn element_field_value(element: &DiagramElement, field: &ElementField) -> Option<Value> {
    let position = element.position();
    let size = element.size();
    let value = match field {
        ElementField::Name => json!(element.name()),
        ElementField::Kind => json!(element.kind()),
        ElementField::Attributes => json!(element.attributes()),
        ElementField::Methods => json!(element.methods()),
        ElementField::Stereotype => json!(element.stereotype()),
        ElementField::Parent => json!(element.parent_container_id()),
        ElementField::Contained => json!(element.contained_element_ids()),
        ElementField::Position => json!(position),
        ElementField::Dimensions => json!(size),
        ElementField::X => json!(position.x),
        ElementField::Y => json!(position.y),
        ElementField::Width => json!(size.width),
        ElementField::Height => json!(size.height),
        ElementField::Other(_) => return None,
    };
    Some(value)
}

fn relationship_field_value(relationship: &Relationship, field: &RelationshipField) -> Option<Value> {
    let value = match field {
        RelationshipField::Label => json!(relationship.label()),
        RelationshipField::FullLabel => json!(relationship.full_label()),
        RelationshipField::SourceMultiplicity => json!(relationship.source_multiplicity()),
        RelationshipField::TargetMultiplicity => json!(relationship.target_multiplicity()),
        RelationshipField::SourceRole => json!(relationship.source_role()),
        RelationshipField::TargetRole => json!(relationship.target_role()),
        RelationshipField::Kind => json!(relationship.kind()),
        RelationshipField::Source => json!(relationship.source_id()),
        RelationshipField::Target => json!(relationship.target_id()),
        RelationshipField::Other(_) => return None,
    };
    Some(value)
}
