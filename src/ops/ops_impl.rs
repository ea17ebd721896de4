// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

/// Element/relationship field replace helpers used by `apply_patch`.
/// Keeps `ops::mod` focused on public op types and orchestration.
fn replace_element_field(
    state: &mut DiagramState,
    element_id: &ElementId,
    field: &ElementField,
    value: &Value,
    delta: &mut DeltaBuilder,
) -> Result<(), ApplyError> {
    let path = || DiagramPath::ElementField(element_id.clone(), field.clone());

    let Some(previous_parent) = state.element(element_id.as_str()).map(|e| e.parent_container_id().cloned())
    else {
        debug!(element_id = %element_id, %field, "replace on unknown element ignored");
        return Ok(());
    };

    if *field == ElementField::Parent {
        let parent: Option<ElementId> = decode_value(value, path)?;
        if state.assign_parent(element_id, parent.as_ref())? {
            delta.record_updated(EntityRef::Element(element_id.clone()));
            for package_id in previous_parent.into_iter().chain(parent) {
                delta.record_updated(EntityRef::Element(package_id));
            }
        }
        return Ok(());
    }

    let Some(element) = state.elements_mut().get_mut(element_id) else {
        return Ok(());
    };

    let changed = match field {
        ElementField::Name => {
            let name: String = decode_value(value, path)?;
            let changed = element.name() != name;
            element.set_name(name);
            changed
        }
        ElementField::Kind => {
            let kind: ElementKind = decode_value(value, path)?;
            let changed = element.kind() != kind;
            element.set_kind(kind);
            changed
        }
        ElementField::Attributes => {
            let attributes: Vec<String> = decode_value(value, path)?;
            let changed = element.attributes() != attributes.as_slice();
            element.set_attributes(attributes);
            changed
        }
        ElementField::Methods => {
            let methods: Vec<String> = decode_value(value, path)?;
            let changed = element.methods() != methods.as_slice();
            element.set_methods(methods);
            changed
        }
        ElementField::Stereotype => {
            let stereotype: Option<String> = decode_value(value, path)?;
            let changed = element.stereotype() != stereotype.as_deref();
            element.set_stereotype(stereotype);
            changed
        }
        ElementField::Contained => {
            let contained: Vec<ElementId> = decode_value(value, path)?;
            let members = element.contained_element_ids_mut();
            let changed = *members != contained;
            *members = contained;
            changed
        }
        ElementField::Position => {
            let point: PartialPoint = decode_value(value, path)?;
            let current = element.position();
            element.set_position(Position {
                x: point.x.unwrap_or(current.x),
                y: point.y.unwrap_or(current.y),
            })
        }
        ElementField::Dimensions => {
            let dimensions: PartialDimensions = decode_value(value, path)?;
            let current = element.size();
            element.set_size(Size {
                width: dimensions.width.unwrap_or(current.width),
                height: dimensions.height.unwrap_or(current.height),
            })
        }
        ElementField::X => {
            let x: f64 = decode_value(value, path)?;
            let current = element.position();
            element.set_position(Position { x, ..current })
        }
        ElementField::Y => {
            let y: f64 = decode_value(value, path)?;
            let current = element.position();
            element.set_position(Position { y, ..current })
        }
        ElementField::Width => {
            let width: f64 = decode_value(value, path)?;
            let current = element.size();
            element.set_size(Size { width, ..current })
        }
        ElementField::Height => {
            let height: f64 = decode_value(value, path)?;
            let current = element.size();
            element.set_size(Size { height, ..current })
        }
        // Routed through `assign_parent` above.
        ElementField::Parent => false,
        ElementField::Other(_) => return Err(ApplyError::UnsupportedField { path: path() }),
    };

    if changed {
        delta.record_updated(EntityRef::Element(element_id.clone()));
    } else {
        debug!(element_id = %element_id, %field, "replace matches current value");
    }
    Ok(())
}

fn replace_relationship_field(
    state: &mut DiagramState,
    relationship_id: &RelationshipId,
    field: &RelationshipField,
    value: &Value,
    delta: &mut DeltaBuilder,
) -> Result<(), ApplyError> {
    let path = || DiagramPath::RelationshipField(relationship_id.clone(), field.clone());

    let Some(relationship) = state.relationships_mut().get_mut(relationship_id) else {
        debug!(relationship_id = %relationship_id, %field, "replace on unknown relationship ignored");
        return Ok(());
    };

    let changed = match field {
        RelationshipField::Label => {
            let label = decode_text(value, path)?;
            let changed = relationship.label() != label.as_deref();
            relationship.set_label(label);
            changed
        }
        RelationshipField::FullLabel => {
            let full_label = decode_text(value, path)?;
            let changed = relationship.full_label() != full_label.as_deref();
            relationship.set_full_label(full_label);
            changed
        }
        RelationshipField::SourceMultiplicity => {
            let multiplicity = decode_text(value, path)?;
            let changed = relationship.source_multiplicity() != multiplicity.as_deref();
            relationship.set_source_multiplicity(multiplicity);
            changed
        }
        RelationshipField::TargetMultiplicity => {
            let multiplicity = decode_text(value, path)?;
            let changed = relationship.target_multiplicity() != multiplicity.as_deref();
            relationship.set_target_multiplicity(multiplicity);
            changed
        }
        RelationshipField::SourceRole => {
            let role = decode_text(value, path)?;
            let changed = relationship.source_role() != role.as_deref();
            relationship.set_source_role(role);
            changed
        }
        RelationshipField::TargetRole => {
            let role = decode_text(value, path)?;
            let changed = relationship.target_role() != role.as_deref();
            relationship.set_target_role(role);
            changed
        }
        RelationshipField::Kind => {
            let kind: RelationshipKind = decode_value(value, path)?;
            let changed = relationship.kind() != kind;
            relationship.set_kind(kind);
            changed
        }
        RelationshipField::Source => {
            let source: ElementId = decode_value(value, path)?;
            let changed = relationship.source_id() != &source;
            relationship.set_source_id(source);
            changed
        }
        RelationshipField::Target => {
            let target: ElementId = decode_value(value, path)?;
            let changed = relationship.target_id() != &target;
            relationship.set_target_id(target);
            changed
        }
        RelationshipField::Other(_) => return Err(ApplyError::UnsupportedField { path: path() }),
    };

    if changed {
        delta.record_updated(EntityRef::Relationship(relationship_id.clone()));
    } else {
        debug!(relationship_id = %relationship_id, %field, "replace matches current value");
    }
    Ok(())
}

/// `{x, y}` with either coordinate optional; a missing one keeps the current value.
#[derive(Debug, Deserialize)]
struct PartialPoint {
    x: Option<f64>,
    y: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PartialDimensions {
    width: Option<f64>,
    height: Option<f64>,
}

fn decode_value<T>(value: &Value, path: impl FnOnce() -> DiagramPath) -> Result<T, ApplyError>
where
    T: serde::de::DeserializeOwned,
{
    T::deserialize(value)
        .map_err(|err| ApplyError::InvalidValue { path: path(), message: err.to_string() })
}

/// Labels and multiplicities: strings, numbers and booleans are accepted, `null` clears.
fn decode_text(value: &Value, path: impl FnOnce() -> DiagramPath) -> Result<Option<String>, ApplyError> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text.clone())),
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        other => Err(ApplyError::InvalidValue {
            path: path(),
            message: format!("expected a string-like value, found {other}"),
        }),
    }
}
