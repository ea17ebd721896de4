// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use super::{DeltaSection, DiagramDelta, DropReason, DroppedItem};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaParseError {
    NotAnObject { found: &'static str },
    MissingState,
}

impl fmt::Display for DeltaParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAnObject { found } => write!(f, "delta must be a JSON object (found {found})"),
            Self::MissingState => f.write_str("export has neither `state` nor elements/relationships"),
        }
    }
}

impl std::error::Error for DeltaParseError {}

impl DiagramDelta {
    /// Parses an AI or import payload, dropping items that do not deserialize.
    pub fn from_json(value: &Value) -> Result<Self, DeltaParseError> {
        let object = as_object(value)?;
        let mut malformed = Vec::new();

        let delta = Self {
            new_elements: section(object, DeltaSection::NewElements, &mut malformed),
            new_relationships: section(object, DeltaSection::NewRelationships, &mut malformed),
            remove_element_ids: section(object, DeltaSection::RemoveElementIds, &mut malformed),
            remove_relationship_ids: section(
                object,
                DeltaSection::RemoveRelationshipIds,
                &mut malformed,
            ),
            update_elements: section(object, DeltaSection::UpdateElements, &mut malformed),
            update_relationships: section(object, DeltaSection::UpdateRelationships, &mut malformed),
            malformed: Vec::new(),
        };
        Ok(Self { malformed, ..delta })
    }

    /// Turns an exported diagram into an all-additions delta.
    ///
    /// Accepts `{name?, state: {elements, relationships}}` or a bare state. Either collection may
    /// be an id-keyed map or an array; map entries without an `id` inherit their key.
    pub fn from_export(value: &Value) -> Result<Self, DeltaParseError> {
        let object = as_object(value)?;
        let state = match object.get("state") {
            Some(state) => as_object(state)?,
            None if object.contains_key("elements") || object.contains_key("relationships") => {
                object
            }
            None => return Err(DeltaParseError::MissingState),
        };

        let mut malformed = Vec::new();
        let new_elements = collection(state.get("elements"), DeltaSection::NewElements, &mut malformed);
        let new_relationships =
            collection(state.get("relationships"), DeltaSection::NewRelationships, &mut malformed);

        Ok(Self { new_elements, new_relationships, malformed, ..Self::default() })
    }
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, DeltaParseError> {
    value.as_object().ok_or(DeltaParseError::NotAnObject { found: json_kind(value) })
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn section<T: DeserializeOwned>(
    object: &Map<String, Value>,
    section: DeltaSection,
    malformed: &mut Vec<DroppedItem>,
) -> Vec<T> {
    match object.get(section.as_str()) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| parse_item(item.clone(), section, index, malformed))
            .collect(),
        Some(other) => {
            warn!(section = section.as_str(), found = json_kind(other), "ignoring non-array delta section");
            malformed.push(DroppedItem {
                section,
                index: 0,
                id: None,
                reason: DropReason::Malformed {
                    message: format!("expected an array, found {}", json_kind(other)),
                },
            });
            Vec::new()
        }
    }
}

fn collection<T: DeserializeOwned>(
    value: Option<&Value>,
    section: DeltaSection,
    malformed: &mut Vec<DroppedItem>,
) -> Vec<T> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| parse_item(item.clone(), section, index, malformed))
            .collect(),
        Some(Value::Object(entries)) => entries
            .iter()
            .enumerate()
            .filter_map(|(index, (key, item))| {
                let mut item = item.clone();
                if let Value::Object(fields) = &mut item {
                    fields.entry("id").or_insert_with(|| Value::String(key.clone()));
                }
                parse_item(item, section, index, malformed)
            })
            .collect(),
        Some(other) => {
            malformed.push(DroppedItem {
                section,
                index: 0,
                id: None,
                reason: DropReason::Malformed {
                    message: format!("expected a map or an array, found {}", json_kind(other)),
                },
            });
            Vec::new()
        }
    }
}

fn parse_item<T: DeserializeOwned>(
    item: Value,
    section: DeltaSection,
    index: usize,
    malformed: &mut Vec<DroppedItem>,
) -> Option<T> {
    let id = match &item {
        Value::Object(fields) => fields.get("id").and_then(Value::as_str).map(str::to_owned),
        Value::String(id) => Some(id.clone()),
        _ => None,
    };
    match serde_json::from_value(item) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!(section = section.as_str(), index, id = id.as_deref(), %err, "dropping malformed delta item");
            malformed.push(DroppedItem {
                section,
                index,
                id,
                reason: DropReason::Malformed { message: err.to_string() },
            });
            None
        }
    }
}
