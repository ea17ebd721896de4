// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use super::ids::{ElementId, RelationshipId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    Association,
    Aggregation,
    Composition,
    Generalization,
    Dependency,
    Realization,
}

impl RelationshipKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Association => "association",
            Self::Aggregation => "aggregation",
            Self::Composition => "composition",
            Self::Generalization => "generalization",
            Self::Dependency => "dependency",
            Self::Realization => "realization",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed edge between two elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    id: RelationshipId,
    #[serde(rename = "source", alias = "sourceId")]
    source_id: ElementId,
    #[serde(rename = "target", alias = "targetId")]
    target_id: ElementId,
    #[serde(rename = "relationship", alias = "kind")]
    kind: RelationshipKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    full_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_multiplicity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_multiplicity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target_role: Option<String>,
}

impl Relationship {
    pub fn new(
        id: RelationshipId,
        source_id: ElementId,
        target_id: ElementId,
        kind: RelationshipKind,
    ) -> Self {
        Self {
            id,
            source_id,
            target_id,
            kind,
            label: None,
            full_label: None,
            source_multiplicity: None,
            target_multiplicity: None,
            source_role: None,
            target_role: None,
        }
    }

    /// Copy restricted to the fields a batch source may introduce: identity, endpoints,
    /// kind, labels and multiplicities. Roles are dropped.
    pub fn allow_listed(&self) -> Self {
        Self {
            id: self.id.clone(),
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
            kind: self.kind,
            label: self.label.clone(),
            full_label: self.full_label.clone(),
            source_multiplicity: self.source_multiplicity.clone(),
            target_multiplicity: self.target_multiplicity.clone(),
            source_role: None,
            target_role: None,
        }
    }

    pub fn id(&self) -> &RelationshipId {
        &self.id
    }

    pub fn source_id(&self) -> &ElementId {
        &self.source_id
    }

    pub fn set_source_id(&mut self, source_id: ElementId) {
        self.source_id = source_id;
    }

    pub fn target_id(&self) -> &ElementId {
        &self.target_id
    }

    pub fn set_target_id(&mut self, target_id: ElementId) {
        self.target_id = target_id;
    }

    pub fn touches(&self, element_id: &ElementId) -> bool {
        &self.source_id == element_id || &self.target_id == element_id
    }

    pub fn kind(&self) -> RelationshipKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: RelationshipKind) {
        self.kind = kind;
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn set_label<T: Into<String>>(&mut self, label: Option<T>) {
        self.label = label.map(Into::into);
    }

    pub fn full_label(&self) -> Option<&str> {
        self.full_label.as_deref()
    }

    pub fn set_full_label<T: Into<String>>(&mut self, full_label: Option<T>) {
        self.full_label = full_label.map(Into::into);
    }

    pub fn source_multiplicity(&self) -> Option<&str> {
        self.source_multiplicity.as_deref()
    }

    pub fn set_source_multiplicity<T: Into<String>>(&mut self, value: Option<T>) {
        self.source_multiplicity = value.map(Into::into);
    }

    pub fn target_multiplicity(&self) -> Option<&str> {
        self.target_multiplicity.as_deref()
    }

    pub fn set_target_multiplicity<T: Into<String>>(&mut self, value: Option<T>) {
        self.target_multiplicity = value.map(Into::into);
    }

    pub fn source_role(&self) -> Option<&str> {
        self.source_role.as_deref()
    }

    pub fn set_source_role<T: Into<String>>(&mut self, value: Option<T>) {
        self.source_role = value.map(Into::into);
    }

    pub fn target_role(&self) -> Option<&str> {
        self.target_role.as_deref()
    }

    pub fn set_target_role<T: Into<String>>(&mut self, value: Option<T>) {
        self.target_role = value.map(Into::into);
    }
}

/// A shallow, partial update of a relationship's descriptive fields.
///
/// Endpoints are deliberately not representable: re-pointing a relationship is only possible
/// through an authority-confirmed operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipChanges {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub full_label: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub source_multiplicity: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub target_multiplicity: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub source_role: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub target_role: Option<String>,
    #[serde(rename = "relationship", alias = "kind", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<RelationshipKind>,
}

impl RelationshipChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Keeps label, full label and both multiplicities; drops everything else.
    pub fn allow_listed(&self) -> Self {
        Self {
            label: self.label.clone(),
            full_label: self.full_label.clone(),
            source_multiplicity: self.source_multiplicity.clone(),
            target_multiplicity: self.target_multiplicity.clone(),
            ..Self::default()
        }
    }

    pub(crate) fn apply_to(&self, relationship: &mut Relationship) -> bool {
        let mut changed = false;
        changed |= set_if_some(&mut relationship.label, &self.label);
        changed |= set_if_some(&mut relationship.full_label, &self.full_label);
        changed |= set_if_some(&mut relationship.source_multiplicity, &self.source_multiplicity);
        changed |= set_if_some(&mut relationship.target_multiplicity, &self.target_multiplicity);
        changed |= set_if_some(&mut relationship.source_role, &self.source_role);
        changed |= set_if_some(&mut relationship.target_role, &self.target_role);
        if let Some(kind) = self.kind {
            changed |= relationship.kind != kind;
            relationship.kind = kind;
        }
        changed
    }
}

fn set_if_some(slot: &mut Option<String>, value: &Option<String>) -> bool {
    let Some(value) = value else {
        return false;
    };
    if slot.as_deref() == Some(value.as_str()) {
        return false;
    }
    *slot = Some(value.clone());
    true
}

/// Accepts strings, numbers and booleans (stringified); `null` reads as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde_json::Value;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(value) => Ok(Some(value)),
        Value::Number(value) => Ok(Some(value.to_string())),
        Value::Bool(value) => Ok(Some(value.to_string())),
        other => Err(serde::de::Error::custom(format!(
            "expected a string-like value, found {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{Relationship, RelationshipChanges, RelationshipKind};
    use crate::model::{ElementId, RelationshipId};

    fn rel() -> Relationship {
        Relationship::new(
            RelationshipId::new("r1").expect("relationship id"),
            ElementId::new("a").expect("element id"),
            ElementId::new("b").expect("element id"),
            RelationshipKind::Association,
        )
    }

    #[test]
    fn deserializes_browser_and_neutral_names() {
        let browser: Relationship = serde_json::from_value(serde_json::json!({
            "id": "r1", "source": "a", "target": "b", "relationship": "composition",
        }))
        .expect("relationship");
        let neutral: Relationship = serde_json::from_value(serde_json::json!({
            "id": "r1", "sourceId": "a", "targetId": "b", "kind": "composition",
        }))
        .expect("relationship");

        assert_eq!(browser, neutral);
        assert_eq!(browser.kind(), RelationshipKind::Composition);
    }

    #[test]
    fn allow_listed_drops_roles() {
        let mut relationship = rel();
        relationship.set_label(Some("owns"));
        relationship.set_source_role(Some("owner"));
        relationship.set_target_multiplicity(Some("0..*"));

        let copy = relationship.allow_listed();
        assert_eq!(copy.label(), Some("owns"));
        assert_eq!(copy.target_multiplicity(), Some("0..*"));
        assert_eq!(copy.source_role(), None);
    }

    #[test]
    fn changes_ignore_endpoints_and_coerce_numbers() {
        let changes: RelationshipChanges = serde_json::from_value(serde_json::json!({
            "sourceId": "x",
            "source": "x",
            "label": "new",
            "targetMultiplicity": 1,
            "fullLabel": null,
        }))
        .expect("changes");

        assert_eq!(changes.label.as_deref(), Some("new"));
        assert_eq!(changes.target_multiplicity.as_deref(), Some("1"));
        assert_eq!(changes.full_label, None);

        let mut relationship = rel();
        assert!(changes.apply_to(&mut relationship));
        assert_eq!(relationship.source_id().as_str(), "a");
        assert_eq!(relationship.label(), Some("new"));
    }

    #[test]
    fn changes_reject_structured_values() {
        let result = serde_json::from_value::<RelationshipChanges>(serde_json::json!({
            "label": {"nested": true},
        }));
        assert!(result.is_err());
    }

    #[test]
    fn allow_listed_changes_keep_only_labels_and_multiplicities() {
        let changes = RelationshipChanges {
            label: Some("l".to_owned()),
            source_role: Some("r".to_owned()),
            kind: Some(RelationshipKind::Dependency),
            ..Default::default()
        };
        let allowed = changes.allow_listed();
        assert_eq!(allowed.label.as_deref(), Some("l"));
        assert_eq!(allowed.source_role, None);
        assert_eq!(allowed.kind, None);
    }
}
