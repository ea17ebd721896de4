// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use super::ids::ElementId;

const MIN_WIDTH: f64 = 120.0;
const MAX_WIDTH: f64 = 300.0;
const CHAR_WIDTH: f64 = 8.0;
const HORIZONTAL_PADDING: f64 = 16.0;
const MIN_HEIGHT: f64 = 80.0;
const LINE_HEIGHT: f64 = 18.0;
const VERTICAL_PADDING: f64 = 16.0;

pub(crate) const LOAD_DEFAULT_WIDTH: f64 = 200.0;
pub(crate) const LOAD_DEFAULT_HEIGHT: f64 = 120.0;

/// The type of a diagram element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Class,
    Interface,
    Enumeration,
    Package,
    Note,
}

impl ElementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Interface => "interface",
            Self::Enumeration => "enumeration",
            Self::Package => "package",
            Self::Note => "note",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    /// Size that fits the element's longest text line and its line count.
    pub fn fit_content(kind: ElementKind, name: &str, attributes: &[String], methods: &[String]) -> Self {
        let longest = attributes
            .iter()
            .chain(methods)
            .map(|line| line.chars().count())
            .fold(name.chars().count(), usize::max);
        let width = (longest as f64 * CHAR_WIDTH + HORIZONTAL_PADDING).clamp(MIN_WIDTH, MAX_WIDTH);

        let lines = match kind {
            ElementKind::Interface => 1 + methods.len(),
            _ => 1 + attributes.len() + methods.len(),
        };
        let height = (lines as f64 * LINE_HEIGHT + VERTICAL_PADDING).max(MIN_HEIGHT);

        Self { width, height }
    }
}

/// A visual node of a class diagram.
///
/// Field names on the wire follow the browser editor (`className`, `elementType`,
/// `parentPackageId`, `containedElements`); the neutral names are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagramElement {
    id: ElementId,
    #[serde(rename = "className", alias = "name")]
    name: String,
    #[serde(rename = "elementType", alias = "kind")]
    kind: ElementKind,
    #[serde(default)]
    attributes: Vec<String>,
    #[serde(default)]
    methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    stereotype: Option<String>,
    #[serde(
        rename = "parentPackageId",
        alias = "parentContainerId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    parent_container_id: Option<ElementId>,
    #[serde(rename = "containedElements", alias = "containedElementIds", default)]
    contained_element_ids: Vec<ElementId>,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default = "load_default_width")]
    width: f64,
    #[serde(default = "load_default_height")]
    height: f64,
}

fn load_default_width() -> f64 {
    LOAD_DEFAULT_WIDTH
}

fn load_default_height() -> f64 {
    LOAD_DEFAULT_HEIGHT
}

impl DiagramElement {
    pub fn new(id: ElementId, kind: ElementKind, name: impl Into<String>) -> Self {
        let name = name.into();
        let size = Size::fit_content(kind, &name, &[], &[]);
        Self {
            id,
            name,
            kind,
            attributes: Vec::new(),
            methods: Vec::new(),
            stereotype: None,
            parent_container_id: None,
            contained_element_ids: Vec::new(),
            x: 0.0,
            y: 0.0,
            width: size.width,
            height: size.height,
        }
    }

    pub fn with_members(mut self, attributes: Vec<String>, methods: Vec<String>) -> Self {
        self.attributes = attributes;
        self.methods = methods;
        self.fit_size_to_content();
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn fit_size_to_content(&mut self) {
        let size = Size::fit_content(self.kind, &self.name, &self.attributes, &self.methods);
        self.width = size.width;
        self.height = size.height;
    }

    pub fn id(&self) -> &ElementId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: ElementKind) {
        self.kind = kind;
    }

    pub fn is_package(&self) -> bool {
        self.kind == ElementKind::Package
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    pub fn set_attributes(&mut self, attributes: Vec<String>) {
        self.attributes = attributes;
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    pub fn set_methods(&mut self, methods: Vec<String>) {
        self.methods = methods;
    }

    pub fn stereotype(&self) -> Option<&str> {
        self.stereotype.as_deref()
    }

    pub fn set_stereotype<T: Into<String>>(&mut self, stereotype: Option<T>) {
        self.stereotype = stereotype.map(Into::into);
    }

    pub fn parent_container_id(&self) -> Option<&ElementId> {
        self.parent_container_id.as_ref()
    }

    pub(crate) fn set_parent_container_id(&mut self, parent: Option<ElementId>) {
        self.parent_container_id = parent;
    }

    pub fn contained_element_ids(&self) -> &[ElementId] {
        &self.contained_element_ids
    }

    pub(crate) fn contained_element_ids_mut(&mut self) -> &mut Vec<ElementId> {
        &mut self.contained_element_ids
    }

    pub fn position(&self) -> Position {
        Position { x: self.x, y: self.y }
    }

    /// Returns `false` (and leaves the element untouched) when the position is unchanged.
    pub fn set_position(&mut self, position: Position) -> bool {
        if self.position() == position {
            return false;
        }
        self.x = position.x;
        self.y = position.y;
        true
    }

    pub fn size(&self) -> Size {
        Size { width: self.width, height: self.height }
    }

    pub fn set_size(&mut self, size: Size) -> bool {
        if self.size() == size {
            return false;
        }
        self.width = size.width;
        self.height = size.height;
        true
    }
}

/// A shallow, partial update of an element.
///
/// Absent fields are left alone. For the optional fields (`stereotype`, `parentPackageId`) an
/// explicit `null` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementChanges {
    #[serde(rename = "className", alias = "name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "elementType", alias = "kind", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ElementKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methods: Option<Vec<String>>,
    #[serde(
        default,
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub stereotype: Option<Option<String>>,
    #[serde(
        rename = "parentPackageId",
        alias = "parentContainerId",
        default,
        deserialize_with = "deserialize_some",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_container_id: Option<Option<ElementId>>,
    #[serde(
        rename = "containedElements",
        alias = "containedElementIds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub contained_element_ids: Option<Vec<ElementId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
}

impl ElementChanges {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies every field except the container assignment, which needs the whole state to
    /// keep package membership consistent. Returns whether anything changed.
    pub(crate) fn apply_local_fields(&self, element: &mut DiagramElement) -> bool {
        let mut changed = false;

        if let Some(name) = &self.name {
            changed |= element.name != *name;
            element.set_name(name.clone());
        }
        if let Some(kind) = self.kind {
            changed |= element.kind != kind;
            element.set_kind(kind);
        }
        if let Some(attributes) = &self.attributes {
            changed |= element.attributes != *attributes;
            element.set_attributes(attributes.clone());
        }
        if let Some(methods) = &self.methods {
            changed |= element.methods != *methods;
            element.set_methods(methods.clone());
        }
        if let Some(stereotype) = &self.stereotype {
            changed |= element.stereotype != *stereotype;
            element.set_stereotype(stereotype.clone());
        }
        if let Some(contained) = &self.contained_element_ids {
            changed |= element.contained_element_ids != *contained;
            element.contained_element_ids = contained.clone();
        }

        let position = Position {
            x: self.x.unwrap_or(element.x),
            y: self.y.unwrap_or(element.y),
        };
        changed |= element.set_position(position);

        let size = Size {
            width: self.width.unwrap_or(element.width),
            height: self.height.unwrap_or(element.height),
        };
        changed |= element.set_size(size);

        changed
    }
}

pub(crate) fn deserialize_some<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::{DiagramElement, ElementChanges, ElementKind, Position, Size};
    use crate::model::ElementId;

    fn eid(value: &str) -> ElementId {
        ElementId::new(value).expect("element id")
    }

    #[test]
    fn new_element_uses_content_based_minimum_size() {
        let element = DiagramElement::new(eid("e1"), ElementKind::Class, "User");
        assert_eq!(element.size(), Size { width: 120.0, height: 80.0 });
    }

    #[test]
    fn size_grows_with_longest_line_and_caps_width() {
        let long = "x".repeat(100);
        let element = DiagramElement::new(eid("e1"), ElementKind::Class, "User")
            .with_members(vec![long], (0..5).map(|i| format!("m{i}()")).collect());

        assert_eq!(element.size().width, 300.0);
        assert_eq!(element.size().height, 7.0 * 18.0 + 16.0);
    }

    #[test]
    fn interface_height_counts_only_methods() {
        let size = Size::fit_content(
            ElementKind::Interface,
            "Repo",
            &["a".to_owned(), "b".to_owned(), "c".to_owned(), "d".to_owned()],
            &["find()".to_owned()],
        );
        assert_eq!(size.height, 80.0);
    }

    #[test]
    fn deserializes_browser_field_names_and_load_defaults() {
        let element: DiagramElement = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "className": "Order",
            "elementType": "class",
            "attributes": ["id: int"],
        }))
        .expect("element");

        assert_eq!(element.name(), "Order");
        assert_eq!(element.kind(), ElementKind::Class);
        assert!(element.methods().is_empty());
        assert_eq!(element.position(), Position { x: 0.0, y: 0.0 });
        assert_eq!(element.size(), Size { width: 200.0, height: 120.0 });
    }

    #[test]
    fn deserializes_neutral_aliases() {
        let element: DiagramElement = serde_json::from_value(serde_json::json!({
            "id": "c1",
            "name": "Order",
            "kind": "package",
            "parentContainerId": "p0",
            "containedElementIds": ["c2"],
            "x": 10.0,
            "y": 20.0,
            "width": 50.0,
            "height": 60.0,
        }))
        .expect("element");

        assert!(element.is_package());
        assert_eq!(element.parent_container_id(), Some(&eid("p0")));
        assert_eq!(element.contained_element_ids(), &[eid("c2")]);
    }

    #[test]
    fn set_position_reports_no_change_for_equal_value() {
        let mut element = DiagramElement::new(eid("e1"), ElementKind::Note, "n").at(5.0, 6.0);
        assert!(!element.set_position(Position { x: 5.0, y: 6.0 }));
        assert!(element.set_position(Position { x: 7.0, y: 6.0 }));
        assert_eq!(element.position(), Position { x: 7.0, y: 6.0 });
    }

    #[test]
    fn changes_distinguish_absent_and_null_stereotype() {
        let absent: ElementChanges = serde_json::from_str(r#"{"className":"A"}"#).expect("changes");
        assert_eq!(absent.stereotype, None);

        let cleared: ElementChanges = serde_json::from_str(r#"{"stereotype":null}"#).expect("changes");
        assert_eq!(cleared.stereotype, Some(None));

        let mut element = DiagramElement::new(eid("e1"), ElementKind::Class, "A");
        element.set_stereotype(Some("<<entity>>"));
        assert!(cleared.apply_local_fields(&mut element));
        assert_eq!(element.stereotype(), None);
    }

    #[test]
    fn changes_apply_partially_and_report_noop() {
        let mut element = DiagramElement::new(eid("e1"), ElementKind::Class, "A").at(1.0, 2.0);
        let changes = ElementChanges { x: Some(1.0), name: Some("A".to_owned()), ..Default::default() };
        assert!(!changes.apply_local_fields(&mut element));

        let changes = ElementChanges { y: Some(9.0), ..Default::default() };
        assert!(changes.apply_local_fields(&mut element));
        assert_eq!(element.position(), Position { x: 1.0, y: 9.0 });
    }
}
