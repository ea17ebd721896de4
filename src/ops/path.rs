// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Typed operation paths.
//!
//! The wire uses JSON-Pointer-like strings (`/elements/-`, `/elements/<id>`,
//! `/elements/<id>/<field>` and the `/relationships/...` equivalents). They are parsed once at
//! the protocol boundary so application code matches on variants instead of splitting strings.

use std::fmt;
use std::str::FromStr;

use smol_str::SmolStr;

use crate::model::{ElementId, IdError, RelationshipId};

const ELEMENTS: &str = "elements";
const RELATIONSHIPS: &str = "relationships";
const APPEND: &str = "-";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DiagramPath {
    /// `/elements/-`
    Elements,
    /// `/relationships/-`
    Relationships,
    Element(ElementId),
    Relationship(RelationshipId),
    ElementField(ElementId, ElementField),
    RelationshipField(RelationshipId, RelationshipField),
}

impl fmt::Display for DiagramPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Elements => write!(f, "/{ELEMENTS}/{APPEND}"),
            Self::Relationships => write!(f, "/{RELATIONSHIPS}/{APPEND}"),
            Self::Element(id) => write!(f, "/{ELEMENTS}/{id}"),
            Self::Relationship(id) => write!(f, "/{RELATIONSHIPS}/{id}"),
            Self::ElementField(id, field) => write!(f, "/{ELEMENTS}/{id}/{field}"),
            Self::RelationshipField(id, field) => write!(f, "/{RELATIONSHIPS}/{id}/{field}"),
        }
    }
}

impl FromStr for DiagramPath {
    type Err = PathError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let Some(rest) = raw.strip_prefix('/') else {
            return Err(PathError::NotAbsolute { path: raw.to_owned() });
        };
        let segments = rest.split('/').collect::<Vec<_>>();

        let invalid_id = |source: IdError| PathError::InvalidId { path: raw.to_owned(), source };

        match segments.as_slice() {
            [ELEMENTS, APPEND] => Ok(Self::Elements),
            [RELATIONSHIPS, APPEND] => Ok(Self::Relationships),
            [ELEMENTS, id] => Ok(Self::Element(ElementId::new(id).map_err(invalid_id)?)),
            [RELATIONSHIPS, id] => {
                Ok(Self::Relationship(RelationshipId::new(id).map_err(invalid_id)?))
            }
            [ELEMENTS, id, field] if !field.is_empty() => Ok(Self::ElementField(
                ElementId::new(id).map_err(invalid_id)?,
                ElementField::from_wire(field),
            )),
            [RELATIONSHIPS, id, field] if !field.is_empty() => Ok(Self::RelationshipField(
                RelationshipId::new(id).map_err(invalid_id)?,
                RelationshipField::from_wire(field),
            )),
            [ELEMENTS | RELATIONSHIPS, ..] => Err(PathError::Malformed { path: raw.to_owned() }),
            _ => Err(PathError::UnknownCollection { path: raw.to_owned() }),
        }
    }
}

/// Addressable element fields. Names without a dedicated variant are kept verbatim so an
/// unknown field surfaces as an apply error instead of a protocol error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ElementField {
    Name,
    Kind,
    Attributes,
    Methods,
    Stereotype,
    Parent,
    Contained,
    /// `{x, y}`, expanded into the flat coordinates.
    Position,
    /// `{width, height}`, expanded into the flat size.
    Dimensions,
    X,
    Y,
    Width,
    Height,
    Other(SmolStr),
}

impl ElementField {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "className" | "name" => Self::Name,
            "elementType" | "kind" => Self::Kind,
            "attributes" => Self::Attributes,
            "methods" => Self::Methods,
            "stereotype" => Self::Stereotype,
            "parentPackageId" | "parentContainerId" => Self::Parent,
            "containedElements" | "containedElementIds" => Self::Contained,
            "position" => Self::Position,
            "dimensions" => Self::Dimensions,
            "x" => Self::X,
            "y" => Self::Y,
            "width" => Self::Width,
            "height" => Self::Height,
            other => Self::Other(SmolStr::new(other)),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::Name => "className",
            Self::Kind => "elementType",
            Self::Attributes => "attributes",
            Self::Methods => "methods",
            Self::Stereotype => "stereotype",
            Self::Parent => "parentPackageId",
            Self::Contained => "containedElements",
            Self::Position => "position",
            Self::Dimensions => "dimensions",
            Self::X => "x",
            Self::Y => "y",
            Self::Width => "width",
            Self::Height => "height",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ElementField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelationshipField {
    Label,
    FullLabel,
    SourceMultiplicity,
    TargetMultiplicity,
    SourceRole,
    TargetRole,
    Kind,
    Source,
    Target,
    Other(SmolStr),
}

impl RelationshipField {
    pub fn from_wire(raw: &str) -> Self {
        match raw {
            "label" => Self::Label,
            "fullLabel" => Self::FullLabel,
            "sourceMultiplicity" => Self::SourceMultiplicity,
            "targetMultiplicity" => Self::TargetMultiplicity,
            "sourceRole" => Self::SourceRole,
            "targetRole" => Self::TargetRole,
            "relationship" | "kind" => Self::Kind,
            "source" | "sourceId" => Self::Source,
            "target" | "targetId" => Self::Target,
            other => Self::Other(SmolStr::new(other)),
        }
    }

    pub fn as_wire(&self) -> &str {
        match self {
            Self::Label => "label",
            Self::FullLabel => "fullLabel",
            Self::SourceMultiplicity => "sourceMultiplicity",
            Self::TargetMultiplicity => "targetMultiplicity",
            Self::SourceRole => "sourceRole",
            Self::TargetRole => "targetRole",
            Self::Kind => "relationship",
            Self::Source => "source",
            Self::Target => "target",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for RelationshipField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    NotAbsolute { path: String },
    UnknownCollection { path: String },
    Malformed { path: String },
    InvalidId { path: String, source: IdError },
}

impl fmt::Display for PathError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAbsolute { path } => write!(f, "path must start with '/' ({path:?})"),
            Self::UnknownCollection { path } => {
                write!(f, "path does not address elements or relationships ({path:?})")
            }
            Self::Malformed { path } => write!(f, "malformed path ({path:?})"),
            Self::InvalidId { path, source } => write!(f, "invalid id in path {path:?}: {source}"),
        }
    }
}

impl std::error::Error for PathError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidId { source, .. } => Some(source),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DiagramPath, ElementField, PathError, RelationshipField};
    use crate::model::{ElementId, RelationshipId};

    #[test]
    fn parses_every_path_shape() {
        let a = ElementId::new("a").expect("element id");
        let r = RelationshipId::new("r").expect("relationship id");

        assert_eq!("/elements/-".parse(), Ok(DiagramPath::Elements));
        assert_eq!("/relationships/-".parse(), Ok(DiagramPath::Relationships));
        assert_eq!("/elements/a".parse(), Ok(DiagramPath::Element(a.clone())));
        assert_eq!("/relationships/r".parse(), Ok(DiagramPath::Relationship(r.clone())));
        assert_eq!(
            "/elements/a/position".parse(),
            Ok(DiagramPath::ElementField(a, ElementField::Position))
        );
        assert_eq!(
            "/relationships/r/sourceId".parse(),
            Ok(DiagramPath::RelationshipField(r, RelationshipField::Source))
        );
    }

    #[test]
    fn display_uses_browser_field_names() {
        let path: DiagramPath = "/elements/a/name".parse().expect("path");
        assert_eq!(path.to_string(), "/elements/a/className");

        let path: DiagramPath = "/elements/a/unknownThing".parse().expect("path");
        assert_eq!(path.to_string(), "/elements/a/unknownThing");
    }

    #[test]
    fn rejects_unknown_or_malformed_paths() {
        assert!(matches!(
            "elements/-".parse::<DiagramPath>(),
            Err(PathError::NotAbsolute { .. })
        ));
        assert!(matches!(
            "/nodes/a".parse::<DiagramPath>(),
            Err(PathError::UnknownCollection { .. })
        ));
        assert!(matches!(
            "/elements/a/b/c".parse::<DiagramPath>(),
            Err(PathError::Malformed { .. })
        ));
        assert!(matches!(
            "/elements/".parse::<DiagramPath>(),
            Err(PathError::InvalidId { .. })
        ));
    }
}
