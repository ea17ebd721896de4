// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use super::element::{DiagramElement, ElementKind};
use super::ids::{ElementId, RelationshipId};
use super::relationship::{Relationship, RelationshipKind};
use super::state::DiagramState;

pub(crate) fn eid(value: &str) -> ElementId {
    ElementId::new(value).expect("element id")
}

pub(crate) fn rid(value: &str) -> RelationshipId {
    RelationshipId::new(value).expect("relationship id")
}

pub(crate) fn class(id: &str, name: &str) -> DiagramElement {
    DiagramElement::new(eid(id), ElementKind::Class, name)
}

pub(crate) fn relationship(id: &str, source: &str, target: &str) -> Relationship {
    Relationship::new(rid(id), eid(source), eid(target), RelationshipKind::Association)
}

/// `User` and `Order` at distinct positions, an empty `shop` package, and `places: User -> Order`.
pub(crate) fn shop_diagram() -> DiagramState {
    let mut state = DiagramState::new();

    state.insert_element(
        class("user", "User")
            .with_members(vec!["id: int".to_owned(), "email: string".to_owned()], Vec::new())
            .at(10.0, 20.0),
    );
    state.insert_element(
        class("order", "Order")
            .with_members(vec!["total: decimal".to_owned()], vec!["place()".to_owned()])
            .at(300.0, 20.0),
    );
    state.insert_element(DiagramElement::new(eid("shop"), ElementKind::Package, "shop").at(0.0, 300.0));

    let mut places = relationship("places", "user", "order");
    places.set_label(Some("places"));
    places.set_target_multiplicity(Some("0..*"));
    state.insert_relationship(places);

    state
}
