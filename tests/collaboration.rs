// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver};

use diagram_sync::authority::{forward_client, run_authority, Authority};
use diagram_sync::model::{
    ClientId, DiagramElement, DiagramId, DiagramState, ElementChanges, ElementId, ElementKind,
    Relationship, RelationshipId, RelationshipKind,
};
use diagram_sync::protocol::{ChannelEvent, ClientMessage, HistoryAction};
use diagram_sync::sync::{run_client, Callbacks, MpscChannel, Notice, SyncClient, SyncConfig};

type Client = SyncClient<MpscChannel, Vec<Notice>>;

struct Peer {
    client: Client,
    outbound: UnboundedReceiver<ClientMessage>,
    events: UnboundedReceiver<ChannelEvent>,
}

fn diagram() -> DiagramId {
    DiagramId::new("shop").expect("diagram id")
}

fn eid(value: &str) -> ElementId {
    ElementId::new(value).expect("element id")
}

fn config(name: &str) -> SyncConfig {
    SyncConfig {
        client_id: Some(ClientId::new(name).expect("client id")),
        ..SyncConfig::for_diagram(diagram())
    }
}

fn connect(authority: &mut Authority, name: &str) -> Peer {
    let (channel, outbound, _connected) = MpscChannel::pair();
    let client = SyncClient::new(&config(name), channel, Vec::new());
    let (events_tx, events) = mpsc::unbounded_channel();
    authority.connect(client.client_id().clone(), events_tx);
    Peer { client, outbound, events }
}

/// Delivers queued messages both ways until every queue is empty.
fn settle(authority: &mut Authority, peers: &mut [&mut Peer]) {
    loop {
        let mut moved = false;
        for peer in peers.iter_mut() {
            while let Ok(event) = peer.events.try_recv() {
                peer.client.handle(event);
                moved = true;
            }
            while let Ok(message) = peer.outbound.try_recv() {
                authority.handle(peer.client.client_id(), message);
                moved = true;
            }
        }
        if !moved {
            return;
        }
    }
}

fn class(id: &str, name: &str) -> DiagramElement {
    DiagramElement::new(eid(id), ElementKind::Class, name)
}

fn association(id: &str, source: &str, target: &str) -> Relationship {
    Relationship::new(
        RelationshipId::new(id).expect("relationship id"),
        eid(source),
        eid(target),
        RelationshipKind::Association,
    )
}

fn authority_state(authority: &Authority) -> &DiagramState {
    authority.state(&diagram()).expect("room state")
}

fn two_peers() -> (Authority, Peer, Peer) {
    let mut authority = Authority::new().with_diagram(diagram(), DiagramState::new());
    let mut alice = connect(&mut authority, "alice");
    let mut bob = connect(&mut authority, "bob");
    settle(&mut authority, &mut [&mut alice, &mut bob]);
    (authority, alice, bob)
}

#[test]
fn concurrent_edits_converge_on_every_replica() {
    let (mut authority, mut alice, mut bob) = two_peers();
    assert_eq!(alice.client.presence().count(), 2);
    assert_eq!(bob.client.presence().count(), 2);

    alice.client.add_element(class("customer", "Customer").at(40.0, 40.0), Callbacks::none());
    bob.client.add_element(class("order", "Order").at(320.0, 40.0), Callbacks::none());
    settle(&mut authority, &mut [&mut alice, &mut bob]);

    alice.client.add_relationship(association("places", "customer", "order"), Callbacks::none());
    bob.client.update_element(
        &eid("customer"),
        &ElementChanges { name: Some("Shopper".to_owned()), x: Some(80.0), ..ElementChanges::default() },
    );
    settle(&mut authority, &mut [&mut alice, &mut bob]);

    let expected = authority_state(&authority);
    assert_eq!(alice.client.state(), expected);
    assert_eq!(bob.client.state(), expected);
    assert_eq!(expected.element("customer").map(DiagramElement::name), Some("Shopper"));
    assert!(expected.relationship("places").is_some());
    assert_eq!(alice.client.pending_count(), 0);
    assert_eq!(bob.client.pending_count(), 0);
}

#[test]
fn removing_an_element_leaves_no_dangling_relationships() {
    let (mut authority, mut alice, mut bob) = two_peers();
    alice.client.add_element(class("customer", "Customer"), Callbacks::none());
    alice.client.add_element(class("order", "Order"), Callbacks::none());
    alice.client.add_relationship(association("places", "customer", "order"), Callbacks::none());
    settle(&mut authority, &mut [&mut alice, &mut bob]);
    assert_eq!(bob.client.state().relationships().len(), 1);

    bob.client.remove_element(&eid("order"));
    settle(&mut authority, &mut [&mut alice, &mut bob]);

    for state in [alice.client.state(), bob.client.state(), authority_state(&authority)] {
        assert!(state.element("order").is_none());
        assert!(state.relationships().is_empty());
        assert!(state.dangling_relationships().is_empty());
    }
}

#[test]
fn rejected_operation_reaches_only_its_sender() {
    let (mut authority, mut alice, mut bob) = two_peers();
    alice.client.add_element(class("customer", "Customer"), Callbacks::none());
    settle(&mut authority, &mut [&mut alice, &mut bob]);

    let reasons = Arc::new(Mutex::new(Vec::new()));
    let captured = Arc::clone(&reasons);
    alice.client.add_relationship(
        association("ghost", "customer", "nowhere"),
        Callbacks::none().on_rejected(move |_, reason| {
            captured.lock().expect("lock").push(reason.to_owned());
        }),
    );
    settle(&mut authority, &mut [&mut alice, &mut bob]);

    assert_eq!(*reasons.lock().expect("lock"), vec!["target element nowhere not found".to_owned()]);
    assert!(alice.client.sink().iter().any(|notice| matches!(notice, Notice::OperationRejected { .. })));
    assert!(bob.client.sink().is_empty());
    assert!(alice.client.state().relationships().is_empty());
    assert_eq!(alice.client.state(), bob.client.state());
}

#[test]
fn undo_opens_up_once_the_collaborator_leaves() {
    let (mut authority, mut alice, mut bob) = two_peers();
    alice.client.add_element(class("customer", "Customer"), Callbacks::none());
    settle(&mut authority, &mut [&mut alice, &mut bob]);

    assert!(!alice.client.undo());
    assert!(matches!(
        alice.client.sink().last(),
        Some(Notice::HistoryBlocked { action: HistoryAction::Undo, user_count: 2, .. })
    ));

    authority.disconnect(bob.client.client_id(), "tab closed");
    settle(&mut authority, &mut [&mut alice, &mut bob]);
    assert!(alice.client.is_single_user());
    assert!(!bob.client.undo());
    bob.client.add_element(class("orphan", "Orphan"), Callbacks::none());
    assert!(bob.outbound.try_recv().is_err());

    assert!(alice.client.undo());
    settle(&mut authority, &mut [&mut alice]);

    assert!(alice.client.state().element("customer").is_none());
    assert!(authority_state(&authority).element("customer").is_none());
    assert!(alice.client.can_redo());
    assert!(alice.client.sink().contains(&Notice::HistoryApplied { action: HistoryAction::Undo }));
}

#[tokio::test]
async fn event_loops_deliver_confirmations() {
    let mut authority = Authority::new().with_diagram(diagram(), DiagramState::new());
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    let Peer { mut client, outbound, mut events } = connect(&mut authority, "alice");
    // Join before submitting so the operation lands in a room.
    let connected = events.try_recv().expect("connected event");
    client.handle(connected);

    let confirmed = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&confirmed);
    client.add_element(
        class("customer", "Customer"),
        Callbacks::none().on_confirmed(move |_| *flag.lock().expect("lock") = true),
    );

    tokio::spawn(forward_client(client.client_id().clone(), outbound, inbound_tx));
    let authority_task = tokio::spawn(async move {
        run_authority(&mut authority, inbound_rx).await;
        authority
    });

    let _ = tokio::time::timeout(Duration::from_millis(200), run_client(&mut client, events)).await;

    assert!(*confirmed.lock().expect("lock"));
    assert!(client.state().element("customer").is_some());
    assert_eq!(client.presence().count(), 1);

    drop(client);
    let authority = authority_task.await.expect("authority task");
    assert!(authority_state(&authority).element("customer").is_some());
    assert!(authority.members(&diagram()).is_empty());
}
