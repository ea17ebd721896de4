// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! `diagram-sync` CLI entrypoint.
//!
//! `merge` and `import` apply a batch delta to a snapshot file; `demo` runs two clients against
//! the in-process authority and prints what each of them ends up with.

use std::error::Error;
use std::fs;

use diagram_sync::authority::Authority;
use diagram_sync::merge::{merge_delta, DiagramDelta, MergeSummary};
use diagram_sync::model::{
    ClientId, DiagramElement, DiagramState, ElementId, ElementKind, Position, Relationship,
    RelationshipId, RelationshipKind,
};
use diagram_sync::protocol::{ChannelEvent, ClientMessage};
use diagram_sync::store::{SnapshotFile, WriteDurability};
use diagram_sync::sync::{Callbacks, MpscChannel, Notice, SyncClient, SyncConfig};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing_subscriber::EnvFilter;

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} merge --snapshot <file> --delta <file> [--out <file>] [--durable-writes]\n  {program} import --snapshot <file> --export <file> [--out <file>] [--replace] [--durable-writes]\n  {program} demo [--config <file>] [--out <file>]\n\nmerge applies an AI-style delta ({{newElements, newRelationships, removeElementIds, ...}}).\nimport merges an exported diagram ({{name, state}}); --replace starts from an empty diagram.\nA missing snapshot reads as an empty diagram. Without --out the snapshot is rewritten in place.\n\n--durable-writes opts into slower, best-effort durable persistence (fsync/sync where supported).\nLog verbosity follows RUST_LOG (default: info)."
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Merge,
    Import,
    Demo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    command: Command,
    snapshot: Option<String>,
    input: Option<String>,
    out: Option<String>,
    config: Option<String>,
    replace: bool,
    durable_writes: bool,
}

impl CliOptions {
    fn new(command: Command) -> Self {
        Self {
            command,
            snapshot: None,
            input: None,
            out: None,
            config: None,
            replace: false,
            durable_writes: false,
        }
    }

    fn durability(&self) -> WriteDurability {
        if self.durable_writes {
            WriteDurability::Durable
        } else {
            WriteDurability::BestEffort
        }
    }
}

fn set_once(slot: &mut Option<String>, value: Option<String>) -> Result<(), ()> {
    if slot.is_some() {
        return Err(());
    }
    *slot = Some(value.ok_or(())?);
    Ok(())
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<CliOptions, ()> {
    let command = match args.next().as_deref() {
        Some("merge") => Command::Merge,
        Some("import") => Command::Import,
        Some("demo") => Command::Demo,
        _ => return Err(()),
    };
    let mut options = CliOptions::new(command);

    while let Some(arg) = args.next() {
        match (command, arg.as_str()) {
            (Command::Merge | Command::Import, "--snapshot") => {
                set_once(&mut options.snapshot, args.next())?
            }
            (Command::Merge, "--delta") | (Command::Import, "--export") => {
                set_once(&mut options.input, args.next())?
            }
            (_, "--out") => set_once(&mut options.out, args.next())?,
            (Command::Demo, "--config") => set_once(&mut options.config, args.next())?,
            (Command::Import, "--replace") => {
                if options.replace {
                    return Err(());
                }
                options.replace = true;
            }
            (Command::Merge | Command::Import, "--durable-writes") => {
                if options.durable_writes {
                    return Err(());
                }
                options.durable_writes = true;
            }
            _ => return Err(()),
        }
    }

    if command != Command::Demo && (options.snapshot.is_none() || options.input.is_none()) {
        return Err(());
    }

    Ok(options)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).try_init();
}

fn main() {
    let result = (|| -> Result<(), Box<dyn Error>> {
        let mut args = std::env::args();
        let program = args.next().unwrap_or_else(|| "diagram-sync".to_owned());

        let options = match parse_options(args) {
            Ok(options) => options,
            Err(()) => {
                print_usage(&program);
                std::process::exit(2);
            }
        };

        init_tracing();

        match options.command {
            Command::Merge | Command::Import => run_merge(&options),
            Command::Demo => run_demo(&options),
        }
    })();

    if let Err(err) = result {
        eprintln!("diagram-sync: {err}");
        std::process::exit(1);
    }
}

fn run_merge(options: &CliOptions) -> Result<(), Box<dyn Error>> {
    let (Some(snapshot_path), Some(input_path)) = (&options.snapshot, &options.input) else {
        return Err("missing --snapshot or input file".into());
    };

    let raw = fs::read_to_string(input_path)?;
    let payload: serde_json::Value = serde_json::from_str(&raw)?;
    let delta = match options.command {
        Command::Import => DiagramDelta::from_export(&payload)?,
        _ => DiagramDelta::from_json(&payload)?,
    };

    let snapshot = SnapshotFile::new(snapshot_path);
    let state = if options.replace {
        DiagramState::new()
    } else {
        let (state, report) = snapshot.load_or_default()?;
        for relationship_id in &report.dropped_relationships {
            eprintln!("dropped dangling relationship on load: {relationship_id}");
        }
        state
    };

    let (elements, relationships) = state.into_parts();
    let outcome = merge_delta(&delta, elements, relationships);
    print_summary(&outcome.summary);

    let target = options.out.as_deref().unwrap_or(snapshot_path);
    SnapshotFile::new(target)
        .with_durability(options.durability())
        .save(&DiagramState::from_parts(outcome.elements, outcome.relationships))?;
    println!("wrote {target}");
    Ok(())
}

fn print_summary(summary: &MergeSummary) {
    println!("{summary}");
    if summary.duplicates_skipped > 0 {
        println!("skipped {} item(s) whose id already existed", summary.duplicates_skipped);
    }
    for dropped in &summary.dropped {
        println!("dropped {dropped}");
    }
}

type DemoClient = SyncClient<MpscChannel, Vec<Notice>>;

/// One simulated browser tab: the client plus both ends of its connection.
struct DemoPeer {
    client: DemoClient,
    outbound: UnboundedReceiver<ClientMessage>,
    events: UnboundedReceiver<ChannelEvent>,
}

impl DemoPeer {
    fn connect(authority: &mut Authority, config: &SyncConfig) -> Self {
        let (channel, outbound, _connected) = MpscChannel::pair();
        let client = SyncClient::new(config, channel, Vec::new());
        let (events_tx, events) = mpsc::unbounded_channel();
        authority.connect(client.client_id().clone(), events_tx);
        Self { client, outbound, events }
    }
}

/// Delivers queued messages in both directions until nothing moves.
fn settle(authority: &mut Authority, peers: &mut [&mut DemoPeer]) {
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

fn run_demo(options: &CliOptions) -> Result<(), Box<dyn Error>> {
    let base = match &options.config {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::default(),
    };
    let diagram_id = base.diagram_id.clone();
    let mut authority = Authority::new().with_diagram(diagram_id.clone(), DiagramState::new());

    let mut alice = DemoPeer::connect(
        &mut authority,
        &SyncConfig { client_id: Some(ClientId::new("alice")?), ..base.clone() },
    );
    let mut bob = DemoPeer::connect(
        &mut authority,
        &SyncConfig { client_id: Some(ClientId::new("bob")?), ..base.clone() },
    );
    settle(&mut authority, &mut [&mut alice, &mut bob]);

    let customer = ElementId::new("customer")?;
    let order = ElementId::new("order")?;
    alice.client.add_element(
        DiagramElement::new(customer.clone(), ElementKind::Class, "Customer")
            .with_members(vec!["id: int".to_owned(), "email: string".to_owned()], Vec::new())
            .at(40.0, 40.0),
        Callbacks::none().on_confirmed(|operation| println!("confirmed: {}", operation.description())),
    );
    bob.client.add_element(
        DiagramElement::new(order.clone(), ElementKind::Class, "Order").at(360.0, 40.0),
        Callbacks::none(),
    );
    settle(&mut authority, &mut [&mut alice, &mut bob]);

    let mut places = Relationship::new(
        RelationshipId::new("places")?,
        customer.clone(),
        order.clone(),
        RelationshipKind::Association,
    );
    places.set_label(Some("places"));
    alice.client.add_relationship(places, Callbacks::none());
    bob.client.move_element(&order, Position { x: 420.0, y: 80.0 });
    settle(&mut authority, &mut [&mut alice, &mut bob]);

    alice.client.undo();
    authority.disconnect(bob.client.client_id(), "tab closed");
    settle(&mut authority, &mut [&mut alice, &mut bob]);
    alice.client.undo();
    settle(&mut authority, &mut [&mut alice]);

    let delta = DiagramDelta::from_json(&serde_json::json!({
        "newElements": [{"id": "invoice", "className": "Invoice", "elementType": "class", "x": 40, "y": 260}],
        "newRelationships": [
            {"id": "bills", "source": "invoice", "target": "order", "relationship": "dependency"},
            {"id": "ghost", "source": "invoice", "target": "payment", "relationship": "association"},
        ],
    }))?;
    alice.client.merge_delta(&delta);

    for (name, peer) in [("alice", &alice), ("bob", &bob)] {
        println!("== {name}");
        print_state(peer.client.state());
        for notice in peer.client.sink() {
            println!("  notice: {notice}");
        }
    }
    if let Some(state) = authority.state(&diagram_id) {
        println!("== authority");
        print_state(state);
    }

    if let Some(out) = &options.out {
        SnapshotFile::new(out).save(alice.client.state())?;
        println!("wrote {out}");
    }
    Ok(())
}

fn print_state(state: &DiagramState) {
    for element in state.elements().values() {
        let position = element.position();
        println!(
            "  {} {} \"{}\" at ({}, {})",
            element.kind(),
            element.id(),
            element.name(),
            position.x,
            position.y
        );
    }
    for relationship in state.relationships().values() {
        println!(
            "  {} {}: {} -> {}",
            relationship.kind(),
            relationship.id(),
            relationship.source_id(),
            relationship.target_id()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_options, CliOptions, Command};

    fn args(values: &[&str]) -> impl Iterator<Item = String> {
        values.iter().map(|value| (*value).to_owned()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn parses_merge() {
        let options = parse_options(args(&["merge", "--snapshot", "a.json", "--delta", "d.json"]))
            .expect("parse options");
        assert_eq!(options.command, Command::Merge);
        assert_eq!(options.snapshot.as_deref(), Some("a.json"));
        assert_eq!(options.input.as_deref(), Some("d.json"));
        assert_eq!(options.out, None);
        assert!(!options.durable_writes);
    }

    #[test]
    fn parses_import_with_replace_and_out() {
        let options = parse_options(args(&[
            "import", "--export", "e.json", "--snapshot", "a.json", "--replace", "--out", "b.json",
        ]))
        .expect("parse options");
        assert_eq!(options.command, Command::Import);
        assert_eq!(options.input.as_deref(), Some("e.json"));
        assert_eq!(options.out.as_deref(), Some("b.json"));
        assert!(options.replace);
    }

    #[test]
    fn parses_demo_without_flags() {
        let options = parse_options(args(&["demo"])).expect("parse options");
        assert_eq!(options, CliOptions::new(Command::Demo));
    }

    #[test]
    fn rejects_missing_or_unknown_subcommand() {
        parse_options(std::iter::empty()).unwrap_err();
        parse_options(args(&["serve"])).unwrap_err();
    }

    #[test]
    fn rejects_flags_of_other_subcommands() {
        parse_options(args(&["merge", "--snapshot", "a", "--export", "e"])).unwrap_err();
        parse_options(args(&["merge", "--snapshot", "a", "--delta", "d", "--replace"])).unwrap_err();
        parse_options(args(&["demo", "--snapshot", "a"])).unwrap_err();
    }

    #[test]
    fn rejects_missing_inputs_and_values() {
        parse_options(args(&["merge", "--snapshot", "a.json"])).unwrap_err();
        parse_options(args(&["import", "--export", "e.json"])).unwrap_err();
        parse_options(args(&["merge", "--snapshot"])).unwrap_err();
    }

    #[test]
    fn rejects_duplicate_flags() {
        parse_options(args(&["merge", "--snapshot", "a", "--snapshot", "b", "--delta", "d"]))
            .unwrap_err();
        parse_options(args(&[
            "merge", "--snapshot", "a", "--delta", "d", "--durable-writes", "--durable-writes",
        ]))
        .unwrap_err();
    }
}
