// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use rstest::{fixture, rstest};

use std::io::{self, Write};

use super::{write_atomic_with, SnapshotFile, StoreError, WriteDurability};
use crate::model::fixtures::{rid, shop_diagram};
use crate::model::{DiagramState, SNAPSHOT_VERSION};
use crate::test_support::TempDir;

struct SnapshotTestCtx {
    tmp: TempDir,
    file: SnapshotFile,
}

#[fixture]
fn ctx() -> SnapshotTestCtx {
    let tmp = TempDir::new("snapshot-file");
    let file = SnapshotFile::new(tmp.path().join("diagrams").join("shop.json"));
    SnapshotTestCtx { tmp, file }
}

#[rstest]
#[case(WriteDurability::BestEffort)]
#[case(WriteDurability::Durable)]
fn save_then_load_preserves_state(ctx: SnapshotTestCtx, #[case] durability: WriteDurability) {
    let file = ctx.file.clone().with_durability(durability);
    let state = shop_diagram();

    file.save(&state).expect("save");
    let (loaded, report) = file.load().expect("load");

    assert_eq!(loaded, state);
    assert!(report.dropped_relationships.is_empty());
    assert_eq!(file.load_snapshot().expect("snapshot").version, SNAPSHOT_VERSION);
}

#[rstest]
fn save_leaves_no_temp_files_behind(ctx: SnapshotTestCtx) {
    ctx.file.save(&shop_diagram()).expect("first save");
    ctx.file.save(&DiagramState::new()).expect("second save");

    let dir = ctx.tmp.path().join("diagrams");
    let names = std::fs::read_dir(&dir)
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["shop.json".to_owned()]);
    assert!(ctx.file.load().expect("load").0.is_empty());
}

#[rstest]
#[case(WriteDurability::BestEffort)]
#[case(WriteDurability::Durable)]
fn failed_write_removes_its_temp_file(ctx: SnapshotTestCtx, #[case] durability: WriteDurability) {
    let result = write_atomic_with(ctx.file.path(), durability, |file| {
        file.write_all(b"{\"elements\":")?;
        Err(io::Error::new(io::ErrorKind::Other, "device full"))
    });

    assert!(matches!(result, Err(StoreError::Io { .. })));
    let dir = ctx.tmp.path().join("diagrams");
    let leftovers = std::fs::read_dir(&dir).expect("read dir").count();
    assert_eq!(leftovers, 0);
    assert!(!ctx.file.exists());
}

#[rstest]
fn load_drops_dangling_relationships(ctx: SnapshotTestCtx) {
    std::fs::create_dir_all(ctx.tmp.path().join("diagrams")).expect("mkdir");
    std::fs::write(
        ctx.file.path(),
        r#"{
            "elements": {
                "a": {"id": "a", "className": "A", "elementType": "class"}
            },
            "relationships": {
                "r1": {"id": "r1", "source": "a", "target": "gone", "relationship": "dependency"}
            },
            "lastModified": 7
        }"#,
    )
    .expect("write");

    let (state, report) = ctx.file.load().expect("load");

    assert!(state.element("a").is_some());
    assert!(state.relationships().is_empty());
    assert_eq!(report.dropped_relationships, vec![rid("r1")]);
    let element = state.element("a").expect("a");
    assert_eq!((element.size().width, element.size().height), (200.0, 120.0));
}

#[rstest]
fn missing_file_reads_as_empty_only_through_load_or_default(ctx: SnapshotTestCtx) {
    assert!(!ctx.file.exists());
    assert!(matches!(ctx.file.load(), Err(StoreError::Io { .. })));
    let (state, _) = ctx.file.load_or_default().expect("default");
    assert!(state.is_empty());
}

#[rstest]
fn malformed_json_is_reported_with_its_path(ctx: SnapshotTestCtx) {
    std::fs::create_dir_all(ctx.tmp.path().join("diagrams")).expect("mkdir");
    std::fs::write(ctx.file.path(), "{ not json").expect("write");

    match ctx.file.load() {
        Err(StoreError::Json { path, .. }) => assert_eq!(path, ctx.file.path()),
        other => panic!("expected json error, got {other:?}"),
    }
}

#[cfg(unix)]
#[rstest]
fn save_refuses_to_replace_a_symlink(ctx: SnapshotTestCtx) {
    let dir = ctx.tmp.path().join("diagrams");
    std::fs::create_dir_all(&dir).expect("mkdir");
    let target = ctx.tmp.path().join("elsewhere.json");
    std::fs::write(&target, "{}").expect("write");
    std::os::unix::fs::symlink(&target, ctx.file.path()).expect("symlink");

    assert!(matches!(
        ctx.file.save(&shop_diagram()),
        Err(StoreError::SymlinkRefused { .. })
    ));
    assert_eq!(std::fs::read_to_string(&target).expect("read"), "{}");
}
