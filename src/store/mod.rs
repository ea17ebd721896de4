// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Persistence for diagram snapshots on disk.
//!
//! Only final state is persisted; the operation stream is never written out.

pub mod snapshot_file;

pub use snapshot_file::{SnapshotFile, StoreError, WriteDurability};
