// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Operation synchronization engine for collaboratively edited class diagrams.
//!
//! Local intents become ordered operations ([`ops`]) that an authority confirms, rejects or
//! fans out ([`protocol`], [`authority`]). The [`sync`] client applies confirmed and remote
//! operations idempotently, gates undo/redo on presence and merges batch deltas ([`merge`])
//! without ever leaving a relationship with a dangling endpoint. Snapshots of the final state
//! are persisted by [`store`].

pub mod authority;
pub mod merge;
pub mod model;
pub mod ops;
pub mod protocol;
pub mod store;
pub mod sync;

#[cfg(test)]
mod test_support;
