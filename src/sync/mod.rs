// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Client-side synchronization.
//!
//! [`SyncClient`] turns local intents into stamped operations, reconciles them with the
//! authority's confirm/reject/remote events, gates undo/redo on presence and merges batch
//! deltas. Everything runs on one logical thread; [`run_client`] drives it from a tokio
//! channel.

mod client;
mod config;
mod notice;
mod presence;
mod transport;

pub use client::{Callbacks, ConnectionStatus, SyncClient, TIMED_OUT_REASON};
pub use config::{ConfigError, SyncConfig, DEFAULT_OPERATION_LOG_CAPACITY};
pub use notice::{LogSink, Notice, NoticeLevel, NotificationSink};
pub use presence::PresenceTracker;
pub use transport::{run_client, Channel, ChannelError, ConnectionFlag, MpscChannel};
