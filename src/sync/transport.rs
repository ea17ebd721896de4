// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Channel plumbing between a [`SyncClient`] and an authority.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

use super::client::SyncClient;
use super::notice::NotificationSink;
use crate::ops::now_millis;
use crate::protocol::{ChannelEvent, ClientMessage};

/// Outbound half of a bidirectional, room-scoped connection.
pub trait Channel {
    fn is_connected(&self) -> bool;
    fn send(&self, message: ClientMessage) -> Result<(), ChannelError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    Disconnected,
    Closed,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("channel is disconnected"),
            Self::Closed => f.write_str("channel receiver was dropped"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Shared connectivity flag; the transport flips it, the client reads it before every send.
#[derive(Debug, Clone, Default)]
pub struct ConnectionFlag(Arc<AtomicBool>);

impl ConnectionFlag {
    pub fn new(connected: bool) -> Self {
        Self(Arc::new(AtomicBool::new(connected)))
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, connected: bool) {
        self.0.store(connected, Ordering::Release);
    }
}

/// In-process channel over a tokio unbounded mpsc queue.
#[derive(Debug, Clone)]
pub struct MpscChannel {
    sender: UnboundedSender<ClientMessage>,
    connected: ConnectionFlag,
}

impl MpscChannel {
    pub fn new(sender: UnboundedSender<ClientMessage>, connected: ConnectionFlag) -> Self {
        Self { sender, connected }
    }

    /// A connected channel plus the receiver the authority side drains.
    pub fn pair() -> (Self, UnboundedReceiver<ClientMessage>, ConnectionFlag) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let connected = ConnectionFlag::new(true);
        (Self::new(sender, connected.clone()), receiver, connected)
    }

    pub fn connection(&self) -> &ConnectionFlag {
        &self.connected
    }
}

impl Channel for MpscChannel {
    fn is_connected(&self) -> bool {
        self.connected.get() && !self.sender.is_closed()
    }

    fn send(&self, message: ClientMessage) -> Result<(), ChannelError> {
        if !self.connected.get() {
            return Err(ChannelError::Disconnected);
        }
        self.sender.send(message).map_err(|_| ChannelError::Closed)
    }
}

/// Drives `client` from `events` until the sender side is dropped.
///
/// Handlers run to completion one at a time. When the client has a pending timeout configured,
/// a timer periodically force-rejects stale pending entries.
pub async fn run_client<C, N>(client: &mut SyncClient<C, N>, mut events: UnboundedReceiver<ChannelEvent>)
where
    C: Channel,
    N: NotificationSink,
{
    let sweep_every = client
        .pending_timeout_ms()
        .map(|timeout| Duration::from_millis((timeout / 2).max(1)));
    let mut sweep = sweep_every.map(tokio::time::interval);

    info!(client_id = %client.client_id(), diagram_id = %client.diagram_id(), "client event loop started");
    loop {
        let event = match sweep.as_mut() {
            Some(interval) => {
                tokio::select! {
                    event = events.recv() => event,
                    _ = interval.tick() => {
                        let expired = client.expire_pending(now_millis());
                        if expired > 0 {
                            debug!(expired, "expired pending operations");
                        }
                        continue;
                    }
                }
            }
            None => events.recv().await,
        };

        let Some(event) = event else {
            break;
        };
        client.handle(event);
    }
    info!(client_id = %client.client_id(), "client event loop stopped");
}
