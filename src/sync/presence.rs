// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeSet;

use crate::model::ParticipantId;

/// Active collaborators of one diagram room, as announced by the authority.
///
/// Only gates undo/redo; ordinary edits are available regardless of the count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceTracker {
    participants: BTreeSet<ParticipantId>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the participant was already present.
    pub fn join(&mut self, participant_id: ParticipantId) -> bool {
        self.participants.insert(participant_id)
    }

    pub fn leave(&mut self, participant_id: &ParticipantId) -> bool {
        self.participants.remove(participant_id)
    }

    pub fn is_single_user(&self) -> bool {
        self.participants.len() <= 1
    }

    pub fn count(&self) -> usize {
        self.participants.len()
    }

    pub fn contains(&self, participant_id: &ParticipantId) -> bool {
        self.participants.contains(participant_id)
    }

    pub fn participants(&self) -> impl Iterator<Item = &ParticipantId> {
        self.participants.iter()
    }

    pub fn clear(&mut self) {
        self.participants.clear();
    }
}
