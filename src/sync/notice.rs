// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;

use tracing::{error, info, warn};

use crate::merge::MergeSummary;
use crate::protocol::HistoryAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// User-facing notification surfaced by the sync client.
///
/// Every failure the engine can observe degrades to one of these plus a no-op.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    OperationRejected { description: String, reason: String },
    OperationConflict { description: String, conflicts: usize },
    /// A confirmed or remote operation that could not be applied locally.
    ApplyFailed { description: String, error: String },
    HistoryApplied { action: HistoryAction },
    HistoryFailed { action: HistoryAction, error: String },
    HistoryBlocked { action: HistoryAction, reason: String, user_count: usize },
    /// Undo/redo requested without a connection.
    HistoryUnavailable { action: HistoryAction },
    DeltaMerged { summary: MergeSummary },
}

impl Notice {
    pub fn level(&self) -> NoticeLevel {
        match self {
            Self::OperationRejected { .. } | Self::HistoryFailed { .. } => NoticeLevel::Error,
            Self::OperationConflict { .. }
            | Self::ApplyFailed { .. }
            | Self::HistoryBlocked { .. }
            | Self::HistoryUnavailable { .. } => NoticeLevel::Warning,
            Self::HistoryApplied { .. } => NoticeLevel::Success,
            Self::DeltaMerged { summary } if summary.is_empty() => NoticeLevel::Info,
            Self::DeltaMerged { .. } => NoticeLevel::Success,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::OperationRejected { .. } => "Operation rejected",
            Self::OperationConflict { .. } => "Conflict detected",
            Self::ApplyFailed { .. } => "Operation not applied",
            Self::HistoryApplied { action: HistoryAction::Undo } => "Undo",
            Self::HistoryApplied { action: HistoryAction::Redo } => "Redo",
            Self::HistoryFailed { action: HistoryAction::Undo, .. } => "Undo failed",
            Self::HistoryFailed { action: HistoryAction::Redo, .. } => "Redo failed",
            Self::HistoryBlocked { .. } => "Undo/redo unavailable",
            Self::HistoryUnavailable { .. } => "Not connected",
            Self::DeltaMerged { .. } => "Diagram updated",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::OperationRejected { description, reason } => format!("{description}: {reason}"),
            Self::OperationConflict { description, conflicts } => format!(
                "{description} overlapped {conflicts} concurrent change(s); the result may differ from what you expect"
            ),
            Self::ApplyFailed { description, error } => format!("{description}: {error}"),
            Self::HistoryApplied { action: HistoryAction::Undo } => {
                "operation undone".to_owned()
            }
            Self::HistoryApplied { action: HistoryAction::Redo } => {
                "operation redone".to_owned()
            }
            Self::HistoryFailed { error, .. } => error.clone(),
            Self::HistoryBlocked { reason, user_count, .. } => {
                format!("{reason} ({user_count} active users)")
            }
            Self::HistoryUnavailable { action } => format!("cannot {action} while disconnected"),
            Self::DeltaMerged { summary } => summary.to_string(),
        }
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title(), self.message())
    }
}

/// Where the sync client surfaces notices.
pub trait NotificationSink {
    fn notify(&mut self, notice: Notice);
}

impl NotificationSink for Vec<Notice> {
    fn notify(&mut self, notice: Notice) {
        self.push(notice);
    }
}

/// Forwards notices to the log at a level matching their severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&mut self, notice: Notice) {
        match notice.level() {
            NoticeLevel::Success | NoticeLevel::Info => info!(title = notice.title(), "{}", notice.message()),
            NoticeLevel::Warning => warn!(title = notice.title(), "{}", notice.message()),
            NoticeLevel::Error => error!(title = notice.title(), "{}", notice.message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Notice, NoticeLevel};
    use crate::protocol::HistoryAction;

    #[test]
    fn blocked_notice_carries_user_count() {
        let notice = Notice::HistoryBlocked {
            action: HistoryAction::Undo,
            reason: "undo/redo needs a single active user".to_owned(),
            user_count: 2,
        };
        assert_eq!(notice.level(), NoticeLevel::Warning);
        assert_eq!(
            notice.to_string(),
            "Undo/redo unavailable: undo/redo needs a single active user (2 active users)"
        );
    }
}
