// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{ClientId, DiagramId};

pub const DEFAULT_OPERATION_LOG_CAPACITY: usize = 20;
const DEFAULT_DIAGRAM_ID: &str = "default";

/// Per-session client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub diagram_id: DiagramId,
    /// Generated as `client-<uuid>` when absent.
    pub client_id: Option<ClientId>,
    /// How many recent operations the outbound log keeps for display.
    pub operation_log_capacity: usize,
    /// Force-reject pending callbacks older than this. `None` keeps them until resolved.
    pub pending_timeout_ms: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            diagram_id: default_diagram_id(),
            client_id: None,
            operation_log_capacity: DEFAULT_OPERATION_LOG_CAPACITY,
            pending_timeout_ms: None,
        }
    }
}

impl SyncConfig {
    pub fn for_diagram(diagram_id: DiagramId) -> Self {
        Self { diagram_id, ..Self::default() }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&raw)
            .map_err(|source| ConfigError::Json { path: path.to_path_buf(), source })
    }

    pub fn resolve_client_id(&self) -> ClientId {
        if let Some(client_id) = &self.client_id {
            return client_id.clone();
        }
        ClientId::new_unchecked(format!("client-{}", uuid::Uuid::new_v4()))
    }
}

fn default_diagram_id() -> DiagramId {
    DiagramId::new_unchecked(DEFAULT_DIAGRAM_ID)
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Json { path: PathBuf, source: serde_json::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "config io error at {}: {source}", path.display()),
            Self::Json { path, source } => {
                write!(f, "config json error at {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, SyncConfig, DEFAULT_OPERATION_LOG_CAPACITY};
    use crate::test_support::TempDir;

    #[test]
    fn empty_object_yields_defaults() {
        let config: SyncConfig = serde_json::from_str("{}").expect("config");
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.diagram_id.as_str(), "default");
        assert_eq!(config.operation_log_capacity, DEFAULT_OPERATION_LOG_CAPACITY);
        assert_eq!(config.pending_timeout_ms, None);
    }

    #[test]
    fn load_reads_camel_case_file() {
        let tmp = TempDir::new("config");
        let path = tmp.path().join("sync.json");
        std::fs::write(
            &path,
            r#"{"diagramId":"d-42","clientId":"tab-1","operationLogCapacity":5,"pendingTimeoutMs":1500}"#,
        )
        .expect("write config");

        let config = SyncConfig::load(&path).expect("load");
        assert_eq!(config.diagram_id.as_str(), "d-42");
        assert_eq!(config.resolve_client_id().as_str(), "tab-1");
        assert_eq!(config.operation_log_capacity, 5);
        assert_eq!(config.pending_timeout_ms, Some(1500));
    }

    #[test]
    fn load_reports_missing_file_and_bad_json() {
        let tmp = TempDir::new("config-errors");
        let missing = tmp.path().join("missing.json");
        assert!(matches!(SyncConfig::load(&missing), Err(ConfigError::Io { .. })));

        let bad = tmp.path().join("bad.json");
        std::fs::write(&bad, r#"{"diagramId":"a/b"}"#).expect("write config");
        assert!(matches!(SyncConfig::load(&bad), Err(ConfigError::Json { .. })));
    }

    #[test]
    fn generated_client_ids_are_unique() {
        let config = SyncConfig::default();
        let a = config.resolve_client_id();
        let b = config.resolve_client_id();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("client-"));
    }
}
