// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Nereid-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of diagram-sync and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::model::{DiagramSnapshot, DiagramState, LoadReport};
use crate::ops::now_millis;

#[derive(Debug)]
pub enum StoreError {
    Io { path: PathBuf, source: io::Error },
    Json { path: PathBuf, source: serde_json::Error },
    InvalidPath { path: PathBuf, reason: &'static str },
    SymlinkRefused { path: PathBuf },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "io error at {path:?}: {source}"),
            Self::Json { path, source } => write!(f, "json error at {path:?}: {source}"),
            Self::InvalidPath { path, reason } => write!(f, "invalid snapshot path {path:?}: {reason}"),
            Self::SymlinkRefused { path } => write!(f, "refusing to overwrite symlink at {path:?}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::InvalidPath { .. } | Self::SymlinkRefused { .. } => None,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum WriteDurability {
    /// Writes a temp file and renames it into place; no fsync.
    #[default]
    BestEffort,

    /// Additionally syncs the file contents and the parent directory. Exact guarantees are
    /// platform/filesystem-dependent.
    Durable,
}

/// A diagram snapshot persisted as one pretty-printed JSON file.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
    durability: WriteDurability,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), durability: WriteDurability::default() }
    }

    pub fn with_durability(mut self, durability: WriteDurability) -> Self {
        self.durability = durability;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn durability(&self) -> WriteDurability {
        self.durability
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load_snapshot(&self) -> Result<DiagramSnapshot, StoreError> {
        let raw = fs::read_to_string(&self.path)
            .map_err(|source| StoreError::Io { path: self.path.clone(), source })?;
        serde_json::from_str(&raw).map_err(|source| StoreError::Json { path: self.path.clone(), source })
    }

    /// Loads the snapshot into a state, dropping relationships with dangling endpoints.
    pub fn load(&self) -> Result<(DiagramState, LoadReport), StoreError> {
        let snapshot = self.load_snapshot()?;
        let (state, report) = DiagramState::from_snapshot(snapshot);
        if !report.dropped_relationships.is_empty() {
            warn!(
                path = %self.path.display(),
                dropped = report.dropped_relationships.len(),
                "snapshot contained dangling relationships"
            );
        }
        Ok((state, report))
    }

    /// Like [`Self::load`], but a missing file reads as an empty diagram.
    pub fn load_or_default(&self) -> Result<(DiagramState, LoadReport), StoreError> {
        match fs::metadata(&self.path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no snapshot yet; starting empty");
                Ok((DiagramState::new(), LoadReport::default()))
            }
            _ => self.load(),
        }
    }

    pub fn save(&self, state: &DiagramState) -> Result<(), StoreError> {
        self.save_snapshot(&state.snapshot(now_millis()))
    }

    pub fn save_snapshot(&self, snapshot: &DiagramSnapshot) -> Result<(), StoreError> {
        let mut contents = serde_json::to_vec_pretty(snapshot)
            .map_err(|source| StoreError::Json { path: self.path.clone(), source })?;
        contents.push(b'\n');
        write_atomic(&self.path, &contents, self.durability)
    }
}

fn rename_overwrite(from: &Path, to: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::AlreadyExists | io::ErrorKind::PermissionDenied
                ) =>
            {
                let _ = fs::remove_file(to);
                fs::rename(from, to)
            }
            Err(err) => Err(err),
        }
    }

    #[cfg(not(windows))]
    {
        fs::rename(from, to)
    }
}

fn write_atomic(path: &Path, contents: &[u8], durability: WriteDurability) -> Result<(), StoreError> {
    write_atomic_with(path, durability, |file| file.write_all(contents))?;
    debug!(path = %path.display(), bytes = contents.len(), "snapshot written");
    Ok(())
}

/// Fills a fresh temp file next to `path` via `write`, then renames it into place. The temp
/// file never outlives a failed attempt.
fn write_atomic_with<F>(path: &Path, durability: WriteDurability, write: F) -> Result<(), StoreError>
where
    F: FnOnce(&mut fs::File) -> io::Result<()>,
{
    let Some(file_name) = path.file_name() else {
        return Err(StoreError::InvalidPath { path: path.to_path_buf(), reason: "no file name" });
    };
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;

    match fs::symlink_metadata(path) {
        Ok(md) if md.file_type().is_symlink() => {
            return Err(StoreError::SymlinkRefused { path: path.to_path_buf() });
        }
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(source) => return Err(StoreError::Io { path: path.to_path_buf(), source }),
    }

    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    let tmp_path =
        parent.join(format!(".diagram-sync.tmp.{}.{}", file_name.to_string_lossy(), nanos));

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp_path)
        .map_err(|source| StoreError::Io { path: tmp_path.clone(), source })?;

    let written = write(&mut file).and_then(|()| match durability {
        WriteDurability::Durable => file.sync_all(),
        WriteDurability::BestEffort => Ok(()),
    });
    drop(file);
    if let Err(source) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::Io { path: tmp_path, source });
    }

    if let Err(source) = rename_overwrite(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::Io { path: path.to_path_buf(), source });
    }

    if durability == WriteDurability::Durable {
        #[cfg(unix)]
        {
            let dir = fs::File::open(parent)
                .map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;
            dir.sync_all().map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests;
