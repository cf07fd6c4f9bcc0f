// Copyright (c) 2026 The FWLog Authors
// SPDX-License-Identifier: Apache-2.0

//! The monitor's single piece of persisted state: the raw signed bytes of
//! the latest consistent checkpoint.

use crate::error::MonitorError;
use std::io::Write as _;
use std::path::Path;

/// Reads the state file. A missing file is not an error; it triggers
/// trust-on-first-use.
pub fn read(path: &Path) -> Result<Option<Vec<u8>>, MonitorError> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(MonitorError::State {
            path: path.to_path_buf(),
            source: err,
        }),
    }
}

/// Replaces the state file atomically: write to a temp file in the same
/// directory, flush, fsync the file, rename over the target, then fsync the
/// parent directory so the rename itself is durable. A crash at any point
/// leaves either the old state or the new state, never a torn file and never
/// a lost rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), MonitorError> {
    let state_err = |source| MonitorError::State {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(state_err)?;
    tmp.write_all(data).map_err(state_err)?;
    tmp.flush().map_err(state_err)?;
    tmp.as_file().sync_all().map_err(state_err)?;
    tmp.persist(path).map_err(|err| state_err(err.error))?;
    fsync_directory(parent).map_err(state_err)?;
    Ok(())
}

// Calls fsync on a directory to commit rename operations.
fn fsync_directory(dir: &Path) -> std::io::Result<()> {
    std::fs::File::open(dir)?.sync_all()
}
