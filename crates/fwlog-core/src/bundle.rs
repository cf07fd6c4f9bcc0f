// Copyright (c) 2026 The FWLog Authors
// SPDX-License-Identifier: Apache-2.0

//! Proof bundles and the on-device bundle verifier.
//!
//! A proof bundle ships next to a firmware update and carries everything a
//! device needs to convince itself, offline, that the update is publicly
//! discoverable: the log's new signed checkpoint, the signed release
//! manifest, and the complete list of leaf hashes up to the checkpoint.
//!
//! The verifier reconstructs the Merkle root from the full leaf-hash list
//! instead of checking a classical inclusion/consistency proof pair. That
//! costs O(n) work but keeps the algorithm and the bundle layout small
//! enough to audit line by line, which is what the embedded consumer needs.

use crate::b64;
use crate::checkpoint::Checkpoint;
use crate::error::{FwLogError, FwLogResult};
use crate::note::{self, VerifierList};
use crate::release::FirmwareRelease;
use fwlog_verifier::{leaf_hash, CompactRange, Hash32};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The update-time proof bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    /// Signed checkpoint note from the log covering the release.
    #[serde(with = "b64::bytes")]
    pub new_checkpoint: Vec<u8>,

    /// Signed note whose body is the JSON `FirmwareRelease`.
    #[serde(with = "b64::bytes")]
    pub firmware_release: Vec<u8>,

    /// Every leaf hash of the log, in order, from index 0 up to
    /// `new_checkpoint`'s size.
    #[serde(with = "b64::hash_list")]
    pub leaf_hashes: Vec<Hash32>,
}

/// Verifies that `pb` proves the enclosed firmware release discoverable.
///
/// The checks, in order:
///
/// 1. the new checkpoint note verifies under `log_verifiers`, parses, and
///    carries `expected_origin`;
/// 2. the bundle has exactly `new_cp.size` leaf hashes;
/// 3. replaying the leaf hashes reproduces `old_cp.root` at exactly
///    `old_cp.size` (skipped for a zero-size `old_cp`), reproduces
///    `new_cp.root` at `new_cp.size`, and contains the release note's leaf
///    hash;
/// 4. the release note verifies under `release_verifiers` and parses as a
///    `FirmwareRelease`;
/// 5. every entry of `expected_artifacts` is committed to, byte for byte, by
///    the manifest. The manifest may commit to more.
///
/// Pure over its inputs; returns the parsed release on success.
pub fn verify_bundle(
    pb: &ProofBundle,
    old_cp: &Checkpoint,
    log_verifiers: &VerifierList,
    release_verifiers: &VerifierList,
    expected_artifacts: &BTreeMap<String, Vec<u8>>,
    expected_origin: &str,
) -> FwLogResult<FirmwareRelease> {
    let cp_note = note::open(&pb.new_checkpoint, log_verifiers)?;
    let new_cp = Checkpoint::unmarshal(cp_note.text.as_bytes())?;
    if new_cp.origin != expected_origin {
        return Err(FwLogError::OriginMismatch {
            expected: expected_origin.to_string(),
            got: new_cp.origin,
        });
    }

    if pb.leaf_hashes.len() as u64 != new_cp.size {
        return Err(FwLogError::MalformedBundle {
            got: pb.leaf_hashes.len() as u64,
            size: new_cp.size,
        });
    }

    // Replay the whole log through a compact range, watching for the three
    // events that make the bundle acceptable. A rewound old checkpoint
    // (old_cp.size > new_cp.size) simply never finds its root.
    let manifest_hash = leaf_hash(&pb.firmware_release);
    let mut range = CompactRange::new();
    let mut manifest_found = false;
    let mut old_cp_found = false;
    let mut new_cp_found = false;

    for hash in &pb.leaf_hashes {
        if !manifest_found && *hash == manifest_hash {
            manifest_found = true;
        }
        range.append(*hash);
        let size = range.size();
        if size == old_cp.size {
            old_cp_found = range.root().as_slice() == old_cp.root.as_slice();
        }
        if size == new_cp.size {
            new_cp_found = range.root().as_slice() == new_cp.root.as_slice();
        }
    }

    if old_cp.size > 0 && !old_cp_found {
        return Err(FwLogError::ConsistencyFailure { size: old_cp.size });
    }
    if !new_cp_found {
        return Err(FwLogError::ConsistencyFailure { size: new_cp.size });
    }
    if !manifest_found {
        return Err(FwLogError::InclusionFailure);
    }

    let release_note = note::open(&pb.firmware_release, release_verifiers)?;
    let release = FirmwareRelease::from_note_text(&release_note.text)?;

    for (name, expected) in expected_artifacts {
        match release.artifact_sha256.get(name) {
            Some(actual) if actual == expected => {}
            _ => {
                return Err(FwLogError::ArtifactMismatch { name: name.clone() });
            }
        }
    }

    Ok(release)
}
