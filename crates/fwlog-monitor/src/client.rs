// Copyright (c) 2026 The FWLog Authors
// SPDX-License-Identifier: Apache-2.0

//! Typed access to a static transparency log, proof construction from
//! frozen Merkle nodes, and the checkpoint state tracker.

use crate::error::MonitorError;
use crate::fetch::Fetcher;
use crate::layout;
use fwlog_core::note::{self, VerifierList};
use fwlog_core::{Checkpoint, FwLogError};
use fwlog_verifier::{node_hash, verify_consistency, Hash32, HASH_SIZE};
use std::collections::HashMap;

// Largest power of two strictly less than n. Callers guarantee n > 1.
fn split_point(n: u64) -> u64 {
    1u64 << (u64::BITS - 1 - (n - 1).leading_zeros())
}

fn is_frozen(lo: u64, hi: u64) -> bool {
    let size = hi - lo;
    size.is_power_of_two() && lo % size == 0
}

// Decomposes the canonical tree range [lo, hi) into its complete subtrees,
// left to right.
fn plan_subtrees(lo: u64, hi: u64, out: &mut Vec<(u32, u64)>) {
    if is_frozen(lo, hi) {
        let level = (hi - lo).trailing_zeros();
        out.push((level, lo >> level));
        return;
    }
    let k = split_point(hi - lo);
    plan_subtrees(lo, lo + k, out);
    plan_subtrees(lo + k, hi, out);
}

// Ranges whose roots form the audit path for `index` within [lo, hi),
// ordered from the leaf's sibling upward.
fn plan_inclusion(index: u64, lo: u64, hi: u64, out: &mut Vec<(u64, u64)>) {
    if hi - lo <= 1 {
        return;
    }
    let k = split_point(hi - lo);
    if index < lo + k {
        plan_inclusion(index, lo, lo + k, out);
        out.push((lo + k, hi));
    } else {
        plan_inclusion(index, lo + k, hi, out);
        out.push((lo, lo + k));
    }
}

// Ranges whose roots form the consistency proof for the first `m` leaves of
// [lo, hi). `complete` tracks whether the old-tree prefix is untouched by
// the recursion so far.
fn plan_consistency(m: u64, lo: u64, hi: u64, complete: bool, out: &mut Vec<(u64, u64)>) {
    if m == hi - lo {
        if !complete {
            out.push((lo, hi));
        }
        return;
    }
    let k = split_point(hi - lo);
    if m <= k {
        plan_consistency(m, lo, lo + k, complete, out);
        out.push((lo + k, hi));
    } else {
        plan_consistency(m - k, lo + k, hi, false, out);
        out.push((lo, lo + k));
    }
}

/// Typed fetches against the log's static tree.
#[derive(Debug)]
pub struct LogClient<F> {
    fetcher: F,
}

impl<F: Fetcher> LogClient<F> {
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    /// Latest signed checkpoint note, raw.
    pub async fn checkpoint_note(&self) -> Result<Vec<u8>, MonitorError> {
        Ok(self.fetcher.fetch(layout::CHECKPOINT_PATH).await?)
    }

    /// Raw leaf bytes at `index`.
    pub async fn leaf(&self, index: u64) -> Result<Vec<u8>, MonitorError> {
        Ok(self.fetcher.fetch(&layout::leaf_path(index)).await?)
    }

    /// Hash of the frozen node at `(level, index)`.
    pub async fn node(&self, level: u32, index: u64) -> Result<Hash32, MonitorError> {
        let path = layout::node_path(level, index);
        let bytes = self.fetcher.fetch(&path).await?;
        if bytes.len() != HASH_SIZE {
            return Err(MonitorError::MalformedResource { path });
        }
        Hash32::try_from(bytes.as_slice()).map_err(|_| MonitorError::MalformedResource { path })
    }

    /// Sequence number for `leaf_hash`, from the log's reverse index.
    /// `FetchError::NotFound` means the leaf is not sequenced yet.
    pub async fn leaf_index(&self, leaf_hash: &Hash32) -> Result<u64, MonitorError> {
        let path = layout::leaf_index_path(leaf_hash);
        let bytes = self.fetcher.fetch(&path).await?;
        let text =
            std::str::from_utf8(&bytes).map_err(|_| MonitorError::MalformedResource {
                path: path.clone(),
            })?;
        text.trim()
            .parse()
            .map_err(|_| MonitorError::MalformedResource { path })
    }

    /// All leaf hashes `[0, size)`, from the level-0 nodes.
    pub async fn leaf_hashes(&self, size: u64) -> Result<Vec<Hash32>, MonitorError> {
        let mut hashes = Vec::with_capacity(size as usize);
        for index in 0..size {
            hashes.push(self.node(0, index).await?);
        }
        Ok(hashes)
    }
}

/// Builds inclusion and consistency proofs for a tree of a fixed size by
/// fetching frozen node hashes on demand and folding right-edge ephemeral
/// nodes from them. Fetched nodes are cached for the builder's lifetime.
pub struct ProofBuilder<'a, F> {
    client: &'a LogClient<F>,
    size: u64,
    nodes: HashMap<(u32, u64), Hash32>,
}

impl<'a, F: Fetcher> ProofBuilder<'a, F> {
    pub fn new(client: &'a LogClient<F>, size: u64) -> Self {
        Self {
            client,
            size,
            nodes: HashMap::new(),
        }
    }

    async fn node(&mut self, level: u32, index: u64) -> Result<Hash32, MonitorError> {
        if let Some(hash) = self.nodes.get(&(level, index)) {
            return Ok(*hash);
        }
        let hash = self.client.node(level, index).await?;
        self.nodes.insert((level, index), hash);
        Ok(hash)
    }

    async fn range_root(&mut self, lo: u64, hi: u64) -> Result<Hash32, MonitorError> {
        let mut coords = Vec::new();
        plan_subtrees(lo, hi, &mut coords);
        let mut hashes = Vec::with_capacity(coords.len());
        for (level, index) in coords {
            hashes.push(self.node(level, index).await?);
        }
        let mut rightmost = hashes.into_iter().rev();
        let Some(mut acc) = rightmost.next() else {
            return Err(MonitorError::MalformedResource {
                path: format!("empty node range [{lo}, {hi})"),
            });
        };
        for hash in rightmost {
            acc = node_hash(&hash, &acc);
        }
        Ok(acc)
    }

    /// Audit path for `index` under the builder's tree size.
    pub async fn inclusion_proof(&mut self, index: u64) -> Result<Vec<Hash32>, MonitorError> {
        if index >= self.size {
            return Err(MonitorError::InclusionProofInvalid {
                index,
                size: self.size,
            });
        }
        let mut ranges = Vec::new();
        plan_inclusion(index, 0, self.size, &mut ranges);
        let mut proof = Vec::with_capacity(ranges.len());
        for (lo, hi) in ranges {
            proof.push(self.range_root(lo, hi).await?);
        }
        Ok(proof)
    }

    /// Consistency proof from `old_size` to the builder's tree size.
    pub async fn consistency_proof(&mut self, old_size: u64) -> Result<Vec<Hash32>, MonitorError> {
        if old_size > self.size {
            return Err(MonitorError::Inconsistent {
                from: old_size,
                to: self.size,
            });
        }
        if old_size == 0 || old_size == self.size {
            return Ok(Vec::new());
        }
        let mut ranges = Vec::new();
        plan_consistency(old_size, 0, self.size, true, &mut ranges);
        let mut proof = Vec::with_capacity(ranges.len());
        for (lo, hi) in ranges {
            proof.push(self.range_root(lo, hi).await?);
        }
        Ok(proof)
    }
}

/// Outcome of one [`LogStateTracker::update`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// First checkpoint ever observed, accepted on trust-on-first-use.
    Initial,
    /// The log grew; the new checkpoint proved consistent with the previous
    /// one.
    Advanced { from: u64 },
    /// Same size, same root.
    Unchanged,
}

/// Tracks the latest signed checkpoint this process trusts.
///
/// Once a checkpoint is tracked, every replacement must verify under the
/// log's key, carry the same origin, and be a consistent append-only
/// extension. Anything else is evidence of log misbehaviour and fatal.
#[derive(Debug)]
pub struct LogStateTracker<F> {
    client: LogClient<F>,
    origin: String,
    verifiers: VerifierList,
    latest: Option<Checkpoint>,
    latest_raw: Vec<u8>,
}

impl<F: Fetcher> LogStateTracker<F> {
    /// `prior_state`, when present, is the raw signed checkpoint persisted by
    /// an earlier run; it must still verify and match `origin`.
    pub fn new(
        fetcher: F,
        origin: &str,
        verifiers: VerifierList,
        prior_state: Option<&[u8]>,
    ) -> Result<Self, MonitorError> {
        let mut tracker = Self {
            client: LogClient::new(fetcher),
            origin: origin.to_string(),
            verifiers,
            latest: None,
            latest_raw: Vec::new(),
        };
        if let Some(raw) = prior_state {
            let checkpoint = tracker.verify_checkpoint_note(raw)?;
            tracker.latest = Some(checkpoint);
            tracker.latest_raw = raw.to_vec();
        }
        Ok(tracker)
    }

    pub fn client(&self) -> &LogClient<F> {
        &self.client
    }

    /// The latest consistent checkpoint, if any has been accepted.
    pub fn latest(&self) -> Option<&Checkpoint> {
        self.latest.as_ref()
    }

    /// Raw signed note bytes of the latest consistent checkpoint.
    pub fn latest_raw(&self) -> &[u8] {
        &self.latest_raw
    }

    fn verify_checkpoint_note(&self, raw: &[u8]) -> Result<Checkpoint, MonitorError> {
        let cp_note = note::open(raw, &self.verifiers)?;
        let checkpoint = Checkpoint::unmarshal(cp_note.text.as_bytes())?;
        if checkpoint.origin != self.origin {
            return Err(FwLogError::OriginMismatch {
                expected: self.origin.clone(),
                got: checkpoint.origin,
            }
            .into());
        }
        Ok(checkpoint)
    }

    /// Fetches the log's current checkpoint and folds it into the tracked
    /// state.
    pub async fn update(&mut self) -> Result<UpdateOutcome, MonitorError> {
        let raw = self.client.checkpoint_note().await?;
        let incoming = self.verify_checkpoint_note(&raw)?;

        let Some(previous) = &self.latest else {
            tracing::info!(
                size = incoming.size,
                "accepting first checkpoint on trust"
            );
            self.latest = Some(incoming);
            self.latest_raw = raw;
            return Ok(UpdateOutcome::Initial);
        };

        if incoming.size < previous.size {
            return Err(MonitorError::Rewound {
                from: previous.size,
                to: incoming.size,
            });
        }
        if incoming.size == previous.size {
            if incoming.root == previous.root {
                return Ok(UpdateOutcome::Unchanged);
            }
            return Err(MonitorError::Forked {
                size: previous.size,
            });
        }

        let from = previous.size;
        // A zero-size previous checkpoint carries no knowledge to be
        // consistent with.
        if from > 0 {
            let old_root = digest(&previous.root)?;
            let new_root = digest(&incoming.root)?;
            let mut builder = ProofBuilder::new(&self.client, incoming.size);
            let proof = builder.consistency_proof(from).await?;
            if !verify_consistency(&old_root, &new_root, from, incoming.size, &proof) {
                return Err(MonitorError::Inconsistent {
                    from,
                    to: incoming.size,
                });
            }
        }

        tracing::info!(from, to = incoming.size, "checkpoint advanced");
        self.latest = Some(incoming);
        self.latest_raw = raw;
        Ok(UpdateOutcome::Advanced { from })
    }
}

fn digest(root: &[u8]) -> Result<Hash32, MonitorError> {
    Hash32::try_from(root).map_err(|_| MonitorError::MalformedRoot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtree_decomposition_is_canonical() {
        let mut coords = Vec::new();
        plan_subtrees(0, 7, &mut coords);
        assert_eq!(coords, vec![(2, 0), (1, 2), (0, 6)]);

        coords.clear();
        plan_subtrees(4, 7, &mut coords);
        assert_eq!(coords, vec![(1, 2), (0, 6)]);

        coords.clear();
        plan_subtrees(0, 8, &mut coords);
        assert_eq!(coords, vec![(3, 0)]);
    }

    #[test]
    fn inclusion_plan_matches_reference_path() {
        let mut ranges = Vec::new();
        plan_inclusion(3, 0, 7, &mut ranges);
        assert_eq!(ranges, vec![(2, 3), (0, 2), (4, 7)]);

        ranges.clear();
        plan_inclusion(6, 0, 7, &mut ranges);
        assert_eq!(ranges, vec![(4, 6), (0, 4)]);
    }

    #[test]
    fn consistency_plan_matches_reference_path() {
        // 6 -> 8: nodes [4,6), [6,8), [0,4).
        let mut ranges = Vec::new();
        plan_consistency(6, 0, 8, true, &mut ranges);
        assert_eq!(ranges, vec![(4, 6), (6, 8), (0, 4)]);

        // 8 -> 12: the old tree is a complete subtree of the new one.
        ranges.clear();
        plan_consistency(8, 0, 12, true, &mut ranges);
        assert_eq!(ranges, vec![(8, 12)]);
    }
}
