// Copyright (c) 2026 The FWLog Authors
// SPDX-License-Identifier: Apache-2.0

//! fwlog-verifier
//!
//! RFC 6962 Merkle tree primitives shared by the on-device proof-bundle
//! verifier and the log monitor. Everything in this crate is pure
//! computation over byte slices: no I/O, no clocks, no allocator tricks.
//! The on-device update path links only against this crate and
//! `fwlog-core`, so the whole verification algorithm stays auditable.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

use sha2::{Digest, Sha256};

pub type Hash32 = [u8; 32];

/// Digest length of the log's hasher.
pub const HASH_SIZE: usize = 32;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProofError {
    #[error("leaf index {index} out of range for tree size {size}")]
    IndexOutOfRange { index: u64, size: u64 },
    #[error("invalid size range: {old_size} -> {new_size}")]
    InvalidSizeRange { old_size: u64, new_size: u64 },
}

fn sha256(bytes: &[u8]) -> Hash32 {
    let mut h = Sha256::new();
    h.update(bytes);
    h.finalize().into()
}

/// Root of the empty tree: `SHA-256("")`.
pub fn empty_root() -> Hash32 {
    sha256(b"")
}

/// `SHA-256(0x00 || leaf)`, the domain-separated leaf hash.
pub fn leaf_hash(leaf: &[u8]) -> Hash32 {
    let mut buf = Vec::with_capacity(1 + leaf.len());
    buf.push(LEAF_PREFIX);
    buf.extend_from_slice(leaf);
    sha256(&buf)
}

/// `SHA-256(0x01 || left || right)`, the domain-separated internal hash.
pub fn node_hash(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut buf = [0u8; 65];
    buf[0] = NODE_PREFIX;
    buf[1..33].copy_from_slice(left);
    buf[33..65].copy_from_slice(right);
    sha256(&buf)
}

// Largest power of two strictly less than n. Callers guarantee n > 1.
fn split_point(n: usize) -> usize {
    debug_assert!(n > 1);
    1usize << (usize::BITS - 1 - (n - 1).leading_zeros())
}

/// Reference recursive root over a slice of leaf hashes.
pub fn merkle_root(leaves: &[Hash32]) -> Hash32 {
    match leaves.len() {
        0 => empty_root(),
        1 => leaves[0],
        n => {
            let k = split_point(n);
            let left = merkle_root(&leaves[..k]);
            let right = merkle_root(&leaves[k..]);
            node_hash(&left, &right)
        }
    }
}

/// Incremental root accumulator anchored at leaf index 0.
///
/// Appending leaf hashes one at a time maintains one peak per set bit of the
/// current size; the running root is the right-to-left fold of the peaks.
/// After `n` appends `root()` equals `merkle_root` over the same hashes.
#[derive(Debug, Clone, Default)]
pub struct CompactRange {
    size: u64,
    peaks: Vec<Hash32>,
}

impl CompactRange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of leaves appended so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn append(&mut self, hash: Hash32) {
        let mut hash = hash;
        let mut mask = self.size;
        while mask & 1 == 1 {
            // Invariant: peak count equals the popcount of size.
            let Some(left) = self.peaks.pop() else { break };
            hash = node_hash(&left, &hash);
            mask >>= 1;
        }
        self.peaks.push(hash);
        self.size += 1;
    }

    pub fn root(&self) -> Hash32 {
        let mut peaks = self.peaks.iter().rev();
        let Some(first) = peaks.next() else {
            return empty_root();
        };
        let mut acc = *first;
        for peak in peaks {
            acc = node_hash(peak, &acc);
        }
        acc
    }
}

fn inclusion_path(leaves: &[Hash32], index: usize) -> Vec<Hash32> {
    if leaves.len() <= 1 {
        return Vec::new();
    }
    let k = split_point(leaves.len());
    if index < k {
        let mut path = inclusion_path(&leaves[..k], index);
        path.push(merkle_root(&leaves[k..]));
        path
    } else {
        let mut path = inclusion_path(&leaves[k..], index - k);
        path.push(merkle_root(&leaves[..k]));
        path
    }
}

/// Audit path for `leaves[index]` within the first `size` leaves, ordered
/// from the leaf's sibling up to the root's child.
pub fn inclusion_proof(
    leaves: &[Hash32],
    index: u64,
    size: u64,
) -> Result<Vec<Hash32>, ProofError> {
    if size == 0 || size > leaves.len() as u64 || index >= size {
        return Err(ProofError::IndexOutOfRange { index, size });
    }
    Ok(inclusion_path(&leaves[..size as usize], index as usize))
}

fn consistency_path(leaves: &[Hash32], old_size: usize, complete: bool) -> Vec<Hash32> {
    let n = leaves.len();
    if old_size == n {
        if complete {
            return Vec::new();
        }
        return vec![merkle_root(leaves)];
    }
    let k = split_point(n);
    if old_size <= k {
        let mut path = consistency_path(&leaves[..k], old_size, complete);
        path.push(merkle_root(&leaves[k..]));
        path
    } else {
        let mut path = consistency_path(&leaves[k..], old_size - k, false);
        path.push(merkle_root(&leaves[..k]));
        path
    }
}

/// Consistency proof between the trees over the first `old_size` and
/// `new_size` leaves.
pub fn consistency_proof(
    leaves: &[Hash32],
    old_size: u64,
    new_size: u64,
) -> Result<Vec<Hash32>, ProofError> {
    if old_size > new_size || new_size > leaves.len() as u64 {
        return Err(ProofError::InvalidSizeRange { old_size, new_size });
    }
    if old_size == 0 || old_size == new_size {
        return Ok(Vec::new());
    }
    Ok(consistency_path(
        &leaves[..new_size as usize],
        old_size as usize,
        true,
    ))
}

/// Checks that `leaf` sits at `index` in the tree of `size` leaves committed
/// to by `root`. Every path element must be consumed.
pub fn verify_inclusion(
    leaf: &Hash32,
    index: u64,
    size: u64,
    proof: &[Hash32],
    root: &Hash32,
) -> bool {
    if size == 0 || index >= size {
        return false;
    }

    let mut node = index;
    let mut last = size - 1;
    let mut used = 0usize;
    let mut hash = *leaf;

    while last > 0 {
        if node % 2 == 1 {
            let Some(sibling) = proof.get(used) else {
                return false;
            };
            hash = node_hash(sibling, &hash);
            used += 1;
        } else if node < last {
            let Some(sibling) = proof.get(used) else {
                return false;
            };
            hash = node_hash(&hash, sibling);
            used += 1;
        }
        node /= 2;
        last /= 2;
    }

    used == proof.len() && &hash == root
}

/// Checks that the tree committed to by `new_root` at `new_size` is an
/// append-only extension of the tree committed to by `old_root` at
/// `old_size`.
pub fn verify_consistency(
    old_root: &Hash32,
    new_root: &Hash32,
    old_size: u64,
    new_size: u64,
    proof: &[Hash32],
) -> bool {
    if old_size > new_size {
        return false;
    }
    if old_size == 0 {
        return proof.is_empty() && *old_root == empty_root();
    }
    if old_size == new_size {
        return proof.is_empty() && old_root == new_root;
    }

    // Skip the common complete-subtree prefix.
    let mut node = old_size - 1;
    let mut last = new_size - 1;
    while node & 1 == 1 {
        node >>= 1;
        last >>= 1;
    }

    let mut elements = proof.iter();
    let mut old_hash;
    let mut new_hash;
    if node == 0 {
        old_hash = *old_root;
        new_hash = *old_root;
    } else {
        let Some(first) = elements.next() else {
            return false;
        };
        old_hash = *first;
        new_hash = *first;
    }

    while node > 0 {
        if node & 1 == 1 {
            // Right child: the left sibling exists in both trees.
            let Some(sibling) = elements.next() else {
                return false;
            };
            old_hash = node_hash(sibling, &old_hash);
            new_hash = node_hash(sibling, &new_hash);
        } else if node < last {
            // Left child with a right sibling in the new tree only.
            let Some(sibling) = elements.next() else {
                return false;
            };
            new_hash = node_hash(&new_hash, sibling);
        }
        node >>= 1;
        last >>= 1;
    }

    while last > 0 {
        let Some(sibling) = elements.next() else {
            return false;
        };
        new_hash = node_hash(&new_hash, sibling);
        last >>= 1;
    }

    elements.next().is_none() && &old_hash == old_root && &new_hash == new_root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_leaves(n: usize) -> Vec<Hash32> {
        (0..n)
            .map(|i| leaf_hash(format!("leaf-{i:04}").as_bytes()))
            .collect()
    }

    #[test]
    fn empty_tree_root_is_sha256_of_nothing() {
        assert_eq!(
            hex::encode(empty_root()),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn fixed_vectors_for_three_leaves() {
        let a = leaf_hash(b"a");
        let b = leaf_hash(b"b");
        let c = leaf_hash(b"c");
        assert_eq!(
            hex::encode(a),
            "022a6979e6dab7aa5ae4c3e5e45f7e977112a7e63593820dbec1ec738a24f93c"
        );
        assert_eq!(
            hex::encode(b),
            "57eb35615d47f34ec714cacdf5fd74608a5e8e102724e80b24b287c0c27b6a31"
        );
        assert_eq!(
            hex::encode(c),
            "597fcb31282d34654c200d3418fca5705c648ebf326ec73d8ddef11841f876d8"
        );

        let leaves = vec![a, b, c];
        let root = merkle_root(&leaves);
        assert_eq!(
            hex::encode(root),
            "36642e73c2540ab121e3a6bf9545b0a24982cd830eb13d3cd19de3ce6c021ec1"
        );

        let proof = inclusion_proof(&leaves, 1, 3).expect("proof");
        assert_eq!(proof, vec![a, c]);
        assert!(verify_inclusion(&b, 1, 3, &proof, &root));
    }

    #[test]
    fn compact_range_matches_recursive_root_for_all_small_sizes() {
        let leaves = test_leaves(64);
        let mut range = CompactRange::new();
        assert_eq!(range.root(), empty_root());
        for (i, leaf) in leaves.iter().enumerate() {
            range.append(*leaf);
            assert_eq!(range.size(), (i + 1) as u64);
            assert_eq!(range.root(), merkle_root(&leaves[..=i]), "size {}", i + 1);
        }
    }

    #[test]
    fn inclusion_round_trip_every_index() {
        for size in 1..=17u64 {
            let leaves = test_leaves(size as usize);
            let root = merkle_root(&leaves);
            for index in 0..size {
                let proof = inclusion_proof(&leaves, index, size).expect("proof");
                assert!(
                    verify_inclusion(&leaves[index as usize], index, size, &proof, &root),
                    "size {size} index {index}"
                );
                // A proof for one index must not validate a different leaf.
                let wrong = leaf_hash(b"not in the tree");
                assert!(!verify_inclusion(&wrong, index, size, &proof, &root));
            }
        }
    }

    #[test]
    fn inclusion_rejects_truncated_and_padded_paths() {
        let leaves = test_leaves(7);
        let root = merkle_root(&leaves);
        let proof = inclusion_proof(&leaves, 3, 7).expect("proof");

        let mut truncated = proof.clone();
        truncated.pop();
        assert!(!verify_inclusion(&leaves[3], 3, 7, &truncated, &root));

        let mut padded = proof.clone();
        padded.push(empty_root());
        assert!(!verify_inclusion(&leaves[3], 3, 7, &padded, &root));

        assert!(!verify_inclusion(&leaves[3], 7, 7, &proof, &root));
        assert!(!verify_inclusion(&leaves[3], 3, 0, &proof, &root));
    }

    #[test]
    fn consistency_round_trip_every_size_pair() {
        let leaves = test_leaves(20);
        for new_size in 1..=20u64 {
            let new_root = merkle_root(&leaves[..new_size as usize]);
            for old_size in 1..=new_size {
                let old_root = merkle_root(&leaves[..old_size as usize]);
                let proof = consistency_proof(&leaves, old_size, new_size).expect("proof");
                assert!(
                    verify_consistency(&old_root, &new_root, old_size, new_size, &proof),
                    "{old_size} -> {new_size}"
                );
            }
        }
    }

    #[test]
    fn consistency_rejects_forks() {
        let honest = test_leaves(12);
        let mut forked = honest.clone();
        forked[4] = leaf_hash(b"rewritten history");

        let old_root = merkle_root(&honest[..8]);
        let new_root = merkle_root(&forked);
        let proof = consistency_proof(&forked, 8, 12).expect("proof");
        assert!(!verify_consistency(&old_root, &new_root, 8, 12, &proof));
    }

    #[test]
    fn consistency_size_edge_cases() {
        let leaves = test_leaves(8);
        let root = merkle_root(&leaves);

        // Same size: only the empty proof with identical roots passes.
        assert!(verify_consistency(&root, &root, 8, 8, &[]));
        assert!(!verify_consistency(&root, &empty_root(), 8, 8, &[]));
        assert!(!verify_consistency(&root, &root, 8, 8, &[empty_root()]));

        // From the empty tree.
        assert!(verify_consistency(&empty_root(), &root, 0, 8, &[]));
        assert!(!verify_consistency(&root, &root, 0, 8, &[]));

        // Shrinking is never consistent.
        assert!(!verify_consistency(&root, &root, 9, 8, &[]));
    }

    #[test]
    fn proof_generation_bounds() {
        let leaves = test_leaves(4);
        assert_eq!(
            inclusion_proof(&leaves, 4, 4),
            Err(ProofError::IndexOutOfRange { index: 4, size: 4 })
        );
        assert_eq!(
            inclusion_proof(&leaves, 0, 5),
            Err(ProofError::IndexOutOfRange { index: 0, size: 5 })
        );
        assert_eq!(
            consistency_proof(&leaves, 3, 2),
            Err(ProofError::InvalidSizeRange {
                old_size: 3,
                new_size: 2
            })
        );
        assert_eq!(consistency_proof(&leaves, 0, 4), Ok(Vec::new()));
        assert_eq!(consistency_proof(&leaves, 4, 4), Ok(Vec::new()));
    }
}
