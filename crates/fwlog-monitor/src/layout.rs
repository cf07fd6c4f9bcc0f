// Copyright (c) 2026 The FWLog Authors
// SPDX-License-Identifier: Apache-2.0

//! Well-known relative paths within the log's static tree.
//!
//! The log publishes its checkpoint, raw leaves, frozen Merkle nodes and a
//! leaf-hash reverse index at fixed paths. Only complete (frozen) subtree
//! nodes are ever published; ephemeral right-edge nodes are folded by the
//! proof builder from complete ones.

use fwlog_verifier::Hash32;

/// Latest signed checkpoint note.
pub const CHECKPOINT_PATH: &str = "checkpoint";

/// Raw leaf bytes by index.
pub fn leaf_path(index: u64) -> String {
    format!("seq/{index:016x}")
}

/// 32-byte hash of the complete subtree node at `(level, index)`, covering
/// leaves `[index << level, (index + 1) << level)`. Level 0 nodes are leaf
/// hashes.
pub fn node_path(level: u32, index: u64) -> String {
    format!("tile/{level}/{index:016x}")
}

/// Reverse index from a leaf hash to its ASCII decimal sequence number.
pub fn leaf_index_path(leaf_hash: &Hash32) -> String {
    format!("leaves/{}", hex::encode(leaf_hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwlog_verifier::leaf_hash;

    #[test]
    fn paths_are_stable() {
        assert_eq!(leaf_path(0), "seq/0000000000000000");
        assert_eq!(leaf_path(0x2a), "seq/000000000000002a");
        assert_eq!(node_path(3, 7), "tile/3/0000000000000007");
        let hash = leaf_hash(b"a");
        assert_eq!(
            leaf_index_path(&hash),
            "leaves/022a6979e6dab7aa5ae4c3e5e45f7e977112a7e63593820dbec1ec738a24f93c"
        );
    }
}
