// Copyright (c) 2026 The FWLog Authors
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

pub type FwLogResult<T> = Result<T, FwLogError>;

/// Verification failures. Each variant corresponds to one rejection reason;
/// none of them is recoverable by the caller that hit it.
#[derive(Debug, Error)]
pub enum FwLogError {
    #[error("malformed note envelope")]
    BadNote,

    #[error("note has no signature from a known verifier (first signer: {name})")]
    UnknownSigner { name: String },

    #[error("signature by known verifier {name} failed verification")]
    BadSignature { name: String },

    #[error("malformed verifier or signer key")]
    MalformedKey,

    #[error("invalid checkpoint: {reason}")]
    MalformedCheckpoint { reason: &'static str },

    #[error("checkpoint origin {got:?} does not match expected origin {expected:?}")]
    OriginMismatch { expected: String, got: String },

    #[error("{got} leaf hashes for checkpoint of size {size}")]
    MalformedBundle { got: u64, size: u64 },

    #[error("unable to reconstruct checkpoint root at size {size}")]
    ConsistencyFailure { size: u64 },

    #[error("manifest hash not present in the bundle's leaf hashes")]
    InclusionFailure,

    #[error("malformed firmware release: {0}")]
    BadRelease(#[source] serde_json::Error),

    #[error("manifest artifact {name:?} missing or digest mismatch")]
    ArtifactMismatch { name: String },
}
