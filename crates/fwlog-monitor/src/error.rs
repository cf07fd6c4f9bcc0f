// Copyright (c) 2026 The FWLog Authors
// SPDX-License-Identifier: Apache-2.0

use crate::fetch::FetchError;
use fwlog_core::FwLogError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Verify(#[from] FwLogError),

    #[error("log rewound: checkpoint size went from {from} to {to}")]
    Rewound { from: u64, to: u64 },

    #[error("log forked: checkpoint root changed at unchanged size {size}")]
    Forked { size: u64 },

    #[error("consistency proof from size {from} to {to} did not verify")]
    Inconsistent { from: u64, to: u64 },

    #[error("inclusion proof for leaf {index} did not verify at size {size}")]
    InclusionProofInvalid { index: u64, size: u64 },

    #[error("unknown signer {name:?} for leaf at index {index}")]
    UnknownSigner { index: u64, name: String },

    #[error("checkpoint root is not a 32-byte digest")]
    MalformedRoot,

    #[error("log response at {path} is malformed")]
    MalformedResource { path: String },

    #[error("no checkpoint tracked yet")]
    NoCheckpoint,

    #[error("handler failed for leaf {index}")]
    Handler {
        index: u64,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to persist state file {path}")]
    State {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl MonitorError {
    /// Transient failures are retried on the next poll tick; everything else
    /// stops the monitor.
    pub fn is_transient(&self) -> bool {
        matches!(self, MonitorError::Fetch(_))
    }
}
