// Copyright (c) 2026 The FWLog Authors
// SPDX-License-Identifier: Apache-2.0

//! fwlog-monitor
//!
//! A long-running monitor for a firmware-transparency log. It polls the
//! log's signed checkpoint, requires every new checkpoint to be a consistent
//! extension of the last one it trusted, verifiably fetches every new leaf,
//! and hands each parsed [`fwlog_core::FirmwareRelease`] to a pluggable
//! handler. The only persisted state is the raw bytes of the latest
//! consistent signed checkpoint.
//!
//! The same log client and proof builder also serve the proof-bundle
//! producer in `fwlogctl`.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod client;
pub mod error;
pub mod fetch;
pub mod layout;
pub mod monitor;
pub mod state;

pub use crate::client::{LogClient, LogStateTracker, ProofBuilder, UpdateOutcome};
pub use crate::error::MonitorError;
pub use crate::fetch::{FetchError, Fetcher, LogFetcher};
pub use crate::monitor::{Monitor, ReleaseHandler};
