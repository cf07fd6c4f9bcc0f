// Copyright (c) 2026 The FWLog Authors
// SPDX-License-Identifier: Apache-2.0

//! The monitor loop: verify every new leaf under the tracked checkpoint and
//! hand each parsed release to a handler.

use crate::client::{LogStateTracker, ProofBuilder, UpdateOutcome};
use crate::error::MonitorError;
use crate::fetch::Fetcher;
use crate::state;
use async_trait::async_trait;
use fwlog_core::note::{self, VerifierList};
use fwlog_core::{FirmwareRelease, FwLogError};
use fwlog_verifier::{leaf_hash, verify_inclusion, Hash32};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;

/// Receives each verified release, in log order. The reference handler
/// rebuilds the release from source and compares artifact digests; that
/// machinery lives outside this crate.
#[async_trait]
pub trait ReleaseHandler: Send {
    async fn handle(&mut self, index: u64, release: FirmwareRelease) -> anyhow::Result<()>;
}

/// Verifiably follows a log, dispatching each new release to a handler.
///
/// State is advanced (in memory and on disk) only after an entire window of
/// leaves has verified and been handled.
pub struct Monitor<F, H> {
    tracker: LogStateTracker<F>,
    state_path: PathBuf,
    release_verifiers: VerifierList,
    handler: H,
    // Log size covered by the persisted state file; None before the first
    // successful catch-up.
    processed: Option<u64>,
}

impl<F: Fetcher, H: ReleaseHandler> Monitor<F, H> {
    /// `tracker` may already hold a checkpoint restored from the state file;
    /// leaves up to its size are assumed to have been handled by the run
    /// that persisted it.
    pub fn new(
        tracker: LogStateTracker<F>,
        state_path: PathBuf,
        release_verifiers: VerifierList,
        handler: H,
    ) -> Self {
        let processed = tracker.latest().map(|checkpoint| checkpoint.size);
        Self {
            tracker,
            state_path,
            release_verifiers,
            handler,
            processed,
        }
    }

    pub fn tracker(&self) -> &LogStateTracker<F> {
        &self.tracker
    }

    /// Verifies and dispatches leaves `[start, latest.size)`, then persists
    /// the latest raw checkpoint. Any failure aborts before the state file
    /// is touched.
    pub async fn from(&mut self, start: u64) -> Result<(), MonitorError> {
        let Some(latest) = self.tracker.latest().cloned() else {
            return Err(MonitorError::NoCheckpoint);
        };
        let root = Hash32::try_from(latest.root.as_slice())
            .map_err(|_| MonitorError::MalformedRoot)?;

        let mut builder = ProofBuilder::new(self.tracker.client(), latest.size);
        for index in start..latest.size {
            let leaf = self.tracker.client().leaf(index).await?;
            let hash = leaf_hash(&leaf);

            let proof = builder.inclusion_proof(index).await?;
            if !verify_inclusion(&hash, index, latest.size, &proof, &root) {
                return Err(MonitorError::InclusionProofInvalid {
                    index,
                    size: latest.size,
                });
            }

            let release_note = match note::open(&leaf, &self.release_verifiers) {
                Ok(release_note) => release_note,
                // Surfaced with the index so operators can find the
                // mis-signed entry.
                Err(FwLogError::UnknownSigner { name }) => {
                    return Err(MonitorError::UnknownSigner { index, name });
                }
                Err(err) => return Err(err.into()),
            };
            let release = FirmwareRelease::from_note_text(&release_note.text)?;
            tracing::debug!(index, revision = %release.revision, "leaf verified");

            self.handler
                .handle(index, release)
                .await
                .map_err(|source| MonitorError::Handler { index, source })?;
        }

        state::write_atomic(&self.state_path, self.tracker.latest_raw())?;
        self.processed = Some(latest.size);
        tracing::info!(size = latest.size, "state advanced");
        Ok(())
    }

    /// One poll: refresh the checkpoint, then catch up on any leaves not yet
    /// covered by the persisted state.
    pub async fn poll_once(&mut self) -> Result<(), MonitorError> {
        match self.tracker.update().await? {
            UpdateOutcome::Initial => {
                tracing::info!("no prior state; catching up from the start of the log");
            }
            UpdateOutcome::Advanced { from } => {
                tracing::debug!(from, "log grew");
            }
            UpdateOutcome::Unchanged => {}
        }

        let latest_size = self
            .tracker
            .latest()
            .map(|checkpoint| checkpoint.size)
            .ok_or(MonitorError::NoCheckpoint)?;
        match self.processed {
            Some(done) if done >= latest_size => Ok(()),
            Some(done) => self.from(done).await,
            None => self.from(0).await,
        }
    }

    /// Polls until `shutdown` fires. Transient fetch failures are retried on
    /// the next tick; all other errors stop the loop. A shutdown mid-poll
    /// aborts the poll without advancing state.
    pub async fn run(
        &mut self,
        poll_interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), MonitorError> {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("shutdown requested");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("shutdown requested mid-poll; state not advanced");
                    return Ok(());
                }
                result = self.poll_once() => match result {
                    Ok(()) => {}
                    Err(err) if err.is_transient() => {
                        tracing::warn!(error = %err, "transient fetch failure; will retry");
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "monitor stopping");
                        return Err(err);
                    }
                },
            }
        }
    }
}
