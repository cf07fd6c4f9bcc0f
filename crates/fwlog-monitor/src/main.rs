// Copyright (c) 2026 The FWLog Authors
// SPDX-License-Identifier: Apache-2.0

//! Long-running firmware-transparency monitor.
//!
//! Follows a log for new checkpoints, verifies consistency and per-leaf
//! inclusion, and reports each discovered release. Exits non-zero only on
//! fatal errors (bad signature, forked or rewound log, handler failure).

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use anyhow::Context as _;
use async_trait::async_trait;
use clap::Parser;
use fwlog_core::note::{NoteVerifier, VerifierList};
use fwlog_core::FirmwareRelease;
use fwlog_monitor::{state, LogFetcher, LogStateTracker, Monitor, ReleaseHandler};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Debug, Parser)]
#[command(name = "fwlog-monitor")]
#[command(about = "Continually follow a firmware transparency log, verifying every new release")]
struct Args {
    /// URL identifying the location of the log; must end with '/'.
    #[arg(long = "log_url")]
    log_url: String,

    /// The log's public key.
    #[arg(long = "log_pubkey")]
    log_pubkey: String,

    /// Expected first line of checkpoints issued by the log.
    #[arg(long = "log_origin")]
    log_origin: String,

    /// The release signer's public key.
    #[arg(long = "release_pubkey")]
    release_pubkey: String,

    /// Where the latest consistent checkpoint is persisted.
    #[arg(long = "state_file")]
    state_file: PathBuf,

    /// Seconds between polls of the log.
    #[arg(long = "poll_interval", default_value_t = 60)]
    poll_interval: u64,

    #[arg(long, default_value = "info")]
    log: String,
}

// Reference handler: report the release. Reproducible-build verification
// hangs off this same seam in the build-verifier deployment.
struct LoggingHandler;

#[async_trait]
impl ReleaseHandler for LoggingHandler {
    async fn handle(&mut self, index: u64, release: FirmwareRelease) -> anyhow::Result<()> {
        tracing::info!(
            index,
            revision = %release.revision,
            platform_id = %release.platform_id,
            source_url = %release.source_url,
            "release discovered"
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(args.log.clone()))
        .init();

    if !args.log_url.ends_with('/') {
        anyhow::bail!("--log_url must end with a '/'");
    }
    if args.poll_interval == 0 {
        anyhow::bail!("--poll_interval must be at least 1 second");
    }
    let root = Url::parse(&args.log_url)
        .with_context(|| format!("failed to parse log URL {:?}", args.log_url))?;
    let fetcher = LogFetcher::new(&root).context("failed to create fetcher")?;

    let log_verifiers = VerifierList::from(
        NoteVerifier::from_public_key(args.log_pubkey.trim())
            .context("invalid --log_pubkey")?,
    );
    let release_verifiers = VerifierList::from(
        NoteVerifier::from_public_key(args.release_pubkey.trim())
            .context("invalid --release_pubkey")?,
    );

    let prior = state::read(&args.state_file)?;
    if prior.is_none() {
        tracing::info!(
            state_file = %args.state_file.display(),
            "state file missing; will trust first checkpoint received from log"
        );
    }
    let tracker = LogStateTracker::new(
        fetcher,
        &args.log_origin,
        log_verifiers,
        prior.as_deref(),
    )
    .context("failed to restore monitor state")?;

    let mut monitor = Monitor::new(tracker, args.state_file, release_verifiers, LoggingHandler);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    monitor
        .run(Duration::from_secs(args.poll_interval), shutdown_rx)
        .await?;
    Ok(())
}
