// Copyright (c) 2026 The FWLog Authors
// SPDX-License-Identifier: Apache-2.0

//! fwlogctl: operator tooling for the firmware transparency channel.
//!
//! - `keygen` mints a named Ed25519 note keypair
//! - `verify-release` checks a signed release manifest offline
//! - `create-release` assembles and signs a release manifest
//! - `create-proofbundle` waits for a release to be sequenced and emits the
//!   proof bundle shipped next to the update

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use anyhow::{bail, Context as _};
use clap::{Parser, Subcommand};
use fwlog_core::note::{self, NoteSigner, NoteVerifier, VerifierList};
use fwlog_core::{FirmwareRelease, ProofBundle};
use fwlog_monitor::{FetchError, Fetcher, LogFetcher, LogStateTracker, MonitorError, ProofBuilder};
use fwlog_verifier::{leaf_hash, verify_inclusion, Hash32};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write as _;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use url::Url;

// Fallback when verify-release is run without --public_key.
const RELEASE_PUBKEY_ENV: &str = "FR_TEST_PUBKEY";

#[derive(Parser)]
#[command(name = "fwlogctl", about = "Firmware transparency operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a named Ed25519 keypair in note key-string form.
    Keygen {
        #[arg(long)]
        name: String,
    },
    /// Verify a signed release manifest offline and print its body.
    VerifyRelease {
        /// Path to the signed manifest.
        #[arg(long)]
        manifest: PathBuf,
        /// Path to the signer's public key; falls back to FR_TEST_PUBKEY.
        #[arg(long = "public_key")]
        public_key: Option<PathBuf>,
    },
    /// Assemble a release manifest and sign it to stdout.
    CreateRelease {
        /// GitHub repo (owner/name) where the release source lives.
        #[arg(long)]
        repo: String,
        #[arg(long)]
        description: String,
        #[arg(long = "platform_id")]
        platform_id: Option<String>,
        /// Git commit hash the release was built from.
        #[arg(long = "commit_hash")]
        commit_hash: String,
        #[arg(long = "tool_chain")]
        tool_chain: String,
        /// Space separated list of globs naming the release artifacts.
        #[arg(long)]
        artifacts: String,
        /// Git tag identifying the firmware revision.
        #[arg(long = "revision_tag")]
        revision_tag: String,
        #[arg(long = "private_key")]
        private_key: PathBuf,
    },
    /// Wait for a release to be integrated into the log and emit its proof
    /// bundle.
    CreateProofbundle {
        /// Path to the signed release manifest note.
        #[arg(long)]
        release: PathBuf,
        /// URL identifying the location of the log; must end with '/'.
        #[arg(long = "log_url")]
        log_url: String,
        #[arg(long = "log_pubkey_file")]
        log_pubkey_file: PathBuf,
        #[arg(long = "log_origin")]
        log_origin: String,
        /// Output path; stdout when unset.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Maximum seconds to wait for the release to appear in the log.
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Command::Keygen { name } => keygen(&name),
        Command::VerifyRelease {
            manifest,
            public_key,
        } => verify_release(&manifest, public_key.as_deref()),
        Command::CreateRelease {
            repo,
            description,
            platform_id,
            commit_hash,
            tool_chain,
            artifacts,
            revision_tag,
            private_key,
        } => {
            create_release(
                &repo,
                &description,
                platform_id.as_deref(),
                &commit_hash,
                &tool_chain,
                &artifacts,
                &revision_tag,
                &private_key,
            )
            .await
        }
        Command::CreateProofbundle {
            release,
            log_url,
            log_pubkey_file,
            log_origin,
            output,
            timeout,
        } => {
            create_proofbundle(
                &release,
                &log_url,
                &log_pubkey_file,
                &log_origin,
                output.as_deref(),
                timeout,
            )
            .await
        }
    }
}

fn keygen(name: &str) -> anyhow::Result<()> {
    let (private, public) = note::generate_key(name).context("failed to generate keypair")?;
    println!("{private}");
    println!("{public}");
    Ok(())
}

fn verify_release(manifest: &std::path::Path, public_key: Option<&std::path::Path>) -> anyhow::Result<()> {
    let pubkey = match public_key {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read public key file {}", path.display()))?,
        None => std::env::var(RELEASE_PUBKEY_ENV).with_context(|| {
            format!("--public_key unset and {RELEASE_PUBKEY_ENV} environment variable not found")
        })?,
    };
    let verifier =
        NoteVerifier::from_public_key(pubkey.trim()).context("failed to initialise key")?;

    let msg = std::fs::read(manifest)
        .with_context(|| format!("failed to read manifest file {}", manifest.display()))?;
    let release_note =
        note::open(&msg, &VerifierList::from(verifier)).context("failed to verify manifest")?;
    FirmwareRelease::from_note_text(&release_note.text)
        .context("firmware release manifest format error")?;

    print!("{}", release_note.text);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn create_release(
    repo: &str,
    description: &str,
    platform_id: Option<&str>,
    commit_hash: &str,
    tool_chain: &str,
    artifacts: &str,
    revision_tag: &str,
    private_key: &std::path::Path,
) -> anyhow::Result<()> {
    let source_url = format!("https://github.com/{repo}/tarball/{revision_tag}");
    let source_sha256 = hash_remote(&source_url)
        .await
        .with_context(|| format!("failed to hash source tarball {source_url}"))?;

    tracing::info!("hashing release artifacts");
    let artifact_sha256 = hash_artifacts(artifacts)?;
    if artifact_sha256.is_empty() {
        bail!("no artifacts matched {artifacts:?}");
    }

    let release = FirmwareRelease {
        description: description.to_string(),
        platform_id: platform_id
            .unwrap_or(fwlog_core::release::PLATFORM_ID_UNSET)
            .to_string(),
        revision: revision_tag.to_string(),
        artifact_sha256,
        source_url,
        source_sha256,
        tool_chain: tool_chain.to_string(),
        build_args: BTreeMap::from([("REV".to_string(), commit_hash.to_string())]),
    };

    let key = std::fs::read_to_string(private_key)
        .with_context(|| format!("failed to read private key file {}", private_key.display()))?;
    let signer = NoteSigner::from_private_key(key.trim()).context("failed to initialise key")?;
    let body = release.to_note_body()?;
    let signed = note::sign(&body, &signer)?;

    std::io::stdout().write_all(&signed)?;
    Ok(())
}

async fn hash_remote(url: &str) -> anyhow::Result<Vec<u8>> {
    let client = reqwest::Client::new();
    let mut request = client.get(url);
    // The token never lives in a bare String beyond the env read; it is
    // exposed only at the auth-header call site.
    let token = std::env::var("GITHUB_TOKEN")
        .ok()
        .filter(|token| !token.is_empty())
        .map(SecretString::from);
    if let Some(token) = &token {
        request = request.bearer_auth(token.expose_secret());
    }
    let response = request.send().await?;
    if !response.status().is_success() {
        bail!("got HTTP status {} fetching {url}", response.status());
    }
    let body = response.bytes().await?;
    Ok(Sha256::digest(&body).to_vec())
}

fn hash_artifacts(patterns: &str) -> anyhow::Result<BTreeMap<String, Vec<u8>>> {
    let mut hashes = BTreeMap::new();
    for pattern in patterns.split_whitespace() {
        for entry in glob::glob(pattern)
            .with_context(|| format!("bad artifact glob {pattern:?}"))?
        {
            let path = entry?;
            let data = std::fs::read(&path)
                .with_context(|| format!("failed to read artifact {}", path.display()))?;
            let name = path
                .file_name()
                .and_then(|name| name.to_str())
                .with_context(|| format!("artifact {} has no usable file name", path.display()))?;
            hashes.insert(name.to_string(), Sha256::digest(&data).to_vec());
        }
    }
    Ok(hashes)
}

async fn create_proofbundle(
    release: &std::path::Path,
    log_url: &str,
    log_pubkey_file: &std::path::Path,
    log_origin: &str,
    output: Option<&std::path::Path>,
    timeout: u64,
) -> anyhow::Result<()> {
    if !log_url.ends_with('/') {
        bail!("--log_url must end with a '/'");
    }
    if log_origin.is_empty() {
        bail!("--log_origin cannot be empty");
    }
    let root = Url::parse(log_url).with_context(|| format!("failed to parse log URL {log_url:?}"))?;
    let fetcher = LogFetcher::new(&root).context("failed to create fetcher")?;

    let pubkey = std::fs::read_to_string(log_pubkey_file).with_context(|| {
        format!(
            "unable to read log's public key from {}",
            log_pubkey_file.display()
        )
    })?;
    let verifiers = VerifierList::from(
        NoteVerifier::from_public_key(pubkey.trim())
            .context("unable to create log signature verifier")?,
    );

    let release_raw = std::fs::read(release)
        .with_context(|| format!("failed to read release file {}", release.display()))?;

    let mut tracker = LogStateTracker::new(fetcher, log_origin, verifiers, None)?;
    let bundle = tokio::time::timeout(
        Duration::from_secs(timeout),
        wait_for_bundle(&mut tracker, &release_raw),
    )
    .await
    .context("timed out waiting for release to be integrated into the log")??;

    let encoded = serde_json::to_vec_pretty(&bundle)?;
    match output {
        None => {
            let mut stdout = std::io::stdout();
            stdout.write_all(&encoded)?;
            stdout.write_all(b"\n")?;
        }
        Some(path) => {
            std::fs::write(path, &encoded)
                .with_context(|| format!("failed to write to output file {}", path.display()))?;
            tracing::info!(output = %path.display(), "wrote proof bundle");
        }
    }
    Ok(())
}

// Polls the log until the release is sequenced under a checkpoint, verifies
// its inclusion, and assembles the full-leaf-list bundle.
async fn wait_for_bundle<F: Fetcher>(
    tracker: &mut LogStateTracker<F>,
    release: &[u8],
) -> anyhow::Result<ProofBundle> {
    let release_hash = leaf_hash(release);
    let mut poll = tokio::time::interval(Duration::from_secs(5));
    loop {
        poll.tick().await;
        tracker.update().await?;
        let Some(checkpoint) = tracker.latest() else {
            continue;
        };

        let index = match tracker.client().leaf_index(&release_hash).await {
            Ok(index) => index,
            Err(MonitorError::Fetch(FetchError::NotFound { .. })) => {
                tracing::info!("leaf not yet sequenced, retrying");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        if index >= checkpoint.size {
            tracing::info!(index, "leaf sequenced but not yet covered by a checkpoint");
            continue;
        }

        let root = Hash32::try_from(checkpoint.root.as_slice())
            .map_err(|_| anyhow::anyhow!("checkpoint root is not a 32-byte digest"))?;
        let mut builder = ProofBuilder::new(tracker.client(), checkpoint.size);
        let proof = builder.inclusion_proof(index).await?;
        if !verify_inclusion(&release_hash, index, checkpoint.size, &proof, &root) {
            bail!("inclusion proof for leaf {index} did not verify");
        }
        tracing::info!(index, "found leaf");

        let leaf_hashes = tracker.client().leaf_hashes(checkpoint.size).await?;
        return Ok(ProofBundle {
            new_checkpoint: tracker.latest_raw().to_vec(),
            firmware_release: release.to_vec(),
            leaf_hashes,
        });
    }
}
