//! Quorum Party CLI
//!
//! Command-line interface for operating a threshold signing group:
//! - Trusted-dealer key generation
//! - Membership and threshold changes with resharing
//! - Threshold signing and verification of authorization requests

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use quorum_core::encoding::{self, AuthorizationRecord, AuthorizationRequest};
use quorum_core::mpc::MemoryRelay;
use quorum_core::sign::{self, Coordinator, Signer};
use quorum_core::{verify, GroupConfig, GroupState, KeyManager, ParticipantId, Signature};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, Level};

const STATE_FILE: &str = "group.json";

/// Quorum Party - threshold Schnorr group operator
#[derive(Parser)]
#[command(name = "quorum-party")]
#[command(about = "Threshold Schnorr key management and signing")]
#[command(version)]
struct Cli {
    /// Data directory for the group state
    #[arg(short, long, env = "QUORUM_DEST", default_value = "./data")]
    dest: PathBuf,

    /// Collection window per signing round, in milliseconds
    #[arg(long, env = "QUORUM_ROUND_TIMEOUT_MS", default_value_t = sign::DEFAULT_ROUND_TIMEOUT.as_millis() as u64)]
    round_timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deal a new group key
    Keygen {
        /// Threshold (t-of-n)
        #[arg(short, long)]
        threshold: usize,

        /// Participant ids (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        participants: Vec<String>,
    },

    /// Add a participant and reshare
    Add { participant: String },

    /// Remove a participant and reshare
    Remove { participant: String },

    /// Change the threshold and reshare
    SetThreshold { threshold: usize },

    /// Re-randomize all shares, keeping the group key
    Refresh,

    /// Sign a message with a subset of participants
    Sign {
        /// Message text; it is hashed with Keccak-256 before signing
        #[arg(short, long)]
        message: String,

        /// Signing participant ids (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        signers: Vec<String>,
    },

    /// Sign an authorization request and print the resulting record
    Authorize {
        #[arg(long)]
        request_id: String,
        #[arg(long)]
        principal: String,
        #[arg(long)]
        resource: String,
        #[arg(long)]
        action: String,

        /// Signing participant ids (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        signers: Vec<String>,
    },

    /// Verify a signature over a message
    Verify {
        /// Message text
        #[arg(short, long)]
        message: String,

        /// Hex-encoded 96-byte signature
        #[arg(short, long)]
        signature: String,

        /// Hex-encoded 64-byte public key; defaults to the stored group key
        #[arg(short, long)]
        public_key: Option<String>,
    },

    /// Show group info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.dest)?;
    let window = Duration::from_millis(cli.round_timeout_ms);

    match cli.command {
        Commands::Keygen {
            threshold,
            ref participants,
        } => run_keygen(&cli.dest, threshold, participants).await?,
        Commands::Add { ref participant } => {
            let manager = load_manager(&cli.dest)?;
            manager.add(participant.as_str()).await?;
            save_manager(&cli.dest, &manager).await?;
        }
        Commands::Remove { ref participant } => {
            let manager = load_manager(&cli.dest)?;
            manager.remove(participant.as_str()).await?;
            save_manager(&cli.dest, &manager).await?;
        }
        Commands::SetThreshold { threshold } => {
            let manager = load_manager(&cli.dest)?;
            manager.set_threshold(threshold).await?;
            save_manager(&cli.dest, &manager).await?;
        }
        Commands::Refresh => {
            let manager = load_manager(&cli.dest)?;
            manager.refresh().await?;
            save_manager(&cli.dest, &manager).await?;
        }
        Commands::Sign {
            ref message,
            ref signers,
        } => {
            let manager = load_manager(&cli.dest)?;
            let hash = encoding::hash_message(message.as_bytes());
            let signature = run_sign(&manager, signers, hash, window).await?;
            println!("Message Hash: {}", hex::encode(hash));
            println!("Signature: {}", hex::encode(signature.to_bytes()));
        }
        Commands::Authorize {
            ref request_id,
            ref principal,
            ref resource,
            ref action,
            ref signers,
        } => {
            let manager = load_manager(&cli.dest)?;
            let request = AuthorizationRequest::new(
                request_id.as_str(),
                principal.as_str(),
                resource.as_str(),
                action.as_str(),
            );
            let signature = run_sign(&manager, signers, request.message_hash()?, window).await?;
            let record = AuthorizationRecord::evaluate(request, signature, &manager.group_key().await);
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Verify {
            ref message,
            ref signature,
            ref public_key,
        } => run_verify(&cli.dest, message, signature, public_key.as_deref()).await?,
        Commands::Info => show_info(&cli.dest).await?,
    }

    Ok(())
}

async fn run_keygen(dest: &Path, threshold: usize, participants: &[String]) -> Result<()> {
    if dest.join(STATE_FILE).exists() {
        bail!("{} already holds a group; refusing to overwrite", dest.display());
    }

    let ids = participants.iter().map(|p| ParticipantId::new(p.trim())).collect();
    let manager = KeyManager::generate(GroupConfig::new(threshold, ids)?)?;
    save_manager(dest, &manager).await?;

    let group_key = manager.group_key().await;
    info!(%group_key, threshold, n_participants = participants.len(), "Group created");
    println!("Group Public Key: {group_key}");
    Ok(())
}

async fn run_sign(
    manager: &KeyManager,
    signer_ids: &[String],
    message_hash: [u8; 32],
    window: Duration,
) -> Result<Signature> {
    let mut signers = Vec::with_capacity(signer_ids.len());
    for id in signer_ids {
        let share = manager.share(&ParticipantId::new(id.trim())).await?;
        signers.push(Signer::new(share));
    }
    let signer_refs: Vec<&Signer> = signers.iter().collect();

    let relay = MemoryRelay::new();
    let coordinator = Coordinator::new();
    let signature =
        sign::run_signing(manager, &coordinator, &signer_refs, message_hash, &relay, window).await?;

    info!(signers = ?signer_ids, "Signature generated");
    Ok(signature)
}

async fn run_verify(dest: &Path, message: &str, signature: &str, public_key: Option<&str>) -> Result<()> {
    let public_key = match public_key {
        Some(encoded) => hex::decode(encoded).context("public key is not hex")?,
        None => load_manager(dest)?.group_key().await.as_bytes().to_vec(),
    };
    let signature = hex::decode(signature).context("signature is not hex")?;
    let hash = encoding::hash_message(message.as_bytes());

    let valid = verify::check(&hash, &signature, &public_key)?;
    println!("Valid: {valid}");
    if !valid {
        bail!("signature does not verify");
    }
    Ok(())
}

async fn show_info(dest: &Path) -> Result<()> {
    let snapshot = load_manager(dest)?.snapshot().await;

    println!("Group Info:");
    println!("  Epoch: {}", snapshot.epoch);
    println!("  Threshold: {}", snapshot.threshold);
    println!("  Participants: {}", snapshot.participants.len());
    println!("  Group Public Key: {}", snapshot.group_key);
    for participant in &snapshot.participants {
        println!(
            "    [{}] {}: {}",
            participant.index, participant.id, participant.public_share
        );
    }
    Ok(())
}

fn load_manager(dest: &Path) -> Result<KeyManager> {
    let path = dest.join(STATE_FILE);
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("no group state at {}", path.display()))?;
    let state: GroupState = serde_json::from_str(&json)?;
    Ok(KeyManager::from_state(state)?)
}

async fn save_manager(dest: &Path, manager: &KeyManager) -> Result<()> {
    let state = manager.export().await;
    let path = dest.join(STATE_FILE);
    std::fs::write(&path, serde_json::to_string_pretty(&state)?)?;

    let (threshold, total) = state.lifecycle.get_config();
    info!(
        epoch = %state.lifecycle.epoch(),
        threshold,
        total,
        path = ?path,
        "Group state saved"
    );
    Ok(())
}
