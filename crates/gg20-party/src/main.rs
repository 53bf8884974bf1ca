//! GG20 Party CLI
//!
//! Runs every party of a session in one process over an in-memory relay:
//! - Distributed Key Generation (DKG)
//! - Distributed Signature Generation (DSG)
//! - Key tweaks and non-hardened BIP32 derivation
//! - Secret reconstruction for recovery drills

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use gg20_core::mpc::MemoryRelay;
use gg20_core::primitives::curve;
use gg20_core::tweak::{derive_tweak, tweak_local_key, ChainCode};
use gg20_core::types::encode_public_key;
use gg20_core::{keygen, sign, KeygenConfig, LocalKey, PartyIndex, SessionConfig, Signature};
use k256::{ProjectivePoint, Scalar};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};

const CHAIN_CODE_FILE: &str = "chain-code";

/// GG20 Party - threshold ECDSA driver
#[derive(Parser)]
#[command(name = "gg20-party")]
#[command(about = "GG20 threshold ECDSA key generation and signing")]
#[command(version)]
struct Cli {
    /// Directory holding keyshare.{i}.json and the chain code
    #[arg(short, long, env = "KEY_DIR", default_value = "./data")]
    dest: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run distributed key generation for parties 1..=n
    Keygen {
        /// Number of parties
        #[arg(short, long, env = "SHARE_COUNT")]
        n: u16,

        /// Threshold: any t + 1 parties can sign
        #[arg(short, long, env = "THRESHOLD")]
        t: u16,

        /// Paillier and ring-Pedersen modulus size
        #[arg(long, default_value_t = 2048)]
        paillier_bits: usize,

        /// Generate safe primes (slow)
        #[arg(long)]
        safe_primes: bool,
    },

    /// Sign a message with t + 1 parties
    Sign {
        /// Message to sign; its SHA-256 digest is signed
        #[arg(short, long, conflicts_with = "digest")]
        message: Option<String>,

        /// Hex-encoded 32-byte digest to sign
        #[arg(long)]
        digest: Option<String>,

        /// Signing parties (comma-separated)
        #[arg(short, long, env = "PARTIES", value_delimiter = ',')]
        parties: Vec<PartyIndex>,

        /// Sign with the key derived along this path (e.g. m/0/1)
        #[arg(long)]
        path: Option<String>,
    },

    /// Reconstruct the signing key from t + 1 shares
    Reconstruct {
        /// Parties whose shares are combined (comma-separated)
        #[arg(short, long, env = "PARTIES", value_delimiter = ',')]
        parties: Vec<PartyIndex>,
    },

    /// Add a public scalar to every key share
    Tweak {
        /// Hex-encoded 32-byte scalar
        #[arg(long)]
        delta: String,

        /// Output directory for the tweaked key files
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Derive a child public key
    Derive {
        /// BIP32 derivation path (e.g., m/0/1/42)
        #[arg(short, long)]
        path: String,
    },

    /// Show key share info
    Info {
        /// Party whose key file is shown
        #[arg(short, long, default_value_t = 1)]
        party: PartyIndex,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen {
            n,
            t,
            paillier_bits,
            safe_primes,
        } => {
            let config = KeygenConfig {
                paillier_bits,
                use_safe_prime: safe_primes,
            };
            run_keygen(&cli.dest, n, t, config).await?;
        }
        Commands::Sign {
            ref message,
            ref digest,
            ref parties,
            ref path,
        } => {
            let digest = message_digest(message.as_deref(), digest.as_deref())?;
            run_sign(&cli.dest, &digest, parties, path.as_deref()).await?;
        }
        Commands::Reconstruct { ref parties } => {
            run_reconstruct(&cli.dest, parties)?;
        }
        Commands::Tweak { ref delta, ref out } => {
            run_tweak(&cli.dest, delta, out)?;
        }
        Commands::Derive { ref path } => {
            run_derive(&cli.dest, path)?;
        }
        Commands::Info { party } => {
            show_info(&cli.dest, party)?;
        }
    }

    Ok(())
}

async fn run_keygen(dest: &Path, n: u16, t: u16, keygen_config: KeygenConfig) -> Result<()> {
    info!(n_parties = n, threshold = t, "Starting DKG");
    std::fs::create_dir_all(dest)?;

    let relay = Arc::new(MemoryRelay::new());
    let session_id: [u8; 32] = rand::random();
    let mut handles = Vec::new();
    for i in 1..=n {
        let config = SessionConfig::keygen(session_id, t, n, i)?;
        let relay = relay.clone();
        handles.push(tokio::spawn(async move {
            keygen::run_dkg(&config, &keygen_config, relay.as_ref()).await
        }));
    }

    let mut keys = Vec::new();
    for handle in handles {
        keys.push(handle.await??);
    }
    for key in &keys {
        save_key(dest, key)?;
    }

    let chain_code: ChainCode = rand::random();
    std::fs::write(dest.join(CHAIN_CODE_FILE), hex::encode(chain_code))?;

    let public_key = keys
        .first()
        .ok_or_else(|| anyhow!("DKG produced no keys"))?
        .public_key_bytes()?;
    info!(path = ?dest, "DKG completed, key shares saved");
    println!("Public Key: {}", hex::encode(public_key));

    Ok(())
}

fn message_digest(message: Option<&str>, digest: Option<&str>) -> Result<[u8; 32]> {
    match (message, digest) {
        (Some(message), None) => Ok(Sha256::digest(message.as_bytes()).into()),
        (None, Some(digest)) => hex::decode(digest)?
            .try_into()
            .map_err(|_| anyhow!("Digest must be 32 bytes")),
        _ => bail!("Pass exactly one of --message or --digest"),
    }
}

async fn run_sign(
    dest: &Path,
    digest: &[u8; 32],
    parties: &[PartyIndex],
    path: Option<&str>,
) -> Result<()> {
    let mut keys = parties
        .iter()
        .map(|&i| load_key(dest, i))
        .collect::<Result<Vec<_>>>()?;

    if let Some(path) = path {
        let first = keys.first().ok_or_else(|| anyhow!("No signing parties"))?;
        let derived = derive_tweak(&first.public_key(), &load_chain_code(dest)?, path)?;
        info!(path, "Signing with derived key");
        keys = keys
            .iter()
            .map(|key| tweak_local_key(key, &derived.delta))
            .collect();
    }

    info!(
        participants = ?parties,
        digest = hex::encode(digest),
        "Starting DSG"
    );

    let relay = Arc::new(MemoryRelay::new());
    let session_id: [u8; 32] = rand::random();
    let mut handles = Vec::new();
    for key in keys {
        let config = SessionConfig::signing(session_id, key.params(), key.i, parties)?;
        let relay = relay.clone();
        let digest = *digest;
        handles.push(tokio::spawn(async move {
            let signature = sign::run_dsg(&config, &key, &digest, relay.as_ref()).await?;
            Ok::<_, gg20_core::Error>((signature, key.public_key()))
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await??);
    }
    let (signature, public_key) = results
        .first()
        .ok_or_else(|| anyhow!("No signing parties"))?;
    if results.iter().any(|(s, _)| s != signature) {
        bail!("Parties disagree on the signature");
    }
    signature.verify(public_key, digest)?;

    print_signature(signature, public_key)?;
    Ok(())
}

fn print_signature(signature: &Signature, public_key: &ProjectivePoint) -> Result<()> {
    info!(
        r = hex::encode(signature.r),
        s = hex::encode(signature.s),
        recovery_id = signature.recovery_id,
        "Signature generated"
    );

    println!("Signature:");
    println!("  r: {}", hex::encode(signature.r));
    println!("  s: {}", hex::encode(signature.s));
    println!("  v: {}", signature.recovery_id);
    println!("  DER: {}", hex::encode(signature.to_der()?));
    println!("Public Key: {}", hex::encode(encode_public_key(public_key)?));
    Ok(())
}

fn run_reconstruct(dest: &Path, parties: &[PartyIndex]) -> Result<()> {
    let keys = parties
        .iter()
        .map(|&i| load_key(dest, i))
        .collect::<Result<Vec<_>>>()?;
    let first = keys.first().ok_or_else(|| anyhow!("No parties given"))?;
    let shares: Vec<Scalar> = keys.iter().map(|k| k.keys_linear.x_i).collect();

    let secret = first.vss_scheme.reconstruct(parties, &shares)?;
    if ProjectivePoint::GENERATOR * secret != first.public_key() {
        bail!("Reconstructed secret does not match the public key");
    }

    warn!("Printing the reconstructed signing key");
    println!("Secret Key: {}", hex::encode(secret.to_bytes()));
    println!("Public Key: {}", hex::encode(first.public_key_bytes()?));
    Ok(())
}

fn run_tweak(dest: &Path, delta: &str, out: &Path) -> Result<()> {
    let delta = curve::scalar_from_bytes(&hex::decode(delta)?)?;
    std::fs::create_dir_all(out)?;

    let mut public_key = None;
    for key in load_all_keys(dest)? {
        let tweaked = tweak_local_key(&key, &delta);
        save_key(out, &tweaked)?;
        public_key = Some(tweaked.public_key_bytes()?);
    }
    if let Ok(chain_code) = std::fs::read(dest.join(CHAIN_CODE_FILE)) {
        std::fs::write(out.join(CHAIN_CODE_FILE), chain_code)?;
    }

    let public_key = public_key.ok_or_else(|| anyhow!("No key files in {:?}", dest))?;
    info!(path = ?out, "Tweaked key shares saved");
    println!("Tweaked Public Key: {}", hex::encode(public_key));
    Ok(())
}

fn run_derive(dest: &Path, path: &str) -> Result<()> {
    let key = load_key(dest, 1)?;
    let derived = derive_tweak(&key.public_key(), &load_chain_code(dest)?, path)?;

    info!(path, "Derived child key");
    println!("Derived Public Key: {}", hex::encode(encode_public_key(&derived.public_key)?));
    println!("Chain Code: {}", hex::encode(derived.chain_code));
    println!("Tweak: {}", hex::encode(derived.delta.to_bytes()));
    Ok(())
}

fn show_info(dest: &Path, party: PartyIndex) -> Result<()> {
    let key = load_key(dest, party)?;
    key.validate()?;

    println!("Key Share Info:");
    println!("  Party: {}", key.i);
    println!("  Parties: {}", key.n);
    println!("  Threshold: {} (any {} can sign)", key.t, key.t + 1);
    println!("  Public Key: {}", hex::encode(key.public_key_bytes()?));
    println!(
        "  Paillier Modulus: {} bits",
        key.paillier_dk.encryption_key().n.bit_length()
    );
    if let Ok(chain_code) = load_chain_code(dest) {
        println!("  Chain Code: {}", hex::encode(chain_code));
    }
    Ok(())
}

fn key_path(dir: &Path, index: PartyIndex) -> PathBuf {
    dir.join(format!("keyshare.{}.json", index))
}

fn save_key(dir: &Path, key: &LocalKey) -> Result<()> {
    let json = serde_json::to_string_pretty(key)?;
    std::fs::write(key_path(dir, key.i), json)?;
    Ok(())
}

fn load_key(dir: &Path, index: PartyIndex) -> Result<LocalKey> {
    let path = key_path(dir, index);
    let json = std::fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
    let key: LocalKey = serde_json::from_str(&json)?;
    if key.i != index {
        bail!("{:?} holds the key of party {}", path, key.i);
    }
    Ok(key)
}

fn load_all_keys(dir: &Path) -> Result<Vec<LocalKey>> {
    let first = load_key(dir, 1)?;
    let mut keys = vec![first];
    for i in 2..=keys[0].n {
        keys.push(load_key(dir, i)?);
    }
    Ok(keys)
}

fn load_chain_code(dir: &Path) -> Result<ChainCode> {
    let path = dir.join(CHAIN_CODE_FILE);
    let encoded = std::fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
    hex::decode(encoded.trim())?
        .try_into()
        .map_err(|_| anyhow!("Chain code must be 32 bytes"))
}
