//! # GG20 Core
//!
//! Core protocol engine for (t+1)-of-n threshold ECDSA over secp256k1,
//! following Gennaro–Goldfeder (GG18/GG20).
//!
//! This crate provides:
//! - Distributed Key Generation (DKG) with Feldman VSS
//! - Distributed Signature Generation (DSG), split into an offline phase
//!   and a single online round
//! - Additive key tweaks and non-hardened BIP32 derivation
//!
//! ## Protocol Overview
//!
//! Signing turns the multiplicative shares of `k * gamma` and `k * x` into
//! additive ones with Paillier-based MtA, and every message carries a
//! zero-knowledge proof so a misbehaving party is named when the session
//! aborts. No single party ever holds the signing key.
//!
//! ## Example
//!
//! ```rust,ignore
//! use gg20_core::{keygen, sign, SessionConfig};
//!
//! // Run distributed key generation
//! let local_key = keygen::run_dkg(&config, &KeygenConfig::default(), &relay).await?;
//!
//! // Sign a digest with t + 1 parties
//! let signature = sign::run_dsg(&signing_config, &local_key, &digest, &relay).await?;
//! ```

pub mod error;
pub mod keygen;
pub mod mpc;
pub mod mta;
pub mod primitives;
pub mod proofs;
pub mod serde_utils;
pub mod sign;
pub mod tweak;
pub mod types;

#[cfg(test)]
mod test_utils;

pub use error::{Error, Result, Stage};
pub use keygen::{KeygenConfig, LocalKey};
pub use proofs::ProofKind;
pub use sign::{CompletedOfflineStage, SigningSession};
pub use types::{Parameters, PartyIndex, PublicKey, SessionConfig, SessionId, Signature};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
