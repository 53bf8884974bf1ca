//! Zero-knowledge proofs used by DKG and signing.
//!
//! Every proof is non-interactive (Fiat-Shamir over a merlin transcript) and
//! implements [`ZkProof`] for the statement it is checked against.

pub mod composite_dlog;
pub mod dlog;
pub mod homo_elgamal;
pub mod paillier_key;
pub mod pdl_slack;
pub mod pedersen;
pub mod range;

pub use composite_dlog::{CompositeDLogProof, CompositeDLogStatement};
pub use dlog::DLogProof;
pub use homo_elgamal::{HomoElGamalProof, HomoElGamalStatement};
pub use paillier_key::PaillierKeyProof;
pub use pdl_slack::{PdlWithSlackProof, PdlWithSlackStatement};
pub use pedersen::PedersenProof;
pub use range::{AliceProof, AliceStatement, BobProof, BobStatement};

use std::fmt;
use thiserror::Error;

/// Closed set of proof systems in the protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProofKind {
    /// Knowledge of a discrete log (Schnorr)
    Schnorr,
    /// Opening of `T = sigma * G + l * H`
    Pedersen,
    /// Consistency of `S_i = sigma_i * R` with `T_i`
    HomoElGamal,
    /// Paillier plaintext of the MtA initiator is below q^3
    AliceRange,
    /// MtA responder's affine operation is well formed
    BobRange,
    /// Phase-5 `R_dash = k_i * R` matches the encrypted `k_i`
    PdlWithSlack,
    /// Paillier modulus is square-free and coprime to its totient
    PaillierKey,
    /// Knowledge of the discrete log between `h1` and `h2`
    CompositeDLog,
}

impl fmt::Display for ProofKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProofKind::Schnorr => "Schnorr",
            ProofKind::Pedersen => "Pedersen",
            ProofKind::HomoElGamal => "homomorphic ElGamal",
            ProofKind::AliceRange => "Alice range",
            ProofKind::BobRange => "Bob range",
            ProofKind::PdlWithSlack => "PDL-with-slack",
            ProofKind::PaillierKey => "Paillier key",
            ProofKind::CompositeDLog => "composite DLog",
        };
        f.write_str(name)
    }
}

/// A proof failed to verify
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} proof rejected: {reason}")]
pub struct ProofError {
    pub kind: ProofKind,
    pub reason: &'static str,
}

impl ProofError {
    pub fn new(kind: ProofKind, reason: &'static str) -> Self {
        Self { kind, reason }
    }
}

/// A proof verifiable against a statement of type `S`
pub trait ZkProof<S: ?Sized> {
    /// Which proof system this is
    const KIND: ProofKind;

    /// Check the proof
    fn verify(&self, statement: &S) -> Result<(), ProofError>;

    /// Shorthand for a rejection of this proof kind
    fn reject(reason: &'static str) -> ProofError {
        ProofError::new(Self::KIND, reason)
    }
}
