//! DKG message types

use crate::primitives::{Commitment, EncryptionKey, RingPedersenParams, VerifiableSS};
use crate::proofs::{CompositeDLogProof, DLogProof, PaillierKeyProof};
use k256::Scalar;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Round 1 broadcast: commitment to `y_i` plus this party's Paillier key and
/// ring-Pedersen parameters with their well-formedness proofs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyGenBroadcastMessage1 {
    /// Paillier encryption key
    pub e: EncryptionKey,
    /// `(N~, h1, h2)` used by peers' range proofs addressed to this party
    pub dlog_statement: RingPedersenParams,
    /// Commitment to `y_i = u_i * G`
    pub com: Commitment,
    pub correct_key_proof: PaillierKeyProof,
    /// `h2 = h1^xhi`
    pub composite_dlog_proof_base_h1: CompositeDLogProof,
    /// `h1 = h2^xhi_inv`
    pub composite_dlog_proof_base_h2: CompositeDLogProof,
}

/// Round 2 broadcast is the [`crate::primitives::Decommitment`] of `y_i`.
pub type KeyGenDecommitMessage1 = crate::primitives::Decommitment;

/// Round 3 broadcast: Feldman commitments of this party's polynomial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VssMessage {
    pub vss_scheme: VerifiableSS,
}

/// Round 3 direct message: the recipient's share of `u_i`
#[derive(Debug, Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SecretShareMessage {
    #[serde(with = "crate::serde_utils::scalar")]
    pub share: Scalar,
}

/// Round 4 broadcast: proof of knowledge of `x_i`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DLogProofMessage {
    pub dlog_proof: DLogProof,
}
