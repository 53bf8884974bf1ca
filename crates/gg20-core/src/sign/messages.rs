//! Signing message types
//!
//! Rounds 1 and 3 through 7 are broadcasts; round 2 is point-to-point.

use crate::mta::{MessageA, MessageB};
use crate::primitives::{Commitment, Decommitment};
use crate::proofs::{HomoElGamalProof, PdlWithSlackProof, PedersenProof};
use crate::types::PartyIndex;
use k256::{ProjectivePoint, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Round 1: commitment to `Gamma_i` and the MtA first message for `k_i`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRound1Message {
    pub index: PartyIndex,
    pub bc1: Commitment,
    pub m_a: MessageA,
}

/// Round 2: MtA answers for `k_to * gamma_from` and `k_to * w_from`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRound2Message {
    pub from: PartyIndex,
    pub to: PartyIndex,
    pub m_b_gamma: MessageB,
    pub m_b_w: MessageB,
}

/// Round 3: `delta_i` and the Pedersen commitment `T_i` to `sigma_i`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRound3Message {
    pub index: PartyIndex,
    #[serde(with = "crate::serde_utils::scalar")]
    pub delta_i: Scalar,
    #[serde(with = "crate::serde_utils::point")]
    pub t_i: ProjectivePoint,
    pub t_i_proof: PedersenProof,
}

/// Round 4: opening of the round 1 commitment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRound4Message {
    pub index: PartyIndex,
    pub decom1: Decommitment,
}

/// Round 5: `R_dash_i = k_i * R` with one PDL-with-slack proof per verifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRound5Message {
    pub index: PartyIndex,
    #[serde(with = "crate::serde_utils::point")]
    pub r_dash: ProjectivePoint,
    pub phase5_proofs: BTreeMap<PartyIndex, PdlWithSlackProof>,
}

/// Round 6: `S_i = sigma_i * R` with its consistency proof against `T_i`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignRound6Message {
    pub index: PartyIndex,
    #[serde(with = "crate::serde_utils::point")]
    pub s_i: ProjectivePoint,
    pub homo_elgamal_proof: HomoElGamalProof,
}

/// Online round: one party's share of `s`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialSignature {
    pub index: PartyIndex,
    #[serde(with = "crate::serde_utils::scalar")]
    pub s_i: Scalar,
}
