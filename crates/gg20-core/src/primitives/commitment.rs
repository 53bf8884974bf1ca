//! Hash commitments to curve points.
//!
//! The commitment is broadcast first; the decommitment (point and blinding
//! factor) is revealed in a later round and checked against it.

use k256::ProjectivePoint;
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::curve;

/// `SHA-256(tag || point || blind_factor)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    #[serde(with = "hex_bytes")]
    pub value: [u8; 32],
}

/// Opening of a [`Commitment`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decommitment {
    #[serde(with = "hex_bytes")]
    pub blind_factor: [u8; 32],
    #[serde(with = "crate::serde_utils::point")]
    pub point: ProjectivePoint,
}

impl Decommitment {
    /// Commit to `point` with a fresh 256-bit blinding factor
    pub fn commit(point: &ProjectivePoint) -> (Commitment, Decommitment) {
        let mut blind_factor = [0u8; 32];
        OsRng.fill_bytes(&mut blind_factor);
        let decommitment = Decommitment {
            blind_factor,
            point: *point,
        };
        (decommitment.commitment(), decommitment)
    }

    /// Recompute the commitment this opening corresponds to
    pub fn commitment(&self) -> Commitment {
        let digest = Sha256::new()
            .chain_update(b"gg20-core/commitment")
            .chain_update(curve::point_to_bytes(&self.point))
            .chain_update(self.blind_factor)
            .finalize();
        Commitment {
            value: digest.into(),
        }
    }

    /// Whether this opening binds to `commitment`
    pub fn verify(&self, commitment: &Commitment) -> bool {
        &self.commitment() == commitment
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s)
            .map_err(serde::de::Error::custom)?
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid length"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::{elliptic_curve::Field, Scalar};

    #[test]
    fn test_commit_and_open() {
        let point = ProjectivePoint::GENERATOR * Scalar::random(&mut OsRng);
        let (com, decom) = Decommitment::commit(&point);
        assert!(decom.verify(&com));
    }

    #[test]
    fn test_tampered_opening_is_rejected() {
        let point = ProjectivePoint::GENERATOR * Scalar::random(&mut OsRng);
        let (com, decom) = Decommitment::commit(&point);

        let mut other_point = decom.clone();
        other_point.point += ProjectivePoint::GENERATOR;
        assert!(!other_point.verify(&com));

        let mut other_blind = decom.clone();
        other_blind.blind_factor[0] ^= 1;
        assert!(!other_blind.verify(&com));

        let mut flipped = com;
        flipped.value[31] ^= 0x80;
        assert!(!decom.verify(&flipped));
    }
}
