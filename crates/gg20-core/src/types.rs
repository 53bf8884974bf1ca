//! Core types for the GG20 protocol

use crate::primitives::curve;
use crate::{Error, Result};
use k256::{
    ecdsa::{self, signature::hazmat::PrehashVerifier, RecoveryId, VerifyingKey},
    ProjectivePoint,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 1-based identifier of a party, stable across DKG and every signing with the key
pub type PartyIndex = u16;

/// Unique identifier for a session
pub type SessionId = [u8; 32];

/// Compressed public key bytes
pub type PublicKey = [u8; 33];

/// Threshold parameters: any `threshold + 1` of `share_count` parties can sign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    /// t: minimum number of co-signers minus one
    pub threshold: u16,
    /// n: number of shares issued at DKG
    pub share_count: u16,
}

impl Parameters {
    /// Create validated parameters
    pub fn new(threshold: u16, share_count: u16) -> Result<Self> {
        let params = Self {
            threshold,
            share_count,
        };
        params.validate()?;
        Ok(params)
    }

    /// Check `1 <= t < n`
    pub fn validate(&self) -> Result<()> {
        if self.share_count < 2 {
            return Err(Error::InvalidConfig(
                "At least two parties are required".into(),
            ));
        }
        if self.threshold == 0 {
            // a constant sharing polynomial gives every party the whole key
            return Err(Error::InvalidConfig("Threshold must be at least 1".into()));
        }
        if self.threshold >= self.share_count {
            return Err(Error::InvalidConfig(format!(
                "Threshold {} must be lower than share count {}",
                self.threshold, self.share_count
            )));
        }
        Ok(())
    }

    /// Number of parties a signing session needs
    pub fn signers_required(&self) -> usize {
        usize::from(self.threshold) + 1
    }

    /// Validate a party index against `1..=n`
    pub fn check_index(&self, index: PartyIndex) -> Result<()> {
        if index == 0 || index > self.share_count {
            return Err(Error::InvalidPartyIndex(index));
        }
        Ok(())
    }

    /// Validate a signing set: exactly `t + 1` distinct indices in `1..=n`.
    /// Returns the set sorted.
    pub fn check_signers(&self, signers: &[PartyIndex]) -> Result<Vec<PartyIndex>> {
        let mut seen = BTreeSet::new();
        for &index in signers {
            self.check_index(index)?;
            if !seen.insert(index) {
                return Err(Error::DuplicateParty(index));
            }
        }
        if seen.len() != self.signers_required() {
            return Err(Error::ThresholdNotMet {
                required: self.signers_required(),
                actual: seen.len(),
            });
        }
        Ok(seen.into_iter().collect())
    }
}

/// ECDSA signature (r, s) with recovery id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// R component
    #[serde(with = "hex_array")]
    pub r: [u8; 32],
    /// S component (low-s)
    #[serde(with = "hex_array")]
    pub s: [u8; 32],
    /// Recovery ID (0..=3)
    pub recovery_id: u8,
}

impl Signature {
    /// Create a new signature
    pub fn new(r: [u8; 32], s: [u8; 32], recovery_id: u8) -> Self {
        Self { r, s, recovery_id }
    }

    fn to_ecdsa(&self) -> Result<ecdsa::Signature> {
        ecdsa::Signature::from_scalars(
            *k256::FieldBytes::from_slice(&self.r),
            *k256::FieldBytes::from_slice(&self.s),
        )
        .map_err(|_| Error::InvalidSignature)
    }

    /// Convert to DER format
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(self.to_ecdsa()?.to_der().as_bytes().to_vec())
    }

    /// Convert to bytes (r || s)
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.r);
        bytes[32..].copy_from_slice(&self.s);
        bytes
    }

    /// Standard ECDSA verification of a 32-byte digest
    pub fn verify(&self, public_key: &ProjectivePoint, digest: &[u8; 32]) -> Result<()> {
        let verifying_key = VerifyingKey::from_affine(public_key.to_affine())
            .map_err(|e| Error::Arithmetic(e.to_string()))?;
        verifying_key
            .verify_prehash(digest, &self.to_ecdsa()?)
            .map_err(|_| Error::InvalidSignature)
    }

    /// Recover the signing public key from the digest and recovery id
    pub fn recover(&self, digest: &[u8; 32]) -> Result<ProjectivePoint> {
        let recovery_id = RecoveryId::from_byte(self.recovery_id).ok_or(Error::InvalidSignature)?;
        let key = VerifyingKey::recover_from_prehash(digest, &self.to_ecdsa()?, recovery_id)
            .map_err(|_| Error::InvalidSignature)?;
        Ok(ProjectivePoint::from(*key.as_affine()))
    }
}

/// Configuration for DKG/signing sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session identifier
    pub session_id: SessionId,

    /// Threshold parameters
    pub params: Parameters,

    /// This party's index
    pub party_index: PartyIndex,

    /// Participating party indices (all n for DKG, t+1 for signing)
    pub parties: Vec<PartyIndex>,
}

impl SessionConfig {
    /// Configuration for a DKG session over all `n` parties
    pub fn keygen(
        session_id: SessionId,
        threshold: u16,
        share_count: u16,
        party_index: PartyIndex,
    ) -> Result<Self> {
        let params = Parameters::new(threshold, share_count)?;
        params.check_index(party_index)?;

        Ok(Self {
            session_id,
            params,
            party_index,
            parties: (1..=share_count).collect(),
        })
    }

    /// Configuration for a signing session over `parties`
    pub fn signing(
        session_id: SessionId,
        params: Parameters,
        party_index: PartyIndex,
        parties: &[PartyIndex],
    ) -> Result<Self> {
        params.validate()?;
        let parties = params.check_signers(parties)?;
        if !parties.contains(&party_index) {
            return Err(Error::InvalidPartyIndex(party_index));
        }

        Ok(Self {
            session_id,
            params,
            party_index,
            parties,
        })
    }

    /// All parties except this one
    pub fn peers(&self) -> Vec<PartyIndex> {
        self.parties
            .iter()
            .copied()
            .filter(|&p| p != self.party_index)
            .collect()
    }
}

/// Compressed SEC1 encoding of a point
pub fn encode_public_key(point: &ProjectivePoint) -> Result<PublicKey> {
    curve::point_to_bytes(point)
        .try_into()
        .map_err(|_| Error::Arithmetic("Point at infinity has no compressed encoding".into()))
}

mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(s)
            .map_err(serde::de::Error::custom)?
            .try_into()
            .map_err(|_| serde::de::Error::custom("Invalid length"))
    }
}
