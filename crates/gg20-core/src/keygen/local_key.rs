//! The per-party record produced by DKG and consumed by signing

use super::messages::KeyGenBroadcastMessage1;
use super::stages::{Keys, KeygenStage4Output};
use crate::primitives::{DecryptionKey, EncryptionKey, RingPedersenParams, VerifiableSS};
use crate::types::{encode_public_key, Parameters, PartyIndex, PublicKey};
use crate::{Error, Result};
use k256::{ProjectivePoint, Scalar};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// This party's share `x_i` of the signing key and the public key `y`
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SharedKeys {
    #[serde(with = "crate::serde_utils::scalar")]
    pub x_i: Scalar,
    #[zeroize(skip)]
    #[serde(with = "crate::serde_utils::point")]
    pub y: ProjectivePoint,
}

impl std::fmt::Debug for SharedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeys")
            .field("x_i", &"[REDACTED]")
            .field("y", &self.y.to_affine())
            .finish()
    }
}

/// Key material one party keeps after DKG. The JSON form is the unit of backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalKey {
    /// This party's Paillier secret key
    pub paillier_dk: DecryptionKey,
    /// `x_j * G` for every party
    #[serde(with = "crate::serde_utils::point_map")]
    pub pk_vec: BTreeMap<PartyIndex, ProjectivePoint>,
    pub keys_linear: SharedKeys,
    /// Every party's Paillier encryption key
    pub paillier_key_vec: BTreeMap<PartyIndex, EncryptionKey>,
    /// Joint public key
    #[serde(with = "crate::serde_utils::point")]
    pub y_sum_s: ProjectivePoint,
    /// Every party's ring-Pedersen parameters
    pub h1_h2_n_tilde_vec: BTreeMap<PartyIndex, RingPedersenParams>,
    /// Sum of all dealers' Feldman commitments
    pub vss_scheme: VerifiableSS,
    pub i: PartyIndex,
    pub t: u16,
    pub n: u16,
}

impl LocalKey {
    /// Assemble the record from the outputs of DKG stages 1, 3 and 4
    pub fn new(
        key: &Keys,
        bc1s: &BTreeMap<PartyIndex, KeyGenBroadcastMessage1>,
        shared_key: SharedKeys,
        stage4: KeygenStage4Output,
        params: &Parameters,
    ) -> Self {
        let y_sum_s = shared_key.y;
        Self {
            paillier_dk: key.dk.clone(),
            pk_vec: stage4.pk_vec,
            keys_linear: shared_key,
            paillier_key_vec: bc1s.iter().map(|(j, bc)| (*j, bc.e.clone())).collect(),
            y_sum_s,
            h1_h2_n_tilde_vec: bc1s
                .iter()
                .map(|(j, bc)| (*j, bc.dlog_statement.clone()))
                .collect(),
            vss_scheme: stage4.vss_scheme,
            i: key.party_index,
            t: params.threshold,
            n: params.share_count,
        }
    }

    /// Joint public key
    pub fn public_key(&self) -> ProjectivePoint {
        self.y_sum_s
    }

    /// Compressed SEC1 encoding of the joint public key
    pub fn public_key_bytes(&self) -> Result<PublicKey> {
        encode_public_key(&self.y_sum_s)
    }

    pub fn params(&self) -> Parameters {
        Parameters {
            threshold: self.t,
            share_count: self.n,
        }
    }

    /// Consistency checks for a record loaded from storage
    pub fn validate(&self) -> Result<()> {
        let params = self.params();
        params.validate()?;
        params.check_index(self.i)?;

        let expected: Vec<PartyIndex> = (1..=self.n).collect();
        let complete = |keys: Vec<&PartyIndex>| keys.into_iter().copied().eq(expected.iter().copied());
        if !complete(self.pk_vec.keys().collect())
            || !complete(self.paillier_key_vec.keys().collect())
            || !complete(self.h1_h2_n_tilde_vec.keys().collect())
        {
            return Err(Error::InvalidConfig(
                "Key record does not cover every party".into(),
            ));
        }

        if self.keys_linear.y != self.y_sum_s
            || self.vss_scheme.constant_commitment() != self.y_sum_s
        {
            return Err(Error::InvalidConfig("Inconsistent public key".into()));
        }
        for (j, pk) in &self.pk_vec {
            if *pk != self.vss_scheme.point_commitment(*j) {
                return Err(Error::InvalidConfig(format!(
                    "Public share of party {} does not match the VSS commitments",
                    j
                )));
            }
        }
        if self.pk_vec[&self.i] != ProjectivePoint::GENERATOR * self.keys_linear.x_i {
            return Err(Error::InvalidConfig("Secret share does not match its public share".into()));
        }
        if self.paillier_key_vec[&self.i] != self.paillier_dk.encryption_key() {
            return Err(Error::InvalidConfig("Paillier key mismatch".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::dkg_fixture;

    #[test]
    fn test_fixture_keys_are_consistent() {
        let keys = dkg_fixture();
        for key in keys {
            key.validate().unwrap();
            assert_eq!(key.public_key(), keys[0].public_key());
        }
    }

    #[test]
    fn test_json_backup() {
        let key = &dkg_fixture()[1];
        let json = serde_json::to_string(key).unwrap();
        let restored: LocalKey = serde_json::from_str(&json).unwrap();
        restored.validate().unwrap();
        assert_eq!(restored.keys_linear.x_i, key.keys_linear.x_i);
        assert_eq!(restored.i, 2);
    }

    #[test]
    fn test_validate_catches_wrong_share() {
        let mut key = dkg_fixture()[2].clone();
        key.keys_linear.x_i += Scalar::ONE;
        assert!(matches!(key.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_every_signing_set_reconstructs_the_key() {
        let keys = dkg_fixture();
        let y = keys[0].public_key();
        let n = keys[0].n;
        for a in 1..=n {
            for b in a + 1..=n {
                for c in b + 1..=n {
                    let indices = [a, b, c];
                    let shares: Vec<Scalar> = indices
                        .iter()
                        .map(|&i| keys[usize::from(i) - 1].keys_linear.x_i)
                        .collect();
                    let x = keys[0].vss_scheme.reconstruct(&indices, &shares).unwrap();
                    assert_eq!(ProjectivePoint::GENERATOR * x, y, "subset {:?}", indices);
                }
            }
        }
    }
}
