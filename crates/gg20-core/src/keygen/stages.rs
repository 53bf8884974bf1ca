//! DKG stages 1-4 as pure functions.
//!
//! Each stage takes the messages of the previous round from all `n` parties
//! (this party's own included) and either produces the next round's output or
//! aborts naming every party whose data failed a check.

use super::local_key::SharedKeys;
use super::messages::KeyGenBroadcastMessage1;
use crate::error::{Error, Result, Stage};
use crate::primitives::{
    Decommitment, DecryptionKey, EncryptionKey, RingPedersenParams,
    RingPedersenWitness, VerifiableSS,
};
use crate::proofs::{
    CompositeDLogProof, CompositeDLogStatement, DLogProof, PaillierKeyProof, ZkProof,
};
use crate::types::{Parameters, PartyIndex};
use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};
use zeroize::Zeroize;

/// Key generation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeygenConfig {
    /// Bit length of the Paillier modulus and of N~
    pub paillier_bits: usize,
    /// Generate safe primes (much slower)
    pub use_safe_prime: bool,
}

impl Default for KeygenConfig {
    fn default() -> Self {
        Self {
            paillier_bits: 2048,
            use_safe_prime: false,
        }
    }
}

/// Secret state of one party during DKG
#[derive(Clone, Serialize, Deserialize)]
pub struct Keys {
    #[serde(with = "crate::serde_utils::scalar")]
    pub u_i: Scalar,
    #[serde(with = "crate::serde_utils::point")]
    pub y_i: ProjectivePoint,
    pub dk: DecryptionKey,
    pub ek: EncryptionKey,
    pub party_index: PartyIndex,
    pub ring: RingPedersenParams,
    pub ring_witness: RingPedersenWitness,
}

impl Drop for Keys {
    fn drop(&mut self) {
        self.u_i.zeroize();
    }
}

impl std::fmt::Debug for Keys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keys")
            .field("party_index", &self.party_index)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct KeygenStage1Input {
    pub index: PartyIndex,
    pub config: KeygenConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeygenStage1Output {
    pub key: Keys,
    pub bc1: KeyGenBroadcastMessage1,
    pub decom1: Decommitment,
}

/// Generate Paillier and ring-Pedersen keys, `u_i`, and commit to `y_i`
#[instrument(skip_all, fields(party = input.index))]
pub fn stage1(input: &KeygenStage1Input) -> Result<KeygenStage1Output> {
    if input.index == 0 {
        return Err(Error::InvalidPartyIndex(0));
    }
    let bits = input.config.paillier_bits;
    let safe = input.config.use_safe_prime;

    debug!(bits, safe, "Generating Paillier key");
    let (ek, dk) = DecryptionKey::generate(bits, safe)?;
    debug!(bits, safe, "Generating ring-Pedersen parameters");
    let (ring, ring_witness) = RingPedersenParams::generate(bits, safe, &mut OsRng)?;

    let u_i = Scalar::random(&mut OsRng);
    let y_i = ProjectivePoint::GENERATOR * u_i;
    let (com, decom1) = Decommitment::commit(&y_i);

    let correct_key_proof = PaillierKeyProof::prove(&dk)?;
    let composite_dlog_proof_base_h1 = CompositeDLogProof::prove(
        &base_h1_statement(&ring),
        &ring_witness.xhi,
        &ring_witness.phi,
    );
    let composite_dlog_proof_base_h2 = CompositeDLogProof::prove(
        &base_h2_statement(&ring),
        &ring_witness.xhi_inv,
        &ring_witness.phi,
    );

    let bc1 = KeyGenBroadcastMessage1 {
        e: ek.clone(),
        dlog_statement: ring.clone(),
        com,
        correct_key_proof,
        composite_dlog_proof_base_h1,
        composite_dlog_proof_base_h2,
    };
    let key = Keys {
        u_i,
        y_i,
        dk,
        ek,
        party_index: input.index,
        ring,
        ring_witness,
    };

    Ok(KeygenStage1Output { key, bc1, decom1 })
}

fn base_h1_statement(ring: &RingPedersenParams) -> CompositeDLogStatement {
    CompositeDLogStatement {
        modulus: ring.n_tilde.clone(),
        base: ring.h1.clone(),
        value: ring.h2.clone(),
    }
}

fn base_h2_statement(ring: &RingPedersenParams) -> CompositeDLogStatement {
    CompositeDLogStatement {
        modulus: ring.n_tilde.clone(),
        base: ring.h2.clone(),
        value: ring.h1.clone(),
    }
}

/// Every party `1..=n` must be present in `map`
fn require_all<T>(map: &BTreeMap<PartyIndex, T>, params: &Parameters, stage: Stage) -> Result<()> {
    let missing: Vec<PartyIndex> = (1..=params.share_count)
        .filter(|j| !map.contains_key(j))
        .collect();
    if !missing.is_empty() {
        return Err(Error::MissingMessage {
            stage,
            from: missing,
        });
    }
    if let Some(extra) = map.keys().find(|j| **j == 0 || **j > params.share_count) {
        return Err(Error::InvalidPartyIndex(*extra));
    }
    Ok(())
}

/// Run `check` for every party and merge the failures into one error
fn check_each<T, F>(map: &BTreeMap<PartyIndex, T>, stage: Stage, check: F) -> Result<()>
where
    F: Fn(PartyIndex, &T) -> Result<()>,
{
    let failures: Vec<Error> = map
        .iter()
        .filter_map(|(j, value)| check(*j, value).err().map(|e| e.blame(stage, *j)))
        .collect();
    match Error::merge(failures) {
        Some(err) => {
            warn!(%stage, culprits = ?err.culprits(), "Aborting DKG");
            Err(err)
        }
        None => Ok(()),
    }
}

pub struct KeygenStage2Input<'a> {
    pub key: &'a Keys,
    pub params: Parameters,
    pub bc1s: &'a BTreeMap<PartyIndex, KeyGenBroadcastMessage1>,
    pub decom1s: &'a BTreeMap<PartyIndex, Decommitment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeygenStage2Output {
    pub vss_scheme: VerifiableSS,
    /// Share of `u_i` for each party, this one included
    #[serde(with = "crate::serde_utils::scalar_map")]
    pub secret_shares: BTreeMap<PartyIndex, Scalar>,
}

/// Open every commitment, check every party's Paillier key and ring-Pedersen
/// parameters, then Feldman-share `u_i`
#[instrument(skip_all, fields(party = input.key.party_index))]
pub fn stage2(input: &KeygenStage2Input<'_>) -> Result<KeygenStage2Output> {
    const STAGE: Stage = Stage::Keygen(2);
    let params = &input.params;
    params.validate()?;
    require_all(input.bc1s, params, STAGE)?;
    require_all(input.decom1s, params, STAGE)?;

    check_each(input.bc1s, STAGE, |j, bc1| {
        let decom = &input.decom1s[&j];
        if !decom.verify(&bc1.com) {
            return Err(Error::Arithmetic("Decommitment does not open commitment".into()));
        }
        bc1.e.validate_size()?;
        bc1.dlog_statement.validate()?;
        bc1.correct_key_proof.verify(&bc1.e)?;
        bc1.composite_dlog_proof_base_h1
            .verify(&base_h1_statement(&bc1.dlog_statement))?;
        bc1.composite_dlog_proof_base_h2
            .verify(&base_h2_statement(&bc1.dlog_statement))?;
        Ok(())
    })?;

    let (vss_scheme, shares) =
        VerifiableSS::share(params.threshold, params.share_count, &input.key.u_i);
    let secret_shares = (1..=params.share_count).zip(shares).collect();

    Ok(KeygenStage2Output {
        vss_scheme,
        secret_shares,
    })
}

pub struct KeygenStage3Input<'a> {
    pub key: &'a Keys,
    pub params: Parameters,
    /// Decommitted `y_j` of every party
    pub ys: &'a BTreeMap<PartyIndex, ProjectivePoint>,
    pub vss_schemes: &'a BTreeMap<PartyIndex, VerifiableSS>,
    /// Share of `u_j` received from each party `j`
    pub party_shares: &'a BTreeMap<PartyIndex, Scalar>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeygenStage3Output {
    pub shared_key: SharedKeys,
    pub dlog_proof: DLogProof,
}

/// Validate received shares and combine them into `x_i`
#[instrument(skip_all, fields(party = input.key.party_index))]
pub fn stage3(input: &KeygenStage3Input<'_>) -> Result<KeygenStage3Output> {
    const STAGE: Stage = Stage::Keygen(3);
    let params = &input.params;
    require_all(input.ys, params, STAGE)?;
    require_all(input.vss_schemes, params, STAGE)?;
    require_all(input.party_shares, params, STAGE)?;

    let me = input.key.party_index;
    check_each(input.vss_schemes, STAGE, |j, vss| {
        if vss.threshold != params.threshold || vss.share_count != params.share_count {
            return Err(Error::Arithmetic("VSS parameters differ from the session".into()));
        }
        vss.validate_share(&input.party_shares[&j], me)?;
        if vss.constant_commitment() != input.ys[&j] {
            return Err(Error::Arithmetic(
                "VSS constant commitment differs from decommitted y_j".into(),
            ));
        }
        Ok(())
    })?;

    let x_i = input.party_shares.values().sum::<Scalar>();
    let y = input.ys.values().sum::<ProjectivePoint>();
    let dlog_proof = DLogProof::prove(&x_i);

    Ok(KeygenStage3Output {
        shared_key: SharedKeys { x_i, y },
        dlog_proof,
    })
}

pub struct KeygenStage4Input<'a> {
    pub params: Parameters,
    pub ys: &'a BTreeMap<PartyIndex, ProjectivePoint>,
    pub vss_schemes: &'a BTreeMap<PartyIndex, VerifiableSS>,
    pub dlog_proofs: &'a BTreeMap<PartyIndex, DLogProof>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeygenStage4Output {
    /// Combined Feldman commitments
    pub vss_scheme: VerifiableSS,
    #[serde(with = "crate::serde_utils::point_map")]
    pub pk_vec: BTreeMap<PartyIndex, ProjectivePoint>,
}

/// Verify every party's proof of knowledge of its key share
#[instrument(skip_all)]
pub fn stage4(input: &KeygenStage4Input<'_>) -> Result<KeygenStage4Output> {
    const STAGE: Stage = Stage::Keygen(4);
    let params = &input.params;
    require_all(input.ys, params, STAGE)?;
    require_all(input.vss_schemes, params, STAGE)?;
    require_all(input.dlog_proofs, params, STAGE)?;

    let vss_scheme = VerifiableSS::combine(input.vss_schemes.values())?;
    if vss_scheme.constant_commitment() != input.ys.values().sum::<ProjectivePoint>() {
        return Err(Error::Internal("Combined VSS does not commit to the public key".into()));
    }

    check_each(input.dlog_proofs, STAGE, |j, proof| {
        proof.verify(&vss_scheme.point_commitment(j))?;
        Ok(())
    })?;

    let pk_vec = input
        .dlog_proofs
        .iter()
        .map(|(j, proof)| (*j, proof.pk))
        .collect();

    Ok(KeygenStage4Output { vss_scheme, pk_vec })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proofs::ProofKind;
    use crate::test_utils::dkg_transcript;

    #[test]
    fn test_stage1_rejects_index_zero() {
        let err = stage1(&KeygenStage1Input {
            index: 0,
            config: KeygenConfig::default(),
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidPartyIndex(0)));
    }

    #[test]
    fn test_stage2_names_bad_decommitments() {
        let tr = dkg_transcript();
        let mut decom1s = tr.decom1s.clone();
        decom1s.get_mut(&2).unwrap().blind_factor[0] ^= 1;
        decom1s.get_mut(&4).unwrap().point += ProjectivePoint::GENERATOR;

        let err = stage2(&KeygenStage2Input {
            key: &tr.stage1[&1].key,
            params: tr.params,
            bc1s: &tr.bc1s,
            decom1s: &decom1s,
        })
        .unwrap_err();
        assert!(err.is_protocol_violation());
        assert_eq!(err.stage(), Some(Stage::Keygen(2)));
        assert_eq!(err.culprits(), &[2, 4]);
    }

    #[test]
    fn test_stage2_rejects_swapped_ring_parameters() {
        let tr = dkg_transcript();
        let mut bc1s = tr.bc1s.clone();
        // party 3 presents party 1's N~ with its own proofs
        bc1s.get_mut(&3).unwrap().dlog_statement = tr.bc1s[&1].dlog_statement.clone();

        let err = stage2(&KeygenStage2Input {
            key: &tr.stage1[&1].key,
            params: tr.params,
            bc1s: &bc1s,
            decom1s: &tr.decom1s,
        })
        .unwrap_err();
        match err {
            Error::InvalidProof { culprits, kind, .. } => {
                assert_eq!(culprits, vec![3]);
                assert_eq!(kind, ProofKind::CompositeDLog);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_stage2_missing_party() {
        let tr = dkg_transcript();
        let mut bc1s = tr.bc1s.clone();
        bc1s.remove(&4);
        let err = stage2(&KeygenStage2Input {
            key: &tr.stage1[&1].key,
            params: tr.params,
            bc1s: &bc1s,
            decom1s: &tr.decom1s,
        })
        .unwrap_err();
        assert!(matches!(
            err,
            Error::MissingMessage { stage: Stage::Keygen(2), ref from } if from == &vec![4]
        ));
    }

    #[test]
    fn test_stage3_rejects_bad_share() {
        let tr = dkg_transcript();
        let mut shares = tr.shares_for(1);
        *shares.get_mut(&3).unwrap() += Scalar::ONE;

        let err = stage3(&KeygenStage3Input {
            key: &tr.stage1[&1].key,
            params: tr.params,
            ys: &tr.ys,
            vss_schemes: &tr.vss_schemes,
            party_shares: &shares,
        })
        .unwrap_err();
        assert!(err.is_protocol_violation());
        assert_eq!(err.culprits(), &[3]);
    }

    #[test]
    fn test_stage3_rejects_vss_not_matching_commitment() {
        let tr = dkg_transcript();
        let mut ys = tr.ys.clone();
        *ys.get_mut(&2).unwrap() += ProjectivePoint::GENERATOR;

        let err = stage3(&KeygenStage3Input {
            key: &tr.stage1[&1].key,
            params: tr.params,
            ys: &ys,
            vss_schemes: &tr.vss_schemes,
            party_shares: &tr.shares_for(1),
        })
        .unwrap_err();
        assert_eq!(err.culprits(), &[2]);
    }

    #[test]
    fn test_stage4_rejects_forged_dlog_proof() {
        let tr = dkg_transcript();
        let mut dlog_proofs = tr.dlog_proofs.clone();
        dlog_proofs.insert(2, DLogProof::prove(&Scalar::random(&mut OsRng)));

        let err = stage4(&KeygenStage4Input {
            params: tr.params,
            ys: &tr.ys,
            vss_schemes: &tr.vss_schemes,
            dlog_proofs: &dlog_proofs,
        })
        .unwrap_err();
        match err {
            Error::InvalidProof {
                stage,
                culprits,
                kind,
            } => {
                assert_eq!(stage, Stage::Keygen(4));
                assert_eq!(culprits, vec![2]);
                assert_eq!(kind, ProofKind::Schnorr);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_public_shares_interpolate_to_public_key() {
        let tr = dkg_transcript();
        let key = &tr.keys[0];
        let signers = [1, 2, 4];
        let y: ProjectivePoint = signers
            .iter()
            .map(|j| {
                key.pk_vec[j] * crate::primitives::lagrange_coefficient(*j, &signers).unwrap()
            })
            .sum();
        assert_eq!(y, key.public_key());
    }
}
