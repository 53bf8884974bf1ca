//! GG20 signing stages 1-9 as pure functions.
//!
//! Stages 1-7 run before the message is known and end in a
//! [`CompletedOfflineStage`]; stages 8 and 9 produce and combine the partial
//! signatures. Broadcast inputs are maps over every signer (this party's own
//! message included); point-to-point inputs are maps over the peers.

use super::messages::*;
use crate::error::{Error, Result, Stage};
use crate::keygen::LocalKey;
use crate::mta::{MessageA, MessageB};
use crate::primitives::{
    curve, lagrange_coefficient, Decommitment, EncryptionKey, RingPedersenParams,
};
use crate::proofs::{
    HomoElGamalProof, HomoElGamalStatement, PdlWithSlackProof, PdlWithSlackStatement,
    PedersenProof, ProofError, ProofKind, ZkProof,
};
use crate::types::{PartyIndex, Signature};
use k256::{
    elliptic_curve::{scalar::IsHigh, Field},
    ProjectivePoint, Scalar,
};
use libpaillier::unknown_order::BigNumber;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Per-session secrets of one signer.
///
/// Not `Clone`: [`stage7`] moves it into the [`CompletedOfflineStage`] and
/// [`stage8`] spends it, so a nonce `k_i` signs at most one message.
#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct SignKey {
    /// `lambda_i * x_i`
    #[serde(with = "crate::serde_utils::scalar")]
    pub w_i: Scalar,
    #[zeroize(skip)]
    #[serde(with = "crate::serde_utils::point")]
    pub g_w_i: ProjectivePoint,
    #[serde(with = "crate::serde_utils::scalar")]
    pub k_i: Scalar,
    #[serde(with = "crate::serde_utils::scalar")]
    pub gamma_i: Scalar,
    #[zeroize(skip)]
    #[serde(with = "crate::serde_utils::point")]
    pub g_gamma_i: ProjectivePoint,
}

impl std::fmt::Debug for SignKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SignKey([REDACTED])")
    }
}

impl SignKey {
    /// Additive share `w_i` for this signing set and fresh `k_i`, `gamma_i`
    pub fn create(local_key: &LocalKey, signers: &[PartyIndex]) -> Result<Self> {
        let lambda_i = lagrange_coefficient(local_key.i, signers)?;
        let w_i = lambda_i * local_key.keys_linear.x_i;
        let gamma_i = Scalar::random(&mut OsRng);
        Ok(Self {
            w_i,
            g_w_i: ProjectivePoint::GENERATOR * w_i,
            k_i: Scalar::random(&mut OsRng),
            gamma_i,
            g_gamma_i: ProjectivePoint::GENERATOR * gamma_i,
        })
    }
}

/// Everything the online stages need. Secret: holds `k_i` and `sigma_i`.
///
/// Consumed by [`stage8`]. Signing two messages with one offline stage
/// reveals the private key, so a persisted copy must be deleted once it has
/// been loaded.
#[derive(Serialize, Deserialize)]
pub struct CompletedOfflineStage {
    pub index: PartyIndex,
    pub signers: Vec<PartyIndex>,
    pub local_key: LocalKey,
    pub sign_key: SignKey,
    /// Pedersen commitments `T_j` of every signer
    #[serde(with = "crate::serde_utils::point_map")]
    pub ts: BTreeMap<PartyIndex, ProjectivePoint>,
    #[serde(with = "crate::serde_utils::point")]
    pub r_point: ProjectivePoint,
    #[serde(with = "crate::serde_utils::scalar")]
    pub sigma_i: Scalar,
}

impl Drop for CompletedOfflineStage {
    fn drop(&mut self) {
        self.sigma_i.zeroize();
    }
}

impl std::fmt::Debug for CompletedOfflineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletedOfflineStage")
            .field("index", &self.index)
            .field("signers", &self.signers)
            .field("r_point", &self.r_point.to_affine())
            .finish_non_exhaustive()
    }
}

impl CompletedOfflineStage {
    pub fn public_key(&self) -> ProjectivePoint {
        self.local_key.public_key()
    }
}

fn peers_of(signers: &[PartyIndex], me: PartyIndex) -> Vec<PartyIndex> {
    signers.iter().copied().filter(|&j| j != me).collect()
}

/// Validate the signing set against the key; returns it sorted
pub fn check_signing_set(local_key: &LocalKey, signers: &[PartyIndex]) -> Result<Vec<PartyIndex>> {
    let signers = local_key.params().check_signers(signers)?;
    if !signers.contains(&local_key.i) {
        return Err(Error::InvalidConfig(format!(
            "Party {} is not in the signing set {:?}",
            local_key.i, signers
        )));
    }
    Ok(signers)
}

fn require_from<T>(
    map: &BTreeMap<PartyIndex, T>,
    expected: &[PartyIndex],
    stage: Stage,
) -> Result<()> {
    let missing: Vec<PartyIndex> = expected
        .iter()
        .filter(|j| !map.contains_key(j))
        .copied()
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(Error::MissingMessage {
            stage,
            from: missing,
        })
    }
}

fn check_sender(claimed: PartyIndex, actual: PartyIndex) -> Result<()> {
    if claimed != actual {
        return Err(Error::Arithmetic(format!(
            "Message claims sender {} but came from {}",
            claimed, actual
        )));
    }
    Ok(())
}

fn paillier_key_of(local_key: &LocalKey, j: PartyIndex) -> Result<&EncryptionKey> {
    local_key
        .paillier_key_vec
        .get(&j)
        .ok_or_else(|| Error::InvalidConfig(format!("No Paillier key for party {}", j)))
}

fn ring_of(local_key: &LocalKey, j: PartyIndex) -> Result<&RingPedersenParams> {
    local_key
        .h1_h2_n_tilde_vec
        .get(&j)
        .ok_or_else(|| Error::InvalidConfig(format!("No ring-Pedersen parameters for party {}", j)))
}

/// `g_w_j = lambda_j * x_j * G`
fn public_w(local_key: &LocalKey, j: PartyIndex, signers: &[PartyIndex]) -> Result<ProjectivePoint> {
    let pk = local_key
        .pk_vec
        .get(&j)
        .ok_or_else(|| Error::InvalidConfig(format!("No public share for party {}", j)))?;
    Ok(*pk * lagrange_coefficient(j, signers)?)
}

/// Run `f` for every peer (in parallel with `multi-thread`). Failures are
/// attributed to the peer and merged so the error names every culprit.
fn for_each_peer<T, F>(peers: &[PartyIndex], stage: Stage, f: F) -> Result<BTreeMap<PartyIndex, T>>
where
    T: Send,
    F: Fn(PartyIndex) -> Result<T> + Sync + Send,
{
    #[cfg(feature = "multi-thread")]
    let results: Vec<(PartyIndex, Result<T>)> = {
        use rayon::prelude::*;
        peers.par_iter().map(|&j| (j, f(j))).collect()
    };
    #[cfg(not(feature = "multi-thread"))]
    let results: Vec<(PartyIndex, Result<T>)> = peers.iter().map(|&j| (j, f(j))).collect();

    let mut values = BTreeMap::new();
    let mut failures = Vec::new();
    for (j, result) in results {
        match result {
            Ok(value) => {
                values.insert(j, value);
            }
            Err(e) => failures.push(e.blame(stage, j)),
        }
    }
    match Error::merge(failures) {
        Some(err) => {
            warn!(%stage, culprits = ?err.culprits(), "Aborting signing");
            Err(err)
        }
        None => Ok(values),
    }
}

pub struct SignStage1Input<'a> {
    pub local_key: &'a LocalKey,
    pub signers: &'a [PartyIndex],
}

#[derive(Serialize, Deserialize)]
pub struct SignStage1Output {
    pub sign_key: SignKey,
    /// Paillier randomness of `m_a.c`
    #[serde(with = "crate::serde_utils::bignum")]
    pub m_a_randomness: BigNumber,
    pub decom1: Decommitment,
    pub message: SignRound1Message,
}

/// Commit to `Gamma_i` and start MtA with `Enc(k_i)`
#[instrument(skip_all, fields(party = input.local_key.i))]
pub fn stage1(input: &SignStage1Input<'_>) -> Result<SignStage1Output> {
    let local_key = input.local_key;
    let signers = check_signing_set(local_key, input.signers)?;
    let me = local_key.i;

    let sign_key = SignKey::create(local_key, &signers)?;
    let (bc1, decom1) = Decommitment::commit(&sign_key.g_gamma_i);

    let verifiers = peers_of(&signers, me)
        .into_iter()
        .map(|j| ring_of(local_key, j).map(|ring| (j, ring)))
        .collect::<Result<Vec<_>>>()?;
    let (m_a, m_a_randomness) = MessageA::a(
        &sign_key.k_i,
        &local_key.paillier_dk.encryption_key(),
        verifiers,
    )?;

    Ok(SignStage1Output {
        sign_key,
        m_a_randomness,
        decom1,
        message: SignRound1Message {
            index: me,
            bc1,
            m_a,
        },
    })
}

pub struct SignStage2Input<'a> {
    pub local_key: &'a LocalKey,
    pub signers: &'a [PartyIndex],
    pub sign_key: &'a SignKey,
    pub round1: &'a BTreeMap<PartyIndex, SignRound1Message>,
}

#[derive(Serialize, Deserialize)]
pub struct SignStage2Output {
    /// One message per peer, keyed by recipient
    pub messages: BTreeMap<PartyIndex, SignRound2Message>,
    /// Bob-side shares of `k_j * gamma_i`
    #[serde(with = "crate::serde_utils::scalar_map")]
    pub beta_vec: BTreeMap<PartyIndex, Scalar>,
    /// Bob-side shares of `k_j * w_i`
    #[serde(with = "crate::serde_utils::scalar_map")]
    pub ni_vec: BTreeMap<PartyIndex, Scalar>,
}

impl std::fmt::Debug for SignStage2Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignStage2Output")
            .field("messages", &self.messages)
            .finish_non_exhaustive()
    }
}

/// Answer every peer's MtA request for `gamma_i` and `w_i`
#[instrument(skip_all, fields(party = input.local_key.i))]
pub fn stage2(input: &SignStage2Input<'_>) -> Result<SignStage2Output> {
    const STAGE: Stage = Stage::Sign(2);
    let local_key = input.local_key;
    let me = local_key.i;
    let peers = peers_of(input.signers, me);
    require_from(input.round1, &peers, STAGE)?;
    let my_ring = ring_of(local_key, me)?;
    let sign_key = input.sign_key;

    let answers = for_each_peer(&peers, STAGE, |j| {
        let msg = &input.round1[&j];
        check_sender(msg.index, j)?;
        let ek_j = paillier_key_of(local_key, j)?;
        let ring_j = ring_of(local_key, j)?;
        let (m_b_gamma, beta) =
            MessageB::b(&sign_key.gamma_i, ek_j, &msg.m_a, ring_j, me, my_ring)?;
        let (m_b_w, ni) = MessageB::b(&sign_key.w_i, ek_j, &msg.m_a, ring_j, me, my_ring)?;
        let message = SignRound2Message {
            from: me,
            to: j,
            m_b_gamma,
            m_b_w,
        };
        Ok((message, beta, ni))
    })?;

    let mut output = SignStage2Output {
        messages: BTreeMap::new(),
        beta_vec: BTreeMap::new(),
        ni_vec: BTreeMap::new(),
    };
    for (j, (message, beta, ni)) in answers {
        output.messages.insert(j, message);
        output.beta_vec.insert(j, beta);
        output.ni_vec.insert(j, ni);
    }
    Ok(output)
}

pub struct SignStage3Input<'a> {
    pub local_key: &'a LocalKey,
    pub signers: &'a [PartyIndex],
    pub stage1: &'a SignStage1Output,
    pub stage2: &'a SignStage2Output,
    /// Answers addressed to this party
    pub round2: &'a BTreeMap<PartyIndex, SignRound2Message>,
}

#[derive(Serialize, Deserialize)]
pub struct SignStage3Output {
    #[serde(with = "crate::serde_utils::scalar")]
    pub sigma_i: Scalar,
    /// Blinding of `T_i`
    #[serde(with = "crate::serde_utils::scalar")]
    pub l_i: Scalar,
    pub message: SignRound3Message,
}

impl std::fmt::Debug for SignStage3Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignStage3Output")
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Finish MtA: `delta_i = k_i * gamma_i + sum(alpha + beta)`,
/// `sigma_i = k_i * w_i + sum(mu + ni)`, and commit to `sigma_i`
#[instrument(skip_all, fields(party = input.local_key.i))]
pub fn stage3(input: &SignStage3Input<'_>) -> Result<SignStage3Output> {
    const STAGE: Stage = Stage::Sign(3);
    let local_key = input.local_key;
    let me = local_key.i;
    let peers = peers_of(input.signers, me);
    require_from(input.round2, &peers, STAGE)?;
    let my_ring = ring_of(local_key, me)?;
    let sign_key = &input.stage1.sign_key;
    let c_a = &input.stage1.message.m_a.c;

    let shares = for_each_peer(&peers, STAGE, |j| {
        let msg = &input.round2[&j];
        check_sender(msg.from, j)?;
        if msg.to != me {
            return Err(Error::Arithmetic(format!(
                "Message addressed to {} delivered to {}",
                msg.to, me
            )));
        }
        let alpha = msg.m_b_gamma.verify_proofs_get_alpha(
            &local_key.paillier_dk,
            &sign_key.k_i,
            c_a,
            my_ring,
        )?;
        let mu = msg.m_b_w.verify_proofs_get_alpha(
            &local_key.paillier_dk,
            &sign_key.k_i,
            c_a,
            my_ring,
        )?;
        if *msg.m_b_w.b_point() != public_w(local_key, j, input.signers)? {
            return Err(Error::Arithmetic(
                "MtAwc answer does not match the public key share".into(),
            ));
        }
        Ok((alpha, mu))
    })?;

    let mut delta_i = sign_key.k_i * sign_key.gamma_i;
    let mut sigma_i = sign_key.k_i * sign_key.w_i;
    for (j, (alpha, mu)) in &shares {
        let beta = input
            .stage2
            .beta_vec
            .get(j)
            .ok_or_else(|| Error::Internal(format!("No MtA share for party {}", j)))?;
        let ni = input
            .stage2
            .ni_vec
            .get(j)
            .ok_or_else(|| Error::Internal(format!("No MtAwc share for party {}", j)))?;
        delta_i += alpha + beta;
        sigma_i += mu + ni;
    }

    let l_i = Scalar::random(&mut OsRng);
    let t_i_proof = PedersenProof::prove(&sigma_i, &l_i);

    Ok(SignStage3Output {
        sigma_i,
        l_i,
        message: SignRound3Message {
            index: me,
            delta_i,
            t_i: t_i_proof.com,
            t_i_proof,
        },
    })
}

pub struct SignStage4Input<'a> {
    pub index: PartyIndex,
    pub signers: &'a [PartyIndex],
    pub round3: &'a BTreeMap<PartyIndex, SignRound3Message>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SignStage4Output {
    #[serde(with = "crate::serde_utils::scalar")]
    pub delta_inv: Scalar,
}

/// Check every `T_j` proof and invert `delta = sum(delta_j)`
#[instrument(skip_all, fields(party = input.index))]
pub fn stage4(input: &SignStage4Input<'_>) -> Result<SignStage4Output> {
    const STAGE: Stage = Stage::Sign(4);
    require_from(input.round3, input.signers, STAGE)?;
    let peers = peers_of(input.signers, input.index);

    for_each_peer(&peers, STAGE, |j| {
        let msg = &input.round3[&j];
        check_sender(msg.index, j)?;
        msg.t_i_proof.verify(&msg.t_i)?;
        Ok(())
    })?;

    let delta: Scalar = input
        .signers
        .iter()
        .map(|j| input.round3[j].delta_i)
        .sum();
    let delta_inv = Option::<Scalar>::from(delta.invert())
        .ok_or_else(|| Error::Arithmetic("delta is zero".into()))?;

    Ok(SignStage4Output { delta_inv })
}

pub struct SignStage5Input<'a> {
    pub local_key: &'a LocalKey,
    pub signers: &'a [PartyIndex],
    pub stage1: &'a SignStage1Output,
    pub delta_inv: Scalar,
    pub round1: &'a BTreeMap<PartyIndex, SignRound1Message>,
    pub round2: &'a BTreeMap<PartyIndex, SignRound2Message>,
    pub round4: &'a BTreeMap<PartyIndex, SignRound4Message>,
}

#[derive(Serialize, Deserialize)]
pub struct SignStage5Output {
    /// `R = delta^-1 * sum(Gamma_j)`
    #[serde(with = "crate::serde_utils::point")]
    pub r: ProjectivePoint,
    pub message: SignRound5Message,
}

impl std::fmt::Debug for SignStage5Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignStage5Output")
            .field("r", &self.r.to_affine())
            .field("message", &self.message)
            .finish()
    }
}

/// Open the `Gamma_j` commitments, compute `R` and prove `R_dash_i = k_i * R`
#[instrument(skip_all, fields(party = input.local_key.i))]
pub fn stage5(input: &SignStage5Input<'_>) -> Result<SignStage5Output> {
    const STAGE: Stage = Stage::Sign(5);
    let local_key = input.local_key;
    let me = local_key.i;
    let peers = peers_of(input.signers, me);
    require_from(input.round1, &peers, STAGE)?;
    require_from(input.round2, &peers, STAGE)?;
    require_from(input.round4, &peers, STAGE)?;
    let sign_key = &input.stage1.sign_key;

    let gammas = for_each_peer(&peers, STAGE, |j| {
        let msg = &input.round4[&j];
        check_sender(msg.index, j)?;
        if !msg.decom1.verify(&input.round1[&j].bc1) {
            return Err(Error::Arithmetic("Gamma decommitment does not open commitment".into()));
        }
        if *input.round2[&j].m_b_gamma.b_point() != msg.decom1.point {
            return Err(Error::Arithmetic(
                "Gamma differs from the value used in MtA".into(),
            ));
        }
        Ok(msg.decom1.point)
    })?;

    let gamma_sum = gammas.values().sum::<ProjectivePoint>() + sign_key.g_gamma_i;
    let r = gamma_sum * input.delta_inv;
    if r == ProjectivePoint::IDENTITY {
        return Err(Error::Arithmetic("R is the point at infinity".into()));
    }
    let r_dash = r * sign_key.k_i;

    let ek = local_key.paillier_dk.encryption_key();
    let k_i = curve::scalar_to_bignum(&sign_key.k_i);
    let c_a = &input.stage1.message.m_a.c;
    let phase5_proofs = peers
        .iter()
        .map(|&j| {
            let statement = PdlWithSlackStatement {
                ciphertext: c_a,
                ek: &ek,
                q_point: &r_dash,
                g_point: &r,
                ring: ring_of(local_key, j)?,
            };
            let proof = PdlWithSlackProof::prove(&k_i, &input.stage1.m_a_randomness, &statement)?;
            Ok((j, proof))
        })
        .collect::<Result<BTreeMap<_, _>>>()?;

    Ok(SignStage5Output {
        r,
        message: SignRound5Message {
            index: me,
            r_dash,
            phase5_proofs,
        },
    })
}

pub struct SignStage6Input<'a> {
    pub local_key: &'a LocalKey,
    pub signers: &'a [PartyIndex],
    pub stage3: &'a SignStage3Output,
    pub stage5: &'a SignStage5Output,
    pub round1: &'a BTreeMap<PartyIndex, SignRound1Message>,
    pub round5: &'a BTreeMap<PartyIndex, SignRound5Message>,
}

#[derive(Serialize, Deserialize)]
pub struct SignStage6Output {
    pub message: SignRound6Message,
}

impl std::fmt::Debug for SignStage6Output {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignStage6Output")
            .field("message", &self.message)
            .finish()
    }
}

fn homo_elgamal_statement(r: &ProjectivePoint, t: &ProjectivePoint, s: &ProjectivePoint) -> HomoElGamalStatement {
    HomoElGamalStatement {
        g: *r,
        h: curve::second_generator(),
        y: ProjectivePoint::GENERATOR,
        d: *t,
        e: *s,
    }
}

/// Check the PDL proofs addressed to this party and `sum(R_dash_j) == G`,
/// then publish `S_i = sigma_i * R`
#[instrument(skip_all, fields(party = input.local_key.i))]
pub fn stage6(input: &SignStage6Input<'_>) -> Result<SignStage6Output> {
    const STAGE: Stage = Stage::Sign(6);
    let local_key = input.local_key;
    let me = local_key.i;
    let peers = peers_of(input.signers, me);
    require_from(input.round1, &peers, STAGE)?;
    require_from(input.round5, &peers, STAGE)?;
    let my_ring = ring_of(local_key, me)?;
    let r = &input.stage5.r;

    let r_dashes = for_each_peer(&peers, STAGE, |j| {
        let msg = &input.round5[&j];
        check_sender(msg.index, j)?;
        let proof = msg
            .phase5_proofs
            .get(&me)
            .ok_or_else(|| ProofError::new(ProofKind::PdlWithSlack, "no proof for this verifier"))?;
        proof.verify(&PdlWithSlackStatement {
            ciphertext: &input.round1[&j].m_a.c,
            ek: paillier_key_of(local_key, j)?,
            q_point: &msg.r_dash,
            g_point: r,
            ring: my_ring,
        })?;
        Ok(msg.r_dash)
    })?;

    let r_dash_sum =
        r_dashes.values().sum::<ProjectivePoint>() + input.stage5.message.r_dash;
    if r_dash_sum != ProjectivePoint::GENERATOR {
        return Err(Error::ProtocolViolation {
            stage: STAGE,
            culprits: peers,
            reason: "sum of R_dash_j is not the generator".into(),
        });
    }

    let sigma_i = input.stage3.sigma_i;
    let s_i = *r * sigma_i;
    let statement = homo_elgamal_statement(r, &input.stage3.message.t_i, &s_i);
    let homo_elgamal_proof = HomoElGamalProof::prove(&input.stage3.l_i, &sigma_i, &statement);
    debug!("Published S_i");

    Ok(SignStage6Output {
        message: SignRound6Message {
            index: me,
            s_i,
            homo_elgamal_proof,
        },
    })
}

pub struct SignStage7Input<'a> {
    pub local_key: &'a LocalKey,
    pub signers: &'a [PartyIndex],
    /// Taken from [`SignStage1Output`]; moves into the offline stage
    pub sign_key: SignKey,
    pub stage3: &'a SignStage3Output,
    pub stage5: &'a SignStage5Output,
    pub stage6: &'a SignStage6Output,
    pub round3: &'a BTreeMap<PartyIndex, SignRound3Message>,
    pub round6: &'a BTreeMap<PartyIndex, SignRound6Message>,
}

/// Check every `S_j` against `T_j` and `sum(S_j) == Y`
#[instrument(skip_all, fields(party = input.local_key.i))]
pub fn stage7(input: SignStage7Input<'_>) -> Result<CompletedOfflineStage> {
    const STAGE: Stage = Stage::Sign(7);
    let local_key = input.local_key;
    let me = local_key.i;
    let peers = peers_of(input.signers, me);
    require_from(input.round3, &peers, STAGE)?;
    require_from(input.round6, &peers, STAGE)?;
    let r = &input.stage5.r;

    let s_points = for_each_peer(&peers, STAGE, |j| {
        let msg = &input.round6[&j];
        check_sender(msg.index, j)?;
        let statement = homo_elgamal_statement(r, &input.round3[&j].t_i, &msg.s_i);
        msg.homo_elgamal_proof.verify(&statement)?;
        Ok(msg.s_i)
    })?;

    let s_sum = s_points.values().sum::<ProjectivePoint>() + input.stage6.message.s_i;
    if s_sum != local_key.public_key() {
        return Err(Error::ProtocolViolation {
            stage: STAGE,
            culprits: peers,
            reason: "sum of S_j is not the public key".into(),
        });
    }

    let mut ts: BTreeMap<_, _> = peers.iter().map(|j| (*j, input.round3[j].t_i)).collect();
    ts.insert(me, input.stage3.message.t_i);

    Ok(CompletedOfflineStage {
        index: me,
        signers: input.signers.to_vec(),
        local_key: local_key.clone(),
        sign_key: input.sign_key,
        ts,
        r_point: *r,
        sigma_i: input.stage3.sigma_i,
    })
}

/// `r = R.x mod q`
fn r_scalar(r_point: &ProjectivePoint) -> Result<Scalar> {
    let r = curve::scalar_from_digest(&curve::x_coordinate(r_point)?);
    if bool::from(r.is_zero()) {
        return Err(Error::Arithmetic("r is zero".into()));
    }
    Ok(r)
}

pub struct SignStage8Input<'a> {
    pub offline: CompletedOfflineStage,
    /// 32-byte message digest
    pub message: &'a [u8; 32],
}

/// Public part of a spent offline stage plus this party's partial signature
#[derive(Debug, Clone)]
pub struct SignStage8Output {
    pub index: PartyIndex,
    pub signers: Vec<PartyIndex>,
    pub public_key: ProjectivePoint,
    pub r_point: ProjectivePoint,
    pub message: [u8; 32],
    pub partial: PartialSignature,
}

/// `s_i = m * k_i + r * sigma_i`
///
/// Takes the offline stage by value; `k_i` and `sigma_i` are zeroized when
/// it is dropped here, so it cannot sign a second message:
///
/// ```compile_fail
/// use gg20_core::sign::{stage8, CompletedOfflineStage, SignStage8Input};
///
/// fn sign_twice(offline: CompletedOfflineStage) {
///     let _ = stage8(SignStage8Input { offline, message: &[1u8; 32] });
///     let _ = stage8(SignStage8Input { offline, message: &[2u8; 32] });
/// }
/// ```
#[instrument(skip_all, fields(party = input.offline.index))]
pub fn stage8(input: SignStage8Input<'_>) -> Result<SignStage8Output> {
    let offline = input.offline;
    let m = curve::scalar_from_digest(input.message);
    let r = r_scalar(&offline.r_point)?;
    let partial = PartialSignature {
        index: offline.index,
        s_i: m * offline.sign_key.k_i + r * offline.sigma_i,
    };
    Ok(SignStage8Output {
        index: offline.index,
        signers: offline.signers.clone(),
        public_key: offline.public_key(),
        r_point: offline.r_point,
        message: *input.message,
        partial,
    })
}

pub struct SignStage9Input<'a> {
    pub stage8: &'a SignStage8Output,
    /// Partial signatures of every signer
    pub partials: &'a BTreeMap<PartyIndex, PartialSignature>,
}

/// Combine partial signatures, normalise to low-s and verify the result
#[instrument(skip_all, fields(party = input.stage8.index))]
pub fn stage9(input: &SignStage9Input<'_>) -> Result<Signature> {
    const STAGE: Stage = Stage::Sign(9);
    let online = input.stage8;
    require_from(input.partials, &online.signers, STAGE)?;
    for (j, partial) in input.partials {
        check_sender(partial.index, *j).map_err(|e| e.blame(STAGE, *j))?;
    }

    let r = r_scalar(&online.r_point)?;
    let mut s: Scalar = online
        .signers
        .iter()
        .map(|j| input.partials[j].s_i)
        .sum();
    if bool::from(s.is_zero()) {
        return Err(Error::InvalidSignature);
    }

    let mut recovery_id = u8::from(curve::y_is_odd(&online.r_point));
    if bool::from(s.is_high()) {
        s = -s;
        recovery_id ^= 1;
    }
    let x = BigNumber::from_slice(curve::x_coordinate(&online.r_point)?);
    if x >= curve::curve_order() {
        recovery_id |= 2;
    }

    let signature = Signature::new(r.to_bytes().into(), s.to_bytes().into(), recovery_id);
    signature.verify(&online.public_key, &online.message)?;
    Ok(signature)
}
