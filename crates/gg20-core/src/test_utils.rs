//! Shared fixtures for unit tests. DKG with 2048-bit Paillier keys is slow, so
//! one 2-of-4 run is computed per test binary and reused, along with the
//! messages of one offline signing run over it. Offline stages are single use,
//! so tests that sign run their own with [`simulate_offline`].

use crate::keygen::{
    stage1, stage2, stage3, stage4, KeyGenBroadcastMessage1, KeygenConfig, KeygenStage1Input,
    KeygenStage1Output, KeygenStage2Input, KeygenStage2Output, KeygenStage3Input,
    KeygenStage3Output, KeygenStage4Input, LocalKey,
};
use crate::primitives::{Decommitment, VerifiableSS};
use crate::proofs::DLogProof;
use crate::sign::{
    stage1 as sign_stage1, stage2 as sign_stage2, stage3 as sign_stage3, stage4 as sign_stage4,
    stage5 as sign_stage5, stage6 as sign_stage6, stage7 as sign_stage7, stage8 as sign_stage8,
    CompletedOfflineStage, PartialSignature, SignRound1Message, SignRound2Message, SignRound3Message,
    SignRound4Message, SignRound5Message, SignRound6Message, SignStage1Input, SignStage1Output,
    SignStage2Input, SignStage2Output, SignStage3Input, SignStage3Output, SignStage4Input,
    SignStage4Output, SignStage5Input, SignStage5Output, SignStage6Input, SignStage6Output,
    SignStage7Input, SignStage8Input, SignStage8Output,
};
use crate::types::{Parameters, PartyIndex};
use crate::{Error, Result};
use k256::{ProjectivePoint, Scalar};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Route `tracing` output of a test through the test harness (`RUST_LOG`)
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub(crate) const FIXTURE_THRESHOLD: u16 = 2;
pub(crate) const FIXTURE_SHARE_COUNT: u16 = 4;

/// Every intermediate value of an in-process DKG run
pub(crate) struct DkgTranscript {
    pub params: Parameters,
    pub stage1: BTreeMap<PartyIndex, KeygenStage1Output>,
    pub bc1s: BTreeMap<PartyIndex, KeyGenBroadcastMessage1>,
    pub decom1s: BTreeMap<PartyIndex, Decommitment>,
    pub stage2: BTreeMap<PartyIndex, KeygenStage2Output>,
    pub ys: BTreeMap<PartyIndex, ProjectivePoint>,
    pub vss_schemes: BTreeMap<PartyIndex, VerifiableSS>,
    pub stage3: BTreeMap<PartyIndex, KeygenStage3Output>,
    pub dlog_proofs: BTreeMap<PartyIndex, DLogProof>,
    pub keys: Vec<LocalKey>,
}

impl DkgTranscript {
    /// Shares party `i` receives in round 3
    pub fn shares_for(&self, i: PartyIndex) -> BTreeMap<PartyIndex, Scalar> {
        self.stage2
            .iter()
            .map(|(j, out)| (*j, out.secret_shares[&i]))
            .collect()
    }
}

/// Run all four DKG stages for every party in-process
pub(crate) fn simulate_keygen(threshold: u16, share_count: u16) -> Result<DkgTranscript> {
    let params = Parameters::new(threshold, share_count)?;
    let config = KeygenConfig::default();

    let mut stage1_out = BTreeMap::new();
    for i in 1..=share_count {
        stage1_out.insert(i, stage1(&KeygenStage1Input { index: i, config })?);
    }
    let bc1s: BTreeMap<_, _> = stage1_out.iter().map(|(j, o)| (*j, o.bc1.clone())).collect();
    let decom1s: BTreeMap<_, _> = stage1_out
        .iter()
        .map(|(j, o)| (*j, o.decom1.clone()))
        .collect();

    let mut stage2_out = BTreeMap::new();
    for (i, out1) in &stage1_out {
        let out2 = stage2(&KeygenStage2Input {
            key: &out1.key,
            params,
            bc1s: &bc1s,
            decom1s: &decom1s,
        })?;
        stage2_out.insert(*i, out2);
    }
    let ys: BTreeMap<_, _> = decom1s.iter().map(|(j, d)| (*j, d.point)).collect();
    let vss_schemes: BTreeMap<_, _> = stage2_out
        .iter()
        .map(|(j, o)| (*j, o.vss_scheme.clone()))
        .collect();

    let mut transcript = DkgTranscript {
        params,
        stage1: stage1_out,
        bc1s,
        decom1s,
        stage2: stage2_out,
        ys,
        vss_schemes,
        stage3: BTreeMap::new(),
        dlog_proofs: BTreeMap::new(),
        keys: Vec::new(),
    };

    for i in 1..=share_count {
        let party_shares = transcript.shares_for(i);
        let out3 = stage3(&KeygenStage3Input {
            key: &transcript.stage1[&i].key,
            params,
            ys: &transcript.ys,
            vss_schemes: &transcript.vss_schemes,
            party_shares: &party_shares,
        })?;
        transcript.stage3.insert(i, out3);
    }
    transcript.dlog_proofs = transcript
        .stage3
        .iter()
        .map(|(j, o)| (*j, o.dlog_proof.clone()))
        .collect();

    for i in 1..=share_count {
        let out4 = stage4(&KeygenStage4Input {
            params,
            ys: &transcript.ys,
            vss_schemes: &transcript.vss_schemes,
            dlog_proofs: &transcript.dlog_proofs,
        })?;
        let key = LocalKey::new(
            &transcript.stage1[&i].key,
            &transcript.bc1s,
            transcript.stage3[&i].shared_key.clone(),
            out4,
            &params,
        );
        transcript.keys.push(key);
    }

    Ok(transcript)
}

/// 2-of-4 DKG run shared by every test in the crate
pub(crate) fn dkg_transcript() -> &'static DkgTranscript {
    static TRANSCRIPT: OnceLock<DkgTranscript> = OnceLock::new();
    TRANSCRIPT.get_or_init(|| {
        simulate_keygen(FIXTURE_THRESHOLD, FIXTURE_SHARE_COUNT).expect("fixture DKG")
    })
}

/// Local keys of parties 1..=4; `dkg_fixture()[i - 1]` belongs to party `i`
pub(crate) fn dkg_fixture() -> &'static [LocalKey] {
    &dkg_transcript().keys
}

/// Signing set of [`signing_transcript`]
pub(crate) const FIXTURE_SIGNERS: [PartyIndex; 3] = [1, 2, 3];

/// Every intermediate value of signing stages 1-6 run in-process
pub(crate) struct SigningTranscript {
    pub signers: Vec<PartyIndex>,
    pub stage1: BTreeMap<PartyIndex, SignStage1Output>,
    pub round1: BTreeMap<PartyIndex, SignRound1Message>,
    pub stage2: BTreeMap<PartyIndex, SignStage2Output>,
    /// Round 2 inbox of each recipient, keyed by sender
    pub round2: BTreeMap<PartyIndex, BTreeMap<PartyIndex, SignRound2Message>>,
    pub stage3: BTreeMap<PartyIndex, SignStage3Output>,
    pub round3: BTreeMap<PartyIndex, SignRound3Message>,
    pub stage4: BTreeMap<PartyIndex, SignStage4Output>,
    pub round4: BTreeMap<PartyIndex, SignRound4Message>,
    pub stage5: BTreeMap<PartyIndex, SignStage5Output>,
    pub round5: BTreeMap<PartyIndex, SignRound5Message>,
    pub stage6: BTreeMap<PartyIndex, SignStage6Output>,
    pub round6: BTreeMap<PartyIndex, SignRound6Message>,
}

/// Run signing stages 1-6 for every signer in-process. `keys[i - 1]` belongs
/// to party `i`.
pub(crate) fn simulate_signing_rounds(
    keys: &[LocalKey],
    signers: &[PartyIndex],
) -> Result<SigningTranscript> {
    let signers = signers.to_vec();
    let local_key = move |i: PartyIndex| &keys[usize::from(i) - 1];

    let mut stage1 = BTreeMap::new();
    for &i in &signers {
        let out = sign_stage1(&SignStage1Input {
            local_key: local_key(i),
            signers: &signers,
        })?;
        stage1.insert(i, out);
    }
    let round1: BTreeMap<_, _> = stage1
        .iter()
        .map(|(i, o)| (*i, o.message.clone()))
        .collect();

    let mut stage2 = BTreeMap::new();
    for &i in &signers {
        let out = sign_stage2(&SignStage2Input {
            local_key: local_key(i),
            signers: &signers,
            sign_key: &stage1[&i].sign_key,
            round1: &round1,
        })?;
        stage2.insert(i, out);
    }
    let mut round2: BTreeMap<PartyIndex, BTreeMap<PartyIndex, SignRound2Message>> =
        BTreeMap::new();
    for (from, out) in &stage2 {
        for (to, msg) in &out.messages {
            round2.entry(*to).or_default().insert(*from, msg.clone());
        }
    }

    let mut stage3 = BTreeMap::new();
    for &i in &signers {
        let out = sign_stage3(&SignStage3Input {
            local_key: local_key(i),
            signers: &signers,
            stage1: &stage1[&i],
            stage2: &stage2[&i],
            round2: &round2[&i],
        })?;
        stage3.insert(i, out);
    }
    let round3: BTreeMap<_, _> = stage3
        .iter()
        .map(|(i, o)| (*i, o.message.clone()))
        .collect();

    let mut stage4 = BTreeMap::new();
    for &i in &signers {
        let out = sign_stage4(&SignStage4Input {
            index: i,
            signers: &signers,
            round3: &round3,
        })?;
        stage4.insert(i, out);
    }
    let round4: BTreeMap<_, _> = stage1
        .iter()
        .map(|(i, o)| {
            let msg = SignRound4Message {
                index: *i,
                decom1: o.decom1.clone(),
            };
            (*i, msg)
        })
        .collect();

    let mut stage5 = BTreeMap::new();
    for &i in &signers {
        let out = sign_stage5(&SignStage5Input {
            local_key: local_key(i),
            signers: &signers,
            stage1: &stage1[&i],
            delta_inv: stage4[&i].delta_inv,
            round1: &round1,
            round2: &round2[&i],
            round4: &round4,
        })?;
        stage5.insert(i, out);
    }
    let round5: BTreeMap<_, _> = stage5
        .iter()
        .map(|(i, o)| (*i, o.message.clone()))
        .collect();

    let mut stage6 = BTreeMap::new();
    for &i in &signers {
        let out = sign_stage6(&SignStage6Input {
            local_key: local_key(i),
            signers: &signers,
            stage3: &stage3[&i],
            stage5: &stage5[&i],
            round1: &round1,
            round5: &round5,
        })?;
        stage6.insert(i, out);
    }
    let round6: BTreeMap<_, _> = stage6
        .iter()
        .map(|(i, o)| (*i, o.message.clone()))
        .collect();

    Ok(SigningTranscript {
        signers,
        stage1,
        round1,
        stage2,
        round2,
        stage3,
        round3,
        stage4,
        round4,
        stage5,
        round5,
        stage6,
        round6,
    })
}

/// Run stage 7 for every signer, spending the stage-1 secrets of `transcript`
pub(crate) fn complete_offline(
    keys: &[LocalKey],
    transcript: SigningTranscript,
) -> Result<BTreeMap<PartyIndex, CompletedOfflineStage>> {
    let SigningTranscript {
        signers,
        mut stage1,
        stage3,
        round3,
        stage5,
        stage6,
        round6,
        ..
    } = transcript;

    let mut offline = BTreeMap::new();
    for &i in &signers {
        let sign_key = stage1
            .remove(&i)
            .ok_or_else(|| Error::Internal(format!("no stage 1 output for {}", i)))?
            .sign_key;
        let out = sign_stage7(SignStage7Input {
            local_key: &keys[usize::from(i) - 1],
            signers: &signers,
            sign_key,
            stage3: &stage3[&i],
            stage5: &stage5[&i],
            stage6: &stage6[&i],
            round3: &round3,
            round6: &round6,
        })?;
        offline.insert(i, out);
    }
    Ok(offline)
}

/// Fresh offline stages of `signers`
pub(crate) fn simulate_offline(
    keys: &[LocalKey],
    signers: &[PartyIndex],
) -> Result<BTreeMap<PartyIndex, CompletedOfflineStage>> {
    complete_offline(keys, simulate_signing_rounds(keys, signers)?)
}

/// Spend every offline stage on `message`
pub(crate) fn sign_offline(
    offline: BTreeMap<PartyIndex, CompletedOfflineStage>,
    message: &[u8; 32],
) -> Result<BTreeMap<PartyIndex, SignStage8Output>> {
    offline
        .into_iter()
        .map(|(i, offline)| Ok((i, sign_stage8(SignStage8Input { offline, message })?)))
        .collect()
}

/// Partial signatures of stage-8 outputs, keyed by signer
pub(crate) fn partials_of(
    outputs: &BTreeMap<PartyIndex, SignStage8Output>,
) -> BTreeMap<PartyIndex, PartialSignature> {
    outputs
        .iter()
        .map(|(i, out)| (*i, out.partial.clone()))
        .collect()
}

/// Stages 1-6 of parties 1, 2 and 3, shared by the tamper tests
pub(crate) fn signing_transcript() -> &'static SigningTranscript {
    static TRANSCRIPT: OnceLock<SigningTranscript> = OnceLock::new();
    TRANSCRIPT.get_or_init(|| {
        simulate_signing_rounds(dkg_fixture(), &FIXTURE_SIGNERS).expect("fixture signing")
    })
}
