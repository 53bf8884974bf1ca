//! Multiplicative-to-additive share conversion (MtA / MtAwc).
//!
//! Alice holds `a`, Bob holds `b`. Alice sends `Enc_A(a)` with an Alice range
//! proof for every verifier; Bob answers with `c_B = c_A^b * Enc_A(beta')`
//! and a Bob range proof. Alice decrypts `alpha = a*b + beta'`, Bob keeps
//! `beta = -beta'`, so `alpha + beta = a*b mod q`.
//!
//! The "with check" variant is the same exchange: the `b_proof` inside
//! [`MessageB`] exposes `B = b*G`, which the caller compares to the public
//! value it expects (`g_w_j` for MtAwc).

use crate::error::{Error, Result};
use crate::primitives::{
    bignum::{self, order_pow},
    curve, DecryptionKey, EncryptionKey, RingPedersenParams,
};
use crate::proofs::{
    AliceProof, AliceStatement, BobProof, BobStatement, DLogProof, ProofError, ProofKind, ZkProof,
};
use crate::types::PartyIndex;
use k256::{ProjectivePoint, Scalar};
use libpaillier::unknown_order::BigNumber;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Alice's message: `Enc(a)` plus one range proof per verifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageA {
    #[serde(with = "crate::serde_utils::bignum")]
    pub c: BigNumber,
    pub range_proofs: BTreeMap<PartyIndex, AliceProof>,
}

/// Bob's answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageB {
    #[serde(with = "crate::serde_utils::bignum")]
    pub c: BigNumber,
    /// Proof of knowledge of `b`; `b_proof.pk = b*G`
    pub b_proof: DLogProof,
    /// Proof of knowledge of `beta' mod q`
    pub beta_tag_proof: DLogProof,
    pub range_proof: BobProof,
}

impl MessageA {
    /// Encrypt `a` under Alice's key and prove its range to every verifier.
    ///
    /// Returns the message and the Paillier randomness, which Alice keeps for
    /// the PDL-with-slack proof of signing stage 5.
    pub fn a<'a, I>(a: &Scalar, alice_ek: &EncryptionKey, verifiers: I) -> Result<(Self, BigNumber)>
    where
        I: IntoIterator<Item = (PartyIndex, &'a RingPedersenParams)>,
    {
        let m = curve::scalar_to_bignum(a);
        let (c, randomness) = alice_ek.encrypt(&m, &mut OsRng)?;

        let range_proofs = verifiers
            .into_iter()
            .map(|(j, ring)| {
                let statement = AliceStatement {
                    ek: alice_ek,
                    ciphertext: &c,
                    ring,
                };
                AliceProof::prove(&m, &randomness, &statement).map(|proof| (j, proof))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;

        Ok((Self { c, range_proofs }, randomness))
    }

    /// Check the range proof addressed to `verifier`
    pub fn verify_for(
        &self,
        alice_ek: &EncryptionKey,
        verifier: PartyIndex,
        verifier_ring: &RingPedersenParams,
    ) -> Result<()> {
        let proof = self
            .range_proofs
            .get(&verifier)
            .ok_or_else(|| ProofError::new(ProofKind::AliceRange, "no proof for this verifier"))?;
        proof.verify(&AliceStatement {
            ek: alice_ek,
            ciphertext: &self.c,
            ring: verifier_ring,
        })?;
        Ok(())
    }
}

impl MessageB {
    /// Bob's side. Verifies Alice's proof addressed to `bob_index` first.
    ///
    /// Returns the answer and Bob's additive share `beta`.
    pub fn b(
        b: &Scalar,
        alice_ek: &EncryptionKey,
        m_a: &MessageA,
        alice_ring: &RingPedersenParams,
        bob_index: PartyIndex,
        bob_ring: &RingPedersenParams,
    ) -> Result<(Self, Scalar)> {
        m_a.verify_for(alice_ek, bob_index, bob_ring)?;

        let beta_tag = bignum::sample_below(&order_pow(5), &mut OsRng);
        let (enc_beta_tag, randomness) = alice_ek.encrypt(&beta_tag, &mut OsRng)?;
        let b_bn = curve::scalar_to_bignum(b);
        let c = alice_ek.add(&alice_ek.mul(&m_a.c, &b_bn)?, &enc_beta_tag)?;

        let beta_tag_scalar = curve::bignum_to_scalar(&beta_tag);
        let b_proof = DLogProof::prove(b);
        let beta_tag_proof = DLogProof::prove(&beta_tag_scalar);

        let range_proof = BobProof::prove(
            &b_bn,
            &beta_tag,
            &randomness,
            &BobStatement {
                ek: alice_ek,
                c1: &m_a.c,
                c2: &c,
                ring: alice_ring,
                x_point: &b_proof.pk,
            },
        )?;

        Ok((
            Self {
                c,
                b_proof,
                beta_tag_proof,
                range_proof,
            },
            -beta_tag_scalar,
        ))
    }

    /// Alice's side: check Bob's proofs and decrypt `alpha`.
    ///
    /// `c_a` is the ciphertext Alice sent, `a` its plaintext.
    pub fn verify_proofs_get_alpha(
        &self,
        dk: &DecryptionKey,
        a: &Scalar,
        c_a: &BigNumber,
        alice_ring: &RingPedersenParams,
    ) -> Result<Scalar> {
        let ek = dk.encryption_key();
        self.range_proof.verify(&BobStatement {
            ek: &ek,
            c1: c_a,
            c2: &self.c,
            ring: alice_ring,
            x_point: &self.b_proof.pk,
        })?;
        self.b_proof.verify(&self.b_proof.pk)?;
        self.beta_tag_proof.verify(&self.beta_tag_proof.pk)?;

        let alpha = curve::bignum_to_scalar(&dk.decrypt(&self.c)?);

        // alpha*G == a*B + B'
        if ProjectivePoint::GENERATOR * alpha != self.b_proof.pk * a + self.beta_tag_proof.pk {
            return Err(Error::Arithmetic("MtA share inconsistent with b*G".into()));
        }
        Ok(alpha)
    }

    /// `B = b*G` as proven by Bob
    pub fn b_point(&self) -> &ProjectivePoint {
        &self.b_proof.pk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::dkg_fixture;
    use k256::elliptic_curve::Field;

    fn rings(alice: PartyIndex, bob: PartyIndex) -> (&'static RingPedersenParams, &'static RingPedersenParams) {
        let key = &dkg_fixture()[0];
        (
            &key.h1_h2_n_tilde_vec[&alice],
            &key.h1_h2_n_tilde_vec[&bob],
        )
    }

    #[test]
    fn test_mta_shares_add_up() {
        let alice = &dkg_fixture()[0];
        let (alice_ring, bob_ring) = rings(1, 2);
        let alice_ek = alice.paillier_dk.encryption_key();

        let a = Scalar::random(&mut OsRng);
        let b = Scalar::random(&mut OsRng);

        let (m_a, _) = MessageA::a(&a, &alice_ek, [(2, bob_ring)]).unwrap();
        let (m_b, beta) = MessageB::b(&b, &alice_ek, &m_a, alice_ring, 2, bob_ring).unwrap();
        let alpha = m_b
            .verify_proofs_get_alpha(&alice.paillier_dk, &a, &m_a.c, alice_ring)
            .unwrap();

        assert_eq!(alpha + beta, a * b);
        assert_eq!(*m_b.b_point(), ProjectivePoint::GENERATOR * b);
    }

    #[test]
    fn test_bob_rejects_proof_for_other_verifier() {
        let alice = &dkg_fixture()[0];
        let (alice_ring, _) = rings(1, 2);
        let (_, party3_ring) = rings(1, 3);
        let alice_ek = alice.paillier_dk.encryption_key();

        let a = Scalar::random(&mut OsRng);
        // proof addressed to party 3 only
        let (m_a, _) = MessageA::a(&a, &alice_ek, [(3, party3_ring)]).unwrap();
        let err = MessageB::b(&Scalar::ONE, &alice_ek, &m_a, alice_ring, 2, rings(1, 2).1)
            .unwrap_err();
        assert!(matches!(err, Error::Proof(ref e) if e.kind == ProofKind::AliceRange));
    }

    #[test]
    fn test_alice_rejects_tampered_answer() {
        let alice = &dkg_fixture()[0];
        let (alice_ring, bob_ring) = rings(1, 2);
        let alice_ek = alice.paillier_dk.encryption_key();

        let a = Scalar::random(&mut OsRng);
        let b = Scalar::random(&mut OsRng);
        let (m_a, _) = MessageA::a(&a, &alice_ek, [(2, bob_ring)]).unwrap();
        let (mut m_b, _) = MessageB::b(&b, &alice_ek, &m_a, alice_ring, 2, bob_ring).unwrap();

        // claim a different b
        m_b.b_proof = DLogProof::prove(&(b + Scalar::ONE));
        let err = m_b
            .verify_proofs_get_alpha(&alice.paillier_dk, &a, &m_a.c, alice_ring)
            .unwrap_err();
        assert!(matches!(err, Error::Proof(ref e) if e.kind == ProofKind::BobRange));
    }
}
