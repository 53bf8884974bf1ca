//! Proof that `Q = x * G` for the `x` encrypted in a Paillier ciphertext,
//! with slack on the range of `x`.
//!
//! Signing stage 5 uses it with `G = R`, `Q = R_dash_i` and the ciphertext of
//! `k_i` broadcast in stage 1, one proof per verifier's ring-Pedersen parameters.

use super::{ProofError, ProofKind, ZkProof};
use crate::primitives::{
    bignum::{self, order_pow},
    curve::{self, curve_order},
    paillier::EncryptionKey,
    ring_pedersen::RingPedersenParams,
    transcript::TranscriptProtocol,
};
use crate::Result;
use k256::ProjectivePoint;
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

pub struct PdlWithSlackStatement<'a> {
    pub ciphertext: &'a BigNumber,
    pub ek: &'a EncryptionKey,
    pub q_point: &'a ProjectivePoint,
    pub g_point: &'a ProjectivePoint,
    pub ring: &'a RingPedersenParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdlWithSlackProof {
    #[serde(with = "crate::serde_utils::bignum")]
    pub z: BigNumber,
    #[serde(with = "crate::serde_utils::point")]
    pub u1: ProjectivePoint,
    #[serde(with = "crate::serde_utils::bignum")]
    pub u2: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub u3: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub s1: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub s2: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub s3: BigNumber,
}

fn challenge(
    statement: &PdlWithSlackStatement<'_>,
    z: &BigNumber,
    u1: &ProjectivePoint,
    u2: &BigNumber,
    u3: &BigNumber,
) -> BigNumber {
    let mut transcript = Transcript::new(b"gg20/pdl-with-slack");
    transcript.append_point(b"G", statement.g_point);
    transcript.append_point(b"Q", statement.q_point);
    transcript.append_bignum(b"c", statement.ciphertext);
    transcript.append_bignum(b"N", &statement.ek.n);
    transcript.append_bignum(b"N~", &statement.ring.n_tilde);
    transcript.append_bignum(b"z", z);
    transcript.append_point(b"u1", u1);
    transcript.append_bignum(b"u2", u2);
    transcript.append_bignum(b"u3", u3);
    curve::scalar_to_bignum(&transcript.challenge_scalar(b"e"))
}

fn gamma_pow(ek: &EncryptionKey, exp: &BigNumber) -> BigNumber {
    (BigNumber::one() + exp.nmod(&ek.n) * &ek.n).nmod(&ek.nn)
}

impl PdlWithSlackProof {
    /// Witness: `x` and the randomness `r` of `ciphertext = Enc(x; r)`
    pub fn prove(
        x: &BigNumber,
        r: &BigNumber,
        statement: &PdlWithSlackStatement<'_>,
    ) -> Result<Self> {
        let mut rng = OsRng;
        let ek = statement.ek;
        let ring = statement.ring;
        let q = curve_order();
        let q3 = order_pow(3);

        let alpha = bignum::sample_below(&q3, &mut rng);
        let beta = bignum::sample_unit(&ek.n, &mut rng)?;
        let rho = bignum::sample_below(&(&q * &ring.n_tilde), &mut rng);
        let gamma = bignum::sample_below(&(&q3 * &ring.n_tilde), &mut rng);

        let z = ring.commit(x, &rho);
        let u1 = *statement.g_point * curve::bignum_to_scalar(&alpha);
        let u2 = gamma_pow(ek, &alpha).modmul(&beta.modpow(&ek.n, &ek.nn), &ek.nn);
        let u3 = ring.commit(&alpha, &gamma);

        let e = challenge(statement, &z, &u1, &u2, &u3);

        let s1 = &e * x + alpha;
        let s2 = r.modpow(&e, &ek.n).modmul(&beta, &ek.n);
        let s3 = &e * &rho + gamma;

        Ok(Self {
            z,
            u1,
            u2,
            u3,
            s1,
            s2,
            s3,
        })
    }
}

impl<'a> ZkProof<PdlWithSlackStatement<'a>> for PdlWithSlackProof {
    const KIND: ProofKind = ProofKind::PdlWithSlack;

    fn verify(&self, statement: &PdlWithSlackStatement<'a>) -> std::result::Result<(), ProofError> {
        let ek = statement.ek;
        let ring = statement.ring;
        if !bignum::is_unit(&self.z, &ring.n_tilde)
            || !bignum::is_unit(&self.u3, &ring.n_tilde)
            || !bignum::is_unit(&self.u2, &ek.nn)
            || !bignum::is_unit(&self.s2, &ek.n)
            || !bignum::is_unit(statement.ciphertext, &ek.nn)
        {
            return Err(Self::reject("value outside its group"));
        }

        let e = challenge(statement, &self.z, &self.u1, &self.u2, &self.u3);
        let e_scalar = curve::bignum_to_scalar(&e);

        // u1 == s1 * G - e * Q
        let u1 = *statement.g_point * curve::bignum_to_scalar(&self.s1)
            - *statement.q_point * e_scalar;
        if u1 != self.u1 {
            return Err(Self::reject("curve equation"));
        }

        // u2 == Gamma^s1 * s2^N * c^-e mod N^2
        let c_inv_e = bignum::inverse_pow(statement.ciphertext, &e, &ek.nn)
            .map_err(|_| Self::reject("ciphertext not invertible"))?;
        let u2 = gamma_pow(ek, &self.s1)
            .modmul(&self.s2.modpow(&ek.n, &ek.nn), &ek.nn)
            .modmul(&c_inv_e, &ek.nn);
        if u2 != self.u2 {
            return Err(Self::reject("Paillier equation"));
        }

        // u3 == h1^s1 * h2^s3 * z^-e mod N~
        let z_inv_e = bignum::inverse_pow(&self.z, &e, &ring.n_tilde)
            .map_err(|_| Self::reject("z not invertible"))?;
        let u3 = ring
            .commit(&self.s1, &self.s3)
            .modmul(&z_inv_e, &ring.n_tilde);
        if u3 != self.u3 {
            return Err(Self::reject("ring-Pedersen equation"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::paillier::DecryptionKey;
    use k256::{elliptic_curve::Field, Scalar};

    #[test]
    fn test_pdl_with_slack() {
        let (ek, _) = DecryptionKey::generate(2048, false).unwrap();
        let (ring, _) = RingPedersenParams::generate(2048, false, &mut OsRng).unwrap();

        let k = Scalar::random(&mut OsRng);
        let x = curve::scalar_to_bignum(&k);
        let (c, r) = ek.encrypt(&x, &mut OsRng).unwrap();
        let g_point = ProjectivePoint::GENERATOR * Scalar::random(&mut OsRng);
        let q_point = g_point * k;

        let statement = PdlWithSlackStatement {
            ciphertext: &c,
            ek: &ek,
            q_point: &q_point,
            g_point: &g_point,
            ring: &ring,
        };
        let proof = PdlWithSlackProof::prove(&x, &r, &statement).unwrap();
        proof.verify(&statement).unwrap();

        let wrong_q = q_point + ProjectivePoint::GENERATOR;
        let wrong = PdlWithSlackStatement {
            q_point: &wrong_q,
            ..statement
        };
        assert_eq!(
            proof.verify(&wrong).unwrap_err().kind,
            ProofKind::PdlWithSlack
        );

        let mut tampered = proof.clone();
        tampered.s3 = &tampered.s3 + &BigNumber::one();
        assert!(tampered.verify(&statement).is_err());
    }
}
