//! Range proofs for the MtA share conversion.
//!
//! [`AliceProof`]: the initiator's ciphertext `c = Enc(m; r)` hides `m < q^3`.
//! [`BobProof`]: the responder computed `c2 = c1^x * Enc(y; r)` with `x < q^3`,
//! `y < q^7`, and `X = x * G`. Both are checked against the verifier's
//! ring-Pedersen parameters.

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

/// Public data of an Alice proof
pub struct AliceStatement<'a> {
    pub ek: &'a EncryptionKey,
    pub ciphertext: &'a BigNumber,
    pub ring: &'a RingPedersenParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliceProof {
    #[serde(with = "crate::serde_utils::bignum")]
    pub z: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub u: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub w: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub s: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub s1: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub s2: BigNumber,
}

fn alice_challenge(statement: &AliceStatement<'_>, z: &BigNumber, u: &BigNumber, w: &BigNumber) -> BigNumber {
    let mut transcript = Transcript::new(b"gg20/alice-range");
    transcript.append_bignum(b"N", &statement.ek.n);
    transcript.append_bignum(b"c", statement.ciphertext);
    transcript.append_bignum(b"N~", &statement.ring.n_tilde);
    transcript.append_bignum(b"h1", &statement.ring.h1);
    transcript.append_bignum(b"h2", &statement.ring.h2);
    transcript.append_bignum(b"z", z);
    transcript.append_bignum(b"u", u);
    transcript.append_bignum(b"w", w);
    curve::scalar_to_bignum(&transcript.challenge_scalar(b"e"))
}

/// `(1 + N)^m * base^N mod N^2`
fn paillier_commit(ek: &EncryptionKey, m: &BigNumber, base: &BigNumber) -> BigNumber {
    let gm = (BigNumber::one() + m.nmod(&ek.n) * &ek.n).nmod(&ek.nn);
    gm.modmul(&base.modpow(&ek.n, &ek.nn), &ek.nn)
}

impl AliceProof {
    /// Prove that `ciphertext = Enc(m; r)` with `m < q`
    pub fn prove(
        m: &BigNumber,
        r: &BigNumber,
        statement: &AliceStatement<'_>,
    ) -> Result<Self> {
        let mut rng = OsRng;
        let q = curve_order();
        let q3 = order_pow(3);
        let n_tilde = &statement.ring.n_tilde;

        let alpha = bignum::sample_below(&q3, &mut rng);
        let beta = bignum::sample_unit(&statement.ek.n, &mut rng)?;
        let gamma = bignum::sample_below(&(&q3 * n_tilde), &mut rng);
        let rho = bignum::sample_below(&(&q * n_tilde), &mut rng);

        let z = statement.ring.commit(m, &rho);
        let u = paillier_commit(statement.ek, &alpha, &beta);
        let w = statement.ring.commit(&alpha, &gamma);

        let e = alice_challenge(statement, &z, &u, &w);

        let s = r.modpow(&e, &statement.ek.n).modmul(&beta, &statement.ek.n);
        let s1 = &e * m + alpha;
        let s2 = &e * &rho + gamma;

        Ok(Self { z, u, w, s, s1, s2 })
    }
}

impl<'a> ZkProof<AliceStatement<'a>> for AliceProof {
    const KIND: ProofKind = ProofKind::AliceRange;

    fn verify(&self, statement: &AliceStatement<'a>) -> std::result::Result<(), ProofError> {
        let ek = statement.ek;
        let ring = statement.ring;
        if self.s1 > order_pow(3) {
            return Err(Self::reject("s1 out of range"));
        }
        if !bignum::is_unit(&self.z, &ring.n_tilde)
            || !bignum::is_unit(&self.w, &ring.n_tilde)
            || !bignum::is_unit(&self.u, &ek.nn)
            || !bignum::is_unit(&self.s, &ek.n)
            || !bignum::is_unit(statement.ciphertext, &ek.nn)
        {
            return Err(Self::reject("value outside its group"));
        }

        let e = alice_challenge(statement, &self.z, &self.u, &self.w);

        // u == Gamma^s1 * s^N * c^-e mod N^2
        let c_inv_e = bignum::inverse_pow(statement.ciphertext, &e, &ek.nn)
            .map_err(|_| Self::reject("ciphertext not invertible"))?;
        let u = paillier_commit(ek, &self.s1, &self.s).modmul(&c_inv_e, &ek.nn);
        if u != self.u {
            return Err(Self::reject("Paillier equation"));
        }

        // w == h1^s1 * h2^s2 * z^-e mod N~
        let z_inv_e = bignum::inverse_pow(&self.z, &e, &ring.n_tilde)
            .map_err(|_| Self::reject("z not invertible"))?;
        let w = ring
            .commit(&self.s1, &self.s2)
            .modmul(&z_inv_e, &ring.n_tilde);
        if w != self.w {
            return Err(Self::reject("ring-Pedersen equation"));
        }
        Ok(())
    }
}

/// Public data of a Bob proof
pub struct BobStatement<'a> {
    /// Initiator's Paillier key
    pub ek: &'a EncryptionKey,
    /// Initiator's ciphertext
    pub c1: &'a BigNumber,
    /// Responder's ciphertext
    pub c2: &'a BigNumber,
    /// Verifier's ring-Pedersen parameters
    pub ring: &'a RingPedersenParams,
    /// `X = x * G`
    pub x_point: &'a ProjectivePoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BobProof {
    #[serde(with = "crate::serde_utils::bignum")]
    pub z: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub z_prim: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub t: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub v: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub w: BigNumber,
    #[serde(with = "crate::serde_utils::point")]
    pub u: ProjectivePoint,
    #[serde(with = "crate::serde_utils::bignum")]
    pub s: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub s1: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub s2: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub t1: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub t2: BigNumber,
}

#[allow(clippy::too_many_arguments)]
fn bob_challenge(
    statement: &BobStatement<'_>,
    z: &BigNumber,
    z_prim: &BigNumber,
    t: &BigNumber,
    v: &BigNumber,
    w: &BigNumber,
    u: &ProjectivePoint,
) -> BigNumber {
    let mut transcript = Transcript::new(b"gg20/bob-range");
    transcript.append_bignum(b"N", &statement.ek.n);
    transcript.append_bignum(b"c1", statement.c1);
    transcript.append_bignum(b"c2", statement.c2);
    transcript.append_bignum(b"N~", &statement.ring.n_tilde);
    transcript.append_bignum(b"h1", &statement.ring.h1);
    transcript.append_bignum(b"h2", &statement.ring.h2);
    transcript.append_point(b"X", statement.x_point);
    transcript.append_bignum(b"z", z);
    transcript.append_bignum(b"z'", z_prim);
    transcript.append_bignum(b"t", t);
    transcript.append_bignum(b"v", v);
    transcript.append_bignum(b"w", w);
    transcript.append_point(b"u", u);
    curve::scalar_to_bignum(&transcript.challenge_scalar(b"e"))
}

impl BobProof {
    /// Prove that `c2 = c1^x * Enc(y; r)` with `X = x * G`
    pub fn prove(
        x: &BigNumber,
        y: &BigNumber,
        r: &BigNumber,
        statement: &BobStatement<'_>,
    ) -> Result<Self> {
        let mut rng = OsRng;
        let ek = statement.ek;
        let ring = statement.ring;
        let q = curve_order();
        let q3 = order_pow(3);
        let q7 = order_pow(7);
        let q_n_tilde = &q * &ring.n_tilde;
        let q3_n_tilde = &q3 * &ring.n_tilde;

        let alpha = bignum::sample_below(&q3, &mut rng);
        let rho = bignum::sample_below(&q_n_tilde, &mut rng);
        let rho_prim = bignum::sample_below(&q3_n_tilde, &mut rng);
        let sigma = bignum::sample_below(&q_n_tilde, &mut rng);
        let tau = bignum::sample_below(&q3_n_tilde, &mut rng);
        let beta = bignum::sample_unit(&ek.n, &mut rng)?;
        let gamma = bignum::sample_below(&q7, &mut rng);

        let u = ProjectivePoint::GENERATOR * curve::bignum_to_scalar(&alpha);
        let z = ring.commit(x, &rho);
        let z_prim = ring.commit(&alpha, &rho_prim);
        let t = ring.commit(y, &sigma);
        let w = ring.commit(&gamma, &tau);
        // v = c1^alpha * Gamma^gamma * beta^N mod N^2
        let v = statement
            .c1
            .modpow(&alpha, &ek.nn)
            .modmul(&paillier_commit(ek, &gamma, &beta), &ek.nn);

        let e = bob_challenge(statement, &z, &z_prim, &t, &v, &w, &u);

        let s = r.modpow(&e, &ek.n).modmul(&beta, &ek.n);
        let s1 = &e * x + alpha;
        let s2 = &e * &rho + rho_prim;
        let t1 = &e * y + gamma;
        let t2 = &e * &sigma + tau;

        Ok(Self {
            z,
            z_prim,
            t,
            v,
            w,
            u,
            s,
            s1,
            s2,
            t1,
            t2,
        })
    }
}

impl<'a> ZkProof<BobStatement<'a>> for BobProof {
    const KIND: ProofKind = ProofKind::BobRange;

    fn verify(&self, statement: &BobStatement<'a>) -> std::result::Result<(), ProofError> {
        let ek = statement.ek;
        let ring = statement.ring;
        if self.s1 > order_pow(3) {
            return Err(Self::reject("s1 out of range"));
        }
        if self.t1 > order_pow(7) {
            return Err(Self::reject("t1 out of range"));
        }
        for value in [&self.z, &self.z_prim, &self.t, &self.w] {
            if !bignum::is_unit(value, &ring.n_tilde) {
                return Err(Self::reject("value outside Z*_N~"));
            }
        }
        if !bignum::is_unit(&self.v, &ek.nn)
            || !bignum::is_unit(&self.s, &ek.n)
            || !bignum::is_unit(statement.c1, &ek.nn)
            || !bignum::is_unit(statement.c2, &ek.nn)
        {
            return Err(Self::reject("value outside its Paillier group"));
        }

        let e = bob_challenge(
            statement,
            &self.z,
            &self.z_prim,
            &self.t,
            &self.v,
            &self.w,
            &self.u,
        );
        let e_scalar = curve::bignum_to_scalar(&e);

        // s1 * G == e * X + u
        let lhs = ProjectivePoint::GENERATOR * curve::bignum_to_scalar(&self.s1);
        if lhs != *statement.x_point * e_scalar + self.u {
            return Err(Self::reject("curve equation"));
        }

        // h1^s1 * h2^s2 == z^e * z'
        let lhs = ring.commit(&self.s1, &self.s2);
        let rhs = self
            .z
            .modpow(&e, &ring.n_tilde)
            .modmul(&self.z_prim, &ring.n_tilde);
        if lhs != rhs {
            return Err(Self::reject("z equation"));
        }

        // h1^t1 * h2^t2 == t^e * w
        let lhs = ring.commit(&self.t1, &self.t2);
        let rhs = self
            .t
            .modpow(&e, &ring.n_tilde)
            .modmul(&self.w, &ring.n_tilde);
        if lhs != rhs {
            return Err(Self::reject("t equation"));
        }

        // c1^s1 * s^N * Gamma^t1 == c2^e * v
        let lhs = statement
            .c1
            .modpow(&self.s1, &ek.nn)
            .modmul(&paillier_commit(ek, &self.t1, &self.s), &ek.nn);
        let rhs = statement.c2.modpow(&e, &ek.nn).modmul(&self.v, &ek.nn);
        if lhs != rhs {
            return Err(Self::reject("Paillier equation"));
        }
        Ok(())
    }
}
