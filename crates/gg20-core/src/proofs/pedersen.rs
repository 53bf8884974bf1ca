//! Proof of knowledge of `(m, r)` opening `com = m * G + r * H`

use super::{ProofError, ProofKind, ZkProof};
use crate::primitives::{curve, transcript::TranscriptProtocol};
use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use merlin::Transcript;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PedersenProof {
    #[serde(with = "crate::serde_utils::point")]
    pub com: ProjectivePoint,
    #[serde(with = "crate::serde_utils::point")]
    pub a1: ProjectivePoint,
    #[serde(with = "crate::serde_utils::point")]
    pub a2: ProjectivePoint,
    #[serde(with = "crate::serde_utils::scalar")]
    pub z1: Scalar,
    #[serde(with = "crate::serde_utils::scalar")]
    pub z2: Scalar,
}

fn challenge(com: &ProjectivePoint, a1: &ProjectivePoint, a2: &ProjectivePoint) -> Scalar {
    let mut transcript = Transcript::new(b"gg20/pedersen");
    transcript.append_point(b"G", &ProjectivePoint::GENERATOR);
    transcript.append_point(b"H", &curve::second_generator());
    transcript.append_point(b"com", com);
    transcript.append_point(b"a1", a1);
    transcript.append_point(b"a2", a2);
    transcript.challenge_scalar(b"e")
}

impl PedersenProof {
    pub fn prove(m: &Scalar, r: &Scalar) -> Self {
        let h = curve::second_generator();
        let com = ProjectivePoint::GENERATOR * m + h * r;

        let s1 = Scalar::random(&mut OsRng);
        let s2 = Scalar::random(&mut OsRng);
        let a1 = ProjectivePoint::GENERATOR * s1;
        let a2 = h * s2;
        let e = challenge(&com, &a1, &a2);

        Self {
            com,
            a1,
            a2,
            z1: s1 + e * m,
            z2: s2 + e * r,
        }
    }
}

/// The statement is the commitment `T` the prover broadcast
impl ZkProof<ProjectivePoint> for PedersenProof {
    const KIND: ProofKind = ProofKind::Pedersen;

    fn verify(&self, com: &ProjectivePoint) -> Result<(), ProofError> {
        if &self.com != com {
            return Err(Self::reject("commitment mismatch"));
        }
        let e = challenge(&self.com, &self.a1, &self.a2);
        let lhs = ProjectivePoint::GENERATOR * self.z1 + curve::second_generator() * self.z2;
        let rhs = self.a1 + self.a2 + self.com * e;
        if lhs != rhs {
            return Err(Self::reject("verification equation"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_proof() {
        let m = Scalar::random(&mut OsRng);
        let r = Scalar::random(&mut OsRng);
        let proof = PedersenProof::prove(&m, &r);
        let t = ProjectivePoint::GENERATOR * m + curve::second_generator() * r;
        proof.verify(&t).unwrap();
    }

    #[test]
    fn test_tampered_proof() {
        let m = Scalar::random(&mut OsRng);
        let r = Scalar::random(&mut OsRng);
        let t = ProjectivePoint::GENERATOR * m + curve::second_generator() * r;

        let mut proof = PedersenProof::prove(&m, &r);
        proof.z2 += Scalar::ONE;
        assert!(proof.verify(&t).is_err());

        let proof = PedersenProof::prove(&m, &r);
        assert!(proof.verify(&(t + ProjectivePoint::GENERATOR)).is_err());
    }
}
