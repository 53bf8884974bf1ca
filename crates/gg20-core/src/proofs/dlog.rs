//! Schnorr proof of knowledge of `x` such that `pk = x * G`

use super::{ProofError, ProofKind, ZkProof};
use crate::primitives::transcript::TranscriptProtocol;
use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use merlin::Transcript;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DLogProof {
    /// Public key the proof is about
    #[serde(with = "crate::serde_utils::point")]
    pub pk: ProjectivePoint,
    #[serde(with = "crate::serde_utils::point")]
    pub commitment: ProjectivePoint,
    #[serde(with = "crate::serde_utils::scalar")]
    pub response: Scalar,
}

fn challenge(pk: &ProjectivePoint, commitment: &ProjectivePoint) -> Scalar {
    let mut transcript = Transcript::new(b"gg20/schnorr");
    transcript.append_point(b"pk", pk);
    transcript.append_point(b"commitment", commitment);
    transcript.challenge_scalar(b"e")
}

impl DLogProof {
    pub fn prove(x: &Scalar) -> Self {
        let pk = ProjectivePoint::GENERATOR * x;
        let r = Scalar::random(&mut OsRng);
        let commitment = ProjectivePoint::GENERATOR * r;
        let e = challenge(&pk, &commitment);
        Self {
            pk,
            commitment,
            response: r - e * x,
        }
    }
}

/// The statement is the public key the verifier expects
impl ZkProof<ProjectivePoint> for DLogProof {
    const KIND: ProofKind = ProofKind::Schnorr;

    fn verify(&self, pk: &ProjectivePoint) -> Result<(), ProofError> {
        if &self.pk != pk {
            return Err(Self::reject("public key mismatch"));
        }
        let e = challenge(&self.pk, &self.commitment);
        if ProjectivePoint::GENERATOR * self.response + self.pk * e != self.commitment {
            return Err(Self::reject("verification equation"));
        }
        Ok(())
    }
}
