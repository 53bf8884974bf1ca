//! Proof that `D = x * H + r * Y` and `E = r * G` share the same `r`.
//!
//! In signing stage 6 it is instantiated with `G = R`, `Y` the curve
//! generator, `D = T_i` and `E = S_i`, witness `x = l_i`, `r = sigma_i`.

use super::{ProofError, ProofKind, ZkProof};
use crate::primitives::transcript::TranscriptProtocol;
use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use merlin::Transcript;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct HomoElGamalStatement {
    pub g: ProjectivePoint,
    pub h: ProjectivePoint,
    pub y: ProjectivePoint,
    pub d: ProjectivePoint,
    pub e: ProjectivePoint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HomoElGamalProof {
    #[serde(with = "crate::serde_utils::point")]
    pub t: ProjectivePoint,
    #[serde(with = "crate::serde_utils::point")]
    pub a3: ProjectivePoint,
    #[serde(with = "crate::serde_utils::scalar")]
    pub z1: Scalar,
    #[serde(with = "crate::serde_utils::scalar")]
    pub z2: Scalar,
}

fn challenge(statement: &HomoElGamalStatement, t: &ProjectivePoint, a3: &ProjectivePoint) -> Scalar {
    let mut transcript = Transcript::new(b"gg20/homo-elgamal");
    transcript.append_point(b"T", t);
    transcript.append_point(b"A3", a3);
    transcript.append_point(b"G", &statement.g);
    transcript.append_point(b"H", &statement.h);
    transcript.append_point(b"Y", &statement.y);
    transcript.append_point(b"D", &statement.d);
    transcript.append_point(b"E", &statement.e);
    transcript.challenge_scalar(b"e")
}

impl HomoElGamalProof {
    pub fn prove(x: &Scalar, r: &Scalar, statement: &HomoElGamalStatement) -> Self {
        let s1 = Scalar::random(&mut OsRng);
        let s2 = Scalar::random(&mut OsRng);
        let t = statement.h * s1 + statement.y * s2;
        let a3 = statement.g * s2;
        let e = challenge(statement, &t, &a3);
        Self {
            t,
            a3,
            z1: s1 + e * x,
            z2: s2 + e * r,
        }
    }
}

impl ZkProof<HomoElGamalStatement> for HomoElGamalProof {
    const KIND: ProofKind = ProofKind::HomoElGamal;

    fn verify(&self, statement: &HomoElGamalStatement) -> Result<(), ProofError> {
        let e = challenge(statement, &self.t, &self.a3);
        if statement.h * self.z1 + statement.y * self.z2 != self.t + statement.d * e {
            return Err(Self::reject("D equation"));
        }
        if statement.g * self.z2 != self.a3 + statement.e * e {
            return Err(Self::reject("E equation"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::curve;

    fn statement(x: &Scalar, r: &Scalar) -> HomoElGamalStatement {
        let g = ProjectivePoint::GENERATOR * Scalar::random(&mut OsRng);
        let h = curve::second_generator();
        let y = ProjectivePoint::GENERATOR;
        HomoElGamalStatement {
            g,
            h,
            y,
            d: h * x + y * r,
            e: g * r,
        }
    }

    #[test]
    fn test_valid_proof() {
        let x = Scalar::random(&mut OsRng);
        let r = Scalar::random(&mut OsRng);
        let st = statement(&x, &r);
        HomoElGamalProof::prove(&x, &r, &st).verify(&st).unwrap();
    }

    #[test]
    fn test_inconsistent_statement() {
        let x = Scalar::random(&mut OsRng);
        let r = Scalar::random(&mut OsRng);
        let mut st = statement(&x, &r);
        let proof = HomoElGamalProof::prove(&x, &r, &st);
        st.e += ProjectivePoint::GENERATOR;
        assert!(proof.verify(&st).is_err());

        let st = statement(&x, &r);
        let mut proof = HomoElGamalProof::prove(&x, &r, &st);
        proof.z1 += Scalar::ONE;
        assert!(proof.verify(&st).is_err());
    }
}
