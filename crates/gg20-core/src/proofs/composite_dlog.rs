//! Proof of knowledge of `x` with `value = base^x mod N~` for a modulus of
//! unknown order.
//!
//! Binary challenges: each of the `STAT_SECURITY` repetitions is sound with
//! probability 1/2. In DKG it shows that `h1` and `h2` generate the same
//! group (once with base `h1`, once with base `h2`).

use super::{ProofError, ProofKind, ZkProof};
use crate::primitives::{bignum, transcript::TranscriptProtocol};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

/// Statistical security parameter
const STAT_SECURITY: usize = 80;

#[derive(Debug, Clone)]
pub struct CompositeDLogStatement {
    pub modulus: BigNumber,
    pub base: BigNumber,
    pub value: BigNumber,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeDLogProof {
    #[serde(with = "crate::serde_utils::bignums")]
    pub commitments: Vec<BigNumber>,
    #[serde(with = "crate::serde_utils::bignums")]
    pub responses: Vec<BigNumber>,
}

fn compute_challenges(statement: &CompositeDLogStatement, commitments: &[BigNumber]) -> Vec<bool> {
    let mut transcript = Transcript::new(b"gg20/composite-dlog");
    transcript.append_bignum(b"modulus", &statement.modulus);
    transcript.append_bignum(b"base", &statement.base);
    transcript.append_bignum(b"value", &statement.value);
    for c in commitments {
        transcript.append_bignum(b"commitment", c);
    }

    // One bit per repetition
    let mut bytes = [0u8; STAT_SECURITY / 8];
    transcript.challenge_bytes(b"challenges", &mut bytes);
    (0..STAT_SECURITY)
        .map(|i| (bytes[i / 8] >> (7 - i % 8)) & 1 == 1)
        .collect()
}

impl CompositeDLogProof {
    /// `exponent` is the discrete log, `totient` is `phi(N~)`
    pub fn prove(
        statement: &CompositeDLogStatement,
        exponent: &BigNumber,
        totient: &BigNumber,
    ) -> Self {
        let mut rng = OsRng;
        let randomness: Vec<BigNumber> = (0..STAT_SECURITY)
            .map(|_| bignum::sample_below(totient, &mut rng))
            .collect();
        let commitments: Vec<BigNumber> = randomness
            .iter()
            .map(|a| statement.base.modpow(a, &statement.modulus))
            .collect();

        let challenges = compute_challenges(statement, &commitments);

        let responses = challenges
            .iter()
            .zip(randomness)
            .map(|(&bit, a)| if bit { a.modadd(exponent, totient) } else { a })
            .collect();

        Self {
            commitments,
            responses,
        }
    }
}

impl ZkProof<CompositeDLogStatement> for CompositeDLogProof {
    const KIND: ProofKind = ProofKind::CompositeDLog;

    fn verify(&self, statement: &CompositeDLogStatement) -> Result<(), ProofError> {
        if self.commitments.len() != STAT_SECURITY || self.responses.len() != STAT_SECURITY {
            return Err(Self::reject("wrong number of repetitions"));
        }
        if !bignum::is_unit(&statement.base, &statement.modulus)
            || !bignum::is_unit(&statement.value, &statement.modulus)
        {
            return Err(Self::reject("statement outside Z*_N~"));
        }

        let challenges = compute_challenges(statement, &self.commitments);
        for ((commitment, bit), response) in self
            .commitments
            .iter()
            .zip(challenges)
            .zip(&self.responses)
        {
            let lhs = statement.base.modpow(response, &statement.modulus);
            let rhs = if bit {
                commitment.modmul(&statement.value, &statement.modulus)
            } else {
                commitment.nmod(&statement.modulus)
            };
            if lhs != rhs {
                return Err(Self::reject("response mismatch"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::ring_pedersen::RingPedersenParams;

    #[test]
    fn test_both_directions() {
        let (params, witness) = RingPedersenParams::generate(1024, false, &mut OsRng).unwrap();

        let forward = CompositeDLogStatement {
            modulus: params.n_tilde.clone(),
            base: params.h1.clone(),
            value: params.h2.clone(),
        };
        CompositeDLogProof::prove(&forward, &witness.xhi, &witness.phi)
            .verify(&forward)
            .unwrap();

        let backward = CompositeDLogStatement {
            modulus: params.n_tilde.clone(),
            base: params.h2.clone(),
            value: params.h1.clone(),
        };
        let proof = CompositeDLogProof::prove(&backward, &witness.xhi_inv, &witness.phi);
        proof.verify(&backward).unwrap();

        // a proof for one direction does not verify the other
        assert!(proof.verify(&forward).is_err());
    }
}
