//! Non-interactive proof that a Paillier modulus `N` is coprime to `phi(N)`.
//!
//! The prover takes `N`-th roots of `M2` hash-derived values; this is only
//! possible for every value when `gcd(N, phi(N)) = 1`. The verifier also
//! rejects moduli with prime factors below `ALPHA`.

use super::{ProofError, ProofKind, ZkProof};
use crate::primitives::{bignum, paillier::DecryptionKey, paillier::EncryptionKey};
use crate::{Error, Result};
use libpaillier::unknown_order::BigNumber;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Number of roots in the proof
const M2: usize = 11;

/// Small-prime bound for the verifier's gcd test
const ALPHA: u64 = 6370;

const SALT: &[u8] = b"gg20-core/paillier-key-proof";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaillierKeyProof {
    #[serde(with = "crate::serde_utils::bignums")]
    pub sigma_vec: Vec<BigNumber>,
}

/// Deterministic `rho_i` in `[0, N)` derived from the modulus
fn rho_vec(n: &BigNumber) -> Vec<BigNumber> {
    let n_bytes = n.to_bytes();
    (0..M2)
        .map(|i| {
            let mut out = Vec::with_capacity(n_bytes.len() + 32);
            let mut counter: u32 = 0;
            while out.len() < n_bytes.len() {
                let block = Sha256::new()
                    .chain_update(SALT)
                    .chain_update(&n_bytes)
                    .chain_update((i as u32).to_be_bytes())
                    .chain_update(counter.to_be_bytes())
                    .finalize();
                out.extend_from_slice(&block);
                counter += 1;
            }
            out.truncate(n_bytes.len());
            BigNumber::from_slice(&out).nmod(n)
        })
        .collect()
}

/// Product of all primes below `ALPHA`
fn alpha_primorial() -> &'static BigNumber {
    static PRIMORIAL: OnceLock<BigNumber> = OnceLock::new();
    PRIMORIAL.get_or_init(|| {
        let limit = ALPHA as usize;
        let mut composite = vec![false; limit + 1];
        let mut product = BigNumber::one();
        for p in 2..=limit {
            if composite[p] {
                continue;
            }
            product = product * bignum::from_u64(p as u64);
            let mut multiple = p * p;
            while multiple <= limit {
                composite[multiple] = true;
                multiple += p;
            }
        }
        product
    })
}

impl PaillierKeyProof {
    pub fn prove(dk: &DecryptionKey) -> Result<Self> {
        let ek = dk.encryption_key();
        let n_inv = ek
            .n
            .invert(&dk.phi())
            .ok_or_else(|| Error::Arithmetic("N is not invertible mod phi(N)".into()))?;
        let sigma_vec = rho_vec(&ek.n)
            .iter()
            .map(|rho| rho.modpow(&n_inv, &ek.n))
            .collect();
        Ok(Self { sigma_vec })
    }
}

impl ZkProof<EncryptionKey> for PaillierKeyProof {
    const KIND: ProofKind = ProofKind::PaillierKey;

    fn verify(&self, ek: &EncryptionKey) -> std::result::Result<(), ProofError> {
        if self.sigma_vec.len() != M2 {
            return Err(Self::reject("wrong number of roots"));
        }
        if alpha_primorial().gcd(&ek.n) != BigNumber::one() {
            return Err(Self::reject("modulus has a small prime factor"));
        }
        for (sigma, rho) in self.sigma_vec.iter().zip(rho_vec(&ek.n)) {
            if sigma >= &ek.n || sigma.modpow(&ek.n, &ek.n) != rho {
                return Err(Self::reject("root mismatch"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_honest_key() {
        let (ek, dk) = DecryptionKey::generate(1024, false).unwrap();
        let proof = PaillierKeyProof::prove(&dk).unwrap();
        proof.verify(&ek).unwrap();

        let mut tampered = proof.clone();
        tampered.sigma_vec[3] = &tampered.sigma_vec[3] + &BigNumber::one();
        assert!(tampered.verify(&ek).is_err());

        let (other_ek, _) = DecryptionKey::generate(1024, false).unwrap();
        assert!(proof.verify(&other_ek).is_err());
    }

    #[test]
    fn test_small_factor_rejected() {
        let (ek, _) = DecryptionKey::generate(1024, false).unwrap();
        let weak = EncryptionKey::from_modulus(&ek.n * &bignum::from_u64(3));
        let proof = PaillierKeyProof {
            sigma_vec: vec![BigNumber::one(); M2],
        };
        assert!(proof.verify(&weak).is_err());
    }
}
