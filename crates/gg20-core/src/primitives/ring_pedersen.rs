//! Ring-Pedersen parameters `(N~, h1, h2)` used by the range proofs.
//!
//! `N~` is an RSA modulus with unknown factorisation to everyone but its
//! owner, `h1` a random quadratic residue and `h2 = h1^xhi`.

use super::bignum::{self, CRYPTOGRAPHIC_RETRY_MAX};
use super::paillier::{self, PAILLIER_MAX_BIT_LENGTH, PAILLIER_MIN_BIT_LENGTH};
use crate::{Error, Result};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Public parameters, one set per party
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingPedersenParams {
    #[serde(with = "crate::serde_utils::bignum")]
    pub n_tilde: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub h1: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub h2: BigNumber,
}

impl fmt::Debug for RingPedersenParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RingPedersenParams")
            .field("bits", &self.n_tilde.bit_length())
            .finish()
    }
}

/// Trapdoor for the parameters: `h2 = h1^xhi`, `h1 = h2^xhi_inv` mod `N~`
#[derive(Clone, Serialize, Deserialize)]
pub struct RingPedersenWitness {
    #[serde(with = "crate::serde_utils::bignum")]
    pub xhi: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub xhi_inv: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub phi: BigNumber,
}

impl fmt::Debug for RingPedersenWitness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RingPedersenWitness([REDACTED])")
    }
}

impl RingPedersenParams {
    /// Generate fresh parameters and their trapdoor
    pub fn generate<R: RngCore + CryptoRng>(
        bits: usize,
        safe_primes: bool,
        rng: &mut R,
    ) -> Result<(Self, RingPedersenWitness)> {
        let (p, q) = paillier::generate_prime_pair(bits, safe_primes)?;
        let n_tilde = &p * &q;
        let phi = (&p - &BigNumber::one()) * (&q - &BigNumber::one());

        let r = bignum::sample_unit(&n_tilde, rng)?;
        let h1 = r.modmul(&r, &n_tilde);

        let (xhi, xhi_inv) = (0..CRYPTOGRAPHIC_RETRY_MAX)
            .find_map(|_| {
                let xhi = bignum::sample_below(&phi, rng);
                xhi.invert(&phi).map(|inv| (xhi, inv))
            })
            .ok_or_else(|| Error::Internal("Failed to sample an invertible exponent".into()))?;
        let h2 = h1.modpow(&xhi, &n_tilde);

        Ok((
            Self { n_tilde, h1, h2 },
            RingPedersenWitness { xhi, xhi_inv, phi },
        ))
    }

    /// `h1^x * h2^y mod N~`
    pub fn commit(&self, x: &BigNumber, y: &BigNumber) -> BigNumber {
        let a = self.h1.modpow(x, &self.n_tilde);
        let b = self.h2.modpow(y, &self.n_tilde);
        a.modmul(&b, &self.n_tilde)
    }

    /// Structural checks on parameters received from a peer
    pub fn validate(&self) -> Result<()> {
        let bits = self.n_tilde.bit_length();
        if !(PAILLIER_MIN_BIT_LENGTH..=PAILLIER_MAX_BIT_LENGTH).contains(&bits) {
            return Err(Error::Arithmetic(format!("N~ has {} bits", bits)));
        }
        let one = BigNumber::one();
        for h in [&self.h1, &self.h2] {
            if !bignum::is_unit(h, &self.n_tilde) || h == &one {
                return Err(Error::Arithmetic("h1/h2 must be non-trivial units mod N~".into()));
            }
        }
        if self.h1 == self.h2 {
            return Err(Error::Arithmetic("h1 and h2 must differ".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_trapdoor_relations() {
        let (params, witness) = RingPedersenParams::generate(1024, false, &mut OsRng).unwrap();
        assert_eq!(
            params.h1.modpow(&witness.xhi, &params.n_tilde),
            params.h2
        );
        assert_eq!(
            params.h2.modpow(&witness.xhi_inv, &params.n_tilde),
            params.h1
        );
        // 1024-bit test modulus is below the accepted peer size
        assert!(params.validate().is_err());
    }
}
