//! Big-integer helpers shared by Paillier and the range proofs.
//!
//! All values handled here are non-negative; negative exponents are expressed
//! as a power of the modular inverse.

use crate::{Error, Result};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};

use super::curve::curve_order;

pub(crate) const CRYPTOGRAPHIC_RETRY_MAX: usize = 500;

/// Small constant as a big integer
pub fn from_u64(value: u64) -> BigNumber {
    BigNumber::from_slice(value.to_be_bytes())
}

/// q^k
pub fn order_pow(k: u32) -> BigNumber {
    let q = curve_order();
    (1..k).fold(q.clone(), |acc, _| acc * &q)
}

/// Uniform in `[0, n)`
pub fn sample_below<R: RngCore + CryptoRng>(n: &BigNumber, rng: &mut R) -> BigNumber {
    BigNumber::from_rng(n, rng)
}

/// Uniform in Z*_n
pub fn sample_unit<R: RngCore + CryptoRng>(n: &BigNumber, rng: &mut R) -> Result<BigNumber> {
    for _ in 0..CRYPTOGRAPHIC_RETRY_MAX {
        let candidate = BigNumber::from_rng(n, rng);
        if candidate != BigNumber::zero() && candidate.gcd(n) == BigNumber::one() {
            return Ok(candidate);
        }
    }
    Err(Error::Internal("Failed to sample a unit".into()))
}

/// `base^(-exp) mod modulus`
pub fn inverse_pow(base: &BigNumber, exp: &BigNumber, modulus: &BigNumber) -> Result<BigNumber> {
    let inv = base
        .invert(modulus)
        .ok_or_else(|| Error::Arithmetic("Value is not invertible".into()))?;
    Ok(inv.modpow(exp, modulus))
}

/// Whether `0 < value < modulus` and `gcd(value, modulus) = 1`
pub fn is_unit(value: &BigNumber, modulus: &BigNumber) -> bool {
    value > &BigNumber::zero() && value < modulus && value.gcd(modulus) == BigNumber::one()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_inverse_pow() {
        let n = from_u64(101);
        let base = from_u64(7);
        let e = from_u64(5);
        let forward = base.modpow(&e, &n);
        let backward = inverse_pow(&base, &e, &n).unwrap();
        assert_eq!(forward.modmul(&backward, &n), BigNumber::one());
    }

    #[test]
    fn test_sample_unit() {
        let n = from_u64(15);
        for _ in 0..20 {
            let u = sample_unit(&n, &mut OsRng).unwrap();
            assert!(is_unit(&u, &n));
        }
        assert!(!is_unit(&from_u64(5), &n));
        assert!(!is_unit(&BigNumber::zero(), &n));
    }

    #[test]
    fn test_order_pow() {
        let q = curve_order();
        assert_eq!(order_pow(1), q);
        assert_eq!(order_pow(3), &q * &q * &q);
    }
}
