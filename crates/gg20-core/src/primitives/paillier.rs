//! Paillier encryption with generator `g = N + 1`.
//!
//! `Enc(m; r) = (1 + N)^m * r^N mod N^2`. Ciphertexts add plaintexts under
//! multiplication and scale them under exponentiation.

use super::bignum::{self, CRYPTOGRAPHIC_RETRY_MAX};
use crate::{Error, Result};
use libpaillier::unknown_order::BigNumber;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Smallest modulus accepted from a peer
pub const PAILLIER_MIN_BIT_LENGTH: usize = 2047;

/// Largest modulus accepted from a peer
pub const PAILLIER_MAX_BIT_LENGTH: usize = 4096;

/// Paillier public key
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionKey {
    #[serde(with = "crate::serde_utils::bignum")]
    pub n: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub nn: BigNumber,
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("bits", &self.n.bit_length())
            .finish()
    }
}

/// Paillier secret key: the factorisation of `N`
#[derive(Clone, Serialize, Deserialize)]
pub struct DecryptionKey {
    #[serde(with = "crate::serde_utils::bignum")]
    pub p: BigNumber,
    #[serde(with = "crate::serde_utils::bignum")]
    pub q: BigNumber,
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecryptionKey([REDACTED])")
    }
}

impl EncryptionKey {
    /// Public key for modulus `n`
    pub fn from_modulus(n: BigNumber) -> Self {
        let nn = &n * &n;
        Self { n, nn }
    }

    /// Encrypt `m` with caller-chosen randomness `r`
    pub fn encrypt_with_randomness(&self, m: &BigNumber, r: &BigNumber) -> Result<BigNumber> {
        if m >= &self.n {
            return Err(Error::Arithmetic("Plaintext exceeds Paillier modulus".into()));
        }
        if !bignum::is_unit(r, &self.n) {
            return Err(Error::Arithmetic("Encryption randomness is not a unit".into()));
        }
        // (1 + N)^m = 1 + m*N mod N^2
        let gm = (BigNumber::one() + m * &self.n).nmod(&self.nn);
        let rn = r.modpow(&self.n, &self.nn);
        Ok(gm.modmul(&rn, &self.nn))
    }

    /// Encrypt `m`, returning the ciphertext and the randomness used
    pub fn encrypt<R: RngCore + CryptoRng>(
        &self,
        m: &BigNumber,
        rng: &mut R,
    ) -> Result<(BigNumber, BigNumber)> {
        let r = bignum::sample_unit(&self.n, rng)?;
        let c = self.encrypt_with_randomness(m, &r)?;
        Ok((c, r))
    }

    /// Ciphertext of `m1 + m2`
    pub fn add(&self, c1: &BigNumber, c2: &BigNumber) -> Result<BigNumber> {
        self.validate_ciphertext(c1)?;
        self.validate_ciphertext(c2)?;
        Ok(c1.modmul(c2, &self.nn))
    }

    /// Ciphertext of `k * m`
    pub fn mul(&self, c: &BigNumber, k: &BigNumber) -> Result<BigNumber> {
        self.validate_ciphertext(c)?;
        Ok(c.modpow(k, &self.nn))
    }

    /// Ciphertexts must lie in Z*_{N^2}
    pub fn validate_ciphertext(&self, c: &BigNumber) -> Result<()> {
        if !bignum::is_unit(c, &self.nn) {
            return Err(Error::Arithmetic(
                "Ciphertext outside Z*_{N^2}".into(),
            ));
        }
        Ok(())
    }

    /// Reject moduli outside the accepted size range
    pub fn validate_size(&self) -> Result<()> {
        let bits = self.n.bit_length();
        if !(PAILLIER_MIN_BIT_LENGTH..=PAILLIER_MAX_BIT_LENGTH).contains(&bits) {
            return Err(Error::Arithmetic(format!(
                "Paillier modulus has {} bits",
                bits
            )));
        }
        Ok(())
    }
}

impl DecryptionKey {
    /// Generate a keypair whose modulus has at least `bits - 1` bits
    pub fn generate(bits: usize, safe_primes: bool) -> Result<(EncryptionKey, Self)> {
        let (p, q) = generate_prime_pair(bits, safe_primes)?;
        let dk = Self { p, q };
        Ok((dk.encryption_key(), dk))
    }

    /// Matching public key
    pub fn encryption_key(&self) -> EncryptionKey {
        EncryptionKey::from_modulus(&self.p * &self.q)
    }

    /// phi(N) = (p - 1)(q - 1)
    pub fn phi(&self) -> BigNumber {
        (&self.p - &BigNumber::one()) * (&self.q - &BigNumber::one())
    }

    /// Decrypt a ciphertext
    pub fn decrypt(&self, c: &BigNumber) -> Result<BigNumber> {
        let ek = self.encryption_key();
        ek.validate_ciphertext(c)?;

        let phi = self.phi();
        let mu = phi
            .invert(&ek.n)
            .ok_or_else(|| Error::Arithmetic("phi(N) is not invertible mod N".into()))?;
        // L(c^phi mod N^2) * phi^-1 mod N
        let u = c.modpow(&phi, &ek.nn);
        let l = (u - BigNumber::one()) / &ek.n;
        Ok(l.modmul(&mu, &ek.n))
    }
}

/// Two distinct primes of `bits / 2` bits whose product has `bits - 1` bits or
/// more and is coprime to its totient.
pub(crate) fn generate_prime_pair(
    bits: usize,
    safe_primes: bool,
) -> Result<(BigNumber, BigNumber)> {
    let half = bits / 2;
    let prime = |bits: usize| {
        if safe_primes {
            BigNumber::safe_prime(bits)
        } else {
            BigNumber::prime(bits)
        }
    };

    for attempt in 0..CRYPTOGRAPHIC_RETRY_MAX {
        let p = prime(half);
        let q = prime(half);
        if p == q {
            continue;
        }
        let n = &p * &q;
        let phi = (&p - &BigNumber::one()) * (&q - &BigNumber::one());
        if n.bit_length() + 1 < bits || n.gcd(&phi) != BigNumber::one() {
            debug!(attempt, "Rejected prime pair");
            continue;
        }
        return Ok((p, q));
    }
    Err(Error::Internal("Failed to generate a Paillier modulus".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::bignum::from_u64;
    use rand::rngs::OsRng;
    use std::sync::OnceLock;

    fn keypair() -> &'static (EncryptionKey, DecryptionKey) {
        static KEYS: OnceLock<(EncryptionKey, DecryptionKey)> = OnceLock::new();
        KEYS.get_or_init(|| DecryptionKey::generate(1024, false).unwrap())
    }

    #[test]
    fn test_encrypt_decrypt() {
        let (ek, dk) = keypair();
        let m = from_u64(424242);
        let (c, _) = ek.encrypt(&m, &mut OsRng).unwrap();
        assert_eq!(dk.decrypt(&c).unwrap(), m);
    }

    #[test]
    fn test_homomorphic_add_and_mul() {
        let (ek, dk) = keypair();
        let (c1, _) = ek.encrypt(&from_u64(20), &mut OsRng).unwrap();
        let (c2, _) = ek.encrypt(&from_u64(22), &mut OsRng).unwrap();

        let sum = ek.add(&c1, &c2).unwrap();
        assert_eq!(dk.decrypt(&sum).unwrap(), from_u64(42));

        let scaled = ek.mul(&c1, &from_u64(3)).unwrap();
        assert_eq!(dk.decrypt(&scaled).unwrap(), from_u64(60));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let (ek, dk) = keypair();
        assert!(ek.encrypt(&ek.n, &mut OsRng).is_err());
        assert!(dk.decrypt(&BigNumber::zero()).is_err());
        assert!(dk.decrypt(&ek.nn).is_err());
        assert!(ek.validate_ciphertext(&ek.n).is_err());
    }

    #[test]
    fn test_modulus_size_check() {
        let (ek, _) = keypair();
        assert!(ek.validate_size().is_err());
    }
}
