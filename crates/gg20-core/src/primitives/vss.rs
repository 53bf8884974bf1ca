//! Feldman verifiable secret sharing over secp256k1

use crate::types::PartyIndex;
use crate::{Error, Result};
use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Commitments `A_k = a_k * G` to the coefficients of a degree-t polynomial
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiableSS {
    pub threshold: u16,
    pub share_count: u16,
    #[serde(with = "crate::serde_utils::points")]
    pub commitments: Vec<ProjectivePoint>,
}

impl VerifiableSS {
    /// Share `secret` with a random polynomial of degree `threshold`.
    ///
    /// Returns the scheme and the shares; the share of party `i` sits at `i - 1`.
    pub fn share(threshold: u16, share_count: u16, secret: &Scalar) -> (Self, Vec<Scalar>) {
        let mut rng = OsRng;
        let mut coefficients = Vec::with_capacity(usize::from(threshold) + 1);
        coefficients.push(*secret);
        for _ in 0..threshold {
            coefficients.push(Scalar::random(&mut rng));
        }

        let commitments = coefficients
            .iter()
            .map(|c| ProjectivePoint::GENERATOR * c)
            .collect();
        let shares = (1..=share_count)
            .map(|i| evaluate_polynomial(&coefficients, i))
            .collect();

        (
            Self {
                threshold,
                share_count,
                commitments,
            },
            shares,
        )
    }

    /// Commitment to the shared secret (`A_0`)
    pub fn constant_commitment(&self) -> ProjectivePoint {
        self.commitments
            .first()
            .copied()
            .unwrap_or(ProjectivePoint::IDENTITY)
    }

    /// `sum_k A_k * index^k`, the public image of the share of `index`
    pub fn point_commitment(&self, index: PartyIndex) -> ProjectivePoint {
        let x = Scalar::from(u64::from(index));
        self.commitments
            .iter()
            .rev()
            .fold(ProjectivePoint::IDENTITY, |acc, c| acc * x + c)
    }

    /// Feldman check `share * G == point_commitment(index)`
    pub fn validate_share(&self, share: &Scalar, index: PartyIndex) -> Result<()> {
        if self.commitments.len() != usize::from(self.threshold) + 1 {
            return Err(Error::Arithmetic(format!(
                "Expected {} commitments, got {}",
                usize::from(self.threshold) + 1,
                self.commitments.len()
            )));
        }
        if ProjectivePoint::GENERATOR * share != self.point_commitment(index) {
            return Err(Error::Arithmetic(format!(
                "Share for party {} fails Feldman verification",
                index
            )));
        }
        Ok(())
    }

    /// Sum of several dealers' schemes: commits to the sum of their polynomials
    pub fn combine<'a, I>(schemes: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a VerifiableSS>,
    {
        let mut iter = schemes.into_iter();
        let first = iter
            .next()
            .ok_or_else(|| Error::Internal("No schemes to combine".into()))?
            .clone();
        iter.try_fold(first, |mut acc, scheme| {
            if scheme.threshold != acc.threshold
                || scheme.share_count != acc.share_count
                || scheme.commitments.len() != acc.commitments.len()
            {
                return Err(Error::Arithmetic("Mismatched VSS parameters".into()));
            }
            for (a, b) in acc.commitments.iter_mut().zip(&scheme.commitments) {
                *a += b;
            }
            Ok(acc)
        })
    }

    /// Lagrange-interpolate the secret at 0 from `t + 1` (or more) shares
    pub fn reconstruct(&self, indices: &[PartyIndex], shares: &[Scalar]) -> Result<Scalar> {
        reconstruct_secret(self.threshold, indices, shares)
    }
}

/// Lagrange-interpolate a degree-`threshold` polynomial at 0
pub fn reconstruct_secret(
    threshold: u16,
    indices: &[PartyIndex],
    shares: &[Scalar],
) -> Result<Scalar> {
    if indices.len() != shares.len() {
        return Err(Error::InvalidConfig(
            "Number of indices and shares differ".into(),
        ));
    }
    if indices.len() <= usize::from(threshold) {
        return Err(Error::ThresholdNotMet {
            required: usize::from(threshold) + 1,
            actual: indices.len(),
        });
    }

    indices
        .iter()
        .zip(shares)
        .try_fold(Scalar::ZERO, |acc, (&i, share)| {
            Ok(acc + lagrange_coefficient(i, indices)? * share)
        })
}

/// Lagrange basis polynomial of `index` over `signers`, evaluated at 0.
///
/// Maps a (t, n) share of `index` onto an additive share among `signers`.
pub fn lagrange_coefficient(index: PartyIndex, signers: &[PartyIndex]) -> Result<Scalar> {
    let mut seen = BTreeSet::new();
    for &j in signers {
        if j == 0 {
            return Err(Error::InvalidPartyIndex(j));
        }
        if !seen.insert(j) {
            return Err(Error::DuplicateParty(j));
        }
    }
    if !seen.contains(&index) {
        return Err(Error::InvalidPartyIndex(index));
    }

    let xi = Scalar::from(u64::from(index));
    let (num, den) = signers
        .iter()
        .filter(|&&j| j != index)
        .fold((Scalar::ONE, Scalar::ONE), |(num, den), &j| {
            let xj = Scalar::from(u64::from(j));
            (num * xj, den * (xj - xi))
        });

    let den_inv = Option::<Scalar>::from(den.invert())
        .ok_or_else(|| Error::Arithmetic("Lagrange denominator is zero".into()))?;
    Ok(num * den_inv)
}

fn evaluate_polynomial(coefficients: &[Scalar], index: PartyIndex) -> Scalar {
    let x = Scalar::from(u64::from(index));
    coefficients
        .iter()
        .rev()
        .fold(Scalar::ZERO, |acc, c| acc * x + c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shares_validate() {
        let secret = Scalar::random(&mut OsRng);
        let (vss, shares) = VerifiableSS::share(2, 4, &secret);

        assert_eq!(vss.constant_commitment(), ProjectivePoint::GENERATOR * secret);
        for (i, share) in shares.iter().enumerate() {
            vss.validate_share(share, i as PartyIndex + 1).unwrap();
        }
        assert!(vss.validate_share(&(shares[0] + Scalar::ONE), 1).is_err());
        assert!(vss.validate_share(&shares[0], 2).is_err());
    }

    #[test]
    fn test_reconstruct_any_subset() {
        let secret = Scalar::random(&mut OsRng);
        let (vss, shares) = VerifiableSS::share(2, 4, &secret);

        for subset in [[1u16, 2, 3], [2, 3, 4], [1, 3, 4], [4, 1, 2]] {
            let picked: Vec<Scalar> = subset.iter().map(|&i| shares[usize::from(i) - 1]).collect();
            assert_eq!(vss.reconstruct(&subset, &picked).unwrap(), secret);
        }
    }

    #[test]
    fn test_reconstruct_needs_threshold_plus_one() {
        let secret = Scalar::random(&mut OsRng);
        let (vss, shares) = VerifiableSS::share(2, 4, &secret);
        assert!(matches!(
            vss.reconstruct(&[1, 2], &shares[..2]),
            Err(Error::ThresholdNotMet { .. })
        ));
    }

    #[test]
    fn test_lagrange_rejects_duplicates() {
        assert!(matches!(
            lagrange_coefficient(1, &[1, 2, 2]),
            Err(Error::DuplicateParty(2))
        ));
        assert!(lagrange_coefficient(3, &[1, 2]).is_err());
    }

    #[test]
    fn test_combined_scheme_matches_summed_shares() {
        let s1 = Scalar::random(&mut OsRng);
        let s2 = Scalar::random(&mut OsRng);
        let (vss1, shares1) = VerifiableSS::share(1, 3, &s1);
        let (vss2, shares2) = VerifiableSS::share(1, 3, &s2);
        let combined = VerifiableSS::combine([&vss1, &vss2]).unwrap();

        for i in 1..=3u16 {
            let x = shares1[usize::from(i) - 1] + shares2[usize::from(i) - 1];
            combined.validate_share(&x, i).unwrap();
        }
        assert_eq!(
            combined.constant_commitment(),
            ProjectivePoint::GENERATOR * (s1 + s2)
        );
    }
}
