//! secp256k1 helpers: encodings, conversions to big integers and the
//! second generator `H` used by Pedersen commitments.

use crate::{Error, Result};
use k256::{
    elliptic_curve::{
        bigint::{Encoding, U256},
        ops::Reduce,
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Curve, PrimeField,
    },
    AffinePoint, EncodedPoint, FieldBytes, ProjectivePoint, Scalar, Secp256k1,
};
use libpaillier::unknown_order::BigNumber;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Order `q` of the secp256k1 group
pub fn curve_order() -> BigNumber {
    BigNumber::from_slice(Secp256k1::ORDER.to_be_bytes())
}

/// Compressed SEC1 encoding
pub fn point_to_bytes(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(true).as_bytes().to_vec()
}

/// Decode a SEC1 point, rejecting encodings that are not on the curve
pub fn point_from_bytes(bytes: &[u8]) -> Result<ProjectivePoint> {
    let encoded =
        EncodedPoint::from_bytes(bytes).map_err(|e| Error::Arithmetic(e.to_string()))?;
    let affine_opt = AffinePoint::from_encoded_point(&encoded);
    let affine: AffinePoint = Option::<AffinePoint>::from(affine_opt)
        .ok_or_else(|| Error::Arithmetic("Point is not on secp256k1".into()))?;
    Ok(ProjectivePoint::from(affine))
}

/// Canonical scalar decoding: values `>= q` are rejected, never reduced
pub fn scalar_from_bytes(bytes: &[u8]) -> Result<Scalar> {
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| Error::Arithmetic(format!("Invalid scalar length {}", bytes.len())))?;
    Option::<Scalar>::from(Scalar::from_repr(FieldBytes::from(array)))
        .ok_or_else(|| Error::Arithmetic("Scalar is not below the group order".into()))
}

/// Interpret a 32-byte message digest as a scalar (reduced mod q, as ECDSA does)
pub fn scalar_from_digest(digest: &[u8; 32]) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(&(*digest).into())
}

/// Scalar as a non-negative big integer
pub fn scalar_to_bignum(scalar: &Scalar) -> BigNumber {
    BigNumber::from_slice(scalar.to_bytes())
}

/// Big integer reduced mod q
pub fn bignum_to_scalar(value: &BigNumber) -> Scalar {
    let reduced = value.nmod(&curve_order());
    let bytes = reduced.to_bytes();
    let mut array = [0u8; 32];
    array[32 - bytes.len()..].copy_from_slice(&bytes);
    <Scalar as Reduce<U256>>::reduce_bytes(&array.into())
}

/// Affine x-coordinate of a point
pub fn x_coordinate(point: &ProjectivePoint) -> Result<[u8; 32]> {
    let encoded = point.to_affine().to_encoded_point(false);
    let x = encoded
        .x()
        .ok_or_else(|| Error::Arithmetic("Point at infinity has no x-coordinate".into()))?;
    let mut out = [0u8; 32];
    out.copy_from_slice(x);
    Ok(out)
}

/// Whether the affine y-coordinate is odd
pub fn y_is_odd(point: &ProjectivePoint) -> bool {
    point.to_affine().to_encoded_point(true).as_bytes()[0] == 0x03
}

/// Second generator `H` with unknown discrete log relative to `G`.
///
/// Found by hashing a fixed tag with a counter until the digest is the
/// x-coordinate of a curve point with even y.
pub fn second_generator() -> ProjectivePoint {
    static H: OnceLock<ProjectivePoint> = OnceLock::new();
    *H.get_or_init(|| {
        let mut counter: u32 = 0;
        loop {
            let digest = Sha256::new()
                .chain_update(b"gg20-core/second-generator")
                .chain_update(counter.to_be_bytes())
                .finalize();
            let mut candidate = [0u8; 33];
            candidate[0] = 0x02;
            candidate[1..].copy_from_slice(&digest);
            if let Ok(point) = point_from_bytes(&candidate) {
                return point;
            }
            counter += 1;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::elliptic_curve::Field;
    use rand::rngs::OsRng;

    #[test]
    fn test_scalar_bignum_conversion() {
        let s = Scalar::random(&mut OsRng);
        assert_eq!(bignum_to_scalar(&scalar_to_bignum(&s)), s);

        let q = curve_order();
        assert_eq!(bignum_to_scalar(&q), Scalar::ZERO);
        assert_eq!(bignum_to_scalar(&(q + BigNumber::one())), Scalar::ONE);
    }

    #[test]
    fn test_scalar_decoding_rejects_order() {
        let q = curve_order().to_bytes();
        assert!(scalar_from_bytes(&q).is_err());
        assert!(scalar_from_bytes(&[1u8; 31]).is_err());
        assert_eq!(scalar_from_bytes(&Scalar::ONE.to_bytes()).unwrap(), Scalar::ONE);
    }

    #[test]
    fn test_point_decoding_rejects_garbage() {
        let g = ProjectivePoint::GENERATOR;
        assert_eq!(point_from_bytes(&point_to_bytes(&g)).unwrap(), g);

        let mut bad = point_to_bytes(&g);
        bad[0] = 0x05;
        assert!(point_from_bytes(&bad).is_err());
    }

    #[test]
    fn test_second_generator() {
        let h = second_generator();
        assert_ne!(h, ProjectivePoint::GENERATOR);
        assert_ne!(h, ProjectivePoint::IDENTITY);
        assert!(!y_is_odd(&h));
        assert_eq!(h, second_generator());
    }
}
