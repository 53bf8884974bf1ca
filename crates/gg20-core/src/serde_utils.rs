//! Hex serde adapters for curve and big-integer values.
//!
//! Use with `#[serde(with = "crate::serde_utils::scalar")]` and friends.
//! Decoding is strict: scalars must be canonical and points must be on the curve.

use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

fn decode_hex<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    hex::decode(s).map_err(D::Error::custom)
}

pub mod scalar {
    use super::*;
    use crate::primitives::curve;
    use k256::Scalar;

    pub fn serialize<S: Serializer>(scalar: &Scalar, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(scalar.to_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Scalar, D::Error> {
        let bytes = decode_hex(deserializer)?;
        curve::scalar_from_bytes(&bytes).map_err(D::Error::custom)
    }
}

pub mod point {
    use super::*;
    use crate::primitives::curve;
    use k256::ProjectivePoint;

    pub fn serialize<S: Serializer>(
        point: &ProjectivePoint,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(curve::point_to_bytes(point)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<ProjectivePoint, D::Error> {
        let bytes = decode_hex(deserializer)?;
        curve::point_from_bytes(&bytes).map_err(D::Error::custom)
    }
}

pub mod points {
    use super::*;
    use crate::primitives::curve;
    use k256::ProjectivePoint;
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(
        points: &[ProjectivePoint],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(points.len()))?;
        for p in points {
            seq.serialize_element(&hex::encode(curve::point_to_bytes(p)))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<ProjectivePoint>, D::Error> {
        let encoded: Vec<String> = Vec::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|s| {
                let bytes = hex::decode(s).map_err(D::Error::custom)?;
                curve::point_from_bytes(&bytes).map_err(D::Error::custom)
            })
            .collect()
    }
}

pub mod point_map {
    use super::*;
    use crate::primitives::curve;
    use crate::types::PartyIndex;
    use k256::ProjectivePoint;
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        points: &BTreeMap<PartyIndex, ProjectivePoint>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(
            points
                .iter()
                .map(|(i, p)| (i, hex::encode(curve::point_to_bytes(p)))),
        )
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<PartyIndex, ProjectivePoint>, D::Error> {
        let encoded: BTreeMap<PartyIndex, String> = BTreeMap::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(i, s)| {
                let bytes = hex::decode(s).map_err(D::Error::custom)?;
                let point = curve::point_from_bytes(&bytes).map_err(D::Error::custom)?;
                Ok((i, point))
            })
            .collect()
    }
}

pub mod scalar_map {
    use super::*;
    use crate::primitives::curve;
    use crate::types::PartyIndex;
    use k256::Scalar;
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        scalars: &BTreeMap<PartyIndex, Scalar>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(scalars.iter().map(|(i, s)| (i, hex::encode(s.to_bytes()))))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<PartyIndex, Scalar>, D::Error> {
        let encoded: BTreeMap<PartyIndex, String> = BTreeMap::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(i, s)| {
                let bytes = hex::decode(s).map_err(D::Error::custom)?;
                let scalar = curve::scalar_from_bytes(&bytes).map_err(D::Error::custom)?;
                Ok((i, scalar))
            })
            .collect()
    }
}

pub mod bignum {
    use super::*;
    use libpaillier::unknown_order::BigNumber;

    pub fn serialize<S: Serializer>(value: &BigNumber, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(value.to_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BigNumber, D::Error> {
        let bytes = decode_hex(deserializer)?;
        Ok(BigNumber::from_slice(bytes))
    }
}

pub mod bignums {
    use super::*;
    use libpaillier::unknown_order::BigNumber;
    use serde::ser::SerializeSeq;

    pub fn serialize<S: Serializer>(
        values: &[BigNumber],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for v in values {
            seq.serialize_element(&hex::encode(v.to_bytes()))?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<BigNumber>, D::Error> {
        let encoded: Vec<String> = Vec::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|s| {
                hex::decode(s)
                    .map(BigNumber::from_slice)
                    .map_err(D::Error::custom)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use k256::{elliptic_curve::Field, ProjectivePoint, Scalar};
    use libpaillier::unknown_order::BigNumber;
    use rand::rngs::OsRng;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Sample {
        #[serde(with = "super::scalar")]
        s: Scalar,
        #[serde(with = "super::point")]
        p: ProjectivePoint,
        #[serde(with = "super::bignum")]
        n: BigNumber,
    }

    #[test]
    fn test_out_of_range_scalar_is_rejected() {
        let json = format!(
            r#"{{"s":"{}","p":"{}","n":"ff"}}"#,
            "ff".repeat(32),
            hex::encode(super::super::primitives::curve::point_to_bytes(
                &ProjectivePoint::GENERATOR
            ))
        );
        assert!(serde_json::from_str::<Sample>(&json).is_err());
    }

    #[test]
    fn test_values_survive_json() {
        let sample = Sample {
            s: Scalar::random(&mut OsRng),
            p: ProjectivePoint::GENERATOR * Scalar::random(&mut OsRng),
            n: BigNumber::from_slice(12345u64.to_be_bytes()),
        };
        let json = serde_json::to_string(&sample).unwrap();
        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(back.s, sample.s);
        assert_eq!(back.p, sample.p);
        assert_eq!(back.n, sample.n);
    }
}
