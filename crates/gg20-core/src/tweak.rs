//! Additive key tweaks and non-hardened BIP32 derivation.
//!
//! Every party adds the same public `delta` to its share, so the joint key
//! moves from `Y` to `Y + delta * G` without another DKG. `delta` for a
//! derivation path is computed from public data only, which rules out
//! hardened indexes.

use crate::keygen::LocalKey;
use crate::types::encode_public_key;
use crate::{Error, Result};
use derivation_path::{ChildIndex, DerivationPath};
use hmac::{Hmac, Mac};
use k256::elliptic_curve::{ops::Reduce, Curve};
use k256::{ProjectivePoint, Scalar, Secp256k1, U256};
use sha2::Sha512;
use tracing::debug;

/// BIP32 chain code
pub type ChainCode = [u8; 32];

/// Result of walking a derivation path from the joint key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedTweak {
    /// Sum of the per-level tweaks
    pub delta: Scalar,
    pub chain_code: ChainCode,
    /// `Y + delta * G`
    pub public_key: ProjectivePoint,
}

/// Shift a key share by `delta`. Reconstruction of the tweaked shares gives
/// `x + delta`.
pub fn tweak_local_key(local_key: &LocalKey, delta: &Scalar) -> LocalKey {
    let shift = ProjectivePoint::GENERATOR * delta;
    let mut tweaked = local_key.clone();

    tweaked.keys_linear.x_i += delta;
    tweaked.keys_linear.y += shift;
    tweaked.y_sum_s += shift;
    for pk in tweaked.pk_vec.values_mut() {
        *pk += shift;
    }
    if let Some(constant) = tweaked.vss_scheme.commitments.first_mut() {
        *constant += shift;
    }
    tweaked
}

/// One non-hardened step: `HMAC-SHA512(chain_code, ser(P) || index)`
fn child_tweak(
    public_key: &ProjectivePoint,
    chain_code: &ChainCode,
    index: u32,
) -> Result<(Scalar, ChainCode)> {
    let mut mac = Hmac::<Sha512>::new_from_slice(chain_code)
        .map_err(|e| Error::Derivation(e.to_string()))?;
    mac.update(&encode_public_key(public_key)?);
    mac.update(&index.to_be_bytes());
    let output = mac.finalize().into_bytes();
    let (il, ir) = output.split_at(32);

    let il = U256::from_be_slice(il);
    if il >= Secp256k1::ORDER {
        return Err(Error::Derivation(format!(
            "Index {} gives a tweak outside the group order",
            index
        )));
    }
    let mut child_chain_code = [0u8; 32];
    child_chain_code.copy_from_slice(ir);
    Ok((<Scalar as Reduce<U256>>::reduce(il), child_chain_code))
}

/// Compute the cumulative tweak for `path` (e.g. `m/0/7`) from the joint
/// public key and root chain code
pub fn derive_tweak(
    public_key: &ProjectivePoint,
    chain_code: &ChainCode,
    path: &str,
) -> Result<DerivedTweak> {
    let path: DerivationPath = path
        .parse()
        .map_err(|e| Error::Derivation(format!("Invalid path: {:?}", e)))?;

    let mut derived = DerivedTweak {
        delta: Scalar::ZERO,
        chain_code: *chain_code,
        public_key: *public_key,
    };
    for child in path.path() {
        let index = match *child {
            ChildIndex::Normal(index) => index,
            ChildIndex::Hardened(_) => {
                return Err(Error::Derivation(
                    "Hardened derivation not supported in threshold setting".into(),
                ))
            }
        };

        let (tweak, child_chain_code) =
            child_tweak(&derived.public_key, &derived.chain_code, index)?;
        derived.delta += tweak;
        derived.public_key += ProjectivePoint::GENERATOR * tweak;
        derived.chain_code = child_chain_code;
        if derived.public_key == ProjectivePoint::IDENTITY {
            return Err(Error::Derivation(format!(
                "Index {} derives the point at infinity",
                index
            )));
        }
        debug!(index, "Derived child tweak");
    }
    Ok(derived)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sign::{stage9, SignStage9Input};
    use crate::test_utils::{dkg_fixture, partials_of, sign_offline, simulate_offline};
    use k256::elliptic_curve::Field;
    use rand::rngs::OsRng;
    use sha2::{Digest, Sha256};

    const CHAIN_CODE: ChainCode = [0x42; 32];

    #[test]
    fn test_tweak_preserves_key_consistency() {
        let delta = Scalar::random(&mut OsRng);
        let keys: Vec<LocalKey> = dkg_fixture()
            .iter()
            .map(|k| tweak_local_key(k, &delta))
            .collect();
        let expected = dkg_fixture()[0].public_key() + ProjectivePoint::GENERATOR * delta;

        for key in &keys {
            key.validate().unwrap();
            assert_eq!(key.public_key(), expected);
        }

        let indices = [1, 3, 4];
        let shares: Vec<Scalar> = indices
            .iter()
            .map(|&i| keys[usize::from(i) - 1].keys_linear.x_i)
            .collect();
        let x = keys[0].vss_scheme.reconstruct(&indices, &shares).unwrap();
        assert_eq!(ProjectivePoint::GENERATOR * x, expected);
    }

    #[test]
    fn test_zero_tweak_is_noop() {
        let key = &dkg_fixture()[1];
        let tweaked = tweak_local_key(key, &Scalar::ZERO);
        assert_eq!(tweaked.public_key(), key.public_key());
        assert_eq!(tweaked.keys_linear.x_i, key.keys_linear.x_i);
        assert_eq!(tweaked.pk_vec, key.pk_vec);
    }

    #[test]
    fn test_sign_with_derived_key() {
        let root = dkg_fixture()[0].public_key();
        let derived = derive_tweak(&root, &CHAIN_CODE, "m/0/7").unwrap();
        let keys: Vec<LocalKey> = dkg_fixture()
            .iter()
            .map(|k| tweak_local_key(k, &derived.delta))
            .collect();

        let offline = simulate_offline(&keys, &[2, 3, 4]).unwrap();
        let digest: [u8; 32] = Sha256::digest(b"derived child").into();
        let signed = sign_offline(offline, &digest).unwrap();
        let sig = stage9(&SignStage9Input {
            stage8: &signed[&2],
            partials: &partials_of(&signed),
        })
        .unwrap();

        sig.verify(&derived.public_key, &digest).unwrap();
        assert!(sig.verify(&root, &digest).is_err());
    }

    #[test]
    fn test_derivation_composes_per_level() {
        let root = dkg_fixture()[0].public_key();
        let full = derive_tweak(&root, &CHAIN_CODE, "m/0/1").unwrap();
        let first = derive_tweak(&root, &CHAIN_CODE, "m/0").unwrap();
        let second = derive_tweak(&first.public_key, &first.chain_code, "m/1").unwrap();

        assert_eq!(full.delta, first.delta + second.delta);
        assert_eq!(full.chain_code, second.chain_code);
        assert_eq!(full.public_key, second.public_key);
        assert_eq!(
            full.public_key,
            root + ProjectivePoint::GENERATOR * full.delta
        );
        assert_ne!(first.chain_code, CHAIN_CODE);
    }

    #[test]
    fn test_root_path_is_identity() {
        let root = dkg_fixture()[0].public_key();
        let derived = derive_tweak(&root, &CHAIN_CODE, "m").unwrap();
        assert_eq!(derived.delta, Scalar::ZERO);
        assert_eq!(derived.chain_code, CHAIN_CODE);
        assert_eq!(derived.public_key, root);
    }

    #[test]
    fn test_hardened_and_malformed_paths_rejected() {
        let root = dkg_fixture()[0].public_key();
        assert!(matches!(
            derive_tweak(&root, &CHAIN_CODE, "m/0'/1"),
            Err(Error::Derivation(_))
        ));
        assert!(matches!(
            derive_tweak(&root, &CHAIN_CODE, "not/a/path"),
            Err(Error::Derivation(_))
        ));
    }
}
