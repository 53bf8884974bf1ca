//! Fiat-Shamir helpers over merlin transcripts

use super::curve;
use k256::{elliptic_curve::bigint::U256, elliptic_curve::ops::Reduce, ProjectivePoint, Scalar};
use libpaillier::unknown_order::BigNumber;
use merlin::Transcript;

/// Domain-separated absorb/squeeze operations used by every proof
pub trait TranscriptProtocol {
    fn append_point(&mut self, label: &'static [u8], point: &ProjectivePoint);
    fn append_scalar(&mut self, label: &'static [u8], scalar: &Scalar);
    fn append_bignum(&mut self, label: &'static [u8], value: &BigNumber);
    fn challenge_scalar(&mut self, label: &'static [u8]) -> Scalar;
}

impl TranscriptProtocol for Transcript {
    fn append_point(&mut self, label: &'static [u8], point: &ProjectivePoint) {
        self.append_message(label, &curve::point_to_bytes(point));
    }

    fn append_scalar(&mut self, label: &'static [u8], scalar: &Scalar) {
        self.append_message(label, &scalar.to_bytes());
    }

    fn append_bignum(&mut self, label: &'static [u8], value: &BigNumber) {
        self.append_message(label, &value.to_bytes());
    }

    fn challenge_scalar(&mut self, label: &'static [u8]) -> Scalar {
        let mut buf = [0u8; 32];
        self.challenge_bytes(label, &mut buf);
        <Scalar as Reduce<U256>>::reduce_bytes(&buf.into())
    }
}
