//! Primitive layer: curve helpers, Paillier, ring-Pedersen parameters,
//! Feldman VSS and hash commitments.

pub mod bignum;
pub mod commitment;
pub mod curve;
pub mod paillier;
pub mod ring_pedersen;
pub mod transcript;
pub mod vss;

pub use commitment::{Commitment, Decommitment};
pub use paillier::{DecryptionKey, EncryptionKey};
pub use ring_pedersen::{RingPedersenParams, RingPedersenWitness};
pub use vss::{lagrange_coefficient, reconstruct_secret, VerifiableSS};
