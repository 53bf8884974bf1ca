//! Distributed Key Generation (DKG) module
//!
//! GG20 key generation: every party deals a Feldman sharing of a random
//! `u_i`, the joint key is `Y = sum u_i * G`, and each party ends up with a
//! [`LocalKey`] holding its share `x_i` and the public data signing needs.

mod dkg;
pub mod local_key;
mod messages;
pub mod stages;

pub use dkg::run_dkg;
pub use local_key::{LocalKey, SharedKeys};
pub use messages::*;
pub use stages::{
    stage1, stage2, stage3, stage4, KeygenConfig, KeygenStage1Input, KeygenStage1Output,
    KeygenStage2Input, KeygenStage2Output, KeygenStage3Input, KeygenStage3Output,
    KeygenStage4Input, KeygenStage4Output, Keys,
};
