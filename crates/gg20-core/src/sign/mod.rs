//! Distributed Signature Generation (DSG) module
//!
//! GG20 signing for a set of `t + 1` parties. Stages 1-7 (offline) build a
//! presignature `(R, k_i, sigma_i)`; stages 8 and 9 (online) sign one digest
//! with it. Every peer message is checked on arrival, and a failed check
//! aborts the session naming the sender.

mod dsg;
mod messages;
pub mod stages;
pub mod state_machine;

pub use dsg::{run_dsg, run_offline, run_online};
pub use messages::*;
pub use stages::{
    check_signing_set, stage1, stage2, stage3, stage4, stage5, stage6, stage7, stage8, stage9,
    CompletedOfflineStage, SignKey, SignStage1Input, SignStage1Output, SignStage2Input,
    SignStage2Output, SignStage3Input, SignStage3Output, SignStage4Input, SignStage4Output,
    SignStage5Input, SignStage5Output, SignStage6Input, SignStage6Output, SignStage7Input,
    SignStage8Input, SignStage8Output, SignStage9Input,
};
pub use state_machine::SigningSession;
