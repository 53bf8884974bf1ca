//! Signing as an explicit state machine.
//!
//! `StageN` holds the result of stage `N` together with everything later
//! stages need; its outgoing message is available through the matching
//! accessor. Each `proceed_*` consumes the session and returns the next state
//! or `Aborted`. Dropping a session zeroizes its [`SignKey`](super::SignKey).
//! `proceed_stage8` spends the offline stage: after it the session holds only
//! public values and its own partial signature.

use super::messages::*;
use super::stages::*;
use crate::error::{Error, Result, Stage};
use crate::keygen::LocalKey;
use crate::types::{PartyIndex, Signature};
use k256::ProjectivePoint;
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

pub struct Stage1State {
    local_key: LocalKey,
    signers: Vec<PartyIndex>,
    out1: SignStage1Output,
}

pub struct Stage2State {
    prev: Stage1State,
    round1: BTreeMap<PartyIndex, SignRound1Message>,
    out2: SignStage2Output,
}

pub struct Stage3State {
    prev: Stage2State,
    round2: BTreeMap<PartyIndex, SignRound2Message>,
    out3: SignStage3Output,
}

pub struct Stage4State {
    prev: Stage3State,
    round3: BTreeMap<PartyIndex, SignRound3Message>,
    out4: SignStage4Output,
    message: SignRound4Message,
}

pub struct Stage5State {
    prev: Stage4State,
    out5: SignStage5Output,
}

pub struct Stage6State {
    prev: Stage5State,
    out6: SignStage6Output,
}

/// Signing session of one party
pub enum SigningSession {
    Stage1(Box<Stage1State>),
    Stage2(Box<Stage2State>),
    Stage3(Box<Stage3State>),
    Stage4(Box<Stage4State>),
    Stage5(Box<Stage5State>),
    Stage6(Box<Stage6State>),
    /// Offline phase done; ready for a message
    Stage7(Box<CompletedOfflineStage>),
    /// Offline stage spent on one message
    Stage8(Box<SignStage8Output>),
    Completed(Signature),
    Aborted { stage: Stage, error: Error },
}

impl fmt::Debug for SigningSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(sig) => f.debug_tuple("Completed").field(sig).finish(),
            Self::Aborted { stage, error } => f
                .debug_struct("Aborted")
                .field("stage", stage)
                .field("error", error)
                .finish(),
            other => write!(f, "SigningSession({})", other.stage()),
        }
    }
}

impl SigningSession {
    /// Run stage 1 for `local_key` with the signing set `signers`
    pub fn start(local_key: LocalKey, signers: &[PartyIndex]) -> Self {
        let result = check_signing_set(&local_key, signers).and_then(|signers| {
            let out1 = stage1(&SignStage1Input {
                local_key: &local_key,
                signers: &signers,
            })?;
            Ok((signers, out1))
        });
        match result {
            Ok((signers, out1)) => Self::Stage1(Box::new(Stage1State {
                local_key,
                signers,
                out1,
            })),
            Err(error) => Self::abort(Stage::Sign(1), error),
        }
    }

    /// Resume from a stored offline stage
    pub fn from_offline(offline: CompletedOfflineStage) -> Self {
        Self::Stage7(Box::new(offline))
    }

    fn abort(stage: Stage, error: Error) -> Self {
        warn!(%stage, %error, "Signing aborted");
        Self::Aborted { stage, error }
    }

    fn unexpected(self, stage: Stage) -> Self {
        match self {
            aborted @ Self::Aborted { .. } => aborted,
            other => {
                let error = Error::Internal(format!(
                    "cannot run {} from {}",
                    stage,
                    other.stage()
                ));
                Self::abort(stage, error)
            }
        }
    }

    /// Stage the session is at
    pub fn stage(&self) -> Stage {
        match self {
            Self::Stage1(_) => Stage::Sign(1),
            Self::Stage2(_) => Stage::Sign(2),
            Self::Stage3(_) => Stage::Sign(3),
            Self::Stage4(_) => Stage::Sign(4),
            Self::Stage5(_) => Stage::Sign(5),
            Self::Stage6(_) => Stage::Sign(6),
            Self::Stage7(_) => Stage::Sign(7),
            Self::Stage8(_) => Stage::Sign(8),
            Self::Completed(_) => Stage::Sign(9),
            Self::Aborted { stage, .. } => *stage,
        }
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// Turn `Aborted` into its error
    pub fn check(self) -> Result<Self> {
        match self {
            Self::Aborted { error, .. } => Err(error),
            other => Ok(other),
        }
    }

    pub fn proceed_stage2(self, round1: BTreeMap<PartyIndex, SignRound1Message>) -> Self {
        const STAGE: Stage = Stage::Sign(2);
        let state = match self {
            Self::Stage1(state) => *state,
            other => return other.unexpected(STAGE),
        };
        let result = stage2(&SignStage2Input {
            local_key: &state.local_key,
            signers: &state.signers,
            sign_key: &state.out1.sign_key,
            round1: &round1,
        });
        match result {
            Ok(out2) => Self::Stage2(Box::new(Stage2State {
                prev: state,
                round1,
                out2,
            })),
            Err(error) => Self::abort(STAGE, error),
        }
    }

    /// `round2` holds the messages addressed to this party
    pub fn proceed_stage3(self, round2: BTreeMap<PartyIndex, SignRound2Message>) -> Self {
        const STAGE: Stage = Stage::Sign(3);
        let state = match self {
            Self::Stage2(state) => *state,
            other => return other.unexpected(STAGE),
        };
        let base = &state.prev;
        let result = stage3(&SignStage3Input {
            local_key: &base.local_key,
            signers: &base.signers,
            stage1: &base.out1,
            stage2: &state.out2,
            round2: &round2,
        });
        match result {
            Ok(out3) => Self::Stage3(Box::new(Stage3State {
                prev: state,
                round2,
                out3,
            })),
            Err(error) => Self::abort(STAGE, error),
        }
    }

    pub fn proceed_stage4(self, mut round3: BTreeMap<PartyIndex, SignRound3Message>) -> Self {
        const STAGE: Stage = Stage::Sign(4);
        let state = match self {
            Self::Stage3(state) => *state,
            other => return other.unexpected(STAGE),
        };
        let base = &state.prev.prev;
        round3.insert(base.local_key.i, state.out3.message.clone());
        let result = stage4(&SignStage4Input {
            index: base.local_key.i,
            signers: &base.signers,
            round3: &round3,
        });
        match result {
            Ok(out4) => {
                let message = SignRound4Message {
                    index: base.local_key.i,
                    decom1: base.out1.decom1.clone(),
                };
                Self::Stage4(Box::new(Stage4State {
                    prev: state,
                    round3,
                    out4,
                    message,
                }))
            }
            Err(error) => Self::abort(STAGE, error),
        }
    }

    pub fn proceed_stage5(self, round4: BTreeMap<PartyIndex, SignRound4Message>) -> Self {
        const STAGE: Stage = Stage::Sign(5);
        let state = match self {
            Self::Stage4(state) => *state,
            other => return other.unexpected(STAGE),
        };
        let s3 = &state.prev;
        let s2 = &s3.prev;
        let base = &s2.prev;
        let result = stage5(&SignStage5Input {
            local_key: &base.local_key,
            signers: &base.signers,
            stage1: &base.out1,
            delta_inv: state.out4.delta_inv,
            round1: &s2.round1,
            round2: &s3.round2,
            round4: &round4,
        });
        match result {
            Ok(out5) => Self::Stage5(Box::new(Stage5State { prev: state, out5 })),
            Err(error) => Self::abort(STAGE, error),
        }
    }

    pub fn proceed_stage6(self, round5: BTreeMap<PartyIndex, SignRound5Message>) -> Self {
        const STAGE: Stage = Stage::Sign(6);
        let state = match self {
            Self::Stage5(state) => *state,
            other => return other.unexpected(STAGE),
        };
        let s3 = &state.prev.prev;
        let s2 = &s3.prev;
        let base = &s2.prev;
        let result = stage6(&SignStage6Input {
            local_key: &base.local_key,
            signers: &base.signers,
            stage3: &s3.out3,
            stage5: &state.out5,
            round1: &s2.round1,
            round5: &round5,
        });
        match result {
            Ok(out6) => Self::Stage6(Box::new(Stage6State { prev: state, out6 })),
            Err(error) => Self::abort(STAGE, error),
        }
    }

    /// Last offline stage; on success the session holds a [`CompletedOfflineStage`]
    pub fn proceed_stage7(self, round6: BTreeMap<PartyIndex, SignRound6Message>) -> Self {
        const STAGE: Stage = Stage::Sign(7);
        let state = match self {
            Self::Stage6(state) => *state,
            other => return other.unexpected(STAGE),
        };
        let Stage6State { prev, out6 } = state;
        let Stage5State { prev, out5 } = prev;
        let Stage4State { prev, round3, .. } = prev;
        let Stage3State { prev, out3, .. } = prev;
        let Stage1State {
            local_key,
            signers,
            out1,
        } = prev.prev;
        let result = stage7(SignStage7Input {
            local_key: &local_key,
            signers: &signers,
            sign_key: out1.sign_key,
            stage3: &out3,
            stage5: &out5,
            stage6: &out6,
            round3: &round3,
            round6: &round6,
        });
        match result {
            Ok(offline) => Self::Stage7(Box::new(offline)),
            Err(error) => Self::abort(STAGE, error),
        }
    }

    /// Compute this party's partial signature of a 32-byte digest.
    /// Only a `Stage7` session can sign, and only once.
    pub fn proceed_stage8(self, message: &[u8; 32]) -> Self {
        const STAGE: Stage = Stage::Sign(8);
        let offline = match self {
            Self::Stage7(offline) => *offline,
            other => return other.unexpected(STAGE),
        };
        match stage8(SignStage8Input { offline, message }) {
            Ok(out8) => Self::Stage8(Box::new(out8)),
            Err(error) => Self::abort(STAGE, error),
        }
    }

    pub fn proceed_stage9(self, mut partials: BTreeMap<PartyIndex, PartialSignature>) -> Self {
        const STAGE: Stage = Stage::Sign(9);
        let state = match self {
            Self::Stage8(state) => *state,
            other => return other.unexpected(STAGE),
        };
        partials.insert(state.partial.index, state.partial.clone());
        let result = stage9(&SignStage9Input {
            stage8: &state,
            partials: &partials,
        });
        match result {
            Ok(signature) => Self::Completed(signature),
            Err(error) => Self::abort(STAGE, error),
        }
    }

    pub fn round1_message(&self) -> Option<&SignRound1Message> {
        match self {
            Self::Stage1(state) => Some(&state.out1.message),
            _ => None,
        }
    }

    /// Outgoing MtA answers keyed by recipient
    pub fn round2_messages(&self) -> Option<&BTreeMap<PartyIndex, SignRound2Message>> {
        match self {
            Self::Stage2(state) => Some(&state.out2.messages),
            _ => None,
        }
    }

    pub fn round3_message(&self) -> Option<&SignRound3Message> {
        match self {
            Self::Stage3(state) => Some(&state.out3.message),
            _ => None,
        }
    }

    pub fn round4_message(&self) -> Option<&SignRound4Message> {
        match self {
            Self::Stage4(state) => Some(&state.message),
            _ => None,
        }
    }

    pub fn round5_message(&self) -> Option<&SignRound5Message> {
        match self {
            Self::Stage5(state) => Some(&state.out5.message),
            _ => None,
        }
    }

    pub fn round6_message(&self) -> Option<&SignRound6Message> {
        match self {
            Self::Stage6(state) => Some(&state.out6.message),
            _ => None,
        }
    }

    /// Presignature point `R`, once the offline phase is done
    pub fn r_point(&self) -> Option<ProjectivePoint> {
        match self {
            Self::Stage7(offline) => Some(offline.r_point),
            Self::Stage8(state) => Some(state.r_point),
            _ => None,
        }
    }

    pub fn partial_signature(&self) -> Option<&PartialSignature> {
        match self {
            Self::Stage8(state) => Some(&state.partial),
            _ => None,
        }
    }

    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Self::Completed(signature) => Some(signature),
            _ => None,
        }
    }

    /// Take the offline result out of a `Stage7` session
    pub fn into_offline(self) -> Result<CompletedOfflineStage> {
        match self.check()? {
            Self::Stage7(offline) => Ok(*offline),
            other => Err(Error::Internal(format!(
                "offline stage not completed ({})",
                other.stage()
            ))),
        }
    }

    pub fn into_signature(self) -> Result<Signature> {
        match self.check()? {
            Self::Completed(signature) => Ok(signature),
            other => Err(Error::Internal(format!(
                "signature not completed ({})",
                other.stage()
            ))),
        }
    }
}
