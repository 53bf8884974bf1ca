//! Error types for GG20 operations

use crate::proofs::{ProofError, ProofKind};
use crate::types::PartyIndex;
use std::fmt;
use thiserror::Error;

/// Result type alias for GG20 operations
pub type Result<T> = std::result::Result<T, Error>;

/// Protocol stage an error is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// DKG stage (1..=4)
    Keygen(u8),
    /// Signing stage (1..=9)
    Sign(u8),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Keygen(n) => write!(f, "keygen stage {}", n),
            Stage::Sign(n) => write!(f, "signing stage {}", n),
        }
    }
}

/// Errors that can occur during GG20 protocol execution
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid party configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Threshold requirements not met
    #[error("Threshold not met: required {required}, got {actual}")]
    ThresholdNotMet { required: usize, actual: usize },

    /// The same party index was supplied twice
    #[error("Duplicate party index: {0}")]
    DuplicateParty(PartyIndex),

    /// Party index outside `1..=n`
    #[error("Invalid party index: {0}")]
    InvalidPartyIndex(PartyIndex),

    /// A peer sent data that breaks the protocol
    #[error("Protocol violation at {stage} by {culprits:?}: {reason}")]
    ProtocolViolation {
        stage: Stage,
        culprits: Vec<PartyIndex>,
        reason: String,
    },

    /// A peer's zero-knowledge proof did not verify
    #[error("Invalid {kind} proof at {stage} from {culprits:?}")]
    InvalidProof {
        stage: Stage,
        culprits: Vec<PartyIndex>,
        kind: ProofKind,
    },

    /// Proof rejected before it could be attributed to a stage and party
    #[error(transparent)]
    Proof(#[from] ProofError),

    /// Out-of-range scalar, point off the curve, ciphertext outside Z*_{N^2}
    #[error("Arithmetic error: {0}")]
    Arithmetic(String),

    /// Expected messages never arrived
    #[error("Missing messages at {stage} from {from:?}")]
    MissingMessage { stage: Stage, from: Vec<PartyIndex> },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Network/relay error
    #[error("Relay error: {0}")]
    Relay(String),

    /// Relayed messages of a round that could not be decoded
    #[error("Malformed message in round {round} from {from:?}: {reason}")]
    MalformedMessage {
        round: u32,
        from: Vec<PartyIndex>,
        reason: String,
    },

    /// Timeout waiting for messages of a round
    #[error("Timeout in round {round}, missing {missing:?}")]
    Timeout { round: u32, missing: Vec<PartyIndex> },

    /// Final signature failed ECDSA verification
    #[error("Invalid signature")]
    InvalidSignature,

    /// Key derivation error
    #[error("Key derivation error: {0}")]
    Derivation(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error identifies misbehaviour of a peer
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::ProtocolViolation { .. } | Error::InvalidProof { .. }
        )
    }

    /// Parties blamed for the abort, if any
    pub fn culprits(&self) -> &[PartyIndex] {
        match self {
            Error::ProtocolViolation { culprits, .. } | Error::InvalidProof { culprits, .. } => {
                culprits
            }
            Error::MissingMessage { from, .. } | Error::MalformedMessage { from, .. } => from,
            _ => &[],
        }
    }

    /// Stage the error is attributed to, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::ProtocolViolation { stage, .. }
            | Error::InvalidProof { stage, .. }
            | Error::MissingMessage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Attribute a peer-caused failure to `culprit` at `stage`.
    pub(crate) fn blame(self, stage: Stage, culprit: PartyIndex) -> Self {
        match self {
            Error::Proof(e) => Error::InvalidProof {
                stage,
                culprits: vec![culprit],
                kind: e.kind,
            },
            Error::Arithmetic(reason) => Error::ProtocolViolation {
                stage,
                culprits: vec![culprit],
                reason,
            },
            other => other,
        }
    }

    /// Attribute a relay failure to the stage consuming the round: timeouts
    /// become missing messages and undecodable messages blame their senders.
    pub(crate) fn at_stage(self, stage: Stage) -> Self {
        match self {
            Error::Timeout { missing, .. } => Error::MissingMessage {
                stage,
                from: missing,
            },
            Error::MalformedMessage { from, reason, .. } => Error::ProtocolViolation {
                stage,
                culprits: from,
                reason,
            },
            other => other,
        }
    }

    /// Merge per-peer failures of one stage into a single error naming every culprit.
    pub(crate) fn merge(errors: Vec<Error>) -> Option<Error> {
        let mut iter = errors.into_iter();
        let mut first = iter.next()?;
        for e in iter {
            let extra = e.culprits().to_vec();
            match &mut first {
                Error::ProtocolViolation { culprits, .. } | Error::InvalidProof { culprits, .. } => {
                    for c in extra {
                        if !culprits.contains(&c) {
                            culprits.push(c);
                        }
                    }
                }
                _ => break,
            }
        }
        Some(first)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
