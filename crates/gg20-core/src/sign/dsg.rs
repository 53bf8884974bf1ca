//! DSG protocol driver over a [`Relay`]

use super::messages::*;
use super::stages::CompletedOfflineStage;
use super::state_machine::SigningSession;
use crate::error::Stage;
use crate::keygen::LocalKey;
use crate::mpc::Relay;
use crate::{Error, Result, SessionConfig, Signature};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Relay round carrying the partial signatures
const PARTIAL_ROUND: u32 = 7;

fn outgoing<T>(session: &SigningSession, message: Option<&T>) -> Result<T>
where
    T: Clone,
{
    message
        .cloned()
        .ok_or_else(|| Error::Internal(format!("no outgoing message at {}", session.stage())))
}

async fn exchange<R, T>(
    relay: &R,
    config: &SessionConfig,
    round: u32,
    message: &T,
) -> Result<BTreeMap<crate::PartyIndex, T>>
where
    R: Relay,
    T: Serialize + DeserializeOwned + Send + Sync,
{
    relay
        .broadcast(&config.session_id, round, config.party_index, message)
        .await?;
    relay
        .collect_broadcasts(&config.session_id, round, &config.parties)
        .await
        .map_err(|e| e.at_stage(Stage::Sign(round as u8 + 1)))
}

/// Run signing stages 1-7 with the parties of `config`
///
/// The result does not depend on the message and may be stored; it must be
/// used for exactly one signature.
#[instrument(skip(relay, config, local_key), fields(party = config.party_index))]
pub async fn run_offline<R: Relay>(
    config: &SessionConfig,
    local_key: &LocalKey,
    relay: &R,
) -> Result<CompletedOfflineStage> {
    info!(
        party = config.party_index,
        signers = ?config.parties,
        "Starting offline signing"
    );
    if config.party_index != local_key.i {
        return Err(Error::InvalidConfig(format!(
            "Session is for party {} but the key belongs to {}",
            config.party_index, local_key.i
        )));
    }
    let me = config.party_index;
    let sid = &config.session_id;
    let peers = config.peers();

    let session = SigningSession::start(local_key.clone(), &config.parties).check()?;

    // Round 1: commitment to Gamma_i and Enc(k_i)
    debug!("DSG Round 1: Commitment and MtA request");
    let msg = outgoing(&session, session.round1_message())?;
    let round1 = exchange(relay, config, 1, &msg).await?;
    let session = session.proceed_stage2(round1).check()?;

    // Round 2: MtA answers, one per peer
    debug!("DSG Round 2: MtA answers");
    let messages = session
        .round2_messages()
        .ok_or_else(|| Error::Internal("no MtA answers".into()))?;
    for (to, msg) in messages {
        relay.send_direct(sid, 2, me, *to, msg).await?;
    }
    let round2 = relay
        .collect_direct::<SignRound2Message>(sid, 2, me, &peers)
        .await
        .map_err(|e| e.at_stage(Stage::Sign(3)))?;
    let session = session.proceed_stage3(round2).check()?;

    // Round 3: delta_i and T_i
    debug!("DSG Round 3: delta and T");
    let msg = outgoing(&session, session.round3_message())?;
    let round3 = exchange(relay, config, 3, &msg).await?;
    let session = session.proceed_stage4(round3).check()?;

    // Round 4: open Gamma_i
    debug!("DSG Round 4: Decommitment");
    let msg = outgoing(&session, session.round4_message())?;
    let round4 = exchange(relay, config, 4, &msg).await?;
    let session = session.proceed_stage5(round4).check()?;

    // Round 5: R_dash_i with PDL proofs
    debug!("DSG Round 5: R_dash");
    let msg = outgoing(&session, session.round5_message())?;
    let round5 = exchange(relay, config, 5, &msg).await?;
    let session = session.proceed_stage6(round5).check()?;

    // Round 6: S_i with consistency proof
    debug!("DSG Round 6: S");
    let msg = outgoing(&session, session.round6_message())?;
    let round6 = exchange(relay, config, 6, &msg).await?;
    let offline = session.proceed_stage7(round6).into_offline()?;

    info!(party = me, "Offline signing completed");
    Ok(offline)
}

/// Sign a 32-byte digest with a completed offline stage
#[instrument(skip_all, fields(party = config.party_index))]
pub async fn run_online<R: Relay>(
    config: &SessionConfig,
    offline: CompletedOfflineStage,
    message: &[u8; 32],
    relay: &R,
) -> Result<Signature> {
    if config.parties != offline.signers {
        return Err(Error::InvalidConfig(format!(
            "Offline stage was computed for {:?}, not {:?}",
            offline.signers, config.parties
        )));
    }
    let sid = &config.session_id;

    let session = SigningSession::from_offline(offline)
        .proceed_stage8(message)
        .check()?;
    let partial = outgoing(&session, session.partial_signature())?;
    relay
        .broadcast(sid, PARTIAL_ROUND, config.party_index, &partial)
        .await?;
    let partials = relay
        .collect_broadcasts::<PartialSignature>(sid, PARTIAL_ROUND, &config.parties)
        .await
        .map_err(|e| e.at_stage(Stage::Sign(9)))?;

    let signature = session.proceed_stage9(partials).into_signature()?;
    info!(
        party = config.party_index,
        r = hex::encode(signature.r),
        "Signature generated"
    );
    Ok(signature)
}

/// Run the complete signing protocol for a 32-byte digest
pub async fn run_dsg<R: Relay>(
    config: &SessionConfig,
    local_key: &LocalKey,
    message: &[u8; 32],
    relay: &R,
) -> Result<Signature> {
    let offline = run_offline(config, local_key, relay).await?;
    run_online(config, offline, message, relay).await
}
