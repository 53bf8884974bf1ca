//! DKG protocol driver over a [`Relay`]

use super::local_key::LocalKey;
use super::messages::{DLogProofMessage, KeyGenBroadcastMessage1, SecretShareMessage, VssMessage};
use super::stages::{
    stage1, stage2, stage3, stage4, KeygenConfig, KeygenStage1Input, KeygenStage2Input,
    KeygenStage3Input, KeygenStage4Input,
};
use crate::error::Stage;
use crate::mpc::Relay;
use crate::primitives::{Decommitment, VerifiableSS};
use crate::{Error, Result, SessionConfig};
use std::collections::BTreeMap;
use tracing::{debug, info, instrument};

/// Run the distributed key generation protocol
///
/// Four rounds: commitments, decommitments, Feldman shares, and proofs of
/// knowledge of the resulting key shares. Every party of `config.parties`
/// (all `n`) must run it with the same session id.
#[instrument(skip(relay, config), fields(party = config.party_index))]
pub async fn run_dkg<R: Relay>(
    config: &SessionConfig,
    keygen_config: &KeygenConfig,
    relay: &R,
) -> Result<LocalKey> {
    info!(
        party = config.party_index,
        n_parties = config.params.share_count,
        threshold = config.params.threshold,
        "Starting DKG"
    );
    let params = config.params;
    if config.parties != (1..=params.share_count).collect::<Vec<_>>() {
        return Err(Error::InvalidConfig(
            "DKG needs every party 1..=n".into(),
        ));
    }
    let me = config.party_index;
    let sid = &config.session_id;
    let peers = config.peers();

    // Round 1: Paillier keys, ring-Pedersen parameters and commitment to y_i
    debug!("DKG Round 1: Commitment");
    let out1 = stage1(&KeygenStage1Input {
        index: me,
        config: *keygen_config,
    })?;
    relay.broadcast(sid, 1, me, &out1.bc1).await?;
    let bc1s = relay
        .collect_broadcasts::<KeyGenBroadcastMessage1>(sid, 1, &config.parties)
        .await
        .map_err(|e| e.at_stage(Stage::Keygen(1)))?;

    // Round 2: Decommit
    debug!("DKG Round 2: Decommitment");
    relay.broadcast(sid, 2, me, &out1.decom1).await?;
    let decom1s = relay
        .collect_broadcasts::<Decommitment>(sid, 2, &config.parties)
        .await
        .map_err(|e| e.at_stage(Stage::Keygen(2)))?;

    let out2 = stage2(&KeygenStage2Input {
        key: &out1.key,
        params,
        bc1s: &bc1s,
        decom1s: &decom1s,
    })?;

    // Round 3: Feldman commitments to everyone, one share to each peer
    debug!("DKG Round 3: Secret sharing");
    relay
        .broadcast(
            sid,
            3,
            me,
            &VssMessage {
                vss_scheme: out2.vss_scheme.clone(),
            },
        )
        .await?;
    for peer in &peers {
        let msg = SecretShareMessage {
            share: out2.secret_shares[peer],
        };
        relay.send_direct(sid, 3, me, *peer, &msg).await?;
    }

    let vss_schemes: BTreeMap<_, VerifiableSS> = relay
        .collect_broadcasts::<VssMessage>(sid, 3, &config.parties)
        .await
        .map_err(|e| e.at_stage(Stage::Keygen(3)))?
        .into_iter()
        .map(|(j, msg)| (j, msg.vss_scheme))
        .collect();
    let mut party_shares: BTreeMap<_, _> = relay
        .collect_direct::<SecretShareMessage>(sid, 3, me, &peers)
        .await
        .map_err(|e| e.at_stage(Stage::Keygen(3)))?
        .into_iter()
        .map(|(j, msg)| (j, msg.share))
        .collect();
    party_shares.insert(me, out2.secret_shares[&me]);

    let ys: BTreeMap<_, _> = decom1s.iter().map(|(j, d)| (*j, d.point)).collect();
    let out3 = stage3(&KeygenStage3Input {
        key: &out1.key,
        params,
        ys: &ys,
        vss_schemes: &vss_schemes,
        party_shares: &party_shares,
    })?;

    // Round 4: Proof of knowledge of x_i
    debug!("DKG Round 4: Verification");
    relay
        .broadcast(
            sid,
            4,
            me,
            &DLogProofMessage {
                dlog_proof: out3.dlog_proof.clone(),
            },
        )
        .await?;
    let dlog_proofs: BTreeMap<_, _> = relay
        .collect_broadcasts::<DLogProofMessage>(sid, 4, &config.parties)
        .await
        .map_err(|e| e.at_stage(Stage::Keygen(4)))?
        .into_iter()
        .map(|(j, msg)| (j, msg.dlog_proof))
        .collect();

    let out4 = stage4(&KeygenStage4Input {
        params,
        ys: &ys,
        vss_schemes: &vss_schemes,
        dlog_proofs: &dlog_proofs,
    })?;

    let local_key = LocalKey::new(&out1.key, &bc1s, out3.shared_key, out4, &params);

    info!(
        party = me,
        public_key = hex::encode(local_key.public_key_bytes()?),
        "DKG completed successfully"
    );

    Ok(local_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpc::MemoryRelay;
    use crate::test_utils::init_tracing;
    use std::sync::Arc;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_dkg_over_relay() {
        init_tracing();
        let relay = Arc::new(MemoryRelay::new());
        let session_id = [7u8; 32];
        let (t, n) = (1, 3);

        let handles: Vec<_> = (1..=n)
            .map(|i| {
                let relay = relay.clone();
                tokio::spawn(async move {
                    let config = SessionConfig::keygen(session_id, t, n, i).unwrap();
                    run_dkg(&config, &KeygenConfig::default(), relay.as_ref()).await
                })
            })
            .collect();

        let mut keys = Vec::new();
        for handle in handles {
            keys.push(handle.await.unwrap().unwrap());
        }

        let y = keys[0].public_key();
        for key in &keys {
            key.validate().unwrap();
            assert_eq!(key.public_key(), y);
        }

        let indices = [1, 3];
        let shares = [keys[0].keys_linear.x_i, keys[2].keys_linear.x_i];
        let x = keys[0].vss_scheme.reconstruct(&indices, &shares).unwrap();
        assert_eq!(k256::ProjectivePoint::GENERATOR * x, y);
    }

    #[tokio::test]
    async fn test_dkg_rejects_partial_party_set() {
        let relay = MemoryRelay::new();
        let mut config = SessionConfig::keygen([0u8; 32], 1, 3, 1).unwrap();
        config.parties = vec![1, 2];
        let err = run_dkg(&config, &KeygenConfig::default(), &relay)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
