//! C5 — Consensus Dispatcher. Selects an eligible miner, dispatches a raw
//! block, tracks the negotiation, and validates the returned mined block.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::builder::BuilderHandle;
use crate::client::PeerClient;
use crate::error::CoreError;
use crate::models::{
    Block, ConsensusNegotiation, ConsensusSuccessPayload, ConsensusToMasterPayload, NegotiationStatus,
    Transaction, TransactionPayload,
};
use crate::registry::ClusterRegistry;
use crate::store::SealedStore;

pub struct ConsensusDispatcher {
    registry: Arc<ClusterRegistry>,
    builder: BuilderHandle,
    store: Arc<SealedStore>,
    client: PeerClient,
    master_address: String,
    block_timer_seconds: u64,
}

impl ConsensusDispatcher {
    pub fn new(
        registry: Arc<ClusterRegistry>,
        builder: BuilderHandle,
        store: Arc<SealedStore>,
        client: PeerClient,
        master_address: String,
        block_timer_seconds: u64,
    ) -> Self {
        ConsensusDispatcher { registry, builder, store, client, master_address, block_timer_seconds }
    }

    /// One scheduler tick: wake any sleepers past their deadline, seal a
    /// block if there's pending work, and dispatch it to an eligible miner.
    pub async fn tick(&self) -> Result<(), CoreError> {
        self.registry.wake_expired_sleepers().await?;

        if !self.builder.has_eligible_pending_work().await {
            return Ok(());
        }

        let Some(miner) = self.registry.pick_eligible_miner().await? else {
            return Ok(());
        };

        let Some(raw_block) = self.builder.seal_next_block().await? else {
            return Ok(());
        };

        self.dispatch_to(&miner, raw_block).await
    }

    async fn dispatch_to(&self, miner_address: &str, block: Block) -> Result<(), CoreError> {
        let consensus_negotiation_id = Uuid::new_v4().to_string();

        self.registry.relational().delete_negotiation_for_block(block.id).await?;
        self.registry
            .relational()
            .insert_negotiation(&ConsensusNegotiation {
                consensus_negotiation_id: consensus_negotiation_id.clone(),
                block_no_ref: block.id,
                peer_address: miner_address.to_string(),
                status: NegotiationStatus::OnProgress,
            })
            .await?;

        let associated = self
            .registry
            .relational()
            .all_associated_nodes()
            .await?
            .into_iter()
            .find(|node| node.user_address == miner_address)
            .ok_or_else(|| CoreError::Protocol("picked miner is no longer registered".into()))?;

        let dispatched = self
            .client
            .dispatch_block(
                &associated.source_address,
                associated.source_port,
                &block,
                &self.master_address,
                &consensus_negotiation_id,
            )
            .await;

        match dispatched {
            Ok(()) => {
                self.registry.mark_mining(miner_address).await?;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(%miner_address, error = %err, "dispatch failed, marking miner unreachable");
                self.registry.mark_unreachable(miner_address).await?;
                Err(err)
            }
        }
    }

    /// Handles a miner's returned, hashed block. Returns the sleep-addon
    /// payload on success.
    pub async fn receive_hashed_block(
        &self,
        payload: ConsensusToMasterPayload,
    ) -> Result<ConsensusSuccessPayload, CoreError> {
        let accepted = self.builder.try_append_confirmed(payload.block.clone()).await?;
        if !accepted {
            return Err(CoreError::Protocol("returned block did not match the confirming entry".into()));
        }

        self.store.append_and_seal(payload.block).await?;

        let addon_seconds = rand::thread_rng().gen_range(0.0..2.0) * self.block_timer_seconds as f64;
        let sleep_until: DateTime<Utc> =
            payload.consensus_sleep_expiration + chrono::Duration::milliseconds((addon_seconds * 1000.0) as i64);
        self.registry
            .complete_negotiation_and_sleep(&payload.consensus_negotiation_id, &payload.miner_address, sleep_until)
            .await?;

        let conclude_tx = Transaction {
            id: Uuid::new_v4(),
            payload: TransactionPayload::NodeGeneralConsensusConcludeNegotiationProcessing {
                miner_address: payload.miner_address,
                master_address: self.master_address.clone(),
                consensus_negotiation_id: payload.consensus_negotiation_id,
            },
        };
        self.builder.enqueue_transaction(conclude_tx).await;

        Ok(ConsensusSuccessPayload {
            addon_consensus_sleep_seconds: addon_seconds,
            reiterate_master_address: self.master_address.clone(),
        })
    }
}
