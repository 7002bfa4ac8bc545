//! C4 — Block Builder. Accumulates transactions, seals raw blocks for
//! dispatch, and validates/appends confirmed returns.
//!
//! The builder and the dispatcher (C5) naturally want references to each
//! other — the dispatcher asks the builder to seal and append, while the
//! builder's internal transactions originate from events the dispatcher
//! observes. Rather than wiring that as a cyclic graph of shared mutable
//! references, the builder runs as a single task that owns its state
//! exclusively and is driven entirely through a command queue; callers only
//! ever see a cloneable [`BuilderHandle`].

use std::collections::VecDeque;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::crypto::{meets_difficulty, sha256_hex};
use crate::error::CoreError;
use crate::models::{Block, BlockContents, Transaction, TransactionPayload};

struct BlockBuilder {
    pending_transactions: VecDeque<Transaction>,
    confirming_block_container: VecDeque<Block>,
    cached_block_id: i64,
    last_appended_hash: String,
    difficulty: usize,
}

impl BlockBuilder {
    fn enqueue_transaction(&mut self, transaction: Transaction) {
        tracing::debug!(action = ?transaction.payload.action(), "transaction enqueued");
        self.pending_transactions.push_back(transaction);
    }

    fn has_eligible_pending_work(&self) -> bool {
        !self.pending_transactions.is_empty()
    }

    fn seal_next_block(&mut self) -> Result<Option<Block>, CoreError> {
        if self.pending_transactions.is_empty() {
            return Ok(None);
        }

        let transactions: Vec<Transaction> = self.pending_transactions.drain(..).collect();
        let contents = BlockContents { timestamp: Utc::now(), transactions };
        let mut block = Block {
            id: self.cached_block_id,
            prev_hash_block: self.last_appended_hash.clone(),
            hash_block: String::new(),
            block_size_bytes: 0,
            nonce: 0,
            contents,
        };
        let bytes = block.canonical_bytes()?;
        block.block_size_bytes = bytes.len() as u64;

        self.confirming_block_container.push_back(block.clone());
        Ok(Some(block))
    }

    /// Only the entry at the front of the confirming set is ever considered,
    /// matching the append invariant that the front always holds the block
    /// whose id equals `cached_block_id`. An id that doesn't match is a
    /// drifted/stale return and is reported distinctly from a same-id
    /// content mismatch, since the two map to different response codes.
    fn try_append_confirmed(&mut self, candidate: &Block) -> Result<bool, CoreError> {
        if candidate.id != self.cached_block_id {
            return Err(CoreError::IdDrift(format!(
                "returned block id {} does not match expected id {}",
                candidate.id, self.cached_block_id
            )));
        }

        let Some(front) = self.confirming_block_container.front() else {
            return Ok(false);
        };

        let matches = front.id == candidate.id
            && front.block_size_bytes == candidate.block_size_bytes
            && front.prev_hash_block == candidate.prev_hash_block
            && front.contents.timestamp == candidate.contents.timestamp;

        if !matches {
            return Ok(false);
        }

        if !meets_difficulty(&candidate.hash_block, self.difficulty) {
            return Err(CoreError::Protocol("returned block does not meet difficulty target".into()));
        }
        let expected_hash = sha256_hex(&candidate.canonical_bytes()?);
        if expected_hash != candidate.hash_block {
            return Err(CoreError::Protocol("returned block hash does not match its contents".into()));
        }

        self.confirming_block_container.pop_front();
        self.cached_block_id += 1;
        self.last_appended_hash = candidate.hash_block.clone();
        Ok(true)
    }
}

pub fn genesis_block() -> Block {
    let genesis_tx = Transaction { id: Uuid::new_v4(), payload: TransactionPayload::GenesisInitialization };
    let contents = BlockContents { timestamp: Utc::now(), transactions: vec![genesis_tx] };
    let mut block = Block {
        id: 0,
        prev_hash_block: crate::models::genesis_prev_hash(),
        hash_block: String::new(),
        block_size_bytes: 0,
        nonce: 0,
        contents,
    };
    let bytes = block.canonical_bytes().expect("genesis block always serializes");
    block.block_size_bytes = bytes.len() as u64;
    block.hash_block = sha256_hex(&bytes);
    block
}

enum BuilderCommand {
    Enqueue(Transaction),
    HasPending(oneshot::Sender<bool>),
    SealNext(oneshot::Sender<Result<Option<Block>, CoreError>>),
    TryAppendConfirmed(Box<Block>, oneshot::Sender<Result<bool, CoreError>>),
    CachedBlockId(oneshot::Sender<i64>),
}

#[derive(Clone)]
pub struct BuilderHandle {
    sender: mpsc::Sender<BuilderCommand>,
}

impl BuilderHandle {
    /// `next_block_id`/`last_hash` seed from the store's current chain tip
    /// so a restarted process resumes exactly where it left off.
    pub fn spawn(next_block_id: i64, last_hash: String, difficulty: usize) -> Self {
        let mut builder = BlockBuilder {
            pending_transactions: VecDeque::new(),
            confirming_block_container: VecDeque::new(),
            cached_block_id: next_block_id,
            last_appended_hash: last_hash,
            difficulty,
        };

        let (sender, mut receiver) = mpsc::channel(128);
        tokio::spawn(async move {
            while let Some(command) = receiver.recv().await {
                match command {
                    BuilderCommand::Enqueue(transaction) => builder.enqueue_transaction(transaction),
                    BuilderCommand::HasPending(reply) => {
                        let _ = reply.send(builder.has_eligible_pending_work());
                    }
                    BuilderCommand::SealNext(reply) => {
                        let _ = reply.send(builder.seal_next_block());
                    }
                    BuilderCommand::TryAppendConfirmed(candidate, reply) => {
                        let _ = reply.send(builder.try_append_confirmed(&candidate));
                    }
                    BuilderCommand::CachedBlockId(reply) => {
                        let _ = reply.send(builder.cached_block_id);
                    }
                }
            }
        });

        BuilderHandle { sender }
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> BuilderCommand) -> T {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .expect("builder task outlives its handles");
        reply_rx.await.expect("builder task never drops a reply sender")
    }

    pub async fn enqueue_transaction(&self, transaction: Transaction) {
        let _ = self.sender.send(BuilderCommand::Enqueue(transaction)).await;
    }

    pub async fn has_eligible_pending_work(&self) -> bool {
        self.call(BuilderCommand::HasPending).await
    }

    pub async fn seal_next_block(&self) -> Result<Option<Block>, CoreError> {
        self.call(BuilderCommand::SealNext).await
    }

    pub async fn try_append_confirmed(&self, candidate: Block) -> Result<bool, CoreError> {
        self.call(|reply| BuilderCommand::TryAppendConfirmed(Box::new(candidate), reply)).await
    }

    pub async fn cached_block_id(&self) -> i64 {
        self.call(BuilderCommand::CachedBlockId).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_transaction() -> Transaction {
        Transaction {
            id: Uuid::new_v4(),
            payload: TransactionPayload::AccountGenerated { owner_address: "fl-test".into() },
        }
    }

    #[test]
    fn genesis_block_has_sentinel_prev_hash() {
        let genesis = genesis_block();
        assert_eq!(genesis.id, 0);
        assert_eq!(genesis.prev_hash_block, "0".repeat(64));
    }

    #[tokio::test]
    async fn seal_then_append_advances_cached_id() {
        let genesis = genesis_block();
        let builder = BuilderHandle::spawn(genesis.id + 1, genesis.hash_block.clone(), 1);
        builder.enqueue_transaction(sample_transaction()).await;
        let mut raw = builder.seal_next_block().await.unwrap().unwrap();

        loop {
            let bytes = raw.canonical_bytes().unwrap();
            let hash = sha256_hex(&bytes);
            if meets_difficulty(&hash, 1) {
                raw.hash_block = hash;
                break;
            }
            raw.nonce += 1;
        }

        assert!(builder.try_append_confirmed(raw).await.unwrap());
        assert_eq!(builder.cached_block_id().await, genesis.id + 2);
    }

    #[tokio::test]
    async fn id_drift_is_rejected_without_mutation() {
        let builder = BuilderHandle::spawn(5, "deadbeef".into(), 1);
        builder.enqueue_transaction(sample_transaction()).await;
        let mut raw = builder.seal_next_block().await.unwrap().unwrap();
        raw.id = 6;
        raw.hash_block = "0".into();
        let err = builder.try_append_confirmed(raw).await.unwrap_err();
        assert!(matches!(err, CoreError::IdDrift(_)));
        assert_eq!(builder.cached_block_id().await, 5);
    }

    #[tokio::test]
    async fn content_mismatch_at_matching_id_is_rejected_without_mutation() {
        let builder = BuilderHandle::spawn(5, "deadbeef".into(), 1);
        builder.enqueue_transaction(sample_transaction()).await;
        let mut raw = builder.seal_next_block().await.unwrap().unwrap();
        raw.prev_hash_block = "tampered".into();
        raw.hash_block = "0".into();
        assert!(!builder.try_append_confirmed(raw).await.unwrap());
        assert_eq!(builder.cached_block_id().await, 5);
    }

    #[tokio::test]
    async fn duplicate_confirmation_only_admits_first_match() {
        let builder = BuilderHandle::spawn(0, "0".repeat(64), 1);
        builder.enqueue_transaction(sample_transaction()).await;
        let mut raw = builder.seal_next_block().await.unwrap().unwrap();
        loop {
            let hash = sha256_hex(&raw.canonical_bytes().unwrap());
            if meets_difficulty(&hash, 1) {
                raw.hash_block = hash;
                break;
            }
            raw.nonce += 1;
        }

        assert!(builder.try_append_confirmed(raw.clone()).await.unwrap());
        assert!(!builder.try_append_confirmed(raw).await.unwrap());
    }
}
