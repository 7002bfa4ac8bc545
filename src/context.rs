//! The explicit root value constructed once at startup and threaded through
//! axum's `State` extractor, replacing a process-wide singleton.

use std::sync::Arc;

use crate::builder::BuilderHandle;
use crate::client::PeerClient;
use crate::config::Config;
use crate::dispatcher::ConsensusDispatcher;
use crate::error::CoreError;
use crate::models::NodeRole;
use crate::registry::ClusterRegistry;
use crate::store::SealedStore;

#[derive(Clone)]
pub struct CoreContext {
    pub store: Arc<SealedStore>,
    pub registry: Arc<ClusterRegistry>,
    pub builder: BuilderHandle,
    pub dispatcher: Arc<ConsensusDispatcher>,
    pub client: PeerClient,
    pub self_address: String,
    pub role: NodeRole,
    pub block_timer_seconds: u64,
    pub difficulty: usize,
}

impl CoreContext {
    pub async fn bootstrap(config: &Config) -> Result<Self, CoreError> {
        let store = Arc::new(SealedStore::open(config).await?);

        let chain = store.snapshot_chain().await;
        let (next_block_id, last_hash) = match chain.chain.last() {
            Some(block) => (block.id + 1, block.hash_block.clone()),
            None => (0, crate::models::genesis_prev_hash()),
        };

        let registry = Arc::new(ClusterRegistry::new(store.relational().clone(), config.master_node_limit));

        let builder = if chain.chain.is_empty() {
            let genesis = crate::builder::genesis_block();
            store.append_and_seal(genesis.clone()).await?;
            BuilderHandle::spawn(genesis.id + 1, genesis.hash_block, config.difficulty)
        } else {
            BuilderHandle::spawn(next_block_id, last_hash, config.difficulty)
        };

        let client = PeerClient::new(config.peer_retry_budget);
        let self_address = format!("{}:{}", config.bind_address, config.bind_port);

        let dispatcher = Arc::new(ConsensusDispatcher::new(
            registry.clone(),
            builder.clone(),
            store.clone(),
            client.clone(),
            self_address.clone(),
            config.block_timer_seconds,
        ));

        Ok(CoreContext {
            store,
            registry,
            builder,
            dispatcher,
            client,
            self_address,
            role: config.node_role(),
            block_timer_seconds: config.block_timer_seconds,
            difficulty: config.difficulty,
        })
    }
}
