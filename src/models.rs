//! Wire and persistence types shared across the consensus core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 64 `'0'` hex characters, matching a SHA-256 digest width.
pub fn genesis_prev_hash() -> String {
    "0".repeat(64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeRole {
    Master,
    ArchivalMiner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MinerStatus {
    CurrentlyAvailable,
    CurrentlyMining,
    CurrentlySleeping,
    NotReachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NegotiationStatus {
    OnProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenState {
    CreatedForUse,
    Expired,
    LoggedOut,
}

/// Closed set of reasons a transaction was appended. Internal variants are
/// emitted by the core itself; the remainder are recorded on its behalf by
/// the out-of-scope dashboard/admin subsystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionAction {
    GenesisInitialization,
    NodeGeneralConsensusInit,
    NodeGeneralConsensusBlockSync,
    NodeGeneralConsensusConcludeNegotiationProcessing,
    AccountGenerated,
    DocumentIssuance,
    RequestInitiation,
    RequestMarkedEnded,
    RequestSpecificDoc,
}

impl TransactionAction {
    pub fn is_internal(self) -> bool {
        matches!(
            self,
            TransactionAction::GenesisInitialization
                | TransactionAction::NodeGeneralConsensusInit
                | TransactionAction::NodeGeneralConsensusBlockSync
                | TransactionAction::NodeGeneralConsensusConcludeNegotiationProcessing
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionPayload {
    GenesisInitialization,
    NodeGeneralConsensusInit {
        miner_address: String,
    },
    NodeGeneralConsensusBlockSync {
        requester_address: String,
    },
    NodeGeneralConsensusConcludeNegotiationProcessing {
        miner_address: String,
        master_address: String,
        consensus_negotiation_id: String,
    },
    AccountGenerated {
        owner_address: String,
    },
    DocumentIssuance {
        owner_address: String,
        document_hash: String,
    },
    RequestInitiation {
        owner_address: String,
        context: String,
    },
    RequestMarkedEnded {
        owner_address: String,
    },
    RequestSpecificDoc {
        owner_address: String,
        document_hash: String,
    },
}

impl TransactionPayload {
    pub fn action(&self) -> TransactionAction {
        match self {
            TransactionPayload::GenesisInitialization => TransactionAction::GenesisInitialization,
            TransactionPayload::NodeGeneralConsensusInit { .. } => {
                TransactionAction::NodeGeneralConsensusInit
            }
            TransactionPayload::NodeGeneralConsensusBlockSync { .. } => {
                TransactionAction::NodeGeneralConsensusBlockSync
            }
            TransactionPayload::NodeGeneralConsensusConcludeNegotiationProcessing { .. } => {
                TransactionAction::NodeGeneralConsensusConcludeNegotiationProcessing
            }
            TransactionPayload::AccountGenerated { .. } => TransactionAction::AccountGenerated,
            TransactionPayload::DocumentIssuance { .. } => TransactionAction::DocumentIssuance,
            TransactionPayload::RequestInitiation { .. } => TransactionAction::RequestInitiation,
            TransactionPayload::RequestMarkedEnded { .. } => TransactionAction::RequestMarkedEnded,
            TransactionPayload::RequestSpecificDoc { .. } => TransactionAction::RequestSpecificDoc,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: uuid::Uuid,
    #[serde(flatten)]
    pub payload: TransactionPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockContents {
    pub timestamp: DateTime<Utc>,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub id: i64,
    pub prev_hash_block: String,
    #[serde(default)]
    pub hash_block: String,
    pub block_size_bytes: u64,
    /// Value a miner varies while searching for a hash that meets the
    /// difficulty target; does not affect `block_size_bytes`, which is
    /// frozen at seal time.
    #[serde(default)]
    pub nonce: u64,
    pub contents: BlockContents,
}

impl Block {
    /// Canonical bytes used for hashing: the block with `hash_block` cleared.
    pub fn canonical_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let mut unsealed = self.clone();
        unsealed.hash_block = String::new();
        serde_json::to_vec(&unsealed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chain {
    pub chain: Vec<Block>,
}

impl Default for Chain {
    fn default() -> Self {
        Chain { chain: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssociatedNode {
    pub user_address: String,
    pub certificate: String,
    pub source_address: String,
    pub source_port: u16,
    pub status: MinerStatus,
    pub consensus_sleep_expiration: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusNegotiation {
    pub consensus_negotiation_id: String,
    pub block_no_ref: i64,
    pub peer_address: String,
    pub status: NegotiationStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSignature {
    pub file_name: String,
    pub hash_sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInformation {
    pub role: NodeRole,
    pub is_sleeping: bool,
    pub is_mining: bool,
    pub consensus_timer_seconds: u64,
    pub last_mined_block: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HandshakeRequest {
    pub source_address: String,
    pub source_port: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct HandshakeResponse {
    pub certificate_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusFromMasterPayload {
    pub block: Block,
    pub master_address: String,
    pub consensus_negotiation_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusToMasterPayload {
    pub block: Block,
    pub miner_address: String,
    pub consensus_negotiation_id: String,
    pub consensus_sleep_expiration: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConsensusSuccessPayload {
    pub addon_consensus_sleep_seconds: f64,
    pub reiterate_master_address: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResponse {
    pub current_hash: String,
    pub content: Chain,
}
