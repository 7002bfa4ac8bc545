//! Archival Miner role — the local mining task spawned on receipt of a raw
//! block. Runs on a blocking thread since nonce search is CPU-bound, then
//! reports the hashed block back to the Master over the peer client.

use chrono::Utc;

use crate::client::PeerClient;
use crate::crypto::{meets_difficulty, sha256_hex};
use crate::models::{Block, ConsensusFromMasterPayload, ConsensusToMasterPayload};

/// Spawns a background task that mines `payload.block` to the configured
/// difficulty and reports the result to `payload.master_address`. Errors are
/// logged; the Master will re-dispatch the same block on its next tick if no
/// report arrives.
pub fn spawn_mining_task(client: PeerClient, self_address: String, difficulty: usize, payload: ConsensusFromMasterPayload) {
    tokio::spawn(async move {
        let mined = tokio::task::spawn_blocking(move || mine(payload.block, difficulty)).await;

        let mined_block = match mined {
            Ok(block) => block,
            Err(err) => {
                tracing::error!(error = %err, "mining task panicked");
                return;
            }
        };

        let report = ConsensusToMasterPayload {
            block: mined_block,
            miner_address: self_address,
            consensus_negotiation_id: payload.consensus_negotiation_id,
            consensus_sleep_expiration: Utc::now(),
        };

        if let Err(err) = client.report_hashed_block(&payload.master_address, &report).await {
            tracing::warn!(error = %err, "failed to report mined block to master");
        }
    });
}

/// Iterates nonce values until the block's hash meets the difficulty target.
fn mine(mut block: Block, difficulty: usize) -> Block {
    loop {
        let bytes = block
            .canonical_bytes()
            .expect("a block produced by the master always serializes");
        let hash = sha256_hex(&bytes);
        if meets_difficulty(&hash, difficulty) {
            block.hash_block = hash;
            return block;
        }
        block.nonce += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BlockContents;

    #[test]
    fn mine_finds_a_hash_meeting_difficulty() {
        let block = Block {
            id: 1,
            prev_hash_block: "0".repeat(64),
            hash_block: String::new(),
            block_size_bytes: 0,
            nonce: 0,
            contents: BlockContents { timestamp: Utc::now(), transactions: vec![] },
        };

        let mined = mine(block, 1);
        assert!(meets_difficulty(&mined.hash_block, 1));
    }
}
