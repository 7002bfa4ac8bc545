//! C6 — Sync Server. Read-only snapshot and hash-equality checks for
//! joining or resyncing miners.

use crate::crypto::sha256_hex;
use crate::error::CoreError;
use crate::models::SyncResponse;
use crate::store::SealedStore;

pub struct SyncServer<'a> {
    store: &'a SealedStore,
}

impl<'a> SyncServer<'a> {
    pub fn new(store: &'a SealedStore) -> Self {
        SyncServer { store }
    }

    pub async fn snapshot(&self) -> Result<SyncResponse, CoreError> {
        let chain = self.store.snapshot_chain().await;
        let bytes = serde_json::to_vec(&chain)?;
        Ok(SyncResponse { current_hash: sha256_hex(&bytes), content: chain })
    }

    pub async fn verify_hash(&self, candidate_hash: &str) -> Result<bool, CoreError> {
        let chain = self.store.snapshot_chain().await;
        let bytes = serde_json::to_vec(&chain)?;
        Ok(sha256_hex(&bytes) == candidate_hash)
    }
}
