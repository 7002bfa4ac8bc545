//! C1 — Sealed Store. Owns the encrypted chain file, the relational
//! database, and the startup state machine that reconciles their presence
//! against the key file.

pub mod relational;
pub mod sealed_file;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::Config;
use crate::error::CoreError;
use crate::models::{Chain, NodeRole};
use relational::RelationalStore;
use sealed_file::KeyMaterial;

const CHAIN_FILE_SIGNATURE_KEY: &str = "folioblocks-chain.json";

pub struct SealedStore {
    chain_path: PathBuf,
    key_material: KeyMaterial,
    relational: RelationalStore,
    chain: Arc<Mutex<Chain>>,
    role: NodeRole,
}

impl SealedStore {
    /// Implements the startup contract of §4.1: inspects which of the chain
    /// file, database file, and key file exist and either bootstraps a fresh
    /// store, opens an existing one, or aborts with a configuration error.
    pub async fn open(config: &Config) -> Result<Self, CoreError> {
        let chain_path = config.chain_file_path();
        let db_path = config.db_file_path();
        let key_path = &config.key_file;

        let chain_present = chain_path.is_file();
        let db_present = db_path.is_file();
        let key_present = key_path.is_file();

        match (chain_present, db_present, key_present) {
            (false, false, false) => {
                Self::bootstrap(config, &chain_path, &db_path, key_path).await?;
                Err(CoreError::Configuration(
                    "bootstrap complete: key material generated, restart the node".into(),
                ))
            }
            (true, true, true) => {
                Self::open_existing(config, &chain_path, &db_path, key_path).await
            }
            (true, true, false) => Err(CoreError::Configuration(
                "chain and database files exist but the key file is missing".into(),
            )),
            _ => Err(CoreError::Configuration(
                "corrupted data directory layout: chain/database presence disagrees".into(),
            )),
        }
    }

    async fn bootstrap(
        config: &Config,
        chain_path: &Path,
        db_path: &Path,
        key_path: &Path,
    ) -> Result<(), CoreError> {
        let relational = RelationalStore::open(db_path).await?;
        drop(relational);

        let chain = sealed_file::chain_template();
        let chain_bytes = serde_json::to_vec(&chain)?;
        let chain_hash = sealed_file::hash_chain(&chain)?;

        let key_material = KeyMaterial::generate(config.node_role());
        sealed_file::seal_file(chain_path, &key_material.auth_key, chain_bytes).await?;

        let relational = RelationalStore::open(db_path).await?;
        relational.upsert_file_signature(CHAIN_FILE_SIGNATURE_KEY, &chain_hash).await?;
        drop(relational);

        key_material.write(key_path).await?;
        tracing::info!("bootstrap complete, key material written to {}", key_path.display());
        Ok(())
    }

    async fn open_existing(
        config: &Config,
        chain_path: &Path,
        db_path: &Path,
        key_path: &Path,
    ) -> Result<Self, CoreError> {
        let key_material = KeyMaterial::read(key_path).await?;
        let relational = RelationalStore::open(db_path).await?;

        let chain_bytes = sealed_file::open_sealed_file(chain_path, &key_material.auth_key).await?;
        let chain: Chain = serde_json::from_slice(&chain_bytes)?;
        let recomputed_hash = crate::crypto::sha256_hex(&chain_bytes);
        let recorded_hash = relational.file_signature(CHAIN_FILE_SIGNATURE_KEY).await?;

        match recorded_hash {
            Some(recorded) if recorded == recomputed_hash => {
                tracing::info!("chain integrity verified on open");
            }
            Some(recorded) => {
                let message = format!(
                    "chain integrity mismatch: recorded {recorded} recomputed {recomputed_hash}"
                );
                match config.node_role() {
                    NodeRole::Master => return Err(CoreError::Integrity(message)),
                    NodeRole::ArchivalMiner => {
                        tracing::error!("{message}; miner will resync from the master");
                    }
                }
            }
            None => {
                tracing::warn!("no recorded chain signature found, recording current hash");
                relational.upsert_file_signature(CHAIN_FILE_SIGNATURE_KEY, &recomputed_hash).await?;
            }
        }

        Ok(SealedStore {
            chain_path: chain_path.to_path_buf(),
            key_material,
            relational,
            chain: Arc::new(Mutex::new(chain)),
            role: config.node_role(),
        })
    }

    pub fn relational(&self) -> &RelationalStore {
        &self.relational
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn auth_key(&self) -> &[u8] {
        &self.key_material.auth_key
    }

    pub fn secret_key(&self) -> &[u8] {
        &self.key_material.secret_key
    }

    pub async fn snapshot_chain(&self) -> Chain {
        self.chain.lock().await.clone()
    }

    /// Appends `block` to the in-memory chain and reseals the chain file,
    /// updating the recorded signature. Callers must have already validated
    /// the block against the builder's confirming set.
    pub async fn append_and_seal(&self, block: crate::models::Block) -> Result<(), CoreError> {
        let mut chain = self.chain.lock().await;
        chain.chain.push(block);
        let bytes = serde_json::to_vec(&*chain)?;
        let hash = crate::crypto::sha256_hex(&bytes);
        sealed_file::seal_file(&self.chain_path, &self.key_material.auth_key, bytes).await?;
        self.relational.upsert_file_signature(CHAIN_FILE_SIGNATURE_KEY, &hash).await?;
        Ok(())
    }

    /// Recomputes and reseals the chain signature on shutdown.
    pub async fn seal_on_shutdown(&self) -> Result<(), CoreError> {
        let chain = self.chain.lock().await;
        let bytes = serde_json::to_vec(&*chain)?;
        let hash = crate::crypto::sha256_hex(&bytes);
        sealed_file::seal_file(&self.chain_path, &self.key_material.auth_key, bytes).await?;
        self.relational.upsert_file_signature(CHAIN_FILE_SIGNATURE_KEY, &hash).await?;
        Ok(())
    }
}
