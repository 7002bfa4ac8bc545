//! Key-file parsing and chain-file sealing/opening.

use std::collections::BTreeMap;
use std::path::Path;

use rand::RngCore;

use crate::crypto::{sha256_hex, SealingKey};
use crate::error::CoreError;
use crate::models::{Chain, NodeRole};

/// Length, in raw bytes, of the `AUTH_KEY` material. Hex-encoded this comes
/// out to twice as many characters; the original system's Fernet key is 44
/// base64 characters, which this is sized to comfortably exceed.
const AUTH_KEY_BYTES: usize = 32;
const SECRET_KEY_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub auth_key: Vec<u8>,
    pub secret_key: Vec<u8>,
    pub email_server_address: Option<String>,
    pub email_server_pwd: Option<String>,
}

impl KeyMaterial {
    pub fn generate(role: NodeRole) -> Self {
        let mut rng = rand::thread_rng();
        let mut auth_key = vec![0u8; AUTH_KEY_BYTES];
        rng.fill_bytes(&mut auth_key);
        let mut secret_key = vec![0u8; SECRET_KEY_BYTES];
        rng.fill_bytes(&mut secret_key);

        let (email_server_address, email_server_pwd) = match role {
            NodeRole::Master => (
                Some("changeme@example.com".to_string()),
                Some("changeme".to_string()),
            ),
            NodeRole::ArchivalMiner => (None, None),
        };

        KeyMaterial { auth_key, secret_key, email_server_address, email_server_pwd }
    }

    pub async fn write(&self, path: &Path) -> Result<(), CoreError> {
        let mut contents = String::new();
        contents.push_str(&format!("AUTH_KEY={}\n", hex::encode(&self.auth_key)));
        contents.push_str(&format!("SECRET_KEY={}\n", hex::encode(&self.secret_key)));
        if let Some(addr) = &self.email_server_address {
            contents.push_str(&format!("EMAIL_SERVER_ADDRESS={addr}\n"));
        }
        if let Some(pwd) = &self.email_server_pwd {
            contents.push_str(&format!("EMAIL_SERVER_PWD={pwd}\n"));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        Ok(())
    }

    pub async fn read(path: &Path) -> Result<Self, CoreError> {
        let raw = tokio::fs::read_to_string(path).await?;
        let mut values: BTreeMap<String, String> = BTreeMap::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        let auth_key = values
            .get("AUTH_KEY")
            .ok_or_else(|| CoreError::Configuration("key file missing AUTH_KEY".into()))
            .and_then(|v| hex::decode(v).map_err(|e| CoreError::Configuration(format!("invalid AUTH_KEY: {e}"))))?;
        let secret_key = values
            .get("SECRET_KEY")
            .ok_or_else(|| CoreError::Configuration("key file missing SECRET_KEY".into()))
            .and_then(|v| hex::decode(v).map_err(|e| CoreError::Configuration(format!("invalid SECRET_KEY: {e}"))))?;

        Ok(KeyMaterial {
            auth_key,
            secret_key,
            email_server_address: values.get("EMAIL_SERVER_ADDRESS").cloned(),
            email_server_pwd: values.get("EMAIL_SERVER_PWD").cloned(),
        })
    }
}

/// Encrypts `plaintext` and writes `salt ++ token` to `path`. CPU-bound
/// sealing runs on a blocking thread so the async executor stays responsive.
pub async fn seal_file(path: &Path, key_material: &[u8], plaintext: Vec<u8>) -> Result<(), CoreError> {
    let key_material = key_material.to_vec();
    let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, CoreError> {
        let (salt, sealing_key) = SealingKey::derive(&key_material, None);
        let token = sealing_key.seal(&plaintext);
        let mut out = Vec::with_capacity(salt.len() + token.len());
        out.extend_from_slice(&salt);
        out.extend_from_slice(&token);
        Ok(out)
    })
    .await
    .map_err(|e| CoreError::FatalState(format!("sealing task panicked: {e}")))??;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

/// Reads `path`, splits off the salt, and decrypts the remaining token.
pub async fn open_sealed_file(path: &Path, key_material: &[u8]) -> Result<Vec<u8>, CoreError> {
    let raw = tokio::fs::read(path).await?;
    if raw.len() < 16 {
        return Err(CoreError::Integrity("sealed file too short".into()));
    }
    let (salt, token) = raw.split_at(16);
    let mut salt_arr = [0u8; 16];
    salt_arr.copy_from_slice(salt);
    let key_material = key_material.to_vec();
    let token = token.to_vec();
    tokio::task::spawn_blocking(move || -> Result<Vec<u8>, CoreError> {
        let (_, sealing_key) = SealingKey::derive(&key_material, Some(salt_arr));
        sealing_key.open(&token)
    })
    .await
    .map_err(|e| CoreError::FatalState(format!("unsealing task panicked: {e}")))?
}

pub fn chain_template() -> Chain {
    Chain::default()
}

pub fn hash_chain(chain: &Chain) -> Result<String, CoreError> {
    let bytes = serde_json::to_vec(chain)?;
    Ok(sha256_hex(&bytes))
}
