//! C3 — Association Handshake. Validates a candidate miner's credentials
//! and issues an opaque, time-bound association certificate.

use chrono::Utc;
use uuid::Uuid;

use crate::crypto::{compose_certificate_plaintext, SealingKey};
use crate::error::CoreError;
use crate::models::{Transaction, TransactionPayload};
use crate::registry::ClusterRegistry;

pub struct HandshakeHeaders {
    pub source: String,
    pub session: String,
    pub acceptance: String,
}

pub struct AssociationHandshake<'a> {
    registry: &'a ClusterRegistry,
    auth_key: &'a [u8],
    secret_key: &'a [u8],
}

impl<'a> AssociationHandshake<'a> {
    pub fn new(registry: &'a ClusterRegistry, auth_key: &'a [u8], secret_key: &'a [u8]) -> Self {
        AssociationHandshake { registry, auth_key, secret_key }
    }

    /// Runs the three sequential credential lookups and, on success, mints
    /// and persists an association certificate. Returns the plaintext
    /// certificate the miner should hold onto, plus the internal
    /// transaction to enqueue for sealing.
    pub async fn handshake(
        &self,
        headers: HandshakeHeaders,
        source_address: String,
        source_port: u16,
    ) -> Result<(String, Transaction), CoreError> {
        if self.registry.is_at_capacity().await? {
            return Err(CoreError::Protocol("cluster is at capacity".into()));
        }

        let resolved = self
            .registry
            .relational()
            .resolve_handshake_identity(&headers.source, &headers.acceptance, &headers.session)
            .await?;
        if resolved.is_none() {
            return Err(CoreError::Authentication);
        }

        let issued_at = Utc::now();
        let plaintext = compose_certificate_plaintext(
            self.secret_key,
            &headers.session,
            &headers.source,
            &headers.acceptance,
            issued_at,
        )?;

        let (salt, sealing_key) = SealingKey::derive(self.auth_key, None);
        let token = sealing_key.seal(plaintext.as_bytes());
        let mut sealed = Vec::with_capacity(salt.len() + token.len());
        sealed.extend_from_slice(&salt);
        sealed.extend_from_slice(&token);
        let certificate = hex::encode(sealed);

        self.registry
            .admit_miner(headers.source.clone(), certificate, source_address, source_port)
            .await?;

        let transaction = Transaction {
            id: Uuid::new_v4(),
            payload: TransactionPayload::NodeGeneralConsensusInit { miner_address: headers.source },
        };

        Ok((plaintext, transaction))
    }
}
