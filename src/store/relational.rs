//! Relational state: associated nodes, consensus negotiations, file
//! signatures, and the read-only rows owned by out-of-scope subsystems
//! (users, acceptance codes, session tokens).

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::error::CoreError;
use crate::models::{AssociatedNode, ConsensusNegotiation, MinerStatus, NegotiationStatus};

#[derive(Clone)]
pub struct RelationalStore {
    pool: SqlitePool,
}

impl RelationalStore {
    pub async fn open(path: &std::path::Path) -> Result<Self, CoreError> {
        let is_memory = path == std::path::Path::new(":memory:");
        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
        let max_connections = if is_memory { 1 } else { 8 };
        let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
        let store = RelationalStore { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS associated_nodes (
                user_address TEXT PRIMARY KEY,
                certificate TEXT NOT NULL,
                source_address TEXT NOT NULL,
                source_port INTEGER NOT NULL,
                status TEXT NOT NULL,
                consensus_sleep_expiration TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS consensus_negotiation (
                consensus_negotiation_id TEXT PRIMARY KEY,
                block_no_ref INTEGER NOT NULL,
                peer_address TEXT NOT NULL,
                status TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS file_signatures (
                file_name TEXT PRIMARY KEY,
                hash_sha256 TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                unique_address TEXT PRIMARY KEY,
                email TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS acceptance_codes (
                code TEXT PRIMARY KEY,
                to_email TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS session_tokens (
                token TEXT PRIMARY KEY,
                from_user TEXT NOT NULL,
                state TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tx_content_mappings (
                owner_address TEXT PRIMARY KEY,
                content_category TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn count_associated_nodes(&self) -> Result<i64, CoreError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM associated_nodes")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn insert_associated_node(&self, node: &AssociatedNode) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO associated_nodes
                (user_address, certificate, source_address, source_port, status, consensus_sleep_expiration)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&node.user_address)
        .bind(&node.certificate)
        .bind(&node.source_address)
        .bind(node.source_port)
        .bind(status_to_str(node.status))
        .bind(node.consensus_sleep_expiration.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn all_associated_nodes(&self) -> Result<Vec<AssociatedNode>, CoreError> {
        let rows: Vec<(String, String, String, i64, String, String)> = sqlx::query_as(
            "SELECT user_address, certificate, source_address, source_port, status, consensus_sleep_expiration
             FROM associated_nodes",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(user_address, certificate, source_address, source_port, status, expiration)| {
                Ok(AssociatedNode {
                    user_address,
                    certificate,
                    source_address,
                    source_port: source_port as u16,
                    status: str_to_status(&status)?,
                    consensus_sleep_expiration: chrono::DateTime::parse_from_rfc3339(&expiration)
                        .map_err(|e| CoreError::FatalState(format!("corrupt expiration timestamp: {e}")))?
                        .with_timezone(&chrono::Utc),
                })
            })
            .collect()
    }

    pub async fn set_node_status(&self, address: &str, status: MinerStatus) -> Result<(), CoreError> {
        sqlx::query("UPDATE associated_nodes SET status = ?1 WHERE user_address = ?2")
            .bind(status_to_str(status))
            .bind(address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_node_sleeping_until(
        &self,
        address: &str,
        expiration: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), CoreError> {
        sqlx::query(
            "UPDATE associated_nodes SET status = ?1, consensus_sleep_expiration = ?2 WHERE user_address = ?3",
        )
        .bind(status_to_str(MinerStatus::CurrentlySleeping))
        .bind(expiration.to_rfc3339())
        .bind(address)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_negotiation_for_block(&self, block_no_ref: i64) -> Result<(), CoreError> {
        sqlx::query("DELETE FROM consensus_negotiation WHERE block_no_ref = ?1")
            .bind(block_no_ref)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_negotiation(&self, negotiation: &ConsensusNegotiation) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO consensus_negotiation (consensus_negotiation_id, block_no_ref, peer_address, status)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&negotiation.consensus_negotiation_id)
        .bind(negotiation.block_no_ref)
        .bind(&negotiation.peer_address)
        .bind(negotiation_status_to_str(negotiation.status))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Completes a negotiation and puts its miner to sleep in one
    /// transaction, so the process can never suspend between the two
    /// updates and leave them observably out of sync.
    pub async fn complete_negotiation_and_sleep(
        &self,
        consensus_negotiation_id: &str,
        address: &str,
        expiration: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "UPDATE consensus_negotiation SET status = ?1 WHERE consensus_negotiation_id = ?2 AND status = ?3",
        )
        .bind(negotiation_status_to_str(NegotiationStatus::Completed))
        .bind(consensus_negotiation_id)
        .bind(negotiation_status_to_str(NegotiationStatus::OnProgress))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE associated_nodes SET status = ?1, consensus_sleep_expiration = ?2 WHERE user_address = ?3",
        )
        .bind(status_to_str(MinerStatus::CurrentlySleeping))
        .bind(expiration.to_rfc3339())
        .bind(address)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn upsert_file_signature(&self, file_name: &str, hash_sha256: &str) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO file_signatures (file_name, hash_sha256) VALUES (?1, ?2)
             ON CONFLICT(file_name) DO UPDATE SET hash_sha256 = excluded.hash_sha256",
        )
        .bind(file_name)
        .bind(hash_sha256)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn file_signature(&self, file_name: &str) -> Result<Option<String>, CoreError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT hash_sha256 FROM file_signatures WHERE file_name = ?1",
        )
        .bind(file_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(hash,)| hash))
    }

    /// Resolves a handshake's three header-bound credentials to an e-mail
    /// address, returning `None` if any link in the chain fails to match.
    pub async fn resolve_handshake_identity(
        &self,
        source_address: &str,
        acceptance_code: &str,
        session_token: &str,
    ) -> Result<Option<()>, CoreError> {
        let email: Option<(String,)> =
            sqlx::query_as("SELECT email FROM users WHERE unique_address = ?1")
                .bind(source_address)
                .fetch_optional(&self.pool)
                .await?;
        let Some((email,)) = email else { return Ok(None) };

        let acceptance: Option<(String,)> = sqlx::query_as(
            "SELECT code FROM acceptance_codes WHERE code = ?1 AND to_email = ?2",
        )
        .bind(acceptance_code)
        .bind(&email)
        .fetch_optional(&self.pool)
        .await?;
        if acceptance.is_none() {
            return Ok(None);
        }

        let session: Option<(String,)> = sqlx::query_as(
            "SELECT token FROM session_tokens WHERE token = ?1 AND from_user = ?2 AND state = 'CREATED_FOR_USE'",
        )
        .bind(session_token)
        .bind(source_address)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session.map(|_| ()))
    }
}

fn status_to_str(status: MinerStatus) -> &'static str {
    match status {
        MinerStatus::CurrentlyAvailable => "CURRENTLY_AVAILABLE",
        MinerStatus::CurrentlyMining => "CURRENTLY_MINING",
        MinerStatus::CurrentlySleeping => "CURRENTLY_SLEEPING",
        MinerStatus::NotReachable => "NOT_REACHABLE",
    }
}

fn str_to_status(value: &str) -> Result<MinerStatus, CoreError> {
    match value {
        "CURRENTLY_AVAILABLE" => Ok(MinerStatus::CurrentlyAvailable),
        "CURRENTLY_MINING" => Ok(MinerStatus::CurrentlyMining),
        "CURRENTLY_SLEEPING" => Ok(MinerStatus::CurrentlySleeping),
        "NOT_REACHABLE" => Ok(MinerStatus::NotReachable),
        other => Err(CoreError::FatalState(format!("unknown miner status {other}"))),
    }
}

fn negotiation_status_to_str(status: NegotiationStatus) -> &'static str {
    match status {
        NegotiationStatus::OnProgress => "ON_PROGRESS",
        NegotiationStatus::Completed => "COMPLETED",
    }
}
