//! C2 — Cluster Registry. Tracks admitted miners and picks an eligible one
//! for dispatch with a deterministic tie-break so behavior stays testable.

use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::models::{AssociatedNode, MinerStatus};
use crate::store::relational::RelationalStore;

pub struct ClusterRegistry {
    relational: RelationalStore,
    capacity: usize,
}

impl ClusterRegistry {
    pub fn new(relational: RelationalStore, capacity: usize) -> Self {
        ClusterRegistry { relational, capacity }
    }

    pub async fn admit_miner(
        &self,
        user_address: String,
        certificate: String,
        source_address: String,
        source_port: u16,
    ) -> Result<(), CoreError> {
        let current = self.relational.count_associated_nodes().await?;
        if current as usize >= self.capacity {
            return Err(CoreError::Protocol("cluster is at capacity".into()));
        }

        let node = AssociatedNode {
            user_address,
            certificate,
            source_address,
            source_port,
            status: MinerStatus::CurrentlyAvailable,
            consensus_sleep_expiration: Utc::now(),
        };
        self.relational.insert_associated_node(&node).await
    }

    pub async fn is_at_capacity(&self) -> Result<bool, CoreError> {
        Ok(self.relational.count_associated_nodes().await? as usize >= self.capacity)
    }

    /// Returns the address of an eligible miner: available and past its
    /// sleep deadline. Ties break on earliest deadline then lexicographic
    /// address, so the choice is deterministic under concurrent candidates.
    pub async fn pick_eligible_miner(&self) -> Result<Option<String>, CoreError> {
        let now = Utc::now();
        let mut candidates: Vec<AssociatedNode> = self
            .relational
            .all_associated_nodes()
            .await?
            .into_iter()
            .filter(|node| node.status == MinerStatus::CurrentlyAvailable && node.consensus_sleep_expiration <= now)
            .collect();

        candidates.sort_by(|a, b| {
            a.consensus_sleep_expiration
                .cmp(&b.consensus_sleep_expiration)
                .then_with(|| a.user_address.cmp(&b.user_address))
        });

        Ok(candidates.into_iter().next().map(|node| node.user_address))
    }

    pub async fn mark_mining(&self, address: &str) -> Result<(), CoreError> {
        self.relational.set_node_status(address, MinerStatus::CurrentlyMining).await
    }

    /// Completes `consensus_negotiation_id` and puts `address` to sleep
    /// until `until` as a single atomic update, so a concurrent
    /// confirmation can never observe one row updated without the other.
    pub async fn complete_negotiation_and_sleep(
        &self,
        consensus_negotiation_id: &str,
        address: &str,
        until: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        self.relational.complete_negotiation_and_sleep(consensus_negotiation_id, address, until).await
    }

    pub async fn mark_unreachable(&self, address: &str) -> Result<(), CoreError> {
        self.relational.set_node_status(address, MinerStatus::NotReachable).await
    }

    pub async fn mark_available(&self, address: &str) -> Result<(), CoreError> {
        self.relational.set_node_status(address, MinerStatus::CurrentlyAvailable).await
    }

    /// Transitions any sleeping miner whose deadline has passed back to
    /// available. Called once per scheduler tick.
    pub async fn wake_expired_sleepers(&self) -> Result<(), CoreError> {
        let now = Utc::now();
        for node in self.relational.all_associated_nodes().await? {
            if node.status == MinerStatus::CurrentlySleeping && node.consensus_sleep_expiration <= now {
                self.mark_available(&node.user_address).await?;
            }
        }
        Ok(())
    }

    pub fn relational(&self) -> &RelationalStore {
        &self.relational
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::relational::RelationalStore;

    async fn registry_with_db() -> ClusterRegistry {
        let relational = RelationalStore::open(std::path::Path::new(":memory:")).await.unwrap();
        ClusterRegistry::new(relational, 4)
    }

    #[tokio::test]
    async fn admits_up_to_capacity_then_rejects() {
        let registry = ClusterRegistry::new(
            RelationalStore::open(std::path::Path::new(":memory:")).await.unwrap(),
            1,
        );
        registry
            .admit_miner("fl-a".into(), "cert".into(), "127.0.0.1".into(), 6000)
            .await
            .unwrap();
        let err = registry
            .admit_miner("fl-b".into(), "cert".into(), "127.0.0.1".into(), 6001)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Protocol(_)));
    }

    #[tokio::test]
    async fn picks_deterministically_among_ties() {
        let registry = registry_with_db().await;
        registry
            .admit_miner("fl-b".into(), "cert".into(), "127.0.0.1".into(), 6001)
            .await
            .unwrap();
        registry
            .admit_miner("fl-a".into(), "cert".into(), "127.0.0.1".into(), 6000)
            .await
            .unwrap();

        let picked = registry.pick_eligible_miner().await.unwrap();
        assert_eq!(picked.as_deref(), Some("fl-a"));
    }
}
