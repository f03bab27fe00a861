//! Role reporting and leadership announcements.

use crate::error::Result;
use crate::replicator::{ConsensusEngine, SharedState};
use crate::types::*;
use std::sync::Arc;
use tracing::info;

/// Computes this node's role label at request time.
pub struct RoleReporter {
    node_addr: String,
    engine: Arc<dyn ConsensusEngine>,
    state: SharedState,
    labels: RoleLabels,
}

impl RoleReporter {
    pub fn new(
        node_addr: String,
        engine: Arc<dyn ConsensusEngine>,
        state: SharedState,
        labels: RoleLabels,
    ) -> Self {
        Self {
            node_addr,
            engine,
            state,
            labels,
        }
    }

    /// Reads the live role, records its label locally and returns the encoded
    /// `{"state": ...}` body. The label is never proposed.
    pub fn report(&self) -> Result<String> {
        let role = self.engine.current_role();
        self.state.render(self.labels.for_role(role))
    }

    pub async fn status(&self) -> Result<NodeStatusView> {
        Ok(NodeStatusView {
            node_addr: self.node_addr.clone(),
            role: self.engine.current_role(),
            replicated_state: self.state.replicated_label(),
            leader: self.engine.leader(),
            configuration: self.engine.configuration().await?,
        })
    }

    pub async fn configuration(&self) -> Result<ClusterConfiguration> {
        self.engine.configuration().await
    }
}

/// Proposes the leader label whenever this node gains leadership, so every
/// member's replicated value names the latest leader announcement.
pub struct RoleAnnouncer {
    engine: Arc<dyn ConsensusEngine>,
    leader_label: String,
    last_role: NodeRole,
}

impl RoleAnnouncer {
    pub fn new(engine: Arc<dyn ConsensusEngine>, leader_label: String) -> Self {
        Self {
            engine,
            leader_label,
            last_role: NodeRole::Follower,
        }
    }

    /// Returns whether an announcement was committed on this tick.
    pub async fn tick(&mut self) -> Result<bool> {
        let role = self.engine.current_role();
        let became_leader = role == NodeRole::Leader && self.last_role != NodeRole::Leader;
        self.last_role = role;

        if !became_leader {
            return Ok(false);
        }

        info!("Became leader, announcing {:?}", self.leader_label);
        self.engine
            .propose(self.leader_label.as_bytes().to_vec())
            .await?;
        Ok(true)
    }
}
