//! Admit-then-promote membership changes.
//!
//! A joining node moves through `Unknown -> Learner -> Voter`. Each request
//! performs only the transitions still missing for that node, so a join that
//! failed halfway can simply be sent again. Nothing here retries on its own.

use crate::error::{GaggleError, Result};
use crate::replicator::ConsensusEngine;
use crate::types::{MemberStatus, NodeRole};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct MembershipCoordinator {
    engine: Arc<dyn ConsensusEngine>,
    proposal_timeout: Duration,
}

impl MembershipCoordinator {
    pub fn new(engine: Arc<dyn ConsensusEngine>, proposal_timeout: Duration) -> Self {
        Self {
            engine,
            proposal_timeout,
        }
    }

    pub fn engine(&self) -> &Arc<dyn ConsensusEngine> {
        &self.engine
    }

    async fn bounded<T>(&self, op: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.proposal_timeout, fut).await {
            Ok(result) => result.map_err(|e| with_context(e, op)),
            Err(_) => Err(GaggleError::ConsensusProposalFailed(format!(
                "{}: timed out after {:?}",
                op, self.proposal_timeout
            ))),
        }
    }

    pub async fn status_of(&self, node_addr: &str) -> Result<MemberStatus> {
        let config = self
            .bounded("failed to read configuration", self.engine.configuration())
            .await?;
        Ok(config.status_of(node_addr))
    }

    /// Admits `node_addr` as a learner, then promotes it to voter.
    ///
    /// The address doubles as the member id. If promotion fails the node is
    /// left as a learner and the error is returned.
    pub async fn join(&self, node_addr: &str) -> Result<MemberStatus> {
        let addr = require_addr(node_addr)?;

        let status = self.status_of(addr).await?;
        if status == MemberStatus::Voter {
            info!("{} is already a voter, nothing to do", addr);
            return Ok(MemberStatus::Voter);
        }

        if status == MemberStatus::Unknown {
            info!("Adding {} as non-voter", addr);
            self.bounded(
                "failed to add non-voter",
                self.engine.add_non_voting_member(addr, addr),
            )
            .await?;
        } else {
            debug!("{} is already a learner, skipping admission", addr);
        }

        info!("Promoting {} to voter", addr);
        self.bounded(
            "failed to add voter",
            self.engine.add_voting_member(addr, addr),
        )
        .await?;
        info!("Promoted {} to voter", addr);

        Ok(MemberStatus::Voter)
    }

    pub async fn leave(&self, node_addr: &str) -> Result<()> {
        let addr = require_addr(node_addr)?;

        info!("Removing {} from the cluster", addr);
        self.bounded("failed to remove server", self.engine.remove_member(addr))
            .await?;
        info!("Removed {}", addr);
        Ok(())
    }

    /// Promotes this node to voter when it leads a configuration it is not a
    /// voter of. Returns whether a promotion was proposed.
    pub async fn promote_self_if_leader(&self, self_addr: &str) -> Result<bool> {
        let addr = require_addr(self_addr)?;

        if self.engine.current_role() != NodeRole::Leader {
            info!("Current node is not the leader, skipping promotion to voter");
            return Ok(false);
        }

        if self.status_of(addr).await? == MemberStatus::Voter {
            debug!("{} already votes, skipping promotion", addr);
            return Ok(false);
        }

        info!("Promoting self to voter: {}", addr);
        self.bounded(
            "failed to add voter",
            self.engine.add_voting_member(addr, addr),
        )
        .await?;
        info!("Promoted self to voter: {}", addr);
        Ok(true)
    }
}

fn require_addr(node_addr: &str) -> Result<&str> {
    let addr = node_addr.trim();
    if addr.is_empty() {
        return Err(GaggleError::InvalidRequest(
            "nodeAddr query parameter is required".to_string(),
        ));
    }
    Ok(addr)
}

fn with_context(e: GaggleError, op: &str) -> GaggleError {
    match e {
        GaggleError::ConsensusProposalFailed(msg) => {
            GaggleError::ConsensusProposalFailed(format!("{}: {}", op, msg))
        }
        other => other,
    }
}
