use crate::config::RaftSettings;
use crate::error::{GaggleError, Result};
use crate::replicator::network::GaggleNetworkFactory;
use crate::replicator::state_machine::SharedState;
use crate::replicator::storage::{
    create_storage, engine_node_id, GaggleNode, NodeIdType, RoleEntry, TypeConfig,
};
use crate::replicator::ConsensusEngine;
use crate::types::*;
use async_trait::async_trait;
use openraft::error::{ClientWriteError, InitializeError, RaftError};
use openraft::{ChangeMembers, Config, Raft, RaftMetrics, ServerState};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub type GaggleRaft = Raft<TypeConfig>;

type WriteError = RaftError<NodeIdType, ClientWriteError<NodeIdType, GaggleNode>>;

/// [`ConsensusEngine`] backed by openraft, with sled storage and HTTP
/// transport.
pub struct RaftEngine {
    node_id: NodeIdType,
    addr: String,
    raft: GaggleRaft,
    state: SharedState,
}

impl RaftEngine {
    pub async fn new<P: AsRef<Path>>(
        addr: String,
        data_dir: P,
        settings: &RaftSettings,
    ) -> Result<Self> {
        let config = Config {
            cluster_name: "gaggle".to_string(),
            heartbeat_interval: settings.heartbeat_interval_ms,
            election_timeout_min: settings.election_timeout_min_ms,
            election_timeout_max: settings.election_timeout_max_ms,
            ..Default::default()
        };
        let config = Arc::new(
            config
                .validate()
                .map_err(|e| GaggleError::Config(e.to_string()))?,
        );

        let node_id = engine_node_id(&addr);
        let state = SharedState::new();
        let storage_path = data_dir.as_ref().join("raft");
        std::fs::create_dir_all(&storage_path)?;
        let (log_store, sm_store) = create_storage(&storage_path, state.clone())?;
        let network = GaggleNetworkFactory::new(Duration::from_millis(settings.rpc_timeout_ms))?;

        let raft = Raft::new(node_id, config, network, log_store, sm_store)
            .await
            .map_err(|e| GaggleError::Storage(e.to_string()))?;

        info!(
            "Raft node {} initialized at {} with storage at {:?}",
            node_id, addr, storage_path
        );

        Ok(Self {
            node_id,
            addr,
            raft,
            state,
        })
    }

    pub fn raft(&self) -> &GaggleRaft {
        &self.raft
    }

    pub fn node_id(&self) -> NodeIdType {
        self.node_id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn shared_state(&self) -> &SharedState {
        &self.state
    }

    fn metrics(&self) -> RaftMetrics<NodeIdType, GaggleNode> {
        self.raft.metrics().borrow().clone()
    }

    /// Resolves once this node has become leader, or fails after `timeout`.
    pub async fn wait_for_leadership(&self, timeout: Duration) -> Result<()> {
        self.raft
            .wait(Some(timeout))
            .state(ServerState::Leader, "wait for leadership")
            .await
            .map_err(|e| GaggleError::ConsensusProposalFailed(e.to_string()))?;
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.raft
            .shutdown()
            .await
            .map_err(|e| GaggleError::Storage(e.to_string()))
    }

    async fn change_membership(&self, change: ChangeMembers<NodeIdType, GaggleNode>) -> Result<()> {
        self.raft
            .change_membership(change, false)
            .await
            .map_err(proposal_error)?;
        Ok(())
    }
}

fn proposal_error(e: WriteError) -> GaggleError {
    match &e {
        RaftError::APIError(ClientWriteError::ForwardToLeader(fwd)) => {
            let leader = fwd
                .leader_node
                .as_ref()
                .map(|n| n.addr.clone())
                .or_else(|| fwd.leader_id.map(|id| id.to_string()));
            match leader {
                Some(leader) => GaggleError::ConsensusProposalFailed(format!(
                    "not the leader; current leader is {}",
                    leader
                )),
                None => GaggleError::ConsensusProposalFailed(
                    "not the leader; no leader is known".to_string(),
                ),
            }
        }
        _ => GaggleError::ConsensusProposalFailed(e.to_string()),
    }
}

#[async_trait]
impl ConsensusEngine for RaftEngine {
    async fn propose(&self, entry: Vec<u8>) -> Result<()> {
        self.raft
            .client_write(RoleEntry::new(entry))
            .await
            .map_err(proposal_error)?;
        Ok(())
    }

    fn current_role(&self) -> NodeRole {
        match self.metrics().state {
            ServerState::Leader => NodeRole::Leader,
            _ => NodeRole::Follower,
        }
    }

    fn leader(&self) -> Option<MemberId> {
        let metrics = self.metrics();
        let leader_id = metrics.current_leader?;
        let node = metrics.membership_config.membership().get_node(&leader_id);
        Some(
            node.map(|n| n.addr.clone())
                .unwrap_or_else(|| leader_id.to_string()),
        )
    }

    async fn add_non_voting_member(&self, id: &str, addr: &str) -> Result<()> {
        let node = GaggleNode {
            addr: addr.to_string(),
        };
        self.raft
            .add_learner(engine_node_id(id), node, true)
            .await
            .map_err(proposal_error)?;
        Ok(())
    }

    async fn add_voting_member(&self, id: &str, addr: &str) -> Result<()> {
        let node_id = engine_node_id(id);
        let known = self.configuration().await?.status_of(id) != MemberStatus::Unknown;

        let change = if known {
            ChangeMembers::AddVoterIds(BTreeSet::from([node_id]))
        } else {
            let node = GaggleNode {
                addr: addr.to_string(),
            };
            ChangeMembers::AddVoters(BTreeMap::from([(node_id, node)]))
        };
        self.change_membership(change).await
    }

    async fn remove_member(&self, id: &str) -> Result<()> {
        let node_id = engine_node_id(id);
        let change = match self.configuration().await?.status_of(id) {
            MemberStatus::Unknown => {
                return Err(GaggleError::ConsensusProposalFailed(format!(
                    "{} is not a member of the cluster",
                    id
                )))
            }
            MemberStatus::Voter => ChangeMembers::RemoveVoters(BTreeSet::from([node_id])),
            MemberStatus::Learner => ChangeMembers::RemoveNodes(BTreeSet::from([node_id])),
        };
        self.change_membership(change).await
    }

    /// Read from the core rather than the metrics channel, which starts out
    /// empty until the core has loaded the stored membership.
    async fn configuration(&self) -> Result<ClusterConfiguration> {
        let (index, membership) = self
            .raft
            .with_raft_state(|st| {
                let effective = st.membership_state.effective();
                (
                    effective.log_id().as_ref().map(|l| l.index).unwrap_or(0),
                    effective.membership().clone(),
                )
            })
            .await
            .map_err(|e| GaggleError::Storage(e.to_string()))?;

        let voters: BTreeSet<NodeIdType> = membership.voter_ids().collect();
        let members = membership
            .nodes()
            .map(|(id, node)| Member {
                id: node.addr.clone(),
                address: node.addr.clone(),
                role: if voters.contains(id) {
                    MemberRole::Voter
                } else {
                    MemberRole::NonVoter
                },
            })
            .collect();

        Ok(ClusterConfiguration { index, members })
    }

    async fn bootstrap(&self, initial_members: Vec<Member>) -> Result<()> {
        let members: BTreeMap<NodeIdType, GaggleNode> = initial_members
            .iter()
            .map(|m| {
                (
                    engine_node_id(&m.id),
                    GaggleNode {
                        addr: m.address.clone(),
                    },
                )
            })
            .collect();

        self.raft.initialize(members).await.map_err(|e| match e {
            RaftError::APIError(InitializeError::NotAllowed(e)) => {
                GaggleError::BootstrapConflict(e.to_string())
            }
            e => GaggleError::ConsensusProposalFailed(e.to_string()),
        })
    }
}
