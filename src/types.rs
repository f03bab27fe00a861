use serde::{Deserialize, Serialize};
use std::fmt;

/// Members are identified by their consensus address.
pub type MemberId = String;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MemberRole {
    Voter,
    NonVoter,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    pub id: MemberId,
    pub address: String,
    pub role: MemberRole,
}

impl Member {
    pub fn voter(addr: &str) -> Self {
        Self {
            id: addr.to_string(),
            address: addr.to_string(),
            role: MemberRole::Voter,
        }
    }

    pub fn non_voter(addr: &str) -> Self {
        Self {
            id: addr.to_string(),
            address: addr.to_string(),
            role: MemberRole::NonVoter,
        }
    }
}

/// Read-only view of the engine's committed membership.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ClusterConfiguration {
    pub index: u64,
    pub members: Vec<Member>,
}

impl ClusterConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn member(&self, id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn voters(&self) -> Vec<&Member> {
        self.members
            .iter()
            .filter(|m| m.role == MemberRole::Voter)
            .collect()
    }

    pub fn status_of(&self, id: &str) -> MemberStatus {
        match self.member(id).map(|m| m.role) {
            None => MemberStatus::Unknown,
            Some(MemberRole::NonVoter) => MemberStatus::Learner,
            Some(MemberRole::Voter) => MemberStatus::Voter,
        }
    }
}

/// Where a node sits in the admit-then-promote lifecycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum MemberStatus {
    Unknown,
    Learner,
    Voter,
}

/// Live role reported by the engine. Never replicated.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeRole {
    Leader,
    Follower,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Leader => write!(f, "leader"),
            NodeRole::Follower => write!(f, "follower"),
        }
    }
}

/// Human labels served for each role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleLabels {
    pub leader: String,
    pub follower: String,
}

impl RoleLabels {
    pub fn for_role(&self, role: NodeRole) -> &str {
        match role {
            NodeRole::Leader => &self.leader,
            NodeRole::Follower => &self.follower,
        }
    }
}

impl Default for RoleLabels {
    fn default() -> Self {
        Self {
            leader: "goose".to_string(),
            follower: "duck".to_string(),
        }
    }
}

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoleView {
    pub state: String,
}

/// Body of `GET /status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStatusView {
    pub node_addr: String,
    pub role: NodeRole,
    pub replicated_state: Option<String>,
    pub leader: Option<String>,
    pub configuration: ClusterConfiguration,
}
