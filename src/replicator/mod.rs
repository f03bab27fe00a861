mod network;
mod raft_node;
pub mod state_machine;
mod storage;

pub use network::*;
pub use raft_node::*;
pub use state_machine::*;
pub use storage::*;

use crate::error::Result;
use crate::types::*;
use async_trait::async_trait;

/// The consensus engine as seen by the coordinator.
///
/// Election, replication and durability live behind this trait. Every
/// mutating call resolves once the change is committed or rejected.
#[async_trait]
pub trait ConsensusEngine: Send + Sync {
    /// Replicate an opaque entry through the log.
    async fn propose(&self, entry: Vec<u8>) -> Result<()>;

    fn current_role(&self) -> NodeRole;

    /// Best-known leader id, if any.
    fn leader(&self) -> Option<MemberId>;

    async fn add_non_voting_member(&self, id: &str, addr: &str) -> Result<()>;

    async fn add_voting_member(&self, id: &str, addr: &str) -> Result<()>;

    async fn remove_member(&self, id: &str) -> Result<()>;

    async fn configuration(&self) -> Result<ClusterConfiguration>;

    async fn bootstrap(&self, initial_members: Vec<Member>) -> Result<()>;
}
