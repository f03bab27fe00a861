pub mod api;
pub mod bootstrap;
pub mod config;
pub mod daemon;
pub mod error;
pub mod membership;
pub mod raft_api;
pub mod replicator;
pub mod role;
pub mod types;

pub use api::{create_router, ApiContext};
pub use bootstrap::{BootstrapOutcome, BootstrapSequencer, JoinClient};
pub use config::NodeConfig;
pub use daemon::GaggleDaemon;
pub use error::{GaggleError, Result};
pub use membership::MembershipCoordinator;
pub use raft_api::create_raft_router;
pub use replicator::{ConsensusEngine, RaftEngine, SharedState};
pub use role::{RoleAnnouncer, RoleReporter};
pub use types::*;
