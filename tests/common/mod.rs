#![allow(dead_code)]

use async_trait::async_trait;
use gaggle::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-memory engine: committed changes land immediately in the configuration.
pub struct MockEngine {
    inner: Mutex<Inner>,
    state: SharedState,
}

#[derive(Default)]
struct Inner {
    role: Option<NodeRole>,
    config: ClusterConfiguration,
    leader: Option<String>,
    bootstrap_calls: usize,
    non_voter_calls: usize,
    voter_calls: usize,
    fail_add_non_voter: Option<String>,
    fail_add_voter: Option<String>,
    reject_bootstrap: Option<String>,
    stall_add_voter: bool,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            state: SharedState::new(),
        })
    }

    /// A leader that already bootstrapped itself at `addr`.
    pub fn leader_at(addr: &str) -> Arc<Self> {
        let engine = Self::new();
        {
            let mut inner = engine.inner.lock().unwrap();
            inner.role = Some(NodeRole::Leader);
            inner.leader = Some(addr.to_string());
            inner.config = ClusterConfiguration {
                index: 1,
                members: vec![Member::voter(addr)],
            };
        }
        engine
    }

    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn set_role(&self, role: NodeRole) {
        self.inner.lock().unwrap().role = Some(role);
    }

    pub fn set_members(&self, members: Vec<Member>) {
        let mut inner = self.inner.lock().unwrap();
        inner.config.members = members;
        inner.config.index += 1;
    }

    pub fn fail_add_non_voter(&self, msg: &str) {
        self.inner.lock().unwrap().fail_add_non_voter = Some(msg.to_string());
    }

    pub fn fail_add_voter(&self, msg: &str) {
        self.inner.lock().unwrap().fail_add_voter = Some(msg.to_string());
    }

    pub fn heal(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_add_non_voter = None;
        inner.fail_add_voter = None;
        inner.stall_add_voter = false;
    }

    pub fn reject_bootstrap(&self, msg: &str) {
        self.inner.lock().unwrap().reject_bootstrap = Some(msg.to_string());
    }

    pub fn stall_add_voter(&self) {
        self.inner.lock().unwrap().stall_add_voter = true;
    }

    pub fn config(&self) -> ClusterConfiguration {
        self.inner.lock().unwrap().config.clone()
    }

    pub fn bootstrap_calls(&self) -> usize {
        self.inner.lock().unwrap().bootstrap_calls
    }

    pub fn non_voter_calls(&self) -> usize {
        self.inner.lock().unwrap().non_voter_calls
    }

    pub fn voter_calls(&self) -> usize {
        self.inner.lock().unwrap().voter_calls
    }
}

#[async_trait]
impl ConsensusEngine for MockEngine {
    async fn propose(&self, entry: Vec<u8>) -> Result<()> {
        if self.current_role() != NodeRole::Leader {
            return Err(GaggleError::ConsensusProposalFailed(
                "not the leader".to_string(),
            ));
        }
        self.state.apply(&entry);
        Ok(())
    }

    fn current_role(&self) -> NodeRole {
        self.inner
            .lock()
            .unwrap()
            .role
            .unwrap_or(NodeRole::Follower)
    }

    fn leader(&self) -> Option<MemberId> {
        self.inner.lock().unwrap().leader.clone()
    }

    async fn add_non_voting_member(&self, id: &str, addr: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.non_voter_calls += 1;
        if let Some(msg) = &inner.fail_add_non_voter {
            return Err(GaggleError::ConsensusProposalFailed(msg.clone()));
        }
        if inner.config.member(id).is_none() {
            inner.config.members.push(Member {
                id: id.to_string(),
                address: addr.to_string(),
                role: MemberRole::NonVoter,
            });
            inner.config.index += 1;
        }
        Ok(())
    }

    async fn add_voting_member(&self, id: &str, addr: &str) -> Result<()> {
        let stall = {
            let mut inner = self.inner.lock().unwrap();
            inner.voter_calls += 1;
            if let Some(msg) = &inner.fail_add_voter {
                return Err(GaggleError::ConsensusProposalFailed(msg.clone()));
            }
            inner.stall_add_voter
        };
        if stall {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }

        let mut inner = self.inner.lock().unwrap();
        match inner.config.members.iter().position(|m| m.id == id) {
            Some(i) => inner.config.members[i].role = MemberRole::Voter,
            None => inner.config.members.push(Member {
                id: id.to_string(),
                address: addr.to_string(),
                role: MemberRole::Voter,
            }),
        }
        inner.config.index += 1;
        Ok(())
    }

    async fn remove_member(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.config.member(id).is_none() {
            return Err(GaggleError::ConsensusProposalFailed(format!(
                "{} is not a member of the cluster",
                id
            )));
        }
        inner.config.members.retain(|m| m.id != id);
        inner.config.index += 1;
        Ok(())
    }

    async fn configuration(&self) -> Result<ClusterConfiguration> {
        Ok(self.inner.lock().unwrap().config.clone())
    }

    async fn bootstrap(&self, initial_members: Vec<Member>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.bootstrap_calls += 1;
        if let Some(msg) = &inner.reject_bootstrap {
            return Err(GaggleError::BootstrapConflict(msg.clone()));
        }
        if !inner.config.is_empty() {
            return Err(GaggleError::BootstrapConflict(
                "configuration already exists".to_string(),
            ));
        }
        inner.leader = initial_members.first().map(|m| m.id.clone());
        inner.config = ClusterConfiguration {
            index: 1,
            members: initial_members,
        };
        inner.role = Some(NodeRole::Leader);
        Ok(())
    }
}

pub fn coordinator(engine: Arc<MockEngine>) -> Arc<MembershipCoordinator> {
    Arc::new(MembershipCoordinator::new(engine, Duration::from_secs(5)))
}

pub fn reporter(addr: &str, engine: Arc<MockEngine>) -> Arc<RoleReporter> {
    let state = engine.state();
    Arc::new(RoleReporter::new(
        addr.to_string(),
        engine,
        state,
        RoleLabels::default(),
    ))
}

pub fn api_context(addr: &str, engine: Arc<MockEngine>) -> ApiContext {
    ApiContext {
        reporter: reporter(addr, engine.clone()),
        coordinator: coordinator(engine),
    }
}

/// Serves `router` on an ephemeral local port and returns its address.
pub async fn serve(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr.to_string()
}
