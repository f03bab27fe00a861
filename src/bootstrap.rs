use crate::error::{GaggleError, Result};
use crate::membership::MembershipCoordinator;
use crate::types::Member;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// A new single-voter cluster was created.
    Bootstrapped,
    /// The engine already had members, nothing was done.
    AlreadyConfigured,
    /// Admission was requested from a contact node and granted.
    Joined,
}

/// Sends the out-of-band join request to an existing member.
#[derive(Clone)]
pub struct JoinClient {
    client: reqwest::Client,
}

impl JoinClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// `GET http://<contact>/join?nodeAddr=<node_addr>`. Anything but a 200 is
    /// returned as [`GaggleError::JoinRejected`] carrying the response body.
    pub async fn join(&self, contact: &str, node_addr: &str) -> Result<()> {
        let url = format!("{}/join", base_url(contact));
        let response = self
            .client
            .get(&url)
            .query(&[("nodeAddr", node_addr)])
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(GaggleError::JoinRejected(format!("{} ({})", body.trim(), status)));
        }
        Ok(())
    }
}

pub fn base_url(addr: &str) -> String {
    let addr = addr.trim_end_matches('/');
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    }
}

/// Decides once whether this node founds a cluster or joins one.
///
/// The first completed attempt is recorded; later calls return it without
/// touching the engine again. Concurrent callers queue on the gate.
pub struct BootstrapSequencer {
    self_addr: String,
    coordinator: Arc<MembershipCoordinator>,
    join_client: JoinClient,
    attempted: Mutex<Option<BootstrapOutcome>>,
}

impl BootstrapSequencer {
    pub fn new(
        self_addr: String,
        coordinator: Arc<MembershipCoordinator>,
        join_client: JoinClient,
    ) -> Self {
        Self {
            self_addr,
            coordinator,
            join_client,
            attempted: Mutex::new(None),
        }
    }

    pub async fn run(&self, known_peer: Option<&str>) -> Result<BootstrapOutcome> {
        let mut attempted = self.attempted.lock().await;
        if let Some(outcome) = *attempted {
            debug!("Bootstrap already attempted: {:?}", outcome);
            return Ok(outcome);
        }

        let outcome = match known_peer {
            None => self.bootstrap_if_unconfigured().await?,
            Some(peer) => self.join_via(peer).await?,
        };

        *attempted = Some(outcome);
        Ok(outcome)
    }

    pub async fn outcome(&self) -> Option<BootstrapOutcome> {
        *self.attempted.lock().await
    }

    async fn bootstrap_if_unconfigured(&self) -> Result<BootstrapOutcome> {
        let engine = self.coordinator.engine();
        let config = engine.configuration().await?;
        if !config.is_empty() {
            info!(
                "Cluster already configured with {} member(s), skipping bootstrap",
                config.members.len()
            );
            return Ok(BootstrapOutcome::AlreadyConfigured);
        }

        info!("Bootstrapping single-node cluster at {}", self.self_addr);
        engine
            .bootstrap(vec![Member::voter(&self.self_addr)])
            .await?;
        info!("Cluster bootstrapped");
        Ok(BootstrapOutcome::Bootstrapped)
    }

    async fn join_via(&self, peer: &str) -> Result<BootstrapOutcome> {
        self.coordinator
            .promote_self_if_leader(&self.self_addr)
            .await?;

        info!("Requesting to join cluster via {}", peer);
        self.join_client.join(peer, &self.self_addr).await?;
        info!("Joined cluster via {}", peer);
        Ok(BootstrapOutcome::Joined)
    }
}
