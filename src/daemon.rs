use crate::api::{create_router, ApiContext};
use crate::bootstrap::{BootstrapOutcome, BootstrapSequencer, JoinClient};
use crate::config::NodeConfig;
use crate::error::Result;
use crate::membership::MembershipCoordinator;
use crate::raft_api::create_raft_router;
use crate::replicator::{ConsensusEngine, RaftEngine};
use crate::role::{RoleAnnouncer, RoleReporter};
use axum::Router;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

pub struct GaggleDaemon {
    config: NodeConfig,
    engine: Arc<RaftEngine>,
    coordinator: Arc<MembershipCoordinator>,
    reporter: Arc<RoleReporter>,
    sequencer: BootstrapSequencer,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl GaggleDaemon {
    pub async fn new(config: NodeConfig) -> Result<Self> {
        config.validate()?;

        info!("Initializing node at {}", config.node_addr);
        std::fs::create_dir_all(&config.data_dir)?;

        let engine = Arc::new(
            RaftEngine::new(config.node_addr.clone(), &config.data_dir, &config.raft).await?,
        );
        let dyn_engine: Arc<dyn ConsensusEngine> = engine.clone();

        let coordinator = Arc::new(MembershipCoordinator::new(
            dyn_engine.clone(),
            config.proposal_timeout(),
        ));
        let reporter = Arc::new(RoleReporter::new(
            config.node_addr.clone(),
            dyn_engine,
            engine.shared_state().clone(),
            config.labels.clone(),
        ));

        // Admission covers a config read plus two committed changes.
        let join_client = JoinClient::new(config.proposal_timeout() * 3)?;
        let sequencer =
            BootstrapSequencer::new(config.node_addr.clone(), coordinator.clone(), join_client);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            engine,
            coordinator,
            reporter,
            sequencer,
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn api_router(&self) -> Router {
        create_router(ApiContext {
            reporter: self.reporter.clone(),
            coordinator: self.coordinator.clone(),
        })
    }

    pub fn raft_router(&self) -> Router {
        create_raft_router(self.engine.clone())
    }

    /// Founds or joins the cluster. Errors here are fatal to startup.
    pub async fn bootstrap(&self) -> Result<BootstrapOutcome> {
        let outcome = self.sequencer.run(self.config.join.as_deref()).await?;
        info!("Bootstrap finished: {:?}", outcome);
        Ok(outcome)
    }

    pub async fn run(&self) -> Result<()> {
        let announcer_handle = self.spawn_announcer_loop();

        info!(
            "Node {} serving role on {}",
            self.config.node_addr,
            self.config.http_listen_addr()
        );

        self.wait_for_shutdown().await;
        info!("Shutdown signal received");
        announcer_handle.abort();

        self.engine.shutdown().await
    }

    fn spawn_announcer_loop(&self) -> tokio::task::JoinHandle<()> {
        let engine: Arc<dyn ConsensusEngine> = self.engine.clone();
        let mut announcer = RoleAnnouncer::new(engine, self.config.labels.leader.clone());
        let interval = self.config.announce_interval();
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match announcer.tick().await {
                            Ok(true) => debug!("Leadership announcement committed"),
                            Ok(false) => {}
                            Err(e) => warn!("Failed to announce leadership: {}", e),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        break;
                    }
                }
            }
        })
    }

    async fn wait_for_shutdown(&self) {
        let mut rx = self.shutdown_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<RaftEngine> {
        &self.engine
    }
}
