mod common;

use common::*;
use gaggle::*;
use std::sync::Arc;
use std::time::Duration;

const NODE_A: &str = "10.0.0.1:9000";
const NODE_B: &str = "10.0.0.2:9000";

fn sequencer(addr: &str, engine: Arc<MockEngine>) -> BootstrapSequencer {
    BootstrapSequencer::new(
        addr.to_string(),
        coordinator(engine),
        JoinClient::new(Duration::from_secs(5)).unwrap(),
    )
}

async fn role_of(addr: &str) -> RoleView {
    reqwest::get(format!("http://{}/", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_two_node_cluster_formation() {
    // A starts with no contact address and founds the cluster.
    let engine_a = MockEngine::new();
    let outcome = sequencer(NODE_A, engine_a.clone()).run(None).await.unwrap();
    assert_eq!(outcome, BootstrapOutcome::Bootstrapped);
    let http_a = serve(create_router(api_context(NODE_A, engine_a.clone()))).await;
    assert_eq!(role_of(&http_a).await.state, "goose");

    // B starts with A's HTTP address as contact.
    let engine_b = MockEngine::new();
    let outcome = sequencer(NODE_B, engine_b.clone())
        .run(Some(&http_a))
        .await
        .unwrap();
    assert_eq!(outcome, BootstrapOutcome::Joined);
    assert_eq!(engine_b.bootstrap_calls(), 0);
    let http_b = serve(create_router(api_context(NODE_B, engine_b.clone()))).await;

    let config = engine_a.config();
    assert_eq!(config.members.len(), 2);
    assert_eq!(config.status_of(NODE_A), MemberStatus::Voter);
    assert_eq!(config.status_of(NODE_B), MemberStatus::Voter);

    assert_eq!(role_of(&http_b).await.state, "duck");
    assert_eq!(role_of(&http_a).await.state, "goose");
}

#[tokio::test]
async fn test_rejoin_after_restart_keeps_single_entry() {
    let engine_a = MockEngine::leader_at(NODE_A);
    let http_a = serve(create_router(api_context(NODE_A, engine_a.clone()))).await;

    sequencer(NODE_B, MockEngine::new())
        .run(Some(&http_a))
        .await
        .unwrap();
    sequencer(NODE_B, MockEngine::new())
        .run(Some(&http_a))
        .await
        .unwrap();

    let config = engine_a.config();
    assert_eq!(config.members.iter().filter(|m| m.id == NODE_B).count(), 1);
    assert_eq!(config.status_of(NODE_B), MemberStatus::Voter);
}

#[tokio::test]
async fn test_leader_announcement_is_replicated_once() {
    let engine = MockEngine::new();
    let mut announcer = RoleAnnouncer::new(engine.clone(), "goose".to_string());

    assert!(!announcer.tick().await.unwrap());
    assert_eq!(engine.state().replicated_label(), None);

    engine.set_role(NodeRole::Leader);
    assert!(announcer.tick().await.unwrap());
    assert_eq!(engine.state().replicated_label(), Some("goose".to_string()));

    // Still leader: nothing new to announce.
    engine.state().apply(b"other");
    assert!(!announcer.tick().await.unwrap());
    assert_eq!(engine.state().replicated_label(), Some("other".to_string()));

    engine.set_role(NodeRole::Follower);
    assert!(!announcer.tick().await.unwrap());
    engine.set_role(NodeRole::Leader);
    assert!(announcer.tick().await.unwrap());
    assert_eq!(engine.state().replicated_label(), Some("goose".to_string()));
}
