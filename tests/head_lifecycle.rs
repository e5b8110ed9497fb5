mod common;

use hydra_escrow::domain::{ClientCommand, HeadState, MessageTag, PeerId};
use hydra_escrow::error::EscrowError;
use hydra_escrow::AppState;
use std::time::Duration;

use common::{funded_network, FakeNetwork};

#[tokio::test]
async fn start_commits_both_peers_and_opens_the_head() {
    let network = funded_network().await;
    let state = AppState::new(network.config(), network.tool()).unwrap();

    state.lifecycle.start().await.unwrap();

    assert_eq!(network.chain.head(), "Open");
    assert_eq!(network.chain.command_count("Init"), 2);
    assert_eq!(network.chain.l2_lovelace(PeerId::Alice), 5_000_000);
    assert_eq!(network.chain.l2_lovelace(PeerId::Bob), 3_000_000);
    assert_eq!(network.chain.l1_lovelace(PeerId::Alice), 0);

    for peer in PeerId::ALL {
        assert_eq!(state.hub.last_tag(peer), Some(MessageTag::HeadIsOpen));
    }
    assert_eq!(state.tracker.refresh().await, HeadState::Open);

    // alice commits before bob
    let calls = network.chain.tool_calls();
    let alice_sign = calls.iter().position(|c| c == "sign:alice").unwrap();
    let bob_sign = calls.iter().position(|c| c == "sign:bob").unwrap();
    assert!(alice_sign < bob_sign);
}

#[tokio::test]
async fn opening_stops_when_a_peer_has_no_l1_funds() {
    let network = FakeNetwork::start().await;
    network.chain.fund_l1(PeerId::Alice, "aa00#0", 5_000_000);
    let state = AppState::new(network.config(), network.tool()).unwrap();

    let err = state.lifecycle.start().await.unwrap_err();
    assert!(matches!(err, EscrowError::NoFunds { peer: PeerId::Bob }));
    assert_eq!(network.chain.head(), "Initial");
}

#[tokio::test]
async fn opening_times_out_without_initialization() {
    let network = funded_network().await;
    network.chain.silence_init();
    let mut config = network.config();
    config.timeouts.phase_ms = 200;
    let state = AppState::new(config, network.tool()).unwrap();

    state.lifecycle.initiate().await.unwrap();
    let err = state.lifecycle.complete_opening().await.unwrap_err();
    assert!(err.is_timeout());
    assert!(network.chain.tool_calls().is_empty());
}

#[tokio::test]
async fn abort_is_reported_back_over_the_socket() {
    let network = funded_network().await;
    let state = AppState::new(network.config(), network.tool()).unwrap();
    state.lifecycle.initiate().await.unwrap();

    state
        .hub
        .send_connected(PeerId::Alice, &ClientCommand::Abort)
        .await
        .unwrap();
    state
        .hub
        .wait_for_both(MessageTag::HeadIsAborted, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(network.chain.head(), "Idle");
}

#[tokio::test]
async fn reconnect_replaces_the_previous_link() {
    let network = funded_network().await;
    let state = AppState::new(network.config(), network.tool()).unwrap();

    state.hub.connect(PeerId::Alice).await.unwrap();
    state.hub.connect(PeerId::Alice).await.unwrap();
    assert!(state.hub.is_connected(PeerId::Alice));

    state.hub.send(PeerId::Alice, &ClientCommand::Init).unwrap();
    state
        .hub
        .wait_for_state(PeerId::Alice, MessageTag::HeadIsInitializing, Duration::from_secs(2))
        .await
        .unwrap();

    state.shutdown();
    assert!(!state.hub.is_connected(PeerId::Alice));
}
