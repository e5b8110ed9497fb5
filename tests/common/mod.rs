//! In-process stand-ins for two hydra-node peers and the cardano-cli tool.
//!
//! Both fake nodes share one [`FakeChain`] holding the L1 and L2 UTXO sets,
//! so a commit submitted through [`FakeLedgerTool`] shows up on both
//! WebSockets the way a real head would report it.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use hydra_escrow::config::AppConfig;
use hydra_escrow::domain::{PeerId, TxArtifact, TxDraft, UtxoEntry, UtxoSet};
use hydra_escrow::error::{EscrowError, Result};
use hydra_escrow::LedgerTool;

pub fn address_of(peer: PeerId) -> String {
    format!("addr_test_{}", peer.as_str())
}

#[derive(Default)]
struct ChainState {
    head: String,
    l1: UtxoSet,
    l2: UtxoSet,
    committed: Vec<PeerId>,
    commands: Vec<(PeerId, String)>,
    tool_calls: Vec<String>,
    drafts: Vec<TxDraft>,
    close_ignores: u32,
    silent_init: bool,
    next_tx: u64,
}

impl ChainState {
    fn fresh_ref(&mut self) -> String {
        self.next_tx += 1;
        format!("{:064x}", self.next_tx)
    }
}

/// Shared ledger and head state behind both fake peers
pub struct FakeChain {
    state: Mutex<ChainState>,
    clients: Mutex<HashMap<PeerId, Vec<mpsc::UnboundedSender<String>>>>,
    fanout_delay: Duration,
}

impl FakeChain {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ChainState {
                head: "Idle".to_string(),
                ..ChainState::default()
            }),
            clients: Mutex::new(HashMap::new()),
            fanout_delay: Duration::from_millis(150),
        })
    }

    pub fn fund_l1(&self, peer: PeerId, tx_ref: &str, lovelace: u64) {
        let mut state = self.state.lock().unwrap();
        state.l1.insert(tx_ref, UtxoEntry::new(address_of(peer), lovelace));
    }

    pub fn head(&self) -> String {
        self.state.lock().unwrap().head.clone()
    }

    pub fn set_head(&self, head: &str) {
        self.state.lock().unwrap().head = head.to_string();
    }

    /// Swallow the next `count` Close commands
    pub fn ignore_closes(&self, count: u32) {
        self.state.lock().unwrap().close_ignores = count;
    }

    /// Accept Init without ever reporting HeadIsInitializing
    pub fn silence_init(&self) {
        self.state.lock().unwrap().silent_init = true;
    }

    pub fn l1_lovelace(&self, peer: PeerId) -> u64 {
        let state = self.state.lock().unwrap();
        state.l1.owned_by(&address_of(peer)).total_lovelace()
    }

    pub fn l2_lovelace(&self, peer: PeerId) -> u64 {
        let state = self.state.lock().unwrap();
        state.l2.owned_by(&address_of(peer)).total_lovelace()
    }

    /// Commands received over the WebSockets, in arrival order
    pub fn commands(&self) -> Vec<(PeerId, String)> {
        self.state.lock().unwrap().commands.clone()
    }

    pub fn command_count(&self, tag: &str) -> usize {
        self.commands().iter().filter(|(_, t)| t == tag).count()
    }

    pub fn tool_calls(&self) -> Vec<String> {
        self.state.lock().unwrap().tool_calls.clone()
    }

    pub fn built_drafts(&self) -> Vec<TxDraft> {
        self.state.lock().unwrap().drafts.clone()
    }

    fn record_call(&self, call: String) {
        self.state.lock().unwrap().tool_calls.push(call);
    }

    fn attach(&self, peer: PeerId) -> mpsc::UnboundedReceiver<String> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients
            .lock()
            .unwrap()
            .entry(peer)
            .or_default()
            .push(tx);
        rx
    }

    fn send_to(&self, peer: PeerId, message: &Value) {
        let text = message.to_string();
        let mut clients = self.clients.lock().unwrap();
        if let Some(senders) = clients.get_mut(&peer) {
            senders.retain(|tx| tx.send(text.clone()).is_ok());
        }
    }

    fn broadcast(&self, message: Value) {
        for peer in PeerId::ALL {
            self.send_to(peer, &message);
        }
    }

    fn handle_command(self: &Arc<Self>, peer: PeerId, raw: &str) {
        let Ok(command) = serde_json::from_str::<Value>(raw) else {
            return;
        };
        let tag = command["tag"].as_str().unwrap_or_default().to_string();
        self.state
            .lock()
            .unwrap()
            .commands
            .push((peer, tag.clone()));

        match tag.as_str() {
            "Init" => self.on_init(),
            "Close" => self.on_close(),
            "Fanout" => self.on_fanout(),
            "Abort" => self.on_abort(),
            "NewTx" => self.on_new_tx(peer, &command["transaction"]),
            _ => self.send_to(
                peer,
                &json!({"tag": "CommandFailed", "clientInput": command}),
            ),
        }
    }

    fn on_init(&self) {
        let mut state = self.state.lock().unwrap();
        if state.head != "Idle" {
            return;
        }
        state.head = "Initial".to_string();
        if !state.silent_init {
            self.broadcast(json!({"tag": "HeadIsInitializing", "headId": "fake-head"}));
        }
    }

    fn on_commit(&self, peer: PeerId, utxo: UtxoSet) {
        let mut state = self.state.lock().unwrap();
        let remaining: Vec<(String, UtxoEntry)> = state
            .l1
            .entries()
            .filter(|(tx_ref, _)| !utxo.entries().any(|(r, _)| r == *tx_ref))
            .map(|(r, e)| (r.clone(), e.clone()))
            .collect();
        state.l1 = UtxoSet::new();
        for (tx_ref, entry) in remaining {
            state.l1.insert(tx_ref, entry);
        }
        for (tx_ref, entry) in utxo.entries() {
            state.l2.insert(tx_ref.clone(), entry.clone());
        }
        state.committed.push(peer);

        self.broadcast(json!({"tag": "Committed", "party": peer.as_str(), "utxo": utxo}));

        if PeerId::ALL.iter().all(|p| state.committed.contains(p)) {
            state.head = "Open".to_string();
            self.broadcast(json!({"tag": "HeadIsOpen", "utxo": state.l2}));
        }
    }

    fn on_close(self: &Arc<Self>) {
        {
            let mut state = self.state.lock().unwrap();
            if state.close_ignores > 0 {
                state.close_ignores -= 1;
                return;
            }
            if state.head != "Open" {
                return;
            }
            state.head = "Closed".to_string();
        }
        self.broadcast(json!({"tag": "HeadIsClosed", "contestationDeadline": "soon"}));

        let chain = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(chain.fanout_delay).await;
            chain.set_head("FanoutPossible");
            chain.broadcast(json!({"tag": "ReadyToFanout"}));
        });
    }

    fn on_fanout(&self) {
        let mut state = self.state.lock().unwrap();
        if state.head != "FanoutPossible" {
            return;
        }
        let l2 = std::mem::take(&mut state.l2);
        for (tx_ref, entry) in l2.entries() {
            state.l1.insert(tx_ref.clone(), entry.clone());
        }
        state.committed.clear();
        state.head = "Final".to_string();
        self.broadcast(json!({"tag": "HeadIsFinalized", "utxo": l2}));
    }

    fn on_abort(&self) {
        let mut state = self.state.lock().unwrap();
        state.head = "Idle".to_string();
        state.committed.clear();
        self.broadcast(json!({"tag": "HeadIsAborted"}));
    }

    fn on_new_tx(&self, peer: PeerId, transaction: &Value) {
        let draft: Option<TxDraft> = serde_json::from_value(transaction["body"]["draft"].clone()).ok();
        let mut state = self.state.lock().unwrap();
        let applied = match draft {
            Some(draft) if state.head == "Open" => apply_draft(&mut state, Ledger::L2, &draft),
            _ => false,
        };
        if !applied {
            self.send_to(peer, &json!({"tag": "TxInvalid", "transaction": transaction}));
            return;
        }
        self.broadcast(json!({"tag": "TxValid", "transaction": transaction}));
        self.broadcast(json!({"tag": "SnapshotConfirmed", "snapshot": {"utxo": state.l2}}));
    }
}

enum Ledger {
    L1,
    L2,
}

/// Spend the draft's inputs and create its outputs; false if an input is missing
fn apply_draft(state: &mut ChainState, ledger: Ledger, draft: &TxDraft) -> bool {
    let set = match ledger {
        Ledger::L1 => &state.l1,
        Ledger::L2 => &state.l2,
    };
    if !draft
        .inputs
        .iter()
        .all(|input| set.entries().any(|(r, _)| r == input))
    {
        return false;
    }

    let mut next = UtxoSet::new();
    for (tx_ref, entry) in set.entries() {
        if !draft.inputs.contains(tx_ref) {
            next.insert(tx_ref.clone(), entry.clone());
        }
    }
    let tx_id = state.fresh_ref();
    for (ix, output) in draft.outputs.iter().enumerate() {
        next.insert(
            format!("{}#{}", tx_id, ix),
            UtxoEntry::new(&output.address, output.lovelace),
        );
    }

    match ledger {
        Ledger::L1 => state.l1 = next,
        Ledger::L2 => state.l2 = next,
    }
    true
}

/// `LedgerTool` backed by the fake chain; envelopes embed the draft they came from
pub struct FakeLedgerTool {
    chain: Arc<FakeChain>,
}

#[async_trait]
impl LedgerTool for FakeLedgerTool {
    async fn address(&self, peer: PeerId) -> Result<String> {
        Ok(address_of(peer))
    }

    async fn query_utxo(&self, peer: PeerId) -> Result<UtxoSet> {
        self.chain.record_call(format!("query_utxo:{}", peer));
        let state = self.chain.state.lock().unwrap();
        Ok(state.l1.owned_by(&address_of(peer)))
    }

    async fn build_transaction(&self, draft: &TxDraft) -> Result<TxArtifact> {
        self.chain.record_call("build".to_string());
        self.chain.state.lock().unwrap().drafts.push(draft.clone());
        Ok(TxArtifact::body(json!({
            "type": "TxBodyConway",
            "draft": draft,
        })))
    }

    async fn sign_transaction(&self, peer: PeerId, artifact: &TxArtifact) -> Result<TxArtifact> {
        self.chain.record_call(format!("sign:{}", peer));
        Ok(TxArtifact::tx(json!({
            "type": "Tx ConwayEra",
            "signer": peer.as_str(),
            "body": artifact.envelope,
        })))
    }

    async fn submit_transaction(&self, artifact: &TxArtifact) -> Result<()> {
        self.chain.record_call("submit".to_string());
        let body = &artifact.envelope["body"];

        if let Some(commit) = body.get("commit") {
            let peer: PeerId = commit["peer"]
                .as_str()
                .unwrap_or_default()
                .parse()
                .map_err(|_| EscrowError::tool("transaction submit", "unknown committer"))?;
            let utxo: UtxoSet = serde_json::from_value(commit["utxo"].clone())?;
            self.chain.on_commit(peer, utxo);
            return Ok(());
        }

        let draft: TxDraft = serde_json::from_value(body["draft"].clone())?;
        let mut state = self.chain.state.lock().unwrap();
        if apply_draft(&mut state, Ledger::L1, &draft) {
            Ok(())
        } else {
            Err(EscrowError::tool(
                "transaction submit",
                "BadInputsUTxO: input already spent",
            ))
        }
    }
}

#[derive(Clone)]
struct NodeState {
    peer: PeerId,
    chain: Arc<FakeChain>,
}

/// Two fake hydra nodes listening on ephemeral ports
pub struct FakeNetwork {
    pub alice: SocketAddr,
    pub bob: SocketAddr,
    pub chain: Arc<FakeChain>,
}

impl FakeNetwork {
    pub async fn start() -> Self {
        let chain = FakeChain::new();
        let alice = spawn_node(PeerId::Alice, chain.clone()).await;
        let bob = spawn_node(PeerId::Bob, chain.clone()).await;
        Self { alice, bob, chain }
    }

    pub fn tool(&self) -> Arc<dyn LedgerTool> {
        Arc::new(FakeLedgerTool {
            chain: self.chain.clone(),
        })
    }

    /// Local config pointing at both fake nodes with short timeouts
    pub fn config(&self) -> AppConfig {
        let mut config = AppConfig::local(&self.alice.to_string(), &self.bob.to_string());
        config.cardano.settle_delay_ms = 0;
        config.timeouts.phase_ms = 5_000;
        config.timeouts.close_attempt_ms = 400;
        config.timeouts.tx_valid_ms = 1_000;
        config.timeouts.snapshot_confirm_ms = 1_000;
        config.timeouts.connect_ms = 2_000;
        config.timeouts.init_ack_ms = 2_000;
        config
    }
}

async fn spawn_node(peer: PeerId, chain: Arc<FakeChain>) -> SocketAddr {
    let app = Router::new()
        .route("/", get(ws_upgrade))
        .route("/head", get(head))
        .route("/snapshot/utxo", get(snapshot_utxo))
        .route("/commit", post(commit))
        .with_state(NodeState { peer, chain });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(node): State<NodeState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| session(socket, node))
}

async fn session(socket: WebSocket, node: NodeState) {
    let (mut sink, mut stream) = socket.split();
    let mut outbound = node.chain.attach(node.peer);

    let greeting = json!({
        "tag": "Greetings",
        "me": {"vkey": node.peer.as_str()},
        "headStatus": node.chain.head(),
    });
    if sink.send(Message::Text(greeting.to_string())).await.is_err() {
        return;
    }

    let writer = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            Message::Text(text) => node.chain.handle_command(node.peer, &text),
            Message::Close(_) => break,
            _ => {}
        }
    }
    writer.abort();
}

async fn head(State(node): State<NodeState>) -> Json<Value> {
    Json(json!({"tag": node.chain.head()}))
}

async fn snapshot_utxo(State(node): State<NodeState>) -> Json<UtxoSet> {
    Json(node.chain.state.lock().unwrap().l2.clone())
}

async fn commit(State(node): State<NodeState>, Json(utxo): Json<UtxoSet>) -> Json<Value> {
    Json(json!({
        "type": "Tx ConwayEra",
        "description": "Hydra commit transaction",
        "commit": {"peer": node.peer.as_str(), "utxo": utxo},
    }))
}

/// Poll `check` every 25ms until it holds or `budget` runs out
pub async fn wait_until<F>(budget: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + budget;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check()
}

/// Fake network with alice holding 5 ADA and bob 3 ADA on L1
pub async fn funded_network() -> FakeNetwork {
    let network = FakeNetwork::start().await;
    network.chain.fund_l1(PeerId::Alice, "aa00#0", 5_000_000);
    network.chain.fund_l1(PeerId::Bob, "bb00#0", 3_000_000);
    network
}
