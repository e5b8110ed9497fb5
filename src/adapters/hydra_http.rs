use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::config::HydraConfig;
use crate::domain::{HeadState, PeerId, UtxoSet};
use crate::error::{EscrowError, Result};

/// `host:port` of each peer's hydra-node API
#[derive(Debug, Clone)]
pub struct PeerEndpoints {
    alice: String,
    bob: String,
}

impl PeerEndpoints {
    pub fn new(alice: impl Into<String>, bob: impl Into<String>) -> Self {
        Self {
            alice: alice.into(),
            bob: bob.into(),
        }
    }

    pub fn from_config(config: &HydraConfig) -> Self {
        Self::new(&config.alice_node, &config.bob_node)
    }

    pub fn address(&self, peer: PeerId) -> &str {
        match peer {
            PeerId::Alice => &self.alice,
            PeerId::Bob => &self.bob,
        }
    }

    /// WebSocket URL with history replay disabled
    pub fn ws_url(&self, peer: PeerId) -> Result<Url> {
        let raw = format!("ws://{}?history=no", self.address(peer));
        Url::parse(&raw).map_err(|e| EscrowError::InvalidEndpoint(format!("{}: {}", raw, e)))
    }

    pub fn http_url(&self, peer: PeerId, path: &str) -> String {
        format!("http://{}{}", self.address(peer), path)
    }
}

/// REST client for the hydra-node HTTP API
#[derive(Debug, Clone)]
pub struct HydraNodeClient {
    http: Client,
    endpoints: PeerEndpoints,
}

impl HydraNodeClient {
    pub fn new(endpoints: PeerEndpoints) -> Result<Self> {
        let http = Client::builder()
            .user_agent("hydra-escrow/0.1")
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| EscrowError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, endpoints })
    }

    /// Current head status as reported by `GET /head`.
    ///
    /// Empty or non-JSON bodies are read as `Idle`; transport errors are returned.
    pub async fn head_status(&self, peer: PeerId) -> Result<HeadState> {
        let text = self.get_text(peer, "/head").await?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            warn!(%peer, "Empty head status response, assuming Idle");
            return Ok(HeadState::Idle);
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(body) => {
                let tag = body.get("tag").and_then(Value::as_str).unwrap_or("Idle");
                debug!(%peer, tag, "Head status");
                Ok(HeadState::from_tag(tag))
            }
            Err(_) => {
                let preview: String = trimmed.chars().take(120).collect();
                warn!(%peer, response = %preview, "Non-JSON head status response, assuming Idle");
                Ok(HeadState::Idle)
            }
        }
    }

    /// Confirmed L2 UTXO set from `GET /snapshot/utxo`
    pub async fn snapshot_utxo(&self, peer: PeerId) -> Result<UtxoSet> {
        let text = self.get_text(peer, "/snapshot/utxo").await?;
        if text.trim().is_empty() {
            return Ok(UtxoSet::new());
        }
        serde_json::from_str(&text).map_err(|e| EscrowError::Node {
            peer,
            path: "/snapshot/utxo".to_string(),
            detail: format!("invalid UTXO JSON: {}", e),
        })
    }

    /// Post an L1 UTXO set to `POST /commit` and return the unsigned commit transaction
    pub async fn commit(&self, peer: PeerId, utxo: &UtxoSet) -> Result<Value> {
        let url = self.endpoints.http_url(peer, "/commit");
        let resp = self.http.post(&url).json(utxo).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(EscrowError::Node {
                peer,
                path: "/commit".to_string(),
                detail: format!("status={} body={}", status, text),
            });
        }

        serde_json::from_str(&text).map_err(|e| EscrowError::Node {
            peer,
            path: "/commit".to_string(),
            detail: format!("invalid commit transaction JSON: {}", e),
        })
    }

    async fn get_text(&self, peer: PeerId, path: &str) -> Result<String> {
        let url = self.endpoints.http_url(peer, path);
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(EscrowError::Node {
                peer,
                path: path.to_string(),
                detail: format!("status={} body={}", status, text),
            });
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_disables_history() {
        let endpoints = PeerEndpoints::new("127.0.0.1:4001", "127.0.0.1:4002");
        let url = endpoints.ws_url(PeerId::Bob).unwrap();
        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.port(), Some(4002));
        assert_eq!(url.query(), Some("history=no"));
    }

    #[test]
    fn test_invalid_address_rejected() {
        let endpoints = PeerEndpoints::new("not a host", "127.0.0.1:4002");
        assert!(matches!(
            endpoints.ws_url(PeerId::Alice),
            Err(EscrowError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_http_url() {
        let endpoints = PeerEndpoints::new("127.0.0.1:4001", "127.0.0.1:4002");
        assert_eq!(
            endpoints.http_url(PeerId::Alice, "/head"),
            "http://127.0.0.1:4001/head"
        );
    }

    #[tokio::test]
    async fn test_unreachable_node_is_transport_error() {
        let client = HydraNodeClient::new(PeerEndpoints::new("127.0.0.1:1", "127.0.0.1:1")).unwrap();
        assert!(matches!(
            client.head_status(PeerId::Alice).await,
            Err(EscrowError::Http(_))
        ));
    }
}
