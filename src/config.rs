use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::PeerId;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub hydra: HydraConfig,
    pub cardano: CardanoConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HydraConfig {
    /// host:port of alice's hydra-node API
    pub alice_node: String,
    /// host:port of bob's hydra-node API
    pub bob_node: String,
    /// Also poll bob's head status and warn when it disagrees with alice
    #[serde(default = "default_true")]
    pub reconcile_peers: bool,
}

impl HydraConfig {
    pub fn node_address(&self, peer: PeerId) -> &str {
        match peer {
            PeerId::Alice => &self.alice_node,
            PeerId::Bob => &self.bob_node,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardanoConfig {
    /// Path to the cardano-cli executable
    pub cli_path: String,
    /// Directory holding `node.socket` and `credentials/<peer>-funds.{addr,sk}`
    pub path_prefix: PathBuf,
    /// Network selector passed to cardano-cli, e.g. `--testnet-magic 1`
    pub network: String,
    /// Root for per-invocation scratch directories
    pub scratch_dir: PathBuf,
    /// Flat fee used for L1 withdrawal/refund transactions
    pub l1_fee_lovelace: u64,
    /// Delay after an L1 submit before re-reading the balance
    pub settle_delay_ms: u64,
    /// Upper bound for a single cardano-cli invocation
    pub command_timeout_ms: u64,
}

impl CardanoConfig {
    pub fn socket_path(&self) -> PathBuf {
        self.path_prefix.join("node.socket")
    }

    pub fn address_file(&self, peer: PeerId) -> PathBuf {
        self.path_prefix
            .join("credentials")
            .join(format!("{}-funds.addr", peer))
    }

    pub fn signing_key_file(&self, peer: PeerId) -> PathBuf {
        self.path_prefix
            .join("credentials")
            .join(format!("{}-funds.sk", peer))
    }

    pub fn network_args(&self) -> Vec<String> {
        self.network.split_whitespace().map(str::to_string).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Budget for each lifecycle phase wait (initializing, committed, open, fanout, finalized)
    pub phase_ms: u64,
    /// Window for one HeadIsClosed attempt
    pub close_attempt_ms: u64,
    /// Number of HeadIsClosed windows before giving up
    pub close_max_attempts: u32,
    /// Best-effort TxValid window after NewTx
    pub tx_valid_ms: u64,
    /// SnapshotConfirmed window after NewTx
    pub snapshot_confirm_ms: u64,
    /// WebSocket dial timeout
    pub connect_ms: u64,
    /// How long `/start` waits for alice to acknowledge Init before answering
    pub init_ack_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            phase_ms: 600_000,
            close_attempt_ms: 60_000,
            close_max_attempts: 5,
            tx_valid_ms: 5_000,
            snapshot_confirm_ms: 10_000,
            connect_ms: 10_000,
            init_ack_ms: 5_000,
        }
    }
}

impl TimeoutConfig {
    pub fn phase(&self) -> Duration {
        Duration::from_millis(self.phase_ms)
    }

    pub fn close_attempt(&self) -> Duration {
        Duration::from_millis(self.close_attempt_ms)
    }

    pub fn tx_valid(&self) -> Duration {
        Duration::from_millis(self.tx_valid_ms)
    }

    pub fn snapshot_confirm(&self) -> Duration {
        Duration::from_millis(self.snapshot_confirm_ms)
    }

    pub fn connect(&self) -> Duration {
        Duration::from_millis(self.connect_ms)
    }

    pub fn init_ack(&self) -> Duration {
        Duration::from_millis(self.init_ack_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// API key lifetime
    pub ttl_hours: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_hours: 24 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
    /// Directory for daily rolling log files; console only when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            dir: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Environment variables understood by earlier deployments, mapped to config keys
const LEGACY_ENV_KEYS: &[(&str, &str)] = &[
    ("PORT", "server.port"),
    ("URL_ALICE_HYDRA_NODE", "hydra.alice_node"),
    ("URL_BOB_HYDRA_NODE", "hydra.bob_node"),
    ("PATH_PREFIX", "cardano.path_prefix"),
    ("TARGET_NETWORK", "cardano.network"),
];

impl AppConfig {
    /// Load configuration from files and environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config")
    }

    /// Load configuration from a specific directory
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let mut builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("hydra.alice_node", "127.0.0.1:4001")?
            .set_default("hydra.bob_node", "127.0.0.1:4002")?
            .set_default("hydra.reconcile_peers", true)?
            .set_default("cardano.cli_path", "cardano-cli")?
            .set_default("cardano.path_prefix", "./cardano")?
            .set_default("cardano.network", "--testnet-magic 1")?
            .set_default(
                "cardano.scratch_dir",
                std::env::temp_dir()
                    .join("hydra-escrow")
                    .to_string_lossy()
                    .to_string(),
            )?
            .set_default("cardano.l1_fee_lovelace", 200_000)?
            .set_default("cardano.settle_delay_ms", 3_000)?
            .set_default("cardano.command_timeout_ms", 120_000)?
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            // Load default config file
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Load environment-specific config (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("ESCROW_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            // Override with environment variables (ESCROW__HYDRA__ALICE_NODE, etc.)
            .add_source(
                Environment::with_prefix("ESCROW")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in LEGACY_ENV_KEYS {
            let value = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
            builder = builder.set_override_option(*key, value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Configuration for local nodes with default paths and timeouts
    pub fn local(alice_node: &str, bob_node: &str) -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
            },
            hydra: HydraConfig {
                alice_node: alice_node.to_string(),
                bob_node: bob_node.to_string(),
                reconcile_peers: true,
            },
            cardano: CardanoConfig {
                cli_path: "cardano-cli".to_string(),
                path_prefix: PathBuf::from("./cardano"),
                network: "--testnet-magic 1".to_string(),
                scratch_dir: std::env::temp_dir().join("hydra-escrow"),
                l1_fee_lovelace: 200_000,
                settle_delay_ms: 3_000,
                command_timeout_ms: 120_000,
            },
            timeouts: TimeoutConfig::default(),
            session: SessionConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
