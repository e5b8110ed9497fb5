//! Gateway to the external `cardano-cli` transaction tool.
//!
//! Every invocation that needs files works inside its own scratch directory
//! (`<scratch_dir>/<op>-<uuid>`), removed again when the operation finishes.

use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CardanoConfig;
use crate::domain::{ArtifactKind, PeerId, TxArtifact, TxDraft, UtxoSet};
use crate::error::{EscrowError, Result};

/// Operations the orchestrator needs from the transaction tool.
///
/// Artifacts are passed through untouched; only the sequencing lives in the core.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerTool: Send + Sync {
    /// L1 funding address of `peer`
    async fn address(&self, peer: PeerId) -> Result<String>;

    /// L1 UTXOs held at the funding address of `peer`
    async fn query_utxo(&self, peer: PeerId) -> Result<UtxoSet>;

    /// Build an unsigned transaction body
    async fn build_transaction(&self, draft: &TxDraft) -> Result<TxArtifact>;

    /// Sign a body or a node-drafted transaction with the key of `peer`
    async fn sign_transaction(&self, peer: PeerId, artifact: &TxArtifact) -> Result<TxArtifact>;

    /// Submit a signed transaction to L1
    async fn submit_transaction(&self, artifact: &TxArtifact) -> Result<()>;
}

/// Unique working directory for one tool operation, deleted on drop
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub async fn create(root: &Path, op: &str) -> Result<Self> {
        let path = root.join(format!("{}-{}", op, Uuid::new_v4()));
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove scratch directory");
        }
    }
}

/// `cardano-cli` backed implementation
pub struct CardanoCli {
    config: CardanoConfig,
}

impl CardanoCli {
    pub fn new(config: CardanoConfig) -> Self {
        Self { config }
    }

    /// Run the tool with `args`, returning stdout on success
    async fn run(&self, args: &[String]) -> Result<String> {
        let label = args
            .iter()
            .take_while(|a| !a.starts_with("--"))
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        debug!(command = %label, ?args, "Running cardano-cli");

        let child = Command::new(&self.config.cli_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EscrowError::tool(&label, format!("failed to spawn: {}", e)))?;

        let budget = Duration::from_millis(self.config.command_timeout_ms);
        let output = timeout(budget, child.wait_with_output())
            .await
            .map_err(|_| EscrowError::tool(&label, format!("timed out after {:?}", budget)))?
            .map_err(|e| EscrowError::tool(&label, format!("failed to collect output: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EscrowError::tool(
                &label,
                format!("exit status {}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn scratch(&self, op: &str) -> Result<ScratchDir> {
        ScratchDir::create(&self.config.scratch_dir, op).await
    }

    fn socket_args(&self) -> Vec<String> {
        vec![
            "--socket-path".to_string(),
            self.config.socket_path().to_string_lossy().into_owned(),
        ]
    }
}

async fn read_envelope(path: &Path, command: &str) -> Result<Value> {
    let text = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&text)
        .map_err(|e| EscrowError::tool(command, format!("unparseable output file: {}", e)))
}

async fn write_envelope(path: &Path, envelope: &Value) -> Result<()> {
    tokio::fs::write(path, serde_json::to_vec_pretty(envelope)?).await?;
    Ok(())
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[async_trait]
impl LedgerTool for CardanoCli {
    async fn address(&self, peer: PeerId) -> Result<String> {
        let path = self.config.address_file(peer);
        let address = tokio::fs::read_to_string(&path).await.map_err(|e| {
            EscrowError::tool("read address", format!("{}: {}", path.display(), e))
        })?;
        let address = address.trim().to_string();
        if address.is_empty() {
            return Err(EscrowError::tool(
                "read address",
                format!("{} is empty", path.display()),
            ));
        }
        Ok(address)
    }

    async fn query_utxo(&self, peer: PeerId) -> Result<UtxoSet> {
        let address = self.address(peer).await?;

        let mut args = vec!["query".to_string(), "utxo".to_string()];
        args.extend(self.socket_args());
        args.extend(["--address".to_string(), address]);
        args.extend(self.config.network_args());
        args.push("--output-json".to_string());

        let stdout = self.run(&args).await?;
        let utxo: UtxoSet = serde_json::from_str(stdout.trim()).map_err(|e| {
            EscrowError::tool("query utxo", format!("unparseable UTXO JSON: {}", e))
        })?;
        debug!(%peer, outputs = utxo.len(), lovelace = utxo.total_lovelace(), "Queried L1 UTXO");
        Ok(utxo)
    }

    async fn build_transaction(&self, draft: &TxDraft) -> Result<TxArtifact> {
        let scratch = self.scratch("build").await?;
        let out_file = scratch.file("tx.body");

        let mut args = vec![
            "latest".to_string(),
            "transaction".to_string(),
            "build-raw".to_string(),
        ];
        for input in &draft.inputs {
            args.extend(["--tx-in".to_string(), input.clone()]);
        }
        for output in &draft.outputs {
            args.extend([
                "--tx-out".to_string(),
                format!("{}+{}", output.address, output.lovelace),
            ]);
        }
        args.extend(["--fee".to_string(), draft.fee.to_string()]);
        args.extend(["--out-file".to_string(), path_arg(&out_file)]);

        self.run(&args).await?;
        let envelope = read_envelope(&out_file, "transaction build-raw").await?;
        Ok(TxArtifact::body(envelope))
    }

    async fn sign_transaction(&self, peer: PeerId, artifact: &TxArtifact) -> Result<TxArtifact> {
        let scratch = self.scratch("sign").await?;
        let in_file = scratch.file("tx.unsigned");
        let out_file = scratch.file("tx.signed");
        write_envelope(&in_file, &artifact.envelope).await?;

        let mut args = vec![
            "latest".to_string(),
            "transaction".to_string(),
            "sign".to_string(),
        ];
        match artifact.kind {
            ArtifactKind::Body => args.extend(["--tx-body-file".to_string(), path_arg(&in_file)]),
            ArtifactKind::Tx => args.extend(["--tx-file".to_string(), path_arg(&in_file)]),
        }
        args.extend([
            "--signing-key-file".to_string(),
            path_arg(&self.config.signing_key_file(peer)),
            "--out-file".to_string(),
            path_arg(&out_file),
        ]);
        if artifact.kind == ArtifactKind::Tx {
            args.extend(self.config.network_args());
        }

        self.run(&args).await?;
        let envelope = read_envelope(&out_file, "transaction sign").await?;
        debug!(%peer, "Signed transaction");
        Ok(TxArtifact::tx(envelope))
    }

    async fn submit_transaction(&self, artifact: &TxArtifact) -> Result<()> {
        let scratch = self.scratch("submit").await?;
        let tx_file = scratch.file("tx.signed");
        write_envelope(&tx_file, &artifact.envelope).await?;

        let mut args = vec![
            "latest".to_string(),
            "transaction".to_string(),
            "submit".to_string(),
            "--tx-file".to_string(),
            path_arg(&tx_file),
        ];
        args.extend(self.config.network_args());
        args.extend(self.socket_args());

        self.run(&args).await?;
        info!("Transaction submitted to L1");
        Ok(())
    }
}
