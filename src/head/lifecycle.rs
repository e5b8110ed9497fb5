use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::commit::CommitPipeline;
use crate::adapters::{LedgerTool, MessageFilter, PeerHub};
use crate::domain::{ClientCommand, MessageTag, PeerId};
use crate::error::Result;

/// Drives both peers from idle to an open head
#[derive(Clone)]
pub struct HeadLifecycle {
    hub: PeerHub,
    commits: CommitPipeline,
    tool: Arc<dyn LedgerTool>,
    phase_timeout: Duration,
}

impl HeadLifecycle {
    pub fn new(
        hub: PeerHub,
        commits: CommitPipeline,
        tool: Arc<dyn LedgerTool>,
        phase_timeout: Duration,
    ) -> Self {
        Self {
            hub,
            commits,
            tool,
            phase_timeout,
        }
    }

    /// Fresh links to both peers, then `Init` to each
    pub async fn initiate(&self) -> Result<()> {
        info!("Connecting to both hydra nodes");
        tokio::try_join!(
            self.hub.connect(PeerId::Alice),
            self.hub.connect(PeerId::Bob)
        )?;

        for peer in PeerId::ALL {
            self.hub.send(peer, &ClientCommand::Init)?;
        }
        info!("Init sent to both peers");
        Ok(())
    }

    /// Wait for initialization, commit alice then bob, and wait for the head to open
    pub async fn complete_opening(&self) -> Result<()> {
        info!("Waiting for HeadIsInitializing");
        self.hub
            .wait_for_both(MessageTag::HeadIsInitializing, self.phase_timeout)
            .await?;

        for peer in PeerId::ALL {
            self.commit_and_confirm(peer).await?;
        }

        info!("Waiting for HeadIsOpen");
        self.hub
            .wait_for_both(MessageTag::HeadIsOpen, self.phase_timeout)
            .await?;
        info!("Hydra head is open");
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.initiate().await?;
        self.complete_opening().await
    }

    async fn commit_and_confirm(&self, peer: PeerId) -> Result<()> {
        let address = self.tool.address(peer).await?;

        // Arm before committing: the other peer's Committed echo and any
        // stale cached tag must not satisfy this wait.
        let filter: MessageFilter = Box::new(move |message| message.commits_address(&address));
        let confirmation = self.hub.arm(peer, MessageTag::Committed, Some(filter));

        self.commits.commit(peer).await?;

        info!(%peer, "Waiting for Committed");
        confirmation.wait(self.phase_timeout).await?;
        info!(%peer, "Commit confirmed");
        Ok(())
    }
}
