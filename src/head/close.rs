use tracing::{error, info, warn};

use crate::adapters::PeerHub;
use crate::config::TimeoutConfig;
use crate::domain::{ClientCommand, MessageTag, PeerId};
use crate::error::{EscrowError, Result};

/// Close → fan out → finalize, with a bounded Close resend loop
#[derive(Clone)]
pub struct ClosePipeline {
    hub: PeerHub,
    timeouts: TimeoutConfig,
}

impl ClosePipeline {
    pub fn new(hub: PeerHub, timeouts: TimeoutConfig) -> Self {
        Self { hub, timeouts }
    }

    /// Send the first `Close` through alice
    pub async fn initiate(&self) -> Result<()> {
        self.hub
            .send_connected(PeerId::Alice, &ClientCommand::Close)
            .await?;
        info!("Close sent");
        Ok(())
    }

    /// Wait for both peers to report `HeadIsClosed`, resending `Close` to alice
    /// after every failed window except the last.
    pub async fn wait_for_head_closed_with_retry(&self) -> Result<()> {
        let max_attempts = self.timeouts.close_max_attempts.max(1);

        for attempt in 1..=max_attempts {
            info!(attempt, max_attempts, "Waiting for HeadIsClosed");
            match self
                .hub
                .wait_for_both(MessageTag::HeadIsClosed, self.timeouts.close_attempt())
                .await
            {
                Ok(()) => {
                    info!(attempt, "HeadIsClosed reached");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "HeadIsClosed not reached");
                }
            }

            if attempt < max_attempts {
                if let Err(e) = self
                    .hub
                    .send_connected(PeerId::Alice, &ClientCommand::Close)
                    .await
                {
                    error!(attempt = attempt + 1, error = %e, "Failed to resend Close");
                } else {
                    info!(attempt = attempt + 1, "Close resent");
                }
            }
        }

        Err(EscrowError::CloseNotAchieved {
            attempts: max_attempts,
        })
    }

    /// Everything after the initial `Close`: closed → ready to fan out → finalized
    pub async fn finalize(&self) -> Result<()> {
        self.wait_for_head_closed_with_retry().await?;

        info!("Waiting for ReadyToFanout");
        self.hub
            .wait_for_both(MessageTag::ReadyToFanout, self.timeouts.phase())
            .await?;

        self.hub
            .send_connected(PeerId::Alice, &ClientCommand::Fanout)
            .await?;
        info!("Fanout sent");

        self.hub
            .wait_for_both(MessageTag::HeadIsFinalized, self.timeouts.phase())
            .await?;
        info!("Hydra head is finalized");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::PeerEndpoints;
    use std::time::Duration;

    fn pipeline(attempts: u32) -> (ClosePipeline, PeerHub) {
        let hub = PeerHub::new(
            PeerEndpoints::new("127.0.0.1:1", "127.0.0.1:1"),
            Duration::from_millis(50),
        );
        let timeouts = TimeoutConfig {
            close_attempt_ms: 20,
            close_max_attempts: attempts,
            phase_ms: 100,
            ..TimeoutConfig::default()
        };
        (ClosePipeline::new(hub.clone(), timeouts), hub)
    }

    #[tokio::test]
    async fn test_exhaustion_is_close_not_achieved() {
        let (pipeline, _hub) = pipeline(3);
        let err = pipeline.wait_for_head_closed_with_retry().await.unwrap_err();
        assert!(matches!(err, EscrowError::CloseNotAchieved { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_already_closed_resolves_on_first_attempt() {
        let (pipeline, hub) = pipeline(5);
        hub.ingest(PeerId::Alice, r#"{"tag":"HeadIsClosed"}"#);
        hub.ingest(PeerId::Bob, r#"{"tag":"HeadIsClosed"}"#);
        pipeline.wait_for_head_closed_with_retry().await.unwrap();
    }

    #[tokio::test]
    async fn test_initiate_without_node_fails() {
        let (pipeline, _hub) = pipeline(5);
        assert!(pipeline.initiate().await.is_err());
    }
}
