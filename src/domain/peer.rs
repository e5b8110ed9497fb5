use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two fixed head participants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerId {
    Alice,
    Bob,
}

impl PeerId {
    pub const ALL: [PeerId; 2] = [PeerId::Alice, PeerId::Bob];

    pub fn as_str(&self) -> &'static str {
        match self {
            PeerId::Alice => "alice",
            PeerId::Bob => "bob",
        }
    }

    /// The counterparty in a two-party head
    pub fn other(&self) -> PeerId {
        match self {
            PeerId::Alice => PeerId::Bob,
            PeerId::Bob => PeerId::Alice,
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PeerId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alice" => Ok(PeerId::Alice),
            "bob" => Ok(PeerId::Bob),
            other => Err(format!("unknown peer '{}'", other)),
        }
    }
}
