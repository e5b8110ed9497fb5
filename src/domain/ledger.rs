use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const LOVELACE_PER_ADA: u64 = 1_000_000;

/// Balance in both units; `ada` is always derived from `lovelace`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub ada: f64,
    pub lovelace: u64,
}

impl Balance {
    pub fn from_lovelace(lovelace: u64) -> Self {
        Self {
            ada: lovelace as f64 / LOVELACE_PER_ADA as f64,
            lovelace,
        }
    }

    pub fn zero() -> Self {
        Self::from_lovelace(0)
    }

    pub fn is_zero(&self) -> bool {
        self.lovelace == 0
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}

/// Output value as reported by cardano-cli / hydra-node.
///
/// Older tool versions report a bare integer, newer ones an object with a
/// `lovelace` field plus any native assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UtxoValue {
    Lovelace(u64),
    Assets {
        #[serde(default)]
        lovelace: u64,
        #[serde(flatten)]
        assets: Map<String, Value>,
    },
}

impl UtxoValue {
    pub fn lovelace(&self) -> u64 {
        match self {
            UtxoValue::Lovelace(amount) => *amount,
            UtxoValue::Assets { lovelace, .. } => *lovelace,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub address: String,
    pub value: UtxoValue,
    /// Datum, reference script etc. — passed through untouched
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UtxoEntry {
    pub fn new(address: impl Into<String>, lovelace: u64) -> Self {
        Self {
            address: address.into(),
            value: UtxoValue::Assets {
                lovelace,
                assets: Map::new(),
            },
            extra: Map::new(),
        }
    }

    pub fn lovelace(&self) -> u64 {
        self.value.lovelace()
    }
}

/// UTXO set keyed by transaction reference (`<txid>#<ix>`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UtxoSet(BTreeMap<String, UtxoEntry>);

impl UtxoSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tx_ref: impl Into<String>, entry: UtxoEntry) {
        self.0.insert(tx_ref.into(), entry);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &UtxoEntry)> {
        self.0.iter()
    }

    pub fn total_lovelace(&self) -> u64 {
        self.0.values().map(UtxoEntry::lovelace).sum()
    }

    pub fn owned_by(&self, address: &str) -> UtxoSet {
        UtxoSet(
            self.0
                .iter()
                .filter(|(_, entry)| entry.address == address)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// The single largest output, if any
    pub fn largest(&self) -> Option<(&String, &UtxoEntry)> {
        self.0.iter().max_by_key(|(_, entry)| entry.lovelace())
    }

    /// Pick outputs largest-first until `target` lovelace is covered.
    ///
    /// Returns the chosen references and their combined value, or `None` when
    /// the whole set is not enough.
    pub fn select_covering(&self, target: u64) -> Option<(Vec<String>, u64)> {
        let mut candidates: Vec<(&String, u64)> = self
            .0
            .iter()
            .map(|(k, entry)| (k, entry.lovelace()))
            .collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let mut chosen = Vec::new();
        let mut total: u64 = 0;
        for (tx_ref, lovelace) in candidates {
            if total >= target && !chosen.is_empty() {
                break;
            }
            chosen.push(tx_ref.clone());
            total = total.saturating_add(lovelace);
        }

        if chosen.is_empty() || total < target {
            None
        } else {
            Some((chosen, total))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: String,
    pub lovelace: u64,
}

/// Inputs and outputs for a raw transaction build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxDraft {
    pub inputs: Vec<String>,
    pub outputs: Vec<TxOutput>,
    pub fee: u64,
}

impl TxDraft {
    /// Pay `amount` to `to`, returning what is left after `fee` to `change_address`.
    ///
    /// A zero change output is omitted. Returns `None` if `available` does
    /// not cover `amount + fee`.
    pub fn transfer(
        inputs: Vec<String>,
        available: u64,
        to: &str,
        amount: u64,
        change_address: &str,
        fee: u64,
    ) -> Option<Self> {
        let change = available.checked_sub(amount)?.checked_sub(fee)?;
        let mut outputs = vec![TxOutput {
            address: to.to_string(),
            lovelace: amount,
        }];
        if change > 0 {
            outputs.push(TxOutput {
                address: change_address.to_string(),
                lovelace: change,
            });
        }
        Some(Self {
            inputs,
            outputs,
            fee,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Unsigned transaction body (`build-raw` output)
    Body,
    /// Transaction envelope (node-drafted commit tx or a signed tx)
    Tx,
}

/// Transaction file content produced by the external tool or a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxArtifact {
    pub kind: ArtifactKind,
    pub envelope: Value,
}

impl TxArtifact {
    pub fn body(envelope: Value) -> Self {
        Self {
            kind: ArtifactKind::Body,
            envelope,
        }
    }

    pub fn tx(envelope: Value) -> Self {
        Self {
            kind: ArtifactKind::Tx,
            envelope,
        }
    }
}
