use chrono::{DateTime, Duration, TimeZone, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{EscrowError, Result};

pub const API_KEY_PREFIX: &str = "escrw_";

/// Time source for session expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(millis)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub api_key: String,
    pub expires_at: DateTime<Utc>,
    pub escrow_l1_address: String,
    pub created_at: DateTime<Utc>,
}

/// In-memory API key store with expiry
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            clock,
        }
    }

    /// Issue a new key bound to `escrow_l1_address`; expired keys are purged first
    pub fn create(&self, escrow_l1_address: impl Into<String>) -> Session {
        let now = self.clock.now();
        self.purge_expired(now);

        let session = Session {
            api_key: format!("{}{}", API_KEY_PREFIX, Uuid::new_v4().simple()),
            expires_at: now + self.ttl,
            escrow_l1_address: escrow_l1_address.into(),
            created_at: now,
        };
        self.sessions
            .insert(session.api_key.clone(), session.clone());
        info!(expires_at = %session.expires_at, "API key issued");
        session
    }

    /// Look up a live session; expired ones are removed and rejected
    pub fn validate(&self, api_key: &str) -> Result<Session> {
        let now = self.clock.now();
        let session = self
            .sessions
            .get(api_key)
            .map(|s| s.clone())
            .ok_or_else(|| EscrowError::Auth("Invalid or expired API Key".to_string()))?;

        if session.expires_at <= now {
            self.sessions.remove(api_key);
            debug!("Expired API key rejected");
            return Err(EscrowError::Auth("Invalid or expired API Key".to_string()));
        }
        Ok(session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn purge_expired(&self, now: DateTime<Utc>) {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.expires_at > now);
        let purged = before - self.sessions.len();
        if purged > 0 {
            debug!(purged, "Purged expired API keys");
        }
    }
}
