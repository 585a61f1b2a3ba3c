use crate::application::tab_bus::{CrossTabEvent, CrossTabEventType, TabBus};
use crate::application::NowProvider;
use crate::infrastructure::error::AppError;
use crate::infrastructure::shared_state::SharedStateStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::{sleep, Duration};

/// Well-known shared-state key holding the current leader record.
pub const LEADER_KEY: &str = "leader:focus";
const STALE_AFTER_MS: i64 = 12_000;
const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(4_000);
const CLAIM_POLL_INTERVAL: Duration = Duration::from_millis(2_000);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderRecord {
    pub tab_id: String,
    pub timestamp: i64,
    pub visibility_state: String,
}

#[derive(Debug, Clone, Copy)]
struct TabState {
    visible: bool,
    focused: bool,
    is_leader: bool,
}

/// Elects one tab to run timer-tick side effects. The record at the
/// shared key is the source of truth; a focused, visible tab always wins
/// a claim, pre-empting a stale or hidden leader. Only the transition to
/// leader (not heartbeat renewal) announces itself on the bus.
pub struct LeaderElector {
    store: Arc<dyn SharedStateStore>,
    bus: Arc<TabBus>,
    key: String,
    tab_id: String,
    now_provider: NowProvider,
    state: Mutex<TabState>,
}

impl LeaderElector {
    pub fn new(store: Arc<dyn SharedStateStore>, bus: Arc<TabBus>) -> Self {
        let tab_id = bus.tab_id().to_string();
        Self {
            store,
            bus,
            key: LEADER_KEY.to_string(),
            tab_id,
            now_provider: Arc::new(Utc::now),
            state: Mutex::new(TabState {
                visible: true,
                focused: false,
                is_leader: false,
            }),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn at_key(mut self, key: &str) -> Self {
        self.key = key.to_string();
        self
    }

    pub fn is_leader(&self) -> bool {
        self.snapshot().is_leader
    }

    pub fn set_visibility(&self, visible: bool) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.visible = visible;
    }

    pub fn set_focused(&self, focused: bool) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.focused = focused;
    }

    /// Try to take (or keep) leadership. Claimable when no record exists,
    /// the record is stale or already ours, or this tab is visible and
    /// focused. Returns whether this tab is the leader afterwards.
    pub fn attempt_claim(&self) -> Result<bool, AppError> {
        let now = (self.now_provider)();
        let record = self.read_record()?;
        let snapshot = self.snapshot();

        let can_claim = match record {
            None => true,
            Some(ref existing) if existing.tab_id == self.tab_id => true,
            Some(ref existing)
                if now.timestamp_millis() - existing.timestamp > STALE_AFTER_MS =>
            {
                true
            }
            Some(_) => snapshot.visible && snapshot.focused,
        };

        if !can_claim {
            self.set_leader(false);
            return Ok(false);
        }

        self.write_record(now)?;
        self.set_leader(true);
        if !snapshot.is_leader {
            self.bus
                .publish(CrossTabEvent::leader_claim(&self.tab_id, now))?;
        }
        Ok(true)
    }

    /// Renew the claim while still the recorded owner; a record that
    /// meanwhile belongs to another tab demotes this one instead.
    pub fn heartbeat(&self) -> Result<(), AppError> {
        if !self.is_leader() {
            return Ok(());
        }
        let now = (self.now_provider)();
        match self.read_record()? {
            Some(record) if record.tab_id != self.tab_id => {
                self.set_leader(false);
                Ok(())
            }
            _ => self.write_record(now),
        }
    }

    /// Delete the record when this tab still owns it.
    pub fn release(&self) -> Result<(), AppError> {
        if let Some(record) = self.read_record()? {
            if record.tab_id == self.tab_id {
                self.store.remove(&self.key)?;
            }
        }
        self.set_leader(false);
        Ok(())
    }

    /// Drive the election: heartbeat while leading, poll for a claim
    /// otherwise, and re-evaluate whenever a sibling announces a claim.
    pub async fn run(self: Arc<Self>) {
        let mut events = self.bus.subscribe();
        loop {
            let interval = if self.is_leader() {
                HEARTBEAT_INTERVAL
            } else {
                CLAIM_POLL_INTERVAL
            };
            tokio::select! {
                _ = sleep(interval) => {
                    let outcome = if self.is_leader() {
                        self.heartbeat()
                    } else {
                        self.attempt_claim().map(|_| ())
                    };
                    if let Err(error) = outcome {
                        tracing::warn!(%error, "leader election step failed");
                    }
                }
                event = events.recv() => {
                    match event {
                        Some(event)
                            if event.event_type == CrossTabEventType::LeaderClaim =>
                        {
                            if let Err(error) = self.attempt_claim() {
                                tracing::warn!(%error, "leader re-evaluation failed");
                            }
                        }
                        Some(_) => {}
                        None => return,
                    }
                }
            }
        }
    }

    fn snapshot(&self) -> TabState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_leader(&self, is_leader: bool) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.is_leader = is_leader;
    }

    fn read_record(&self) -> Result<Option<LeaderRecord>, AppError> {
        let Some(raw) = self.store.get(&self.key)? else {
            return Ok(None);
        };
        // An unreadable record is treated as absent so a tab can recover
        // the key.
        Ok(serde_json::from_str(&raw).ok())
    }

    fn write_record(&self, now: DateTime<Utc>) -> Result<(), AppError> {
        let snapshot = self.snapshot();
        let record = LeaderRecord {
            tab_id: self.tab_id.clone(),
            timestamp: now.timestamp_millis(),
            visibility_state: if snapshot.visible { "visible" } else { "hidden" }.to_string(),
        };
        let raw = serde_json::to_string(&record)?;
        self.store.put(&self.key, &raw, now)
    }
}
