use crate::infrastructure::error::AppError;
use crate::infrastructure::shared_state::SharedStateStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};
use uuid::Uuid;

/// Well-known shared-state key the fallback transport writes events to.
pub const FALLBACK_EVENT_KEY: &str = "cross_tab:last_event";
const FALLBACK_POLL_INTERVAL: Duration = Duration::from_millis(250);
const BUS_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossTabEventType {
    LeaderClaim,
    EntityChanged,
}

/// Event fanned out to sibling tabs. Delivery is best effort and never
/// persisted; a tab that is not listening simply misses it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossTabEvent {
    #[serde(rename = "type")]
    pub event_type: CrossTabEventType,
    pub event_id: String,
    pub source_tab_id: String,
    pub ts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
}

impl CrossTabEvent {
    pub fn leader_claim(source_tab_id: &str, at: DateTime<Utc>) -> Self {
        Self {
            event_type: CrossTabEventType::LeaderClaim,
            event_id: Uuid::new_v4().to_string(),
            source_tab_id: source_tab_id.to_string(),
            ts: at.timestamp_millis(),
            route_hint: None,
            entity_type: None,
            entity_id: None,
            operation: None,
        }
    }

    pub fn entity_changed(
        source_tab_id: &str,
        at: DateTime<Utc>,
        entity_type: &str,
        entity_id: &str,
        operation: &str,
        route_hint: Option<&str>,
    ) -> Self {
        Self {
            event_type: CrossTabEventType::EntityChanged,
            event_id: Uuid::new_v4().to_string(),
            source_tab_id: source_tab_id.to_string(),
            ts: at.timestamp_millis(),
            route_hint: route_hint.map(String::from),
            entity_type: Some(entity_type.to_string()),
            entity_id: Some(entity_id.to_string()),
            operation: Some(operation.to_string()),
        }
    }
}

pub trait TabTransport: Send + Sync {
    fn publish(&self, event: &CrossTabEvent) -> Result<(), AppError>;
    fn subscribe(&self) -> broadcast::Receiver<CrossTabEvent>;
}

/// Primary transport: an in-process broadcast channel.
pub struct BroadcastTransport {
    sender: broadcast::Sender<CrossTabEvent>,
}

impl Default for BroadcastTransport {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }
}

impl BroadcastTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TabTransport for BroadcastTransport {
    fn publish(&self, event: &CrossTabEvent) -> Result<(), AppError> {
        // No subscribers is not an error for a best-effort channel.
        let _ = self.sender.send(event.clone());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<CrossTabEvent> {
        self.sender.subscribe()
    }
}

/// Fallback transport for environments without a broadcast primitive:
/// the event is written as JSON to a well-known shared-state key and
/// sibling pollers pick it up. Only the latest event is visible at the
/// key, so the poller dedups on event id rather than deleting the value.
pub struct SharedStoreTransport {
    store: Arc<dyn SharedStateStore>,
    key: String,
    sender: broadcast::Sender<CrossTabEvent>,
    last_seen: Arc<Mutex<Option<String>>>,
    poll_interval: Duration,
    polling: AtomicBool,
}

impl SharedStoreTransport {
    pub fn new(store: Arc<dyn SharedStateStore>) -> Self {
        Self::at_key(store, FALLBACK_EVENT_KEY)
    }

    pub fn at_key(store: Arc<dyn SharedStateStore>, key: &str) -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        // An event already present at startup predates this tab.
        let preexisting = store
            .get(key)
            .ok()
            .flatten()
            .and_then(|raw| serde_json::from_str::<CrossTabEvent>(&raw).ok())
            .map(|event| event.event_id);
        Self {
            store,
            key: key.to_string(),
            sender,
            last_seen: Arc::new(Mutex::new(preexisting)),
            poll_interval: FALLBACK_POLL_INTERVAL,
            polling: AtomicBool::new(false),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn ensure_polling(&self) {
        if self.polling.swap(true, Ordering::SeqCst) {
            return;
        }
        let store = Arc::clone(&self.store);
        let key = self.key.clone();
        let sender = self.sender.clone();
        let last_seen = Arc::clone(&self.last_seen);
        let interval = self.poll_interval;
        tokio::spawn(async move {
            loop {
                sleep(interval).await;
                forward_new_event(&*store, &key, &sender, &last_seen);
            }
        });
    }
}

fn forward_new_event(
    store: &dyn SharedStateStore,
    key: &str,
    sender: &broadcast::Sender<CrossTabEvent>,
    last_seen: &Mutex<Option<String>>,
) {
    let Ok(Some(raw)) = store.get(key) else {
        return;
    };
    let Ok(event) = serde_json::from_str::<CrossTabEvent>(&raw) else {
        return;
    };
    let mut seen = last_seen.lock().unwrap_or_else(PoisonError::into_inner);
    if seen.as_deref() == Some(event.event_id.as_str()) {
        return;
    }
    *seen = Some(event.event_id.clone());
    let _ = sender.send(event);
}

impl TabTransport for SharedStoreTransport {
    fn publish(&self, event: &CrossTabEvent) -> Result<(), AppError> {
        let raw = serde_json::to_string(event)?;
        self.store.put(&self.key, &raw, Utc::now())?;
        // The publisher has already seen its own event.
        let mut seen = self
            .last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *seen = Some(event.event_id.clone());
        let _ = self.sender.send(event.clone());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<CrossTabEvent> {
        self.ensure_polling();
        self.sender.subscribe()
    }
}

/// Per-tab endpoint on the cross-tab channel. Each bus carries the tab's
/// identity; subscriptions filter out self-originated events.
pub struct TabBus {
    tab_id: String,
    transport: Arc<dyn TabTransport>,
}

impl TabBus {
    pub fn new(transport: Arc<dyn TabTransport>) -> Self {
        Self {
            tab_id: Uuid::new_v4().to_string(),
            transport,
        }
    }

    pub fn with_tab_id(mut self, tab_id: impl Into<String>) -> Self {
        self.tab_id = tab_id.into();
        self
    }

    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }

    pub fn publish(&self, event: CrossTabEvent) -> Result<(), AppError> {
        self.transport.publish(&event)
    }

    pub fn subscribe(&self) -> CrossTabReceiver {
        CrossTabReceiver {
            receiver: self.transport.subscribe(),
            own_tab_id: self.tab_id.clone(),
        }
    }
}

pub struct CrossTabReceiver {
    receiver: broadcast::Receiver<CrossTabEvent>,
    own_tab_id: String,
}

impl CrossTabReceiver {
    /// Next event from a sibling tab; `None` once the channel closes.
    pub async fn recv(&mut self) -> Option<CrossTabEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.source_tab_id == self.own_tab_id => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::shared_state::InMemorySharedStateStore;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        value
            .parse::<DateTime<Utc>>()
            .expect("valid RFC3339 timestamp")
    }

    #[test]
    fn events_serialize_with_wire_field_names() {
        let event = CrossTabEvent::entity_changed(
            "tab-a",
            fixed_time("2026-02-16T09:00:00Z"),
            "sessions",
            "s-1",
            "update",
            Some("/focus"),
        );
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], "entity_changed");
        assert_eq!(json["sourceTabId"], "tab-a");
        assert_eq!(json["routeHint"], "/focus");
        assert_eq!(json["entityType"], "sessions");
        assert_eq!(json["operation"], "update");

        let back: CrossTabEvent = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, event);
    }

    #[tokio::test]
    async fn tabs_see_sibling_events_but_never_their_own() {
        let transport = Arc::new(BroadcastTransport::new());
        let tab_a = TabBus::new(Arc::clone(&transport) as Arc<dyn TabTransport>)
            .with_tab_id("tab-a");
        let tab_b = TabBus::new(transport as Arc<dyn TabTransport>).with_tab_id("tab-b");

        let mut a_events = tab_a.subscribe();
        let mut b_events = tab_b.subscribe();

        tab_a
            .publish(CrossTabEvent::leader_claim(
                "tab-a",
                fixed_time("2026-02-16T09:00:00Z"),
            ))
            .expect("publish from a");
        tab_b
            .publish(CrossTabEvent::leader_claim(
                "tab-b",
                fixed_time("2026-02-16T09:00:01Z"),
            ))
            .expect("publish from b");

        // Tab A skips its own event and lands on tab B's claim.
        let seen_by_a = a_events.recv().await.expect("event for a");
        assert_eq!(seen_by_a.source_tab_id, "tab-b");

        let seen_by_b = b_events.recv().await.expect("event for b");
        assert_eq!(seen_by_b.source_tab_id, "tab-a");
    }

    #[tokio::test(start_paused = true)]
    async fn shared_store_fallback_delivers_each_event_once() {
        // Each tab runs its own transport over the common store, so the
        // listener only learns about events through polling.
        let store: Arc<dyn SharedStateStore> = Arc::new(InMemorySharedStateStore::new());
        let publisher = TabBus::new(Arc::new(SharedStoreTransport::new(Arc::clone(&store))))
            .with_tab_id("tab-a");
        let listener = TabBus::new(Arc::new(SharedStoreTransport::new(Arc::clone(&store))))
            .with_tab_id("tab-b");

        let mut events = listener.subscribe();
        publisher
            .publish(CrossTabEvent::leader_claim(
                "tab-a",
                fixed_time("2026-02-16T09:00:00Z"),
            ))
            .expect("publish");

        let first = events.recv().await.expect("delivery");
        assert_eq!(first.event_type, CrossTabEventType::LeaderClaim);
        assert_eq!(first.source_tab_id, "tab-a");

        // The poller must not re-deliver the same stored event; the next
        // distinct event comes through as the next receive.
        publisher
            .publish(CrossTabEvent::leader_claim(
                "tab-a",
                fixed_time("2026-02-16T09:00:05Z"),
            ))
            .expect("second publish");
        let second = events.recv().await.expect("second delivery");
        assert_ne!(second.event_id, first.event_id);
    }
}
