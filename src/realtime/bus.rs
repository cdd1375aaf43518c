use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::auth::repo_types::Role;
use crate::products::repo_types::Product;

/// Events pushed to every connected realtime client.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", content = "data")]
pub enum MarketEvent {
    #[serde(rename = "newUserRegistered", rename_all = "camelCase")]
    UserRegistered { full_name: String, role: Role },
    #[serde(rename = "newProductUploaded")]
    ProductCreated(Product),
}

impl MarketEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::UserRegistered { .. } => "newUserRegistered",
            Self::ProductCreated(_) => "newProductUploaded",
        }
    }
}

/// In-process fan-out. Every subscriber gets its own bounded queue, so a slow
/// listener only loses its own backlog (it observes `Lagged`) and never blocks
/// publishers or other listeners.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MarketEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Fire-and-forget. Returns how many listeners the event was queued for.
    pub fn publish(&self, event: MarketEvent) -> usize {
        let topic = event.topic();
        match self.tx.send(event) {
            Ok(n) => {
                info!(topic, listeners = n, "event published");
                n
            }
            Err(_) => {
                debug!(topic, "no listeners for event");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::{RecvError, TryRecvError};

    fn registered(name: &str) -> MarketEvent {
        MarketEvent::UserRegistered {
            full_name: name.into(),
            role: Role::new("farmer"),
        }
    }

    #[test]
    fn publish_without_listeners_is_a_noop() {
        let bus = EventBus::new(8);
        assert_eq!(bus.publish(registered("a")), 0);
    }

    #[tokio::test]
    async fn every_listener_receives_every_event_in_order() {
        let bus = EventBus::new(16);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        assert_eq!(bus.publish(registered("a")), 2);
        assert_eq!(bus.publish(registered("b")), 2);

        for rx in [&mut first, &mut second] {
            assert_eq!(rx.recv().await.unwrap(), registered("a"));
            assert_eq!(rx.recv().await.unwrap(), registered("b"));
        }
    }

    #[tokio::test]
    async fn late_subscriber_gets_no_replay() {
        let bus = EventBus::new(8);
        let _early = bus.subscribe();
        bus.publish(registered("before"));
        let mut late = bus.subscribe();
        assert!(matches!(late.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn slow_listener_does_not_stall_others() {
        let bus = EventBus::new(2);
        let mut slow = bus.subscribe();
        let mut fast = bus.subscribe();

        for i in 0..5 {
            bus.publish(registered(&format!("u{i}")));
            assert_eq!(fast.recv().await.unwrap(), registered(&format!("u{i}")));
        }

        assert!(matches!(slow.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(slow.recv().await.unwrap(), registered("u3"));
        assert_eq!(slow.recv().await.unwrap(), registered("u4"));
    }

    #[test]
    fn dropped_listener_is_forgotten() {
        let bus = EventBus::new(4);
        let rx = bus.subscribe();
        assert_eq!(bus.listener_count(), 1);
        drop(rx);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn wire_format_uses_client_event_names() {
        let json = serde_json::to_value(registered("Mwila Banda")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "event": "newUserRegistered",
                "data": { "fullName": "Mwila Banda", "role": "farmer" }
            })
        );
    }
}
