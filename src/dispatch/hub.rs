//! Realtime broadcast hub.
//!
//! An explicit registry of live connections replaces ambient global socket
//! state: each entry owns the outbound sender for one WebSocket plus its
//! station and per-incident group membership. Delivery is best-effort and
//! in-memory; a disconnected client simply misses events.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::ws::ServerMessage;

pub type ConnectionId = Uuid;

struct ConnectionEntry {
    tx: mpsc::UnboundedSender<String>,
    station: Option<i64>,
    incidents: HashSet<i64>,
}

/// Process-wide connection registry, shared behind `Arc` in `AppState`.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: Mutex<HashMap<ConnectionId, ConnectionEntry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection and hand back its id plus the outbound receiver
    /// the socket loop drains.
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        if let Ok(mut map) = self.inner.lock() {
            map.insert(
                id,
                ConnectionEntry {
                    tx,
                    station: None,
                    incidents: HashSet::new(),
                },
            );
        }
        (id, rx)
    }

    /// Remove a connection. Terminal; the id is never reused.
    pub fn unregister(&self, id: ConnectionId) {
        if let Ok(mut map) = self.inner.lock() {
            map.remove(&id);
        }
    }

    /// Put a connection into a station group so station-scoped events can
    /// target it via [`route_to_station`](Self::route_to_station).
    pub fn join_station(&self, id: ConnectionId, station_id: i64) {
        if let Ok(mut map) = self.inner.lock() {
            if let Some(entry) = map.get_mut(&id) {
                entry.station = Some(station_id);
            }
        }
    }

    /// Join a per-incident group. Membership only; nothing is routed to
    /// these groups yet.
    pub fn subscribe_incident(&self, id: ConnectionId, alarm_id: i64) {
        if let Ok(mut map) = self.inner.lock() {
            if let Some(entry) = map.get_mut(&id) {
                entry.incidents.insert(alarm_id);
            }
        }
    }

    pub fn unsubscribe_incident(&self, id: ConnectionId, alarm_id: i64) {
        if let Ok(mut map) = self.inner.lock() {
            if let Some(entry) = map.get_mut(&id) {
                entry.incidents.remove(&alarm_id);
            }
        }
    }

    pub fn is_subscribed(&self, id: ConnectionId, alarm_id: i64) -> bool {
        self.inner
            .lock()
            .map(|map| {
                map.get(&id)
                    .map(|e| e.incidents.contains(&alarm_id))
                    .unwrap_or(false)
            })
            .unwrap_or(false)
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or(0)
    }

    /// Deliver a message to every connected client, the originator
    /// included. The unconditional echo matches the existing dashboard
    /// contract; receivers perform no deduplication.
    pub fn broadcast(&self, msg: &ServerMessage) {
        let Some(json) = encode(msg) else { return };
        if let Ok(map) = self.inner.lock() {
            for entry in map.values() {
                let _ = entry.tx.send(json.clone());
            }
        }
    }

    /// Deliver a message only to connections that joined the given
    /// station group.
    pub fn route_to_station(&self, station_id: i64, msg: &ServerMessage) {
        let Some(json) = encode(msg) else { return };
        if let Ok(map) = self.inner.lock() {
            for entry in map.values() {
                if entry.station == Some(station_id) {
                    let _ = entry.tx.send(json.clone());
                }
            }
        }
    }

    /// Deliver a message to a single connection.
    pub fn send_to(&self, id: ConnectionId, msg: &ServerMessage) {
        let Some(json) = encode(msg) else { return };
        if let Ok(map) = self.inner.lock() {
            if let Some(entry) = map.get(&id) {
                let _ = entry.tx.send(json);
            }
        }
    }
}

/// Serialize a ServerMessage, logging instead of propagating on failure.
/// Returns silently even if no clients are connected.
fn encode(msg: &ServerMessage) -> Option<String> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!("Failed to serialize server message: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::models::IncidentEvent;

    fn sample_event() -> IncidentEvent {
        serde_json::from_str(r#"{"phoneNumber":"0917 555 0101","alarmLevel":"Alarm 1"}"#).unwrap()
    }

    #[tokio::test]
    async fn broadcast_reaches_every_client_including_originator() {
        let registry = ConnectionRegistry::new();
        let (origin, mut origin_rx) = registry.register();
        let (_other, mut other_rx) = registry.register();
        assert_eq!(registry.connection_count(), 2);

        // Pretend `origin` published; delivery is unconditional.
        let _ = origin;
        registry.broadcast(&ServerMessage::NewIncident(sample_event()));

        let origin_msg = origin_rx.recv().await.unwrap();
        let other_msg = other_rx.recv().await.unwrap();
        assert!(origin_msg.contains("new-incident"));
        assert_eq!(origin_msg, other_msg);
    }

    #[tokio::test]
    async fn route_to_station_only_reaches_joined_connections() {
        let registry = ConnectionRegistry::new();
        let (member, mut member_rx) = registry.register();
        let (_outsider, mut outsider_rx) = registry.register();
        registry.join_station(member, 3);

        registry.route_to_station(3, &ServerMessage::IncomingIncident(sample_event()));

        let msg = member_rx.recv().await.unwrap();
        assert!(msg.contains("incoming-incident"));
        assert!(outsider_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_targets_a_single_connection() {
        let registry = ConnectionRegistry::new();
        let (first, mut first_rx) = registry.register();
        let (_second, mut second_rx) = registry.register();

        registry.send_to(
            first,
            &ServerMessage::IncidentCreated {
                alarm_id: 1,
                caller_id: 2,
                status: crate::dispatch::models::IncidentStatus::PendingDispatch,
            },
        );

        assert!(first_rx.recv().await.unwrap().contains("incident-created"));
        assert!(second_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregistered_connection_receives_nothing() {
        let registry = ConnectionRegistry::new();
        let (gone, mut gone_rx) = registry.register();
        let (_stay, mut stay_rx) = registry.register();
        registry.unregister(gone);
        assert_eq!(registry.connection_count(), 1);

        registry.broadcast(&ServerMessage::NewIncident(sample_event()));
        assert!(stay_rx.recv().await.is_some());
        assert!(gone_rx.recv().await.is_none());
    }

    #[test]
    fn incident_group_membership_tracks_subscribe_and_unsubscribe() {
        let registry = ConnectionRegistry::new();
        let (id, _rx) = registry.register();

        registry.subscribe_incident(id, 9);
        assert!(registry.is_subscribed(id, 9));
        assert!(!registry.is_subscribed(id, 10));

        registry.unsubscribe_incident(id, 9);
        assert!(!registry.is_subscribed(id, 9));
    }

    #[test]
    fn closed_receiver_does_not_break_broadcast() {
        let registry = ConnectionRegistry::new();
        let (_id, rx) = registry.register();
        drop(rx);
        // Best-effort delivery: a dead client is skipped silently.
        registry.broadcast(&ServerMessage::NewIncident(sample_event()));
    }
}
