use axum::{
    body::Bytes,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::api::SharedState;
use super::hub::ConnectionId;
use super::intake::{self, IncidentReport};
use super::models::{IncidentEvent, IncidentStatus};

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

/// Attribution recorded for incidents that arrive over the realtime
/// channel, where no bearer credential is available.
const SOCKET_SUBMITTER: &str = "station-dashboard";

// ── Realtime message types ───────────────────────────────────────────

/// Messages a dashboard client sends to the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    JoinStation { station_id: i64 },
    NewIncident(IncidentEvent),
    #[serde(rename_all = "camelCase")]
    SubscribeToAlarm { alarm_id: i64 },
    #[serde(rename_all = "camelCase")]
    UnsubscribeFromAlarm { alarm_id: i64 },
}

/// Messages the hub fans out to dashboard clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Global broadcast of a newly recorded incident.
    NewIncident(IncidentEvent),
    /// Station-scoped copy of an incident dispatched to one station.
    IncomingIncident(IncidentEvent),
    /// Confirmation sent back to the connection that originated a
    /// socket-side incident.
    #[serde(rename_all = "camelCase")]
    IncidentCreated {
        alarm_id: i64,
        caller_id: i64,
        status: IncidentStatus,
    },
}

// ── WebSocket handler ────────────────────────────────────────────────

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (sender, receiver) = socket.split();
    let (id, outbound) = state.registry.register();
    tracing::debug!(connection = %id, "Dashboard connected");

    run_socket_loop(sender, receiver, outbound, &state, id).await;

    state.registry.unregister(id);
    tracing::debug!(connection = %id, "Dashboard disconnected");
}

/// Core WebSocket loop with ping/pong keepalive.
///
/// Combines outbound fan-out forwarding, inbound client messages, and
/// periodic ping/pong health checking into a single select loop. If no
/// Pong arrives within [`PONG_TIMEOUT`] after a Ping is sent, the
/// connection is considered dead and the loop exits.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    state: &SharedState,
    id: ConnectionId,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // The first tick completes immediately; consume it so the first real
    // ping fires after PING_INTERVAL has elapsed.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            // ── Periodic ping ───────────────────────────────────────
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            // ── Hub fan-out forwarding ──────────────────────────────
            msg = outbound.recv() => {
                match msg {
                    Some(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }

            // ── Inbound client messages ─────────────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_payload(state, id, text.as_str()).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // Ignore Binary and Ping frames from clients
                    }
                    Some(Err(_)) => break,
                }
            }
        }
    }

    // Best-effort close frame
    let _ = sender.send(Message::Close(None)).await;
}

/// Parse and dispatch one inbound payload. A malformed payload is logged
/// and dropped; the connection stays up and no error event is emitted.
async fn handle_client_payload(state: &SharedState, id: ConnectionId, payload: &str) {
    let msg: ClientMessage = match serde_json::from_str(payload) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::warn!(connection = %id, error = %e, "Dropping malformed realtime payload");
            return;
        }
    };

    match msg {
        ClientMessage::JoinStation { station_id } => {
            state.registry.join_station(id, station_id);
        }
        ClientMessage::SubscribeToAlarm { alarm_id } => {
            state.registry.subscribe_incident(id, alarm_id);
        }
        ClientMessage::UnsubscribeFromAlarm { alarm_id } => {
            state.registry.unsubscribe_incident(id, alarm_id);
        }
        ClientMessage::NewIncident(event) => {
            handle_socket_incident(state, id, event).await;
        }
    }
}

/// A socket-originated incident runs the same record operation as the
/// HTTP path, then re-broadcasts. The broadcast is unconditional, so the
/// originator receives its own event back in addition to the
/// `incident-created` confirmation.
async fn handle_socket_incident(state: &SharedState, id: ConnectionId, event: IncidentEvent) {
    let report = IncidentReport::from_event(&event);
    let recorded = match intake::record_incident(&state.db, &report, SOCKET_SUBMITTER).await {
        Ok(recorded) => recorded,
        Err(e) => {
            tracing::warn!(connection = %id, error = %e, "Failed to record socket-originated incident");
            return;
        }
    };

    let out = recorded.event(&report);
    state.registry.broadcast(&ServerMessage::NewIncident(out.clone()));
    if let Some(station_id) = event.station_id {
        state
            .registry
            .route_to_station(station_id, &ServerMessage::IncomingIncident(out));
    }
    state.registry.send_to(
        id,
        &ServerMessage::IncidentCreated {
            alarm_id: recorded.incident.id,
            caller_id: recorded.caller.id,
            status: recorded.incident.status,
        },
    );
}

// ── Tests ────────────────────────────────────────────────────────────
