//! Dashboard-side consumer for realtime incident traffic.
//!
//! Turns `new-incident` / `incoming-incident` frames into call-board rows
//! and review-form prefills. Every delivered frame becomes a row; the
//! consumer does not deduplicate, so an operator sees the echo of their
//! own submission alongside anything relayed to their station.

use super::models::{Coordinates, IncidentEvent, normalize_coordinates};
use super::ws::ServerMessage;

/// Sink for operator-facing alerts raised when a call lands on the board.
/// The production dashboard plays an audio cue and flashes the row; tests
/// swap in a recording stub.
pub trait Notifier: Send + Sync {
    fn notify(&self, call: &IncomingCall);
}

/// A no-op notifier for headless deployments.
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _call: &IncomingCall) {}
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomingCall {
    pub alarm_id: Option<i64>,
    pub caller_name: String,
    pub phone_number: String,
    pub incident_type: String,
    pub alarm_level: String,
    pub location: String,
    pub narrative: String,
    pub coordinates: Coordinates,
}

impl IncomingCall {
    fn from_event(event: &IncidentEvent) -> Self {
        let first = event.first_name.as_deref().unwrap_or("Unknown");
        let last = event.last_name.as_deref().unwrap_or("Caller");
        IncomingCall {
            alarm_id: event.alarm_id,
            caller_name: format!("{} {}", first, last),
            phone_number: event.phone_number.clone(),
            incident_type: event.incident_type.clone().unwrap_or_default(),
            alarm_level: event.alarm_level.clone().unwrap_or_default(),
            location: event.location.clone().unwrap_or_default(),
            narrative: event.narrative.clone().unwrap_or_default(),
            coordinates: normalize_coordinates(event.coordinates),
        }
    }
}

/// Prefill handed to the incident review form when an operator opens a
/// pending call. Consuming a call removes it from the board.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewFormPrefill {
    pub caller_name: String,
    pub phone_number: String,
    pub incident_type: String,
    pub alarm_level: String,
    pub location: String,
    pub narrative: String,
    pub coordinates: Coordinates,
}

impl From<IncomingCall> for ReviewFormPrefill {
    fn from(call: IncomingCall) -> Self {
        ReviewFormPrefill {
            caller_name: call.caller_name,
            phone_number: call.phone_number,
            incident_type: call.incident_type,
            alarm_level: call.alarm_level,
            location: call.location,
            narrative: call.narrative,
            coordinates: call.coordinates,
        }
    }
}

/// The pending-call board backing the dashboard's incoming queue.
pub struct CallBoard {
    notifier: Box<dyn Notifier>,
    pending: Vec<IncomingCall>,
}

impl CallBoard {
    pub fn new(notifier: Box<dyn Notifier>) -> Self {
        CallBoard {
            notifier,
            pending: Vec::new(),
        }
    }

    /// Feed one server frame into the board. Broadcast and station-routed
    /// incident frames both land as rows; acknowledgments and unknown
    /// frames are ignored.
    pub fn ingest(&mut self, message: &ServerMessage) {
        let event = match message {
            ServerMessage::NewIncident(event) => event,
            ServerMessage::IncomingIncident(event) => event,
            ServerMessage::IncidentCreated { .. } => return,
        };
        let call = IncomingCall::from_event(event);
        self.notifier.notify(&call);
        self.pending.push(call);
    }

    pub fn pending(&self) -> &[IncomingCall] {
        &self.pending
    }

    /// Pop a call off the board and turn it into a review-form prefill.
    pub fn open_call(&mut self, index: usize) -> Option<ReviewFormPrefill> {
        if index >= self.pending.len() {
            return None;
        }
        Some(self.pending.remove(index).into())
    }
}
