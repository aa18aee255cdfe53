//! Incident intake: the single shared "record incident" operation.
//!
//! Both the HTTP endpoint and the realtime channel land here, so the
//! caller-resolve + incident-insert + log sequence exists exactly once.

use crate::errors::DispatchError;

use super::db::DbHandle;
use super::models::{AlarmLevel, Caller, Incident, IncidentEvent, IncidentStatus, RawCoordinates};

/// A parsed incident report, before validation. Every field the reporter
/// may omit is optional; required-field checks happen in [`validate`].
#[derive(Debug, Clone, Default)]
pub struct IncidentReport {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub location: Option<String>,
    pub incident_type: Option<String>,
    pub alarm_level: Option<String>,
    pub narrative: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl IncidentReport {
    /// Build a report from a realtime event envelope. Coordinates come in
    /// either wire shape; only explicitly present axes survive, so missing
    /// ones still fail validation rather than silently defaulting.
    pub fn from_event(event: &IncidentEvent) -> Self {
        let coords = event.coordinates.unwrap_or_default();
        Self {
            first_name: event.first_name.clone(),
            last_name: event.last_name.clone(),
            phone_number: Some(event.phone_number.clone()),
            location: event.location.clone(),
            incident_type: event.incident_type.clone(),
            alarm_level: event.alarm_level.clone(),
            narrative: event.narrative.clone(),
            latitude: coords.lat.or(coords.latitude),
            longitude: coords.lng.or(coords.longitude),
        }
    }
}

/// The rows produced by a successful intake.
#[derive(Debug, Clone)]
pub struct RecordedIncident {
    pub incident: Incident,
    pub caller: Caller,
}

impl RecordedIncident {
    /// Build the broadcast envelope for this recording, carrying the
    /// free-text fields of the original report through unchanged.
    pub fn event(&self, report: &IncidentReport) -> IncidentEvent {
        IncidentEvent {
            alarm_id: Some(self.incident.id),
            phone_number: self.caller.phone_number.clone(),
            first_name: Some(self.caller.first_name.clone()),
            last_name: Some(self.caller.last_name.clone()),
            incident_type: report.incident_type.clone(),
            alarm_level: Some(self.incident.current_level.as_str().to_string()),
            location: report.location.clone(),
            narrative: report.narrative.clone(),
            coordinates: Some(RawCoordinates {
                lat: Some(self.incident.latitude),
                lng: Some(self.incident.longitude),
                ..Default::default()
            }),
            station_id: None,
        }
    }
}

/// Check the required fields: phone number, coordinates, alarm level.
/// A present-but-blank string counts as missing.
pub fn validate(report: &IncidentReport) -> Result<(), DispatchError> {
    let blank = |field: &Option<String>| field.as_deref().map(str::trim).unwrap_or("").is_empty();
    if blank(&report.phone_number) {
        return Err(DispatchError::MissingField("phoneNumber"));
    }
    if report.latitude.is_none() {
        return Err(DispatchError::MissingField("latitude"));
    }
    if report.longitude.is_none() {
        return Err(DispatchError::MissingField("longitude"));
    }
    if blank(&report.alarm_level) {
        return Err(DispatchError::MissingField("alarmLevel"));
    }
    Ok(())
}

/// Split a combined display name into (first, last): first whitespace
/// token becomes the first name, the second token the last name, and
/// everything after is discarded. Absent tokens default to
/// "Unknown" / "Caller".
pub fn split_display_name(name: &str) -> (String, String) {
    let mut tokens = name.split_whitespace();
    let first = tokens.next().unwrap_or("Unknown").to_string();
    let last = tokens.next().unwrap_or("Caller").to_string();
    (first, last)
}

/// Record a validated incident: resolve or create the caller, insert the
/// incident with status "Pending Dispatch", and append the initial log
/// entry attributed to `performed_by`, in that order. A failure at any
/// step aborts without touching later steps; there is no compensation for
/// earlier writes.
///
/// Caller names are joined into one display string and re-split into the
/// first two whitespace tokens, so a multi-token last name is truncated:
/// a report with last name "Dela Cruz" is stored as "Dela".
pub async fn record_incident(
    db: &DbHandle,
    report: &IncidentReport,
    performed_by: &str,
) -> Result<RecordedIncident, DispatchError> {
    validate(report)?;

    let phone = report.phone_number.clone().unwrap_or_default();
    let display = format!(
        "{} {}",
        report.first_name.as_deref().unwrap_or(""),
        report.last_name.as_deref().unwrap_or(""),
    );
    let (first_name, last_name) = split_display_name(&display);
    let level = AlarmLevel::normalize(report.alarm_level.as_deref().unwrap_or(""));
    let latitude = report.latitude.unwrap_or_default();
    let longitude = report.longitude.unwrap_or_default();
    let submitter = performed_by.to_string();

    db.call(move |db| {
        let caller = match db.find_caller_by_phone(&phone)? {
            Some(caller) => caller,
            None => db.create_caller(&first_name, &last_name, &phone)?,
        };
        let incident = db.create_incident(
            caller.id,
            latitude,
            longitude,
            &level,
            &IncidentStatus::PendingDispatch,
        )?;
        db.append_log(
            incident.id,
            "Initial Dispatch",
            &format!(
                "New {} incident reported by {} ({})",
                level,
                caller.display_name(),
                caller.phone_number,
            ),
            &submitter,
        )?;
        Ok(RecordedIncident { incident, caller })
    })
    .await
    .map_err(DispatchError::persistence)
}
