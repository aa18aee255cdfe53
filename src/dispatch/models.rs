use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Fallback map point used when an event carries no usable coordinates.
pub const FALLBACK_POINT: Coordinates = Coordinates {
    lat: 14.5995,
    lng: 120.9842,
};

// ── Alarm level ──────────────────────────────────────────────────────

/// Coarse escalation tier of an incident, stored as "Alarm N".
///
/// Human-entered tiers are normalized through [`AlarmLevel::normalize`],
/// which is intentionally lossy: named tiers like "Task Force Alpha" or
/// "General Alarm" collapse to the base tier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AlarmLevel {
    #[serde(rename = "Alarm 1")]
    One,
    #[serde(rename = "Alarm 2")]
    Two,
    #[serde(rename = "Alarm 3")]
    Three,
    #[serde(rename = "Alarm 4")]
    Four,
    #[serde(rename = "Alarm 5")]
    Five,
}

impl AlarmLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::One => "Alarm 1",
            Self::Two => "Alarm 2",
            Self::Three => "Alarm 3",
            Self::Four => "Alarm 4",
            Self::Five => "Alarm 5",
        }
    }

    /// Normalize a human-readable alarm level to a tier.
    ///
    /// Inputs containing "Alarm" have their ordinal suffix stripped
    /// ("2nd Alarm" → Alarm 2); anything else defaults to Alarm 1.
    pub fn normalize(raw: &str) -> Self {
        if !raw.contains("Alarm") {
            return Self::One;
        }
        match raw.chars().find(|c| c.is_ascii_digit()) {
            Some('2') => Self::Two,
            Some('3') => Self::Three,
            Some('4') => Self::Four,
            Some('5') => Self::Five,
            _ => Self::One,
        }
    }
}

impl FromStr for AlarmLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Alarm 1" => Ok(Self::One),
            "Alarm 2" => Ok(Self::Two),
            "Alarm 3" => Ok(Self::Three),
            "Alarm 4" => Ok(Self::Four),
            "Alarm 5" => Ok(Self::Five),
            _ => Err(format!("Invalid alarm level: {}", s)),
        }
    }
}

impl std::fmt::Display for AlarmLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Incident lifecycle status ────────────────────────────────────────

/// Lifecycle status of an incident. This core only ever writes
/// `PendingDispatch`; the later transitions belong to the dispatch desk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IncidentStatus {
    #[serde(rename = "Pending Dispatch")]
    PendingDispatch,
    #[serde(rename = "Dispatched")]
    Dispatched,
    #[serde(rename = "Resolved")]
    Resolved,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingDispatch => "Pending Dispatch",
            Self::Dispatched => "Dispatched",
            Self::Resolved => "Resolved",
        }
    }
}

impl FromStr for IncidentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending Dispatch" => Ok(Self::PendingDispatch),
            "Dispatched" => Ok(Self::Dispatched),
            "Resolved" => Ok(Self::Resolved),
            _ => Err(format!("Invalid incident status: {}", s)),
        }
    }
}

// ── Stored entities ──────────────────────────────────────────────────

/// The person who reported an incident, deduplicated by phone number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caller {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub role: String,
    pub created_at: String,
}

impl Caller {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// A reported fire/medical emergency record ("alarm").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: i64,
    pub caller_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub initial_level: AlarmLevel,
    pub current_level: AlarmLevel,
    pub status: IncidentStatus,
    pub created_at: String,
}

/// Append-only audit trail entry for an incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseLogEntry {
    pub id: i64,
    pub incident_id: i64,
    pub action_type: String,
    pub details: String,
    pub performed_by: String,
    pub created_at: String,
}

/// Read-back view for the incident-review page: the incident plus the
/// caller identity and the full response log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentDetail {
    pub incident: Incident,
    pub caller: Caller,
    pub logs: Vec<ResponseLogEntry>,
}

// ── Coordinate envelope ──────────────────────────────────────────────

/// Canonical map coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Wire-shape coordinates. Clients send either `{lat,lng}` or
/// `{latitude,longitude}`; both are accepted and each axis falls back to
/// [`FALLBACK_POINT`] independently when absent.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RawCoordinates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl RawCoordinates {
    pub fn normalize(self) -> Coordinates {
        Coordinates {
            lat: self.lat.or(self.latitude).unwrap_or(FALLBACK_POINT.lat),
            lng: self.lng.or(self.longitude).unwrap_or(FALLBACK_POINT.lng),
        }
    }
}

/// Normalize an optional wire envelope, defaulting to the fallback point.
pub fn normalize_coordinates(raw: Option<RawCoordinates>) -> Coordinates {
    raw.unwrap_or_default().normalize()
}

// ── Wire event ───────────────────────────────────────────────────────

/// The transient realtime payload. Exists only on the wire; receiving
/// clients correlate on `alarm_id` when the server has assigned one.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_id: Option<i64>,
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alarm_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<RawCoordinates>,
    /// Present when the originating dashboard wants the event routed to
    /// one station in addition to the global broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub station_id: Option<i64>,
}
