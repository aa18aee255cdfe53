use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};

use crate::errors::DispatchError;

use super::db::DbHandle;
use super::hub::ConnectionRegistry;
use super::intake::{self, IncidentReport};
use super::models::{AlarmLevel, Coordinates, IncidentStatus};
use super::ws::ServerMessage;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub registry: Arc<ConnectionRegistry>,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

/// Every field is optional at the deserialization boundary; required-field
/// checks run in intake so a missing field yields a 400 with a message
/// naming it, not a generic body-rejection error.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIncidentRequest {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub incident_type: Option<String>,
    #[serde(default)]
    pub alarm_level: Option<String>,
    #[serde(default)]
    pub narrative: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAlarmLevelRequest {
    #[serde(default)]
    pub new_alarm_level: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIncidentResponse {
    pub message: String,
    pub alarm_id: i64,
    pub caller_id: i64,
    pub status: IncidentStatus,
    pub coordinates: Coordinates,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAlarmLevelResponse {
    pub message: String,
    pub alarm_id: i64,
    pub new_alarm_level: AlarmLevel,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match &err {
            DispatchError::MissingField(_) => ApiError::BadRequest(err.to_string()),
            DispatchError::IncidentNotFound { .. } => ApiError::NotFound(err.to_string()),
            DispatchError::Persistence(_) => ApiError::Internal(err.to_string()),
        }
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/create-incident", post(create_incident))
        .route("/incidents", get(list_incidents))
        .route("/incidents/{alarm_id}", get(get_incident))
        .route(
            "/incidents/{alarm_id}/update-alarm-level",
            patch(update_alarm_level),
        )
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

/// Extract the submitter identity from the bearer credential. Token
/// verification happens upstream of this core; here only presence is
/// enforced and the subject string becomes the `performed_by` attribution.
fn bearer_identity(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Unauthorized("Missing or invalid bearer credential".into()))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn create_incident(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<CreateIncidentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let performed_by = bearer_identity(&headers)?;

    let report = IncidentReport {
        first_name: req.first_name,
        last_name: req.last_name,
        phone_number: req.phone_number,
        location: req.location,
        incident_type: req.incident_type,
        alarm_level: req.alarm_level,
        narrative: req.narrative,
        latitude: req.latitude,
        longitude: req.longitude,
    };

    let recorded = intake::record_incident(&state.db, &report, &performed_by).await?;

    state
        .registry
        .broadcast(&ServerMessage::NewIncident(recorded.event(&report)));

    let response = CreateIncidentResponse {
        message: "Incident reported".to_string(),
        alarm_id: recorded.incident.id,
        caller_id: recorded.caller.id,
        status: recorded.incident.status,
        coordinates: Coordinates {
            lat: recorded.incident.latitude,
            lng: recorded.incident.longitude,
        },
    };
    Ok((StatusCode::CREATED, Json(response)))
}

async fn update_alarm_level(
    State(state): State<SharedState>,
    Path(alarm_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<UpdateAlarmLevelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let performed_by = bearer_identity(&headers)?;

    let raw = req
        .new_alarm_level
        .as_deref()
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .ok_or(DispatchError::MissingField("newAlarmLevel"))?
        .to_string();
    let level = AlarmLevel::normalize(&raw);

    let incident = state
        .db
        .call(move |db| {
            if db.get_incident(alarm_id)?.is_none() {
                return Ok(None);
            }
            let incident = db.update_alarm_level(alarm_id, &level)?;
            db.append_log(
                alarm_id,
                "Alarm Level Change",
                &format!("Alarm level changed to {}", level),
                &performed_by,
            )?;
            Ok(Some(incident))
        })
        .await
        .map_err(DispatchError::persistence)?
        .ok_or(DispatchError::IncidentNotFound { id: alarm_id })?;

    Ok(Json(UpdateAlarmLevelResponse {
        message: "Alarm level updated".to_string(),
        alarm_id,
        new_alarm_level: incident.current_level,
    }))
}

async fn list_incidents(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let incidents = state
        .db
        .call(|db| db.list_incidents())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(incidents))
}

async fn get_incident(
    State(state): State<SharedState>,
    Path(alarm_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = state
        .db
        .call(move |db| db.get_incident_detail(alarm_id))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    match detail {
        Some(detail) => Ok(Json(detail)),
        None => Err(ApiError::NotFound(format!(
            "Incident {} not found",
            alarm_id
        ))),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::db::DispatchDb;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state() -> SharedState {
        let db = DispatchDb::new_in_memory().unwrap();
        Arc::new(AppState {
            db: DbHandle::new(db),
            registry: Arc::new(ConnectionRegistry::new()),
        })
    }

    fn test_app() -> Router {
        api_router().with_state(test_state())
    }

    async fn body_json<T: serde::de::DeserializeOwned>(body: Body) -> T {
        let bytes = body.collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn create_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/create-incident")
            .header("content-type", "application/json")
            .header("authorization", "Bearer station-admin")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn valid_report() -> serde_json::Value {
        serde_json::json!({
            "firstName": "Juan",
            "lastName": "Dela Cruz",
            "phoneNumber": "0917 555 0101",
            "alarmLevel": "1st Alarm",
            "latitude": 14.6,
            "longitude": 120.9
        })
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_create_incident_new_phone_returns_fresh_ids() {
        let app = test_app();
        let response = app.oneshot(create_request(valid_report())).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let body: serde_json::Value = body_json(response.into_body()).await;
        assert!(body["alarmId"].as_i64().unwrap() > 0);
        assert!(body["callerId"].as_i64().unwrap() > 0);
        assert_eq!(body["status"], "Pending Dispatch");
        assert_eq!(body["coordinates"]["lat"], 14.6);
        assert_eq!(body["coordinates"]["lng"], 120.9);
    }

    #[tokio::test]
    async fn test_create_incident_repeat_phone_reuses_caller() {
        let app = test_app();
        let first = app
            .clone()
            .oneshot(create_request(valid_report()))
            .await
            .unwrap();
        let first: serde_json::Value = body_json(first.into_body()).await;

        let mut second_report = valid_report();
        second_report["alarmLevel"] = serde_json::json!("3rd Alarm");
        let second = app.oneshot(create_request(second_report)).await.unwrap();
        let second: serde_json::Value = body_json(second.into_body()).await;

        assert_eq!(first["callerId"], second["callerId"]);
        assert_ne!(first["alarmId"], second["alarmId"]);
    }

    #[tokio::test]
    async fn test_create_incident_missing_field_is_400_with_no_writes() {
        let app = test_app();
        for field in ["phoneNumber", "latitude", "longitude", "alarmLevel"] {
            let mut report = valid_report();
            report.as_object_mut().unwrap().remove(field);
            let response = app.clone().oneshot(create_request(report)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let body: serde_json::Value = body_json(response.into_body()).await;
            assert!(body["error"].as_str().unwrap().contains(field));
        }

        // No store writes happened for any of the rejected submissions.
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/incidents")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let incidents: Vec<serde_json::Value> = body_json(response.into_body()).await;
        assert!(incidents.is_empty());
    }

    #[tokio::test]
    async fn test_create_incident_without_bearer_is_401() {
        let app = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/create-incident")
                    .header("content-type", "application/json")
                    .body(Body::from(valid_report().to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_incident_normalizes_named_tier() {
        let app = test_app();
        let mut report = valid_report();
        report["alarmLevel"] = serde_json::json!("General Alarm");
        let response = app
            .clone()
            .oneshot(create_request(report))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let detail = app
            .oneshot(
                Request::builder()
                    .uri("/incidents/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let detail: serde_json::Value = body_json(detail.into_body()).await;
        assert_eq!(detail["incident"]["currentLevel"], "Alarm 1");
    }

    #[tokio::test]
    async fn test_create_incident_broadcasts_to_connected_clients() {
        let state = test_state();
        let app = api_router().with_state(state.clone());
        let (_id, mut rx) = state.registry.register();

        let response = app.oneshot(create_request(valid_report())).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let msg = rx.recv().await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&msg).unwrap();
        assert_eq!(parsed["type"], "new-incident");
        assert_eq!(parsed["data"]["phoneNumber"], "0917 555 0101");
        assert!(parsed["data"]["alarmId"].as_i64().unwrap() > 0);
    }

    #[tokio::test]
    async fn test_update_alarm_level_appends_log() {
        let app = test_app();
        app.clone()
            .oneshot(create_request(valid_report()))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/incidents/1/update-alarm-level")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer station-admin")
                    .body(Body::from(
                        serde_json::json!({"newAlarmLevel": "4th Alarm"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["alarmId"], 1);
        assert_eq!(body["newAlarmLevel"], "Alarm 4");

        let detail = app
            .oneshot(
                Request::builder()
                    .uri("/incidents/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let detail: serde_json::Value = body_json(detail.into_body()).await;
        let logs = detail["logs"].as_array().unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[1]["actionType"], "Alarm Level Change");
        // Initial level is never rewritten.
        assert_eq!(detail["incident"]["initialLevel"], "Alarm 1");
    }

    #[tokio::test]
    async fn test_update_alarm_level_unknown_incident_is_404() {
        let app = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/incidents/999/update-alarm-level")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer station-admin")
                    .body(Body::from(
                        serde_json::json!({"newAlarmLevel": "2nd Alarm"}).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(body["error"], "Incident 999 not found");
    }

    #[test]
    fn test_not_found_status_comes_from_typed_variant_not_message_text() {
        let not_found: ApiError = DispatchError::IncidentNotFound { id: 7 }.into();
        assert!(matches!(not_found, ApiError::NotFound(_)));

        // A store failure whose message happens to mention "not found"
        // still surfaces as a 500.
        let store: ApiError =
            DispatchError::persistence(anyhow::anyhow!("table not found: response_logs")).into();
        assert!(matches!(store, ApiError::Internal(_)));
    }

    #[tokio::test]
    async fn test_update_alarm_level_missing_level_is_400() {
        let app = test_app();
        app.clone()
            .oneshot(create_request(valid_report()))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("PATCH")
                    .uri("/incidents/1/update-alarm-level")
                    .header("content-type", "application/json")
                    .header("authorization", "Bearer station-admin")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_incident_detail_includes_caller() {
        let app = test_app();
        app.clone()
            .oneshot(create_request(valid_report()))
            .await
            .unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/incidents/1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let detail: serde_json::Value = body_json(response.into_body()).await;
        assert_eq!(detail["caller"]["firstName"], "Juan");
        // Name splitting keeps the first two tokens only.
        assert_eq!(detail["caller"]["lastName"], "Dela");
        assert_eq!(detail["logs"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_get_unknown_incident_is_404() {
        let app = test_app();
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/incidents/999")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
