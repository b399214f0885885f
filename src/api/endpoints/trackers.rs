//! Tracker endpoints.
//!
//! - `POST /api/patient/trackers` — create a course
//! - `GET /api/patient/trackers` — the caller's approved courses
//! - `GET /api/patient/trackers/pending` — courses awaiting the caller's decision
//! - `POST /api/patient/trackers/status` — approve or reject a pending course

use std::str::FromStr;

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::db::repository::{get_approved_trackers, get_pending_trackers};
use crate::models::{Role, Tracker, TrackerStatus};
use crate::trackers::{self, TrackerDraft};

#[derive(Deserialize)]
pub struct CreateTrackerRequest {
    #[serde(flatten)]
    pub draft: TrackerDraft,
    /// Target patient. Required when a doctor prescribes; ignored for a
    /// patient self-log, which always targets the caller.
    pub patient_id: Option<String>,
}

#[derive(Serialize)]
pub struct CreateTrackerResponse {
    pub tracker: Tracker,
}

/// `POST /api/patient/trackers` — create a medication course.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateTrackerRequest>,
) -> Result<(StatusCode, Json<CreateTrackerResponse>), ApiError> {
    let patient_id = match auth.role {
        Role::Patient => auth.user_id.clone(),
        Role::Doctor | Role::Admin => req
            .patient_id
            .ok_or_else(|| ApiError::BadRequest("patient_id is required".into()))?,
    };

    let mut conn = ctx.open_db()?;
    let tracker =
        trackers::create_tracker(&mut conn, &req.draft, &patient_id, &auth.user_id, auth.role)?;

    Ok((StatusCode::CREATED, Json(CreateTrackerResponse { tracker })))
}

#[derive(Serialize)]
pub struct TrackerListResponse {
    pub trackers: Vec<Tracker>,
}

/// `GET /api/patient/trackers` — approved courses for the caller.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<TrackerListResponse>, ApiError> {
    let conn = ctx.open_db()?;
    let trackers = get_approved_trackers(&conn, &auth.user_id)?;
    Ok(Json(TrackerListResponse { trackers }))
}

/// `GET /api/patient/trackers/pending` — courses added by the other
/// role, awaiting the caller's decision.
pub async fn pending(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<TrackerListResponse>, ApiError> {
    let conn = ctx.open_db()?;
    let trackers = get_pending_trackers(&conn, &auth.user_id, auth.role)?;
    Ok(Json(TrackerListResponse { trackers }))
}

#[derive(Deserialize)]
pub struct DecideTrackerRequest {
    pub tracker_id: Uuid,
    /// "approved" or "rejected"
    pub status: String,
}

#[derive(Serialize)]
pub struct DecideTrackerResponse {
    pub status: TrackerStatus,
    pub reminders_generated: usize,
}

/// `POST /api/patient/trackers/status` — decide a pending course.
///
/// Only the owning patient can decide, and only once: a repeated call
/// or a foreign tracker id resolves to 404.
pub async fn decide(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<DecideTrackerRequest>,
) -> Result<Json<DecideTrackerResponse>, ApiError> {
    let decision = TrackerStatus::from_str(&req.status)
        .map_err(|_| ApiError::BadRequest(format!("Unknown status {:?}", req.status)))?;
    if decision == TrackerStatus::Pending {
        return Err(ApiError::BadRequest(
            "Decision must be approved or rejected".into(),
        ));
    }

    let mut conn = ctx.open_db()?;
    let reminders_generated =
        trackers::decide_tracker(&mut conn, &req.tracker_id, &auth.user_id, decision)?;

    Ok(Json(DecideTrackerResponse {
        status: decision,
        reminders_generated,
    }))
}
