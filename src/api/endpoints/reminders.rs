//! Reminder endpoints.
//!
//! - `GET /api/patient/reminders?date=` — one calendar day, with
//!   read-time Missed classification for past days
//! - `GET /api/patient/reminders/today` — today's doses, stored status
//! - `PUT /api/patient/reminders/:id` — mark Taken or Missed

use std::str::FromStr;

use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, AuthContext};
use crate::models::ReminderStatus;
use crate::trackers::{self, ReminderView};

#[derive(Deserialize)]
pub struct ReminderQuery {
    /// Calendar day, `YYYY-MM-DD`.
    pub date: String,
}

#[derive(Serialize)]
pub struct ReminderListResponse {
    pub reminders: Vec<ReminderView>,
}

/// `GET /api/patient/reminders?date=YYYY-MM-DD`
pub async fn by_date(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ReminderQuery>,
) -> Result<Json<ReminderListResponse>, ApiError> {
    let day = NaiveDate::parse_from_str(&query.date, "%Y-%m-%d")
        .map_err(|e| ApiError::BadRequest(format!("Invalid date {:?}: {e}", query.date)))?;

    let conn = ctx.open_db()?;
    let now = Local::now().naive_local();
    let reminders = trackers::fetch_reminders_by_date(&conn, &auth.user_id, day, now)?;
    Ok(Json(ReminderListResponse { reminders }))
}

/// `GET /api/patient/reminders/today`
pub async fn today(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ReminderListResponse>, ApiError> {
    let conn = ctx.open_db()?;
    let now = Local::now().naive_local();
    let reminders = trackers::fetch_today_reminders(&conn, &auth.user_id, now)?;
    Ok(Json(ReminderListResponse { reminders }))
}

#[derive(Deserialize)]
pub struct UpdateReminderRequest {
    /// "Taken" or "Missed"
    pub status: String,
}

#[derive(Serialize)]
pub struct UpdateReminderResponse {
    pub id: Uuid,
    pub status: ReminderStatus,
}

/// `PUT /api/patient/reminders/:id` — record the dose outcome.
pub async fn update(
    State(ctx): State<ApiContext>,
    Extension(auth): Extension<AuthContext>,
    Path(reminder_id): Path<Uuid>,
    Json(req): Json<UpdateReminderRequest>,
) -> Result<Json<UpdateReminderResponse>, ApiError> {
    let status = ReminderStatus::from_str(&req.status)
        .map_err(|_| ApiError::BadRequest(format!("Unknown status {:?}", req.status)))?;

    let conn = ctx.open_db()?;
    let now = Local::now().naive_local();
    trackers::set_reminder_status(&conn, &reminder_id, &auth.user_id, status, now, ctx.policy)?;

    Ok(Json(UpdateReminderResponse {
        id: reminder_id,
        status,
    }))
}
