//! Medication tracker workflows and reminder queries.
//!
//! One layer above the repository: tracker creation and approval (the two
//! places a reminder batch is generated), the patient-scoped reminder
//! queries with their read-time classification, the due-reminder poll
//! query, and the time-gated status transition.
//!
//! Every time-dependent function takes the current instant as an explicit
//! `NaiveDateTime` parameter. Callers pass `Local::now().naive_local()`;
//! tests pass fixed instants.

use std::str::FromStr;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::repository::{
    get_tracker, insert_reminders, insert_tracker, mark_tracker_decided, DATETIME_FMT,
};
use crate::db::DatabaseError;
use crate::models::{ReminderStatus, Role, Slot, Tracker, TrackerStatus};
use crate::schedule::{expand_schedule, FrequencyPattern};

/// Reminders become due this many minutes before `now`, exclusive.
pub const DUE_WINDOW_MINUTES: i64 = 5;

/// What happens when a Taken/Missed reminder is marked again.
///
/// `Sticky` treats terminal states as final and rejects the re-mark;
/// `Rewritable` lets a patient undo a mis-click by overwriting the
/// stored status (the original behavior of the tracking UI).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FinalizePolicy {
    #[default]
    Sticky,
    Rewritable,
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Invalid frequency pattern {0:?} (expected three 0/1 flags, e.g. \"1-0-1\")")]
    InvalidPattern(String),

    #[error("End date {end} precedes start date {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Status must be Taken or Missed")]
    InvalidStatusTarget,

    #[error("Decision must be approved or rejected")]
    InvalidDecision,

    #[error("Cannot update status before scheduled time ({scheduled})")]
    TooEarly { scheduled: NaiveDateTime },

    #[error("Tracker not found")]
    TrackerNotFound,

    #[error("Reminder not found")]
    ReminderNotFound,

    #[error("Reminder already marked {}", current.as_str())]
    AlreadyFinalized { current: ReminderStatus },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for TrackerError {
    fn from(err: rusqlite::Error) -> Self {
        TrackerError::Database(DatabaseError::from(err))
    }
}

// ═══════════════════════════════════════════
// View types — serialised to clients
// ═══════════════════════════════════════════

/// A reminder enriched with its tracker's medication name and dosage.
#[derive(Debug, Clone, Serialize)]
pub struct ReminderView {
    pub id: Uuid,
    pub medication_name: String,
    pub dosage: String,
    pub time: Slot,
    pub date: NaiveDateTime,
    pub status: ReminderStatus,
}

/// A reminder whose scheduled time just arrived, shaped for the
/// notification dispatcher.
#[derive(Debug, Clone, Serialize)]
pub struct DueReminder {
    pub tracker_id: Uuid,
    pub reminder_id: Uuid,
    pub patient_id: String,
    pub medication_name: String,
    pub dosage: String,
    pub time: Slot,
    pub scheduled_time: NaiveDateTime,
}

/// Input for creating a tracker. `patient_id` comes from the auth
/// context (or, for a prescribing doctor, from the request).
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerDraft {
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub doctor: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub notes: String,
}

// ═══════════════════════════════════════════
// Tracker workflows
// ═══════════════════════════════════════════

/// Create a tracker for `patient_id`.
///
/// A patient-authored tracker is approved on the spot and its reminder
/// batch is written in the same transaction; a doctor-authored one stays
/// pending until the patient decides (see [`decide_tracker`]). The
/// frequency string is validated either way so a malformed pattern fails
/// here rather than at approval time.
pub fn create_tracker(
    conn: &mut Connection,
    draft: &TrackerDraft,
    patient_id: &str,
    added_by: &str,
    added_by_role: Role,
) -> Result<Tracker, TrackerError> {
    let pattern = FrequencyPattern::parse(&draft.frequency)?;
    if let Some(end) = draft.end_date {
        if end < draft.start_date {
            return Err(TrackerError::InvalidDateRange {
                start: draft.start_date,
                end,
            });
        }
    }

    let status = if added_by_role == Role::Patient {
        TrackerStatus::Approved
    } else {
        TrackerStatus::Pending
    };

    let tracker = Tracker {
        id: Uuid::new_v4(),
        patient_id: patient_id.to_string(),
        name: draft.name.clone(),
        dosage: draft.dosage.clone(),
        frequency: draft.frequency.clone(),
        doctor: draft.doctor.clone(),
        start_date: draft.start_date,
        end_date: draft.end_date,
        notes: draft.notes.clone(),
        added_by: added_by.to_string(),
        added_by_role,
        status,
    };

    let tx = conn.transaction().map_err(DatabaseError::from)?;
    insert_tracker(&tx, &tracker)?;
    if status == TrackerStatus::Approved {
        let batch = expand_schedule(tracker.start_date, tracker.end_date, &pattern);
        let count = insert_reminders(&tx, &tracker.id, &batch)?;
        tracing::info!(tracker_id = %tracker.id, reminders = count, "Tracker created and scheduled");
    } else {
        tracing::info!(tracker_id = %tracker.id, "Tracker created, awaiting patient approval");
    }
    tx.commit().map_err(DatabaseError::from)?;

    Ok(tracker)
}

/// Patient decision on a pending tracker: approve (expanding the
/// reminder batch) or reject. Returns the number of reminders generated.
///
/// The repository's `status = 'pending'` guard makes this one-way: a
/// repeated decision, or a decision on someone else's tracker, resolves
/// to [`TrackerError::TrackerNotFound`] and generates nothing.
pub fn decide_tracker(
    conn: &mut Connection,
    tracker_id: &Uuid,
    patient_id: &str,
    decision: TrackerStatus,
) -> Result<usize, TrackerError> {
    if decision == TrackerStatus::Pending {
        return Err(TrackerError::InvalidDecision);
    }

    let tx = conn.transaction().map_err(DatabaseError::from)?;
    if !mark_tracker_decided(&tx, tracker_id, patient_id, decision)? {
        return Err(TrackerError::TrackerNotFound);
    }

    let mut generated = 0;
    if decision == TrackerStatus::Approved {
        let tracker = get_tracker(&tx, tracker_id)?.ok_or(TrackerError::TrackerNotFound)?;
        let pattern = FrequencyPattern::parse(&tracker.frequency)?;
        let batch = expand_schedule(tracker.start_date, tracker.end_date, &pattern);
        generated = insert_reminders(&tx, tracker_id, &batch)?;
    }
    tx.commit().map_err(DatabaseError::from)?;

    tracing::info!(%tracker_id, decision = decision.as_str(), reminders = generated, "Tracker decided");
    Ok(generated)
}

// ═══════════════════════════════════════════
// Reminder queries
// ═══════════════════════════════════════════

const REMINDER_VIEW_SQL: &str = "SELECT r.id, t.name, t.dosage, r.time, r.date, r.status
     FROM reminders r
     JOIN trackers t ON r.tracker_id = t.id
     WHERE t.patient_id = ?1 AND t.status = 'approved'
       AND r.date >= ?2 AND r.date < ?3
     ORDER BY r.date ASC";

/// Reminders on one calendar day, across all of the patient's approved
/// trackers, ordered by scheduled time.
///
/// Classification is read-time only: a reminder still stored `Pending`
/// whose scheduled time has passed is *reported* `Missed` when the
/// queried day lies strictly in the past. Today's still-pending doses
/// are reported as stored (the patient may yet take them). Nothing is
/// written.
pub fn fetch_reminders_by_date(
    conn: &Connection,
    patient_id: &str,
    day: NaiveDate,
    now: NaiveDateTime,
) -> Result<Vec<ReminderView>, TrackerError> {
    let mut views = fetch_day_reminders(conn, patient_id, day)?;

    let day_is_past = day < now.date();
    for view in &mut views {
        if view.status == ReminderStatus::Pending && view.date < now && day_is_past {
            view.status = ReminderStatus::Missed;
        }
    }
    Ok(views)
}

/// Today's reminders for the patient, stored status, no override.
pub fn fetch_today_reminders(
    conn: &Connection,
    patient_id: &str,
    now: NaiveDateTime,
) -> Result<Vec<ReminderView>, TrackerError> {
    fetch_day_reminders(conn, patient_id, now.date())
}

fn fetch_day_reminders(
    conn: &Connection,
    patient_id: &str,
    day: NaiveDate,
) -> Result<Vec<ReminderView>, TrackerError> {
    let Some(next_day) = day.succ_opt() else {
        return Ok(Vec::new());
    };
    let window_start = format!("{} 00:00:00", day.format("%Y-%m-%d"));
    let window_end = format!("{} 00:00:00", next_day.format("%Y-%m-%d"));

    let mut stmt = conn.prepare(REMINDER_VIEW_SQL).map_err(DatabaseError::from)?;
    let rows = stmt
        .query_map(params![patient_id, window_start, window_end], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
            ))
        })
        .map_err(DatabaseError::from)?;

    let mut views = Vec::new();
    for row in rows {
        let (id, name, dosage, time, date, status) = row.map_err(DatabaseError::from)?;
        views.push(ReminderView {
            id: Uuid::parse_str(&id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            medication_name: name,
            dosage,
            time: Slot::from_str(&time)?,
            date: crate::db::repository::parse_reminder_datetime(&date)?,
            status: ReminderStatus::from_str(&status)?,
        });
    }
    Ok(views)
}

/// System-wide poll: pending reminders whose scheduled time falls in
/// `(now − 5 min, now]` — left boundary excluded, right included.
///
/// A pure read on a sliding window: consecutive ticks legitimately
/// overlap, and the notification dispatcher de-duplicates. A reminder
/// marked Taken between ticks simply drops out of the window.
pub fn fetch_due_reminders(
    conn: &Connection,
    now: NaiveDateTime,
) -> Result<Vec<DueReminder>, TrackerError> {
    let window_start = (now - Duration::minutes(DUE_WINDOW_MINUTES))
        .format(DATETIME_FMT)
        .to_string();
    let window_end = now.format(DATETIME_FMT).to_string();

    let mut stmt = conn
        .prepare(
            "SELECT r.id, r.tracker_id, t.patient_id, t.name, t.dosage, r.time, r.date
             FROM reminders r
             JOIN trackers t ON r.tracker_id = t.id
             WHERE r.status = 'Pending' AND r.date > ?1 AND r.date <= ?2
             ORDER BY r.date ASC",
        )
        .map_err(DatabaseError::from)?;

    let rows = stmt
        .query_map(params![window_start, window_end], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        })
        .map_err(DatabaseError::from)?;

    let mut due = Vec::new();
    for row in rows {
        let (id, tracker_id, patient_id, name, dosage, time, date) =
            row.map_err(DatabaseError::from)?;
        due.push(DueReminder {
            tracker_id: Uuid::parse_str(&tracker_id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            reminder_id: Uuid::parse_str(&id)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
            patient_id,
            medication_name: name,
            dosage,
            time: Slot::from_str(&time)?,
            scheduled_time: crate::db::repository::parse_reminder_datetime(&date)?,
        });
    }
    Ok(due)
}

// ═══════════════════════════════════════════
// Status transition
// ═══════════════════════════════════════════

/// Mark a reminder Taken or Missed.
///
/// The lookup is scoped to the patient's own trackers, so an unknown id
/// and a foreign reminder both resolve to [`TrackerError::ReminderNotFound`].
/// Marking before the scheduled time fails with [`TrackerError::TooEarly`]
/// (at the scheduled instant itself it succeeds). Under the default
/// `Sticky` policy the write is a compare-and-set on `Pending`, so a
/// terminal reminder — or one a concurrent request just finalized —
/// rejects with [`TrackerError::AlreadyFinalized`].
pub fn set_reminder_status(
    conn: &Connection,
    reminder_id: &Uuid,
    patient_id: &str,
    new_status: ReminderStatus,
    now: NaiveDateTime,
    policy: FinalizePolicy,
) -> Result<(), TrackerError> {
    if !new_status.is_terminal() {
        return Err(TrackerError::InvalidStatusTarget);
    }

    let row = conn.query_row(
        "SELECT r.date, r.status
         FROM reminders r
         JOIN trackers t ON r.tracker_id = t.id
         WHERE r.id = ?1 AND t.patient_id = ?2",
        params![reminder_id.to_string(), patient_id],
        |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
    );
    let (date, status) = match row {
        Ok(pair) => pair,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Err(TrackerError::ReminderNotFound),
        Err(e) => return Err(DatabaseError::from(e).into()),
    };

    let scheduled = crate::db::repository::parse_reminder_datetime(&date)?;
    if now < scheduled {
        return Err(TrackerError::TooEarly { scheduled });
    }

    let current = ReminderStatus::from_str(&status)?;
    match policy {
        FinalizePolicy::Sticky => {
            if current.is_terminal() {
                return Err(TrackerError::AlreadyFinalized { current });
            }
            let changed = conn.execute(
                "UPDATE reminders SET status = ?1 WHERE id = ?2 AND status = 'Pending'",
                params![new_status.as_str(), reminder_id.to_string()],
            )?;
            if changed == 0 {
                // Lost the race to a concurrent transition
                let winner: String = conn.query_row(
                    "SELECT status FROM reminders WHERE id = ?1",
                    params![reminder_id.to_string()],
                    |row| row.get(0),
                )?;
                return Err(TrackerError::AlreadyFinalized {
                    current: ReminderStatus::from_str(&winner)?,
                });
            }
        }
        FinalizePolicy::Rewritable => {
            conn.execute(
                "UPDATE reminders SET status = ?1 WHERE id = ?2",
                params![new_status.as_str(), reminder_id.to_string()],
            )?;
        }
    }

    tracing::debug!(%reminder_id, status = new_status.as_str(), "Reminder status updated");
    Ok(())
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════
