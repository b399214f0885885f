use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::*;

/// Storage format for reminder timestamps. Lexicographic order equals
/// temporal order, so SQL range predicates compare the raw strings.
pub const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub fn insert_tracker(conn: &Connection, tracker: &Tracker) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO trackers (id, patient_id, name, dosage, frequency, doctor,
         start_date, end_date, notes, added_by, added_by_role, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            tracker.id.to_string(),
            tracker.patient_id,
            tracker.name,
            tracker.dosage,
            tracker.frequency,
            tracker.doctor,
            tracker.start_date.to_string(),
            tracker.end_date.map(|d| d.to_string()),
            tracker.notes,
            tracker.added_by,
            tracker.added_by_role.as_str(),
            tracker.status.as_str(),
        ],
    )?;
    Ok(())
}

/// Batch-insert a tracker's reminder set. Callers run this inside the
/// same transaction as the tracker insert or approval update, so a crash
/// cannot leave an approved tracker with a partial batch.
pub fn insert_reminders(
    conn: &Connection,
    tracker_id: &Uuid,
    batch: &[NewReminder],
) -> Result<usize, DatabaseError> {
    let mut stmt = conn.prepare(
        "INSERT INTO reminders (id, tracker_id, date, time, status)
         VALUES (?1, ?2, ?3, ?4, 'Pending')",
    )?;
    for reminder in batch {
        stmt.execute(params![
            Uuid::new_v4().to_string(),
            tracker_id.to_string(),
            reminder.date.format(DATETIME_FMT).to_string(),
            reminder.time.as_str(),
        ])?;
    }
    Ok(batch.len())
}

pub fn get_tracker(conn: &Connection, id: &Uuid) -> Result<Option<Tracker>, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, patient_id, name, dosage, frequency, doctor, start_date,
         end_date, notes, added_by, added_by_role, status
         FROM trackers WHERE id = ?1",
        params![id.to_string()],
        tracker_row,
    );

    match result {
        Ok(row) => Ok(Some(tracker_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(DatabaseError::from(e)),
    }
}

/// Approved trackers for a patient, newest first. Reminders are not
/// loaded here; the reminder queries join them on demand.
pub fn get_approved_trackers(
    conn: &Connection,
    patient_id: &str,
) -> Result<Vec<Tracker>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, name, dosage, frequency, doctor, start_date,
         end_date, notes, added_by, added_by_role, status
         FROM trackers WHERE patient_id = ?1 AND status = 'approved'
         ORDER BY created_at DESC",
    )?;

    let rows = stmt.query_map(params![patient_id], tracker_row)?;

    let mut trackers = Vec::new();
    for row in rows {
        trackers.push(tracker_from_row(row?)?);
    }
    Ok(trackers)
}

/// Pending trackers awaiting the caller's decision: created for this
/// patient by the *other* role (a patient never approves their own entry).
pub fn get_pending_trackers(
    conn: &Connection,
    patient_id: &str,
    caller_role: Role,
) -> Result<Vec<Tracker>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, name, dosage, frequency, doctor, start_date,
         end_date, notes, added_by, added_by_role, status
         FROM trackers
         WHERE patient_id = ?1 AND status = 'pending' AND added_by_role != ?2
         ORDER BY created_at DESC",
    )?;

    let rows = stmt.query_map(params![patient_id, caller_role.as_str()], tracker_row)?;

    let mut trackers = Vec::new();
    for row in rows {
        trackers.push(tracker_from_row(row?)?);
    }
    Ok(trackers)
}

/// One-way decision on a pending tracker. The `status = 'pending'` guard
/// makes the transition first-write-wins: a second approval (or an
/// approval of a foreign tracker) affects zero rows and returns `false`,
/// so reminder expansion can never run twice for the same tracker.
pub fn mark_tracker_decided(
    conn: &Connection,
    id: &Uuid,
    patient_id: &str,
    decision: TrackerStatus,
) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE trackers SET status = ?1
         WHERE id = ?2 AND patient_id = ?3 AND status = 'pending'",
        params![decision.as_str(), id.to_string(), patient_id],
    )?;
    Ok(changed > 0)
}

pub fn count_reminders(conn: &Connection, tracker_id: &Uuid) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM reminders WHERE tracker_id = ?1",
        params![tracker_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

// Internal row type for Tracker mapping
struct TrackerRow {
    id: String,
    patient_id: String,
    name: String,
    dosage: String,
    frequency: String,
    doctor: String,
    start_date: String,
    end_date: Option<String>,
    notes: String,
    added_by: String,
    added_by_role: String,
    status: String,
}

fn tracker_row(row: &rusqlite::Row<'_>) -> Result<TrackerRow, rusqlite::Error> {
    Ok(TrackerRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        name: row.get(2)?,
        dosage: row.get(3)?,
        frequency: row.get(4)?,
        doctor: row.get(5)?,
        start_date: row.get(6)?,
        end_date: row.get(7)?,
        notes: row.get(8)?,
        added_by: row.get(9)?,
        added_by_role: row.get(10)?,
        status: row.get(11)?,
    })
}

fn tracker_from_row(row: TrackerRow) -> Result<Tracker, DatabaseError> {
    Ok(Tracker {
        id: Uuid::parse_str(&row.id)
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        patient_id: row.patient_id,
        name: row.name,
        dosage: row.dosage,
        frequency: row.frequency,
        doctor: row.doctor,
        start_date: NaiveDate::parse_from_str(&row.start_date, "%Y-%m-%d")
            .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        end_date: row
            .end_date
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        notes: row.notes,
        added_by: row.added_by,
        added_by_role: Role::from_str(&row.added_by_role)?,
        status: TrackerStatus::from_str(&row.status)?,
    })
}

/// Parse a stored reminder timestamp.
pub fn parse_reminder_datetime(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;

    fn sample_tracker(patient_id: &str, status: TrackerStatus) -> Tracker {
        Tracker {
            id: Uuid::new_v4(),
            patient_id: patient_id.to_string(),
            name: "Metformin".into(),
            dosage: "500mg".into(),
            frequency: "1-0-1".into(),
            doctor: "Dr. Chen".into(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: Some(NaiveDate::from_ymd_opt(2024, 1, 3).unwrap()),
            notes: "with food".into(),
            added_by: patient_id.to_string(),
            added_by_role: Role::Patient,
            status,
        }
    }

    #[test]
    fn insert_and_get_round_trip() {
        let conn = open_memory_database().unwrap();
        let tracker = sample_tracker("alice@example.com", TrackerStatus::Approved);
        insert_tracker(&conn, &tracker).unwrap();

        let loaded = get_tracker(&conn, &tracker.id).unwrap().unwrap();
        assert_eq!(loaded.id, tracker.id);
        assert_eq!(loaded.patient_id, "alice@example.com");
        assert_eq!(loaded.frequency, "1-0-1");
        assert_eq!(loaded.status, TrackerStatus::Approved);
        assert_eq!(loaded.end_date, tracker.end_date);
    }

    #[test]
    fn get_missing_tracker_is_none() {
        let conn = open_memory_database().unwrap();
        assert!(get_tracker(&conn, &Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn approved_listing_excludes_other_patients_and_pending() {
        let conn = open_memory_database().unwrap();
        insert_tracker(&conn, &sample_tracker("alice@example.com", TrackerStatus::Approved)).unwrap();
        insert_tracker(&conn, &sample_tracker("alice@example.com", TrackerStatus::Pending)).unwrap();
        insert_tracker(&conn, &sample_tracker("bob@example.com", TrackerStatus::Approved)).unwrap();

        let trackers = get_approved_trackers(&conn, "alice@example.com").unwrap();
        assert_eq!(trackers.len(), 1);
        assert_eq!(trackers[0].status, TrackerStatus::Approved);
    }

    #[test]
    fn pending_listing_excludes_own_role() {
        let conn = open_memory_database().unwrap();
        let mut by_doctor = sample_tracker("alice@example.com", TrackerStatus::Pending);
        by_doctor.added_by = "dr.chen@example.com".into();
        by_doctor.added_by_role = Role::Doctor;
        insert_tracker(&conn, &by_doctor).unwrap();
        // A patient-authored pending entry should not show up in the
        // patient's own approval queue
        insert_tracker(&conn, &sample_tracker("alice@example.com", TrackerStatus::Pending)).unwrap();

        let pending = get_pending_trackers(&conn, "alice@example.com", Role::Patient).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].added_by_role, Role::Doctor);
    }

    #[test]
    fn decision_is_one_way() {
        let conn = open_memory_database().unwrap();
        let tracker = sample_tracker("alice@example.com", TrackerStatus::Pending);
        insert_tracker(&conn, &tracker).unwrap();

        assert!(mark_tracker_decided(&conn, &tracker.id, "alice@example.com", TrackerStatus::Approved).unwrap());
        // Second decision hits zero rows: the pending guard is gone
        assert!(!mark_tracker_decided(&conn, &tracker.id, "alice@example.com", TrackerStatus::Approved).unwrap());
        assert!(!mark_tracker_decided(&conn, &tracker.id, "alice@example.com", TrackerStatus::Rejected).unwrap());
    }

    #[test]
    fn decision_scoped_to_patient() {
        let conn = open_memory_database().unwrap();
        let tracker = sample_tracker("alice@example.com", TrackerStatus::Pending);
        insert_tracker(&conn, &tracker).unwrap();

        assert!(!mark_tracker_decided(&conn, &tracker.id, "mallory@example.com", TrackerStatus::Approved).unwrap());
        let loaded = get_tracker(&conn, &tracker.id).unwrap().unwrap();
        assert_eq!(loaded.status, TrackerStatus::Pending);
    }

    #[test]
    fn reminder_batch_insert_and_count() {
        let conn = open_memory_database().unwrap();
        let tracker = sample_tracker("alice@example.com", TrackerStatus::Approved);
        insert_tracker(&conn, &tracker).unwrap();

        let batch = vec![
            NewReminder {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(8, 0, 0).unwrap(),
                time: Slot::Morning,
            },
            NewReminder {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(20, 0, 0).unwrap(),
                time: Slot::Night,
            },
        ];
        let inserted = insert_reminders(&conn, &tracker.id, &batch).unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(count_reminders(&conn, &tracker.id).unwrap(), 2);
    }

    #[test]
    fn delete_cascades_to_reminders() {
        let conn = open_memory_database().unwrap();
        let tracker = sample_tracker("alice@example.com", TrackerStatus::Approved);
        insert_tracker(&conn, &tracker).unwrap();
        insert_reminders(
            &conn,
            &tracker.id,
            &[NewReminder {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(8, 0, 0).unwrap(),
                time: Slot::Morning,
            }],
        )
        .unwrap();

        conn.execute(
            "DELETE FROM trackers WHERE id = ?1",
            params![tracker.id.to_string()],
        )
        .unwrap();
        let orphans: i64 = conn
            .query_row("SELECT COUNT(*) FROM reminders", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn datetime_format_round_trips() {
        let dt = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let stored = dt.format(DATETIME_FMT).to_string();
        assert_eq!(stored, "2024-01-01 08:00:00");
        assert_eq!(parse_reminder_datetime(&stored).unwrap(), dt);
    }
}
