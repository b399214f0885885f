use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ReminderStatus, Role, Slot, TrackerStatus};

/// A medication course: prescribed by a doctor or self-logged by a patient.
///
/// A doctor-created tracker starts `pending` and holds no reminders until
/// the patient approves it; a patient-created tracker is `approved` on
/// insert and its reminder batch is written in the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tracker {
    pub id: Uuid,
    pub patient_id: String,
    pub name: String,
    pub dosage: String,
    pub frequency: String,
    pub doctor: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub notes: String,
    pub added_by: String,
    pub added_by_role: Role,
    pub status: TrackerStatus,
}

/// One scheduled dose event, owned by its tracker. Created only as part
/// of a batch at approval time, deleted only with the tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub tracker_id: Uuid,
    pub date: NaiveDateTime,
    pub time: Slot,
    pub status: ReminderStatus,
}

/// A reminder that has not been persisted yet — output of schedule
/// expansion, input to the batch insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReminder {
    pub date: NaiveDateTime,
    pub time: Slot,
}
