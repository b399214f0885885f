//! Background due-reminder poller.
//!
//! A tokio interval task that scans for pending reminders whose
//! scheduled time just arrived and forwards them to a dispatcher
//! channel. Consecutive scan windows deliberately overlap so a tick
//! delayed by load cannot skip a reminder; the poller de-duplicates
//! before dispatching.
//!
//! Pattern mirrors `api/server.rs`: spawn background task → return
//! handle with shutdown channel.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::trackers::{fetch_due_reminders, DueReminder, DUE_WINDOW_MINUTES};

/// Default seconds between poll ticks.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Handle to a running reminder poller.
pub struct ReminderPoller {
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ReminderPoller {
    /// Stop the poller. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("Reminder poller shutdown signal sent");
        }
    }
}

impl Drop for ReminderPoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Start the poller against the database at `db_path`, dispatching due
/// reminders to `dispatch_tx`.
///
/// Each tick opens its own connection, queries the due window at the
/// current wall-clock time, and forwards reminders not already sent.
/// A failed tick (database or channel trouble) is logged and skipped;
/// the loop keeps running.
pub fn start_reminder_poller(
    db_path: PathBuf,
    interval: Duration,
    dispatch_tx: mpsc::Sender<DueReminder>,
) -> ReminderPoller {
    let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // Keyed by reminder id; pruned once the scheduled time leaves the window
        let mut dispatched: HashMap<Uuid, NaiveDateTime> = HashMap::new();

        tracing::info!(interval_secs = interval.as_secs_f64(), "Reminder poller started");

        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    tracing::info!("Reminder poller stopped");
                    return;
                }
                _ = ticker.tick() => {
                    let now = Local::now().naive_local();
                    poll_once(&db_path, now, &mut dispatched, &dispatch_tx).await;
                }
            }
        }
    });

    ReminderPoller {
        shutdown_tx: Some(shutdown_tx),
    }
}

/// One poll tick: query, de-duplicate, dispatch, prune.
///
/// Factored out of the loop so tests can drive it with a fixed `now`.
pub async fn poll_once(
    db_path: &Path,
    now: NaiveDateTime,
    dispatched: &mut HashMap<Uuid, NaiveDateTime>,
    dispatch_tx: &mpsc::Sender<DueReminder>,
) {
    let due = {
        let conn = match crate::db::sqlite::open_database(db_path) {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Reminder poll skipped, cannot open database: {e}");
                return;
            }
        };
        match fetch_due_reminders(&conn, now) {
            Ok(due) => due,
            Err(e) => {
                tracing::warn!("Reminder poll query failed: {e}");
                return;
            }
        }
    };

    for reminder in due {
        if dispatched.contains_key(&reminder.reminder_id) {
            continue;
        }
        dispatched.insert(reminder.reminder_id, reminder.scheduled_time);
        tracing::debug!(
            reminder_id = %reminder.reminder_id,
            patient = %reminder.patient_id,
            "Dispatching due reminder"
        );
        if dispatch_tx.send(reminder).await.is_err() {
            tracing::warn!("Reminder dispatcher channel closed, dropping dispatch");
            return;
        }
    }

    // Once a scheduled time has left the due window it can never be
    // returned again, so its de-dup entry is no longer needed.
    let horizon = now - chrono::Duration::minutes(DUE_WINDOW_MINUTES);
    dispatched.retain(|_, scheduled| *scheduled > horizon);
}
