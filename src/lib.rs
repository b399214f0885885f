//! MediSync — medication tracking backend.
//!
//! Medication courses ("trackers") with dose reminders: frequency
//! patterns like `1-0-1` expand into per-day reminder batches, a
//! patient approval workflow gates doctor-prescribed courses, and a
//! background poller surfaces due doses for notification.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod poller;
pub mod schedule;
pub mod trackers;
