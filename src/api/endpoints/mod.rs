pub mod health;
pub mod reminders;
pub mod trackers;
