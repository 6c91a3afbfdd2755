//! Reminder delivery seam.
//!
//! The ledger decides that a reminder is due; a [`Dispatcher`] delivers it. Transport
//! (SMTP, push, ...) lives behind this trait and outside the crate.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;
use ulid::Ulid;

use crate::model::Booking;

/// What a reminder says about the booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReminderSummary {
    pub booking_id: Ulid,
    pub court_number: u32,
    pub booking_date: String,
    pub start_time: String,
    pub end_time: String,
}

impl From<&Booking> for ReminderSummary {
    fn from(b: &Booking) -> Self {
        Self {
            booking_id: b.id,
            court_number: b.court_number,
            booking_date: b.slot.date_string(),
            start_time: b.slot.start_string(),
            end_time: b.slot.end_string(),
        }
    }
}

/// Any delivery failure. Always treated as transient: the next sweep retries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("reminder delivery failed: {0}")]
pub struct DispatchError(pub String);

#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn send(&self, recipient: &str, summary: &ReminderSummary) -> Result<(), DispatchError>;
}

/// Writes reminders to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

#[async_trait]
impl Dispatcher for LogDispatcher {
    async fn send(&self, recipient: &str, summary: &ReminderSummary) -> Result<(), DispatchError> {
        let body = serde_json::to_string(summary).map_err(|e| DispatchError(e.to_string()))?;
        info!(recipient, booking = %summary.booking_id, "reminder: {body}");
        Ok(())
    }
}
