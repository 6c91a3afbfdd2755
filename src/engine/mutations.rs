use tokio::sync::OwnedRwLockWriteGuard;
use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;
use crate::slot::{TimeSlot, ValidationError};

use super::conflict::{check_no_conflict, now_ms};
use super::{Engine, EngineError};

impl Engine {
    /// Book `slot` on court `court_number` for `principal`.
    ///
    /// The overlap check, the WAL append and the apply all happen under the write lock
    /// of the `(court, day)` sheet, so of several overlapping attempts exactly one wins.
    pub async fn create_booking(
        &self,
        principal: &Principal,
        court_number: u32,
        slot: TimeSlot,
    ) -> Result<Booking, EngineError> {
        if court_number == 0 {
            return Err(ValidationError::InvalidCourtNumber.into());
        }
        let court = self.registry.get(court_number)?;
        if !court.active {
            return Err(EngineError::Inactive(court_number));
        }

        let key = SheetKey {
            court_id: court.id,
            day: slot.day(),
        };
        let mut guard = self.store.sheet(key).write_owned().await;

        if let Err(e) = check_no_conflict(&guard, &slot.span()) {
            metrics::counter!(crate::observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            debug!(court = court_number, "booking rejected: {e}");
            return Err(e);
        }

        let now = now_ms();
        let booking = Booking {
            id: Ulid::new(),
            user_id: principal.user_id,
            court_id: court.id,
            court_number,
            slot,
            status: BookingStatus::Active,
            notification_sent: false,
            created_at: now,
            updated_at: now,
            recipient: principal.email.clone(),
        };
        let event = Event::BookingCreated {
            booking: booking.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(crate::observability::BOOKINGS_CREATED_TOTAL).increment(1);
        info!(
            booking = %booking.id,
            court = court_number,
            date = %slot.date_string(),
            "booked {}-{}",
            slot.start_string(),
            slot.end_string()
        );
        Ok(booking)
    }

    /// Cancel an active booking. Owner or admin only.
    pub async fn cancel_booking(&self, id: Ulid, principal: &Principal) -> Result<(), EngineError> {
        let booking = self.store.get_booking(&id).ok_or(EngineError::NotFound(id))?;
        if !booking.may_be_cancelled_by(principal) {
            return Err(EngineError::Forbidden(id));
        }

        let (mut guard, current) = self.resolve_booking_write(&id).await?;
        if current.status.is_terminal() {
            return Err(EngineError::AlreadyTerminal {
                id,
                status: current.status,
            });
        }

        let event = Event::BookingCancelled { id, at: now_ms() };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        info!(booking = %id, by = %principal.user_id, "booking cancelled");
        Ok(())
    }

    /// Move an active booking whose slot ended before `now` to `completed`.
    /// Returns false when there is nothing to do.
    pub async fn complete_booking(&self, id: Ulid, now: Ms) -> Result<bool, EngineError> {
        let (mut guard, current) = self.resolve_booking_write(&id).await?;
        if !current.is_active() || current.slot.end() >= now {
            return Ok(false);
        }
        let event = Event::BookingCompleted { id, at: now };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(true)
    }

    /// Record that a reminder went out. Returns false if the booking is no longer
    /// active or was already marked.
    pub async fn mark_reminder_sent(&self, id: Ulid, now: Ms) -> Result<bool, EngineError> {
        let (mut guard, current) = self.resolve_booking_write(&id).await?;
        if !current.is_active() || current.notification_sent {
            return Ok(false);
        }
        let event = Event::ReminderSent { id, at: now };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(true)
    }

    /// Lookup booking → sheet, acquire its write lock, then re-read the booking.
    async fn resolve_booking_write(
        &self,
        id: &Ulid,
    ) -> Result<(OwnedRwLockWriteGuard<DaySheet>, Booking), EngineError> {
        let key = self
            .store
            .get_booking(id)
            .ok_or(EngineError::NotFound(*id))?
            .sheet_key();
        let guard = self.store.sheet(key).write_owned().await;
        let current = self.store.get_booking(id).ok_or(EngineError::NotFound(*id))?;
        Ok((guard, current))
    }
}
