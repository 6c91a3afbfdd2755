use chrono::NaiveDate;
use futures::future::join_all;
use ulid::Ulid;

use crate::model::*;
use crate::slot::{TimeSlot, day_span};

use super::availability::free_windows;
use super::{Engine, EngineError};

impl Engine {
    pub fn get_booking(&self, id: &Ulid) -> Result<Booking, EngineError> {
        self.store.get_booking(id).ok_or(EngineError::NotFound(*id))
    }

    /// True iff no active booking on this court and day overlaps `slot`.
    pub async fn is_available(&self, court_number: u32, slot: &TimeSlot) -> Result<bool, EngineError> {
        let court = self.registry.get(court_number)?;
        Ok(self.court_is_free(court.id, slot).await)
    }

    async fn court_is_free(&self, court_id: Ulid, slot: &TimeSlot) -> bool {
        let key = SheetKey {
            court_id,
            day: slot.day(),
        };
        match self.store.existing_sheet(&key) {
            Some(sheet) => sheet.read().await.overlapping(&slot.span()).next().is_none(),
            None => true,
        }
    }

    /// Availability of every active court for `slot`, in court-number order.
    /// Each court is checked concurrently; the checks share nothing.
    pub async fn list_availability(&self, slot: &TimeSlot) -> Vec<CourtAvailability> {
        let courts = self.registry.list_active();
        let checks = courts.iter().map(|court| async move {
            CourtAvailability {
                court_number: court.number,
                is_available: self.court_is_free(court.id, slot).await,
            }
        });
        join_all(checks).await
    }

    /// A user's bookings. All of them newest first, or only the upcoming ones soonest first:
    /// active, and not ended before `now`.
    pub fn list_bookings_for_user(&self, user_id: &Ulid, active_only: bool, now: Ms) -> Vec<Booking> {
        let mut bookings = self.store.bookings_for_user(user_id);
        if active_only {
            // The sweeper completes ended bookings on its next pass; until then they still count as active.
            bookings.retain(|b| b.is_active() && b.slot.end() >= now);
            bookings.sort_by_key(|b| (b.slot.start(), b.slot.end()));
        } else {
            bookings.sort_by_key(|b| std::cmp::Reverse((b.slot.start(), b.slot.end())));
        }
        bookings
    }

    /// Every booking, newest first. Admin only.
    pub fn list_all_bookings(&self, principal: &Principal) -> Result<Vec<Booking>, EngineError> {
        if !principal.is_admin() {
            return Err(EngineError::Forbidden(principal.user_id));
        }
        let mut bookings = self.store.all_bookings();
        bookings.sort_by_key(|b| std::cmp::Reverse((b.slot.start(), b.slot.end())));
        Ok(bookings)
    }

    /// The parts of `day` on court `court_number` not held by an active booking.
    pub async fn free_windows(&self, court_number: u32, day: NaiveDate) -> Result<Vec<Span>, EngineError> {
        let court = self.registry.get(court_number)?;
        let whole_day = day_span(day);
        let key = SheetKey {
            court_id: court.id,
            day,
        };
        match self.store.existing_sheet(&key) {
            Some(sheet) => Ok(free_windows(whole_day, &*sheet.read().await)),
            None => Ok(vec![whole_day]),
        }
    }

    /// Active bookings whose slot ended before `now`, soonest first.
    pub fn collect_ended_bookings(&self, now: Ms) -> Vec<Ulid> {
        let mut ended = self.store.select(|b| b.is_active() && b.slot.end() < now);
        ended.sort_by_key(|b| b.slot.end());
        ended.into_iter().map(|b| b.id).collect()
    }

    /// Active, not-yet-reminded bookings with a recipient whose start minute lies in
    /// `[minute(now), minute(now) + window]`. Bookings that already started are not
    /// candidates, so a failed reminder is retried only until its slot begins.
    pub fn collect_reminder_candidates(&self, now: Ms, window: Ms) -> Vec<Booking> {
        let from = floor_minute(now);
        let until = from + window;
        let mut due = self.store.select(|b| {
            let start = floor_minute(b.slot.start());
            b.is_active()
                && !b.notification_sent
                && b.recipient.is_some()
                && start >= from
                && start <= until
        });
        due.sort_by_key(|b| b.slot.start());
        due
    }

    pub fn active_booking_count(&self) -> usize {
        self.store.count(|b| b.is_active())
    }
}
