use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::SharedDaySheet;

/// Booking records plus the indexes every ledger operation reads.
pub struct LedgerStore {
    bookings: DashMap<Ulid, Booking>,
    /// user id → booking ids, in creation order.
    by_user: DashMap<Ulid, Vec<Ulid>>,
    /// Active reservations per `(court, day)`. Sheets are never removed once created,
    /// so every writer for a key contends on the same lock.
    sheets: DashMap<SheetKey, SharedDaySheet>,
}

impl Default for LedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore {
    pub fn new() -> Self {
        Self {
            bookings: DashMap::new(),
            by_user: DashMap::new(),
            sheets: DashMap::new(),
        }
    }

    // ── Bookings ─────────────────────────────────────────────

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub fn get_booking(&self, id: &Ulid) -> Option<Booking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    pub fn bookings_for_user(&self, user_id: &Ulid) -> Vec<Booking> {
        let ids = self
            .by_user
            .get(user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        ids.iter().filter_map(|id| self.get_booking(id)).collect()
    }

    pub fn all_bookings(&self) -> Vec<Booking> {
        self.bookings.iter().map(|e| e.value().clone()).collect()
    }

    /// Clone every booking matching `pred` without holding shard locks across awaits.
    pub fn select(&self, pred: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        self.bookings
            .iter()
            .filter(|e| pred(e.value()))
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Booking) -> bool) -> usize {
        self.bookings.iter().filter(|e| pred(e.value())).count()
    }

    // ── Sheets ───────────────────────────────────────────────

    /// Get the sheet for `key`, creating an empty one on first use.
    pub fn sheet(&self, key: SheetKey) -> SharedDaySheet {
        self.sheets
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(DaySheet::default())))
            .value()
            .clone()
    }

    /// Get the sheet for `key` without creating it. Read paths use this.
    pub fn existing_sheet(&self, key: &SheetKey) -> Option<SharedDaySheet> {
        self.sheets.get(key).map(|e| e.value().clone())
    }

    // ── Event application ────────────────────────────────────

    /// Apply a booking event. `sheet` is the sheet of the booking's key and the
    /// caller holds its write lock. Court events are ignored here.
    pub fn apply_event(&self, sheet: &mut DaySheet, event: &Event) {
        match event {
            Event::BookingCreated { booking } => {
                if booking.is_active() {
                    sheet.insert(Reservation {
                        id: booking.id,
                        span: booking.slot.span(),
                    });
                }
                self.by_user.entry(booking.user_id).or_default().push(booking.id);
                self.bookings.insert(booking.id, booking.clone());
            }
            Event::BookingCancelled { id, at } => {
                self.set_status(id, BookingStatus::Cancelled, *at);
                sheet.remove(*id);
            }
            Event::BookingCompleted { id, at } => {
                self.set_status(id, BookingStatus::Completed, *at);
                sheet.remove(*id);
            }
            Event::ReminderSent { id, at } => {
                if let Some(mut b) = self.bookings.get_mut(id) {
                    b.notification_sent = true;
                    b.updated_at = *at;
                }
            }
            Event::CourtProvisioned { .. } | Event::CourtStatusChanged { .. } => {}
        }
    }

    fn set_status(&self, id: &Ulid, status: BookingStatus, at: Ms) {
        if let Some(mut b) = self.bookings.get_mut(id) {
            b.status = status;
            b.updated_at = at;
        }
    }

    /// Key of the sheet an event touches, if it touches one.
    pub fn event_sheet_key(&self, event: &Event) -> Option<SheetKey> {
        match event {
            Event::BookingCreated { booking } => Some(booking.sheet_key()),
            Event::BookingCancelled { id, .. }
            | Event::BookingCompleted { id, .. }
            | Event::ReminderSent { id, .. } => self.bookings.get(id).map(|b| b.sheet_key()),
            Event::CourtProvisioned { .. } | Event::CourtStatusChanged { .. } => None,
        }
    }
}
