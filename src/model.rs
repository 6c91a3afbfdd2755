use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::slot::TimeSlot;

/// Unix milliseconds. The only instant type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// The one overlap predicate. Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Truncate an instant down to its minute.
pub fn floor_minute(t: Ms) -> Ms {
    t - t.rem_euclid(MINUTE_MS)
}

// ── Courts ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Court {
    pub id: Ulid,
    /// Human-facing number, unique and stable.
    pub number: u32,
    pub name: String,
    pub location: Option<String>,
    pub active: bool,
}

// ── Principals ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// The caller on whose behalf a ledger operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Ulid,
    pub role: Role,
    pub email: Option<String>,
}

impl Principal {
    pub fn user(user_id: Ulid) -> Self {
        Self { user_id, role: Role::User, email: None }
    }

    pub fn admin(user_id: Ulid) -> Self {
        Self { user_id, role: Role::Admin, email: None }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Active,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "active",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Active)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub user_id: Ulid,
    pub court_id: Ulid,
    pub court_number: u32,
    pub slot: TimeSlot,
    pub status: BookingStatus,
    pub notification_sent: bool,
    pub created_at: Ms,
    pub updated_at: Ms,
    /// Where reminders go. Copied from the principal at creation time.
    pub recipient: Option<String>,
}

impl Booking {
    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Active
    }

    pub fn sheet_key(&self) -> SheetKey {
        SheetKey {
            court_id: self.court_id,
            day: self.slot.day(),
        }
    }

    /// Only the owner or an admin may cancel.
    pub fn may_be_cancelled_by(&self, principal: &Principal) -> bool {
        principal.is_admin() || principal.user_id == self.user_id
    }

    pub fn info(&self) -> BookingInfo {
        BookingInfo {
            id: self.id,
            court_number: self.court_number,
            booking_date: self.slot.date_string(),
            start_time: self.slot.start_string(),
            end_time: self.slot.end_string(),
            status: self.status,
            created_at: self.created_at,
        }
    }
}

// ── Day sheets ───────────────────────────────────────────────────

/// Serialization unit for booking creation: one court on one calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SheetKey {
    pub court_id: Ulid,
    pub day: NaiveDate,
}

/// An active booking's footprint on its day sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub id: Ulid,
    pub span: Span,
}

/// Active reservations for one `(court, day)`, sorted by `span.start`.
#[derive(Debug, Clone, Default)]
pub struct DaySheet {
    pub reservations: Vec<Reservation>,
}

impl DaySheet {
    /// Insert reservation maintaining sort order by span.start.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.span.start, |r| r.span.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    /// Return only reservations whose span overlaps the query window.
    /// Uses binary search to skip reservations starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.span.start < query.end);
        let query = *query;
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.span.overlaps(&query))
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }
}

/// Ledger events. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    CourtProvisioned {
        id: Ulid,
        number: u32,
        name: String,
        location: Option<String>,
        active: bool,
    },
    CourtStatusChanged {
        id: Ulid,
        active: bool,
    },
    /// Carries the whole record so compaction can snapshot non-active bookings too.
    BookingCreated {
        booking: Booking,
    },
    BookingCancelled {
        id: Ulid,
        at: Ms,
    },
    BookingCompleted {
        id: Ulid,
        at: Ms,
    },
    ReminderSent {
        id: Ulid,
        at: Ms,
    },
}

// ── Query result types ───────────────────────────────────────────

/// Caller-facing rendering of a booking with echoed date/time strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingInfo {
    pub id: Ulid,
    pub court_number: u32,
    pub booking_date: String,
    pub start_time: String,
    pub end_time: String,
    pub status: BookingStatus,
    pub created_at: Ms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourtAvailability {
    pub court_number: u32,
    pub is_available: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> DaySheet {
        DaySheet::default()
    }

    fn reservation(start: Ms, end: Ms) -> Reservation {
        Reservation {
            id: Ulid::new(),
            span: Span::new(start, end),
        }
    }

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
    }

    #[test]
    fn span_overlap_covers_every_shape() {
        let existing = Span::new(100, 200);
        assert!(existing.overlaps(&Span::new(150, 250))); // starts inside
        assert!(existing.overlaps(&Span::new(50, 150))); // ends inside
        assert!(existing.overlaps(&Span::new(50, 250))); // contains
        assert!(existing.overlaps(&Span::new(120, 180))); // contained
        assert!(!existing.overlaps(&Span::new(200, 300))); // touching
        assert!(!existing.overlaps(&Span::new(0, 100))); // touching
    }

    #[test]
    fn floor_minute_truncates() {
        assert_eq!(floor_minute(0), 0);
        assert_eq!(floor_minute(MINUTE_MS + 59_999), MINUTE_MS);
        assert_eq!(floor_minute(2 * MINUTE_MS), 2 * MINUTE_MS);
    }

    #[test]
    fn sheet_insert_keeps_order() {
        let mut s = sheet();
        s.insert(reservation(300, 400));
        s.insert(reservation(100, 200));
        s.insert(reservation(200, 300));
        let starts: Vec<Ms> = s.reservations.iter().map(|r| r.span.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn sheet_remove() {
        let mut s = sheet();
        let r = reservation(100, 200);
        s.insert(r);
        assert_eq!(s.remove(r.id), Some(r));
        assert!(s.is_empty());
        assert!(s.remove(r.id).is_none());
    }

    #[test]
    fn overlapping_skips_past_and_future() {
        let mut s = sheet();
        s.insert(reservation(100, 200));
        s.insert(reservation(450, 600));
        s.insert(reservation(1000, 1100));

        let hits: Vec<_> = s.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        let mut s = sheet();
        s.insert(reservation(100, 200));
        assert_eq!(s.overlapping(&Span::new(200, 300)).count(), 0);
        assert_eq!(s.overlapping(&Span::new(0, 100)).count(), 0);
    }

    #[test]
    fn overlapping_single_ms() {
        let mut s = sheet();
        s.insert(reservation(100, 201));
        assert_eq!(s.overlapping(&Span::new(200, 300)).count(), 1);
    }

    #[test]
    fn status_terminality() {
        assert!(!BookingStatus::Active.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(BookingStatus::Completed.is_terminal());
        assert_eq!(BookingStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn principal_roles() {
        let u = Principal::user(Ulid::new()).with_email("a@b.c");
        assert!(!u.is_admin());
        assert_eq!(u.email.as_deref(), Some("a@b.c"));
        assert!(Principal::admin(Ulid::new()).is_admin());
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::CourtProvisioned {
            id: Ulid::new(),
            number: 3,
            name: "Court 3".into(),
            location: None,
            active: true,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
