//! Validated booking intervals.
//!
//! [`TimeSlot::parse`] is the only place request strings become instants. Everything
//! downstream consumes an already-validated slot.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::model::{DAY_MS, HOUR_MS, MINUTE_MS, Ms, Span};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

/// Longest booking a single request may hold.
pub const DEFAULT_MAX_DURATION_MS: Ms = 2 * HOUR_MS;

/// Why a date/time request was rejected. Messages are user-facing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid date {0:?}, use YYYY-MM-DD")]
    InvalidDate(String),
    #[error("invalid start time {0:?}, use HH:MM")]
    InvalidStartTime(String),
    #[error("invalid end time {0:?}, use HH:MM")]
    InvalidEndTime(String),
    #[error("booking time must be in the future")]
    InPast,
    #[error("end time must be after start time")]
    EndNotAfterStart,
    #[error("booking duration cannot exceed {max_minutes} minutes")]
    TooLong { max_minutes: Ms },
    #[error("court number must be positive")]
    InvalidCourtNumber,
}

/// `[start, end)` on a single calendar day (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    day: NaiveDate,
    span: Span,
}

impl TimeSlot {
    /// Validate a `YYYY-MM-DD` date and two `HH:MM` times against `now`.
    ///
    /// Rules are checked in order and the first failure wins: date format, time
    /// formats, start in the future, end after start, duration within `max_duration`.
    /// Composing a time of day onto the date keeps both instants on that day.
    pub fn parse(
        date: &str,
        start: &str,
        end: &str,
        now: Ms,
        max_duration: Ms,
    ) -> Result<Self, ValidationError> {
        let day = NaiveDate::parse_from_str(date.trim(), DATE_FORMAT)
            .map_err(|_| ValidationError::InvalidDate(date.to_string()))?;
        let start_time = NaiveTime::parse_from_str(start.trim(), TIME_FORMAT)
            .map_err(|_| ValidationError::InvalidStartTime(start.to_string()))?;
        let end_time = NaiveTime::parse_from_str(end.trim(), TIME_FORMAT)
            .map_err(|_| ValidationError::InvalidEndTime(end.to_string()))?;

        let start_ms = compose(day, start_time);
        let end_ms = compose(day, end_time);

        if start_ms <= now {
            return Err(ValidationError::InPast);
        }
        if end_ms <= start_ms {
            return Err(ValidationError::EndNotAfterStart);
        }
        if end_ms - start_ms > max_duration {
            return Err(ValidationError::TooLong {
                max_minutes: max_duration / MINUTE_MS,
            });
        }

        Ok(Self {
            day,
            span: Span::new(start_ms, end_ms),
        })
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn start(&self) -> Ms {
        self.span.start
    }

    pub fn end(&self) -> Ms {
        self.span.end
    }

    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.day == other.day && self.span.overlaps(&other.span)
    }

    pub fn date_string(&self) -> String {
        self.day.format(DATE_FORMAT).to_string()
    }

    pub fn start_string(&self) -> String {
        hh_mm(self.span.start - day_start(self.day))
    }

    pub fn end_string(&self) -> String {
        hh_mm(self.span.end - day_start(self.day))
    }
}

/// Midnight UTC of `day`, in ms.
pub fn day_start(day: NaiveDate) -> Ms {
    compose(day, NaiveTime::MIN)
}

/// The whole of `day` as a span.
pub fn day_span(day: NaiveDate) -> Span {
    let start = day_start(day);
    Span::new(start, start + DAY_MS)
}

fn compose(day: NaiveDate, time: NaiveTime) -> Ms {
    day.and_time(time).and_utc().timestamp_millis()
}

fn hh_mm(offset: Ms) -> String {
    let minutes = offset / MINUTE_MS;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATE: &str = "2030-06-01";

    /// 08:00 on DATE.
    fn morning() -> Ms {
        day_start(NaiveDate::from_ymd_opt(2030, 6, 1).unwrap()) + 8 * HOUR_MS
    }

    fn parse(date: &str, start: &str, end: &str) -> Result<TimeSlot, ValidationError> {
        TimeSlot::parse(date, start, end, morning(), DEFAULT_MAX_DURATION_MS)
    }

    #[test]
    fn valid_slot() {
        let slot = parse(DATE, "10:00", "11:30").unwrap();
        assert_eq!(slot.day(), NaiveDate::from_ymd_opt(2030, 6, 1).unwrap());
        assert_eq!(slot.span().duration_ms(), 90 * MINUTE_MS);
        assert_eq!(slot.start(), morning() + 2 * HOUR_MS);
        assert_eq!(slot.date_string(), DATE);
        assert_eq!(slot.start_string(), "10:00");
        assert_eq!(slot.end_string(), "11:30");
    }

    #[test]
    fn bad_date() {
        assert_eq!(
            parse("2030-13-01", "10:00", "11:00"),
            Err(ValidationError::InvalidDate("2030-13-01".into()))
        );
        assert!(matches!(parse("01/06/2030", "10:00", "11:00"), Err(ValidationError::InvalidDate(_))));
    }

    #[test]
    fn bad_times() {
        assert!(matches!(parse(DATE, "25:00", "11:00"), Err(ValidationError::InvalidStartTime(_))));
        assert!(matches!(parse(DATE, "10:00", "1100"), Err(ValidationError::InvalidEndTime(_))));
    }

    #[test]
    fn date_checked_before_times() {
        assert!(matches!(parse("nope", "nope", "nope"), Err(ValidationError::InvalidDate(_))));
    }

    #[test]
    fn past_start_rejected() {
        assert_eq!(parse(DATE, "07:00", "08:30"), Err(ValidationError::InPast));
        // exactly now is not the future
        assert_eq!(parse(DATE, "08:00", "09:00"), Err(ValidationError::InPast));
    }

    #[test]
    fn past_checked_before_ordering() {
        assert_eq!(parse(DATE, "07:00", "06:00"), Err(ValidationError::InPast));
    }

    #[test]
    fn end_must_follow_start() {
        assert_eq!(parse(DATE, "11:00", "10:00"), Err(ValidationError::EndNotAfterStart));
        assert_eq!(parse(DATE, "11:00", "11:00"), Err(ValidationError::EndNotAfterStart));
    }

    #[test]
    fn two_hours_is_the_limit() {
        assert!(parse(DATE, "10:00", "12:00").is_ok());
        assert_eq!(
            parse(DATE, "10:00", "12:01"),
            Err(ValidationError::TooLong { max_minutes: 120 })
        );
    }

    #[test]
    fn three_hours_from_five_minutes_out_is_too_long() {
        let now = morning() + 3 * MINUTE_MS; // 08:03
        let result = TimeSlot::parse(DATE, "08:08", "11:08", now, DEFAULT_MAX_DURATION_MS);
        assert_eq!(result, Err(ValidationError::TooLong { max_minutes: 120 }));
    }

    #[test]
    fn slots_on_different_days_never_overlap() {
        let a = parse(DATE, "10:00", "11:00").unwrap();
        let b = parse("2030-06-02", "10:00", "11:00").unwrap();
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&parse(DATE, "10:30", "11:30").unwrap()));
    }

    #[test]
    fn day_span_is_24_hours() {
        let day = NaiveDate::from_ymd_opt(2030, 6, 1).unwrap();
        assert_eq!(day_span(day).duration_ms(), DAY_MS);
        assert_eq!(day_span(day).start, day_start(day));
    }

    #[test]
    fn error_messages_are_user_facing() {
        assert_eq!(
            ValidationError::TooLong { max_minutes: 120 }.to_string(),
            "booking duration cannot exceed 120 minutes"
        );
        assert_eq!(ValidationError::InPast.to_string(), "booking time must be in the future");
    }
}
