use crate::model::*;

use super::EngineError;

pub fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// Fails with the first active reservation on the sheet that overlaps `span`.
pub(crate) fn check_no_conflict(sheet: &DaySheet, span: &Span) -> Result<(), EngineError> {
    match sheet.overlapping(span).next() {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}
