use ulid::Ulid;

use crate::model::BookingStatus;
use crate::slot::ValidationError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("court {0} not found")]
    CourtNotFound(u32),
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("court {0} is not available for booking")]
    Inactive(u32),
    #[error("conflict with booking: {0}")]
    Conflict(Ulid),
    #[error("not permitted: {0}")]
    Forbidden(Ulid),
    #[error("booking {id} is already {status}")]
    AlreadyTerminal { id: Ulid, status: BookingStatus },
    #[error("court {0} already exists")]
    AlreadyExists(u32),
    #[error("WAL error: {0}")]
    WalError(String),
}
