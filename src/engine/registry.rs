use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::info;
use ulid::Ulid;

use crate::model::*;
use crate::slot::ValidationError;

use super::{Engine, EngineError};

/// The fixed catalog of courts.
///
/// Reads are lock-free lookups. Writes are rare and serialized by `write_lock`, which
/// never interacts with booking sheets: deactivating a court only blocks future bookings.
pub struct CourtRegistry {
    courts: DashMap<u32, Court>,
    numbers: DashMap<Ulid, u32>,
    pub(super) write_lock: Mutex<()>,
}

impl Default for CourtRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CourtRegistry {
    pub fn new() -> Self {
        Self {
            courts: DashMap::new(),
            numbers: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn get(&self, number: u32) -> Result<Court, EngineError> {
        self.courts
            .get(&number)
            .map(|e| e.value().clone())
            .ok_or(EngineError::CourtNotFound(number))
    }

    pub fn get_by_id(&self, id: &Ulid) -> Result<Court, EngineError> {
        let number = self
            .numbers
            .get(id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(*id))?;
        self.get(number)
    }

    /// False for unknown courts.
    pub fn is_active(&self, number: u32) -> bool {
        self.courts.get(&number).is_some_and(|c| c.active)
    }

    pub fn list(&self) -> Vec<Court> {
        let mut courts: Vec<Court> = self.courts.iter().map(|e| e.value().clone()).collect();
        courts.sort_by_key(|c| c.number);
        courts
    }

    pub fn list_active(&self) -> Vec<Court> {
        let mut courts = self.list();
        courts.retain(|c| c.active);
        courts
    }

    pub fn len(&self) -> usize {
        self.courts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.courts.is_empty()
    }

    pub(super) fn apply_event(&self, event: &Event) {
        match event {
            Event::CourtProvisioned {
                id,
                number,
                name,
                location,
                active,
            } => {
                self.courts.insert(
                    *number,
                    Court {
                        id: *id,
                        number: *number,
                        name: name.clone(),
                        location: location.clone(),
                        active: *active,
                    },
                );
                self.numbers.insert(*id, *number);
            }
            Event::CourtStatusChanged { id, active } => {
                if let Some(number) = self.numbers.get(id).map(|e| *e.value())
                    && let Some(mut court) = self.courts.get_mut(&number)
                {
                    court.active = *active;
                }
            }
            _ => {}
        }
    }
}

impl Engine {
    pub fn registry(&self) -> &CourtRegistry {
        &self.registry
    }

    /// Every court, active or not, by number.
    pub fn list_courts(&self) -> Vec<Court> {
        self.registry.list()
    }

    /// Add a court to the catalog. New courts start active.
    pub async fn provision_court(
        &self,
        number: u32,
        name: impl Into<String>,
        location: Option<String>,
    ) -> Result<Court, EngineError> {
        if number == 0 {
            return Err(ValidationError::InvalidCourtNumber.into());
        }
        let _write = self.registry.write_lock.lock().await;
        if self.registry.get(number).is_ok() {
            return Err(EngineError::AlreadyExists(number));
        }

        let id = Ulid::new();
        let event = Event::CourtProvisioned {
            id,
            number,
            name: name.into(),
            location,
            active: true,
        };
        self.persist_court_event(&event).await?;
        info!(court = number, %id, "court provisioned");
        self.registry.get(number)
    }

    /// Toggle a court's active flag. Admin only; setting the current value is a no-op.
    pub async fn set_court_active(
        &self,
        principal: &Principal,
        court_id: Ulid,
        active: bool,
    ) -> Result<Court, EngineError> {
        if !principal.is_admin() {
            return Err(EngineError::Forbidden(court_id));
        }
        let _write = self.registry.write_lock.lock().await;
        let court = self.registry.get_by_id(&court_id)?;
        if court.active == active {
            return Ok(court);
        }

        let event = Event::CourtStatusChanged { id: court_id, active };
        self.persist_court_event(&event).await?;
        info!(court = court.number, active, "court status changed");
        self.registry.get(court.number)
    }
}
