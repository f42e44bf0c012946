//! Persistence seams of the ingest path.
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::record::{SensorDescriptor, SensorIdentity, SensorReading};

#[derive(Debug, Clone, Copy)]
/// Point in time after which no storage call may be issued for a report.
pub struct Deadline
{
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Deadline {
        Deadline { at: Instant::now() + budget }
    }

    /// Time left, or [`StoreError::DeadlineExceeded`] once the deadline passed.
    pub fn remaining(&self) -> Result<Duration, StoreError> {
        let now = Instant::now();
        if now >= self.at {
            return Err(StoreError::DeadlineExceeded);
        }
        Ok(self.at - now)
    }
}

/// Storage of sensor identities.
///
/// Implementations must reject a second row for the same station and remote identifier
/// with [`StoreError::UniqueViolation`].
pub trait SensorStore
{
    /// Checks that the backend is usable before any other call of a report is issued.
    fn ping(&mut self, deadline: &Deadline) -> Result<(), StoreError>;

    fn find_sensor(&mut self, station_id: &str, remote_id: &str, deadline: &Deadline)
        -> Result<Option<SensorIdentity>, StoreError>;

    fn insert_sensor(&mut self, station_id: &str, remote_id: &str, descriptor: &SensorDescriptor, deadline: &Deadline)
        -> Result<SensorIdentity, StoreError>;

    /// Overwrites the mutable attributes of `existing`.
    fn update_sensor(&mut self, existing: &SensorIdentity, descriptor: &SensorDescriptor, deadline: &Deadline)
        -> Result<SensorIdentity, StoreError>;
}

/// Insert only storage of sensor readings.
pub trait ReadingStore
{
    fn append(&mut self, sensor: &SensorIdentity, value: f64, observed_at: DateTime<Utc>, deadline: &Deadline)
        -> Result<SensorReading, StoreError>;
}
