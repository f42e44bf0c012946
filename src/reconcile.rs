//! Resolves per report sensor descriptors to persistent sensor identities.
//!
//! Lookups and inserts of concurrent reconciliations are not serialized by the daemon.
//! When two reports race to create the same sensor, the unique constraint of the store lets
//! exactly one insert through and the loser continues with the row of the winner.
use std::collections::BTreeMap;

use crate::error::{IngestError, StoreError};
use crate::record::{SensorDescriptor, SensorIdentity};
use crate::store::{Deadline, SensorStore};

#[derive(Debug, Default)]
/// Result of reconciling the sensors of one report.
pub struct Reconciliation
{
    /// Resolved identities keyed by remote identifier.
    pub resolved: BTreeMap<String, SensorIdentity>,
    /// Entries that could not be resolved.
    pub failures: Vec<(String, IngestError)>,
}

/// Resolves every descriptor of `descriptors` for `station_id`.
///
/// Entries are independent: a failing entry is recorded in [`Reconciliation::failures`]
/// and the remaining entries are still processed.
pub fn reconcile<S: SensorStore>(store: &mut S,
                                 station_id: &str,
                                 descriptors: &BTreeMap<String, SensorDescriptor>,
                                 deadline: &Deadline) -> Reconciliation
{
    let mut reconciliation = Reconciliation::default();

    for (remote_id, descriptor) in descriptors {
        match resolve(store, station_id, remote_id, descriptor, deadline) {
            Ok(identity) => {
                reconciliation.resolved.insert(remote_id.clone(), identity);
            }
            Err(err) => {
                log::warn!(target: "wxlogd::reconcile", "Could not resolve sensor: \'{}\'", err);
                reconciliation.failures.push((remote_id.clone(), err));
            }
        }
    }

    reconciliation
}

/// Creates or refreshes the identity of a single remote identifier.
pub fn resolve<S: SensorStore>(store: &mut S,
                               station_id: &str,
                               remote_id: &str,
                               descriptor: &SensorDescriptor,
                               deadline: &Deadline) -> Result<SensorIdentity, IngestError>
{
    let existing = store.find_sensor(station_id, remote_id, deadline)
        .map_err(|err| IngestError::persistence("lookup", station_id, remote_id, err))?;

    if let Some(existing) = existing {
        return update(store, &existing, descriptor, deadline);
    }

    match store.insert_sensor(station_id, remote_id, descriptor, deadline) {
        Ok(created) => {
            log::info!(target: "wxlogd::reconcile", "Created sensor {} for \'{}\' of station \'{}\'",
                       created.id, remote_id, station_id);
            Ok(created)
        }
        Err(StoreError::UniqueViolation) => {
            log::debug!(target: "wxlogd::reconcile", "Sensor \'{}\' of station \'{}\' was created concurrently",
                        remote_id, station_id);
            let winner = store.find_sensor(station_id, remote_id, deadline)
                .and_then(|found| found.ok_or(StoreError::Missing))
                .map_err(|err| IngestError::persistence("lookup after conflict", station_id, remote_id, err))?;
            update(store, &winner, descriptor, deadline)
        }
        Err(err) => Err(IngestError::persistence("insert", station_id, remote_id, err)),
    }
}

fn update<S: SensorStore>(store: &mut S,
                          existing: &SensorIdentity,
                          descriptor: &SensorDescriptor,
                          deadline: &Deadline) -> Result<SensorIdentity, IngestError>
{
    store.update_sensor(existing, descriptor, deadline)
        .map_err(|err| IngestError::persistence("update", &existing.station_id, &existing.remote_id, err))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::store::memory::MemoryStore;

    fn deadline() -> Deadline {
        Deadline::after(Duration::from_secs(30))
    }

    fn descriptor(location: &str, name: &str, battery: i32) -> SensorDescriptor {
        SensorDescriptor {
            kind: "temperature".to_string(),
            location: location.to_string(),
            name: name.to_string(),
            model: "WH32".to_string(),
            battery,
            signal: 4,
            enabled: true,
        }
    }

    fn batch(remote_ids: &[&str]) -> BTreeMap<String, SensorDescriptor> {
        remote_ids.iter().map(|id| (id.to_string(), descriptor("outdoor", id, 5))).collect()
    }

    #[test]
    fn test_creates_unknown_sensors() {
        let mut store = MemoryStore::new();
        let result = reconcile(&mut store, "station-a", &batch(&["ch1", "ch2"]), &deadline());

        assert!(result.failures.is_empty());
        assert_eq!(result.resolved.len(), 2);
        assert_eq!(result.resolved["ch1"].station_id, "station-a");
        assert_eq!(result.resolved["ch1"].remote_id, "ch1");
        assert_ne!(result.resolved["ch1"].id, result.resolved["ch2"].id);
        assert_eq!(store.sensors().len(), 2);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut store = MemoryStore::new();
        let sensors = batch(&["ch1", "ch2", "ch3"]);

        let first = reconcile(&mut store, "station-a", &sensors, &deadline());
        let second = reconcile(&mut store, "station-a", &sensors, &deadline());

        let ids = |r: &Reconciliation| r.resolved.iter().map(|(k, v)| (k.clone(), v.id)).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(store.sensors().len(), 3);
    }

    #[test]
    fn test_remote_ids_are_scoped_to_station() {
        let mut store = MemoryStore::new();
        let sensors = batch(&["ch1"]);

        let a = reconcile(&mut store, "station-a", &sensors, &deadline());
        let b = reconcile(&mut store, "station-b", &sensors, &deadline());

        assert_ne!(a.resolved["ch1"].id, b.resolved["ch1"].id);
        assert_eq!(store.sensors().len(), 2);
    }

    #[test]
    fn test_update_preserves_identity() {
        let mut store = MemoryStore::new();
        let mut sensors = batch(&["ch1"]);
        let created = reconcile(&mut store, "station-a", &sensors, &deadline()).resolved["ch1"].clone();

        sensors.insert("ch1".to_string(), descriptor("greenhouse", "Greenhouse", 1));
        let updated = reconcile(&mut store, "station-a", &sensors, &deadline()).resolved["ch1"].clone();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.remote_id, "ch1");
        assert_eq!(updated.station_id, "station-a");
        assert_eq!(updated.location, "greenhouse");
        assert_eq!(updated.name, "Greenhouse");
        assert_eq!(updated.battery, 1);
        assert_eq!(store.sensors(), vec![updated]);
    }

    #[test]
    fn test_batch_partial_failure() {
        let mut store = MemoryStore::new().failing_for("ch2");
        let result = reconcile(&mut store, "station-a", &batch(&["ch1", "ch2", "ch3"]), &deadline());

        assert_eq!(result.resolved.len(), 2);
        assert!(result.resolved.contains_key("ch1"));
        assert!(result.resolved.contains_key("ch3"));
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].0, "ch2");
        match &result.failures[0].1 {
            IngestError::Persistence { operation, remote_id, .. } => {
                assert_eq!(*operation, "lookup");
                assert_eq!(remote_id, "ch2");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(store.sensors().len(), 2);
    }

    #[test]
    fn test_expired_deadline_fails_every_entry() {
        let mut store = MemoryStore::new();
        let result = reconcile(&mut store, "station-a", &batch(&["ch1", "ch2"]), &Deadline::after(Duration::from_secs(0)));

        assert!(result.resolved.is_empty());
        assert_eq!(result.failures.len(), 2);
        assert!(store.sensors().is_empty());
    }

    #[test]
    fn test_concurrent_distinct_sensors() {
        let store = MemoryStore::new();
        let count = 16;

        let handles: Vec<_> = (0..count)
            .map(|n| {
                let mut store = store.clone();
                thread::spawn(move || {
                    let remote_id = format!("ch{}", n);
                    let sensors = batch(&[remote_id.as_str()]);
                    reconcile(&mut store, "station-a", &sensors, &deadline())
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            let result = handle.join().unwrap();
            assert!(result.failures.is_empty());
            ids.extend(result.resolved.values().map(|s| s.id));
        }

        assert_eq!(ids.len(), count);
        let rows = store.sensors();
        assert_eq!(rows.len(), count);
        let remote_ids: HashSet<_> = rows.iter().map(|s| s.remote_id.clone()).collect();
        assert_eq!(remote_ids.len(), count);
    }

    #[test]
    fn test_create_race_recovers() {
        let barrier = Arc::new(Barrier::new(2));
        let store = MemoryStore::new().racing(barrier);

        let handles: Vec<_> = ["Sensor A", "Sensor B"].iter()
            .map(|name| {
                let mut store = store.clone();
                let mut sensors = BTreeMap::new();
                sensors.insert("ch1".to_string(), descriptor("outdoor", name, 5));
                thread::spawn(move || reconcile(&mut store, "station-a", &sensors, &deadline()))
            })
            .collect();

        let results: Vec<Reconciliation> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let rows = store.sensors();
        assert_eq!(rows.len(), 1);
        assert_eq!(store.conflicts(), 1);
        for result in &results {
            assert!(result.failures.is_empty(), "{:?}", result.failures);
            assert_eq!(result.resolved["ch1"].id, rows[0].id);
        }
    }

    #[test]
    fn test_conflict_without_row_fails_entry() {
        let mut store = MemoryStore::new().phantom_conflict_for("ch1");
        let result = reconcile(&mut store, "station-a", &batch(&["ch1", "ch2"]), &deadline());

        assert_eq!(store.conflicts(), 1);
        assert!(result.resolved.contains_key("ch2"));
        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].1,
                   IngestError::persistence("lookup after conflict", "station-a", "ch1", StoreError::Missing));
    }

    #[test]
    fn test_insert_failure_fails_entry() {
        let mut store = MemoryStore::new().failing_inserts_for("ch1");
        let result = reconcile(&mut store, "station-a", &batch(&["ch1", "ch2"]), &deadline());

        assert_eq!(store.conflicts(), 0);
        assert_eq!(result.resolved.keys().collect::<Vec<_>>(), vec!["ch2"]);
        match &result.failures[..] {
            [(remote_id, IngestError::Persistence { operation, source, .. })] => {
                assert_eq!(remote_id, "ch1");
                assert_eq!(*operation, "insert");
                assert!(matches!(source, StoreError::Backend(_)));
            }
            other => panic!("unexpected failures {:?}", other),
        }
        assert_eq!(store.sensors().len(), 1);
    }
}
