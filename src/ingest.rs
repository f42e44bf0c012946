//! Processing of a single station report, from dispatch to stored readings.
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapter::{FieldPolicy, Params};
use crate::error::IngestError;
use crate::reconcile::reconcile;
use crate::registry::AdapterRegistry;
use crate::store::{Deadline, ReadingStore, SensorStore};

#[derive(Serialize, Deserialize, Debug, Clone)]
/// Parameters of the ingest workers.
pub struct IngestParameters
{
    /// Number of worker threads, each with its own database connection.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Time budget for all storage calls of a single report.
    #[serde(default = "default_report_deadline_ms")]
    pub report_deadline_ms: u64,
    /// Upper bound for the backend health check.
    #[serde(default = "default_health_check_timeout_ms")]
    pub health_check_timeout_ms: u64,
    /// Handling of malformed report fields.
    #[serde(default)]
    pub field_policy: FieldPolicy,
}

fn default_workers() -> usize {
    4
}

fn default_report_deadline_ms() -> u64 {
    5000
}

fn default_health_check_timeout_ms() -> u64 {
    500
}

impl Default for IngestParameters {
    fn default() -> Self {
        IngestParameters {
            workers: default_workers(),
            report_deadline_ms: default_report_deadline_ms(),
            health_check_timeout_ms: default_health_check_timeout_ms(),
            field_policy: FieldPolicy::default(),
        }
    }
}

impl IngestParameters {
    pub fn report_deadline(&self) -> Duration {
        Duration::from_millis(self.report_deadline_ms)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A report as handed over by the intake transport.
pub struct Report
{
    /// Station type of the route the report arrived on.
    pub station_type: String,
    pub params: Params,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
/// Outcome of an ingested report.
pub struct IngestSummary
{
    pub station: String,
    pub sensors_resolved: usize,
    pub readings_written: usize,
    /// Remote identifiers whose sensor or readings could not be stored.
    pub failures: Vec<(String, IngestError)>,
}

/// Ingests `report` into `store`.
///
/// Report level problems (unknown station type, rejected fields, unusable backend) fail the
/// whole report. Problems with single sensors are collected in the summary while the other
/// sensors of the report are still stored.
pub fn ingest<S>(store: &mut S,
                 registry: &AdapterRegistry,
                 report: &Report,
                 settings: &IngestParameters) -> Result<IngestSummary, IngestError>
    where S: SensorStore + ReadingStore
{
    let deadline = Deadline::after(settings.report_deadline());

    let adapter = registry.lookup(&report.station_type)?;
    let parsed = adapter.parse(&report.params)?;

    let station = parsed.station.auth_token.as_str();
    if station.is_empty() {
        return Err(IngestError::UnidentifiedStation);
    }

    store.ping(&deadline)
        .map_err(|source| IngestError::BackendUnavailable { station: station.to_string(), source })?;

    let reconciliation = reconcile(store, station, &parsed.sensors, &deadline);

    let observed_at = parsed.observation.timestamp.unwrap_or(report.received_at);
    let mut summary = IngestSummary {
        station: station.to_string(),
        sensors_resolved: reconciliation.resolved.len(),
        readings_written: 0,
        failures: reconciliation.failures,
    };

    for measurement in &parsed.measurements {
        let sensor = match reconciliation.resolved.get(&measurement.remote_id) {
            Some(sensor) => sensor,
            None => continue,
        };
        match store.append(sensor, measurement.value, observed_at, &deadline) {
            Ok(_) => summary.readings_written += 1,
            Err(err) => {
                let err = IngestError::persistence("append", station, &measurement.remote_id, err);
                log::warn!(target: "wxlogd::ingest", "Could not store reading: \'{}\'", err);
                summary.failures.push((measurement.remote_id.clone(), err));
            }
        }
    }

    log::info!(target: "wxlogd::ingest", "Stored {} readings of {} sensors for station \'{}\' ({} failures)",
               summary.readings_written, summary.sensors_resolved, summary.station, summary.failures.len());

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::adapter::{Ecowitt, Wunderground};
    use crate::error::StoreError;
    use crate::store::memory::MemoryStore;

    fn registry() -> AdapterRegistry {
        AdapterRegistry::builder()
            .register(Ecowitt::default())
            .register(Wunderground::default())
            .freeze()
    }

    fn report(station_type: &str, form: &str) -> Report {
        Report {
            station_type: station_type.to_string(),
            params: Params::from_form(form),
            received_at: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
        }
    }

    const ECOWITT: &str = "PASSKEY=B3A1F0C2D4&model=GW2000A&dateutc=2024-01-15+10:30:00&tempf=32&humidity=80&windspeedmph=10";

    #[test]
    fn test_ingest_report() {
        let mut store = MemoryStore::new();
        let summary = ingest(&mut store, &registry(), &report("ecowitt", ECOWITT), &IngestParameters::default()).unwrap();

        assert_eq!(summary.station, "B3A1F0C2D4");
        assert_eq!(summary.sensors_resolved, 3);
        assert_eq!(summary.readings_written, 3);
        assert!(summary.failures.is_empty());

        let sensors = store.sensors();
        let wind = sensors.iter().find(|s| s.remote_id == "outdoor.wind_speed").unwrap();
        let readings = store.readings();
        let reading = readings.iter().find(|r| r.sensor_id == wind.id).unwrap();
        assert!((reading.value - 4.4704).abs() < 1e-9);
        assert_eq!(reading.observed_at, Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap());
    }

    #[test]
    fn test_repeated_reports_reuse_sensors() {
        let mut store = MemoryStore::new();
        let registry = registry();
        for _ in 0..3 {
            ingest(&mut store, &registry, &report("ecowitt", ECOWITT), &IngestParameters::default()).unwrap();
        }

        assert_eq!(store.sensors().len(), 3);
        assert_eq!(store.readings().len(), 9);
    }

    #[test]
    fn test_missing_timestamp_uses_receive_time() {
        let mut store = MemoryStore::new();
        ingest(&mut store, &registry(), &report("wunderground", "ID=KCASANFR5&dateutc=now&tempf=50"),
               &IngestParameters::default()).unwrap();

        assert_eq!(store.readings()[0].observed_at, Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_unknown_station_type() {
        let mut store = MemoryStore::new();
        let result = ingest(&mut store, &registry(), &report("davis", ECOWITT), &IngestParameters::default());

        assert_eq!(result.err(), Some(IngestError::UnknownStationType("davis".to_string())));
        assert!(store.sensors().is_empty());
    }

    #[test]
    fn test_unidentified_station() {
        let mut store = MemoryStore::new();
        let result = ingest(&mut store, &registry(), &report("ecowitt", "tempf=32"), &IngestParameters::default());

        assert_eq!(result.err(), Some(IngestError::UnidentifiedStation));
    }

    #[test]
    fn test_strict_policy_rejects_report() {
        let registry = AdapterRegistry::builder().register(Ecowitt::new(FieldPolicy::Strict)).freeze();
        let mut store = MemoryStore::new();
        let result = ingest(&mut store, &registry, &report("ecowitt", "PASSKEY=abc&tempf=hot"), &IngestParameters::default());

        assert!(matches!(result, Err(IngestError::MalformedField { .. })));
        assert!(store.sensors().is_empty());
    }

    #[test]
    fn test_unavailable_backend_fails_fast() {
        let mut store = MemoryStore::new().unavailable();
        let result = ingest(&mut store, &registry(), &report("ecowitt", ECOWITT), &IngestParameters::default());

        let err = result.unwrap_err();
        assert_eq!(err.to_string(),
                   "storage backend not usable for station 'B3A1F0C2D4': storage backend unavailable: connection closed");
        match err {
            IngestError::BackendUnavailable { station, source } => {
                assert_eq!(station, "B3A1F0C2D4");
                assert!(matches!(source, StoreError::Unavailable(_)));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(store.sensors().is_empty());
    }

    #[test]
    fn test_expired_deadline() {
        let mut store = MemoryStore::new();
        let settings = IngestParameters { report_deadline_ms: 0, ..IngestParameters::default() };
        let result = ingest(&mut store, &registry(), &report("ecowitt", ECOWITT), &settings);

        match result {
            Err(IngestError::BackendUnavailable { source, .. }) => assert_eq!(source, StoreError::DeadlineExceeded),
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_failed_sensor_keeps_other_readings() {
        let mut store = MemoryStore::new().failing_for("outdoor.humidity");
        let summary = ingest(&mut store, &registry(), &report("ecowitt", ECOWITT), &IngestParameters::default()).unwrap();

        assert_eq!(summary.sensors_resolved, 2);
        assert_eq!(summary.readings_written, 2);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].0, "outdoor.humidity");
        assert_eq!(store.readings().len(), 2);
    }

    #[test]
    fn test_failed_append_keeps_other_readings() {
        let mut store = MemoryStore::new().failing_appends_for("outdoor.temperature");
        let summary = ingest(&mut store, &registry(), &report("ecowitt", ECOWITT), &IngestParameters::default()).unwrap();

        assert_eq!(summary.sensors_resolved, 3);
        assert_eq!(summary.readings_written, 2);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].0, "outdoor.temperature");
    }
}
