//! Module that contains all record types for this application.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
/// Description of the reporting station, rebuilt from every report.
pub struct StationDescriptor
{
    /// Vendor authentication token. Sensor rows are bound to this value.
    pub auth_token: String,
    /// Station type as declared by the firmware.
    pub station_type: String,
    /// Hardware model.
    pub model: String,
    /// Radio frequency band, e.g. `868M`.
    pub frequency: String,
    /// Reporting interval in seconds.
    pub interval: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
/// Unit normalized observation of a single report.
///
/// Every convertible quantity is kept in the vendor unit and in its SI counterpart.
/// Fields missing from the report are zero.
pub struct CanonicalObservation
{
    /// Time of observation, `None` if the report carried no parseable timestamp.
    pub timestamp: Option<DateTime<Utc>>,
    /// Station uptime in seconds.
    pub runtime: i64,
    /// Free heap memory of the station in bytes.
    pub heap: i64,

    pub indoor_temp_f: f64,
    pub indoor_temp_c: f64,
    pub indoor_humidity: f64,
    pub outdoor_temp_f: f64,
    pub outdoor_temp_c: f64,
    pub outdoor_humidity: f64,
    pub dew_point_f: f64,
    pub dew_point_c: f64,

    pub pressure_relative_inhg: f64,
    pub pressure_relative_hpa: f64,
    pub pressure_absolute_inhg: f64,
    pub pressure_absolute_hpa: f64,

    /// Wind direction in degrees.
    pub wind_direction: f64,
    pub wind_speed_mph: f64,
    pub wind_speed_ms: f64,
    pub wind_speed_kmh: f64,
    pub wind_gust_mph: f64,
    pub wind_gust_ms: f64,
    pub wind_gust_kmh: f64,
    pub max_daily_gust_mph: f64,
    pub max_daily_gust_ms: f64,
    pub max_daily_gust_kmh: f64,

    /// Solar radiation in W/m².
    pub solar_radiation: f64,
    pub uv_index: f64,

    pub rain_rate_in: f64,
    pub rain_rate_mm: f64,
    pub rain_event_in: f64,
    pub rain_event_mm: f64,
    pub rain_hourly_in: f64,
    pub rain_hourly_mm: f64,
    pub rain_daily_in: f64,
    pub rain_daily_mm: f64,
    pub rain_weekly_in: f64,
    pub rain_weekly_mm: f64,
    pub rain_monthly_in: f64,
    pub rain_monthly_mm: f64,
    pub rain_yearly_in: f64,
    pub rain_yearly_mm: f64,
    pub rain_total_in: f64,
    pub rain_total_mm: f64,

    /// Vapor pressure deficit as reported by the station.
    pub vapor_pressure_deficit: f64,
    /// Battery flag of the outdoor sensor array, `0` means ok.
    pub battery_status: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
/// Per report description of a single sensor.
pub struct SensorDescriptor
{
    /// Kind of quantity the sensor measures, e.g. `temperature`.
    pub kind: String,
    /// Where the sensor is placed, e.g. `outdoor`.
    pub location: String,
    /// Display name.
    pub name: String,
    pub model: String,
    pub battery: i32,
    pub signal: i32,
    pub enabled: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// Persistent sensor row a remote identifier resolves to.
///
/// `station_id` and `remote_id` never change once the row exists.
pub struct SensorIdentity
{
    pub id: i64,
    pub station_id: String,
    pub remote_id: String,
    pub kind: String,
    pub location: String,
    pub name: String,
    pub model: String,
    pub battery: i32,
    pub signal: i32,
    pub enabled: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
/// A single stored value of a sensor.
pub struct SensorReading
{
    pub sensor_id: i64,
    pub value: f64,
    /// Time the value was observed by the station.
    pub observed_at: DateTime<Utc>,
    /// Time the value was written.
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
/// A value of a report addressed to the sensor that measured it.
pub struct Measurement
{
    pub remote_id: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Output of an adapter for a single report.
pub struct ParsedReport
{
    pub station: StationDescriptor,
    pub observation: CanonicalObservation,
    /// Sensor descriptors keyed by remote identifier.
    pub sensors: BTreeMap<String, SensorDescriptor>,
    pub measurements: Vec<Measurement>,
}
