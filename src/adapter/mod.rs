//! Protocol adapters translating vendor upload parameters into the canonical record model.
use std::collections::{BTreeMap, HashMap};
use std::iter::FromIterator;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::IngestError;
use crate::record::{CanonicalObservation, Measurement, ParsedReport, SensorDescriptor};

pub mod ecowitt;
pub mod wunderground;

pub use ecowitt::Ecowitt;
pub use wunderground::Wunderground;

/// Timestamp layouts accepted for `dateutc`, in priority order.
pub const TIMESTAMP_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d+%H:%M:%S"];

/// Capability set of a vendor protocol.
///
/// Implementations must be pure: `parse` may not perform I/O or touch shared state,
/// so that a report can be parsed again with the same result when ingestion is retried.
pub trait ProtocolAdapter: Send + Sync
{
    /// Path the station uploads to.
    fn endpoint_path(&self) -> &str;

    /// Tag the adapter is registered under.
    fn station_type(&self) -> &str;

    /// Translates the upload parameters of a single report.
    fn parse(&self, params: &Params) -> Result<ParsedReport, IngestError>;
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
/// Handling of values that are present but cannot be parsed.
pub enum FieldPolicy
{
    /// Malformed values are read as zero.
    Permissive,
    /// The first malformed value rejects the report.
    Strict,
}

impl Default for FieldPolicy {
    fn default() -> Self {
        FieldPolicy::Permissive
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
/// Unordered multimap of upload parameters.
pub struct Params(HashMap<String, Vec<String>>);

impl Params {
    /// Decodes an `application/x-www-form-urlencoded` query string or body.
    pub fn from_form(form: &str) -> Params {
        url::form_urlencoded::parse(form.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect()
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.0.entry(key.into()).or_insert_with(Vec::new).push(value.into());
    }

    /// First value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|values| values.first()).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::default();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

/// Parses `raw` against `formats` in order, the first layout that matches wins.
pub fn parse_timestamp(raw: &str, formats: &[&str]) -> Option<DateTime<Utc>> {
    formats
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw.trim(), format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Reads typed fields from upload parameters according to a [`FieldPolicy`].
///
/// Missing fields are always zero. Malformed fields are zero under the permissive
/// policy and remembered for [`FieldReader::finish`] under the strict one.
pub struct FieldReader<'a>
{
    params: &'a Params,
    policy: FieldPolicy,
    rejected: Option<IngestError>,
}

impl<'a> FieldReader<'a> {
    pub fn new(params: &'a Params, policy: FieldPolicy) -> FieldReader<'a> {
        FieldReader { params, policy, rejected: None }
    }

    pub fn has(&self, key: &str) -> bool {
        self.params.contains(key)
    }

    pub fn text(&self, key: &str) -> String {
        self.params.get(key).unwrap_or_default().to_string()
    }

    pub fn float(&mut self, key: &str) -> f64 {
        self.float_opt(key).unwrap_or(0.0)
    }

    /// Like [`FieldReader::float`] but `None` for absent or malformed values,
    /// for quantities whose conversion does not map zero to zero.
    pub fn float_opt(&mut self, key: &str) -> Option<f64> {
        let params = self.params;
        let raw = params.get(key)?;
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => Some(value),
            _ => {
                self.reject(key, raw);
                None
            }
        }
    }

    pub fn integer(&mut self, key: &str) -> i64 {
        let params = self.params;
        let raw = match params.get(key) {
            Some(raw) => raw,
            None => return 0,
        };
        match raw.trim().parse::<i64>() {
            Ok(value) => value,
            Err(_) => {
                self.reject(key, raw);
                0
            }
        }
    }

    pub fn timestamp(&mut self, key: &str, formats: &[&str]) -> Option<DateTime<Utc>> {
        let params = self.params;
        let raw = params.get(key)?;
        let parsed = parse_timestamp(raw, formats);
        if parsed.is_none() {
            self.reject(key, raw);
        }
        parsed
    }

    /// Ends reading, failing with the first malformed field under the strict policy.
    pub fn finish(self) -> Result<(), IngestError> {
        match self.rejected {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn reject(&mut self, key: &str, raw: &str) {
        log::debug!(target: "wxlogd::adapter", "Malformed value \'{}\' for field \'{}\'", raw, key);
        if self.policy == FieldPolicy::Strict && self.rejected.is_none() {
            self.rejected = Some(IngestError::MalformedField { key: key.to_string(), value: raw.to_string() });
        }
    }
}

/// A measured quantity of a station that is tracked as its own sensor.
pub struct Channel
{
    /// Remote identifier of the sensor within the station.
    pub remote_id: &'static str,
    /// Upload parameter the channel is read from.
    pub key: &'static str,
    pub kind: &'static str,
    pub location: &'static str,
    pub name: &'static str,
    /// Channel belongs to the outdoor sensor array and reports its battery state.
    pub outdoor_array: bool,
    /// SI value of the channel.
    pub value: fn(&CanonicalObservation) -> f64,
}

/// Builds sensor descriptors and measurements for every channel present in `params`.
pub fn collect_channels(channels: &[Channel],
                        params: &Params,
                        observation: &CanonicalObservation,
                        model: &str,
                        array_battery: i32) -> (BTreeMap<String, SensorDescriptor>, Vec<Measurement>)
{
    let mut sensors = BTreeMap::new();
    let mut measurements = Vec::new();

    for channel in channels.iter().filter(|channel| params.contains(channel.key)) {
        sensors.insert(channel.remote_id.to_string(), SensorDescriptor {
            kind: channel.kind.to_string(),
            location: channel.location.to_string(),
            name: channel.name.to_string(),
            model: model.to_string(),
            battery: if channel.outdoor_array { array_battery } else { 0 },
            signal: 0,
            enabled: true,
        });
        measurements.push(Measurement {
            remote_id: channel.remote_id.to_string(),
            value: (channel.value)(observation),
        });
    }

    (sensors, measurements)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_from_form() {
        let params = Params::from_form("PASSKEY=abc&tempf=71.2&tempf=72.0&model=GW2000A%5FV1");
        assert_eq!(params.get("PASSKEY"), Some("abc"));
        assert_eq!(params.get("tempf"), Some("71.2"));
        assert_eq!(params.get("model"), Some("GW2000A_V1"));
        assert_eq!(params.get("missing"), None);
        assert!(params.contains("tempf"));
        assert!(!params.contains("missing"));
    }

    #[test]
    fn test_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-15 10:30:00", &TIMESTAMP_FORMATS), Some(expected));
        assert_eq!(parse_timestamp("2024-01-15+10:30:00", &TIMESTAMP_FORMATS), Some(expected));
        assert_eq!(parse_timestamp("15.01.2024 10:30", &TIMESTAMP_FORMATS), None);
        assert_eq!(parse_timestamp("", &TIMESTAMP_FORMATS), None);
    }

    #[test]
    fn test_permissive_reader_defaults_to_zero() {
        let params: Params = vec![("tempf", "warm"), ("runtime", "12.5")].into_iter().collect();
        let mut reader = FieldReader::new(&params, FieldPolicy::Permissive);
        assert_eq!(reader.float("tempf"), 0.0);
        assert_eq!(reader.integer("runtime"), 0);
        assert_eq!(reader.float("humidity"), 0.0);
        assert_eq!(reader.text("model"), "");
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_strict_reader_reports_first_malformed_field() {
        let params: Params = vec![("tempf", "warm"), ("humidity", "wet")].into_iter().collect();
        let mut reader = FieldReader::new(&params, FieldPolicy::Strict);
        reader.float("tempf");
        reader.float("humidity");
        reader.float("absent");
        assert_eq!(reader.finish(), Err(IngestError::MalformedField {
            key: "tempf".to_string(),
            value: "warm".to_string(),
        }));
    }
}
