//! Weather Underground personal weather station upload protocol.
use crate::adapter::{collect_channels, Channel, FieldPolicy, FieldReader, Params, ProtocolAdapter, TIMESTAMP_FORMATS};
use crate::error::IngestError;
use crate::record::{CanonicalObservation, ParsedReport, StationDescriptor};
use crate::units::{fahrenheit_to_celsius, inches_to_mm, inhg_to_hpa, mph_to_kmh, mph_to_ms};

static CHANNELS: [Channel; 13] = [
    Channel { remote_id: "indoor.temperature", key: "indoortempf", kind: "temperature", location: "indoor", name: "Indoor temperature", outdoor_array: false, value: |o| o.indoor_temp_c },
    Channel { remote_id: "indoor.humidity", key: "indoorhumidity", kind: "humidity", location: "indoor", name: "Indoor humidity", outdoor_array: false, value: |o| o.indoor_humidity },
    Channel { remote_id: "indoor.pressure_relative", key: "baromin", kind: "pressure", location: "indoor", name: "Relative pressure", outdoor_array: false, value: |o| o.pressure_relative_hpa },
    Channel { remote_id: "outdoor.temperature", key: "tempf", kind: "temperature", location: "outdoor", name: "Outdoor temperature", outdoor_array: true, value: |o| o.outdoor_temp_c },
    Channel { remote_id: "outdoor.humidity", key: "humidity", kind: "humidity", location: "outdoor", name: "Outdoor humidity", outdoor_array: true, value: |o| o.outdoor_humidity },
    Channel { remote_id: "outdoor.dew_point", key: "dewptf", kind: "temperature", location: "outdoor", name: "Dew point", outdoor_array: true, value: |o| o.dew_point_c },
    Channel { remote_id: "outdoor.wind_direction", key: "winddir", kind: "wind_direction", location: "outdoor", name: "Wind direction", outdoor_array: true, value: |o| o.wind_direction },
    Channel { remote_id: "outdoor.wind_speed", key: "windspeedmph", kind: "wind_speed", location: "outdoor", name: "Wind speed", outdoor_array: true, value: |o| o.wind_speed_ms },
    Channel { remote_id: "outdoor.wind_gust", key: "windgustmph", kind: "wind_speed", location: "outdoor", name: "Wind gust", outdoor_array: true, value: |o| o.wind_gust_ms },
    Channel { remote_id: "outdoor.solar_radiation", key: "solarradiation", kind: "solar_radiation", location: "outdoor", name: "Solar radiation", outdoor_array: true, value: |o| o.solar_radiation },
    Channel { remote_id: "outdoor.uv_index", key: "UV", kind: "uv_index", location: "outdoor", name: "UV index", outdoor_array: true, value: |o| o.uv_index },
    Channel { remote_id: "outdoor.rain_hourly", key: "rainin", kind: "rain", location: "outdoor", name: "Hourly rain", outdoor_array: true, value: |o| o.rain_hourly_mm },
    Channel { remote_id: "outdoor.rain_daily", key: "dailyrainin", kind: "rain", location: "outdoor", name: "Daily rain", outdoor_array: true, value: |o| o.rain_daily_mm },
];

#[derive(Debug, Clone, Default)]
/// Adapter for stations uploading with the Weather Underground protocol.
pub struct Wunderground
{
    policy: FieldPolicy,
}

impl Wunderground {
    pub const ENDPOINT_PATH: &'static str = "/weatherstation/updateweatherstation.php";
    pub const STATION_TYPE: &'static str = "wunderground";

    pub fn new(policy: FieldPolicy) -> Wunderground {
        Wunderground { policy }
    }
}

impl ProtocolAdapter for Wunderground {
    fn endpoint_path(&self) -> &str {
        Wunderground::ENDPOINT_PATH
    }

    fn station_type(&self) -> &str {
        Wunderground::STATION_TYPE
    }

    fn parse(&self, params: &Params) -> Result<ParsedReport, IngestError> {
        let mut fields = FieldReader::new(params, self.policy);

        let software = fields.text("softwaretype");
        let station = StationDescriptor {
            auth_token: fields.text("ID"),
            station_type: software.clone(),
            model: software,
            frequency: String::new(),
            interval: if fields.has("realtime") { fields.integer("rtfreq") } else { 0 },
        };

        // Stations without a clock send `now` instead of a time.
        let timestamp = match params.get("dateutc") {
            Some(raw) if raw.eq_ignore_ascii_case("now") => None,
            _ => fields.timestamp("dateutc", &TIMESTAMP_FORMATS),
        };

        let indoor_temp_f = fields.float_opt("indoortempf");
        let outdoor_temp_f = fields.float_opt("tempf");
        let dew_point_f = fields.float_opt("dewptf");
        let pressure_relative_inhg = fields.float("baromin");
        let wind_speed_mph = fields.float("windspeedmph");
        let wind_gust_mph = fields.float("windgustmph");
        let rain_hourly_in = fields.float("rainin");
        let rain_daily_in = fields.float("dailyrainin");

        let observation = CanonicalObservation {
            timestamp,
            indoor_temp_f: indoor_temp_f.unwrap_or(0.0),
            indoor_temp_c: indoor_temp_f.map(fahrenheit_to_celsius).unwrap_or(0.0),
            indoor_humidity: fields.float("indoorhumidity"),
            outdoor_temp_f: outdoor_temp_f.unwrap_or(0.0),
            outdoor_temp_c: outdoor_temp_f.map(fahrenheit_to_celsius).unwrap_or(0.0),
            outdoor_humidity: fields.float("humidity"),
            dew_point_f: dew_point_f.unwrap_or(0.0),
            dew_point_c: dew_point_f.map(fahrenheit_to_celsius).unwrap_or(0.0),
            pressure_relative_inhg,
            pressure_relative_hpa: inhg_to_hpa(pressure_relative_inhg),
            wind_direction: fields.float("winddir"),
            wind_speed_mph,
            wind_speed_ms: mph_to_ms(wind_speed_mph),
            wind_speed_kmh: mph_to_kmh(wind_speed_mph),
            wind_gust_mph,
            wind_gust_ms: mph_to_ms(wind_gust_mph),
            wind_gust_kmh: mph_to_kmh(wind_gust_mph),
            solar_radiation: fields.float("solarradiation"),
            uv_index: fields.float("UV"),
            rain_hourly_in,
            rain_hourly_mm: inches_to_mm(rain_hourly_in),
            rain_daily_in,
            rain_daily_mm: inches_to_mm(rain_daily_in),
            ..CanonicalObservation::default()
        };

        fields.finish()?;

        let (sensors, measurements) = collect_channels(&CHANNELS, params, &observation, &station.model, 0);

        Ok(ParsedReport { station, observation, sensors, measurements })
    }
}
