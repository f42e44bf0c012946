//! Ecowitt "customized upload" protocol as sent by GW1000/GW2000 gateways and their consoles.
use std::convert::TryFrom;

use crate::adapter::{collect_channels, Channel, FieldPolicy, FieldReader, Params, ProtocolAdapter, TIMESTAMP_FORMATS};
use crate::error::IngestError;
use crate::record::{CanonicalObservation, ParsedReport, StationDescriptor};
use crate::units::{fahrenheit_to_celsius, inches_to_mm, inhg_to_hpa, mph_to_kmh, mph_to_ms};

static CHANNELS: [Channel; 21] = [
    Channel { remote_id: "indoor.temperature", key: "tempinf", kind: "temperature", location: "indoor", name: "Indoor temperature", outdoor_array: false, value: |o| o.indoor_temp_c },
    Channel { remote_id: "indoor.humidity", key: "humidityin", kind: "humidity", location: "indoor", name: "Indoor humidity", outdoor_array: false, value: |o| o.indoor_humidity },
    Channel { remote_id: "indoor.pressure_relative", key: "baromrelin", kind: "pressure", location: "indoor", name: "Relative pressure", outdoor_array: false, value: |o| o.pressure_relative_hpa },
    Channel { remote_id: "indoor.pressure_absolute", key: "baromabsin", kind: "pressure", location: "indoor", name: "Absolute pressure", outdoor_array: false, value: |o| o.pressure_absolute_hpa },
    Channel { remote_id: "outdoor.temperature", key: "tempf", kind: "temperature", location: "outdoor", name: "Outdoor temperature", outdoor_array: true, value: |o| o.outdoor_temp_c },
    Channel { remote_id: "outdoor.humidity", key: "humidity", kind: "humidity", location: "outdoor", name: "Outdoor humidity", outdoor_array: true, value: |o| o.outdoor_humidity },
    Channel { remote_id: "outdoor.wind_direction", key: "winddir", kind: "wind_direction", location: "outdoor", name: "Wind direction", outdoor_array: true, value: |o| o.wind_direction },
    Channel { remote_id: "outdoor.wind_speed", key: "windspeedmph", kind: "wind_speed", location: "outdoor", name: "Wind speed", outdoor_array: true, value: |o| o.wind_speed_ms },
    Channel { remote_id: "outdoor.wind_gust", key: "windgustmph", kind: "wind_speed", location: "outdoor", name: "Wind gust", outdoor_array: true, value: |o| o.wind_gust_ms },
    Channel { remote_id: "outdoor.wind_gust_max_daily", key: "maxdailygust", kind: "wind_speed", location: "outdoor", name: "Maximum daily gust", outdoor_array: true, value: |o| o.max_daily_gust_ms },
    Channel { remote_id: "outdoor.solar_radiation", key: "solarradiation", kind: "solar_radiation", location: "outdoor", name: "Solar radiation", outdoor_array: true, value: |o| o.solar_radiation },
    Channel { remote_id: "outdoor.uv_index", key: "uv", kind: "uv_index", location: "outdoor", name: "UV index", outdoor_array: true, value: |o| o.uv_index },
    Channel { remote_id: "outdoor.rain_rate", key: "rainratein", kind: "rain_rate", location: "outdoor", name: "Rain rate", outdoor_array: true, value: |o| o.rain_rate_mm },
    Channel { remote_id: "outdoor.rain_event", key: "eventrainin", kind: "rain", location: "outdoor", name: "Event rain", outdoor_array: true, value: |o| o.rain_event_mm },
    Channel { remote_id: "outdoor.rain_hourly", key: "hourlyrainin", kind: "rain", location: "outdoor", name: "Hourly rain", outdoor_array: true, value: |o| o.rain_hourly_mm },
    Channel { remote_id: "outdoor.rain_daily", key: "dailyrainin", kind: "rain", location: "outdoor", name: "Daily rain", outdoor_array: true, value: |o| o.rain_daily_mm },
    Channel { remote_id: "outdoor.rain_weekly", key: "weeklyrainin", kind: "rain", location: "outdoor", name: "Weekly rain", outdoor_array: true, value: |o| o.rain_weekly_mm },
    Channel { remote_id: "outdoor.rain_monthly", key: "monthlyrainin", kind: "rain", location: "outdoor", name: "Monthly rain", outdoor_array: true, value: |o| o.rain_monthly_mm },
    Channel { remote_id: "outdoor.rain_yearly", key: "yearlyrainin", kind: "rain", location: "outdoor", name: "Yearly rain", outdoor_array: true, value: |o| o.rain_yearly_mm },
    Channel { remote_id: "outdoor.rain_total", key: "totalrainin", kind: "rain", location: "outdoor", name: "Total rain", outdoor_array: true, value: |o| o.rain_total_mm },
    Channel { remote_id: "outdoor.vapor_pressure_deficit", key: "vpd", kind: "vapor_pressure_deficit", location: "outdoor", name: "Vapor pressure deficit", outdoor_array: false, value: |o| o.vapor_pressure_deficit },
];

#[derive(Debug, Clone, Default)]
/// Adapter for the Ecowitt protocol.
pub struct Ecowitt
{
    policy: FieldPolicy,
}

impl Ecowitt {
    pub const ENDPOINT_PATH: &'static str = "/data/report/";
    pub const STATION_TYPE: &'static str = "ecowitt";

    pub fn new(policy: FieldPolicy) -> Ecowitt {
        Ecowitt { policy }
    }
}

impl ProtocolAdapter for Ecowitt {
    fn endpoint_path(&self) -> &str {
        Ecowitt::ENDPOINT_PATH
    }

    fn station_type(&self) -> &str {
        Ecowitt::STATION_TYPE
    }

    fn parse(&self, params: &Params) -> Result<ParsedReport, IngestError> {
        let mut fields = FieldReader::new(params, self.policy);

        let station = StationDescriptor {
            auth_token: fields.text("PASSKEY"),
            station_type: fields.text("stationtype"),
            model: fields.text("model"),
            frequency: fields.text("freq"),
            interval: fields.integer("interval"),
        };

        let indoor_temp_f = fields.float_opt("tempinf");
        let outdoor_temp_f = fields.float_opt("tempf");
        let pressure_relative_inhg = fields.float("baromrelin");
        let pressure_absolute_inhg = fields.float("baromabsin");
        let wind_speed_mph = fields.float("windspeedmph");
        let wind_gust_mph = fields.float("windgustmph");
        let max_daily_gust_mph = fields.float("maxdailygust");
        let rain_rate_in = fields.float("rainratein");
        let rain_event_in = fields.float("eventrainin");
        let rain_hourly_in = fields.float("hourlyrainin");
        let rain_daily_in = fields.float("dailyrainin");
        let rain_weekly_in = fields.float("weeklyrainin");
        let rain_monthly_in = fields.float("monthlyrainin");
        let rain_yearly_in = fields.float("yearlyrainin");
        let rain_total_in = fields.float("totalrainin");

        let observation = CanonicalObservation {
            timestamp: fields.timestamp("dateutc", &TIMESTAMP_FORMATS),
            runtime: fields.integer("runtime"),
            heap: fields.integer("heap"),
            indoor_temp_f: indoor_temp_f.unwrap_or(0.0),
            indoor_temp_c: indoor_temp_f.map(fahrenheit_to_celsius).unwrap_or(0.0),
            indoor_humidity: fields.float("humidityin"),
            outdoor_temp_f: outdoor_temp_f.unwrap_or(0.0),
            outdoor_temp_c: outdoor_temp_f.map(fahrenheit_to_celsius).unwrap_or(0.0),
            outdoor_humidity: fields.float("humidity"),
            pressure_relative_inhg,
            pressure_relative_hpa: inhg_to_hpa(pressure_relative_inhg),
            pressure_absolute_inhg,
            pressure_absolute_hpa: inhg_to_hpa(pressure_absolute_inhg),
            wind_direction: fields.float("winddir"),
            wind_speed_mph,
            wind_speed_ms: mph_to_ms(wind_speed_mph),
            wind_speed_kmh: mph_to_kmh(wind_speed_mph),
            wind_gust_mph,
            wind_gust_ms: mph_to_ms(wind_gust_mph),
            wind_gust_kmh: mph_to_kmh(wind_gust_mph),
            max_daily_gust_mph,
            max_daily_gust_ms: mph_to_ms(max_daily_gust_mph),
            max_daily_gust_kmh: mph_to_kmh(max_daily_gust_mph),
            solar_radiation: fields.float("solarradiation"),
            uv_index: fields.float("uv"),
            rain_rate_in,
            rain_rate_mm: inches_to_mm(rain_rate_in),
            rain_event_in,
            rain_event_mm: inches_to_mm(rain_event_in),
            rain_hourly_in,
            rain_hourly_mm: inches_to_mm(rain_hourly_in),
            rain_daily_in,
            rain_daily_mm: inches_to_mm(rain_daily_in),
            rain_weekly_in,
            rain_weekly_mm: inches_to_mm(rain_weekly_in),
            rain_monthly_in,
            rain_monthly_mm: inches_to_mm(rain_monthly_in),
            rain_yearly_in,
            rain_yearly_mm: inches_to_mm(rain_yearly_in),
            rain_total_in,
            rain_total_mm: inches_to_mm(rain_total_in),
            vapor_pressure_deficit: fields.float("vpd"),
            battery_status: fields.integer("wh65batt"),
            ..CanonicalObservation::default()
        };

        fields.finish()?;

        let (sensors, measurements) = collect_channels(&CHANNELS,
                                                       params,
                                                       &observation,
                                                       &station.model,
                                                       i32::try_from(observation.battery_status).unwrap_or(0));

        Ok(ParsedReport { station, observation, sensors, measurements })
    }
}
