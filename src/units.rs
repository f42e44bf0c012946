//! Conversions from the imperial units used by station firmware to SI units.

/// Degrees Fahrenheit to degrees Celsius.
pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

/// Inches of mercury to hectopascal.
pub fn inhg_to_hpa(inhg: f64) -> f64 {
    inhg * 33.8639
}

/// Miles per hour to meters per second.
pub fn mph_to_ms(mph: f64) -> f64 {
    mph * 0.44704
}

/// Miles per hour to kilometers per hour.
pub fn mph_to_kmh(mph: f64) -> f64 {
    mph * 1.60934
}

/// Inches to millimeters, used for rainfall amounts and rates.
pub fn inches_to_mm(inches: f64) -> f64 {
    inches * 25.4
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "{} != {}", actual, expected);
    }

    #[test]
    fn test_temperature() {
        assert_eq!(fahrenheit_to_celsius(32.0), 0.0);
        assert_close(fahrenheit_to_celsius(98.6), 37.0);
        assert_close(fahrenheit_to_celsius(-40.0), -40.0);
    }

    #[test]
    fn test_pressure() {
        assert_close(inhg_to_hpa(1.0), 33.8639);
        assert_close(inhg_to_hpa(29.92), 1013.207888);
    }

    #[test]
    fn test_wind_speed() {
        assert_close(mph_to_ms(10.0), 4.4704);
        assert_close(mph_to_kmh(10.0), 16.0934);
    }

    #[test]
    fn test_rain() {
        assert_close(inches_to_mm(1.0), 25.4);
        assert_eq!(inches_to_mm(0.0), 0.0);
    }
}
