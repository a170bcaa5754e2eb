use serde_json::Value;

/// Returns true when both values are finite and neither is exactly zero.
///
/// The transit source encodes a missing position as `0` or as a non-numeric
/// placeholder, and zero is never a real coordinate for the served area.
#[must_use]
pub fn validate(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && lat != 0.0 && lng != 0.0
}

/// Coerces a raw position field to a number.
///
/// Strings are trimmed and parsed as decimals (an empty string is `0`),
/// numbers pass through and `null` is `0`. Anything else, including a missing
/// field, becomes NaN.
#[must_use]
pub fn coerce_number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::String(raw)) => parse_decimal(raw),
        Some(Value::Number(number)) => number.as_f64().unwrap_or(f64::NAN),
        Some(Value::Bool(flag)) => f64::from(u8::from(*flag)),
        Some(Value::Null) => 0.0,
        Some(Value::Array(_) | Value::Object(_)) | None => f64::NAN,
    }
}

fn parse_decimal(raw: &str) -> f64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// A coordinate pair that passed [`validate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    lat: f64,
    lng: f64,
}

impl Coordinates {
    #[must_use]
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        validate(lat, lng).then_some(Self { lat, lng })
    }

    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.lat
    }

    #[must_use]
    pub const fn lng(&self) -> f64 {
        self.lng
    }
}
