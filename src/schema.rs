//! Record shapes exchanged with the transit source and the geocoder, and the
//! resolved record written to disk.
//!
//! Both upstreams return open-ended objects. The fields the pipeline reads are
//! typed; everything else is kept in an `extra` map and written back as-is.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::pipeline::validate::Coordinates;

/// Keys owned by [`ResolvedStop`]; dropped from upstream extras so the written
/// record never carries them twice.
const RESOLVED_KEYS: [&str; 3] = ["googleMaps", "lat", "lng"];

/// Raw per-stop record from the transit source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StopRecord {
    /// Upstream usability flag. A missing flag counts as unusable.
    #[serde(default)]
    pub valid: bool,
    /// Latitude candidate, usually a decimal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<Value>,
    /// Longitude candidate, usually a decimal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<Value>,
    /// Stop code as printed on the sign.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paradero: Option<String>,
    /// Human-readable stop name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nomett: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A latitude/longitude pair as reported by the geocoder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LatLng>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One ranked geocoding result, kept verbatim for provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceCandidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PlaceCandidate {
    #[must_use]
    pub fn location(&self) -> Option<LatLng> {
        self.geometry.as_ref().and_then(|geometry| geometry.location)
    }
}

/// The raw record plus the final coordinate decision.
///
/// `lat` and `lng` are only ever set together from a validated
/// [`Coordinates`], so a written record has both or neither.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedStop {
    #[serde(flatten)]
    record: StopRecord,
    #[serde(rename = "googleMaps", skip_serializing_if = "Option::is_none")]
    google_maps: Option<PlaceCandidate>,
    lat: Option<f64>,
    lng: Option<f64>,
}

impl ResolvedStop {
    #[must_use]
    pub fn new(
        mut record: StopRecord,
        google_maps: Option<PlaceCandidate>,
        coordinates: Option<Coordinates>,
    ) -> Self {
        for key in RESOLVED_KEYS {
            record.extra.shift_remove(key);
        }

        Self {
            record,
            google_maps,
            lat: coordinates.map(|c| c.lat()),
            lng: coordinates.map(|c| c.lng()),
        }
    }

    #[must_use]
    pub fn record(&self) -> &StopRecord {
        &self.record
    }

    #[must_use]
    pub fn google_maps(&self) -> Option<&PlaceCandidate> {
        self.google_maps.as_ref()
    }

    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lng) {
            (Some(lat), Some(lng)) => Coordinates::new(lat, lng),
            _ => None,
        }
    }

    #[must_use]
    pub fn lat(&self) -> Option<f64> {
        self.lat
    }

    #[must_use]
    pub fn lng(&self) -> Option<f64> {
        self.lng
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stop_record_keeps_unknown_fields_in_order() {
        let raw = json!({
            "paradero": "PA433",
            "zeta": 1,
            "valid": true,
            "x": "-33.45",
            "y": "-70.66",
            "nomett": "Parada 5 / Metro Los Heroes",
            "alpha": "kept"
        });

        let record: StopRecord = serde_json::from_value(raw).expect("record should decode");

        assert!(record.valid);
        assert_eq!(record.paradero.as_deref(), Some("PA433"));
        let keys: Vec<&str> = record.extra.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn missing_valid_flag_decodes_as_unusable() {
        let record: StopRecord =
            serde_json::from_value(json!({ "x": "1" })).expect("record should decode");
        assert!(!record.valid);
        assert_eq!(record.x, Some(json!("1")));
    }

    #[test]
    fn resolved_stop_writes_null_pair_without_fallback_key() {
        let record = StopRecord {
            valid: true,
            x: Some(json!("0")),
            y: Some(json!("0")),
            ..StopRecord::default()
        };

        let resolved = ResolvedStop::new(record, None, None);
        let value = serde_json::to_value(&resolved).expect("serialize");

        assert_eq!(value["lat"], Value::Null);
        assert_eq!(value["lng"], Value::Null);
        assert!(value.get("googleMaps").is_none());
    }

    #[test]
    fn resolved_stop_replaces_upstream_coordinate_keys() {
        let mut extra = Map::new();
        extra.insert("lat".to_string(), json!("stale"));
        extra.insert("comuna".to_string(), json!("Santiago"));
        let record = StopRecord {
            valid: true,
            extra,
            ..StopRecord::default()
        };

        let coordinates = Coordinates::new(-33.45, -70.66);
        let resolved = ResolvedStop::new(record, None, coordinates);
        let text = serde_json::to_string(&resolved).expect("serialize");

        assert_eq!(text.matches("\"lat\"").count(), 1);
        assert!(text.contains("\"comuna\":\"Santiago\""));
        assert_eq!(resolved.coordinates(), coordinates);
    }

    #[test]
    fn place_candidate_without_geometry_has_no_location() {
        let candidate: PlaceCandidate =
            serde_json::from_value(json!({ "place_id": "abc" })).expect("decode");
        assert!(candidate.location().is_none());
        assert_eq!(candidate.extra["place_id"], json!("abc"));
    }
}
