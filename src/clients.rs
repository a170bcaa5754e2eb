pub mod geocoding;
pub mod transit;

pub use geocoding::{GeocodeLookup, GeocoderConfig, GoogleGeocoder, PlaceGeocoder};
pub use transit::{TransitClient, TransitConfig, TransitSource};

const ERROR_EXCERPT_CHARS: usize = 200;

/// Collapses an error response body into one bounded line.
pub(crate) fn error_excerpt(body: &str) -> String {
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= ERROR_EXCERPT_CHARS {
        return collapsed;
    }
    let mut excerpt: String = collapsed.chars().take(ERROR_EXCERPT_CHARS).collect();
    excerpt.push_str("...");
    excerpt
}
