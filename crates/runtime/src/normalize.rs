//! Turning invocation outcomes into display text.

use serde_json::Value;

use crate::error::InvocationError;
use crate::invoke::RawResult;

pub const NO_RESULTS: &str = "No results found.";
pub const RESULTS_HEADER: &str = "## Airbnb Search Results";

/// What the caller shows the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    /// Never empty.
    pub display_text: String,
    pub succeeded: bool,
}

impl QueryResult {
    fn ok(display_text: impl Into<String>) -> Self {
        Self {
            display_text: display_text.into(),
            succeeded: true,
        }
    }

    fn failed(display_text: impl Into<String>) -> Self {
        Self {
            display_text: display_text.into(),
            succeeded: false,
        }
    }
}

/// Render any outcome as a single non-empty string.
pub fn normalize(result: Result<RawResult, InvocationError>) -> QueryResult {
    match result {
        Err(err) => QueryResult::failed(err.message()),
        Ok(RawResult::Text(text)) if text.trim().is_empty() => QueryResult::ok(NO_RESULTS),
        Ok(RawResult::Text(text)) => QueryResult::ok(format!("{RESULTS_HEADER}\n\n{text}")),
        Ok(RawResult::Structured(value)) => QueryResult::ok(render_listings(&value)),
    }
}

fn render_listings(value: &Value) -> String {
    let listings = value
        .pointer("/data/results")
        .or_else(|| value.get("results"))
        .or_else(|| value.get("searchResults"))
        .and_then(Value::as_array);

    match listings {
        Some(listings) if !listings.is_empty() => listings
            .iter()
            .enumerate()
            .map(|(i, listing)| render_listing(i + 1, listing))
            .collect::<Vec<_>>()
            .join("\n\n"),
        _ => NO_RESULTS.to_string(),
    }
}

fn render_listing(position: usize, listing: &Value) -> String {
    let mut lines = Vec::new();
    if let Some(id) = field(listing, &["id"]).and_then(scalar) {
        lines.push(format!("ID: {id}"));
    }
    if let Some(name) = field(listing, &["name", "title"]).and_then(scalar) {
        lines.push(format!("Name: {name}"));
    }
    if let Some(location) = field(listing, &["latlng", "location", "coordinates"]).and_then(coarse_location) {
        lines.push(format!("Location: {location}"));
    }
    if let Some(icon) = field(listing, &["icon", "url"]).and_then(scalar) {
        lines.push(format!("Icon URL: {icon}"));
    }

    if lines.is_empty() {
        format!("Listing {position}: no details provided")
    } else {
        lines.join("\n")
    }
}

fn field<'a>(listing: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| listing.get(*key))
}

fn scalar(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn coarse_location(value: &Value) -> Option<String> {
    let pair = match value {
        Value::Object(map) => {
            let lat = map.get("lat").or_else(|| map.get("latitude"));
            let lng = map
                .get("lng")
                .or_else(|| map.get("lon"))
                .or_else(|| map.get("longitude"));
            lat.zip(lng)
        }
        Value::Array(items) if items.len() == 2 => Some((&items[0], &items[1])),
        other => return scalar(other),
    };
    let (lat, lng) = pair?;
    Some(format!("Latitude {}, Longitude {}", scalar(lat)?, scalar(lng)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn structured(value: Value) -> QueryResult {
        normalize(Ok(RawResult::Structured(value)))
    }

    #[test]
    fn partial_listing_renders_present_fields_only() {
        let result = structured(json!({ "data": { "results": [{ "id": "1", "name": "Loft" }] } }));
        assert!(result.succeeded);
        assert!(result.display_text.contains("ID: 1"));
        assert!(result.display_text.contains("Name: Loft"));
        assert!(!result.display_text.contains("Location"));
        assert!(!result.display_text.contains("Icon URL"));
    }

    #[test]
    fn listings_keep_order_and_blank_line_separation() {
        let result = structured(json!({
            "data": { "results": [
                {
                    "id": 101,
                    "name": "Canal House",
                    "latlng": { "lat": 52.37, "lng": 4.89 },
                    "icon": "https://example.com/a.png"
                },
                { "id": "102", "latlng": [48.85, 2.35] }
            ] }
        }));
        assert_eq!(
            result.display_text,
            "ID: 101\nName: Canal House\nLocation: Latitude 52.37, Longitude 4.89\n\
             Icon URL: https://example.com/a.png\n\n\
             ID: 102\nLocation: Latitude 48.85, Longitude 2.35"
        );
    }

    #[test]
    fn empty_listing_is_not_dropped() {
        let result = structured(json!({ "results": [{ "price": 90 }, "oops", { "id": "7" }] }));
        assert_eq!(
            result.display_text,
            "Listing 1: no details provided\n\nListing 2: no details provided\n\nID: 7"
        );
    }

    #[test]
    fn alternate_collection_keys() {
        let result = structured(json!({
            "searchUrl": "https://www.airbnb.com/s/Paris/homes",
            "searchResults": [{ "id": "9", "url": "https://www.airbnb.com/rooms/9" }]
        }));
        assert_eq!(
            result.display_text,
            "ID: 9\nIcon URL: https://www.airbnb.com/rooms/9"
        );
    }

    #[test]
    fn no_listings_is_fixed_text() {
        for value in [
            json!({ "data": { "results": [] } }),
            json!({ "data": {} }),
            json!({ "message": "nothing" }),
            json!({ "results": "not a list" }),
        ] {
            let result = structured(value);
            assert_eq!(result.display_text, NO_RESULTS);
            assert!(result.succeeded);
        }
    }

    #[test]
    fn text_gets_header() {
        let result = normalize(Ok(RawResult::Text("Three lofts near the Marais.".into())));
        assert_eq!(
            result.display_text,
            "## Airbnb Search Results\n\nThree lofts near the Marais."
        );
        assert!(result.succeeded);
    }

    #[test]
    fn blank_text_is_no_results() {
        let result = normalize(Ok(RawResult::Text("  \n".into())));
        assert_eq!(result.display_text, NO_RESULTS);
    }

    #[test]
    fn errors_become_their_message() {
        let result = normalize(Err(InvocationError::empty_query()));
        assert!(!result.succeeded);
        assert_eq!(result.display_text, "Please enter a search query.");

        let result = normalize(Err(InvocationError::new(
            ErrorKind::BackendUnreachable,
            "Could not reach the local model service.",
        )));
        assert!(!result.succeeded);
        assert!(!result.display_text.is_empty());
    }
}
