//! Canonicalization of heterogeneous per-source payloads.
//!
//! Every source returns its own JSON shape; nothing heterogeneous leaks past
//! this module. Malformed records never raise: anything missing a title or a
//! parseable start date is dropped and counted.

pub mod dedup;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::domain::{CanonicalEvent, EventCategory, RawEventData};
use crate::observability::metrics;

/// Canonicalized output of one source batch plus the drop count for the
/// final summary diagnostics.
#[derive(Debug, Clone, Default)]
pub struct CanonicalBatch {
    pub events: Vec<CanonicalEvent>,
    pub dropped: usize,
}

/// Priority-ordered category normalization rules. Specific categories are
/// checked before broad ones so "museum exhibition" never classifies as
/// music; first match wins, everything else is `Other`. The order of this
/// slice is a contract, pinned by tests.
const CATEGORY_RULES: &[(EventCategory, &[&str])] = &[
    (EventCategory::Museums, &["museum", "museo", "exhibit", "exposición", "gallery"]),
    (EventCategory::Theatre, &["theatre", "theater", "teatro", "opera", "ópera", "musical", "comedy", "standup", "stand-up"]),
    (EventCategory::Sports, &["sport", "deporte", "match", "partido", "football", "fútbol", "soccer", "basketball", "tennis", "running", "marathon"]),
    (EventCategory::Tech, &["tech", "hackathon", "conference", "workshop", "startup", "developer", "programming"]),
    (EventCategory::Food, &["food", "gastronom", "tapas", "tasting", "wine", "vino", "beer", "cerveza", "brunch"]),
    (EventCategory::Nightlife, &["nightlife", "club", "party", "fiesta", "rave", "dj set", "dj "]),
    (EventCategory::Family, &["family", "familia", "kids", "niños", "children", "infantil"]),
    (EventCategory::Arts, &["art ", "arte", "painting", "sculpture", "dance", "danza", "ballet"]),
    (EventCategory::Music, &["music", "música", "musica", "concert", "concierto", "gig", "live", "festival", "band", "orchestra"]),
];

/// Tokens that mark an event as free when they appear in a price field.
const FREE_TOKENS: &[&str] = &["free", "gratis", "gratuito", "gratuita", "entrada libre"];

/// Map one source's raw events onto the canonical shape.
pub fn canonicalize(raw_events: &[RawEventData], source_id: &str) -> CanonicalBatch {
    let mut batch = CanonicalBatch::default();
    for raw in raw_events {
        match canonicalize_one(raw, source_id) {
            Some(event) => batch.events.push(event),
            None => batch.dropped += 1,
        }
    }
    if batch.dropped > 0 {
        debug!(source_id, dropped = batch.dropped, "dropped malformed records");
    }
    metrics::canonical::events(source_id, batch.events.len());
    metrics::canonical::dropped(source_id, batch.dropped);
    batch
}

fn canonicalize_one(raw: &RawEventData, source_id: &str) -> Option<CanonicalEvent> {
    // Title and start date are the two required fields; everything else
    // gets an explicit default.
    let title = first_string(raw, &["title", "name", "event_name", "headline"])?;
    let title = title.trim().to_string();
    if title.is_empty() {
        return None;
    }
    let start_time = first_datetime(raw, &["start_time", "start", "date", "start_date", "datetime", "event_day"])?;

    let end_time = first_datetime(raw, &["end_time", "end", "end_date"]);
    let description = first_string(raw, &["description", "summary", "details"]).unwrap_or_default();
    let venue_name = venue_name(raw).unwrap_or_else(|| "unknown venue".to_string());
    let address = first_string(raw, &["address", "venue_address", "street_address"]);
    let latitude = first_f64(raw, &["latitude", "lat"]);
    let longitude = first_f64(raw, &["longitude", "lon", "lng"]);

    let (price, currency, is_free) = price_fields(raw);
    let category = normalize_category(raw, &title);

    let external_id = first_string(raw, &["external_id", "id", "event_id", "uid"])
        .unwrap_or_else(|| derived_external_id(source_id, &title, start_time.date_naive()));

    Some(CanonicalEvent {
        title,
        description,
        start_time,
        end_time,
        venue_name,
        address,
        latitude,
        longitude,
        category,
        price,
        currency,
        is_free,
        source_id: source_id.to_string(),
        external_id,
        image_url: first_string(raw, &["image_url", "image", "cover_image"]),
        event_url: first_string(raw, &["event_url", "url", "link", "ticket_url"]),
    })
}

/// First-match-wins category normalization over the raw category field and
/// the title text.
pub fn normalize_category(raw: &RawEventData, title: &str) -> EventCategory {
    let mut haystack = title.to_lowercase();
    if let Some(raw_category) = first_string(raw, &["category", "genre", "type", "segment"]) {
        if let Some(exact) = EventCategory::parse(&raw_category) {
            return exact;
        }
        haystack.push(' ');
        haystack.push_str(&raw_category.to_lowercase());
    }
    for (category, keywords) in CATEGORY_RULES {
        if keywords.iter().any(|k| haystack.contains(k)) {
            return *category;
        }
    }
    EventCategory::Other
}

/// Stable derived id for sources that don't carry one.
fn derived_external_id(source_id: &str, title: &str, date: NaiveDate) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(title.to_lowercase().as_bytes());
    hasher.update(date.to_string().as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

fn venue_name(raw: &RawEventData) -> Option<String> {
    if let Some(name) = first_string(raw, &["venue_name"]) {
        return Some(name);
    }
    match raw.get("venue") {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(serde_json::Value::Object(obj)) => obj
            .get("name")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string()),
        _ => first_string(raw, &["location_name", "place"]),
    }
}

fn price_fields(raw: &RawEventData) -> (Option<f64>, Option<String>, bool) {
    let explicit_free = raw
        .get("is_free")
        .or_else(|| raw.get("free"))
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let currency = first_string(raw, &["currency", "currency_code"]);

    let mut price = first_f64(raw, &["price", "min_price", "price_min", "cost"]);
    let mut token_free = false;
    if price.is_none() {
        // Price may arrive as text ("25.00 EUR", "Gratis").
        if let Some(text) = first_string(raw, &["price", "min_price", "cost", "price_display"]) {
            let lower = text.to_lowercase();
            if FREE_TOKENS.iter().any(|t| lower.contains(t)) {
                token_free = true;
            } else {
                price = parse_leading_number(&text);
            }
        }
    }

    // Unknown price is NOT free; only an explicit marker, a recognized free
    // token or a literal zero price counts.
    let is_free = explicit_free || token_free || price == Some(0.0);
    (price, currency, is_free)
}

fn parse_leading_number(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    cleaned.replace(',', ".").parse().ok()
}

fn first_string(raw: &RawEventData, keys: &[&str]) -> Option<String> {
    for key in keys {
        match raw.get(*key) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                return Some(s.trim().to_string())
            }
            Some(serde_json::Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn first_f64(raw: &RawEventData, keys: &[&str]) -> Option<f64> {
    for key in keys {
        if let Some(v) = raw.get(*key).and_then(|v| v.as_f64()) {
            return Some(v);
        }
    }
    None
}

fn first_datetime(raw: &RawEventData, keys: &[&str]) -> Option<DateTime<Utc>> {
    for key in keys {
        match raw.get(*key) {
            Some(serde_json::Value::String(s)) => {
                if let Some(dt) = parse_datetime(s) {
                    return Some(dt);
                }
            }
            Some(serde_json::Value::Number(n)) => {
                if let Some(secs) = n.as_i64() {
                    if let Some(dt) = Utc.timestamp_opt(secs, 0).single() {
                        return Some(dt);
                    }
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| Utc.from_utc_datetime(&n));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_fields_gate_canonicalization() {
        let batch = canonicalize(
            &[
                json!({"title": "Jazz Night", "date": "2026-09-12", "venue": "Blue Note"}),
                json!({"title": "No Date Here"}),
                json!({"date": "2026-09-12"}),
                json!({"title": "   ", "date": "2026-09-12"}),
            ],
            "eventbrite",
        );
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.dropped, 3);
        assert_eq!(batch.events[0].venue_name, "Blue Note");
    }

    #[test]
    fn unknown_price_is_not_free() {
        let batch = canonicalize(
            &[json!({"title": "Mystery Gig", "date": "2026-09-12", "venue": "Somewhere"})],
            "dice",
        );
        assert!(!batch.events[0].is_free);
        assert_eq!(batch.events[0].price, None);
    }

    #[test]
    fn free_markers_are_recognized() {
        let explicit = canonicalize(
            &[json!({"title": "Open Day", "date": "2026-09-12", "is_free": true})],
            "meetup",
        );
        assert!(explicit.events[0].is_free);

        let token = canonicalize(
            &[json!({"title": "Feria", "date": "2026-09-12", "price": "Entrada libre"})],
            "entradium",
        );
        assert!(token.events[0].is_free);

        let zero = canonicalize(
            &[json!({"title": "Zero", "date": "2026-09-12", "price": 0.0})],
            "meetup",
        );
        assert!(zero.events[0].is_free);
    }

    #[test]
    fn specific_category_rules_shadow_broad_ones() {
        let raw = json!({"title": "Museum Late: Live Music in the Gallery", "date": "2026-09-12"});
        // museum must win over the music keywords in the same title
        assert_eq!(normalize_category(&raw, "Museum Late: Live Music in the Gallery"), EventCategory::Museums);

        let raw = json!({"title": "Some Event", "category": "sports", "date": "2026-09-12"});
        assert_eq!(normalize_category(&raw, "Some Event"), EventCategory::Sports);

        let raw = json!({"title": "Completely Opaque", "date": "2026-09-12"});
        assert_eq!(normalize_category(&raw, "Completely Opaque"), EventCategory::Other);
    }

    #[test]
    fn derived_external_ids_are_stable() {
        let a = derived_external_id("dice", "Same Show", NaiveDate::from_ymd_opt(2026, 9, 12).unwrap());
        let b = derived_external_id("dice", "same show", NaiveDate::from_ymd_opt(2026, 9, 12).unwrap());
        assert_eq!(a, b);
        let c = derived_external_id("dice", "Same Show", NaiveDate::from_ymd_opt(2026, 9, 13).unwrap());
        assert_ne!(a, c);
    }

    #[test]
    fn datetime_formats_are_tolerated() {
        for (value, expect_hour) in [
            (json!("2026-09-12T20:30:00Z"), 20),
            (json!("2026-09-12 20:30:00"), 20),
            (json!("2026-09-12"), 0),
        ] {
            let raw = json!({"title": "T", "start": value});
            let batch = canonicalize(&[raw], "s");
            assert_eq!(batch.events.len(), 1);
            use chrono::Timelike;
            assert_eq!(batch.events[0].start_time.hour(), expect_hour);
        }
    }
}
