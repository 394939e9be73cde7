//! Cross-source deduplication.
//!
//! The merge is deterministic regardless of arrival timing: batches are
//! ordered by declared source priority before folding, so ties always go to
//! the same winner no matter which source answered first.

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::domain::CanonicalEvent;

/// Dedup key: normalized title + calendar date + normalized venue.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub title: String,
    pub date: NaiveDate,
    pub venue: String,
}

impl DedupKey {
    pub fn of(event: &CanonicalEvent) -> Self {
        Self {
            title: normalize_text(&event.title),
            date: event.start_date(),
            venue: normalize_text(&event.venue_name),
        }
    }
}

/// Normalize a name for matching: lowercase, unify separators, collapse
/// whitespace, drop punctuation.
pub fn normalize_text(name: &str) -> String {
    let lowered = name
        .to_lowercase()
        .replace('&', "and")
        .replace(['-', '_', '/'], " ");
    let cleaned: String = lowered
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Merge per-source batches into one deduplicated list.
///
/// `priorities` maps source id -> declared priority (lower wins). Colliding
/// records keep the first-seen event in priority order; fields the winner
/// lacks are backfilled from later duplicates.
pub fn merge(
    batches: Vec<Vec<CanonicalEvent>>,
    priorities: &HashMap<String, u32>,
) -> Vec<CanonicalEvent> {
    let mut all: Vec<CanonicalEvent> = batches.into_iter().flatten().collect();
    // Priority order first, then stable textual tie-breaks so the output is
    // reproducible even between sources sharing a priority.
    all.sort_by(|a, b| {
        let pa = priorities.get(&a.source_id).copied().unwrap_or(u32::MAX);
        let pb = priorities.get(&b.source_id).copied().unwrap_or(u32::MAX);
        pa.cmp(&pb)
            .then_with(|| a.source_id.cmp(&b.source_id))
            .then_with(|| a.external_id.cmp(&b.external_id))
    });

    let mut order: Vec<DedupKey> = Vec::new();
    let mut merged: HashMap<DedupKey, CanonicalEvent> = HashMap::new();
    for event in all {
        let key = DedupKey::of(&event);
        match merged.get_mut(&key) {
            None => {
                order.push(key.clone());
                merged.insert(key, event);
            }
            Some(winner) => backfill(winner, &event),
        }
    }

    order
        .into_iter()
        .filter_map(|key| merged.remove(&key))
        .collect()
}

/// Copy fields the winner lacks from a later duplicate. The winner's
/// identity (source_id, external_id) never changes.
fn backfill(winner: &mut CanonicalEvent, duplicate: &CanonicalEvent) {
    if winner.description.is_empty() && !duplicate.description.is_empty() {
        winner.description = duplicate.description.clone();
    }
    if winner.end_time.is_none() {
        winner.end_time = duplicate.end_time;
    }
    if winner.address.is_none() {
        winner.address = duplicate.address.clone();
    }
    if winner.latitude.is_none() {
        winner.latitude = duplicate.latitude;
    }
    if winner.longitude.is_none() {
        winner.longitude = duplicate.longitude;
    }
    if winner.price.is_none() && duplicate.price.is_some() {
        winner.price = duplicate.price;
        winner.currency = duplicate.currency.clone();
        winner.is_free = duplicate.is_free;
    }
    if winner.image_url.is_none() {
        winner.image_url = duplicate.image_url.clone();
    }
    if winner.event_url.is_none() {
        winner.event_url = duplicate.event_url.clone();
    }
}
