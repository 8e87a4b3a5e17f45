//! Candidate selection shared by both discovery strategies.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use dscan_models::{sort_by_creation, ChangeEvent};
use tracing::debug;

use crate::config::DiscoveryStrategy;

/// Reduce raw events to dispatch candidates, in dispatch order.
///
/// Keeps video files, restricted to `folder_id` when given. Repeated ids
/// collapse to their first occurrence. Full listings are ordered oldest
/// first and, with a non-zero `min_age`, drop files that are too young or
/// carry no creation time.
pub fn select_candidates(
    events: Vec<ChangeEvent>,
    strategy: &DiscoveryStrategy,
    folder_id: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<ChangeEvent> {
    let mut seen = HashSet::new();
    let mut candidates: Vec<ChangeEvent> = events
        .into_iter()
        .filter(ChangeEvent::is_video)
        .filter(|e| folder_id.map_or(true, |folder| e.in_folder(folder)))
        .filter(|e| seen.insert(e.id.clone()))
        .collect();

    if let DiscoveryStrategy::FullListing { min_age } = strategy {
        if !min_age.is_zero() {
            let min_age = chrono::Duration::from_std(*min_age).unwrap_or(chrono::Duration::MAX);
            candidates.retain(|e| match e.age_at(now) {
                Some(age) => age >= min_age,
                None => {
                    debug!(video_id = %e.id, "Skipping file without creation time while age gate is active");
                    false
                }
            });
        }
        sort_by_creation(&mut candidates);
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    fn event(id: &str, mime: &str, parent: &str, created: Option<DateTime<Utc>>) -> ChangeEvent {
        ChangeEvent {
            id: id.into(),
            name: format!("{id}.mp4"),
            mime_type: mime.to_string(),
            parents: vec![parent.to_string()],
            created_time: created,
        }
    }

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, 0, 0).unwrap()
    }

    #[test]
    fn test_change_feed_keeps_order_and_filters_mime() {
        let events = vec![
            event("b", "video/mp4", "f", None),
            event("doc", "application/pdf", "f", None),
            event("a", "video/quicktime", "other", None),
            event("b", "video/mp4", "f", None),
        ];
        let ids: Vec<String> = select_candidates(events, &DiscoveryStrategy::ChangeFeed, None, at(12))
            .into_iter()
            .map(|e| e.id.to_string())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_folder_filter() {
        let events = vec![
            event("a", "video/mp4", "f", None),
            event("b", "video/mp4", "other", None),
        ];
        let selected = select_candidates(events, &DiscoveryStrategy::ChangeFeed, Some("f"), at(12));
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id.as_str(), "a");
    }

    #[test]
    fn test_full_listing_sorts_and_gates_by_age() {
        let strategy = DiscoveryStrategy::FullListing { min_age: Duration::from_secs(3600) };
        let events = vec![
            event("young", "video/mp4", "f", Some(at(11) + chrono::Duration::minutes(30))),
            event("newer", "video/mp4", "f", Some(at(9))),
            event("older", "video/mp4", "f", Some(at(8))),
            event("unknown", "video/mp4", "f", None),
        ];
        let ids: Vec<String> = select_candidates(events, &strategy, Some("f"), at(12))
            .into_iter()
            .map(|e| e.id.to_string())
            .collect();
        assert_eq!(ids, vec!["older", "newer"]);
    }

    #[test]
    fn test_full_listing_without_gate_keeps_undated() {
        let strategy = DiscoveryStrategy::FullListing { min_age: Duration::ZERO };
        let events = vec![
            event("undated", "video/mp4", "f", None),
            event("dated", "video/mp4", "f", Some(at(1))),
        ];
        let ids: Vec<String> = select_candidates(events, &strategy, Some("f"), at(12))
            .into_iter()
            .map(|e| e.id.to_string())
            .collect();
        assert_eq!(ids, vec!["dated", "undated"]);
    }
}
