//! Deterministic task ids.

use sha2::{Digest, Sha256};

use dscan_models::VideoId;

/// Task id derived from a batch of claims and the window it was discovered in.
///
/// Each claim is a video id plus the record version it superseded, so a
/// video re-claimed after `ERROR` gets a fresh name while a replay of the same
/// claim maps onto the existing task. Cloud Tasks rejects a second task with
/// the same id for roughly an hour after the first. Ids may only contain
/// `[A-Za-z0-9_-]`.
pub fn task_id_for<'a, I>(claims: I, window: &str) -> String
where
    I: IntoIterator<Item = (&'a VideoId, Option<&'a str>)>,
{
    let mut hasher = Sha256::new();
    hasher.update(window.as_bytes());
    for (id, supersedes) in claims {
        hasher.update([0u8]);
        hasher.update(id.as_str().as_bytes());
        if let Some(version) = supersedes {
            hasher.update([1u8]);
            hasher.update(version.as_bytes());
        }
    }
    format!("scan-{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<VideoId> {
        raw.iter().map(|s| VideoId::from(*s)).collect()
    }

    fn fresh(ids: &[VideoId]) -> impl Iterator<Item = (&VideoId, Option<&str>)> {
        ids.iter().map(|id| (id, None))
    }

    #[test]
    fn test_stable_for_same_input() {
        let batch = ids(&["x", "y"]);
        let a = task_id_for(fresh(&batch), "100");
        assert_eq!(a, task_id_for(fresh(&batch), "100"));
        assert!(a.starts_with("scan-"));
        assert_eq!(a.len(), 5 + 64);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn test_differs_by_window_and_boundaries() {
        let base = task_id_for(fresh(&ids(&["x", "y"])), "100");
        assert_ne!(base, task_id_for(fresh(&ids(&["x", "y"])), "101"));
        assert_ne!(base, task_id_for(fresh(&ids(&["y", "x"])), "100"));
        assert_ne!(
            task_id_for(fresh(&ids(&["ab", "c"])), "1"),
            task_id_for(fresh(&ids(&["a", "bc"])), "1")
        );
    }

    #[test]
    fn test_reclaim_gets_a_new_name() {
        let v = VideoId::from("v");
        let first = task_id_for([(&v, None)], "direct");
        let second = task_id_for([(&v, Some("2024-05-01T10:00:00.1Z"))], "direct");
        let third = task_id_for([(&v, Some("2024-05-02T10:00:00.1Z"))], "direct");
        assert_ne!(first, second);
        assert_ne!(second, third);
        assert_eq!(third, task_id_for([(&v, Some("2024-05-02T10:00:00.1Z"))], "direct"));
    }
}
