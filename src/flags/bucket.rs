//! Stable rollout bucketing
//!
//! A user lands in the same bucket for a given flag on every call, every
//! process and every machine: the bucket is derived from SHA-256 of the flag
//! key and the bucketing id, never from a random source.

use sha2::{Digest, Sha256};

/// Resolution of the bucket space (buckets are 0.01 wide)
const BUCKETS: u64 = 10_000;

/// Map (flag key, bucketing id) into [0, 100)
pub fn rollout_bucket(flag_key: &str, bucketing_id: &str) -> f64 {
    let mut hasher = Sha256::new();
    hasher.update(flag_key.as_bytes());
    hasher.update(b".");
    hasher.update(bucketing_id.as_bytes());
    let hash = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash[..8]);
    let n = u64::from_be_bytes(prefix) % BUCKETS;

    n as f64 / (BUCKETS / 100) as f64
}

/// Whether the id falls inside a percentage rollout of the flag
pub fn in_rollout(flag_key: &str, bucketing_id: &str, percentage: f64) -> bool {
    rollout_bucket(flag_key, bucketing_id) < percentage
}

/// Pick one of `variants` for the id, evenly weighted. `None` when empty.
pub fn pick_variant<'a>(flag_key: &str, bucketing_id: &str, variants: &'a [String]) -> Option<&'a str> {
    if variants.is_empty() {
        return None;
    }

    let mut hasher = Sha256::new();
    hasher.update(b"variant:");
    hasher.update(flag_key.as_bytes());
    hasher.update(b".");
    hasher.update(bucketing_id.as_bytes());
    let hash = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&hash[..8]);
    let index = (u64::from_be_bytes(prefix) % variants.len() as u64) as usize;

    Some(variants[index].as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_is_stable() {
        let a = rollout_bucket("org.store.discount", "user-42");
        let b = rollout_bucket("org.store.discount", "user-42");
        assert_eq!(a, b);
    }

    #[test]
    fn test_bucket_range() {
        for i in 0..500 {
            let bucket = rollout_bucket("org.links.learn", &format!("user-{i}"));
            assert!((0.0..100.0).contains(&bucket));
        }
    }

    #[test]
    fn test_bucket_depends_on_flag_key() {
        // Different flags should not put every user in the same bucket
        let differs = (0..50).any(|i| {
            let id = format!("user-{i}");
            rollout_bucket("org.a.one", &id) != rollout_bucket("org.a.two", &id)
        });
        assert!(differs);
    }

    #[test]
    fn test_rollout_extremes() {
        for i in 0..200 {
            let id = format!("user-{i}");
            assert!(!in_rollout("org.forum.enabled", &id, 0.0));
            assert!(in_rollout("org.forum.enabled", &id, 100.0));
        }
    }

    #[test]
    fn test_rollout_roughly_proportional() {
        let enabled = (0..2000)
            .filter(|i| in_rollout("org.store.discount", &format!("user-{i}"), 30.0))
            .count();
        // 30% of 2000 = 600, allow generous slack
        assert!((450..750).contains(&enabled), "enabled = {enabled}");
    }

    #[test]
    fn test_pick_variant() {
        let variants = vec!["control".to_string(), "grid".to_string(), "list".to_string()];
        let first = pick_variant("org.hero.layout", "user-1", &variants).unwrap();
        assert_eq!(pick_variant("org.hero.layout", "user-1", &variants), Some(first));
        assert!(variants.iter().any(|v| v == first));
        assert_eq!(pick_variant("org.hero.layout", "user-1", &[]), None);
    }
}
