//! Per-user "last shown images" window.
//!
//! Each user owns a recency-ordered list of image filenames (index 0 = most
//! recent) bounded to `window` entries. Storing prepends the new batch and
//! truncates; repeated filenames are not de-duplicated.
//!
//! The cache is process-wide and bounded in users as well: when a new user
//! would exceed `max_users`, the least recently touched user is evicted.
//! Concurrent stores for the same user are last-write-wins.

use std::collections::HashMap;
use std::sync::Mutex;

/// Default per-user window length.
pub const DEFAULT_WINDOW: usize = 5;

/// Default bound on tracked users.
pub const DEFAULT_MAX_USERS: usize = 10_000;

struct Entry {
    images: Vec<String>,
    touched: u64,
}

struct Inner {
    entries: HashMap<String, Entry>,
    clock: u64,
}

/// Bounded session image cache.
pub struct ImageSessions {
    window: usize,
    max_users: usize,
    inner: Mutex<Inner>,
}

impl Default for ImageSessions {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_USERS)
    }
}

impl ImageSessions {
    pub fn new(window: usize, max_users: usize) -> Self {
        Self {
            window: window.max(1),
            max_users: max_users.max(1),
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                clock: 0,
            }),
        }
    }

    /// Prepend `images` to the user's window and truncate. No-op when empty.
    pub fn store(&self, username: &str, images: &[String]) {
        if images.is_empty() {
            return;
        }
        let mut inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.clock += 1;
        let now = inner.clock;

        if !inner.entries.contains_key(username) && inner.entries.len() >= self.max_users {
            evict_oldest(&mut inner.entries);
        }

        let entry = inner
            .entries
            .entry(username.to_string())
            .or_insert_with(|| Entry {
                images: Vec::new(),
                touched: now,
            });

        let mut next = Vec::with_capacity(images.len() + entry.images.len());
        next.extend(images.iter().cloned());
        next.append(&mut entry.images);
        next.truncate(self.window);
        entry.images = next;
        entry.touched = now;
    }

    /// The user's stored images, most recent first (empty if none).
    pub fn latest(&self, username: &str) -> Vec<String> {
        let inner = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner
            .entries
            .get(username)
            .map(|e| e.images.clone())
            .unwrap_or_default()
    }

    /// The user's most recent image.
    pub fn most_recent(&self, username: &str) -> Option<String> {
        self.latest(username).into_iter().next()
    }

    pub fn user_count(&self) -> usize {
        match self.inner.lock() {
            Ok(g) => g.entries.len(),
            Err(poisoned) => poisoned.into_inner().entries.len(),
        }
    }
}

fn evict_oldest(entries: &mut HashMap<String, Entry>) {
    let oldest = entries
        .iter()
        .min_by_key(|(_, e)| e.touched)
        .map(|(k, _)| k.clone());
    if let Some(k) = oldest {
        entries.remove(&k);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imgs(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_store_is_noop() {
        let s = ImageSessions::default();
        s.store("ana", &[]);
        assert!(s.latest("ana").is_empty());
        assert_eq!(s.user_count(), 0);
    }

    #[test]
    fn test_prepend_most_recent_first() {
        let s = ImageSessions::default();
        s.store("ana", &imgs(&["a", "b"]));
        s.store("ana", &imgs(&["c"]));
        assert_eq!(s.latest("ana"), imgs(&["c", "a", "b"]));
        assert_eq!(s.most_recent("ana").as_deref(), Some("c"));
    }

    #[test]
    fn test_window_bounded_after_many_stores() {
        let s = ImageSessions::default();
        for i in 0..20 {
            s.store("ana", &imgs(&[&format!("img{}", i), &format!("alt{}", i)]));
            let latest = s.latest("ana");
            assert!(latest.len() <= DEFAULT_WINDOW);
            assert_eq!(latest[0], format!("img{}", i));
        }
        assert_eq!(
            s.latest("ana"),
            imgs(&["img19", "alt19", "img18", "alt18", "img17"])
        );
    }

    #[test]
    fn test_large_batch_truncated() {
        let s = ImageSessions::default();
        s.store("ana", &imgs(&["1", "2", "3", "4", "5", "6", "7"]));
        assert_eq!(s.latest("ana"), imgs(&["1", "2", "3", "4", "5"]));
    }

    #[test]
    fn test_duplicates_retained() {
        let s = ImageSessions::default();
        s.store("ana", &imgs(&["x"]));
        s.store("ana", &imgs(&["x"]));
        assert_eq!(s.latest("ana"), imgs(&["x", "x"]));
    }

    #[test]
    fn test_users_partitioned() {
        let s = ImageSessions::default();
        s.store("ana", &imgs(&["a"]));
        s.store("bo", &imgs(&["b"]));
        assert_eq!(s.latest("ana"), imgs(&["a"]));
        assert_eq!(s.latest("bo"), imgs(&["b"]));
        assert!(s.latest("cy").is_empty());
    }

    #[test]
    fn test_user_bound_evicts_least_recent() {
        let s = ImageSessions::new(5, 2);
        s.store("ana", &imgs(&["a"]));
        s.store("bo", &imgs(&["b"]));
        s.store("ana", &imgs(&["a2"]));
        s.store("cy", &imgs(&["c"]));
        assert_eq!(s.user_count(), 2);
        assert!(s.latest("bo").is_empty());
        assert_eq!(s.latest("ana"), imgs(&["a2", "a"]));
    }
}
