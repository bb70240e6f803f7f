use crate::ids::SystemIconIndex;
use lru::LruCache;
use std::cell::RefCell;
use std::num::NonZeroUsize;
use std::rc::Rc;

/// Cache handle shared by every component on the UI thread.
pub type SharedIconCache = Rc<RefCell<IconCache>>;

/// Process-wide mapping from item path to system icon index.
///
/// Entries are kept in insertion order. Lookups use `peek`, so reading never
/// reorders anything, and with the default unbounded capacity nothing is ever
/// evicted.
pub struct IconCache {
    entries: LruCache<String, SystemIconIndex>,
}

impl IconCache {
    pub fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
        }
    }

    /// Bounded variant. Once full, the oldest insertion is dropped first.
    pub fn with_capacity(capacity: usize) -> Self {
        match NonZeroUsize::new(capacity) {
            Some(capacity) => Self {
                entries: LruCache::new(capacity),
            },
            None => Self::new(),
        }
    }

    pub fn shared(capacity: Option<usize>) -> SharedIconCache {
        let cache = match capacity {
            Some(capacity) => Self::with_capacity(capacity),
            None => Self::new(),
        };
        Rc::new(RefCell::new(cache))
    }

    pub fn find_by_path(&self, path: &str) -> Option<SystemIconIndex> {
        self.entries.peek(&normalize_path(path)).copied()
    }

    /// Records a resolved icon. Re-inserting a known path updates the index
    /// in place.
    pub fn insert(&mut self, path: &str, index: SystemIconIndex) {
        let key = normalize_path(path);
        if let Some(existing) = self.entries.peek_mut(&key) {
            *existing = index;
            return;
        }

        if let Some((evicted, _)) = self.entries.push(key, index) {
            tracing::trace!(target: "icon_cache", "Evicted cached icon for {}", evicted);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for IconCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache key for a path. Windows paths compare case-insensitively and
/// tolerate either separator and a trailing separator.
fn normalize_path(path: &str) -> String {
    let mut key = path.trim().replace('/', "\\").to_lowercase();
    while key.ends_with('\\') && !is_bare_root(&key) {
        key.pop();
    }
    key
}

fn is_bare_root(key: &str) -> bool {
    // "c:\" and "\" keep their separator
    key == "\\" || (key.len() == 3 && key.ends_with(":\\"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_and_separator_insensitive() {
        let mut cache = IconCache::new();
        cache.insert("C:\\Users\\Public\\", SystemIconIndex(12));

        assert_eq!(cache.find_by_path("c:/users/public"), Some(SystemIconIndex(12)));
        assert_eq!(cache.find_by_path("C:\\USERS\\PUBLIC"), Some(SystemIconIndex(12)));
        assert_eq!(cache.find_by_path("C:\\Users"), None);
    }

    #[test]
    fn test_drive_root_keeps_separator() {
        assert_eq!(normalize_path("C:\\"), "c:\\");
        assert_eq!(normalize_path("C:\\\\"), "c:\\");
        assert_eq!(normalize_path("D:\\Games\\"), "d:\\games");
    }

    #[test]
    fn test_reinsert_updates_in_place() {
        let mut cache = IconCache::new();
        cache.insert("C:\\a", SystemIconIndex(1));
        cache.insert("C:\\b", SystemIconIndex(2));
        cache.insert("c:\\A", SystemIconIndex(3));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.find_by_path("C:\\a"), Some(SystemIconIndex(3)));
    }

    #[test]
    fn test_unbounded_cache_never_evicts() {
        let mut cache = IconCache::new();
        for i in 0..1000 {
            cache.insert(&format!("C:\\item{}", i), SystemIconIndex(i));
        }
        assert_eq!(cache.len(), 1000);
        assert_eq!(cache.find_by_path("C:\\item0"), Some(SystemIconIndex(0)));
    }

    #[test]
    fn test_bounded_cache_drops_oldest_insertion() {
        let mut cache = IconCache::with_capacity(2);
        cache.insert("C:\\first", SystemIconIndex(1));
        cache.insert("C:\\second", SystemIconIndex(2));

        // Reads must not refresh an entry's position
        assert!(cache.find_by_path("C:\\first").is_some());
        cache.insert("C:\\third", SystemIconIndex(3));

        assert_eq!(cache.find_by_path("C:\\first"), None);
        assert_eq!(cache.find_by_path("C:\\second"), Some(SystemIconIndex(2)));
        assert_eq!(cache.find_by_path("C:\\third"), Some(SystemIconIndex(3)));
    }
}
