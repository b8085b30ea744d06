//! Style resources injected on behalf of temporary extensions.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

/// Handle to an injected style resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StyleHandle(u64);

/// Host capable of injecting and removing style sheets.
pub trait StyleHost: Send + Sync {
    /// Inject a style sheet for `owner`.
    fn inject(&self, owner: &str, css: &str) -> StyleHandle;

    /// Remove an injected style sheet. Unknown handles are ignored.
    fn remove(&self, handle: StyleHandle);
}

/// In-memory style sheet collection.
#[derive(Debug, Default)]
pub struct StyleSheetSet {
    next: AtomicU64,
    sheets: Mutex<IndexMap<StyleHandle, (String, String)>>,
}

impl StyleSheetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Owner and contents of every live sheet, oldest first.
    pub fn sheets(&self) -> Vec<(String, String)> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<StyleHandle, (String, String)>> {
        self.sheets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StyleHost for StyleSheetSet {
    fn inject(&self, owner: &str, css: &str) -> StyleHandle {
        let handle = StyleHandle(self.next.fetch_add(1, Ordering::Relaxed));
        self.lock()
            .insert(handle, (owner.to_string(), css.to_string()));
        handle
    }

    fn remove(&self, handle: StyleHandle) {
        self.lock().shift_remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inject_and_remove() {
        let set = StyleSheetSet::new();
        let first = set.inject("__temp-plugin-A", ".a { color: red; }");
        let second = set.inject("__temp-plugin-B", ".b {}");
        assert_ne!(first, second);
        assert_eq!(set.len(), 2);

        set.remove(first);
        set.remove(first);
        assert_eq!(
            set.sheets(),
            vec![("__temp-plugin-B".to_string(), ".b {}".to_string())]
        );
    }
}
