//! Per-stream knowledge shared with the backing store.

use std::collections::{HashMap, HashSet};

/// What the client on one stream is known to hold.
///
/// Passed to [`ConfigWatcher::create_watch`](crate::ConfigWatcher::create_watch)
/// so the store can tell whether a request asks for something the client has
/// not received yet.
#[derive(Debug, Clone, Default)]
pub struct StreamState {
    ads: bool,
    known_resource_names: HashMap<String, HashSet<String>>,
}

impl StreamState {
    /// Create the state of a new stream.
    ///
    /// `ads` is true for aggregated streams carrying several resource types.
    pub fn new(ads: bool) -> Self {
        Self {
            ads,
            known_resource_names: HashMap::new(),
        }
    }

    /// Returns true if the stream is an aggregated (ADS) stream.
    pub fn is_ads(&self) -> bool {
        self.ads
    }

    /// Resource names of `type_url` the client acknowledged receiving.
    pub fn known_resource_names(&self, type_url: &str) -> Option<&HashSet<String>> {
        self.known_resource_names.get(type_url)
    }

    /// Replace the names of `type_url` known to the client.
    pub fn set_known_resource_names(&mut self, type_url: impl Into<String>, names: HashSet<String>) {
        self.known_resource_names.insert(type_url.into(), names);
    }

    /// Every type URL with known names.
    pub fn known_types(&self) -> impl Iterator<Item = &str> {
        self.known_resource_names.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_names_replace() {
        let mut state = StreamState::new(true);
        assert!(state.is_ads());
        assert!(state.known_resource_names("config").is_none());

        state.set_known_resource_names("config", HashSet::from(["a".to_string()]));
        state.set_known_resource_names(
            "config",
            HashSet::from(["b".to_string(), "c".to_string()]),
        );

        let names = state.known_resource_names("config").unwrap();
        assert_eq!(names.len(), 2);
        assert!(names.contains("b"));
        assert_eq!(state.known_types().collect::<Vec<_>>(), vec!["config"]);
    }
}
