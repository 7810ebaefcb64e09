//! Server-push subscription bookkeeping. Four independent collections, one
//! per notification family, so a session dropping a resource subscription
//! never disturbs its tools/prompts/log registrations and vice versa.
//!
//! All collections use `parking_lot::RwLock` rather than an async lock:
//! every operation here is a short, synchronous map/set mutation that never
//! holds the lock across an `.await`.

use std::collections::{BTreeMap, HashSet};

use conduit_core::LogLevel;
use parking_lot::RwLock;

/// Tracks which sessions want which server-push notifications.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    /// Resource URI -> subscribed session ids, insertion-ordered so fan-out
    /// delivery order is stable and reproducible in tests.
    resources: RwLock<BTreeMap<String, Vec<String>>>,
    tools_list_changed: RwLock<HashSet<String>>,
    prompts_list_changed: RwLock<HashSet<String>>,
    /// Session id -> minimum severity the session wants to receive.
    log_subscribers: RwLock<BTreeMap<String, LogLevel>>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_resource(&self, uri: &str, session_id: &str) {
        let mut resources = self.resources.write();
        let subscribers = resources.entry(uri.to_string()).or_default();
        if !subscribers.iter().any(|s| s == session_id) {
            subscribers.push(session_id.to_string());
        }
    }

    pub fn unsubscribe_resource(&self, uri: &str, session_id: &str) {
        let mut resources = self.resources.write();
        if let Some(subscribers) = resources.get_mut(uri) {
            subscribers.retain(|s| s != session_id);
            if subscribers.is_empty() {
                resources.remove(uri);
            }
        }
    }

    #[must_use]
    pub fn resource_subscribers(&self, uri: &str) -> Vec<String> {
        self.resources.read().get(uri).cloned().unwrap_or_default()
    }

    pub fn subscribe_tools_list_changed(&self, session_id: &str) {
        self.tools_list_changed.write().insert(session_id.to_string());
    }

    pub fn subscribe_prompts_list_changed(&self, session_id: &str) {
        self.prompts_list_changed.write().insert(session_id.to_string());
    }

    #[must_use]
    pub fn tools_list_changed_subscribers(&self) -> Vec<String> {
        self.tools_list_changed.read().iter().cloned().collect()
    }

    #[must_use]
    pub fn prompts_list_changed_subscribers(&self) -> Vec<String> {
        self.prompts_list_changed.read().iter().cloned().collect()
    }

    pub fn set_log_level(&self, session_id: &str, level: LogLevel) {
        self.log_subscribers.write().insert(session_id.to_string(), level);
    }

    /// The threshold in effect for `session_id`: whatever it last passed to
    /// `logging/setLevel`, or [`LogLevel::default_threshold`] if it never
    /// called it. Every session receives log messages from the moment it
    /// reaches `ready`, not only after opting in.
    #[must_use]
    pub fn log_threshold_for(&self, session_id: &str) -> LogLevel {
        self.log_subscribers
            .read()
            .get(session_id)
            .copied()
            .unwrap_or_else(LogLevel::default_threshold)
    }

    /// Filter `session_ids` down to those whose effective threshold admits
    /// a message emitted at `level`.
    #[must_use]
    pub fn log_subscribers_for<'a>(&self, level: LogLevel, session_ids: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        session_ids
            .into_iter()
            .filter(|session_id| level.passes(self.log_threshold_for(session_id)))
            .map(str::to_string)
            .collect()
    }

    /// Remove every trace of a session across all four collections. Called
    /// when a session disconnects so a dead session id can never leak into
    /// a later fan-out.
    pub fn scrub_session(&self, session_id: &str) {
        let mut resources = self.resources.write();
        resources.retain(|_, subscribers| {
            subscribers.retain(|s| s != session_id);
            !subscribers.is_empty()
        });
        drop(resources);
        self.tools_list_changed.write().remove(session_id);
        self.prompts_list_changed.write().remove(session_id);
        self.log_subscribers.write().remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_subscription_round_trip() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe_resource("file:///a", "s1");
        registry.subscribe_resource("file:///a", "s2");
        assert_eq!(registry.resource_subscribers("file:///a"), vec!["s1", "s2"]);

        registry.unsubscribe_resource("file:///a", "s1");
        assert_eq!(registry.resource_subscribers("file:///a"), vec!["s2"]);
    }

    #[test]
    fn duplicate_subscribe_is_not_duplicated() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe_resource("file:///a", "s1");
        registry.subscribe_resource("file:///a", "s1");
        assert_eq!(registry.resource_subscribers("file:///a").len(), 1);
    }

    #[test]
    fn log_level_filtering_is_inclusive_of_more_severe() {
        let registry = SubscriptionRegistry::new();
        registry.set_log_level("s1", LogLevel::Warning);
        assert!(registry.log_subscribers_for(LogLevel::Error, ["s1"]).contains(&"s1".to_string()));
        assert!(!registry.log_subscribers_for(LogLevel::Info, ["s1"]).contains(&"s1".to_string()));
    }

    #[test]
    fn sessions_receive_error_level_by_default_without_set_log_level() {
        let registry = SubscriptionRegistry::new();
        assert_eq!(registry.log_threshold_for("s1"), LogLevel::default_threshold());
        assert!(registry.log_subscribers_for(LogLevel::Error, ["s1"]).contains(&"s1".to_string()));
        assert!(!registry.log_subscribers_for(LogLevel::Debug, ["s1"]).contains(&"s1".to_string()));
    }

    #[test]
    fn scrub_session_removes_from_every_collection() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe_resource("file:///a", "s1");
        registry.subscribe_tools_list_changed("s1");
        registry.subscribe_prompts_list_changed("s1");
        registry.set_log_level("s1", LogLevel::Debug);

        registry.scrub_session("s1");

        assert!(registry.resource_subscribers("file:///a").is_empty());
        assert!(registry.tools_list_changed_subscribers().is_empty());
        assert!(registry.prompts_list_changed_subscribers().is_empty());
        // The session's explicit Debug threshold is gone; scrubbing falls
        // back to the default rather than leaving a stale entry behind.
        assert_eq!(registry.log_threshold_for("s1"), LogLevel::default_threshold());
    }
}
