//! Client-local server-push routing: callbacks registered against a
//! resource uri, or against the three broadcast notification families,
//! invoked as matching `notifications/*` arrive. Structurally the mirror
//! image of `conduit_server::subscriptions::SubscriptionRegistry` (four
//! disjoint collections, scrubbed in one pass on teardown), except keyed by
//! callback id rather than session id since there is exactly one session on
//! the client side.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use conduit_protocol::{LoggingMessageNotification, ResourceUpdatedNotification};
use parking_lot::RwLock;

pub type ResourceCallback = Arc<dyn Fn(ResourceUpdatedNotification) + Send + Sync>;
pub type LogCallback = Arc<dyn Fn(LoggingMessageNotification) + Send + Sync>;
pub type ChangedCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

enum Slot {
    Resource { uri: String },
    Log,
    ToolsChanged,
    PromptsChanged,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    next_id: AtomicU64,
    slots: RwLock<std::collections::HashMap<u64, Slot>>,
    resource_callbacks: RwLock<std::collections::HashMap<String, Vec<(u64, ResourceCallback)>>>,
    log_callbacks: RwLock<Vec<(u64, LogCallback)>>,
    tools_changed_callbacks: RwLock<Vec<(u64, ChangedCallback)>>,
    prompts_changed_callbacks: RwLock<Vec<(u64, ChangedCallback)>>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn add_resource(&self, uri: impl Into<String>, callback: ResourceCallback) -> SubscriptionId {
        let uri = uri.into();
        let id = self.allocate();
        self.slots.write().insert(id, Slot::Resource { uri: uri.clone() });
        self.resource_callbacks.write().entry(uri).or_default().push((id, callback));
        SubscriptionId(id)
    }

    pub fn add_log(&self, callback: LogCallback) -> SubscriptionId {
        let id = self.allocate();
        self.slots.write().insert(id, Slot::Log);
        self.log_callbacks.write().push((id, callback));
        SubscriptionId(id)
    }

    pub fn add_tools_changed(&self, callback: ChangedCallback) -> SubscriptionId {
        let id = self.allocate();
        self.slots.write().insert(id, Slot::ToolsChanged);
        self.tools_changed_callbacks.write().push((id, callback));
        SubscriptionId(id)
    }

    pub fn add_prompts_changed(&self, callback: ChangedCallback) -> SubscriptionId {
        let id = self.allocate();
        self.slots.write().insert(id, Slot::PromptsChanged);
        self.prompts_changed_callbacks.write().push((id, callback));
        SubscriptionId(id)
    }

    /// Remove a single registration by its handle. A no-op if it was
    /// already removed (double-unsubscribe is safe).
    pub fn remove(&self, id: SubscriptionId) {
        let Some(slot) = self.slots.write().remove(&id.0) else {
            return;
        };
        match slot {
            Slot::Resource { uri } => {
                let mut callbacks = self.resource_callbacks.write();
                if let Some(list) = callbacks.get_mut(&uri) {
                    list.retain(|(entry_id, _)| *entry_id != id.0);
                    if list.is_empty() {
                        callbacks.remove(&uri);
                    }
                }
            }
            Slot::Log => self.log_callbacks.write().retain(|(entry_id, _)| *entry_id != id.0),
            Slot::ToolsChanged => self.tools_changed_callbacks.write().retain(|(entry_id, _)| *entry_id != id.0),
            Slot::PromptsChanged => self.prompts_changed_callbacks.write().retain(|(entry_id, _)| *entry_id != id.0),
        }
    }

    /// Drop every registration at once, e.g. on `close()`.
    pub fn clear(&self) {
        self.slots.write().clear();
        self.resource_callbacks.write().clear();
        self.log_callbacks.write().clear();
        self.tools_changed_callbacks.write().clear();
        self.prompts_changed_callbacks.write().clear();
    }

    /// Invoke every callback subscribed to `uri`, each on its own task so a
    /// slow or panicking callback can never stall the receive loop.
    pub fn dispatch_resource_updated(&self, notification: ResourceUpdatedNotification) {
        let callbacks = self
            .resource_callbacks
            .read()
            .get(&notification.uri)
            .cloned()
            .unwrap_or_default();
        for (_, callback) in callbacks {
            let payload = notification.clone();
            spawn_guarded(move || callback(payload));
        }
    }

    pub fn dispatch_log(&self, notification: LoggingMessageNotification) {
        let callbacks: Vec<_> = self.log_callbacks.read().clone();
        for (_, callback) in callbacks {
            let payload = notification.clone();
            spawn_guarded(move || callback(payload));
        }
    }

    pub fn dispatch_tools_changed(&self) {
        let callbacks: Vec<_> = self.tools_changed_callbacks.read().clone();
        for (_, callback) in callbacks {
            spawn_guarded(move || callback());
        }
    }

    pub fn dispatch_prompts_changed(&self) {
        let callbacks: Vec<_> = self.prompts_changed_callbacks.read().clone();
        for (_, callback) in callbacks {
            spawn_guarded(move || callback());
        }
    }
}

/// Run a callback on a blocking-safe worker task, catching panics so a
/// broken callback is logged rather than taking down the RPC runtime.
fn spawn_guarded(f: impl FnOnce() + Send + 'static) {
    tokio::task::spawn_blocking(move || {
        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(f)) {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(panic = %message, "subscription callback panicked");
        }
    });
}
