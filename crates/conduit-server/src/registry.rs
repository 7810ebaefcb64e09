//! In-memory tool/prompt/resource registries. Each registry is a simple
//! name/uri-keyed map behind `parking_lot::RwLock`; mutation methods return
//! whether a list-changed notification is owed, since a duplicate
//! registration replaces an entry in place and must still fire exactly one
//! notification, not zero and not two.

use std::collections::BTreeMap;

use conduit_protocol::{Prompt, Resource, Tool};
use parking_lot::RwLock;

/// Registered tools, keyed by name.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: RwLock<BTreeMap<String, Tool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a tool. Returns `true` whenever the registry's
    /// list actually changed (insert or replace), so the caller knows to
    /// emit `notifications/tools/list_changed` exactly once.
    pub fn add(&self, tool: Tool) -> bool {
        self.tools.write().insert(tool.name.clone(), tool);
        true
    }

    pub fn remove(&self, name: &str) -> bool {
        self.tools.write().remove(name).is_some()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Tool> {
        self.tools.read().get(name).cloned()
    }

    #[must_use]
    pub fn list(&self) -> Vec<Tool> {
        self.tools.read().values().cloned().collect()
    }
}

/// Registered prompts, keyed by name.
#[derive(Debug, Default)]
pub struct PromptRegistry {
    prompts: RwLock<BTreeMap<String, Prompt>>,
}

impl PromptRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: Prompt) -> bool {
        self.prompts.write().insert(prompt.name.clone(), prompt);
        true
    }

    pub fn remove(&self, name: &str) -> bool {
        self.prompts.write().remove(name).is_some()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Prompt> {
        self.prompts.read().get(name).cloned()
    }

    #[must_use]
    pub fn list(&self) -> Vec<Prompt> {
        self.prompts.read().values().cloned().collect()
    }
}

/// Registered resources, keyed by URI.
#[derive(Debug, Default)]
pub struct ResourceRegistry {
    resources: RwLock<BTreeMap<String, Resource>>,
}

impl ResourceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, resource: Resource) -> bool {
        self.resources.write().insert(resource.uri.clone(), resource);
        true
    }

    pub fn remove(&self, uri: &str) -> bool {
        self.resources.write().remove(uri).is_some()
    }

    #[must_use]
    pub fn get(&self, uri: &str) -> Option<Resource> {
        self.resources.read().get(uri).cloned()
    }

    #[must_use]
    pub fn list(&self) -> Vec<Resource> {
        self.resources.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> Tool {
        Tool {
            name: name.to_string(),
            description: None,
            input_schema: serde_json::json!({"type": "object"}),
            output_schema: None,
        }
    }

    #[test]
    fn add_then_list_then_remove() {
        let registry = ToolRegistry::new();
        assert!(registry.add(tool("echo")));
        assert_eq!(registry.list().len(), 1);
        assert!(registry.remove("echo"));
        assert!(registry.list().is_empty());
    }

    #[test]
    fn removing_unknown_tool_reports_no_change() {
        let registry = ToolRegistry::new();
        assert!(!registry.remove("missing"));
    }

    #[test]
    fn duplicate_add_replaces_single_entry() {
        let registry = ToolRegistry::new();
        registry.add(tool("echo"));
        registry.add(tool("echo"));
        assert_eq!(registry.list().len(), 1);
    }
}
