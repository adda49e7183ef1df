//! Content catalog: authored fallback metadata per module, content id and topic

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::types::{FallbackContext, NodeFallback};

/// Read-only lookup of authored fallback metadata
pub trait ContentCatalog {
    /// Fallback metadata for a topic (default when nothing is authored)
    fn node_fallback(&self, module: &str, topic: &str) -> NodeFallback;
    /// Context authored for the whole module
    fn module_context(&self, module: &str) -> FallbackContext;
    /// Context authored for a content id within the module
    fn content_context(&self, module: &str, content_id: &str) -> FallbackContext;
    /// Context used when nothing more specific exists
    fn default_context(&self) -> FallbackContext;
}

/// Fallback metadata for one module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleEntry {
    #[serde(default)]
    pub context: FallbackContext,
    #[serde(default)]
    pub content: BTreeMap<String, FallbackContext>,
    #[serde(default)]
    pub topics: BTreeMap<String, NodeFallback>,
}

/// In-memory catalog, loadable from JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticCatalog {
    #[serde(default)]
    pub default_context: FallbackContext,
    #[serde(default)]
    pub modules: BTreeMap<String, ModuleEntry>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn module(&self, module: &str) -> Option<&ModuleEntry> {
        self.modules.get(module)
    }

    /// Builder: author metadata for a topic
    pub fn with_topic(mut self, module: &str, topic: &str, node: NodeFallback) -> Self {
        self.modules
            .entry(module.to_string())
            .or_default()
            .topics
            .insert(topic.to_string(), node);
        self
    }

    /// Builder: author a module-wide context
    pub fn with_module_context(mut self, module: &str, context: FallbackContext) -> Self {
        self.modules.entry(module.to_string()).or_default().context = context;
        self
    }

    /// Builder: author a content-id context
    pub fn with_content_context(mut self, module: &str, content_id: &str, context: FallbackContext) -> Self {
        self.modules
            .entry(module.to_string())
            .or_default()
            .content
            .insert(content_id.to_string(), context);
        self
    }

    /// Builder: the global default context
    pub fn with_default_context(mut self, context: FallbackContext) -> Self {
        self.default_context = context;
        self
    }
}

impl ContentCatalog for StaticCatalog {
    fn node_fallback(&self, module: &str, topic: &str) -> NodeFallback {
        self.module(module)
            .and_then(|m| m.topics.get(topic))
            .cloned()
            .unwrap_or_default()
    }

    fn module_context(&self, module: &str) -> FallbackContext {
        self.module(module).map(|m| m.context.clone()).unwrap_or_default()
    }

    fn content_context(&self, module: &str, content_id: &str) -> FallbackContext {
        self.module(module)
            .and_then(|m| m.content.get(content_id))
            .cloned()
            .unwrap_or_default()
    }

    fn default_context(&self) -> FallbackContext {
        self.default_context.clone()
    }
}
