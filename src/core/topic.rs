//! Topic and module name helpers
//!
//! Topic ids look like `~module_topic.rule`: the module id is everything before
//! the first underscore, the rule label follows the first dot.

/// Trim whitespace and, optionally, one leading tilde
pub fn format_name(name: &str, trim_tilde: bool) -> String {
    let name = name.trim();
    let name = if trim_tilde {
        name.strip_prefix('~').unwrap_or(name)
    } else {
        name
    };
    name.to_string()
}

/// Module id of a topic, without tilde
pub fn module_id(topic: &str) -> String {
    let head = topic.split('_').next().unwrap_or("");
    format_name(head, true)
}

/// Normalized module name for comparisons
pub fn normalize_module(module: &str) -> String {
    format_name(module, true).to_lowercase()
}

/// Current topic for `module`: the last traversed topic whose module id matches.
///
/// Rule labels are dropped and the leading tilde is removed. Empty when no
/// traversed topic belongs to the module.
pub fn resolve_topic(module: &str, topics: &[String]) -> Option<String> {
    if module.trim().is_empty() {
        return None;
    }
    let module = normalize_module(module);

    topics
        .iter()
        .map(|t| t.split('.').next().unwrap_or(""))
        .filter(|t| module_id(t).to_lowercase() == module)
        .last()
        .map(|t| format_name(t, true))
        .filter(|t| !t.is_empty())
}
