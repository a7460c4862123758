//! Per-session state threaded through every resolver call.

use crate::{ConduitTable, History};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key/value store for session variables (`$name`).
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
}

/// In-memory [`SessionStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionMemory {
    vars: HashMap<String, String>,
}

impl SessionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn vars(&self) -> &HashMap<String, String> {
        &self.vars
    }
}

impl SessionStore for SessionMemory {
    fn get(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.vars.insert(key.to_string(), value);
    }
}

/// Everything a resolution reads and mutates: session variables, the scraped
/// history of the live conversation, and mounted conduits.
///
/// One context lives as long as a user session. The resolver clears the
/// scrape memo at the start of every top-level call.
pub struct SessionContext {
    memory: Box<dyn SessionStore>,
    history: History,
    conduits: ConduitTable,
    scraped: bool,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self::with_store(SessionMemory::new())
    }

    pub fn with_store(store: impl SessionStore + 'static) -> Self {
        Self {
            memory: Box::new(store),
            history: History::new(),
            conduits: ConduitTable::new(),
            scraped: false,
        }
    }

    pub fn var(&self, key: &str) -> Option<String> {
        self.memory.get(key)
    }

    pub fn set_var(&mut self, key: &str, value: impl Into<String>) {
        self.memory.set(key, value.into());
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Replace the history wholesale and mark it as scraped for this call.
    pub fn set_history(&mut self, history: History) {
        self.history = history;
        self.scraped = true;
    }

    pub fn conduits(&self) -> &ConduitTable {
        &self.conduits
    }

    pub fn conduit(&self, alias: &str) -> Option<&History> {
        self.conduits.get(alias)
    }

    /// Commit a fully fetched conduit. Replaces any previous entry.
    pub fn commit_conduit(&mut self, alias: impl Into<String>, history: History) {
        self.conduits.insert(alias.into(), history);
    }

    pub fn is_scraped(&self) -> bool {
        self.scraped
    }

    /// Mark the scrape as attempted without replacing the history.
    pub fn mark_scraped(&mut self) {
        self.scraped = true;
    }

    /// Forget the memoized scrape so the next access scrapes again.
    pub fn invalidate_scrape(&mut self) {
        self.scraped = false;
    }
}

impl std::fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionContext")
            .field("history", &self.history.len())
            .field("conduits", &self.conduits.keys().collect::<Vec<_>>())
            .field("scraped", &self.scraped)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Turn;

    #[test]
    fn session_memory_get_set() {
        let mut ctx = SessionContext::with_store(SessionMemory::new().with_var("a", "1"));
        assert_eq!(ctx.var("a").as_deref(), Some("1"));
        assert_eq!(ctx.var("b"), None);
        ctx.set_var("a", "2");
        assert_eq!(ctx.var("a").as_deref(), Some("2"));
    }

    #[test]
    fn scrape_memo_lifecycle() {
        let mut ctx = SessionContext::new();
        assert!(!ctx.is_scraped());
        ctx.set_history(vec![Turn::user("hi")]);
        assert!(ctx.is_scraped());
        ctx.invalidate_scrape();
        assert!(!ctx.is_scraped());
        assert_eq!(ctx.history().len(), 1);
    }

    #[test]
    fn conduit_commit_replaces_entry() {
        let mut ctx = SessionContext::new();
        assert!(ctx.conduit("x").is_none());
        ctx.commit_conduit("x", vec![Turn::user("a")]);
        ctx.commit_conduit("x", vec![Turn::user("b"), Turn::ai("c")]);
        assert_eq!(ctx.conduit("x").map(Vec::len), Some(2));
    }

    #[test]
    fn session_memory_serializes_as_map() {
        let mem = SessionMemory::new().with_var("k", "v");
        assert_eq!(serde_json::to_value(&mem).unwrap(), serde_json::json!({"k": "v"}));
    }
}
