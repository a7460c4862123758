//! Collaborator traits the resolver depends on.
//!
//! Both traits are object-safe: async methods return a boxed
//! [`SurfaceFuture`]. Implementations report failures as plain strings; the
//! resolver wraps them into typed errors.

use crate::{History, TurnRef};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by collaborator methods.
pub type SurfaceFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A named template, immutable once obtained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub id: String,
    pub body: String,
}

impl PromptTemplate {
    pub fn new(id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            body: body.into(),
        }
    }
}

/// Template lookup by id.
pub trait PromptStore: Send + Sync {
    fn template<'a>(&'a self, id: &'a str) -> SurfaceFuture<'a, Option<PromptTemplate>>;
}

// ── Selectors ──────────────────────────────────────────────────────

/// Selectors used to read an AI turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSelectors {
    pub chat: String,
    pub thoughts: String,
}

/// Selectors identifying who authored a turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorSelectors {
    pub user: String,
    pub ai: AiSelectors,
}

/// How a conversation surface locates turns. Part of user-edited procedure
/// configuration, so it deserializes from the same camelCase shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatSelectors {
    pub message_turn_container: String,
    pub author_identification: AuthorSelectors,
}

// ── Conversation surface ───────────────────────────────────────────

/// Opaque reference to a located turn, valid until the next mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnHandle {
    pub target: TurnRef,
    /// Surface-specific locator (element id, history index, ...).
    pub locator: String,
}

/// An action to perform on a located turn, with resolved parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRequest {
    pub action: String,
    pub params: Vec<(String, String)>,
}

impl ActionRequest {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// The live conversation and any other conversation reachable from it.
pub trait ConversationSurface: Send + Sync {
    /// Read every turn of the current conversation, oldest first.
    fn scrape<'a>(&'a self, selectors: &'a ChatSelectors) -> SurfaceFuture<'a, Result<History, String>>;

    /// Load another conversation by id and read its turns.
    fn fetch_conversation<'a>(
        &'a self,
        source_id: &'a str,
        selectors: &'a ChatSelectors,
    ) -> SurfaceFuture<'a, Result<History, String>>;

    /// Locate a turn of the current conversation.
    fn find_turn(&self, target: TurnRef) -> SurfaceFuture<'_, Option<TurnHandle>>;

    fn perform_action<'a>(
        &'a self,
        handle: &'a TurnHandle,
        request: &'a ActionRequest,
    ) -> SurfaceFuture<'a, Result<(), String>>;
}
