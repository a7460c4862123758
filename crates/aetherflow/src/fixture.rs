//! In-memory collaborators.
//!
//! A [`Fixture`] implements both [`PromptStore`] and [`ConversationSurface`]
//! over plain data and can seed a [`SessionMemory`]. It is what the CLI
//! resolves against and what the tests drive. Loadable from JSON:
//!
//! ```json
//! {
//!   "history": [{"author": "user", "content": "hi"}],
//!   "conversations": {"chat-7": [{"author": "ai", "chat": "old answer"}]},
//!   "templates": {"SI-001": "Summarize: {{text}}"},
//!   "variables": {"tone": "dry"}
//! }
//! ```

use crate::context::SessionMemory;
use crate::surface::{
    ActionRequest, ChatSelectors, ConversationSurface, PromptStore, PromptTemplate,
    SurfaceFuture, TurnHandle,
};
use crate::{History, Turn, TurnRef};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

/// One action the fixture performed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRecord {
    pub target: TurnRef,
    pub action: String,
    pub params: Vec<(String, String)>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixture {
    /// The live conversation.
    history: Mutex<History>,
    /// Conversations reachable by source id for conduit mounts.
    conversations: HashMap<String, History>,
    templates: BTreeMap<String, String>,
    variables: HashMap<String, String>,
    /// Artificial latency per source id, in milliseconds.
    fetch_delays_ms: HashMap<String, u64>,
    /// When set, every scrape of the live conversation fails with this text.
    scrape_error: Option<String>,
    #[serde(skip)]
    actions: Mutex<Vec<ActionRecord>>,
    #[serde(skip)]
    clipboard: Mutex<Option<String>>,
    #[serde(skip)]
    scrapes: Mutex<usize>,
}

impl Fixture {
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("invalid fixture: {e}"))
    }

    pub async fn load(path: &Path) -> Result<Self, String> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
        Self::from_json(&json)
    }

    pub fn with_turn(mut self, turn: Turn) -> Self {
        if let Ok(history) = self.history.get_mut() {
            history.push(turn);
        }
        self
    }

    pub fn with_history(mut self, turns: impl IntoIterator<Item = Turn>) -> Self {
        if let Ok(history) = self.history.get_mut() {
            history.extend(turns);
        }
        self
    }

    pub fn with_template(mut self, id: impl Into<String>, body: impl Into<String>) -> Self {
        self.templates.insert(id.into(), body.into());
        self
    }

    pub fn with_conversation(mut self, source_id: impl Into<String>, history: History) -> Self {
        self.conversations.insert(source_id.into(), history);
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn with_fetch_delay(mut self, source_id: impl Into<String>, delay: Duration) -> Self {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.fetch_delays_ms.insert(source_id.into(), ms);
        self
    }

    pub fn with_scrape_error(mut self, error: impl Into<String>) -> Self {
        self.scrape_error = Some(error.into());
        self
    }

    /// Session variables to seed a [`SessionContext`](crate::context::SessionContext) with.
    pub fn session_memory(&self) -> SessionMemory {
        self.variables
            .iter()
            .fold(SessionMemory::new(), |mem, (k, v)| mem.with_var(k, v))
    }

    /// Current state of the live conversation.
    pub fn history(&self) -> History {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<ActionRecord> {
        self.actions.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Text placed there by the last `copy` action.
    pub fn clipboard(&self) -> Option<String> {
        self.clipboard.lock().ok().and_then(|c| c.clone())
    }

    /// How many times the live conversation has been scraped.
    pub fn scrape_count(&self) -> usize {
        self.scrapes.lock().map(|n| *n).unwrap_or_default()
    }

    fn apply(&self, handle: &TurnHandle, request: &ActionRequest) -> Result<(), String> {
        let index: usize = handle
            .locator
            .parse()
            .map_err(|_| format!("stale handle '{}'", handle.locator))?;
        let mut history = self
            .history
            .lock()
            .map_err(|_| "history lock poisoned".to_string())?;
        let turn = history
            .get_mut(index)
            .filter(|t| t.author() == handle.target.author)
            .ok_or_else(|| format!("{} is no longer present", handle.target))?;

        match request.action.as_str() {
            "delete" => {
                history.remove(index);
            }
            "edit" => {
                let new_text = request
                    .param("new_text")
                    .ok_or("edit requires new_text")?
                    .to_string();
                match turn {
                    Turn::User { content } => *content = new_text,
                    Turn::Ai { chat, .. } => *chat = new_text,
                }
            }
            "copy" => {
                let copied = match request.param("format").unwrap_or("text") {
                    "text" => turn.text().to_string(),
                    "json" => serde_json::to_string(turn).map_err(|e| e.to_string())?,
                    other => return Err(format!("unsupported copy format '{other}'")),
                };
                if let Ok(mut clipboard) = self.clipboard.lock() {
                    *clipboard = Some(copied);
                }
            }
            "rerun" | "branch" => {}
            other => return Err(format!("unsupported action '{other}'")),
        }
        drop(history);

        if let Ok(mut actions) = self.actions.lock() {
            actions.push(ActionRecord {
                target: handle.target,
                action: request.action.clone(),
                params: request.params.clone(),
            });
        }
        Ok(())
    }
}

impl PromptStore for Fixture {
    fn template<'a>(&'a self, id: &'a str) -> SurfaceFuture<'a, Option<PromptTemplate>> {
        Box::pin(async move {
            self.templates
                .get(id)
                .map(|body| PromptTemplate::new(id, body.clone()))
        })
    }
}

impl ConversationSurface for Fixture {
    fn scrape<'a>(&'a self, _selectors: &'a ChatSelectors) -> SurfaceFuture<'a, Result<History, String>> {
        Box::pin(async move {
            if let Ok(mut n) = self.scrapes.lock() {
                *n += 1;
            }
            if let Some(err) = &self.scrape_error {
                return Err(err.clone());
            }
            Ok(self.history())
        })
    }

    fn fetch_conversation<'a>(
        &'a self,
        source_id: &'a str,
        _selectors: &'a ChatSelectors,
    ) -> SurfaceFuture<'a, Result<History, String>> {
        Box::pin(async move {
            if let Some(ms) = self.fetch_delays_ms.get(source_id) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            debug!("Fixture fetch of '{source_id}'");
            self.conversations
                .get(source_id)
                .cloned()
                .ok_or_else(|| format!("conversation '{source_id}' not found"))
        })
    }

    fn find_turn(&self, target: TurnRef) -> SurfaceFuture<'_, Option<TurnHandle>> {
        Box::pin(async move {
            let history = self.history.lock().ok()?;
            target.position(&history).map(|i| TurnHandle {
                target,
                locator: i.to_string(),
            })
        })
    }

    fn perform_action<'a>(
        &'a self,
        handle: &'a TurnHandle,
        request: &'a ActionRequest,
    ) -> SurfaceFuture<'a, Result<(), String>> {
        Box::pin(async move { self.apply(handle, request) })
    }
}
