//! Prompt library: templates parsed from prompt files.
//!
//! A prompt file carries up to three marked sections:
//!
//! ```text
//! ~~####PROMPT_BEFORE####~~
//! Markdown shown in the library listing.
//! ~~####SYSTEM_INSTRUCTIONS####~~
//! The template body, with {{placeholders}}.
//! ~~####PROMPT_AFTER####~~
//! ```
//!
//! Entries get ids `SI-001`, `SI-002`, ... by position: base sources first,
//! then user imports in import order. Sources are local paths or `http(s)`
//! URLs, fetched concurrently; one failing source never blocks the rest.

use crate::surface::{PromptStore, PromptTemplate, SurfaceFuture};
use futures::future::join_all;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const BEFORE_MARKER: &str = "~~####PROMPT_BEFORE####~~";
pub const INSTRUCTIONS_MARKER: &str = "~~####SYSTEM_INSTRUCTIONS####~~";
pub const AFTER_MARKER: &str = "~~####PROMPT_AFTER####~~";

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Id for the entry at 0-based `index`.
pub fn prompt_id(index: usize) -> String {
    format!("SI-{:03}", index + 1)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptEntry {
    pub id: String,
    /// Library preview text; empty for user imports.
    pub markdown: String,
    /// Template body.
    pub instructions: String,
}

/// Text between `start` and `end` markers, trimmed.
fn section<'t>(text: &'t str, start: &str, end: &str) -> Option<&'t str> {
    let (_, after_start) = text.split_once(start)?;
    let (inner, _) = after_start.split_once(end)?;
    Some(inner.trim())
}

/// Parse a base prompt file. Files without an instructions section are
/// rejected; the preview is optional.
pub fn parse_prompt_text(raw: &str, index: usize) -> Option<PromptEntry> {
    let instructions = section(raw, INSTRUCTIONS_MARKER, AFTER_MARKER)?;
    let markdown = section(raw, BEFORE_MARKER, INSTRUCTIONS_MARKER).unwrap_or_default();
    Some(PromptEntry {
        id: prompt_id(index),
        markdown: markdown.to_string(),
        instructions: instructions.to_string(),
    })
}

/// Result of fetching a list of sources.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Contents of the sources that loaded, in source order.
    pub texts: Vec<String>,
    /// `(source, error)` for every source that did not.
    pub failures: Vec<(String, String)>,
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

async fn fetch_remote(client: &reqwest::Client, url: &str) -> Result<String, String> {
    let resp = client.get(url).send().await.map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("HTTP {}", resp.status()));
    }
    resp.text().await.map_err(|e: reqwest::Error| e.to_string())
}

/// Read one source, local or remote.
pub async fn fetch_source(client: &reqwest::Client, source: &str) -> Result<String, String> {
    if is_remote(source) {
        fetch_remote(client, source).await
    } else {
        tokio::fs::read_to_string(source)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Fetch every source concurrently and wait for all of them to settle.
pub async fn fetch_sources(sources: &[String]) -> FetchReport {
    let client = match reqwest::Client::builder().timeout(FETCH_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            warn!("HTTP client unavailable, remote sources will fail: {e}");
            reqwest::Client::new()
        }
    };
    let results = join_all(sources.iter().map(|s| fetch_source(&client, s))).await;

    let mut report = FetchReport::default();
    for (source, result) in sources.iter().zip(results) {
        match result {
            Ok(text) if !text.is_empty() => report.texts.push(text),
            Ok(_) => report.failures.push((source.clone(), "empty".into())),
            Err(e) => {
                warn!("Failed to fetch prompt from {source}: {e}");
                report.failures.push((source.clone(), e));
            }
        }
    }
    info!(
        "Loaded {} of {} prompt source(s)",
        report.texts.len(),
        sources.len()
    );
    report
}

/// Base prompts plus user imports, addressable by id.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PromptLibrary {
    base: Vec<PromptEntry>,
    user: Vec<PromptEntry>,
    /// Number of base texts, parsed or not; user ids continue after it.
    base_len: usize,
}

impl PromptLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from base prompt texts. Texts without the required markers are
    /// skipped but still consume their id.
    pub fn from_texts(texts: &[String]) -> Self {
        let mut base = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            match parse_prompt_text(text, i) {
                Some(entry) => base.push(entry),
                None => warn!("Skipping prompt {}: missing markers", prompt_id(i)),
            }
        }
        Self {
            base,
            user: Vec::new(),
            base_len: texts.len(),
        }
    }

    /// Fetch `sources` and build the base library from what loaded.
    pub async fn load(sources: &[String]) -> (Self, FetchReport) {
        let report = fetch_sources(sources).await;
        (Self::from_texts(&report.texts), report)
    }

    /// Add a user prompt. Marked content contributes its instructions
    /// section; anything else is used whole.
    pub fn import(&mut self, content: &str) -> &PromptEntry {
        let instructions = match section(content, INSTRUCTIONS_MARKER, AFTER_MARKER) {
            Some(inner) => inner.to_string(),
            None => {
                warn!("Imported prompt has no markers, using entire content");
                content.to_string()
            }
        };
        let id = prompt_id(self.base_len + self.user.len());
        debug!("Imported prompt {id}");
        let index = self.user.len();
        self.user.push(PromptEntry {
            id,
            markdown: String::new(),
            instructions,
        });
        &self.user[index]
    }

    /// Fetch a single source and import it.
    pub async fn import_source(&mut self, source: &str) -> Result<&PromptEntry, String> {
        let client = reqwest::Client::new();
        let content = fetch_source(&client, source).await?;
        Ok(self.import(&content))
    }

    pub fn entries(&self) -> impl Iterator<Item = &PromptEntry> {
        self.base.iter().chain(self.user.iter())
    }

    pub fn get(&self, id: &str) -> Option<&PromptEntry> {
        self.entries().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.base.len() + self.user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PromptStore for PromptLibrary {
    fn template<'a>(&'a self, id: &'a str) -> SurfaceFuture<'a, Option<PromptTemplate>> {
        Box::pin(async move {
            self.get(id)
                .map(|e| PromptTemplate::new(e.id.clone(), e.instructions.clone()))
        })
    }
}
