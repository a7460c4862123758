//! Portal, link, and conduit resolution for conversation scripts.
//!
//! `aetherflow` turns user-authored script text into the final string sent to
//! a model. Scripts may contain three kinds of syntax:
//!
//! - **Mount directives** (`#> mount['notes'] from 'chat-42'`) that pull the
//!   history of another conversation into the session under an alias
//!   ("conduits").
//! - **Portals** (`~{{~ ... ~}}~`), inline expressions that either expand a
//!   named prompt template with parameters (data portals) or perform an action
//!   on a turn of the live conversation (action portals). Portals nest; the
//!   innermost one is always resolved first.
//! - **Links** (`$name`, `@USER-1`, `@notes:AI-2:thoughts`) that read a
//!   session variable or a field of a conversation turn.
//!
//! The core abstraction is the [`Resolver`](resolver::Resolver). It borrows
//! the three external capabilities it needs (a
//! [`PromptStore`](surface::PromptStore), a
//! [`ConversationSurface`](surface::ConversationSurface) and the
//! [`SessionStore`](context::SessionStore) inside a
//! [`SessionContext`](context::SessionContext)) and drives a two-phase
//! protocol: a strict primary pass that reports every unresolved link at once,
//! and a best-effort retry pass that accepts caller-supplied overrides.
//!
//! # Getting started
//!
//! ```ignore
//! use aetherflow::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ResolveError> {
//!     let fixture = Fixture::default()
//!         .with_turn(Turn::user("What is a monad?"))
//!         .with_template("SI-001", "Explain: {{topic}}");
//!
//!     let mut ctx = SessionContext::new();
//!     let resolver = Resolver::new(&fixture, &fixture, ResolverConfig::default())
//!         .with_event_handler(&LoggingHandler);
//!
//!     let text = resolver
//!         .parse(&mut ctx, "~{{~'SI-001'[topic: @USER-1]~}}~")
//!         .await?;
//!     assert_eq!(text, "Explain: What is a monad?");
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`syntax`] | Typed syntax tree, template scanner, parameter/link/portal parsers |
//! | [`resolver`] | [`Resolver`](resolver::Resolver): conduit mounting, portal loop, actions, retry |
//! | [`context`] | [`SessionContext`](context::SessionContext), session variables |
//! | [`surface`] | Collaborator traits: prompt store and conversation surface |
//! | [`events`] | Lifecycle [`EventRecord`](events::EventRecord)s and handlers |
//! | [`library`] | Prompt-file library backed by local or remote sources |
//! | [`fixture`] | In-memory collaborators for tests and the CLI |

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod fixture;
pub mod library;
pub mod prelude;
pub mod resolver;
pub mod surface;
pub mod syntax;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

// ── Constants ──────────────────────────────────────────────────────

/// Session variable written by every action portal.
pub const LAST_ACTION_STATUS: &str = "__lastActionStatus";

/// Value of [`LAST_ACTION_STATUS`] after a successful action.
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// Value of [`LAST_ACTION_STATUS`] after a failed action.
pub const STATUS_FAILED: &str = "FAILED";

// ── Conversation types ─────────────────────────────────────────────

/// Author of a conversation turn.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    User,
    Ai,
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Author::User => write!(f, "USER"),
            Author::Ai => write!(f, "AI"),
        }
    }
}

impl FromStr for Author {
    type Err = String;

    /// Parses the case-sensitive script spelling (`USER` / `AI`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USER" => Ok(Author::User),
            "AI" => Ok(Author::Ai),
            other => Err(format!("unknown author '{other}' (expected USER or AI)")),
        }
    }
}

/// One authored message in a conversation.
///
/// User turns carry `content`; AI turns carry the visible `chat` text and the
/// model's `thoughts`. The pairing is enforced by the variant.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "author", rename_all = "lowercase")]
pub enum Turn {
    User {
        #[serde(default)]
        content: String,
    },
    Ai {
        #[serde(default)]
        chat: String,
        #[serde(default)]
        thoughts: String,
    },
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Turn::User {
            content: content.into(),
        }
    }

    pub fn ai(chat: impl Into<String>) -> Self {
        Turn::Ai {
            chat: chat.into(),
            thoughts: String::new(),
        }
    }

    pub fn ai_with_thoughts(chat: impl Into<String>, thoughts: impl Into<String>) -> Self {
        Turn::Ai {
            chat: chat.into(),
            thoughts: thoughts.into(),
        }
    }

    pub fn author(&self) -> Author {
        match self {
            Turn::User { .. } => Author::User,
            Turn::Ai { .. } => Author::Ai,
        }
    }

    /// The turn's primary visible text (`content` or `chat`).
    pub fn text(&self) -> &str {
        match self {
            Turn::User { content } => content,
            Turn::Ai { chat, .. } => chat,
        }
    }
}

/// Ordered conversation history, oldest turn first.
pub type History = Vec<Turn>;

/// Mounted conversation histories keyed by alias.
pub type ConduitTable = HashMap<String, History>;

/// Author-relative address of a turn: `USER-1` is the latest user turn.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TurnRef {
    pub author: Author,
    /// 1-based position counted from the most recent turn of `author`.
    pub index: u32,
}

impl TurnRef {
    pub fn new(author: Author, index: u32) -> Self {
        Self { author, index }
    }

    /// Select the referenced turn from `history`, or `None` when out of range.
    ///
    /// An index of `0` never matches.
    pub fn select<'h>(&self, history: &'h [Turn]) -> Option<&'h Turn> {
        let nth = usize::try_from(self.index).ok()?.checked_sub(1)?;
        history
            .iter()
            .rev()
            .filter(|t| t.author() == self.author)
            .nth(nth)
    }

    /// Position of the referenced turn within `history`.
    pub fn position(&self, history: &[Turn]) -> Option<usize> {
        let nth = usize::try_from(self.index).ok()?.checked_sub(1)?;
        history
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, t)| t.author() == self.author)
            .nth(nth)
            .map(|(i, _)| i)
    }
}

impl fmt::Display for TurnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.author, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> History {
        vec![
            Turn::user("U1"),
            Turn::ai("A1"),
            Turn::user("U2"),
            Turn::ai_with_thoughts("A2", "T2"),
            Turn::user("U3"),
        ]
    }

    #[test]
    fn turn_ref_counts_from_latest() {
        let h = history();
        assert_eq!(TurnRef::new(Author::User, 1).select(&h), Some(&Turn::user("U3")));
        assert_eq!(TurnRef::new(Author::User, 3).select(&h), Some(&Turn::user("U1")));
        assert_eq!(TurnRef::new(Author::User, 4).select(&h), None);
        assert_eq!(TurnRef::new(Author::Ai, 1).select(&h).map(Turn::text), Some("A2"));
    }

    #[test]
    fn turn_ref_zero_never_matches() {
        assert!(TurnRef::new(Author::User, 0).select(&history()).is_none());
        assert!(TurnRef::new(Author::User, 0).position(&history()).is_none());
    }

    #[test]
    fn turn_ref_position_indexes_full_history() {
        let h = history();
        assert_eq!(TurnRef::new(Author::Ai, 2).position(&h), Some(1));
        assert_eq!(TurnRef::new(Author::User, 1).position(&h), Some(4));
    }

    #[test]
    fn turn_serde_uses_author_tag() {
        let json = serde_json::json!([
            {"author": "user", "content": "hi"},
            {"author": "ai", "chat": "hello", "thoughts": "greet"}
        ]);
        let turns: History = serde_json::from_value(json).unwrap();
        assert_eq!(turns[0], Turn::user("hi"));
        assert_eq!(turns[1], Turn::ai_with_thoughts("hello", "greet"));
    }

    #[test]
    fn author_parses_script_spelling_only() {
        assert_eq!("USER".parse::<Author>().unwrap(), Author::User);
        assert_eq!("AI".parse::<Author>().unwrap(), Author::Ai);
        assert!("user".parse::<Author>().is_err());
    }
}
