//! Convenience re-exports for common `aetherflow` types.
//!
//! ```ignore
//! use aetherflow::prelude::*;
//! ```
//!
//! Parser internals (lexer, cursors, template spans) are left out; import
//! them from [`syntax`](crate::syntax) when needed.

// ── Core types ──────────────────────────────────────────────────────
pub use crate::{
    Author, ConduitTable, History, LAST_ACTION_STATUS, STATUS_FAILED, STATUS_SUCCESS, Turn,
    TurnRef,
};

// ── Resolution ──────────────────────────────────────────────────────
pub use crate::config::{MissingTemplate, ResolverConfig};
pub use crate::context::{SessionContext, SessionMemory, SessionStore};
pub use crate::error::{
    ActionError, AggregateError, DataLinkError, LinkFailure, ResolveError, SyntaxError,
};
pub use crate::resolver::{OverrideMap, Resolution, Resolver};

// ── Collaborators ───────────────────────────────────────────────────
pub use crate::fixture::Fixture;
pub use crate::library::PromptLibrary;
pub use crate::surface::{
    ActionRequest, ChatSelectors, ConversationSurface, PromptStore, PromptTemplate,
    SurfaceFuture, TurnHandle,
};

// ── Events ──────────────────────────────────────────────────────────
pub use crate::events::{
    ChannelHandler, CompositeEventHandler, EventHandler, EventLog, EventObserver, EventRecord,
    FnEventHandler, LoggingHandler, NoopHandler, Pass, ResolverEvent,
};
