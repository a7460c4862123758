//! The resolution engine.
//!
//! A top-level call runs in three phases:
//!
//! 1. **Mount**: every `#> mount[...]` directive is fetched concurrently and
//!    committed to the conduit table; directive lines are stripped.
//! 2. **Scrape**: the live conversation is read once and memoized on the
//!    [`SessionContext`] for the rest of the call.
//! 3. **Resolve**: the leftmost innermost portal is executed and spliced in
//!    until none remain.
//!
//! [`Resolver::parse`] is the strict primary pass; any unresolved link fails
//! the call with an [`AggregateError`] listing all of them.
//! [`Resolver::parse_with_overrides`] is the best-effort retry pass.

mod action;
mod conduit;
mod link;
mod portal;

use crate::config::ResolverConfig;
use crate::context::SessionContext;
use crate::error::{AggregateError, DataLinkError, ResolveError};
use crate::events::{EventHandler, EventRecord, NoopHandler, Pass, ResolverEvent};
use crate::surface::{ConversationSurface, PromptStore};
use crate::syntax::{Template, extract_mounts};
use std::collections::HashMap;
use tracing::{debug, warn};

pub use portal::fill_placeholders;

/// Failed token → replacement text, applied before a retry pass.
///
/// Link tokens (`@USER-1`, `$name`) are substituted wherever they appear in
/// the script. Template tokens (`'id'`) replace the output of every data
/// portal naming that template.
pub type OverrideMap = HashMap<String, String>;

/// Output of a retry pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub text: String,
    /// Links that still failed; their spans were emptied.
    pub warnings: Vec<DataLinkError>,
}

impl Resolution {
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Resolves scripts against borrowed collaborators.
pub struct Resolver<'a> {
    store: &'a dyn PromptStore,
    surface: &'a dyn ConversationSurface,
    config: ResolverConfig,
    handler: &'a dyn EventHandler,
}

impl<'a> Resolver<'a> {
    pub fn new(
        store: &'a dyn PromptStore,
        surface: &'a dyn ConversationSurface,
        config: ResolverConfig,
    ) -> Self {
        Self {
            store,
            surface,
            config,
            handler: &NoopHandler,
        }
    }

    pub fn with_event_handler(mut self, handler: &'a dyn EventHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Primary pass: resolve `text` completely or report every unresolved
    /// link at once.
    ///
    /// Hard errors (syntax, action) propagate as soon as they occur. Actions
    /// that ran before a failure are not rolled back.
    pub async fn parse(&self, ctx: &mut SessionContext, text: &str) -> Result<String, ResolveError> {
        let mut run = Run::new(self, Pass::Primary);
        run.emit(ResolverEvent::ParseStarted {
            chars: text.chars().count(),
        });
        let template = run.prepare(ctx, text).await;
        let result = run.resolve_template(ctx, template).await.and_then(|resolved| {
            if run.errors.is_empty() {
                Ok(resolved)
            } else {
                Err(AggregateError {
                    errors: std::mem::take(&mut run.errors),
                }
                .into())
            }
        });
        run.finish(result.as_ref().map(|t| (t.as_str(), 0)));
        result
    }

    /// Retry pass: substitute `overrides` as protected literal text at every
    /// exact token occurrence, then resolve. Links that still fail are emptied
    /// and returned as warnings instead of failing the call.
    pub async fn parse_with_overrides(
        &self,
        ctx: &mut SessionContext,
        text: &str,
        overrides: &OverrideMap,
    ) -> Result<Resolution, ResolveError> {
        let mut run = Run::new(self, Pass::Retry);
        run.emit(ResolverEvent::ParseStarted {
            chars: text.chars().count(),
        });
        let mut template = run.prepare(ctx, text).await;
        let (templates, links): (OverrideMap, OverrideMap) = overrides
            .clone()
            .into_iter()
            .partition(|(key, _)| portal::is_template_token(key));
        let substitutions = apply_overrides(&mut template, &links);
        run.template_overrides = templates;
        run.emit(ResolverEvent::OverridesApplied { substitutions });
        let result = run.resolve_template(ctx, template).await.map(|text| Resolution {
            text,
            warnings: std::mem::take(&mut run.errors),
        });
        for warning in result.iter().flat_map(|r| &r.warnings) {
            warn!("Unresolved after retry: {warning}");
        }
        run.finish(result.as_ref().map(|r| (r.text.as_str(), r.warnings.len())));
        result
    }
}

/// Longest keys first, so a key that contains another as a token is applied
/// before the shorter one can claim part of it.
fn apply_overrides(template: &mut Template, overrides: &OverrideMap) -> usize {
    let mut keys: Vec<&String> = overrides.keys().collect();
    keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    keys.into_iter()
        .map(|key| {
            let replacement = overrides.get(key).map(String::as_str).unwrap_or_default();
            template.substitute_token(key, replacement)
        })
        .sum()
}

// ── Per-call state ─────────────────────────────────────────────────

/// State of one top-level call: which pass it is and the soft errors
/// recorded so far.
struct Run<'r, 'a> {
    resolver: &'r Resolver<'a>,
    pass: Pass,
    errors: Vec<DataLinkError>,
    /// `'id'` → text standing in for that template's expansion.
    template_overrides: OverrideMap,
}

impl<'r, 'a> Run<'r, 'a> {
    fn new(resolver: &'r Resolver<'a>, pass: Pass) -> Self {
        Self {
            resolver,
            pass,
            errors: Vec::new(),
            template_overrides: OverrideMap::new(),
        }
    }

    fn config(&self) -> &'r ResolverConfig {
        &self.resolver.config
    }

    fn emit(&self, event: ResolverEvent) {
        self.resolver
            .handler
            .on_event(&EventRecord::new(self.pass, event));
    }

    /// Record a soft failure. Every [`ResolveError::DataLink`] returned inside
    /// a run has passed through here exactly once.
    fn record(&mut self, err: DataLinkError) -> ResolveError {
        debug!("Soft failure: {err}");
        self.errors.push(err.clone());
        ResolveError::DataLink(err)
    }

    /// Mount conduits, scrape once, and hand back the stripped script.
    async fn prepare(&self, ctx: &mut SessionContext, text: &str) -> Template {
        ctx.invalidate_scrape();
        let (mounts, stripped) = extract_mounts(text);
        self.mount_all(ctx, &mounts).await;
        self.ensure_scraped(ctx).await;
        Template::new(stripped)
    }

    async fn ensure_scraped(&self, ctx: &mut SessionContext) {
        if ctx.is_scraped() {
            return;
        }
        let surface = self.resolver.surface;
        match surface.scrape(&self.config().selectors).await {
            Ok(history) => {
                self.emit(ResolverEvent::ScrapeCompleted {
                    turns: history.len(),
                });
                ctx.set_history(history);
            }
            Err(error) => {
                warn!("Scrape failed, keeping previous history: {error}");
                self.emit(ResolverEvent::ScrapeFailed { error });
                ctx.mark_scraped();
            }
        }
    }

    fn finish(&self, outcome: Result<(&str, usize), &ResolveError>) {
        match outcome {
            Ok((text, warnings)) => self.emit(ResolverEvent::ParseCompleted {
                chars: text.chars().count(),
                warnings,
            }),
            Err(e) => self.emit(ResolverEvent::ParseFailed {
                error: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkFailure;
    use crate::events::EventLog;
    use crate::fixture::Fixture;
    use crate::{LAST_ACTION_STATUS, Turn};
    use std::time::Duration;

    fn config() -> ResolverConfig {
        ResolverConfig::default().with_settle_delay(Duration::ZERO)
    }

    fn fixture() -> Fixture {
        Fixture::default()
            .with_history([
                Turn::user("U1"),
                Turn::ai("A1"),
                Turn::user("U2"),
                Turn::ai_with_thoughts("A2", "T2"),
                Turn::user("U3"),
            ])
            .with_template("echo", "[{{v}}]")
    }

    #[tokio::test]
    async fn plain_text_is_returned_unchanged() {
        let f = fixture();
        let resolver = Resolver::new(&f, &f, config());
        let mut ctx = SessionContext::new();
        let text = "  no portals here @USER-1 $x \n";
        assert_eq!(resolver.parse(&mut ctx, text).await.unwrap(), text);
    }

    #[tokio::test]
    async fn scrape_happens_once_per_call() {
        let f = fixture();
        let resolver = Resolver::new(&f, &f, config());
        let mut ctx = SessionContext::new();
        let script = "~{{~'echo'[v: @USER-1]~}}~ ~{{~'echo'[v: @AI-1]~}}~";
        assert_eq!(resolver.parse(&mut ctx, script).await.unwrap(), "[U3] [A2]");
        assert_eq!(f.scrape_count(), 1);
        resolver.parse(&mut ctx, script).await.unwrap();
        assert_eq!(f.scrape_count(), 2);
    }

    #[tokio::test]
    async fn failed_scrape_keeps_previous_history() {
        let f = fixture();
        let mut ctx = SessionContext::new();
        Resolver::new(&f, &f, config())
            .parse(&mut ctx, "x")
            .await
            .unwrap();

        let broken = Fixture::default()
            .with_template("echo", "[{{v}}]")
            .with_scrape_error("page not ready");
        let log = EventLog::new();
        let resolver = Resolver::new(&broken, &broken, config()).with_event_handler(&log);
        let out = resolver
            .parse(&mut ctx, "~{{~'echo'[v: @USER-1]~}}~")
            .await
            .unwrap();
        assert_eq!(out, "[U3]");
        assert!(
            log.events()
                .iter()
                .any(|e| matches!(e, ResolverEvent::ScrapeFailed { .. }))
        );
    }

    #[tokio::test]
    async fn primary_pass_aggregates_every_failure() {
        let f = fixture();
        let resolver = Resolver::new(&f, &f, config());
        let mut ctx = SessionContext::new();
        let err = resolver
            .parse(
                &mut ctx,
                "~{{~'echo'[v: @USER-4]~}}~ ~{{~'echo'[v: $missing]~}}~ ~{{~'nope'~}}~",
            )
            .await
            .unwrap_err();
        let ResolveError::Aggregate(agg) = err else {
            panic!("expected aggregate, got {err:?}");
        };
        assert_eq!(agg.tokens(), vec!["@USER-4", "$missing", "'nope'"]);
        assert!(matches!(agg.errors[0].reason, LinkFailure::OutOfRange { .. }));
        assert_eq!(agg.errors[1].reason, LinkFailure::Empty);
    }

    #[tokio::test]
    async fn retry_pass_reports_residual_failures_as_warnings() {
        let f = fixture();
        let resolver = Resolver::new(&f, &f, config());
        let mut ctx = SessionContext::new();
        let overrides = OverrideMap::from([("@USER-4".to_string(), "manual".to_string())]);
        let out = resolver
            .parse_with_overrides(
                &mut ctx,
                "~{{~'echo'[v: @USER-4]~}}~|~{{~'echo'[v: @USER-9]~}}~",
                &overrides,
            )
            .await
            .unwrap();
        assert_eq!(out.text, "[manual]|");
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].token, "@USER-9");
        assert!(!out.is_clean());
    }

    #[test]
    fn overrides_prefer_longer_tokens() {
        let mut t = Template::new("@AI-1 @AI-1:thoughts");
        let overrides = OverrideMap::from([
            ("@AI-1".to_string(), "chat".to_string()),
            ("@AI-1:thoughts".to_string(), "thinking".to_string()),
        ]);
        assert_eq!(apply_overrides(&mut t, &overrides), 2);
        assert_eq!(t.render(), "chat thinking");
    }

    #[tokio::test]
    async fn hard_errors_are_not_aggregated() {
        let f = fixture();
        let resolver = Resolver::new(&f, &f, config());
        let mut ctx = SessionContext::new();
        let err = resolver
            .parse(&mut ctx, "~{{~'echo'[v: @USER-9]~}}~ ~{{~@USER-1:explode~}}~")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Syntax(_)));
        assert_eq!(ctx.var(LAST_ACTION_STATUS).as_deref(), Some("FAILED"));
    }

    #[tokio::test]
    async fn events_bracket_the_call() {
        let f = fixture();
        let log = EventLog::new();
        let resolver = Resolver::new(&f, &f, config()).with_event_handler(&log);
        let mut ctx = SessionContext::new();
        resolver
            .parse(&mut ctx, "~{{~'echo'[v: @USER-1]~}}~")
            .await
            .unwrap();
        let events = log.events();
        assert!(matches!(events.first(), Some(ResolverEvent::ParseStarted { .. })));
        assert!(matches!(
            events.last(),
            Some(ResolverEvent::ParseCompleted { warnings: 0, .. })
        ));
        assert!(events.contains(&ResolverEvent::LinkSucceeded {
            token: "@USER-1".into(),
            chars: 2
        }));
        assert!(log.records().iter().all(|r| r.pass == Pass::Primary));
    }
}
