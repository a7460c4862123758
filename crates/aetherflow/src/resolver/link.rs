//! Value and link resolution.

use super::Run;
use crate::context::SessionContext;
use crate::error::{DataLinkError, LinkFailure, ResolveError};
use crate::events::ResolverEvent;
use crate::syntax::{Fragment, Link, Specifier, Template, TurnLink, Value};
use crate::{History, Turn};

impl Run<'_, '_> {
    /// Resolve a raw parameter value to text.
    pub(super) async fn resolve_value(
        &mut self,
        ctx: &mut SessionContext,
        raw: &Fragment,
    ) -> Result<String, ResolveError> {
        match Value::classify(raw)? {
            Value::Portal(fragment) => {
                self.resolve_template(ctx, Template::from_fragment(&fragment))
                    .await
            }
            Value::Link { link, token } => self.resolve_link(ctx, &link, token),
            Value::Quoted(text) | Value::Bare(text) => Ok(text),
        }
    }

    /// Resolve a link against the session. Failures are recorded as soft
    /// errors under `token`, the link as written.
    pub(super) fn resolve_link(
        &mut self,
        ctx: &SessionContext,
        link: &Link,
        token: String,
    ) -> Result<String, ResolveError> {
        self.emit(ResolverEvent::LinkStarted {
            token: token.clone(),
        });
        match lookup(ctx, link) {
            Ok(text) => {
                self.emit(ResolverEvent::LinkSucceeded {
                    token,
                    chars: text.chars().count(),
                });
                Ok(text)
            }
            Err(reason) => {
                self.emit(ResolverEvent::LinkFailed {
                    token: token.clone(),
                    error: reason.to_string(),
                });
                Err(self.record(DataLinkError::new(token, reason)))
            }
        }
    }
}

fn lookup(ctx: &SessionContext, link: &Link) -> Result<String, LinkFailure> {
    let text = match link {
        Link::Session { name } => ctx.var(name).unwrap_or_default(),
        Link::Turn(turn) => {
            let history = source(ctx, turn)?;
            select_text(history, turn)?
        }
    };
    if text.is_empty() {
        return Err(LinkFailure::Empty);
    }
    Ok(text)
}

fn source<'c>(ctx: &'c SessionContext, link: &TurnLink) -> Result<&'c History, LinkFailure> {
    match &link.conduit {
        Some(alias) => ctx.conduit(alias).ok_or_else(|| LinkFailure::UnknownConduit {
            alias: alias.clone(),
        }),
        None => Ok(ctx.history()),
    }
}

/// The field a turn link names, or why it cannot be read.
pub(super) fn select_text(history: &[Turn], link: &TurnLink) -> Result<String, LinkFailure> {
    let turn = link.target.select(history).ok_or_else(|| {
        let available = history
            .iter()
            .filter(|t| t.author() == link.target.author)
            .count();
        LinkFailure::OutOfRange {
            target: link.target.to_string(),
            author: link.target.author.to_string(),
            available,
        }
    })?;
    let text = match (turn, link.specifier) {
        (Turn::Ai { thoughts, .. }, Some(Specifier::Thoughts)) => thoughts.clone(),
        (turn, _) => turn.text().to_string(),
    };
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> History {
        vec![
            Turn::user("U1"),
            Turn::ai_with_thoughts("A1", "T1"),
            Turn::user("U2"),
            Turn::ai("A2"),
            Turn::user("U3"),
        ]
    }

    fn link(token: &str) -> TurnLink {
        match Link::parse(token).unwrap() {
            Link::Turn(t) => t,
            Link::Session { .. } => panic!("not a turn link"),
        }
    }

    #[test]
    fn selects_by_author_from_latest() {
        let h = history();
        assert_eq!(select_text(&h, &link("@USER-1")).unwrap(), "U3");
        assert_eq!(select_text(&h, &link("@USER-3")).unwrap(), "U1");
        assert_eq!(select_text(&h, &link("@AI-2:thoughts")).unwrap(), "T1");
        assert_eq!(select_text(&h, &link("@AI-2")).unwrap(), "A1");
    }

    #[test]
    fn out_of_range_reports_available_count() {
        let err = select_text(&history(), &link("@USER-4")).unwrap_err();
        assert_eq!(
            err,
            LinkFailure::OutOfRange {
                target: "USER-4".into(),
                author: "USER".into(),
                available: 3,
            }
        );
        assert!(select_text(&history(), &link("@USER-0")).is_err());
    }

    #[test]
    fn empty_fields_and_variables_fail() {
        let mut ctx = SessionContext::new();
        ctx.set_history(history());
        // AI-1 has no thoughts.
        assert_eq!(
            lookup(&ctx, &Link::parse("@AI-1:thoughts").unwrap()),
            Err(LinkFailure::Empty)
        );
        assert_eq!(
            lookup(&ctx, &Link::parse("$unset").unwrap()),
            Err(LinkFailure::Empty)
        );
        ctx.set_var("blank", "");
        assert_eq!(
            lookup(&ctx, &Link::parse("$blank").unwrap()),
            Err(LinkFailure::Empty)
        );
        ctx.set_var("set", "v");
        assert_eq!(lookup(&ctx, &Link::parse("$set").unwrap()).as_deref(), Ok("v"));
    }

    #[test]
    fn conduit_links_read_the_mounted_history() {
        let mut ctx = SessionContext::new();
        ctx.commit_conduit("notes", vec![Turn::user("N1")]);
        assert_eq!(
            lookup(&ctx, &Link::parse("@notes:USER-1").unwrap()).as_deref(),
            Ok("N1")
        );
        assert_eq!(
            lookup(&ctx, &Link::parse("@other:USER-1").unwrap()),
            Err(LinkFailure::UnknownConduit {
                alias: "other".into()
            })
        );
    }
}
