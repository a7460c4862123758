//! Portal bodies: the text between `~{{~` and `~}}~`.
//!
//! | Form | Example |
//! |------|---------|
//! | Data | `'SI-001'[topic: @USER-1]` |
//! | Action | `@AI-1:edit[new_text: 'shorter']` |
//!
//! The parameter list is optional on both forms.

use super::lexer::{Cursor, Fragment};
use super::link::{TurnLink, parse_turn_ref};
use super::params::{Params, parse_params};
use crate::TurnRef;
use crate::error::SyntaxError;
use std::fmt;

/// A side-effecting command understood by the action executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Delete,
    Rerun,
    Branch,
    Edit,
    Copy,
    /// Syntactically valid but unrecognised; rejected at execution time so
    /// the failure status is recorded.
    Unknown(String),
}

impl ActionKind {
    pub fn from_name(name: &str) -> Self {
        match name {
            "delete" => ActionKind::Delete,
            "rerun" => ActionKind::Rerun,
            "branch" => ActionKind::Branch,
            "edit" => ActionKind::Edit,
            "copy" => ActionKind::Copy,
            other => ActionKind::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ActionKind::Delete => "delete",
            ActionKind::Rerun => "rerun",
            ActionKind::Branch => "branch",
            ActionKind::Edit => "edit",
            ActionKind::Copy => "copy",
            ActionKind::Unknown(name) => name,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `'id'[params]`: expand a prompt template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPortal {
    pub id: String,
    pub params: Params,
}

/// `@[alias:]AUTHOR-N:action[params]`: act on a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPortal {
    pub conduit: Option<String>,
    pub target: TurnRef,
    pub action: ActionKind,
    pub params: Params,
}

impl ActionPortal {
    /// The target as written, e.g. `notes:USER-2`.
    pub fn target_label(&self) -> String {
        match &self.conduit {
            Some(alias) => format!("{alias}:{}", self.target),
            None => self.target.to_string(),
        }
    }
}

/// A parsed portal body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Portal {
    Data(DataPortal),
    Action(ActionPortal),
}

impl Portal {
    pub fn parse(body: &Fragment) -> Result<Portal, SyntaxError> {
        let body = body.trim();
        let whole = body.text();
        let mut cursor = body.cursor();

        let portal = if cursor.eat_source('\'') {
            let id = cursor.take_until_source('\'');
            if !cursor.eat_source('\'') {
                return Err(SyntaxError::new("unterminated template id", whole));
            }
            let id = id.text();
            if id.trim().is_empty() {
                return Err(SyntaxError::new("empty template id", whole));
            }
            let params = optional_params(&mut cursor)?;
            Portal::Data(DataPortal { id, params })
        } else if cursor.eat_source('@') {
            let head = cursor.take_while(|s| s.protected || (s.ch != '[' && !s.ch.is_whitespace()));
            if head.syms().iter().any(|s| s.protected) {
                return Err(SyntaxError::new("action target must be literal text", whole));
            }
            let (conduit, target, action) = split_action_head(&head.text(), &whole)?;
            let params = optional_params(&mut cursor)?;
            Portal::Action(ActionPortal {
                conduit,
                target,
                action,
                params,
            })
        } else {
            return Err(SyntaxError::new(
                "portal body must start with a quoted template id or '@'",
                whole,
            ));
        };

        cursor.skip_whitespace();
        if !cursor.at_end() {
            return Err(SyntaxError::new("unexpected text after portal", whole));
        }
        Ok(portal)
    }
}

fn optional_params(cursor: &mut Cursor<'_>) -> Result<Params, SyntaxError> {
    cursor.skip_whitespace();
    if cursor.at_source('[') {
        parse_params(cursor)
    } else {
        Ok(Params::new())
    }
}

/// Split `[alias:]AUTHOR-N:action`; the last segment is always the action.
fn split_action_head(
    head: &str,
    whole: &str,
) -> Result<(Option<String>, TurnRef, ActionKind), SyntaxError> {
    let parts: Vec<&str> = head.split(':').collect();
    let (conduit, target, action) = match parts.as_slice() {
        [target, action] => (None, *target, *action),
        [alias, target, action] => (Some(*alias), *target, *action),
        _ => {
            return Err(SyntaxError::new(
                "expected @[alias:]AUTHOR-N:action",
                whole,
            ));
        }
    };
    if action.is_empty() {
        return Err(SyntaxError::new("missing action name", whole));
    }
    if conduit.is_some_and(str::is_empty) {
        return Err(SyntaxError::new("empty conduit alias", whole));
    }
    let target = parse_turn_ref(target, whole)?;
    Ok((
        conduit.map(str::to_string),
        target,
        ActionKind::from_name(action),
    ))
}

impl From<&ActionPortal> for TurnLink {
    fn from(portal: &ActionPortal) -> Self {
        TurnLink {
            conduit: portal.conduit.clone(),
            target: portal.target,
            specifier: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Author;

    fn parse(text: &str) -> Result<Portal, SyntaxError> {
        Portal::parse(&Fragment::source(text))
    }

    #[test]
    fn data_portal_with_and_without_params() {
        let Portal::Data(p) = parse(" 'SI-001'[topic: @USER-1, n: '2'] ").unwrap() else {
            panic!("expected data portal");
        };
        assert_eq!(p.id, "SI-001");
        assert_eq!(p.params.len(), 2);

        let Portal::Data(p) = parse("'bare'").unwrap() else {
            panic!("expected data portal");
        };
        assert_eq!(p.id, "bare");
        assert!(p.params.is_empty());
    }

    #[test]
    fn action_portal_forms() {
        let Portal::Action(p) = parse("@AI-1:edit[new_text: 'x']").unwrap() else {
            panic!("expected action portal");
        };
        assert_eq!(p.conduit, None);
        assert_eq!(p.target, TurnRef::new(Author::Ai, 1));
        assert_eq!(p.action, ActionKind::Edit);
        assert_eq!(p.target_label(), "AI-1");

        let Portal::Action(p) = parse("@notes:USER-2:delete").unwrap() else {
            panic!("expected action portal");
        };
        assert_eq!(p.conduit.as_deref(), Some("notes"));
        assert_eq!(p.target_label(), "notes:USER-2");
        assert!(p.params.is_empty());

        let Portal::Action(p) = parse("@USER-1:explode[]").unwrap() else {
            panic!("expected action portal");
        };
        assert_eq!(p.action, ActionKind::Unknown("explode".into()));
    }

    #[test]
    fn malformed_portals() {
        for bad in [
            "",
            "plain text",
            "'unterminated",
            "''[a: 1]",
            "'id'[a: 1] junk",
            "@USER-1",
            "@USER-1:",
            "@USER-x:delete",
            "@a:b:USER-1:delete",
            "@:USER-1:delete",
        ] {
            assert!(parse(bad).is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn protected_quote_cannot_open_template_id() {
        let f = Fragment::protected("'id'");
        assert!(Portal::parse(&f).is_err());
    }
}
