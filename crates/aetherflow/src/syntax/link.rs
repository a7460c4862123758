//! Link tokens: `$name` and `@[alias:]AUTHOR-N[:specifier]`.

use crate::error::SyntaxError;
use crate::{Author, TurnRef};
use std::fmt;

/// Field selector on an AI turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Specifier {
    Thoughts,
}

/// A reference to a turn of the current conversation or of a conduit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnLink {
    /// Conduit alias; `None` addresses the current conversation.
    pub conduit: Option<String>,
    pub target: TurnRef,
    pub specifier: Option<Specifier>,
}

/// A parsed link token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Link {
    /// `$name`: a session variable.
    Session { name: String },
    /// `@...`: a turn field.
    Turn(TurnLink),
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Whether `s` has the shape `USER-...` or `AI-...`.
fn looks_like_turn_ref(s: &str) -> bool {
    s.starts_with("USER-") || s.starts_with("AI-")
}

/// Parse `AUTHOR-N`.
pub fn parse_turn_ref(s: &str, fragment: &str) -> Result<TurnRef, SyntaxError> {
    let (author, index) = s
        .split_once('-')
        .ok_or_else(|| SyntaxError::new(format!("expected AUTHOR-N, got '{s}'"), fragment))?;
    let author: Author = author
        .parse()
        .map_err(|e: String| SyntaxError::new(e, fragment))?;
    if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
        return Err(SyntaxError::new(
            format!("turn index '{index}' is not a number"),
            fragment,
        ));
    }
    let index = index
        .parse::<u32>()
        .map_err(|e| SyntaxError::new(format!("turn index '{index}': {e}"), fragment))?;
    Ok(TurnRef { author, index })
}

fn parse_alias(alias: &str, fragment: &str) -> Result<String, SyntaxError> {
    if alias.is_empty() || alias.chars().any(char::is_whitespace) {
        return Err(SyntaxError::new(
            format!("invalid conduit alias '{alias}'"),
            fragment,
        ));
    }
    Ok(alias.to_string())
}

impl Link {
    /// Whether `token` is spelled like a link (`$` or `@` prefix).
    pub fn is_link_token(token: &str) -> bool {
        token.starts_with('$') || token.starts_with('@')
    }

    pub fn parse(token: &str) -> Result<Link, SyntaxError> {
        if let Some(name) = token.strip_prefix('$') {
            if name.is_empty() || !name.chars().all(is_name_char) {
                return Err(SyntaxError::new(
                    format!("invalid session variable name '{name}'"),
                    token,
                ));
            }
            return Ok(Link::Session {
                name: name.to_string(),
            });
        }

        let body = token
            .strip_prefix('@')
            .ok_or_else(|| SyntaxError::new("links start with '$' or '@'", token))?;
        let parts: Vec<&str> = body.split(':').collect();
        let (conduit, target, specifier) = match parts.as_slice() {
            [target] => (None, *target, None),
            [first, second] if looks_like_turn_ref(first) => (None, *first, Some(*second)),
            [alias, target] => (Some(*alias), *target, None),
            [alias, target, specifier] => (Some(*alias), *target, Some(*specifier)),
            _ => return Err(SyntaxError::new("too many ':' segments in link", token)),
        };

        let conduit = conduit.map(|a| parse_alias(a, token)).transpose()?;
        let target = parse_turn_ref(target, token)?;
        let specifier = match specifier {
            None => None,
            Some("thoughts") if target.author == Author::Ai => Some(Specifier::Thoughts),
            Some("thoughts") => {
                return Err(SyntaxError::new(
                    "the 'thoughts' specifier only applies to AI turns",
                    token,
                ));
            }
            Some(other) => {
                return Err(SyntaxError::new(
                    format!("unknown link specifier '{other}'"),
                    token,
                ));
            }
        };

        Ok(Link::Turn(TurnLink {
            conduit,
            target,
            specifier,
        }))
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::Session { name } => write!(f, "${name}"),
            Link::Turn(link) => {
                write!(f, "@")?;
                if let Some(alias) = &link.conduit {
                    write!(f, "{alias}:")?;
                }
                write!(f, "{}", link.target)?;
                if link.specifier == Some(Specifier::Thoughts) {
                    write!(f, ":thoughts")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(token: &str) -> TurnLink {
        match Link::parse(token).unwrap() {
            Link::Turn(t) => t,
            other => panic!("expected turn link, got {other:?}"),
        }
    }

    #[test]
    fn session_variables() {
        assert_eq!(
            Link::parse("$__lastActionStatus").unwrap(),
            Link::Session {
                name: "__lastActionStatus".into()
            }
        );
        assert!(Link::parse("$").is_err());
        assert!(Link::parse("$a b").is_err());
    }

    #[test]
    fn local_and_conduit_turn_links() {
        let t = turn("@USER-3");
        assert_eq!(t.conduit, None);
        assert_eq!(t.target, TurnRef::new(Author::User, 3));

        let t = turn("@AI-1:thoughts");
        assert_eq!(t.conduit, None);
        assert_eq!(t.specifier, Some(Specifier::Thoughts));

        let t = turn("@notes:USER-2");
        assert_eq!(t.conduit.as_deref(), Some("notes"));
        assert_eq!(t.specifier, None);

        let t = turn("@notes:AI-1:thoughts");
        assert_eq!(t.conduit.as_deref(), Some("notes"));
        assert_eq!(t.target, TurnRef::new(Author::Ai, 1));
        assert_eq!(t.specifier, Some(Specifier::Thoughts));
    }

    #[test]
    fn malformed_links() {
        for bad in [
            "@USER",
            "@USER-",
            "@USER-x",
            "@USER-+1",
            "@user-1",
            "@BOT-1",
            "@USER-1:thoughts",
            "@AI-1:chat",
            "@a:b:AI-1:thoughts",
            "@ :USER-1",
        ] {
            assert!(Link::parse(bad).is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn display_round_trips_canonical_form() {
        for token in ["$x", "@USER-1", "@AI-2:thoughts", "@X:USER-1", "@X:AI-1:thoughts"] {
            assert_eq!(Link::parse(token).unwrap().to_string(), token);
        }
    }
}
