//! Typed syntax for scripts.
//!
//! | Item | Grammar |
//! |------|---------|
//! | [`MountDirective`] | `#> mount['alias'] from 'sourceId'` (whole line) |
//! | [`Template`] | script text with `~{{~ ... ~}}~` portal spans |
//! | [`Portal`] | `'id'[params]` or `@[alias:]AUTHOR-N:action[params]` |
//! | [`Params`] | `[key: value, ...]` |
//! | [`Link`] | `$name` or `@[alias:]AUTHOR-N[:thoughts]` |
//! | [`Value`] | a parameter value, classified for resolution |

mod directive;
mod lexer;
mod link;
mod params;
mod portal;
mod template;

pub use directive::{MountDirective, extract_mounts, parse_mount_line};
pub use lexer::{Cursor, Fragment, Sym};
pub use link::{Link, Specifier, TurnLink, parse_turn_ref};
pub use params::{Params, parse_params};
pub use portal::{ActionKind, ActionPortal, DataPortal, Portal};
pub use template::{PORTAL_CLOSE, PORTAL_OPEN, PortalSpan, Template};

use crate::error::SyntaxError;

/// A parameter value after classification.
///
/// Precedence: nested portal, then link, then quoted literal, then bare text.
/// A value whose first character is protected (already resolved) text is
/// always [`Value::Bare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Raw text opening with a portal marker; resolved recursively.
    Portal(Fragment),
    /// A link plus its spelling in the script, which is what failures and
    /// overrides are keyed by.
    Link { link: Link, token: String },
    /// Content between the quotes.
    Quoted(String),
    Bare(String),
}

impl Value {
    pub fn classify(raw: &Fragment) -> Result<Value, SyntaxError> {
        let raw = raw.trim();
        if raw.starts_protected() {
            return Ok(Value::Bare(raw.text()));
        }
        if raw.starts_with_source(PORTAL_OPEN) {
            return Ok(Value::Portal(raw));
        }
        let text = raw.text();
        if Link::is_link_token(&text) {
            let link = Link::parse(&text)?;
            return Ok(Value::Link { link, token: text });
        }
        if raw.is_quoted() {
            return Ok(Value::Quoted(raw.unquoted_text()));
        }
        Ok(Value::Bare(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_precedence() {
        assert!(matches!(
            Value::classify(&Fragment::source("~{{~'x'~}}~")).unwrap(),
            Value::Portal(_)
        ));
        assert!(matches!(
            Value::classify(&Fragment::source("@USER-1")).unwrap(),
            Value::Link { .. }
        ));
        assert_eq!(
            Value::classify(&Fragment::source("'@USER-1'")).unwrap(),
            Value::Quoted("@USER-1".into())
        );
        assert_eq!(
            Value::classify(&Fragment::source(" plain ")).unwrap(),
            Value::Bare("plain".into())
        );
    }

    #[test]
    fn links_keep_their_written_spelling() {
        let Value::Link { link, token } = Value::classify(&Fragment::source(" @USER-05 ")).unwrap()
        else {
            panic!("expected a link");
        };
        assert_eq!(token, "@USER-05");
        assert_eq!(link.to_string(), "@USER-5");
    }

    #[test]
    fn resolved_text_is_always_literal() {
        for text in ["@USER-1", "$x", "'q'", "~{{~'x'~}}~"] {
            assert_eq!(
                Value::classify(&Fragment::protected(text)).unwrap(),
                Value::Bare(text.into())
            );
        }
    }

    #[test]
    fn malformed_link_value_is_a_syntax_error() {
        assert!(Value::classify(&Fragment::source("@USER-x")).is_err());
    }
}
