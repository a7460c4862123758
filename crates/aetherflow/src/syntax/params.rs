//! Bracketed parameter lists: `[key: value, key2: 'literal', ...]`.
//!
//! A value is either a quoted literal (`'...'`, which may contain commas and
//! brackets) or a bare run of characters up to the next comma or closing
//! bracket, trimmed. Values are kept as raw [`Fragment`]s; classifying and
//! resolving them is the job of [`Value`](super::Value) and the resolver.

use super::lexer::{Cursor, Fragment, Sym};
use crate::error::SyntaxError;

/// Ordered parameter mapping. A repeated key keeps its first position and
/// takes the value of its last occurrence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, Fragment)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a complete bracketed list such as `[a: 1, b: 'x']`.
    pub fn parse(text: &str) -> Result<Self, SyntaxError> {
        let fragment = Fragment::source(text.trim());
        let mut cursor = fragment.cursor();
        let params = parse_params(&mut cursor)?;
        cursor.skip_whitespace();
        if !cursor.at_end() {
            return Err(SyntaxError::new(
                "unexpected text after parameter list",
                text,
            ));
        }
        Ok(params)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Fragment) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Fragment> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Fragment)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const QUOTE: Sym = Sym {
    ch: '\'',
    protected: false,
};

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Parse a parameter list starting at an opening `[`, consuming through the
/// matching `]`.
pub fn parse_params(cursor: &mut Cursor<'_>) -> Result<Params, SyntaxError> {
    let whole = cursor.rest().text();
    let err = |msg: &str| SyntaxError::new(msg, whole.clone());

    if !cursor.eat_source('[') {
        return Err(err("expected '['"));
    }
    let mut params = Params::new();
    loop {
        cursor.skip_whitespace();
        if cursor.eat_source(']') {
            return Ok(params);
        }
        if cursor.at_end() {
            return Err(err("unterminated parameter list"));
        }

        let key = cursor.take_while(|s| !s.protected && is_ident_char(s.ch));
        if key.is_empty() {
            return Err(err("expected parameter name"));
        }
        cursor.skip_whitespace();
        if !cursor.eat_source(':') {
            return Err(err(&format!("expected ':' after parameter '{key}'")));
        }
        cursor.skip_whitespace();

        let value = if cursor.eat_source('\'') {
            let inner = cursor.take_until_source('\'');
            if !cursor.eat_source('\'') {
                return Err(err("unterminated quoted value"));
            }
            cursor.skip_whitespace();
            if !(cursor.at_source(',') || cursor.at_source(']') || cursor.at_end()) {
                return Err(err("unexpected text after quoted value"));
            }
            let mut syms = Vec::with_capacity(inner.len() + 2);
            syms.push(QUOTE);
            syms.extend_from_slice(inner.syms());
            syms.push(QUOTE);
            Fragment::from_syms(syms)
        } else {
            let raw = cursor.take_while(|s| s.protected || (s.ch != ',' && s.ch != ']'));
            let bare = raw.trim();
            // A portal or override that resolved to nothing is an empty value.
            if bare.is_empty() && !raw.has_resolved() {
                return Err(err(&format!("missing value for parameter '{key}'")));
            }
            bare
        };
        params.insert(key.text(), value);

        cursor.skip_whitespace();
        if cursor.eat_source(',') {
            continue;
        }
        if cursor.eat_source(']') {
            return Ok(params);
        }
        return Err(err("unterminated parameter list"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(p: &Params) -> Vec<(String, String)> {
        p.iter().map(|(k, v)| (k.to_string(), v.text())).collect()
    }

    #[test]
    fn parses_bare_and_quoted_values() {
        let p = Params::parse("[a: 1, b: 'x, y]', c : @USER-1 ]").unwrap();
        assert_eq!(
            texts(&p),
            vec![
                ("a".into(), "1".into()),
                ("b".into(), "'x, y]'".into()),
                ("c".into(), "@USER-1".into()),
            ]
        );
    }

    #[test]
    fn empty_and_trailing_comma_lists() {
        assert!(Params::parse("[]").unwrap().is_empty());
        assert!(Params::parse("[ ]").unwrap().is_empty());
        assert_eq!(Params::parse("[a: 1,]").unwrap().len(), 1);
    }

    #[test]
    fn duplicate_key_last_value_wins_first_position() {
        let p = Params::parse("[a: 1, b: 2, a: 3]").unwrap();
        assert_eq!(
            texts(&p),
            vec![("a".into(), "3".into()), ("b".into(), "2".into())]
        );
    }

    #[test]
    fn malformed_lists_are_syntax_errors() {
        assert!(Params::parse("[a 1]").is_err());
        assert!(Params::parse("[a: 'open]").is_err());
        assert!(Params::parse("[a: 'x' y]").is_err());
        assert!(Params::parse("[a: ]").is_err());
        assert!(Params::parse("[a: 1").is_err());
        assert!(Params::parse("[: 1]").is_err());
        assert!(Params::parse("[a: 1] tail").is_err());
    }

    #[test]
    fn emptied_resolution_is_an_empty_value() {
        let mut f = Fragment::source("[a: ");
        f.push_str("", true);
        f.push_str(", b: 2]", false);
        let p = parse_params(&mut f.cursor()).unwrap();
        assert_eq!(p.get("a").unwrap().text(), "");
        assert!(p.get("a").unwrap().has_resolved());
        assert_eq!(p.get("b").unwrap().text(), "2");
    }

    #[test]
    fn protected_delimiters_stay_inside_bare_values() {
        let mut f = Fragment::source("[a: ");
        f.push_str("x, y]", true);
        f.push_str(", b: 2]", false);
        let p = parse_params(&mut f.cursor()).unwrap();
        assert_eq!(p.get("a").unwrap().text(), "x, y]");
        assert_eq!(p.get("b").unwrap().text(), "2");
    }
}
