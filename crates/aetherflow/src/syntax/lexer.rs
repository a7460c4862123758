//! Character-level input for the portal parsers.
//!
//! Text handed to the parsers is a [`Fragment`]: a run of characters where
//! each one remembers whether it came from the original script (*source*) or
//! from an already resolved portal / override (*protected*). Grammar
//! punctuation (quotes, brackets, commas, colons, portal markers) is only
//! recognised on source characters, so resolved text can never inject syntax.
//!
//! A portal that resolved to nothing still leaves a zero-width *gap* behind,
//! so `[text: ]` built from an emptied portal reads as an empty value rather
//! than a missing one.

use std::fmt;

/// One character plus its provenance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sym {
    pub ch: char,
    pub protected: bool,
}

/// A sequence of [`Sym`]s.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fragment {
    syms: Vec<Sym>,
    /// Positions of empty resolved pieces, ascending.
    gaps: Vec<usize>,
}

impl Fragment {
    /// A fragment made entirely of source characters.
    pub fn source(text: &str) -> Self {
        let mut f = Self::default();
        f.push_str(text, false);
        f
    }

    /// A fragment made entirely of protected characters.
    pub fn protected(text: &str) -> Self {
        let mut f = Self::default();
        f.push_str(text, true);
        f
    }

    pub fn from_syms(syms: Vec<Sym>) -> Self {
        Self {
            syms,
            gaps: Vec::new(),
        }
    }

    pub fn push_str(&mut self, text: &str, protected: bool) {
        if text.is_empty() {
            if protected && self.gaps.last() != Some(&self.syms.len()) {
                self.gaps.push(self.syms.len());
            }
            return;
        }
        self.syms
            .extend(text.chars().map(|ch| Sym { ch, protected }));
    }

    pub fn syms(&self) -> &[Sym] {
        &self.syms
    }

    /// Positions (in symbols) where an empty resolved piece sits.
    pub fn gaps(&self) -> &[usize] {
        &self.gaps
    }

    /// Whether any part of the fragment came from resolution, including
    /// resolutions that produced no text.
    pub fn has_resolved(&self) -> bool {
        !self.gaps.is_empty() || self.syms.iter().any(|s| s.protected)
    }

    /// Symbols `start..end` with the gaps that fall inside, rebased.
    fn slice(&self, start: usize, end: usize) -> Fragment {
        Fragment {
            syms: self.syms.get(start..end).unwrap_or_default().to_vec(),
            gaps: self
                .gaps
                .iter()
                .filter(|&&g| g >= start && g <= end)
                .map(|g| g - start)
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.syms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.syms.is_empty()
    }

    /// The plain text, provenance discarded.
    pub fn text(&self) -> String {
        self.syms.iter().map(|s| s.ch).collect()
    }

    /// Copy with leading and trailing whitespace removed.
    /// A blank fragment keeps a single gap if it had any.
    pub fn trim(&self) -> Fragment {
        let Some(start) = self.syms.iter().position(|s| !s.ch.is_whitespace()) else {
            let mut blank = Fragment::default();
            if !self.gaps.is_empty() {
                blank.gaps.push(0);
            }
            return blank;
        };
        let end = self
            .syms
            .iter()
            .rposition(|s| !s.ch.is_whitespace())
            .map_or(start, |i| i + 1);
        self.slice(start, end)
    }

    /// Whether the fragment starts with `pat` spelled in source characters.
    pub fn starts_with_source(&self, pat: &str) -> bool {
        let mut syms = self.syms.iter();
        pat.chars().all(|c| {
            syms.next()
                .is_some_and(|s| !s.protected && s.ch == c)
        })
    }

    /// Whether the first character is protected text.
    pub fn starts_protected(&self) -> bool {
        self.syms.first().is_some_and(|s| s.protected)
    }

    /// Whether the fragment is `'...'` with both quotes in source characters.
    pub fn is_quoted(&self) -> bool {
        let quote = |s: Option<&Sym>| s.is_some_and(|s| !s.protected && s.ch == '\'');
        self.syms.len() >= 2 && quote(self.syms.first()) && quote(self.syms.last())
    }

    /// Text between the outer quotes of a quoted fragment.
    pub fn unquoted_text(&self) -> String {
        let inner = self
            .syms
            .get(1..self.syms.len().saturating_sub(1))
            .unwrap_or_default();
        inner.iter().map(|s| s.ch).collect()
    }

    pub fn cursor(&self) -> Cursor<'_> {
        Cursor {
            fragment: self,
            pos: 0,
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.syms {
            write!(f, "{}", s.ch)?;
        }
        Ok(())
    }
}

/// Forward-only reader over a fragment's symbols.
#[derive(Clone, Debug)]
pub struct Cursor<'a> {
    fragment: &'a Fragment,
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn peek(&self) -> Option<Sym> {
        self.fragment.syms.get(self.pos).copied()
    }

    pub fn bump(&mut self) -> Option<Sym> {
        let sym = self.peek()?;
        self.pos += 1;
        Some(sym)
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.fragment.syms.len()
    }

    /// Whether the next symbol is the source character `ch`.
    pub fn at_source(&self, ch: char) -> bool {
        self.peek().is_some_and(|s| !s.protected && s.ch == ch)
    }

    /// Consume the source character `ch` if it is next.
    pub fn eat_source(&mut self, ch: char) -> bool {
        if self.at_source(ch) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    pub fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|s| s.ch.is_whitespace()) {
            self.pos += 1;
        }
    }

    /// Consume symbols while `pred` holds.
    pub fn take_while(&mut self, mut pred: impl FnMut(Sym) -> bool) -> Fragment {
        let start = self.pos;
        while self.peek().is_some_and(&mut pred) {
            self.pos += 1;
        }
        self.fragment.slice(start, self.pos)
    }

    /// Consume symbols up to (not including) the next source `ch`.
    pub fn take_until_source(&mut self, ch: char) -> Fragment {
        self.take_while(|s| s.protected || s.ch != ch)
    }

    /// Everything not yet consumed.
    pub fn rest(&self) -> Fragment {
        self.fragment.slice(self.pos, self.fragment.syms.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_keeps_provenance() {
        let mut f = Fragment::source("  a");
        f.push_str("b  ", true);
        let t = f.trim();
        assert_eq!(t.text(), "ab");
        assert!(!t.syms()[0].protected);
        assert!(t.syms()[1].protected);
    }

    #[test]
    fn trim_of_blank_is_empty() {
        assert!(Fragment::source("   ").trim().is_empty());
        assert!(!Fragment::source("   ").trim().has_resolved());
    }

    #[test]
    fn empty_resolution_leaves_a_gap() {
        let mut f = Fragment::source("a: ");
        f.push_str("", true);
        f.push_str(" ", false);
        assert_eq!(f.text(), "a:  ");
        assert_eq!(f.gaps(), &[3]);
        assert!(f.has_resolved());

        let mut c = f.cursor();
        c.take_until_source(':');
        assert!(c.eat_source(':'));
        let value = c.rest();
        assert_eq!(value.gaps(), &[1]);
        let trimmed = value.trim();
        assert!(trimmed.is_empty());
        assert!(trimmed.has_resolved());
    }

    #[test]
    fn protected_punctuation_is_not_source() {
        let f = Fragment::protected("'x'");
        assert!(!f.is_quoted());
        assert!(!f.starts_with_source("'"));
        assert!(f.starts_protected());
        assert!(Fragment::source("'x'").is_quoted());
        assert_eq!(Fragment::source("'x'").unquoted_text(), "x");
    }

    #[test]
    fn cursor_stops_only_at_source_delimiters() {
        let mut f = Fragment::source("a");
        f.push_str(",", true);
        f.push_str("b,c", false);
        let mut c = f.cursor();
        assert_eq!(c.take_until_source(',').text(), "a,b");
        assert!(c.eat_source(','));
        assert_eq!(c.rest().text(), "c");
    }
}
