//! Script text under resolution and the innermost-portal scanner.
//!
//! A [`Template`] is a list of pieces. Source pieces hold original script
//! text and are the only place portal markers are recognised. Resolved pieces
//! hold portal results and override substitutions; they are opaque to the
//! scanner, which is what makes the replacement loop terminate even when a
//! template body happens to contain `~{{~`.

use super::lexer::Fragment;

/// Portal open marker.
pub const PORTAL_OPEN: &str = "~{{~";
/// Portal close marker.
pub const PORTAL_CLOSE: &str = "~}}~";

#[derive(Clone, Debug, PartialEq, Eq)]
enum Piece {
    Source(String),
    Resolved(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Marker {
    Open,
    Close,
}

/// Byte position of a marker's first character inside a source piece.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Mark {
    piece: usize,
    offset: usize,
}

/// A located portal: the open marker and the nearest following close marker
/// with no other open marker in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortalSpan {
    open: Mark,
    close: Mark,
}

/// Script text mid-resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Template {
    pieces: Vec<Piece>,
}

impl Template {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            pieces: vec![Piece::Source(text.into())],
        }
    }

    /// Rebuild a template from a fragment, keeping provenance: protected runs
    /// and gaps become resolved pieces.
    pub fn from_fragment(fragment: &Fragment) -> Self {
        let mut pieces: Vec<Piece> = Vec::new();
        let mut gaps = fragment.gaps().iter().peekable();
        for (i, sym) in fragment.syms().iter().enumerate() {
            if gaps.next_if_eq(&&i).is_some() && !matches!(pieces.last(), Some(Piece::Resolved(_))) {
                pieces.push(Piece::Resolved(String::new()));
            }
            match (pieces.last_mut(), sym.protected) {
                (Some(Piece::Source(s)), false) | (Some(Piece::Resolved(s)), true) => {
                    s.push(sym.ch);
                    continue;
                }
                _ => {}
            }
            let text = sym.ch.to_string();
            pieces.push(if sym.protected {
                Piece::Resolved(text)
            } else {
                Piece::Source(text)
            });
        }
        if gaps.next().is_some() && !matches!(pieces.last(), Some(Piece::Resolved(_))) {
            pieces.push(Piece::Resolved(String::new()));
        }
        Self { pieces }
    }

    /// Flatten to the final string.
    pub fn render(&self) -> String {
        self.pieces
            .iter()
            .map(|p| match p {
                Piece::Source(s) | Piece::Resolved(s) => s.as_str(),
            })
            .collect()
    }

    fn markers(&self) -> Vec<(Marker, Mark)> {
        let mut out = Vec::new();
        for (piece, p) in self.pieces.iter().enumerate() {
            let Piece::Source(text) = p else { continue };
            let mut offset = 0;
            while let Some(rest) = text.get(offset..) {
                if rest.is_empty() {
                    break;
                }
                if rest.starts_with(PORTAL_OPEN) {
                    out.push((Marker::Open, Mark { piece, offset }));
                    offset += PORTAL_OPEN.len();
                } else if rest.starts_with(PORTAL_CLOSE) {
                    out.push((Marker::Close, Mark { piece, offset }));
                    offset += PORTAL_CLOSE.len();
                } else {
                    offset += rest.chars().next().map_or(1, char::len_utf8);
                }
            }
        }
        out
    }

    /// The leftmost innermost portal, if any remain.
    pub fn innermost(&self) -> Option<PortalSpan> {
        self.markers().windows(2).find_map(|pair| match pair {
            [(Marker::Open, open), (Marker::Close, close)] => Some(PortalSpan {
                open: *open,
                close: *close,
            }),
            _ => None,
        })
    }

    /// The text between a span's markers, with provenance.
    pub fn body(&self, span: PortalSpan) -> Fragment {
        let start = span.open.offset + PORTAL_OPEN.len();
        let mut body = Fragment::default();
        for idx in span.open.piece..=span.close.piece {
            let Some(piece) = self.pieces.get(idx) else { break };
            let (text, protected) = match piece {
                Piece::Source(s) => (s.as_str(), false),
                Piece::Resolved(s) => (s.as_str(), true),
            };
            let from = if idx == span.open.piece { start } else { 0 };
            let to = if idx == span.close.piece {
                span.close.offset
            } else {
                text.len()
            };
            body.push_str(text.get(from..to).unwrap_or_default(), protected);
        }
        body
    }

    /// Full source text of a span including markers, for diagnostics.
    pub fn span_text(&self, span: PortalSpan) -> String {
        format!("{PORTAL_OPEN}{}{PORTAL_CLOSE}", self.body(span))
    }

    /// Replace exactly this span with protected `resolved` text.
    pub fn splice(&mut self, span: PortalSpan, resolved: String) {
        let prefix = match self.pieces.get(span.open.piece) {
            Some(Piece::Source(s)) => s.get(..span.open.offset).unwrap_or_default().to_string(),
            _ => String::new(),
        };
        let suffix = match self.pieces.get(span.close.piece) {
            Some(Piece::Source(s)) => s
                .get(span.close.offset + PORTAL_CLOSE.len()..)
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        };

        let tail = self.pieces.split_off(span.close.piece + 1);
        self.pieces.truncate(span.open.piece);
        if !prefix.is_empty() {
            self.pieces.push(Piece::Source(prefix));
        }
        // Kept even when empty so the neighbouring source pieces never fuse
        // into a new marker.
        self.pieces.push(Piece::Resolved(resolved));
        if !suffix.is_empty() {
            self.pieces.push(Piece::Source(suffix));
        }
        self.pieces.extend(tail);
    }

    /// Replace every token-boundary occurrence of `token` in source text with
    /// protected `replacement`. Returns the number of substitutions.
    pub fn substitute_token(&mut self, token: &str, replacement: &str) -> usize {
        if token.is_empty() {
            return 0;
        }
        let mut count = 0;
        let mut pieces = Vec::with_capacity(self.pieces.len());
        for piece in std::mem::take(&mut self.pieces) {
            let Piece::Source(text) = piece else {
                pieces.push(piece);
                continue;
            };
            let mut rest = text.as_str();
            let mut pending = String::new();
            while let Some(at) = find_token(rest, token) {
                let (before, after) = rest.split_at(at);
                pending.push_str(before);
                if !pending.is_empty() {
                    pieces.push(Piece::Source(std::mem::take(&mut pending)));
                }
                pieces.push(Piece::Resolved(replacement.to_string()));
                rest = after.get(token.len()..).unwrap_or_default();
                count += 1;
            }
            pending.push_str(rest);
            if !pending.is_empty() {
                pieces.push(Piece::Source(pending));
            }
        }
        self.pieces = pieces;
        count
    }
}

fn is_token_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '@' | '$')
}

/// Byte offset of the first occurrence of `token` in `haystack` that is not
/// part of a longer token.
fn find_token(haystack: &str, token: &str) -> Option<usize> {
    let mut from = 0;
    while let Some(rel) = haystack.get(from..)?.find(token) {
        let at = from + rel;
        let (before, rest) = haystack.split_at(at);
        let after = rest.get(token.len()..).unwrap_or_default();
        let left_ok = before.chars().next_back().is_none_or(|c| !is_token_char(c));
        let right_ok = after.chars().next().is_none_or(|c| !is_token_char(c));
        if left_ok && right_ok {
            return Some(at);
        }
        from = at + token.chars().next().map_or(1, char::len_utf8);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve_all(mut t: Template, f: impl Fn(&str) -> String) -> Template {
        while let Some(span) = t.innermost() {
            let body = t.body(span).text();
            t.splice(span, f(&body));
        }
        t
    }

    #[test]
    fn finds_innermost_before_outer() {
        let t = Template::new("a ~{{~outer ~{{~inner~}}~ x~}}~ b");
        let span = t.innermost().unwrap();
        assert_eq!(t.body(span).text(), "inner");
    }

    #[test]
    fn siblings_resolve_left_to_right() {
        let t = Template::new("~{{~one~}}~ ~{{~two~}}~");
        let span = t.innermost().unwrap();
        assert_eq!(t.body(span).text(), "one");
    }

    #[test]
    fn splice_marks_result_protected() {
        let mut t = Template::new("x ~{{~outer[v: ~{{~inner~}}~]~}}~ y");
        let span = t.innermost().unwrap();
        t.splice(span, "R".into());
        let outer = t.innermost().unwrap();
        let body = t.body(outer);
        assert_eq!(body.text(), "outer[v: R]");
        let r = body.syms().iter().find(|s| s.ch == 'R').unwrap();
        assert!(r.protected);
    }

    #[test]
    fn resolved_markers_are_never_rescanned() {
        let t = resolve_all(Template::new("[~{{~a~}}~]"), |_| "~{{~b~}}~".to_string());
        assert_eq!(t.render(), "[~{{~b~}}~]");
        assert!(t.innermost().is_none());
    }

    #[test]
    fn empty_result_does_not_fuse_markers() {
        let t = resolve_all(Template::new("~{~{{~x~}}~{~c~}}~"), |_| String::new());
        // `~{` and `{~c~}}~` now touch, but only across a resolved piece.
        assert_eq!(t.render(), "~{{~c~}}~");
        assert!(t.innermost().is_none());
    }

    #[test]
    fn unmatched_markers_are_left_alone() {
        let t = Template::new("a ~{{~ b");
        assert!(t.innermost().is_none());
        let t = Template::new("a ~}}~ b ~{{~");
        assert!(t.innermost().is_none());
    }

    #[test]
    fn portals_may_span_lines() {
        let t = Template::new("~{{~'id'[\n a: 1\n]~}}~");
        assert_eq!(t.body(t.innermost().unwrap()).text(), "'id'[\n a: 1\n]");
    }

    #[test]
    fn substitute_respects_token_boundaries() {
        let mut t = Template::new("@AI-1 @AI-10 @AI-1:thoughts x@AI-1 (@AI-1).");
        let n = t.substitute_token("@AI-1", "M");
        assert_eq!(n, 2);
        assert_eq!(t.render(), "M @AI-10 @AI-1:thoughts x@AI-1 (M).");
    }

    #[test]
    fn from_fragment_keeps_protected_runs_opaque() {
        let mut f = Fragment::source("~{{~'a'[v: ");
        f.push_str("~{{~x~}}~", true);
        f.push_str("]~}}~", false);
        let t = Template::from_fragment(&f);
        assert_eq!(t.render(), f.text());
        let span = t.innermost().unwrap();
        assert_eq!(t.body(span).text(), "'a'[v: ~{{~x~}}~]");
    }

    #[test]
    fn emptied_portal_leaves_gap_in_outer_body() {
        let mut t = Template::new("~{{~'a'[v: ~{{~x~}}~]~}}~");
        let inner = t.innermost().unwrap();
        t.splice(inner, String::new());
        let body = t.body(t.innermost().unwrap());
        assert_eq!(body.text(), "'a'[v: ]");
        assert_eq!(body.gaps(), &[7]);
        assert_eq!(
            Template::from_fragment(&body).pieces,
            vec![
                Piece::Source("'a'[v: ".into()),
                Piece::Resolved(String::new()),
                Piece::Source("]".into()),
            ]
        );
    }

    #[test]
    fn substituted_text_is_protected() {
        let mut t = Template::new("~{{~'p'[a: @AI-1:thoughts]~}}~");
        t.substitute_token("@AI-1:thoughts", "~{{~evil~}}~, b");
        let span = t.innermost().unwrap();
        assert_eq!(t.body(span).text(), "'p'[a: ~{{~evil~}}~, b]");
        assert_eq!(t.span_text(span), "~{{~'p'[a: ~{{~evil~}}~, b]~}}~");
    }
}
