//! Template lexer: one forward pass over source bytes, splitting it into
//! interleaved RAW / VAR / TAG tokens with trim markers and spans. Does
//! not interpret expression contents; that's the expression lexer's job.

use liquidil_bytecode::Span;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Raw,
    Var,
    Tag,
    Eof,
}

#[derive(Clone, Debug)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// For Var/Tag, the trimmed interior text between the delimiters
    /// (e.g. `if x` for `{%- if x -%}`). For Raw, the literal text.
    pub content: &'a str,
    pub trim_left: bool,
    pub trim_right: bool,
    pub span: Span,
}

pub struct TemplateLexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> TemplateLexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    /// Scans the raw body of a `{% raw %}...{% endraw %}` block verbatim,
    /// without tokenizing tag/var markers inside it. Called by the parser
    /// once it has consumed the opening `raw` tag.
    pub fn scan_raw_body(&mut self) -> &'a str {
        let start = self.pos;
        loop {
            match self.rest().find("{%") {
                None => {
                    self.pos = self.src.len();
                    return &self.src[start..self.pos];
                }
                Some(rel) => {
                    let candidate = self.pos + rel;
                    let after = &self.src[candidate..];
                    let stripped = after.strip_prefix("{%").unwrap();
                    let stripped = stripped.strip_prefix('-').unwrap_or(stripped);
                    let trimmed = stripped.trim_start();
                    if trimmed.starts_with("endraw") {
                        let body_end = candidate;
                        self.pos = candidate;
                        return &self.src[start..body_end];
                    }
                    self.pos = candidate + 2;
                }
            }
        }
    }

    /// Advances past the next `{% ... %}`/`{{ ... }}` delimiter pair,
    /// returning its parsed token. Used internally by `next`.
    fn scan_delimited(&mut self, open: &'static str, close: &'static str, kind: TokenKind) -> Token<'a> {
        let tok_start = self.pos;
        let after_open = self.pos + open.len();
        let trim_left = self.src[after_open..].starts_with('-');
        let content_start = if trim_left { after_open + 1 } else { after_open };

        let close_rel = self.src[content_start..].find(close).unwrap_or(self.src.len() - content_start);
        let mut content_end = content_start + close_rel;
        let trim_right = content_end > content_start && self.src.as_bytes()[content_end - 1] == b'-';
        let text_end = if trim_right { content_end - 1 } else { content_end };
        let content = self.src[content_start..text_end].trim();

        content_end = (content_start + close_rel).min(self.src.len());
        let after_close = (content_end + close.len()).min(self.src.len());
        self.pos = after_close;

        Token {
            kind,
            content,
            trim_left,
            trim_right,
            span: Span::new(tok_start as u32, after_close as u32),
        }
    }

    pub fn next(&mut self) -> Token<'a> {
        if self.pos >= self.src.len() {
            return Token {
                kind: TokenKind::Eof,
                content: "",
                trim_left: false,
                trim_right: false,
                span: Span::new(self.pos as u32, self.pos as u32),
            };
        }

        let rest = self.rest();
        if rest.starts_with("{{") {
            return self.scan_delimited("{{", "}}", TokenKind::Var);
        }
        if rest.starts_with("{%") {
            return self.scan_delimited("{%", "%}", TokenKind::Tag);
        }

        let start = self.pos;
        let next_marker = rest.find("{{").into_iter().chain(rest.find("{%")).min();
        let end = match next_marker {
            Some(rel) => start + rel,
            None => self.src.len(),
        };
        self.pos = end;
        Token {
            kind: TokenKind::Raw,
            content: &self.src[start..end],
            trim_left: false,
            trim_right: false,
            span: Span::new(start as u32, end as u32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        let mut lexer = TemplateLexer::new(src);
        let mut out = vec![];
        loop {
            let tok = lexer.next();
            if tok.kind == TokenKind::Eof {
                break;
            }
            out.push(tok.kind);
        }
        out
    }

    #[test]
    fn splits_raw_var_tag() {
        let src = "hi {{ name }} {% if x %}y{% endif %}";
        assert_eq!(
            kinds(src),
            vec![
                TokenKind::Raw,
                TokenKind::Var,
                TokenKind::Raw,
                TokenKind::Tag,
                TokenKind::Raw,
                TokenKind::Tag,
            ]
        );
    }

    #[test]
    fn detects_trim_markers() {
        let mut lexer = TemplateLexer::new("{{- x -}}");
        let tok = lexer.next();
        assert!(tok.trim_left);
        assert!(tok.trim_right);
        assert_eq!(tok.content, "x");
    }

    #[test]
    fn raw_body_skips_inner_markers() {
        let src = "{{ not a var }}{% endraw %}";
        let mut lexer = TemplateLexer::new(src);
        let body = lexer.scan_raw_body();
        assert_eq!(body, "{{ not a var }}");
        let tok = lexer.next();
        assert_eq!(tok.kind, TokenKind::Tag);
        assert_eq!(tok.content, "endraw");
    }
}
