//! Moded lexer. The parser asks for the token at a byte offset in a given
//! [`LexMode`]; markup constructors switch modes so that element and attribute
//! content is scanned with XML rules instead of expression rules.

pub mod chars;
mod token;

pub use token::{Position, Span, Token, TokenKind};

use chars::{is_name_char, is_name_start_char, is_xml_whitespace, resolve_reference};
use compact_str::CompactString;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LexMode {
    /// Expression text: whitespace and `(: :)` comments are skipped.
    Standard,
    /// Inside `<name ...>`: names, `=`, quotes, `>` and `/>`.
    StartTag,
    /// Between a start tag and its end tag.
    ElementContent,
    /// Attribute value delimited by `"`.
    AttrQuot,
    /// Attribute value delimited by `'`.
    AttrApos,
}

/// Anything that can produce the token starting at an offset.
pub trait TokenSource {
    fn token_at(&self, offset: usize, mode: LexMode) -> Token;

    /// Line/column for a byte offset.
    fn position(&self, offset: usize) -> Position;

    /// Raw source text covered by a span.
    fn slice(&self, span: Span) -> &str;
}

pub struct Lexer<'a> {
    source: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        Self { source, line_starts }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    fn make(&self, kind: TokenKind, start: usize, end: usize, text: impl Into<CompactString>, ws: bool) -> Token {
        Token {
            kind,
            text: text.into(),
            span: Span::new(start, end),
            position: self.position(start),
            preceded_by_whitespace: ws,
        }
    }

    fn raw(&self, kind: TokenKind, start: usize, len: usize, ws: bool) -> Token {
        self.make(kind, start, start + len, &self.source[start..start + len], ws)
    }

    fn invalid(&self, start: usize, end: usize, message: impl Into<CompactString>, ws: bool) -> Token {
        self.make(TokenKind::Invalid, start, end, message, ws)
    }

    fn char_at(&self, offset: usize) -> Option<char> {
        self.source.get(offset..).and_then(|s| s.chars().next())
    }

    fn rest(&self, offset: usize) -> &'a str {
        &self.source[offset..]
    }

    /// Skip whitespace and nested `(: ... :)` comments.
    fn skip_trivia(&self, mut pos: usize) -> Result<usize, Token> {
        loop {
            let rest = self.rest(pos);
            let trimmed = rest.trim_start_matches(is_xml_whitespace);
            pos += rest.len() - trimmed.len();
            if !trimmed.starts_with("(:") {
                return Ok(pos);
            }
            let start = pos;
            let mut depth = 0usize;
            loop {
                let rest = self.rest(pos);
                if rest.starts_with("(:") {
                    depth += 1;
                    pos += 2;
                } else if rest.starts_with(":)") {
                    depth -= 1;
                    pos += 2;
                    if depth == 0 {
                        break;
                    }
                } else if let Some(c) = rest.chars().next() {
                    pos += c.len_utf8();
                } else {
                    return Err(self.invalid(start, pos, "unterminated comment", start > 0));
                }
            }
        }
    }

    fn lex_standard(&self, offset: usize) -> Token {
        let start = match self.skip_trivia(offset) {
            Ok(p) => p,
            Err(tok) => return tok,
        };
        let ws = start > offset;
        let rest = self.rest(start);
        let Some(c) = rest.chars().next() else {
            return self.make(TokenKind::Eof, start, start, "", ws);
        };
        let next = rest[c.len_utf8()..].chars().next();
        use TokenKind as T;
        match c {
            '0'..='9' => self.number(start, ws),
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => self.number(start, ws),
            '"' | '\'' => self.string_literal(start, c, ws),
            '$' => self.raw(T::Dollar, start, 1, ws),
            '(' if next == Some('#') => self.pragma(start, ws),
            '(' => self.raw(T::LParen, start, 1, ws),
            ')' => self.raw(T::RParen, start, 1, ws),
            '[' => self.raw(T::LBracket, start, 1, ws),
            ']' => self.raw(T::RBracket, start, 1, ws),
            '{' => self.raw(T::LBrace, start, 1, ws),
            '}' => self.raw(T::RBrace, start, 1, ws),
            ',' => self.raw(T::Comma, start, 1, ws),
            ';' => self.raw(T::Semicolon, start, 1, ws),
            '@' => self.raw(T::At, start, 1, ws),
            '%' => self.raw(T::Percent, start, 1, ws),
            '#' => self.raw(T::Hash, start, 1, ws),
            '?' => self.raw(T::Question, start, 1, ws),
            '.' if next == Some('.') => self.raw(T::DotDot, start, 2, ws),
            '.' => self.raw(T::Dot, start, 1, ws),
            ':' if next == Some('=') => self.raw(T::Assign, start, 2, ws),
            ':' if next == Some(':') => self.raw(T::ColonColon, start, 2, ws),
            ':' => self.raw(T::Colon, start, 1, ws),
            '=' if next == Some('>') => self.raw(T::Arrow, start, 2, ws),
            '=' => self.raw(T::Eq, start, 1, ws),
            '!' if next == Some('=') => self.raw(T::Ne, start, 2, ws),
            '!' => self.raw(T::Bang, start, 1, ws),
            '<' if rest.starts_with("<!--") => self.xml_comment(start, ws),
            '<' if next == Some('?') => self.processing_instruction(start, ws),
            '<' if next == Some('=') => self.raw(T::Le, start, 2, ws),
            '<' if next == Some('<') => self.raw(T::LtLt, start, 2, ws),
            '<' => self.raw(T::Lt, start, 1, ws),
            '>' if next == Some('=') => self.raw(T::Ge, start, 2, ws),
            '>' if next == Some('>') => self.raw(T::GtGt, start, 2, ws),
            '>' => self.raw(T::Gt, start, 1, ws),
            '/' if next == Some('/') => self.raw(T::DoubleSlash, start, 2, ws),
            '/' => self.raw(T::Slash, start, 1, ws),
            '|' if next == Some('|') => self.raw(T::Concat, start, 2, ws),
            '|' => self.raw(T::Pipe, start, 1, ws),
            '+' => self.raw(T::Plus, start, 1, ws),
            '-' => self.raw(T::Minus, start, 1, ws),
            '*' if next == Some(':') => self.local_wildcard(start, ws),
            '*' => self.raw(T::Star, start, 1, ws),
            c if is_name_start_char(c) => self.name(start, ws),
            c => self.invalid(start, start + c.len_utf8(), format!("unexpected character '{c}'"), ws),
        }
    }

    fn scan_ncname(&self, start: usize) -> usize {
        let rest = self.rest(start);
        let mut chars = rest.char_indices();
        match chars.next() {
            Some((_, c)) if is_name_start_char(c) => {}
            _ => return start,
        }
        let len = chars.find(|&(_, c)| !is_name_char(c)).map(|(i, _)| i).unwrap_or(rest.len());
        start + len
    }

    fn name(&self, start: usize, ws: bool) -> Token {
        let end = self.scan_ncname(start);
        let ncname = &self.source[start..end];
        let after = self.rest(end);
        if ncname == "Q" && after.starts_with('{') {
            return self.braced_name(start, ws);
        }
        if let Some(tail) = after.strip_prefix(':') {
            if tail.starts_with(is_name_start_char) {
                let local_end = self.scan_ncname(end + 1);
                return self.raw(TokenKind::QName, start, local_end - start, ws);
            }
            if tail.starts_with('*') {
                return self.make(TokenKind::PrefixWildcard, start, end + 2, ncname, ws);
            }
        }
        let kind = TokenKind::keyword(ncname).unwrap_or(TokenKind::NCName);
        self.make(kind, start, end, ncname, ws)
    }

    /// `Q{uri}local` or `Q{uri}*`.
    fn braced_name(&self, start: usize, ws: bool) -> Token {
        let open = start + 1;
        let Some(close) = self.rest(open).find('}').map(|i| open + i) else {
            return self.invalid(start, self.source.len(), "unterminated braced URI literal", ws);
        };
        if self.rest(close + 1).starts_with('*') {
            return self.make(TokenKind::PrefixWildcard, start, close + 2, &self.source[start..=close], ws);
        }
        let end = self.scan_ncname(close + 1);
        if end == close + 1 {
            return self.invalid(start, close + 1, "expected local name after braced URI literal", ws);
        }
        self.raw(TokenKind::QName, start, end - start, ws)
    }

    fn local_wildcard(&self, start: usize, ws: bool) -> Token {
        let end = self.scan_ncname(start + 2);
        if end == start + 2 {
            return self.raw(TokenKind::Star, start, 1, ws);
        }
        self.make(TokenKind::LocalWildcard, start, end, &self.source[start + 2..end], ws)
    }

    fn number(&self, start: usize, ws: bool) -> Token {
        let bytes = self.source.as_bytes();
        let digits = |mut i: usize| {
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            i
        };
        let mut end = digits(start);
        let mut kind = TokenKind::IntegerLiteral;
        if end < bytes.len() && bytes[end] == b'.' && bytes.get(end + 1) != Some(&b'.') {
            end = digits(end + 1);
            kind = TokenKind::DecimalLiteral;
        }
        if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
            let mut exp = end + 1;
            if exp < bytes.len() && matches!(bytes[exp], b'+' | b'-') {
                exp += 1;
            }
            if exp < bytes.len() && bytes[exp].is_ascii_digit() {
                end = digits(exp);
                kind = TokenKind::DoubleLiteral;
            }
        }
        self.raw(kind, start, end - start, ws)
    }

    fn string_literal(&self, start: usize, quote: char, ws: bool) -> Token {
        let mut value = String::new();
        let mut pos = start + 1;
        loop {
            let Some(c) = self.char_at(pos) else {
                return self.invalid(start, pos, "unterminated string literal", ws);
            };
            if c == quote {
                if self.char_at(pos + 1) == Some(quote) {
                    value.push(quote);
                    pos += 2;
                    continue;
                }
                return self.make(TokenKind::StringLiteral, start, pos + 1, value, ws);
            }
            if c == '&' {
                match resolve_reference(self.rest(pos)) {
                    Some((resolved, len)) => {
                        value.push(resolved);
                        pos += len;
                    }
                    None => return self.invalid(start, pos + 1, "invalid entity or character reference", ws),
                }
                continue;
            }
            value.push(c);
            pos += c.len_utf8();
        }
    }

    fn pragma(&self, start: usize, ws: bool) -> Token {
        let body = start + 2;
        match self.rest(body).find("#)") {
            Some(i) => {
                let content = self.source[body..body + i].trim_start_matches(is_xml_whitespace);
                self.make(TokenKind::Pragma, start, body + i + 2, content, ws)
            }
            None => self.invalid(start, self.source.len(), "unterminated pragma", ws),
        }
    }

    fn xml_comment(&self, start: usize, ws: bool) -> Token {
        let body = start + 4;
        let Some(i) = self.rest(body).find("-->") else {
            return self.invalid(start, self.source.len(), "unterminated XML comment", ws);
        };
        let content = &self.source[body..body + i];
        if content.contains("--") || content.ends_with('-') {
            return self.invalid(start, body + i + 3, "'--' is not allowed inside an XML comment", ws);
        }
        self.make(TokenKind::XmlComment, start, body + i + 3, content, ws)
    }

    fn processing_instruction(&self, start: usize, ws: bool) -> Token {
        let body = start + 2;
        match self.rest(body).find("?>") {
            Some(i) => self.make(TokenKind::XmlPi, start, body + i + 2, &self.source[body..body + i], ws),
            None => self.invalid(start, self.source.len(), "unterminated processing instruction", ws),
        }
    }

    fn cdata(&self, start: usize) -> Token {
        let body = start + "<![CDATA[".len();
        match self.rest(body).find("]]>") {
            Some(i) => self.make(TokenKind::CData, start, body + i + 3, &self.source[body..body + i], false),
            None => self.invalid(start, self.source.len(), "unterminated CDATA section", false),
        }
    }

    fn lex_start_tag(&self, offset: usize) -> Token {
        let rest = self.rest(offset);
        let start = offset + rest.len() - rest.trim_start_matches(is_xml_whitespace).len();
        let ws = start > offset;
        let Some(c) = self.char_at(start) else {
            return self.make(TokenKind::Eof, start, start, "", ws);
        };
        match c {
            '/' if self.rest(start).starts_with("/>") => self.raw(TokenKind::EmptyTagClose, start, 2, ws),
            '>' => self.raw(TokenKind::Gt, start, 1, ws),
            '=' => self.raw(TokenKind::Eq, start, 1, ws),
            '"' => self.raw(TokenKind::Quot, start, 1, ws),
            '\'' => self.raw(TokenKind::Apos, start, 1, ws),
            c if is_name_start_char(c) => {
                let end = self.scan_ncname(start);
                let after = self.rest(end);
                if after.starts_with(':') && after[1..].starts_with(is_name_start_char) {
                    let local_end = self.scan_ncname(end + 1);
                    self.raw(TokenKind::QName, start, local_end - start, ws)
                } else {
                    self.raw(TokenKind::NCName, start, end - start, ws)
                }
            }
            c => self.invalid(start, start + c.len_utf8(), format!("unexpected character '{c}' in start tag"), ws),
        }
    }

    fn lex_element_content(&self, start: usize) -> Token {
        let rest = self.rest(start);
        let Some(c) = rest.chars().next() else {
            return self.make(TokenKind::Eof, start, start, "", false);
        };
        match c {
            '<' if rest.starts_with("</") => self.raw(TokenKind::EndTagOpen, start, 2, false),
            '<' if rest.starts_with("<!--") => self.xml_comment(start, false),
            '<' if rest.starts_with("<![CDATA[") => self.cdata(start),
            '<' if rest.starts_with("<?") => self.processing_instruction(start, false),
            '<' => self.raw(TokenKind::Lt, start, 1, false),
            '{' if !rest.starts_with("{{") => self.raw(TokenKind::LBrace, start, 1, false),
            '}' if !rest.starts_with("}}") => {
                self.invalid(start, start + 1, "unescaped '}' in element content", false)
            }
            _ => self.text_run(start, None),
        }
    }

    fn lex_attribute(&self, start: usize, quote: char) -> Token {
        let rest = self.rest(start);
        let Some(c) = rest.chars().next() else {
            return self.make(TokenKind::Eof, start, start, "", false);
        };
        let doubled = rest[c.len_utf8()..].starts_with(quote);
        match c {
            c if c == quote && !doubled => {
                let kind = if quote == '"' { TokenKind::Quot } else { TokenKind::Apos };
                self.raw(kind, start, 1, false)
            }
            '{' if !rest.starts_with("{{") => self.raw(TokenKind::LBrace, start, 1, false),
            '}' if !rest.starts_with("}}") => {
                self.invalid(start, start + 1, "unescaped '}' in attribute value", false)
            }
            '<' => self.invalid(start, start + 1, "'<' is not allowed in an attribute value", false),
            _ => self.text_run(start, Some(quote)),
        }
    }

    /// Literal character data up to the next markup, brace or closing quote.
    /// `quote` is set inside attribute values, where literal whitespace is
    /// normalized to spaces and doubled quotes stand for one quote.
    fn text_run(&self, start: usize, quote: Option<char>) -> Token {
        let mut value = String::new();
        let mut pos = start;
        while let Some(c) = self.char_at(pos) {
            let rest = self.rest(pos);
            match c {
                '{' | '}' if rest[1..].starts_with(c) => {
                    value.push(c);
                    pos += 2;
                }
                '{' | '}' | '<' => break,
                '&' => match resolve_reference(rest) {
                    Some((resolved, len)) => {
                        value.push(resolved);
                        pos += len;
                    }
                    None => {
                        if pos > start {
                            break;
                        }
                        return self.invalid(pos, pos + 1, "invalid entity or character reference", false);
                    }
                },
                c if Some(c) == quote => {
                    if rest[1..].starts_with(c) {
                        value.push(c);
                        pos += 2;
                    } else {
                        break;
                    }
                }
                c if quote.is_some() && is_xml_whitespace(c) => {
                    value.push(' ');
                    pos += 1;
                }
                c => {
                    value.push(c);
                    pos += c.len_utf8();
                }
            }
        }
        let kind = if quote.is_some() { TokenKind::AttrText } else { TokenKind::ElementText };
        self.make(kind, start, pos, value, false)
    }
}

impl TokenSource for Lexer<'_> {
    fn slice(&self, span: Span) -> &str {
        &self.source[span.start as usize..span.end as usize]
    }

    fn token_at(&self, offset: usize, mode: LexMode) -> Token {
        match mode {
            LexMode::Standard => self.lex_standard(offset),
            LexMode::StartTag => self.lex_start_tag(offset),
            LexMode::ElementContent => self.lex_element_content(offset),
            LexMode::AttrQuot => self.lex_attribute(offset, '"'),
            LexMode::AttrApos => self.lex_attribute(offset, '\''),
        }
    }

    fn position(&self, offset: usize) -> Position {
        let line = self.line_starts.partition_point(|&s| s <= offset).max(1);
        let line_start = self.line_starts[line - 1];
        let column = self.source[line_start..offset.min(self.source.len())].chars().count() + 1;
        Position { line: line as u32, column: column as u32 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let lexer = Lexer::new(source);
        let mut offset = 0;
        let mut out = Vec::new();
        loop {
            let tok = lexer.token_at(offset, LexMode::Standard);
            if tok.kind == TokenKind::Eof {
                return out;
            }
            offset = tok.span.end as usize;
            out.push(tok.kind);
        }
    }

    #[rstest]
    #[case::integer("42", TokenKind::IntegerLiteral)]
    #[case::decimal("4.2", TokenKind::DecimalLiteral)]
    #[case::leading_dot(".5", TokenKind::DecimalLiteral)]
    #[case::double("1e3", TokenKind::DoubleLiteral)]
    #[case::double_signed("1.5E-2", TokenKind::DoubleLiteral)]
    #[case::keyword("return", TokenKind::KwReturn)]
    #[case::ncname("hello-world", TokenKind::NCName)]
    #[case::qname("fn:count", TokenKind::QName)]
    #[case::braced("Q{urn:x}f", TokenKind::QName)]
    #[case::prefix_wildcard("p:*", TokenKind::PrefixWildcard)]
    #[case::local_wildcard("*:item", TokenKind::LocalWildcard)]
    #[case::assign(":=", TokenKind::Assign)]
    #[case::arrow("=>", TokenKind::Arrow)]
    #[case::concat("||", TokenKind::Concat)]
    #[case::pragma("(# ext:opt value #)", TokenKind::Pragma)]
    #[case::xml_comment("<!-- note -->", TokenKind::XmlComment)]
    fn classifies_single_tokens(#[case] source: &str, #[case] expected: TokenKind) {
        assert_eq!(kinds(source), vec![expected]);
    }

    #[test]
    fn names_stop_before_assignment() {
        assert_eq!(kinds("x:=1"), vec![TokenKind::NCName, TokenKind::Assign, TokenKind::IntegerLiteral]);
        assert_eq!(kinds("child::a"), vec![TokenKind::KwChild, TokenKind::ColonColon, TokenKind::NCName]);
    }

    #[test]
    fn comments_nest_and_set_whitespace_flag() {
        let lexer = Lexer::new("(: a (: b :) c :)x");
        let tok = lexer.token_at(0, LexMode::Standard);
        assert_eq!(tok.kind, TokenKind::NCName);
        assert!(tok.preceded_by_whitespace);
        assert_eq!(tok.position, Position { line: 1, column: 18 });
    }

    #[test]
    fn string_literals_unescape() {
        let lexer = Lexer::new(r#""say ""hi"" &amp; &#65;""#);
        let tok = lexer.token_at(0, LexMode::Standard);
        assert_eq!(tok.kind, TokenKind::StringLiteral);
        assert_eq!(tok.text, "say \"hi\" & A");
    }

    #[test]
    fn unterminated_string_is_invalid() {
        let tok = Lexer::new("'abc").token_at(0, LexMode::Standard);
        assert_eq!(tok.kind, TokenKind::Invalid);
        assert_eq!(tok.text, "unterminated string literal");
    }

    #[test]
    fn element_content_handles_escapes() {
        let lexer = Lexer::new("a {{b}} &lt;c<d/>");
        let tok = lexer.token_at(0, LexMode::ElementContent);
        assert_eq!(tok.kind, TokenKind::ElementText);
        assert_eq!(tok.text, "a {b} <c");
        let next = lexer.token_at(tok.span.end as usize, LexMode::ElementContent);
        assert_eq!(next.kind, TokenKind::Lt);
    }

    #[test]
    fn attribute_values_normalize_whitespace() {
        let lexer = Lexer::new("a\tb\"\"c\"");
        let tok = lexer.token_at(0, LexMode::AttrQuot);
        assert_eq!(tok.kind, TokenKind::AttrText);
        assert_eq!(tok.text, "a b\"c");
        let close = lexer.token_at(tok.span.end as usize, LexMode::AttrQuot);
        assert_eq!(close.kind, TokenKind::Quot);
    }

    #[test]
    fn positions_are_one_based() {
        let lexer = Lexer::new("1,\n  foo");
        assert_eq!(lexer.position(5), Position { line: 2, column: 3 });
    }
}
