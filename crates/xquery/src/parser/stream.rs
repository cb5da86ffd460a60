use crate::lexer::{LexMode, Token, TokenSource};

/// Saved stream position for [`TokenStream::rewind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(usize);

struct Buffered {
    token: Token,
    mode: LexMode,
}

/// Buffered token stream with mode-aware lookahead and mark/rewind.
///
/// A buffered token is only reused when it was lexed in the mode now being
/// requested; otherwise the tail of the buffer is discarded and re-lexed from
/// the end offset of the previous token.
pub struct TokenStream<S> {
    source: S,
    buf: Vec<Buffered>,
    next: usize,
}

impl<S: TokenSource> TokenStream<S> {
    pub fn new(source: S) -> Self {
        Self { source, buf: Vec::new(), next: 0 }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn offset(&self) -> usize {
        match self.next {
            0 => 0,
            n => self.buf[n - 1].token.span.end as usize,
        }
    }

    fn forward(&mut self, mode: LexMode, keep: bool) -> Token {
        if self.buf.get(self.next).is_some_and(|b| b.mode != mode) {
            self.buf.truncate(self.next);
        }
        if self.buf.len() == self.next {
            let token = self.source.token_at(self.offset(), mode);
            self.buf.push(Buffered { token, mode });
        }
        let token = self.buf[self.next].token.clone();
        if keep {
            self.next += 1;
        }
        token
    }

    pub fn peek(&mut self, mode: LexMode) -> Token {
        self.forward(mode, false)
    }

    /// Look `n` tokens past the current one (`n == 0` is [`Self::peek`]).
    pub fn peek_nth(&mut self, n: usize, mode: LexMode) -> Token {
        let mark = self.mark();
        for _ in 0..n {
            self.forward(mode, true);
        }
        let token = self.forward(mode, false);
        self.rewind(mark);
        token
    }

    pub fn consume(&mut self, mode: LexMode) -> Token {
        self.forward(mode, true)
    }

    pub fn mark(&self) -> Mark {
        Mark(self.next)
    }

    pub fn rewind(&mut self, mark: Mark) {
        self.next = mark.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{Lexer, TokenKind};

    #[test]
    fn rewind_restores_position() {
        let mut stream = TokenStream::new(Lexer::new("for $x in y"));
        let mark = stream.mark();
        assert_eq!(stream.consume(LexMode::Standard).kind, TokenKind::KwFor);
        assert_eq!(stream.consume(LexMode::Standard).kind, TokenKind::Dollar);
        stream.rewind(mark);
        assert_eq!(stream.peek(LexMode::Standard).kind, TokenKind::KwFor);
        assert_eq!(stream.peek_nth(3, LexMode::Standard).kind, TokenKind::KwIn);
        assert_eq!(stream.peek(LexMode::Standard).kind, TokenKind::KwFor);
    }

    #[test]
    fn mode_switch_relexes() {
        let mut stream = TokenStream::new(Lexer::new("a b>"));
        assert_eq!(stream.peek(LexMode::Standard).kind, TokenKind::NCName);
        let tok = stream.consume(LexMode::StartTag);
        assert_eq!(tok.kind, TokenKind::NCName);
        assert_eq!(stream.peek(LexMode::Standard).kind, TokenKind::NCName);
        let name = stream.consume(LexMode::StartTag);
        assert!(name.preceded_by_whitespace);
        assert_eq!(stream.consume(LexMode::StartTag).kind, TokenKind::Gt);
    }
}
