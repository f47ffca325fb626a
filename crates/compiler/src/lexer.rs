//! Indentation-aware lexer.
//!
//! The lexer eagerly tokenizes the whole source into a [`TokenStream`],
//! synthesizing `NEWLINE`, `INDENT` and `DEDENT` tokens from whitespace. A
//! stack of indent widths tracks nesting; blank and comment-only lines are
//! structurally insignificant and emit nothing.
//!
//! Invalid characters and unterminated strings become `ERROR` tokens so the
//! parser can localise the failure; inconsistent indentation aborts lexing
//! immediately since the rest of the stream would be structurally garbage.

use crate::error::CompilationError;
use crate::token::{
    self, Token, TokenKind, MAX_OPERATOR_LEN,
};

/// Lexer options. Defaults match CPython conventions: four-column tabs,
/// space-only indentation, comments stripped, annotations recognised.
#[derive(Debug, Clone)]
pub struct LexerConfig {
    /// Columns per tab when computing indent widths
    pub tab_width: usize,
    /// Permit tab characters in indentation
    pub allow_tab_indent: bool,
    /// Reject indentation that mixes tabs into space-indented code
    pub strict_indentation: bool,
    /// Discard comments during lexing
    pub ignore_comments: bool,
    /// Recognise `:` and `->` annotation tokens
    pub support_type_annotations: bool,
}

impl Default for LexerConfig {
    fn default() -> Self {
        LexerConfig {
            tab_width: 4,
            allow_tab_indent: false,
            strict_indentation: true,
            ignore_comments: true,
            support_type_annotations: true,
        }
    }
}

/// A saved read-cursor position, for bounded parser lookahead.
#[derive(Debug, Clone, Copy)]
pub struct StreamState {
    cursor: usize,
}

/// The lexer's output: an immutable token vector with a mutable read cursor.
#[derive(Debug)]
pub struct TokenStream {
    tokens: Vec<Token>,
    cursor: usize,
}

impl TokenStream {
    fn new(tokens: Vec<Token>) -> Self {
        TokenStream { tokens, cursor: 0 }
    }

    /// The token at the cursor without consuming it.
    pub fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    /// Look ahead `offset` tokens past the cursor. Past the end, returns the
    /// final EOF token.
    pub fn peek_at(&self, offset: usize) -> &Token {
        let idx = self.cursor + offset;
        if idx < self.tokens.len() {
            &self.tokens[idx]
        } else {
            self.tokens.last().expect("token vector always ends in EOF")
        }
    }

    /// Consume and return the token at the cursor.
    pub fn next(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.cursor < self.tokens.len() {
            self.cursor += 1;
        }
        tok
    }

    /// Consume the current token if it has the given kind.
    pub fn eat(&mut self, kind: TokenKind) -> bool {
        if self.peek().kind == kind {
            self.next();
            true
        } else {
            false
        }
    }

    pub fn save(&self) -> StreamState {
        StreamState {
            cursor: self.cursor,
        }
    }

    pub fn restore(&mut self, state: StreamState) {
        self.cursor = state.cursor;
    }

    pub fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    /// All tokens, for debug dumps and source recovery.
    pub fn all_tokens(&self) -> &[Token] {
        &self.tokens
    }
}

/// The lexer itself. Construct with [`Lexer::new`], then call
/// [`Lexer::tokenize`] once to obtain the stream.
pub struct Lexer {
    chars: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    indent_stack: Vec<usize>,
    tokens: Vec<Token>,
    config: LexerConfig,
}

impl Lexer {
    pub fn new(source: &str, config: LexerConfig) -> Self {
        Lexer {
            chars: source.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
            indent_stack: vec![0],
            tokens: Vec::new(),
            config,
        }
    }

    /// Tokenize the whole source. Lexical errors that can be localised are
    /// embedded as `ERROR` tokens; indentation errors abort immediately.
    pub fn tokenize(mut self) -> Result<TokenStream, CompilationError> {
        let mut at_line_start = true;

        while !self.is_at_end() {
            if at_line_start {
                if self.consume_insignificant_line() {
                    continue;
                }
                self.process_indentation()?;
                at_line_start = false;
            }

            self.skip_inline_whitespace();

            if self.is_at_end() {
                break;
            }

            let c = self.peek();
            if c == '#' {
                self.skip_comment();
                continue;
            }
            if self.at_newline() {
                self.consume_newline();
                self.push(Token::new(TokenKind::Newline, "\n", self.line - 1, 1));
                at_line_start = true;
                continue;
            }

            self.scan_token();
        }

        // A final line without a trailing newline still terminates a statement.
        if !at_line_start {
            self.push(Token::new(TokenKind::Newline, "\n", self.line, self.column));
        }

        // Restore indent level 0 at EOF.
        while *self.indent_stack.last().unwrap_or(&0) > 0 {
            self.indent_stack.pop();
            self.push(Token::new(TokenKind::Dedent, "", self.line, 1));
        }

        self.push(Token::new(TokenKind::Eof, "", self.line, self.column));
        Ok(TokenStream::new(self.tokens))
    }

    // === Indentation ===

    /// If the upcoming line is blank or comment-only, consume it entirely
    /// (emitting nothing) and return true.
    fn consume_insignificant_line(&mut self) -> bool {
        let mut probe = self.position;
        while probe < self.chars.len() {
            match self.chars[probe] {
                ' ' | '\t' => probe += 1,
                _ => break,
            }
        }
        let significant = match self.chars.get(probe) {
            Some('#') | Some('\n') | Some('\r') => false,
            Some(_) => true,
            Option::None => false,
        };
        if significant {
            return false;
        }
        // Swallow the entire line including its newline.
        while !self.is_at_end() && !self.at_newline() {
            self.advance();
        }
        if !self.is_at_end() {
            self.consume_newline();
        }
        true
    }

    /// Measure the indentation of a significant line and emit INDENT/DEDENT
    /// against the indent stack.
    fn process_indentation(&mut self) -> Result<(), CompilationError> {
        let mut width = 0usize;
        loop {
            match self.peek_opt() {
                Some(' ') => {
                    width += 1;
                    self.advance();
                }
                Some('\t') => {
                    if !self.config.allow_tab_indent && self.config.strict_indentation {
                        return Err(CompilationError::lex(
                            self.line,
                            self.column,
                            "tab character in indentation (spaces required)",
                        ));
                    }
                    width += self.config.tab_width;
                    self.advance();
                }
                _ => break,
            }
        }

        let top = *self.indent_stack.last().unwrap_or(&0);
        if width > top {
            self.indent_stack.push(width);
            self.push(Token::new(TokenKind::Indent, "", self.line, 1));
        } else if width < top {
            while *self.indent_stack.last().unwrap_or(&0) > width {
                self.indent_stack.pop();
                self.push(Token::new(TokenKind::Dedent, "", self.line, 1));
            }
            if *self.indent_stack.last().unwrap_or(&0) != width {
                return Err(CompilationError::lex(
                    self.line,
                    self.column,
                    format!(
                        "inconsistent indentation: width {} does not match any enclosing block",
                        width
                    ),
                ));
            }
        }
        Ok(())
    }

    // === Scanning ===

    fn scan_token(&mut self) {
        let c = self.peek();
        if c.is_ascii_alphabetic() || c == '_' {
            self.scan_identifier();
        } else if c.is_ascii_digit() {
            self.scan_number();
        } else if c == '"' || c == '\'' {
            self.scan_string();
        } else {
            self.scan_operator();
        }
    }

    fn scan_identifier(&mut self) {
        let line = self.line;
        let column = self.column;
        let mut text = String::new();
        while let Some(c) = self.peek_opt() {
            if c.is_ascii_alphanumeric() || c == '_' {
                text.push(c);
                self.advance();
            } else {
                break;
            }
        }
        let kind = token::keyword_kind(&text).unwrap_or(TokenKind::Identifier);
        self.push(Token::new(kind, text, line, column));
    }

    fn scan_number(&mut self) {
        let line = self.line;
        let column = self.column;
        let mut text = String::new();
        let mut seen_dot = false;
        let mut seen_exp = false;

        while let Some(c) = self.peek_opt() {
            if c.is_ascii_digit() {
                text.push(c);
                self.advance();
            } else if c == '.' && !seen_dot && !seen_exp {
                seen_dot = true;
                text.push(c);
                self.advance();
            } else if (c == 'e' || c == 'E') && !seen_exp && !text.is_empty() {
                // Only an exponent if followed by a digit or sign+digit.
                let next = self.chars.get(self.position + 1).copied();
                let next2 = self.chars.get(self.position + 2).copied();
                let is_exp = match next {
                    Some(d) if d.is_ascii_digit() => true,
                    Some('+') | Some('-') => next2.is_some_and(|d| d.is_ascii_digit()),
                    _ => false,
                };
                if !is_exp {
                    break;
                }
                seen_exp = true;
                text.push(c);
                self.advance();
                if let Some(sign @ ('+' | '-')) = self.peek_opt() {
                    text.push(sign);
                    self.advance();
                }
            } else {
                break;
            }
        }

        let kind = if seen_dot || seen_exp {
            TokenKind::Float
        } else {
            TokenKind::Integer
        };
        self.push(Token::new(kind, text, line, column));
    }

    fn scan_string(&mut self) {
        let line = self.line;
        let column = self.column;
        let quote = self.advance();
        let mut value = String::new();

        loop {
            match self.peek_opt() {
                Option::None => {
                    self.push(Token::new(
                        TokenKind::Error,
                        "unterminated string literal (missing closing quote)",
                        line,
                        column,
                    ));
                    return;
                }
                Some('\n') | Some('\r') => {
                    self.push(Token::new(
                        TokenKind::Error,
                        "unterminated string literal (missing closing quote)",
                        line,
                        column,
                    ));
                    return;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek_opt() {
                        Some('n') => {
                            value.push('\n');
                            self.advance();
                        }
                        Some('t') => {
                            value.push('\t');
                            self.advance();
                        }
                        Some('r') => {
                            value.push('\r');
                            self.advance();
                        }
                        Some('\\') => {
                            value.push('\\');
                            self.advance();
                        }
                        Some('"') => {
                            value.push('"');
                            self.advance();
                        }
                        Some('\'') => {
                            value.push('\'');
                            self.advance();
                        }
                        Some(other) => {
                            // Unknown escape: keep the backslash verbatim.
                            value.push('\\');
                            value.push(other);
                            self.advance();
                        }
                        Option::None => {}
                    }
                }
                Some(c) if c == quote => {
                    self.advance();
                    self.push(Token::with_quote(TokenKind::Str, value, line, column, quote));
                    return;
                }
                Some(c) => {
                    value.push(c);
                    self.advance();
                }
            }
        }
    }

    fn scan_operator(&mut self) {
        let line = self.line;
        let column = self.column;

        // Longest-prefix match for multi-character operators.
        let mut len = MAX_OPERATOR_LEN.min(self.chars.len() - self.position);
        while len >= 2 {
            let candidate: String = self.chars[self.position..self.position + len]
                .iter()
                .collect();
            if let Some(kind) = token::compound_operator_kind(&candidate) {
                if !self.config.support_type_annotations && kind == TokenKind::Arrow {
                    break;
                }
                for _ in 0..len {
                    self.advance();
                }
                self.push(Token::new(kind, candidate, line, column));
                return;
            }
            len -= 1;
        }

        let c = self.peek();
        if let Some(kind) = token::simple_operator_kind(c) {
            self.advance();
            self.push(Token::new(kind, c.to_string(), line, column));
            return;
        }

        self.advance();
        self.push(Token::new(
            TokenKind::Error,
            format!("invalid character '{}'", c),
            line,
            column,
        ));
    }

    // === Character helpers ===

    fn is_at_end(&self) -> bool {
        self.position >= self.chars.len()
    }

    fn peek(&self) -> char {
        self.chars[self.position]
    }

    fn peek_opt(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn advance(&mut self) -> char {
        let c = self.chars[self.position];
        self.position += 1;
        self.column += 1;
        c
    }

    fn at_newline(&self) -> bool {
        matches!(self.peek_opt(), Some('\n') | Some('\r'))
    }

    /// Consume one newline, normalising `\r\n` and lone `\r` to a single
    /// line terminator.
    fn consume_newline(&mut self) {
        let c = self.chars[self.position];
        self.position += 1;
        if c == '\r' && self.peek_opt() == Some('\n') {
            self.position += 1;
        }
        self.line += 1;
        self.column = 1;
    }

    fn skip_inline_whitespace(&mut self) {
        while let Some(c) = self.peek_opt() {
            if c == ' ' || c == '\t' {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn skip_comment(&mut self) {
        while !self.is_at_end() && !self.at_newline() {
            self.advance();
        }
    }

    /// Append a token, fusing the two-word operators `is not` and `not in`.
    fn push(&mut self, token: Token) {
        if token.kind == TokenKind::Not {
            if let Some(prev) = self.tokens.last() {
                if prev.kind == TokenKind::Is {
                    let prev = self.tokens.pop().unwrap();
                    self.tokens.push(Token::new(
                        TokenKind::IsNot,
                        "is not",
                        prev.line,
                        prev.column,
                    ));
                    return;
                }
            }
        }
        if token.kind == TokenKind::In {
            if let Some(prev) = self.tokens.last() {
                if prev.kind == TokenKind::Not {
                    let prev = self.tokens.pop().unwrap();
                    self.tokens.push(Token::new(
                        TokenKind::NotIn,
                        "not in",
                        prev.line,
                        prev.column,
                    ));
                    return;
                }
            }
        }
        self.tokens.push(token);
    }
}

/// Convenience: lex with default configuration.
pub fn tokenize(source: &str) -> Result<TokenStream, CompilationError> {
    Lexer::new(source, LexerConfig::default()).tokenize()
}

// === Source recovery (debug aid) ===

/// Re-render a token stream into approximate source text. Comments and exact
/// whitespace are lost; re-lexing the output yields an equivalent stream.
pub fn recover_source(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut indent: usize = 0;
    let mut need_indent = true;
    let mut prev_kind: Option<TokenKind> = Option::None;

    for tok in tokens {
        match tok.kind {
            TokenKind::Eof | TokenKind::Error => {}
            TokenKind::Newline => {
                out.push('\n');
                need_indent = true;
                prev_kind = Option::None;
            }
            TokenKind::Indent => indent += 1,
            TokenKind::Dedent => indent = indent.saturating_sub(1),
            kind => {
                if need_indent {
                    for _ in 0..indent {
                        out.push_str("    ");
                    }
                    need_indent = false;
                } else if let Some(prev) = prev_kind {
                    if token::needs_space_between(prev, kind) {
                        out.push(' ');
                    }
                }
                if kind == TokenKind::Str {
                    let quote = tok.quote_char.unwrap_or('"');
                    out.push(quote);
                    for c in tok.text.chars() {
                        match c {
                            '\n' => out.push_str("\\n"),
                            '\t' => out.push_str("\\t"),
                            '\r' => out.push_str("\\r"),
                            '\\' => out.push_str("\\\\"),
                            c if c == quote => {
                                out.push('\\');
                                out.push(c);
                            }
                            c => out.push(c),
                        }
                    }
                    out.push(quote);
                } else {
                    out.push_str(&tok.text);
                }
                prev_kind = Some(kind);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .all_tokens()
            .iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_statement() {
        let k = kinds("x = 1\n");
        assert_eq!(
            k,
            vec![
                TokenKind::Identifier,
                TokenKind::Assign,
                TokenKind::Integer,
                TokenKind::Newline,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_indent_dedent_balanced() {
        let source = "if x:\n    y = 1\n    if z:\n        w = 2\nq = 3\n";
        let k = kinds(source);
        let indents = k.iter().filter(|k| **k == TokenKind::Indent).count();
        let dedents = k.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(indents, 2);
        assert_eq!(dedents, 2);
    }

    #[test]
    fn test_trailing_dedents_at_eof() {
        // No newline at EOF, two open blocks.
        let source = "if x:\n    if y:\n        z = 1";
        let k = kinds(source);
        let dedents = k.iter().filter(|k| **k == TokenKind::Dedent).count();
        assert_eq!(dedents, 2);
        assert_eq!(*k.last().unwrap(), TokenKind::Eof);
        // The statement still gets its NEWLINE even without one in the source.
        assert!(k.contains(&TokenKind::Newline));
    }

    #[test]
    fn test_blank_and_comment_lines_are_insignificant() {
        let source = "x = 1\n\n   \n# comment line\ny = 2\n";
        let k = kinds(source);
        assert!(!k.contains(&TokenKind::Indent));
        assert!(!k.contains(&TokenKind::Dedent));
        // Exactly two NEWLINEs: one per real statement.
        assert_eq!(k.iter().filter(|k| **k == TokenKind::Newline).count(), 2);
    }

    #[test]
    fn test_comment_only_module() {
        let source = "# nothing here\n\n# more nothing\n";
        let k = kinds(source);
        assert_eq!(k, vec![TokenKind::Eof]);
    }

    #[test]
    fn test_tab_indent_rejected_when_strict() {
        let source = "if x:\n\ty = 1\n";
        let err = tokenize(source).unwrap_err();
        assert!(err.message.contains("tab"));
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_tab_indent_counts_tab_width_when_allowed() {
        let config = LexerConfig {
            allow_tab_indent: true,
            ..LexerConfig::default()
        };
        // One tab then four spaces on the next line: same width, no error.
        let source = "if x:\n\ty = 1\n    z = 2\n";
        let stream = Lexer::new(source, config).tokenize().unwrap();
        let k: Vec<_> = stream.all_tokens().iter().map(|t| t.kind).collect();
        assert_eq!(k.iter().filter(|k| **k == TokenKind::Indent).count(), 1);
        assert_eq!(k.iter().filter(|k| **k == TokenKind::Dedent).count(), 1);
    }

    #[test]
    fn test_inconsistent_dedent() {
        let source = "if x:\n    y = 1\n  z = 2\n";
        let err = tokenize(source).unwrap_err();
        assert!(err.message.contains("inconsistent indentation"));
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_number_classification() {
        let stream = tokenize("1 23 3.14 1e5 2.5e-3 7\n").unwrap();
        let k: Vec<_> = stream
            .all_tokens()
            .iter()
            .filter(|t| matches!(t.kind, TokenKind::Integer | TokenKind::Float))
            .map(|t| (t.kind, t.text.clone()))
            .collect();
        assert_eq!(
            k,
            vec![
                (TokenKind::Integer, "1".to_string()),
                (TokenKind::Integer, "23".to_string()),
                (TokenKind::Float, "3.14".to_string()),
                (TokenKind::Float, "1e5".to_string()),
                (TokenKind::Float, "2.5e-3".to_string()),
                (TokenKind::Integer, "7".to_string()),
            ]
        );
    }

    #[test]
    fn test_string_escapes_and_quote_char() {
        let stream = tokenize("s = 'a\\n\\'b'\nt = \"c\\td\"\n").unwrap();
        let strings: Vec<_> = stream
            .all_tokens()
            .iter()
            .filter(|t| t.kind == TokenKind::Str)
            .cloned()
            .collect();
        assert_eq!(strings[0].text, "a\n'b");
        assert_eq!(strings[0].quote_char, Some('\''));
        assert_eq!(strings[1].text, "c\td");
        assert_eq!(strings[1].quote_char, Some('"'));
    }

    #[test]
    fn test_unterminated_string_error_token() {
        let stream = tokenize("s = 'oops\n").unwrap();
        let err = stream
            .all_tokens()
            .iter()
            .find(|t| t.kind == TokenKind::Error)
            .expect("expected an error token");
        assert!(err.text.contains("unterminated string"));
    }

    #[test]
    fn test_invalid_character_error_token() {
        let stream = tokenize("x = 1 $ 2\n").unwrap();
        let err = stream
            .all_tokens()
            .iter()
            .find(|t| t.kind == TokenKind::Error)
            .expect("expected an error token");
        assert!(err.text.contains("invalid character '$'"));
    }

    #[test]
    fn test_operator_longest_match() {
        let stream = tokenize("a **= b // c -> d <= e ** f\n").unwrap();
        let ops: Vec<_> = stream
            .all_tokens()
            .iter()
            .filter(|t| {
                !matches!(
                    t.kind,
                    TokenKind::Identifier | TokenKind::Newline | TokenKind::Eof
                )
            })
            .map(|t| t.kind)
            .collect();
        assert_eq!(
            ops,
            vec![
                TokenKind::PowerAssign,
                TokenKind::FloorDiv,
                TokenKind::Arrow,
                TokenKind::Le,
                TokenKind::Power,
            ]
        );
    }

    #[test]
    fn test_is_not_and_not_in_fused() {
        let stream = tokenize("a is not b\nc not in d\nnot e\n").unwrap();
        let k: Vec<_> = stream
            .all_tokens()
            .iter()
            .map(|t| t.kind)
            .filter(|k| !matches!(k, TokenKind::Newline | TokenKind::Eof))
            .collect();
        assert_eq!(
            k,
            vec![
                TokenKind::Identifier,
                TokenKind::IsNot,
                TokenKind::Identifier,
                TokenKind::Identifier,
                TokenKind::NotIn,
                TokenKind::Identifier,
                TokenKind::Not,
                TokenKind::Identifier,
            ]
        );
    }

    #[test]
    fn test_stream_lookahead_and_restore() {
        let mut stream = tokenize("a + b\n").unwrap();
        assert_eq!(stream.peek().kind, TokenKind::Identifier);
        assert_eq!(stream.peek_at(1).kind, TokenKind::Plus);
        let saved = stream.save();
        stream.next();
        stream.next();
        assert_eq!(stream.peek().kind, TokenKind::Identifier);
        stream.restore(saved);
        assert_eq!(stream.peek().kind, TokenKind::Identifier);
        assert_eq!(stream.peek().text, "a");
    }

    #[test]
    fn test_crlf_normalisation() {
        let k = kinds("x = 1\r\ny = 2\rz = 3\n");
        assert_eq!(k.iter().filter(|k| **k == TokenKind::Newline).count(), 3);
    }

    #[test]
    fn test_recover_source_round_trip() {
        let source = "def f(a, b):\n    x = a + b * 2\n    if x >= 10:\n        return x\n    return 0\n";
        let stream = tokenize(source).unwrap();
        let recovered = recover_source(stream.all_tokens());
        let restream = tokenize(&recovered).unwrap();

        let orig: Vec<_> = stream
            .all_tokens()
            .iter()
            .map(|t| (t.kind, t.text.clone()))
            .collect();
        let round: Vec<_> = restream
            .all_tokens()
            .iter()
            .map(|t| (t.kind, t.text.clone()))
            .collect();
        assert_eq!(orig, round);
    }

    #[test]
    fn test_recover_source_strings_requoted() {
        let source = "s = 'it\\'s'\n";
        let stream = tokenize(source).unwrap();
        let recovered = recover_source(stream.all_tokens());
        assert_eq!(recovered, "s='it\\'s'\n");
        let restream = tokenize(&recovered).unwrap();
        let tok = restream
            .all_tokens()
            .iter()
            .find(|t| t.kind == TokenKind::Str)
            .unwrap();
        assert_eq!(tok.text, "it's");
    }
}
