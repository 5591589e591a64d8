use crate::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Number(f64),
    /// Duration literal kept as written (`5m`, `1h30m`).
    Duration(String),
    Str(String),
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Colon,
    At,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Assign,
    Eql,
    Neq,
    Lss,
    Gtr,
    Lte,
    Gte,
    RegexMatch,
    RegexNoMatch,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character.
    pub offset: usize,
}

const DURATION_UNITS: &[u8] = b"ywdhms";

pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    Lexer::new(input).run()
}

struct Lexer<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Inside `[...]` a colon separates range and step instead of starting
    /// a metric name.
    bracket_depth: usize,
    tokens: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            bracket_depth: 0,
            tokens: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, ParseError> {
        loop {
            self.skip_whitespace_and_comments();
            let start = self.pos;
            let Some(ch) = self.peek() else {
                self.push(TokenKind::Eof, start);
                return Ok(self.tokens);
            };

            let kind = match ch {
                b'(' => self.single(TokenKind::LParen),
                b')' => self.single(TokenKind::RParen),
                b'{' => self.single(TokenKind::LBrace),
                b'}' => self.single(TokenKind::RBrace),
                b'[' => {
                    self.bracket_depth += 1;
                    self.single(TokenKind::LBracket)
                }
                b']' => {
                    self.bracket_depth = self.bracket_depth.saturating_sub(1);
                    self.single(TokenKind::RBracket)
                }
                b',' => self.single(TokenKind::Comma),
                b'@' => self.single(TokenKind::At),
                b'+' => self.single(TokenKind::Add),
                b'-' => self.single(TokenKind::Sub),
                b'*' => self.single(TokenKind::Mul),
                b'/' => self.single(TokenKind::Div),
                b'%' => self.single(TokenKind::Mod),
                b'^' => self.single(TokenKind::Pow),
                b'=' => {
                    self.pos += 1;
                    if self.consume_if(b'=') {
                        TokenKind::Eql
                    } else if self.consume_if(b'~') {
                        TokenKind::RegexMatch
                    } else {
                        TokenKind::Assign
                    }
                }
                b'!' => {
                    self.pos += 1;
                    if self.consume_if(b'=') {
                        TokenKind::Neq
                    } else if self.consume_if(b'~') {
                        TokenKind::RegexNoMatch
                    } else {
                        return Err(ParseError::new("unexpected '!'", start));
                    }
                }
                b'<' => {
                    self.pos += 1;
                    if self.consume_if(b'=') {
                        TokenKind::Lte
                    } else {
                        TokenKind::Lss
                    }
                }
                b'>' => {
                    self.pos += 1;
                    if self.consume_if(b'=') {
                        TokenKind::Gte
                    } else {
                        TokenKind::Gtr
                    }
                }
                b':' if self.bracket_depth > 0 => self.single(TokenKind::Colon),
                b'"' | b'\'' => self.string(ch)?,
                b'`' => self.raw_string()?,
                b'0'..=b'9' => self.number_or_duration()?,
                b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.number_or_duration()?
                }
                c if is_ident_start(c) => self.ident(),
                _ => {
                    let ch = self.input[start..].chars().next().unwrap_or('?');
                    return Err(ParseError::new(format!("unexpected character '{ch}'"), start));
                }
            };
            self.push(kind, start);
        }
    }

    fn push(&mut self, kind: TokenKind, offset: usize) {
        self.tokens.push(Token { kind, offset });
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn consume_if(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn single(&mut self, kind: TokenKind) -> TokenKind {
        self.pos += 1;
        kind
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_ascii_whitespace() {
                self.pos += 1;
            } else if ch == b'#' {
                while let Some(c) = self.peek() {
                    if c == b'\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn ident(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_continue) {
            // Colons inside brackets belong to the subquery syntax.
            if self.peek() == Some(b':') && self.bracket_depth > 0 {
                break;
            }
            self.pos += 1;
        }
        TokenKind::Ident(self.input[start..self.pos].to_string())
    }

    fn number_or_duration(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos;

        if self.peek() == Some(b'0') && matches!(self.peek_at(1), Some(b'x' | b'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits = &self.input[digits_start..self.pos];
            let value = u64::from_str_radix(digits, 16)
                .map_err(|_| ParseError::new("invalid hex literal", start))?;
            return Ok(TokenKind::Number(value as f64));
        }

        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }

        // An integer directly followed by a unit is a duration literal.
        let integer_only = self.pos > start;
        if integer_only && self.at_duration_unit() {
            self.pos = start;
            return self.duration();
        }

        if self.peek() == Some(b'.') {
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            } else {
                self.pos = mark;
            }
        }

        let text = &self.input[start..self.pos];
        let value: f64 = text
            .parse()
            .map_err(|_| ParseError::new(format!("invalid number '{text}'"), start))?;

        if self.peek().is_some_and(is_ident_start) {
            return Err(ParseError::new(
                format!("unexpected character after number '{text}'"),
                self.pos,
            ));
        }
        Ok(TokenKind::Number(value))
    }

    fn at_duration_unit(&self) -> bool {
        match self.peek() {
            Some(c) if DURATION_UNITS.contains(&c) => {
                // `5e3` is a number, and so is `5` followed by a word such as `s_total`.
                let next = self.peek_at(1);
                let unit_len = if c == b'm' && next == Some(b's') { 2 } else { 1 };
                let after = self.peek_at(unit_len);
                !after.is_some_and(|a| a.is_ascii_alphabetic() || a == b'_')
                    || after.is_some_and(|a| DURATION_UNITS.contains(&a))
            }
            _ => false,
        }
    }

    fn duration(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        loop {
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            if digits_start == self.pos {
                break;
            }
            let unit_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
                self.pos += 1;
            }
            if unit_start == self.pos {
                return Err(ParseError::new("duration is missing a unit", unit_start));
            }
        }
        Ok(TokenKind::Duration(self.input[start..self.pos].to_string()))
    }

    fn string(&mut self, quote: u8) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            let Some(ch) = self.input[self.pos..].chars().next() else {
                return Err(ParseError::new("unterminated string literal", start));
            };
            self.pos += ch.len_utf8();
            match ch {
                c if c as u32 == quote as u32 => return Ok(TokenKind::Str(out)),
                '\n' => return Err(ParseError::new("newline in string literal", start)),
                '\\' => out.push(self.escape(start)?),
                c => out.push(c),
            }
        }
    }

    fn escape(&mut self, literal_start: usize) -> Result<char, ParseError> {
        let Some(ch) = self.input[self.pos..].chars().next() else {
            return Err(ParseError::new("unterminated string literal", literal_start));
        };
        self.pos += ch.len_utf8();
        let decoded = match ch {
            'n' => '\n',
            't' => '\t',
            'r' => '\r',
            'a' => '\u{07}',
            'b' => '\u{08}',
            'f' => '\u{0C}',
            'v' => '\u{0B}',
            '\\' | '"' | '\'' | '`' => ch,
            'x' => self.hex_escape(2, literal_start)?,
            'u' => self.hex_escape(4, literal_start)?,
            'U' => self.hex_escape(8, literal_start)?,
            other => {
                return Err(ParseError::new(
                    format!("unknown escape sequence '\\{other}'"),
                    self.pos - other.len_utf8() - 1,
                ))
            }
        };
        Ok(decoded)
    }

    fn hex_escape(&mut self, len: usize, literal_start: usize) -> Result<char, ParseError> {
        let end = self.pos + len;
        let digits = self
            .input
            .get(self.pos..end)
            .ok_or_else(|| ParseError::new("truncated escape sequence", literal_start))?;
        let code = u32::from_str_radix(digits, 16)
            .map_err(|_| ParseError::new("invalid escape sequence", self.pos))?;
        let ch = char::from_u32(code)
            .ok_or_else(|| ParseError::new("escape is not a valid character", self.pos))?;
        self.pos = end;
        Ok(ch)
    }

    fn raw_string(&mut self) -> Result<TokenKind, ParseError> {
        let start = self.pos;
        self.pos += 1;
        match self.input[self.pos..].find('`') {
            Some(len) => {
                let text = self.input[self.pos..self.pos + len].to_string();
                self.pos += len + 1;
                Ok(TokenKind::Str(text))
            }
            None => Err(ParseError::new("unterminated raw string literal", start)),
        }
    }
}

pub(crate) fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b':'
}

pub(crate) fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_' || c == b':' || c == b'.'
}
