//! Lexer for StolasScript.
//!
//! Turns source text into a token stream. Statements are newline-terminated,
//! so `\n` is a token of its own; spaces, tabs and comments are skipped. The
//! scanner never fails: bytes it does not recognize become `ERROR` tokens
//! which the parser reports as syntax errors.

mod token;

pub use token::*;

use std::collections::HashMap;

use once_cell::sync::Lazy;
use unescape::unescape;

static KEYWORDS: Lazy<HashMap<&'static str, TokenKind>> = Lazy::new(|| {
    HashMap::from([
        ("if", TokenKind::If),
        ("else", TokenKind::Else),
        ("elif", TokenKind::Elif),
        ("while", TokenKind::While),
        ("for", TokenKind::For),
        ("loop", TokenKind::Loop),
        ("function", TokenKind::Function),
        ("match", TokenKind::Match),
        ("case", TokenKind::Case),
        ("default", TokenKind::Default),
        ("struct", TokenKind::Struct),
        ("class", TokenKind::Class),
        ("this", TokenKind::This),
        ("new", TokenKind::New),
        ("try", TokenKind::Try),
        ("catch", TokenKind::Catch),
        ("throw", TokenKind::Throw),
        ("end", TokenKind::End),
        ("return", TokenKind::Return),
        ("in", TokenKind::In),
        ("and", TokenKind::And),
        ("or", TokenKind::Or),
        ("not", TokenKind::Not),
        ("true", TokenKind::True),
        ("false", TokenKind::False),
        ("null", TokenKind::Null),
        ("break", TokenKind::Break),
        ("continue", TokenKind::Continue),
        ("from", TokenKind::From),
        ("to", TokenKind::To),
        ("step", TokenKind::Step),
        ("import", TokenKind::Import),
        ("at", TokenKind::At),
        ("import_native", TokenKind::ImportNative),
        ("c_function", TokenKind::CFunction),
        ("interrupt", TokenKind::Interrupt),
        // Word-form operators
        ("plus", TokenKind::Plus),
        ("minus", TokenKind::Minus),
        ("times", TokenKind::Times),
        ("modulo", TokenKind::Modulo),
        ("power", TokenKind::Power),
        ("equals", TokenKind::Equals),
    ])
});

pub struct Lexer<'a> {
    source: &'a str,
    position: usize,
    read_position: usize,
    ch: u8,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        let mut lexer = Self {
            source,
            position: 0,
            read_position: 0,
            ch: 0,
            line: 1,
            column: 0,
        };

        if !source.is_empty() {
            lexer.ch = source.as_bytes()[0];
            lexer.read_position = 1;
            lexer.column = 1;
        }

        lexer
    }

    fn read_char(&mut self) {
        self.ch = *self.source.as_bytes().get(self.read_position).unwrap_or(&0);
        self.position = self.read_position;
        self.read_position += 1;
        self.column += 1;
    }

    fn peek_char(&self) -> u8 {
        *self.source.as_bytes().get(self.read_position).unwrap_or(&0)
    }

    fn skip_whitespace(&mut self) {
        while self.ch == b' ' || self.ch == b'\t' || self.ch == b'\r' {
            self.read_char();
        }
    }

    fn skip_comment(&mut self) {
        if self.ch == b'/' && self.peek_char() == b'/' {
            while self.ch != b'\n' && self.ch != 0 {
                self.read_char();
            }
        } else if self.ch == b'/' && self.peek_char() == b'*' {
            self.read_char();
            self.read_char();
            while self.ch != 0 {
                if self.ch == b'*' && self.peek_char() == b'/' {
                    self.read_char();
                    self.read_char();
                    break;
                }
                if self.ch == b'\n' {
                    self.line += 1;
                    self.column = 0;
                }
                self.read_char();
            }
        }
    }

    /// Scan the next token. Returns `EOF` forever once the input is exhausted.
    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        while self.ch == b'/' && (self.peek_char() == b'/' || self.peek_char() == b'*') {
            self.skip_comment();
            self.skip_whitespace();
        }

        let col = self.column;

        match self.ch {
            b'\n' => {
                let tok = Token::new(TokenKind::Newline, "\n", self.line, col);
                self.line += 1;
                self.column = 0;
                self.read_char();
                tok
            }
            b'=' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    let tok = Token::new(TokenKind::Equals, "==", self.line, col);
                    self.read_char();
                    tok
                } else {
                    self.single_char_token(TokenKind::Assign)
                }
            }
            b'+' => self.single_char_token(TokenKind::Plus),
            b'-' => {
                if self.peek_char() == b'>' {
                    self.read_char();
                    let tok = Token::new(TokenKind::Arrow, "->", self.line, col);
                    self.read_char();
                    tok
                } else {
                    self.single_char_token(TokenKind::Minus)
                }
            }
            b'*' => {
                if self.peek_char() == b'*' {
                    self.read_char();
                    let tok = Token::new(TokenKind::Power, "**", self.line, col);
                    self.read_char();
                    tok
                } else {
                    self.single_char_token(TokenKind::Times)
                }
            }
            b'/' => self.single_char_token(TokenKind::DividedBy),
            b'%' => self.single_char_token(TokenKind::Modulo),
            b'<' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    let tok = Token::new(TokenKind::LessOrEquals, "<=", self.line, col);
                    self.read_char();
                    tok
                } else {
                    self.single_char_token(TokenKind::LessThan)
                }
            }
            b'>' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    let tok = Token::new(TokenKind::GreaterOrEquals, ">=", self.line, col);
                    self.read_char();
                    tok
                } else {
                    self.single_char_token(TokenKind::GreaterThan)
                }
            }
            b'!' => {
                if self.peek_char() == b'=' {
                    self.read_char();
                    let tok = Token::new(TokenKind::NotEquals, "!=", self.line, col);
                    self.read_char();
                    tok
                } else {
                    self.single_char_token(TokenKind::Error)
                }
            }
            b'(' => self.single_char_token(TokenKind::LParen),
            b')' => self.single_char_token(TokenKind::RParen),
            b'{' => self.single_char_token(TokenKind::LBrace),
            b'}' => self.single_char_token(TokenKind::RBrace),
            b'[' => self.single_char_token(TokenKind::LBracket),
            b']' => self.single_char_token(TokenKind::RBracket),
            b',' => self.single_char_token(TokenKind::Comma),
            b'.' => self.single_char_token(TokenKind::Dot),
            b':' => self.single_char_token(TokenKind::Colon),
            b'"' | b'\'' => self.read_string(self.ch),
            0 => Token::new(TokenKind::Eof, "", self.line, col),
            c if c.is_ascii_alphabetic() || c == b'_' => self.read_identifier(),
            c if c.is_ascii_digit() => self.read_number(),
            _ => self.single_char_token(TokenKind::Error),
        }
    }

    fn single_char_token(&mut self, kind: TokenKind) -> Token {
        let literal = (self.ch as char).to_string();
        let tok = Token::new(kind, literal, self.line, self.column);
        self.read_char();
        tok
    }

    fn read_identifier(&mut self) -> Token {
        let start = self.position;
        let col = self.column;

        while self.ch.is_ascii_alphanumeric() || self.ch == b'_' {
            self.read_char();
        }

        let word = &self.source[start..self.position];

        // `asm { ... }` carries its body verbatim in the token literal.
        if word == "asm" {
            let saved = self.save();
            self.skip_whitespace();
            if self.ch == b'{' {
                let code = self.read_raw_block();
                return Token::new(TokenKind::Asm, code, self.line, col);
            }
            self.restore(saved);
        }

        // Multi-word operators need bounded lookahead: "less than",
        // "greater or equals", "divided by", "not equals", ...
        if matches!(word, "less" | "greater" | "divided" | "not") {
            if let Some(tok) = self.try_multi_word(word, col) {
                return tok;
            }
        }

        let kind = *KEYWORDS.get(word).unwrap_or(&TokenKind::Identifier);
        Token::new(kind, word, self.line, col)
    }

    fn save(&self) -> (usize, usize, u8, usize) {
        (self.position, self.read_position, self.ch, self.column)
    }

    fn restore(&mut self, saved: (usize, usize, u8, usize)) {
        self.position = saved.0;
        self.read_position = saved.1;
        self.ch = saved.2;
        self.column = saved.3;
    }

    fn read_word(&mut self) -> String {
        let start = self.position;
        while self.ch.is_ascii_alphabetic() || self.ch == b'_' {
            self.read_char();
        }
        self.source[start..self.position].to_string()
    }

    fn try_multi_word(&mut self, first: &str, col: usize) -> Option<Token> {
        let saved = self.save();

        while self.ch == b' ' || self.ch == b'\t' {
            self.read_char();
        }
        let second = self.read_word();

        let two_words = match (first, second.as_str()) {
            ("less", "than") => Some((TokenKind::LessThan, "less than")),
            ("greater", "than") => Some((TokenKind::GreaterThan, "greater than")),
            ("divided", "by") => Some((TokenKind::DividedBy, "divided by")),
            ("not", "equals") => Some((TokenKind::NotEquals, "not equals")),
            _ => None,
        };
        if let Some((kind, literal)) = two_words {
            return Some(Token::new(kind, literal, self.line, col));
        }

        if (first == "less" || first == "greater") && second == "or" {
            let saved_after_or = self.save();
            while self.ch == b' ' || self.ch == b'\t' {
                self.read_char();
            }
            let third = self.read_word();
            if third == "equals" {
                return Some(if first == "less" {
                    Token::new(TokenKind::LessOrEquals, "less or equals", self.line, col)
                } else {
                    Token::new(
                        TokenKind::GreaterOrEquals,
                        "greater or equals",
                        self.line,
                        col,
                    )
                });
            }
            self.restore(saved_after_or);
        }

        // No match: rewind to just after the first word.
        self.restore(saved);
        None
    }

    fn read_number(&mut self) -> Token {
        let start = self.position;
        let col = self.column;

        // Decimal points do not force a float kind; `1.2.3` is accepted here
        // and the numeric typing is decided later.
        while self.ch.is_ascii_digit() || self.ch == b'.' {
            self.read_char();
        }

        Token::new(
            TokenKind::Number,
            &self.source[start..self.position],
            self.line,
            col,
        )
    }

    fn read_string(&mut self, quote: u8) -> Token {
        let start = self.position + 1;
        let col = self.column;
        let line = self.line;
        self.read_char();

        while self.ch != quote && self.ch != 0 {
            if self.ch == b'\n' {
                self.line += 1;
                self.column = 0;
            }
            self.read_char();
        }

        let raw = &self.source[start..self.position];
        let literal = unescape(raw).unwrap_or_else(|| raw.to_string());

        if self.ch == quote {
            self.read_char();
        }

        Token::new(TokenKind::String, literal, line, col)
    }

    /// Capture the raw body of an `asm { ... }` block, brace-balanced, with
    /// the outer braces stripped. The cursor must sit on the opening `{`.
    fn read_raw_block(&mut self) -> String {
        self.read_char(); // consume '{'
        let start = self.position;
        let mut depth = 1usize;

        while self.ch != 0 {
            match self.ch {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                b'\n' => {
                    self.line += 1;
                    self.column = 0;
                }
                _ => {}
            }
            self.read_char();
        }

        let code = self.source[start..self.position].to_string();
        if self.ch == b'}' {
            self.read_char();
        }
        code
    }
}
