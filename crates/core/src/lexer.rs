//! Byte-level lexer for the supported C subset.
//!
//! Produces a flat token vector for the parser. Comments are skipped,
//! `#include` lines become [`TokenKind::HashInclude`] tokens so the emitter
//! can reproduce them, and any other preprocessor directive is rejected up
//! front. Escape sequences in character and string literals are decoded here.

use umbra_utils::errors::ParseError;

use crate::token::{Loc, Token, TokenKind};

/// C keywords that are recognized but lie outside the supported subset.
/// Rejecting them at lex time gives a precise diagnostic instead of a
/// confusing "undeclared identifier" later.
const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "auto", "double", "extern", "float", "goto", "long", "register", "short", "signed", "union",
    "volatile",
];

/// Lexes `source` into tokens, ending with a single [`TokenKind::Eof`].
///
/// # Arguments
/// * `source` - the full text of one translation unit
/// * `file` - file name used in diagnostics
///
/// # Returns
/// The token vector, or the first [`ParseError`] encountered.
pub fn lex(source: &str, file: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer::new(source, file);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            tracing::debug!(file, count = tokens.len(), "lexed translation unit");
            return Ok(tokens);
        }
    }
}

struct Lexer<'a> {
    src: &'a [u8],
    file: &'a str,
    pos: usize,
    line: usize,
    col: usize,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, file: &'a str) -> Self {
        Lexer {
            src: source.as_bytes(),
            file,
            pos: 0,
            line: 1,
            col: 1,
        }
    }

    fn loc(&self) -> Loc {
        Loc::new(self.line, self.col)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(byte)
    }

    /// Consumes `byte` if it is next; returns whether it did.
    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn invalid(&self, loc: Loc, msg: impl Into<String>) -> ParseError {
        ParseError::InvalidToken {
            file: self.file.to_string(),
            line: loc.line,
            col: loc.col,
            msg: msg.into(),
        }
    }

    fn unsupported(&self, loc: Loc, construct: impl Into<String>) -> ParseError {
        ParseError::Unsupported {
            file: self.file.to_string(),
            line: loc.line,
            col: loc.col,
            construct: construct.into(),
        }
    }

    /// Skips whitespace and both comment forms. Errors on an unterminated
    /// block comment.
    fn skip_trivia(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') => {
                    self.bump();
                }
                Some(b'/') if self.peek_at(1) == Some(b'/') => {
                    while let Some(byte) = self.peek() {
                        if byte == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let start = self.loc();
                    self.bump();
                    self.bump();
                    loop {
                        match self.peek() {
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.bump();
                                self.bump();
                                break;
                            }
                            Some(_) => {
                                self.bump();
                            }
                            None => return Err(self.invalid(start, "unterminated block comment")),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_trivia()?;
        let loc = self.loc();
        let Some(byte) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, loc));
        };

        if byte == b'#' {
            return self.lex_directive(loc);
        }
        if byte.is_ascii_alphabetic() || byte == b'_' {
            return self.lex_word(loc);
        }
        if byte.is_ascii_digit() {
            return self.lex_number(loc);
        }
        if byte == b'\'' {
            return self.lex_char(loc);
        }
        if byte == b'"' {
            return self.lex_string(loc);
        }
        self.lex_operator(loc)
    }

    fn lex_word(&mut self, loc: Loc) -> Result<Token, ParseError> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if byte.is_ascii_alphanumeric() || byte == b'_' {
                self.bump();
            } else {
                break;
            }
        }
        let word = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        let kind = match word {
            "void" => TokenKind::KwVoid,
            "int" => TokenKind::KwInt,
            "char" => TokenKind::KwChar,
            "unsigned" => TokenKind::KwUnsigned,
            "const" => TokenKind::KwConst,
            "static" => TokenKind::KwStatic,
            "struct" => TokenKind::KwStruct,
            "enum" => TokenKind::KwEnum,
            "typedef" => TokenKind::KwTypedef,
            "if" => TokenKind::KwIf,
            "else" => TokenKind::KwElse,
            "while" => TokenKind::KwWhile,
            "do" => TokenKind::KwDo,
            "for" => TokenKind::KwFor,
            "switch" => TokenKind::KwSwitch,
            "case" => TokenKind::KwCase,
            "default" => TokenKind::KwDefault,
            "break" => TokenKind::KwBreak,
            "continue" => TokenKind::KwContinue,
            "return" => TokenKind::KwReturn,
            "sizeof" => TokenKind::KwSizeof,
            _ if UNSUPPORTED_KEYWORDS.contains(&word) => {
                return Err(self.unsupported(loc, format!("`{word}`")));
            }
            _ => TokenKind::Ident(word.to_string()),
        };
        Ok(Token::new(kind, loc))
    }

    fn lex_number(&mut self, loc: Loc) -> Result<Token, ParseError> {
        let start = self.pos;
        let hex = self.peek() == Some(b'0')
            && matches!(self.peek_at(1), Some(b'x') | Some(b'X'))
            && self.peek_at(2).is_some_and(|b| b.is_ascii_hexdigit());
        if hex {
            self.bump();
            self.bump();
            while self.peek().is_some_and(|b| b.is_ascii_hexdigit()) {
                self.bump();
            }
        } else {
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.bump();
            }
        }
        // Suffixed literals (42u, 10L) and floats are outside the subset.
        if let Some(next) = self.peek() {
            if next.is_ascii_alphabetic() || next == b'_' || next == b'.' {
                return Err(self.invalid(loc, "malformed integer literal"));
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        let value = if hex {
            i64::from_str_radix(&text[2..], 16)
        } else {
            text.parse::<i64>()
        };
        match value {
            Ok(v) => Ok(Token::new(TokenKind::Int(v), loc)),
            Err(_) => Err(self.invalid(loc, format!("integer literal `{text}` out of range"))),
        }
    }

    /// Decodes one escape sequence; the leading backslash is already consumed.
    fn lex_escape(&mut self, loc: Loc) -> Result<u8, ParseError> {
        let Some(byte) = self.bump() else {
            return Err(self.invalid(loc, "unterminated escape sequence"));
        };
        let value = match byte {
            b'n' => b'\n',
            b't' => b'\t',
            b'r' => b'\r',
            b'a' => 0x07,
            b'b' => 0x08,
            b'f' => 0x0c,
            b'v' => 0x0b,
            b'\\' => b'\\',
            b'\'' => b'\'',
            b'"' => b'"',
            b'?' => b'?',
            b'x' => {
                let mut value: u32 = 0;
                let mut digits = 0;
                while digits < 2 {
                    match self.peek() {
                        Some(d) if d.is_ascii_hexdigit() => {
                            self.bump();
                            value = value * 16 + (d as char).to_digit(16).unwrap_or(0);
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                if digits == 0 {
                    return Err(self.invalid(loc, "`\\x` escape with no hex digits"));
                }
                value as u8
            }
            b'0'..=b'7' => {
                // Octal escapes run to at most three digits.
                let mut value: u32 = u32::from(byte - b'0');
                let mut digits = 1;
                while digits < 3 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            self.bump();
                            value = value * 8 + u32::from(d - b'0');
                            digits += 1;
                        }
                        _ => break,
                    }
                }
                if value > 0xff {
                    return Err(self.invalid(loc, "octal escape out of range"));
                }
                value as u8
            }
            other => {
                return Err(self.invalid(loc, format!("unknown escape `\\{}`", other as char)));
            }
        };
        Ok(value)
    }

    fn lex_char(&mut self, loc: Loc) -> Result<Token, ParseError> {
        self.bump();
        let value = match self.bump() {
            Some(b'\\') => self.lex_escape(loc)?,
            Some(b'\'') => return Err(self.invalid(loc, "empty character literal")),
            Some(b'\n') | None => return Err(self.invalid(loc, "unterminated character literal")),
            Some(byte) => byte,
        };
        if !self.eat(b'\'') {
            return Err(self.invalid(loc, "character literal with more than one byte"));
        }
        Ok(Token::new(TokenKind::Char(value), loc))
    }

    fn lex_string(&mut self, loc: Loc) -> Result<Token, ParseError> {
        self.bump();
        let mut bytes = Vec::new();
        loop {
            match self.bump() {
                Some(b'"') => break,
                Some(b'\\') => bytes.push(self.lex_escape(loc)?),
                Some(b'\n') | None => return Err(self.invalid(loc, "unterminated string literal")),
                Some(byte) => bytes.push(byte),
            }
        }
        Ok(Token::new(TokenKind::Str(bytes), loc))
    }

    /// Lexes a preprocessor line. Only `#include` survives to the parser;
    /// anything else is outside the subset.
    fn lex_directive(&mut self, loc: Loc) -> Result<Token, ParseError> {
        self.bump();
        while self.peek() == Some(b' ') || self.peek() == Some(b'\t') {
            self.bump();
        }
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_alphabetic()) {
            self.bump();
        }
        let word = std::str::from_utf8(&self.src[start..self.pos]).unwrap_or_default();
        if word != "include" {
            return Err(self.unsupported(loc, format!("preprocessor directive `#{word}`")));
        }
        while self.peek() == Some(b' ') || self.peek() == Some(b'\t') {
            self.bump();
        }
        let (open, close) = match self.peek() {
            Some(b'<') => (b'<', b'>'),
            Some(b'"') => (b'"', b'"'),
            _ => return Err(self.invalid(loc, "expected `<path>` or `\"path\"` after `#include`")),
        };
        self.bump();
        let mut target = String::new();
        target.push(open as char);
        loop {
            match self.bump() {
                Some(byte) if byte == close => {
                    target.push(close as char);
                    break;
                }
                Some(b'\n') | None => {
                    return Err(self.invalid(loc, "unterminated `#include` path"));
                }
                Some(byte) => target.push(byte as char),
            }
        }
        Ok(Token::new(TokenKind::HashInclude(target), loc))
    }

    fn lex_operator(&mut self, loc: Loc) -> Result<Token, ParseError> {
        let byte = self.bump().unwrap_or(0);
        let kind = match byte {
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'[' => TokenKind::LBracket,
            b']' => TokenKind::RBracket,
            b';' => TokenKind::Semi,
            b',' => TokenKind::Comma,
            b':' => TokenKind::Colon,
            b'?' => TokenKind::Question,
            b'~' => TokenKind::Tilde,
            b'.' => {
                if self.peek() == Some(b'.') && self.peek_at(1) == Some(b'.') {
                    self.bump();
                    self.bump();
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            b'+' => {
                if self.eat(b'+') {
                    TokenKind::PlusPlus
                } else if self.eat(b'=') {
                    TokenKind::PlusEq
                } else {
                    TokenKind::Plus
                }
            }
            b'-' => {
                if self.eat(b'-') {
                    TokenKind::MinusMinus
                } else if self.eat(b'=') {
                    TokenKind::MinusEq
                } else if self.eat(b'>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            b'*' => {
                if self.eat(b'=') {
                    TokenKind::StarEq
                } else {
                    TokenKind::Star
                }
            }
            b'/' => {
                if self.eat(b'=') {
                    TokenKind::SlashEq
                } else {
                    TokenKind::Slash
                }
            }
            b'%' => {
                if self.eat(b'=') {
                    TokenKind::PercentEq
                } else {
                    TokenKind::Percent
                }
            }
            b'&' => {
                if self.eat(b'&') {
                    TokenKind::AmpAmp
                } else {
                    TokenKind::Amp
                }
            }
            b'|' => {
                if self.eat(b'|') {
                    TokenKind::PipePipe
                } else {
                    TokenKind::Pipe
                }
            }
            b'^' => TokenKind::Caret,
            b'!' => {
                if self.eat(b'=') {
                    TokenKind::Ne
                } else {
                    TokenKind::Bang
                }
            }
            b'<' => {
                if self.eat(b'=') {
                    TokenKind::Le
                } else if self.eat(b'<') {
                    TokenKind::Shl
                } else {
                    TokenKind::Lt
                }
            }
            b'>' => {
                if self.eat(b'=') {
                    TokenKind::Ge
                } else if self.eat(b'>') {
                    TokenKind::Shr
                } else {
                    TokenKind::Gt
                }
            }
            b'=' => {
                if self.eat(b'=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }
            other => {
                return Err(self.invalid(
                    loc,
                    format!("unexpected character `{}` (0x{other:02x})", other as char),
                ));
            }
        };
        Ok(Token::new(kind, loc))
    }
}
