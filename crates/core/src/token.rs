//! Token and source-location types shared by the lexer and parser.

use std::fmt;

/// Position of a token or AST node in the input file, 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Loc {
    /// Line number, starting at 1.
    pub line: usize,
    /// Column number in bytes, starting at 1.
    pub col: usize,
}

impl Loc {
    /// Builds a location from a line and column pair.
    pub fn new(line: usize, col: usize) -> Self {
        Loc { line, col }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Lexical token kinds for the supported C subset.
///
/// Literal payloads are stored fully decoded: escape sequences in character
/// and string literals are resolved to bytes by the lexer, so later stages
/// never see a backslash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or typedef name.
    Ident(String),
    /// Integer literal (decimal or `0x` hex).
    Int(i64),
    /// Character literal, decoded to its byte value.
    Char(u8),
    /// String literal, decoded, without the trailing NUL.
    Str(Vec<u8>),
    /// `#include` line; payload keeps the delimiters, e.g. `<stdio.h>`.
    HashInclude(String),

    /// `void`
    KwVoid,
    /// `int`
    KwInt,
    /// `char`
    KwChar,
    /// `unsigned`
    KwUnsigned,
    /// `const`
    KwConst,
    /// `static`
    KwStatic,
    /// `struct`
    KwStruct,
    /// `enum`
    KwEnum,
    /// `typedef`
    KwTypedef,
    /// `if`
    KwIf,
    /// `else`
    KwElse,
    /// `while`
    KwWhile,
    /// `do`
    KwDo,
    /// `for`
    KwFor,
    /// `switch`
    KwSwitch,
    /// `case`
    KwCase,
    /// `default`
    KwDefault,
    /// `break`
    KwBreak,
    /// `continue`
    KwContinue,
    /// `return`
    KwReturn,
    /// `sizeof`
    KwSizeof,

    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `;`
    Semi,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `?`
    Question,
    /// `...`
    Ellipsis,
    /// `.`
    Dot,
    /// `->`
    Arrow,

    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `++`
    PlusPlus,
    /// `--`
    MinusMinus,
    /// `&`
    Amp,
    /// `|`
    Pipe,
    /// `^`
    Caret,
    /// `~`
    Tilde,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `!`
    Bang,
    /// `&&`
    AmpAmp,
    /// `||`
    PipePipe,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    EqEq,
    /// `!=`
    Ne,
    /// `=`
    Eq,
    /// `+=`
    PlusEq,
    /// `-=`
    MinusEq,
    /// `*=`
    StarEq,
    /// `/=`
    SlashEq,
    /// `%=`
    PercentEq,

    /// End of input.
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Ident(name) => return write!(f, "identifier `{name}`"),
            TokenKind::Int(v) => return write!(f, "integer literal `{v}`"),
            TokenKind::Char(_) => "character literal",
            TokenKind::Str(_) => "string literal",
            TokenKind::HashInclude(_) => "`#include`",
            TokenKind::KwVoid => "`void`",
            TokenKind::KwInt => "`int`",
            TokenKind::KwChar => "`char`",
            TokenKind::KwUnsigned => "`unsigned`",
            TokenKind::KwConst => "`const`",
            TokenKind::KwStatic => "`static`",
            TokenKind::KwStruct => "`struct`",
            TokenKind::KwEnum => "`enum`",
            TokenKind::KwTypedef => "`typedef`",
            TokenKind::KwIf => "`if`",
            TokenKind::KwElse => "`else`",
            TokenKind::KwWhile => "`while`",
            TokenKind::KwDo => "`do`",
            TokenKind::KwFor => "`for`",
            TokenKind::KwSwitch => "`switch`",
            TokenKind::KwCase => "`case`",
            TokenKind::KwDefault => "`default`",
            TokenKind::KwBreak => "`break`",
            TokenKind::KwContinue => "`continue`",
            TokenKind::KwReturn => "`return`",
            TokenKind::KwSizeof => "`sizeof`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::Semi => "`;`",
            TokenKind::Comma => "`,`",
            TokenKind::Colon => "`:`",
            TokenKind::Question => "`?`",
            TokenKind::Ellipsis => "`...`",
            TokenKind::Dot => "`.`",
            TokenKind::Arrow => "`->`",
            TokenKind::Plus => "`+`",
            TokenKind::Minus => "`-`",
            TokenKind::Star => "`*`",
            TokenKind::Slash => "`/`",
            TokenKind::Percent => "`%`",
            TokenKind::PlusPlus => "`++`",
            TokenKind::MinusMinus => "`--`",
            TokenKind::Amp => "`&`",
            TokenKind::Pipe => "`|`",
            TokenKind::Caret => "`^`",
            TokenKind::Tilde => "`~`",
            TokenKind::Shl => "`<<`",
            TokenKind::Shr => "`>>`",
            TokenKind::Bang => "`!`",
            TokenKind::AmpAmp => "`&&`",
            TokenKind::PipePipe => "`||`",
            TokenKind::Lt => "`<`",
            TokenKind::Le => "`<=`",
            TokenKind::Gt => "`>`",
            TokenKind::Ge => "`>=`",
            TokenKind::EqEq => "`==`",
            TokenKind::Ne => "`!=`",
            TokenKind::Eq => "`=`",
            TokenKind::PlusEq => "`+=`",
            TokenKind::MinusEq => "`-=`",
            TokenKind::StarEq => "`*=`",
            TokenKind::SlashEq => "`/=`",
            TokenKind::PercentEq => "`%=`",
            TokenKind::Eof => "end of input",
        };
        f.write_str(s)
    }
}

/// A lexed token with its source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// What was lexed.
    pub kind: TokenKind,
    /// Where the token starts.
    pub loc: Loc,
}

impl Token {
    /// Builds a token at the given position.
    pub fn new(kind: TokenKind, loc: Loc) -> Self {
        Token { kind, loc }
    }
}
