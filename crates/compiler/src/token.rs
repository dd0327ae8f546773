//! Token kinds and tokens
//!
//! The token set is closed: punctuation and operators, keywords, literals and
//! a handful of specials. The original design generated these tables with
//! X-macros; here the enum itself plus the `spelling`/`name` functions and the
//! `KEYWORDS` list are the single declarative table everything else derives
//! from (lexer classification, diagnostic formatting, precedence lookup).

use crate::intern::IdentifierInfo;
use crate::source::{SourceLocation, SourceRange};

/// Every kind of token the lexer can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Eof,
    Identifier,
    IntLiteral,
    FloatLiteral,
    StringLiteral,
    Comment,

    // Punctuation and operators.
    LParen,
    RParen,
    LBrace,
    RBrace,
    LSquare,
    RSquare,
    Comma,
    Colon,
    Semi,
    Dot,
    Arrow,
    Plus,
    PlusEqual,
    Minus,
    MinusEqual,
    Star,
    StarEqual,
    Slash,
    SlashEqual,
    Percent,
    PercentEqual,
    Caret,
    CaretEqual,
    Amp,
    AmpAmp,
    AmpEqual,
    Pipe,
    PipePipe,
    PipeEqual,
    Less,
    LessEqual,
    LessLess,
    LessLessEqual,
    Greater,
    GreaterEqual,
    GreaterGreater,
    GreaterGreaterEqual,
    Equal,
    EqualEqual,
    Exclaim,
    ExclaimEqual,

    // Keywords.
    KwAs,
    KwAssert,
    KwBool,
    KwBreak,
    KwChar,
    KwContinue,
    KwElse,
    KwExtern,
    KwF32,
    KwF64,
    KwFalse,
    KwFn,
    KwI8,
    KwI16,
    KwI32,
    KwI64,
    KwIf,
    KwLet,
    KwLoop,
    KwReturn,
    KwStruct,
    KwTrue,
    KwU8,
    KwU16,
    KwU32,
    KwU64,
    KwVoid,
    KwWhile,
}

/// The closed keyword list, iterated by
/// [`IdentifierTable::register_keywords`](crate::intern::IdentifierTable::register_keywords).
pub const KEYWORDS: &[(&str, TokenKind)] = &[
    ("as", TokenKind::KwAs),
    ("assert", TokenKind::KwAssert),
    ("bool", TokenKind::KwBool),
    ("break", TokenKind::KwBreak),
    ("char", TokenKind::KwChar),
    ("continue", TokenKind::KwContinue),
    ("else", TokenKind::KwElse),
    ("extern", TokenKind::KwExtern),
    ("f32", TokenKind::KwF32),
    ("f64", TokenKind::KwF64),
    ("false", TokenKind::KwFalse),
    ("fn", TokenKind::KwFn),
    ("i8", TokenKind::KwI8),
    ("i16", TokenKind::KwI16),
    ("i32", TokenKind::KwI32),
    ("i64", TokenKind::KwI64),
    ("if", TokenKind::KwIf),
    ("let", TokenKind::KwLet),
    ("loop", TokenKind::KwLoop),
    ("return", TokenKind::KwReturn),
    ("struct", TokenKind::KwStruct),
    ("true", TokenKind::KwTrue),
    ("u8", TokenKind::KwU8),
    ("u16", TokenKind::KwU16),
    ("u32", TokenKind::KwU32),
    ("u64", TokenKind::KwU64),
    ("void", TokenKind::KwVoid),
    ("while", TokenKind::KwWhile),
];

impl TokenKind {
    /// The fixed spelling of the token kind, when it has one. Literals,
    /// identifiers, comments and `EOF` have none.
    pub fn spelling(self) -> Option<&'static str> {
        use TokenKind::*;
        let s = match self {
            LParen => "(",
            RParen => ")",
            LBrace => "{",
            RBrace => "}",
            LSquare => "[",
            RSquare => "]",
            Comma => ",",
            Colon => ":",
            Semi => ";",
            Dot => ".",
            Arrow => "->",
            Plus => "+",
            PlusEqual => "+=",
            Minus => "-",
            MinusEqual => "-=",
            Star => "*",
            StarEqual => "*=",
            Slash => "/",
            SlashEqual => "/=",
            Percent => "%",
            PercentEqual => "%=",
            Caret => "^",
            CaretEqual => "^=",
            Amp => "&",
            AmpAmp => "&&",
            AmpEqual => "&=",
            Pipe => "|",
            PipePipe => "||",
            PipeEqual => "|=",
            Less => "<",
            LessEqual => "<=",
            LessLess => "<<",
            LessLessEqual => "<<=",
            Greater => ">",
            GreaterEqual => ">=",
            GreaterGreater => ">>",
            GreaterGreaterEqual => ">>=",
            Equal => "=",
            EqualEqual => "==",
            Exclaim => "!",
            ExclaimEqual => "!=",
            KwAs => "as",
            KwAssert => "assert",
            KwBool => "bool",
            KwBreak => "break",
            KwChar => "char",
            KwContinue => "continue",
            KwElse => "else",
            KwExtern => "extern",
            KwF32 => "f32",
            KwF64 => "f64",
            KwFalse => "false",
            KwFn => "fn",
            KwI8 => "i8",
            KwI16 => "i16",
            KwI32 => "i32",
            KwI64 => "i64",
            KwIf => "if",
            KwLet => "let",
            KwLoop => "loop",
            KwReturn => "return",
            KwStruct => "struct",
            KwTrue => "true",
            KwU8 => "u8",
            KwU16 => "u16",
            KwU32 => "u32",
            KwU64 => "u64",
            KwVoid => "void",
            KwWhile => "while",
            Eof | Identifier | IntLiteral | FloatLiteral | StringLiteral | Comment => return None,
        };
        Some(s)
    }

    /// A debug-suitable symbolic name, used by diagnostics for kinds without
    /// a fixed spelling.
    pub fn name(self) -> &'static str {
        use TokenKind::*;
        match self {
            Eof => "EOF",
            Identifier => "IDENTIFIER",
            IntLiteral => "INT_LITERAL",
            FloatLiteral => "FLOAT_LITERAL",
            StringLiteral => "STRING_LITERAL",
            Comment => "COMMENT",
            other => other.spelling().unwrap(),
        }
    }

    pub fn is_keyword(self) -> bool {
        matches!(
            self,
            TokenKind::KwAs
                | TokenKind::KwAssert
                | TokenKind::KwBool
                | TokenKind::KwBreak
                | TokenKind::KwChar
                | TokenKind::KwContinue
                | TokenKind::KwElse
                | TokenKind::KwExtern
                | TokenKind::KwF32
                | TokenKind::KwF64
                | TokenKind::KwFalse
                | TokenKind::KwFn
                | TokenKind::KwI8
                | TokenKind::KwI16
                | TokenKind::KwI32
                | TokenKind::KwI64
                | TokenKind::KwIf
                | TokenKind::KwLet
                | TokenKind::KwLoop
                | TokenKind::KwReturn
                | TokenKind::KwStruct
                | TokenKind::KwTrue
                | TokenKind::KwU8
                | TokenKind::KwU16
                | TokenKind::KwU32
                | TokenKind::KwU64
                | TokenKind::KwVoid
                | TokenKind::KwWhile
        )
    }

    pub fn is_punctuation(self) -> bool {
        self.spelling().is_some() && !self.is_keyword()
    }
}

/// Suffix attached to an integer literal, e.g. the `u64` in `42u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntSuffix {
    #[default]
    None,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
}

/// Suffix attached to a float literal, e.g. the `f32` in `1.5f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FloatSuffix {
    #[default]
    None,
    F32,
    F64,
}

/// Span and classification of a literal token. `begin`/`end` are byte offsets
/// into the source buffer and exclude any suffix. Comments reuse the span
/// fields for the comment text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LiteralData {
    pub begin: u32,
    pub end: u32,
    /// 2, 8, 10 or 16. Only meaningful for integer literals.
    pub radix: u8,
    pub int_suffix: IntSuffix,
    pub float_suffix: FloatSuffix,
}

/// Extra payload carried by some token kinds.
#[derive(Debug, Clone, Copy, Default)]
pub enum TokenData<'a> {
    #[default]
    None,
    /// For identifier and keyword tokens.
    Identifier(&'a IdentifierInfo<'a>),
    /// For literal and comment tokens.
    Literal(LiteralData),
}

#[derive(Debug, Clone, Copy)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Offset of the first byte of the token.
    pub location: SourceLocation,
    /// Number of bytes the token spans in the source.
    pub length: u32,
    pub data: TokenData<'a>,
}

impl<'a> Token<'a> {
    pub fn range(&self) -> SourceRange {
        SourceRange::new(self.location, self.location + self.length)
    }

    pub fn identifier(&self) -> Option<&'a IdentifierInfo<'a>> {
        match self.data {
            TokenData::Identifier(ident) => Some(ident),
            _ => None,
        }
    }

    pub fn literal(&self) -> Option<LiteralData> {
        match self.data {
            TokenData::Literal(lit) => Some(lit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spellings() {
        assert_eq!(TokenKind::LParen.spelling(), Some("("));
        assert_eq!(TokenKind::GreaterGreaterEqual.spelling(), Some(">>="));
        assert_eq!(TokenKind::KwWhile.spelling(), Some("while"));
        assert_eq!(TokenKind::Eof.spelling(), None);
        assert_eq!(TokenKind::Identifier.spelling(), None);
    }

    #[test]
    fn test_names() {
        assert_eq!(TokenKind::Eof.name(), "EOF");
        assert_eq!(TokenKind::Identifier.name(), "IDENTIFIER");
        assert_eq!(TokenKind::Plus.name(), "+");
    }

    #[test]
    fn test_keyword_classification() {
        for &(spelling, kind) in KEYWORDS {
            assert!(kind.is_keyword(), "{spelling} should be a keyword");
            assert_eq!(kind.spelling(), Some(spelling));
            assert!(!kind.is_punctuation());
        }
        assert!(!TokenKind::Identifier.is_keyword());
        assert!(TokenKind::Arrow.is_punctuation());
        assert!(!TokenKind::Eof.is_punctuation());
    }
}
