//! The lexical analyzer
//!
//! Converts the source byte stream into [`Token`]s. Identifier spellings are
//! interned through the identifier table, which also classifies keywords.
//! Newlines are recorded into the source file's line map as they are
//! consumed, whatever mode the lexer is in. After the last content token the
//! lexer keeps returning `EOF` without moving its cursor.

use std::rc::Rc;

use crate::diag::{DiagEngine, DiagKind};
use crate::intern::IdentifierTable;
use crate::source::SourceFile;
use crate::token::{FloatSuffix, IntSuffix, LiteralData, Token, TokenData, TokenKind};

pub struct Lexer<'a, 'd> {
    file: Rc<SourceFile>,
    idents: &'a IdentifierTable<'a>,
    diag: &'d DiagEngine,
    cursor: usize,
    /// Start of the token currently being scanned.
    marked: usize,
    /// When set, comments come out as tokens instead of disappearing.
    pub keep_comments: bool,
}

impl<'a, 'd> Lexer<'a, 'd> {
    pub fn new(file: Rc<SourceFile>, idents: &'a IdentifierTable<'a>, diag: &'d DiagEngine) -> Self {
        Lexer {
            file,
            idents,
            diag,
            cursor: 0,
            marked: 0,
            keep_comments: false,
        }
    }

    pub fn source_file(&self) -> &Rc<SourceFile> {
        &self.file
    }

    fn bytes(&self) -> &[u8] {
        self.file.buffer().as_bytes()
    }

    fn peek(&self) -> Option<u8> {
        self.bytes().get(self.cursor).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes().get(self.cursor + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.cursor += 1;
        Some(b)
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// Records a newline whose final byte has just been consumed.
    fn register_new_line(&self) {
        self.file.add_line(self.cursor as u32);
    }

    fn token(&self, kind: TokenKind) -> Token<'a> {
        Token {
            kind,
            location: self.marked as u32,
            length: (self.cursor - self.marked) as u32,
            data: TokenData::None,
        }
    }

    fn eof_token(&self) -> Token<'a> {
        Token {
            kind: TokenKind::Eof,
            location: self.cursor as u32,
            length: 0,
            data: TokenData::None,
        }
    }

    /// Produces the next token.
    pub fn next(&mut self) -> Token<'a> {
        loop {
            self.marked = self.cursor;

            let Some(byte) = self.bump() else {
                return self.eof_token();
            };

            match byte {
                b' ' | b'\t' | b'\x0b' | b'\x0c' => continue,
                b'\n' => {
                    self.register_new_line();
                    continue;
                }
                b'\r' => {
                    self.eat(b'\n');
                    self.register_new_line();
                    continue;
                }

                b'(' => return self.token(TokenKind::LParen),
                b')' => return self.token(TokenKind::RParen),
                b'{' => return self.token(TokenKind::LBrace),
                b'}' => return self.token(TokenKind::RBrace),
                b'[' => return self.token(TokenKind::LSquare),
                b']' => return self.token(TokenKind::RSquare),
                b',' => return self.token(TokenKind::Comma),
                b':' => return self.token(TokenKind::Colon),
                b';' => return self.token(TokenKind::Semi),
                b'.' => return self.token(TokenKind::Dot),

                b'+' => {
                    let kind = if self.eat(b'=') {
                        TokenKind::PlusEqual
                    } else {
                        TokenKind::Plus
                    };
                    return self.token(kind);
                }
                b'-' => {
                    let kind = if self.eat(b'=') {
                        TokenKind::MinusEqual
                    } else if self.eat(b'>') {
                        TokenKind::Arrow
                    } else {
                        TokenKind::Minus
                    };
                    return self.token(kind);
                }
                b'*' => {
                    let kind = if self.eat(b'=') {
                        TokenKind::StarEqual
                    } else {
                        TokenKind::Star
                    };
                    return self.token(kind);
                }
                b'%' => {
                    let kind = if self.eat(b'=') {
                        TokenKind::PercentEqual
                    } else {
                        TokenKind::Percent
                    };
                    return self.token(kind);
                }
                b'^' => {
                    let kind = if self.eat(b'=') {
                        TokenKind::CaretEqual
                    } else {
                        TokenKind::Caret
                    };
                    return self.token(kind);
                }
                b'=' => {
                    let kind = if self.eat(b'=') {
                        TokenKind::EqualEqual
                    } else {
                        TokenKind::Equal
                    };
                    return self.token(kind);
                }
                b'!' => {
                    let kind = if self.eat(b'=') {
                        TokenKind::ExclaimEqual
                    } else {
                        TokenKind::Exclaim
                    };
                    return self.token(kind);
                }
                b'&' => {
                    let kind = if self.eat(b'&') {
                        TokenKind::AmpAmp
                    } else if self.eat(b'=') {
                        TokenKind::AmpEqual
                    } else {
                        TokenKind::Amp
                    };
                    return self.token(kind);
                }
                b'|' => {
                    let kind = if self.eat(b'|') {
                        TokenKind::PipePipe
                    } else if self.eat(b'=') {
                        TokenKind::PipeEqual
                    } else {
                        TokenKind::Pipe
                    };
                    return self.token(kind);
                }
                b'<' => {
                    let kind = if self.eat(b'<') {
                        if self.eat(b'=') {
                            TokenKind::LessLessEqual
                        } else {
                            TokenKind::LessLess
                        }
                    } else if self.eat(b'=') {
                        TokenKind::LessEqual
                    } else {
                        TokenKind::Less
                    };
                    return self.token(kind);
                }
                b'>' => {
                    let kind = if self.eat(b'>') {
                        if self.eat(b'=') {
                            TokenKind::GreaterGreaterEqual
                        } else {
                            TokenKind::GreaterGreater
                        }
                    } else if self.eat(b'=') {
                        TokenKind::GreaterEqual
                    } else {
                        TokenKind::Greater
                    };
                    return self.token(kind);
                }

                b'/' => {
                    if self.eat(b'/') {
                        // Line comment, up to but not including the newline.
                        while let Some(b) = self.peek() {
                            if b == b'\n' || b == b'\r' {
                                break;
                            }
                            self.cursor += 1;
                        }
                        if !self.keep_comments {
                            continue;
                        }
                        return self.comment_token();
                    }
                    if self.eat(b'*') {
                        match self.scan_block_comment() {
                            Some(token) => return token,
                            None => continue,
                        }
                    }
                    let kind = if self.eat(b'=') {
                        TokenKind::SlashEqual
                    } else {
                        TokenKind::Slash
                    };
                    return self.token(kind);
                }

                b'"' => return self.scan_string(),

                b'r' if self.peek() == Some(b'#')
                    && self.peek_at(1).is_some_and(is_ident_start) =>
                {
                    return self.scan_raw_identifier();
                }

                b'0'..=b'9' => return self.scan_number(byte),

                b if is_ident_start(b) => return self.scan_identifier(),

                other => {
                    self.diag
                        .diag_at(DiagKind::ErrUnknownCharacter, self.marked as u32)
                        .arg_char(other as char)
                        .flush();
                    continue;
                }
            }
        }
    }

    fn comment_token(&self) -> Token<'a> {
        let mut token = self.token(TokenKind::Comment);
        token.data = TokenData::Literal(LiteralData {
            begin: self.marked as u32,
            end: self.cursor as u32,
            ..LiteralData::default()
        });
        token
    }

    /// Scans the rest of a `/* … */` comment; the opener has been consumed.
    /// Returns a token only in keep-comments mode; `None` means "skip and
    /// continue lexing". An unterminated comment is diagnosed and turned
    /// into EOF.
    fn scan_block_comment(&mut self) -> Option<Token<'a>> {
        loop {
            match self.bump() {
                None => {
                    self.diag
                        .diag_at(DiagKind::ErrUnterminatedBlockComment, self.marked as u32)
                        .caret_range(self.marked as u32)
                        .flush();
                    return Some(self.eof_token());
                }
                Some(b'\n') => self.register_new_line(),
                Some(b'\r') => {
                    self.eat(b'\n');
                    self.register_new_line();
                }
                Some(b'*') if self.peek() == Some(b'/') => {
                    self.cursor += 1;
                    if !self.keep_comments {
                        return None;
                    }
                    return Some(self.comment_token());
                }
                Some(_) => {}
            }
        }
    }

    fn scan_string(&mut self) -> Token<'a> {
        loop {
            match self.bump() {
                None => {
                    self.diag
                        .diag_at(DiagKind::ErrUnterminatedString, self.marked as u32)
                        .caret_range(self.marked as u32)
                        .flush();
                    break;
                }
                Some(b'"') => break,
                Some(b'\\') => {
                    // Keep escaped quotes from terminating the literal; the
                    // decoder deals with the escape itself.
                    self.bump();
                }
                Some(b'\n') => self.register_new_line(),
                Some(b'\r') => {
                    self.eat(b'\n');
                    self.register_new_line();
                }
                Some(_) => {}
            }
        }

        let mut token = self.token(TokenKind::StringLiteral);
        token.data = TokenData::Literal(LiteralData {
            begin: self.marked as u32,
            end: self.cursor as u32,
            ..LiteralData::default()
        });
        token
    }

    fn scan_identifier(&mut self) -> Token<'a> {
        while self.peek().is_some_and(is_ident_continue) {
            self.cursor += 1;
        }

        let spelling = &self.file.buffer()[self.marked..self.cursor];
        let ident = self.idents.lookup(spelling);
        let mut token = self.token(ident.token_kind());
        token.data = TokenData::Identifier(ident);
        token
    }

    /// `r#name` interns the same record as `name` but is always a plain
    /// identifier, never a keyword.
    fn scan_raw_identifier(&mut self) -> Token<'a> {
        self.cursor += 1; // '#'
        while self.peek().is_some_and(is_ident_continue) {
            self.cursor += 1;
        }

        let spelling = &self.file.buffer()[self.marked + 2..self.cursor];
        let ident = self.idents.lookup(spelling);
        let mut token = self.token(TokenKind::Identifier);
        token.data = TokenData::Identifier(ident);
        token
    }

    fn scan_number(&mut self, first: u8) -> Token<'a> {
        if first == b'0' {
            if self.peek() == Some(b'b') || self.peek() == Some(b'B') {
                if let Some(token) = self.try_scan_prefixed_int(2) {
                    return token;
                }
            } else if self.peek() == Some(b'o') || self.peek() == Some(b'O') {
                if let Some(token) = self.try_scan_prefixed_int(8) {
                    return token;
                }
            } else if self.peek() == Some(b'x') || self.peek() == Some(b'X') {
                if let Some(token) = self.try_scan_prefixed_int(16) {
                    return token;
                }
            }
        }

        // Decimal digits (possibly the integer part of a float).
        while self.peek().is_some_and(|b| b.is_ascii_digit() || b == b'_') {
            self.cursor += 1;
        }

        let mut is_float = false;

        // A fractional part only counts when a digit follows the dot;
        // otherwise `1.` is the integer `1` followed by a `.` token.
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            is_float = true;
            self.cursor += 1;
            while self.peek().is_some_and(|b| b.is_ascii_digit() || b == b'_') {
                self.cursor += 1;
            }
        }

        // Exponent: `e`/`E`, optional sign, separators allowed before the
        // first digit, at least one digit required.
        if self.peek() == Some(b'e') || self.peek() == Some(b'E') {
            let mut probe = self.cursor + 1;
            let bytes = self.bytes();
            if probe < bytes.len() && (bytes[probe] == b'+' || bytes[probe] == b'-') {
                probe += 1;
            }
            while probe < bytes.len() && bytes[probe] == b'_' {
                probe += 1;
            }
            if probe < bytes.len() && bytes[probe].is_ascii_digit() {
                is_float = true;
                probe += 1;
                while probe < bytes.len() && (bytes[probe].is_ascii_digit() || bytes[probe] == b'_')
                {
                    probe += 1;
                }
                self.cursor = probe;
            }
        }

        if is_float {
            return self.finish_float();
        }

        // `1f32` is a float literal with a suffix.
        if self.peek() == Some(b'f') && self.float_suffix_ahead() {
            return self.finish_float();
        }

        self.finish_int(10, self.marked)
    }

    /// Scans `0b…`, `0o…` or `0x…`. The cursor sits on the radix letter.
    /// Returns `None` (cursor restored) when no digit follows the prefix, in
    /// which case the `0` alone is a decimal literal.
    fn try_scan_prefixed_int(&mut self, radix: u8) -> Option<Token<'a>> {
        let is_digit = |b: u8| match radix {
            2 => b == b'0' || b == b'1',
            8 => (b'0'..=b'7').contains(&b),
            _ => b.is_ascii_hexdigit(),
        };

        let save = self.cursor;
        self.cursor += 1; // radix letter
        while self.peek() == Some(b'_') {
            self.cursor += 1;
        }
        if !self.peek().is_some_and(is_digit) {
            self.cursor = save;
            return None;
        }

        while self.peek().is_some_and(|b| is_digit(b) || b == b'_') {
            self.cursor += 1;
        }
        Some(self.finish_int(radix, self.marked))
    }

    /// True when the bytes at the cursor spell `f32` or `f64`.
    fn float_suffix_ahead(&self) -> bool {
        let rest = &self.bytes()[self.cursor..];
        rest.starts_with(b"f32") || rest.starts_with(b"f64")
    }

    /// Consumes an optional integer suffix and builds the token. The literal
    /// span excludes the suffix.
    fn finish_int(&mut self, radix: u8, begin: usize) -> Token<'a> {
        const SUFFIXES: &[(&[u8], IntSuffix)] = &[
            (b"i8", IntSuffix::I8),
            (b"i16", IntSuffix::I16),
            (b"i32", IntSuffix::I32),
            (b"i64", IntSuffix::I64),
            (b"u8", IntSuffix::U8),
            (b"u16", IntSuffix::U16),
            (b"u32", IntSuffix::U32),
            (b"u64", IntSuffix::U64),
        ];

        let (suffix, suffix_len) = {
            let rest = &self.bytes()[self.cursor..];
            SUFFIXES
                .iter()
                .find(|(text, _)| rest.starts_with(text))
                .map_or((IntSuffix::None, 0), |&(text, sfx)| (sfx, text.len()))
        };

        let end = self.cursor;
        self.cursor += suffix_len;

        let mut token = self.token(TokenKind::IntLiteral);
        token.data = TokenData::Literal(LiteralData {
            begin: begin as u32,
            end: end as u32,
            radix,
            int_suffix: suffix,
            ..LiteralData::default()
        });
        token
    }

    /// Consumes an optional `f32`/`f64` suffix and builds the float token.
    fn finish_float(&mut self) -> Token<'a> {
        let suffix = {
            let rest = &self.bytes()[self.cursor..];
            if rest.starts_with(b"f32") {
                FloatSuffix::F32
            } else if rest.starts_with(b"f64") {
                FloatSuffix::F64
            } else {
                FloatSuffix::None
            }
        };

        let end = self.cursor;
        if suffix != FloatSuffix::None {
            self.cursor += 3;
        }

        let mut token = self.token(TokenKind::FloatLiteral);
        token.data = TokenData::Literal(LiteralData {
            begin: self.marked as u32,
            end: end as u32,
            radix: 10,
            float_suffix: suffix,
            ..LiteralData::default()
        });
        token
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
