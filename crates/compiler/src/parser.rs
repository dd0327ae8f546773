//! Recursive-descent parser
//!
//! The parser owns control flow only: token lookahead, delimiter balancing,
//! operator precedence and error recovery. Every recognized production is
//! handed to the semantic analyzer, which builds the node (or refuses with
//! `None`, which the parser tolerates and propagates).

use std::rc::Rc;

use crate::ast::{
    BinaryOp, Expr, FieldDecl, FunctionDecl, ParamDecl, Stmt, StructDecl, TopLevelDecl,
    TranslationUnit, UnaryOp, VarDecl,
};
use crate::diag::{DiagEngine, DiagKind};
use crate::lexer::Lexer;
use crate::literal;
use crate::scope::ScopeFlags;
use crate::sema::{LocatedIdent, Sema};
use crate::source::{SourceFile, SourceLocation, SourceRange};
use crate::token::{Token, TokenKind};
use crate::types::Type;

/// Pairs an opening bracket with its closer and remembers both locations for
/// diagnostics.
struct DelimiterTracker {
    open_kind: TokenKind,
    open_loc: SourceLocation,
    close_loc: SourceLocation,
}

impl DelimiterTracker {
    fn new(open_kind: TokenKind) -> Self {
        DelimiterTracker {
            open_kind,
            open_loc: 0,
            close_loc: 0,
        }
    }

    fn close_kind(&self) -> TokenKind {
        match self.open_kind {
            TokenKind::LParen => TokenKind::RParen,
            TokenKind::LBrace => TokenKind::RBrace,
            TokenKind::LSquare => TokenKind::RSquare,
            _ => unreachable!("not an open delimiter"),
        }
    }

    fn try_consume_open(&mut self, p: &mut Parser<'_, '_>) -> bool {
        self.open_loc = p.token.location;
        p.try_consume(self.open_kind)
    }

    fn expect_and_consume_open(&mut self, p: &mut Parser<'_, '_>) -> bool {
        if self.try_consume_open(p) {
            return true;
        }
        p.diag()
            .diag_at(DiagKind::ErrExpectedTok, self.open_loc)
            .arg_tok(self.open_kind)
            .arg_tok(p.token.kind)
            .caret_range(self.open_loc)
            .flush();
        false
    }

    fn try_consume_close(&mut self, p: &mut Parser<'_, '_>) -> bool {
        self.close_loc = p.token.location;
        p.try_consume(self.close_kind())
    }

    fn expect_and_consume_close(&mut self, p: &mut Parser<'_, '_>) -> bool {
        if self.try_consume_close(p) {
            return true;
        }
        p.diag()
            .diag_at(DiagKind::ErrExpectedTok, self.close_loc)
            .arg_tok(self.close_kind())
            .arg_tok(p.token.kind)
            .caret_range(self.close_loc)
            .flush();
        false
    }

    fn range(&self) -> SourceRange {
        SourceRange::new(self.open_loc, self.close_loc + 1)
    }
}

/// Remembers where a production started; its range ends at the previous
/// token's end.
struct SpanTracker {
    start: SourceLocation,
}

impl SpanTracker {
    fn new(p: &Parser<'_, '_>) -> Self {
        SpanTracker {
            start: p.token.location,
        }
    }

    fn range(&self, p: &Parser<'_, '_>) -> SourceRange {
        SourceRange::new(self.start, p.prev_token_end)
    }
}

/// Binding strength of a binary operator token; `None` for anything that is
/// not a binary operator. Assignment binds loosest, multiplication tightest.
fn binop_precedence(kind: TokenKind) -> Option<i32> {
    use TokenKind::*;
    let prec = match kind {
        Equal | PlusEqual | MinusEqual | StarEqual | SlashEqual | PercentEqual | LessLessEqual
        | GreaterGreaterEqual | AmpEqual | CaretEqual | PipeEqual => 1,
        PipePipe => 2,
        AmpAmp => 3,
        Pipe => 4,
        Caret => 5,
        Amp => 6,
        EqualEqual | ExclaimEqual => 7,
        Less | LessEqual | Greater | GreaterEqual => 8,
        LessLess | GreaterGreater => 9,
        Plus | Minus => 10,
        Star | Slash | Percent => 11,
        _ => return None,
    };
    Some(prec)
}

fn binop_from_token(kind: TokenKind) -> BinaryOp {
    use TokenKind::*;
    match kind {
        Star => BinaryOp::Mul,
        Slash => BinaryOp::Div,
        Percent => BinaryOp::Mod,
        Plus => BinaryOp::Add,
        Minus => BinaryOp::Sub,
        LessLess => BinaryOp::Shl,
        GreaterGreater => BinaryOp::Shr,
        Less => BinaryOp::Lt,
        Greater => BinaryOp::Gt,
        LessEqual => BinaryOp::Le,
        GreaterEqual => BinaryOp::Ge,
        EqualEqual => BinaryOp::Eq,
        ExclaimEqual => BinaryOp::Ne,
        Amp => BinaryOp::BitAnd,
        Caret => BinaryOp::BitXor,
        Pipe => BinaryOp::BitOr,
        AmpAmp => BinaryOp::LogAnd,
        PipePipe => BinaryOp::LogOr,
        Equal => BinaryOp::Assign,
        StarEqual => BinaryOp::AssignMul,
        SlashEqual => BinaryOp::AssignDiv,
        PercentEqual => BinaryOp::AssignMod,
        PlusEqual => BinaryOp::AssignAdd,
        MinusEqual => BinaryOp::AssignSub,
        LessLessEqual => BinaryOp::AssignShl,
        GreaterGreaterEqual => BinaryOp::AssignShr,
        AmpEqual => BinaryOp::AssignBitAnd,
        CaretEqual => BinaryOp::AssignBitXor,
        PipeEqual => BinaryOp::AssignBitOr,
        _ => unreachable!("not a binary operator token"),
    }
}

pub struct Parser<'a, 'd> {
    lexer: Lexer<'a, 'd>,
    sema: Sema<'a, 'd>,
    file: Rc<SourceFile>,
    token: Token<'a>,
    /// End location of the previously consumed token; start of file before
    /// the first one.
    prev_token_end: SourceLocation,
}

impl<'a, 'd> Parser<'a, 'd> {
    pub fn new(lexer: Lexer<'a, 'd>, sema: Sema<'a, 'd>) -> Self {
        let file = lexer.source_file().clone();
        Parser {
            lexer,
            sema,
            file,
            token: Token {
                kind: TokenKind::Eof,
                location: 0,
                length: 0,
                data: crate::token::TokenData::None,
            },
            prev_token_end: 0,
        }
    }

    pub fn sema(&self) -> &Sema<'a, 'd> {
        &self.sema
    }

    fn diag(&self) -> &'d DiagEngine {
        self.sema.diag()
    }

    fn consume_token(&mut self) {
        self.prev_token_end = self.token.location + self.token.length;
        self.token = self.lexer.next();
    }

    fn lookahead(&self, kind: TokenKind) -> bool {
        self.token.kind == kind
    }

    fn try_consume(&mut self, kind: TokenKind) -> bool {
        if !self.lookahead(kind) {
            return false;
        }
        self.consume_token();
        true
    }

    fn expect_token(&mut self, kind: TokenKind) -> bool {
        if self.token.kind != kind {
            self.diag()
                .diag_at(DiagKind::ErrExpectedTok, self.prev_token_end)
                .arg_tok(kind)
                .arg_tok(self.token.kind)
                .caret_range(self.prev_token_end)
                .flush();
            self.consume_token();
            return false;
        }
        self.consume_token();
        true
    }

    fn unexpected_token(&mut self) {
        self.diag()
            .diag_at(DiagKind::ErrUnexpectedTok, self.token.location)
            .arg_tok(self.token.kind)
            .flush();
        self.consume_token();
    }

    fn token_range(&self) -> SourceRange {
        self.token.range()
    }

    fn literal_text(&self, begin: u32, end: u32) -> &str {
        &self.file.buffer()[begin as usize..end as usize]
    }

    /// Consumes an identifier token, or runs `on_error` and returns `None`.
    fn parse_identifier(
        &mut self,
        on_error: impl FnOnce(&mut Self),
    ) -> Option<LocatedIdent<'a>> {
        if self.lookahead(TokenKind::Identifier) {
            let ident = LocatedIdent {
                ident: self.token.identifier().unwrap(),
                range: self.token_range(),
            };
            self.consume_token();
            return Some(ident);
        }
        on_error(self);
        None
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    // type:
    //   "void" | "char" | "bool" | "i8" ... "u64" | "f32" | "f64"
    //   "*" type
    //   "(" type ")"
    //   "[" type ";" INT_LITERAL "]"
    //   IDENTIFIER
    fn parse_type(&mut self) -> Option<&'a Type<'a>> {
        let types = self.sema.types();
        match self.token.kind {
            TokenKind::Star => {
                self.consume_token();
                let sub = self.parse_type()?;
                Some(types.pointer(sub))
            }
            TokenKind::LParen => {
                self.consume_token();
                let sub = self.parse_type();
                self.expect_token(TokenKind::RParen);
                Some(types.paren(sub?))
            }
            TokenKind::LSquare => {
                self.consume_token();
                let elem = self.parse_type();
                self.expect_token(TokenKind::Semi);
                let len = self.parse_array_length();
                self.expect_token(TokenKind::RSquare);
                Some(types.array(elem?, len?))
            }
            TokenKind::Identifier => {
                let name = self.parse_identifier(|_| unreachable!()).unwrap();
                Some(self.sema.lookup_type(name))
            }
            TokenKind::KwVoid => self.consume_builtin(types.void()),
            TokenKind::KwChar => self.consume_builtin(types.char()),
            TokenKind::KwBool => self.consume_builtin(types.bool()),
            TokenKind::KwI8 => self.consume_builtin(types.i8()),
            TokenKind::KwI16 => self.consume_builtin(types.i16()),
            TokenKind::KwI32 => self.consume_builtin(types.i32()),
            TokenKind::KwI64 => self.consume_builtin(types.i64()),
            TokenKind::KwU8 => self.consume_builtin(types.u8()),
            TokenKind::KwU16 => self.consume_builtin(types.u16()),
            TokenKind::KwU32 => self.consume_builtin(types.u32()),
            TokenKind::KwU64 => self.consume_builtin(types.u64()),
            TokenKind::KwF32 => self.consume_builtin(types.f32()),
            TokenKind::KwF64 => self.consume_builtin(types.f64()),
            _ => {
                self.unexpected_token();
                None
            }
        }
    }

    fn consume_builtin(&mut self, ty: &'a Type<'a>) -> Option<&'a Type<'a>> {
        self.consume_token();
        Some(ty)
    }

    fn parse_array_length(&mut self) -> Option<u64> {
        if !self.lookahead(TokenKind::IntLiteral) {
            self.unexpected_token();
            return None;
        }
        let lit = self.token.literal().unwrap();
        let text = self.literal_text(lit.begin, lit.end).to_owned();
        let range = self.token_range();
        self.consume_token();

        let (value, overflow) = literal::decode_int(&text, lit.radix);
        if overflow {
            self.diag()
                .diag_at(DiagKind::ErrGenericIntLiteralTooLarge, range.begin)
                .range(range)
                .flush();
            return None;
        }
        Some(value)
    }

    // type_specifier:
    //     ":" type
    fn try_parse_type_specifier(&mut self) -> Option<&'a Type<'a>> {
        if !self.try_consume(TokenKind::Colon) {
            return None;
        }
        self.parse_type()
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    // param_decl:
    //     IDENTIFIER type_specifier? ("=" expr)?
    fn parse_param_decl(&mut self) -> Option<&'a ParamDecl<'a>> {
        let span = SpanTracker::new(self);

        let recoverable = self.lookahead(TokenKind::Colon) || self.lookahead(TokenKind::Equal);
        let name = self.parse_identifier(|p| {
            // When the next token suggests only the name is missing, let the
            // semantic analyzer report it.
            if !recoverable {
                p.diag()
                    .diag_at(DiagKind::ErrParamDeclExpected, p.token.location)
                    .flush();
            }
        });
        if name.is_none() && !recoverable {
            return None;
        }

        let ty = self.try_parse_type_specifier();

        let default = if self.try_consume(TokenKind::Equal) {
            self.sema.set_in_default_arg(true);
            let expr = self.parse_expr();
            self.sema.set_in_default_arg(false);
            expr
        } else {
            None
        };

        self.sema.act_on_param_decl(ty, name, default, span.range(self))
    }

    // var_decl:
    //     IDENTIFIER "=" expr
    //     IDENTIFIER type_specifier ("=" expr)?
    fn parse_var_decl(&mut self) -> Option<&'a VarDecl<'a>> {
        let span = SpanTracker::new(self);

        let recoverable = self.lookahead(TokenKind::Colon) || self.lookahead(TokenKind::Equal);
        let name = self.parse_identifier(|p| {
            if !recoverable {
                p.diag()
                    .diag_at(DiagKind::ErrVarDeclExpected, p.token.location)
                    .flush();
            }
        });
        if name.is_none() && !recoverable {
            return None;
        }

        let ty = self.try_parse_type_specifier();

        let init = if self.try_consume(TokenKind::Equal) {
            self.parse_expr()
        } else {
            None
        };

        self.sema.act_on_var_decl(ty, name, init, span.range(self))
    }

    // param_decl_list:
    //     param_decl ("," param_decl)*
    fn parse_param_list(&mut self) -> Vec<&'a ParamDecl<'a>> {
        let mut params = Vec::new();
        loop {
            if let Some(param) = self.parse_param_decl() {
                params.push(param);
            }

            if self.lookahead(TokenKind::Eof) || self.lookahead(TokenKind::RParen) {
                break;
            }
            self.expect_token(TokenKind::Comma);
        }
        params
    }

    // var_decl_list:
    //     var_decl ("," var_decl)*
    fn parse_var_list(&mut self) -> Vec<&'a VarDecl<'a>> {
        let mut vars = Vec::new();
        loop {
            if let Some(var) = self.parse_var_decl() {
                vars.push(var);
            }

            if self.lookahead(TokenKind::Eof) || self.lookahead(TokenKind::Semi) {
                break;
            }
            self.expect_token(TokenKind::Comma);
        }
        vars
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    // compound_stmt:
    //     "{" stmt* "}"
    fn parse_compound_stmt(&mut self) -> Option<&'a Stmt<'a>> {
        self.sema.push_scope(ScopeFlags::NONE);

        let mut delimiters = DelimiterTracker::new(TokenKind::LBrace);
        if !delimiters.expect_and_consume_open(self) {
            self.sema.pop_scope();
            return None;
        }

        let mut stmts = Vec::new();
        while !self.lookahead(TokenKind::RBrace) && !self.lookahead(TokenKind::Eof) {
            if let Some(stmt) = self.parse_stmt() {
                stmts.push(stmt);
            }
        }

        delimiters.expect_and_consume_close(self);

        let node = self.sema.act_on_compound_stmt(&stmts, delimiters.range());
        self.sema.pop_scope();
        node
    }

    // let_stmt:
    //     "let" var_decl_list ";"
    fn parse_let_stmt(&mut self) -> Option<&'a Stmt<'a>> {
        debug_assert!(self.lookahead(TokenKind::KwLet));

        let span = SpanTracker::new(self);
        self.consume_token(); // 'let'

        let decls = self.parse_var_list();

        self.expect_token(TokenKind::Semi);
        self.sema.act_on_let_stmt(&decls, span.range(self))
    }

    // break_stmt:
    //     "break" ";"
    fn parse_break_stmt(&mut self) -> Option<&'a Stmt<'a>> {
        let span = SpanTracker::new(self);
        let keyword_range = self.token_range();
        self.consume_token(); // 'break'
        self.expect_token(TokenKind::Semi);
        self.sema.act_on_break_stmt(span.range(self), keyword_range)
    }

    // continue_stmt:
    //     "continue" ";"
    fn parse_continue_stmt(&mut self) -> Option<&'a Stmt<'a>> {
        let span = SpanTracker::new(self);
        let keyword_range = self.token_range();
        self.consume_token(); // 'continue'
        self.expect_token(TokenKind::Semi);
        self.sema.act_on_continue_stmt(span.range(self), keyword_range)
    }

    // return_stmt:
    //     "return" expr? ";"
    fn parse_return_stmt(&mut self) -> Option<&'a Stmt<'a>> {
        let span = SpanTracker::new(self);
        self.consume_token(); // 'return'

        let value = if self.lookahead(TokenKind::Semi) {
            None
        } else {
            self.parse_expr()
        };

        let semi_loc = self.token.location;
        self.expect_token(TokenKind::Semi);
        self.sema.act_on_return_stmt(value, span.range(self), semi_loc)
    }

    // if_stmt:
    //     "if" expr compound_stmt ("else" (compound_stmt | if_stmt))?
    fn parse_if_stmt(&mut self) -> Option<&'a Stmt<'a>> {
        let span = SpanTracker::new(self);
        self.consume_token(); // 'if'

        let cond = self.parse_expr();
        let then_stmt = self.parse_compound_stmt();

        let else_stmt = if self.try_consume(TokenKind::KwElse) {
            if self.lookahead(TokenKind::KwIf) {
                // `else if { ... }` chains parse as a nested if.
                self.parse_if_stmt()
            } else {
                self.parse_compound_stmt()
            }
        } else {
            None
        };

        self.sema
            .act_on_if_stmt(cond, then_stmt, else_stmt, span.range(self))
    }

    // while_stmt:
    //     "while" expr compound_stmt
    fn parse_while_stmt(&mut self) -> Option<&'a Stmt<'a>> {
        let span = SpanTracker::new(self);
        self.consume_token(); // 'while'

        let cond = self.parse_expr();

        self.sema.act_before_while_stmt_body();
        let body = self.parse_compound_stmt();

        self.sema.act_on_while_stmt(cond, body, span.range(self))
    }

    // loop_stmt:
    //     "loop" compound_stmt
    fn parse_loop_stmt(&mut self) -> Option<&'a Stmt<'a>> {
        let span = SpanTracker::new(self);
        self.consume_token(); // 'loop'

        self.sema.act_before_loop_stmt_body();
        let body = self.parse_compound_stmt();

        self.sema.act_on_loop_stmt(body, span.range(self))
    }

    // assert_stmt:
    //     "assert" expr ";"
    fn parse_assert_stmt(&mut self) -> Option<&'a Stmt<'a>> {
        let span = SpanTracker::new(self);
        self.consume_token(); // 'assert'

        let cond = self.parse_expr();
        self.expect_token(TokenKind::Semi);
        self.sema.act_on_assert_stmt(cond, span.range(self))
    }

    // expr_stmt:
    //     expr ";"
    fn parse_expr_stmt(&mut self) -> Option<&'a Stmt<'a>> {
        let expr = self.parse_expr();
        self.expect_token(TokenKind::Semi);
        self.sema.act_on_expr_stmt(expr)
    }

    fn parse_stmt(&mut self) -> Option<&'a Stmt<'a>> {
        match self.token.kind {
            TokenKind::LBrace => self.parse_compound_stmt(),
            TokenKind::KwLet => self.parse_let_stmt(),
            TokenKind::KwBreak => self.parse_break_stmt(),
            TokenKind::KwContinue => self.parse_continue_stmt(),
            TokenKind::KwReturn => self.parse_return_stmt(),
            TokenKind::KwIf => self.parse_if_stmt(),
            TokenKind::KwWhile => self.parse_while_stmt(),
            TokenKind::KwLoop => self.parse_loop_stmt(),
            TokenKind::KwAssert => self.parse_assert_stmt(),
            _ => self.parse_expr_stmt(),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_bool_lit(&mut self) -> Option<&'a Expr<'a>> {
        let range = self.token_range();
        let value = self.lookahead(TokenKind::KwTrue);
        self.consume_token();
        self.sema.act_on_bool_literal(value, range)
    }

    fn parse_int_lit(&mut self) -> Option<&'a Expr<'a>> {
        let range = self.token_range();
        let lit = self.token.literal().unwrap();
        let text = self.literal_text(lit.begin, lit.end).to_owned();
        self.consume_token();

        let (mut value, overflow) = literal::decode_int(&text, lit.radix);
        if overflow {
            self.diag()
                .diag_at(DiagKind::ErrGenericIntLiteralTooLarge, range.begin)
                .range(range)
                .flush();
            value = 0; // recover with something representable
        }

        self.sema.act_on_int_literal(value, lit.int_suffix, range)
    }

    fn parse_float_lit(&mut self) -> Option<&'a Expr<'a>> {
        let range = self.token_range();
        let lit = self.token.literal().unwrap();
        let text = self.literal_text(lit.begin, lit.end).to_owned();
        self.consume_token();

        let (mut value, overflow) = literal::decode_float(&text);
        if overflow {
            self.diag()
                .diag_at(DiagKind::ErrGenericFloatLiteralTooLarge, range.begin)
                .range(range)
                .flush();
            value = 0.0;
        }

        self.sema.act_on_float_literal(value, lit.float_suffix, range)
    }

    // paren_expr:
    //     "(" expr ")"
    fn parse_paren_expr(&mut self) -> Option<&'a Expr<'a>> {
        let mut delimiters = DelimiterTracker::new(TokenKind::LParen);
        delimiters.try_consume_open(self);

        let sub = if self.lookahead(TokenKind::RParen) || self.lookahead(TokenKind::Eof) {
            self.diag()
                .diag_at(DiagKind::ErrExpectedExpr, self.token.location)
                .caret_range(self.token.location)
                .flush();
            None
        } else {
            self.parse_expr()
        };

        delimiters.expect_and_consume_close(self);
        self.sema.act_on_paren_expr(sub, delimiters.range())
    }

    // decl_ref_expr:
    //     IDENTIFIER
    fn parse_decl_ref(&mut self) -> Option<&'a Expr<'a>> {
        let name = self.parse_identifier(|_| unreachable!()).unwrap();
        self.sema.act_on_decl_ref_expr(name)
    }

    fn parse_primary_expr(&mut self) -> Option<&'a Expr<'a>> {
        match self.token.kind {
            TokenKind::IntLiteral => self.parse_int_lit(),
            TokenKind::FloatLiteral => self.parse_float_lit(),
            TokenKind::KwTrue | TokenKind::KwFalse => self.parse_bool_lit(),
            TokenKind::LParen => self.parse_paren_expr(),
            TokenKind::Identifier => self.parse_decl_ref(),
            _ => {
                self.unexpected_token();
                None
            }
        }
    }

    // call_expr:
    //     postfix_expr "(" arg_list? ")"
    fn parse_call_expr(&mut self, callee: Option<&'a Expr<'a>>) -> Option<&'a Expr<'a>> {
        let mut delimiters = DelimiterTracker::new(TokenKind::LParen);
        delimiters.try_consume_open(self);

        let mut args: Vec<Option<&'a Expr<'a>>> = Vec::new();
        while !self.lookahead(TokenKind::RParen) && !self.lookahead(TokenKind::Eof) {
            args.push(self.parse_expr());
            if !self.try_consume(TokenKind::Comma) {
                break;
            }
        }

        delimiters.expect_and_consume_close(self);

        let begin = callee.map_or(delimiters.open_loc, |c| c.range.begin);
        let range = SourceRange::new(begin, delimiters.close_loc + 1);
        self.sema
            .act_on_call_expr(callee, &args, range, delimiters.open_loc)
    }

    // member_expr:
    //     postfix_expr "." IDENTIFIER
    fn parse_member_expr(&mut self, base: Option<&'a Expr<'a>>) -> Option<&'a Expr<'a>> {
        let dot_loc = self.token.location;
        self.consume_token(); // '.'

        if !self.lookahead(TokenKind::Identifier) {
            self.unexpected_token();
            return None;
        }
        let member = self.parse_identifier(|_| unreachable!()).unwrap();

        let begin = base.map_or(dot_loc, |b| b.range.begin);
        let range = SourceRange::new(begin, self.prev_token_end);
        self.sema.act_on_member_expr(base, member, range, dot_loc)
    }

    fn parse_postfix_expr(&mut self) -> Option<&'a Expr<'a>> {
        let mut expr = self.parse_primary_expr();
        loop {
            match self.token.kind {
                TokenKind::LParen => expr = self.parse_call_expr(expr),
                TokenKind::Dot => expr = self.parse_member_expr(expr),
                _ => return expr,
            }
        }
    }

    // unary_expr:
    //     postfix_expr
    //     ("-" | "!" | "&" | "*") unary_expr
    fn parse_unary_expr(&mut self) -> Option<&'a Expr<'a>> {
        let span = SpanTracker::new(self);

        let op = match self.token.kind {
            TokenKind::Exclaim => UnaryOp::Not,
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Amp => UnaryOp::AddressOf,
            TokenKind::Star => UnaryOp::Deref,
            _ => return self.parse_postfix_expr(),
        };

        let op_loc = self.token.location;
        self.consume_token();

        let sub = self.parse_unary_expr();
        self.sema.act_on_unary_expr(sub, op, span.range(self), op_loc)
    }

    // cast_expr:
    //     unary_expr ("as" type)?
    fn parse_cast_expr(&mut self) -> Option<&'a Expr<'a>> {
        let span = SpanTracker::new(self);
        let sub = self.parse_unary_expr();

        if self.lookahead(TokenKind::KwAs) {
            let as_loc = self.token.location;
            self.consume_token();

            let target_ty = self.parse_type();
            return self
                .sema
                .act_on_cast_expr(sub, target_ty, span.range(self), as_loc);
        }

        sub
    }

    /// Precedence climbing over the binary operator table.
    fn parse_binary_expr(
        &mut self,
        mut lhs: Option<&'a Expr<'a>>,
        min_prec: i32,
    ) -> Option<&'a Expr<'a>> {
        loop {
            let Some(tok_prec) = binop_precedence(self.token.kind) else {
                return lhs;
            };
            if tok_prec < min_prec {
                return lhs;
            }

            let op = binop_from_token(self.token.kind);
            let op_loc = self.token.location;
            self.consume_token();

            let mut rhs = self.parse_cast_expr();

            // Let a tighter-binding operator on the right take the rhs first.
            if let Some(next_prec) = binop_precedence(self.token.kind) {
                if tok_prec < next_prec {
                    rhs = self.parse_binary_expr(rhs, tok_prec + 1);
                }
            }

            let range = match (lhs, rhs) {
                (Some(l), Some(r)) => SourceRange::new(l.range.begin, r.range.end),
                _ => SourceRange::new(op_loc, op_loc),
            };
            lhs = self.sema.act_on_binary_expr(lhs, rhs, op, range, op_loc);
        }
    }

    pub fn parse_expr(&mut self) -> Option<&'a Expr<'a>> {
        let lhs = self.parse_cast_expr();
        self.parse_binary_expr(lhs, 0)
    }

    // ------------------------------------------------------------------
    // Top-level declarations
    // ------------------------------------------------------------------

    // func_decl:
    //     "fn" IDENTIFIER "(" param_decl_list? ")" ("->" type)? compound_stmt
    //     "fn" IDENTIFIER "(" param_decl_list? ")" ("->" type)? ";"   (extern)
    fn parse_func_decl(&mut self, is_extern: bool) -> Option<&'a FunctionDecl<'a>> {
        debug_assert!(self.lookahead(TokenKind::KwFn));

        let span = SpanTracker::new(self);
        self.consume_token(); // 'fn'

        let recoverable = self.lookahead(TokenKind::LParen);
        let name = self.parse_identifier(|p| {
            p.diag()
                .diag_at(DiagKind::ErrExpectedTok, p.token.location)
                .arg_tok(TokenKind::Identifier)
                .arg_tok(p.token.kind)
                .caret_range(p.token.location)
                .flush();
        });
        if name.is_none() && !recoverable {
            return None;
        }

        let mut delimiters = DelimiterTracker::new(TokenKind::LParen);
        if !delimiters.expect_and_consume_open(self) {
            return None;
        }

        self.sema.push_scope(ScopeFlags::FUNC_PARAMS);
        let params = if self.lookahead(TokenKind::RParen) {
            Vec::new()
        } else {
            self.parse_param_list()
        };
        self.sema.pop_scope();

        if !delimiters.expect_and_consume_close(self) {
            return None;
        }

        let ret_ty = if self.try_consume(TokenKind::Arrow) {
            self.parse_type()
        } else {
            None
        };

        let decl = self
            .sema
            .act_on_func_decl(name, ret_ty, &params, delimiters.open_loc);

        if is_extern && !self.lookahead(TokenKind::LBrace) {
            // Extern declarations may stop at the signature.
            self.expect_token(TokenKind::Semi);
            if let Some(decl) = decl {
                decl.range.set(span.range(self));
            }
            return decl;
        }

        if !self.lookahead(TokenKind::LBrace) {
            let loc = delimiters.close_loc + 1;
            self.diag()
                .diag_at(DiagKind::ErrExpectedFuncBodyAfterFuncDecl, loc)
                .caret_range(loc)
                .flush();
            return decl;
        }

        match decl {
            Some(decl) => {
                self.sema.begin_func_decl_analysis(decl);
                let body = self.parse_compound_stmt();
                self.sema.end_func_decl_analysis();
                decl.body.set(body);
                decl.range.set(span.range(self));
                Some(decl)
            }
            None => {
                // The declaration failed but the body is still there; parse
                // it in a throwaway scope to keep the token stream in sync.
                self.sema.push_scope(ScopeFlags::FUNC_PARAMS);
                let _ = self.parse_compound_stmt();
                self.sema.pop_scope();
                None
            }
        }
    }

    // extern_decl:
    //     "extern" STRING_LITERAL? func_decl
    fn parse_extern_decl(&mut self) -> Option<&'a FunctionDecl<'a>> {
        debug_assert!(self.lookahead(TokenKind::KwExtern));
        self.consume_token(); // 'extern'

        let mut abi: Option<(&'a str, SourceRange)> = None;
        if self.lookahead(TokenKind::StringLiteral) {
            let lit = self.token.literal().unwrap();
            let text = self.literal_text(lit.begin, lit.end);
            let decoded = literal::decode_string(text);
            abi = Some((self.sema.alloc_str(&decoded), self.token_range()));
            self.consume_token();
        }

        if !self.lookahead(TokenKind::KwFn) {
            self.unexpected_token();
            return None;
        }

        let decl = self.parse_func_decl(true)?;
        decl.is_extern.set(true);
        if let Some((abi, abi_range)) = abi {
            decl.abi.set(Some(abi));
            self.sema.check_func_abi(abi, abi_range);
        }
        Some(decl)
    }

    // struct_field_decl:
    //     IDENTIFIER ":" type
    fn parse_struct_field_decl(&mut self) -> Option<&'a FieldDecl<'a>> {
        let span = SpanTracker::new(self);

        let name = self.parse_identifier(|p| {
            p.diag()
                .diag_at(DiagKind::ErrExpectedStructFieldDecl, p.token.location)
                .caret_range(p.token.location)
                .flush();
        })?;

        self.expect_token(TokenKind::Colon);
        let ty = self.parse_type();

        self.sema.act_on_struct_field_decl(ty, Some(name), span.range(self))
    }

    // struct_decl:
    //     "struct" IDENTIFIER "{" struct_field_decl ("," struct_field_decl)* ","? "}"
    fn parse_struct_decl(&mut self) -> Option<&'a StructDecl<'a>> {
        debug_assert!(self.lookahead(TokenKind::KwStruct));

        let span = SpanTracker::new(self);
        self.consume_token(); // 'struct'

        let name = self.parse_identifier(|p| {
            p.diag()
                .diag_at(DiagKind::ErrExpectedTok, p.token.location)
                .arg_tok(TokenKind::Identifier)
                .arg_tok(p.token.kind)
                .caret_range(p.token.location)
                .flush();
        });

        let mut delimiters = DelimiterTracker::new(TokenKind::LBrace);
        if !delimiters.expect_and_consume_open(self) {
            return None;
        }

        let mut fields = Vec::new();
        while !self.lookahead(TokenKind::Eof) && !self.lookahead(TokenKind::RBrace) {
            if let Some(field) = self.parse_struct_field_decl() {
                fields.push(field);
            }

            if self.try_consume(TokenKind::Comma) {
                continue;
            }

            // Several languages separate fields with ';' instead of ','.
            if self.lookahead(TokenKind::Semi) {
                self.diag()
                    .diag_at(DiagKind::ErrUnexpectedTokWithHint, self.token.location)
                    .arg_tok(TokenKind::Semi)
                    .arg_tok(TokenKind::Comma)
                    .caret_range(self.token.location)
                    .flush();
                self.consume_token(); // act as if it were ','
                continue;
            }

            if self.lookahead(TokenKind::RBrace) {
                break;
            }

            self.expect_token(TokenKind::Comma);
            // Skip to the next field, '}' or ','.
            while !self.lookahead(TokenKind::RBrace)
                && !self.lookahead(TokenKind::Comma)
                && !self.lookahead(TokenKind::Eof)
            {
                self.consume_token();
            }
            self.try_consume(TokenKind::Comma);
        }

        delimiters.expect_and_consume_close(self);
        self.sema.act_on_struct_decl(name, &fields, span.range(self))
    }

    fn parse_top_level_decl(&mut self) -> Option<TopLevelDecl<'a>> {
        match self.token.kind {
            TokenKind::KwExtern => self.parse_extern_decl().map(TopLevelDecl::Function),
            TokenKind::KwFn => self.parse_func_decl(false).map(TopLevelDecl::Function),
            TokenKind::KwStruct => self.parse_struct_decl().map(TopLevelDecl::Struct),
            _ => {
                self.unexpected_token();
                None
            }
        }
    }

    // translation_unit:
    //     top_level_decl*
    fn parse_translation_unit(&mut self) -> &'a TranslationUnit<'a> {
        let span = SpanTracker::new(self);
        self.sema.push_scope(ScopeFlags::NONE);

        let mut decls = Vec::new();
        while !self.lookahead(TokenKind::Eof) {
            if let Some(decl) = self.parse_top_level_decl() {
                decls.push(decl);
            }
        }

        let node = self.sema.act_on_translation_unit(&decls, span.range(self));
        self.sema.pop_scope();
        node
    }

    /// Parses a whole source file into a typed translation unit.
    pub fn parse(&mut self) -> &'a TranslationUnit<'a> {
        self.consume_token();
        self.prev_token_end = 0;
        self.parse_translation_unit()
    }

    /// Parses a single statement; used by test harnesses.
    pub fn parse_standalone_stmt(&mut self) -> Option<&'a Stmt<'a>> {
        self.consume_token();
        self.prev_token_end = 0;
        self.sema.push_scope(ScopeFlags::NONE);
        let stmt = self.parse_stmt();
        self.sema.pop_scope();
        stmt
    }

    /// Parses a single expression; used by the interpreter test harness.
    pub fn parse_standalone_expr(&mut self) -> Option<&'a Expr<'a>> {
        self.consume_token();
        self.prev_token_end = 0;
        self.sema.push_scope(ScopeFlags::NONE);
        let expr = self.parse_expr();
        self.sema.pop_scope();
        expr
    }
}
