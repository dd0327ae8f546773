//! Diagnostic engine
//!
//! Each diagnostic kind carries a message template and a default severity.
//! Templates understand three constructs:
//!
//! - `{N}` interpolates argument `N` with the formatter of its tagged type;
//! - `<%text%>` renders `text` quoted, and bold when color is enabled;
//! - `%Ns` expands to `s` when argument `N` is an integer >= 2 (plural-s).
//!
//! A diagnostic is built with the fluent [`Diag`] API and emitted by
//! [`Diag::flush`], which renders the `path:line:col: severity: message`
//! header followed by margined source excerpts for every attached range.
//! The engine keeps per-severity counters and implements the warning
//! promotion, silencing and termination policies.

use std::cell::{Cell, RefCell};
use std::io::Write;
use std::rc::Rc;

use crate::intern::IdentifierInfo;
use crate::source::{SourceFile, SourceLocation, SourceRange};
use crate::token::TokenKind;
use crate::types::{Type, TypeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Note,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn name(self) -> &'static str {
        match self {
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal error",
        }
    }

    fn color(self) -> &'static str {
        match self {
            Severity::Note => "\x1b[1;36m",
            Severity::Warning => "\x1b[1;33m",
            Severity::Error | Severity::Fatal => "\x1b[1;31m",
        }
    }
}

macro_rules! diag_kinds {
    ($($variant:ident => ($severity:ident, $template:literal),)*) => {
        /// Every diagnostic the compiler can emit.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum DiagKind {
            $($variant,)*
        }

        impl DiagKind {
            pub fn default_severity(self) -> Severity {
                match self {
                    $(DiagKind::$variant => Severity::$severity,)*
                }
            }

            pub fn template(self) -> &'static str {
                match self {
                    $(DiagKind::$variant => $template,)*
                }
            }
        }
    };
}

diag_kinds! {
    // Lexical.
    ErrUnknownCharacter => (Error, "unknown character <%{0}%>"),
    ErrUnterminatedBlockComment => (Error, "unterminated block comment"),
    ErrUnterminatedString => (Error, "unterminated string literal"),
    ErrIntLiteralTooLarge => (Error, "integer literal is too large for type <%{0}%>"),
    ErrGenericIntLiteralTooLarge => (Error, "integer literal is too large"),
    ErrGenericFloatLiteralTooLarge => (Error, "float literal is too large"),

    // Syntactic.
    ErrExpectedTok => (Error, "expected <%{0}%> but found <%{1}%>"),
    ErrUnexpectedTok => (Error, "unexpected token <%{0}%>"),
    ErrUnexpectedTokWithHint => (Error, "unexpected <%{0}%>, did you mean <%{1}%>?"),
    ErrExpectedExpr => (Error, "expected expression"),
    ErrExpectedFuncBodyAfterFuncDecl => (Error, "expected function body after function declarator"),
    ErrExpectedStructFieldDecl => (Error, "expected struct field declaration"),
    ErrParamDeclExpected => (Error, "expected parameter declaration"),
    ErrVarDeclExpected => (Error, "expected variable declaration"),

    // Redeclaration.
    ErrRedeclarationFunction => (Error, "redeclaration of function <%{0}%>"),
    ErrRedeclarationStruct => (Error, "redeclaration of struct <%{0}%>"),
    ErrRedeclarationVariable => (Error, "redeclaration of variable <%{0}%>"),
    ErrParameterNameAlreadyUsed => (Error, "parameter <%{0}%> is already declared"),
    ErrFieldNameAlreadyUsed => (Error, "duplicate struct field <%{0}%>"),

    // Name resolution.
    ErrUseUndeclaredIdent => (Error, "use of undeclared identifier <%{0}%>"),
    ErrTypeUnknown => (Error, "unknown type <%{0}%>"),
    ErrCannotBeUsedAsFunction => (Error, "<%{0}%> cannot be used as a function"),
    ErrExprCannotBeUsedAsFunction => (Error, "expression cannot be used as a function"),
    ErrMemberNotStruct => (Error, "request for member <%{0}%> in something that is not a struct"),
    ErrNoMemberNamed => (Error, "<%{0}%> has no member named <%{1}%>"),
    ErrNotAStruct => (Error, "<%{0}%> does not name a struct"),

    // Types.
    ErrExpectedType => (Error, "expected <%{0}%> but found <%{1}%>"),
    ErrCannotApplyUnaryOp => (Error, "cannot apply unary operator <%{0}%> to type <%{1}%>"),
    ErrCannotApplyBinOpGeneric => (Error, "cannot apply binary operator <%{0}%> to types <%{1}%> and <%{2}%>"),
    ErrCannotAdd => (Error, "cannot add <%{1}%> to <%{0}%>"),
    ErrCannotAddAssign => (Error, "cannot add-assign <%{1}%> to <%{0}%>"),
    ErrCannotSub => (Error, "cannot subtract <%{1}%> from <%{0}%>"),
    ErrCannotSubAssign => (Error, "cannot subtract-assign <%{1}%> from <%{0}%>"),
    ErrCannotMul => (Error, "cannot multiply <%{0}%> by <%{1}%>"),
    ErrCannotMulAssign => (Error, "cannot multiply-assign <%{0}%> by <%{1}%>"),
    ErrCannotDiv => (Error, "cannot divide <%{0}%> by <%{1}%>"),
    ErrCannotDivAssign => (Error, "cannot divide-assign <%{0}%> by <%{1}%>"),
    ErrCannotApplyAssignOp => (Error, "cannot apply operator <%{0}%> to type <%{1}%>"),
    ErrCouldNotTakeAddrRvalue => (Error, "cannot take the address of an rvalue of type <%{0}%>"),
    ErrCannotAssignToRvalue => (Error, "cannot assign to an rvalue"),
    ErrIndirectionRequiresPtr => (Error, "indirection requires a pointer operand (<%{0}%> is invalid)"),
    ErrUnsupportedConversion => (Error, "unsupported conversion from <%{0}%> to <%{1}%>"),

    // Calls and default arguments.
    ErrTooFewArgs => (Error, "too few arguments to call of <%{0}%>, expected at least {1} argument%1s"),
    ErrTooManyArgs => (Error, "too many arguments to call of <%{0}%>, expected at most {1} argument%1s"),
    ErrMissingDefaultArgument => (Error, "missing default argument on parameter {0} of function <%{1}%>"),
    ErrDefaultArgRefParam => (Error, "default argument may not refer to parameter <%{0}%>"),
    ErrCannotDeduceVarType => (Error, "cannot deduce type of variable <%{0}%>; add a type annotation or an initializer"),
    ErrCannotDeduceParamType => (Error, "cannot deduce type of parameter <%{0}%>; add a type annotation or a default argument"),

    // Statements.
    ErrBreakOrContinueOutsideOfLoop => (Error, "<%{0}%> statement not within a loop"),

    // Declarations.
    ErrUnknownAbi => (Error, "unknown ABI <%{0}%>, only <%C%> is supported"),

    // Driver.
    ErrFailOpenFile => (Error, "failed to open file <%{0}%>"),
    ErrNoInputFiles => (Error, "no input files"),
    ErrUnknownCmdlineOpt => (Error, "unknown command line option <%{0}%>"),
    ErrCmdlineOptExpectInt => (Error, "option <%{0}%> expects an integer argument"),

    // Warnings and notes.
    WarnAssignInCondition => (Warning, "suspicious use of operator <%{0}%>, did you mean <%{1}%>?"),
    NoteParenthesizeCondition => (Note, "add parentheses around the condition to silence this warning"),
}

/// A tagged diagnostic argument.
#[derive(Debug, Clone, Copy)]
pub enum DiagArg<'a> {
    Char(char),
    Int(i64),
    Str(&'a str),
    TokKind(TokenKind),
    Ident(&'a IdentifierInfo<'a>),
    Type(&'a Type<'a>),
    TypeWithNameHint(&'a Type<'a>, &'a IdentifierInfo<'a>),
}

fn format_arg(out: &mut String, arg: &DiagArg<'_>) {
    match *arg {
        DiagArg::Char(c) => {
            if c.is_ascii_graphic() || c == ' ' {
                out.push(c);
            } else {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
        }
        DiagArg::Int(v) => out.push_str(&v.to_string()),
        DiagArg::Str(s) => out.push_str(s),
        DiagArg::TokKind(kind) => out.push_str(kind.spelling().unwrap_or_else(|| kind.name())),
        DiagArg::Ident(ident) => out.push_str(ident.spelling()),
        DiagArg::Type(ty) => out.push_str(&ty.to_string()),
        DiagArg::TypeWithNameHint(ty, name) => match ty.kind() {
            TypeKind::Function { ret, params } => {
                out.push_str("fn ");
                out.push_str(name.spelling());
                out.push('(');
                for (i, param) in params.iter().enumerate() {
                    if i != 0 {
                        out.push_str(", ");
                    }
                    out.push_str(&param.to_string());
                }
                out.push(')');
                if !ret.is_void() {
                    out.push_str(&format!(" -> {ret}"));
                }
            }
            _ => out.push_str(&ty.to_string()),
        },
    }
}

/// Expands a message template against its arguments.
pub fn format_message(template: &str, args: &[DiagArg<'_>], color: bool) -> String {
    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                // `{N}` argument interpolation.
                let close = template[i..].find('}').map(|off| i + off);
                if let Some(close) = close {
                    if let Ok(idx) = template[i + 1..close].parse::<usize>() {
                        format_arg(&mut out, &args[idx]);
                        i = close + 1;
                        continue;
                    }
                }
                out.push('{');
                i += 1;
            }
            b'<' if bytes.get(i + 1) == Some(&b'%') => {
                // `<%` opens a quoted-emphasis section.
                if color {
                    out.push_str("\x1b[1m");
                }
                out.push('\'');
                i += 2;
            }
            b'%' if bytes.get(i + 1) == Some(&b'>') => {
                // `%>` closes it.
                out.push('\'');
                if color {
                    out.push_str("\x1b[0m");
                }
                i += 2;
            }
            b'%' if bytes.get(i + 1).is_some_and(|b| b.is_ascii_digit())
                && bytes.get(i + 2) == Some(&b's') =>
            {
                // `%Ns` plural-s on integer argument N.
                let idx = (bytes[i + 1] - b'0') as usize;
                if let DiagArg::Int(v) = args[idx] {
                    if v >= 2 {
                        out.push('s');
                    }
                }
                i += 3;
            }
            _ => {
                let ch = template[i..].chars().next().unwrap();
                out.push(ch);
                i += ch.len_utf8();
            }
        }
    }
    out
}

/// Rendering and policy knobs, every one of them reachable from the command
/// line as a feature option.
#[derive(Debug, Clone)]
pub struct DiagOptions {
    pub color: bool,
    pub show_column: bool,
    /// Added to the 0-based column before display; 0 or 1.
    pub column_origin: u32,
    pub show_line_numbers: bool,
    pub margin_width: usize,
    /// 0 means unlimited.
    pub max_errors: u32,
    pub fatal_errors: bool,
    pub warnings_as_errors: bool,
    pub ignore_notes: bool,
    pub ignore_warnings: bool,
}

impl Default for DiagOptions {
    fn default() -> Self {
        DiagOptions {
            color: false,
            show_column: true,
            column_origin: 1,
            show_line_numbers: true,
            margin_width: 5,
            max_errors: 0,
            fatal_errors: false,
            warnings_as_errors: false,
            ignore_notes: false,
            ignore_warnings: false,
        }
    }
}

const MAX_RANGES: usize = 4;
const MAX_ARGS: usize = 8;

/// The diagnostic context: counters, options, output sink and the source
/// file used to resolve locations.
pub struct DiagEngine {
    options: DiagOptions,
    counts: [Cell<u32>; 4],
    sink: RefCell<Box<dyn Write>>,
    file: RefCell<Option<Rc<SourceFile>>>,
}

impl DiagEngine {
    pub fn new(options: DiagOptions) -> Self {
        DiagEngine {
            options,
            counts: Default::default(),
            sink: RefCell::new(Box::new(std::io::stderr())),
            file: RefCell::new(None),
        }
    }

    /// Routes rendered diagnostics into `sink` instead of stderr.
    pub fn with_sink(options: DiagOptions, sink: Box<dyn Write>) -> Self {
        DiagEngine {
            options,
            counts: Default::default(),
            sink: RefCell::new(sink),
            file: RefCell::new(None),
        }
    }

    pub fn options(&self) -> &DiagOptions {
        &self.options
    }

    pub fn set_source_file(&self, file: Rc<SourceFile>) {
        *self.file.borrow_mut() = Some(file);
    }

    pub fn count(&self, severity: Severity) -> u32 {
        self.counts[severity as usize].get()
    }

    /// Errors plus fatals; the driver's exit code is non-zero iff this is.
    pub fn error_count(&self) -> u32 {
        self.count(Severity::Error) + self.count(Severity::Fatal)
    }

    /// Starts a diagnostic without a location (driver-level conditions).
    /// The argument lifetime is free so arena-owned types and identifiers
    /// can be attached regardless of how briefly the engine is borrowed.
    pub fn diag<'a>(&self, kind: DiagKind) -> Diag<'_, 'a> {
        Diag {
            engine: self,
            kind,
            severity: kind.default_severity(),
            caret: None,
            ranges: [SourceRange::default(); MAX_RANGES],
            range_count: 0,
            args: Vec::new(),
        }
    }

    /// Starts a diagnostic whose caret sits at `loc`.
    pub fn diag_at<'a>(&self, kind: DiagKind, loc: SourceLocation) -> Diag<'_, 'a> {
        let mut d = self.diag(kind);
        d.caret = Some(loc);
        d
    }

    fn emit(&self, diag: &Diag<'_, '_>) {
        let mut severity = diag.severity;
        if self.options.ignore_notes && severity == Severity::Note {
            return;
        }
        if self.options.ignore_warnings && severity == Severity::Warning {
            return;
        }
        if self.options.warnings_as_errors && severity == Severity::Warning {
            severity = Severity::Error;
        }

        self.counts[severity as usize].set(self.counts[severity as usize].get() + 1);

        let mut out = String::new();
        let file = self.file.borrow();

        if let (Some(file), Some(caret)) = (file.as_ref(), diag.caret) {
            let (lineno, colno) = file.lineno_and_colno(caret);
            let colno = colno - 1 + self.options.column_origin;
            if self.options.show_column {
                out.push_str(&format!(
                    "{}:{}:{}: ",
                    file.filename().display(),
                    lineno,
                    colno
                ));
            } else {
                out.push_str(&format!("{}:{}: ", file.filename().display(), lineno));
            }
        }

        if self.options.color {
            out.push_str(severity.color());
        }
        out.push_str(severity.name());
        out.push_str(": ");
        if self.options.color {
            out.push_str("\x1b[0m");
        }

        out.push_str(&format_message(
            diag.kind.template(),
            &diag.args,
            self.options.color,
        ));
        out.push('\n');

        if let Some(file) = file.as_ref() {
            if diag.range_count > 0 {
                self.render_ranges(&mut out, file, &diag.ranges[..diag.range_count]);
            }
        }

        {
            let mut sink = self.sink.borrow_mut();
            let _ = sink.write_all(out.as_bytes());
            let _ = sink.flush();
        }

        self.check_termination(severity);
    }

    fn check_termination(&self, severity: Severity) {
        if self.options.max_errors != 0 && self.count(Severity::Error) >= self.options.max_errors {
            let _ = writeln!(
                self.sink.borrow_mut(),
                "compilation terminated due to -fmax-errors={}.",
                self.options.max_errors
            );
            std::process::exit(1);
        }

        if self.options.fatal_errors && severity == Severity::Error {
            let _ = writeln!(
                self.sink.borrow_mut(),
                "compilation terminated due to -Wfatal-errors."
            );
            std::process::exit(1);
        }
    }

    /// Renders source excerpts. Multi-line ranges are decomposed into
    /// per-line partial ranges; lines are shown in source order with a `...`
    /// elision between non-adjacent ones.
    fn render_ranges(&self, out: &mut String, file: &SourceFile, ranges: &[SourceRange]) {
        // (lineno, start column 0-based, end column 0-based exclusive, caret?)
        let mut parts: Vec<(u32, u32, u32, bool)> = Vec::new();
        for range in ranges {
            let (begin_line, begin_col) = file.lineno_and_colno(range.begin);
            if range.is_caret() {
                parts.push((begin_line, begin_col - 1, begin_col, true));
                continue;
            }

            let (end_line, end_col) = file.lineno_and_colno(range.end);
            if begin_line == end_line {
                parts.push((begin_line, begin_col - 1, end_col - 1, false));
            } else {
                for lineno in begin_line..=end_line {
                    let text_len = file.line_text(lineno).len() as u32;
                    let (start, end) = if lineno == begin_line {
                        (begin_col - 1, text_len)
                    } else if lineno == end_line {
                        (0, end_col - 1)
                    } else {
                        (0, text_len)
                    };
                    parts.push((lineno, start, end, false));
                }
            }
        }
        parts.sort_by_key(|&(line, start, ..)| (line, start));

        let margin = self.options.margin_width;
        let mut prev_line: Option<u32> = None;
        let mut i = 0;
        while i < parts.len() {
            let lineno = parts[i].0;
            let mut j = i;
            while j < parts.len() && parts[j].0 == lineno {
                j += 1;
            }

            if let Some(prev) = prev_line {
                if lineno > prev + 1 {
                    out.push_str(&format!("{:>margin$} |\n", "...", margin = margin));
                }
            }
            if prev_line != Some(lineno) {
                let text = file.line_text(lineno);
                if self.options.show_line_numbers {
                    out.push_str(&format!("{:>margin$} | {}\n", lineno, text, margin = margin));
                } else {
                    out.push_str(&format!("{:>margin$} | {}\n", "", text, margin = margin));
                }

                let mut marker = String::new();
                for &(_, start, end, caret) in &parts[i..j] {
                    let start = start as usize;
                    let end = (end as usize).max(start + 1);
                    if marker.len() < start {
                        marker.push_str(&" ".repeat(start - marker.len()));
                    }
                    let ch = if caret { '^' } else { '~' };
                    while marker.len() < end {
                        marker.push(ch);
                    }
                }
                out.push_str(&format!("{:>margin$} | {}\n", "", marker, margin = margin));
            }

            prev_line = Some(lineno);
            i = j;
        }
    }
}

/// An in-flight diagnostic. Dropping it without flushing discards it;
/// [`Diag::flush`] renders and counts it.
pub struct Diag<'d, 'a> {
    engine: &'d DiagEngine,
    kind: DiagKind,
    severity: Severity,
    caret: Option<SourceLocation>,
    ranges: [SourceRange; MAX_RANGES],
    range_count: usize,
    args: Vec<DiagArg<'a>>,
}

impl<'d, 'a> Diag<'d, 'a> {
    pub fn range(mut self, range: SourceRange) -> Self {
        assert!(self.range_count < MAX_RANGES);
        self.ranges[self.range_count] = range;
        self.range_count += 1;
        self
    }

    pub fn caret_range(self, loc: SourceLocation) -> Self {
        self.range(SourceRange::caret(loc))
    }

    fn arg(mut self, arg: DiagArg<'a>) -> Self {
        assert!(self.args.len() < MAX_ARGS);
        self.args.push(arg);
        self
    }

    pub fn arg_char(self, c: char) -> Self {
        self.arg(DiagArg::Char(c))
    }

    pub fn arg_int(self, v: i64) -> Self {
        self.arg(DiagArg::Int(v))
    }

    pub fn arg_str(self, s: &'a str) -> Self {
        self.arg(DiagArg::Str(s))
    }

    pub fn arg_tok(self, kind: TokenKind) -> Self {
        self.arg(DiagArg::TokKind(kind))
    }

    pub fn arg_ident(self, ident: &'a IdentifierInfo<'a>) -> Self {
        self.arg(DiagArg::Ident(ident))
    }

    pub fn arg_type(self, ty: &'a Type<'a>) -> Self {
        self.arg(DiagArg::Type(ty))
    }

    pub fn arg_type_with_name_hint(self, ty: &'a Type<'a>, name: &'a IdentifierInfo<'a>) -> Self {
        self.arg(DiagArg::TypeWithNameHint(ty, name))
    }

    /// Renders the diagnostic and updates the counters.
    pub fn flush(self) {
        self.engine.emit(&self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bumpalo::Bump;
    use crate::intern::IdentifierTable;
    use crate::types::TypeCtx;
    use std::sync::{Arc, Mutex};

    /// A sink the test can read back after the engine wrote into it.
    #[derive(Clone, Default)]
    struct SharedSink(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedSink {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    fn engine_with_sink(options: DiagOptions) -> (DiagEngine, SharedSink) {
        let sink = SharedSink::default();
        let engine = DiagEngine::with_sink(options, Box::new(sink.clone()));
        (engine, sink)
    }

    #[test]
    fn test_format_char_args() {
        assert_eq!(format_message("{0}", &[DiagArg::Char('=')], false), "=");
        assert_eq!(
            format_message("{0}", &[DiagArg::Char('\x03')], false),
            "\\x03"
        );
    }

    #[test]
    fn test_format_int_and_str_args() {
        assert_eq!(format_message("{0}", &[DiagArg::Int(42)], false), "42");
        assert_eq!(format_message("{0}", &[DiagArg::Str("foo")], false), "foo");
    }

    #[test]
    fn test_format_tok_kind_args() {
        assert_eq!(
            format_message("{0}", &[DiagArg::TokKind(TokenKind::LParen)], false),
            "("
        );
        assert_eq!(
            format_message("{0}", &[DiagArg::TokKind(TokenKind::Eof)], false),
            "EOF"
        );
    }

    #[test]
    fn test_format_type_args() {
        let arena = Bump::new();
        let types = TypeCtx::new(&arena);
        let func = types.function(types.i32(), &[types.bool(), types.f32()]);
        assert_eq!(
            format_message("{0}", &[DiagArg::Type(func)], false),
            "fn (bool, f32) -> i32"
        );
        assert_eq!(
            format_message("{0}", &[DiagArg::Type(types.paren(types.i32()))], false),
            "i32"
        );
    }

    #[test]
    fn test_format_type_with_name_hint() {
        let arena = Bump::new();
        let types = TypeCtx::new(&arena);
        let idents = IdentifierTable::new(&arena);
        let name = idents.lookup("foo");
        let func = types.function(types.i32(), &[types.bool()]);
        assert_eq!(
            format_message("{0}", &[DiagArg::TypeWithNameHint(func, name)], false),
            "fn foo(bool) -> i32"
        );
        let proc = types.function(types.void(), &[]);
        assert_eq!(
            format_message("{0}", &[DiagArg::TypeWithNameHint(proc, name)], false),
            "fn foo()"
        );
    }

    #[test]
    fn test_plural_s() {
        let args = [DiagArg::Int(2), DiagArg::Int(1), DiagArg::Int(0)];
        assert_eq!(format_message("%0s %1s %2s", &args, false), "s  ");
    }

    #[test]
    fn test_quote_emphasis() {
        assert_eq!(
            format_message("<%foo%>", &[], true),
            "\x1b[1m'foo'\x1b[0m"
        );
        assert_eq!(format_message("<%foo%>", &[], false), "'foo'");
    }

    #[test]
    fn test_args_render_in_template_order() {
        let args = [DiagArg::Int(42), DiagArg::Str("bar")];
        assert_eq!(
            format_message("{1} {0} {1} {0}", &args, false),
            "bar 42 bar 42"
        );
    }

    #[test]
    fn test_emitted_header_and_counts() {
        let (engine, sink) = engine_with_sink(DiagOptions::default());
        let file = SourceFile::new("main.rl", "let x = $;\n");
        engine.set_source_file(file);

        engine
            .diag_at(DiagKind::ErrUnknownCharacter, 8)
            .arg_char('$')
            .flush();

        let out = sink.contents();
        assert_eq!(out, "main.rl:1:9: error: unknown character '$'\n");
        assert_eq!(engine.count(Severity::Error), 1);
        assert_eq!(engine.error_count(), 1);
    }

    #[test]
    fn test_no_escape_bytes_without_color() {
        let (engine, sink) = engine_with_sink(DiagOptions::default());
        let file = SourceFile::new("main.rl", "let x = $;\n");
        engine.set_source_file(file);
        engine
            .diag_at(DiagKind::ErrUnknownCharacter, 8)
            .arg_char('$')
            .caret_range(8)
            .flush();
        assert!(!sink.contents().contains('\x1b'));
    }

    #[test]
    fn test_source_excerpt_markers() {
        let (engine, sink) = engine_with_sink(DiagOptions::default());
        let file = SourceFile::new("t.rl", "let xyz = 1;\n");
        file.add_line(13);
        engine.set_source_file(file);

        engine
            .diag_at(DiagKind::ErrUnexpectedTok, 4)
            .arg_tok(TokenKind::Identifier)
            .range(SourceRange::new(4, 7))
            .flush();

        let out = sink.contents();
        assert!(out.contains("    1 | let xyz = 1;\n"));
        assert!(out.contains("      |     ~~~\n"), "got: {out}");
    }

    #[test]
    fn test_caret_marker() {
        let (engine, sink) = engine_with_sink(DiagOptions::default());
        let file = SourceFile::new("t.rl", "a + b\n");
        engine.set_source_file(file);

        engine
            .diag_at(DiagKind::ErrExpectedExpr, 2)
            .caret_range(2)
            .flush();

        assert!(sink.contents().contains("      |   ^\n"));
    }

    #[test]
    fn test_multi_line_range_with_elision() {
        let source = "line one\nline two\nline three\nline four\nline five\n";
        let file = SourceFile::new("t.rl", source);
        // Offsets just past each newline.
        let mut pos = 0u32;
        for line in source.split_inclusive('\n') {
            pos += line.len() as u32;
            file.add_line(pos);
        }

        let (engine, sink) = engine_with_sink(DiagOptions::default());
        engine.set_source_file(file);

        engine
            .diag_at(DiagKind::ErrExpectedExpr, 0)
            .range(SourceRange::new(0, 4))
            .range(SourceRange::new(40, 44))
            .flush();

        let out = sink.contents();
        assert!(out.contains("    1 | line one\n"));
        assert!(out.contains("    5 | line five\n"));
        assert!(out.contains("  ... |\n"), "got: {out}");
    }

    #[test]
    fn test_warning_promotion() {
        let mut options = DiagOptions::default();
        options.warnings_as_errors = true;
        let (engine, sink) = engine_with_sink(options);
        let file = SourceFile::new("t.rl", "x = 1\n");
        engine.set_source_file(file);

        engine
            .diag_at(DiagKind::WarnAssignInCondition, 2)
            .arg_str("=")
            .arg_str("==")
            .flush();

        assert!(sink.contents().contains("error: "));
        assert_eq!(engine.count(Severity::Warning), 0);
        assert_eq!(engine.count(Severity::Error), 1);
    }

    #[test]
    fn test_warning_silencing() {
        let mut options = DiagOptions::default();
        options.ignore_warnings = true;
        let (engine, sink) = engine_with_sink(options);
        let file = SourceFile::new("t.rl", "x = 1\n");
        engine.set_source_file(file);

        engine
            .diag_at(DiagKind::WarnAssignInCondition, 2)
            .arg_str("=")
            .arg_str("==")
            .flush();

        assert!(sink.contents().is_empty());
        assert_eq!(engine.count(Severity::Warning), 0);
    }

    #[test]
    fn test_column_origin_zero() {
        let mut options = DiagOptions::default();
        options.column_origin = 0;
        let (engine, sink) = engine_with_sink(options);
        let file = SourceFile::new("t.rl", "abc\n");
        engine.set_source_file(file);
        engine.diag_at(DiagKind::ErrExpectedExpr, 2).flush();
        assert!(sink.contents().starts_with("t.rl:1:2: "));
    }

    #[test]
    fn test_hidden_column() {
        let mut options = DiagOptions::default();
        options.show_column = false;
        let (engine, sink) = engine_with_sink(options);
        let file = SourceFile::new("t.rl", "abc\n");
        engine.set_source_file(file);
        engine.diag_at(DiagKind::ErrExpectedExpr, 2).flush();
        assert!(sink.contents().starts_with("t.rl:1: "));
    }
}
