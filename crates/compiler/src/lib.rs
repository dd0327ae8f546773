//! Rill compiler front-end
//!
//! The pipeline runs from source text to a fully type-checked, fully
//! elaborated AST: lexing (with identifier interning and line-map
//! maintenance), literal decoding, recursive-descent parsing, and semantic
//! analysis through the parser's callback interface. Every diagnostic flows
//! through the [`diag::DiagEngine`]. A backend consuming the resulting
//! translation unit and type context is deliberately out of scope here.
//!
//! ```rust,ignore
//! use rillc::{check_file, Options};
//!
//! let options = Options::new();
//! let outcome = check_file(std::path::Path::new("main.rl"), &options)?;
//! std::process::exit(if outcome.has_errors() { 1 } else { 0 });
//! ```

pub mod ast;
pub mod config;
pub mod diag;
pub mod intern;
pub mod interp;
pub mod lexer;
pub mod literal;
pub mod parser;
pub mod scope;
pub mod sema;
pub mod source;
pub mod token;
pub mod types;

use std::io::Write;
use std::path::Path;
use std::rc::Rc;

use bumpalo::Bump;
use tracing::debug;

pub use config::{OptimizationLevel, Options, ProjectConfig};
pub use diag::{DiagEngine, DiagKind, DiagOptions, Severity};
pub use interp::{Interpreter, Value};
pub use lexer::Lexer;
pub use parser::Parser;
pub use sema::Sema;
pub use source::{SourceFile, SourceLocation, SourceRange};
pub use types::TypeCtx;

/// What a front-end run produced, counters-wise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckOutcome {
    pub errors: u32,
    pub warnings: u32,
    pub notes: u32,
    /// Number of top-level declarations that survived analysis.
    pub decl_count: usize,
}

impl CheckOutcome {
    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

/// Runs the front-end over an already loaded source buffer, writing
/// diagnostics to `sink`.
pub fn check_source_with_sink(
    filename: &str,
    text: &str,
    options: &Options,
    sink: Box<dyn Write>,
) -> CheckOutcome {
    let file = SourceFile::new(filename, text);
    let engine = DiagEngine::with_sink(options.diagnostics.clone(), sink);
    run_front_end(file, &engine, options)
}

/// Runs the front-end over an already loaded source buffer, writing
/// diagnostics to stderr.
pub fn check_source(filename: &str, text: &str, options: &Options) -> CheckOutcome {
    let file = SourceFile::new(filename, text);
    let engine = DiagEngine::new(options.diagnostics.clone());
    run_front_end(file, &engine, options)
}

/// Loads and checks one translation unit.
pub fn check_file(path: &Path, options: &Options) -> std::io::Result<CheckOutcome> {
    let file = SourceFile::open(path)?;
    let engine = DiagEngine::new(options.diagnostics.clone());
    Ok(run_front_end(file, &engine, options))
}

fn run_front_end(file: Rc<SourceFile>, engine: &DiagEngine, options: &Options) -> CheckOutcome {
    debug!(file = %file.filename().display(), "checking translation unit");
    engine.set_source_file(file.clone());

    let arena = Bump::new();
    let types = TypeCtx::new(&arena);
    let idents = intern::IdentifierTable::new(&arena);
    idents.register_keywords();

    let mut lexer = Lexer::new(file, &idents, engine);
    lexer.keep_comments = options.keep_comments;

    let sema = Sema::new(&arena, &types, engine);
    let mut parser = Parser::new(lexer, sema);
    let unit = parser.parse();

    debug!(
        decls = unit.decls.len(),
        errors = engine.error_count(),
        "front-end finished"
    );

    CheckOutcome {
        errors: engine.error_count(),
        warnings: engine.count(Severity::Warning),
        notes: engine.count(Severity::Note),
        decl_count: unit.decls.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(source: &str) -> CheckOutcome {
        check_source_with_sink("test.rl", source, &Options::new(), Box::new(Vec::new()))
    }

    #[test]
    fn test_clean_program_has_no_diagnostics() {
        let outcome = check(
            "fn add(a: i32, b: i32) -> i32 {\n\
             \x20   return a + b;\n\
             }\n\
             fn main() {\n\
             \x20   let x = add(1, 2);\n\
             \x20   assert x == 3;\n\
             }\n",
        );
        assert_eq!(outcome.errors, 0);
        assert_eq!(outcome.warnings, 0);
        assert_eq!(outcome.decl_count, 2);
    }

    #[test]
    fn test_type_error_is_counted() {
        let outcome = check("fn main() { let x: bool = 3; }\n");
        assert!(outcome.has_errors());
    }

    #[test]
    fn test_struct_program() {
        let outcome = check(
            "struct Point { x: i32, y: i32 }\n\
             fn norm2(p: Point) -> i32 {\n\
             \x20   return p.x * p.x + p.y * p.y;\n\
             }\n",
        );
        assert_eq!(outcome.errors, 0);
        assert_eq!(outcome.decl_count, 2);
    }

    #[test]
    fn test_extern_function() {
        let outcome = check("extern \"C\" fn putchar(c: i32) -> i32;\n");
        assert_eq!(outcome.errors, 0);
        assert_eq!(outcome.decl_count, 1);
    }

    #[test]
    fn test_check_file_from_disk() {
        use std::io::Write as _;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "fn main() {{ let x = 1 + 2; }}\n").unwrap();
        file.flush().unwrap();

        let outcome = check_file(file.path(), &Options::new()).unwrap();
        assert!(!outcome.has_errors());
        assert_eq!(outcome.decl_count, 1);
    }

    #[test]
    fn test_check_file_missing_input() {
        let result = check_file(Path::new("no/such/file.rl"), &Options::new());
        assert!(result.is_err());
    }
}
