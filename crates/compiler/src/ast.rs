//! Abstract syntax tree
//!
//! Two node families: statements (expressions are statements) and
//! declarations. Every node is allocated from the compilation arena and child
//! edges are plain borrows; the tree has no cycles. Expressions additionally
//! carry their resolved type and a value category. Fields that are only known
//! after a node has been created (function bodies, loop bodies, struct
//! back-pointers, usage flags) sit behind `Cell`s.

use std::cell::Cell;

use crate::intern::IdentifierInfo;
use crate::source::{SourceLocation, SourceRange};
use crate::types::Type;

/// Whether an expression designates storage (lvalue) or is a pure value
/// (rvalue).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueCategory {
    LValue,
    RValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-x`
    Neg,
    /// `!x`
    Not,
    /// `&x`
    AddressOf,
    /// `*x`
    Deref,
}

impl UnaryOp {
    pub fn spelling(self) -> char {
        match self {
            UnaryOp::Neg => '-',
            UnaryOp::Not => '!',
            UnaryOp::AddressOf => '&',
            UnaryOp::Deref => '*',
        }
    }
}

/// The closed set of binary operators, compound assignments included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Mul,
    Div,
    Mod,
    Add,
    Sub,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    Eq,
    Ne,
    BitAnd,
    BitXor,
    BitOr,
    LogAnd,
    LogOr,
    Assign,
    AssignMul,
    AssignDiv,
    AssignMod,
    AssignAdd,
    AssignSub,
    AssignShl,
    AssignShr,
    AssignBitAnd,
    AssignBitXor,
    AssignBitOr,
}

impl BinaryOp {
    pub fn spelling(self) -> &'static str {
        use BinaryOp::*;
        match self {
            Mul => "*",
            Div => "/",
            Mod => "%",
            Add => "+",
            Sub => "-",
            Shl => "<<",
            Shr => ">>",
            Lt => "<",
            Gt => ">",
            Le => "<=",
            Ge => ">=",
            Eq => "==",
            Ne => "!=",
            BitAnd => "&",
            BitXor => "^",
            BitOr => "|",
            LogAnd => "&&",
            LogOr => "||",
            Assign => "=",
            AssignMul => "*=",
            AssignDiv => "/=",
            AssignMod => "%=",
            AssignAdd => "+=",
            AssignSub => "-=",
            AssignShl => "<<=",
            AssignShr => ">>=",
            AssignBitAnd => "&=",
            AssignBitXor => "^=",
            AssignBitOr => "|=",
        }
    }

    pub fn is_assignment(self) -> bool {
        use BinaryOp::*;
        matches!(
            self,
            Assign
                | AssignMul
                | AssignDiv
                | AssignMod
                | AssignAdd
                | AssignSub
                | AssignShl
                | AssignShr
                | AssignBitAnd
                | AssignBitXor
                | AssignBitOr
        )
    }
}

/// Classification of an explicit `as` cast, assigned by sema from the
/// (source, target) type pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    /// Same canonical type, or a sign reinterpretation of the same width.
    Noop,
    IntToInt,
    IntToFloat,
    FloatToInt,
    FloatToFloat,
    BoolToInt,
    BoolToFloat,
    /// The pair is not castable; a diagnostic has been emitted.
    Invalid,
}

/// A copyable reference to any declaration.
#[derive(Debug, Clone, Copy)]
pub enum DeclRef<'a> {
    Var(&'a VarDecl<'a>),
    Param(&'a ParamDecl<'a>),
    Function(&'a FunctionDecl<'a>),
    Struct(&'a StructDecl<'a>),
    Field(&'a FieldDecl<'a>),
}

impl<'a> DeclRef<'a> {
    pub fn name(self) -> &'a IdentifierInfo<'a> {
        match self {
            DeclRef::Var(d) => d.name,
            DeclRef::Param(d) => d.name,
            DeclRef::Function(d) => d.name,
            DeclRef::Struct(d) => d.name,
            DeclRef::Field(d) => d.name,
        }
    }

    pub fn ty(self) -> &'a Type<'a> {
        match self {
            DeclRef::Var(d) => d.ty,
            DeclRef::Param(d) => d.ty,
            DeclRef::Function(d) => d.ty,
            DeclRef::Struct(d) => d.ty.get().expect("struct type not installed"),
            DeclRef::Field(d) => d.ty,
        }
    }

    pub fn mark_used(self) {
        match self {
            DeclRef::Var(d) => d.used.set(true),
            DeclRef::Param(d) => d.used.set(true),
            DeclRef::Function(d) => d.used.set(true),
            DeclRef::Struct(_) | DeclRef::Field(_) => {}
        }
    }

    /// Identity comparison on the underlying declaration.
    pub fn same_decl(self, other: DeclRef<'a>) -> bool {
        fn p<T>(r: &T) -> usize {
            r as *const T as usize
        }
        match (self, other) {
            (DeclRef::Var(a), DeclRef::Var(b)) => p(a) == p(b),
            (DeclRef::Param(a), DeclRef::Param(b)) => p(a) == p(b),
            (DeclRef::Function(a), DeclRef::Function(b)) => p(a) == p(b),
            (DeclRef::Struct(a), DeclRef::Struct(b)) => p(a) == p(b),
            (DeclRef::Field(a), DeclRef::Field(b)) => p(a) == p(b),
            _ => false,
        }
    }
}

/// A local variable declaration introduced by `let`.
#[derive(Debug)]
pub struct VarDecl<'a> {
    pub name: &'a IdentifierInfo<'a>,
    pub name_range: SourceRange,
    pub ty: &'a Type<'a>,
    pub init: Option<&'a Expr<'a>>,
    pub used: Cell<bool>,
}

/// A function parameter, possibly carrying a default expression.
#[derive(Debug)]
pub struct ParamDecl<'a> {
    pub name: &'a IdentifierInfo<'a>,
    pub name_range: SourceRange,
    pub ty: &'a Type<'a>,
    /// Rewritten to an rvalue at function-declaration time.
    pub default: Cell<Option<&'a Expr<'a>>>,
    pub used: Cell<bool>,
}

#[derive(Debug)]
pub struct FunctionDecl<'a> {
    pub name: &'a IdentifierInfo<'a>,
    pub name_range: SourceRange,
    /// The uniqued function type.
    pub ty: &'a Type<'a>,
    pub params: &'a [&'a ParamDecl<'a>],
    /// Number of parameters without a default; the minimum a call must
    /// supply.
    pub required_param_count: usize,
    pub body: Cell<Option<&'a Stmt<'a>>>,
    pub is_extern: Cell<bool>,
    /// ABI string of an `extern "ABI"` declaration, kept for the backend.
    pub abi: Cell<Option<&'a str>>,
    pub used: Cell<bool>,
    pub range: Cell<SourceRange>,
}

#[derive(Debug)]
pub struct FieldDecl<'a> {
    pub name: &'a IdentifierInfo<'a>,
    pub name_range: SourceRange,
    pub ty: &'a Type<'a>,
    pub parent: Cell<Option<&'a StructDecl<'a>>>,
    /// Index of this field in the parent's field list, in source order.
    pub index: Cell<usize>,
}

#[derive(Debug)]
pub struct StructDecl<'a> {
    pub name: &'a IdentifierInfo<'a>,
    pub name_range: SourceRange,
    /// The tag type; installed right after the declaration is created.
    pub ty: Cell<Option<&'a Type<'a>>>,
    pub fields: &'a [&'a FieldDecl<'a>],
    pub range: SourceRange,
}

impl<'a> StructDecl<'a> {
    /// Source-order linear search, the way field counts stay small.
    pub fn find_field(&self, name: &'a IdentifierInfo<'a>) -> Option<&'a FieldDecl<'a>> {
        self.fields
            .iter()
            .find(|f| crate::intern::same_identifier(f.name, name))
            .copied()
    }
}

/// A top-level declaration of a translation unit.
#[derive(Debug, Clone, Copy)]
pub enum TopLevelDecl<'a> {
    Function(&'a FunctionDecl<'a>),
    Struct(&'a StructDecl<'a>),
}

/// One initialized field of a struct expression.
#[derive(Debug, Clone, Copy)]
pub struct StructFieldInit<'a> {
    pub field: &'a FieldDecl<'a>,
    pub value: &'a Expr<'a>,
}

#[derive(Debug, Clone, Copy)]
pub enum ExprKind<'a> {
    BoolLiteral(bool),
    IntLiteral(u64),
    FloatLiteral(f64),
    Paren(&'a Expr<'a>),
    DeclRef(DeclRef<'a>),
    Unary {
        op: UnaryOp,
        op_loc: SourceLocation,
        sub: &'a Expr<'a>,
    },
    Binary {
        op: BinaryOp,
        op_loc: SourceLocation,
        lhs: &'a Expr<'a>,
        rhs: &'a Expr<'a>,
    },
    Call {
        callee: &'a Expr<'a>,
        /// Provided arguments plus substituted defaults; length always equals
        /// the callee's parameter count.
        args: &'a [&'a Expr<'a>],
    },
    Member {
        base: &'a Expr<'a>,
        field: &'a FieldDecl<'a>,
    },
    Cast {
        sub: &'a Expr<'a>,
        cast_kind: CastKind,
    },
    /// Implicit lvalue-to-rvalue conversion; only sema creates these.
    LValueToRValue(&'a Expr<'a>),
    StructExpr {
        decl: &'a StructDecl<'a>,
        fields: &'a [StructFieldInit<'a>],
    },
}

#[derive(Debug)]
pub struct Expr<'a> {
    pub kind: ExprKind<'a>,
    pub ty: &'a Type<'a>,
    pub category: ValueCategory,
    pub range: SourceRange,
}

impl<'a> Expr<'a> {
    pub fn is_rvalue(&self) -> bool {
        self.category == ValueCategory::RValue
    }

    pub fn is_lvalue(&self) -> bool {
        self.category == ValueCategory::LValue
    }

    /// The expression with any parentheses stripped.
    pub fn ignore_parens(&'a self) -> &'a Expr<'a> {
        match self.kind {
            ExprKind::Paren(sub) => sub.ignore_parens(),
            _ => self,
        }
    }

    /// The declaration referenced by this expression, looking through
    /// parentheses; `((foo))` yields the declaration of `foo`.
    pub fn referenced_decl(&'a self) -> Option<DeclRef<'a>> {
        match self.ignore_parens().kind {
            ExprKind::DeclRef(decl) => Some(decl),
            _ => None,
        }
    }
}

/// A `while` statement. The node is created before its body is parsed so
/// `break`/`continue` inside the body can already reference it; the fields
/// are filled in once the body has been analyzed.
#[derive(Debug)]
pub struct WhileStmt<'a> {
    pub cond: Cell<Option<&'a Expr<'a>>>,
    pub body: Cell<Option<&'a Stmt<'a>>>,
}

/// An infinite `loop` statement; same construction protocol as `while`.
#[derive(Debug)]
pub struct LoopStmt<'a> {
    pub body: Cell<Option<&'a Stmt<'a>>>,
}

/// The loop a `break` or `continue` resolves to.
#[derive(Debug, Clone, Copy)]
pub enum LoopTarget<'a> {
    While(&'a WhileStmt<'a>),
    Loop(&'a LoopStmt<'a>),
}

impl<'a> LoopTarget<'a> {
    pub fn same_loop(self, other: LoopTarget<'a>) -> bool {
        match (self, other) {
            (LoopTarget::While(a), LoopTarget::While(b)) => std::ptr::eq(a, b),
            (LoopTarget::Loop(a), LoopTarget::Loop(b)) => std::ptr::eq(a, b),
            _ => false,
        }
    }
}

#[derive(Debug)]
pub enum StmtKind<'a> {
    Compound {
        stmts: &'a [&'a Stmt<'a>],
    },
    Let {
        decls: &'a [&'a VarDecl<'a>],
    },
    Break {
        target: LoopTarget<'a>,
    },
    Continue {
        target: LoopTarget<'a>,
    },
    Return {
        value: Option<&'a Expr<'a>>,
    },
    If {
        cond: &'a Expr<'a>,
        then_stmt: &'a Stmt<'a>,
        else_stmt: Option<&'a Stmt<'a>>,
    },
    While(WhileStmt<'a>),
    Loop(LoopStmt<'a>),
    Assert {
        cond: &'a Expr<'a>,
    },
    Expr(&'a Expr<'a>),
}

#[derive(Debug)]
pub struct Stmt<'a> {
    pub kind: StmtKind<'a>,
    range: Cell<SourceRange>,
}

impl<'a> Stmt<'a> {
    pub fn new(kind: StmtKind<'a>, range: SourceRange) -> Self {
        Stmt {
            kind,
            range: Cell::new(range),
        }
    }

    pub fn range(&self) -> SourceRange {
        self.range.get()
    }

    pub fn set_range(&self, range: SourceRange) {
        self.range.set(range);
    }
}

/// The root of a fully analyzed source file.
#[derive(Debug)]
pub struct TranslationUnit<'a> {
    pub decls: &'a [TopLevelDecl<'a>],
    pub range: SourceRange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binop_spellings() {
        assert_eq!(BinaryOp::Add.spelling(), "+");
        assert_eq!(BinaryOp::AssignShr.spelling(), ">>=");
        assert_eq!(BinaryOp::LogAnd.spelling(), "&&");
    }

    #[test]
    fn test_binop_assignment_classification() {
        assert!(BinaryOp::Assign.is_assignment());
        assert!(BinaryOp::AssignBitOr.is_assignment());
        assert!(!BinaryOp::Eq.is_assignment());
        assert!(!BinaryOp::Add.is_assignment());
    }

    #[test]
    fn test_unary_spellings() {
        assert_eq!(UnaryOp::Neg.spelling(), '-');
        assert_eq!(UnaryOp::Deref.spelling(), '*');
    }
}
