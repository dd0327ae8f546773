//! Semantic analyzer
//!
//! Sema is driven through a callback API: the parser never builds AST nodes
//! itself, every production ends in one of the `act_on_*` methods here, which
//! resolves names, checks types, inserts the implicit lvalue-to-rvalue
//! conversions and allocates the node. Each callback returns `None` when the
//! construct is unusable; a diagnostic has already been emitted and callers
//! tolerate the `None` silently.

use bumpalo::Bump;

use crate::ast::*;
use crate::diag::{DiagEngine, DiagKind};
use crate::intern::IdentifierInfo;
use crate::scope::{ScopeFlags, ScopeStack, Symbol};
use crate::source::{SourceLocation, SourceRange};
use crate::token::{FloatSuffix, IntSuffix};
use crate::types::{Type, TypeCtx, TypeKind, same_type};

/// An identifier together with where it was spelled.
#[derive(Debug, Clone, Copy)]
pub struct LocatedIdent<'a> {
    pub ident: &'a IdentifierInfo<'a>,
    pub range: SourceRange,
}

pub struct Sema<'a, 'd> {
    arena: &'a Bump,
    types: &'a TypeCtx<'a>,
    diag: &'d DiagEngine,
    scopes: ScopeStack<'a>,
    /// The function type of the function whose body is being analyzed.
    curr_func_ty: Option<&'a Type<'a>>,
    /// Loop statements created by `act_before_*_stmt_body`, waiting for
    /// their bodies.
    pending_loops: Vec<&'a Stmt<'a>>,
    /// Set while a parameter default expression is being analyzed;
    /// references to sibling parameters are rejected in that window.
    in_default_arg: bool,
}

impl<'a, 'd> Sema<'a, 'd> {
    pub fn new(arena: &'a Bump, types: &'a TypeCtx<'a>, diag: &'d DiagEngine) -> Self {
        Sema {
            arena,
            types,
            diag,
            scopes: ScopeStack::new(),
            curr_func_ty: None,
            pending_loops: Vec::new(),
            in_default_arg: false,
        }
    }

    pub fn types(&self) -> &'a TypeCtx<'a> {
        self.types
    }

    pub fn diag(&self) -> &'d DiagEngine {
        self.diag
    }

    /// Copies a string into the compilation arena.
    pub fn alloc_str(&self, s: &str) -> &'a str {
        self.arena.alloc_str(s)
    }

    pub fn push_scope(&mut self, flags: ScopeFlags) {
        self.scopes.push(flags);
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn lookup(&self, name: &'a IdentifierInfo<'a>) -> Option<Symbol<'a>> {
        self.scopes.lookup(name)
    }

    pub fn local_lookup(&self, name: &'a IdentifierInfo<'a>) -> Option<Symbol<'a>> {
        self.scopes.local_lookup(name)
    }

    pub fn set_in_default_arg(&mut self, value: bool) {
        self.in_default_arg = value;
    }

    /// Resolves a type name. Builtin types are keywords and never reach this
    /// point. Unresolved names are diagnosed and yield an `unknown` type so
    /// parsing can continue.
    pub fn lookup_type(&self, name: LocatedIdent<'a>) -> &'a Type<'a> {
        if let Some(symbol) = self.scopes.lookup(name.ident) {
            if let DeclRef::Struct(decl) = symbol.decl {
                return decl.ty.get().expect("struct type not installed");
            }
        }

        self.diag
            .diag_at(DiagKind::ErrTypeUnknown, name.range.begin)
            .arg_ident(name.ident)
            .range(name.range)
            .flush();
        self.types.unknown(name.ident)
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn alloc_expr(
        &self,
        kind: ExprKind<'a>,
        ty: &'a Type<'a>,
        category: ValueCategory,
        range: SourceRange,
    ) -> &'a Expr<'a> {
        self.arena.alloc(Expr {
            kind,
            ty,
            category,
            range,
        })
    }

    fn alloc_stmt(&self, kind: StmtKind<'a>, range: SourceRange) -> &'a Stmt<'a> {
        self.arena.alloc(Stmt::new(kind, range))
    }

    /// Wraps an lvalue in an implicit lvalue-to-rvalue conversion; rvalues
    /// pass through untouched. This is the only implicit conversion sema
    /// ever materializes.
    fn convert_to_rvalue(&self, expr: &'a Expr<'a>) -> &'a Expr<'a> {
        if expr.is_rvalue() {
            return expr;
        }
        self.alloc_expr(
            ExprKind::LValueToRValue(expr),
            expr.ty,
            ValueCategory::RValue,
            expr.range,
        )
    }

    /// Implicit compatibility: canonical equality, or a generic arithmetic
    /// placeholder paired with a concrete type of the same family.
    fn compatible(&self, from: &'a Type<'a>, to: &'a Type<'a>) -> bool {
        if same_type(from, to) {
            return true;
        }
        if (from.is_generic_int() && to.is_int()) || (to.is_generic_int() && from.is_int()) {
            return true;
        }
        if (from.is_generic_float() && to.is_float()) || (to.is_generic_float() && from.is_float())
        {
            return true;
        }
        false
    }

    fn expected_type_diag(&self, expected: &'a Type<'a>, found: &'a Type<'a>, range: SourceRange) {
        self.diag
            .diag_at(DiagKind::ErrExpectedType, range.begin)
            .arg_type(expected)
            .arg_type(found)
            .range(range)
            .flush();
    }

    // ------------------------------------------------------------------
    // Literals
    // ------------------------------------------------------------------

    pub fn act_on_bool_literal(&self, value: bool, range: SourceRange) -> Option<&'a Expr<'a>> {
        Some(self.alloc_expr(
            ExprKind::BoolLiteral(value),
            self.types.bool(),
            ValueCategory::RValue,
            range,
        ))
    }

    /// The type selected by an integer literal suffix. Without a suffix, the
    /// smallest of `i32`, `i64`, `u64` that can hold the value; `generic-int`
    /// as a last resort.
    pub fn type_for_int_suffix(&self, suffix: IntSuffix, value: u64) -> &'a Type<'a> {
        match suffix {
            IntSuffix::I8 => self.types.i8(),
            IntSuffix::I16 => self.types.i16(),
            IntSuffix::I32 => self.types.i32(),
            IntSuffix::I64 => self.types.i64(),
            IntSuffix::U8 => self.types.u8(),
            IntSuffix::U16 => self.types.u16(),
            IntSuffix::U32 => self.types.u32(),
            IntSuffix::U64 => self.types.u64(),
            IntSuffix::None => {
                if value <= i32::MAX as u64 {
                    self.types.i32()
                } else if value <= i64::MAX as u64 {
                    self.types.i64()
                } else {
                    self.types.u64()
                }
            }
        }
    }

    fn int_type_max(&self, ty: &'a Type<'a>) -> u64 {
        match ty.canonical().kind() {
            TypeKind::I8 => i8::MAX as u64,
            TypeKind::I16 => i16::MAX as u64,
            TypeKind::I32 => i32::MAX as u64,
            TypeKind::I64 => i64::MAX as u64,
            TypeKind::U8 => u8::MAX as u64,
            TypeKind::U16 => u16::MAX as u64,
            TypeKind::U32 => u32::MAX as u64,
            TypeKind::U64 => u64::MAX,
            TypeKind::GenericInt => u64::MAX,
            _ => unreachable!("int literal must have an integer type"),
        }
    }

    pub fn act_on_int_literal(
        &self,
        mut value: u64,
        suffix: IntSuffix,
        range: SourceRange,
    ) -> Option<&'a Expr<'a>> {
        let ty = self.type_for_int_suffix(suffix, value);
        if value > self.int_type_max(ty) {
            self.diag
                .diag_at(DiagKind::ErrIntLiteralTooLarge, range.begin)
                .arg_type(ty)
                .range(range)
                .flush();
            value = 0; // recover with a value in range
        }

        Some(self.alloc_expr(ExprKind::IntLiteral(value), ty, ValueCategory::RValue, range))
    }

    pub fn act_on_float_literal(
        &self,
        value: f64,
        suffix: FloatSuffix,
        range: SourceRange,
    ) -> Option<&'a Expr<'a>> {
        let ty = match suffix {
            FloatSuffix::F32 => self.types.f32(),
            FloatSuffix::F64 => self.types.f64(),
            FloatSuffix::None => self.types.generic_float(),
        };
        Some(self.alloc_expr(ExprKind::FloatLiteral(value), ty, ValueCategory::RValue, range))
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn act_on_paren_expr(
        &self,
        sub: Option<&'a Expr<'a>>,
        range: SourceRange,
    ) -> Option<&'a Expr<'a>> {
        let sub = sub?;
        Some(self.alloc_expr(ExprKind::Paren(sub), sub.ty, sub.category, range))
    }

    pub fn act_on_decl_ref_expr(&self, name: LocatedIdent<'a>) -> Option<&'a Expr<'a>> {
        let Some(symbol) = self.scopes.lookup(name.ident) else {
            self.diag
                .diag_at(DiagKind::ErrUseUndeclaredIdent, name.range.begin)
                .arg_ident(name.ident)
                .range(name.range)
                .flush();
            return None;
        };

        // Inside a default argument, sibling parameters are not in scope
        // yet; they live in the nearest parameter scope.
        if self.in_default_arg {
            if let Some(param_depth) = self.scopes.find_with_flag(ScopeFlags::FUNC_PARAMS) {
                if symbol.scope_depth == param_depth {
                    self.diag
                        .diag_at(DiagKind::ErrDefaultArgRefParam, name.range.begin)
                        .arg_ident(name.ident)
                        .range(name.range)
                        .flush();
                }
            }
        }

        symbol.decl.mark_used();
        Some(self.alloc_expr(
            ExprKind::DeclRef(symbol.decl),
            symbol.decl.ty(),
            ValueCategory::LValue,
            name.range,
        ))
    }

    pub fn act_on_unary_expr(
        &self,
        sub: Option<&'a Expr<'a>>,
        op: UnaryOp,
        range: SourceRange,
        op_loc: SourceLocation,
    ) -> Option<&'a Expr<'a>> {
        let sub = sub?;
        let sub_ty = sub.ty;

        let cannot_apply = || {
            self.diag
                .diag_at(DiagKind::ErrCannotApplyUnaryOp, op_loc)
                .arg_char(op.spelling())
                .arg_type(sub_ty)
                .range(sub.range)
                .flush();
        };

        let (sub, ty, category) = match op {
            UnaryOp::Neg => {
                if !sub_ty.is_float() && !sub_ty.is_signed_int() {
                    cannot_apply();
                    return None;
                }
                (self.convert_to_rvalue(sub), sub_ty, ValueCategory::RValue)
            }
            UnaryOp::Not => {
                if !sub_ty.is_bool() && !sub_ty.is_int() {
                    cannot_apply();
                    return None;
                }
                (self.convert_to_rvalue(sub), sub_ty, ValueCategory::RValue)
            }
            UnaryOp::AddressOf => {
                if sub.is_rvalue() {
                    self.diag
                        .diag_at(DiagKind::ErrCouldNotTakeAddrRvalue, op_loc)
                        .arg_type(sub_ty)
                        .range(sub.range)
                        .flush();
                    return None;
                }
                (sub, self.types.pointer(sub_ty), ValueCategory::RValue)
            }
            UnaryOp::Deref => {
                let Some(pointee) = sub_ty.pointee() else {
                    self.diag
                        .diag_at(DiagKind::ErrIndirectionRequiresPtr, op_loc)
                        .arg_type(sub_ty)
                        .range(sub.range)
                        .flush();
                    return None;
                };
                (self.convert_to_rvalue(sub), pointee, ValueCategory::LValue)
            }
        };

        Some(self.alloc_expr(ExprKind::Unary { op, op_loc, sub }, ty, category, range))
    }

    pub fn act_on_binary_expr(
        &self,
        lhs: Option<&'a Expr<'a>>,
        rhs: Option<&'a Expr<'a>>,
        op: BinaryOp,
        range: SourceRange,
        op_loc: SourceLocation,
    ) -> Option<&'a Expr<'a>> {
        let lhs = lhs?;
        let rhs = rhs?;
        let lhs_ty = lhs.ty;
        let rhs_ty = rhs.ty;

        let result_ty = match op {
            BinaryOp::LogAnd | BinaryOp::LogOr => {
                if !lhs_ty.is_bool() {
                    self.expected_type_diag(self.types.bool(), lhs_ty, lhs.range);
                }
                if !rhs_ty.is_bool() {
                    self.expected_type_diag(self.types.bool(), rhs_ty, rhs.range);
                }
                self.types.bool()
            }

            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => {
                if !self.compatible(lhs_ty, rhs_ty) {
                    self.diag
                        .diag_at(DiagKind::ErrCannotApplyBinOpGeneric, op_loc)
                        .arg_str(op.spelling())
                        .arg_type(lhs_ty)
                        .arg_type(rhs_ty)
                        .range(lhs.range)
                        .range(rhs.range)
                        .caret_range(op_loc)
                        .flush();
                }
                self.types.bool()
            }

            BinaryOp::AssignShl
            | BinaryOp::AssignShr
            | BinaryOp::AssignBitAnd
            | BinaryOp::AssignBitXor
            | BinaryOp::AssignBitOr => {
                if !lhs_ty.is_int() {
                    self.diag
                        .diag_at(DiagKind::ErrCannotApplyAssignOp, op_loc)
                        .arg_str(op.spelling())
                        .arg_type(lhs_ty)
                        .caret_range(op_loc)
                        .flush();
                    self.types.generic_int() // dummy type to recover
                } else {
                    if !self.compatible(rhs_ty, lhs_ty) {
                        self.expected_type_diag(lhs_ty, rhs_ty, rhs.range);
                    }
                    lhs_ty
                }
            }

            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::BitAnd | BinaryOp::BitXor
            | BinaryOp::BitOr => {
                let mut result = lhs_ty;
                if !lhs_ty.is_int() {
                    self.expected_type_diag(self.types.generic_int(), lhs_ty, lhs.range);
                    result = self.types.generic_int();
                }
                if !rhs_ty.is_int() {
                    self.expected_type_diag(self.types.generic_int(), rhs_ty, rhs.range);
                }
                result
            }

            BinaryOp::Assign => {
                if !self.compatible(rhs_ty, lhs_ty) {
                    self.diag
                        .diag_at(DiagKind::ErrCannotApplyBinOpGeneric, op_loc)
                        .arg_str(op.spelling())
                        .arg_type(lhs_ty)
                        .arg_type(rhs_ty)
                        .range(lhs.range)
                        .range(rhs.range)
                        .caret_range(op_loc)
                        .flush();
                }
                lhs_ty
            }

            BinaryOp::Add
            | BinaryOp::Sub
            | BinaryOp::Mul
            | BinaryOp::Div
            | BinaryOp::Mod
            | BinaryOp::AssignAdd
            | BinaryOp::AssignSub
            | BinaryOp::AssignMul
            | BinaryOp::AssignDiv
            | BinaryOp::AssignMod => {
                if !self.compatible(lhs_ty, rhs_ty) || !lhs_ty.is_arithmetic() {
                    let kind = match op {
                        BinaryOp::Add => DiagKind::ErrCannotAdd,
                        BinaryOp::AssignAdd => DiagKind::ErrCannotAddAssign,
                        BinaryOp::Sub => DiagKind::ErrCannotSub,
                        BinaryOp::AssignSub => DiagKind::ErrCannotSubAssign,
                        BinaryOp::Mul => DiagKind::ErrCannotMul,
                        BinaryOp::AssignMul => DiagKind::ErrCannotMulAssign,
                        BinaryOp::Div => DiagKind::ErrCannotDiv,
                        BinaryOp::AssignDiv => DiagKind::ErrCannotDivAssign,
                        _ => DiagKind::ErrCannotApplyBinOpGeneric,
                    };

                    let mut d = self.diag.diag_at(kind, op_loc);
                    if kind == DiagKind::ErrCannotApplyBinOpGeneric {
                        d = d.arg_str(op.spelling());
                    }
                    d.arg_type(lhs_ty)
                        .arg_type(rhs_ty)
                        .range(lhs.range)
                        .range(rhs.range)
                        .caret_range(op_loc)
                        .flush();
                }
                lhs_ty
            }
        };

        // Assignments need somewhere to store into.
        if op.is_assignment() && !lhs.is_lvalue() {
            self.diag
                .diag_at(DiagKind::ErrCannotAssignToRvalue, op_loc)
                .range(lhs.range)
                .caret_range(op_loc)
                .flush();
            return None;
        }

        let rhs = self.convert_to_rvalue(rhs);
        let (lhs, category) = if op.is_assignment() {
            (lhs, ValueCategory::LValue)
        } else {
            (self.convert_to_rvalue(lhs), ValueCategory::RValue)
        };

        Some(self.alloc_expr(
            ExprKind::Binary {
                op,
                op_loc,
                lhs,
                rhs,
            },
            result_ty,
            category,
            range,
        ))
    }

    fn classify_cast(&self, from: &'a Type<'a>, to: &'a Type<'a>) -> CastKind {
        if same_type(from, to) {
            return CastKind::Noop;
        }

        if from.is_int() {
            if to.is_float() {
                CastKind::IntToFloat
            } else if to.is_int() {
                if from.bitwidth() == to.bitwidth() {
                    // Signed <-> unsigned reinterpretation of the same width.
                    CastKind::Noop
                } else {
                    CastKind::IntToInt
                }
            } else {
                CastKind::Invalid
            }
        } else if from.is_float() {
            if to.is_int() {
                CastKind::FloatToInt
            } else if to.is_float() {
                CastKind::FloatToFloat
            } else {
                CastKind::Invalid
            }
        } else if from.is_bool() {
            if to.is_int() {
                CastKind::BoolToInt
            } else if to.is_float() {
                CastKind::BoolToFloat
            } else {
                CastKind::Invalid
            }
        } else {
            CastKind::Invalid
        }
    }

    pub fn act_on_cast_expr(
        &self,
        sub: Option<&'a Expr<'a>>,
        target_ty: Option<&'a Type<'a>>,
        range: SourceRange,
        as_loc: SourceLocation,
    ) -> Option<&'a Expr<'a>> {
        let sub = sub?;
        let target_ty = target_ty?;

        let cast_kind = self.classify_cast(sub.ty, target_ty);
        if cast_kind == CastKind::Invalid {
            self.diag
                .diag_at(DiagKind::ErrUnsupportedConversion, as_loc)
                .arg_type(sub.ty)
                .arg_type(target_ty)
                .range(sub.range)
                .flush();
            return None;
        }

        Some(self.alloc_expr(
            ExprKind::Cast { sub, cast_kind },
            target_ty,
            sub.category,
            range,
        ))
    }

    fn check_call_args(
        &self,
        callee_decl: Option<&'a FunctionDecl<'a>>,
        callee_ty: &'a Type<'a>,
        callee_name_hint: Option<&'a IdentifierInfo<'a>>,
        args: &[Option<&'a Expr<'a>>],
        lparen_loc: SourceLocation,
    ) -> Option<Vec<&'a Expr<'a>>> {
        let (_, param_tys) = callee_ty.as_function().unwrap();

        let required = callee_decl.map_or(param_tys.len(), |d| d.required_param_count);
        if args.len() < required {
            let mut d = self.diag.diag_at(DiagKind::ErrTooFewArgs, lparen_loc);
            d = match callee_name_hint {
                Some(name) => d.arg_type_with_name_hint(callee_ty, name),
                None => d.arg_type(callee_ty),
            };
            d.arg_int(required as i64).caret_range(lparen_loc).flush();
            return None;
        }
        if args.len() > param_tys.len() {
            let mut d = self.diag.diag_at(DiagKind::ErrTooManyArgs, lparen_loc);
            d = match callee_name_hint {
                Some(name) => d.arg_type_with_name_hint(callee_ty, name),
                None => d.arg_type(callee_ty),
            };
            d.arg_int(param_tys.len() as i64)
                .caret_range(lparen_loc)
                .flush();
            return None;
        }

        let mut checked = Vec::with_capacity(param_tys.len());
        let mut has_error = false;
        for (arg, &param_ty) in args.iter().zip(param_tys) {
            let Some(arg) = arg else {
                has_error = true;
                continue;
            };
            if !self.compatible(arg.ty, param_ty) {
                self.expected_type_diag(param_ty, arg.ty, arg.range);
                has_error = true;
            }
            checked.push(self.convert_to_rvalue(arg));
        }

        if has_error { None } else { Some(checked) }
    }

    pub fn act_on_call_expr(
        &self,
        callee: Option<&'a Expr<'a>>,
        args: &[Option<&'a Expr<'a>>],
        range: SourceRange,
        lparen_loc: SourceLocation,
    ) -> Option<&'a Expr<'a>> {
        let callee = callee?;

        let callee_decl = match callee.referenced_decl() {
            Some(DeclRef::Function(decl)) => Some(decl),
            _ => None,
        };

        if !callee.ty.is_function() {
            let d = match callee.referenced_decl() {
                Some(decl) => self
                    .diag
                    .diag_at(DiagKind::ErrCannotBeUsedAsFunction, lparen_loc)
                    .arg_ident(decl.name()),
                None => self
                    .diag
                    .diag_at(DiagKind::ErrExprCannotBeUsedAsFunction, lparen_loc),
            };
            d.range(callee.range).caret_range(lparen_loc).flush();
            return None;
        }

        let mut checked = self.check_call_args(
            callee_decl,
            callee.ty,
            callee_decl.map(|d| d.name),
            args,
            lparen_loc,
        )?;

        // Fill the remaining positions with the callee's default expressions.
        let (ret_ty, param_tys) = callee.ty.as_function().unwrap();
        if checked.len() < param_tys.len() {
            let decl = callee_decl.expect("defaults require a known callee");
            for param in &decl.params[checked.len()..] {
                checked.push(param.default.get().expect("missing default expression"));
            }
        }

        let args = self.arena.alloc_slice_copy(&checked) as &'a [&'a Expr<'a>];
        Some(self.alloc_expr(
            ExprKind::Call { callee, args },
            ret_ty,
            ValueCategory::RValue,
            range,
        ))
    }

    pub fn act_on_member_expr(
        &self,
        base: Option<&'a Expr<'a>>,
        member: LocatedIdent<'a>,
        range: SourceRange,
        dot_loc: SourceLocation,
    ) -> Option<&'a Expr<'a>> {
        let base = base?;

        let Some(struct_decl) = base.ty.as_tag_decl() else {
            self.diag
                .diag_at(DiagKind::ErrMemberNotStruct, dot_loc)
                .arg_ident(member.ident)
                .caret_range(dot_loc)
                .flush();
            return None;
        };

        let Some(field) = struct_decl.find_field(member.ident) else {
            self.diag
                .diag_at(DiagKind::ErrNoMemberNamed, dot_loc)
                .arg_type(base.ty)
                .arg_ident(member.ident)
                .range(member.range)
                .flush();
            return None;
        };

        Some(self.alloc_expr(
            ExprKind::Member { base, field },
            field.ty,
            ValueCategory::LValue,
            range,
        ))
    }

    // ------------------------------------------------------------------
    // Struct expressions
    // ------------------------------------------------------------------

    pub fn resolve_struct_expr_name(&self, name: LocatedIdent<'a>) -> Option<&'a StructDecl<'a>> {
        match self.scopes.lookup(name.ident) {
            Some(Symbol {
                decl: DeclRef::Struct(decl),
                ..
            }) => Some(decl),
            Some(_) => {
                self.diag
                    .diag_at(DiagKind::ErrNotAStruct, name.range.begin)
                    .arg_ident(name.ident)
                    .range(name.range)
                    .flush();
                None
            }
            None => {
                self.diag
                    .diag_at(DiagKind::ErrUseUndeclaredIdent, name.range.begin)
                    .arg_ident(name.ident)
                    .range(name.range)
                    .flush();
                None
            }
        }
    }

    pub fn act_on_struct_field_expr(
        &self,
        struct_decl: Option<&'a StructDecl<'a>>,
        name: LocatedIdent<'a>,
        value: Option<&'a Expr<'a>>,
    ) -> Option<StructFieldInit<'a>> {
        let struct_decl = struct_decl?;

        let Some(field) = struct_decl.find_field(name.ident) else {
            self.diag
                .diag_at(DiagKind::ErrNoMemberNamed, name.range.begin)
                .arg_type(struct_decl.ty.get().expect("struct type not installed"))
                .arg_ident(name.ident)
                .range(name.range)
                .flush();
            return None;
        };

        // `Point { x }` is shorthand for `Point { x: x }`.
        let value = match value {
            Some(value) => value,
            None => self.act_on_decl_ref_expr(name)?,
        };

        if !self.compatible(value.ty, field.ty) {
            self.expected_type_diag(field.ty, value.ty, value.range);
            return None;
        }

        Some(StructFieldInit {
            field,
            value: self.convert_to_rvalue(value),
        })
    }

    pub fn act_on_struct_expr(
        &self,
        struct_decl: Option<&'a StructDecl<'a>>,
        fields: &[StructFieldInit<'a>],
        range: SourceRange,
    ) -> Option<&'a Expr<'a>> {
        let struct_decl = struct_decl?;
        let fields = self.arena.alloc_slice_copy(fields) as &'a [StructFieldInit<'a>];
        Some(self.alloc_expr(
            ExprKind::StructExpr {
                decl: struct_decl,
                fields,
            },
            struct_decl.ty.get().expect("struct type not installed"),
            ValueCategory::RValue,
            range,
        ))
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    pub fn act_on_var_decl(
        &mut self,
        ty: Option<&'a Type<'a>>,
        name: Option<LocatedIdent<'a>>,
        init: Option<&'a Expr<'a>>,
        _range: SourceRange,
    ) -> Option<&'a VarDecl<'a>> {
        let name = name?;

        if self.scopes.local_lookup(name.ident).is_some() {
            self.diag
                .diag_at(DiagKind::ErrRedeclarationVariable, name.range.begin)
                .arg_ident(name.ident)
                .range(name.range)
                .flush();
            return None;
        }

        let ty = match ty {
            Some(ty) => {
                if let Some(init) = init {
                    if !self.compatible(init.ty, ty) {
                        self.expected_type_diag(ty, init.ty, init.range);
                        return None;
                    }
                }
                ty
            }
            None => match init {
                Some(init) => init.ty,
                None => {
                    self.diag
                        .diag_at(DiagKind::ErrCannotDeduceVarType, name.range.begin)
                        .arg_ident(name.ident)
                        .range(name.range)
                        .flush();
                    return None;
                }
            },
        };

        let decl: &'a VarDecl<'a> = self.arena.alloc(VarDecl {
            name: name.ident,
            name_range: name.range,
            ty,
            init: init.map(|e| self.convert_to_rvalue(e)),
            used: std::cell::Cell::new(false),
        });
        self.scopes.add_symbol(name.ident, DeclRef::Var(decl));
        Some(decl)
    }

    pub fn act_on_param_decl(
        &mut self,
        ty: Option<&'a Type<'a>>,
        name: Option<LocatedIdent<'a>>,
        default: Option<&'a Expr<'a>>,
        _range: SourceRange,
    ) -> Option<&'a ParamDecl<'a>> {
        let name = name?;

        if self.scopes.local_lookup(name.ident).is_some() {
            self.diag
                .diag_at(DiagKind::ErrParameterNameAlreadyUsed, name.range.begin)
                .arg_ident(name.ident)
                .range(name.range)
                .flush();
            return None;
        }

        let ty = match ty {
            Some(ty) => {
                if let Some(default) = default {
                    if !self.compatible(default.ty, ty) {
                        self.expected_type_diag(ty, default.ty, default.range);
                        return None;
                    }
                }
                ty
            }
            None => match default {
                Some(default) => default.ty,
                None => {
                    self.diag
                        .diag_at(DiagKind::ErrCannotDeduceParamType, name.range.begin)
                        .arg_ident(name.ident)
                        .range(name.range)
                        .flush();
                    return None;
                }
            },
        };

        let decl: &'a ParamDecl<'a> = self.arena.alloc(ParamDecl {
            name: name.ident,
            name_range: name.range,
            ty,
            default: std::cell::Cell::new(default),
            used: std::cell::Cell::new(false),
        });
        self.scopes.add_symbol(name.ident, DeclRef::Param(decl));
        Some(decl)
    }

    /// Once a parameter has a default, every later one needs one too;
    /// returns the resulting required-count or `None` after diagnosing.
    fn check_func_decl_params(
        &self,
        func_name: &'a IdentifierInfo<'a>,
        params: &[&'a ParamDecl<'a>],
    ) -> Option<usize> {
        let mut required = 0;
        let mut seen_default = false;
        let mut has_error = false;

        for (i, param) in params.iter().enumerate() {
            match param.default.get() {
                None => {
                    if seen_default {
                        self.diag
                            .diag(DiagKind::ErrMissingDefaultArgument)
                            .arg_int(i as i64 + 1)
                            .arg_ident(func_name)
                            .flush();
                        has_error = true;
                    } else {
                        required += 1;
                    }
                }
                Some(default) => {
                    seen_default = true;
                    param.default.set(Some(self.convert_to_rvalue(default)));
                }
            }
        }

        if has_error { None } else { Some(required) }
    }

    pub fn act_on_func_decl(
        &mut self,
        name: Option<LocatedIdent<'a>>,
        ret_ty: Option<&'a Type<'a>>,
        params: &[&'a ParamDecl<'a>],
        _lparen_loc: SourceLocation,
    ) -> Option<&'a FunctionDecl<'a>> {
        let name = name?;

        if self.scopes.local_lookup(name.ident).is_some() {
            self.diag
                .diag_at(DiagKind::ErrRedeclarationFunction, name.range.begin)
                .arg_ident(name.ident)
                .range(name.range)
                .flush();
            return None;
        }

        let ret_ty = ret_ty.unwrap_or_else(|| self.types.void());
        let required_param_count = self.check_func_decl_params(name.ident, params)?;

        let param_tys: Vec<&'a Type<'a>> = params.iter().map(|p| p.ty).collect();
        let func_ty = self.types.function(ret_ty, &param_tys);

        let params = self.arena.alloc_slice_copy(params) as &'a [&'a ParamDecl<'a>];
        let decl: &'a FunctionDecl<'a> = self.arena.alloc(FunctionDecl {
            name: name.ident,
            name_range: name.range,
            ty: func_ty,
            params,
            required_param_count,
            body: std::cell::Cell::new(None),
            is_extern: std::cell::Cell::new(false),
            abi: std::cell::Cell::new(None),
            used: std::cell::Cell::new(false),
            range: std::cell::Cell::new(name.range),
        });
        self.scopes.add_symbol(name.ident, DeclRef::Function(decl));
        Some(decl)
    }

    /// Opens the body scope of a function and rebinds its parameters there.
    pub fn begin_func_decl_analysis(&mut self, decl: &'a FunctionDecl<'a>) {
        self.push_scope(ScopeFlags::FUNC_PARAMS);
        self.curr_func_ty = Some(decl.ty);
        for param in decl.params {
            self.scopes.add_symbol(param.name, DeclRef::Param(param));
        }
    }

    pub fn end_func_decl_analysis(&mut self) {
        self.pop_scope();
        self.curr_func_ty = None;
    }

    /// Records the ABI of an `extern "ABI"` function; anything but `"C"` is
    /// diagnosed but still handed to the backend.
    pub fn check_func_abi(&self, abi: &'a str, range: SourceRange) {
        if abi != "C" {
            self.diag
                .diag_at(DiagKind::ErrUnknownAbi, range.begin)
                .arg_str(abi)
                .range(range)
                .flush();
        }
    }

    pub fn act_on_struct_field_decl(
        &self,
        ty: Option<&'a Type<'a>>,
        name: Option<LocatedIdent<'a>>,
        _range: SourceRange,
    ) -> Option<&'a FieldDecl<'a>> {
        let name = name?;
        let ty = ty?;
        Some(self.arena.alloc(FieldDecl {
            name: name.ident,
            name_range: name.range,
            ty,
            parent: std::cell::Cell::new(None),
            index: std::cell::Cell::new(0),
        }))
    }

    /// Rejects duplicate field names within one struct declaration.
    pub fn check_struct_fields(&self, fields: &[&'a FieldDecl<'a>]) {
        for (i, field) in fields.iter().enumerate() {
            let duplicate = fields[..i]
                .iter()
                .any(|prev| crate::intern::same_identifier(prev.name, field.name));
            if duplicate {
                self.diag
                    .diag_at(DiagKind::ErrFieldNameAlreadyUsed, field.name_range.begin)
                    .arg_ident(field.name)
                    .range(field.name_range)
                    .flush();
            }
        }
    }

    pub fn act_on_struct_decl(
        &mut self,
        name: Option<LocatedIdent<'a>>,
        fields: &[&'a FieldDecl<'a>],
        range: SourceRange,
    ) -> Option<&'a StructDecl<'a>> {
        let name = name?;

        if self.scopes.local_lookup(name.ident).is_some() {
            self.diag
                .diag_at(DiagKind::ErrRedeclarationStruct, name.range.begin)
                .arg_ident(name.ident)
                .range(name.range)
                .flush();
            return None;
        }

        self.check_struct_fields(fields);

        let fields = self.arena.alloc_slice_copy(fields) as &'a [&'a FieldDecl<'a>];
        let decl: &'a StructDecl<'a> = self.arena.alloc(StructDecl {
            name: name.ident,
            name_range: name.range,
            ty: std::cell::Cell::new(None),
            fields,
            range,
        });
        decl.ty.set(Some(self.types.tag(decl)));

        for (i, field) in fields.iter().enumerate() {
            field.parent.set(Some(decl));
            field.index.set(i);
        }

        self.scopes.add_symbol(name.ident, DeclRef::Struct(decl));
        Some(decl)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    pub fn act_on_compound_stmt(
        &self,
        stmts: &[&'a Stmt<'a>],
        range: SourceRange,
    ) -> Option<&'a Stmt<'a>> {
        let stmts = self.arena.alloc_slice_copy(stmts) as &'a [&'a Stmt<'a>];
        Some(self.alloc_stmt(StmtKind::Compound { stmts }, range))
    }

    pub fn act_on_expr_stmt(&self, expr: Option<&'a Expr<'a>>) -> Option<&'a Stmt<'a>> {
        let expr = expr?;
        Some(self.alloc_stmt(StmtKind::Expr(expr), expr.range))
    }

    pub fn act_on_let_stmt(
        &self,
        decls: &[&'a VarDecl<'a>],
        range: SourceRange,
    ) -> Option<&'a Stmt<'a>> {
        let decls = self.arena.alloc_slice_copy(decls) as &'a [&'a VarDecl<'a>];
        Some(self.alloc_stmt(StmtKind::Let { decls }, range))
    }

    pub fn act_on_break_stmt(
        &self,
        range: SourceRange,
        keyword_range: SourceRange,
    ) -> Option<&'a Stmt<'a>> {
        let Some(target) = self.scopes.loop_target_with_flag(ScopeFlags::BREAK) else {
            self.diag
                .diag_at(DiagKind::ErrBreakOrContinueOutsideOfLoop, keyword_range.begin)
                .arg_str("break")
                .range(keyword_range)
                .flush();
            return None;
        };
        Some(self.alloc_stmt(StmtKind::Break { target }, range))
    }

    pub fn act_on_continue_stmt(
        &self,
        range: SourceRange,
        keyword_range: SourceRange,
    ) -> Option<&'a Stmt<'a>> {
        let Some(target) = self.scopes.loop_target_with_flag(ScopeFlags::CONTINUE) else {
            self.diag
                .diag_at(DiagKind::ErrBreakOrContinueOutsideOfLoop, keyword_range.begin)
                .arg_str("continue")
                .range(keyword_range)
                .flush();
            return None;
        };
        Some(self.alloc_stmt(StmtKind::Continue { target }, range))
    }

    pub fn act_on_return_stmt(
        &self,
        value: Option<&'a Expr<'a>>,
        range: SourceRange,
        semi_loc: SourceLocation,
    ) -> Option<&'a Stmt<'a>> {
        let ret_ty = self
            .curr_func_ty
            .and_then(|ty| ty.as_function())
            .map(|(ret, _)| ret);

        let value = match (value, ret_ty) {
            (Some(value), Some(ret_ty)) => {
                if !self.compatible(value.ty, ret_ty) {
                    self.expected_type_diag(ret_ty, value.ty, value.range);
                    return None;
                }
                Some(self.convert_to_rvalue(value))
            }
            (None, Some(ret_ty)) => {
                if !ret_ty.is_void() {
                    self.diag
                        .diag_at(DiagKind::ErrExpectedType, semi_loc)
                        .arg_type(ret_ty)
                        .arg_type(self.types.void())
                        .flush();
                    return None;
                }
                None
            }
            // `return` outside a function body (standalone statements).
            (value, None) => value.map(|v| self.convert_to_rvalue(v)),
        };

        Some(self.alloc_stmt(StmtKind::Return { value }, range))
    }

    /// A condition that is itself an assignment is usually a typo for a
    /// comparison.
    fn check_suspicious_condition(&self, cond: &'a Expr<'a>) {
        let ExprKind::Binary { op, op_loc, .. } = cond.kind else {
            return;
        };

        let hint = match op {
            BinaryOp::Assign => "==",
            BinaryOp::AssignBitOr => "!=",
            _ => return,
        };

        self.diag
            .diag_at(DiagKind::WarnAssignInCondition, op_loc)
            .arg_str(op.spelling())
            .arg_str(hint)
            .range(cond.range)
            .flush();
        self.diag.diag(DiagKind::NoteParenthesizeCondition).flush();
    }

    fn check_condition_expr(&self, cond: &'a Expr<'a>) {
        self.check_suspicious_condition(cond);
        if !cond.ty.is_bool() {
            self.expected_type_diag(self.types.bool(), cond.ty, cond.range);
        }
    }

    pub fn act_on_if_stmt(
        &self,
        cond: Option<&'a Expr<'a>>,
        then_stmt: Option<&'a Stmt<'a>>,
        else_stmt: Option<&'a Stmt<'a>>,
        range: SourceRange,
    ) -> Option<&'a Stmt<'a>> {
        let cond = cond?;
        let then_stmt = then_stmt?;

        self.check_condition_expr(cond);
        let cond = self.convert_to_rvalue(cond);

        Some(self.alloc_stmt(
            StmtKind::If {
                cond,
                then_stmt,
                else_stmt,
            },
            range,
        ))
    }

    /// Called after the condition of a `while` has been analyzed but before
    /// its body: opens the loop scope and pre-creates the statement node so
    /// `break`/`continue` in the body can resolve to it.
    pub fn act_before_while_stmt_body(&mut self) {
        self.push_scope(ScopeFlags::BREAK | ScopeFlags::CONTINUE);
        let stmt = self.alloc_stmt(
            StmtKind::While(WhileStmt {
                cond: std::cell::Cell::new(None),
                body: std::cell::Cell::new(None),
            }),
            SourceRange::default(),
        );
        let StmtKind::While(while_stmt) = &stmt.kind else {
            unreachable!()
        };
        self.scopes.set_statement(LoopTarget::While(while_stmt));
        self.pending_loops.push(stmt);
    }

    pub fn act_on_while_stmt(
        &mut self,
        cond: Option<&'a Expr<'a>>,
        body: Option<&'a Stmt<'a>>,
        range: SourceRange,
    ) -> Option<&'a Stmt<'a>> {
        let stmt = self.pending_loops.pop().expect("no pending loop");
        self.pop_scope();

        let cond = cond?;
        self.check_condition_expr(cond);
        let cond = self.convert_to_rvalue(cond);

        let StmtKind::While(while_stmt) = &stmt.kind else {
            unreachable!()
        };
        while_stmt.cond.set(Some(cond));
        while_stmt.body.set(body);
        stmt.set_range(range);
        Some(stmt)
    }

    pub fn act_before_loop_stmt_body(&mut self) {
        self.push_scope(ScopeFlags::BREAK | ScopeFlags::CONTINUE);
        let stmt = self.alloc_stmt(
            StmtKind::Loop(LoopStmt {
                body: std::cell::Cell::new(None),
            }),
            SourceRange::default(),
        );
        let StmtKind::Loop(loop_stmt) = &stmt.kind else {
            unreachable!()
        };
        self.scopes.set_statement(LoopTarget::Loop(loop_stmt));
        self.pending_loops.push(stmt);
    }

    pub fn act_on_loop_stmt(
        &mut self,
        body: Option<&'a Stmt<'a>>,
        range: SourceRange,
    ) -> Option<&'a Stmt<'a>> {
        let stmt = self.pending_loops.pop().expect("no pending loop");
        self.pop_scope();

        let StmtKind::Loop(loop_stmt) = &stmt.kind else {
            unreachable!()
        };
        loop_stmt.body.set(body);
        stmt.set_range(range);
        Some(stmt)
    }

    pub fn act_on_assert_stmt(
        &self,
        cond: Option<&'a Expr<'a>>,
        range: SourceRange,
    ) -> Option<&'a Stmt<'a>> {
        let cond = cond?;
        self.check_condition_expr(cond);
        let cond = self.convert_to_rvalue(cond);
        Some(self.alloc_stmt(StmtKind::Assert { cond }, range))
    }

    pub fn act_on_translation_unit(
        &self,
        decls: &[TopLevelDecl<'a>],
        range: SourceRange,
    ) -> &'a TranslationUnit<'a> {
        let decls = self.arena.alloc_slice_copy(decls) as &'a [TopLevelDecl<'a>];
        self.arena.alloc(TranslationUnit { decls, range })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::{DiagEngine, DiagOptions, Severity};
    use crate::intern::IdentifierTable;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::source::SourceFile;
    use bumpalo::Bump;

    /// Builds the whole front-end over `$src` and binds `$parser`/`$diag`.
    macro_rules! session {
        ($src:expr => $parser:ident, $diag:ident) => {
            let arena = Bump::new();
            let types = TypeCtx::new(&arena);
            let idents = IdentifierTable::new(&arena);
            idents.register_keywords();
            let $diag = DiagEngine::with_sink(DiagOptions::default(), Box::new(Vec::new()));
            let file = SourceFile::new("test.rl", $src);
            $diag.set_source_file(file.clone());
            let lexer = Lexer::new(file, &idents, &$diag);
            let sema = Sema::new(&arena, &types, &$diag);
            #[allow(unused_mut)]
            let mut $parser = Parser::new(lexer, sema);
        };
    }

    fn function_body<'a>(tu: &'a TranslationUnit<'a>, index: usize) -> &'a [&'a Stmt<'a>] {
        let TopLevelDecl::Function(func) = tu.decls[index] else {
            panic!("expected a function declaration");
        };
        let body = func.body.get().expect("function has no body");
        let StmtKind::Compound { stmts } = &body.kind else {
            panic!("function body is not a compound statement");
        };
        stmts
    }

    #[test]
    fn test_unsuffixed_literal_fits_smallest_type() {
        session!("fn f() { let a = 42; let b = 3000000000; let c = 10000000000000000000; }"
            => parser, diag);
        let tu = parser.parse();
        assert_eq!(diag.error_count(), 0);

        let stmts = function_body(tu, 0);
        let types: Vec<String> = stmts
            .iter()
            .map(|s| {
                let StmtKind::Let { decls } = &s.kind else {
                    panic!("expected let");
                };
                decls[0].ty.to_string()
            })
            .collect();
        assert_eq!(types, ["i32", "i64", "u64"]);
    }

    #[test]
    fn test_suffixed_literal_range_check() {
        session!("fn f() { let a = 300i8; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_unsuffixed_float_is_generic() {
        session!("fn f() { let a = 1.5; let b = 1.5f64; }" => parser, diag);
        let tu = parser.parse();
        assert_eq!(diag.error_count(), 0);

        let stmts = function_body(tu, 0);
        let StmtKind::Let { decls } = &stmts[0].kind else {
            panic!()
        };
        assert!(decls[0].ty.is_generic_float());
        let StmtKind::Let { decls } = &stmts[1].kind else {
            panic!()
        };
        assert_eq!(decls[0].ty.to_string(), "f64");
    }

    #[test]
    fn test_l2r_inserted_on_variable_read() {
        session!("fn f() { let a = 1; let b = a; }" => parser, diag);
        let tu = parser.parse();
        assert_eq!(diag.error_count(), 0);

        let stmts = function_body(tu, 0);
        let StmtKind::Let { decls } = &stmts[1].kind else {
            panic!()
        };
        let init = decls[0].init.unwrap();
        assert!(init.is_rvalue());
        let ExprKind::LValueToRValue(sub) = init.kind else {
            panic!("expected an implicit lvalue-to-rvalue conversion");
        };
        assert!(sub.is_lvalue());
        assert!(matches!(sub.kind, ExprKind::DeclRef(_)));
    }

    #[test]
    fn test_binary_operands_are_rvalues() {
        session!("fn f(a: i32, b: i32) -> i32 { return a + b; }" => parser, diag);
        let tu = parser.parse();
        assert_eq!(diag.error_count(), 0);

        let stmts = function_body(tu, 0);
        let StmtKind::Return { value } = &stmts[0].kind else {
            panic!()
        };
        let value = value.unwrap();
        let ExprKind::Binary { lhs, rhs, .. } = value.kind else {
            panic!("expected a binary expression");
        };
        assert!(lhs.is_rvalue());
        assert!(rhs.is_rvalue());
        assert!(value.is_rvalue());
        assert_eq!(value.ty.to_string(), "i32");
    }

    #[test]
    fn test_assignment_keeps_lvalue_lhs() {
        session!("fn f() { let x = 1; x = 2; }" => parser, diag);
        let tu = parser.parse();
        assert_eq!(diag.error_count(), 0);

        let stmts = function_body(tu, 0);
        let StmtKind::Expr(expr) = &stmts[1].kind else {
            panic!()
        };
        let ExprKind::Binary { op, lhs, .. } = expr.kind else {
            panic!()
        };
        assert_eq!(op, BinaryOp::Assign);
        assert!(lhs.is_lvalue());
        assert!(expr.is_lvalue());
    }

    #[test]
    fn test_assignment_to_rvalue_rejected() {
        session!("fn f() { 1 = 2; }" => parser, diag);
        parser.parse();
        assert!(diag.error_count() >= 1);
    }

    #[test]
    fn test_address_of_and_deref() {
        session!("fn f() { let x = 1; let p = &x; let y = *p; }" => parser, diag);
        let tu = parser.parse();
        assert_eq!(diag.error_count(), 0);

        let stmts = function_body(tu, 0);
        let StmtKind::Let { decls } = &stmts[1].kind else {
            panic!()
        };
        assert_eq!(decls[0].ty.to_string(), "*i32");
        let StmtKind::Let { decls } = &stmts[2].kind else {
            panic!()
        };
        assert_eq!(decls[0].ty.to_string(), "i32");
    }

    #[test]
    fn test_address_of_rvalue_rejected() {
        session!("fn f() { let p = &1; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_deref_requires_pointer() {
        session!("fn f() { let x = 1; let y = *x; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_undeclared_identifier() {
        session!("fn f() { let x = missing; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_variable_redeclaration() {
        session!("fn f() { let x = 1; let x = 2; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_shadowing_in_nested_scope_is_fine() {
        session!("fn f() { let x = 1; { let x = 2; } }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 0);
    }

    #[test]
    fn test_function_redeclaration() {
        session!("fn f() {} fn f() {}" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_let_requires_type_or_initializer() {
        session!("fn f() { let x; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_let_type_mismatch() {
        session!("fn f() { let x: bool = 3; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_return_type_checking() {
        session!("fn f() -> i32 { return true; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);

        session!("fn g() -> i32 { return 3; }" => parser2, diag2);
        parser2.parse();
        assert_eq!(diag2.error_count(), 0);

        session!("fn h() { return 3; }" => parser3, diag3);
        parser3.parse();
        assert_eq!(diag3.error_count(), 1);

        session!("fn i() -> i32 { return; }" => parser4, diag4);
        parser4.parse();
        assert_eq!(diag4.error_count(), 1);
    }

    #[test]
    fn test_condition_must_be_bool() {
        session!("fn f() { if 1 {} }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);

        session!("fn g() { while true {} }" => parser2, diag2);
        parser2.parse();
        assert_eq!(diag2.error_count(), 0);
    }

    #[test]
    fn test_assert_condition() {
        session!("fn f(x: i32) { assert x == 3; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 0);

        session!("fn g(x: i32) { assert x; }" => parser2, diag2);
        parser2.parse();
        assert_eq!(diag2.error_count(), 1);
    }

    #[test]
    fn test_assignment_in_condition_warns_with_note() {
        session!("fn f() { let x = true; while x = false {} }" => parser, diag);
        parser.parse();
        assert_eq!(diag.count(Severity::Warning), 1);
        assert_eq!(diag.count(Severity::Note), 1);
        assert_eq!(diag.error_count(), 0);
    }

    #[test]
    fn test_parenthesized_condition_does_not_warn() {
        session!("fn f() { let x = true; while (x = false) {} }" => parser, diag);
        parser.parse();
        assert_eq!(diag.count(Severity::Warning), 0);
    }

    #[test]
    fn test_break_and_continue_targets() {
        session!("fn f() { loop { break; } while true { continue; } }" => parser, diag);
        let tu = parser.parse();
        assert_eq!(diag.error_count(), 0);

        let stmts = function_body(tu, 0);

        let StmtKind::Loop(loop_stmt) = &stmts[0].kind else {
            panic!("expected loop");
        };
        let loop_body = loop_stmt.body.get().unwrap();
        let StmtKind::Compound { stmts: inner } = &loop_body.kind else {
            panic!()
        };
        let StmtKind::Break { target } = &inner[0].kind else {
            panic!("expected break");
        };
        assert!(target.same_loop(LoopTarget::Loop(loop_stmt)));

        let StmtKind::While(while_stmt) = &stmts[1].kind else {
            panic!("expected while");
        };
        let while_body = while_stmt.body.get().unwrap();
        let StmtKind::Compound { stmts: inner } = &while_body.kind else {
            panic!()
        };
        let StmtKind::Continue { target } = &inner[0].kind else {
            panic!("expected continue");
        };
        assert!(target.same_loop(LoopTarget::While(while_stmt)));
    }

    #[test]
    fn test_nested_break_targets_innermost_loop() {
        session!("fn f() { loop { while true { break; } } }" => parser, diag);
        let tu = parser.parse();
        assert_eq!(diag.error_count(), 0);

        let stmts = function_body(tu, 0);
        let StmtKind::Loop(loop_stmt) = &stmts[0].kind else {
            panic!()
        };
        let StmtKind::Compound { stmts: outer } = &loop_stmt.body.get().unwrap().kind else {
            panic!()
        };
        let StmtKind::While(while_stmt) = &outer[0].kind else {
            panic!()
        };
        let StmtKind::Compound { stmts: inner } = &while_stmt.body.get().unwrap().kind else {
            panic!()
        };
        let StmtKind::Break { target } = &inner[0].kind else {
            panic!()
        };
        assert!(target.same_loop(LoopTarget::While(while_stmt)));
        assert!(!target.same_loop(LoopTarget::Loop(loop_stmt)));
    }

    #[test]
    fn test_break_outside_loop() {
        session!("fn f() { break; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_continue_outside_loop() {
        session!("fn f() { continue; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_cast_classification() {
        session!(
            "fn f() { let a = 2 as i64; let b = 2 as u32; let c = 1.5f32 as f64; \
             let d = true as i32; let e = 2.5 as i32; let g = 3 as f32; }"
            => parser, diag
        );
        let tu = parser.parse();
        assert_eq!(diag.error_count(), 0);

        let stmts = function_body(tu, 0);
        let kinds: Vec<CastKind> = stmts
            .iter()
            .map(|s| {
                let StmtKind::Let { decls } = &s.kind else {
                    panic!()
                };
                let ExprKind::Cast { cast_kind, .. } = decls[0].init.unwrap().ignore_parens().kind
                else {
                    panic!("expected cast")
                };
                cast_kind
            })
            .collect();
        assert_eq!(
            kinds,
            [
                CastKind::IntToInt,
                CastKind::Noop, // same width, sign change only
                CastKind::FloatToFloat,
                CastKind::BoolToInt,
                CastKind::FloatToInt,
                CastKind::IntToFloat,
            ]
        );
    }

    #[test]
    fn test_invalid_cast_rejected() {
        session!("fn f() { let a = 1 as bool; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_call_with_default_arguments() {
        session!(
            "fn add(a: i32, b: i32 = 4) -> i32 { return a + b; } \
             fn main() { let x = add(1); let y = add(1, 2); }"
            => parser, diag
        );
        let tu = parser.parse();
        assert_eq!(diag.error_count(), 0);

        let TopLevelDecl::Function(add) = tu.decls[0] else {
            panic!()
        };
        assert_eq!(add.required_param_count, 1);
        assert_eq!(add.params.len(), 2);

        // Provided arguments plus substituted defaults always add up to the
        // full parameter count.
        let stmts = function_body(tu, 1);
        for stmt in stmts {
            let StmtKind::Let { decls } = &stmt.kind else {
                panic!()
            };
            let ExprKind::Call { args, .. } = decls[0].init.unwrap().ignore_parens().kind else {
                panic!("expected call")
            };
            assert_eq!(args.len(), 2);
        }
    }

    #[test]
    fn test_call_arity_errors() {
        session!(
            "fn two(a: i32, b: i32) -> i32 { return a; } \
             fn main() { two(1); two(1, 2, 3); }"
            => parser, diag
        );
        parser.parse();
        assert_eq!(diag.error_count(), 2);
    }

    #[test]
    fn test_call_argument_type_checking() {
        session!("fn f(a: i32) {} fn main() { f(true); }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_call_of_non_function() {
        session!("fn main() { let x = 1; x(); }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_missing_default_argument() {
        session!("fn f(a: i32 = 1, b: i32) {}" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_default_argument_may_not_reference_parameter() {
        session!("fn f(a: i32, b: i32 = a) {}" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_parameters_usable_in_body() {
        session!("fn f(a: i32) -> i32 { return a; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 0);
    }

    #[test]
    fn test_duplicate_parameter_name() {
        session!("fn f(a: i32, a: i32) {}" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_member_access() {
        session!(
            "struct Point { x: i32, y: f64 } \
             fn f(p: Point) -> f64 { return p.y; }"
            => parser, diag
        );
        let tu = parser.parse();
        assert_eq!(diag.error_count(), 0);

        let stmts = function_body(tu, 1);
        let StmtKind::Return { value } = &stmts[0].kind else {
            panic!()
        };
        let ExprKind::LValueToRValue(member) = value.unwrap().kind else {
            panic!("expected l2r around the member access")
        };
        let ExprKind::Member { field, .. } = member.kind else {
            panic!("expected member access")
        };
        assert_eq!(field.name.spelling(), "y");
        assert_eq!(field.index.get(), 1);
        assert!(member.is_lvalue());
    }

    #[test]
    fn test_member_on_non_struct() {
        session!("fn f() { let x = 1; let y = x.field; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_no_such_member() {
        session!(
            "struct Point { x: i32 } fn f(p: Point) { let y = p.z; }"
            => parser, diag
        );
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_struct_field_back_pointers() {
        session!("struct Pair { a: i32, b: i32 }" => parser, diag);
        let tu = parser.parse();
        assert_eq!(diag.error_count(), 0);

        let TopLevelDecl::Struct(decl) = tu.decls[0] else {
            panic!()
        };
        for (i, field) in decl.fields.iter().enumerate() {
            assert_eq!(field.index.get(), i);
            assert!(std::ptr::eq(field.parent.get().unwrap(), decl));
        }
        assert_eq!(decl.ty.get().unwrap().to_string(), "struct Pair");
    }

    #[test]
    fn test_duplicate_struct_field() {
        session!("struct S { a: i32, a: i32 }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_struct_redeclaration() {
        session!("struct S { a: i32 } struct S { b: i32 }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_unknown_type_name() {
        session!("fn f(a: Widget) {}" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_extern_abi_validation() {
        session!("extern \"C\" fn ok(c: i32);" => parser, diag);
        let tu = parser.parse();
        assert_eq!(diag.error_count(), 0);
        let TopLevelDecl::Function(func) = tu.decls[0] else {
            panic!()
        };
        assert!(func.is_extern.get());
        assert_eq!(func.abi.get(), Some("C"));
        assert!(func.body.get().is_none());

        session!("extern \"stdcall\" fn bad();" => parser2, diag2);
        parser2.parse();
        assert_eq!(diag2.error_count(), 1);
    }

    #[test]
    fn test_every_expression_is_typed() {
        session!(
            "fn f(a: i32, b: bool) -> i32 { \
             \x20   let c = a * 2 + 1; \
             \x20   if b { return c; } \
             \x20   return -a; \
             }"
            => parser, diag
        );
        let tu = parser.parse();
        assert_eq!(diag.error_count(), 0);

        fn walk_expr(expr: &Expr<'_>) {
            assert!(!expr.ty.to_string().is_empty());
            match &expr.kind {
                ExprKind::Paren(sub)
                | ExprKind::LValueToRValue(sub)
                | ExprKind::Unary { sub, .. }
                | ExprKind::Cast { sub, .. } => walk_expr(sub),
                ExprKind::Binary { lhs, rhs, .. } => {
                    walk_expr(lhs);
                    walk_expr(rhs);
                }
                ExprKind::Call { callee, args } => {
                    walk_expr(callee);
                    args.iter().for_each(|a| walk_expr(a));
                }
                ExprKind::Member { base, .. } => walk_expr(base),
                ExprKind::StructExpr { fields, .. } => {
                    fields.iter().for_each(|f| walk_expr(f.value));
                }
                ExprKind::BoolLiteral(_)
                | ExprKind::IntLiteral(_)
                | ExprKind::FloatLiteral(_)
                | ExprKind::DeclRef(_) => {}
            }
        }

        fn walk_stmt(stmt: &Stmt<'_>) {
            match &stmt.kind {
                StmtKind::Compound { stmts } => stmts.iter().for_each(|s| walk_stmt(s)),
                StmtKind::Let { decls } => {
                    decls.iter().for_each(|d| {
                        if let Some(init) = d.init {
                            walk_expr(init);
                        }
                    });
                }
                StmtKind::Return { value } => {
                    if let Some(value) = value {
                        walk_expr(value);
                    }
                }
                StmtKind::If {
                    cond,
                    then_stmt,
                    else_stmt,
                } => {
                    walk_expr(cond);
                    walk_stmt(then_stmt);
                    if let Some(else_stmt) = else_stmt {
                        walk_stmt(else_stmt);
                    }
                }
                StmtKind::While(w) => {
                    walk_expr(w.cond.get().unwrap());
                    walk_stmt(w.body.get().unwrap());
                }
                StmtKind::Loop(l) => walk_stmt(l.body.get().unwrap()),
                StmtKind::Assert { cond } => walk_expr(cond),
                StmtKind::Expr(expr) => walk_expr(expr),
                StmtKind::Break { .. } | StmtKind::Continue { .. } => {}
            }
        }

        for stmt in function_body(tu, 0) {
            walk_stmt(stmt);
        }
    }

    #[test]
    fn test_struct_expression_through_sema_api() {
        let arena = Bump::new();
        let types = TypeCtx::new(&arena);
        let idents = IdentifierTable::new(&arena);
        idents.register_keywords();
        let diag = DiagEngine::with_sink(DiagOptions::default(), Box::new(Vec::new()));
        let mut sema = Sema::new(&arena, &types, &diag);
        sema.push_scope(crate::scope::ScopeFlags::NONE);

        let ident = |name: &str| LocatedIdent {
            ident: idents.lookup(name),
            range: SourceRange::default(),
        };

        // struct Point { x: i32, y: i32 }
        let fields = [
            sema.act_on_struct_field_decl(Some(types.i32()), Some(ident("x")), SourceRange::default())
                .unwrap(),
            sema.act_on_struct_field_decl(Some(types.i32()), Some(ident("y")), SourceRange::default())
                .unwrap(),
        ];
        sema.act_on_struct_decl(Some(ident("Point")), &fields, SourceRange::default())
            .unwrap();

        // Point { x: 1, y: 2 }
        let decl = sema.resolve_struct_expr_name(ident("Point"));
        assert!(decl.is_some());

        let x_init = sema
            .act_on_struct_field_expr(
                decl,
                ident("x"),
                sema.act_on_int_literal(1, IntSuffix::None, SourceRange::default()),
            )
            .unwrap();
        let y_init = sema
            .act_on_struct_field_expr(
                decl,
                ident("y"),
                sema.act_on_int_literal(2, IntSuffix::None, SourceRange::default()),
            )
            .unwrap();

        let expr = sema
            .act_on_struct_expr(decl, &[x_init, y_init], SourceRange::default())
            .unwrap();
        assert_eq!(expr.ty.to_string(), "struct Point");
        assert!(expr.is_rvalue());
        assert_eq!(diag.error_count(), 0);

        // Unknown fields and field type mismatches are diagnosed.
        assert!(
            sema.act_on_struct_field_expr(
                decl,
                ident("z"),
                sema.act_on_int_literal(3, IntSuffix::None, SourceRange::default()),
            )
            .is_none()
        );
        assert!(
            sema.act_on_struct_field_expr(
                decl,
                ident("x"),
                sema.act_on_bool_literal(true, SourceRange::default()),
            )
            .is_none()
        );
        assert_eq!(diag.error_count(), 2);

        // A non-struct name does not resolve.
        assert!(sema.resolve_struct_expr_name(ident("missing")).is_none());
        sema.pop_scope();
    }

    #[test]
    fn test_generic_float_compatible_with_concrete() {
        session!("fn f() { let a: f32 = 1.5; let b: f64 = 2.5; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 0);
    }

    #[test]
    fn test_incompatible_arithmetic_operands() {
        session!("fn f() { let a = 1 + 2.0; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_bitwise_requires_integers() {
        session!("fn f() { let a = 1.5 & 2.5; }" => parser, diag);
        parser.parse();
        assert!(diag.error_count() >= 1);
    }

    #[test]
    fn test_logical_requires_bool() {
        session!("fn f() { let a = 1 && true; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }

    #[test]
    fn test_neg_requires_signed_or_float() {
        session!("fn f(a: u32) { let b = -a; }" => parser, diag);
        parser.parse();
        assert_eq!(diag.error_count(), 1);
    }
}
