//! The Rill type system
//!
//! Types form a DAG owned by [`TypeCtx`]. Builtins are singletons; pointer,
//! array, function and tag types are uniqued on structural keys, so two types
//! are semantically equal iff their canonical representatives are the same
//! allocation. Parenthesized types keep the source form but canonicalize
//! straight through to their inner type; `unknown` types stand in for named
//! types that failed to resolve and are never uniqued.

use std::cell::{Cell, RefCell};
use std::fmt;

use bumpalo::Bump;
use rustc_hash::FxHashMap;

use crate::ast::StructDecl;
use crate::intern::IdentifierInfo;

#[derive(Debug, Clone, Copy)]
pub enum TypeKind<'a> {
    Void,
    Char,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    /// Placeholder for integer literals without a suffix; compatible with
    /// every concrete integer type.
    GenericInt,
    F32,
    F64,
    /// Placeholder for float literals without a suffix.
    GenericFloat,
    /// A parenthesized type, e.g. `(i32)`. Never uniqued.
    Paren(&'a Type<'a>),
    Pointer(&'a Type<'a>),
    Array(&'a Type<'a>, u64),
    Function {
        ret: &'a Type<'a>,
        params: &'a [&'a Type<'a>],
    },
    /// The type introduced by a struct declaration.
    Tag(&'a StructDecl<'a>),
    /// A named type that did not resolve.
    Unknown(&'a IdentifierInfo<'a>),
}

pub struct Type<'a> {
    kind: TypeKind<'a>,
    /// `None` means the type is its own canonical representative.
    canonical: Cell<Option<&'a Type<'a>>>,
}

impl<'a> Type<'a> {
    fn new(kind: TypeKind<'a>) -> Self {
        Type {
            kind,
            canonical: Cell::new(None),
        }
    }

    pub fn kind(&self) -> TypeKind<'a> {
        self.kind
    }

    pub fn canonical(&'a self) -> &'a Type<'a> {
        self.canonical.get().unwrap_or(self)
    }

    pub fn is_canonical(&'a self) -> bool {
        self.canonical.get().is_none()
    }

    fn canonical_kind(&'a self) -> TypeKind<'a> {
        self.canonical().kind
    }

    pub fn is_void(&'a self) -> bool {
        matches!(self.canonical_kind(), TypeKind::Void)
    }

    pub fn is_bool(&'a self) -> bool {
        matches!(self.canonical_kind(), TypeKind::Bool)
    }

    pub fn is_signed_int(&'a self) -> bool {
        matches!(
            self.canonical_kind(),
            TypeKind::I8 | TypeKind::I16 | TypeKind::I32 | TypeKind::I64 | TypeKind::GenericInt
        )
    }

    pub fn is_unsigned_int(&'a self) -> bool {
        matches!(
            self.canonical_kind(),
            TypeKind::U8 | TypeKind::U16 | TypeKind::U32 | TypeKind::U64
        )
    }

    pub fn is_int(&'a self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    pub fn is_float(&'a self) -> bool {
        matches!(
            self.canonical_kind(),
            TypeKind::F32 | TypeKind::F64 | TypeKind::GenericFloat
        )
    }

    pub fn is_arithmetic(&'a self) -> bool {
        self.is_int() || self.is_float()
    }

    pub fn is_generic_int(&'a self) -> bool {
        matches!(self.canonical_kind(), TypeKind::GenericInt)
    }

    pub fn is_generic_float(&'a self) -> bool {
        matches!(self.canonical_kind(), TypeKind::GenericFloat)
    }

    pub fn is_pointer(&'a self) -> bool {
        matches!(self.canonical_kind(), TypeKind::Pointer(_))
    }

    pub fn is_function(&'a self) -> bool {
        matches!(self.canonical_kind(), TypeKind::Function { .. })
    }

    /// The pointee, if this is canonically a pointer type.
    pub fn pointee(&'a self) -> Option<&'a Type<'a>> {
        match self.canonical_kind() {
            TypeKind::Pointer(elem) => Some(elem),
            _ => None,
        }
    }

    /// Return and parameter types, if this is canonically a function type.
    pub fn as_function(&'a self) -> Option<(&'a Type<'a>, &'a [&'a Type<'a>])> {
        match self.canonical_kind() {
            TypeKind::Function { ret, params } => Some((ret, params)),
            _ => None,
        }
    }

    pub fn as_tag_decl(&'a self) -> Option<&'a StructDecl<'a>> {
        match self.canonical_kind() {
            TypeKind::Tag(decl) => Some(decl),
            _ => None,
        }
    }

    /// Width in bits of a concrete arithmetic or bool type.
    pub fn bitwidth(&'a self) -> Option<u32> {
        Some(match self.canonical_kind() {
            TypeKind::Bool => 1,
            TypeKind::Char => 32,
            TypeKind::I8 | TypeKind::U8 => 8,
            TypeKind::I16 | TypeKind::U16 => 16,
            TypeKind::I32 | TypeKind::U32 | TypeKind::F32 => 32,
            TypeKind::I64 | TypeKind::U64 | TypeKind::F64 => 64,
            _ => return None,
        })
    }
}

/// Semantic equality: canonical pointer identity.
pub fn same_type<'a>(a: &'a Type<'a>, b: &'a Type<'a>) -> bool {
    std::ptr::eq(a.canonical(), b.canonical())
}

impl fmt::Debug for Type<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({self})")
    }
}

/// Types render the way they are written in source; parentheses collapse and
/// function types elide a `void` return.
impl fmt::Display for Type<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TypeKind::Void => f.write_str("void"),
            TypeKind::Char => f.write_str("char"),
            TypeKind::Bool => f.write_str("bool"),
            TypeKind::I8 => f.write_str("i8"),
            TypeKind::I16 => f.write_str("i16"),
            TypeKind::I32 => f.write_str("i32"),
            TypeKind::I64 => f.write_str("i64"),
            TypeKind::U8 => f.write_str("u8"),
            TypeKind::U16 => f.write_str("u16"),
            TypeKind::U32 => f.write_str("u32"),
            TypeKind::U64 => f.write_str("u64"),
            TypeKind::GenericInt => f.write_str("{integer}"),
            TypeKind::F32 => f.write_str("f32"),
            TypeKind::F64 => f.write_str("f64"),
            TypeKind::GenericFloat => f.write_str("{float}"),
            TypeKind::Paren(sub) => write!(f, "{sub}"),
            TypeKind::Pointer(elem) => write!(f, "*{elem}"),
            TypeKind::Array(elem, n) => write!(f, "[{elem}; {n}]"),
            TypeKind::Function { ret, params } => {
                f.write_str("fn (")?;
                for (i, param) in params.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{param}")?;
                }
                f.write_str(")")?;
                if !matches!(ret.canonical().kind(), TypeKind::Void) {
                    write!(f, " -> {ret}")?;
                }
                Ok(())
            }
            TypeKind::Tag(decl) => write!(f, "struct {}", decl.name.spelling()),
            TypeKind::Unknown(name) => f.write_str(name.spelling()),
        }
    }
}

type FnKey = (usize, Vec<usize>);

/// Owner of the builtin singletons and the uniquing maps.
pub struct TypeCtx<'a> {
    arena: &'a Bump,

    void_ty: &'a Type<'a>,
    char_ty: &'a Type<'a>,
    bool_ty: &'a Type<'a>,
    i8_ty: &'a Type<'a>,
    i16_ty: &'a Type<'a>,
    i32_ty: &'a Type<'a>,
    i64_ty: &'a Type<'a>,
    u8_ty: &'a Type<'a>,
    u16_ty: &'a Type<'a>,
    u32_ty: &'a Type<'a>,
    u64_ty: &'a Type<'a>,
    f32_ty: &'a Type<'a>,
    f64_ty: &'a Type<'a>,
    generic_int_ty: &'a Type<'a>,
    generic_float_ty: &'a Type<'a>,

    pointer_tys: RefCell<FxHashMap<usize, &'a Type<'a>>>,
    array_tys: RefCell<FxHashMap<(usize, u64), &'a Type<'a>>>,
    function_tys: RefCell<FxHashMap<FnKey, &'a Type<'a>>>,
    tag_tys: RefCell<FxHashMap<usize, &'a Type<'a>>>,
}

fn addr<T>(r: &T) -> usize {
    r as *const T as usize
}

impl<'a> TypeCtx<'a> {
    pub fn new(arena: &'a Bump) -> Self {
        let builtin = |kind| -> &'a Type<'a> { arena.alloc(Type::new(kind)) };
        TypeCtx {
            arena,
            void_ty: builtin(TypeKind::Void),
            char_ty: builtin(TypeKind::Char),
            bool_ty: builtin(TypeKind::Bool),
            i8_ty: builtin(TypeKind::I8),
            i16_ty: builtin(TypeKind::I16),
            i32_ty: builtin(TypeKind::I32),
            i64_ty: builtin(TypeKind::I64),
            u8_ty: builtin(TypeKind::U8),
            u16_ty: builtin(TypeKind::U16),
            u32_ty: builtin(TypeKind::U32),
            u64_ty: builtin(TypeKind::U64),
            f32_ty: builtin(TypeKind::F32),
            f64_ty: builtin(TypeKind::F64),
            generic_int_ty: builtin(TypeKind::GenericInt),
            generic_float_ty: builtin(TypeKind::GenericFloat),
            pointer_tys: RefCell::new(FxHashMap::default()),
            array_tys: RefCell::new(FxHashMap::default()),
            function_tys: RefCell::new(FxHashMap::default()),
            tag_tys: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn void(&self) -> &'a Type<'a> {
        self.void_ty
    }
    pub fn char(&self) -> &'a Type<'a> {
        self.char_ty
    }
    pub fn bool(&self) -> &'a Type<'a> {
        self.bool_ty
    }
    pub fn i8(&self) -> &'a Type<'a> {
        self.i8_ty
    }
    pub fn i16(&self) -> &'a Type<'a> {
        self.i16_ty
    }
    pub fn i32(&self) -> &'a Type<'a> {
        self.i32_ty
    }
    pub fn i64(&self) -> &'a Type<'a> {
        self.i64_ty
    }
    pub fn u8(&self) -> &'a Type<'a> {
        self.u8_ty
    }
    pub fn u16(&self) -> &'a Type<'a> {
        self.u16_ty
    }
    pub fn u32(&self) -> &'a Type<'a> {
        self.u32_ty
    }
    pub fn u64(&self) -> &'a Type<'a> {
        self.u64_ty
    }
    pub fn f32(&self) -> &'a Type<'a> {
        self.f32_ty
    }
    pub fn f64(&self) -> &'a Type<'a> {
        self.f64_ty
    }
    pub fn generic_int(&self) -> &'a Type<'a> {
        self.generic_int_ty
    }
    pub fn generic_float(&self) -> &'a Type<'a> {
        self.generic_float_ty
    }

    /// Parenthesized types are deliberately not uniqued; each carries its own
    /// source form and canonicalizes through to the inner type.
    pub fn paren(&self, sub: &'a Type<'a>) -> &'a Type<'a> {
        let ty = self.arena.alloc(Type::new(TypeKind::Paren(sub)));
        ty.canonical.set(Some(sub.canonical()));
        ty
    }

    pub fn pointer(&self, elem: &'a Type<'a>) -> &'a Type<'a> {
        if let Some(ty) = self.pointer_tys.borrow().get(&addr(elem)).copied() {
            return ty;
        }

        let ty = self.arena.alloc(Type::new(TypeKind::Pointer(elem))) as &'a Type<'a>;
        self.pointer_tys.borrow_mut().insert(addr(elem), ty);
        if !elem.is_canonical() {
            ty.canonical.set(Some(self.pointer(elem.canonical())));
        }
        ty
    }

    pub fn array(&self, elem: &'a Type<'a>, len: u64) -> &'a Type<'a> {
        if let Some(ty) = self.array_tys.borrow().get(&(addr(elem), len)).copied() {
            return ty;
        }

        let ty = self.arena.alloc(Type::new(TypeKind::Array(elem, len))) as &'a Type<'a>;
        self.array_tys.borrow_mut().insert((addr(elem), len), ty);
        if !elem.is_canonical() {
            ty.canonical.set(Some(self.array(elem.canonical(), len)));
        }
        ty
    }

    pub fn function(&self, ret: &'a Type<'a>, params: &[&'a Type<'a>]) -> &'a Type<'a> {
        let key: FnKey = (addr(ret), params.iter().map(|p| addr(*p)).collect());
        if let Some(ty) = self.function_tys.borrow().get(&key).copied() {
            return ty;
        }

        let params = self.arena.alloc_slice_copy(params) as &'a [&'a Type<'a>];
        let ty = self
            .arena
            .alloc(Type::new(TypeKind::Function { ret, params })) as &'a Type<'a>;
        self.function_tys.borrow_mut().insert(key, ty);

        let all_canonical = ret.is_canonical() && params.iter().all(|p| p.is_canonical());
        if !all_canonical {
            let canon_params: Vec<&'a Type<'a>> = params.iter().map(|p| p.canonical()).collect();
            ty.canonical
                .set(Some(self.function(ret.canonical(), &canon_params)));
        }
        ty
    }

    /// The tag type of a struct declaration, uniqued on declaration identity.
    /// Tag types are always canonical.
    pub fn tag(&self, decl: &'a StructDecl<'a>) -> &'a Type<'a> {
        if let Some(ty) = self.tag_tys.borrow().get(&addr(decl)).copied() {
            return ty;
        }

        let ty = self.arena.alloc(Type::new(TypeKind::Tag(decl))) as &'a Type<'a>;
        self.tag_tys.borrow_mut().insert(addr(decl), ty);
        ty
    }

    /// A placeholder for a name that failed to resolve. Not uniqued.
    pub fn unknown(&self, name: &'a IdentifierInfo<'a>) -> &'a Type<'a> {
        self.arena.alloc(Type::new(TypeKind::Unknown(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_uniquing() {
        let arena = Bump::new();
        let ctx = TypeCtx::new(&arena);
        let a = ctx.pointer(ctx.i32());
        let b = ctx.pointer(ctx.i32());
        assert!(std::ptr::eq(a, b));
        assert!(!std::ptr::eq(a, ctx.pointer(ctx.i64())));
    }

    #[test]
    fn test_array_uniquing() {
        let arena = Bump::new();
        let ctx = TypeCtx::new(&arena);
        assert!(std::ptr::eq(ctx.array(ctx.u8(), 4), ctx.array(ctx.u8(), 4)));
        assert!(!std::ptr::eq(ctx.array(ctx.u8(), 4), ctx.array(ctx.u8(), 5)));
        assert!(!std::ptr::eq(
            ctx.array(ctx.u8(), 4),
            ctx.array(ctx.u16(), 4)
        ));
    }

    #[test]
    fn test_function_uniquing_is_elementwise() {
        let arena = Bump::new();
        let ctx = TypeCtx::new(&arena);
        let a = ctx.function(ctx.i32(), &[ctx.bool(), ctx.f32()]);
        let b = ctx.function(ctx.i32(), &[ctx.bool(), ctx.f32()]);
        let c = ctx.function(ctx.i32(), &[ctx.bool(), ctx.f64()]);
        let d = ctx.function(ctx.i64(), &[ctx.bool(), ctx.f32()]);
        assert!(std::ptr::eq(a, b));
        assert!(!std::ptr::eq(a, c));
        assert!(!std::ptr::eq(a, d));
    }

    #[test]
    fn test_builtins_are_canonical() {
        let arena = Bump::new();
        let ctx = TypeCtx::new(&arena);
        assert!(ctx.i32().is_canonical());
        assert!(std::ptr::eq(ctx.i32().canonical(), ctx.i32()));
    }

    #[test]
    fn test_paren_canonicalizes_through() {
        let arena = Bump::new();
        let ctx = TypeCtx::new(&arena);
        let paren = ctx.paren(ctx.i32());
        assert!(!paren.is_canonical());
        assert!(std::ptr::eq(paren.canonical(), ctx.i32()));
        assert!(same_type(paren, ctx.i32()));

        // Nested parens still reach the builtin.
        let nested = ctx.paren(paren);
        assert!(std::ptr::eq(nested.canonical(), ctx.i32()));
    }

    #[test]
    fn test_canonical_is_idempotent() {
        let arena = Bump::new();
        let ctx = TypeCtx::new(&arena);
        let ptr_paren = ctx.pointer(ctx.paren(ctx.f64()));
        let canon = ptr_paren.canonical();
        assert!(std::ptr::eq(canon, canon.canonical()));
        assert!(canon.is_canonical());
        // The canonical pointer type is the pointer to the canonical element.
        assert!(std::ptr::eq(canon, ctx.pointer(ctx.f64())));
    }

    #[test]
    fn test_function_canonicalization() {
        let arena = Bump::new();
        let ctx = TypeCtx::new(&arena);
        let f = ctx.function(ctx.paren(ctx.i32()), &[ctx.paren(ctx.bool())]);
        assert!(!f.is_canonical());
        let canon = f.canonical();
        assert!(canon.is_canonical());
        assert!(std::ptr::eq(canon, ctx.function(ctx.i32(), &[ctx.bool()])));
        assert!(same_type(f, canon));
    }

    #[test]
    fn test_display() {
        let arena = Bump::new();
        let ctx = TypeCtx::new(&arena);
        assert_eq!(ctx.i32().to_string(), "i32");
        assert_eq!(ctx.pointer(ctx.i32()).to_string(), "*i32");
        assert_eq!(ctx.paren(ctx.i32()).to_string(), "i32");
        assert_eq!(ctx.array(ctx.u8(), 16).to_string(), "[u8; 16]");
        assert_eq!(ctx.generic_int().to_string(), "{integer}");
        assert_eq!(ctx.generic_float().to_string(), "{float}");
        assert_eq!(
            ctx.function(ctx.i32(), &[ctx.bool(), ctx.f32()]).to_string(),
            "fn (bool, f32) -> i32"
        );
        assert_eq!(
            ctx.function(ctx.void(), &[ctx.i64()]).to_string(),
            "fn (i64)"
        );
    }

    #[test]
    fn test_classification() {
        let arena = Bump::new();
        let ctx = TypeCtx::new(&arena);
        assert!(ctx.i8().is_signed_int());
        assert!(ctx.u64().is_unsigned_int());
        assert!(!ctx.u64().is_signed_int());
        assert!(ctx.generic_int().is_int());
        assert!(ctx.generic_float().is_float());
        assert!(ctx.f32().is_arithmetic());
        assert!(!ctx.bool().is_arithmetic());
        assert!(ctx.paren(ctx.i32()).is_int());
        assert_eq!(ctx.i16().bitwidth(), Some(16));
        assert_eq!(ctx.pointer(ctx.i32()).bitwidth(), None);
    }
}
