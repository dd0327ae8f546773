//! Lexical scopes and symbols
//!
//! Scopes form a stack; each level owns a symbol map keyed on identifier
//! record identity, a flag set, and (for loop scopes) a back-pointer to the
//! loop statement so `break`/`continue` can resolve their target. Popped
//! scopes keep their map allocation in a small pool for reuse.

use std::cell::Cell;

use rustc_hash::FxHashMap;

use crate::ast::{DeclRef, LoopTarget};
use crate::intern::IdentifierInfo;

/// Behavior flags attached to a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScopeFlags(u8);

impl ScopeFlags {
    pub const NONE: ScopeFlags = ScopeFlags(0);
    /// The scope is a valid `break` target.
    pub const BREAK: ScopeFlags = ScopeFlags(0x1);
    /// The scope is a valid `continue` target.
    pub const CONTINUE: ScopeFlags = ScopeFlags(0x2);
    /// The scope holds a function's parameter list.
    pub const FUNC_PARAMS: ScopeFlags = ScopeFlags(0x4);

    pub fn contains(self, other: ScopeFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for ScopeFlags {
    type Output = ScopeFlags;
    fn bitor(self, rhs: ScopeFlags) -> ScopeFlags {
        ScopeFlags(self.0 | rhs.0)
    }
}

/// A name bound in some scope.
#[derive(Debug, Clone, Copy)]
pub struct Symbol<'a> {
    pub name: &'a IdentifierInfo<'a>,
    pub decl: DeclRef<'a>,
    /// Depth of the owning scope on the stack at binding time.
    pub scope_depth: usize,
}

struct Scope<'a> {
    flags: ScopeFlags,
    /// The loop statement this scope belongs to, for `break`/`continue`.
    statement: Cell<Option<LoopTarget<'a>>>,
    symbols: FxHashMap<usize, Symbol<'a>>,
}

impl<'a> Scope<'a> {
    fn new() -> Self {
        Scope {
            flags: ScopeFlags::NONE,
            statement: Cell::new(None),
            symbols: FxHashMap::default(),
        }
    }
}

fn ident_key(name: &IdentifierInfo<'_>) -> usize {
    name as *const _ as usize
}

/// How many popped scopes are kept around for reuse.
const SCOPE_POOL_SIZE: usize = 64;

pub struct ScopeStack<'a> {
    stack: Vec<Scope<'a>>,
    pool: Vec<Scope<'a>>,
}

impl<'a> Default for ScopeStack<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> ScopeStack<'a> {
    pub fn new() -> Self {
        ScopeStack {
            stack: Vec::new(),
            pool: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn push(&mut self, flags: ScopeFlags) {
        let mut scope = self.pool.pop().unwrap_or_else(Scope::new);
        scope.flags = flags;
        scope.statement.set(None);
        self.stack.push(scope);
    }

    pub fn pop(&mut self) {
        let mut scope = self.stack.pop().expect("scope stack underflow");
        if self.pool.len() < SCOPE_POOL_SIZE {
            scope.symbols.clear();
            self.pool.push(scope);
        }
    }

    /// Attaches the loop statement to the innermost scope.
    pub fn set_statement(&self, target: LoopTarget<'a>) {
        self.stack
            .last()
            .expect("no current scope")
            .statement
            .set(Some(target));
    }

    /// Binds `name` in the innermost scope. The caller has already checked
    /// for duplicates there.
    pub fn add_symbol(&mut self, name: &'a IdentifierInfo<'a>, decl: DeclRef<'a>) {
        let depth = self.stack.len() - 1;
        let scope = self.stack.last_mut().expect("no current scope");
        scope.symbols.insert(
            ident_key(name),
            Symbol {
                name,
                decl,
                scope_depth: depth,
            },
        );
    }

    /// Searches only the innermost scope.
    pub fn local_lookup(&self, name: &'a IdentifierInfo<'a>) -> Option<Symbol<'a>> {
        self.stack
            .last()
            .and_then(|scope| scope.symbols.get(&ident_key(name)).copied())
    }

    /// Walks the scope chain from innermost to outermost.
    pub fn lookup(&self, name: &'a IdentifierInfo<'a>) -> Option<Symbol<'a>> {
        for scope in self.stack.iter().rev() {
            if let Some(symbol) = scope.symbols.get(&ident_key(name)) {
                return Some(*symbol);
            }
        }
        None
    }

    /// Depth of the nearest enclosing scope carrying `flag`, if any.
    pub fn find_with_flag(&self, flag: ScopeFlags) -> Option<usize> {
        self.stack
            .iter()
            .enumerate()
            .rev()
            .find(|(_, scope)| scope.flags.contains(flag))
            .map(|(depth, _)| depth)
    }

    /// The loop statement recorded on the nearest scope carrying `flag`.
    pub fn loop_target_with_flag(&self, flag: ScopeFlags) -> Option<LoopTarget<'a>> {
        let depth = self.find_with_flag(flag)?;
        self.stack[depth].statement.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::VarDecl;
    use crate::intern::IdentifierTable;
    use crate::source::SourceRange;
    use crate::types::TypeCtx;
    use bumpalo::Bump;
    use std::cell::Cell;

    fn var<'a>(
        arena: &'a Bump,
        types: &TypeCtx<'a>,
        name: &'a IdentifierInfo<'a>,
    ) -> &'a VarDecl<'a> {
        arena.alloc(VarDecl {
            name,
            name_range: SourceRange::default(),
            ty: types.i32(),
            init: None,
            used: Cell::new(false),
        })
    }

    #[test]
    fn test_nested_lookup() {
        let arena = Bump::new();
        let types = TypeCtx::new(&arena);
        let idents = IdentifierTable::new(&arena);
        let name = idents.lookup("x");

        let mut scopes = ScopeStack::new();
        scopes.push(ScopeFlags::NONE);
        scopes.add_symbol(name, DeclRef::Var(var(&arena, &types, name)));
        scopes.push(ScopeFlags::NONE);

        assert!(scopes.local_lookup(name).is_none());
        assert!(scopes.lookup(name).is_some());

        scopes.pop();
        assert!(scopes.local_lookup(name).is_some());
    }

    #[test]
    fn test_shadowing_resolves_to_innermost() {
        let arena = Bump::new();
        let types = TypeCtx::new(&arena);
        let idents = IdentifierTable::new(&arena);
        let name = idents.lookup("x");

        let outer = var(&arena, &types, name);
        let inner = var(&arena, &types, name);

        let mut scopes = ScopeStack::new();
        scopes.push(ScopeFlags::NONE);
        scopes.add_symbol(name, DeclRef::Var(outer));
        scopes.push(ScopeFlags::NONE);
        scopes.add_symbol(name, DeclRef::Var(inner));

        let found = scopes.lookup(name).unwrap();
        assert!(found.decl.same_decl(DeclRef::Var(inner)));
        assert_eq!(found.scope_depth, 1);
    }

    #[test]
    fn test_symbols_cleared_on_reuse() {
        let arena = Bump::new();
        let types = TypeCtx::new(&arena);
        let idents = IdentifierTable::new(&arena);
        let name = idents.lookup("x");

        let mut scopes = ScopeStack::new();
        scopes.push(ScopeFlags::NONE);
        scopes.add_symbol(name, DeclRef::Var(var(&arena, &types, name)));
        scopes.pop();

        // The pooled scope must not leak its old symbols.
        scopes.push(ScopeFlags::NONE);
        assert!(scopes.local_lookup(name).is_none());
    }

    #[test]
    fn test_flag_search() {
        let mut scopes = ScopeStack::new();
        scopes.push(ScopeFlags::NONE);
        scopes.push(ScopeFlags::BREAK | ScopeFlags::CONTINUE);
        scopes.push(ScopeFlags::NONE);

        assert_eq!(scopes.find_with_flag(ScopeFlags::BREAK), Some(1));
        assert_eq!(scopes.find_with_flag(ScopeFlags::CONTINUE), Some(1));
        assert_eq!(scopes.find_with_flag(ScopeFlags::FUNC_PARAMS), None);

        scopes.pop();
        scopes.pop();
        assert_eq!(scopes.find_with_flag(ScopeFlags::BREAK), None);
    }
}
