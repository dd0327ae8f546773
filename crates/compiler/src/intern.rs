//! Identifier interning
//!
//! Every distinct spelling maps to exactly one [`IdentifierInfo`] allocated
//! from the compilation arena, so callers may compare identifiers by address.
//! The record also carries a token kind: `Identifier` for ordinary names, or
//! the keyword kind once [`IdentifierTable::register_keywords`] has run. The
//! map itself may grow and rehash freely; the records it points at never move.

use std::cell::{Cell, RefCell};

use bumpalo::Bump;
use rustc_hash::FxHashMap;

use crate::token::{KEYWORDS, TokenKind};

/// The canonical record for one identifier spelling.
pub struct IdentifierInfo<'a> {
    spelling: &'a str,
    /// `TokenKind::Identifier`, or a keyword kind after keyword registration.
    token_kind: Cell<TokenKind>,
}

impl<'a> IdentifierInfo<'a> {
    pub fn spelling(&self) -> &'a str {
        self.spelling
    }

    pub fn token_kind(&self) -> TokenKind {
        self.token_kind.get()
    }

    pub fn is_keyword(&self) -> bool {
        self.token_kind.get().is_keyword()
    }
}

impl std::fmt::Debug for IdentifierInfo<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "IdentifierInfo({:?})", self.spelling)
    }
}

/// Compares two identifier records for identity.
pub fn same_identifier<'a>(a: &'a IdentifierInfo<'a>, b: &'a IdentifierInfo<'a>) -> bool {
    std::ptr::eq(a, b)
}

/// Interning table from spelling bytes to stable identifier records.
pub struct IdentifierTable<'a> {
    arena: &'a Bump,
    map: RefCell<FxHashMap<&'a str, &'a IdentifierInfo<'a>>>,
}

impl<'a> IdentifierTable<'a> {
    pub fn new(arena: &'a Bump) -> Self {
        IdentifierTable {
            arena,
            map: RefCell::new(FxHashMap::default()),
        }
    }

    /// Returns the unique record for `spelling`, creating it on first use.
    pub fn lookup(&self, spelling: &str) -> &'a IdentifierInfo<'a> {
        if let Some(info) = self.map.borrow().get(spelling).copied() {
            return info;
        }

        let spelling = self.arena.alloc_str(spelling) as &'a str;
        let info: &'a IdentifierInfo<'a> = self.arena.alloc(IdentifierInfo {
            spelling,
            token_kind: Cell::new(TokenKind::Identifier),
        });
        self.map.borrow_mut().insert(spelling, info);
        info
    }

    /// Interns every keyword spelling and patches its record to the matching
    /// keyword kind. Must run before lexing if keywords are to be recognized.
    pub fn register_keywords(&self) {
        for &(spelling, kind) in KEYWORDS {
            self.lookup(spelling).token_kind.set(kind);
        }
    }

    pub fn len(&self) -> usize {
        self.map.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_returns_same_record_for_same_spelling() {
        let arena = Bump::new();
        let table = IdentifierTable::new(&arena);
        let a = table.lookup("hello");
        let b = table.lookup("hello");
        assert!(same_identifier(a, b));
        assert_eq!(a.spelling(), "hello");
    }

    #[test]
    fn test_lookup_distinct_spellings() {
        let arena = Bump::new();
        let table = IdentifierTable::new(&arena);
        let a = table.lookup("foo");
        let b = table.lookup("bar");
        assert!(!same_identifier(a, b));
    }

    #[test]
    fn test_records_survive_table_growth() {
        let arena = Bump::new();
        let table = IdentifierTable::new(&arena);
        let first = table.lookup("stable");
        // Force many insertions so the map rehashes a few times.
        for i in 0..10_000 {
            table.lookup(&format!("ident{i}"));
        }
        let again = table.lookup("stable");
        assert!(same_identifier(first, again));
        assert_eq!(first.spelling(), "stable");
    }

    #[test]
    fn test_register_keywords() {
        let arena = Bump::new();
        let table = IdentifierTable::new(&arena);
        let pre = table.lookup("while");
        assert_eq!(pre.token_kind(), TokenKind::Identifier);

        table.register_keywords();
        let post = table.lookup("while");
        assert!(same_identifier(pre, post));
        assert_eq!(post.token_kind(), TokenKind::KwWhile);
        assert!(post.is_keyword());

        // Non-keyword spellings stay plain identifiers.
        assert_eq!(table.lookup("whilst").token_kind(), TokenKind::Identifier);
    }
}
