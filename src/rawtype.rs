//! Bound semantic type graph produced by deep loading.
//!
//! `RawType` is the loader's type object: a shared-cell graph mirroring the
//! shape of the language's own type representation. Cells give every node a
//! stable identity for the resolver's cache and let the binder close cycles
//! (`type Tree struct { Parent *Tree }`) by creating a named cell first and
//! filling its underlying type afterwards.
//!
//! The whole generator invocation is single-threaded, so `Rc`/`RefCell`
//! suffice; nothing here is `Send`.

use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

// ============================================================================
// Raw Types
// ============================================================================

/// Identity of a raw type node, derived from its cell address.
///
/// Stable for the lifetime of one loader; used only as a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawTypeId(usize);

impl std::fmt::Display for RawTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "raw_{:x}", self.0)
    }
}

/// A node in the bound type graph. Cheap to clone; clones share the cell.
#[derive(Debug, Clone)]
pub struct RawType {
    cell: Rc<RefCell<RawKind>>,
}

impl RawType {
    /// Create a node with the given kind.
    pub fn new(kind: RawKind) -> Self {
        RawType {
            cell: Rc::new(RefCell::new(kind)),
        }
    }

    /// Create an unresolved placeholder, to be filled by `set`.
    pub fn unresolved() -> Self {
        RawType::new(RawKind::Unresolved)
    }

    /// The node's identity. Two clones of the same node share it.
    pub fn id(&self) -> RawTypeId {
        RawTypeId(Rc::as_ptr(&self.cell) as usize)
    }

    /// Borrow the node's kind.
    ///
    /// Binding is complete before resolution starts, so nested read borrows
    /// during resolver recursion are safe.
    pub fn kind(&self) -> Ref<'_, RawKind> {
        self.cell.borrow()
    }

    /// Replace the node's kind in place. Binder-only.
    pub fn set(&self, kind: RawKind) {
        *self.cell.borrow_mut() = kind;
    }

    /// True if this node is a struct, directly or as a named type's
    /// underlying. Used by pair expansion to select named-struct types.
    pub fn is_struct(&self) -> bool {
        match &*self.kind() {
            RawKind::Struct { .. } => true,
            RawKind::Named { underlying, .. } => {
                matches!(&*underlying.kind(), RawKind::Struct { .. })
            }
            _ => false,
        }
    }
}

/// The shape of a raw type node.
#[derive(Debug, Clone)]
pub enum RawKind {
    /// Placeholder before the binder fills the node.
    Unresolved,
    /// Primitive from the universe scope.
    Basic { name: String },
    /// Struct literal with bound fields.
    Struct { fields: Vec<RawField> },
    /// `*T`
    Pointer(RawType),
    /// `[]T`
    Slice(RawType),
    /// `[N]T`
    Array { len: u64, elem: RawType },
    /// `map[K]V`
    Map { key: RawType, value: RawType },
    /// Channel of any direction.
    Chan(RawType),
    /// Function signature. Opaque.
    Func,
    /// Interface. Opaque.
    Interface,
    /// A declared nominal type (`type T U`). Aliases do not produce this
    /// node; an alias object's type is the aliased node itself.
    Named {
        name: String,
        pkg_path: String,
        underlying: RawType,
    },
}

/// A bound struct field.
#[derive(Debug, Clone)]
pub struct RawField {
    pub name: String,
    pub typ: RawType,
    pub tag: String,
    pub embedded: bool,
}

// ============================================================================
// Type Objects and Scopes
// ============================================================================

/// A declared type name in a package scope.
///
/// For `type T U` the object's type is the `Named` node; for `type T = U`
/// the object's type is the bound `U` itself (aliases are transparent).
#[derive(Debug, Clone)]
pub struct TypeObj {
    inner: Rc<ObjData>,
}

#[derive(Debug)]
struct ObjData {
    name: String,
    pkg_path: String,
    is_alias: bool,
    typ: RefCell<Option<RawType>>,
}

impl TypeObj {
    /// Declare an object; its type is filled by the binder's second pass
    /// (or immediately, for named types whose cell exists up front).
    pub fn new(name: impl Into<String>, pkg_path: impl Into<String>, is_alias: bool) -> Self {
        TypeObj {
            inner: Rc::new(ObjData {
                name: name.into(),
                pkg_path: pkg_path.into(),
                is_alias,
                typ: RefCell::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn pkg_path(&self) -> &str {
        &self.inner.pkg_path
    }

    pub fn is_alias(&self) -> bool {
        self.inner.is_alias
    }

    /// The object's bound type, if binding has reached it.
    pub fn typ(&self) -> Option<RawType> {
        self.inner.typ.borrow().clone()
    }

    /// Bind the object's type. Binder-only.
    pub fn set_typ(&self, typ: RawType) {
        *self.inner.typ.borrow_mut() = Some(typ);
    }
}

/// A deep-loaded package: the exported-scope name lookup.
#[derive(Debug, Clone)]
pub struct PackageTypes {
    /// Import path of the package.
    pub path: String,
    /// Package name from the package clause.
    pub name: String,
    /// All declared type names, exported and not. BTreeMap so iteration
    /// order is deterministic.
    pub scope: BTreeMap<String, TypeObj>,
}

impl PackageTypes {
    /// Look up a declared type name.
    pub fn lookup(&self, name: &str) -> Option<&TypeObj> {
        self.scope.get(name)
    }

    /// Exported names declared as named-struct types (or aliases to
    /// structs), in name order.
    pub fn exported_struct_names(&self) -> Vec<&str> {
        self.scope
            .iter()
            .filter(|(name, obj)| {
                is_exported(name) && obj.typ().map(|t| t.is_struct()).unwrap_or(false)
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Go exportedness: the first character is uppercase.
pub fn is_exported(name: &str) -> bool {
    name.chars().next().map(char::is_uppercase).unwrap_or(false)
}

// ============================================================================
// Universe
// ============================================================================

/// The fixed primitive list recognized without a package qualifier.
pub const PRIMITIVES: &[&str] = &[
    "bool", "string", "byte", "rune", "int", "int8", "int16", "int32", "int64", "uint", "uint8",
    "uint16", "uint32", "uint64", "uintptr", "float32", "float64", "complex64", "complex128",
    "error",
];

/// The universe scope: one shared `Basic` node per primitive name, so every
/// reference to `int` binds to the same cell and the resolver's identity
/// cache collapses them.
#[derive(Debug)]
pub struct Universe {
    map: BTreeMap<&'static str, RawType>,
}

impl Universe {
    pub fn new() -> Self {
        let map = PRIMITIVES
            .iter()
            .map(|&name| {
                (
                    name,
                    RawType::new(RawKind::Basic {
                        name: name.to_string(),
                    }),
                )
            })
            .collect();
        Universe { map }
    }

    /// Look up a primitive by name.
    pub fn lookup(&self, name: &str) -> Option<RawType> {
        self.map.get(name).cloned()
    }
}

impl Default for Universe {
    fn default() -> Self {
        Universe::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
