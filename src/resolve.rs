//! Type resolver: canonical `TypeInfo` nodes over an arena cache.
//!
//! For any fully-qualified name the resolver returns a `TypeId` handle into
//! its arena, constructing nodes recursively from the loader's raw type
//! graph. The cache is keyed by raw-type identity, guaranteeing at most one
//! node per type and termination on cyclic definitions: before recursing
//! into a node's children the resolver allocates an arena slot, publishes
//! its handle into the cache, and populates the slot afterwards, so a
//! recursive hit returns the placeholder handle.
//!
//! Downstream stages hold `TypeId` handles and treat nodes as immutable;
//! the arena is dropped at the end of the invocation.
//!
//! Failed deep loads are memoized in `failed_loads`: a package that failed
//! once fails immediately on every later lookup, preventing cascading
//! retries on broken dependency chains.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use serde::Serialize;
use thiserror::Error;

use crate::loader::{LoadError, PackageLoader};
use crate::rawtype::{is_exported, PackageTypes, RawField, RawKind, RawType, RawTypeId, PRIMITIVES};

// ============================================================================
// Error Type
// ============================================================================

/// Errors during type resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The name does not resolve to a type.
    #[error("type not found: {fqn}")]
    TypeNotFound { fqn: String },

    /// The defining package failed to load.
    #[error(transparent)]
    Load(#[from] LoadError),
}

// ============================================================================
// Data Model
// ============================================================================

/// Handle to a `TypeInfo` node in the resolver's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeId(u32);

impl std::fmt::Display for TypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "type_{}", self.0)
    }
}

/// The closed kind set.
///
/// `Named` is the sentinel for `type T U` wrapping a non-struct underlying
/// type; a named struct's kind is `Struct` directly, so fields are
/// accessible without dereferencing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TypeKind {
    Unknown,
    Primitive,
    Struct,
    Interface,
    Map,
    Chan,
    Func,
    Slice,
    Array,
    Pointer,
    Named,
}

/// The canonical type node. `(import_path, name)` is the identity of a
/// named type; anonymous composites have both empty.
#[derive(Debug, Clone)]
pub struct TypeInfo {
    /// Simple (unqualified) name; empty for anonymous composites.
    pub name: String,
    /// Defining package path; empty for primitives and anonymous
    /// composites.
    pub import_path: String,
    pub kind: TypeKind,
    /// True iff this node represents `type T = U` rather than `type T U`.
    pub is_alias: bool,
    /// Element type for `Pointer | Slice | Array | Chan`, value type for
    /// `Map`, the underlying non-named type for `Named`.
    pub underlying: Option<TypeId>,
    /// Present only for `Map`.
    pub key_type: Option<TypeId>,
    /// Present only for `Array`.
    pub array_len: Option<u64>,
    /// Present only for structs: exported fields with embedded contents
    /// promoted.
    pub fields: Vec<FieldInfo>,
    /// Back-reference to the loader's type object; identity only.
    pub original: Option<RawTypeId>,
}

impl TypeInfo {
    fn blank(kind: TypeKind) -> Self {
        TypeInfo {
            name: String::new(),
            import_path: String::new(),
            kind,
            is_alias: false,
            underlying: None,
            key_type: None,
            array_len: None,
            fields: Vec::new(),
            original: None,
        }
    }
}

/// One struct field.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub typ: TypeId,
    /// Free-form tag metadata; empty when absent.
    pub tag: String,
    /// True only for the synthetic promoted entry referring to the
    /// embedding type itself.
    pub is_embedded: bool,
}

/// Arena of resolved nodes, owned by the resolver.
#[derive(Debug, Default)]
pub struct TypeArena {
    nodes: Vec<TypeInfo>,
}

impl TypeArena {
    fn alloc(&mut self, info: TypeInfo) -> TypeId {
        let id = TypeId(self.nodes.len() as u32);
        self.nodes.push(info);
        id
    }

    /// Borrow a node. Handles are only minted by this arena, so lookups
    /// cannot miss.
    pub fn get(&self, id: TypeId) -> &TypeInfo {
        &self.nodes[id.0 as usize]
    }

    fn get_mut(&mut self, id: TypeId) -> &mut TypeInfo {
        &mut self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

// ============================================================================
// FQN Utilities
// ============================================================================

/// Split `package_path.TypeName` at the last dot. A dotless input has no
/// package part (a primitive).
pub fn split_fqn(fqn: &str) -> (Option<&str>, &str) {
    match fqn.rsplit_once('.') {
        Some((pkg, name)) if !pkg.is_empty() => (Some(pkg), name),
        _ => (None, fqn),
    }
}

/// Numeric conversion families: any two primitives in the same family
/// convert with a cast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericClass {
    /// Integers and floats, including `byte`, `rune`, and `uintptr`.
    Real,
    Complex,
}

/// The numeric class of a primitive name, if it is numeric.
pub fn numeric_class(name: &str) -> Option<NumericClass> {
    match name {
        "int" | "int8" | "int16" | "int32" | "int64" | "uint" | "uint8" | "uint16" | "uint32"
        | "uint64" | "uintptr" | "byte" | "rune" | "float32" | "float64" => {
            Some(NumericClass::Real)
        }
        "complex64" | "complex128" => Some(NumericClass::Complex),
        _ => None,
    }
}

// ============================================================================
// Resolver
// ============================================================================

/// The type resolver. Owns the loader for the rest of the pipeline, the
/// arena, and the caches.
pub struct Resolver<L: PackageLoader> {
    loader: L,
    arena: TypeArena,
    /// Raw identity to canonical node.
    cache: HashMap<RawTypeId, TypeId>,
    /// `(import_path, name)` to node, for named types and aliases.
    named: HashMap<(String, String), TypeId>,
    primitives: BTreeMap<&'static str, TypeId>,
    failed_loads: HashSet<String>,
}

impl<L: PackageLoader> Resolver<L> {
    pub fn new(loader: L) -> Self {
        let mut arena = TypeArena::default();
        let primitives = PRIMITIVES
            .iter()
            .map(|&name| {
                let mut info = TypeInfo::blank(TypeKind::Primitive);
                info.name = name.to_string();
                (name, arena.alloc(info))
            })
            .collect();
        Resolver {
            loader,
            arena,
            cache: HashMap::new(),
            named: HashMap::new(),
            primitives,
            failed_loads: HashSet::new(),
        }
    }

    pub fn arena(&self) -> &TypeArena {
        &self.arena
    }

    pub fn get(&self, id: TypeId) -> &TypeInfo {
        self.arena.get(id)
    }

    /// Packages whose deep load failed; lookups into them fail immediately.
    pub fn failed_loads(&self) -> &HashSet<String> {
        &self.failed_loads
    }

    /// Resolve a fully-qualified name.
    pub fn resolve_fqn(&mut self, fqn: &str) -> Result<TypeId, ResolveError> {
        match split_fqn(fqn) {
            (Some(pkg), name) => self.resolve(pkg, name),
            (None, name) => self.resolve("", name),
        }
    }

    /// Resolve `(package_path, type_name)`. An empty package path resolves
    /// primitives only.
    pub fn resolve(&mut self, pkg_path: &str, name: &str) -> Result<TypeId, ResolveError> {
        if pkg_path.is_empty() {
            return self
                .primitives
                .get(name)
                .copied()
                .ok_or_else(|| ResolveError::TypeNotFound {
                    fqn: name.to_string(),
                });
        }
        let key = (pkg_path.to_string(), name.to_string());
        if let Some(&id) = self.named.get(&key) {
            return Ok(id);
        }

        let pkg = self.ensure_package(pkg_path)?;
        let not_found = || ResolveError::TypeNotFound {
            fqn: format!("{}.{}", pkg_path, name),
        };
        let obj = pkg.lookup(name).cloned().ok_or_else(|| not_found())?;
        let raw = obj.typ().ok_or_else(|| not_found())?;

        let id = if obj.is_alias() {
            // The alias gets its own node carrying the alias identity;
            // structure is copied from the aliased type. Publish the handle
            // first so self-referential chains terminate.
            let mut info = TypeInfo::blank(TypeKind::Unknown);
            info.name = name.to_string();
            info.import_path = pkg_path.to_string();
            info.is_alias = true;
            info.original = Some(raw.id());
            let alias_id = self.arena.alloc(info);
            self.named.insert(key, alias_id);

            let rhs = self.resolve_raw(&raw)?;
            let rhs_node = self.arena.get(rhs).clone();
            let node = self.arena.get_mut(alias_id);
            node.kind = rhs_node.kind;
            node.underlying = rhs_node.underlying;
            node.key_type = rhs_node.key_type;
            node.array_len = rhs_node.array_len;
            node.fields = rhs_node.fields;
            alias_id
        } else {
            let id = self.resolve_raw(&raw)?;
            self.named.insert(key, id);
            id
        };
        Ok(id)
    }

    /// Exported names declared as named-struct types in a package, in name
    /// order. Used by pair expansion.
    pub fn exported_struct_names(&mut self, pkg_path: &str) -> Result<Vec<String>, ResolveError> {
        let pkg = self.ensure_package(pkg_path)?;
        Ok(pkg
            .exported_struct_names()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// The canonical node for matching: aliases resolve to the node they
    /// alias; everything else is itself.
    pub fn canonical(&self, id: TypeId) -> TypeId {
        let node = self.arena.get(id);
        if node.is_alias {
            if let Some(target) = node.original.and_then(|raw| self.cache.get(&raw)) {
                return *target;
            }
        }
        id
    }

    /// The structural view of a node: a `Named` wrapper gives way to its
    /// underlying type, everything else is itself.
    pub fn structural(&self, id: TypeId) -> TypeId {
        let node = self.arena.get(id);
        match node.kind {
            TypeKind::Named => node.underlying.unwrap_or(id),
            _ => id,
        }
    }

    /// The `package_path.Name` identity of a node, `Name` alone for
    /// primitives; `None` for anonymous composites.
    pub fn fqn_of(&self, id: TypeId) -> Option<String> {
        let node = self.arena.get(id);
        if node.name.is_empty() {
            return None;
        }
        if node.import_path.is_empty() {
            Some(node.name.clone())
        } else {
            Some(format!("{}.{}", node.import_path, node.name))
        }
    }

    fn ensure_package(&mut self, path: &str) -> Result<Rc<PackageTypes>, ResolveError> {
        if self.failed_loads.contains(path) {
            return Err(ResolveError::Load(LoadError::NotFound {
                path: path.to_string(),
            }));
        }
        match self.loader.load_deep(path) {
            Ok(pkg) => Ok(pkg),
            Err(err) => {
                tracing::warn!(package = path, error = %err, "deep load failed");
                self.failed_loads.insert(path.to_string());
                Err(ResolveError::Load(err))
            }
        }
    }

    /// Resolve a raw node to its canonical `TypeInfo`, placeholder-first.
    fn resolve_raw(&mut self, raw: &RawType) -> Result<TypeId, ResolveError> {
        let raw_id = raw.id();
        if let Some(&id) = self.cache.get(&raw_id) {
            return Ok(id);
        }
        let kind = raw.kind().clone();
        match kind {
            RawKind::Basic { name } => {
                let id = self
                    .primitives
                    .get(name.as_str())
                    .copied()
                    .unwrap_or_else(|| self.arena.alloc(TypeInfo::blank(TypeKind::Unknown)));
                self.cache.insert(raw_id, id);
                Ok(id)
            }
            RawKind::Unresolved => {
                let id = self.arena.alloc(TypeInfo::blank(TypeKind::Unknown));
                self.cache.insert(raw_id, id);
                Ok(id)
            }
            RawKind::Named {
                name,
                pkg_path,
                underlying,
            } => {
                let ukind = underlying.kind().clone();
                match ukind {
                    RawKind::Struct { fields } => {
                        // Named struct: kind is Struct directly, fields
                        // populated without indirection.
                        let mut info = TypeInfo::blank(TypeKind::Struct);
                        info.name = name;
                        info.import_path = pkg_path;
                        info.original = Some(raw_id);
                        let id = self.arena.alloc(info);
                        self.cache.insert(raw_id, id);
                        let resolved = self.build_struct_fields(&fields)?;
                        self.arena.get_mut(id).fields = resolved;
                        Ok(id)
                    }
                    RawKind::Unresolved => {
                        // Opaque external named type: identity without
                        // structure.
                        let mut info = TypeInfo::blank(TypeKind::Unknown);
                        info.name = name;
                        info.import_path = pkg_path;
                        info.original = Some(raw_id);
                        let id = self.arena.alloc(info);
                        self.cache.insert(raw_id, id);
                        Ok(id)
                    }
                    _ => {
                        let mut info = TypeInfo::blank(TypeKind::Named);
                        info.name = name;
                        info.import_path = pkg_path;
                        info.original = Some(raw_id);
                        let id = self.arena.alloc(info);
                        self.cache.insert(raw_id, id);
                        let uid = self.resolve_raw(&underlying)?;
                        self.arena.get_mut(id).underlying = Some(uid);
                        Ok(id)
                    }
                }
            }
            RawKind::Struct { fields } => {
                let id = self.arena.alloc(TypeInfo::blank(TypeKind::Struct));
                self.cache.insert(raw_id, id);
                let resolved = self.build_struct_fields(&fields)?;
                self.arena.get_mut(id).fields = resolved;
                Ok(id)
            }
            RawKind::Pointer(elem) => self.composite(raw_id, TypeKind::Pointer, &elem, None, None),
            RawKind::Slice(elem) => self.composite(raw_id, TypeKind::Slice, &elem, None, None),
            RawKind::Chan(elem) => self.composite(raw_id, TypeKind::Chan, &elem, None, None),
            RawKind::Array { len, elem } => {
                self.composite(raw_id, TypeKind::Array, &elem, None, Some(len))
            }
            RawKind::Map { key, value } => {
                self.composite(raw_id, TypeKind::Map, &value, Some(key), None)
            }
            RawKind::Func => {
                let id = self.arena.alloc(TypeInfo::blank(TypeKind::Func));
                self.cache.insert(raw_id, id);
                Ok(id)
            }
            RawKind::Interface => {
                let id = self.arena.alloc(TypeInfo::blank(TypeKind::Interface));
                self.cache.insert(raw_id, id);
                Ok(id)
            }
        }
    }

    /// Anonymous composite node: placeholder first, then element types.
    fn composite(
        &mut self,
        raw_id: RawTypeId,
        kind: TypeKind,
        elem: &RawType,
        key: Option<RawType>,
        array_len: Option<u64>,
    ) -> Result<TypeId, ResolveError> {
        let mut info = TypeInfo::blank(kind);
        info.array_len = array_len;
        let id = self.arena.alloc(info);
        self.cache.insert(raw_id, id);
        let elem_id = self.resolve_raw(elem)?;
        self.arena.get_mut(id).underlying = Some(elem_id);
        if let Some(key) = key {
            let key_id = self.resolve_raw(&key)?;
            self.arena.get_mut(id).key_type = Some(key_id);
        }
        Ok(id)
    }

    /// Resolve a struct's field list with embedded promotion.
    ///
    /// An embedded field whose type is a struct (through at most one
    /// pointer, per the language's promotion rule) contributes its exported
    /// fields flattened at the embedding position. Conflicts keep the
    /// outer-level field; unexported names never appear.
    fn build_struct_fields(
        &mut self,
        raw_fields: &[RawField],
    ) -> Result<Vec<FieldInfo>, ResolveError> {
        let outer_named: HashSet<&str> = raw_fields
            .iter()
            .filter(|f| !f.embedded)
            .map(|f| f.name.as_str())
            .collect();
        let mut fields: Vec<FieldInfo> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        for field in raw_fields {
            if field.embedded {
                let id = self.resolve_raw(&field.typ)?;
                if is_exported(&field.name)
                    && !outer_named.contains(field.name.as_str())
                    && seen.insert(field.name.clone())
                {
                    fields.push(FieldInfo {
                        name: field.name.clone(),
                        typ: id,
                        tag: field.tag.clone(),
                        is_embedded: true,
                    });
                }
                if let Some(struct_id) = self.promotable_struct(id) {
                    let promoted = self.arena.get(struct_id).fields.clone();
                    for entry in promoted {
                        if outer_named.contains(entry.name.as_str()) {
                            continue;
                        }
                        if !seen.insert(entry.name.clone()) {
                            continue;
                        }
                        fields.push(entry);
                    }
                }
            } else {
                if !is_exported(&field.name) {
                    continue;
                }
                let id = self.resolve_raw(&field.typ)?;
                if seen.insert(field.name.clone()) {
                    fields.push(FieldInfo {
                        name: field.name.clone(),
                        typ: id,
                        tag: field.tag.clone(),
                        is_embedded: false,
                    });
                }
            }
        }
        Ok(fields)
    }

    /// The struct node an embedded field promotes from, unwrapping one
    /// pointer level.
    fn promotable_struct(&self, id: TypeId) -> Option<TypeId> {
        let node = self.arena.get(id);
        match node.kind {
            TypeKind::Struct => Some(id),
            TypeKind::Pointer => {
                let uid = node.underlying?;
                (self.arena.get(uid).kind == TypeKind::Struct).then_some(uid)
            }
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ModuleFixture;

    fn resolver(fixture: &ModuleFixture) -> Resolver<crate::loader::DirLoader> {
        Resolver::new(fixture.loader())
    }

    mod primitives {
        use super::*;

        #[test]
        fn primitives_are_singletons() {
            let fixture = ModuleFixture::new("example.com/app");
            let mut r = resolver(&fixture);
            let a = r.resolve("", "int").expect("int");
            let b = r.resolve_fqn("int").expect("int");
            assert_eq!(a, b);
            assert_eq!(r.get(a).kind, TypeKind::Primitive);
            assert_eq!(r.get(a).name, "int");
        }

        #[test]
        fn unknown_primitive_is_not_found() {
            let fixture = ModuleFixture::new("example.com/app");
            let mut r = resolver(&fixture);
            assert!(matches!(
                r.resolve("", "void"),
                Err(ResolveError::TypeNotFound { .. })
            ));
        }

        #[test]
        fn error_is_in_the_universe() {
            let fixture = ModuleFixture::new("example.com/app");
            let mut r = resolver(&fixture);
            let id = r.resolve("", "error").expect("error");
            assert_eq!(r.get(id).kind, TypeKind::Primitive);
        }
    }

    mod named_types {
        use super::*;

        #[test]
        fn named_struct_has_kind_struct_directly() {
            let fixture = ModuleFixture::new("example.com/app");
            fixture.package(
                "a",
                &[(
                    "a.go",
                    "package a\n\ntype User struct {\n\tID int64\n\tName string\n\tsecret string\n}\n",
                )],
            );
            let mut r = resolver(&fixture);
            let id = r.resolve_fqn("example.com/app/a.User").expect("resolve");
            let node = r.get(id);
            assert_eq!(node.kind, TypeKind::Struct);
            assert_eq!(node.name, "User");
            assert_eq!(node.import_path, "example.com/app/a");
            assert!(!node.is_alias);
            let names: Vec<&str> = node.fields.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(names, vec!["ID", "Name"]);
        }

        #[test]
        fn named_non_struct_uses_named_sentinel() {
            let fixture = ModuleFixture::new("example.com/app");
            fixture.package("a", &[("a.go", "package a\n\ntype ID int64\n")]);
            let mut r = resolver(&fixture);
            let id = r.resolve_fqn("example.com/app/a.ID").expect("resolve");
            let node = r.get(id);
            assert_eq!(node.kind, TypeKind::Named);
            let underlying = node.underlying.expect("underlying");
            assert_eq!(r.get(underlying).kind, TypeKind::Primitive);
            assert_eq!(r.get(underlying).name, "int64");
        }

        #[test]
        fn triple_pointer_chain() {
            let fixture = ModuleFixture::new("example.com/app");
            fixture.package(
                "a",
                &[(
                    "a.go",
                    "package a\n\ntype BaseStruct struct{ ID int }\ntype TriplePtr ***BaseStruct\n",
                )],
            );
            let mut r = resolver(&fixture);
            let id = r.resolve_fqn("example.com/app/a.TriplePtr").expect("resolve");
            assert_eq!(r.get(id).kind, TypeKind::Named);
            let mut cur = r.get(id).underlying.expect("underlying");
            for _ in 0..3 {
                assert_eq!(r.get(cur).kind, TypeKind::Pointer);
                cur = r.get(cur).underlying.expect("pointer element");
            }
            assert_eq!(r.get(cur).kind, TypeKind::Struct);
            assert_eq!(r.get(cur).name, "BaseStruct");
        }

        #[test]
        fn defined_map_of_pointers() {
            let fixture = ModuleFixture::new("example.com/app");
            fixture.package(
                "a",
                &[(
                    "a.go",
                    "package a\n\ntype BaseStruct struct{ ID int }\ntype DefinedMap map[string]*BaseStruct\n",
                )],
            );
            let mut r = resolver(&fixture);
            let id = r.resolve_fqn("example.com/app/a.DefinedMap").expect("resolve");
            let node = r.get(id);
            assert_eq!(node.kind, TypeKind::Named);
            let map = r.get(node.underlying.expect("underlying"));
            assert_eq!(map.kind, TypeKind::Map);
            assert_eq!(r.get(map.key_type.expect("key")).name, "string");
            let value = r.get(map.underlying.expect("value"));
            assert_eq!(value.kind, TypeKind::Pointer);
            assert_eq!(r.get(value.underlying.expect("elem")).name, "BaseStruct");
        }
    }

    mod aliases {
        use super::*;

        #[test]
        fn alias_to_external_struct_copies_structure() {
            let fixture = ModuleFixture::new("example.com/app");
            fixture
                .package(
                    "ext",
                    &[("ext.go", "package ext\n\ntype User struct {\n\tID int64\n\tName string\n}\n")],
                )
                .package(
                    "src",
                    &[(
                        "src.go",
                        "package src\n\nimport \"example.com/app/ext\"\n\ntype UserAlias = ext.User\n",
                    )],
                );
            let mut r = resolver(&fixture);
            let id = r.resolve_fqn("example.com/app/src.UserAlias").expect("resolve");
            let node = r.get(id);
            assert!(node.is_alias);
            assert_eq!(node.name, "UserAlias");
            assert_eq!(node.import_path, "example.com/app/src");
            assert_eq!(node.kind, TypeKind::Struct);
            let names: Vec<&str> = node.fields.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(names, vec!["ID", "Name"]);

            // Canonicalization lands on the aliased named type.
            let ext = r.resolve_fqn("example.com/app/ext.User").expect("resolve");
            assert_eq!(r.canonical(id), ext);
            assert_eq!(r.canonical(ext), ext);
        }
    }

    mod interning {
        use super::*;

        #[test]
        fn resolution_is_idempotent_by_identity() {
            let fixture = ModuleFixture::new("example.com/app");
            fixture.package("a", &[("a.go", "package a\n\ntype User struct{ ID int }\n")]);
            let mut r = resolver(&fixture);
            let first = r.resolve_fqn("example.com/app/a.User").expect("resolve");
            let second = r.resolve_fqn("example.com/app/a.User").expect("resolve");
            assert_eq!(first, second);
        }

        #[test]
        fn field_reference_and_direct_resolution_share_a_node() {
            let fixture = ModuleFixture::new("example.com/app");
            fixture.package(
                "a",
                &[(
                    "a.go",
                    "package a\n\ntype Role struct{ ID int }\ntype User struct{ Role Role }\n",
                )],
            );
            let mut r = resolver(&fixture);
            let user = r.resolve_fqn("example.com/app/a.User").expect("resolve");
            let via_field = r.get(user).fields[0].typ;
            let direct = r.resolve_fqn("example.com/app/a.Role").expect("resolve");
            assert_eq!(via_field, direct);
        }
    }

    mod cycles {
        use super::*;

        #[test]
        fn self_referential_struct_terminates() {
            let fixture = ModuleFixture::new("example.com/app");
            fixture.package(
                "a",
                &[(
                    "a.go",
                    "package a\n\ntype Tree struct {\n\tParent *Tree\n\tName string\n}\n",
                )],
            );
            let mut r = resolver(&fixture);
            let tree = r.resolve_fqn("example.com/app/a.Tree").expect("resolve");
            let parent = &r.get(tree).fields[0];
            assert_eq!(parent.name, "Parent");
            let ptr = r.get(parent.typ);
            assert_eq!(ptr.kind, TypeKind::Pointer);
            assert_eq!(ptr.underlying, Some(tree));
        }

        #[test]
        fn mutual_recursion_terminates() {
            let fixture = ModuleFixture::new("example.com/app");
            fixture.package(
                "a",
                &[(
                    "a.go",
                    "package a\n\ntype Node struct {\n\tEdges []*Edge\n}\ntype Edge struct {\n\tFrom *Node\n\tTo *Node\n}\n",
                )],
            );
            let mut r = resolver(&fixture);
            let node = r.resolve_fqn("example.com/app/a.Node").expect("resolve");
            let edge = r.resolve_fqn("example.com/app/a.Edge").expect("resolve");
            let edges = r.get(r.get(node).fields[0].typ);
            assert_eq!(edges.kind, TypeKind::Slice);
            let elem = r.get(edges.underlying.expect("elem"));
            assert_eq!(elem.kind, TypeKind::Pointer);
            assert_eq!(elem.underlying, Some(edge));
        }
    }

    mod embedding {
        use super::*;

        #[test]
        fn embedded_struct_promotes_exported_fields() {
            let fixture = ModuleFixture::new("example.com/app");
            fixture.package(
                "a",
                &[(
                    "a.go",
                    "package a\n\ntype Base struct {\n\tID int64\n\tname string\n}\ntype User struct {\n\tBase\n\tEmail string\n}\n",
                )],
            );
            let mut r = resolver(&fixture);
            let user = r.resolve_fqn("example.com/app/a.User").expect("resolve");
            let fields = &r.get(user).fields;
            let names: Vec<(&str, bool)> = fields
                .iter()
                .map(|f| (f.name.as_str(), f.is_embedded))
                .collect();
            assert_eq!(
                names,
                vec![("Base", true), ("ID", false), ("Email", false)]
            );
        }

        #[test]
        fn outer_field_wins_conflicts() {
            let fixture = ModuleFixture::new("example.com/app");
            fixture.package(
                "a",
                &[(
                    "a.go",
                    "package a\n\ntype Base struct {\n\tID int64\n\tExtra string\n}\ntype User struct {\n\tBase\n\tID string\n}\n",
                )],
            );
            let mut r = resolver(&fixture);
            let user = r.resolve_fqn("example.com/app/a.User").expect("resolve");
            let fields = &r.get(user).fields;
            let id_field = fields.iter().find(|f| f.name == "ID").expect("ID");
            // The outer string field, not the embedded int64.
            assert_eq!(r.get(id_field.typ).name, "string");
            assert_eq!(fields.iter().filter(|f| f.name == "ID").count(), 1);
            assert!(fields.iter().any(|f| f.name == "Extra"));
        }

        #[test]
        fn pointer_embedding_promotes() {
            let fixture = ModuleFixture::new("example.com/app");
            fixture.package(
                "a",
                &[(
                    "a.go",
                    "package a\n\ntype Meta struct{ Version int }\ntype Doc struct {\n\t*Meta\n\tBody string\n}\n",
                )],
            );
            let mut r = resolver(&fixture);
            let doc = r.resolve_fqn("example.com/app/a.Doc").expect("resolve");
            let names: Vec<&str> = r.get(doc).fields.iter().map(|f| f.name.as_str()).collect();
            assert_eq!(names, vec!["Meta", "Version", "Body"]);
        }

        #[test]
        fn non_struct_embeds_are_skipped() {
            let fixture = ModuleFixture::new("example.com/app");
            fixture.package(
                "a",
                &[(
                    "a.go",
                    "package a\n\ntype Counter int\ntype Wrapper struct {\n\tCounter\n\tLabel string\n}\n",
                )],
            );
            let mut r = resolver(&fixture);
            let wrapper = r.resolve_fqn("example.com/app/a.Wrapper").expect("resolve");
            let names: Vec<&str> = r
                .get(wrapper)
                .fields
                .iter()
                .map(|f| f.name.as_str())
                .collect();
            // The embedded entry appears; nothing promotes out of it.
            assert_eq!(names, vec!["Counter", "Label"]);
        }
    }

    mod failures {
        use super::*;

        #[test]
        fn missing_type_in_existing_package() {
            let fixture = ModuleFixture::new("example.com/app");
            fixture.package("a", &[("a.go", "package a\n\ntype User struct{ ID int }\n")]);
            let mut r = resolver(&fixture);
            let err = r.resolve_fqn("example.com/app/a.Ghost").unwrap_err();
            assert!(matches!(err, ResolveError::TypeNotFound { .. }));
        }

        #[test]
        fn failed_load_is_memoized() {
            let fixture = ModuleFixture::new("example.com/app");
            let mut r = resolver(&fixture);
            let err = r.resolve_fqn("example.com/app/ghost.T").unwrap_err();
            assert!(matches!(err, ResolveError::Load(_)));
            assert!(r.failed_loads().contains("example.com/app/ghost"));
            // The second lookup fails immediately from the memo.
            let err = r.resolve_fqn("example.com/app/ghost.U").unwrap_err();
            assert!(matches!(err, ResolveError::Load(LoadError::NotFound { .. })));
        }
    }

    mod fqn {
        use super::*;

        #[test]
        fn split_takes_the_last_dot() {
            assert_eq!(
                split_fqn("example.com/app/a.User"),
                (Some("example.com/app/a"), "User")
            );
            assert_eq!(split_fqn("time.Time"), (Some("time"), "Time"));
            assert_eq!(split_fqn("int"), (None, "int"));
        }

        #[test]
        fn numeric_classes() {
            assert_eq!(numeric_class("int32"), Some(NumericClass::Real));
            assert_eq!(numeric_class("byte"), Some(NumericClass::Real));
            assert_eq!(numeric_class("complex64"), Some(NumericClass::Complex));
            assert_eq!(numeric_class("string"), None);
            assert_eq!(numeric_class("bool"), None);
        }
    }
}
