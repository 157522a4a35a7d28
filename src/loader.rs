//! Staged package loading.
//!
//! The resolver consumes the [`PackageLoader`] capability with two
//! operations: `load_shallow` returns syntax trees and import tables
//! (enough for directive scanning, tolerant of unresolved references), and
//! `load_deep` returns fully bound declarations including transitive
//! imports.
//!
//! [`DirLoader`] is the shipped implementation over a Go module directory:
//! package paths map to directories under the `go.mod` module root, one
//! package per directory. Imports that point outside the module (standard
//! library, third-party) bind to opaque external named types that keep
//! their `(import_path, name)` identity, so exact-type matching and custom
//! rules still work on them; their structure is unknown and field-level
//! recursion into them reports as unhandled.
//!
//! Both stages memoize per package path. Deep loading detects import
//! cycles.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;
use walkdir::WalkDir;

use crate::output::GENERATED_SUFFIX;
use crate::parse::{parse_file, ParseError};
use crate::rawtype::{PackageTypes, RawField, RawKind, RawType, TypeObj, Universe};
use crate::syntax::{PackageSyntax, SourceFile, TypeDecl, TypeExpr};

// ============================================================================
// Error Type
// ============================================================================

/// Errors during package loading.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No package directory (or no buildable files) for the path.
    #[error("package {path} not found")]
    NotFound { path: String },

    /// The path does not belong to the loaded module.
    #[error("package {path} is outside module {module}")]
    OutsideModule { path: String, module: String },

    /// No `go.mod` above the source directory.
    #[error("no go.mod found above {path}")]
    NoModule { path: String },

    /// A source file failed to parse.
    #[error("package {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ParseError,
    },

    /// Binding failed: undefined names, conflicting declarations.
    #[error("package {path}: {message}")]
    Check { path: String, message: String },

    /// Import cycle through the path.
    #[error("import cycle through package {path}")]
    Cycle { path: String },

    /// Filesystem error.
    #[error("package {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    /// The package path the error is about.
    pub fn path(&self) -> &str {
        match self {
            LoadError::NotFound { path }
            | LoadError::OutsideModule { path, .. }
            | LoadError::NoModule { path }
            | LoadError::Parse { path, .. }
            | LoadError::Check { path, .. }
            | LoadError::Cycle { path }
            | LoadError::Io { path, .. } => path,
        }
    }

    /// Human-readable cause, without the package path prefix.
    pub fn cause_text(&self) -> String {
        match self {
            LoadError::NotFound { .. } => "package not found".to_string(),
            LoadError::OutsideModule { module, .. } => {
                format!("outside module {}", module)
            }
            LoadError::NoModule { .. } => "no go.mod found".to_string(),
            LoadError::Parse { source, .. } => source.to_string(),
            LoadError::Check { message, .. } => message.clone(),
            LoadError::Cycle { .. } => "import cycle".to_string(),
            LoadError::Io { source, .. } => source.to_string(),
        }
    }
}

// ============================================================================
// Capability Trait
// ============================================================================

/// Staged package loading capability.
///
/// Implementations memoize internally; repeated loads of the same path are
/// cheap. Returned packages are shared and treated as immutable.
pub trait PackageLoader {
    /// Load syntax trees and import tables. Tolerates unresolved type
    /// references; directive files may mention types that do not exist yet.
    fn load_shallow(&mut self, pkg_path: &str) -> Result<Rc<PackageSyntax>, LoadError>;

    /// Load fully bound declarations, deep-loading transitive imports
    /// first. Fails on parse errors, undefined names, and import cycles.
    fn load_deep(&mut self, pkg_path: &str) -> Result<Rc<PackageTypes>, LoadError>;
}

// ============================================================================
// DirLoader
// ============================================================================

/// Filesystem loader for one Go module.
#[derive(Debug)]
pub struct DirLoader {
    module: String,
    root: PathBuf,
    universe: Universe,
    shallow: HashMap<String, Rc<PackageSyntax>>,
    deep: HashMap<String, Rc<PackageTypes>>,
    loading: HashSet<String>,
    /// Interned opaque types for imports outside the module, keyed by
    /// `(import_path, name)` so identity-based matching holds across
    /// referencing packages.
    externals: HashMap<(String, String), RawType>,
}

impl DirLoader {
    /// Create a loader for the module containing `dir`, walking up to the
    /// nearest `go.mod`.
    pub fn new(dir: &Path) -> Result<DirLoader, LoadError> {
        let dir = dir
            .canonicalize()
            .map_err(|source| LoadError::Io {
                path: dir.display().to_string(),
                source,
            })?;
        let (root, module) = find_module(&dir)?;
        tracing::debug!(module = %module, root = %root.display(), "resolved module");
        Ok(DirLoader {
            module,
            root,
            universe: Universe::new(),
            shallow: HashMap::new(),
            deep: HashMap::new(),
            loading: HashSet::new(),
            externals: HashMap::new(),
        })
    }

    /// The module path from `go.mod`.
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The package path for a directory inside the module.
    pub fn package_path_for(&self, dir: &Path) -> Result<String, LoadError> {
        let dir = dir.canonicalize().map_err(|source| LoadError::Io {
            path: dir.display().to_string(),
            source,
        })?;
        let rel = dir
            .strip_prefix(&self.root)
            .map_err(|_| LoadError::OutsideModule {
                path: dir.display().to_string(),
                module: self.module.clone(),
            })?;
        if rel.as_os_str().is_empty() {
            return Ok(self.module.clone());
        }
        let mut path = self.module.clone();
        for part in rel.components() {
            path.push('/');
            path.push_str(&part.as_os_str().to_string_lossy());
        }
        Ok(path)
    }

    /// Directory for a package path, if the path belongs to the module.
    fn dir_for(&self, pkg_path: &str) -> Option<PathBuf> {
        if pkg_path == self.module {
            return Some(self.root.clone());
        }
        let rel = pkg_path.strip_prefix(&format!("{}/", self.module))?;
        Some(self.root.join(rel))
    }

    fn parse_package(&self, pkg_path: &str) -> Result<PackageSyntax, LoadError> {
        let dir = self.dir_for(pkg_path).ok_or_else(|| LoadError::OutsideModule {
            path: pkg_path.to_string(),
            module: self.module.clone(),
        })?;
        if !dir.is_dir() {
            return Err(LoadError::NotFound {
                path: pkg_path.to_string(),
            });
        }

        let mut files: Vec<SourceFile> = Vec::new();
        for entry in WalkDir::new(&dir)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.ends_with(".go")
                || name.ends_with("_test.go")
                || name.ends_with(GENERATED_SUFFIX)
            {
                continue;
            }
            let src = fs::read_to_string(entry.path()).map_err(|source| LoadError::Io {
                path: pkg_path.to_string(),
                source,
            })?;
            let file = parse_file(&name, &src).map_err(|source| LoadError::Parse {
                path: pkg_path.to_string(),
                source,
            })?;
            files.push(file);
        }

        if files.is_empty() {
            return Err(LoadError::NotFound {
                path: pkg_path.to_string(),
            });
        }
        let pkg_name = files[0].package_name.clone();
        if let Some(file) = files.iter().find(|f| f.package_name != pkg_name) {
            return Err(LoadError::Check {
                path: pkg_path.to_string(),
                message: format!(
                    "conflicting package names {} and {} in {}",
                    pkg_name, file.package_name, file.name
                ),
            });
        }

        Ok(PackageSyntax {
            path: pkg_path.to_string(),
            name: pkg_name,
            files,
        })
    }

    fn bind_package(&mut self, pkg_path: &str) -> Result<PackageTypes, LoadError> {
        let syntax = self.load_shallow(pkg_path)?;
        let mut ctx = BindCtx::new(pkg_path);

        // Pass 1: declare every type name, creating named cells up front so
        // self-referential and mutually recursive declarations bind.
        for (file_idx, file) in syntax.files.iter().enumerate() {
            for decl in &file.decls {
                ctx.declare(self, &syntax, file_idx, decl)?;
            }
        }

        // Pass 2: bind every declaration's type expression.
        let names: Vec<String> = ctx.order.clone();
        for name in names {
            self.bind_decl(&mut ctx, &syntax, &name)?;
        }

        Ok(PackageTypes {
            path: pkg_path.to_string(),
            name: syntax.name.clone(),
            scope: ctx.scope,
        })
    }

    fn bind_decl(
        &mut self,
        ctx: &mut BindCtx,
        syntax: &PackageSyntax,
        name: &str,
    ) -> Result<(), LoadError> {
        match ctx.state.get(name) {
            Some(BindState::Done) | Some(BindState::InProgress) => return Ok(()),
            _ => {}
        }
        let Some((file_idx, decl)) = ctx.decls.get(name).cloned() else {
            return Ok(());
        };
        ctx.state.insert(name.to_string(), BindState::InProgress);

        let file = &syntax.files[file_idx];
        let bound = self.bind_expr(ctx, syntax, file, &decl.typ)?;
        let obj = ctx
            .scope
            .get(name)
            .cloned()
            .ok_or_else(|| self.check_err(ctx, format!("missing object for {}", name)))?;

        if decl.is_alias {
            // Aliases are transparent: the object's type is the aliased
            // node itself.
            obj.set_typ(bound);
        } else {
            // The named cell exists since pass 1; splice in the structural
            // underlying type.
            let underlying = structural_of(&bound);
            let cell = obj.typ().ok_or_else(|| {
                self.check_err(ctx, format!("missing named cell for {}", name))
            })?;
            cell.set(RawKind::Named {
                name: name.to_string(),
                pkg_path: ctx.pkg_path.clone(),
                underlying,
            });
        }

        ctx.state.insert(name.to_string(), BindState::Done);
        Ok(())
    }

    fn bind_expr(
        &mut self,
        ctx: &mut BindCtx,
        syntax: &PackageSyntax,
        file: &SourceFile,
        expr: &TypeExpr,
    ) -> Result<RawType, LoadError> {
        match expr {
            TypeExpr::Ident(name) => {
                if ctx.decls.contains_key(name) {
                    self.bind_decl(ctx, syntax, name)?;
                    let obj = ctx.scope.get(name).cloned().ok_or_else(|| {
                        self.check_err(ctx, format!("missing object for {}", name))
                    })?;
                    return obj.typ().ok_or_else(|| {
                        self.check_err(ctx, format!("invalid recursive alias {}", name))
                    });
                }
                self.universe
                    .lookup(name)
                    .ok_or_else(|| self.check_err(ctx, format!("undefined: {}", name)))
            }
            TypeExpr::Qualified { pkg, name } => {
                let Some(import_path) = file.import_path(pkg).map(str::to_string) else {
                    return Err(self.check_err(ctx, format!("undefined package: {}", pkg)));
                };
                match self.load_deep(&import_path) {
                    Ok(types) => {
                        let obj = types.lookup(name).cloned().ok_or_else(|| {
                            self.check_err(
                                ctx,
                                format!("{} has no type {}", import_path, name),
                            )
                        })?;
                        obj.typ().ok_or_else(|| {
                            self.check_err(
                                ctx,
                                format!("unbound type {}.{}", import_path, name),
                            )
                        })
                    }
                    Err(LoadError::NotFound { .. }) | Err(LoadError::OutsideModule { .. }) => {
                        Ok(self.external(&import_path, name))
                    }
                    Err(err) => Err(err),
                }
            }
            TypeExpr::Pointer(inner) => {
                let elem = self.bind_expr(ctx, syntax, file, inner)?;
                Ok(RawType::new(RawKind::Pointer(elem)))
            }
            TypeExpr::Slice(inner) => {
                let elem = self.bind_expr(ctx, syntax, file, inner)?;
                Ok(RawType::new(RawKind::Slice(elem)))
            }
            TypeExpr::Array { len, elem } => {
                let elem = self.bind_expr(ctx, syntax, file, elem)?;
                Ok(RawType::new(RawKind::Array { len: *len, elem }))
            }
            TypeExpr::Map { key, value } => {
                let key = self.bind_expr(ctx, syntax, file, key)?;
                let value = self.bind_expr(ctx, syntax, file, value)?;
                Ok(RawType::new(RawKind::Map { key, value }))
            }
            TypeExpr::Chan(inner) => {
                let elem = self.bind_expr(ctx, syntax, file, inner)?;
                Ok(RawType::new(RawKind::Chan(elem)))
            }
            TypeExpr::Func => Ok(RawType::new(RawKind::Func)),
            TypeExpr::Interface => Ok(RawType::new(RawKind::Interface)),
            TypeExpr::Struct(fields) => {
                let mut raw_fields = Vec::new();
                for field in fields {
                    let typ = self.bind_expr(ctx, syntax, file, &field.typ)?;
                    if field.embedded {
                        let Some(name) = field.embedded_name() else {
                            return Err(self.check_err(
                                ctx,
                                format!("invalid embedded field in {}", file.name),
                            ));
                        };
                        raw_fields.push(RawField {
                            name: name.to_string(),
                            typ,
                            tag: field.tag.clone(),
                            embedded: true,
                        });
                    } else {
                        for name in &field.names {
                            raw_fields.push(RawField {
                                name: name.clone(),
                                typ: typ.clone(),
                                tag: field.tag.clone(),
                                embedded: false,
                            });
                        }
                    }
                }
                Ok(RawType::new(RawKind::Struct { fields: raw_fields }))
            }
        }
    }

    /// Interned opaque named type for an import outside the module.
    fn external(&mut self, import_path: &str, name: &str) -> RawType {
        self.externals
            .entry((import_path.to_string(), name.to_string()))
            .or_insert_with(|| {
                RawType::new(RawKind::Named {
                    name: name.to_string(),
                    pkg_path: import_path.to_string(),
                    underlying: RawType::unresolved(),
                })
            })
            .clone()
    }

    fn check_err(&self, ctx: &BindCtx, message: String) -> LoadError {
        LoadError::Check {
            path: ctx.pkg_path.clone(),
            message,
        }
    }
}

impl PackageLoader for DirLoader {
    fn load_shallow(&mut self, pkg_path: &str) -> Result<Rc<PackageSyntax>, LoadError> {
        if let Some(pkg) = self.shallow.get(pkg_path) {
            return Ok(pkg.clone());
        }
        tracing::debug!(package = pkg_path, "shallow load");
        let pkg = Rc::new(self.parse_package(pkg_path)?);
        self.shallow.insert(pkg_path.to_string(), pkg.clone());
        Ok(pkg)
    }

    fn load_deep(&mut self, pkg_path: &str) -> Result<Rc<PackageTypes>, LoadError> {
        if let Some(pkg) = self.deep.get(pkg_path) {
            return Ok(pkg.clone());
        }
        if !self.loading.insert(pkg_path.to_string()) {
            return Err(LoadError::Cycle {
                path: pkg_path.to_string(),
            });
        }
        tracing::debug!(package = pkg_path, "deep load");
        let result = self.bind_package(pkg_path);
        self.loading.remove(pkg_path);
        let pkg = Rc::new(result?);
        self.deep.insert(pkg_path.to_string(), pkg.clone());
        Ok(pkg)
    }
}

// ============================================================================
// Binding Context
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq)]
enum BindState {
    InProgress,
    Done,
}

struct BindCtx {
    pkg_path: String,
    scope: BTreeMap<String, TypeObj>,
    decls: HashMap<String, (usize, TypeDecl)>,
    /// Declaration order, file by file, for the deterministic second pass.
    order: Vec<String>,
    state: HashMap<String, BindState>,
}

impl BindCtx {
    fn new(pkg_path: &str) -> Self {
        BindCtx {
            pkg_path: pkg_path.to_string(),
            scope: BTreeMap::new(),
            decls: HashMap::new(),
            order: Vec::new(),
            state: HashMap::new(),
        }
    }

    fn declare(
        &mut self,
        loader: &DirLoader,
        syntax: &PackageSyntax,
        file_idx: usize,
        decl: &TypeDecl,
    ) -> Result<(), LoadError> {
        if decl.name == "_" {
            return Ok(());
        }
        if self.decls.contains_key(&decl.name) {
            return Err(loader.check_err(
                self,
                format!(
                    "{} redeclared in package {}",
                    decl.name, syntax.name
                ),
            ));
        }
        let obj = TypeObj::new(&decl.name, &self.pkg_path, decl.is_alias);
        if !decl.is_alias {
            // Named cell first; underlying is spliced in during pass 2.
            obj.set_typ(RawType::new(RawKind::Named {
                name: decl.name.clone(),
                pkg_path: self.pkg_path.clone(),
                underlying: RawType::unresolved(),
            }));
        }
        self.scope.insert(decl.name.clone(), obj);
        self.decls
            .insert(decl.name.clone(), (file_idx, decl.clone()));
        self.order.push(decl.name.clone());
        Ok(())
    }
}

/// The structural (non-named) type behind a bound node.
fn structural_of(bound: &RawType) -> RawType {
    let underlying = match &*bound.kind() {
        RawKind::Named { underlying, .. } => Some(underlying.clone()),
        _ => None,
    };
    underlying.unwrap_or_else(|| bound.clone())
}

// ============================================================================
// go.mod Discovery
// ============================================================================

/// Walk up from `dir` to the nearest `go.mod`; return its directory and
/// module path.
fn find_module(dir: &Path) -> Result<(PathBuf, String), LoadError> {
    let mut current = Some(dir);
    while let Some(candidate) = current {
        let gomod = candidate.join("go.mod");
        if gomod.is_file() {
            let text = fs::read_to_string(&gomod).map_err(|source| LoadError::Io {
                path: gomod.display().to_string(),
                source,
            })?;
            let module = parse_module_line(&text).ok_or_else(|| LoadError::Check {
                path: gomod.display().to_string(),
                message: "go.mod has no module line".to_string(),
            })?;
            return Ok((candidate.to_path_buf(), module));
        }
        current = candidate.parent();
    }
    Err(LoadError::NoModule {
        path: dir.display().to_string(),
    })
}

fn parse_module_line(text: &str) -> Option<String> {
    for line in text.lines() {
        let line = line.split("//").next().unwrap_or("").trim();
        if let Some(rest) = line.strip_prefix("module") {
            let rest = rest.trim();
            if rest.is_empty() {
                continue;
            }
            return Some(rest.trim_matches('"').to_string());
        }
    }
    None
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).expect("write fixture");
    }

    fn module_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(dir.path(), "go.mod", "module example.com/app\n");
        dir
    }

    mod module_discovery {
        use super::*;

        #[test]
        fn finds_go_mod_above_source_dir() {
            let dir = module_dir();
            let sub = dir.path().join("models");
            fs::create_dir(&sub).expect("mkdir");
            write_file(&sub, "user.go", "package models\n\ntype User struct{ ID int64 }\n");

            let loader = DirLoader::new(&sub).expect("loader");
            assert_eq!(loader.module(), "example.com/app");
            assert_eq!(
                loader.package_path_for(&sub).expect("pkg path"),
                "example.com/app/models"
            );
        }

        #[test]
        fn missing_go_mod_is_an_error() {
            let dir = tempfile::tempdir().expect("tempdir");
            let err = DirLoader::new(dir.path()).unwrap_err();
            assert!(matches!(err, LoadError::NoModule { .. }));
        }

        #[test]
        fn module_line_variants() {
            assert_eq!(
                parse_module_line("module example.com/app\n"),
                Some("example.com/app".to_string())
            );
            assert_eq!(
                parse_module_line("// header\nmodule \"example.com/q\"\n"),
                Some("example.com/q".to_string())
            );
            assert_eq!(parse_module_line("require x v1.0.0\n"), None);
        }
    }

    mod shallow {
        use super::*;

        #[test]
        fn skips_test_and_generated_files() {
            let dir = module_dir();
            let sub = dir.path().join("a");
            fs::create_dir(&sub).expect("mkdir");
            write_file(&sub, "a.go", "package a\n\ntype T struct{ X int }\n");
            write_file(&sub, "a_test.go", "package a\n\ntype FromTest struct{}\n");
            write_file(&sub, "a.gen.go", "package a\n\ntype FromGen struct{}\n");

            let mut loader = DirLoader::new(sub.as_path()).expect("loader");
            let pkg = loader.load_shallow("example.com/app/a").expect("shallow");
            assert_eq!(pkg.files.len(), 1);
            assert_eq!(pkg.files[0].name, "a.go");
        }

        #[test]
        fn missing_package_reports_not_found() {
            let dir = module_dir();
            write_file(dir.path(), "root.go", "package app\n");
            let mut loader = DirLoader::new(dir.path()).expect("loader");
            let err = loader.load_shallow("example.com/app/nope").unwrap_err();
            assert!(matches!(err, LoadError::NotFound { .. }));
        }

        #[test]
        fn memoizes_by_path() {
            let dir = module_dir();
            write_file(dir.path(), "root.go", "package app\n\ntype T struct{ X int }\n");
            let mut loader = DirLoader::new(dir.path()).expect("loader");
            let first = loader.load_shallow("example.com/app").expect("first");
            let second = loader.load_shallow("example.com/app").expect("second");
            assert!(Rc::ptr_eq(&first, &second));
        }
    }

    mod deep {
        use super::*;

        #[test]
        fn binds_struct_fields() {
            let dir = module_dir();
            write_file(
                dir.path(),
                "root.go",
                "package app\n\ntype User struct {\n\tID int64\n\tName string\n}\n",
            );
            let mut loader = DirLoader::new(dir.path()).expect("loader");
            let pkg = loader.load_deep("example.com/app").expect("deep");
            let obj = pkg.lookup("User").expect("User");
            assert!(!obj.is_alias());
            let typ = obj.typ().expect("bound");
            assert!(typ.is_struct());
            let RawKind::Named { underlying, .. } = &*typ.kind() else {
                panic!("expected named");
            };
            let RawKind::Struct { fields } = &*underlying.kind() else {
                panic!("expected struct underlying");
            };
            assert_eq!(fields.len(), 2);
            assert_eq!(fields[0].name, "ID");
            assert!(matches!(&*fields[0].typ.kind(), RawKind::Basic { name } if name == "int64"));
        }

        #[test]
        fn self_reference_binds_to_same_cell() {
            let dir = module_dir();
            write_file(
                dir.path(),
                "tree.go",
                "package app\n\ntype Tree struct {\n\tParent *Tree\n\tName string\n}\n",
            );
            let mut loader = DirLoader::new(dir.path()).expect("loader");
            let pkg = loader.load_deep("example.com/app").expect("deep");
            let tree = pkg.lookup("Tree").expect("Tree").typ().expect("bound");
            let RawKind::Named { underlying, .. } = &*tree.kind() else {
                panic!("expected named");
            };
            let RawKind::Struct { fields } = &*underlying.kind() else {
                panic!("expected struct");
            };
            let RawKind::Pointer(elem) = &*fields[0].typ.kind() else {
                panic!("expected pointer");
            };
            assert_eq!(elem.id(), tree.id());
        }

        #[test]
        fn cross_package_binding() {
            let dir = module_dir();
            let a = dir.path().join("a");
            let b = dir.path().join("b");
            fs::create_dir(&a).expect("mkdir");
            fs::create_dir(&b).expect("mkdir");
            write_file(&b, "b.go", "package b\n\ntype Base struct{ ID int }\n");
            write_file(
                &a,
                "a.go",
                "package a\n\nimport \"example.com/app/b\"\n\ntype Wrapper struct {\n\tBase b.Base\n}\n",
            );
            let mut loader = DirLoader::new(&a).expect("loader");
            let pkg = loader.load_deep("example.com/app/a").expect("deep");
            let wrapper = pkg.lookup("Wrapper").expect("Wrapper").typ().expect("bound");
            let RawKind::Named { underlying, .. } = &*wrapper.kind() else {
                panic!("expected named");
            };
            let RawKind::Struct { fields } = &*underlying.kind() else {
                panic!("expected struct");
            };
            assert!(matches!(
                &*fields[0].typ.kind(),
                RawKind::Named { name, pkg_path, .. }
                    if name == "Base" && pkg_path == "example.com/app/b"
            ));
        }

        #[test]
        fn imports_outside_module_bind_as_opaque_externals() {
            let dir = module_dir();
            write_file(
                dir.path(),
                "root.go",
                "package app\n\nimport \"time\"\n\ntype Event struct {\n\tAt time.Time\n}\n",
            );
            let mut loader = DirLoader::new(dir.path()).expect("loader");
            let pkg = loader.load_deep("example.com/app").expect("deep");
            let event = pkg.lookup("Event").expect("Event").typ().expect("bound");
            let RawKind::Named { underlying, .. } = &*event.kind() else {
                panic!("expected named");
            };
            let RawKind::Struct { fields } = &*underlying.kind() else {
                panic!("expected struct");
            };
            let at = fields[0].typ.clone();
            assert!(matches!(
                &*at.kind(),
                RawKind::Named { name, pkg_path, .. } if name == "Time" && pkg_path == "time"
            ));

            // Interning: a second reference shares the cell.
            let mut loader2 = DirLoader {
                module: "m".to_string(),
                root: PathBuf::new(),
                universe: Universe::new(),
                shallow: HashMap::new(),
                deep: HashMap::new(),
                loading: HashSet::new(),
                externals: HashMap::new(),
            };
            let one = loader2.external("time", "Time");
            let two = loader2.external("time", "Time");
            assert_eq!(one.id(), two.id());
        }

        #[test]
        fn undefined_local_name_fails_check() {
            let dir = module_dir();
            write_file(dir.path(), "root.go", "package app\n\ntype T struct{ X Missing }\n");
            let mut loader = DirLoader::new(dir.path()).expect("loader");
            let err = loader.load_deep("example.com/app").unwrap_err();
            assert!(matches!(err, LoadError::Check { .. }));
            assert!(err.cause_text().contains("Missing"));
        }

        #[test]
        fn alias_is_transparent() {
            let dir = module_dir();
            write_file(
                dir.path(),
                "root.go",
                "package app\n\ntype Base struct{ ID int }\ntype AliasToBase = Base\n",
            );
            let mut loader = DirLoader::new(dir.path()).expect("loader");
            let pkg = loader.load_deep("example.com/app").expect("deep");
            let base = pkg.lookup("Base").expect("Base").typ().expect("bound");
            let alias = pkg.lookup("AliasToBase").expect("alias");
            assert!(alias.is_alias());
            assert_eq!(alias.typ().expect("bound").id(), base.id());
        }

        #[test]
        fn named_of_named_shares_structural_underlying() {
            let dir = module_dir();
            write_file(
                dir.path(),
                "root.go",
                "package app\n\ntype Second First\ntype First struct{ ID int }\n",
            );
            let mut loader = DirLoader::new(dir.path()).expect("loader");
            let pkg = loader.load_deep("example.com/app").expect("deep");
            let first = pkg.lookup("First").expect("First").typ().expect("bound");
            let second = pkg.lookup("Second").expect("Second").typ().expect("bound");
            let RawKind::Named { underlying: u1, .. } = &*first.kind() else {
                panic!("expected named");
            };
            let RawKind::Named { underlying: u2, .. } = &*second.kind() else {
                panic!("expected named");
            };
            assert_eq!(u1.id(), u2.id());
        }
    }
}
