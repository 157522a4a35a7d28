//! Syntax data model for shallow-loaded packages.
//!
//! These types are what `PackageLoader::load_shallow` returns: per-file
//! comment groups, import tables, and type declarations with enough position
//! information for the directive scanner's attachment rule. They carry no
//! cross-package binding; that is the deep load's job (see `rawtype`).

use serde::{Deserialize, Serialize};

// ============================================================================
// Positions
// ============================================================================

/// Position in a source file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Pos {
    /// File base name (package-relative).
    pub file: String,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, bytes).
    pub col: u32,
}

impl Pos {
    /// Create a new position.
    pub fn new(file: impl Into<String>, line: u32, col: u32) -> Self {
        Pos {
            file: file.into(),
            line,
            col,
        }
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

// ============================================================================
// Comments
// ============================================================================

/// A run of adjacent comment lines with no blank line between them.
///
/// `lines` holds each comment's raw text as written, including the `//` or
/// `/* */` markers, so the directive scanner can recognize the reserved
/// prefix byte-exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentGroup {
    pub lines: Vec<String>,
    /// Line of the first comment in the group (1-indexed).
    pub start_line: u32,
    /// Line of the last comment in the group (1-indexed).
    pub end_line: u32,
}

// ============================================================================
// Imports
// ============================================================================

/// One import in a file's import table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportDecl {
    /// Explicit local name (`alias "path"`), if any.
    pub local_name: Option<String>,
    /// Import path, unquoted.
    pub path: String,
}

impl ImportDecl {
    /// The name this import binds in the file scope.
    ///
    /// Defaults to the last path segment when no explicit name is given.
    pub fn effective_name(&self) -> &str {
        match &self.local_name {
            Some(name) => name,
            None => self.path.rsplit('/').next().unwrap_or(&self.path),
        }
    }
}

// ============================================================================
// Type Expressions
// ============================================================================

/// Syntactic type expression, as written in a declaration or field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// Plain identifier: a package-local type or a primitive.
    Ident(String),
    /// Qualified identifier `pkg.Name`, resolved through the import table.
    Qualified { pkg: String, name: String },
    /// `*T`
    Pointer(Box<TypeExpr>),
    /// `[]T`
    Slice(Box<TypeExpr>),
    /// `[N]T` with an integer literal length.
    Array { len: u64, elem: Box<TypeExpr> },
    /// `map[K]V`
    Map {
        key: Box<TypeExpr>,
        value: Box<TypeExpr>,
    },
    /// `chan T`, `chan<- T`, or `<-chan T`; direction is not preserved.
    Chan(Box<TypeExpr>),
    /// Function signature. Opaque: conversion never looks inside.
    Func,
    /// Interface literal. Opaque.
    Interface,
    /// Struct literal with its field list.
    Struct(Vec<FieldSyntax>),
}

/// One field line inside a struct literal.
///
/// An embedded field has an empty `names` list; its declared name is derived
/// from the type (`E` or `*E` both bind the name `E`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSyntax {
    pub names: Vec<String>,
    pub typ: TypeExpr,
    /// Tag string with quotes stripped; empty when absent.
    pub tag: String,
    pub embedded: bool,
    /// Line of the field (1-indexed).
    pub line: u32,
}

impl FieldSyntax {
    /// The name an embedded field binds, per Go's rule: the type's simple
    /// name, through at most one pointer.
    pub fn embedded_name(&self) -> Option<&str> {
        fn simple(expr: &TypeExpr) -> Option<&str> {
            match expr {
                TypeExpr::Ident(name) => Some(name),
                TypeExpr::Qualified { name, .. } => Some(name),
                TypeExpr::Pointer(inner) => simple(inner),
                _ => None,
            }
        }
        if self.embedded {
            simple(&self.typ)
        } else {
            None
        }
    }
}

// ============================================================================
// Declarations and Files
// ============================================================================

/// A type declaration: `type Name U` or `type Name = U`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    pub name: String,
    /// True for a pure alias (`type Name = U`).
    pub is_alias: bool,
    pub typ: TypeExpr,
    /// Line of the declaration spec (1-indexed). For a standalone
    /// declaration this is the `type` keyword's line; for a spec inside a
    /// grouped `type (...)` block it is the spec's own line.
    pub line: u32,
}

/// A parsed source file: the shallow view the directive scanner works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// File base name.
    pub name: String,
    pub package_name: String,
    /// Line of the package clause (1-indexed).
    pub package_line: u32,
    pub imports: Vec<ImportDecl>,
    pub decls: Vec<TypeDecl>,
    /// Start lines of declarations the parser skipped (funcs, vars, consts).
    /// The attachment rule needs them to detect intervening declarations.
    pub other_decl_lines: Vec<u32>,
    pub comments: Vec<CommentGroup>,
}

impl SourceFile {
    /// Resolve a file-local package name through this file's import table.
    pub fn import_path(&self, local: &str) -> Option<&str> {
        self.imports
            .iter()
            .find(|imp| imp.effective_name() == local)
            .map(|imp| imp.path.as_str())
    }
}

/// A shallow-loaded package: syntax trees and import tables, no binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSyntax {
    /// Import path of the package.
    pub path: String,
    /// Package name from the package clause.
    pub name: String,
    /// Files sorted by base name, so directive order is stable across runs.
    pub files: Vec<SourceFile>,
}

// ============================================================================
// Tests
// ============================================================================
