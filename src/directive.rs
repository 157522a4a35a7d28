//! Directive scanner.
//!
//! Extracts, in source order, every leading-comment line beginning with the
//! reserved prefix from a package's syntax trees, paired with its
//! attachment: file-level, or the type declaration the comment group
//! documents. The scanner is purely syntactic; payload validation happens
//! in the rule compiler.
//!
//! ## Attachment rule
//!
//! A comment group attaches to a type declaration iff its last line is
//! immediately above the declaration, with no blank line or other
//! declaration between them. Groups above the package clause or imports
//! are file-level, as is everything else.

use crate::output::GENERATED_SUFFIX;
use crate::syntax::{PackageSyntax, Pos, SourceFile};

/// The reserved comment prefix for generator directives.
pub const DIRECTIVE_PREFIX: &str = "//convgen:";

// ============================================================================
// Scanner Output
// ============================================================================

/// What a directive is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// File-scope directive: establishes defaults.
    File,
    /// Attached to the named type declaration in the scanned package.
    Type(String),
}

/// One raw directive: the payload after the reserved prefix, its position,
/// and its attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDirective {
    pub text: String,
    pub position: Pos,
    pub attachment: Attachment,
}

// ============================================================================
// Scanning
// ============================================================================

/// Scan a shallow-loaded package for directives, in source order.
///
/// Files whose base name ends with the generation marker suffix are the
/// generator's own output and are skipped.
pub fn scan_package(pkg: &PackageSyntax) -> Vec<RawDirective> {
    let mut directives = Vec::new();
    for file in &pkg.files {
        if file.name.ends_with(GENERATED_SUFFIX) {
            continue;
        }
        scan_file(file, &mut directives);
    }
    directives
}

fn scan_file(file: &SourceFile, out: &mut Vec<RawDirective>) {
    for group in &file.comments {
        let attachment = attachment_for(file, group.end_line);
        for (idx, line) in group.lines.iter().enumerate() {
            let Some(payload) = line.strip_prefix(DIRECTIVE_PREFIX) else {
                continue;
            };
            out.push(RawDirective {
                text: payload.trim().to_string(),
                position: Pos::new(file.name.clone(), group.start_line + idx as u32, 1),
                attachment: attachment.clone(),
            });
        }
    }
}

/// Attachment for a comment group ending at `end_line`.
fn attachment_for(file: &SourceFile, end_line: u32) -> Attachment {
    // A group above the package clause can only be file-level.
    if end_line < file.package_line {
        return Attachment::File;
    }
    file.decls
        .iter()
        .find(|decl| decl.line == end_line + 1)
        .map(|decl| Attachment::Type(decl.name.clone()))
        .unwrap_or(Attachment::File)
}

// ============================================================================
// Tests
// ============================================================================
