//! Go-subset parser for type discovery.
//!
//! The parser covers the slice of Go that conversion generation needs:
//! package clause, imports, comments with positions, and type declarations
//! with full type expressions (pointers, slices, arrays, maps, channels,
//! struct literals with tags and embedded fields). Function and interface
//! types are consumed opaquely; func/var/const declarations are skipped at
//! balanced-bracket granularity, recording only their start line so the
//! directive scanner can detect intervening declarations.
//!
//! Parsing is two-phase: a character scan extracts comments and blanks them
//! out of the source (preserving byte offsets and line numbers), then winnow
//! parsers consume the stripped text. Offsets are recovered from the
//! remaining-input length, so every production can report a line number.
//!
//! The parser never guesses: a file it cannot parse is a hard error for that
//! package's load.

use thiserror::Error;
use winnow::ascii::digit1;
use winnow::combinator::opt;
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::token::take_while;
use winnow::ModalResult;

use crate::syntax::{CommentGroup, FieldSyntax, ImportDecl, SourceFile, TypeDecl, TypeExpr};

// ============================================================================
// Error Type
// ============================================================================

/// Error type for source parsing.
#[derive(Debug, Error)]
#[error("{file}:{line}: {message}")]
pub struct ParseError {
    pub file: String,
    pub line: u32,
    pub message: String,
}

// ============================================================================
// Entry Point
// ============================================================================

/// Parse one source file into its shallow syntax view.
pub fn parse_file(name: &str, src: &str) -> Result<SourceFile, ParseError> {
    let scan = scan_comments(src);
    let ctx = FileCtx {
        name,
        stripped: &scan.stripped,
        line_starts: line_starts(&scan.stripped),
    };
    ctx.parse(scan.groups)
}

// ============================================================================
// Phase 1: Comment Scan
// ============================================================================

struct CommentScan {
    /// Source with every comment replaced by spaces (newlines kept), so
    /// offsets and line numbers are unchanged.
    stripped: String,
    groups: Vec<CommentGroup>,
}

struct RawComment {
    text: String,
    start_line: u32,
    end_line: u32,
    /// No code precedes the comment on its start line. Only own-line
    /// comments form doc groups; trailing comments never attach.
    own_line: bool,
}

fn scan_comments(src: &str) -> CommentScan {
    let bytes = src.as_bytes();
    // Built byte-for-byte so offsets match `src` exactly; comment bytes are
    // replaced one-for-one with spaces, which keeps the buffer valid UTF-8.
    let mut stripped: Vec<u8> = Vec::with_capacity(src.len());
    let mut comments: Vec<RawComment> = Vec::new();

    let mut i = 0;
    let mut line: u32 = 1;
    let mut code_on_line = false;

    while i < bytes.len() {
        let c = bytes[i];
        match c {
            b'\n' => {
                stripped.push(b'\n');
                line += 1;
                code_on_line = false;
                i += 1;
            }
            b'"' => {
                // Interpreted string literal; honor escapes.
                code_on_line = true;
                stripped.push(b'"');
                i += 1;
                while i < bytes.len() && bytes[i] != b'"' {
                    if bytes[i] == b'\\' && i + 1 < bytes.len() {
                        stripped.push(bytes[i]);
                        i += 1;
                    }
                    if bytes[i] == b'\n' {
                        line += 1;
                    }
                    stripped.push(bytes[i]);
                    i += 1;
                }
                if i < bytes.len() {
                    stripped.push(b'"');
                    i += 1;
                }
            }
            b'`' => {
                // Raw string literal; may span lines.
                code_on_line = true;
                stripped.push(b'`');
                i += 1;
                while i < bytes.len() && bytes[i] != b'`' {
                    if bytes[i] == b'\n' {
                        line += 1;
                    }
                    stripped.push(bytes[i]);
                    i += 1;
                }
                if i < bytes.len() {
                    stripped.push(b'`');
                    i += 1;
                }
            }
            b'\'' => {
                // Rune literal.
                code_on_line = true;
                stripped.push(b'\'');
                i += 1;
                while i < bytes.len() && bytes[i] != b'\'' {
                    if bytes[i] == b'\\' && i + 1 < bytes.len() {
                        stripped.push(bytes[i]);
                        i += 1;
                    }
                    stripped.push(bytes[i]);
                    i += 1;
                }
                if i < bytes.len() {
                    stripped.push(b'\'');
                    i += 1;
                }
            }
            b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'/' => {
                let start = i;
                while i < bytes.len() && bytes[i] != b'\n' {
                    stripped.push(b' ');
                    i += 1;
                }
                comments.push(RawComment {
                    text: src[start..i].to_string(),
                    start_line: line,
                    end_line: line,
                    own_line: !code_on_line,
                });
            }
            b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'*' => {
                let start = i;
                let start_line = line;
                stripped.extend_from_slice(b"  ");
                i += 2;
                while i + 1 < bytes.len() && !(bytes[i] == b'*' && bytes[i + 1] == b'/') {
                    if bytes[i] == b'\n' {
                        stripped.push(b'\n');
                        line += 1;
                    } else {
                        stripped.push(b' ');
                    }
                    i += 1;
                }
                if i + 1 < bytes.len() {
                    stripped.extend_from_slice(b"  ");
                    i += 2;
                } else {
                    i = bytes.len();
                }
                comments.push(RawComment {
                    text: src[start..i.min(src.len())].to_string(),
                    start_line,
                    end_line: line,
                    own_line: !code_on_line,
                });
            }
            _ => {
                if !c.is_ascii_whitespace() {
                    code_on_line = true;
                }
                stripped.push(c);
                i += 1;
            }
        }
    }

    CommentScan {
        stripped: String::from_utf8(stripped).unwrap_or_default(),
        groups: group_comments(comments),
    }
}

/// Fold own-line comments into groups of adjacent lines. A blank line, a
/// code line, or a trailing comment breaks the group.
fn group_comments(comments: Vec<RawComment>) -> Vec<CommentGroup> {
    let mut groups: Vec<CommentGroup> = Vec::new();
    for comment in comments {
        if !comment.own_line {
            continue;
        }
        match groups.last_mut() {
            Some(group) if comment.start_line == group.end_line + 1 => {
                group.lines.push(comment.text);
                group.end_line = comment.end_line;
            }
            _ => groups.push(CommentGroup {
                lines: vec![comment.text],
                start_line: comment.start_line,
                end_line: comment.end_line,
            }),
        }
    }
    groups
}

fn line_starts(src: &str) -> Vec<usize> {
    let mut starts = vec![0usize];
    for (i, b) in src.bytes().enumerate() {
        if b == b'\n' {
            starts.push(i + 1);
        }
    }
    starts
}

// ============================================================================
// Phase 2: Declaration Parsing
// ============================================================================

struct FileCtx<'s> {
    name: &'s str,
    stripped: &'s str,
    line_starts: Vec<usize>,
}

impl<'s> FileCtx<'s> {
    fn offset(&self, rest: &str) -> usize {
        self.stripped.len() - rest.len()
    }

    fn line_at(&self, offset: usize) -> u32 {
        self.line_starts.partition_point(|&s| s <= offset) as u32
    }

    fn line_of(&self, rest: &str) -> u32 {
        self.line_at(self.offset(rest))
    }

    fn err(&self, rest: &str, message: impl Into<String>) -> ParseError {
        ParseError {
            file: self.name.to_string(),
            line: self.line_of(rest),
            message: message.into(),
        }
    }

    fn parse(&self, comments: Vec<CommentGroup>) -> Result<SourceFile, ParseError> {
        let mut rest: &str = self.stripped;
        let mut file = SourceFile {
            name: self.name.to_string(),
            package_name: String::new(),
            package_line: 0,
            imports: Vec::new(),
            decls: Vec::new(),
            other_decl_lines: Vec::new(),
            comments,
        };

        skip_all_space(&mut rest);
        let pkg_line = self.line_of(rest);
        if !eat_keyword(&mut rest, "package") {
            return Err(self.err(rest, "expected package clause"));
        }
        skip_inline_space(&mut rest);
        let name = ident
            .parse_next(&mut rest)
            .map_err(|_| self.err(rest, "expected package name"))?;
        file.package_name = name.to_string();
        file.package_line = pkg_line;

        loop {
            skip_all_space(&mut rest);
            if rest.is_empty() {
                break;
            }
            let line = self.line_of(rest);
            if eat_keyword(&mut rest, "import") {
                self.parse_import(&mut rest, &mut file.imports)?;
            } else if eat_keyword(&mut rest, "type") {
                self.parse_type_decl(&mut rest, line, &mut file.decls)?;
            } else if peek_keyword(rest, "func")
                || peek_keyword(rest, "var")
                || peek_keyword(rest, "const")
            {
                file.other_decl_lines.push(line);
                self.skip_decl(&mut rest)?;
            } else {
                return Err(self.err(rest, "unexpected top-level token"));
            }
        }

        Ok(file)
    }

    fn parse_import(
        &self,
        rest: &mut &'s str,
        imports: &mut Vec<ImportDecl>,
    ) -> Result<(), ParseError> {
        skip_inline_space(rest);
        if rest.starts_with('(') {
            *rest = &rest[1..];
            loop {
                skip_all_space(rest);
                if rest.starts_with(')') {
                    *rest = &rest[1..];
                    return Ok(());
                }
                if rest.is_empty() {
                    return Err(self.err(rest, "unterminated import block"));
                }
                imports.push(self.import_spec(rest)?);
            }
        }
        imports.push(self.import_spec(rest)?);
        Ok(())
    }

    fn import_spec(&self, rest: &mut &'s str) -> Result<ImportDecl, ParseError> {
        let local_name = if rest.starts_with('"') {
            None
        } else if rest.starts_with('.') || rest.starts_with('_') {
            let name = &rest[..1];
            *rest = &rest[1..];
            skip_inline_space(rest);
            Some(name.to_string())
        } else {
            let name = ident
                .parse_next(rest)
                .map_err(|_| self.err(rest, "expected import path or local name"))?;
            skip_inline_space(rest);
            Some(name.to_string())
        };
        let path = string_lit
            .parse_next(rest)
            .map_err(|_| self.err(rest, "expected quoted import path"))?;
        Ok(ImportDecl { local_name, path })
    }

    fn parse_type_decl(
        &self,
        rest: &mut &'s str,
        keyword_line: u32,
        decls: &mut Vec<TypeDecl>,
    ) -> Result<(), ParseError> {
        skip_inline_space(rest);
        if rest.starts_with('(') {
            *rest = &rest[1..];
            loop {
                skip_all_space(rest);
                if rest.starts_with(')') {
                    *rest = &rest[1..];
                    return Ok(());
                }
                if rest.is_empty() {
                    return Err(self.err(rest, "unterminated type block"));
                }
                let line = self.line_of(rest);
                decls.push(self.type_spec(rest, line)?);
            }
        }
        decls.push(self.type_spec(rest, keyword_line)?);
        Ok(())
    }

    fn type_spec(&self, rest: &mut &'s str, line: u32) -> Result<TypeDecl, ParseError> {
        let name = ident
            .parse_next(rest)
            .map_err(|_| self.err(rest, "expected type name"))?;
        skip_inline_space(rest);
        let is_alias = if rest.starts_with('=') {
            *rest = &rest[1..];
            skip_inline_space(rest);
            true
        } else {
            false
        };
        let typ = self.type_expr(rest)?;
        Ok(TypeDecl {
            name: name.to_string(),
            is_alias,
            typ,
            line,
        })
    }

    /// Parse a full type expression.
    fn type_expr(&self, rest: &mut &'s str) -> Result<TypeExpr, ParseError> {
        skip_inline_space(rest);
        if rest.starts_with('*') {
            *rest = &rest[1..];
            skip_all_space(rest);
            return Ok(TypeExpr::Pointer(Box::new(self.type_expr(rest)?)));
        }
        if rest.starts_with("[]") {
            *rest = &rest[2..];
            skip_all_space(rest);
            return Ok(TypeExpr::Slice(Box::new(self.type_expr(rest)?)));
        }
        if rest.starts_with('[') {
            *rest = &rest[1..];
            skip_inline_space(rest);
            let digits: &str = digit1
                .parse_next(rest)
                .map_err(|_: ErrMode<winnow::error::ContextError>| {
                    self.err(rest, "expected array length")
                })?;
            let len: u64 = digits
                .parse()
                .map_err(|_| self.err(rest, "array length out of range"))?;
            skip_inline_space(rest);
            if !rest.starts_with(']') {
                return Err(self.err(rest, "expected ']' after array length"));
            }
            *rest = &rest[1..];
            skip_all_space(rest);
            let elem = self.type_expr(rest)?;
            return Ok(TypeExpr::Array {
                len,
                elem: Box::new(elem),
            });
        }
        if rest.starts_with("<-") {
            *rest = &rest[2..];
            skip_inline_space(rest);
            if !eat_keyword(rest, "chan") {
                return Err(self.err(rest, "expected 'chan' after '<-'"));
            }
            skip_all_space(rest);
            return Ok(TypeExpr::Chan(Box::new(self.type_expr(rest)?)));
        }
        if peek_keyword(rest, "map") {
            eat_keyword(rest, "map");
            skip_inline_space(rest);
            if !rest.starts_with('[') {
                return Err(self.err(rest, "expected '[' after 'map'"));
            }
            *rest = &rest[1..];
            skip_all_space(rest);
            let key = self.type_expr(rest)?;
            skip_all_space(rest);
            if !rest.starts_with(']') {
                return Err(self.err(rest, "expected ']' after map key type"));
            }
            *rest = &rest[1..];
            skip_all_space(rest);
            let value = self.type_expr(rest)?;
            return Ok(TypeExpr::Map {
                key: Box::new(key),
                value: Box::new(value),
            });
        }
        if peek_keyword(rest, "chan") {
            eat_keyword(rest, "chan");
            skip_inline_space(rest);
            if rest.starts_with("<-") {
                *rest = &rest[2..];
            }
            skip_all_space(rest);
            return Ok(TypeExpr::Chan(Box::new(self.type_expr(rest)?)));
        }
        if peek_keyword(rest, "func") {
            eat_keyword(rest, "func");
            skip_inline_space(rest);
            self.balanced(rest, '(', ')')?;
            // Optional same-line result: a parenthesized list or one type.
            skip_inline_space(rest);
            if rest.starts_with('(') {
                self.balanced(rest, '(', ')')?;
            } else if starts_type_expr(rest) {
                self.type_expr(rest)?;
            }
            return Ok(TypeExpr::Func);
        }
        if peek_keyword(rest, "interface") {
            eat_keyword(rest, "interface");
            skip_all_space(rest);
            self.balanced(rest, '{', '}')?;
            return Ok(TypeExpr::Interface);
        }
        if peek_keyword(rest, "struct") {
            eat_keyword(rest, "struct");
            skip_inline_space(rest);
            return self.struct_body(rest);
        }
        let name = ident
            .parse_next(rest)
            .map_err(|_| self.err(rest, "expected type expression"))?;
        if rest.starts_with('.') {
            *rest = &rest[1..];
            let sel = ident
                .parse_next(rest)
                .map_err(|_| self.err(rest, "expected name after '.'"))?;
            return Ok(TypeExpr::Qualified {
                pkg: name.to_string(),
                name: sel.to_string(),
            });
        }
        Ok(TypeExpr::Ident(name.to_string()))
    }

    fn struct_body(&self, rest: &mut &'s str) -> Result<TypeExpr, ParseError> {
        if !rest.starts_with('{') {
            return Err(self.err(rest, "expected '{' after 'struct'"));
        }
        *rest = &rest[1..];
        let mut fields = Vec::new();
        loop {
            skip_all_space(rest);
            while rest.starts_with(';') {
                *rest = &rest[1..];
                skip_all_space(rest);
            }
            if rest.starts_with('}') {
                *rest = &rest[1..];
                return Ok(TypeExpr::Struct(fields));
            }
            if rest.is_empty() {
                return Err(self.err(rest, "unterminated struct body"));
            }
            fields.push(self.struct_field(rest)?);
        }
    }

    fn struct_field(&self, rest: &mut &'s str) -> Result<FieldSyntax, ParseError> {
        let line = self.line_of(rest);

        let (names, typ, embedded) = if starts_type_expr_nonident(rest) {
            // `*E`, `[]T`, `map[..]..` etc. with no field name: only the
            // pointer form can be an embedded field.
            let typ = self.type_expr(rest)?;
            let embedded = matches!(
                &typ,
                TypeExpr::Pointer(inner)
                    if matches!(**inner, TypeExpr::Ident(_) | TypeExpr::Qualified { .. })
            );
            if !embedded {
                return Err(self.err(rest, "struct field requires a name"));
            }
            (Vec::new(), typ, true)
        } else {
            let first = ident
                .parse_next(rest)
                .map_err(|_| self.err(rest, "expected field name or embedded type"))?;
            if rest.starts_with('.') {
                *rest = &rest[1..];
                let sel = ident
                    .parse_next(rest)
                    .map_err(|_| self.err(rest, "expected name after '.'"))?;
                (
                    Vec::new(),
                    TypeExpr::Qualified {
                        pkg: first.to_string(),
                        name: sel.to_string(),
                    },
                    true,
                )
            } else {
                let mut names = vec![first.to_string()];
                skip_inline_space(rest);
                while rest.starts_with(',') {
                    *rest = &rest[1..];
                    skip_all_space(rest);
                    let more = ident
                        .parse_next(rest)
                        .map_err(|_| self.err(rest, "expected field name after ','"))?;
                    names.push(more.to_string());
                    skip_inline_space(rest);
                }
                if names.len() == 1 && at_field_end(rest) {
                    // Lone identifier followed by a terminator: embedded.
                    (
                        Vec::new(),
                        TypeExpr::Ident(names.remove(0)),
                        true,
                    )
                } else {
                    let typ = self.type_expr(rest)?;
                    (names, typ, false)
                }
            }
        };

        skip_inline_space(rest);
        let tag = opt(string_lit).parse_next(rest).ok().flatten().unwrap_or_default();

        Ok(FieldSyntax {
            names,
            typ,
            tag,
            embedded,
            line,
        })
    }

    /// Consume a balanced bracket group, honoring string literals inside.
    fn balanced(&self, rest: &mut &'s str, open: char, close: char) -> Result<(), ParseError> {
        if !rest.starts_with(open) {
            return Err(self.err(rest, format!("expected '{}'", open)));
        }
        let bytes = rest.as_bytes();
        let mut depth = 0usize;
        let mut i = 0usize;
        while i < bytes.len() {
            let c = bytes[i] as char;
            if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    *rest = &rest[i + 1..];
                    return Ok(());
                }
            } else if c == '"' || c == '`' || c == '\'' {
                i = skip_string(bytes, i);
                continue;
            }
            i += 1;
        }
        Err(self.err(rest, format!("unterminated '{}' group", open)))
    }

    /// Skip a func/var/const declaration: consume until a newline at zero
    /// bracket depth.
    fn skip_decl(&self, rest: &mut &'s str) -> Result<(), ParseError> {
        let bytes = rest.as_bytes();
        let mut depth = 0i64;
        let mut i = 0usize;
        while i < bytes.len() {
            match bytes[i] {
                b'(' | b'{' | b'[' => depth += 1,
                b')' | b'}' | b']' => depth -= 1,
                b'"' | b'`' | b'\'' => {
                    i = skip_string(bytes, i);
                    continue;
                }
                b'\n' if depth <= 0 => {
                    *rest = &rest[i + 1..];
                    return Ok(());
                }
                _ => {}
            }
            i += 1;
        }
        *rest = "";
        Ok(())
    }
}

/// Advance past a string or rune literal starting at `i`; returns the index
/// after the closing quote.
fn skip_string(bytes: &[u8], i: usize) -> usize {
    let quote = bytes[i];
    let mut j = i + 1;
    while j < bytes.len() && bytes[j] != quote {
        if quote != b'`' && bytes[j] == b'\\' {
            j += 1;
        }
        j += 1;
    }
    (j + 1).min(bytes.len())
}

// ============================================================================
// Token-Level Parsers
// ============================================================================

fn ident<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    let first = input.chars().next();
    if !first.map(|c| c.is_alphabetic() || c == '_').unwrap_or(false) {
        return Err(ErrMode::from_input(input));
    }
    take_while(1.., |c: char| c.is_alphanumeric() || c == '_').parse_next(input)
}

/// Quoted string: interpreted (`"…"`, minimal unescaping) or raw (`` `…` ``).
fn string_lit(input: &mut &str) -> ModalResult<String> {
    if input.starts_with('`') {
        let end = input[1..]
            .find('`')
            .ok_or_else(|| ErrMode::from_input(input))?;
        let content = input[1..1 + end].to_string();
        *input = &input[end + 2..];
        return Ok(content);
    }
    if !input.starts_with('"') {
        return Err(ErrMode::from_input(input));
    }
    let bytes = input.as_bytes();
    let mut out = String::new();
    let mut i = 1usize;
    while i < bytes.len() && bytes[i] != b'"' {
        if bytes[i] == b'\\' && i + 1 < bytes.len() {
            i += 1;
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    if i >= bytes.len() {
        return Err(ErrMode::from_input(input));
    }
    *input = &input[i + 1..];
    Ok(out)
}

fn skip_inline_space(rest: &mut &str) {
    *rest = rest.trim_start_matches([' ', '\t']);
}

fn skip_all_space(rest: &mut &str) {
    *rest = rest.trim_start();
}

/// True if the input begins with the keyword followed by a non-ident char.
fn peek_keyword(rest: &str, keyword: &str) -> bool {
    rest.starts_with(keyword)
        && !rest[keyword.len()..]
            .chars()
            .next()
            .map(|c| c.is_alphanumeric() || c == '_')
            .unwrap_or(false)
}

fn eat_keyword(rest: &mut &str, keyword: &str) -> bool {
    if peek_keyword(rest, keyword) {
        *rest = &rest[keyword.len()..];
        true
    } else {
        false
    }
}

/// True if the input starts a type expression.
fn starts_type_expr(rest: &str) -> bool {
    starts_type_expr_nonident(rest)
        || rest
            .chars()
            .next()
            .map(|c| c.is_alphabetic() || c == '_')
            .unwrap_or(false)
}

/// Type-expression starts that cannot be a field name.
fn starts_type_expr_nonident(rest: &str) -> bool {
    rest.starts_with('*')
        || rest.starts_with('[')
        || rest.starts_with("<-")
        || peek_keyword(rest, "map")
        || peek_keyword(rest, "chan")
        || peek_keyword(rest, "func")
        || peek_keyword(rest, "interface")
        || peek_keyword(rest, "struct")
}

/// True at a struct-field terminator: end of line, `;`, `}`, or a tag.
fn at_field_end(rest: &str) -> bool {
    match rest.chars().next() {
        None => true,
        Some('\n') | Some(';') | Some('}') | Some('"') | Some('`') => true,
        _ => false,
    }
}

// ============================================================================
// Tests
// ============================================================================
