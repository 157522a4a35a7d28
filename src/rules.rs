//! Rule compiler: directive payloads into a typed `RuleSet`.
//!
//! Directives arrive from the scanner in source order, file-level first.
//! File-level directives establish defaults; each type-attached group (and
//! each `convert=` pair) inherits those defaults via structural clone, then
//! replaces scalar settings and unions collection-valued ones.
//!
//! ## Grammar
//!
//! One directive per comment line, after the reserved prefix:
//!
//! ```text
//! package:path=<path>,alias=<id>
//! pair:packages="<alias|path>,<alias|path>"
//! convert="<src_fqn>,<tgt_fqn>[,ignore=<csv>][,remap=<field>:<path>;…][,direction=<one>]"
//! convert:direction="both"|"oneway"
//! convert:source:prefix="…"   convert:source:suffix="…"
//! convert:target:prefix="…"   convert:target:suffix="…"
//! convert:ignore="<fqn>#<f1>,<f2>,…"
//! convert:remap="<tgt_field>:<src_path>[;…]"
//! convert:rule="source:<t>,target:<t>,func:<name>"
//! ```
//!
//! In `convert:ignore`, a `<fqn>#` element scopes subsequent bare names to
//! that type until another `#` appears; bare names with no scope in sight
//! ignore whole types. Inside a type-attached group the scope starts as the
//! attached type. A type-attached `convert:remap` keys its entries by the
//! attached type; at file level the entries apply to every pair.
//!
//! Aliases may shadow earlier aliases; the last definition wins. Malformed
//! directives fail fast rather than dropping unknown tokens.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;
use winnow::combinator::delimited;
use winnow::error::{ErrMode, ParserError};
use winnow::prelude::*;
use winnow::token::take_till;
use winnow::ModalResult;

use crate::directive::{Attachment, RawDirective};
use crate::syntax::Pos;

// ============================================================================
// Error Type
// ============================================================================

/// Errors during rule compilation.
#[derive(Debug, Error)]
pub enum RuleError {
    /// A directive failed to parse; compilation aborts.
    #[error("malformed directive at {position}: {raw:?}: {reason}")]
    Malformed {
        raw: String,
        position: Pos,
        reason: String,
    },
}

// ============================================================================
// Rule Model
// ============================================================================

/// Conversion direction for a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    OneWay,
    Both,
}

/// Affixes applied to type simple names when forming generated function
/// name components. They never alter type identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamingRules {
    pub source_prefix: String,
    pub source_suffix: String,
    pub target_prefix: String,
    pub target_suffix: String,
}

/// A custom-function rule: whenever a source field of `source` maps to a
/// target field of `target`, call `func` instead of converting inline.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CustomRule {
    pub source: String,
    pub target: String,
    pub func: String,
}

/// The compiled form of a directive scope.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    /// User-chosen short name to package path.
    pub package_aliases: BTreeMap<String, String>,
    /// Ordered `(source_path, target_path)` package pairs.
    pub package_pairs: Vec<(String, String)>,
    /// Explicit `source_fqn` to `target_fqn` pairs.
    pub type_pairs: BTreeMap<String, String>,
    pub naming: NamingRules,
    pub direction: Direction,
    /// `(source_fqn, field_name)` pairs to omit.
    pub ignore_fields: BTreeSet<(String, String)>,
    /// Type names excluded from pair expansion; full FQNs or simple names.
    pub ignore_types: BTreeSet<String>,
    /// `(source_fqn, target_field)` to dotted source path. An empty
    /// source key is the file-level wildcard, applying to every pair.
    pub remap_fields: BTreeMap<(String, String), String>,
    pub custom_rules: Vec<CustomRule>,
}

impl RuleSet {
    /// The remap path for a pair's target field, if any. Pair-keyed
    /// entries win over file-level wildcards.
    pub fn remap_for(&self, src_fqn: &str, target_field: &str) -> Option<&str> {
        self.remap_fields
            .get(&(src_fqn.to_string(), target_field.to_string()))
            .or_else(|| {
                self.remap_fields
                    .get(&(String::new(), target_field.to_string()))
            })
            .map(String::as_str)
    }

    /// True if the field of the source type is ignored.
    pub fn is_ignored_field(&self, src_fqn: &str, field: &str) -> bool {
        self.ignore_fields
            .contains(&(src_fqn.to_string(), field.to_string()))
    }

    /// True if the type is excluded from pair expansion, by FQN or by
    /// simple name.
    pub fn is_ignored_type(&self, fqn: &str, simple: &str) -> bool {
        self.ignore_types.contains(fqn) || self.ignore_types.contains(simple)
    }
}

/// The full compile result: file-scope defaults plus per-type overrides.
///
/// Overrides are keyed by the attached declaration's FQN and by the source
/// FQN of every pair the override declares.
#[derive(Debug, Clone)]
pub struct CompiledRules {
    pub file: RuleSet,
    pub per_type: BTreeMap<String, RuleSet>,
}

impl CompiledRules {
    /// The effective rule set for a pair, looked up by source FQN.
    pub fn for_source(&self, src_fqn: &str) -> &RuleSet {
        self.per_type.get(src_fqn).unwrap_or(&self.file)
    }

    /// Every explicit type pair across all scopes.
    pub fn all_type_pairs(&self) -> BTreeMap<String, String> {
        let mut pairs = self.file.type_pairs.clone();
        for rules in self.per_type.values() {
            for (src, tgt) in &rules.type_pairs {
                pairs.insert(src.clone(), tgt.clone());
            }
        }
        pairs
    }

    /// Every package pair across all scopes, in declaration order.
    pub fn all_package_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = self.file.package_pairs.clone();
        for rules in self.per_type.values() {
            for pair in &rules.package_pairs {
                if !pairs.contains(pair) {
                    pairs.push(pair.clone());
                }
            }
        }
        pairs
    }
}

// ============================================================================
// Compilation
// ============================================================================

/// Compile scanned directives into rule sets.
///
/// `pkg_path` is the scanned package's import path; it qualifies attached
/// type names.
pub fn compile(directives: &[RawDirective], pkg_path: &str) -> Result<CompiledRules, RuleError> {
    let mut file = RuleSet::default();
    let mut file_converts: Vec<(ConvertSpec, RawDirective)> = Vec::new();

    // File-level directives establish the defaults.
    for directive in directives {
        if directive.attachment != Attachment::File {
            continue;
        }
        match parse_payload(&directive.text).map_err(|reason| malformed(directive, reason))? {
            Payload::Convert(spec) => file_converts.push((spec, directive.clone())),
            payload => apply_simple(&mut file, payload, None, directive)?,
        }
    }

    let mut per_type: BTreeMap<String, RuleSet> = BTreeMap::new();

    // A file-level convert pair inherits the defaults and scopes its inline
    // keys to itself.
    for (spec, directive) in file_converts {
        let src = resolve_fqn(&spec.source, &file.package_aliases)
            .map_err(|reason| malformed(&directive, reason))?;
        let tgt = resolve_fqn(&spec.target, &file.package_aliases)
            .map_err(|reason| malformed(&directive, reason))?;
        file.type_pairs.insert(src.clone(), tgt.clone());
        let mut rules = file.clone();
        apply_convert_inline(&mut rules, &src, &spec);
        per_type.insert(src, rules);
    }

    // Type-attached groups, in first-appearance order.
    let mut attached: Vec<(String, Vec<&RawDirective>)> = Vec::new();
    for directive in directives {
        let Attachment::Type(name) = &directive.attachment else {
            continue;
        };
        match attached.iter_mut().find(|(n, _)| n.as_str() == name.as_str()) {
            Some((_, group)) => group.push(directive),
            None => attached.push((name.clone(), vec![directive])),
        }
    }

    for (name, group) in attached {
        let attached_fqn = format!("{}.{}", pkg_path, name);
        let mut rules = file.clone();
        let mut keys = vec![attached_fqn.clone()];
        for directive in group {
            match parse_payload(&directive.text).map_err(|reason| malformed(directive, reason))? {
                Payload::Convert(spec) => {
                    let src = resolve_fqn(&spec.source, &rules.package_aliases)
                        .map_err(|reason| malformed(directive, reason))?;
                    let tgt = resolve_fqn(&spec.target, &rules.package_aliases)
                        .map_err(|reason| malformed(directive, reason))?;
                    rules.type_pairs.insert(src.clone(), tgt.clone());
                    apply_convert_inline(&mut rules, &src, &spec);
                    keys.push(src);
                }
                payload => apply_simple(&mut rules, payload, Some(&attached_fqn), directive)?,
            }
        }
        for key in keys {
            per_type.insert(key, rules.clone());
        }
    }

    Ok(CompiledRules { file, per_type })
}

fn malformed(directive: &RawDirective, reason: String) -> RuleError {
    RuleError::Malformed {
        raw: directive.text.clone(),
        position: directive.position.clone(),
        reason,
    }
}

fn apply_simple(
    rules: &mut RuleSet,
    payload: Payload,
    attached_fqn: Option<&str>,
    directive: &RawDirective,
) -> Result<(), RuleError> {
    match payload {
        Payload::PackageAlias { path, alias } => {
            // Last definition wins; shadowing mirrors explicit user intent.
            rules.package_aliases.insert(alias, path);
        }
        Payload::PackagePair { source, target } => {
            let pair = (
                resolve_pkg(&source, &rules.package_aliases),
                resolve_pkg(&target, &rules.package_aliases),
            );
            if !rules.package_pairs.contains(&pair) {
                rules.package_pairs.push(pair);
            }
        }
        Payload::Direction(direction) => rules.direction = direction,
        Payload::Affix {
            target_side,
            suffix,
            value,
        } => {
            let slot = match (target_side, suffix) {
                (false, false) => &mut rules.naming.source_prefix,
                (false, true) => &mut rules.naming.source_suffix,
                (true, false) => &mut rules.naming.target_prefix,
                (true, true) => &mut rules.naming.target_suffix,
            };
            *slot = value;
        }
        Payload::Ignore(value) => {
            apply_ignore(rules, &value, attached_fqn)
                .map_err(|reason| malformed(directive, reason))?;
        }
        Payload::Remap(entries) => {
            let key = attached_fqn.unwrap_or("").to_string();
            for (field, path) in entries {
                rules.remap_fields.insert((key.clone(), field), path);
            }
        }
        Payload::Rule {
            source,
            target,
            func,
        } => {
            let rule = CustomRule {
                source: resolve_fqn(&source, &rules.package_aliases)
                    .map_err(|reason| malformed(directive, reason))?,
                target: resolve_type_token(&target, &rules.package_aliases),
                func,
            };
            if !rules.custom_rules.contains(&rule) {
                rules.custom_rules.push(rule);
            }
        }
        Payload::Convert(_) => unreachable!("convert handled by caller"),
    }
    Ok(())
}

/// Apply one `convert:ignore` payload. `#` switches the type scope; bare
/// names are fields of the current scope, or whole types when no scope is
/// in effect.
fn apply_ignore(
    rules: &mut RuleSet,
    value: &str,
    attached_fqn: Option<&str>,
) -> Result<(), String> {
    let mut scope: Option<String> = attached_fqn.map(str::to_string);
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if let Some((type_part, field)) = item.split_once('#') {
            let fqn = resolve_type_token(type_part, &rules.package_aliases);
            if !field.is_empty() {
                rules
                    .ignore_fields
                    .insert((fqn.clone(), field.to_string()));
            }
            scope = Some(fqn);
        } else if let Some(fqn) = &scope {
            rules
                .ignore_fields
                .insert((fqn.clone(), item.to_string()));
        } else {
            rules
                .ignore_types
                .insert(resolve_type_token(item, &rules.package_aliases));
        }
    }
    Ok(())
}

fn apply_convert_inline(rules: &mut RuleSet, src_fqn: &str, spec: &ConvertSpec) {
    for field in &spec.ignore {
        rules
            .ignore_fields
            .insert((src_fqn.to_string(), field.clone()));
    }
    for (field, path) in &spec.remap {
        rules
            .remap_fields
            .insert((src_fqn.to_string(), field.clone()), path.clone());
    }
    if let Some(direction) = spec.direction {
        rules.direction = direction;
    }
}

// ============================================================================
// FQN Resolution
// ============================================================================

/// Resolve a `pkg.Type` token against the alias table. The package part is
/// everything up to the last dot; an unknown package part passes through as
/// a literal path.
fn resolve_fqn(token: &str, aliases: &BTreeMap<String, String>) -> Result<String, String> {
    let Some((pkg, name)) = token.rsplit_once('.') else {
        return Err(format!("expected qualified type name, got {:?}", token));
    };
    if pkg.is_empty() || name.is_empty() {
        return Err(format!("expected qualified type name, got {:?}", token));
    }
    let path = aliases.get(pkg).map(String::as_str).unwrap_or(pkg);
    Ok(format!("{}.{}", path, name))
}

/// Like `resolve_fqn`, but a bare name (no dot) passes through unchanged;
/// ignore lists may name types by simple name.
fn resolve_type_token(token: &str, aliases: &BTreeMap<String, String>) -> String {
    match resolve_fqn(token, aliases) {
        Ok(fqn) => fqn,
        Err(_) => token.to_string(),
    }
}

fn resolve_pkg(token: &str, aliases: &BTreeMap<String, String>) -> String {
    aliases.get(token).cloned().unwrap_or_else(|| token.to_string())
}

// ============================================================================
// Payload Parsing
// ============================================================================

#[derive(Debug)]
enum Payload {
    PackageAlias { path: String, alias: String },
    PackagePair { source: String, target: String },
    Convert(ConvertSpec),
    Direction(Direction),
    Affix {
        target_side: bool,
        suffix: bool,
        value: String,
    },
    Ignore(String),
    Remap(Vec<(String, String)>),
    Rule {
        source: String,
        target: String,
        func: String,
    },
}

#[derive(Debug)]
struct ConvertSpec {
    source: String,
    target: String,
    ignore: Vec<String>,
    remap: Vec<(String, String)>,
    direction: Option<Direction>,
}

fn parse_payload(text: &str) -> Result<Payload, String> {
    if let Some(rest) = text.strip_prefix("package:") {
        return parse_package_alias(rest);
    }
    if let Some(rest) = text.strip_prefix("pair:") {
        return parse_package_pair(rest);
    }
    if let Some(rest) = text.strip_prefix("convert=") {
        return parse_convert(rest).map(Payload::Convert);
    }
    if let Some(rest) = text.strip_prefix("convert:") {
        return parse_convert_sub(rest);
    }
    Err(format!("unknown directive verb in {:?}", text))
}

fn parse_package_alias(rest: &str) -> Result<Payload, String> {
    let mut path = None;
    let mut alias = None;
    for item in rest.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| format!("expected key=value, got {:?}", item))?;
        match key {
            "path" => path = Some(unquote(value).to_string()),
            "alias" => {
                let value = unquote(value);
                if !is_ident(value) {
                    return Err(format!("alias must be an identifier, got {:?}", value));
                }
                alias = Some(value.to_string());
            }
            other => return Err(format!("unknown package key {:?}", other)),
        }
    }
    match (path, alias) {
        (Some(path), Some(alias)) => Ok(Payload::PackageAlias { path, alias }),
        (None, _) => Err("package directive requires path=".to_string()),
        (_, None) => Err("package directive requires alias=".to_string()),
    }
}

fn parse_package_pair(rest: &str) -> Result<Payload, String> {
    let value = rest
        .strip_prefix("packages=")
        .ok_or_else(|| "pair directive requires packages=".to_string())?;
    let value = unquote(value);
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    match parts.as_slice() {
        [source, target] if !source.is_empty() && !target.is_empty() => {
            Ok(Payload::PackagePair {
                source: source.to_string(),
                target: target.to_string(),
            })
        }
        _ => Err(format!(
            "pair:packages expects exactly two packages, got {:?}",
            value
        )),
    }
}

fn parse_convert(rest: &str) -> Result<ConvertSpec, String> {
    let value = unquote(rest);
    let mut items = value.split(',').map(str::trim);
    let source = items
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "convert requires a source type".to_string())?
        .to_string();
    let target = items
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| "convert requires a target type".to_string())?
        .to_string();

    let mut spec = ConvertSpec {
        source,
        target,
        ignore: Vec::new(),
        remap: Vec::new(),
        direction: None,
    };
    // Bare items continue the preceding csv-valued key.
    let mut in_ignore = false;
    for item in items.filter(|s| !s.is_empty()) {
        match item.split_once('=') {
            Some(("ignore", value)) => {
                spec.ignore.push(value.to_string());
                in_ignore = true;
            }
            Some(("remap", value)) => {
                spec.remap.extend(parse_remap_list(value)?);
                in_ignore = false;
            }
            Some(("direction", value)) => {
                spec.direction = Some(parse_direction(value)?);
                in_ignore = false;
            }
            Some((key, _)) => return Err(format!("unknown convert key {:?}", key)),
            None if in_ignore => spec.ignore.push(item.to_string()),
            None => return Err(format!("unexpected convert token {:?}", item)),
        }
    }
    Ok(spec)
}

fn parse_convert_sub(rest: &str) -> Result<Payload, String> {
    if let Some(value) = rest.strip_prefix("direction=") {
        return Ok(Payload::Direction(parse_direction(unquote(value))?));
    }
    for (prefix, target_side, suffix) in [
        ("source:prefix=", false, false),
        ("source:suffix=", false, true),
        ("target:prefix=", true, false),
        ("target:suffix=", true, true),
    ] {
        if let Some(value) = rest.strip_prefix(prefix) {
            return Ok(Payload::Affix {
                target_side,
                suffix,
                value: unquote(value).to_string(),
            });
        }
    }
    if let Some(value) = rest.strip_prefix("ignore=") {
        return Ok(Payload::Ignore(unquote(value).to_string()));
    }
    if let Some(value) = rest.strip_prefix("remap=") {
        return Ok(Payload::Remap(parse_remap_list(unquote(value))?));
    }
    if let Some(value) = rest.strip_prefix("rule=") {
        return parse_rule(unquote(value));
    }
    Err(format!("unknown convert directive {:?}", rest))
}

fn parse_remap_list(value: &str) -> Result<Vec<(String, String)>, String> {
    let mut entries = Vec::new();
    for item in value.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (field, path) = item
            .split_once(':')
            .ok_or_else(|| format!("remap entry needs field:path, got {:?}", item))?;
        if field.is_empty() || path.is_empty() {
            return Err(format!("remap entry needs field:path, got {:?}", item));
        }
        entries.push((field.to_string(), path.to_string()));
    }
    if entries.is_empty() {
        return Err("remap requires at least one field:path entry".to_string());
    }
    Ok(entries)
}

fn parse_rule(value: &str) -> Result<Payload, String> {
    let mut source = None;
    let mut target = None;
    let mut func = None;
    for item in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (key, val) = item
            .split_once(':')
            .ok_or_else(|| format!("rule entry needs key:value, got {:?}", item))?;
        match key {
            "source" => source = Some(val.to_string()),
            "target" => target = Some(val.to_string()),
            "func" => {
                if !is_ident(val) {
                    return Err(format!("rule func must be an identifier, got {:?}", val));
                }
                func = Some(val.to_string());
            }
            other => return Err(format!("unknown rule key {:?}", other)),
        }
    }
    match (source, target, func) {
        (Some(source), Some(target), Some(func)) => Ok(Payload::Rule {
            source,
            target,
            func,
        }),
        _ => Err("rule requires source:, target:, and func:".to_string()),
    }
}

fn parse_direction(value: &str) -> Result<Direction, String> {
    match unquote(value) {
        "both" => Ok(Direction::Both),
        "oneway" => Ok(Direction::OneWay),
        other => Err(format!("direction must be \"both\" or \"oneway\", got {:?}", other)),
    }
}

/// Strip one level of double quotes via the same quoted-value parser the
/// rest of the grammar uses; bare values pass through.
fn unquote(value: &str) -> &str {
    let mut input = value.trim();
    match quoted.parse_next(&mut input) {
        Ok(inner) if input.is_empty() => inner,
        _ => value.trim(),
    }
}

fn quoted<'s>(input: &mut &'s str) -> ModalResult<&'s str> {
    if !input.starts_with('"') {
        return Err(ErrMode::from_input(input));
    }
    delimited('"', take_till(0.., |c| c == '"'), '"').parse_next(input)
}

fn is_ident(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false)
        && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::Attachment;

    const PKG: &str = "example.com/app/gen";

    fn file_directive(text: &str) -> RawDirective {
        RawDirective {
            text: text.to_string(),
            position: Pos::new("gen.go", 1, 1),
            attachment: Attachment::File,
        }
    }

    fn type_directive(text: &str, type_name: &str) -> RawDirective {
        RawDirective {
            text: text.to_string(),
            position: Pos::new("gen.go", 1, 1),
            attachment: Attachment::Type(type_name.to_string()),
        }
    }

    mod aliases_and_pairs {
        use super::*;

        #[test]
        fn alias_resolution_in_pair() {
            let rules = compile(
                &[
                    file_directive("package:path=example.com/app/a,alias=a"),
                    file_directive("package:path=example.com/app/b,alias=b"),
                    file_directive("pair:packages=\"a,b\""),
                ],
                PKG,
            )
            .expect("compile");
            assert_eq!(
                rules.file.package_pairs,
                vec![("example.com/app/a".to_string(), "example.com/app/b".to_string())]
            );
        }

        #[test]
        fn literal_paths_pass_through() {
            let rules = compile(
                &[file_directive("pair:packages=\"example.com/x,example.com/y\"")],
                PKG,
            )
            .expect("compile");
            assert_eq!(
                rules.file.package_pairs,
                vec![("example.com/x".to_string(), "example.com/y".to_string())]
            );
        }

        #[test]
        fn alias_shadowing_last_wins() {
            let rules = compile(
                &[
                    file_directive("package:path=example.com/old,alias=a"),
                    file_directive("package:path=example.com/new,alias=a"),
                ],
                PKG,
            )
            .expect("compile");
            assert_eq!(
                rules.file.package_aliases.get("a").map(String::as_str),
                Some("example.com/new")
            );
        }
    }

    mod converts {
        use super::*;

        #[test]
        fn explicit_pair_with_inline_keys() {
            let rules = compile(
                &[
                    file_directive("package:path=example.com/app/a,alias=a"),
                    file_directive("package:path=example.com/app/b,alias=b"),
                    file_directive(
                        "convert=\"a.User,b.User,ignore=Secret,Password,remap=RoleIDs:Edges.Roles.ID,direction=both\"",
                    ),
                ],
                PKG,
            )
            .expect("compile");

            let pairs = rules.all_type_pairs();
            assert_eq!(
                pairs.get("example.com/app/a.User").map(String::as_str),
                Some("example.com/app/b.User")
            );

            let effective = rules.for_source("example.com/app/a.User");
            assert!(effective.is_ignored_field("example.com/app/a.User", "Secret"));
            assert!(effective.is_ignored_field("example.com/app/a.User", "Password"));
            assert_eq!(
                effective.remap_for("example.com/app/a.User", "RoleIDs"),
                Some("Edges.Roles.ID")
            );
            assert_eq!(effective.direction, Direction::Both);
            // Inline keys do not leak into the file scope.
            assert_eq!(rules.file.direction, Direction::OneWay);
            assert!(rules.file.ignore_fields.is_empty());
        }

        #[test]
        fn missing_target_is_malformed() {
            let err = compile(&[file_directive("convert=\"a.User\"")], PKG).unwrap_err();
            let RuleError::Malformed { reason, .. } = err;
            assert!(reason.contains("target"));
        }
    }

    mod scopes {
        use super::*;

        #[test]
        fn type_attached_inherits_file_defaults() {
            let rules = compile(
                &[
                    file_directive("convert:direction=\"both\""),
                    file_directive("convert:source:prefix=\"Db\""),
                    type_directive("convert:ignore=\"Secret\"", "User"),
                ],
                PKG,
            )
            .expect("compile");

            let attached = format!("{}.User", PKG);
            let effective = rules.for_source(&attached);
            assert_eq!(effective.direction, Direction::Both);
            assert_eq!(effective.naming.source_prefix, "Db");
            // The bare name scoped to the attached type.
            assert!(effective.is_ignored_field(&attached, "Secret"));
            // The file scope is untouched.
            assert!(!rules.file.is_ignored_field(&attached, "Secret"));
        }

        #[test]
        fn type_attached_scalar_overrides_do_not_leak() {
            let rules = compile(
                &[
                    file_directive("convert:direction=\"both\""),
                    type_directive("convert:direction=\"oneway\"", "User"),
                ],
                PKG,
            )
            .expect("compile");
            assert_eq!(rules.file.direction, Direction::Both);
            assert_eq!(
                rules.for_source(&format!("{}.User", PKG)).direction,
                Direction::OneWay
            );
        }

        #[test]
        fn attached_convert_registers_both_keys() {
            let rules = compile(
                &[
                    file_directive("package:path=example.com/app/a,alias=a"),
                    file_directive("package:path=example.com/app/b,alias=b"),
                    type_directive("convert=\"a.User,b.UserPB\"", "User"),
                ],
                PKG,
            )
            .expect("compile");
            assert!(rules.per_type.contains_key(&format!("{}.User", PKG)));
            assert!(rules.per_type.contains_key("example.com/app/a.User"));
        }
    }

    mod ignore_payloads {
        use super::*;

        #[test]
        fn hash_scopes_persist_until_next_hash() {
            let rules = compile(
                &[
                    file_directive("package:path=example.com/app/a,alias=a"),
                    file_directive(
                        "convert:ignore=\"a.User#Secret,Password,a.Role#Internal\"",
                    ),
                ],
                PKG,
            )
            .expect("compile");
            let f = &rules.file;
            assert!(f.is_ignored_field("example.com/app/a.User", "Secret"));
            assert!(f.is_ignored_field("example.com/app/a.User", "Password"));
            assert!(f.is_ignored_field("example.com/app/a.Role", "Internal"));
            assert!(f.ignore_types.is_empty());
        }

        #[test]
        fn bare_names_without_scope_ignore_types() {
            let rules = compile(&[file_directive("convert:ignore=\"Role\"")], PKG)
                .expect("compile");
            assert!(rules.file.is_ignored_type("whatever.Role", "Role"));
        }
    }

    mod remap_and_rule {
        use super::*;

        #[test]
        fn file_level_remap_is_a_wildcard() {
            let rules = compile(
                &[file_directive("convert:remap=\"RoleIDs:Edges.Roles.ID;Alt:X.Y\"")],
                PKG,
            )
            .expect("compile");
            assert_eq!(
                rules.file.remap_for("example.com/anything.T", "RoleIDs"),
                Some("Edges.Roles.ID")
            );
            assert_eq!(rules.file.remap_for("example.com/anything.T", "Alt"), Some("X.Y"));
        }

        #[test]
        fn custom_rule_parses_and_resolves() {
            let rules = compile(
                &[file_directive("convert:rule=\"source:time.Time,target:string,func:TimeToString\"")],
                PKG,
            )
            .expect("compile");
            assert_eq!(
                rules.file.custom_rules,
                vec![CustomRule {
                    source: "time.Time".to_string(),
                    target: "string".to_string(),
                    func: "TimeToString".to_string(),
                }]
            );
        }

        #[test]
        fn duplicate_custom_rules_collapse() {
            let d = "convert:rule=\"source:time.Time,target:string,func:TimeToString\"";
            let rules = compile(&[file_directive(d), file_directive(d)], PKG).expect("compile");
            assert_eq!(rules.file.custom_rules.len(), 1);
        }
    }

    mod failures {
        use super::*;

        #[test]
        fn unknown_verb_fails_fast() {
            let err = compile(&[file_directive("frobnicate:x=1")], PKG).unwrap_err();
            let RuleError::Malformed { reason, raw, .. } = err;
            assert!(reason.contains("unknown directive verb"));
            assert_eq!(raw, "frobnicate:x=1");
        }

        #[test]
        fn bad_direction_fails() {
            let err =
                compile(&[file_directive("convert:direction=\"sideways\"")], PKG).unwrap_err();
            let RuleError::Malformed { reason, .. } = err;
            assert!(reason.contains("direction"));
        }

        #[test]
        fn package_without_alias_fails() {
            let err = compile(&[file_directive("package:path=example.com/a")], PKG).unwrap_err();
            let RuleError::Malformed { reason, .. } = err;
            assert!(reason.contains("alias"));
        }

        #[test]
        fn pair_with_three_packages_fails() {
            let err =
                compile(&[file_directive("pair:packages=\"a,b,c\"")], PKG).unwrap_err();
            let RuleError::Malformed { reason, .. } = err;
            assert!(reason.contains("exactly two"));
        }
    }
}
