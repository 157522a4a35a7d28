//! Pair expansion: from rules to the final set of conversion pairs.
//!
//! Explicit `convert=` pairs come first. Each package-pair directive then
//! expands into concrete type pairs by intersecting the exported
//! named-struct names of both packages, minus ignored types. When the
//! effective direction is `both`, every pair also contributes its reverse.
//! The result is de-duplicated by `(source_fqn, target_fqn)` identity.
//!
//! Each pair carries its generated function name,
//! `Convert<Source>To<Target>`, where both components are the type's simple
//! name decorated by the naming affixes. Affixes are local to the
//! identifier; they never alter type identity.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::loader::PackageLoader;
use crate::resolve::{split_fqn, Resolver, ResolveError, TypeId};
use crate::rules::{CompiledRules, Direction, NamingRules};

// ============================================================================
// Pair Model
// ============================================================================

/// One conversion to generate: source to target, with its function name.
#[derive(Debug, Clone, Serialize)]
pub struct ConvPair {
    pub src: TypeId,
    pub tgt: TypeId,
    pub src_fqn: String,
    pub tgt_fqn: String,
    pub func_name: String,
}

/// The expanded, de-duplicated pair set, in expansion order.
#[derive(Debug, Clone, Default)]
pub struct PairSet {
    pub pairs: Vec<ConvPair>,
}

impl PairSet {
    /// The generated function name for a pair, if it is in the set. The
    /// planner uses this to wire struct-to-struct fields to their callees.
    pub fn func_for(&self, src_fqn: &str, tgt_fqn: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|p| p.src_fqn == src_fqn && p.tgt_fqn == tgt_fqn)
            .map(|p| p.func_name.as_str())
    }
}

/// The decorated simple name used in generated identifiers.
fn decorate(simple: &str, prefix: &str, suffix: &str) -> String {
    format!("{}{}{}", prefix, simple, suffix)
}

/// `Convert<Source>To<Target>` with affixes applied per side.
pub fn function_name(naming: &NamingRules, src_fqn: &str, tgt_fqn: &str) -> String {
    let (_, src_simple) = split_fqn(src_fqn);
    let (_, tgt_simple) = split_fqn(tgt_fqn);
    format!(
        "Convert{}To{}",
        decorate(src_simple, &naming.source_prefix, &naming.source_suffix),
        decorate(tgt_simple, &naming.target_prefix, &naming.target_suffix),
    )
}

// ============================================================================
// Expansion
// ============================================================================

/// Expand rules into the final pair set.
///
/// Types explicitly named in directives must resolve; failures are fatal.
/// During package-pair expansion a name that fails to resolve is simply not
/// paired.
pub fn expand<L: PackageLoader>(
    resolver: &mut Resolver<L>,
    rules: &CompiledRules,
) -> Result<PairSet, ResolveError> {
    let mut seen: BTreeSet<(String, String)> = BTreeSet::new();
    let mut out = PairSet::default();

    // Explicit type pairs first; these also override expansion for their
    // source type.
    let explicit = rules.all_type_pairs();
    for (src_fqn, tgt_fqn) in &explicit {
        let src = resolver.resolve_fqn(src_fqn)?;
        let tgt = resolver.resolve_fqn(tgt_fqn)?;
        push_pair(
            &mut out,
            &mut seen,
            rules,
            src,
            tgt,
            src_fqn.clone(),
            tgt_fqn.clone(),
        );
    }

    // Package pairs: intersect exported named-struct names.
    for (src_path, tgt_path) in rules.all_package_pairs() {
        let src_names: BTreeSet<String> =
            resolver.exported_struct_names(&src_path)?.into_iter().collect();
        let tgt_names: BTreeSet<String> =
            resolver.exported_struct_names(&tgt_path)?.into_iter().collect();

        for name in src_names.intersection(&tgt_names) {
            let src_fqn = format!("{}.{}", src_path, name);
            let tgt_fqn = format!("{}.{}", tgt_path, name);
            if explicit.contains_key(&src_fqn) {
                // An explicit pair already claimed this source type.
                continue;
            }
            let effective = rules.for_source(&src_fqn);
            if effective.is_ignored_type(&src_fqn, name) {
                tracing::debug!(name = name.as_str(), "pair expansion: type ignored");
                continue;
            }
            if seen.contains(&(src_fqn.clone(), tgt_fqn.clone())) {
                continue;
            }
            // Both names came from the package scopes, so resolution is
            // expected to succeed; a failure here means the type is simply
            // not paired.
            let (src, tgt) = match (resolver.resolve_fqn(&src_fqn), resolver.resolve_fqn(&tgt_fqn))
            {
                (Ok(src), Ok(tgt)) => (src, tgt),
                (Err(err), _) | (_, Err(err)) => {
                    tracing::warn!(
                        src = src_fqn.as_str(),
                        tgt = tgt_fqn.as_str(),
                        error = %err,
                        "pair expansion: skipping unresolvable pair"
                    );
                    continue;
                }
            };
            push_pair(&mut out, &mut seen, rules, src, tgt, src_fqn, tgt_fqn);
        }
    }

    disambiguate(&mut out, rules);
    Ok(out)
}

/// Two pairs can decorate to the same function name, most commonly the
/// reverse pair of an undifferentiated `direction=both` expansion. The
/// generated file must still compile, so colliding names gain their
/// package's capitalized local name inside each component.
fn disambiguate(set: &mut PairSet, rules: &CompiledRules) {
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for pair in &set.pairs {
        *counts.entry(pair.func_name.clone()).or_insert(0) += 1;
    }
    for pair in &mut set.pairs {
        if counts.get(&pair.func_name).copied().unwrap_or(0) > 1 {
            let naming = &rules.for_source(&pair.src_fqn).naming;
            let (src_pkg, src_simple) = split_fqn(&pair.src_fqn);
            let (tgt_pkg, tgt_simple) = split_fqn(&pair.tgt_fqn);
            pair.func_name = format!(
                "Convert{}To{}",
                decorate(
                    &format!("{}{}", title(src_pkg.unwrap_or("")), src_simple),
                    &naming.source_prefix,
                    &naming.source_suffix,
                ),
                decorate(
                    &format!("{}{}", title(tgt_pkg.unwrap_or("")), tgt_simple),
                    &naming.target_prefix,
                    &naming.target_suffix,
                ),
            );
        }
    }
}

/// The package's local name with its first letter uppercased.
fn title(pkg_path: &str) -> String {
    let segment = pkg_path.rsplit('/').next().unwrap_or(pkg_path);
    let mut chars = segment.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Add a pair and, when the effective direction is `both`, its reverse.
#[allow(clippy::too_many_arguments)]
fn push_pair(
    out: &mut PairSet,
    seen: &mut BTreeSet<(String, String)>,
    rules: &CompiledRules,
    src: TypeId,
    tgt: TypeId,
    src_fqn: String,
    tgt_fqn: String,
) {
    let effective = rules.for_source(&src_fqn);
    let direction = effective.direction;

    if seen.insert((src_fqn.clone(), tgt_fqn.clone())) {
        out.pairs.push(ConvPair {
            src,
            tgt,
            src_fqn: src_fqn.clone(),
            tgt_fqn: tgt_fqn.clone(),
            func_name: function_name(&effective.naming, &src_fqn, &tgt_fqn),
        });
    }

    if direction == Direction::Both && seen.insert((tgt_fqn.clone(), src_fqn.clone())) {
        // The reverse pair carries the per-pair rules with source and
        // target swapped: its effective rule set is looked up by the new
        // source FQN at planning time.
        let reverse_naming = &rules.for_source(&tgt_fqn).naming;
        out.pairs.push(ConvPair {
            src: tgt,
            tgt: src,
            src_fqn: tgt_fqn.clone(),
            tgt_fqn: src_fqn.clone(),
            func_name: function_name(reverse_naming, &tgt_fqn, &src_fqn),
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
