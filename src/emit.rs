//! Emission plan assembly.
//!
//! Collates `FunctionPlan`s into a single `GenerationPlan`: the target
//! package clause, the sorted set of non-self imports inferred from every
//! referenced type, the local type aliases to emit, and the custom-stub
//! signatures required by referenced custom rules.
//!
//! Functions are ordered lexicographically by generated name so outputs
//! are byte-stable across runs for unchanged inputs.
//!
//! ## Local type aliases
//!
//! The alias name is the affix-decorated simple name of a pair's source or
//! target type. A decorated name claimed by two different types (the
//! no-affix case, where both packages export the same simple name) is
//! dropped, and those references stay package-qualified.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::plan::{FieldOp, FunctionPlan, ValuePlan};
use crate::resolve::{split_fqn, TypeArena, TypeId, TypeKind};
use crate::rules::CompiledRules;

// ============================================================================
// Plan Model
// ============================================================================

/// One import of the generated file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSpec {
    /// Local name the file uses for the package.
    pub local: String,
    pub path: String,
    /// True when the local name differs from the path's last segment and
    /// the import declaration must spell it.
    pub needs_alias: bool,
}

/// A local type alias declaration, `type <name> = <target>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasDecl {
    pub name: String,
    pub target_fqn: String,
}

/// A custom-function placeholder to emit in the custom file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StubPlan {
    pub func: String,
    pub source: String,
    pub target: String,
}

/// A function plan with its rendered signature type names.
#[derive(Debug, Clone, Serialize)]
pub struct EmittedFunction {
    pub plan: FunctionPlan,
    /// Base type name of the source parameter (alias or qualified).
    pub src_name: String,
    /// Base type name of the return value (alias or qualified).
    pub tgt_name: String,
}

/// The complete, deterministic emission input for one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationPlan {
    pub package_name: String,
    pub package_path: String,
    pub imports: Vec<ImportSpec>,
    /// Import path to local name, for rendering qualified type names.
    pub qualifiers: BTreeMap<String, String>,
    pub aliases: Vec<AliasDecl>,
    pub functions: Vec<EmittedFunction>,
    pub stubs: Vec<StubPlan>,
    pub stub_imports: Vec<ImportSpec>,
    pub stub_qualifiers: BTreeMap<String, String>,
}

// ============================================================================
// Assembly
// ============================================================================

/// Assemble the generation plan.
pub fn assemble(
    arena: &TypeArena,
    rules: &CompiledRules,
    package_path: &str,
    package_name: &str,
    mut plans: Vec<FunctionPlan>,
) -> GenerationPlan {
    plans.sort_by(|a, b| a.name.cmp(&b.name));

    // Imports: every package a rendered type name comes from.
    let mut paths: BTreeSet<String> = BTreeSet::new();
    for plan in &plans {
        collect_type(arena, plan.src, &mut paths);
        collect_type(arena, plan.tgt, &mut paths);
        for field in &plan.fields {
            collect_op(arena, &field.op, &mut paths);
        }
    }
    paths.remove(package_path);
    let (imports, qualifiers) = assign_qualifiers(rules, &paths);

    // Local type aliases: decorated names that are unambiguous across the
    // whole plan.
    let mut candidates: BTreeMap<String, String> = BTreeMap::new();
    let mut poisoned: BTreeSet<String> = BTreeSet::new();
    let mut claim = |name: String, fqn: &str| {
        match candidates.get(&name) {
            Some(existing) if existing != fqn => {
                poisoned.insert(name);
            }
            _ => {
                candidates.insert(name, fqn.to_string());
            }
        }
    };
    for plan in &plans {
        let naming = &rules.for_source(&plan.src_fqn).naming;
        let (_, src_simple) = split_fqn(&plan.src_fqn);
        let (_, tgt_simple) = split_fqn(&plan.tgt_fqn);
        claim(
            format!("{}{}{}", naming.source_prefix, src_simple, naming.source_suffix),
            &plan.src_fqn,
        );
        claim(
            format!("{}{}{}", naming.target_prefix, tgt_simple, naming.target_suffix),
            &plan.tgt_fqn,
        );
    }
    let mut alias_by_fqn: BTreeMap<String, String> = BTreeMap::new();
    let mut aliases: Vec<AliasDecl> = Vec::new();
    for (name, fqn) in &candidates {
        if poisoned.contains(name) {
            continue;
        }
        let (pkg, simple) = split_fqn(fqn);
        // A self-package type under its own name needs no alias.
        if pkg == Some(package_path) && name == simple {
            continue;
        }
        aliases.push(AliasDecl {
            name: name.clone(),
            target_fqn: fqn.clone(),
        });
        alias_by_fqn.insert(fqn.clone(), name.clone());
    }

    // Signature names: alias when one was emitted, qualified otherwise.
    let functions: Vec<EmittedFunction> = plans
        .into_iter()
        .map(|plan| {
            let src_name = alias_by_fqn
                .get(&plan.src_fqn)
                .cloned()
                .unwrap_or_else(|| qualify(&qualifiers, package_path, &plan.src_fqn));
            let tgt_name = alias_by_fqn
                .get(&plan.tgt_fqn)
                .cloned()
                .unwrap_or_else(|| qualify(&qualifiers, package_path, &plan.tgt_fqn));
            EmittedFunction {
                plan,
                src_name,
                tgt_name,
            }
        })
        .collect();

    // Custom stubs: union of referenced custom rules, one per func name.
    let mut stubs: Vec<StubPlan> = Vec::new();
    for function in &functions {
        for rule in &function.plan.used_customs {
            match stubs.iter().find(|s| s.func == rule.func) {
                Some(existing)
                    if existing.source != rule.source || existing.target != rule.target =>
                {
                    tracing::warn!(
                        func = rule.func.as_str(),
                        "custom func used with conflicting signatures; keeping the first"
                    );
                }
                Some(_) => {}
                None => stubs.push(StubPlan {
                    func: rule.func.clone(),
                    source: rule.source.clone(),
                    target: rule.target.clone(),
                }),
            }
        }
    }
    stubs.sort_by(|a, b| a.func.cmp(&b.func));

    let mut stub_paths: BTreeSet<String> = BTreeSet::new();
    for stub in &stubs {
        for fqn in [&stub.source, &stub.target] {
            if let (Some(pkg), _) = split_fqn(fqn) {
                if pkg != package_path {
                    stub_paths.insert(pkg.to_string());
                }
            }
        }
    }
    let (stub_imports, stub_qualifiers) = assign_qualifiers(rules, &stub_paths);

    GenerationPlan {
        package_name: package_name.to_string(),
        package_path: package_path.to_string(),
        imports,
        qualifiers,
        aliases,
        functions,
        stubs,
        stub_imports,
        stub_qualifiers,
    }
}

/// Render a named type's reference: unqualified for self-package types and
/// primitives, `local.Name` otherwise.
pub fn qualify(
    qualifiers: &BTreeMap<String, String>,
    package_path: &str,
    fqn: &str,
) -> String {
    match split_fqn(fqn) {
        (Some(pkg), name) if pkg != package_path => {
            let local = qualifiers
                .get(pkg)
                .cloned()
                .unwrap_or_else(|| last_segment(pkg).to_string());
            format!("{}.{}", local, name)
        }
        (_, name) => name.to_string(),
    }
}

// ============================================================================
// Import Qualifier Assignment
// ============================================================================

/// Assign a deterministic local name to each import path. User-declared
/// package aliases are preferred; collisions get a numeric suffix in
/// sorted-path order.
fn assign_qualifiers(
    rules: &CompiledRules,
    paths: &BTreeSet<String>,
) -> (Vec<ImportSpec>, BTreeMap<String, String>) {
    let user_alias: BTreeMap<&str, &str> = rules
        .file
        .package_aliases
        .iter()
        .map(|(alias, path)| (path.as_str(), alias.as_str()))
        .collect();

    let mut taken: BTreeSet<String> = BTreeSet::new();
    let mut imports = Vec::new();
    let mut qualifiers = BTreeMap::new();
    for path in paths {
        let base = user_alias
            .get(path.as_str())
            .map(|a| a.to_string())
            .unwrap_or_else(|| sanitize(last_segment(path)));
        let mut local = base.clone();
        let mut n = 2;
        while !taken.insert(local.clone()) {
            local = format!("{}{}", base, n);
            n += 1;
        }
        qualifiers.insert(path.clone(), local.clone());
        imports.push(ImportSpec {
            needs_alias: local != last_segment(path),
            local,
            path: path.clone(),
        });
    }
    (imports, qualifiers)
}

fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// A valid identifier from a path segment.
fn sanitize(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if cleaned.is_empty() || cleaned.chars().next().map(char::is_numeric).unwrap_or(false) {
        format!("pkg{}", cleaned)
    } else {
        cleaned
    }
}

// ============================================================================
// Type Walks
// ============================================================================

/// Record the import path a rendered reference to `id` would need,
/// recursing through anonymous composites.
fn collect_type(arena: &TypeArena, id: TypeId, paths: &mut BTreeSet<String>) {
    let node = arena.get(id);
    if !node.import_path.is_empty() {
        paths.insert(node.import_path.clone());
        return;
    }
    if !node.name.is_empty() {
        // Primitive.
        return;
    }
    match node.kind {
        TypeKind::Pointer | TypeKind::Slice | TypeKind::Array | TypeKind::Chan => {
            if let Some(elem) = node.underlying {
                collect_type(arena, elem, paths);
            }
        }
        TypeKind::Map => {
            if let Some(key) = node.key_type {
                collect_type(arena, key, paths);
            }
            if let Some(value) = node.underlying {
                collect_type(arena, value, paths);
            }
        }
        _ => {}
    }
}

fn collect_op(arena: &TypeArena, op: &FieldOp, paths: &mut BTreeSet<String>) {
    match op {
        FieldOp::Cast { to } => collect_type(arena, *to, paths),
        FieldOp::SliceMap { slice_type, elem } => {
            collect_type(arena, *slice_type, paths);
            collect_value(arena, elem, paths);
        }
        FieldOp::MapMap {
            map_type,
            key,
            value,
        } => {
            collect_type(arena, *map_type, paths);
            collect_value(arena, key, paths);
            collect_value(arena, value, paths);
        }
        FieldOp::Copy
        | FieldOp::CallCustom { .. }
        | FieldOp::CallConversion { .. }
        | FieldOp::Unhandled { .. } => {}
    }
}

fn collect_value(arena: &TypeArena, value: &ValuePlan, paths: &mut BTreeSet<String>) {
    collect_op(arena, &value.op, paths);
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{Attachment, RawDirective};
    use crate::pairs::expand;
    use crate::plan::plan_pairs;
    use crate::resolve::Resolver;
    use crate::rules::compile;
    use crate::syntax::Pos;
    use crate::test_helpers::ModuleFixture;

    const GEN_PKG: &str = "example.com/app/gen";

    fn directive(text: &str) -> RawDirective {
        RawDirective {
            text: text.to_string(),
            position: Pos::new("gen.go", 1, 1),
            attachment: Attachment::File,
        }
    }

    fn assemble_fixture(fixture: &ModuleFixture, directives: &[&str]) -> GenerationPlan {
        let raw: Vec<RawDirective> = directives.iter().map(|d| directive(d)).collect();
        let rules = compile(&raw, GEN_PKG).expect("compile");
        let mut resolver = Resolver::new(fixture.loader());
        let pairs = expand(&mut resolver, &rules).expect("expand");
        let plans = plan_pairs(&resolver, &rules, &pairs);
        assemble(resolver.arena(), &rules, GEN_PKG, "gen", plans)
    }

    fn two_package_fixture() -> ModuleFixture {
        let fixture = ModuleFixture::new("example.com/app");
        fixture
            .package("a", &[("a.go", "package a\n\ntype User struct{ ID int64 }\n")])
            .package("b", &[("b.go", "package b\n\ntype User struct{ ID int64 }\n")]);
        fixture
    }

    #[test]
    fn imports_cover_signature_packages_and_sort() {
        let fixture = two_package_fixture();
        let plan = assemble_fixture(
            &fixture,
            &[
                "pair:packages=\"example.com/app/a,example.com/app/b\"",
                "convert:direction=\"both\"",
            ],
        );
        let paths: Vec<&str> = plan.imports.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(paths, vec!["example.com/app/a", "example.com/app/b"]);
        assert!(plan.imports.iter().all(|i| !i.needs_alias));
    }

    #[test]
    fn functions_sort_lexicographically() {
        let fixture = ModuleFixture::new("example.com/app");
        fixture
            .package(
                "a",
                &[("a.go", "package a\n\ntype Zed struct{ ID int }\ntype Abc struct{ ID int }\n")],
            )
            .package(
                "b",
                &[("b.go", "package b\n\ntype Zed struct{ ID int }\ntype Abc struct{ ID int }\n")],
            );
        let plan = assemble_fixture(
            &fixture,
            &["pair:packages=\"example.com/app/a,example.com/app/b\""],
        );
        let names: Vec<&str> = plan
            .functions
            .iter()
            .map(|f| f.plan.name.as_str())
            .collect();
        assert_eq!(names, vec!["ConvertAbcToAbc", "ConvertZedToZed"]);
    }

    #[test]
    fn colliding_decorated_names_fall_back_to_qualified() {
        let fixture = two_package_fixture();
        let plan = assemble_fixture(
            &fixture,
            &["pair:packages=\"example.com/app/a,example.com/app/b\""],
        );
        // Both sides decorate to "User": no aliases, qualified signatures.
        assert!(plan.aliases.is_empty());
        assert_eq!(plan.functions[0].src_name, "a.User");
        assert_eq!(plan.functions[0].tgt_name, "b.User");
    }

    #[test]
    fn affixed_names_become_aliases() {
        let fixture = two_package_fixture();
        let plan = assemble_fixture(
            &fixture,
            &[
                "pair:packages=\"example.com/app/a,example.com/app/b\"",
                "convert:source:prefix=\"Db\"",
                "convert:target:suffix=\"PB\"",
            ],
        );
        assert_eq!(
            plan.aliases,
            vec![
                AliasDecl {
                    name: "DbUser".to_string(),
                    target_fqn: "example.com/app/a.User".to_string(),
                },
                AliasDecl {
                    name: "UserPB".to_string(),
                    target_fqn: "example.com/app/b.User".to_string(),
                },
            ]
        );
        assert_eq!(plan.functions[0].src_name, "DbUser");
        assert_eq!(plan.functions[0].tgt_name, "UserPB");
    }

    #[test]
    fn user_package_aliases_name_the_imports() {
        let fixture = two_package_fixture();
        let plan = assemble_fixture(
            &fixture,
            &[
                "package:path=example.com/app/a,alias=src",
                "package:path=example.com/app/b,alias=dst",
                "pair:packages=\"src,dst\"",
            ],
        );
        let locals: Vec<&str> = plan.imports.iter().map(|i| i.local.as_str()).collect();
        assert_eq!(locals, vec!["src", "dst"]);
        assert!(plan.imports.iter().all(|i| i.needs_alias));
        assert_eq!(plan.functions[0].src_name, "src.User");
    }

    #[test]
    fn colliding_last_segments_get_numeric_suffixes() {
        let fixture = ModuleFixture::new("example.com/app");
        fixture
            .package(
                "x/models",
                &[("m.go", "package models\n\ntype User struct{ ID int }\n")],
            )
            .package(
                "y/models",
                &[("m.go", "package models\n\ntype User struct{ ID int }\n")],
            );
        let plan = assemble_fixture(
            &fixture,
            &["pair:packages=\"example.com/app/x/models,example.com/app/y/models\""],
        );
        let locals: Vec<&str> = plan.imports.iter().map(|i| i.local.as_str()).collect();
        assert_eq!(locals, vec!["models", "models2"]);
        assert!(plan.imports[1].needs_alias);
    }

    #[test]
    fn stubs_dedupe_by_func_and_collect_their_imports() {
        let fixture = ModuleFixture::new("example.com/app");
        fixture
            .package(
                "a",
                &[(
                    "a.go",
                    "package a\n\nimport \"time\"\n\ntype E struct {\n\tAt time.Time\n\tUpdated time.Time\n}\n",
                )],
            )
            .package(
                "b",
                &[("b.go", "package b\n\ntype E struct {\n\tAt string\n\tUpdated string\n}\n")],
            );
        let plan = assemble_fixture(
            &fixture,
            &[
                "pair:packages=\"example.com/app/a,example.com/app/b\"",
                "convert:rule=\"source:time.Time,target:string,func:TimeToString\"",
            ],
        );
        assert_eq!(plan.stubs.len(), 1);
        assert_eq!(plan.stubs[0].func, "TimeToString");
        let stub_paths: Vec<&str> = plan.stub_imports.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(stub_paths, vec!["time"]);
    }
}
