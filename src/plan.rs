//! Field planner: per-pair conversion plans.
//!
//! For each expanded pair the planner produces a `FunctionPlan` with one
//! `FieldPlan` per destination field. The per-field decision order, first
//! match wins:
//!
//! 1. custom rule (by fully-qualified type identity, aliases resolved)
//! 2. remap via a dotted source path
//! 3. ignore
//! 4. exact type match (after alias unwrap)
//! 5. numeric cast within the numeric family
//! 6. pointer-vs-value reshaping between matching element types
//! 7. slice-to-slice with a recursive element plan
//! 8. map-to-map with key and value plans
//! 9. struct-to-struct through a generated conversion function
//! 10. otherwise `Unhandled`, which renders as a commented-out assignment
//!
//! Target fields match source fields case-insensitively; on ambiguity the
//! first source field in declaration order wins and a warning is recorded.
//! Promoted fields participate equally. Planning never fails: problems
//! become `Unhandled` entries so the output always compiles.

use serde::Serialize;

use crate::loader::PackageLoader;
use crate::pairs::{ConvPair, PairSet};
use crate::resolve::{numeric_class, FieldInfo, Resolver, TypeId, TypeKind};
use crate::rules::{CompiledRules, CustomRule, RuleSet};

// ============================================================================
// Plan Model
// ============================================================================

/// One hop in a source access path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PathStep {
    /// Select a struct field.
    Field(String),
    /// Cross a pointer: the rendered access needs a nil guard.
    DerefGuard,
}

/// Access path from the conversion's source value to the value being
/// converted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourcePath {
    pub steps: Vec<PathStep>,
}

impl SourcePath {
    pub fn ends_with_deref(&self) -> bool {
        matches!(self.steps.last(), Some(PathStep::DerefGuard))
    }
}

/// How one value (a field, or a collection element) is converted: the path
/// suffix to reach it, whether its address is taken, and the operation.
#[derive(Debug, Clone, Serialize)]
pub struct ValuePlan {
    pub steps: Vec<PathStep>,
    pub addr_of: bool,
    pub op: FieldOp,
}

impl ValuePlan {
    fn copy() -> Self {
        ValuePlan {
            steps: Vec::new(),
            addr_of: false,
            op: FieldOp::Copy,
        }
    }

    fn unhandled(reason: String) -> Self {
        ValuePlan {
            steps: Vec::new(),
            addr_of: false,
            op: FieldOp::Unhandled { reason },
        }
    }
}

/// The decision record for one destination value.
#[derive(Debug, Clone, Serialize)]
pub enum FieldOp {
    /// Direct assignment.
    Copy,
    /// Numeric conversion to the target primitive.
    Cast { to: TypeId },
    /// Call a user-supplied custom function.
    CallCustom { func: String },
    /// Call a generated conversion function. Callees take a pointer to the
    /// source struct; `deref_result` is set when the destination is a
    /// value.
    CallConversion { func: String, deref_result: bool },
    /// Build the destination slice lazily and convert per element.
    SliceMap {
        /// The target-side collection type to construct.
        slice_type: TypeId,
        elem: Box<ValuePlan>,
    },
    /// Build the destination map lazily and convert keys and values.
    MapMap {
        map_type: TypeId,
        key: Box<ValuePlan>,
        value: Box<ValuePlan>,
    },
    /// No rule applies; rendered as a commented-out assignment with the
    /// reason.
    Unhandled { reason: String },
}

/// The plan for one destination field.
#[derive(Debug, Clone, Serialize)]
pub struct FieldPlan {
    pub target: String,
    pub tgt_type: TypeId,
    pub path: SourcePath,
    pub addr_of: bool,
    pub op: FieldOp,
}

/// The ordered plan for a single conversion function.
#[derive(Debug, Clone, Serialize)]
pub struct FunctionPlan {
    pub name: String,
    pub src: TypeId,
    pub tgt: TypeId,
    pub src_fqn: String,
    pub tgt_fqn: String,
    pub fields: Vec<FieldPlan>,
    /// Custom rules this function actually invokes; drives stub emission.
    pub used_customs: Vec<CustomRule>,
    pub warnings: Vec<String>,
}

// ============================================================================
// Planning
// ============================================================================

/// Plan every expanded pair.
pub fn plan_pairs<L: PackageLoader>(
    resolver: &Resolver<L>,
    rules: &CompiledRules,
    pairs: &PairSet,
) -> Vec<FunctionPlan> {
    pairs
        .pairs
        .iter()
        .map(|pair| plan_function(resolver, rules, pairs, pair))
        .collect()
}

/// Plan one pair.
pub fn plan_function<L: PackageLoader>(
    resolver: &Resolver<L>,
    rules: &CompiledRules,
    pairs: &PairSet,
    pair: &ConvPair,
) -> FunctionPlan {
    let mut planner = Planner {
        resolver,
        pairs,
        rules: rules.for_source(&pair.src_fqn),
        used_customs: Vec::new(),
        warnings: Vec::new(),
    };
    let fields = planner.plan_fields(pair);
    if !planner.warnings.is_empty() {
        for warning in &planner.warnings {
            tracing::warn!(function = pair.func_name.as_str(), "{}", warning);
        }
    }
    FunctionPlan {
        name: pair.func_name.clone(),
        src: pair.src,
        tgt: pair.tgt,
        src_fqn: pair.src_fqn.clone(),
        tgt_fqn: pair.tgt_fqn.clone(),
        fields,
        used_customs: planner.used_customs,
        warnings: planner.warnings,
    }
}

struct Planner<'a, L: PackageLoader> {
    resolver: &'a Resolver<L>,
    pairs: &'a PairSet,
    rules: &'a RuleSet,
    used_customs: Vec<CustomRule>,
    warnings: Vec<String>,
}

impl<'a, L: PackageLoader> Planner<'a, L> {
    fn plan_fields(&mut self, pair: &ConvPair) -> Vec<FieldPlan> {
        let src_node = self.resolver.get(pair.src);
        let tgt_node = self.resolver.get(pair.tgt);
        if src_node.kind != TypeKind::Struct || tgt_node.kind != TypeKind::Struct {
            self.warnings.push(format!(
                "pair {} -> {} is not struct-to-struct; nothing to plan",
                pair.src_fqn, pair.tgt_fqn
            ));
            return Vec::new();
        }

        let tgt_fields = tgt_node.fields.clone();
        let mut plans = Vec::new();
        for tgt_field in &tgt_fields {
            if tgt_field.is_embedded {
                // The promoted contents carry the data; assigning the
                // synthetic entry as well would double-write.
                continue;
            }
            if let Some(plan) = self.plan_field(pair, tgt_field) {
                plans.push(plan);
            }
        }
        plans
    }

    fn plan_field(&mut self, pair: &ConvPair, tgt_field: &FieldInfo) -> Option<FieldPlan> {
        let src_node = self.resolver.get(pair.src);
        let want = tgt_field.name.to_lowercase();
        let matches: Vec<&FieldInfo> = src_node
            .fields
            .iter()
            .filter(|f| f.name.to_lowercase() == want)
            .collect();
        if matches.len() > 1 {
            self.warnings.push(format!(
                "ambiguous match for field {}: {} source candidates, using {}",
                tgt_field.name,
                matches.len(),
                matches[0].name
            ));
        }
        let src_field = matches.first().map(|f| (*f).clone());

        // 1. Custom rule, by fully-qualified identity after alias unwrap.
        if let Some(field) = &src_field {
            if let Some(rule) = self.custom_for(field.typ, tgt_field.typ) {
                self.note_custom(&rule);
                return Some(FieldPlan {
                    target: tgt_field.name.clone(),
                    tgt_type: tgt_field.typ,
                    path: SourcePath {
                        steps: vec![PathStep::Field(field.name.clone())],
                    },
                    addr_of: false,
                    op: FieldOp::CallCustom { func: rule.func },
                });
            }
        }

        // 2. Remap through a dotted source path.
        if let Some(path) = self
            .rules
            .remap_for(&pair.src_fqn, &tgt_field.name)
            .map(str::to_string)
        {
            return Some(self.plan_remap(pair, &path, tgt_field));
        }

        // 3. Ignore omits the field entirely.
        if let Some(field) = &src_field {
            if self.rules.is_ignored_field(&pair.src_fqn, &field.name) {
                return None;
            }
        }

        let Some(field) = src_field else {
            return Some(FieldPlan {
                target: tgt_field.name.clone(),
                tgt_type: tgt_field.typ,
                path: SourcePath::default(),
                addr_of: false,
                op: FieldOp::Unhandled {
                    reason: format!("no source field matching {}", tgt_field.name),
                },
            });
        };

        // 4..10. Automatic value conversion.
        let plan = self.plan_value(field.typ, tgt_field.typ);
        let mut steps = vec![PathStep::Field(field.name.clone())];
        steps.extend(plan.steps);
        Some(FieldPlan {
            target: tgt_field.name.clone(),
            tgt_type: tgt_field.typ,
            path: SourcePath { steps },
            addr_of: plan.addr_of,
            op: plan.op,
        })
    }

    /// Steps 4..10 for one value, used for fields and collection elements
    /// alike. Custom rules apply to element subproblems too.
    fn plan_value(&mut self, src_t: TypeId, tgt_t: TypeId) -> ValuePlan {
        if let Some(rule) = self.custom_for(src_t, tgt_t) {
            self.note_custom(&rule);
            return ValuePlan {
                steps: Vec::new(),
                addr_of: false,
                op: FieldOp::CallCustom { func: rule.func },
            };
        }

        let s = self.resolver.canonical(src_t);
        let t = self.resolver.canonical(tgt_t);
        if self.identical(s, t) {
            return ValuePlan::copy();
        }

        let s_node = self.resolver.get(s);
        let t_node = self.resolver.get(t);

        // Numeric widening or narrowing within a family.
        if s_node.kind == TypeKind::Primitive && t_node.kind == TypeKind::Primitive {
            if let (Some(cs), Some(ct)) =
                (numeric_class(&s_node.name), numeric_class(&t_node.name))
            {
                if cs == ct {
                    return ValuePlan {
                        steps: Vec::new(),
                        addr_of: false,
                        op: FieldOp::Cast { to: t },
                    };
                }
            }
        }

        // Pointer-vs-value reshaping between matching element types.
        if s_node.kind == TypeKind::Pointer {
            if let Some(elem) = s_node.underlying {
                if self.resolver.canonical(elem) == t {
                    return ValuePlan {
                        steps: vec![PathStep::DerefGuard],
                        addr_of: false,
                        op: FieldOp::Copy,
                    };
                }
            }
        }
        if t_node.kind == TypeKind::Pointer {
            if let Some(elem) = t_node.underlying {
                if self.resolver.canonical(elem) == s {
                    return ValuePlan {
                        steps: Vec::new(),
                        addr_of: true,
                        op: FieldOp::Copy,
                    };
                }
            }
        }

        // Slice-to-slice with a recursive element plan.
        let s_struct = self.resolver.structural(s);
        let t_struct = self.resolver.structural(t);
        let s_sk = self.resolver.get(s_struct).kind;
        let t_sk = self.resolver.get(t_struct).kind;
        if s_sk == TypeKind::Slice && t_sk == TypeKind::Slice {
            let (Some(se), Some(te)) = (
                self.resolver.get(s_struct).underlying,
                self.resolver.get(t_struct).underlying,
            ) else {
                return ValuePlan::unhandled("slice without an element type".to_string());
            };
            let elem = self.plan_value(se, te);
            if let FieldOp::Unhandled { reason } = &elem.op {
                return ValuePlan::unhandled(format!("slice element: {}", reason));
            }
            return ValuePlan {
                steps: Vec::new(),
                addr_of: false,
                op: FieldOp::SliceMap {
                    slice_type: tgt_t,
                    elem: Box::new(elem),
                },
            };
        }

        // Map-to-map with compatible keys.
        if s_sk == TypeKind::Map && t_sk == TypeKind::Map {
            let s_map = self.resolver.get(s_struct);
            let t_map = self.resolver.get(t_struct);
            let (Some(sk), Some(sv), Some(tk), Some(tv)) = (
                s_map.key_type,
                s_map.underlying,
                t_map.key_type,
                t_map.underlying,
            ) else {
                return ValuePlan::unhandled("map without key or value type".to_string());
            };
            let key = self.plan_value(sk, tk);
            if !key.steps.is_empty()
                || key.addr_of
                || !matches!(key.op, FieldOp::Copy | FieldOp::Cast { .. })
            {
                return ValuePlan::unhandled(format!(
                    "map key types are incompatible: {} vs {}",
                    self.describe(sk),
                    self.describe(tk)
                ));
            }
            let value = self.plan_value(sv, tv);
            if let FieldOp::Unhandled { reason } = &value.op {
                return ValuePlan::unhandled(format!("map value: {}", reason));
            }
            return ValuePlan {
                steps: Vec::new(),
                addr_of: false,
                op: FieldOp::MapMap {
                    map_type: tgt_t,
                    key: Box::new(key),
                    value: Box::new(value),
                },
            };
        }

        // Struct-to-struct through a generated conversion.
        if let Some(plan) = self.struct_conversion(s, t) {
            return plan;
        }

        ValuePlan::unhandled(format!(
            "no conversion from {} to {}",
            self.describe(src_t),
            self.describe(tgt_t)
        ))
    }

    /// Step 9: both sides named structs with a conversion function in the
    /// pair set. Callees take `*Src` and return `*Tgt`; the planner inserts
    /// the address-of for value sources and the result deref (behind a nil
    /// guard on the argument) for value destinations.
    fn struct_conversion(&mut self, s: TypeId, t: TypeId) -> Option<ValuePlan> {
        let unwrap = |id: TypeId| -> (TypeId, bool) {
            let node = self.resolver.get(id);
            if node.kind == TypeKind::Pointer {
                if let Some(elem) = node.underlying {
                    return (self.resolver.canonical(elem), true);
                }
            }
            (id, false)
        };
        let (s_core, s_ptr) = unwrap(s);
        let (t_core, t_ptr) = unwrap(t);

        let s_node = self.resolver.get(s_core);
        let t_node = self.resolver.get(t_core);
        if s_node.kind != TypeKind::Struct || t_node.kind != TypeKind::Struct {
            return None;
        }
        let s_fqn = self.resolver.fqn_of(s_core)?;
        let t_fqn = self.resolver.fqn_of(t_core)?;
        let func = self.pairs.func_for(&s_fqn, &t_fqn)?.to_string();

        let steps = if s_ptr && !t_ptr {
            // A nil pointer source must not be dereferenced through the
            // callee's nil result.
            vec![PathStep::DerefGuard]
        } else {
            Vec::new()
        };
        Some(ValuePlan {
            steps,
            addr_of: !s_ptr,
            op: FieldOp::CallConversion {
                func,
                deref_result: !t_ptr,
            },
        })
    }

    /// Step 2: resolve a dotted source path against the source type's
    /// field graph. Pointer hops record nil guards; slice and map hops
    /// switch to per-element extraction into the target slice.
    fn plan_remap(&mut self, pair: &ConvPair, path: &str, tgt_field: &FieldInfo) -> FieldPlan {
        let parts: Vec<&str> = path.split('.').filter(|p| !p.is_empty()).collect();
        match self.resolve_path(pair.src, &parts, tgt_field.typ) {
            Ok(plan) => FieldPlan {
                target: tgt_field.name.clone(),
                tgt_type: tgt_field.typ,
                path: SourcePath { steps: plan.steps },
                addr_of: plan.addr_of,
                op: plan.op,
            },
            Err(reason) => {
                self.warnings.push(format!(
                    "remap {} = {} is unresolvable: {}",
                    tgt_field.name, path, reason
                ));
                FieldPlan {
                    target: tgt_field.name.clone(),
                    tgt_type: tgt_field.typ,
                    path: SourcePath::default(),
                    addr_of: false,
                    op: FieldOp::Unhandled { reason },
                }
            }
        }
    }

    fn resolve_path(
        &mut self,
        from: TypeId,
        parts: &[&str],
        tgt: TypeId,
    ) -> Result<ValuePlan, String> {
        if parts.is_empty() {
            return Ok(self.plan_value(from, tgt));
        }

        let mut steps = Vec::new();
        let mut cur = self.resolver.canonical(from);
        loop {
            let node = self.resolver.get(cur);
            if node.kind != TypeKind::Pointer {
                break;
            }
            let Some(elem) = node.underlying else {
                return Err("pointer without an element type".to_string());
            };
            steps.push(PathStep::DerefGuard);
            cur = self.resolver.canonical(elem);
        }

        let shaped = self.resolver.structural(cur);
        let node = self.resolver.get(shaped);
        match node.kind {
            TypeKind::Struct => {
                let Some(field) = node.fields.iter().find(|f| f.name == parts[0]) else {
                    return Err(format!(
                        "field {} not found in {}",
                        parts[0],
                        self.describe(cur)
                    ));
                };
                let field_typ = field.typ;
                steps.push(PathStep::Field(field.name.clone()));
                let tail = self.resolve_path(field_typ, &parts[1..], tgt)?;
                steps.extend(tail.steps);
                Ok(ValuePlan {
                    steps,
                    addr_of: tail.addr_of,
                    op: tail.op,
                })
            }
            TypeKind::Slice | TypeKind::Map => {
                let t_struct = self.resolver.structural(self.resolver.canonical(tgt));
                let t_node = self.resolver.get(t_struct);
                if t_node.kind != TypeKind::Slice {
                    return Err(format!(
                        "path continues through a collection but target {} is not a slice",
                        self.describe(tgt)
                    ));
                }
                let Some(s_elem) = node.underlying else {
                    return Err("collection without an element type".to_string());
                };
                let Some(t_elem) = t_node.underlying else {
                    return Err("target slice without an element type".to_string());
                };
                let elem = self.resolve_path(s_elem, parts, t_elem)?;
                if let FieldOp::Unhandled { reason } = &elem.op {
                    return Err(reason.clone());
                }
                Ok(ValuePlan {
                    steps,
                    addr_of: false,
                    op: FieldOp::SliceMap {
                        slice_type: tgt,
                        elem: Box::new(elem),
                    },
                })
            }
            _ => Err(format!(
                "cannot traverse {} through field {}",
                self.describe(cur),
                parts[0]
            )),
        }
    }

    /// Step 4's notion of "exact type": the same node, or structurally
    /// identical anonymous composites. Named types and primitives are
    /// interned, so identity comparison suffices for them; anonymous
    /// composites are compared shape-wise, the way the language treats
    /// unnamed types as equal when their structures are.
    fn identical(&self, a: TypeId, b: TypeId) -> bool {
        if a == b {
            return true;
        }
        let an = self.resolver.get(a);
        let bn = self.resolver.get(b);
        if an.kind != bn.kind {
            return false;
        }
        // Named types, primitives, and opaque externals carry identity;
        // different nodes mean different types.
        if !an.name.is_empty() || !bn.name.is_empty() {
            return false;
        }
        match an.kind {
            // Chans, funcs, and interfaces stay unhandled even when their
            // shapes agree; conversion does not reach into them.
            TypeKind::Pointer | TypeKind::Slice => match (an.underlying, bn.underlying) {
                (Some(ae), Some(be)) => self.identical(ae, be),
                _ => false,
            },
            TypeKind::Array => {
                an.array_len == bn.array_len
                    && match (an.underlying, bn.underlying) {
                        (Some(ae), Some(be)) => self.identical(ae, be),
                        _ => false,
                    }
            }
            TypeKind::Map => {
                match (an.key_type, bn.key_type, an.underlying, bn.underlying) {
                    (Some(ak), Some(bk), Some(av), Some(bv)) => {
                        self.identical(ak, bk) && self.identical(av, bv)
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    fn custom_for(&self, src_t: TypeId, tgt_t: TypeId) -> Option<CustomRule> {
        let s_fqn = self.resolver.fqn_of(self.resolver.canonical(src_t))?;
        let t_fqn = self.resolver.fqn_of(self.resolver.canonical(tgt_t))?;
        self.rules
            .custom_rules
            .iter()
            .find(|rule| rule.source == s_fqn && rule.target == t_fqn)
            .cloned()
    }

    fn note_custom(&mut self, rule: &CustomRule) {
        if !self.used_customs.contains(rule) {
            self.used_customs.push(rule.clone());
        }
    }

    /// A compact structural description for diagnostics.
    fn describe(&self, id: TypeId) -> String {
        let node = self.resolver.get(id);
        if let Some(fqn) = self.resolver.fqn_of(id) {
            return fqn;
        }
        match node.kind {
            TypeKind::Pointer => format!(
                "*{}",
                node.underlying.map(|u| self.describe(u)).unwrap_or_default()
            ),
            TypeKind::Slice => format!(
                "[]{}",
                node.underlying.map(|u| self.describe(u)).unwrap_or_default()
            ),
            TypeKind::Array => format!(
                "[{}]{}",
                node.array_len.unwrap_or(0),
                node.underlying.map(|u| self.describe(u)).unwrap_or_default()
            ),
            TypeKind::Map => format!(
                "map[{}]{}",
                node.key_type.map(|k| self.describe(k)).unwrap_or_default(),
                node.underlying.map(|u| self.describe(u)).unwrap_or_default()
            ),
            TypeKind::Chan => "chan".to_string(),
            TypeKind::Func => "func".to_string(),
            TypeKind::Interface => "interface".to_string(),
            TypeKind::Struct => "struct".to_string(),
            TypeKind::Unknown => "unknown".to_string(),
            TypeKind::Primitive | TypeKind::Named => node.name.clone(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
