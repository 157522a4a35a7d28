//! Go source rendering.
//!
//! Pure text emission from a `GenerationPlan`: the main file (package
//! clause, imports, type aliases, one function per plan) and, when custom
//! rules are referenced, the stub file. Output is a deterministic function
//! of the plan; no timestamps, no environment.
//!
//! Unhandled entries render as commented-out assignments carrying their
//! diagnostic reason, so the output compiles even when some conversions
//! are missing.

use std::collections::HashMap;

use crate::emit::{qualify, EmittedFunction, GenerationPlan};
use crate::plan::{FieldOp, FieldPlan, PathStep, ValuePlan};
use crate::resolve::{TypeArena, TypeId, TypeKind};

/// Header line marking generated output.
pub const GENERATED_HEADER: &str = "// Code generated by convgen. DO NOT EDIT.";

// ============================================================================
// Entry Points
// ============================================================================

/// Render the main output file.
pub fn render_main(arena: &TypeArena, plan: &GenerationPlan) -> String {
    let mut w = Writer::new();
    w.line(0, GENERATED_HEADER);
    w.blank();
    w.line(0, &format!("package {}", plan.package_name));

    if !plan.imports.is_empty() {
        w.blank();
        w.line(0, "import (");
        for import in &plan.imports {
            if import.needs_alias {
                w.line(1, &format!("{} \"{}\"", import.local, import.path));
            } else {
                w.line(1, &format!("\"{}\"", import.path));
            }
        }
        w.line(0, ")");
    }

    if !plan.aliases.is_empty() {
        w.blank();
        for alias in &plan.aliases {
            let target = qualify(&plan.qualifiers, &plan.package_path, &alias.target_fqn);
            w.line(0, &format!("type {} = {}", alias.name, target));
        }
    }

    for function in &plan.functions {
        w.blank();
        render_function(&mut w, arena, plan, function);
    }

    w.finish()
}

/// Render the custom-stub file, or `None` when no custom rule is
/// referenced.
pub fn render_custom(plan: &GenerationPlan) -> Option<String> {
    if plan.stubs.is_empty() {
        return None;
    }
    let mut w = Writer::new();
    w.line(0, "// Code generated by convgen. Implement the stubs below.");
    w.blank();
    w.line(0, &format!("package {}", plan.package_name));

    if !plan.stub_imports.is_empty() {
        w.blank();
        w.line(0, "import (");
        for import in &plan.stub_imports {
            if import.needs_alias {
                w.line(1, &format!("{} \"{}\"", import.local, import.path));
            } else {
                w.line(1, &format!("\"{}\"", import.path));
            }
        }
        w.line(0, ")");
    }

    for stub in &plan.stubs {
        let src = qualify(&plan.stub_qualifiers, &plan.package_path, &stub.source);
        let tgt = qualify(&plan.stub_qualifiers, &plan.package_path, &stub.target);
        w.blank();
        w.line(0, &format!("func {}(src {}) {} {{", stub.func, src, tgt));
        w.line(1, &format!("panic(\"not implemented: {}\")", stub.func));
        w.line(0, "}");
    }

    Some(w.finish())
}

// ============================================================================
// Function Bodies
// ============================================================================

fn render_function(
    w: &mut Writer,
    arena: &TypeArena,
    plan: &GenerationPlan,
    function: &EmittedFunction,
) {
    w.line(
        0,
        &format!(
            "func {}(src *{}) *{} {{",
            function.plan.name, function.src_name, function.tgt_name
        ),
    );
    w.line(1, "if src == nil {");
    w.line(2, "return nil");
    w.line(1, "}");
    w.line(1, &format!("out := &{}{{}}", function.tgt_name));

    let mut ctx = RenderCtx {
        arena,
        plan,
        vars: VarGen::default(),
    };
    for field in &function.plan.fields {
        render_field(w, &mut ctx, field);
    }

    w.line(1, "return out");
    w.line(0, "}");
}

struct RenderCtx<'a> {
    arena: &'a TypeArena,
    plan: &'a GenerationPlan,
    vars: VarGen,
}

impl<'a> RenderCtx<'a> {
    fn go_type(&self, id: TypeId) -> String {
        go_type(self.arena, self.plan, id)
    }
}

fn render_field(w: &mut Writer, ctx: &mut RenderCtx<'_>, field: &FieldPlan) {
    if let FieldOp::Unhandled { reason } = &field.op {
        let expr = if field.path.steps.is_empty() {
            "...".to_string()
        } else {
            path_expr("src", &field.path.steps)
        };
        w.line(
            1,
            &format!("// out.{} = {} // unhandled: {}", field.target, expr, reason),
        );
        return;
    }
    let sink = Sink::Assign(format!("out.{}", field.target));
    render_into(
        w,
        1,
        ctx,
        &sink,
        "src",
        &field.path.steps,
        field.addr_of,
        &field.op,
    );
}

/// Where a converted value lands.
enum Sink {
    /// `lhs = value`
    Assign(String),
    /// `lhs = append(lhs, value)`
    Append(String),
    /// `map[key] = value`
    MapInsert { map: String, key: String },
}

impl Sink {
    fn emit(&self, w: &mut Writer, depth: usize, value: &str) {
        match self {
            Sink::Assign(lhs) => w.line(depth, &format!("{} = {}", lhs, value)),
            Sink::Append(lhs) => w.line(depth, &format!("{} = append({}, {})", lhs, lhs, value)),
            Sink::MapInsert { map, key } => {
                w.line(depth, &format!("{}[{}] = {}", map, key, value))
            }
        }
    }

    fn target(&self) -> &str {
        match self {
            Sink::Assign(lhs) | Sink::Append(lhs) => lhs,
            Sink::MapInsert { map, .. } => map,
        }
    }
}

/// Render one value conversion into a sink: open nil guards along the
/// access path, then emit the operation.
#[allow(clippy::too_many_arguments)]
fn render_into(
    w: &mut Writer,
    depth: usize,
    ctx: &mut RenderCtx<'_>,
    sink: &Sink,
    base: &str,
    steps: &[PathStep],
    addr_of: bool,
    op: &FieldOp,
) {
    // Guards for every pointer hop, innermost last.
    let mut expr = base.to_string();
    let mut d = depth;
    for step in steps {
        match step {
            PathStep::Field(name) => {
                expr.push('.');
                expr.push_str(name);
            }
            PathStep::DerefGuard => {
                w.line(d, &format!("if {} != nil {{", expr));
                d += 1;
            }
        }
    }
    let trailing_deref = matches!(steps.last(), Some(PathStep::DerefGuard));

    match op {
        FieldOp::Copy => {
            let mut value = if trailing_deref {
                format!("*{}", expr)
            } else {
                expr.clone()
            };
            if addr_of {
                value = format!("&{}", value);
            }
            sink.emit(w, d, &value);
        }
        FieldOp::Cast { to } => {
            sink.emit(w, d, &format!("{}({})", ctx.go_type(*to), expr));
        }
        FieldOp::CallCustom { func } => {
            sink.emit(w, d, &format!("{}({})", func, expr));
        }
        FieldOp::CallConversion { func, deref_result } => {
            let arg = if addr_of {
                format!("&{}", expr)
            } else {
                expr.clone()
            };
            let call = format!("{}({})", func, arg);
            let value = if *deref_result {
                format!("*{}", call)
            } else {
                call
            };
            sink.emit(w, d, &value);
        }
        FieldOp::SliceMap { slice_type, elem } => {
            w.line(d, &format!("if {} != nil {{", expr));
            let lhs = sink_collection(w, d + 1, ctx, sink, *slice_type, &expr, true);
            let var = ctx.vars.fresh("e");
            w.line(d + 1, &format!("for _, {} := range {} {{", var, expr));
            render_element(w, d + 2, ctx, &Sink::Append(lhs.clone()), &var, elem);
            w.line(d + 1, "}");
            finish_collection(w, d + 1, sink, &lhs);
            w.line(d, "}");
        }
        FieldOp::MapMap {
            map_type,
            key,
            value,
        } => {
            w.line(d, &format!("if {} != nil {{", expr));
            let lhs = sink_collection(w, d + 1, ctx, sink, *map_type, &expr, false);
            let kvar = ctx.vars.fresh("k");
            let vvar = ctx.vars.fresh("v");
            w.line(
                d + 1,
                &format!("for {}, {} := range {} {{", kvar, vvar, expr),
            );
            let key_expr = match &key.op {
                FieldOp::Cast { to } => format!("{}({})", ctx.go_type(*to), kvar),
                _ => kvar.clone(),
            };
            render_element(
                w,
                d + 2,
                ctx,
                &Sink::MapInsert {
                    map: lhs.clone(),
                    key: key_expr,
                },
                &vvar,
                value,
            );
            w.line(d + 1, "}");
            finish_collection(w, d + 1, sink, &lhs);
            w.line(d, "}");
        }
        FieldOp::Unhandled { reason } => {
            // Collection elements never carry unhandled ops; the planner
            // lifts those to the field level.
            w.line(d, &format!("// {} // unhandled: {}", sink.target(), reason));
        }
    }

    while d > depth {
        d -= 1;
        w.line(d, "}");
    }
}

/// Make the destination collection. Direct sinks build in place; append
/// and map-insert sinks need a temporary that is attached afterwards.
fn sink_collection(
    w: &mut Writer,
    depth: usize,
    ctx: &mut RenderCtx<'_>,
    sink: &Sink,
    typ: TypeId,
    src_expr: &str,
    is_slice: bool,
) -> String {
    let make = if is_slice {
        format!("make({}, 0, len({}))", ctx.go_type(typ), src_expr)
    } else {
        format!("make({}, len({}))", ctx.go_type(typ), src_expr)
    };
    match sink {
        Sink::Assign(lhs) => {
            w.line(depth, &format!("{} = {}", lhs, make));
            lhs.clone()
        }
        Sink::Append(_) | Sink::MapInsert { .. } => {
            let tmp = ctx.vars.fresh("tmp");
            w.line(depth, &format!("{} := {}", tmp, make));
            tmp
        }
    }
}

fn finish_collection(w: &mut Writer, depth: usize, sink: &Sink, lhs: &str) {
    match sink {
        Sink::Assign(_) => {}
        Sink::Append(_) | Sink::MapInsert { .. } => sink.emit(w, depth, lhs),
    }
}

/// Render an element conversion inside a loop body.
fn render_element(
    w: &mut Writer,
    depth: usize,
    ctx: &mut RenderCtx<'_>,
    sink: &Sink,
    var: &str,
    elem: &ValuePlan,
) {
    render_into(w, depth, ctx, sink, var, &elem.steps, elem.addr_of, &elem.op);
}

fn path_expr(base: &str, steps: &[PathStep]) -> String {
    let mut expr = base.to_string();
    for step in steps {
        if let PathStep::Field(name) = step {
            expr.push('.');
            expr.push_str(name);
        }
    }
    expr
}

// ============================================================================
// Type Syntax
// ============================================================================

/// Render a type reference in Go syntax, qualifying named types through the
/// plan's import table.
fn go_type(arena: &TypeArena, plan: &GenerationPlan, id: TypeId) -> String {
    let node = arena.get(id);
    if !node.name.is_empty() {
        if node.import_path.is_empty() {
            return node.name.clone();
        }
        return qualify(
            &plan.qualifiers,
            &plan.package_path,
            &format!("{}.{}", node.import_path, node.name),
        );
    }
    match node.kind {
        TypeKind::Pointer => format!(
            "*{}",
            node.underlying
                .map(|u| go_type(arena, plan, u))
                .unwrap_or_default()
        ),
        TypeKind::Slice => format!(
            "[]{}",
            node.underlying
                .map(|u| go_type(arena, plan, u))
                .unwrap_or_default()
        ),
        TypeKind::Array => format!(
            "[{}]{}",
            node.array_len.unwrap_or(0),
            node.underlying
                .map(|u| go_type(arena, plan, u))
                .unwrap_or_default()
        ),
        TypeKind::Map => format!(
            "map[{}]{}",
            node.key_type
                .map(|k| go_type(arena, plan, k))
                .unwrap_or_default(),
            node.underlying
                .map(|u| go_type(arena, plan, u))
                .unwrap_or_default()
        ),
        TypeKind::Chan => format!(
            "chan {}",
            node.underlying
                .map(|u| go_type(arena, plan, u))
                .unwrap_or_default()
        ),
        TypeKind::Func => "func()".to_string(),
        _ => "interface{}".to_string(),
    }
}

// ============================================================================
// Writer
// ============================================================================

#[derive(Default)]
struct Writer {
    buf: String,
}

impl Writer {
    fn new() -> Self {
        Writer::default()
    }

    fn line(&mut self, depth: usize, text: &str) {
        for _ in 0..depth {
            self.buf.push('\t');
        }
        self.buf.push_str(text);
        self.buf.push('\n');
    }

    fn blank(&mut self) {
        self.buf.push('\n');
    }

    fn finish(self) -> String {
        self.buf
    }
}

/// Fresh loop and temp variable names, per function.
#[derive(Default)]
struct VarGen {
    counts: HashMap<&'static str, usize>,
}

impl VarGen {
    fn fresh(&mut self, base: &'static str) -> String {
        let count = self.counts.entry(base).or_insert(0);
        *count += 1;
        if *count == 1 {
            base.to_string()
        } else {
            format!("{}{}", base, count)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
