//! Pipeline orchestration.
//!
//! One invocation runs the stages strictly downstream: shallow load and
//! directive scan, rule compile, pair expansion against the resolver,
//! field planning, emission-plan assembly, rendering, and finally the
//! single-shot writes. An error at any stage aborts before the writer
//! runs, so no partial output files are ever left behind.

use std::path::PathBuf;

use crate::directive;
use crate::emit;
use crate::error::Result;
use crate::loader::{DirLoader, PackageLoader};
use crate::output::{self, GENERATED_SUFFIX};
use crate::pairs;
use crate::plan;
use crate::render;
use crate::resolve::Resolver;
use crate::rules;

/// Generator invocation options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Source directory containing directive-annotated files.
    pub source_dir: PathBuf,
    /// Main output file; defaults to `<package_name>.gen.go` inside the
    /// source directory.
    pub output: Option<PathBuf>,
    /// Custom-stub output file; defaults to `custom.gen.go` inside the
    /// source directory. Only written when a custom rule is referenced.
    pub custom_output: Option<PathBuf>,
    /// Dump the assembled generation plan at debug level.
    pub dump_plan: bool,
}

/// What a successful invocation produced.
#[derive(Debug, Clone)]
pub struct Outcome {
    pub main_path: PathBuf,
    pub custom_path: Option<PathBuf>,
    pub functions: usize,
    pub stubs: usize,
}

/// Run the full pipeline.
pub fn generate(options: &Options) -> Result<Outcome> {
    let mut loader = DirLoader::new(&options.source_dir)?;
    let pkg_path = loader.package_path_for(&options.source_dir)?;
    tracing::info!(package = pkg_path.as_str(), "generating conversions");

    let syntax = loader.load_shallow(&pkg_path)?;
    let directives = directive::scan_package(&syntax);
    tracing::debug!(count = directives.len(), "scanned directives");

    let compiled = rules::compile(&directives, &pkg_path)?;

    let mut resolver = Resolver::new(loader);
    let pair_set = pairs::expand(&mut resolver, &compiled)?;
    tracing::info!(pairs = pair_set.pairs.len(), "expanded conversion pairs");

    let plans = plan::plan_pairs(&resolver, &compiled, &pair_set);
    let gen_plan = emit::assemble(resolver.arena(), &compiled, &pkg_path, &syntax.name, plans);
    if options.dump_plan {
        tracing::debug!(
            plan = %serde_json::to_string_pretty(&gen_plan).unwrap_or_default(),
            "generation plan"
        );
    }

    let main_text = render::render_main(resolver.arena(), &gen_plan);
    let custom_text = render::render_custom(&gen_plan);

    let main_path = options.output.clone().unwrap_or_else(|| {
        options
            .source_dir
            .join(format!("{}{}", syntax.name, GENERATED_SUFFIX))
    });
    output::write_file(&main_path, main_text.as_bytes())?;

    let custom_path = match custom_text {
        Some(text) => {
            let path = options
                .custom_output
                .clone()
                .unwrap_or_else(|| options.source_dir.join(format!("custom{}", GENERATED_SUFFIX)));
            output::write_file(&path, text.as_bytes())?;
            Some(path)
        }
        None => None,
    };

    Ok(Outcome {
        main_path,
        custom_path,
        functions: gen_plan.functions.len(),
        stubs: gen_plan.stubs.len(),
    })
}
