//! convgen: a struct-to-struct conversion code generator for Go source trees.
//!
//! Given a directory of directive-annotated Go files, convgen discovers pairs
//! of struct types across packages, computes a field-by-field mapping between
//! each pair honoring user-supplied rules, and emits compilable conversion
//! functions plus placeholder stubs for conversions that need a human.
//!
//! The pipeline, leaves first:
//! - Go-subset parsing and staged package loading
//! - Directive scanning and rule compilation
//! - Canonical type resolution over an arena cache
//! - Pair expansion and field planning
//! - Emission-plan assembly, rendering, and atomic output writing

pub mod cli;
pub mod directive;
pub mod emit;
pub mod error;
pub mod generate;
pub mod loader;
pub mod output;
pub mod pairs;
pub mod parse;
pub mod plan;
pub mod rawtype;
pub mod render;
pub mod resolve;
pub mod rules;
pub mod syntax;
pub mod test_helpers;
