//! FILENAME: report-engine/src/lib.rs
//! PURPOSE: Main library entry point for the report run engine.
//! CONTEXT: Takes an immutable report definition from the model crate,
//! pulls rows from a data source, and drives a renderer through the band
//! protocol: group breaks, aggregates, and placeholder substitution all
//! happen here. Scripting and output are seams; the engine never renders
//! and never interprets formula text itself.

pub mod aggregate;
pub mod analyze;
pub mod breaks;
pub mod context;
pub mod error;
pub mod renderer;
pub mod resolve;
pub mod run;
pub mod script;

// Re-export commonly used types at the crate root
pub use aggregate::{Accumulator, Aggregates};
pub use analyze::{columns_used, SelectablesUsed};
pub use breaks::{GroupBreaks, GroupIndexes, GroupState};
pub use context::RowContext;
pub use error::EngineError;
pub use renderer::{CancelToken, Renderer, RunOutcome};
pub use resolve::{evaluate, FormulaCache, Resolver};
pub use run::{run_once, ReportRun};
pub use script::{default_language, set_default_language, ScriptError, ScriptEvaluator};
