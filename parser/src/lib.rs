//! FILENAME: parser/src/lib.rs
//! PURPOSE: Library root for the placeholder parser.
//! CONTEXT: Report text (formula bodies, user columns, field expressions)
//! embeds references wrapped in curly braces. This crate finds those
//! references and rewrites them without knowing anything about reports.
//!
//! PIPELINE: Raw Text --> Scanner --> Placeholder Spans --> Rewrite --> Output Text
//!
//! PLACEHOLDER GRAMMAR:
//! - {table.column}    raw column reference
//! - {@id}             formula reference
//! - {?id}             parameter reference
//! - {!id}             user column reference
//! - {%name}           built-in special value
//!
//! Storage form carries numeric ids (stable across renames); display form
//! carries names. Both forms share this grammar, so the same scanner
//! serves substitution, usage analysis, and form conversion.

pub mod scanner;
pub mod token;


// Re-export commonly used items for convenience
pub use scanner::{placeholders, rewrite, Placeholders};
pub use token::{Placeholder, PlaceholderKind};
