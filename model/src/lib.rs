//! FILENAME: model/src/lib.rs
//! PURPOSE: Main library entry point for the report definition model.
//! CONTEXT: Re-exports the definition types (report, sections, groups,
//! expressions) and the data source traits for use by the run loop crate
//! and by embedding applications.

pub mod dependency;
pub mod error;
pub mod expr;
pub mod field;
pub mod group;
pub mod parameter;
pub mod report;
pub mod section;
pub mod source;
pub mod value;

// Re-export commonly used types at the crate root
pub use dependency::{CycleError, DependencyGraph};
pub use error::ModelError;
pub use expr::{
    Expression, Formula, FormulaId, ObjectRef, ParameterId, UserColumn, UserColumnId,
    FORMULA_EXCEPT_AFTER,
};
pub use field::{AggregateFunction, AggregateScope, Field, FieldKind, Rect, SpecialKind};
pub use group::{Group, SortOrder};
pub use parameter::{Arity, Parameter, ParameterType};
pub use report::{AreaPath, Report};
pub use section::{AreaKind, Line, Section, SectionArea, Suppression};
pub use source::{
    Column, DataCursor, DataSource, MemoryCursor, MemorySource, SelectableRef, SourceError,
};
pub use value::{ColumnType, Value};
