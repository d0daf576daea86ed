//! FILENAME: model/src/source.rs
//! PURPOSE: The data side of a report: column metadata, the driver traits
//! a report runs against, and an in-memory driver used by tests and
//! programmatic callers.
//! CONTEXT: The run loop walks rows through `DataCursor` and never sees
//! where they come from. Drivers surface failures as `SourceError`; the
//! engine wraps them with the query text for context.

use crate::expr::UserColumnId;
use crate::value::{ColumnType, Value};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One column the source can deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    name: String,
    col_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, col_type: ColumnType) -> Self {
        Column {
            name: name.into(),
            col_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn col_type(&self) -> ColumnType {
        self.col_type
    }
}

/// Anything a group can break on: a source column by name or a user
/// column the source computes alongside the plain columns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectableRef {
    Column(String),
    UserColumn(UserColumnId),
}

impl fmt::Display for SelectableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectableRef::Column(name) => f.write_str(name),
            SelectableRef::UserColumn(id) => write!(f, "user column #{id}"),
        }
    }
}

/// Failure reported by a driver or one of its cursors.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct SourceError {
    message: String,
    #[source]
    cause: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        SourceError {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(
        message: impl Into<String>,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        SourceError {
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }
}

/// Where a report's rows come from.
pub trait DataSource {
    /// Columns this source delivers, in cursor index order.
    fn columns(&self) -> &[Column];

    /// Index of a column by name, case-insensitive.
    fn find_column(&self, name: &str) -> Option<usize> {
        self.columns()
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(name))
    }

    /// Cursor index a selectable's values appear at, or `None` when this
    /// source cannot deliver it.
    fn selectable_index(&self, selectable: &SelectableRef) -> Option<usize>;

    /// Human-readable description of what will run, used in error
    /// messages.
    fn query_text(&self) -> String;

    /// Runs the query and hands back a cursor positioned before the
    /// first row.
    fn execute(&self) -> Result<Box<dyn DataCursor>, SourceError>;
}

/// Bidirectional walk over the rows of one query execution.
///
/// Positioning contract: the cursor starts before the first row;
/// `next` after the last row leaves it exhausted, and a `previous` from
/// the exhausted position lands on the last row. Group footers rely on
/// that one-step back-and-forth.
pub trait DataCursor {
    fn next(&mut self) -> Result<bool, SourceError>;

    fn previous(&mut self) -> Result<bool, SourceError>;

    /// Whether the current row is the first row.
    fn is_first(&self) -> bool;

    /// Whether the current row is the last row. Drivers may look ahead
    /// one row to answer, hence the fallible signature.
    fn is_last(&mut self) -> Result<bool, SourceError>;

    /// 1-based number of the current row; 0 when not on a row.
    fn row_number(&self) -> u64;

    /// Value at a 0-based column index; null when off-row or out of range.
    fn value_at(&self, index: usize) -> Value;

    fn close(&mut self);
}

/// Driver over rows already in memory. Tests and programmatic callers
/// feed it rows directly; user columns are mapped onto extra row
/// indices the caller fills in.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
    user_columns: FxHashMap<UserColumnId, usize>,
}

impl MemorySource {
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Self {
        MemorySource {
            columns,
            rows,
            user_columns: FxHashMap::default(),
        }
    }

    /// Declares that a user column's values live at the given index
    /// within each row.
    pub fn map_user_column(&mut self, id: UserColumnId, index: usize) {
        self.user_columns.insert(id, index);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

impl DataSource for MemorySource {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn selectable_index(&self, selectable: &SelectableRef) -> Option<usize> {
        match selectable {
            SelectableRef::Column(name) => self.find_column(name),
            SelectableRef::UserColumn(id) => self.user_columns.get(id).copied(),
        }
    }

    fn query_text(&self) -> String {
        let names: Vec<&str> = self.columns.iter().map(|c| c.name()).collect();
        format!(
            "memory source [{}], {} rows",
            names.join(", "),
            self.rows.len()
        )
    }

    fn execute(&self) -> Result<Box<dyn DataCursor>, SourceError> {
        Ok(Box::new(MemoryCursor::new(self.rows.clone())))
    }
}

/// Cursor over an owned snapshot of rows.
#[derive(Debug)]
pub struct MemoryCursor {
    rows: Vec<Vec<Value>>,
    // -1 before the first row, rows.len() when exhausted.
    pos: isize,
    closed: bool,
}

impl MemoryCursor {
    pub fn new(rows: Vec<Vec<Value>>) -> Self {
        MemoryCursor {
            rows,
            pos: -1,
            closed: false,
        }
    }

    fn end(&self) -> isize {
        self.rows.len() as isize
    }

    fn on_row(&self) -> bool {
        self.pos >= 0 && self.pos < self.end()
    }
}

impl DataCursor for MemoryCursor {
    fn next(&mut self) -> Result<bool, SourceError> {
        if self.closed {
            return Ok(false);
        }
        if self.pos < self.end() {
            self.pos += 1;
        }
        Ok(self.on_row())
    }

    fn previous(&mut self) -> Result<bool, SourceError> {
        if self.closed {
            return Ok(false);
        }
        if self.pos >= 0 {
            self.pos -= 1;
        }
        Ok(self.on_row())
    }

    fn is_first(&self) -> bool {
        self.pos == 0
    }

    fn is_last(&mut self) -> Result<bool, SourceError> {
        Ok(self.on_row() && self.pos == self.end() - 1)
    }

    fn row_number(&self) -> u64 {
        if self.on_row() {
            (self.pos + 1) as u64
        } else {
            0
        }
    }

    fn value_at(&self, index: usize) -> Value {
        if !self.on_row() {
            return Value::Null;
        }
        self.rows[self.pos as usize]
            .get(index)
            .cloned()
            .unwrap_or(Value::Null)
    }

    fn close(&mut self) {
        self.closed = true;
        self.rows.clear();
    }
}
