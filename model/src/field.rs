//! FILENAME: model/src/field.rs
//! PURPOSE: Visual fields placed inside sections and the value kinds they
//! can carry: literal text, column data, computed objects, specials, and
//! aggregates folded over rows.
//! CONTEXT: Fields are pure definition data. Producing a field's value for
//! the current row is the run loop's job; nothing here touches a cursor.

use crate::error::ModelError;
use crate::expr::{FormulaId, ParameterId, UserColumnId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Placement of a field inside its section, in report units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }
}

/// Named values that exist outside the row data: report metadata, the
/// current page, and group record counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialKind {
    ReportName,
    ReportTitle,
    ReportAuthor,
    ReportDescription,
    ReportDate,
    ReportRow,
    PageNumber,
    GroupCount,
}

impl SpecialKind {
    /// Parses the dotted name used inside `{%...}` placeholders.
    pub fn parse(name: &str) -> Result<Self, ModelError> {
        match name {
            "report.name" => Ok(SpecialKind::ReportName),
            "report.title" => Ok(SpecialKind::ReportTitle),
            "report.author" => Ok(SpecialKind::ReportAuthor),
            "report.description" => Ok(SpecialKind::ReportDescription),
            "report.date" => Ok(SpecialKind::ReportDate),
            "report.row" => Ok(SpecialKind::ReportRow),
            "page.number" => Ok(SpecialKind::PageNumber),
            "group.count" => Ok(SpecialKind::GroupCount),
            other => Err(ModelError::UnknownSpecial(other.to_string())),
        }
    }

    /// The dotted name, as written inside `{%...}` placeholders.
    pub fn name(self) -> &'static str {
        match self {
            SpecialKind::ReportName => "report.name",
            SpecialKind::ReportTitle => "report.title",
            SpecialKind::ReportAuthor => "report.author",
            SpecialKind::ReportDescription => "report.description",
            SpecialKind::ReportDate => "report.date",
            SpecialKind::ReportRow => "report.row",
            SpecialKind::PageNumber => "page.number",
            SpecialKind::GroupCount => "group.count",
        }
    }
}

impl fmt::Display for SpecialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fold applied by an aggregate field over the rows in its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateFunction {
    Sum,
    Count,
    Average,
    Min,
    Max,
    StdDev,
}

impl AggregateFunction {
    /// Parses a function name. "subtotal" is the historical spelling of
    /// sum and still accepted.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "sum" | "subtotal" => Some(AggregateFunction::Sum),
            "count" => Some(AggregateFunction::Count),
            "average" => Some(AggregateFunction::Average),
            "min" => Some(AggregateFunction::Min),
            "max" => Some(AggregateFunction::Max),
            "stddev" => Some(AggregateFunction::StdDev),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AggregateFunction::Sum => "sum",
            AggregateFunction::Count => "count",
            AggregateFunction::Average => "average",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::StdDev => "stddev",
        }
    }
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rows an aggregate folds over before resetting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregateScope {
    /// Accumulate across the whole run.
    Report,
    /// Reset whenever the group at this position (0 = outermost) starts a
    /// new value.
    Group(usize),
}

/// What a field displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    /// Literal text, shown as-is.
    Text(String),
    /// Value of a data source column, by name.
    Column(String),
    Formula(FormulaId),
    Parameter(ParameterId),
    UserColumn(UserColumnId),
    Special(SpecialKind),
    /// Running fold over another field's per-row values.
    Aggregate {
        field: u64,
        function: AggregateFunction,
        scope: AggregateScope,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    id: u64,
    bounds: Rect,
    visible: bool,
    kind: FieldKind,
}

impl Field {
    pub fn new(id: u64, bounds: Rect, kind: FieldKind) -> Self {
        Field {
            id,
            bounds,
            visible: true,
            kind,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn set_bounds(&mut self, bounds: Rect) {
        self.bounds = bounds;
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut FieldKind {
        &mut self.kind
    }
}
