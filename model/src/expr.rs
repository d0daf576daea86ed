//! FILENAME: model/src/expr.rs
//! PURPOSE: Named, identified expression text and its two concrete forms,
//! formulas and user columns.
//! CONTEXT: Expression text embeds placeholders (`{table.column}`, `{@id}`,
//! `{?id}`, `{!id}`, `{%name}`). The storage form carries numeric ids and is
//! what persists; the display form carries names and is what users edit.
//! Everything here is pure definition; evaluation lives in the engine crate.

use crate::error::ModelError;
use parser::{placeholders, PlaceholderKind};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub type FormulaId = u64;
pub type ParameterId = u64;
pub type UserColumnId = u64;

/// Default exclusion marker for formula text: the target scripting language
/// may have `#{...}` interpolation of its own, and spans written that way
/// must survive substitution untouched.
pub const FORMULA_EXCEPT_AFTER: &str = "#";

/// Identity of any id-carrying report object a placeholder can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectRef {
    Formula(FormulaId),
    Parameter(ParameterId),
    UserColumn(UserColumnId),
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectRef::Formula(id) => write!(f, "formula #{}", id),
            ObjectRef::Parameter(id) => write!(f, "parameter #{}", id),
            ObjectRef::UserColumn(id) => write!(f, "user column #{}", id),
        }
    }
}

/// Common core of formulas and user columns: a name plus storage-form text
/// holding zero or more placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    name: String,
    text: String,
    except_after: Option<String>,
}

impl Expression {
    pub fn new(name: impl Into<String>, text: impl Into<String>, except_after: Option<&str>) -> Self {
        Expression {
            name: name.into(),
            text: text.into(),
            except_after: except_after.map(str::to_string),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The marker suppressing placeholder recognition when it immediately
    /// precedes a span.
    pub fn except_after(&self) -> Option<&str> {
        self.except_after.as_deref()
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Replaces the text. The report-level setters tear down and rebuild
    /// dependency edges afterwards; never call this behind the report's
    /// back.
    pub(crate) fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    /// Scans the storage-form text for id-typed placeholders, honoring the
    /// except-after marker exactly the way substitution does. The result
    /// mirrors the placeholders in the current text, nothing more.
    pub fn referenced_ids(&self) -> Result<HashSet<ObjectRef>, ModelError> {
        let mut ids = HashSet::new();
        for ph in placeholders(&self.text, self.except_after()) {
            let obj = match ph.kind {
                PlaceholderKind::Formula => ObjectRef::Formula(parse_id(ph.body, ph.kind)?),
                PlaceholderKind::Parameter => ObjectRef::Parameter(parse_id(ph.body, ph.kind)?),
                PlaceholderKind::UserColumn => ObjectRef::UserColumn(parse_id(ph.body, ph.kind)?),
                PlaceholderKind::Column | PlaceholderKind::Special => continue,
            };
            ids.insert(obj);
        }
        Ok(ids)
    }
}

/// Parses a storage-form id body. A body that is not a number cannot name
/// anything, so it reports as the matching "no such" error.
pub(crate) fn parse_id(body: &str, kind: PlaceholderKind) -> Result<u64, ModelError> {
    body.parse::<u64>().map_err(|_| match kind {
        PlaceholderKind::Parameter => ModelError::NoSuchParameter(body.to_string()),
        PlaceholderKind::UserColumn => ModelError::NoSuchUserColumn(body.to_string()),
        _ => ModelError::NoSuchFormula(body.to_string()),
    })
}

/// An expression whose substituted text is handed to an external scripting
/// engine. The language tag falls back to the report default, then to the
/// process-wide default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    id: FormulaId,
    expr: Expression,
    language: Option<String>,
}

impl Formula {
    pub fn new(id: FormulaId, name: impl Into<String>, text: impl Into<String>) -> Self {
        Formula {
            id,
            expr: Expression::new(name, text, Some(FORMULA_EXCEPT_AFTER)),
            language: None,
        }
    }

    pub fn with_language(
        id: FormulaId,
        name: impl Into<String>,
        text: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        let mut f = Formula::new(id, name, text);
        f.language = Some(language.into());
        f
    }

    pub fn id(&self) -> FormulaId {
        self.id
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::Formula(self.id)
    }

    pub fn name(&self) -> &str {
        self.expr.name()
    }

    pub fn text(&self) -> &str {
        self.expr.text()
    }

    pub fn except_after(&self) -> Option<&str> {
        self.expr.except_after()
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn referenced_ids(&self) -> Result<HashSet<ObjectRef>, ModelError> {
        self.expr.referenced_ids()
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.expr.set_name(name);
    }

    pub(crate) fn set_text(&mut self, text: impl Into<String>) {
        self.expr.set_text(text);
    }

    pub(crate) fn set_language(&mut self, language: Option<String>) {
        self.language = language;
    }
}

/// A user-authored expression the data source computes per row. Being a
/// selectable, it can drive grouping and sorting exactly like a column.
/// User columns may reference columns, parameters, and specials but never
/// formulas; that keeps query construction free of evaluation-time cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserColumn {
    id: UserColumnId,
    expr: Expression,
}

impl UserColumn {
    pub fn new(id: UserColumnId, name: impl Into<String>, text: impl Into<String>) -> Self {
        UserColumn {
            id,
            expr: Expression::new(name, text, None),
        }
    }

    pub fn id(&self) -> UserColumnId {
        self.id
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::UserColumn(self.id)
    }

    pub fn name(&self) -> &str {
        self.expr.name()
    }

    pub fn text(&self) -> &str {
        self.expr.text()
    }

    pub fn except_after(&self) -> Option<&str> {
        self.expr.except_after()
    }

    pub fn referenced_ids(&self) -> Result<HashSet<ObjectRef>, ModelError> {
        self.expr.referenced_ids()
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.expr.set_name(name);
    }

    pub(crate) fn set_text(&mut self, text: impl Into<String>) {
        self.expr.set_text(text);
    }
}
