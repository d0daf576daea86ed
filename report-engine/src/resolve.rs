//! FILENAME: report-engine/src/resolve.rs
//! PURPOSE: Rewrites placeholder spans into literal values and evaluates
//! formula text through the scripting seam.
//! CONTEXT: Formula text is rewritten in five passes, one placeholder kind
//! per pass, then handed to the `ScriptEvaluator`. Pass order is fixed:
//! specials, formulas, parameters, user columns, plain columns last. Each
//! pass scans the previous pass's output; replacement text is never
//! rescanned within its own pass.
//!
//! SUBSTITUTION RULES:
//! - A reference to a formula, parameter, or user column that does not
//!   exist splices the evaluator's nil literal.
//! - A formula, parameter, or user column that exists but resolves to null
//!   aborts the whole substitution: the formula yields no value. In
//!   practice parameters never read as null; an unanswered one splices
//!   its type's stand-in value.
//! - A null column value splices the nil literal; an unknown column name
//!   keeps its braces, so script text may use `{}` for its own purposes.
//! - Column literals are quoted by the column's declared type; all other
//!   replacements splice their rendered text bare.
//! - Text that is blank before substitution, or blank after it, yields no
//!   value without invoking the evaluator.

use crate::breaks::GroupBreaks;
use crate::script::{self, ScriptEvaluator};
use chrono::{Local, NaiveDateTime};
use log::warn;
use model::{
    AreaPath, ColumnType, DataCursor, DataSource, FieldKind, Formula, FormulaId, Report,
    SelectableRef, SpecialKind, Value,
};
use parser::{rewrite, PlaceholderKind};
use rustc_hash::{FxHashMap, FxHashSet};

/// Replacement text for a `{%...}` reference whose name is not a known
/// special value.
const UNKNOWN_SPECIAL: &str = "unknown special field";

/// Per-row memo of formula results. The run invalidates it once per row;
/// within a row a formula referenced from several fields evaluates once.
#[derive(Debug, Default)]
pub struct FormulaCache {
    values: FxHashMap<FormulaId, Value>,
}

impl FormulaCache {
    pub fn new() -> Self {
        FormulaCache {
            values: FxHashMap::default(),
        }
    }

    pub fn get(&self, id: FormulaId) -> Option<Value> {
        self.values.get(&id).cloned()
    }

    pub fn insert(&mut self, id: FormulaId, value: Value) {
        self.values.insert(id, value);
    }

    /// Marks every cached result stale. The run calls this when the cursor
    /// moves.
    pub fn invalidate_all(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Resolves placeholders against a report definition and, when attached to
/// a row, the live cursor and group state.
///
/// The resolver borrows the cache and warning memo from the run so that
/// results survive across the resolvers built for each callback. Every
/// failure mode evaluates to `Value::Null`; nothing here aborts a run.
pub struct Resolver<'a> {
    report: &'a Report,
    source: &'a dyn DataSource,
    scripting: &'a mut dyn ScriptEvaluator,
    cache: &'a mut FormulaCache,
    /// Formulas already reported this run. A failing formula keeps
    /// evaluating (and failing) every row; it is only reported once.
    warned: &'a mut FxHashSet<FormulaId>,
    cursor: Option<&'a dyn DataCursor>,
    breaks: Option<&'a GroupBreaks>,
    run_date: NaiveDateTime,
    page_number: u32,
    /// Formulas on the recursion stack, for cycle detection.
    evaluating: Vec<FormulaId>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        report: &'a Report,
        source: &'a dyn DataSource,
        scripting: &'a mut dyn ScriptEvaluator,
        cache: &'a mut FormulaCache,
        warned: &'a mut FxHashSet<FormulaId>,
    ) -> Self {
        Resolver {
            report,
            source,
            scripting,
            cache,
            warned,
            cursor: None,
            breaks: None,
            run_date: Local::now().naive_local(),
            page_number: 0,
            evaluating: Vec::new(),
        }
    }

    /// Attaches the current row: column references read through the cursor
    /// and group counts read through the break state.
    pub fn with_row(mut self, cursor: &'a dyn DataCursor, breaks: &'a GroupBreaks) -> Self {
        self.cursor = Some(cursor);
        self.breaks = Some(breaks);
        self
    }

    /// Page number reported by `{%page.number}`.
    pub fn at_page(mut self, page_number: u32) -> Self {
        self.page_number = page_number;
        self
    }

    /// Timestamp reported by `{%report.date}`. Defaults to the wall clock
    /// at construction.
    pub fn dated(mut self, run_date: NaiveDateTime) -> Self {
        self.run_date = run_date;
        self
    }

    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    /// Renderers that break pages mid-band report the new page through
    /// this so later `{%page.number}` references stay current.
    pub fn set_page_number(&mut self, page_number: u32) {
        self.page_number = page_number;
    }

    /// The borrowed report definition. The returned reference carries the
    /// definition's lifetime, not the resolver's.
    pub fn report(&self) -> &'a Report {
        self.report
    }

    /// 1-based number of the current row, 0 when not on a row.
    pub fn row_number(&self) -> u64 {
        self.cursor.map_or(0, |c| c.row_number())
    }

    /// Evaluates a formula to a value, consulting the per-row cache first.
    ///
    /// `section` is the section owning the field the formula sits in, if
    /// any; `{%group.count}` resolves against it. Blank text, a null
    /// reference inside the text, a scripting failure, and a reference
    /// cycle all yield `Value::Null`.
    pub fn evaluate_formula(&mut self, id: FormulaId, section: Option<u64>) -> Value {
        if let Some(cached) = self.cache.get(id) {
            return cached;
        }
        if self.evaluating.contains(&id) {
            if self.warned.insert(id) {
                warn!("formula #{} refers back to itself and yields no value", id);
            }
            return Value::Null;
        }
        let report = self.report;
        let formula = match report.formula(id) {
            Ok(f) => f,
            Err(_) => return Value::Null,
        };
        let language = self.language_for(formula);

        self.evaluating.push(id);
        let substituted = self.substitute(formula.text(), formula.except_after(), section);
        self.evaluating.pop();

        let value = match substituted {
            None => Value::Null,
            Some(body) => match self.scripting.eval(&language, formula.name(), &body) {
                Ok(value) => value,
                Err(err) => {
                    if self.warned.insert(id) {
                        warn!("{}", err);
                    }
                    Value::Null
                }
            },
        };
        self.cache.insert(id, value.clone());
        value
    }

    /// Rewrites every placeholder in `text` to a literal, in the fixed pass
    /// order. `None` means "no value": blank input, an aborting null
    /// reference, or nothing but whitespace surviving the rewrite.
    pub fn substitute(
        &mut self,
        text: &str,
        except_after: Option<&str>,
        section: Option<u64>,
    ) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }

        let report = self.report;
        let source = self.source;
        let nil = self.scripting.nil_literal().to_string();

        // Special values. Unknown names read as fixed text; a null value
        // reads as the nil literal. This pass never aborts.
        let text = rewrite(text, PlaceholderKind::Special.open(), except_after, |body| {
            let value = match SpecialKind::parse(body) {
                Ok(kind) => self.special_value(kind, section),
                Err(_) => Value::from(UNKNOWN_SPECIAL),
            };
            Some(match value {
                Value::Null => nil.clone(),
                value => value.to_string(),
            })
        })?;

        // Formula values, recursing through the cache.
        let text = rewrite(
            &text,
            PlaceholderKind::Formula.open(),
            except_after,
            |body| match parse_ref(body).and_then(|id| report.formula(id).ok()) {
                None => Some(nil.clone()),
                Some(formula) => match self.evaluate_formula(formula.id(), section) {
                    Value::Null => None,
                    value => Some(value.to_string()),
                },
            },
        )?;

        // Parameter values.
        let text = rewrite(
            &text,
            PlaceholderKind::Parameter.open(),
            except_after,
            |body| match parse_ref(body).and_then(|id| report.parameter(id).ok()) {
                None => Some(nil.clone()),
                Some(parameter) => match parameter.value() {
                    Value::Null => None,
                    value => Some(value.to_string()),
                },
            },
        )?;

        // User column values, read from the row the source computed.
        let text = rewrite(
            &text,
            PlaceholderKind::UserColumn.open(),
            except_after,
            |body| match parse_ref(body).filter(|id| report.user_column(*id).is_ok()) {
                None => Some(nil.clone()),
                Some(id) => match self.selectable_value(&SelectableRef::UserColumn(id)) {
                    Value::Null => None,
                    value => Some(value.to_string()),
                },
            },
        )?;

        // Plain columns, last.
        let text = rewrite(
            &text,
            PlaceholderKind::Column.open(),
            except_after,
            |body| match source.find_column(body) {
                None => Some(format!("{{{}}}", body)),
                Some(index) => {
                    let col_type = source.columns()[index].col_type();
                    Some(self.column_literal(index, col_type, &nil))
                }
            },
        )?;

        if text.trim().is_empty() {
            return None;
        }
        Some(text)
    }

    /// Current-row value of a column, by name. Null when the column is
    /// unknown or no row is attached.
    pub fn column_value(&self, name: &str) -> Value {
        match self.source.find_column(name) {
            Some(index) => self.cursor_value(index),
            None => Value::Null,
        }
    }

    /// Current-row value of a selectable. Null when the source cannot
    /// deliver it or no row is attached.
    pub fn selectable_value(&self, selectable: &SelectableRef) -> Value {
        match self.source.selectable_index(selectable) {
            Some(index) => self.cursor_value(index),
            None => Value::Null,
        }
    }

    /// Value of a special reference. Group counts resolve against the
    /// group owning `section`; a detail section falls back to the
    /// innermost group, and anything else to the row number.
    pub fn special_value(&self, kind: SpecialKind, section: Option<u64>) -> Value {
        match kind {
            SpecialKind::ReportName => Value::from(self.report.name()),
            SpecialKind::ReportTitle => Value::from(self.report.title()),
            SpecialKind::ReportAuthor => Value::from(self.report.author()),
            SpecialKind::ReportDescription => Value::from(self.report.description()),
            SpecialKind::ReportDate => Value::Timestamp(self.run_date),
            SpecialKind::ReportRow => Value::from(self.row_number() as i64),
            SpecialKind::PageNumber => Value::from(self.page_number as i64),
            SpecialKind::GroupCount => self.group_count(section),
        }
    }

    /// Current-row value of a non-aggregate field kind. `section` is the
    /// section holding the field. Aggregate kinds resolve to null here;
    /// their accumulators live with the run, not the resolver.
    pub fn value_of_kind(&mut self, kind: &FieldKind, section: Option<u64>) -> Value {
        match kind {
            FieldKind::Text(text) => Value::from(text.as_str()),
            FieldKind::Column(name) => self.column_value(name),
            FieldKind::Formula(id) => self.evaluate_formula(*id, section),
            FieldKind::Parameter(id) => match self.report.parameter(*id) {
                Ok(parameter) => parameter.value(),
                Err(_) => Value::Null,
            },
            FieldKind::UserColumn(id) => self.selectable_value(&SelectableRef::UserColumn(*id)),
            FieldKind::Special(special) => self.special_value(*special, section),
            FieldKind::Aggregate { .. } => Value::Null,
        }
    }

    fn group_count(&self, section: Option<u64>) -> Value {
        let group = match section {
            None => None,
            Some(section_id) => match self.report.group_owning_section(section_id) {
                Some(index) => Some(index),
                None if self.section_is_detail(section_id) => self.innermost_group(),
                None => None,
            },
        };
        match (group, self.breaks) {
            (Some(index), Some(breaks)) if index < breaks.len() => {
                Value::from(breaks.state(index).record_count() as i64)
            }
            _ => Value::from(self.row_number() as i64),
        }
    }

    fn section_is_detail(&self, section_id: u64) -> bool {
        matches!(
            self.report.location_of(section_id),
            Some((AreaPath::Details, _))
        )
    }

    fn innermost_group(&self) -> Option<usize> {
        self.report.groups().len().checked_sub(1)
    }

    fn language_for(&self, formula: &Formula) -> String {
        match formula.language().or_else(|| self.report.default_language()) {
            Some(language) => language.to_string(),
            None => script::default_language(),
        }
    }

    fn column_literal(&self, index: usize, col_type: ColumnType, nil: &str) -> String {
        let value = self.cursor_value(index);
        if value.is_null() {
            nil.to_string()
        } else if col_type.needs_quoting() {
            quoted(&value.to_string())
        } else {
            value.to_string()
        }
    }

    fn cursor_value(&self, index: usize) -> Value {
        match self.cursor {
            Some(cursor) => cursor.value_at(index),
            None => Value::Null,
        }
    }
}

/// Evaluates one formula outside a run: fresh cache, no row, page 0.
/// Editors use this to preview a formula against current parameter values.
pub fn evaluate(
    report: &Report,
    source: &dyn DataSource,
    scripting: &mut dyn ScriptEvaluator,
    id: FormulaId,
) -> Value {
    let mut cache = FormulaCache::new();
    let mut warned = FxHashSet::default();
    Resolver::new(report, source, scripting, &mut cache, &mut warned).evaluate_formula(id, None)
}

/// Storage-form id bodies parse as plain numbers; anything else names
/// nothing.
fn parse_ref(body: &str) -> Option<u64> {
    body.parse().ok()
}

/// Double-quotes a literal for splicing into script text, backslash-
/// escaping embedded quotes and backslashes.
fn quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        if ch == '"' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::ScriptError;
    use chrono::NaiveDate;
    use model::{Arity, Column, Group, MemorySource, ParameterType, Section, Value};

    /// Scripting stub: answers canned values by formula name, raises for
    /// listed names, and otherwise echoes the substituted text back so
    /// tests can read it off the result.
    struct EchoEvaluator {
        calls: Vec<(String, String, String)>,
        canned: FxHashMap<String, Value>,
        failing: FxHashSet<String>,
    }

    impl EchoEvaluator {
        fn new() -> Self {
            EchoEvaluator {
                calls: Vec::new(),
                canned: FxHashMap::default(),
                failing: FxHashSet::default(),
            }
        }

        fn canned(mut self, name: &str, value: Value) -> Self {
            self.canned.insert(name.to_string(), value);
            self
        }

        fn failing(mut self, name: &str) -> Self {
            self.failing.insert(name.to_string());
            self
        }

        fn last_text(&self) -> &str {
            &self.calls.last().expect("no evaluator call").2
        }
    }

    impl ScriptEvaluator for EchoEvaluator {
        fn eval(&mut self, language: &str, name: &str, text: &str) -> Result<Value, ScriptError> {
            self.calls
                .push((language.to_string(), name.to_string(), text.to_string()));
            if self.failing.contains(name) {
                return Err(ScriptError::new(name, "boom"));
            }
            match self.canned.get(name) {
                Some(value) => Ok(value.clone()),
                None => Ok(Value::from(text)),
            }
        }
    }

    fn jobs_source() -> MemorySource {
        MemorySource::new(
            vec![
                Column::new("jobs.title", ColumnType::Text),
                Column::new("jobs.pay", ColumnType::Number),
                Column::new("jobs.posted", ColumnType::Date),
                Column::new("jobs.open", ColumnType::Bool),
            ],
            vec![vec![
                Value::from(r#"said "hi" \ bye"#),
                Value::from(250.5),
                Value::Date(NaiveDate::from_ymd_opt(2004, 3, 1).unwrap()),
                Value::from(true),
            ]],
        )
    }

    fn report_with(texts: &[(&str, &str)]) -> Report {
        let mut report = Report::new();
        report.set_default_language(Some("ruby".to_string()));
        for (name, text) in texts {
            report.add_formula(*name, *text);
        }
        report
    }

    /// Runs one formula against the single-row source and returns its
    /// value, leaving the evaluator inspectable.
    fn eval_formula(report: &Report, scripting: &mut EchoEvaluator, id: FormulaId) -> Value {
        let source = jobs_source();
        let mut cursor = source.execute().unwrap();
        cursor.next().unwrap();
        let breaks = GroupBreaks::new(0);
        let mut cache = FormulaCache::new();
        let mut warned = FxHashSet::default();
        Resolver::new(report, &source, scripting, &mut cache, &mut warned)
            .with_row(&*cursor, &breaks)
            .evaluate_formula(id, None)
    }

    // ========================================================================
    // COLUMN SUBSTITUTION
    // ========================================================================

    #[test]
    fn test_columns_quote_by_declared_type() {
        let report = report_with(&[("f", "{jobs.title} {jobs.pay} {jobs.open}")]);
        let mut scripting = EchoEvaluator::new();
        eval_formula(&report, &mut scripting, 1);
        assert_eq!(scripting.last_text(), r#""said \"hi\" \\ bye" 250.5 true"#);
    }

    #[test]
    fn test_date_columns_substitute_quoted() {
        let report = report_with(&[("f", "{jobs.posted}")]);
        let mut scripting = EchoEvaluator::new();
        eval_formula(&report, &mut scripting, 1);
        assert_eq!(scripting.last_text(), "\"2004-03-01\"");
    }

    #[test]
    fn test_unknown_column_keeps_braces() {
        let report = report_with(&[("f", "{jobs.nope} * 2")]);
        let mut scripting = EchoEvaluator::new();
        eval_formula(&report, &mut scripting, 1);
        assert_eq!(scripting.last_text(), "{jobs.nope} * 2");
    }

    #[test]
    fn test_null_column_splices_nil() {
        let report = report_with(&[("f", "{jobs.pay}")]);
        let source = MemorySource::new(
            vec![Column::new("jobs.pay", ColumnType::Number)],
            vec![vec![Value::Null]],
        );
        let mut cursor = source.execute().unwrap();
        cursor.next().unwrap();
        let breaks = GroupBreaks::new(0);
        let mut scripting = EchoEvaluator::new();
        let mut cache = FormulaCache::new();
        let mut warned = FxHashSet::default();
        Resolver::new(&report, &source, &mut scripting, &mut cache, &mut warned)
            .with_row(&*cursor, &breaks)
            .evaluate_formula(1, None);
        assert_eq!(scripting.last_text(), "nil");
    }

    #[test]
    fn test_text_around_placeholders_survives() {
        let report = report_with(&[("f", "x = {jobs.pay} + 1")]);
        let mut scripting = EchoEvaluator::new();
        eval_formula(&report, &mut scripting, 1);
        assert_eq!(scripting.last_text(), "x = 250.5 + 1");
    }

    #[test]
    fn test_except_after_skips_marked_spans() {
        let report = report_with(&[("f", "#{jobs.title} vs {jobs.pay}")]);
        let mut scripting = EchoEvaluator::new();
        eval_formula(&report, &mut scripting, 1);
        assert_eq!(scripting.last_text(), "#{jobs.title} vs 250.5");
    }

    // ========================================================================
    // MISSING AND NULL REFERENCES
    // ========================================================================

    #[test]
    fn test_missing_objects_splice_nil() {
        let report = report_with(&[("f", "{@99} {?99} {!99}")]);
        let mut scripting = EchoEvaluator::new();
        eval_formula(&report, &mut scripting, 1);
        assert_eq!(scripting.last_text(), "nil nil nil");
    }

    #[test]
    fn test_malformed_reference_body_reads_as_missing() {
        let report = report_with(&[("f", "{@wages}")]);
        let mut scripting = EchoEvaluator::new();
        eval_formula(&report, &mut scripting, 1);
        assert_eq!(scripting.last_text(), "nil");
    }

    #[test]
    fn test_unanswered_parameter_splices_its_type_stand_in() {
        let mut report = report_with(&[("f", "{?1} + 1")]);
        report
            .add_parameter("Count", "How many?", ParameterType::Number, Arity::Single)
            .unwrap();
        let mut scripting = EchoEvaluator::new();
        eval_formula(&report, &mut scripting, 1);
        assert_eq!(scripting.last_text(), "0 + 1");
    }

    #[test]
    fn test_parameter_value_splices_bare() {
        let mut report = report_with(&[("f", "{?1}")]);
        report
            .add_parameter("Office", "Which?", ParameterType::String, Arity::Single)
            .unwrap();
        report
            .set_parameter_values(1, vec![Value::from("NYC")])
            .unwrap();
        let mut scripting = EchoEvaluator::new();
        eval_formula(&report, &mut scripting, 1);
        assert_eq!(scripting.last_text(), "NYC");
    }

    #[test]
    fn test_null_user_column_aborts_evaluation() {
        // The user column exists but the source does not deliver it
        let mut report = report_with(&[("f", "{!1}")]);
        report.add_user_column("Bonus", "{jobs.pay} * 0.1");
        let mut scripting = EchoEvaluator::new();
        let value = eval_formula(&report, &mut scripting, 1);
        assert_eq!(value, Value::Null);
        assert!(scripting.calls.is_empty());
    }

    #[test]
    fn test_user_column_reads_through_the_source_mapping() {
        let mut report = report_with(&[("f", "{!1}")]);
        report.add_user_column("Bonus", "{jobs.pay} * 0.1");
        let mut source = MemorySource::new(
            vec![Column::new("jobs.pay", ColumnType::Number)],
            vec![vec![Value::from(250.0), Value::from(25.0)]],
        );
        source.map_user_column(1, 1);
        let mut cursor = source.execute().unwrap();
        cursor.next().unwrap();
        let breaks = GroupBreaks::new(0);
        let mut scripting = EchoEvaluator::new();
        let mut cache = FormulaCache::new();
        let mut warned = FxHashSet::default();
        Resolver::new(&report, &source, &mut scripting, &mut cache, &mut warned)
            .with_row(&*cursor, &breaks)
            .evaluate_formula(1, None);
        assert_eq!(scripting.last_text(), "25");
    }

    // ========================================================================
    // BLANK TEXT AND SHORT CIRCUITS
    // ========================================================================

    #[test]
    fn test_blank_text_never_reaches_the_evaluator() {
        let report = report_with(&[("f", "   ")]);
        let mut scripting = EchoEvaluator::new();
        let value = eval_formula(&report, &mut scripting, 1);
        assert_eq!(value, Value::Null);
        assert!(scripting.calls.is_empty());
    }

    #[test]
    fn test_text_that_substitutes_to_blank_never_reaches_the_evaluator() {
        // report.name is empty in a fresh report
        let report = report_with(&[("f", "{%report.name}")]);
        let mut scripting = EchoEvaluator::new();
        let value = eval_formula(&report, &mut scripting, 1);
        assert_eq!(value, Value::Null);
        assert!(scripting.calls.is_empty());
    }

    #[test]
    fn test_missing_formula_id_evaluates_to_null() {
        let report = report_with(&[]);
        let mut scripting = EchoEvaluator::new();
        assert_eq!(eval_formula(&report, &mut scripting, 7), Value::Null);
        assert!(scripting.calls.is_empty());
    }

    // ========================================================================
    // RECURSION, CACHING, AND FAILURE REPORTING
    // ========================================================================

    #[test]
    fn test_sub_formula_value_splices_into_parent() {
        let report = report_with(&[("outer", "{@2} * 2"), ("inner", "21")]);
        let mut scripting = EchoEvaluator::new().canned("inner", Value::from(21.0));
        let value = eval_formula(&report, &mut scripting, 1);
        assert_eq!(scripting.last_text(), "21 * 2");
        assert_eq!(value, Value::from("21 * 2"));
    }

    #[test]
    fn test_null_sub_formula_aborts_parent() {
        let report = report_with(&[("outer", "{@2} * 2"), ("inner", "21")]);
        let mut scripting = EchoEvaluator::new().canned("inner", Value::Null);
        let value = eval_formula(&report, &mut scripting, 1);
        assert_eq!(value, Value::Null);
        // Only the inner formula ever reached the evaluator
        assert_eq!(scripting.calls.len(), 1);
    }

    #[test]
    fn test_mutually_recursive_formulas_yield_null() {
        let report = report_with(&[("a", "{@2}"), ("b", "{@1}")]);
        let mut scripting = EchoEvaluator::new();
        assert_eq!(eval_formula(&report, &mut scripting, 1), Value::Null);
        assert!(scripting.calls.is_empty());
    }

    #[test]
    fn test_self_reference_yields_null() {
        let report = report_with(&[("a", "{@1} + 1")]);
        let mut scripting = EchoEvaluator::new();
        assert_eq!(eval_formula(&report, &mut scripting, 1), Value::Null);
    }

    #[test]
    fn test_results_cached_until_invalidated() {
        let report = report_with(&[("f", "{jobs.pay}")]);
        let source = jobs_source();
        let mut cursor = source.execute().unwrap();
        cursor.next().unwrap();
        let breaks = GroupBreaks::new(0);
        let mut scripting = EchoEvaluator::new();
        let mut cache = FormulaCache::new();
        let mut warned = FxHashSet::default();

        let mut resolver =
            Resolver::new(&report, &source, &mut scripting, &mut cache, &mut warned)
                .with_row(&*cursor, &breaks);
        let first = resolver.evaluate_formula(1, None);
        let second = resolver.evaluate_formula(1, None);
        assert_eq!(first, second);

        cache.invalidate_all();
        let mut resolver =
            Resolver::new(&report, &source, &mut scripting, &mut cache, &mut warned)
                .with_row(&*cursor, &breaks);
        resolver.evaluate_formula(1, None);
        assert_eq!(scripting.calls.len(), 2);
    }

    #[test]
    fn test_script_failure_yields_null_and_reports_once() {
        let report = report_with(&[("f", "1 +")]);
        let source = jobs_source();
        let mut cursor = source.execute().unwrap();
        cursor.next().unwrap();
        let breaks = GroupBreaks::new(0);
        let mut scripting = EchoEvaluator::new().failing("f");
        let mut cache = FormulaCache::new();
        let mut warned = FxHashSet::default();

        for _ in 0..3 {
            cache.invalidate_all();
            let value =
                Resolver::new(&report, &source, &mut scripting, &mut cache, &mut warned)
                    .with_row(&*cursor, &breaks)
                    .evaluate_formula(1, None);
            assert_eq!(value, Value::Null);
        }
        // Evaluated every time, remembered as reported after the first
        assert_eq!(scripting.calls.len(), 3);
        assert_eq!(warned.len(), 1);
    }

    // ========================================================================
    // SPECIAL VALUES
    // ========================================================================

    #[test]
    fn test_report_metadata_specials() {
        let mut report = report_with(&[("f", "{%report.title} by {%report.author}")]);
        report.set_title("Payroll");
        report.set_author("jm");
        let mut scripting = EchoEvaluator::new();
        eval_formula(&report, &mut scripting, 1);
        assert_eq!(scripting.last_text(), "Payroll by jm");
    }

    #[test]
    fn test_row_and_page_specials() {
        let report = report_with(&[("f", "{%report.row} / {%page.number}")]);
        let source = jobs_source();
        let mut cursor = source.execute().unwrap();
        cursor.next().unwrap();
        let breaks = GroupBreaks::new(0);
        let mut scripting = EchoEvaluator::new();
        let mut cache = FormulaCache::new();
        let mut warned = FxHashSet::default();
        Resolver::new(&report, &source, &mut scripting, &mut cache, &mut warned)
            .with_row(&*cursor, &breaks)
            .at_page(4)
            .evaluate_formula(1, None);
        assert_eq!(scripting.last_text(), "1 / 4");
    }

    #[test]
    fn test_report_date_uses_the_pinned_timestamp() {
        let report = report_with(&[("f", "{%report.date}")]);
        let source = jobs_source();
        let mut cursor = source.execute().unwrap();
        cursor.next().unwrap();
        let breaks = GroupBreaks::new(0);
        let when = NaiveDate::from_ymd_opt(2004, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        let mut scripting = EchoEvaluator::new();
        let mut cache = FormulaCache::new();
        let mut warned = FxHashSet::default();
        Resolver::new(&report, &source, &mut scripting, &mut cache, &mut warned)
            .with_row(&*cursor, &breaks)
            .dated(when)
            .evaluate_formula(1, None);
        assert_eq!(scripting.last_text(), "2004-03-01 09:30:00");
    }

    #[test]
    fn test_unknown_special_splices_fixed_text() {
        let report = report_with(&[("f", "{%page.count}")]);
        let mut scripting = EchoEvaluator::new();
        eval_formula(&report, &mut scripting, 1);
        assert_eq!(scripting.last_text(), UNKNOWN_SPECIAL);
    }

    #[test]
    fn test_group_count_resolves_against_the_owning_group() {
        let mut report = report_with(&[("f", "{%group.count}")]);
        report.add_group(Group::new(SelectableRef::Column("jobs.title".into())));
        report
            .area_mut(AreaPath::GroupFooters(0))
            .unwrap()
            .add(Section::new(11, 20.0));
        report
            .area_mut(AreaPath::Details)
            .unwrap()
            .add(Section::new(12, 20.0));

        let source = jobs_source();
        let mut cursor = source.execute().unwrap();
        cursor.next().unwrap();
        let mut breaks = GroupBreaks::new(1);
        breaks.advance(vec![Value::from("A")]);
        breaks.update_counters();
        breaks.advance(vec![Value::from("A")]);
        breaks.update_counters();

        let mut scripting = EchoEvaluator::new();
        let mut cache = FormulaCache::new();
        let mut warned = FxHashSet::default();
        let resolver = Resolver::new(&report, &source, &mut scripting, &mut cache, &mut warned)
            .with_row(&*cursor, &breaks);

        // Owning group's count from the footer section, and the innermost
        // group via the detail section
        assert_eq!(
            resolver.special_value(SpecialKind::GroupCount, Some(11)),
            Value::from(2.0)
        );
        assert_eq!(
            resolver.special_value(SpecialKind::GroupCount, Some(12)),
            Value::from(2.0)
        );
        // No section context falls back to the row number
        assert_eq!(
            resolver.special_value(SpecialKind::GroupCount, None),
            Value::from(1.0)
        );
    }

    // ========================================================================
    // PASS ORDER AND LANGUAGE SELECTION
    // ========================================================================

    #[test]
    fn test_specials_rewrite_before_formula_results_arrive() {
        // The inner formula's value contains a special-shaped span; the
        // special pass has already run, so it survives to the output
        let report = report_with(&[("outer", "{@2}"), ("inner", "x")]);
        let mut scripting =
            EchoEvaluator::new().canned("inner", Value::from("{%report.row}"));
        eval_formula(&report, &mut scripting, 1);
        assert_eq!(scripting.last_text(), "{%report.row}");
    }

    #[test]
    fn test_formula_language_tag_wins_over_report_default() {
        let mut report = Report::new();
        report.set_default_language(Some("python".to_string()));
        report.add_formula_with_language("f", "1", "scheme");
        let mut scripting = EchoEvaluator::new();
        eval_formula(&report, &mut scripting, 1);
        assert_eq!(scripting.calls[0].0, "scheme");
    }

    #[test]
    fn test_report_default_language_covers_untagged_formulas() {
        let mut report = Report::new();
        report.set_default_language(Some("python".to_string()));
        report.add_formula("f", "1");
        let mut scripting = EchoEvaluator::new();
        eval_formula(&report, &mut scripting, 1);
        assert_eq!(scripting.calls[0].0, "python");
    }

    // ========================================================================
    // PREVIEW EVALUATION
    // ========================================================================

    #[test]
    fn test_preview_runs_without_a_row() {
        let report = report_with(&[("f", "{jobs.pay}")]);
        let source = jobs_source();
        let mut scripting = EchoEvaluator::new();
        evaluate(&report, &source, &mut scripting, 1);
        // No cursor: the column reads as null and splices nil
        assert_eq!(scripting.last_text(), "nil");
    }
}
