//! FILENAME: report-engine/src/context.rs
//! PURPOSE: The per-row view handed to renderer callbacks.
//! CONTEXT: The run loop owns the cursor, break state, accumulators, and
//! caches. Each callback receives a `RowContext` that bundles a resolver
//! over that state with the firing lists computed for the row. Renderers
//! read values and visibility through it and never touch run state
//! directly.

use crate::aggregate::Aggregates;
use crate::breaks::GroupIndexes;
use crate::resolve::Resolver;
use model::{Field, FieldKind, Report, Section, Value};

/// Everything a renderer may ask while emitting bands for one row.
pub struct RowContext<'a> {
    resolver: Resolver<'a>,
    aggregates: &'a Aggregates,
    /// Groups whose headers fire for this row, outermost first.
    headers: GroupIndexes,
    /// Groups whose footers fire for this row, innermost first.
    footers: GroupIndexes,
}

impl<'a> RowContext<'a> {
    pub fn new(
        resolver: Resolver<'a>,
        aggregates: &'a Aggregates,
        headers: GroupIndexes,
        footers: GroupIndexes,
    ) -> Self {
        RowContext {
            resolver,
            aggregates,
            headers,
            footers,
        }
    }

    /// The report definition being run. The reference outlives this
    /// context, so renderers can hold sections across value lookups.
    pub fn report(&self) -> &'a Report {
        self.resolver.report()
    }

    /// 1-based number of the current row, 0 when not on a row.
    pub fn row_number(&self) -> u64 {
        self.resolver.row_number()
    }

    pub fn page_number(&self) -> u32 {
        self.resolver.page_number()
    }

    /// Renderers that start a new page mid-band report it here so later
    /// `{%page.number}` references resolve to the new page.
    pub fn set_page_number(&mut self, page_number: u32) {
        self.resolver.set_page_number(page_number);
    }

    /// Groups whose headers fire for this row, outermost first.
    pub fn firing_headers(&self) -> GroupIndexes {
        self.headers.clone()
    }

    /// Groups whose footers fire for this row, innermost first. During the
    /// forced footers that close a run this covers every group.
    pub fn firing_footers(&self) -> GroupIndexes {
        self.footers.clone()
    }

    /// Resolves a field's value against the current row. `section` is the
    /// band being emitted; group counts and suppression formulas inside it
    /// resolve against that band's group.
    pub fn field_value(&mut self, section: &Section, field: &Field) -> Value {
        if let FieldKind::Aggregate { .. } = field.kind() {
            return self
                .aggregates
                .value_of_field(field.id())
                .unwrap_or(Value::Null);
        }
        self.resolver.value_of_kind(field.kind(), Some(section.id()))
    }

    /// Whether a section prints for the current row: not hidden outright,
    /// and its suppression formula (if any) does not evaluate to true.
    /// Render-only: the row's group and aggregate updates have already
    /// happened by the time this is asked.
    pub fn section_visible(&mut self, section: &Section) -> bool {
        let suppression = section.suppression();
        if suppression.hides_unconditionally() {
            return false;
        }
        match suppression.formula {
            None => true,
            Some(id) => {
                self.resolver.evaluate_formula(id, Some(section.id())) != Value::Bool(true)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breaks::GroupBreaks;
    use crate::resolve::FormulaCache;
    use crate::script::{ScriptError, ScriptEvaluator};
    use model::{
        AggregateFunction, AggregateScope, AreaPath, Column, ColumnType, DataSource, FieldKind,
        MemorySource, Rect, Report, Section,
    };
    use rustc_hash::FxHashSet;
    use smallvec::smallvec;

    /// Evaluates any text to a fixed boolean keyed by formula name; all
    /// other names echo the text.
    struct FixedEvaluator;

    impl ScriptEvaluator for FixedEvaluator {
        fn eval(&mut self, _language: &str, name: &str, text: &str) -> Result<Value, ScriptError> {
            match name {
                "yes" => Ok(Value::Bool(true)),
                "no" => Ok(Value::Bool(false)),
                _ => Ok(Value::from(text)),
            }
        }
    }

    fn sales_source() -> MemorySource {
        MemorySource::new(
            vec![
                Column::new("dept", ColumnType::Text),
                Column::new("sales", ColumnType::Number),
            ],
            vec![vec![Value::from("A"), Value::from(10.0)]],
        )
    }

    fn detail_section(report: &mut Report) -> u64 {
        let mut section = Section::new(1, 20.0);
        section.add_field(Field::new(
            1,
            Rect::default(),
            FieldKind::Column("sales".into()),
        ));
        report.area_mut(AreaPath::Details).unwrap().add(section);
        1
    }

    /// Drives `body` with a context positioned on the fixture's one row.
    fn with_context<F>(report: &Report, body: F)
    where
        F: FnOnce(&mut RowContext<'_>),
    {
        let source = sales_source();
        let mut cursor = source.execute().unwrap();
        cursor.next().unwrap();
        let breaks = GroupBreaks::new(0);
        let mut aggregates = Aggregates::collect(report);
        aggregates.update_row(&breaks, |kind, _| match kind {
            FieldKind::Column(name) => {
                let index = source.find_column(name).unwrap();
                cursor.value_at(index)
            }
            _ => Value::Null,
        });
        let mut scripting = FixedEvaluator;
        let mut cache = FormulaCache::new();
        let mut warned = FxHashSet::default();
        let resolver = Resolver::new(report, &source, &mut scripting, &mut cache, &mut warned)
            .with_row(&*cursor, &breaks);
        let mut ctx = RowContext::new(resolver, &aggregates, smallvec![0], smallvec![0]);
        body(&mut ctx);
    }

    #[test]
    fn test_field_values_by_kind() {
        let mut report = Report::new();
        report.set_title("Sales Report");
        report.add_formula("double", "{sales} * 2");
        let section_id = detail_section(&mut report);

        with_context(&report, |ctx| {
            let report = ctx.report();
            let section = report
                .area(AreaPath::Details)
                .unwrap()
                .get(section_id)
                .unwrap();

            let text = Field::new(10, Rect::default(), FieldKind::Text("hi".into()));
            assert_eq!(ctx.field_value(section, &text), Value::from("hi"));

            let column = Field::new(11, Rect::default(), FieldKind::Column("sales".into()));
            assert_eq!(ctx.field_value(section, &column), Value::from(10.0));

            let formula = Field::new(12, Rect::default(), FieldKind::Formula(1));
            assert_eq!(ctx.field_value(section, &formula), Value::from("10 * 2"));

            let dangling = Field::new(13, Rect::default(), FieldKind::Parameter(9));
            assert_eq!(ctx.field_value(section, &dangling), Value::Null);
        });
    }

    #[test]
    fn test_aggregate_fields_read_the_accumulator() {
        let mut report = Report::new();
        let section_id = detail_section(&mut report);
        let mut footer = Section::new(2, 20.0);
        footer.add_field(Field::new(
            2,
            Rect::default(),
            FieldKind::Aggregate {
                field: 1,
                function: AggregateFunction::Sum,
                scope: AggregateScope::Report,
            },
        ));
        report.area_mut(AreaPath::ReportFooters).unwrap().add(footer);

        with_context(&report, |ctx| {
            let report = ctx.report();
            let section = report
                .area(AreaPath::Details)
                .unwrap()
                .get(section_id)
                .unwrap();
            let total = Field::new(
                2,
                Rect::default(),
                FieldKind::Aggregate {
                    field: 1,
                    function: AggregateFunction::Sum,
                    scope: AggregateScope::Report,
                },
            );
            assert_eq!(ctx.field_value(section, &total), Value::from(10.0));
        });
    }

    #[test]
    fn test_hidden_flag_suppresses_unconditionally() {
        let mut report = Report::new();
        let section_id = detail_section(&mut report);
        report
            .area_mut(AreaPath::Details)
            .unwrap()
            .get_mut(section_id)
            .unwrap()
            .suppression_mut()
            .hidden = true;

        with_context(&report, |ctx| {
            let section = ctx
                .report()
                .area(AreaPath::Details)
                .unwrap()
                .get(section_id)
                .unwrap();
            assert!(!ctx.section_visible(section));
        });
    }

    #[test]
    fn test_suppression_formula_must_be_true_to_hide() {
        let mut report = Report::new();
        let yes = report.add_formula("yes", "1");
        let no = report.add_formula("no", "0");
        let section_id = detail_section(&mut report);

        with_context(&report, |ctx| {
            let report = ctx.report();
            let section = report
                .area(AreaPath::Details)
                .unwrap()
                .get(section_id)
                .unwrap();

            let mut hidden = section.clone();
            hidden.suppression_mut().formula = Some(yes);
            assert!(!ctx.section_visible(&hidden));

            let mut shown = section.clone();
            shown.suppression_mut().formula = Some(no);
            assert!(ctx.section_visible(&shown));

            // A dangling formula id shows the section
            let mut dangling = section.clone();
            dangling.suppression_mut().formula = Some(99);
            assert!(ctx.section_visible(&dangling));
        });
    }

    #[test]
    fn test_page_number_updates_flow_through() {
        let mut report = Report::new();
        report.add_formula("page", "{%page.number}");
        let section_id = detail_section(&mut report);

        with_context(&report, |ctx| {
            let section = ctx
                .report()
                .area(AreaPath::Details)
                .unwrap()
                .get(section_id)
                .unwrap();
            ctx.set_page_number(7);
            assert_eq!(ctx.page_number(), 7);
            let field = Field::new(20, Rect::default(), FieldKind::Formula(1));
            assert_eq!(ctx.field_value(section, &field), Value::from("7"));
        });
    }

    #[test]
    fn test_firing_lists_pass_through() {
        let report = Report::new();
        with_context(&report, |ctx| {
            assert_eq!(ctx.firing_headers().as_slice(), &[0]);
            assert_eq!(ctx.firing_footers().as_slice(), &[0]);
        });
    }
}
