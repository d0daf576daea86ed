//! FILENAME: report-engine/src/aggregate.rs
//! PURPOSE: Incremental accumulators behind aggregate fields: fold every
//! row once, answer any of the supported functions at any time.
//! CONTEXT: Aggregates are run state. They are collected from the report
//! definition at run start, updated once per row after break detection,
//! and dropped when the run ends. A group-scoped accumulator restarts
//! whenever its group breaks; at footer time it still holds the closing
//! group's total because the row that broke the group has not been folded
//! yet.

use crate::breaks::GroupBreaks;
use log::warn;
use model::{AggregateFunction, AggregateScope, FieldKind, Report, Value};
use serde::{Deserialize, Serialize};

/// Running fold over a stream of numbers. One pass, O(1) per row, able to
/// answer every supported function; the mean/m2 pair keeps the standard
/// deviation numerically stable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Accumulator {
    count: u64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
    mean: f64,
    m2: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Accumulator::default()
    }

    pub fn add(&mut self, x: f64) {
        self.min = Some(self.min.map_or(x, |m| m.min(x)));
        self.max = Some(self.max.map_or(x, |m| m.max(x)));
        self.count += 1;
        self.sum += x;

        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn reset(&mut self) {
        *self = Accumulator::default();
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Current value of one aggregate function. An empty accumulator
    /// answers 0 for every function.
    pub fn compute(&self, function: AggregateFunction) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        match function {
            AggregateFunction::Sum => self.sum,
            AggregateFunction::Count => self.count as f64,
            AggregateFunction::Average => self.sum / self.count as f64,
            AggregateFunction::Min => self.min.unwrap_or(0.0),
            AggregateFunction::Max => self.max.unwrap_or(0.0),
            AggregateFunction::StdDev => {
                // Sample deviation; a single row has none
                if self.count < 2 {
                    0.0
                } else {
                    (self.m2 / (self.count - 1) as f64).sqrt()
                }
            }
        }
    }
}

/// Run state for one aggregate field.
#[derive(Debug, Clone)]
struct AggregateState {
    /// Id of the aggregate field itself.
    field_id: u64,
    /// What gets folded each row.
    source: FieldKind,
    /// Section holding the source field; formula sources evaluate in it.
    source_section: u64,
    function: AggregateFunction,
    scope: AggregateScope,
    acc: Accumulator,
}

/// Every aggregate field in the report, collected once per run.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    states: Vec<AggregateState>,
}

impl Aggregates {
    /// Walks the report in display order and builds one accumulator per
    /// aggregate field. An aggregate naming a missing field is skipped
    /// with a warning instead of failing the run.
    pub fn collect(report: &Report) -> Self {
        let mut states = Vec::new();
        for (_, section) in report.sections_in_display_order() {
            for field in section.fields() {
                if let FieldKind::Aggregate {
                    field: source_id,
                    function,
                    scope,
                } = *field.kind()
                {
                    match find_source(report, source_id) {
                        Some((source, source_section)) => states.push(AggregateState {
                            field_id: field.id(),
                            source,
                            source_section,
                            function,
                            scope,
                            acc: Accumulator::new(),
                        }),
                        None => warn!(
                            "aggregate field {} folds unknown field {}; skipping it",
                            field.id(),
                            source_id
                        ),
                    }
                }
            }
        }
        Aggregates { states }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Folds the current row into every accumulator, restarting any
    /// group-scoped accumulator whose group just broke. `value_of` gets
    /// the folded field's kind plus the id of the section holding it, so
    /// formula sources evaluate against their own section. Values fold
    /// through their lossy numeric form, so a null counts as 0.
    pub fn update_row<F>(&mut self, breaks: &GroupBreaks, mut value_of: F)
    where
        F: FnMut(&FieldKind, u64) -> Value,
    {
        for state in &mut self.states {
            if let AggregateScope::Group(index) = state.scope {
                if index < breaks.len() && breaks.state(index).is_new_value() {
                    state.acc.reset();
                }
            }
            let value = value_of(&state.source, state.source_section);
            state.acc.add(value.to_number_lossy());
        }
    }

    /// Current value of the aggregate field with this id.
    pub fn value_of_field(&self, aggregate_field_id: u64) -> Option<Value> {
        self.states
            .iter()
            .find(|s| s.field_id == aggregate_field_id)
            .map(|s| Value::Number(s.acc.compute(s.function)))
    }

    pub fn reset_all(&mut self) {
        for state in &mut self.states {
            state.acc.reset();
        }
    }
}

fn find_source(report: &Report, field_id: u64) -> Option<(FieldKind, u64)> {
    for (_, section) in report.sections_in_display_order() {
        for field in section.fields() {
            if field.id() == field_id {
                return Some((field.kind().clone(), section.id()));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::{AreaPath, Field, Group, Rect, Section, SelectableRef};

    // ========================================================================
    // ACCUMULATOR MATH
    // ========================================================================

    #[test]
    fn test_basic_functions() {
        let mut acc = Accumulator::new();
        acc.add(10.0);
        acc.add(5.0);

        assert_eq!(acc.compute(AggregateFunction::Sum), 15.0);
        assert_eq!(acc.compute(AggregateFunction::Count), 2.0);
        assert_eq!(acc.compute(AggregateFunction::Average), 7.5);
        assert_eq!(acc.compute(AggregateFunction::Min), 5.0);
        assert_eq!(acc.compute(AggregateFunction::Max), 10.0);
    }

    #[test]
    fn test_sample_standard_deviation() {
        let mut acc = Accumulator::new();
        for x in [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0] {
            acc.add(x);
        }
        // Squared deviations sum to 32 over n-1 = 7
        let expected = (32.0f64 / 7.0).sqrt();
        assert!((acc.compute(AggregateFunction::StdDev) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_empty_and_single_row_edge_cases() {
        let acc = Accumulator::new();
        assert_eq!(acc.compute(AggregateFunction::Sum), 0.0);
        assert_eq!(acc.compute(AggregateFunction::Min), 0.0);
        assert_eq!(acc.compute(AggregateFunction::Average), 0.0);

        let mut one = Accumulator::new();
        one.add(42.0);
        assert_eq!(one.compute(AggregateFunction::StdDev), 0.0);
        assert_eq!(one.compute(AggregateFunction::Min), 42.0);
    }

    #[test]
    fn test_negative_values_drive_min() {
        let mut acc = Accumulator::new();
        acc.add(3.0);
        acc.add(-8.0);
        assert_eq!(acc.compute(AggregateFunction::Min), -8.0);
        assert_eq!(acc.compute(AggregateFunction::Max), 3.0);
    }

    // ========================================================================
    // COLLECTION AND PER-ROW FOLDING
    // ========================================================================

    /// One group on "dept"; detail field 1 shows the sales column, group
    /// footer field 2 sums it over the group, report footer field 3 sums
    /// it over the whole run.
    fn grouped_report() -> Report {
        let mut report = Report::new();
        report.add_group(Group::new(SelectableRef::Column("dept".into())));

        let mut detail = Section::new(1, 20.0);
        detail.add_field(Field::new(
            1,
            Rect::default(),
            FieldKind::Column("sales".into()),
        ));
        report.area_mut(AreaPath::Details).unwrap().add(detail);

        let mut footer = Section::new(2, 20.0);
        footer.add_field(Field::new(
            2,
            Rect::default(),
            FieldKind::Aggregate {
                field: 1,
                function: AggregateFunction::Sum,
                scope: AggregateScope::Group(0),
            },
        ));
        report
            .area_mut(AreaPath::GroupFooters(0))
            .unwrap()
            .add(footer);

        let mut grand = Section::new(3, 20.0);
        grand.add_field(Field::new(
            3,
            Rect::default(),
            FieldKind::Aggregate {
                field: 1,
                function: AggregateFunction::Sum,
                scope: AggregateScope::Report,
            },
        ));
        report.area_mut(AreaPath::ReportFooters).unwrap().add(grand);
        report
    }

    #[test]
    fn test_collect_finds_every_aggregate() {
        let report = grouped_report();
        let aggregates = Aggregates::collect(&report);
        assert_eq!(aggregates.len(), 2);
        assert_eq!(aggregates.value_of_field(2), Some(Value::Number(0.0)));
        assert_eq!(aggregates.value_of_field(1), None);
    }

    #[test]
    fn test_group_scope_resets_on_break_and_report_scope_does_not() {
        let report = grouped_report();
        let mut aggregates = Aggregates::collect(&report);
        let mut breaks = GroupBreaks::new(1);

        // Rows: A:10, A:5, B:7. The fold sees the row value through the
        // same closure the run loop uses.
        let rows = [("A", 10.0), ("A", 5.0), ("B", 7.0)];
        let mut group_totals = Vec::new();
        for (dept, sales) in rows {
            breaks.advance(vec![Value::from(dept)]);
            aggregates.update_row(&breaks, |_, _| Value::from(sales));
            group_totals.push(aggregates.value_of_field(2).unwrap());
        }

        // Dept A accumulated 15, then B restarted at 7
        assert_eq!(group_totals[1], Value::Number(15.0));
        assert_eq!(group_totals[2], Value::Number(7.0));
        assert_eq!(aggregates.value_of_field(3), Some(Value::Number(22.0)));
    }

    #[test]
    fn test_null_rows_fold_as_zero() {
        let report = grouped_report();
        let mut aggregates = Aggregates::collect(&report);
        let mut breaks = GroupBreaks::new(1);

        breaks.advance(vec![Value::from("A")]);
        aggregates.update_row(&breaks, |_, _| Value::Null);
        breaks.advance(vec![Value::from("A")]);
        aggregates.update_row(&breaks, |_, _| Value::from(6.0));

        assert_eq!(aggregates.value_of_field(2), Some(Value::Number(6.0)));
    }

    #[test]
    fn test_reset_all_returns_to_zero() {
        let report = grouped_report();
        let mut aggregates = Aggregates::collect(&report);
        let mut breaks = GroupBreaks::new(1);
        breaks.advance(vec![Value::from("A")]);
        aggregates.update_row(&breaks, |_, _| Value::from(9.0));

        aggregates.reset_all();
        assert_eq!(aggregates.value_of_field(3), Some(Value::Number(0.0)));
    }
}
