//! FILENAME: report-engine/src/run.rs
//! PURPOSE: Drives one report execution: rows in from the cursor, band
//! callbacks out to the renderer.
//! CONTEXT: The run borrows the report definition immutably and owns all
//! run-scoped state (group breaks, accumulators, caches), so a second run
//! cannot overlap the first on the same definition. Footers for a closing
//! group are issued against the previous row, which means the cursor has
//! to support stepping backwards one row.

use crate::aggregate::Aggregates;
use crate::breaks::{GroupBreaks, GroupIndexes};
use crate::context::RowContext;
use crate::error::EngineError;
use crate::renderer::{CancelToken, Renderer, RunOutcome};
use crate::resolve::{FormulaCache, Resolver};
use crate::script::ScriptEvaluator;
use chrono::{Local, NaiveDateTime};
use log::{debug, error};
use model::{DataCursor, DataSource, FormulaId, Report, SourceError, Value};
use rustc_hash::FxHashSet;

/// Everything one run owns and drops when it ends.
struct RunState {
    breaks: GroupBreaks,
    aggregates: Aggregates,
    cache: FormulaCache,
    warned: FxHashSet<FormulaId>,
    /// Wall clock at run start; every `{%report.date}` in the run agrees.
    run_date: NaiveDateTime,
}

impl RunState {
    fn new(report: &Report) -> Self {
        RunState {
            breaks: GroupBreaks::new(report.groups().len()),
            aggregates: Aggregates::collect(report),
            cache: FormulaCache::new(),
            warned: FxHashSet::default(),
            run_date: Local::now().naive_local(),
        }
    }
}

/// One execution of a report against its data source.
///
/// `run` consumes the builder, so run state can never leak into a second
/// execution. The renderer receives exactly one terminal callback: `end`
/// on success, `cancel` on cancellation or data failure.
pub struct ReportRun<'a> {
    report: &'a Report,
    source: &'a dyn DataSource,
    scripting: &'a mut dyn ScriptEvaluator,
    cancel: CancelToken,
}

impl<'a> ReportRun<'a> {
    pub fn new(
        report: &'a Report,
        source: &'a dyn DataSource,
        scripting: &'a mut dyn ScriptEvaluator,
    ) -> Self {
        ReportRun {
            report,
            source,
            scripting,
            cancel: CancelToken::new(),
        }
    }

    /// Shares a stop flag with the run. The flag is polled once per input
    /// row, so cancellation takes effect on a row boundary.
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Runs the report to completion, cancellation, or the first data
    /// error, whichever comes first.
    pub fn run(mut self, renderer: &mut dyn Renderer) -> Result<RunOutcome, EngineError> {
        let mut state = RunState::new(self.report);

        // The start formula runs for its side effects before any data is
        // read; whatever it caches is discarded.
        if let Some(id) = self.report.start_formula() {
            Resolver::new(
                self.report,
                self.source,
                &mut *self.scripting,
                &mut state.cache,
                &mut state.warned,
            )
            .dated(state.run_date)
            .evaluate_formula(id, None);
            state.cache.invalidate_all();
        }

        // A renderer that declines up front gets no callbacks at all.
        if !renderer.wants_more_data() {
            debug!("renderer declined data; run skipped");
            return Ok(RunOutcome::Completed);
        }

        debug!(
            "running report {:?}: {}",
            self.report.name(),
            self.source.query_text()
        );
        let mut cursor = match self.source.execute() {
            Ok(cursor) => cursor,
            Err(source) => {
                renderer.cancel();
                let err = self.data_error(source);
                error!("{err}");
                return Err(err);
            }
        };

        // Selectable positions are fixed for the life of one cursor.
        let group_indexes: Vec<Option<usize>> = self
            .report
            .groups()
            .iter()
            .map(|group| self.source.selectable_index(group.selectable()))
            .collect();

        let result = self.drive(&mut *cursor, renderer, &group_indexes, &mut state);

        // Terminal signal before teardown; `end` was already delivered on
        // the success path.
        match &result {
            Ok(RunOutcome::Cancelled) | Err(_) => renderer.cancel(),
            Ok(RunOutcome::Completed) => {}
        }
        if let Err(err) = &result {
            error!("{err}");
        }

        cursor.close();
        state.breaks.reset_all();
        state.cache.invalidate_all();
        result
    }

    fn drive(
        &mut self,
        cursor: &mut dyn DataCursor,
        renderer: &mut dyn Renderer,
        group_indexes: &[Option<usize>],
        state: &mut RunState,
    ) -> Result<RunOutcome, EngineError> {
        let mut started = false;
        let mut exhausted = false;

        while renderer.wants_more_data() {
            match cursor.next() {
                Ok(true) => {}
                Ok(false) => {
                    exhausted = true;
                    break;
                }
                Err(source) => return Err(self.data_error(source)),
            }

            if self.cancel.is_cancelled() {
                debug!("run cancelled at row {}", cursor.row_number());
                return Ok(RunOutcome::Cancelled);
            }

            if !started {
                started = true;
                self.with_context(
                    &*cursor,
                    state,
                    renderer.page_number(),
                    GroupIndexes::new(),
                    GroupIndexes::new(),
                    |ctx| renderer.start(ctx),
                );
            }

            self.process_row(cursor, renderer, group_indexes, state)?;
        }

        // Recall the last row so the closing bands read real data. On an
        // empty cursor this stays before the first row.
        if exhausted {
            cursor.previous().map_err(|e| self.data_error(e))?;
        }

        if !started {
            // No rows: the output still opens and closes.
            self.with_context(
                &*cursor,
                state,
                renderer.page_number(),
                GroupIndexes::new(),
                GroupIndexes::new(),
                |ctx| renderer.start(ctx),
            );
            self.with_context(
                &*cursor,
                state,
                renderer.page_number(),
                GroupIndexes::new(),
                GroupIndexes::new(),
                |ctx| renderer.end(ctx),
            );
            return Ok(RunOutcome::Completed);
        }

        // The closing sweep covers every group, innermost first, whether
        // or not its value changed on the last row.
        let footers = state.breaks.all_footers();
        self.with_context(
            &*cursor,
            state,
            renderer.page_number(),
            GroupIndexes::new(),
            footers,
            |ctx| renderer.group_footers(ctx, true),
        );
        self.with_context(
            &*cursor,
            state,
            renderer.page_number(),
            GroupIndexes::new(),
            GroupIndexes::new(),
            |ctx| renderer.end(ctx),
        );
        Ok(RunOutcome::Completed)
    }

    /// One cursor row: break detection, previous-row footers, counter and
    /// aggregate updates, then headers and detail.
    fn process_row(
        &mut self,
        cursor: &mut dyn DataCursor,
        renderer: &mut dyn Renderer,
        group_indexes: &[Option<usize>],
        state: &mut RunState,
    ) -> Result<(), EngineError> {
        state.cache.invalidate_all();
        state.breaks.advance(group_values(&*cursor, group_indexes));

        // Footers describe the group that just ended, so they are issued
        // against the previous row's data before this row is folded in.
        if !cursor.is_first() {
            cursor.previous().map_err(|e| self.data_error(e))?;
            let footers = state.breaks.firing_footers();
            self.with_context(
                &*cursor,
                state,
                renderer.page_number(),
                GroupIndexes::new(),
                footers,
                |ctx| renderer.group_footers(ctx, false),
            );
            cursor.next().map_err(|e| self.data_error(e))?;
            state.cache.invalidate_all();
        }

        state.breaks.update_counters();
        self.fold_aggregates(&*cursor, state, renderer.page_number());

        let is_last = cursor.is_last().map_err(|e| self.data_error(e))?;
        let headers = state.breaks.firing_headers();
        self.with_context(
            &*cursor,
            state,
            renderer.page_number(),
            headers,
            GroupIndexes::new(),
            |ctx| renderer.group_headers(ctx, is_last),
        );
        self.with_context(
            &*cursor,
            state,
            renderer.page_number(),
            GroupIndexes::new(),
            GroupIndexes::new(),
            |ctx| renderer.detail(ctx, is_last),
        );
        Ok(())
    }

    /// Folds the current row into every accumulator. Source fields resolve
    /// with the same rules as rendered fields, in their own section.
    fn fold_aggregates(&mut self, cursor: &dyn DataCursor, state: &mut RunState, page: u32) {
        let mut resolver = Resolver::new(
            self.report,
            self.source,
            &mut *self.scripting,
            &mut state.cache,
            &mut state.warned,
        )
        .with_row(cursor, &state.breaks)
        .dated(state.run_date)
        .at_page(page);
        state.aggregates.update_row(&state.breaks, |kind, section| {
            resolver.value_of_kind(kind, Some(section))
        });
    }

    /// Builds the row context handed to one renderer callback.
    fn with_context<F>(
        &mut self,
        cursor: &dyn DataCursor,
        state: &mut RunState,
        page: u32,
        headers: GroupIndexes,
        footers: GroupIndexes,
        body: F,
    ) where
        F: FnOnce(&mut RowContext<'_>),
    {
        let resolver = Resolver::new(
            self.report,
            self.source,
            &mut *self.scripting,
            &mut state.cache,
            &mut state.warned,
        )
        .with_row(cursor, &state.breaks)
        .dated(state.run_date)
        .at_page(page);
        let mut ctx = RowContext::new(resolver, &state.aggregates, headers, footers);
        body(&mut ctx);
    }

    fn data_error(&self, source: SourceError) -> EngineError {
        EngineError::data(self.source.query_text(), source)
    }
}

/// Runs a report end to end with default options.
pub fn run_once(
    report: &Report,
    source: &dyn DataSource,
    scripting: &mut dyn ScriptEvaluator,
    renderer: &mut dyn Renderer,
) -> Result<RunOutcome, EngineError> {
    ReportRun::new(report, source, scripting).run(renderer)
}

fn group_values(cursor: &dyn DataCursor, group_indexes: &[Option<usize>]) -> Vec<Value> {
    group_indexes
        .iter()
        .map(|index| match index {
            Some(i) => cursor.value_at(*i),
            None => Value::Null,
        })
        .collect()
}
