//! FILENAME: report-engine/src/renderer.rs
//! PURPOSE: The output seam. A `Renderer` receives band callbacks in run
//! order and turns them into pages, files, or assertions.
//! CONTEXT: The run drives the renderer through one `start`, a stream of
//! header/detail/footer bands, and exactly one terminal `end` or `cancel`.
//! Renderers that paginate keep their own page counter; the engine reads
//! it back through `page_number` so `{%page.number}` stays honest.

use crate::context::RowContext;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// How a run ended when it did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunOutcome {
    /// The cursor was drained (or the renderer stopped asking) and `end`
    /// was delivered.
    Completed,
    /// A `CancelToken` fired mid-run and `cancel` was delivered.
    Cancelled,
}

/// Cooperative stop flag shared between a run and whoever owns it.
///
/// Clones share one flag. The run polls it at most once per input row,
/// so cancellation lands on a row boundary, never mid-band.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the run to stop at the next row boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// Receiver for the band protocol of a single run.
///
/// Callback order for a cursor of N rows: `start` once (lazily, before
/// the first band; a 0-row run still gets it), then per row any firing
/// `group_footers` for the previous row, `group_headers`, and `detail`,
/// then one forced `group_footers` sweep and `end`. Cancellation and
/// data errors replace `end` with `cancel`. The context names which
/// groups fire; renderers replay sections and ask it for field values.
pub trait Renderer {
    /// Polled before the cursor opens and before each row. Returning
    /// false up front skips the run entirely; returning false mid-run
    /// ends it after the usual closing bands.
    fn wants_more_data(&self) -> bool {
        true
    }

    /// First callback of a run.
    fn start(&mut self, ctx: &mut RowContext<'_>);

    /// Page boundary. The engine never calls this; paginating renderers
    /// invoke it on themselves when a page fills, and it lives here so
    /// page-driven implementations share one signature.
    fn start_page(&mut self) {}

    /// Headers for the groups named by `ctx.firing_headers()`, outermost
    /// first. `is_last_row` is true when the current row is the final one.
    fn group_headers(&mut self, ctx: &mut RowContext<'_>, is_last_row: bool);

    /// The detail band for the current row.
    fn detail(&mut self, ctx: &mut RowContext<'_>, is_last_row: bool);

    /// Footers for the groups named by `ctx.firing_footers()`, innermost
    /// first. `forced` is true only for the closing sweep after the last
    /// row, which covers every group regardless of value changes.
    fn group_footers(&mut self, ctx: &mut RowContext<'_>, forced: bool);

    /// Last callback of a successful run.
    fn end(&mut self, ctx: &mut RowContext<'_>);

    /// Terminal signal replacing `end` after cancellation or a data
    /// error. No context: the cursor may already be unusable.
    fn cancel(&mut self);

    /// The page the renderer is currently filling. Substitution snapshots
    /// this before every callback to serve `{%page.number}`.
    fn page_number(&self) -> u32 {
        1
    }
}
