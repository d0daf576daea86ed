//! FILENAME: report-engine/src/breaks.rs
//! PURPOSE: Watches group values row to row and decides which headers and
//! footers fire.
//! CONTEXT: One `GroupState` per group, owned by the run and dropped with
//! it. A parent group starting a new value forces every nested group to
//! break too, so the set of breaking groups is always a suffix of the
//! group list: headers replay outermost first, footers unwind innermost
//! first.

use model::Value;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Firing lists are tiny; reports rarely nest more than a few groups.
pub type GroupIndexes = SmallVec<[usize; 4]>;

/// Break state for one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupState {
    /// Most recently observed value. `None` until the first row; a null
    /// row value is still a value and compares equal to itself.
    value: Option<Value>,
    new_value: bool,
    first_value: bool,
    record_count: u64,
}

impl Default for GroupState {
    fn default() -> Self {
        GroupState::new()
    }
}

impl GroupState {
    pub fn new() -> Self {
        GroupState {
            value: None,
            new_value: true,
            first_value: true,
            record_count: 1,
        }
    }

    /// Feeds the group's value for the current row and reclassifies the
    /// break flags.
    pub fn observe(&mut self, value: Value) {
        match &self.value {
            None => {
                self.new_value = true;
                self.first_value = true;
            }
            Some(prev) if *prev == value => {
                self.new_value = false;
                self.first_value = false;
            }
            Some(_) => {
                self.new_value = true;
                self.first_value = false;
            }
        }
        self.value = Some(value);
    }

    /// Marks the group as breaking without touching the stored value.
    /// Used when a parent group breaks.
    pub fn force_new_value(&mut self) {
        self.new_value = true;
    }

    /// Advances the record count for the current row: back to 1 on a new
    /// value, else one more row of the same value.
    pub fn update_counter(&mut self) {
        if self.new_value {
            self.record_count = 1;
        } else {
            self.record_count += 1;
        }
    }

    /// Returns to the pre-run state.
    pub fn reset(&mut self) {
        self.value = None;
        self.new_value = true;
        self.first_value = true;
        self.record_count = 1;
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn is_new_value(&self) -> bool {
        self.new_value
    }

    pub fn is_first_value(&self) -> bool {
        self.first_value
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }
}

/// All group states for one run, outermost first, with the parent-forces-
/// child cascade applied whenever a row is observed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupBreaks {
    states: Vec<GroupState>,
}

impl GroupBreaks {
    pub fn new(group_count: usize) -> Self {
        GroupBreaks {
            states: vec![GroupState::new(); group_count],
        }
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn state(&self, index: usize) -> &GroupState {
        &self.states[index]
    }

    /// Observes one row's group values (outermost first) and cascades
    /// breaks: every group nested inside a breaking group breaks too.
    pub fn advance(&mut self, values: Vec<Value>) {
        debug_assert_eq!(values.len(), self.states.len());
        for (state, value) in self.states.iter_mut().zip(values) {
            state.observe(value);
        }
        let mut parent_broke = false;
        for state in &mut self.states {
            if parent_broke {
                state.force_new_value();
            }
            parent_broke = parent_broke || state.is_new_value();
        }
    }

    pub fn update_counters(&mut self) {
        for state in &mut self.states {
            state.update_counter();
        }
    }

    pub fn reset_all(&mut self) {
        for state in &mut self.states {
            state.reset();
        }
    }

    /// Groups whose headers fire for the current row, outermost first.
    pub fn firing_headers(&self) -> GroupIndexes {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_new_value())
            .map(|(i, _)| i)
            .collect()
    }

    /// Groups whose footers fire before the current row's headers,
    /// innermost first.
    pub fn firing_footers(&self) -> GroupIndexes {
        let mut indexes = self.firing_headers();
        indexes.reverse();
        indexes
    }

    /// Every group, innermost first, for the forced footers that close
    /// out the run.
    pub fn all_footers(&self) -> GroupIndexes {
        (0..self.states.len()).rev().collect()
    }
}
