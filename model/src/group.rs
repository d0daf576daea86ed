//! FILENAME: model/src/group.rs
//! PURPOSE: Definition of one grouping level: what it breaks on and the
//! header/footer bands it prints around each run of equal values.
//! CONTEXT: Whether the value just changed, how many records the current
//! value has seen, and so on is run state and lives with the run, not
//! here. Nesting is positional: a group's depth is its index in the
//! report's group list, outermost first.

use crate::section::{AreaKind, SectionArea};
use crate::source::SelectableRef;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    selectable: SelectableRef,
    sort: SortOrder,
    headers: SectionArea,
    footers: SectionArea,
}

impl Group {
    pub fn new(selectable: SelectableRef) -> Self {
        Group {
            selectable,
            sort: SortOrder::Ascending,
            headers: SectionArea::new(AreaKind::GroupHeader),
            footers: SectionArea::new(AreaKind::GroupFooter),
        }
    }

    pub fn selectable(&self) -> &SelectableRef {
        &self.selectable
    }

    pub fn set_selectable(&mut self, selectable: SelectableRef) {
        self.selectable = selectable;
    }

    pub fn sort(&self) -> SortOrder {
        self.sort
    }

    pub fn set_sort(&mut self, sort: SortOrder) {
        self.sort = sort;
    }

    pub fn headers(&self) -> &SectionArea {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut SectionArea {
        &mut self.headers
    }

    pub fn footers(&self) -> &SectionArea {
        &self.footers
    }

    pub fn footers_mut(&mut self) -> &mut SectionArea {
        &mut self.footers
    }
}
