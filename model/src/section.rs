//! FILENAME: model/src/section.rs
//! PURPOSE: Bands and the ordered areas that own them.
//! CONTEXT: A section never knows about rows or cursors; it is definition
//! data plus enough bookkeeping (owning-area stamp, positional index) for
//! editors to move sections around and undo the move exactly.

use crate::error::ModelError;
use crate::expr::FormulaId;
use crate::field::Field;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The seven kinds of band a report can print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AreaKind {
    ReportHeader,
    PageHeader,
    GroupHeader,
    Detail,
    GroupFooter,
    PageFooter,
    ReportFooter,
}

impl AreaKind {
    pub fn name(self) -> &'static str {
        match self {
            AreaKind::ReportHeader => "report header",
            AreaKind::PageHeader => "page header",
            AreaKind::GroupHeader => "group header",
            AreaKind::Detail => "detail",
            AreaKind::GroupFooter => "group footer",
            AreaKind::PageFooter => "page footer",
            AreaKind::ReportFooter => "report footer",
        }
    }
}

impl fmt::Display for AreaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Straight line drawn inside a section, in report units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
    pub thickness: f64,
}

/// Decides whether a section is skipped. A section prints only when the
/// unconditional flag is off and the optional formula does not evaluate
/// to true; the formula evaluation itself happens at run time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Suppression {
    pub hidden: bool,
    pub formula: Option<FormulaId>,
}

impl Suppression {
    /// True when the section is hidden regardless of row data.
    pub fn hides_unconditionally(&self) -> bool {
        self.hidden
    }
}

/// One band: a display-ordered list of fields and lines with a minimum
/// height and a suppression predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    id: u64,
    min_height: f64,
    fields: Vec<Field>,
    lines: Vec<Line>,
    page_break_before: bool,
    suppression: Suppression,
    area: Option<AreaKind>,
}

impl Section {
    pub fn new(id: u64, min_height: f64) -> Self {
        Section {
            id,
            min_height,
            fields: Vec::new(),
            lines: Vec::new(),
            page_break_before: false,
            suppression: Suppression::default(),
            area: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn min_height(&self) -> f64 {
        self.min_height
    }

    pub fn set_min_height(&mut self, height: f64) {
        self.min_height = height;
    }

    /// Output height: the minimum height or the lowest field's bottom
    /// edge, whichever is larger.
    pub fn height(&self) -> f64 {
        self.fields
            .iter()
            .map(|f| f.bounds().y + f.bounds().height)
            .fold(self.min_height, f64::max)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut Vec<Field> {
        &mut self.fields
    }

    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn add_line(&mut self, line: Line) {
        self.lines.push(line);
    }

    pub fn page_break_before(&self) -> bool {
        self.page_break_before
    }

    pub fn set_page_break_before(&mut self, flag: bool) {
        self.page_break_before = flag;
    }

    pub fn suppression(&self) -> &Suppression {
        &self.suppression
    }

    pub fn suppression_mut(&mut self) -> &mut Suppression {
        &mut self.suppression
    }

    /// Kind of the area this section currently belongs to, if any. Set by
    /// the owning area on insertion and cleared on removal.
    pub fn area(&self) -> Option<AreaKind> {
        self.area
    }
}

/// Ordered collection of sections of one kind. All mutation goes through
/// the area so the owning-area stamp on each section stays accurate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionArea {
    kind: AreaKind,
    sections: Vec<Section>,
}

impl SectionArea {
    pub fn new(kind: AreaKind) -> Self {
        SectionArea {
            kind,
            sections: Vec::new(),
        }
    }

    pub fn kind(&self) -> AreaKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn first(&self) -> Option<&Section> {
        self.sections.first()
    }

    pub fn get(&self, id: u64) -> Option<&Section> {
        self.sections.iter().find(|s| s.id() == id)
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.id() == id)
    }

    pub fn index_of(&self, id: u64) -> Option<usize> {
        self.sections.iter().position(|s| s.id() == id)
    }

    /// Whether removing this section would leave the area empty.
    pub fn is_sole_member(&self, id: u64) -> bool {
        self.sections.len() == 1 && self.sections[0].id() == id
    }

    /// Appends a section, stamping its owning-area kind.
    pub fn add(&mut self, mut section: Section) {
        section.area = Some(self.kind);
        self.sections.push(section);
    }

    /// Inserts at an exact position (clamped to the end), stamping the
    /// owning-area kind. Positional insert exists so an editor can undo a
    /// removal by putting the section back exactly where it was.
    pub fn insert(&mut self, index: usize, mut section: Section) {
        section.area = Some(self.kind);
        let index = index.min(self.sections.len());
        self.sections.insert(index, section);
    }

    /// Inserts directly after the section with the given id.
    pub fn insert_after(&mut self, after: u64, section: Section) -> Result<(), ModelError> {
        let index = self
            .index_of(after)
            .ok_or(ModelError::SectionNotInArea(after))?;
        self.insert(index + 1, section);
        Ok(())
    }

    /// Removes and returns a section, clearing its owning-area stamp.
    pub fn remove(&mut self, id: u64) -> Result<Section, ModelError> {
        let index = self
            .index_of(id)
            .ok_or(ModelError::SectionNotInArea(id))?;
        let mut section = self.sections.remove(index);
        section.area = None;
        Ok(section)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Section> {
        self.sections.iter_mut()
    }
}
