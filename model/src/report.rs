//! FILENAME: model/src/report.rs
//! PURPOSE: The report definition root: metadata, the id-keyed registries
//! of formulas, parameters, and user columns, the groups, the section
//! areas, and the dependency edges between expressions.
//! CONTEXT: Everything here is definition state shared by editors and the
//! run loop. Run state (break detection, accumulators, caches) lives with
//! the run. Text is stored in storage form (id placeholders); display
//! form (name placeholders) exists only at the editing boundary, through
//! the conversion methods below.
//!
//! DEPENDENCY TRACKING:
//! Edges are rebuilt lazily. Editing an expression only marks it dirty,
//! so text may legally reference objects that do not exist yet; the edges
//! are scanned and cycles detected the next time `dependencies()` (or
//! anything built on it) is called.

use crate::dependency::DependencyGraph;
use crate::error::ModelError;
use crate::expr::{parse_id, Formula, FormulaId, ObjectRef, ParameterId, UserColumn, UserColumnId};
use crate::group::Group;
use crate::parameter::{Arity, Parameter, ParameterType};
use crate::section::{AreaKind, Section, SectionArea};
use parser::PlaceholderKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Path to one section area within a report. Group areas are addressed by
/// the group's position, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AreaPath {
    ReportHeaders,
    PageHeaders,
    GroupHeaders(usize),
    Details,
    GroupFooters(usize),
    ReportFooters,
    PageFooters,
}

impl AreaPath {
    pub fn kind(self) -> AreaKind {
        match self {
            AreaPath::ReportHeaders => AreaKind::ReportHeader,
            AreaPath::PageHeaders => AreaKind::PageHeader,
            AreaPath::GroupHeaders(_) => AreaKind::GroupHeader,
            AreaPath::Details => AreaKind::Detail,
            AreaPath::GroupFooters(_) => AreaKind::GroupFooter,
            AreaPath::ReportFooters => AreaKind::ReportFooter,
            AreaPath::PageFooters => AreaKind::PageFooter,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Report {
    name: String,
    title: String,
    author: String,
    description: String,
    start_formula: Option<FormulaId>,
    default_language: Option<String>,

    formulas: BTreeMap<FormulaId, Formula>,
    parameters: BTreeMap<ParameterId, Parameter>,
    user_columns: BTreeMap<UserColumnId, UserColumn>,

    groups: Vec<Group>,
    report_headers: SectionArea,
    report_footers: SectionArea,
    page_headers: SectionArea,
    page_footers: SectionArea,
    details: SectionArea,

    #[serde(skip)]
    graph: DependencyGraph,
    /// Expressions whose edges are stale and need a rescan.
    #[serde(skip)]
    dirty: HashSet<ObjectRef>,
    /// False until the first full scan. A restored report arrives with no
    /// edges at all, so the first rebuild scans every expression.
    #[serde(skip)]
    scanned: bool,
}

impl Default for Report {
    fn default() -> Self {
        Report::new()
    }
}

impl Report {
    pub fn new() -> Self {
        Report {
            name: String::new(),
            title: String::new(),
            author: String::new(),
            description: String::new(),
            start_formula: None,
            default_language: None,
            formulas: BTreeMap::new(),
            parameters: BTreeMap::new(),
            user_columns: BTreeMap::new(),
            groups: Vec::new(),
            report_headers: SectionArea::new(AreaKind::ReportHeader),
            report_footers: SectionArea::new(AreaKind::ReportFooter),
            page_headers: SectionArea::new(AreaKind::PageHeader),
            page_footers: SectionArea::new(AreaKind::PageFooter),
            details: SectionArea::new(AreaKind::Detail),
            graph: DependencyGraph::new(),
            dirty: HashSet::new(),
            scanned: false,
        }
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.author = author.into();
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    /// Formula evaluated once before the first row, for side effects such
    /// as seeding script state.
    pub fn start_formula(&self) -> Option<FormulaId> {
        self.start_formula
    }

    pub fn set_start_formula(&mut self, id: Option<FormulaId>) {
        self.start_formula = id;
    }

    /// Scripting language for formulas without their own tag. `None`
    /// defers to the process-wide default.
    pub fn default_language(&self) -> Option<&str> {
        self.default_language.as_deref()
    }

    pub fn set_default_language(&mut self, language: Option<String>) {
        self.default_language = language;
    }

    // ------------------------------------------------------------------
    // Formula registry
    // ------------------------------------------------------------------

    /// Registers a formula under the next free id and returns the id.
    pub fn add_formula(&mut self, name: impl Into<String>, text: impl Into<String>) -> FormulaId {
        let id = next_id(&self.formulas);
        self.formulas.insert(id, Formula::new(id, name, text));
        self.dirty.insert(ObjectRef::Formula(id));
        id
    }

    pub fn add_formula_with_language(
        &mut self,
        name: impl Into<String>,
        text: impl Into<String>,
        language: impl Into<String>,
    ) -> FormulaId {
        let id = self.add_formula(name, text);
        if let Some(f) = self.formulas.get_mut(&id) {
            f.set_language(Some(language.into()));
        }
        id
    }

    pub fn formula(&self, id: FormulaId) -> Result<&Formula, ModelError> {
        self.formulas
            .get(&id)
            .ok_or_else(|| ModelError::NoSuchFormula(id.to_string()))
    }

    pub fn formula_by_name(&self, name: &str) -> Option<&Formula> {
        self.formulas
            .values()
            .find(|f| f.name().eq_ignore_ascii_case(name))
    }

    pub fn formulas(&self) -> impl Iterator<Item = &Formula> {
        self.formulas.values()
    }

    pub fn set_formula_name(
        &mut self,
        id: FormulaId,
        name: impl Into<String>,
    ) -> Result<(), ModelError> {
        self.formulas
            .get_mut(&id)
            .ok_or_else(|| ModelError::NoSuchFormula(id.to_string()))?
            .set_name(name);
        Ok(())
    }

    pub fn set_formula_text(
        &mut self,
        id: FormulaId,
        text: impl Into<String>,
    ) -> Result<(), ModelError> {
        self.formulas
            .get_mut(&id)
            .ok_or_else(|| ModelError::NoSuchFormula(id.to_string()))?
            .set_text(text);
        self.dirty.insert(ObjectRef::Formula(id));
        Ok(())
    }

    pub fn set_formula_language(
        &mut self,
        id: FormulaId,
        language: Option<String>,
    ) -> Result<(), ModelError> {
        self.formulas
            .get_mut(&id)
            .ok_or_else(|| ModelError::NoSuchFormula(id.to_string()))?
            .set_language(language);
        Ok(())
    }

    pub fn remove_formula(&mut self, id: FormulaId) -> Result<Formula, ModelError> {
        let formula = self
            .formulas
            .remove(&id)
            .ok_or_else(|| ModelError::NoSuchFormula(id.to_string()))?;
        let obj = ObjectRef::Formula(id);
        self.graph.clear_dependencies(obj);
        self.dirty.remove(&obj);
        if self.start_formula == Some(id) {
            self.start_formula = None;
        }
        Ok(formula)
    }

    // ------------------------------------------------------------------
    // Parameter registry
    // ------------------------------------------------------------------

    /// Registers a parameter, failing on an illegal type+arity pairing.
    pub fn add_parameter(
        &mut self,
        name: impl Into<String>,
        question: impl Into<String>,
        param_type: ParameterType,
        arity: Arity,
    ) -> Result<ParameterId, ModelError> {
        let id = next_id(&self.parameters);
        let param = Parameter::new(id, name, question, param_type, arity)?;
        self.parameters.insert(id, param);
        Ok(id)
    }

    pub fn parameter(&self, id: ParameterId) -> Result<&Parameter, ModelError> {
        self.parameters
            .get(&id)
            .ok_or_else(|| ModelError::NoSuchParameter(id.to_string()))
    }

    pub fn parameter_by_name(&self, name: &str) -> Option<&Parameter> {
        self.parameters
            .values()
            .find(|p| p.name().eq_ignore_ascii_case(name))
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.values()
    }

    /// Supplies the values the user answered for this run. Value changes
    /// never alter dependency edges, so nothing is marked dirty.
    pub fn set_parameter_values(
        &mut self,
        id: ParameterId,
        values: Vec<crate::value::Value>,
    ) -> Result<(), ModelError> {
        self.parameters
            .get_mut(&id)
            .ok_or_else(|| ModelError::NoSuchParameter(id.to_string()))?
            .set_values(values);
        Ok(())
    }

    pub fn set_parameter_defaults(
        &mut self,
        id: ParameterId,
        values: Vec<crate::value::Value>,
    ) -> Result<(), ModelError> {
        self.parameters
            .get_mut(&id)
            .ok_or_else(|| ModelError::NoSuchParameter(id.to_string()))?
            .set_default_values(values);
        Ok(())
    }

    pub fn set_parameter_type(
        &mut self,
        id: ParameterId,
        param_type: ParameterType,
    ) -> Result<(), ModelError> {
        self.parameters
            .get_mut(&id)
            .ok_or_else(|| ModelError::NoSuchParameter(id.to_string()))?
            .set_type(param_type);
        Ok(())
    }

    pub fn set_parameter_arity(&mut self, id: ParameterId, arity: Arity) -> Result<(), ModelError> {
        self.parameters
            .get_mut(&id)
            .ok_or_else(|| ModelError::NoSuchParameter(id.to_string()))?
            .set_arity(arity)
    }

    pub fn remove_parameter(&mut self, id: ParameterId) -> Result<Parameter, ModelError> {
        self.parameters
            .remove(&id)
            .ok_or_else(|| ModelError::NoSuchParameter(id.to_string()))
    }

    // ------------------------------------------------------------------
    // User column registry
    // ------------------------------------------------------------------

    pub fn add_user_column(
        &mut self,
        name: impl Into<String>,
        text: impl Into<String>,
    ) -> UserColumnId {
        let id = next_id(&self.user_columns);
        self.user_columns.insert(id, UserColumn::new(id, name, text));
        self.dirty.insert(ObjectRef::UserColumn(id));
        id
    }

    pub fn user_column(&self, id: UserColumnId) -> Result<&UserColumn, ModelError> {
        self.user_columns
            .get(&id)
            .ok_or_else(|| ModelError::NoSuchUserColumn(id.to_string()))
    }

    pub fn user_column_by_name(&self, name: &str) -> Option<&UserColumn> {
        self.user_columns
            .values()
            .find(|u| u.name().eq_ignore_ascii_case(name))
    }

    pub fn user_columns(&self) -> impl Iterator<Item = &UserColumn> {
        self.user_columns.values()
    }

    pub fn set_user_column_text(
        &mut self,
        id: UserColumnId,
        text: impl Into<String>,
    ) -> Result<(), ModelError> {
        self.user_columns
            .get_mut(&id)
            .ok_or_else(|| ModelError::NoSuchUserColumn(id.to_string()))?
            .set_text(text);
        self.dirty.insert(ObjectRef::UserColumn(id));
        Ok(())
    }

    pub fn remove_user_column(&mut self, id: UserColumnId) -> Result<UserColumn, ModelError> {
        let col = self
            .user_columns
            .remove(&id)
            .ok_or_else(|| ModelError::NoSuchUserColumn(id.to_string()))?;
        let obj = ObjectRef::UserColumn(id);
        self.graph.clear_dependencies(obj);
        self.dirty.remove(&obj);
        Ok(col)
    }

    // ------------------------------------------------------------------
    // Groups and section areas
    // ------------------------------------------------------------------

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut Vec<Group> {
        &mut self.groups
    }

    pub fn add_group(&mut self, group: Group) {
        self.groups.push(group);
    }

    pub fn area(&self, path: AreaPath) -> Option<&SectionArea> {
        match path {
            AreaPath::ReportHeaders => Some(&self.report_headers),
            AreaPath::PageHeaders => Some(&self.page_headers),
            AreaPath::GroupHeaders(i) => self.groups.get(i).map(|g| g.headers()),
            AreaPath::Details => Some(&self.details),
            AreaPath::GroupFooters(i) => self.groups.get(i).map(|g| g.footers()),
            AreaPath::ReportFooters => Some(&self.report_footers),
            AreaPath::PageFooters => Some(&self.page_footers),
        }
    }

    pub fn area_mut(&mut self, path: AreaPath) -> Option<&mut SectionArea> {
        match path {
            AreaPath::ReportHeaders => Some(&mut self.report_headers),
            AreaPath::PageHeaders => Some(&mut self.page_headers),
            AreaPath::GroupHeaders(i) => self.groups.get_mut(i).map(|g| g.headers_mut()),
            AreaPath::Details => Some(&mut self.details),
            AreaPath::GroupFooters(i) => self.groups.get_mut(i).map(|g| g.footers_mut()),
            AreaPath::ReportFooters => Some(&mut self.report_footers),
            AreaPath::PageFooters => Some(&mut self.page_footers),
        }
    }

    fn area_paths(&self) -> Vec<AreaPath> {
        let mut paths = vec![AreaPath::ReportHeaders, AreaPath::PageHeaders];
        for i in 0..self.groups.len() {
            paths.push(AreaPath::GroupHeaders(i));
        }
        paths.push(AreaPath::Details);
        for i in (0..self.groups.len()).rev() {
            paths.push(AreaPath::GroupFooters(i));
        }
        paths.push(AreaPath::ReportFooters);
        paths.push(AreaPath::PageFooters);
        paths
    }

    /// Every section in display order: report headers, page headers, group
    /// headers outermost first, details, group footers innermost first,
    /// report footers, page footers. The run loop, aggregate collection,
    /// and renderers all traverse in this one order.
    pub fn sections_in_display_order(&self) -> Vec<(AreaPath, &Section)> {
        let mut out = Vec::new();
        for path in self.area_paths() {
            if let Some(area) = self.area(path) {
                out.extend(area.iter().map(|s| (path, s)));
            }
        }
        out
    }

    /// Area and positional index of a section, for exact re-insertion.
    pub fn location_of(&self, section_id: u64) -> Option<(AreaPath, usize)> {
        for path in self.area_paths() {
            if let Some(index) = self.area(path).and_then(|a| a.index_of(section_id)) {
                return Some((path, index));
            }
        }
        None
    }

    /// Position of the group whose headers or footers contain the section.
    pub fn group_owning_section(&self, section_id: u64) -> Option<usize> {
        match self.location_of(section_id) {
            Some((AreaPath::GroupHeaders(i), _)) | Some((AreaPath::GroupFooters(i), _)) => Some(i),
            _ => None,
        }
    }

    /// Whether removing this section would leave its area empty.
    pub fn is_sole_member(&self, section_id: u64) -> bool {
        self.location_of(section_id)
            .and_then(|(path, _)| self.area(path))
            .is_some_and(|area| area.is_sole_member(section_id))
    }

    /// Next free section id across every area.
    pub fn next_section_id(&self) -> u64 {
        self.sections_in_display_order()
            .iter()
            .map(|(_, s)| s.id())
            .max()
            .map_or(1, |max| max + 1)
    }

    /// Next free field id across every section.
    pub fn next_field_id(&self) -> u64 {
        self.sections_in_display_order()
            .iter()
            .flat_map(|(_, s)| s.fields().iter().map(|f| f.id()))
            .max()
            .map_or(1, |max| max + 1)
    }

    // ------------------------------------------------------------------
    // Dependency edges
    // ------------------------------------------------------------------

    /// The up-to-date dependency graph, rescanning any expressions edited
    /// since the last call. Fails on malformed id placeholders or a
    /// circular reference.
    pub fn dependencies(&mut self) -> Result<&DependencyGraph, ModelError> {
        self.rebuild_dependencies()?;
        Ok(&self.graph)
    }

    /// Expressions to mark stale when `changed` changes, each after all of
    /// its precedents.
    pub fn invalidation_order(
        &mut self,
        changed: ObjectRef,
    ) -> Result<Vec<ObjectRef>, ModelError> {
        self.rebuild_dependencies()?;
        Ok(self.graph.invalidation_order(changed)?)
    }

    // On failure the dirty set is kept so the next call rescans; partially
    // rebuilt edges are rescanned too, which is idempotent.
    fn rebuild_dependencies(&mut self) -> Result<(), ModelError> {
        if !self.scanned {
            self.dirty
                .extend(self.formulas.keys().map(|&id| ObjectRef::Formula(id)));
            self.dirty
                .extend(self.user_columns.keys().map(|&id| ObjectRef::UserColumn(id)));
            self.scanned = true;
        }
        if self.dirty.is_empty() {
            return Ok(());
        }

        let rebuilt: Vec<ObjectRef> = self.dirty.iter().copied().collect();
        for &obj in &rebuilt {
            let ids = match obj {
                ObjectRef::Formula(id) => self.formulas.get(&id).map(|f| f.referenced_ids()),
                ObjectRef::UserColumn(id) => {
                    self.user_columns.get(&id).map(|u| u.referenced_ids())
                }
                // Parameters hold values, not text
                ObjectRef::Parameter(_) => None,
            };
            match ids {
                Some(ids) => self.graph.set_dependencies(obj, ids?),
                None => self.graph.clear_dependencies(obj),
            }
        }

        // Any new loop must pass through an edited expression, so checking
        // the rebuilt ones covers the whole graph.
        for &obj in &rebuilt {
            self.graph.invalidation_order(obj)?;
        }

        self.dirty.clear();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Display form vs. storage form
    // ------------------------------------------------------------------

    /// Converts storage form (id placeholders) to display form (name
    /// placeholders), failing on an id that names nothing. The
    /// except-after marker is deliberately ignored so conversion
    /// round-trips the whole text; column and special spans are copied
    /// verbatim.
    pub fn display_form(&self, text: &str) -> Result<String, ModelError> {
        let text = rename_pass(text, PlaceholderKind::Formula, |body| {
            let id = parse_id(body, PlaceholderKind::Formula)?;
            Ok(self.formula(id)?.name().to_string())
        })?;
        let text = rename_pass(&text, PlaceholderKind::Parameter, |body| {
            let id = parse_id(body, PlaceholderKind::Parameter)?;
            Ok(self.parameter(id)?.name().to_string())
        })?;
        rename_pass(&text, PlaceholderKind::UserColumn, |body| {
            let id = parse_id(body, PlaceholderKind::UserColumn)?;
            Ok(self.user_column(id)?.name().to_string())
        })
    }

    /// Converts display form back to storage form, failing on an unknown
    /// name. The except-after marker is ignored, matching
    /// [`Report::display_form`].
    pub fn storage_form(&self, text: &str) -> Result<String, ModelError> {
        let text = rename_pass(text, PlaceholderKind::Formula, |body| {
            self.formula_by_name(body)
                .map(|f| f.id().to_string())
                .ok_or_else(|| ModelError::NoSuchFormula(body.to_string()))
        })?;
        let text = rename_pass(&text, PlaceholderKind::Parameter, |body| {
            self.parameter_by_name(body)
                .map(|p| p.id().to_string())
                .ok_or_else(|| ModelError::NoSuchParameter(body.to_string()))
        })?;
        rename_pass(&text, PlaceholderKind::UserColumn, |body| {
            self.user_column_by_name(body)
                .map(|u| u.id().to_string())
                .ok_or_else(|| ModelError::NoSuchUserColumn(body.to_string()))
        })
    }
}

/// One conversion pass over a single placeholder kind. `lookup` maps the
/// old body to the new one; its error aborts the pass.
fn rename_pass<F>(text: &str, kind: PlaceholderKind, mut lookup: F) -> Result<String, ModelError>
where
    F: FnMut(&str) -> Result<String, ModelError>,
{
    let open = kind.open();
    let mut failed = None;
    let rewritten = parser::rewrite(text, open, None, |body| match lookup(body) {
        Ok(new_body) => Some(format!("{open}{new_body}}}")),
        Err(e) => {
            failed = Some(e);
            None
        }
    });
    if let Some(e) = failed {
        return Err(e);
    }
    Ok(rewritten.unwrap_or_else(|| text.to_string()))
}

/// Ids are never reused: always one past the largest ever assigned.
fn next_id<V>(map: &BTreeMap<u64, V>) -> u64 {
    map.last_key_value().map_or(1, |(&max, _)| max + 1)
}
