//! FILENAME: report-engine/src/analyze.rs
//! PURPOSE: Passive dependency scan over expression text for query
//! planning.
//! CONTEXT: Before a run, the host needs to know which columns and user
//! columns the report's expressions pull in, so the select list can cover
//! them. The scan never evaluates anything. It walks placeholder spans,
//! resolves names against the source and the definition, and recurses
//! through user column bodies. Unknown column names are skipped, matching
//! substitution's tolerance of script-native brace syntax.

use model::{DataSource, Report, UserColumnId};
use parser::{placeholders, PlaceholderKind};
use rustc_hash::FxHashSet;

/// Selectables a piece of expression text reaches, directly or through
/// user columns. First-seen order, no repeats.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectablesUsed {
    /// Declared names of the columns used.
    pub columns: Vec<String>,
    pub user_columns: Vec<UserColumnId>,
}

/// Collects every column and user column `text` reaches. A user column is
/// scanned at most once, so reference cycles terminate.
pub fn columns_used(
    report: &Report,
    source: &dyn DataSource,
    text: &str,
    except_after: Option<&str>,
) -> SelectablesUsed {
    let mut used = SelectablesUsed::default();
    let mut visited = FxHashSet::default();
    scan(report, source, text, except_after, &mut used, &mut visited);
    used
}

fn scan(
    report: &Report,
    source: &dyn DataSource,
    text: &str,
    except_after: Option<&str>,
    used: &mut SelectablesUsed,
    visited: &mut FxHashSet<UserColumnId>,
) {
    for span in placeholders(text, except_after) {
        match span.kind {
            PlaceholderKind::Column => {
                if let Some(index) = source.find_column(span.body) {
                    let name = source.columns()[index].name();
                    if !used.columns.iter().any(|c| c == name) {
                        used.columns.push(name.to_string());
                    }
                }
            }
            PlaceholderKind::UserColumn => {
                let id = match span.body.parse::<UserColumnId>() {
                    Ok(id) => id,
                    Err(_) => continue,
                };
                if !visited.insert(id) {
                    continue;
                }
                if let Ok(user_column) = report.user_column(id) {
                    used.user_columns.push(id);
                    scan(
                        report,
                        source,
                        user_column.text(),
                        user_column.except_after(),
                        used,
                        visited,
                    );
                }
            }
            // Formulas, parameters, and specials bring no selectables of
            // their own into the select list.
            PlaceholderKind::Formula | PlaceholderKind::Parameter | PlaceholderKind::Special => {}
        }
    }
}
