//! FILENAME: report-engine/src/script.rs
//! PURPOSE: The seam to the embedded scripting runtime that evaluates
//! formula text after substitution.
//! CONTEXT: The engine never interprets formula text itself. It rewrites
//! placeholders to literals and hands the result to a `ScriptEvaluator`
//! supplied by the host. Formulas may pin a language; the rest use the
//! process-wide default.

use model::Value;
use once_cell::sync::Lazy;
use std::sync::RwLock;
use thiserror::Error;

/// Language assumed for formulas that do not pin one.
const BUILTIN_DEFAULT: &str = "ruby";

static DEFAULT_LANGUAGE: Lazy<RwLock<String>> =
    Lazy::new(|| RwLock::new(BUILTIN_DEFAULT.to_string()));

/// The process-wide default formula language.
pub fn default_language() -> String {
    match DEFAULT_LANGUAGE.read() {
        Ok(guard) => guard.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

pub fn set_default_language(language: impl Into<String>) {
    match DEFAULT_LANGUAGE.write() {
        Ok(mut guard) => *guard = language.into(),
        Err(poisoned) => *poisoned.into_inner() = language.into(),
    }
}

/// Failure inside the scripting runtime while evaluating one formula.
/// Never fatal to a run: the formula yields no value and the failure is
/// reported once.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("script error in formula {name:?}: {message}")]
pub struct ScriptError {
    pub name: String,
    pub message: String,
}

impl ScriptError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        ScriptError {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Host-supplied scripting runtime.
pub trait ScriptEvaluator {
    /// Evaluates formula text that has already been through placeholder
    /// substitution. `name` identifies the formula for error messages and
    /// interpreter bindings.
    fn eval(&mut self, language: &str, name: &str, text: &str) -> Result<Value, ScriptError>;

    /// The language's literal for "no value", spliced into formula text
    /// where a referenced column is null.
    fn nil_literal(&self) -> &str {
        "nil"
    }
}
