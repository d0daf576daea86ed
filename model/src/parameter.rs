//! FILENAME: model/src/parameter.rs
//! PURPOSE: Run-time questions: values the user supplies before a run.
//! CONTEXT: A parameter's type can be changed at any time after creation,
//! so values are held as dynamic `Value`s and legality is re-checked on
//! every type or arity change instead of being baked into subtypes.

use crate::error::ModelError;
use crate::expr::{ObjectRef, ParameterId};
use crate::value::Value;
use chrono::Local;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterType {
    Bool,
    String,
    Number,
    Date,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arity {
    Single,
    Range,
    ListSingle,
    ListMultiple,
}

/// A piece of data whose value is determined by asking the user each time
/// the report runs. Default values seed the question and stand in when no
/// answer was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    id: ParameterId,
    name: String,
    question: String,
    param_type: ParameterType,
    arity: Arity,
    default_values: Vec<Value>,
    values: Vec<Value>,
}

impl Parameter {
    /// Creates a parameter, failing fast on an illegal type+arity
    /// combination (yes/no questions take a single answer; date questions
    /// take a single date or a range).
    pub fn new(
        id: ParameterId,
        name: impl Into<String>,
        question: impl Into<String>,
        param_type: ParameterType,
        arity: Arity,
    ) -> Result<Self, ModelError> {
        if !Parameter::is_legal(param_type, arity) {
            return Err(ModelError::IllegalParameterArity {
                id,
                param_type,
                arity,
            });
        }
        Ok(Parameter {
            id,
            name: name.into(),
            question: question.into(),
            param_type,
            arity,
            default_values: Vec::new(),
            values: Vec::new(),
        })
    }

    /// Whether the combination of type and arity is allowed.
    pub fn is_legal(param_type: ParameterType, arity: Arity) -> bool {
        match param_type {
            ParameterType::Bool => arity == Arity::Single,
            ParameterType::Date => matches!(arity, Arity::Single | Arity::Range),
            ParameterType::String | ParameterType::Number => true,
        }
    }

    pub fn id(&self) -> ParameterId {
        self.id
    }

    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::Parameter(self.id)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn param_type(&self) -> ParameterType {
        self.param_type
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// The current value resolved by `{?id}` placeholders: the first
    /// supplied value, falling back to the first default, then to a
    /// type-appropriate stand-in (no, empty, zero, today). A parameter
    /// never reads as null, so an unanswered question cannot poison the
    /// formulas that mention it. Range and list arities expose their
    /// first entry here.
    pub fn value(&self) -> Value {
        self.values
            .first()
            .or_else(|| self.default_values.first())
            .cloned()
            .unwrap_or_else(|| Parameter::default_for_type(self.param_type))
    }

    /// The stand-in value for a type, used when a parameter has neither an
    /// answer nor a default.
    pub fn default_for_type(param_type: ParameterType) -> Value {
        match param_type {
            ParameterType::Bool => Value::Bool(false),
            ParameterType::String => Value::from(""),
            ParameterType::Number => Value::from(0.0),
            ParameterType::Date => Value::Date(Local::now().date_naive()),
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn default_values(&self) -> &[Value] {
        &self.default_values
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub(crate) fn set_values(&mut self, values: Vec<Value>) {
        self.values = values;
    }

    pub(crate) fn set_default_values(&mut self, values: Vec<Value>) {
        self.default_values = values;
    }

    /// Changes the type. A different type invalidates both value lists and
    /// coerces the arity to the nearest legal one, mirroring the editing
    /// behavior users expect (no boolean lists).
    pub(crate) fn set_type(&mut self, new_type: ParameterType) {
        if self.param_type == new_type {
            return;
        }
        self.param_type = new_type;
        self.default_values.clear();
        self.values.clear();
        if !Parameter::is_legal(self.param_type, self.arity) {
            self.arity = Arity::Single;
        }
    }

    /// Changes the arity, rejecting illegal combinations outright.
    pub(crate) fn set_arity(&mut self, new_arity: Arity) -> Result<(), ModelError> {
        if !Parameter::is_legal(self.param_type, new_arity) {
            return Err(ModelError::IllegalParameterArity {
                id: self.id,
                param_type: self.param_type,
                arity: new_arity,
            });
        }
        self.arity = new_arity;
        Ok(())
    }
}
