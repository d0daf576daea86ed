//! FILENAME: model/src/error.rs

use crate::dependency::CycleError;
use crate::parameter::{Arity, ParameterType};
use thiserror::Error;

/// Configuration errors. These fail fast at construction or edit time and
/// are never silently coerced into a default.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("no such formula: {0}")]
    NoSuchFormula(String),

    #[error("no such parameter: {0}")]
    NoSuchParameter(String),

    #[error("no such user column: {0}")]
    NoSuchUserColumn(String),

    #[error("unknown special value name: {0}")]
    UnknownSpecial(String),

    #[error("parameter {id}: type {param_type:?} cannot take arity {arity:?}")]
    IllegalParameterArity {
        id: u64,
        param_type: ParameterType,
        arity: Arity,
    },

    #[error("section {0} is not a member of this area")]
    SectionNotInArea(u64),

    #[error(transparent)]
    Cycle(#[from] CycleError),
}
