//! FILENAME: report-engine/src/error.rs

use model::{ModelError, SourceError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Driver or cursor failure, carrying the query that was running so
    /// the report author can locate the cause.
    #[error("data error while running {query:?}: {source}")]
    Data {
        query: String,
        #[source]
        source: SourceError,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl EngineError {
    pub(crate) fn data(query: impl Into<String>, source: SourceError) -> Self {
        EngineError::Data {
            query: query.into(),
            source,
        }
    }
}
