use crate::db::StoreError;

/// Errors that abort a query. No partial results accompany any of them.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("metatag '{name}' is not recognized here")]
    MetaTagUnrecognized { name: String },

    #[error("cannot negate metatag '{name}' (comparator {comparator})")]
    ComparatorInversionUnsupported { name: String, comparator: String },

    #[error("invalid value '{value}' for metatag '{name}': {reason}")]
    ValueCoercionFailed {
        name: String,
        value: String,
        reason: String,
    },

    #[error("pivot id must be non-zero")]
    InvalidPivot,

    #[error("invalid page window: offset {offset}, stride {stride}, max {max}")]
    InvalidPageWindow { offset: u64, stride: u64, max: u64 },

    #[error("no images match the query")]
    NoResults,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SearchError {
    pub(crate) fn coercion(name: &str, value: &str, reason: impl Into<String>) -> Self {
        SearchError::ValueCoercionFailed {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
