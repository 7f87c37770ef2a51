//! Validation errors for malformed model values.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A request or value was malformed. Raised before any state change.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("dimension name must not be empty")]
    EmptyDimensionName,

    #[error("measure value for dimension `{dimension}` must not be empty")]
    EmptyMeasureValue { dimension: String },

    #[error("property key must not be empty")]
    EmptyKey,

    #[error("unknown dimension `{dimension}`")]
    UnknownDimension { dimension: String },

    #[error("dimension `{dimension}` appears more than once in one context")]
    RepeatedDimension { dimension: String },
}
