use thiserror::Error;

/// Errors produced by `shbody-core`.
///
/// Degenerate numerical inputs (zero-length vectors, pole singularities,
/// denominator underflow) are not part of this taxonomy: those are handled
/// locally by skipping the affected update rather than propagated.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("coefficient vector has length {actual}, expected {expected} for max_order")]
    InvalidCoefficientLength { expected: usize, actual: usize },

    #[error("requested order {order} exceeds basis max_order {max}")]
    OrderExceedsMax { order: usize, max: usize },

    #[error("coefficient vector is empty")]
    EmptyCoefficients,

    #[error("point set is empty")]
    EmptyPoints,

    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("target object has no physicsState container")]
    MissingPhysicsState,

    #[error("operation is not implemented: {0}")]
    Unimplemented(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
