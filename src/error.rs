use core::fmt;

/// Result alias for `cadence`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the clustering estimators and their collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Input was empty.
    EmptyInput,

    /// Feature-dimension mismatch between series.
    DimensionMismatch {
        /// Expected feature dimension.
        expected: usize,
        /// Found feature dimension.
        found: usize,
    },

    /// Sequence-length mismatch where equal lengths were required.
    LengthMismatch {
        /// Expected length.
        expected: usize,
        /// Found length.
        found: usize,
    },

    /// Invalid number of clusters requested.
    InvalidClusterCount {
        /// Requested count.
        requested: usize,
        /// Number of items.
        n_items: usize,
    },

    /// Explicit initial centroids do not match the requested cluster count.
    InvalidInitialization {
        /// Expected number of centroids.
        expected: usize,
        /// Number of centroids provided.
        found: usize,
    },

    /// Invalid parameter value.
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Error message.
        message: &'static str,
    },

    /// Every restart attempt ended with an empty cluster; no model was fitted.
    FitExhausted {
        /// Number of attempts made before giving up.
        attempts: usize,
    },

    /// Generic error with message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyInput => write!(f, "empty input provided"),
            Error::DimensionMismatch { expected, found } => {
                write!(f, "dimension mismatch: expected {expected}, found {found}")
            }
            Error::LengthMismatch { expected, found } => {
                write!(f, "length mismatch: expected {expected}, found {found}")
            }
            Error::InvalidClusterCount { requested, n_items } => {
                write!(f, "cannot create {requested} clusters from {n_items} items")
            }
            Error::InvalidInitialization { expected, found } => {
                write!(
                    f,
                    "initial centroids must contain {expected} series, {found} given"
                )
            }
            Error::InvalidParameter { name, message } => {
                write!(f, "invalid parameter '{name}': {message}")
            }
            Error::FitExhausted { attempts } => {
                write!(
                    f,
                    "all {attempts} attempts led to at least one empty cluster; model left unfitted"
                )
            }
            Error::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}
