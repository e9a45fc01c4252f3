/// Errors surfaced by forest operations.
///
/// The crate recovers nothing internally; every failure is reported to the
/// caller. Queries issued before the forest has seen `output_after` updates
/// are not errors, they return neutral results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForestError {
    /// A caller-supplied value is out of range or inconsistent with the
    /// forest configuration (dimension mismatch, negative horizon, ...).
    InvalidArgument { msg: &'static str },

    /// A point (or a sequence index, when sequence indexes are stored) was
    /// expected in a tree but is not there.
    NotPresent { msg: &'static str },

    /// A reference does not address a live point-store entry.
    InvalidReference { msg: &'static str },

    /// The point store arena is at its maximum capacity.
    CapacityExceeded { msg: &'static str },

    /// An operation was invoked on a component in a state that cannot
    /// serve it, e.g. deleting from an empty tree.
    IllegalState { msg: &'static str },

    /// An unknown key was passed to `config_get` / `config_set`.
    InvalidConfig { msg: &'static str },
}

impl std::fmt::Display for ForestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForestError::InvalidArgument { msg } => write!(f, "invalid argument: {}", msg),
            ForestError::NotPresent { msg } => write!(f, "not present: {}", msg),
            ForestError::InvalidReference { msg } => write!(f, "invalid reference: {}", msg),
            ForestError::CapacityExceeded { msg } => write!(f, "capacity exceeded: {}", msg),
            ForestError::IllegalState { msg } => write!(f, "illegal state: {}", msg),
            ForestError::InvalidConfig { msg } => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ForestError {}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ForestError>;
