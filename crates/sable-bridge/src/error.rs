//! Bridge error taxonomy
//!
//! Every fallible bridge entry point reports one of these conditions.
//! Across the C boundary they travel as small integer codes written to an
//! out-parameter; exceptions never cross.

use thiserror::Error;

/// Bridge operation errors
///
/// Codes 1 through 11 are the closed set a host decodes by name. Internal
/// faults with no named condition (`Execution`, `Json`) all travel as
/// code 12; a host treats anything outside 1..=11 as one opaque failure.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No class with the requested name
    #[error("class not found")]
    ClassNotFound,

    /// No method with the requested name and arity
    #[error("method not found")]
    MethodNotFound,

    /// No field with the requested name
    #[error("field not found")]
    FieldNotFound,

    /// No property with the requested name
    #[error("property not found")]
    PropertyNotFound,

    /// Field is readonly and rejects writes
    #[error("field is readonly")]
    ReadonlyField,

    /// Property has no getter
    #[error("property is missing a getter")]
    MissingGetter,

    /// Property has no setter
    #[error("property is missing a setter")]
    MissingSetter,

    /// A required handle or argument was null or unresolvable
    #[error("missing required argument: was null")]
    MissingRequiredArgument,

    /// Path did not resolve to a loadable module
    #[error("path not found")]
    PathNotFound,

    /// Attempt to use a module that was not loaded
    #[error("attempt to use a module that was NOT loaded")]
    ModuleNotLoaded,

    /// Script class is not registered with the catalog
    #[error("script class is not registered with the runtime")]
    ClassNotRegistered,

    /// Method body execution fault
    #[error("execution fault: {0}")]
    Execution(#[from] sable_core::CoreError),

    /// Payload serialization fault
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BridgeError {
    /// Stable numeric code reported across the C boundary
    pub fn code(&self) -> i32 {
        match self {
            BridgeError::ClassNotFound => 1,
            BridgeError::MethodNotFound => 2,
            BridgeError::FieldNotFound => 3,
            BridgeError::PropertyNotFound => 4,
            BridgeError::ReadonlyField => 5,
            BridgeError::MissingGetter => 6,
            BridgeError::MissingSetter => 7,
            BridgeError::MissingRequiredArgument => 8,
            BridgeError::PathNotFound => 9,
            BridgeError::ModuleNotLoaded => 10,
            BridgeError::ClassNotRegistered => 11,
            BridgeError::Execution(_) | BridgeError::Json(_) => 12,
        }
    }
}

/// Bridge operation result
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(BridgeError::ClassNotFound.code(), 1);
        assert_eq!(BridgeError::MissingRequiredArgument.code(), 8);
        assert_eq!(BridgeError::ClassNotRegistered.code(), 11);
    }

    #[test]
    fn test_internal_faults_share_one_code() {
        let err = BridgeError::Execution(sable_core::CoreError::StackUnderflow);
        assert_eq!(err.code(), 12);
    }
}
