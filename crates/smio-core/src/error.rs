use thiserror::Error;

use crate::comm::CommError;

/// Library error type covering every failure class a caller can observe.
///
/// Backend failures carry the backend's native error code; the human-readable
/// text for those is obtained from the owning context via
/// [`crate::context::Context::lib_error_string`], which knows which backend
/// produced the code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SmioError {
    /// A buffer or table could not be allocated
    #[error("allocation returned no memory")]
    AllocFailure,

    /// Invalid argument provided (bad handle, conflicting mode flags,
    /// unknown type, zero-sized dimension, ...)
    #[error("invalid subroutine argument")]
    InvalidArgument,

    /// A messaging-substrate call failed
    #[error("internal messaging call failed: {0}")]
    Messaging(CommError),

    /// The foreign-language binding shim detected inconsistent return values
    #[error("foreign binding detected an inconsistency in return values")]
    ForeignBinding,

    /// Bad return code from the file-library backend
    #[error("bad return code from a backend library call: {code}")]
    Library { code: i32 },

    /// Argument is of the wrong type
    #[error("argument is of the wrong type")]
    WrongArgType,

    /// Argument is of insufficient size
    #[error("argument is of insufficient size")]
    InsufficientArg,

    /// Failure in the asynchronous writer machinery
    #[error("failure in asynchronous output handling")]
    Async,
}

impl From<CommError> for SmioError {
    fn from(e: CommError) -> Self {
        SmioError::Messaging(e)
    }
}

/// Error string for a given error value, independent of any context.
///
/// Always non-empty. For [`SmioError::Library`] the backend-specific text
/// should be obtained from the context instead.
pub fn error_string(err: &SmioError) -> String {
    err.to_string()
}
