use thiserror::Error;

/// Result type alias for portal operations
pub type Result<T> = std::result::Result<T, PortalError>;

/// Recoverable failures reported by the admin portal state machine
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PortalError {
    /// A required input was empty or exceeded its capacity
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Candidate password violates the length or charset policy
    #[error("password does not meet the length or charset requirements")]
    InvalidPassword,

    /// Replacement password violates the length or charset policy
    #[error("new password does not meet the length or charset requirements")]
    InvalidNewPassword,

    /// Supplied password does not match the stored one
    #[error("wrong password")]
    WrongPassword,

    /// Current password given for a change does not match the stored one
    #[error("wrong old password")]
    WrongOldPassword,

    /// Verification attempted before enrollment
    #[error("no admin password defined")]
    NoPasswordDefined,
}
