//! Error types and LDAP result codes for directory operations.
//!
//! Every processor stage that can stop an operation does so by returning a
//! [`DirectoryError`]. The error carries everything the client eventually
//! sees: the result code, a diagnostic message, and optionally a matched DN
//! and referral URLs.

use crate::dn::Dn;
use std::fmt;

/// LDAP result codes as defined in RFC 4511, plus the server-side extensions
/// used by the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    OperationsError,
    ProtocolError,
    TimeLimitExceeded,
    SizeLimitExceeded,
    CompareFalse,
    CompareTrue,
    AuthMethodNotSupported,
    Referral,
    UnavailableCriticalExtension,
    NoSuchAttribute,
    ConstraintViolation,
    AttributeOrValueExists,
    InvalidAttributeSyntax,
    NoSuchObject,
    InvalidDnSyntax,
    InappropriateAuthentication,
    InvalidCredentials,
    InsufficientAccessRights,
    Busy,
    Unavailable,
    UnwillingToPerform,
    NamingViolation,
    ObjectClassViolation,
    NotAllowedOnNonLeaf,
    NotAllowedOnRdn,
    EntryAlreadyExists,
    Other,
    Canceled,
    AssertionFailed,
    AuthorizationDenied,
    NoOperation,
}

impl ResultCode {
    /// Numeric value sent on the wire.
    pub fn int_value(&self) -> u32 {
        match self {
            Self::Success => 0,
            Self::OperationsError => 1,
            Self::ProtocolError => 2,
            Self::TimeLimitExceeded => 3,
            Self::SizeLimitExceeded => 4,
            Self::CompareFalse => 5,
            Self::CompareTrue => 6,
            Self::AuthMethodNotSupported => 7,
            Self::Referral => 10,
            Self::UnavailableCriticalExtension => 12,
            Self::NoSuchAttribute => 16,
            Self::ConstraintViolation => 19,
            Self::AttributeOrValueExists => 20,
            Self::InvalidAttributeSyntax => 21,
            Self::NoSuchObject => 32,
            Self::InvalidDnSyntax => 34,
            Self::InappropriateAuthentication => 48,
            Self::InvalidCredentials => 49,
            Self::InsufficientAccessRights => 50,
            Self::Busy => 51,
            Self::Unavailable => 52,
            Self::UnwillingToPerform => 53,
            Self::NamingViolation => 64,
            Self::ObjectClassViolation => 65,
            Self::NotAllowedOnNonLeaf => 66,
            Self::NotAllowedOnRdn => 67,
            Self::EntryAlreadyExists => 68,
            Self::Other => 80,
            Self::Canceled => 118,
            Self::AssertionFailed => 122,
            Self::AuthorizationDenied => 123,
            Self::NoOperation => 16654,
        }
    }

    /// Whether the code reports a successfully applied operation.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Codes that report the outcome of a successfully processed request
    /// without being an error (compare results, no-op, referrals).
    pub fn is_non_error(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::CompareTrue | Self::CompareFalse | Self::NoOperation | Self::Referral
        )
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::OperationsError => "Operations Error",
            Self::ProtocolError => "Protocol Error",
            Self::TimeLimitExceeded => "Time Limit Exceeded",
            Self::SizeLimitExceeded => "Size Limit Exceeded",
            Self::CompareFalse => "Compare False",
            Self::CompareTrue => "Compare True",
            Self::AuthMethodNotSupported => "Authentication Method Not Supported",
            Self::Referral => "Referral",
            Self::UnavailableCriticalExtension => "Unavailable Critical Extension",
            Self::NoSuchAttribute => "No Such Attribute",
            Self::ConstraintViolation => "Constraint Violation",
            Self::AttributeOrValueExists => "Attribute Or Value Exists",
            Self::InvalidAttributeSyntax => "Invalid Attribute Syntax",
            Self::NoSuchObject => "No Such Entry",
            Self::InvalidDnSyntax => "Invalid DN Syntax",
            Self::InappropriateAuthentication => "Inappropriate Authentication",
            Self::InvalidCredentials => "Invalid Credentials",
            Self::InsufficientAccessRights => "Insufficient Access Rights",
            Self::Busy => "Busy",
            Self::Unavailable => "Unavailable",
            Self::UnwillingToPerform => "Unwilling To Perform",
            Self::NamingViolation => "Naming Violation",
            Self::ObjectClassViolation => "Object Class Violation",
            Self::NotAllowedOnNonLeaf => "Not Allowed On Non-Leaf",
            Self::NotAllowedOnRdn => "Not Allowed On RDN",
            Self::EntryAlreadyExists => "Entry Already Exists",
            Self::Other => "Other",
            Self::Canceled => "Canceled",
            Self::AssertionFailed => "Assertion Failed",
            Self::AuthorizationDenied => "Authorization Denied",
            Self::NoOperation => "No Operation",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.int_value())
    }
}

/// An error that stops an operation and defines its result.
///
/// This mirrors what a client receives in an LDAP result message. Matched DN
/// and referrals are optional and only populated where the failing stage knows
/// them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{result_code}: {message}")]
pub struct DirectoryError {
    pub result_code: ResultCode,
    pub message: String,
    pub matched_dn: Option<Dn>,
    pub referrals: Vec<String>,
}

/// Result type used throughout the pipeline.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

impl DirectoryError {
    /// Create an error with a result code and message.
    pub fn new(result_code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            result_code,
            message: message.into(),
            matched_dn: None,
            referrals: Vec::new(),
        }
    }

    /// Attach a matched DN.
    pub fn with_matched_dn(mut self, matched_dn: Option<Dn>) -> Self {
        self.matched_dn = matched_dn;
        self
    }

    /// Attach referral URLs.
    pub fn with_referrals(mut self, referrals: Vec<String>) -> Self {
        self.referrals = referrals;
        self
    }

    pub fn no_such_object(message: impl Into<String>, matched_dn: Option<Dn>) -> Self {
        Self::new(ResultCode::NoSuchObject, message).with_matched_dn(matched_dn)
    }

    pub fn unwilling_to_perform(message: impl Into<String>) -> Self {
        Self::new(ResultCode::UnwillingToPerform, message)
    }

    pub fn insufficient_access(message: impl Into<String>) -> Self {
        Self::new(ResultCode::InsufficientAccessRights, message)
    }

    pub fn invalid_credentials(message: impl Into<String>) -> Self {
        Self::new(ResultCode::InvalidCredentials, message)
    }

    pub fn protocol_error(message: impl Into<String>) -> Self {
        Self::new(ResultCode::ProtocolError, message)
    }

    /// A server-side failure with the underlying message attached.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ResultCode::Other, message)
    }
}

/// Errors raised while assembling a server from configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Configuration text could not be parsed
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A configured DN is not valid
    #[error("Invalid DN '{value}' in configuration: {reason}")]
    InvalidDn { value: String, reason: String },

    /// Embedded or supplied schema definitions are inconsistent
    #[error("Invalid schema: {message}")]
    InvalidSchema { message: String },

    /// A workflow element with the same identifier is already registered
    #[error("Workflow element '{id}' is already registered")]
    DuplicateWorkflowElement { id: String },
}
