//! Error types for registration and dispatch.

use thiserror::Error;

use crate::name::StructuredName;
use crate::value::ValueType;

/// Failure raised by the body of an exposed member.
pub type MemberError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure raised by a [`Publisher`](crate::Publisher) while publishing or
/// retracting a name.
pub type PublishError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from naming, introspection, registration and dispatch.
///
/// Every variant is reported synchronously to the caller of the operation
/// that triggered it; nothing is retried.
#[derive(Debug, Error)]
pub enum Error {
    /// The domain, primary key or a folder segment is empty or malformed.
    #[error("invalid name: {message}")]
    InvalidName { message: String },

    /// A declared member does not have a recognized accessor or operation shape.
    #[error("invalid member '{member}': {message}")]
    InvalidMember { member: String, message: String },

    /// Another object is already registered under this name.
    #[error("name already registered: {0}")]
    DuplicateName(StructuredName),

    /// Nothing is registered under this name.
    #[error("no managed object registered as {0}")]
    NotFound(StructuredName),

    /// The object has no attribute or operation matching the request.
    #[error("no member '{member}' on {name}")]
    NoSuchMember { name: StructuredName, member: String },

    /// More than one overload accepts the supplied arguments equally well.
    #[error("operation '{operation}' on {name} is ambiguous for {arity} argument(s): {candidates}")]
    AmbiguousOperation {
        name: StructuredName,
        operation: String,
        arity: usize,
        candidates: String,
    },

    /// The attribute has no getter.
    #[error("attribute '{attribute}' on {name} is not readable")]
    NotReadable {
        name: StructuredName,
        attribute: String,
    },

    /// The attribute has no setter.
    #[error("attribute '{attribute}' on {name} is not writable")]
    NotWritable {
        name: StructuredName,
        attribute: String,
    },

    /// An argument could not be coerced to the declared parameter type.
    #[error("type mismatch for '{member}' argument {position}: expected {expected}, found {found}")]
    TypeMismatch {
        member: String,
        position: usize,
        expected: ValueType,
        found: String,
    },

    /// The member's own body failed.
    #[error("'{member}' on {name} failed: {source}")]
    Invocation {
        name: StructuredName,
        member: String,
        #[source]
        source: MemberError,
    },

    /// The registry changed but the endpoint could not be notified.
    #[error("failed to publish change of {name}: {source}")]
    Publish {
        name: StructuredName,
        #[source]
        source: PublishError,
    },
}

impl Error {
    pub(crate) fn invalid_name(message: impl Into<String>) -> Self {
        Error::InvalidName {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_member(member: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidMember {
            member: member.into(),
            message: message.into(),
        }
    }

    /// Stable snake_case identifier of the variant, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidName { .. } => "invalid_name",
            Error::InvalidMember { .. } => "invalid_member",
            Error::DuplicateName(_) => "duplicate_name",
            Error::NotFound(_) => "not_found",
            Error::NoSuchMember { .. } => "no_such_member",
            Error::AmbiguousOperation { .. } => "ambiguous_operation",
            Error::NotReadable { .. } => "not_readable",
            Error::NotWritable { .. } => "not_writable",
            Error::TypeMismatch { .. } => "type_mismatch",
            Error::Invocation { .. } => "invocation",
            Error::Publish { .. } => "publish",
        }
    }

    /// True when the failure came from the managed object's own code rather
    /// than from the dispatch machinery.
    pub fn is_invocation_fault(&self) -> bool {
        matches!(self, Error::Invocation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    fn name() -> StructuredName {
        StructuredName::new("j256", "testObject", Vec::new()).unwrap()
    }

    #[test]
    fn invalid_name_display() {
        let e = Error::invalid_name("domain is empty");
        assert_eq!(e.to_string(), "invalid name: domain is empty");
        assert_eq!(e.kind(), "invalid_name");
    }

    #[test]
    fn invalid_member_display() {
        let e = Error::invalid_member("get", "nothing follows the 'get' prefix");
        let display = e.to_string();
        assert!(display.contains("'get'"));
        assert!(display.contains("prefix"));
    }

    #[test]
    fn duplicate_name_display() {
        let e = Error::DuplicateName(name());
        assert!(e.to_string().contains("j256:name=testObject"));
        assert_eq!(e.kind(), "duplicate_name");
    }

    #[test]
    fn type_mismatch_display() {
        let e = Error::TypeMismatch {
            member: "resetFoo".to_string(),
            position: 0,
            expected: ValueType::Integer,
            found: "string".to_string(),
        };
        let display = e.to_string();
        assert!(display.contains("resetFoo"));
        assert!(display.contains("expected integer"));
        assert!(display.contains("found string"));
    }

    #[test]
    fn invocation_carries_source() {
        let e = Error::Invocation {
            name: name(),
            member: "someCall".to_string(),
            source: "because I can".into(),
        };
        assert!(e.is_invocation_fault());
        assert_eq!(StdError::source(&e).unwrap().to_string(), "because I can");
        assert!(e.to_string().contains("because I can"));
    }

    #[test]
    fn publish_carries_source() {
        let e = Error::Publish {
            name: name(),
            source: "endpoint closed".into(),
        };
        assert!(!e.is_invocation_fault());
        assert_eq!(e.kind(), "publish");
        assert!(StdError::source(&e).is_some());
    }

    #[test]
    fn not_found_has_no_source() {
        let e = Error::NotFound(name());
        assert!(StdError::source(&e).is_none());
        assert_eq!(e.kind(), "not_found");
    }
}
