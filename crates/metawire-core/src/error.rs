//! Shared error and diagnostic types across metawire crates.
//!
//! The core never aborts on bad input. Parsers and decoders collect
//! [`Diagnostic`]s next to a best-effort value; callers that prefer a hard
//! failure turn the first diagnostic into a [`MetaWireError`].

use std::fmt;

use thiserror::Error;

/// Diagnostic categories (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed definition text or JSON text.
    SyntaxError,
    /// Duplicate field number/name, duplicate message id/name, unresolved type.
    SchemaConflict,
    /// Value type disagrees with the schema.
    TypeMismatch,
    /// Payload runs past the end of the buffer.
    TruncatedInput,
    /// Tag cannot be read consistently.
    MalformedTag,
    /// Message type not known to the schema.
    UnknownMessage,
    /// Encoded payload exceeds a transport limit.
    PayloadTooLarge,
    /// Invalid configuration.
    BadConfig,
    /// Unsupported configuration or framing version.
    UnsupportedVersion,
    /// I/O or other internal failure.
    Internal,
}

impl ErrorKind {
    /// String representation used in logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::SyntaxError => "SYNTAX_ERROR",
            ErrorKind::SchemaConflict => "SCHEMA_CONFLICT",
            ErrorKind::TypeMismatch => "TYPE_MISMATCH",
            ErrorKind::TruncatedInput => "TRUNCATED_INPUT",
            ErrorKind::MalformedTag => "MALFORMED_TAG",
            ErrorKind::UnknownMessage => "UNKNOWN_MESSAGE",
            ErrorKind::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ErrorKind::BadConfig => "BAD_CONFIG",
            ErrorKind::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a diagnostic was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// 1-based line/column in definition text.
    Source { line: u32, column: u32 },
    /// Byte offset into a wire buffer.
    Offset(usize),
    /// Field number of the message being populated.
    Field(u32),
    /// No useful location.
    None,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Source { line, column } => write!(f, "{line}:{column}"),
            Position::Offset(o) => write!(f, "byte {o}"),
            Position::Field(n) => write!(f, "field {n}"),
            Position::None => f.write_str("-"),
        }
    }
}

/// One recoverable problem found while parsing, decoding or setting values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at {position}: {message}")]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub position: Position,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, position: Position, message: impl Into<String>) -> Self {
        Self {
            kind,
            position,
            message: message.into(),
        }
    }

    pub fn syntax(line: u32, column: u32, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SyntaxError, Position::Source { line, column }, message)
    }

    pub fn conflict(line: u32, column: u32, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SchemaConflict, Position::Source { line, column }, message)
    }

    pub fn mismatch(field: u32, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch, Position::Field(field), message)
    }

    pub fn truncated(offset: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TruncatedInput, Position::Offset(offset), message)
    }

    pub fn malformed_tag(offset: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedTag, Position::Offset(offset), message)
    }
}

impl From<Diagnostic> for MetaWireError {
    fn from(d: Diagnostic) -> Self {
        let text = d.to_string();
        match d.kind {
            ErrorKind::SyntaxError => MetaWireError::Syntax(text),
            ErrorKind::SchemaConflict => MetaWireError::SchemaConflict(text),
            ErrorKind::TypeMismatch => MetaWireError::TypeMismatch(text),
            ErrorKind::TruncatedInput => MetaWireError::TruncatedInput(text),
            ErrorKind::MalformedTag => MetaWireError::MalformedTag(text),
            ErrorKind::UnknownMessage => MetaWireError::UnknownMessage(text),
            ErrorKind::PayloadTooLarge => MetaWireError::PayloadTooLarge(text),
            ErrorKind::BadConfig => MetaWireError::BadConfig(text),
            ErrorKind::UnsupportedVersion => MetaWireError::UnsupportedVersion,
            ErrorKind::Internal => MetaWireError::Internal(text),
        }
    }
}

/// Accumulated diagnostics.
pub type Diagnostics = Vec<Diagnostic>;

/// A best-effort value plus everything that went wrong while producing it.
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    pub value: T,
    pub diagnostics: Diagnostics,
}

impl<T> Decoded<T> {
    pub fn new(value: T, diagnostics: Diagnostics) -> Self {
        Self { value, diagnostics }
    }

    /// True when nothing was reported.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Reject the value if any diagnostic was reported.
    pub fn into_result(self) -> Result<T> {
        match self.diagnostics.into_iter().next() {
            Some(d) => Err(d.into()),
            None => Ok(self.value),
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, MetaWireError>;

/// Unified error type used by core and relay.
#[derive(Debug, Error)]
pub enum MetaWireError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("schema conflict: {0}")]
    SchemaConflict(String),
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    #[error("truncated input: {0}")]
    TruncatedInput(String),
    #[error("malformed tag: {0}")]
    MalformedTag(String),
    #[error("unknown message: {0}")]
    UnknownMessage(String),
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal: {0}")]
    Internal(String),
}

impl MetaWireError {
    /// Map to the stable diagnostic category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MetaWireError::Syntax(_) => ErrorKind::SyntaxError,
            MetaWireError::SchemaConflict(_) => ErrorKind::SchemaConflict,
            MetaWireError::TypeMismatch(_) => ErrorKind::TypeMismatch,
            MetaWireError::TruncatedInput(_) => ErrorKind::TruncatedInput,
            MetaWireError::MalformedTag(_) => ErrorKind::MalformedTag,
            MetaWireError::UnknownMessage(_) => ErrorKind::UnknownMessage,
            MetaWireError::PayloadTooLarge(_) => ErrorKind::PayloadTooLarge,
            MetaWireError::BadConfig(_) => ErrorKind::BadConfig,
            MetaWireError::UnsupportedVersion => ErrorKind::UnsupportedVersion,
            MetaWireError::Io(_) | MetaWireError::Internal(_) => ErrorKind::Internal,
        }
    }
}
