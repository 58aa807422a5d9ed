use std::{fmt::Display, io};

use crate::schema::FieldType;
use crate::values::ValueError;

/// Errors raised while translating an event stream into an output encoding.
///
/// Any `Io` variant is fatal to the export session: the binary format has no
/// resynchronization markers, so a truncated write cannot be continued.
#[derive(Debug)]
pub enum ExportError {
    /// An event arrived out of the expected nesting order.
    Structural {
        event: &'static str,
        depth: usize,
        message: String,
    },
    /// A node type name that neither the built-in vocabulary nor the
    /// document's prototype declarations can resolve.
    UnknownNode(String),
    /// A field name with no declaration on the node type carrying it.
    UnknownField { node: String, field: String },
    /// A DEF name referenced (by USE or ROUTE) but never declared.
    UnknownDef(String),
    /// A value does not fit the bit width computed for it. Can only happen
    /// when the two passes observed different documents.
    BitWidthOverflow { value: u64, width: u32 },
    /// A raw field value failed to parse as its declared type.
    Value(ValueError),
    Io(io::Error),
}

impl Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Structural {
                event,
                depth,
                message,
            } => f.write_fmt(format_args!(
                "protocol violation: {} at depth {}: {}",
                event, depth, message
            )),
            Self::UnknownNode(name) => {
                f.write_fmt(format_args!("unknown node type '{}'", name))
            }
            Self::UnknownField { node, field } => f.write_fmt(format_args!(
                "unknown field '{}' for node type '{}'",
                field, node
            )),
            Self::UnknownDef(name) => f.write_fmt(format_args!("unknown DEF name '{}'", name)),
            Self::BitWidthOverflow { value, width } => f.write_fmt(format_args!(
                "value {} does not fit in {} bits",
                value, width
            )),
            Self::Value(err) => f.write_fmt(format_args!("value error: {}", err)),
            Self::Io(err) => f.write_fmt(format_args!("io error: {}", err)),
        }
    }
}

impl From<io::Error> for ExportError {
    fn from(err: io::Error) -> ExportError {
        ExportError::Io(err)
    }
}

impl From<ValueError> for ExportError {
    fn from(err: ValueError) -> ExportError {
        ExportError::Value(err)
    }
}

/// Errors raised while reading a binary stream back into events.
#[derive(Debug)]
pub enum DecodeError {
    Io(io::Error),
    /// Framing or dictionary data that cannot be interpreted, with the byte
    /// offset where interpretation failed.
    Malformed { message: String, offset: usize },
    /// A field record selected a compression method with no registered
    /// strategy for the field's type.
    UnknownMethod { field_type: FieldType, method: u8 },
    /// The handler consuming decoded events failed.
    Handler(Box<ExportError>),
}

impl DecodeError {
    pub fn at(offset: usize, message: impl Into<String>) -> DecodeError {
        DecodeError::Malformed {
            message: message.into(),
            offset,
        }
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => f.write_fmt(format_args!("io error: {}", err)),
            Self::Malformed { message, offset } => {
                f.write_fmt(format_args!("malformed stream at byte {}: {}", offset, message))
            }
            Self::UnknownMethod { field_type, method } => f.write_fmt(format_args!(
                "no strategy registered for {} with compression method {}",
                field_type, method
            )),
            Self::Handler(err) => f.write_fmt(format_args!("handler error: {}", err)),
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(err: io::Error) -> DecodeError {
        DecodeError::Io(err)
    }
}

impl From<ExportError> for DecodeError {
    fn from(err: ExportError) -> DecodeError {
        DecodeError::Handler(Box::new(err))
    }
}

pub type ExportResult<T> = Result<T, ExportError>;
pub type DecodeResult<T> = Result<T, DecodeError>;
