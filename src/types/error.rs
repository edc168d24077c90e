//! Error types and handling for Mosaic Store
//!
//! This module defines all error types used throughout the system,
//! optimized for zero-cost error propagation and clear diagnostics.

use thiserror::Error;

use crate::types::{FieldKind, Identifier};

/// Main result type used throughout the crate
pub type Result<T> = std::result::Result<T, StoreError>;

/// Main error type for the Mosaic Store
#[derive(Error, Debug)]
pub enum StoreError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Command-stream errors
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    /// A value of the wrong kind was assigned to a typed field.
    ///
    /// This is a programmer or data-corruption error; values are never
    /// silently coerced.
    #[error("Type mismatch for field `{field}`: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        /// Field (or dynamic property) name that rejected the write
        field: String,
        /// Kind declared by the field's schema
        expected: FieldKind,
        /// Kind of the assigned value
        actual: FieldKind,
    },

    /// An element of the wrong kind was pushed into a typed list
    #[error("List element mismatch: expected {expected:?}, got {actual:?}")]
    ElementMismatch {
        /// Element kind declared by the list's element type
        expected: FieldKind,
        /// Kind of the appended value
        actual: FieldKind,
    },

    /// A list write addressed an index past the end
    #[error("List index {index} out of bounds (length {length})")]
    IndexOutOfBounds {
        /// Index addressed by the write
        index: usize,
        /// Number of elements in the list
        length: usize,
    },

    /// A record payload referenced a type definition that does not exist
    /// in the registry after all types in the stream were instantiated
    #[error("Unknown type referenced: {0}")]
    UnknownType(Identifier),

    /// System execution ordering contains a cycle
    #[error("System ordering cycle: {0}")]
    SystemCycle(String),

    /// I/O errors from std
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Command-stream specific errors
#[derive(Error, Debug)]
pub enum StreamError {
    /// The stream ended inside a frame header or payload.
    ///
    /// A dangling incomplete frame aborts the whole read; no partial
    /// registry state is assumed committed.
    #[error("Truncated stream: needed {expected} bytes at offset {offset}, {available} available")]
    Truncated {
        /// Byte offset where the read started
        offset: usize,
        /// Bytes the read required
        expected: usize,
        /// Bytes remaining in the stream
        available: usize,
    },

    /// A declared frame payload length exceeds the configured limit
    #[error("Frame too large: {length} bytes (max: {max_length})")]
    FrameTooLarge {
        /// Declared payload length
        length: u32,
        /// Configured maximum payload length
        max_length: u32,
    },

    /// A value tag byte does not name a known value kind
    #[error("Invalid value tag {0:#04x}")]
    InvalidTag(u8),

    /// A command byte does not name a known command and strict mode is on
    #[error("Unknown command byte {0:#04x}")]
    UnknownCommand(u8),

    /// String payload is not valid UTF-8
    #[error("Invalid UTF-8 in string payload")]
    InvalidUtf8,

    /// Structural corruption inside a decoded payload
    #[error("Malformed payload: {0}")]
    Malformed(String),
}
