//! Global constants used throughout the Mosaic Store codebase
//!
//! This module contains compile-time constants shared across multiple
//! modules to ensure consistency and avoid magic numbers.

/// Length of an [`Identifier`](crate::Identifier) in bytes.
///
/// Identifiers are opaque 128-bit values; 16 bytes gives enough entropy
/// for random generation while keeping records cheap to key and compare.
pub const IDENTIFIER_LENGTH: usize = 16;

/// Namespace for content-derived identifiers.
///
/// Built-in type definitions derive their identifiers from a well-known
/// name hashed into this namespace, so independently loaded modules agree
/// on the identity of shared primitives.
pub const NAME_NAMESPACE: [u8; 16] = [
    0x6d, 0x6f, 0x73, 0x61, 0x69, 0x63, 0x2d, 0x73, 0x74, 0x6f, 0x72, 0x65, 0x2d, 0x69, 0x64,
    0x73,
];

/// Size of a command-stream frame header in bytes.
///
/// Every frame starts with a 1-byte command followed by a 4-byte
/// little-endian payload length.
pub const FRAME_HEADER_LENGTH: usize = 5;

/// Default maximum accepted payload length for a single frame (64MB).
///
/// A frame longer than this is treated as corruption rather than an
/// allocation request.
pub const DEFAULT_MAX_FRAME_LENGTH: u32 = 64 * 1024 * 1024;

/// Maximum depth followed through base-type chains and nested default
/// values before the walk stops.
///
/// Authored schemas never come close; the cap turns a cyclic base chain
/// into a bounded walk instead of a hang.
pub const MAX_SCHEMA_DEPTH: usize = 64;
