//! # Error Types
//!
//! Error handling for CodeView parsing and executable loading.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and readable messages. There are two layers:
//!
//! - [`FormatError`]: something in the CodeView bytes is wrong. Every variant
//!   carries the position (or field) that triggered it so a report can point at
//!   the offending byte.
//! - [`CvError`]: everything a caller of the crate can hit, including I/O and
//!   host-executable problems. Format errors convert into it with `?`.
//!
//! An unknown subsection type is *not* an error. The registry returns `None`
//! for it and the directory walk keeps going.

use thiserror::Error;

/// Structural problem in a CodeView blob.
///
/// ## Error Categories
///
/// 1. **Directory errors** (fatal for the whole parse): `BadSignature`,
///    `Truncated`, `LayoutMismatch`
/// 2. **Subsection errors** (scoped to one subsection): `OutOfBounds`,
///    `BadPadding`, `NonMonotonicOffsets`, `InvertedRange`
/// 3. **Construction errors**: `LineCountMismatch`, raised when a line table
///    is built by hand from offset and line vectors of different lengths
///
/// `Truncated` can also be raised for a single subsection when its directory
/// entry claims more bytes than the blob holds.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError
{
    /// The four bytes at the CodeView base are not a known signature.
    #[error("Bad CodeView signature {found:?} at position {position:#x}, expected \"NB09\" or \"NB11\"")]
    BadSignature
    {
        /// The raw bytes found at the base
        found: [u8; 4],
        /// Absolute position of the signature
        position: usize,
    },

    /// A declared count or size needs more bytes than remain in the source.
    ///
    /// This is what a directory header claiming 5 entries with room for only
    /// 2 produces. Nothing past the end of the buffer is ever read.
    #[error("Truncated {what}: need {needed} bytes, only {available} available")]
    Truncated
    {
        /// What was being read
        what: &'static str,
        /// Bytes required by the declared count/size
        needed: usize,
        /// Bytes actually left
        available: usize,
    },

    /// A decoder tried to read or seek outside its subsection.
    #[error("Read of {len} bytes at position {position:#x} crosses subsection limit {limit:#x}")]
    OutOfBounds
    {
        /// Absolute position of the attempted read or seek
        position: usize,
        /// Number of bytes requested
        len: usize,
        /// Absolute end of the subsection
        limit: usize,
    },

    /// A field that must be zero was not.
    ///
    /// The per-file header of a source module carries a 16-bit pad after its
    /// segment count. A non-zero value means the record is corrupt or uses a
    /// variant we do not understand.
    #[error("Non-zero padding {value:#06x} at position {position:#x}")]
    BadPadding
    {
        /// Absolute position of the pad field
        position: usize,
        /// Value found
        value: u16,
    },

    /// A size field in the directory header disagrees with the fixed layout.
    #[error("Directory {field} is {declared}, expected {expected}")]
    LayoutMismatch
    {
        /// Name of the header field
        field: &'static str,
        /// Value declared in the file
        declared: u32,
        /// Value implied by the structure layout
        expected: u32,
    },

    /// A line table whose code offsets go backwards.
    #[error("Line table for segment {segment} is not sorted: offset at index {index} decreases")]
    NonMonotonicOffsets
    {
        /// Segment identifier of the line table
        segment: u16,
        /// Index of the first offset smaller than its predecessor
        index: usize,
    },

    /// A per-file segment range whose start lies after its end.
    #[error("Segment {segment} range is inverted: start {start:#x} > end {end:#x}")]
    InvertedRange
    {
        /// Segment identifier of the range
        segment: u16,
        /// Declared start offset
        start: u32,
        /// Declared end offset
        end: u32,
    },

    /// Offsets and line numbers of a line table do not pair up.
    #[error("Line table for segment {segment} has {offsets} offsets but {lines} line numbers")]
    LineCountMismatch
    {
        /// Segment identifier of the line table
        segment: u16,
        /// Number of code offsets given
        offsets: usize,
        /// Number of line numbers given
        lines: usize,
    },
}

/// Main error type for cvlens operations.
#[derive(Error, Debug)]
pub enum CvError
{
    /// The CodeView data itself is malformed.
    #[error("Invalid CodeView data: {0}")]
    Format(#[from] FormatError),

    /// The host executable could not be understood.
    ///
    /// Raised by the executable facade when the PE container is malformed or
    /// uses a machine class we do not read.
    #[error("Invalid executable: {0}")]
    Executable(String),

    /// The executable has no CodeView debug directory entry.
    #[error("No CodeView debug information found in {0}")]
    NoDebugInfo(String),

    /// I/O error (for file operations, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for `Result<T, CvError>`
///
/// ```rust
/// use cvlens_core::error::CvResult;
/// fn foo() -> CvResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type CvResult<T> = std::result::Result<T, CvError>;
