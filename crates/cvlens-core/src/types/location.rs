//! Source location types.

use std::fmt;

/// Result of an address lookup: the file and line that produced the code.
///
/// Borrows the file name from the parse result it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceLocation<'a>
{
    /// File name exactly as recorded in the line table.
    pub file: &'a str,
    /// Line number.
    pub line: u16,
    /// Segment whose line table matched.
    pub segment: u16,
}

impl<'a> SourceLocation<'a>
{
    /// `(file, line)` pair, convenient for comparisons in tests and reports.
    ///
    /// The file name keeps the lifetime of the parse result, not of `self`.
    #[must_use]
    pub fn file_line(&self) -> (&'a str, u16)
    {
        (self.file, self.line)
    }
}

impl fmt::Display for SourceLocation<'_>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}:{}", self.file, self.line)
    }
}
