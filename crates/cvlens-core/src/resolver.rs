//! # Address Resolver
//!
//! Address-to-line and line-to-address queries over decoded source modules.
//!
//! The resolver only borrows the parse result. Address lookups walk the
//! modules in directory order and stop at the first file segment whose range
//! contains the offset; inside that segment the line whose code starts at the
//! greatest offset not above the query wins. Line lookups go through a
//! name index that is built on first use and keeps the same
//! file-then-segment-then-position order a linear scan would.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cvlens_core::codeview;
//!
//! # fn example(blob: &[u8]) -> Result<(), cvlens_core::error::FormatError> {
//! let info = codeview::parse(blob, 0)?;
//! let resolver = info.resolver();
//! if let Some(offset) = resolver.resolve_line("main.c", 42) {
//!     assert_eq!(resolver.resolve_address(offset).map(|loc| loc.line), Some(42));
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use once_cell::sync::OnceCell;
use tracing::trace;

use crate::codeview::source_module::{SourceFile, SourceModule};
use crate::types::SourceLocation;

/// Read-only query view over a set of source modules.
#[derive(Debug)]
pub struct AddressResolver<'a>
{
    modules: Vec<&'a SourceModule>,
    by_name: OnceCell<HashMap<&'a str, Vec<&'a SourceFile>>>,
}

impl<'a> AddressResolver<'a>
{
    /// Resolver over `modules`, kept in the order given.
    pub fn new(modules: impl IntoIterator<Item = &'a SourceModule>) -> Self
    {
        Self {
            modules: modules.into_iter().collect(),
            by_name: OnceCell::new(),
        }
    }

    /// Every source file, module by module.
    pub fn files(&self) -> impl Iterator<Item = &'a SourceFile> + '_
    {
        self.modules.iter().flat_map(|module| module.files().iter())
    }

    /// Map a code offset to the file and line that produced it.
    ///
    /// Returns `None` when no file segment's range contains `code_offset`.
    /// Code outside every recorded module (runtime libraries, for instance)
    /// is an ordinary miss, not an error.
    #[must_use]
    pub fn resolve_address(&self, code_offset: u32) -> Option<SourceLocation<'a>>
    {
        for file in self.files() {
            for segment in file.segments() {
                if !segment.contains(code_offset) {
                    continue;
                }
                if let Some(line) = segment.line_at(code_offset) {
                    trace!("{code_offset:#x} -> {}:{line}", file.name());
                    return Some(SourceLocation {
                        file: file.name(),
                        line,
                        segment: segment.segment(),
                    });
                }
            }
        }
        None
    }

    /// Map a file and line to the code offset where that line starts.
    ///
    /// `file` must match the recorded name exactly (case-sensitive). Returns
    /// `None` if the file is unknown or the line never starts a recorded
    /// range.
    #[must_use]
    pub fn resolve_line(&self, file: &str, line: u16) -> Option<u32>
    {
        self.name_index()
            .get(file)?
            .iter()
            .flat_map(|source| source.segments())
            .find_map(|segment| segment.offset_of(line))
    }

    fn name_index(&self) -> &HashMap<&'a str, Vec<&'a SourceFile>>
    {
        self.by_name.get_or_init(|| {
            let mut index: HashMap<&'a str, Vec<&'a SourceFile>> = HashMap::new();
            for file in self.files() {
                index.entry(file.name()).or_default().push(file);
            }
            index
        })
    }
}
