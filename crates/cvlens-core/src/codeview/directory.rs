//! Subsection directory: the fixed header plus the array of entries that
//! point at every subsection in the blob.

use tracing::{debug, trace};

use super::subsection::SubsectionKind;
use crate::cursor::Cursor;
use crate::error::FormatError;

/// Size of the directory header as laid out on disk.
pub const DIRECTORY_HEADER_SIZE: u16 = 16;

/// Size of a single directory entry as laid out on disk.
pub const DIRECTORY_ENTRY_SIZE: u16 = 12;

/// Module index reserved for subsections not owned by a single module.
pub const NO_MODULE: u16 = 0xffff;

/// Header that precedes the directory entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryHeader
{
    /// Declared length of this header.
    pub header_size: u16,
    /// Declared length of each entry.
    pub entry_size: u16,
    /// Number of entries that follow.
    pub entry_count: u32,
    /// Offset of a chained directory. Written by incremental linkers, never
    /// followed.
    pub next_directory: u32,
    /// No flags are defined.
    pub flags: u32,
}

/// One directory entry: where a subsection lives and what it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryEntry
{
    /// Subsection type tag.
    pub kind: SubsectionKind,
    /// 1-based owning module, or [`NO_MODULE`].
    pub module_index: u16,
    /// Content offset from the CodeView base.
    pub offset: u32,
    /// Content size in bytes.
    pub size: u32,
}

impl DirectoryEntry
{
    /// Owning module, or `None` for global tables.
    #[must_use]
    pub fn module(&self) -> Option<u16>
    {
        (self.module_index != NO_MODULE).then_some(self.module_index)
    }
}

/// Read the directory header and all of its entries.
///
/// `cursor` must sit on the directory header. `base` is only used for
/// diagnostics here; entry offsets stay relative until dispatch.
///
/// ## Errors
///
/// - [`FormatError::LayoutMismatch`] if the header or entry size disagrees
///   with the fixed layout
/// - [`FormatError::Truncated`] if the entry array does not fit in the bytes
///   left after the header
pub fn read_directory(cursor: &mut Cursor<'_>, base: usize) -> Result<(DirectoryHeader, Vec<DirectoryEntry>), FormatError>
{
    let available = cursor.remaining();
    if available < usize::from(DIRECTORY_HEADER_SIZE) {
        return Err(FormatError::Truncated {
            what: "directory header",
            needed: usize::from(DIRECTORY_HEADER_SIZE),
            available,
        });
    }

    let header = DirectoryHeader {
        header_size: cursor.read_le()?,
        entry_size: cursor.read_le()?,
        entry_count: cursor.read_le()?,
        next_directory: cursor.read_le()?,
        flags: cursor.read_le()?,
    };

    if header.header_size != DIRECTORY_HEADER_SIZE {
        return Err(FormatError::LayoutMismatch {
            field: "header size",
            declared: u32::from(header.header_size),
            expected: u32::from(DIRECTORY_HEADER_SIZE),
        });
    }
    if header.entry_size != DIRECTORY_ENTRY_SIZE {
        return Err(FormatError::LayoutMismatch {
            field: "entry size",
            declared: u32::from(header.entry_size),
            expected: u32::from(DIRECTORY_ENTRY_SIZE),
        });
    }

    let count = usize::try_from(header.entry_count).unwrap_or(usize::MAX);
    let needed = count.saturating_mul(usize::from(DIRECTORY_ENTRY_SIZE));
    if needed > cursor.remaining() {
        return Err(FormatError::Truncated {
            what: "directory entries",
            needed,
            available: cursor.remaining(),
        });
    }

    debug!(
        "Directory at {:#x} (base {:#x}): {} entries",
        cursor.pos() - usize::from(DIRECTORY_HEADER_SIZE),
        base,
        count
    );

    let mut entries = Vec::with_capacity(count);
    for _ in 0..count {
        let entry = DirectoryEntry {
            kind: SubsectionKind::from(cursor.read_le::<u16>()?),
            module_index: cursor.read_le()?,
            offset: cursor.read_le()?,
            size: cursor.read_le()?,
        };
        trace!(
            "Entry {:?} module={} offset={:#x} size={:#x}",
            entry.kind,
            entry.module_index,
            entry.offset,
            entry.size
        );
        entries.push(entry);
    }

    Ok((header, entries))
}
