//! Decoders for subsections that carry no address/line data.
//!
//! These are plain containers: module descriptors, library and segment name
//! lists, the global symbol table header and the file index. They all read
//! inside a cursor windowed to the subsection, so the declared size is the
//! byte budget.

use tracing::trace;

use super::directory::DirectoryEntry;
use super::subsection::SubsectionRecord;
use crate::cursor::Cursor;
use crate::error::FormatError;

/// Debugging style tag for CodeView modules (`"CV"`).
pub const STYLE_CODEVIEW: u16 = u16::from_le_bytes(*b"CV");

/// `sstModule`: one object module and the code it contributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo
{
    /// Overlay number.
    pub overlay: u16,
    /// 1-based index into the library list, 0 if not from a library.
    pub library_index: u16,
    /// Debugging style; [`STYLE_CODEVIEW`] for everything we read.
    pub style: u16,
    /// Code contributions, one per segment.
    pub segments: Vec<ModuleSegment>,
    /// Module (object file) name.
    pub name: String,
}

/// Code contributed by a module to one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleSegment
{
    /// Segment index.
    pub segment: u16,
    /// Offset of the first byte within the segment.
    pub offset: u32,
    /// Number of bytes contributed.
    pub size: u32,
}

/// Header of `sstGlobalSym`. The symbol records themselves are not decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalSymbolsHeader
{
    /// Symbol hash function index (0 = no hash data).
    pub symbol_hash: u16,
    /// Address hash function index (0 = no hash data).
    pub address_hash: u16,
    /// Bytes of symbol records.
    pub symbols_size: u32,
    /// Bytes of symbol hash table.
    pub symbol_hash_size: u32,
    /// Bytes of address hash table.
    pub address_hash_size: u32,
}

/// `sstSegName`: names addressed by their byte offset in the table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentNameTable
{
    names: Vec<(u32, String)>,
}

impl SegmentNameTable
{
    /// Names in table order.
    pub fn names(&self) -> impl Iterator<Item = &str>
    {
        self.names.iter().map(|(_, name)| name.as_str())
    }

    /// Name starting at `offset` bytes into the table.
    #[must_use]
    pub fn by_offset(&self, offset: u32) -> Option<&str>
    {
        self.names
            .iter()
            .find(|(start, _)| *start == offset)
            .map(|(_, name)| name.as_str())
    }

    /// Number of names.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.names.len()
    }

    /// `true` when the table holds no names.
    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.names.is_empty()
    }
}

/// `sstFileIndex`: every source file that contributes code, per module.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileIndex
{
    /// For each module, index of its first entry in `name_offsets`.
    pub module_starts: Vec<u16>,
    /// For each module, number of entries in `name_offsets`.
    pub reference_counts: Vec<u16>,
    /// Offsets into the name table.
    pub name_offsets: Vec<u32>,
    names: Vec<(u32, String)>,
}

impl FileIndex
{
    /// All file names in table order.
    pub fn names(&self) -> impl Iterator<Item = &str>
    {
        self.names.iter().map(|(_, name)| name.as_str())
    }

    /// Name starting at `offset` bytes into the name table.
    #[must_use]
    pub fn name_at(&self, offset: u32) -> Option<&str>
    {
        self.names
            .iter()
            .find(|(start, _)| *start == offset)
            .map(|(_, name)| name.as_str())
    }

    /// Source files referenced by `module` (1-based, as in the directory).
    ///
    /// Returns an empty list for an unknown module. References that point
    /// into the padding past the last name are skipped.
    #[must_use]
    pub fn module_files(&self, module: u16) -> Vec<&str>
    {
        let Some(index) = usize::from(module).checked_sub(1) else {
            return Vec::new();
        };
        let (Some(&start), Some(&count)) = (self.module_starts.get(index), self.reference_counts.get(index)) else {
            return Vec::new();
        };

        let start = usize::from(start);
        let end = start.saturating_add(usize::from(count)).min(self.name_offsets.len());
        self.name_offsets
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .filter_map(|&offset| self.name_at(offset))
            .collect()
    }
}

/// Decode an `sstModule` subsection.
///
/// ## Errors
///
/// [`FormatError::BadPadding`] if a segment descriptor's reserved field is
/// non-zero, [`FormatError::OutOfBounds`] if the record overruns its size.
pub fn decode_module_info(cursor: &mut Cursor<'_>, _entry: &DirectoryEntry) -> Result<SubsectionRecord, FormatError>
{
    let overlay = cursor.read_le()?;
    let library_index = cursor.read_le()?;
    let segment_count = usize::from(cursor.read_le::<u16>()?);
    let style = cursor.read_le()?;

    cursor.ensure(segment_count, 12)?;
    let mut segments = Vec::with_capacity(segment_count);
    for _ in 0..segment_count {
        let segment = cursor.read_le()?;
        let position = cursor.pos();
        let pad = cursor.read_le::<u16>()?;
        if pad != 0 {
            return Err(FormatError::BadPadding { position, value: pad });
        }
        segments.push(ModuleSegment {
            segment,
            offset: cursor.read_le()?,
            size: cursor.read_le()?,
        });
    }

    let name = cursor.read_prefixed_string()?;
    trace!("Module {name:?}: {} segments", segments.len());

    Ok(SubsectionRecord::ModuleInfo(ModuleInfo {
        overlay,
        library_index,
        style,
        segments,
        name,
    }))
}

/// Decode an `sstLibraries` subsection.
///
/// The first name is conventionally empty because library indices are
/// 1-based. Any later empty name marks the start of trailing padding.
///
/// ## Errors
///
/// [`FormatError::OutOfBounds`] if a name overruns the subsection.
pub fn decode_libraries(cursor: &mut Cursor<'_>, _entry: &DirectoryEntry) -> Result<SubsectionRecord, FormatError>
{
    let mut libraries = Vec::new();
    while cursor.remaining() > 0 {
        let name = cursor.read_prefixed_string()?;
        if name.is_empty() && !libraries.is_empty() {
            break;
        }
        libraries.push(name);
    }
    Ok(SubsectionRecord::LibraryList(libraries))
}

/// Decode the header of an `sstGlobalSym` subsection.
///
/// ## Errors
///
/// [`FormatError::OutOfBounds`] if the subsection is shorter than the header.
pub fn decode_global_symbols(cursor: &mut Cursor<'_>, _entry: &DirectoryEntry) -> Result<SubsectionRecord, FormatError>
{
    Ok(SubsectionRecord::GlobalSymbols(GlobalSymbolsHeader {
        symbol_hash: cursor.read_le()?,
        address_hash: cursor.read_le()?,
        symbols_size: cursor.read_le()?,
        symbol_hash_size: cursor.read_le()?,
        address_hash_size: cursor.read_le()?,
    }))
}

/// Decode an `sstSegName` subsection (zero-terminated strings).
///
/// ## Errors
///
/// [`FormatError::OutOfBounds`] if the last name has no terminator.
pub fn decode_segment_names(cursor: &mut Cursor<'_>, _entry: &DirectoryEntry) -> Result<SubsectionRecord, FormatError>
{
    let table_start = cursor.start();
    let mut names = Vec::new();
    while cursor.remaining() > 0 {
        let offset = relative_offset(cursor, table_start);
        let name = cursor.read_cstring()?;
        if name.is_empty() {
            break;
        }
        names.push((offset, name));
    }
    Ok(SubsectionRecord::SegmentNames(SegmentNameTable { names }))
}

/// Decode an `sstFileIndex` subsection.
///
/// ## Errors
///
/// [`FormatError::OutOfBounds`] if the declared counts or names overrun the
/// subsection.
pub fn decode_file_index(cursor: &mut Cursor<'_>, _entry: &DirectoryEntry) -> Result<SubsectionRecord, FormatError>
{
    let module_count = usize::from(cursor.read_le::<u16>()?);
    let reference_count = usize::from(cursor.read_le::<u16>()?);

    let module_starts = cursor.read_le_vec(module_count)?;
    let reference_counts = cursor.read_le_vec(module_count)?;
    let name_offsets = cursor.read_le_vec(reference_count)?;

    let names_start = cursor.pos();
    let mut names = Vec::new();
    while cursor.remaining() > 0 {
        let offset = relative_offset(cursor, names_start);
        let name = cursor.read_prefixed_string()?;
        if name.is_empty() {
            break;
        }
        names.push((offset, name));
    }

    Ok(SubsectionRecord::FileIndex(FileIndex {
        module_starts,
        reference_counts,
        name_offsets,
        names,
    }))
}

fn relative_offset(cursor: &Cursor<'_>, origin: usize) -> u32
{
    u32::try_from(cursor.pos() - origin).unwrap_or(u32::MAX)
}
