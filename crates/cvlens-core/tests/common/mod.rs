//! In-memory CodeView fixtures shared by the integration tests.
//!
//! Layout written by [`CodeViewBuilder`]:
//!
//! ```text
//! [prefix bytes] "NB09" lfoDirectory | subsection 0 | subsection 1 | ... | directory
//! ```

#![allow(dead_code)]

pub const SST_MODULE: u16 = 0x120;
pub const SST_SYMBOLS: u16 = 0x124;
pub const SST_SRC_MODULE: u16 = 0x127;
pub const SST_LIBRARIES: u16 = 0x128;
pub const SST_GLOBAL_SYM: u16 = 0x129;
pub const SST_SEG_NAME: u16 = 0x12e;
pub const SST_FILE_INDEX: u16 = 0x133;

fn put_u16(out: &mut Vec<u8>, value: u16)
{
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut Vec<u8>, value: u32)
{
    out.extend_from_slice(&value.to_le_bytes());
}

fn patch_u32(out: &mut [u8], at: usize, value: u32)
{
    out[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn align4(out: &mut Vec<u8>)
{
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn put_prefixed(out: &mut Vec<u8>, name: &str)
{
    out.push(u8::try_from(name.len()).unwrap());
    out.extend_from_slice(name.as_bytes());
}

/// One file's line table within one segment.
#[derive(Debug, Clone)]
pub struct LineTable
{
    pub segment: u16,
    pub start: u32,
    pub end: u32,
    pub offsets: Vec<u32>,
    pub lines: Vec<u16>,
}

impl LineTable
{
    pub fn new(segment: u16, start: u32, end: u32, pairs: &[(u32, u16)]) -> Self
    {
        Self {
            segment,
            start,
            end,
            offsets: pairs.iter().map(|&(offset, _)| offset).collect(),
            lines: pairs.iter().map(|&(_, line)| line).collect(),
        }
    }
}

/// One source file entry of an `sstSrcModule`.
#[derive(Debug, Clone)]
pub struct FileSpec
{
    pub name: String,
    pub tables: Vec<LineTable>,
    pub pad: u16,
}

impl FileSpec
{
    pub fn new(name: &str, tables: Vec<LineTable>) -> Self
    {
        Self {
            name: name.to_string(),
            tables,
            pad: 0,
        }
    }

    pub fn with_pad(mut self, pad: u16) -> Self
    {
        self.pad = pad;
        self
    }
}

/// The running example: `main.c`, segment 1, range 100..=300, offsets
/// `[100, 200, 300]` mapping to lines `[10, 11, 12]`.
pub fn main_c() -> FileSpec
{
    FileSpec::new(
        "main.c",
        vec![LineTable::new(1, 100, 300, &[(100, 10), (200, 11), (300, 12)])],
    )
}

/// Encode an `sstSrcModule` subsection. Offsets inside are relative to the
/// first byte of the returned buffer.
pub fn source_module(files: &[FileSpec]) -> Vec<u8>
{
    let extents: Vec<&LineTable> = files.iter().flat_map(|file| file.tables.iter()).collect();

    let mut out = Vec::new();
    put_u16(&mut out, u16::try_from(files.len()).unwrap());
    put_u16(&mut out, u16::try_from(extents.len()).unwrap());
    let file_offsets_at = out.len();
    for _ in files {
        put_u32(&mut out, 0);
    }
    for table in &extents {
        put_u32(&mut out, table.start);
        put_u32(&mut out, table.end);
    }
    for table in &extents {
        put_u16(&mut out, table.segment);
    }
    align4(&mut out);

    for (i, file) in files.iter().enumerate() {
        let file_start = u32::try_from(out.len()).unwrap();
        patch_u32(&mut out, file_offsets_at + 4 * i, file_start);

        put_u16(&mut out, u16::try_from(file.tables.len()).unwrap());
        put_u16(&mut out, file.pad);
        let table_offsets_at = out.len();
        for _ in &file.tables {
            put_u32(&mut out, 0);
        }
        for table in &file.tables {
            put_u32(&mut out, table.start);
            put_u32(&mut out, table.end);
        }
        put_prefixed(&mut out, &file.name);
        align4(&mut out);

        for (k, table) in file.tables.iter().enumerate() {
            let table_start = u32::try_from(out.len()).unwrap();
            patch_u32(&mut out, table_offsets_at + 4 * k, table_start);

            put_u16(&mut out, table.segment);
            put_u16(&mut out, u16::try_from(table.offsets.len()).unwrap());
            for &offset in &table.offsets {
                put_u32(&mut out, offset);
            }
            for &line in &table.lines {
                put_u16(&mut out, line);
            }
            align4(&mut out);
        }
    }
    out
}

/// Encode an `sstLibraries` subsection.
pub fn libraries(names: &[&str]) -> Vec<u8>
{
    let mut out = Vec::new();
    for name in names {
        put_prefixed(&mut out, name);
    }
    out
}

/// Encode an `sstSegName` subsection.
pub fn segment_names(names: &[&str]) -> Vec<u8>
{
    let mut out = Vec::new();
    for name in names {
        out.extend_from_slice(name.as_bytes());
        out.push(0);
    }
    out
}

/// Encode an `sstModule` subsection with `(segment, pad, offset, size)` descriptors.
pub fn module_info(name: &str, library_index: u16, segments: &[(u16, u16, u32, u32)]) -> Vec<u8>
{
    let mut out = Vec::new();
    put_u16(&mut out, 0);
    put_u16(&mut out, library_index);
    put_u16(&mut out, u16::try_from(segments.len()).unwrap());
    out.extend_from_slice(b"CV");
    for &(segment, pad, offset, size) in segments {
        put_u16(&mut out, segment);
        put_u16(&mut out, pad);
        put_u32(&mut out, offset);
        put_u32(&mut out, size);
    }
    put_prefixed(&mut out, name);
    out
}

/// Encode an `sstGlobalSym` header with no symbol data.
pub fn global_symbols(symbols_size: u32) -> Vec<u8>
{
    let mut out = Vec::new();
    put_u16(&mut out, 10);
    put_u16(&mut out, 12);
    put_u32(&mut out, symbols_size);
    put_u32(&mut out, 0);
    put_u32(&mut out, 0);
    out
}

/// Encode an `sstFileIndex` subsection. `modules[m]` lists the names
/// referenced by module `m + 1`.
pub fn file_index(modules: &[&[&str]]) -> Vec<u8>
{
    let mut unique: Vec<&str> = Vec::new();
    let mut name_offsets = Vec::new();
    let mut starts = Vec::new();
    let mut counts = Vec::new();

    // Name offsets are filled in once the string block layout is known.
    let mut refs = Vec::new();
    for files in modules {
        starts.push(u16::try_from(refs.len()).unwrap());
        counts.push(u16::try_from(files.len()).unwrap());
        for &file in *files {
            let slot = match unique.iter().position(|&known| known == file) {
                Some(slot) => slot,
                None => {
                    unique.push(file);
                    unique.len() - 1
                }
            };
            refs.push(slot);
        }
    }

    let mut string_offsets = Vec::new();
    let mut cursor = 0u32;
    for name in &unique {
        string_offsets.push(cursor);
        cursor += 1 + u32::try_from(name.len()).unwrap();
    }
    for slot in refs {
        name_offsets.push(string_offsets[slot]);
    }

    let mut out = Vec::new();
    put_u16(&mut out, u16::try_from(modules.len()).unwrap());
    put_u16(&mut out, u16::try_from(name_offsets.len()).unwrap());
    for start in starts {
        put_u16(&mut out, start);
    }
    for count in counts {
        put_u16(&mut out, count);
    }
    for offset in name_offsets {
        put_u32(&mut out, offset);
    }
    for name in unique {
        put_prefixed(&mut out, name);
    }
    out
}

struct Entry
{
    kind: u16,
    module: u16,
    bytes: Vec<u8>,
}

/// Assembles a complete CodeView blob.
pub struct CodeViewBuilder
{
    prefix: usize,
    signature: [u8; 4],
    header_size: u16,
    entry_size: u16,
    declared_count: Option<u32>,
    entries: Vec<Entry>,
}

impl Default for CodeViewBuilder
{
    fn default() -> Self
    {
        Self::new()
    }
}

impl CodeViewBuilder
{
    pub fn new() -> Self
    {
        Self {
            prefix: 0,
            signature: *b"NB09",
            header_size: 16,
            entry_size: 12,
            declared_count: None,
            entries: Vec::new(),
        }
    }

    /// Put `len` junk bytes before the signature, so the base is `len`.
    pub fn prefix(mut self, len: usize) -> Self
    {
        self.prefix = len;
        self
    }

    pub fn signature(mut self, signature: &[u8; 4]) -> Self
    {
        self.signature = *signature;
        self
    }

    pub fn header_size(mut self, size: u16) -> Self
    {
        self.header_size = size;
        self
    }

    pub fn entry_size(mut self, size: u16) -> Self
    {
        self.entry_size = size;
        self
    }

    /// Claim `count` entries in the header regardless of how many are written.
    pub fn declared_count(mut self, count: u32) -> Self
    {
        self.declared_count = Some(count);
        self
    }

    pub fn subsection(mut self, kind: u16, module: u16, bytes: Vec<u8>) -> Self
    {
        self.entries.push(Entry { kind, module, bytes });
        self
    }

    pub fn source_module(self, module: u16, files: &[FileSpec]) -> Self
    {
        self.subsection(SST_SRC_MODULE, module, source_module(files))
    }

    pub fn build(&self) -> Vec<u8>
    {
        let mut out = vec![0xcc; self.prefix];
        let base = out.len();
        out.extend_from_slice(&self.signature);
        put_u32(&mut out, 0);

        let mut placed = Vec::new();
        for entry in &self.entries {
            align4(&mut out);
            placed.push(u32::try_from(out.len() - base).unwrap());
            out.extend_from_slice(&entry.bytes);
        }
        align4(&mut out);

        let directory = u32::try_from(out.len() - base).unwrap();
        patch_u32(&mut out, base + 4, directory);

        let count = self
            .declared_count
            .unwrap_or_else(|| u32::try_from(self.entries.len()).unwrap());
        put_u16(&mut out, self.header_size);
        put_u16(&mut out, self.entry_size);
        put_u32(&mut out, count);
        put_u32(&mut out, 0);
        put_u32(&mut out, 0);
        for (entry, offset) in self.entries.iter().zip(placed) {
            put_u16(&mut out, entry.kind);
            put_u16(&mut out, entry.module);
            put_u32(&mut out, offset);
            put_u32(&mut out, u32::try_from(entry.bytes.len()).unwrap());
        }
        out
    }
}
