//! # CodeView
//!
//! Parser for the NB09/NB11 CodeView debug format embedded in old PE images.
//!
//! ## Layout
//!
//! ```text
//! base + 0           "NB09"                  signature
//! base + 4           u32 lfoDirectory        directory offset from base
//! base + lfoDir      directory header + entries
//! base + entry.off   subsection content (entry.size bytes)
//! ```
//!
//! Parsing is one sequential pass. The directory must be sound or nothing is
//! returned; a single broken subsection only loses that subsection (or, with
//! [`CodeViewParser::with_strict`], aborts the parse).
//!
//! ## Example
//!
//! ```rust,no_run
//! use cvlens_core::codeview;
//!
//! # fn example(blob: &[u8]) -> Result<(), cvlens_core::error::FormatError> {
//! let info = codeview::parse(blob, 0)?;
//! if let Some(location) = info.resolver().resolve_address(0x1022) {
//!     println!("{}:{}", location.file, location.line);
//! }
//! # Ok(())
//! # }
//! ```

pub mod directory;
pub mod records;
pub mod source_module;
pub mod subsection;

use std::fmt::{self, Write as _};

use tracing::{debug, info, warn};

use self::directory::{read_directory, DirectoryEntry, DirectoryHeader};
use self::records::{FileIndex, ModuleInfo, SegmentNameTable};
use self::source_module::SourceModule;
use self::subsection::{DecodeFn, SubsectionKind, SubsectionRecord, SubsectionRegistry};
use crate::cursor::Cursor;
use crate::error::FormatError;
use crate::resolver::AddressResolver;

/// Signatures whose directory layout we understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature
{
    /// `NB09` (CodeView 4)
    Nb09,
    /// `NB11` (CodeView 5, same directory layout)
    Nb11,
}

impl Signature
{
    fn from_bytes(bytes: [u8; 4]) -> Option<Self>
    {
        match &bytes {
            b"NB09" => Some(Signature::Nb09),
            // Same 16-byte directory header and 12-byte entries as NB09.
            b"NB11" => Some(Signature::Nb11),
            _ => None,
        }
    }
}

impl fmt::Display for Signature
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            Signature::Nb09 => "NB09",
            Signature::Nb11 => "NB11",
        };
        write!(f, "{label}")
    }
}

/// A decoded subsection together with the directory entry that led to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subsection
{
    /// Position of the entry in the directory.
    pub index: usize,
    /// The directory entry.
    pub entry: DirectoryEntry,
    /// Decoded content.
    pub record: SubsectionRecord,
}

/// A subsection that failed to decode and was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubsectionIssue
{
    /// Position of the entry in the directory.
    pub index: usize,
    /// Subsection kind.
    pub kind: SubsectionKind,
    /// Owning module index from the entry.
    pub module_index: u16,
    /// Why decoding failed.
    pub error: FormatError,
}

impl fmt::Display for SubsectionIssue
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(
            f,
            "entry #{} ({}, module {}): {}",
            self.index, self.kind, self.module_index, self.error
        )
    }
}

/// Everything recovered from one CodeView blob.
///
/// Immutable once built. Share it freely across threads for queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedDebugInfo
{
    signature: Signature,
    base: usize,
    header: DirectoryHeader,
    subsections: Vec<Subsection>,
    issues: Vec<SubsectionIssue>,
}

impl ParsedDebugInfo
{
    /// Signature found at the base.
    #[must_use]
    pub fn signature(&self) -> Signature
    {
        self.signature
    }

    /// Absolute position of the CodeView base in the byte source.
    #[must_use]
    pub fn base(&self) -> usize
    {
        self.base
    }

    /// The directory header.
    #[must_use]
    pub fn directory_header(&self) -> &DirectoryHeader
    {
        &self.header
    }

    /// All subsections in directory order, including unsupported ones.
    #[must_use]
    pub fn subsections(&self) -> &[Subsection]
    {
        &self.subsections
    }

    /// Subsections that were dropped because they failed to decode.
    #[must_use]
    pub fn issues(&self) -> &[SubsectionIssue]
    {
        &self.issues
    }

    /// Decoded `sstSrcModule` tables in directory order.
    pub fn source_modules(&self) -> impl Iterator<Item = &SourceModule>
    {
        self.records().filter_map(|record| match record {
            SubsectionRecord::SourceModule(module) => Some(module),
            _ => None,
        })
    }

    /// Decoded `sstModule` descriptors in directory order.
    pub fn modules(&self) -> impl Iterator<Item = &ModuleInfo>
    {
        self.records().filter_map(|record| match record {
            SubsectionRecord::ModuleInfo(module) => Some(module),
            _ => None,
        })
    }

    /// Library names from `sstLibraries`, if present.
    #[must_use]
    pub fn libraries(&self) -> Option<&[String]>
    {
        self.records().find_map(|record| match record {
            SubsectionRecord::LibraryList(libraries) => Some(libraries.as_slice()),
            _ => None,
        })
    }

    /// The `sstSegName` table, if present.
    #[must_use]
    pub fn segment_names(&self) -> Option<&SegmentNameTable>
    {
        self.records().find_map(|record| match record {
            SubsectionRecord::SegmentNames(names) => Some(names),
            _ => None,
        })
    }

    /// The `sstFileIndex` table, if present.
    #[must_use]
    pub fn file_index(&self) -> Option<&FileIndex>
    {
        self.records().find_map(|record| match record {
            SubsectionRecord::FileIndex(index) => Some(index),
            _ => None,
        })
    }

    /// Address/line resolver borrowing this parse result.
    #[must_use]
    pub fn resolver(&self) -> AddressResolver<'_>
    {
        AddressResolver::new(self.source_modules())
    }

    /// Render every line table as text.
    ///
    /// ```text
    /// main.c:
    ///     Segment #0 (4096 - 4200)
    ///         Line 10 @ 0x00001000 = 4096
    /// ```
    #[must_use]
    pub fn dump_line_tables(&self) -> String
    {
        let mut out = String::new();
        for file in self.source_modules().flat_map(SourceModule::files) {
            let _ = writeln!(out, "{}:", file.name());
            for (k, segment) in file.segments().iter().enumerate() {
                let _ = writeln!(out, "\tSegment #{k} ({} - {})", segment.start(), segment.end());
                for (offset, line) in segment.entries() {
                    let _ = writeln!(out, "\t\tLine {line} @ 0x{offset:08X} = {offset}");
                }
            }
        }
        out
    }

    fn records(&self) -> impl Iterator<Item = &SubsectionRecord>
    {
        self.subsections.iter().map(|subsection| &subsection.record)
    }
}

/// Configurable CodeView parser.
///
/// ## Example
///
/// ```rust
/// use cvlens_core::codeview::subsection::SubsectionKind;
/// use cvlens_core::codeview::CodeViewParser;
///
/// let parser = CodeViewParser::new()
///     .with_strict(true)
///     .without_decoder(SubsectionKind::SegName);
/// # let _ = parser;
/// ```
#[derive(Debug, Clone, Default)]
pub struct CodeViewParser
{
    registry: SubsectionRegistry,
    strict: bool,
}

impl CodeViewParser
{
    /// Lenient parser with the built-in decoders.
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// In strict mode the first subsection error aborts the parse instead of
    /// being recorded as an issue.
    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self
    {
        self.strict = strict;
        self
    }

    /// Install or replace the decoder for a subsection kind.
    #[must_use]
    pub fn with_decoder(mut self, kind: SubsectionKind, decoder: DecodeFn) -> Self
    {
        self.registry.register(kind, decoder);
        self
    }

    /// Skip a subsection kind entirely.
    #[must_use]
    pub fn without_decoder(mut self, kind: SubsectionKind) -> Self
    {
        self.registry.unregister(kind);
        self
    }

    /// Parse the CodeView blob starting at absolute position `base` of `bytes`.
    ///
    /// ## Errors
    ///
    /// - [`FormatError::BadSignature`] if the signature is not NB09/NB11
    /// - [`FormatError::Truncated`] if the signature, directory or directory
    ///   entries do not fit in `bytes`
    /// - [`FormatError::LayoutMismatch`] if the directory header declares
    ///   unexpected sizes
    /// - in strict mode, the first subsection error
    pub fn parse(&self, bytes: &[u8], base: usize) -> Result<ParsedDebugInfo, FormatError>
    {
        let source = Cursor::new(bytes);
        let mut cursor = source.window(base, bytes.len().saturating_sub(base), "CodeView header")?;
        if cursor.remaining() < 4 {
            return Err(FormatError::Truncated {
                what: "CodeView signature",
                needed: 4,
                available: cursor.remaining(),
            });
        }

        let mut found = [0u8; 4];
        found.copy_from_slice(cursor.read_bytes(4)?);
        let signature = Signature::from_bytes(found).ok_or(FormatError::BadSignature { found, position: base })?;
        if cursor.remaining() < 4 {
            return Err(FormatError::Truncated {
                what: "CodeView header",
                needed: 8,
                available: cursor.remaining() + 4,
            });
        }
        let directory_offset = cursor.read_le::<u32>()?;
        debug!("{signature} at {base:#x}, directory at +{directory_offset:#x}");

        let directory_start = usize::try_from(directory_offset)
            .ok()
            .and_then(|offset| base.checked_add(offset))
            .filter(|&start| start <= bytes.len())
            .ok_or(FormatError::Truncated {
                what: "directory header",
                needed: 16,
                available: 0,
            })?;
        let mut directory = source.window(directory_start, bytes.len() - directory_start, "directory")?;
        let (header, entries) = read_directory(&mut directory, base)?;

        let mut subsections = Vec::with_capacity(entries.len());
        let mut issues = Vec::new();
        for (index, entry) in entries.into_iter().enumerate() {
            match self.registry.decode(&entry, &source, base) {
                Ok(Some(record)) => subsections.push(Subsection { index, entry, record }),
                Ok(None) => subsections.push(Subsection {
                    index,
                    entry,
                    record: SubsectionRecord::Unsupported(entry.kind),
                }),
                Err(error) if self.strict => return Err(error),
                Err(error) => {
                    let issue = SubsectionIssue {
                        index,
                        kind: entry.kind,
                        module_index: entry.module_index,
                        error,
                    };
                    warn!("Dropping subsection {issue}");
                    issues.push(issue);
                }
            }
        }

        let info = ParsedDebugInfo {
            signature,
            base,
            header,
            subsections,
            issues,
        };
        info!(
            "Parsed {} subsections ({} source modules, {} dropped)",
            info.subsections.len(),
            info.source_modules().count(),
            info.issues.len()
        );
        Ok(info)
    }
}

/// Parse with default settings: built-in decoders, lenient error policy.
///
/// ## Errors
///
/// See [`CodeViewParser::parse`].
pub fn parse(bytes: &[u8], base: usize) -> Result<ParsedDebugInfo, FormatError>
{
    CodeViewParser::new().parse(bytes, base)
}
