//! # Subsection Dispatch
//!
//! Every directory entry carries a type tag. [`SubsectionRegistry`] maps each
//! tag to a decode function; tags without a decoder are skipped, so a file
//! with subsections we do not understand still yields the ones we do.
//!
//! ## Example
//!
//! ```rust
//! use cvlens_core::codeview::subsection::{SubsectionKind, SubsectionRegistry};
//!
//! let registry = SubsectionRegistry::with_builtin();
//! assert!(registry.supports(SubsectionKind::SrcModule));
//! assert!(!registry.supports(SubsectionKind::Types));
//! ```

use std::collections::HashMap;
use std::fmt;

use tracing::trace;

use super::directory::DirectoryEntry;
use super::records::{self, FileIndex, GlobalSymbolsHeader, ModuleInfo, SegmentNameTable};
use super::source_module::{self, SourceModule};
use crate::cursor::Cursor;
use crate::error::FormatError;

/// Subsection type tag (`sst*` constants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubsectionKind
{
    /// `sstModule`: per-module segment contributions and name
    Module,
    /// `sstTypes`
    Types,
    /// `sstPublic` (legacy public symbols)
    Public,
    /// `sstPublicSym`
    PublicSym,
    /// `sstSymbols`
    Symbols,
    /// `sstAlignSym`
    AlignSym,
    /// `sstSrcLnSeg` (legacy line numbers)
    SrcLnSeg,
    /// `sstSrcModule`: the file/segment/line tables
    SrcModule,
    /// `sstLibraries`
    Libraries,
    /// `sstGlobalSym`
    GlobalSym,
    /// `sstGlobalPub`
    GlobalPub,
    /// `sstGlobalTypes`
    GlobalTypes,
    /// `sstMPC`
    Mpc,
    /// `sstSegMap`
    SegMap,
    /// `sstSegName`
    SegName,
    /// `sstPreComp`
    PreComp,
    /// `sstFileIndex`
    FileIndex,
    /// `sstStaticSym`
    StaticSym,
    /// Any tag not listed above
    Other(u16),
}

impl SubsectionKind
{
    /// Raw 16-bit tag.
    #[must_use]
    pub fn raw(self) -> u16
    {
        match self {
            SubsectionKind::Module => 0x120,
            SubsectionKind::Types => 0x121,
            SubsectionKind::Public => 0x122,
            SubsectionKind::PublicSym => 0x123,
            SubsectionKind::Symbols => 0x124,
            SubsectionKind::AlignSym => 0x125,
            SubsectionKind::SrcLnSeg => 0x126,
            SubsectionKind::SrcModule => 0x127,
            SubsectionKind::Libraries => 0x128,
            SubsectionKind::GlobalSym => 0x129,
            SubsectionKind::GlobalPub => 0x12a,
            SubsectionKind::GlobalTypes => 0x12b,
            SubsectionKind::Mpc => 0x12c,
            SubsectionKind::SegMap => 0x12d,
            SubsectionKind::SegName => 0x12e,
            SubsectionKind::PreComp => 0x12f,
            SubsectionKind::FileIndex => 0x133,
            SubsectionKind::StaticSym => 0x134,
            SubsectionKind::Other(raw) => raw,
        }
    }
}

impl From<u16> for SubsectionKind
{
    fn from(raw: u16) -> Self
    {
        match raw {
            0x120 => SubsectionKind::Module,
            0x121 => SubsectionKind::Types,
            0x122 => SubsectionKind::Public,
            0x123 => SubsectionKind::PublicSym,
            0x124 => SubsectionKind::Symbols,
            0x125 => SubsectionKind::AlignSym,
            0x126 => SubsectionKind::SrcLnSeg,
            0x127 => SubsectionKind::SrcModule,
            0x128 => SubsectionKind::Libraries,
            0x129 => SubsectionKind::GlobalSym,
            0x12a => SubsectionKind::GlobalPub,
            0x12b => SubsectionKind::GlobalTypes,
            0x12c => SubsectionKind::Mpc,
            0x12d => SubsectionKind::SegMap,
            0x12e => SubsectionKind::SegName,
            0x12f => SubsectionKind::PreComp,
            0x133 => SubsectionKind::FileIndex,
            0x134 => SubsectionKind::StaticSym,
            other => SubsectionKind::Other(other),
        }
    }
}

impl fmt::Display for SubsectionKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            SubsectionKind::Module => "sstModule",
            SubsectionKind::Types => "sstTypes",
            SubsectionKind::Public => "sstPublic",
            SubsectionKind::PublicSym => "sstPublicSym",
            SubsectionKind::Symbols => "sstSymbols",
            SubsectionKind::AlignSym => "sstAlignSym",
            SubsectionKind::SrcLnSeg => "sstSrcLnSeg",
            SubsectionKind::SrcModule => "sstSrcModule",
            SubsectionKind::Libraries => "sstLibraries",
            SubsectionKind::GlobalSym => "sstGlobalSym",
            SubsectionKind::GlobalPub => "sstGlobalPub",
            SubsectionKind::GlobalTypes => "sstGlobalTypes",
            SubsectionKind::Mpc => "sstMPC",
            SubsectionKind::SegMap => "sstSegMap",
            SubsectionKind::SegName => "sstSegName",
            SubsectionKind::PreComp => "sstPreComp",
            SubsectionKind::FileIndex => "sstFileIndex",
            SubsectionKind::StaticSym => "sstStaticSym",
            SubsectionKind::Other(raw) => return write!(f, "unknown({raw:#06x})"),
        };
        write!(f, "{label}")
    }
}

/// Decoded content of one subsection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubsectionRecord
{
    /// `sstModule`
    ModuleInfo(ModuleInfo),
    /// `sstSrcModule`, the only variant carrying address/line data
    SourceModule(SourceModule),
    /// `sstLibraries`
    LibraryList(Vec<String>),
    /// `sstGlobalSym` header
    GlobalSymbols(GlobalSymbolsHeader),
    /// `sstSegName`
    SegmentNames(SegmentNameTable),
    /// `sstFileIndex`
    FileIndex(FileIndex),
    /// A subsection the registry has no decoder for
    Unsupported(SubsectionKind),
}

/// Decoder for one subsection kind.
///
/// The cursor is windowed to the subsection's content and positioned at its
/// first byte; any read past the content size fails.
pub type DecodeFn = fn(&mut Cursor<'_>, &DirectoryEntry) -> Result<SubsectionRecord, FormatError>;

/// Table of decoders keyed by subsection kind.
#[derive(Clone)]
pub struct SubsectionRegistry
{
    decoders: HashMap<SubsectionKind, DecodeFn>,
}

impl fmt::Debug for SubsectionRegistry
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.debug_set().entries(self.decoders.keys()).finish()
    }
}

impl Default for SubsectionRegistry
{
    fn default() -> Self
    {
        Self::with_builtin()
    }
}

impl SubsectionRegistry
{
    /// Registry with no decoders; every subsection is skipped.
    #[must_use]
    pub fn empty() -> Self
    {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registry with every decoder this crate ships.
    #[must_use]
    pub fn with_builtin() -> Self
    {
        let mut registry = Self::empty();
        registry.register(SubsectionKind::Module, records::decode_module_info);
        registry.register(SubsectionKind::SrcModule, source_module::decode_source_module);
        registry.register(SubsectionKind::Libraries, records::decode_libraries);
        registry.register(SubsectionKind::GlobalSym, records::decode_global_symbols);
        registry.register(SubsectionKind::SegName, records::decode_segment_names);
        registry.register(SubsectionKind::FileIndex, records::decode_file_index);
        registry
    }

    /// Install (or replace) the decoder for `kind`, returning the old one.
    pub fn register(&mut self, kind: SubsectionKind, decoder: DecodeFn) -> Option<DecodeFn>
    {
        self.decoders.insert(kind, decoder)
    }

    /// Remove the decoder for `kind` so those subsections are skipped.
    pub fn unregister(&mut self, kind: SubsectionKind) -> Option<DecodeFn>
    {
        self.decoders.remove(&kind)
    }

    /// Whether a decoder exists for `kind`.
    #[must_use]
    pub fn supports(&self, kind: SubsectionKind) -> bool
    {
        self.decoders.contains_key(&kind)
    }

    /// Decode the subsection `entry` points at.
    ///
    /// `source` is any cursor over the full byte source; it is not moved.
    /// The decoder gets a fresh cursor windowed to
    /// `base + entry.offset .. + entry.size`, so no state carries over from
    /// a previous entry.
    ///
    /// Returns `Ok(None)` when no decoder is registered for the kind.
    ///
    /// ## Errors
    ///
    /// - [`FormatError::Truncated`] if the entry's content range runs past
    ///   the end of the byte source
    /// - whatever the decoder reports for malformed content
    pub fn decode(
        &self,
        entry: &DirectoryEntry,
        source: &Cursor<'_>,
        base: usize,
    ) -> Result<Option<SubsectionRecord>, FormatError>
    {
        let Some(decoder) = self.decoders.get(&entry.kind) else {
            trace!("No decoder for {}, skipping", entry.kind);
            return Ok(None);
        };

        let size = usize::try_from(entry.size).unwrap_or(usize::MAX);
        let start = usize::try_from(entry.offset)
            .ok()
            .and_then(|offset| base.checked_add(offset))
            .ok_or(FormatError::Truncated {
                what: "subsection content",
                needed: size,
                available: 0,
            })?;

        let mut window = source.window(start, size, "subsection content")?;
        trace!("Decoding {} at {:#x} ({} bytes)", entry.kind, start, size);
        decoder(&mut window, entry).map(Some)
    }
}
