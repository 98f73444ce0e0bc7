//! # Executable Facade
//!
//! Loads a PE image, finds its CodeView blob through the debug data
//! directory, parses it, and answers queries in virtual addresses.
//!
//! Line tables store code offsets relative to the start of the code, so the
//! facade converts with `va = ImageBase + BaseOfCode + offset`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cvlens_core::image::ExecutableDebugInfo;
//! use cvlens_core::types::Address;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let exe = ExecutableDebugInfo::open("myprogram.exe")?;
//! if let Some(location) = exe.resolve_virtual_address(Address::new(0x0040_3022)) {
//!     println!("{location}");
//! }
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::mem;
use std::path::Path;

use object::pe::{self, ImageDebugDirectory};
use object::read::pe::{ImageNtHeaders, ImageOptionalHeader, PeFile};
use object::{FileKind, LittleEndian};
use tracing::{debug, info};

use crate::codeview::{CodeViewParser, ParsedDebugInfo};
use crate::error::{CvError, CvResult};
use crate::resolver::AddressResolver;
use crate::types::{Address, SourceLocation};

/// Where the CodeView blob sits in a PE file, plus the header fields needed
/// to translate addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeViewLocation
{
    /// File offset of the blob (`PointerToRawData`).
    pub offset: usize,
    /// Blob size (`SizeOfData`).
    pub size: usize,
    /// Preferred load address.
    pub image_base: u64,
    /// RVA of the start of code.
    pub base_of_code: u32,
}

/// Find the CodeView debug directory entry of a PE32 or PE32+ image.
///
/// Returns `Ok(None)` for a valid PE without CodeView information.
///
/// ## Errors
///
/// [`CvError::Executable`] if `data` is not a PE image or its headers are
/// malformed.
pub fn locate_codeview(data: &[u8]) -> CvResult<Option<CodeViewLocation>>
{
    match FileKind::parse(data) {
        Ok(FileKind::Pe32) => locate_in::<pe::ImageNtHeaders32>(data),
        Ok(FileKind::Pe64) => locate_in::<pe::ImageNtHeaders64>(data),
        Ok(kind) => Err(CvError::Executable(format!("not a PE image ({kind:?})"))),
        Err(err) => Err(CvError::Executable(format!("unrecognized file format: {err}"))),
    }
}

fn locate_in<Pe: ImageNtHeaders>(data: &[u8]) -> CvResult<Option<CodeViewLocation>>
{
    let file = PeFile::<Pe>::parse(data).map_err(|err| CvError::Executable(format!("failed to parse PE: {err}")))?;

    let optional = file.nt_headers().optional_header();
    let image_base = optional.image_base();
    let base_of_code = optional.base_of_code();

    let Some(directory) = file.data_directories().get(pe::IMAGE_DIRECTORY_ENTRY_DEBUG) else {
        debug!("No debug data directory");
        return Ok(None);
    };
    let bytes = directory
        .data(data, &file.section_table())
        .map_err(|err| CvError::Executable(format!("failed to read debug directory: {err}")))?;

    let count = bytes.len() / mem::size_of::<ImageDebugDirectory>();
    let (entries, _) = object::pod::slice_from_bytes::<ImageDebugDirectory>(bytes, count)
        .map_err(|()| CvError::Executable("debug directory is truncated".to_string()))?;

    for entry in entries {
        if entry.typ.get(LittleEndian) != pe::IMAGE_DEBUG_TYPE_CODEVIEW {
            continue;
        }
        let offset = entry.pointer_to_raw_data.get(LittleEndian) as usize;
        if offset == 0 {
            continue;
        }
        let size = entry.size_of_data.get(LittleEndian) as usize;
        debug!("CodeView entry at file offset {offset:#x} ({size} bytes)");
        return Ok(Some(CodeViewLocation {
            offset,
            size,
            image_base,
            base_of_code,
        }));
    }

    Ok(None)
}

/// Parsed CodeView data for one executable, queried in virtual addresses.
#[derive(Debug, Clone)]
pub struct ExecutableDebugInfo
{
    image_base: u64,
    base_of_code: u32,
    info: ParsedDebugInfo,
}

impl ExecutableDebugInfo
{
    /// Read and parse a PE file with default parser settings.
    ///
    /// ## Errors
    ///
    /// - [`CvError::Io`] if the file cannot be read
    /// - [`CvError::Executable`] if it is not a PE image
    /// - [`CvError::NoDebugInfo`] if it has no CodeView entry
    /// - [`CvError::Format`] if the CodeView directory is malformed
    pub fn open(path: impl AsRef<Path>) -> CvResult<Self>
    {
        Self::open_with(path, &CodeViewParser::new())
    }

    /// Read and parse a PE file with a configured parser.
    ///
    /// ## Errors
    ///
    /// See [`ExecutableDebugInfo::open`].
    pub fn open_with(path: impl AsRef<Path>, parser: &CodeViewParser) -> CvResult<Self>
    {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        Self::from_executable_bytes(&bytes, parser).map_err(|err| match err {
            CvError::NoDebugInfo(_) => CvError::NoDebugInfo(path.display().to_string()),
            other => other,
        })
    }

    /// Parse an in-memory PE image.
    ///
    /// ## Errors
    ///
    /// See [`ExecutableDebugInfo::open`].
    pub fn from_executable_bytes(bytes: &[u8], parser: &CodeViewParser) -> CvResult<Self>
    {
        let location = locate_codeview(bytes)?.ok_or_else(|| CvError::NoDebugInfo("executable".to_string()))?;

        // The directory may only reach inside the blob the debug entry declares.
        let end = location.offset.saturating_add(location.size).min(bytes.len());
        let blob = bytes.get(..end).unwrap_or(bytes);
        let info = parser.parse(blob, location.offset)?;

        info!(
            "Loaded CodeView {} (ImageBase {:#x}, BaseOfCode {:#x})",
            info.signature(),
            location.image_base,
            location.base_of_code
        );
        Ok(Self::from_parts(info, location.image_base, location.base_of_code))
    }

    /// Parse a bare CodeView blob (for example a `.dbg` payload) at `base`.
    ///
    /// Without PE headers there is nothing to translate, so virtual addresses
    /// equal code offsets.
    ///
    /// ## Errors
    ///
    /// [`CvError::Format`] if the blob is malformed.
    pub fn from_codeview_bytes(bytes: &[u8], base: usize, parser: &CodeViewParser) -> CvResult<Self>
    {
        Ok(Self::from_parts(parser.parse(bytes, base)?, 0, 0))
    }

    /// Wrap an existing parse result.
    #[must_use]
    pub fn from_parts(info: ParsedDebugInfo, image_base: u64, base_of_code: u32) -> Self
    {
        Self {
            image_base,
            base_of_code,
            info,
        }
    }

    /// The underlying parse result.
    #[must_use]
    pub fn info(&self) -> &ParsedDebugInfo
    {
        &self.info
    }

    /// Preferred load address from the optional header.
    #[must_use]
    pub fn image_base(&self) -> u64
    {
        self.image_base
    }

    /// RVA of the start of code from the optional header.
    #[must_use]
    pub fn base_of_code(&self) -> u32
    {
        self.base_of_code
    }

    /// Resolver over this executable's line tables (code offsets).
    #[must_use]
    pub fn resolver(&self) -> AddressResolver<'_>
    {
        self.info.resolver()
    }

    /// Resolver that works in virtual addresses.
    ///
    /// Build it once and reuse it for a batch of queries; the name index
    /// behind [`VirtualResolver::virtual_address_of`] is then built only once.
    #[must_use]
    pub fn virtual_resolver(&self) -> VirtualResolver<'_>
    {
        VirtualResolver {
            image_base: self.image_base,
            base_of_code: self.base_of_code,
            resolver: self.info.resolver(),
        }
    }

    /// Convert a virtual address to a code offset.
    ///
    /// `None` for addresses below the start of code or more than 4 GiB past it.
    #[must_use]
    pub fn code_offset(&self, address: Address) -> Option<u32>
    {
        code_offset(self.image_base, self.base_of_code, address)
    }

    /// Convert a code offset to a virtual address.
    #[must_use]
    pub fn virtual_address(&self, code_offset: u32) -> Option<Address>
    {
        virtual_address(self.image_base, self.base_of_code, code_offset)
    }

    /// File and line for a virtual address.
    ///
    /// For many lookups, query through [`ExecutableDebugInfo::virtual_resolver`].
    #[must_use]
    pub fn resolve_virtual_address(&self, address: Address) -> Option<SourceLocation<'_>>
    {
        self.virtual_resolver().resolve_virtual_address(address)
    }

    /// Virtual address where `line` of `file` starts.
    ///
    /// For many lookups, query through [`ExecutableDebugInfo::virtual_resolver`].
    #[must_use]
    pub fn virtual_address_of(&self, file: &str, line: u16) -> Option<Address>
    {
        self.virtual_resolver().virtual_address_of(file, line)
    }
}

/// [`AddressResolver`] plus the header fields that turn code offsets into
/// virtual addresses.
#[derive(Debug)]
pub struct VirtualResolver<'a>
{
    image_base: u64,
    base_of_code: u32,
    resolver: AddressResolver<'a>,
}

impl<'a> VirtualResolver<'a>
{
    /// The underlying code-offset resolver.
    #[must_use]
    pub fn resolver(&self) -> &AddressResolver<'a>
    {
        &self.resolver
    }

    /// File and line for a virtual address.
    #[must_use]
    pub fn resolve_virtual_address(&self, address: Address) -> Option<SourceLocation<'a>>
    {
        let offset = code_offset(self.image_base, self.base_of_code, address)?;
        self.resolver.resolve_address(offset)
    }

    /// Virtual address where `line` of `file` starts.
    #[must_use]
    pub fn virtual_address_of(&self, file: &str, line: u16) -> Option<Address>
    {
        let offset = self.resolver.resolve_line(file, line)?;
        virtual_address(self.image_base, self.base_of_code, offset)
    }
}

fn code_offset(image_base: u64, base_of_code: u32, address: Address) -> Option<u32>
{
    let offset = address
        .checked_sub(image_base)?
        .checked_sub(u64::from(base_of_code))?;
    u32::try_from(offset.value()).ok()
}

fn virtual_address(image_base: u64, base_of_code: u32, code_offset: u32) -> Option<Address>
{
    Address::new(image_base)
        .checked_add(u64::from(base_of_code))?
        .checked_add(u64::from(code_offset))
}
