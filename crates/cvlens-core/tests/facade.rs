//! Tests for the executable facade

mod common;

use std::{env, fs, process};

use common::CodeViewBuilder;
use cvlens_core::codeview::CodeViewParser;
use cvlens_core::error::{CvError, FormatError};
use cvlens_core::image::{locate_codeview, ExecutableDebugInfo};
use cvlens_core::types::Address;

const IMAGE_BASE: u32 = 0x0040_0000;
const BASE_OF_CODE: u32 = 0x1000;
const DEBUG_TYPE_COFF: u32 = 1;
const DEBUG_TYPE_CODEVIEW: u32 = 2;
/// File offset where the CodeView blob is appended.
const BLOB_OFFSET: usize = 0x400;

fn write_u16(out: &mut [u8], at: usize, value: u16)
{
    out[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_u32(out: &mut [u8], at: usize, value: u32)
{
    out[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Minimal PE32 image: headers, one `.rdata` section at RVA 0x1000 holding
/// a single debug directory entry, and `blob` appended at `BLOB_OFFSET`.
fn pe_image(debug_type: u32, blob: &[u8]) -> Vec<u8>
{
    let mut out = vec![0u8; BLOB_OFFSET];

    out[0..2].copy_from_slice(b"MZ");
    write_u32(&mut out, 0x3c, 0x40);

    let pe = 0x40;
    out[pe..pe + 4].copy_from_slice(b"PE\0\0");
    let coff = pe + 4;
    write_u16(&mut out, coff, 0x014c);
    write_u16(&mut out, coff + 2, 1);
    write_u16(&mut out, coff + 16, 224);
    write_u16(&mut out, coff + 18, 0x010f);

    let opt = coff + 20;
    write_u16(&mut out, opt, 0x010b);
    write_u32(&mut out, opt + 20, BASE_OF_CODE);
    write_u32(&mut out, opt + 28, IMAGE_BASE);
    write_u32(&mut out, opt + 32, 0x1000);
    write_u32(&mut out, opt + 36, 0x200);
    write_u32(&mut out, opt + 56, 0x2000);
    write_u32(&mut out, opt + 60, 0x200);
    write_u16(&mut out, opt + 68, 3);
    write_u32(&mut out, opt + 92, 16);
    // Data directory 6: debug.
    write_u32(&mut out, opt + 96 + 6 * 8, 0x1000);
    write_u32(&mut out, opt + 96 + 6 * 8 + 4, 28);

    let section = opt + 224;
    out[section..section + 6].copy_from_slice(b".rdata");
    write_u32(&mut out, section + 8, 0x200);
    write_u32(&mut out, section + 12, 0x1000);
    write_u32(&mut out, section + 16, 0x200);
    write_u32(&mut out, section + 20, 0x200);
    write_u32(&mut out, section + 36, 0x4000_0040);

    let debug = 0x200;
    write_u32(&mut out, debug + 12, debug_type);
    write_u32(&mut out, debug + 16, u32::try_from(blob.len()).unwrap());
    write_u32(&mut out, debug + 24, u32::try_from(BLOB_OFFSET).unwrap());

    out.extend_from_slice(blob);
    out
}

fn main_c_blob() -> Vec<u8>
{
    CodeViewBuilder::new().source_module(1, &[common::main_c()]).build()
}

fn va(code_offset: u32) -> Address
{
    Address::new(u64::from(IMAGE_BASE + BASE_OF_CODE + code_offset))
}

#[test]
fn test_locate_codeview_in_pe32()
{
    let image = pe_image(DEBUG_TYPE_CODEVIEW, &main_c_blob());
    let location = locate_codeview(&image).unwrap().unwrap();

    assert_eq!(location.offset, BLOB_OFFSET);
    assert_eq!(location.size, main_c_blob().len());
    assert_eq!(location.image_base, u64::from(IMAGE_BASE));
    assert_eq!(location.base_of_code, BASE_OF_CODE);
}

#[test]
fn test_resolve_virtual_address()
{
    let image = pe_image(DEBUG_TYPE_CODEVIEW, &main_c_blob());
    let exe = ExecutableDebugInfo::from_executable_bytes(&image, &CodeViewParser::new()).unwrap();

    assert_eq!(exe.image_base(), 0x0040_0000);
    assert_eq!(exe.base_of_code(), 0x1000);
    assert_eq!(exe.info().base(), BLOB_OFFSET);

    let location = exe.resolve_virtual_address(va(250)).unwrap();
    assert_eq!(location.file_line(), ("main.c", 11));
    assert_eq!(exe.resolve_virtual_address(va(99)), None);
    assert_eq!(exe.resolve_virtual_address(Address::new(0x1000)), None);
}

#[test]
fn test_virtual_address_of_line()
{
    let image = pe_image(DEBUG_TYPE_CODEVIEW, &main_c_blob());
    let exe = ExecutableDebugInfo::from_executable_bytes(&image, &CodeViewParser::new()).unwrap();

    assert_eq!(exe.virtual_address_of("main.c", 12), Some(Address::new(0x0040_112c)));
    assert_eq!(exe.virtual_address_of("main.c", 99), None);
    assert_eq!(exe.code_offset(Address::new(0x0040_112c)), Some(300));
    assert_eq!(exe.virtual_address(300), Some(Address::new(0x0040_112c)));
}

#[test]
fn test_virtual_resolver_answers_a_batch()
{
    let image = pe_image(DEBUG_TYPE_CODEVIEW, &main_c_blob());
    let exe = ExecutableDebugInfo::from_executable_bytes(&image, &CodeViewParser::new()).unwrap();
    let resolver = exe.virtual_resolver();

    for offset in [100, 150, 199, 200, 299, 300] {
        assert_eq!(resolver.resolve_virtual_address(va(offset)), exe.resolve_virtual_address(va(offset)));
        assert_eq!(
            resolver.resolve_virtual_address(va(offset)),
            resolver.resolver().resolve_address(offset)
        );
    }
    for line in [10, 11, 12, 13] {
        assert_eq!(resolver.virtual_address_of("main.c", line), exe.virtual_address_of("main.c", line));
    }
    assert_eq!(resolver.virtual_address_of("main.c", 11), Some(va(200)));
    assert_eq!(resolver.resolve_virtual_address(va(301)), None);
}

#[test]
fn test_pe_without_codeview_entry()
{
    let image = pe_image(DEBUG_TYPE_COFF, &main_c_blob());
    assert_eq!(locate_codeview(&image).unwrap(), None);

    let err = ExecutableDebugInfo::from_executable_bytes(&image, &CodeViewParser::new()).unwrap_err();
    assert!(matches!(err, CvError::NoDebugInfo(_)));
}

#[test]
fn test_not_a_pe_image()
{
    let err = ExecutableDebugInfo::from_executable_bytes(b"\x7fELF not really", &CodeViewParser::new()).unwrap_err();
    assert!(matches!(err, CvError::Executable(_)));
}

#[test]
fn test_corrupt_codeview_blob_in_pe()
{
    let mut blob = main_c_blob();
    blob[0..4].copy_from_slice(b"RSDS");
    let image = pe_image(DEBUG_TYPE_CODEVIEW, &blob);

    let err = ExecutableDebugInfo::from_executable_bytes(&image, &CodeViewParser::new()).unwrap_err();
    assert!(matches!(
        err,
        CvError::Format(FormatError::BadSignature { position, .. }) if position == BLOB_OFFSET
    ));
}

#[test]
fn test_codeview_bytes_use_code_offsets()
{
    let exe = ExecutableDebugInfo::from_codeview_bytes(&main_c_blob(), 0, &CodeViewParser::new()).unwrap();

    assert_eq!(exe.image_base(), 0);
    assert_eq!(exe.resolve_virtual_address(Address::new(200)).map(|loc| loc.line), Some(11));
    assert_eq!(exe.virtual_address_of("main.c", 10), Some(Address::new(100)));
    assert_eq!(exe.resolver().resolve_line("main.c", 10), Some(100));
}

#[test]
fn test_open_reads_from_disk()
{
    let path = env::temp_dir().join(format!("cvlens-facade-{}.exe", process::id()));
    fs::write(&path, pe_image(DEBUG_TYPE_CODEVIEW, &main_c_blob())).unwrap();

    let exe = ExecutableDebugInfo::open(&path).unwrap();
    assert_eq!(exe.resolve_virtual_address(va(100)).map(|loc| loc.line), Some(10));

    fs::write(&path, pe_image(DEBUG_TYPE_COFF, &[])).unwrap();
    match ExecutableDebugInfo::open(&path) {
        Err(CvError::NoDebugInfo(name)) => assert!(name.contains("cvlens-facade")),
        other => panic!("Expected NoDebugInfo, got {other:?}"),
    }

    let _ = fs::remove_file(&path);
}

#[test]
fn test_open_missing_file_is_io_error()
{
    let err = ExecutableDebugInfo::open("/nonexistent/cvlens/missing.exe").unwrap_err();
    assert!(matches!(err, CvError::Io(_)));
}
