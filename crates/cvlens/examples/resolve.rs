//! Example: resolve addresses in a PE executable with cvlens-core
//!
//! ```text
//! cargo run --example resolve -- GAME.EXE 0x00401022 0x00401100
//! ```
//!
//! Prints `file:line` for each virtual address, then the address of the
//! first line of the first source file as a round-trip check.

use std::env;
use std::process;

use cvlens_core::prelude::*;
use cvlens_utils::{init_logging_with_level, LogFormat, LogLevel};

fn main()
{
    let _guard = init_logging_with_level(LogLevel::Info, LogFormat::Pretty).expect("Failed to initialize logging");

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: resolve <EXE> [ADDR]...");
        process::exit(1);
    };

    let exe = match ExecutableDebugInfo::open(&path) {
        Ok(exe) => exe,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    for arg in args {
        let Ok(address) = arg.parse::<Address>() else {
            eprintln!("Skipping {arg}: not an address");
            continue;
        };
        match exe.resolve_virtual_address(address) {
            Some(location) => println!("{address} -> {location}"),
            None => println!("{address} -> (no line information)"),
        }
    }

    // Round trip through the first recorded line.
    let resolver = exe.resolver();
    let first = resolver
        .files()
        .find_map(|file| file.segments().first().and_then(|seg| seg.lines().first()).map(|&line| (file.name(), line)));
    if let Some((file, line)) = first {
        if let Some(address) = exe.virtual_address_of(file, line) {
            println!("{file}:{line} starts at {address}");
        }
    }
}
