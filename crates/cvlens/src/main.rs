use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use cvlens_core::codeview::subsection::SubsectionRecord;
use cvlens_core::{Address, CodeViewParser, CvResult, ExecutableDebugInfo};
use cvlens_utils::{debug, init_logging, init_logging_to_file, init_logging_with_level, LogFormat, LogLevel};

/// Exit status when a lookup finds nothing.
const EXIT_NOT_FOUND: i32 = 2;

/// Map code addresses to source lines (and back) using CodeView debug information.
#[derive(Parser, Debug)]
#[command(name = "cvlens")]
#[command(version)]
#[command(about = "Map code addresses to source lines (and back) using CodeView NB09 debug information", long_about = None)]
struct Cli
{
    /// Log level (error, warn, info, debug, trace). Defaults to RUST_LOG, else warn.
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,
    /// Log output format (pretty or json)
    #[arg(long, global = true, default_value = "pretty")]
    log_format: LogFormat,
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

/// Where the debug information comes from.
#[derive(Args, Debug)]
struct Input
{
    /// PE executable (or a raw CodeView blob with --raw)
    exe: PathBuf,
    /// Treat EXE as a raw CodeView blob instead of a PE image
    #[arg(long, default_value_t = false)]
    raw: bool,
    /// Position of the CodeView signature inside a raw blob (hex 0x... or decimal)
    #[arg(long, default_value_t = 0, requires = "raw", value_parser = parse_base)]
    base: usize,
    /// Abort on the first subsection that fails to decode
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Resolve addresses to file:line
    Lookup
    {
        #[command(flatten)]
        input: Input,
        /// Addresses to resolve (hex 0x... or decimal)
        #[arg(required = true)]
        addresses: Vec<Address>,
        /// Treat addresses as code offsets instead of virtual addresses
        #[arg(long, default_value_t = false)]
        offset: bool,
    },
    /// Resolve file:line to the address where the line starts
    Line
    {
        #[command(flatten)]
        input: Input,
        /// File name exactly as recorded in the line table
        file: String,
        /// Line number
        line: u16,
    },
    /// Print every line table
    Dump
    {
        #[command(flatten)]
        input: Input,
    },
    /// List the subsection directory and any dropped subsections
    Directory
    {
        #[command(flatten)]
        input: Input,
    },
}

fn main()
{
    let cli = Cli::parse();

    let guard = match (&cli.log_file, cli.log_level) {
        (Some(path), level) => init_logging_to_file(path, cli.log_format, level),
        (None, Some(level)) => init_logging_with_level(level, cli.log_format),
        (None, None) if env::var_os("RUST_LOG").is_some() => init_logging(),
        (None, None) => init_logging_with_level(LogLevel::Warn, cli.log_format),
    };
    let _guard = match guard {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    match run_command(cli) {
        Ok(true) => {}
        Ok(false) => process::exit(EXIT_NOT_FOUND),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when a query found nothing.
fn run_command(cli: Cli) -> CvResult<bool>
{
    match cli.command {
        Commands::Lookup {
            input,
            addresses,
            offset,
        } => {
            let exe = load(&input)?;
            let resolver = exe.virtual_resolver();
            let mut all_found = true;

            for address in addresses {
                let location = if offset {
                    u32::try_from(address.value())
                        .ok()
                        .and_then(|code_offset| resolver.resolver().resolve_address(code_offset))
                } else {
                    resolver.resolve_virtual_address(address)
                };
                match location {
                    Some(location) => println!("{address}  {location}"),
                    None => {
                        println!("{address}  ??:0");
                        all_found = false;
                    }
                }
            }
            Ok(all_found)
        }
        Commands::Line { input, file, line } => {
            let exe = load(&input)?;
            // Raw blobs have no image base, so report the code offset.
            let found = if input.raw {
                exe.resolver().resolve_line(&file, line).map(|offset| Address::new(offset.into()))
            } else {
                exe.virtual_address_of(&file, line)
            };
            match found {
                Some(address) => {
                    println!("{address}");
                    Ok(true)
                }
                None => {
                    eprintln!("{file}:{line} has no recorded code");
                    Ok(false)
                }
            }
        }
        Commands::Dump { input } => {
            let exe = load(&input)?;
            print!("{}", exe.info().dump_line_tables());
            Ok(true)
        }
        Commands::Directory { input } => {
            let exe = load(&input)?;
            print_directory(&exe);
            Ok(true)
        }
    }
}

fn parse_base(s: &str) -> Result<usize, String>
{
    let address: Address = s.parse().map_err(|e| format!("invalid offset {s:?}: {e}"))?;
    usize::try_from(address.value()).map_err(|e| e.to_string())
}

fn load(input: &Input) -> CvResult<ExecutableDebugInfo>
{
    let parser = CodeViewParser::new().with_strict(input.strict);
    debug!("Loading {} (raw: {}, strict: {})", input.exe.display(), input.raw, input.strict);

    if input.raw {
        let bytes = fs::read(&input.exe)?;
        ExecutableDebugInfo::from_codeview_bytes(&bytes, input.base, &parser)
    } else {
        ExecutableDebugInfo::open_with(&input.exe, &parser)
    }
}

fn print_directory(exe: &ExecutableDebugInfo)
{
    let info = exe.info();
    let header = info.directory_header();

    println!("{} at {:#x}", info.signature(), info.base());
    println!("  ImageBase:   {:#x}", exe.image_base());
    println!("  BaseOfCode:  {:#x}", exe.base_of_code());
    println!("  Entries:     {}", header.entry_count);
    println!("  Next dir:    {:#x}", header.next_directory);
    println!("  Flags:       {:#x}", header.flags);
    println!();

    for subsection in info.subsections() {
        let entry = &subsection.entry;
        let module = entry
            .module()
            .map_or_else(|| "-".to_string(), |module| module.to_string());
        println!(
            "  #{:<4} {:<16} module {:>5}  offset {:#010x}  size {:>7}  {}",
            subsection.index,
            entry.kind.to_string(),
            module,
            entry.offset,
            entry.size,
            describe(&subsection.record)
        );
    }

    if !info.issues().is_empty() {
        println!();
        println!("Dropped subsections:");
        for issue in info.issues() {
            println!("  {issue}");
        }
    }
}

fn describe(record: &SubsectionRecord) -> String
{
    match record {
        SubsectionRecord::ModuleInfo(module) => format!("{} ({} segments)", module.name, module.segments.len()),
        SubsectionRecord::SourceModule(module) => {
            let names: Vec<&str> = module.files().iter().map(|file| file.name()).collect();
            names.join(", ")
        }
        SubsectionRecord::LibraryList(libraries) => format!("{} libraries", libraries.len()),
        SubsectionRecord::GlobalSymbols(header) => format!("{} bytes of symbols", header.symbols_size),
        SubsectionRecord::SegmentNames(names) => format!("{} segment names", names.len()),
        SubsectionRecord::FileIndex(index) => format!("{} file names", index.names().count()),
        SubsectionRecord::Unsupported(_) => "(not decoded)".to_string(),
    }
}
