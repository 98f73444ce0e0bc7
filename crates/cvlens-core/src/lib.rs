//! # cvlens-core
//!
//! Reader for the CodeView NB09/NB11 debug format found in 1990s-era PE
//! executables.
//!
//! This crate provides:
//! - Directory and subsection decoding with a pluggable decoder registry
//! - `sstSrcModule` line tables with bounds and monotonicity checks
//! - Address-to-line and line-to-address resolution
//! - A PE facade that finds the CodeView blob and speaks virtual addresses
//!
//! Everything is read from an immutable byte slice; nothing is mapped or
//! modified. A parse result is plain data and can be queried from any number
//! of threads at once.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cvlens_core::prelude::*;
//!
//! # fn main() -> Result<(), CvError> {
//! let exe = ExecutableDebugInfo::open("game.exe")?;
//! for module in exe.info().source_modules() {
//!     for file in module.files() {
//!         println!("{}", file.name());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod codeview;
pub mod cursor;
pub mod error;
pub mod image;
pub mod prelude;
pub mod resolver;
pub mod types;

pub use codeview::{parse, CodeViewParser, ParsedDebugInfo};
pub use error::{CvError, CvResult, FormatError};
pub use image::{ExecutableDebugInfo, VirtualResolver};
pub use resolver::AddressResolver;
pub use types::{Address, SourceLocation};
