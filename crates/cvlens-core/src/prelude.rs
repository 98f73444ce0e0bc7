//! Common module for library exports

pub use crate::codeview::source_module::{SourceFile, SourceModule, SourceSegment};
pub use crate::codeview::subsection::{SubsectionKind, SubsectionRecord};
pub use crate::codeview::{CodeViewParser, ParsedDebugInfo};
pub use crate::error::{CvError, CvResult, FormatError};
pub use crate::image::{ExecutableDebugInfo, VirtualResolver};
pub use crate::resolver::AddressResolver;
pub use crate::types::{Address, SourceLocation};
