//! # Types
//!
//! Small value types shared by the parser, the resolver and the executable
//! facade.

pub mod address;
pub mod location;

pub use address::Address;
pub use location::SourceLocation;
