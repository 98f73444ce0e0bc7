//! Virtual address type.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

/// Strongly typed virtual address inside a loaded image.
///
/// Line tables speak in code offsets (`u32`, relative to the start of the
/// code); callers usually hold virtual addresses (`ImageBase + BaseOfCode +
/// offset`). Wrapping the latter keeps the two from being mixed up.
///
/// ## Example
///
/// ```rust
/// use cvlens_core::types::Address;
///
/// let addr: Address = "0x00403022".parse()?;
/// assert_eq!(addr.value(), 0x0040_3022);
/// assert_eq!(addr.checked_sub(0x0040_1000), Some(Address::new(0x2022)));
/// # Ok::<(), std::num::ParseIntError>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u64);

impl Address
{
    /// Create a new address from a `u64` value.
    pub const fn new(value: u64) -> Self
    {
        Address(value)
    }

    /// Raw value.
    pub const fn value(self) -> u64
    {
        self.0
    }

    /// Add an offset, `None` on overflow.
    #[must_use]
    pub fn checked_add(self, offset: u64) -> Option<Self>
    {
        self.0.checked_add(offset).map(Address)
    }

    /// Subtract an offset, `None` on underflow.
    #[must_use]
    pub fn checked_sub(self, offset: u64) -> Option<Self>
    {
        self.0.checked_sub(offset).map(Address)
    }
}

impl From<u64> for Address
{
    fn from(value: u64) -> Self
    {
        Address(value)
    }
}

impl From<Address> for u64
{
    fn from(address: Address) -> Self
    {
        address.0
    }
}

/// Accepts `0x`-prefixed hex (either case) or plain decimal.
impl FromStr for Address
{
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let s = s.trim();
        let value = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16)?,
            None => s.parse::<u64>()?,
        };
        Ok(Address(value))
    }
}

impl fmt::Display for Address
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "0x{:08x}", self.0)
    }
}
