//! # Binary Cursor
//!
//! Bounds-checked, little-endian reader over an in-memory byte source.
//!
//! CodeView addresses everything with offsets from a moving base, so the
//! cursor works in *absolute* positions within the full byte source and never
//! hides where it is. A cursor may be narrowed to a window (one subsection's
//! content): seeks and reads outside that window fail with
//! [`FormatError::OutOfBounds`] instead of spilling into neighbouring data.
//!
//! ## Example
//!
//! ```rust
//! use cvlens_core::cursor::Cursor;
//!
//! let data = [0x4e, 0x42, 0x30, 0x39, 0x10, 0x00, 0x00, 0x00];
//! let mut cursor = Cursor::new(&data);
//! assert_eq!(cursor.read_bytes(4)?, b"NB09");
//! assert_eq!(cursor.read_le::<u32>()?, 0x10);
//! # Ok::<(), cvlens_core::error::FormatError>(())
//! ```

use crate::error::FormatError;

/// Fixed-width integers that can be decoded from little-endian bytes.
pub trait LeRead: Sized
{
    /// Encoded width in bytes.
    const SIZE: usize;

    /// Decode from exactly `Self::SIZE` bytes.
    fn from_le_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_le_read {
    ($($ty:ty),*) => {
        $(
            impl LeRead for $ty
            {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn from_le_slice(bytes: &[u8]) -> Self
                {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(&bytes[..Self::SIZE]);
                    <$ty>::from_le_bytes(buf)
                }
            }
        )*
    };
}

impl_le_read!(u8, u16, u32, u64);

/// Seekable reader with absolute positions and an optional read window.
#[derive(Debug, Clone)]
pub struct Cursor<'a>
{
    data: &'a [u8],
    start: usize,
    limit: usize,
    position: usize,
}

impl<'a> Cursor<'a>
{
    /// Cursor over the whole byte source, positioned at 0.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self
    {
        Self {
            data,
            start: 0,
            limit: data.len(),
            position: 0,
        }
    }

    /// Narrow to `len` bytes starting at absolute position `start`.
    ///
    /// The new cursor is positioned at `start` and shares the same byte
    /// source, so positions stay absolute.
    ///
    /// ## Errors
    ///
    /// [`FormatError::Truncated`] if the window extends past the end of the
    /// byte source.
    pub fn window(&self, start: usize, len: usize, what: &'static str) -> Result<Cursor<'a>, FormatError>
    {
        let available = self.data.len().saturating_sub(start);
        let limit = start
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or(FormatError::Truncated {
                what,
                needed: len,
                available,
            })?;

        Ok(Cursor {
            data: self.data,
            start,
            limit,
            position: start,
        })
    }

    /// Absolute position where this cursor's window begins.
    #[must_use]
    pub fn start(&self) -> usize
    {
        self.start
    }

    /// Absolute position one past the end of this cursor's window.
    #[must_use]
    pub fn limit(&self) -> usize
    {
        self.limit
    }

    /// Current absolute position.
    #[must_use]
    pub fn pos(&self) -> usize
    {
        self.position
    }

    /// Bytes left between the current position and the window end.
    #[must_use]
    pub fn remaining(&self) -> usize
    {
        self.limit.saturating_sub(self.position)
    }

    /// Total length of the underlying byte source.
    #[must_use]
    pub fn source_len(&self) -> usize
    {
        self.data.len()
    }

    /// Move to an absolute position inside the window.
    ///
    /// Seeking exactly to the window end is allowed; the next read fails.
    ///
    /// ## Errors
    ///
    /// [`FormatError::OutOfBounds`] if `pos` lies outside the window.
    pub fn seek(&mut self, pos: usize) -> Result<(), FormatError>
    {
        if pos < self.start || pos > self.limit {
            return Err(FormatError::OutOfBounds {
                position: pos,
                len: 0,
                limit: self.limit,
            });
        }

        self.position = pos;
        Ok(())
    }

    /// Seek to `base + offset`, the shape every CodeView pointer takes.
    ///
    /// ## Errors
    ///
    /// [`FormatError::OutOfBounds`] if the target overflows or lies outside
    /// the window.
    pub fn seek_from(&mut self, base: usize, offset: u32) -> Result<(), FormatError>
    {
        let target = usize::try_from(offset)
            .ok()
            .and_then(|offset| base.checked_add(offset))
            .ok_or(FormatError::OutOfBounds {
                position: base,
                len: 0,
                limit: self.limit,
            })?;
        self.seek(target)
    }

    /// Fail unless `count` items of `item_size` bytes fit in the window.
    ///
    /// Called before any loop driven by a count read from the input, so a
    /// corrupt count is rejected up front instead of driving a huge
    /// allocation.
    ///
    /// ## Errors
    ///
    /// [`FormatError::OutOfBounds`] if the items would cross the window end.
    pub fn ensure(&self, count: usize, item_size: usize) -> Result<(), FormatError>
    {
        let len = count.saturating_mul(item_size);
        if len > self.remaining() {
            return Err(FormatError::OutOfBounds {
                position: self.position,
                len,
                limit: self.limit,
            });
        }
        Ok(())
    }

    /// Read `len` raw bytes.
    ///
    /// ## Errors
    ///
    /// [`FormatError::OutOfBounds`] if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], FormatError>
    {
        let end = self
            .position
            .checked_add(len)
            .filter(|&end| end <= self.limit)
            .ok_or(FormatError::OutOfBounds {
                position: self.position,
                len,
                limit: self.limit,
            })?;

        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    /// Read one little-endian integer.
    ///
    /// ## Errors
    ///
    /// [`FormatError::OutOfBounds`] if the value crosses the window end.
    pub fn read_le<T: LeRead>(&mut self) -> Result<T, FormatError>
    {
        let bytes = self.read_bytes(T::SIZE)?;
        Ok(T::from_le_slice(bytes))
    }

    /// Read `count` consecutive little-endian integers.
    ///
    /// ## Errors
    ///
    /// [`FormatError::OutOfBounds`] if the array crosses the window end.
    pub fn read_le_vec<T: LeRead>(&mut self, count: usize) -> Result<Vec<T>, FormatError>
    {
        self.ensure(count, T::SIZE)?;
        let mut values = Vec::with_capacity(count);
        for _ in 0..count {
            values.push(self.read_le::<T>()?);
        }
        Ok(values)
    }

    /// Read a string stored as one length byte followed by that many bytes.
    ///
    /// Names in old executables are ANSI, not UTF-8; invalid sequences are
    /// replaced rather than rejected.
    ///
    /// ## Errors
    ///
    /// [`FormatError::OutOfBounds`] if the string crosses the window end.
    pub fn read_prefixed_string(&mut self) -> Result<String, FormatError>
    {
        let len = self.read_le::<u8>()?;
        let bytes = self.read_bytes(usize::from(len))?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read a zero-terminated string and consume its terminator.
    ///
    /// ## Errors
    ///
    /// [`FormatError::OutOfBounds`] if no terminator occurs before the
    /// window end.
    pub fn read_cstring(&mut self) -> Result<String, FormatError>
    {
        let rest = &self.data[self.position..self.limit];
        let len = rest.iter().position(|&b| b == 0).ok_or(FormatError::OutOfBounds {
            position: self.position,
            len: rest.len() + 1,
            limit: self.limit,
        })?;

        let bytes = self.read_bytes(len)?;
        self.position += 1;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_read_le_integers()
    {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut cursor = Cursor::new(&data);
        assert_eq!(cursor.read_le::<u8>().unwrap(), 0x01);
        assert_eq!(cursor.read_le::<u16>().unwrap(), 0x0302);
        assert_eq!(cursor.read_le::<u32>().unwrap(), 0x0706_0504);
        assert_eq!(cursor.remaining(), 0);
        assert!(cursor.read_le::<u8>().is_err());
    }

    #[test]
    fn test_window_keeps_absolute_positions()
    {
        let data = [0u8, 0, 0, 0, 0xaa, 0xbb, 0xcc, 0xdd];
        let cursor = Cursor::new(&data);
        let mut window = cursor.window(4, 2, "test").unwrap();
        assert_eq!(window.pos(), 4);
        assert_eq!(window.read_le::<u16>().unwrap(), 0xbbaa);

        match window.read_le::<u8>() {
            Err(FormatError::OutOfBounds { position, len, limit }) => {
                assert_eq!(position, 6);
                assert_eq!(len, 1);
                assert_eq!(limit, 6);
            }
            other => panic!("expected OutOfBounds, got {other:?}"),
        }
    }

    #[test]
    fn test_window_past_end_is_truncated()
    {
        let data = [0u8; 8];
        let cursor = Cursor::new(&data);
        match cursor.window(6, 4, "subsection") {
            Err(FormatError::Truncated { what, needed, available }) => {
                assert_eq!(what, "subsection");
                assert_eq!(needed, 4);
                assert_eq!(available, 2);
            }
            other => panic!("expected Truncated, got {other:?}"),
        }
    }

    #[test]
    fn test_seek_outside_window_fails()
    {
        let data = [0u8; 16];
        let mut window = Cursor::new(&data).window(4, 8, "test").unwrap();
        assert!(window.seek(3).is_err());
        assert!(window.seek(13).is_err());
        assert!(window.seek(12).is_ok());
        assert!(window.seek_from(4, 9).is_err());
        assert!(window.seek_from(4, 2).is_ok());
        assert_eq!(window.pos(), 6);
    }

    #[test]
    fn test_ensure_rejects_oversized_counts()
    {
        let data = [0u8; 6];
        let cursor = Cursor::new(&data);
        assert!(cursor.ensure(3, 2).is_ok());
        assert!(cursor.ensure(2, 4).is_err());
        assert!(cursor.ensure(usize::MAX, 4).is_err());
    }

    #[test]
    fn test_strings()
    {
        let data = b"\x05hello\x00seg\x00code";
        let mut cursor = Cursor::new(data);
        assert_eq!(cursor.read_prefixed_string().unwrap(), "hello");
        assert_eq!(cursor.read_prefixed_string().unwrap(), "");
        assert_eq!(cursor.read_cstring().unwrap(), "seg");
        assert!(cursor.read_cstring().is_err());
    }
}
