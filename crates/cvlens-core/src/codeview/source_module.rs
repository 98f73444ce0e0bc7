//! # Source Module Tables
//!
//! Decoder for `sstSrcModule`, the subsection that maps code offsets to
//! source lines.
//!
//! ## Layout
//!
//! Every offset inside the record is relative to the first byte of the
//! record's content (the *record-local base*), not to the CodeView base the
//! directory uses.
//!
//! ```text
//! module header   u16 file_count, u16 seg_count
//!                 u32 file_table_offset[file_count]
//!                 (u32 start, u32 end)[seg_count]
//!                 u16 segment_id[seg_count]
//!
//! file table      u16 seg_count, u16 pad (must be 0)
//!   (per file)    u32 line_table_offset[seg_count]
//!                 (u32 start, u32 end)[seg_count]
//!                 u8 name_len, name bytes
//!
//! line table      u16 segment_id, u16 pair_count
//!   (per segment) u32 offset[pair_count]
//!                 u16 line[pair_count]
//! ```
//!
//! The offsets block fully precedes the lines block; the pairs are not
//! interleaved.

use smallvec::SmallVec;
use tracing::trace;

use super::directory::DirectoryEntry;
use super::subsection::SubsectionRecord;
use crate::cursor::Cursor;
use crate::error::FormatError;

/// Registry entry point for `sstSrcModule`.
///
/// ## Errors
///
/// See [`SourceModule::decode`].
pub fn decode_source_module(cursor: &mut Cursor<'_>, _entry: &DirectoryEntry) -> Result<SubsectionRecord, FormatError>
{
    SourceModule::decode(cursor).map(SubsectionRecord::SourceModule)
}

/// Code range a module claims inside one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentExtent
{
    /// Segment index.
    pub segment: u16,
    /// First byte of the module's code.
    pub start: u32,
    /// Last byte of the module's code.
    pub end: u32,
}

impl SegmentExtent
{
    /// A `(0, 0)` extent means the linker did not record the range; the
    /// per-file line tables are the only source of truth for it.
    #[must_use]
    pub fn is_unknown(&self) -> bool
    {
        self.start == 0 && self.end == 0
    }
}

/// Decoded `sstSrcModule`: one object module's files and line tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceModule
{
    extents: Vec<SegmentExtent>,
    files: Vec<SourceFile>,
}

impl SourceModule
{
    /// Decode a source module from a cursor positioned at (and windowed to)
    /// the subsection content.
    ///
    /// ## Errors
    ///
    /// - [`FormatError::OutOfBounds`] if any table offset, count or string
    ///   points outside the subsection
    /// - [`FormatError::BadPadding`] if a file table's pad field is non-zero
    /// - [`FormatError::NonMonotonicOffsets`] if a line table's offsets
    ///   decrease
    /// - [`FormatError::InvertedRange`] if a file segment starts after it ends
    pub fn decode(cursor: &mut Cursor<'_>) -> Result<Self, FormatError>
    {
        let base = cursor.pos();

        let file_count = usize::from(cursor.read_le::<u16>()?);
        let segment_count = usize::from(cursor.read_le::<u16>()?);
        trace!("Source module at {base:#x}: {file_count} files, {segment_count} segments");

        let file_offsets: Vec<u32> = cursor.read_le_vec(file_count)?;
        let ranges = read_ranges(cursor, segment_count)?;
        let segment_ids: Vec<u16> = cursor.read_le_vec(segment_count)?;

        let extents = segment_ids
            .into_iter()
            .zip(ranges)
            .map(|(segment, (start, end))| SegmentExtent { segment, start, end })
            .collect();

        let files = file_offsets
            .into_iter()
            .map(|offset| SourceFile::decode(cursor, base, offset))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { extents, files })
    }

    /// Module-level segment extents, in header order.
    #[must_use]
    pub fn extents(&self) -> &[SegmentExtent]
    {
        &self.extents
    }

    /// Source files, in header order.
    #[must_use]
    pub fn files(&self) -> &[SourceFile]
    {
        &self.files
    }
}

/// One source file and the segments it contributes code to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile
{
    name: String,
    segments: SmallVec<[SourceSegment; 2]>,
}

impl SourceFile
{
    fn decode(cursor: &mut Cursor<'_>, base: usize, offset: u32) -> Result<Self, FormatError>
    {
        cursor.seek_from(base, offset)?;
        trace!("File table at {:#x}", cursor.pos());

        let segment_count = usize::from(cursor.read_le::<u16>()?);
        let pad_position = cursor.pos();
        let pad = cursor.read_le::<u16>()?;
        if pad != 0 {
            return Err(FormatError::BadPadding {
                position: pad_position,
                value: pad,
            });
        }

        let table_offsets: Vec<u32> = cursor.read_le_vec(segment_count)?;
        let ranges = read_ranges(cursor, segment_count)?;
        let name = cursor.read_prefixed_string()?;

        let segments = table_offsets
            .into_iter()
            .zip(ranges)
            .map(|(table, (start, end))| SourceSegment::decode(cursor, base, table, start, end))
            .collect::<Result<SmallVec<[SourceSegment; 2]>, _>>()?;

        Ok(Self { name, segments })
    }

    /// Build a file from already-decoded segments.
    #[must_use]
    pub fn new(name: impl Into<String>, segments: impl IntoIterator<Item = SourceSegment>) -> Self
    {
        Self {
            name: name.into(),
            segments: segments.into_iter().collect(),
        }
    }

    /// File name as recorded by the compiler.
    #[must_use]
    pub fn name(&self) -> &str
    {
        &self.name
    }

    /// Segments this file contributes to, in table order.
    #[must_use]
    pub fn segments(&self) -> &[SourceSegment]
    {
        &self.segments
    }
}

/// Line table for one file within one segment.
///
/// `offsets` and `lines` are parallel: `lines[i]` starts at `offsets[i]` and
/// covers everything up to the next entry's offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSegment
{
    segment: u16,
    start: u32,
    end: u32,
    offsets: Vec<u32>,
    lines: Vec<u16>,
}

impl SourceSegment
{
    fn decode(cursor: &mut Cursor<'_>, base: usize, table: u32, start: u32, end: u32) -> Result<Self, FormatError>
    {
        cursor.seek_from(base, table)?;

        let segment = cursor.read_le::<u16>()?;
        let pairs = usize::from(cursor.read_le::<u16>()?);
        trace!("Line table for segment {segment} at {:#x}: {pairs} pairs", cursor.pos() - 4);

        cursor.ensure(pairs, 6)?;
        let offsets = cursor.read_le_vec(pairs)?;
        let lines = cursor.read_le_vec(pairs)?;

        Self::new(segment, start, end, offsets, lines)
    }

    /// Build a validated line table.
    ///
    /// ## Errors
    ///
    /// - [`FormatError::LineCountMismatch`] if `offsets` and `lines` differ in
    ///   length
    /// - [`FormatError::InvertedRange`] if `start > end`
    /// - [`FormatError::NonMonotonicOffsets`] if `offsets` ever decreases
    pub fn new(segment: u16, start: u32, end: u32, offsets: Vec<u32>, lines: Vec<u16>) -> Result<Self, FormatError>
    {
        if offsets.len() != lines.len() {
            return Err(FormatError::LineCountMismatch {
                segment,
                offsets: offsets.len(),
                lines: lines.len(),
            });
        }
        if start > end {
            return Err(FormatError::InvertedRange { segment, start, end });
        }
        if let Some(index) = offsets.windows(2).position(|pair| pair[1] < pair[0]) {
            return Err(FormatError::NonMonotonicOffsets {
                segment,
                index: index + 1,
            });
        }

        Ok(Self {
            segment,
            start,
            end,
            offsets,
            lines,
        })
    }

    /// Segment index from the line table header.
    #[must_use]
    pub fn segment(&self) -> u16
    {
        self.segment
    }

    /// First byte claimed by this file in the segment.
    #[must_use]
    pub fn start(&self) -> u32
    {
        self.start
    }

    /// Last byte claimed by this file in the segment (inclusive).
    #[must_use]
    pub fn end(&self) -> u32
    {
        self.end
    }

    /// Code offsets, non-decreasing.
    #[must_use]
    pub fn offsets(&self) -> &[u32]
    {
        &self.offsets
    }

    /// Line numbers, parallel to [`Self::offsets`].
    #[must_use]
    pub fn lines(&self) -> &[u16]
    {
        &self.lines
    }

    /// Whether `offset` lies in `start..=end`.
    ///
    /// A `(0, 0)` range is tested literally and so claims offset 0.
    #[must_use]
    pub fn contains(&self, offset: u32) -> bool
    {
        self.start <= offset && offset <= self.end
    }

    /// Line whose code starts at the greatest offset not above `offset`.
    ///
    /// Offsets below the first entry map to the first line. Returns `None`
    /// only for an empty table.
    #[must_use]
    pub fn line_at(&self, offset: u32) -> Option<u16>
    {
        let after = self.offsets.partition_point(|&start| start <= offset);
        self.lines.get(after.saturating_sub(1)).copied()
    }

    /// Offset of the first entry for `line`.
    #[must_use]
    pub fn offset_of(&self, line: u16) -> Option<u32>
    {
        self.lines
            .iter()
            .position(|&candidate| candidate == line)
            .map(|index| self.offsets[index])
    }

    /// `(offset, line)` pairs in table order.
    pub fn entries(&self) -> impl Iterator<Item = (u32, u16)> + '_
    {
        self.offsets.iter().copied().zip(self.lines.iter().copied())
    }
}

fn read_ranges(cursor: &mut Cursor<'_>, count: usize) -> Result<Vec<(u32, u32)>, FormatError>
{
    cursor.ensure(count, 8)?;
    let mut ranges = Vec::with_capacity(count);
    for _ in 0..count {
        let start = cursor.read_le::<u32>()?;
        let end = cursor.read_le::<u32>()?;
        ranges.push((start, end));
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn segment(offsets: &[u32], lines: &[u16]) -> SourceSegment
    {
        SourceSegment::new(1, 100, 300, offsets.to_vec(), lines.to_vec()).unwrap()
    }

    #[test]
    fn test_line_at_picks_greatest_offset_not_above()
    {
        let seg = segment(&[100, 200, 300], &[10, 11, 12]);
        assert_eq!(seg.line_at(100), Some(10));
        assert_eq!(seg.line_at(199), Some(10));
        assert_eq!(seg.line_at(200), Some(11));
        assert_eq!(seg.line_at(250), Some(11));
        assert_eq!(seg.line_at(300), Some(12));
    }

    #[test]
    fn test_line_at_below_first_offset_keeps_first_line()
    {
        let seg = segment(&[150, 200], &[7, 8]);
        assert_eq!(seg.line_at(120), Some(7));
    }

    #[test]
    fn test_line_at_with_duplicate_offsets_takes_last()
    {
        let seg = segment(&[100, 200, 200, 250], &[1, 2, 3, 4]);
        assert_eq!(seg.line_at(200), Some(3));
        assert_eq!(seg.line_at(249), Some(3));
    }

    #[test]
    fn test_empty_table_has_no_line()
    {
        let seg = segment(&[], &[]);
        assert_eq!(seg.line_at(150), None);
        assert_eq!(seg.offset_of(1), None);
    }

    #[test]
    fn test_new_rejects_decreasing_offsets()
    {
        let err = SourceSegment::new(3, 0, 10, vec![0, 8, 4], vec![1, 2, 3]).unwrap_err();
        assert_eq!(err, FormatError::NonMonotonicOffsets { segment: 3, index: 2 });
    }

    #[test]
    fn test_new_rejects_inverted_range()
    {
        let err = SourceSegment::new(2, 20, 10, vec![], vec![]).unwrap_err();
        assert_eq!(err, FormatError::InvertedRange { segment: 2, start: 20, end: 10 });
    }

    #[test]
    fn test_new_rejects_unpaired_lines()
    {
        let err = SourceSegment::new(1, 0, 100, vec![0, 10, 20], vec![5]).unwrap_err();
        assert_eq!(
            err,
            FormatError::LineCountMismatch {
                segment: 1,
                offsets: 3,
                lines: 1
            }
        );
        assert!(SourceSegment::new(1, 0, 100, vec![0], vec![5, 6]).is_err());
    }

    #[test]
    fn test_zero_range_contains_offset_zero()
    {
        let seg = SourceSegment::new(1, 0, 0, vec![0], vec![5]).unwrap();
        assert!(seg.contains(0));
        assert!(!seg.contains(1));
    }

    #[test]
    fn test_offset_of_returns_first_match()
    {
        let seg = segment(&[100, 140, 200], &[10, 12, 10]);
        assert_eq!(seg.offset_of(10), Some(100));
        assert_eq!(seg.offset_of(12), Some(140));
        assert_eq!(seg.offset_of(11), None);
    }
}
