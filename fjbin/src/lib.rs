//! Reader/writer for the `.fjm` FlipJump binary image format.
//!
//! ```text
//! offset  width  field
//! 0       u16    magic = 'F' | ('J' << 8)  = 0x4A46
//! 2       u16    word_size (bits): 8, 16, 32, or 64
//! 4       u64    version
//! 12      u64    segment_count
//! 20      u64    flags             (version >= 1 only)
//! 28      u32    reserved = 0      (version >= 1 only)
//! ...            segment_count * (segment_start, segment_length,
//!                                  data_start, data_length) as 4x u64, in words
//! ...            data words, each `word_size` bits wide
//! ```
//!
//! All integers are little-endian. Version 0 ("Base") omits the `flags`
//! and `reserved` fields entirely; version 1 ("Normal") carries both.

mod error;

pub use error::FileFormatError;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use util::Endian;

pub const MAGIC: u16 = 'F' as u16 | (('J' as u16) << 8);

/// `(segment_start, segment_length, data_start, data_length)`, all in words.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentEntry {
    pub segment_start: u64,
    pub segment_length: u64,
    pub data_start: u64,
    pub data_length: u64,
}

impl SegmentEntry {
    /// Inclusive word-address range this segment occupies.
    fn address_range(&self) -> (u64, u64) {
        (
            self.segment_start,
            self.segment_start + self.segment_length - 1,
        )
    }

    fn overlaps(&self, other: &SegmentEntry) -> bool {
        let (a0, a1) = self.address_range();
        let (b0, b1) = other.address_range();
        a0 <= b1 && b0 <= a1
    }
}

/// A decoded `.fjm` file: header fields, segment table, and the flat data
/// words (one `u64` per word, already masked to `word_size` bits).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    pub word_size: u16,
    pub version: u64,
    pub flags: u64,
    pub segments: Vec<SegmentEntry>,
    pub data: Vec<u64>,
}

const SUPPORTED_VERSIONS: [u64; 2] = [0, 1];

fn word_width_bytes(word_size: u16) -> usize {
    word_size as usize / 8
}

pub fn read<R: Read>(reader: &mut R) -> Result<Image, FileFormatError> {
    let magic = reader.read_u16::<Endian>()?;
    if magic != MAGIC {
        return Err(FileFormatError::BadMagic(magic));
    }

    let word_size = reader.read_u16::<Endian>()?;
    if ![8, 16, 32, 64].contains(&word_size) {
        return Err(FileFormatError::UnsupportedWordSize(word_size));
    }

    let version = reader.read_u64::<Endian>()?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(FileFormatError::UnsupportedVersion(version));
    }

    let segment_count = reader.read_u64::<Endian>()?;

    let flags = if version >= 1 {
        let flags = reader.read_u64::<Endian>()?;
        let reserved = reader.read_u32::<Endian>()?;
        if reserved != 0 {
            return Err(FileFormatError::ReservedFieldNotZero);
        }
        flags
    } else {
        0
    };

    let mut segments = Vec::with_capacity(segment_count as usize);
    for _ in 0..segment_count {
        segments.push(SegmentEntry {
            segment_start: reader.read_u64::<Endian>()?,
            segment_length: reader.read_u64::<Endian>()?,
            data_start: reader.read_u64::<Endian>()?,
            data_length: reader.read_u64::<Endian>()?,
        });
    }

    let total_data_words: u64 = segments.iter().map(|s| s.data_length).sum();
    let width = word_width_bytes(word_size);
    let mut data = Vec::with_capacity(total_data_words as usize);
    let mut buf = vec![0u8; width];
    for _ in 0..total_data_words {
        reader.read_exact(&mut buf)?;
        data.push(read_word(&buf, word_size));
    }

    Ok(Image {
        word_size,
        version,
        flags,
        segments,
        data,
    })
}

fn read_word(buf: &[u8], word_size: u16) -> u64 {
    match word_size {
        8 => buf[0] as u64,
        16 => LittleEndian::read_u16(buf) as u64,
        32 => LittleEndian::read_u32(buf) as u64,
        64 => LittleEndian::read_u64(buf),
        _ => unreachable!(),
    }
}

fn write_word(buf: &mut [u8], word_size: u16, value: u64) {
    match word_size {
        8 => buf[0] = value as u8,
        16 => LittleEndian::write_u16(buf, value as u16),
        32 => LittleEndian::write_u32(buf, value as u32),
        64 => LittleEndian::write_u64(buf, value),
        _ => unreachable!(),
    }
}

/// Accumulates segments and validates them before writing a `.fjm` file.
pub struct Writer {
    word_size: u16,
    version: u64,
    flags: u64,
    segments: Vec<SegmentEntry>,
    data: Vec<u64>,
}

impl Writer {
    pub fn new(word_size: u16, version: u64, flags: u64) -> Result<Writer, FileFormatError> {
        if ![8, 16, 32, 64].contains(&word_size) {
            return Err(FileFormatError::UnsupportedWordSize(word_size));
        }
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(FileFormatError::UnsupportedVersion(version));
        }
        if version == 0 && flags != 0 {
            return Err(FileFormatError::FlagsRequireVersion);
        }
        Ok(Writer {
            word_size,
            version,
            flags,
            segments: Vec::new(),
            data: Vec::new(),
        })
    }

    /// Appends a segment whose `segment_length` may exceed `data.len()`
    /// (the excess is implicit trailing zeros at load time).
    pub fn add_segment(
        &mut self,
        segment_start: u64,
        segment_length: u64,
        data: &[u64],
    ) -> Result<(), FileFormatError> {
        if data.len() as u64 > segment_length {
            return Err(FileFormatError::DataLongerThanSegment);
        }
        let data_start = self.data.len() as u64;
        let entry = SegmentEntry {
            segment_start,
            segment_length,
            data_start,
            data_length: data.len() as u64,
        };
        for existing in &self.segments {
            if existing.overlaps(&entry) {
                return Err(FileFormatError::SegmentOverlap);
            }
        }
        self.segments.push(entry);
        self.data.extend_from_slice(data);
        Ok(())
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), FileFormatError> {
        writer.write_u16::<Endian>(MAGIC)?;
        writer.write_u16::<Endian>(self.word_size)?;
        writer.write_u64::<Endian>(self.version)?;
        writer.write_u64::<Endian>(self.segments.len() as u64)?;
        if self.version >= 1 {
            writer.write_u64::<Endian>(self.flags)?;
            writer.write_u32::<Endian>(0)?;
        }
        for s in &self.segments {
            writer.write_u64::<Endian>(s.segment_start)?;
            writer.write_u64::<Endian>(s.segment_length)?;
            writer.write_u64::<Endian>(s.data_start)?;
            writer.write_u64::<Endian>(s.data_length)?;
        }
        let width = word_width_bytes(self.word_size);
        let mut buf = vec![0u8; width];
        for &word in &self.data {
            write_word(&mut buf, self.word_size, word);
            writer.write_all(&buf)?;
        }
        Ok(())
    }

    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), FileFormatError> {
        let mut w = BufWriter::new(File::create(path)?);
        self.write(&mut w)
    }
}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Image, FileFormatError> {
    let mut r = BufReader::new(File::open(path)?);
    read(&mut r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn round_trip_base_version() {
        let mut w = Writer::new(32, 0, 0).unwrap();
        w.add_segment(0, 4, &[1, 2]).unwrap();
        let mut buf = Vec::new();
        w.write(&mut buf).unwrap();

        let image = read(&mut Cursor::new(buf)).unwrap();
        assert_eq!(image.word_size, 32);
        assert_eq!(image.version, 0);
        assert_eq!(image.segments.len(), 1);
        assert_eq!(image.segments[0].segment_length, 4);
        assert_eq!(image.data, vec![1, 2]);
    }

    #[test]
    fn version_zero_forbids_nonzero_flags() {
        assert!(matches!(
            Writer::new(32, 0, 1),
            Err(FileFormatError::FlagsRequireVersion)
        ));
    }

    #[test]
    fn overlapping_segments_rejected() {
        let mut w = Writer::new(8, 0, 0).unwrap();
        w.add_segment(0, 10, &[]).unwrap();
        assert!(matches!(
            w.add_segment(5, 10, &[]),
            Err(FileFormatError::SegmentOverlap)
        ));
    }

    #[test]
    fn adjacent_segments_do_not_overlap() {
        let mut w = Writer::new(8, 0, 0).unwrap();
        w.add_segment(0, 10, &[]).unwrap();
        assert!(w.add_segment(10, 10, &[]).is_ok());
    }

    #[test]
    fn bad_magic_rejected() {
        let buf = vec![0u8; 20];
        assert!(matches!(
            read(&mut Cursor::new(buf)),
            Err(FileFormatError::BadMagic(_))
        ));
    }
}
