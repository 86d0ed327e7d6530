//! Microsoft Office Binary Interchange File Format (BIFF8)
//! Record reader for the `Workbook` stream of Excel 97-2003 files, including
//! CONTINUE records that split long payloads.

use crate::error::StashError;
use crate::helpers::bytes::to_f64;
use crate::helpers::bytes::to_u16;
use crate::helpers::bytes::to_u32;
use crate::helpers::bytes::to_u64;
use crate::helpers::bytes::to_usize;
use encoding_rs::Encoding;
use encoding_rs::UTF_16LE;
use thiserror::Error;

const CONTINUE: u16 = 60;

/// Errors specific to BIFF8 format parsing
#[derive(Error, Debug)]
pub enum Biff8Error {
    #[error("Fewer than {0} bytes remaining")]
    NoEnoughDataError(usize),
}

pub(crate) struct Biff8Reader {
    pub(crate) encoding: &'static Encoding,
    buffer: Vec<u8>,
    /// Start of the next record header
    pointer: usize,
    /// Payload ranges of the current record and its CONTINUE records
    chunks: Vec<(usize, usize)>,
    index: usize,
    offset: usize,
}

impl Biff8Reader {
    pub(crate) fn new(data: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            encoding: UTF_16LE,
            buffer: data,
            pointer: 0,
            chunks: Vec::new(),
            index: 0,
            offset: 0,
        }
    }

    /// Moves to the next record and returns its type, `None` at the end of the stream
    pub(crate) fn next(&mut self) -> Result<Option<u16>, StashError> {
        if self.pointer + 4 > self.buffer.len() {
            return Ok(None);
        }

        self.index = 0;
        self.offset = 0;
        self.chunks.clear();

        let kind = self.get_u16_at(self.pointer)?;
        self.push_chunk()?;
        while self.pointer + 4 <= self.buffer.len() && self.get_u16_at(self.pointer)? == CONTINUE {
            self.push_chunk()?;
        }
        Ok(Some(kind))
    }

    fn push_chunk(&mut self) -> Result<(), StashError> {
        let size = self.get_u16_at(self.pointer + 2)? as usize;
        let lower = self.pointer + 4;
        let upper = (lower + size).min(self.buffer.len());
        self.pointer = lower + size;
        self.chunks.push((lower, upper));
        Ok(())
    }

    /// Jumps to an absolute stream position, such as a BOUNDSHEET8 offset
    pub(crate) fn goto(&mut self, pointer: usize) {
        self.pointer = pointer;
    }

    fn read_exact(&mut self, length: usize) -> Result<&[u8], StashError> {
        let (data, size) = self.read(length);
        if size == length {
            Ok(data)
        } else {
            Err(Biff8Error::NoEnoughDataError(length))?
        }
    }

    /// Reads up to `length` bytes without crossing into the next chunk
    fn read(&mut self, length: usize) -> (&[u8], usize) {
        if let Some((lower, upper)) = self.chunks.get(self.index) {
            let (lower, upper) = (*lower, *upper);
            let source = upper.min(lower + self.offset);
            let target = upper.min(source + length);
            let size = target - source;
            if source < upper {
                if target == upper {
                    self.index += 1;
                    self.offset = 0;
                } else {
                    self.offset += size;
                }
                return (&self.buffer[source..target], size);
            }
        }
        (&[], 0)
    }

    pub(crate) fn skip(&mut self, length: usize) -> Result<(), StashError> {
        let mut remaining = length;
        while remaining > 0 {
            let (_, size) = self.read(remaining);
            if size == 0 {
                Err(Biff8Error::NoEnoughDataError(length))?
            }
            remaining -= size;
        }
        Ok(())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, StashError> {
        self.read_exact(1).map(|data| data[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, StashError> {
        self.read_exact(2).map(to_u16)
    }

    /// Reads a u16 located `offset` bytes before the end of the current record
    pub(crate) fn get_u16_back(&self, offset: usize) -> Result<u16, StashError> {
        let mut offset = offset;
        for (lower, upper) in self.chunks.iter().rev() {
            if *lower + offset <= *upper {
                return self.get_u16_at(*upper - offset);
            }
            offset -= *upper - *lower;
        }
        Err(Biff8Error::NoEnoughDataError(2))?
    }

    fn get_u16_at(&self, index: usize) -> Result<u16, StashError> {
        match self.buffer.get(index..index + 2) {
            Some(bytes) => Ok(to_u16(bytes)),
            None => Err(Biff8Error::NoEnoughDataError(2))?,
        }
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, StashError> {
        self.read_exact(4).map(to_u32)
    }

    pub(crate) fn read_usize(&mut self) -> Result<usize, StashError> {
        self.read_exact(4).map(to_usize)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, StashError> {
        self.read_exact(8).map(to_u64)
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, StashError> {
        self.read_exact(8).map(to_f64)
    }

    /// Reads an RK number: a 30-bit integer or the high bits of an IEEE double,
    /// optionally divided by 100
    pub(crate) fn read_rk_number(&mut self) -> Result<f64, StashError> {
        Ok(decode_rk(self.read_u32()?))
    }

    /// ShortXLUnicodeString: 1-byte character count
    pub(crate) fn read_short_xl_unicode_string(&mut self) -> Result<String, StashError> {
        let chars = self.read_u8()? as usize;
        self.read_string(chars)
    }

    /// XLUnicodeString: 2-byte character count
    pub(crate) fn read_xl_unicode_string(&mut self) -> Result<String, StashError> {
        let chars = self.read_u16()? as usize;
        self.read_string(chars)
    }

    fn read_string(&mut self, chars: usize) -> Result<String, StashError> {
        let mut string = String::new();
        let is_high_byte = (self.read_u8()? & 0x1) > 0;
        let actual = self.read_chars_into(chars, is_high_byte, &mut string);
        if actual < chars {
            Err(Biff8Error::NoEnoughDataError(chars))?
        }
        Ok(string)
    }

    /// XLUnicodeRichExtendedString as stored in the SST. Characters split by a CONTINUE
    /// record resume after a fresh option byte; formatting runs and phonetic data follow
    /// the last character.
    pub(crate) fn read_xl_unicode_rich_extended_string(&mut self) -> Result<String, StashError> {
        let mut string = String::new();
        let chars = self.read_u16()? as usize;
        let flag = self.read_u8()?;
        let rich_string_count = if (flag & 0x8) > 0 {
            self.read_u16()? as usize
        } else {
            0
        };
        let phonetic_size = if (flag & 0x4) > 0 {
            self.read_usize()?
        } else {
            0
        };
        let mut remaining = chars - self.read_chars_into(chars, (flag & 0x1) > 0, &mut string);
        while remaining > 0 {
            let is_high_byte = (self.read_u8()? & 0x1) > 0;
            let actual = self.read_chars_into(remaining, is_high_byte, &mut string);
            if actual == 0 {
                Err(Biff8Error::NoEnoughDataError(remaining))?
            }
            remaining -= actual;
        }
        self.skip(4 * rich_string_count)?;
        self.skip(phonetic_size)?;
        Ok(string)
    }

    /// Decodes up to `chars` characters from the current chunk, returning how many were read
    fn read_chars_into(&mut self, chars: usize, is_high_byte: bool, content: &mut String) -> usize {
        let encoding = self.encoding;
        let expected = if is_high_byte { chars << 1 } else { chars };
        let (bytes, actual) = self.read(expected);
        if is_high_byte {
            let (string, _) = UTF_16LE.decode_without_bom_handling(bytes);
            content.push_str(&string);
        } else if encoding == UTF_16LE {
            // Compressed strings keep only the low byte of each UTF-16 unit
            content.extend(bytes.iter().map(|byte| char::from(*byte)));
        } else {
            // Some writers store 8-bit strings in the workbook's code page
            let (string, _) = encoding.decode_without_bom_handling(bytes);
            content.push_str(&string);
        }
        if is_high_byte { actual >> 1 } else { actual }
    }
}

pub(crate) fn decode_rk(value: u32) -> f64 {
    let is_percentage = (value & 0x01) != 0;
    let is_integer = (value & 0x02) != 0;
    let number = if is_integer {
        ((value as i32) >> 2) as f64
    } else {
        f64::from_bits(((value >> 2) as u64) << 34)
    };
    if is_percentage {
        number / 100.0
    } else {
        number
    }
}

/// Loops over the records of a [`Biff8Reader`], ignoring types the arms do not match.
#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: u16, payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&kind.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn rk_numbers() {
        // 7 as a 30-bit integer
        assert_eq!(decode_rk((7 << 2) | 0x02), 7.0);
        // -3 as a 30-bit integer
        assert_eq!(decode_rk(((-3i32 as u32) << 2) | 0x02), -3.0);
        // 1234 / 100
        assert_eq!(decode_rk((1234 << 2) | 0x03), 12.34);
        // 1.5 from the high 30 bits of the double
        let bits = (1.5f64.to_bits() >> 32) as u32;
        assert_eq!(decode_rk(bits & !0x03), 1.5);
    }

    #[test]
    fn reads_records_with_continue() -> Result<(), StashError> {
        let mut stream = record(516, &[1, 0, 2, 0]);
        stream.extend(record(CONTINUE, &[3, 0]));
        stream.extend(record(10, &[]));
        let mut reader = Biff8Reader::new(stream);

        assert_eq!(reader.next()?, Some(516));
        assert_eq!(reader.read_u16()?, 1);
        assert_eq!(reader.read_u16()?, 2);
        assert_eq!(reader.read_u16()?, 3);
        assert!(reader.read_u8().is_err());
        assert_eq!(reader.next()?, Some(10));
        assert_eq!(reader.next()?, None);
        Ok(())
    }

    #[test]
    fn reads_compressed_and_wide_strings() -> Result<(), StashError> {
        let mut payload = vec![3, 0, 0];
        payload.extend_from_slice(b"Ann");
        payload.extend_from_slice(&[2, 0, 1]);
        payload.extend_from_slice(&[0x42, 0x00, 0xF6, 0x00]);
        let mut reader = Biff8Reader::new(record(516, &payload));

        reader.next()?;
        assert_eq!(reader.read_xl_unicode_string()?, "Ann");
        assert_eq!(reader.read_xl_unicode_string()?, "Bö");
        Ok(())
    }

    #[test]
    fn shared_string_continues_in_next_record() -> Result<(), StashError> {
        let mut stream = record(252, &[1, 0, 0, 0, 1, 0, 0, 0, 5, 0, 0, b'H', b'e']);
        stream.extend(record(CONTINUE, &[0, b'l', b'l', b'o']));
        let mut reader = Biff8Reader::new(stream);

        assert_eq!(reader.next()?, Some(252));
        reader.skip(8)?;
        assert_eq!(reader.read_xl_unicode_rich_extended_string()?, "Hello");
        Ok(())
    }

    #[test]
    fn truncated_record_is_an_error() -> Result<(), StashError> {
        let mut stream = record(515, &[0u8; 14]);
        stream.truncate(10);
        let mut reader = Biff8Reader::new(stream);
        assert_eq!(reader.next()?, Some(515));
        assert!(reader.read_u64().is_err());
        Ok(())
    }
}
