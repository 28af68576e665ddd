//! Implements the bit level access to the codestream.

use crate::DecoderError;

/// Reads bits from a byte slice, least significant bit first.
///
/// Bit `i` of the stream is bit `i % 8` of byte `i / 8`. Multi-bit
/// reads place earlier stream bits at lower positions of the result.
pub struct BitReader<'d> {
    data: &'d [u8],
    /// Position of the next unread bit.
    position: usize,
}

impl<'d> BitReader<'d> {
    /// Creates a new bit reader over the given bytes.
    pub fn new(data: &'d [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Number of bits that can still be read.
    pub fn bits_remaining(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.position)
    }

    /// Reads `count` bits. `count` must not exceed 32.
    pub fn read_bits(&mut self, count: u32) -> Result<u32, DecoderError> {
        if count > 32 {
            return Err(DecoderError::InvalidBitCount(count));
        }
        if (count as usize) > self.bits_remaining() {
            return Err(DecoderError::UnexpectedEof);
        }
        let value = self.peek_bits(count);
        self.position += count as usize;
        Ok(value)
    }

    /// Reads a single bit as a boolean.
    pub fn read_bool(&mut self) -> Result<bool, DecoderError> {
        Ok(self.read_bits(1)? == 1)
    }

    /// Reads a small non negative integer.
    ///
    /// A zero bit encodes the value 0. Otherwise three bits give the
    /// magnitude class `n`, with `n == 0` encoding 1 and any other `n`
    /// encoding `read_bits(n) + 2^n`.
    pub fn read_u8(&mut self) -> Result<u32, DecoderError> {
        if !self.read_bool()? {
            return Ok(0);
        }
        let n = self.read_bits(3)?;
        if n == 0 {
            return Ok(1);
        }
        Ok(self.read_bits(n)? + (1 << n))
    }

    /// Reads a variable length integer described by four
    /// `(offset, extra_bits)` choices selected by two bits.
    pub fn read_u32(&mut self, choices: [(u32, u32); 4]) -> Result<u32, DecoderError> {
        let (offset, extra_bits) = choices[self.read_bits(2)? as usize];
        Ok(offset + self.read_bits(extra_bits)?)
    }

    /// Reads a variable length 64 bit integer.
    pub fn read_u64(&mut self) -> Result<u64, DecoderError> {
        match self.read_bits(2)? {
            0 => Ok(0),
            1 => Ok(1 + u64::from(self.read_bits(4)?)),
            2 => Ok(17 + u64::from(self.read_bits(8)?)),
            _ => {
                let mut value = u64::from(self.read_bits(12)?);
                let mut shift = 12;
                while self.read_bool()? {
                    if shift == 60 {
                        value |= u64::from(self.read_bits(4)?) << shift;
                        break;
                    }
                    value |= u64::from(self.read_bits(8)?) << shift;
                    shift += 8;
                }
                Ok(value)
            }
        }
    }

    /// Returns the next `count` bits without consuming them. Bits past
    /// the end of the stream read as zero. `count` must not exceed 32.
    pub fn peek_bits(&self, count: u32) -> u32 {
        debug_assert!(count <= 32);
        if count == 0 {
            return 0;
        }
        let mut value: u64 = 0;
        let mut filled = 0;
        let mut byte_index = self.position / 8;
        let bit_offset = (self.position % 8) as u32;

        if bit_offset != 0 {
            if let Some(&byte) = self.data.get(byte_index) {
                value = u64::from(byte >> bit_offset);
            }
            filled = 8 - bit_offset;
            byte_index += 1;
        }

        while filled < count {
            if let Some(&byte) = self.data.get(byte_index) {
                value |= u64::from(byte) << filled;
            }
            filled += 8;
            byte_index += 1;
        }

        (value & ((1_u64 << count) - 1)) as u32
    }

    /// Advances the reader by `count` bits previously peeked.
    pub fn consume_bits(&mut self, count: u32) -> Result<(), DecoderError> {
        if (count as usize) > self.bits_remaining() {
            return Err(DecoderError::UnexpectedEof);
        }
        self.position += count as usize;
        Ok(())
    }

    /// Skips forward to the next byte boundary.
    pub fn align_to_byte(&mut self) {
        self.position = (self.position + 7) & !7;
    }
}
