//! Helpers shared between the unit tests.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]

/// Builds a byte stream bit by bit, least significant bit first, in
/// the same order [`crate::BitReader`] consumes it.
pub(crate) struct BitWriter {
    bytes: Vec<u8>,
    bit_position: usize,
}

impl BitWriter {
    pub(crate) fn new() -> Self {
        Self {
            bytes: Vec::new(),
            bit_position: 0,
        }
    }

    pub(crate) fn write_bits(&mut self, value: u32, count: u32) {
        assert!(count <= 32);
        assert!(count == 32 || value < (1 << count));
        for i in 0..count {
            if self.bit_position % 8 == 0 {
                self.bytes.push(0);
            }
            let bit = (value >> i) & 1;
            let byte = self.bytes.last_mut().unwrap();
            *byte |= (bit as u8) << (self.bit_position % 8);
            self.bit_position += 1;
        }
    }

    pub(crate) fn write_bool(&mut self, value: bool) {
        self.write_bits(value as u32, 1);
    }

    /// Mirrors `BitReader::read_u8`.
    pub(crate) fn write_u8(&mut self, value: u32) {
        assert!(value < 256);
        if value == 0 {
            self.write_bool(false);
            return;
        }
        self.write_bool(true);
        if value == 1 {
            self.write_bits(0, 3);
            return;
        }
        let n = 31 - value.leading_zeros();
        self.write_bits(n, 3);
        self.write_bits(value - (1 << n), n);
    }

    /// Mirrors `BitReader::read_u32` for a given selector choice.
    pub(crate) fn write_u32(&mut self, choices: [(u32, u32); 4], value: u32) {
        for (selector, &(offset, extra_bits)) in choices.iter().enumerate() {
            let max = offset + ((1_u64 << extra_bits) - 1) as u32;
            if value >= offset && value <= max {
                self.write_bits(selector as u32, 2);
                self.write_bits(value - offset, extra_bits);
                return;
            }
        }
        panic!("value {} not representable by {:?}", value, choices);
    }

    pub(crate) fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BitReader;

    #[test]
    fn test_writer_matches_reader() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b101, 3);
        writer.write_u8(0);
        writer.write_u8(1);
        writer.write_u8(77);
        writer.write_u8(255);
        writer.write_u32([(3, 0), (4, 0), (5, 2), (9, 8)], 174);
        writer.write_bits(0xDEAD_BEEF, 32);

        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_u8().unwrap(), 0);
        assert_eq!(reader.read_u8().unwrap(), 1);
        assert_eq!(reader.read_u8().unwrap(), 77);
        assert_eq!(reader.read_u8().unwrap(), 255);
        assert_eq!(reader.read_u32([(3, 0), (4, 0), (5, 2), (9, 8)]).unwrap(), 174);
        assert_eq!(reader.read_bits(32).unwrap(), 0xDEAD_BEEF);
    }
}
