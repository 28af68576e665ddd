//! Implements canonical prefix code decoding.
//!
//! Codeword lengths arrive either as one of a handful of fixed
//! templates for up to four symbols, or as a full code-length table
//! that is itself prefix coded with repeat codes.

use crate::math::Log;
use crate::{BitReader, DecoderError};

/// Transmission order of the code-length-code lengths.
const CODE_LENGTH_ORDER: [usize; 18] = [1, 2, 3, 4, 0, 5, 17, 6, 16, 7, 8, 9, 10, 11, 12, 13, 14, 15];

/// Fixed code for the code-length-code lengths, as
/// (symbol, length, codeword) with the codeword bits in read order.
const CODE_LENGTH_CODE: [(u16, u8, u32); 6] = [
    (0, 2, 0b00),
    (4, 2, 0b01),
    (3, 2, 0b10),
    (2, 3, 0b011),
    (1, 4, 0b0111),
    (5, 4, 0b1111),
];

#[derive(Clone, Copy, Debug, Default)]
struct VlcEntry {
    symbol: u16,
    length: u8,
}

/// One-shot lookup table for a prefix code.
///
/// The table is indexed by the next `max_length` stream bits. Each
/// codeword fills every index whose low bits match it, so a single
/// peek resolves any symbol.
#[derive(Debug)]
pub(crate) struct VlcTable {
    entries: Vec<VlcEntry>,
    max_length: u32,
}

impl VlcTable {
    /// A degenerate code over one symbol, consuming no bits.
    pub(crate) fn singleton(symbol: u16) -> Self {
        Self {
            entries: vec![VlcEntry { symbol, length: 0 }],
            max_length: 0,
        }
    }

    /// Builds the canonical code for the given codeword lengths.
    ///
    /// Within a length, codewords are assigned in symbol order. The
    /// lengths must describe a complete code, except that a single
    /// used symbol degenerates into a zero bit code.
    pub(crate) fn from_lengths(lengths: &[u32]) -> Result<Self, DecoderError> {
        let max_length = lengths.iter().copied().max().unwrap_or(0);
        if max_length > 15 {
            return Err(DecoderError::InvalidPrefixCode("codeword length exceeds 15"));
        }

        let mut used = lengths.iter().enumerate().filter(|(_, &length)| length != 0);
        let first_used = match used.next() {
            Some((symbol, _)) => symbol,
            None => return Err(DecoderError::InvalidPrefixCode("no symbol has a codeword")),
        };
        if used.next().is_none() {
            return Ok(Self::singleton(first_used as u16));
        }

        let kraft_sum: u32 = lengths
            .iter()
            .filter(|&&length| length != 0)
            .map(|&length| 1 << (max_length - length))
            .sum();
        if kraft_sum != 1 << max_length {
            return Err(DecoderError::InvalidPrefixCode("code lengths are not complete"));
        }

        let table_size = 1_usize << max_length;
        let mut entries = vec![VlcEntry::default(); table_size];
        let mut code: u32 = 0;
        for length in 1..=max_length {
            for (symbol, _) in lengths.iter().enumerate().filter(|(_, &l)| l == length) {
                // The canonical codeword reads most significant bit
                // first, which is the reversed table index.
                let base = (code.reverse_bits() >> (32 - length)) as usize;
                let mut index = base;
                while index < table_size {
                    entries[index] = VlcEntry {
                        symbol: symbol as u16,
                        length: length as u8,
                    };
                    index += 1 << length;
                }
                code += 1;
            }
            code <<= 1;
        }

        Ok(Self {
            entries,
            max_length,
        })
    }

    /// Builds a table from explicit codewords given in read order.
    pub(crate) fn from_codes(codes: &[(u16, u8, u32)], max_length: u32) -> Self {
        let table_size = 1_usize << max_length;
        let mut entries = vec![VlcEntry::default(); table_size];
        for &(symbol, length, code) in codes {
            let mut index = code as usize;
            while index < table_size {
                entries[index] = VlcEntry { symbol, length };
                index += 1 << length;
            }
        }
        Self {
            entries,
            max_length,
        }
    }

    pub(crate) fn read_symbol(&self, reader: &mut BitReader<'_>) -> Result<u32, DecoderError> {
        if self.max_length == 0 {
            return Ok(u32::from(self.entries[0].symbol));
        }
        let peek = reader.peek_bits(self.max_length) as usize;
        let entry = self.entries[peek];
        if entry.length == 0 {
            return Err(DecoderError::InvalidPrefixCode("unassigned codeword"));
        }
        reader.consume_bits(u32::from(entry.length))?;
        Ok(u32::from(entry.symbol))
    }
}

/// A prefix coded symbol distribution for one cluster.
#[derive(Debug)]
pub(crate) struct PrefixDistribution {
    table: VlcTable,
}

impl PrefixDistribution {
    /// Reads the code description for a distribution over
    /// `alphabet_size` symbols.
    pub(crate) fn read(
        reader: &mut BitReader<'_>,
        alphabet_size: usize,
    ) -> Result<Self, DecoderError> {
        if alphabet_size == 1 {
            return Ok(Self {
                table: VlcTable::singleton(0),
            });
        }
        let hskip = reader.read_bits(2)?;
        let table = if hskip == 1 {
            Self::read_simple(reader, alphabet_size)?
        } else {
            Self::read_complex(reader, alphabet_size, hskip as usize)?
        };
        Ok(Self { table })
    }

    pub(crate) fn read_token(&self, reader: &mut BitReader<'_>) -> Result<u32, DecoderError> {
        self.table.read_symbol(reader)
    }

    /// Up to four explicitly listed symbols with template lengths.
    fn read_simple(
        reader: &mut BitReader<'_>,
        alphabet_size: usize,
    ) -> Result<VlcTable, DecoderError> {
        let num_symbols = reader.read_bits(2)? as usize + 1;
        let symbol_bits = (alphabet_size - 1).bit_len();

        let mut symbols = [0_usize; 4];
        for i in 0..num_symbols {
            let symbol = reader.read_bits(symbol_bits)? as usize;
            if symbol >= alphabet_size {
                return Err(DecoderError::InvalidPrefixCode("symbol outside the alphabet"));
            }
            if symbols[..i].contains(&symbol) {
                return Err(DecoderError::InvalidPrefixCode("duplicate symbol"));
            }
            symbols[i] = symbol;
        }

        let mut lengths = vec![0_u32; alphabet_size];
        match num_symbols {
            1 => return Ok(VlcTable::singleton(symbols[0] as u16)),
            2 => {
                lengths[symbols[0]] = 1;
                lengths[symbols[1]] = 1;
            }
            3 => {
                lengths[symbols[0]] = 1;
                lengths[symbols[1]] = 2;
                lengths[symbols[2]] = 2;
            }
            _ => {
                if reader.read_bool()? {
                    lengths[symbols[0]] = 1;
                    lengths[symbols[1]] = 2;
                    lengths[symbols[2]] = 3;
                    lengths[symbols[3]] = 3;
                } else {
                    for &symbol in symbols.iter() {
                        lengths[symbol] = 2;
                    }
                }
            }
        }
        VlcTable::from_lengths(&lengths)
    }

    /// Full code-length table, itself prefix coded with repeat codes.
    fn read_complex(
        reader: &mut BitReader<'_>,
        alphabet_size: usize,
        hskip: usize,
    ) -> Result<VlcTable, DecoderError> {
        let code_length_code = VlcTable::from_codes(&CODE_LENGTH_CODE, 4);

        let mut code_length_lengths = [0_u32; 18];
        let mut space: i32 = 32;
        let mut used = 0;
        let mut i = hskip;
        while i < 18 && space > 0 {
            let length = code_length_code.read_symbol(reader)?;
            code_length_lengths[CODE_LENGTH_ORDER[i]] = length;
            if length != 0 {
                space -= 32 >> length;
                used += 1;
            }
            i += 1;
        }
        if space < 0 || (space > 0 && used != 1) {
            return Err(DecoderError::InvalidPrefixCode("invalid code-length-code lengths"));
        }
        let length_code = VlcTable::from_lengths(&code_length_lengths)?;

        let mut lengths = vec![0_u32; alphabet_size];
        let mut space: i32 = 32768;
        let mut previous_length: u32 = 8;
        let mut repeat: u32 = 0;
        let mut repeat_length: u32 = 0;
        let mut symbol = 0;
        while symbol < alphabet_size && space > 0 {
            let code = length_code.read_symbol(reader)?;
            if code < 16 {
                repeat = 0;
                lengths[symbol] = code;
                symbol += 1;
                if code != 0 {
                    previous_length = code;
                    space -= 32768 >> code;
                }
            } else {
                let extra_bits = if code == 16 { 2 } else { 3 };
                let new_length = if code == 16 { previous_length } else { 0 };
                if repeat_length != new_length {
                    repeat = 0;
                    repeat_length = new_length;
                }
                let old_repeat = repeat;
                if repeat > 0 {
                    repeat = (repeat - 2) << extra_bits;
                }
                repeat += reader.read_bits(extra_bits)? + 3;
                let repeat_delta = (repeat - old_repeat) as usize;
                if symbol + repeat_delta > alphabet_size {
                    return Err(DecoderError::InvalidPrefixCode("repeat run past the alphabet"));
                }
                for length in lengths[symbol..symbol + repeat_delta].iter_mut() {
                    *length = repeat_length;
                }
                symbol += repeat_delta;
                if repeat_length != 0 {
                    space -= (repeat_delta as i32) << (15 - repeat_length);
                }
            }
        }
        if space < 0 {
            return Err(DecoderError::InvalidPrefixCode("oversubscribed code lengths"));
        }
        let used = lengths.iter().filter(|&&length| length != 0).count();
        if space > 0 && used != 1 {
            return Err(DecoderError::InvalidPrefixCode("incomplete code lengths"));
        }
        VlcTable::from_lengths(&lengths)
    }
}
