//! Implements ANS symbol distributions with alias table lookup.
//!
//! Each distribution holds symbol frequencies summing to 4096 and an
//! alias mapping that turns the low twelve bits of the shared state
//! register into a symbol and an offset in a single table lookup.

use crate::entropy_coder::prefix::VlcTable;
use crate::{BitReader, DecoderError};

/// Value the state register starts from on the encoder side, and must
/// return to after the last symbol.
const INITIAL_STATE: u32 = 0x0013_0000;

const DIST_BITS: u32 = 12;
const DIST_SUM: u32 = 1 << DIST_BITS;

/// Fixed code for the frequency log counts, as
/// (symbol, length, codeword) with the codeword bits in read order.
/// Symbol 13 marks a run of repeated frequencies.
const LOG_COUNT_CODE: [(u16, u8, u32); 14] = [
    (0, 5, 0b10001),
    (1, 4, 0b1011),
    (2, 4, 0b1111),
    (3, 4, 0b0011),
    (4, 4, 0b1001),
    (5, 4, 0b0111),
    (6, 3, 0b100),
    (7, 3, 0b010),
    (8, 3, 0b101),
    (9, 3, 0b110),
    (10, 3, 0b000),
    (11, 6, 0b100001),
    (12, 7, 0b0000001),
    (13, 7, 0b1000001),
];

/// The shared state register of one decoding pass.
///
/// The register is filled from the stream on first use and threaded
/// through every ANS distribution of the owning engine.
#[derive(Debug)]
pub(crate) struct AnsState(Option<u32>);

impl AnsState {
    pub(crate) fn new() -> Self {
        Self(None)
    }

    /// Checks that the register returned to its initial value. Passes
    /// trivially when no ANS symbol was ever decoded.
    pub(crate) fn validate_final(&self) -> Result<(), DecoderError> {
        match self.0 {
            None => Ok(()),
            Some(INITIAL_STATE) => Ok(()),
            Some(_) => Err(DecoderError::InvalidBitstream("ANS state checksum mismatch")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct AliasBucket {
    cutoff: u32,
    symbol: u32,
    offset: u32,
}

/// One ANS coded symbol distribution.
#[derive(Debug)]
pub(crate) struct AnsDistribution {
    frequencies: Vec<u32>,
    buckets: Vec<AliasBucket>,
    log_bucket_size: u32,
}

impl AnsDistribution {
    /// Reads the frequency table for a distribution over at most
    /// `2^log_alphabet_size` symbols and builds its alias mapping.
    pub(crate) fn read(
        reader: &mut BitReader<'_>,
        log_alphabet_size: u32,
    ) -> Result<Self, DecoderError> {
        let frequencies = Self::read_frequencies(reader, log_alphabet_size)?;
        let log_bucket_size = DIST_BITS - log_alphabet_size;
        let buckets = Self::build_alias_mapping(&frequencies, log_bucket_size)?;
        Ok(Self {
            frequencies,
            buckets,
            log_bucket_size,
        })
    }

    /// Decodes one token, advancing the shared state register.
    pub(crate) fn read_token(
        &self,
        reader: &mut BitReader<'_>,
        state: &mut AnsState,
    ) -> Result<u32, DecoderError> {
        let mut register = match state.0 {
            Some(register) => register,
            None => reader.read_bits(32)?,
        };

        let index = register & (DIST_SUM - 1);
        let bucket_index = (index >> self.log_bucket_size) as usize;
        let pos = index & ((1 << self.log_bucket_size) - 1);
        let bucket = self.buckets[bucket_index];
        let (symbol, offset) = if pos < bucket.cutoff {
            (bucket_index as u32, pos)
        } else {
            (bucket.symbol, bucket.offset + pos)
        };

        let frequency = self.frequencies[symbol as usize];
        if frequency == 0 {
            return Err(DecoderError::InvalidBitstream("symbol with zero frequency"));
        }
        register = frequency * (register >> DIST_BITS) + offset;
        if register < (1 << 16) {
            register = (register << 16) | reader.read_bits(16)?;
        }
        state.0 = Some(register);

        Ok(symbol)
    }

    fn read_frequencies(
        reader: &mut BitReader<'_>,
        log_alphabet_size: u32,
    ) -> Result<Vec<u32>, DecoderError> {
        let table_size = 1_usize << log_alphabet_size;
        let mut frequencies = vec![0_u32; table_size];

        let simple = reader.read_bool()?;
        let flat_or_dual = reader.read_bool()?;
        match (simple, flat_or_dual) {
            (true, true) => {
                // Two used symbols.
                let first = reader.read_u8()? as usize;
                let second = reader.read_u8()? as usize;
                if first == second {
                    return Err(DecoderError::OverlappingPeaks);
                }
                if first >= table_size || second >= table_size {
                    return Err(DecoderError::InvalidFrequencyTable(
                        "peak outside the alphabet",
                    ));
                }
                frequencies[first] = reader.read_bits(DIST_BITS)?;
                frequencies[second] = DIST_SUM - frequencies[first];
            }
            (true, false) => {
                // A single used symbol.
                let peak = reader.read_u8()? as usize;
                if peak >= table_size {
                    return Err(DecoderError::InvalidFrequencyTable(
                        "peak outside the alphabet",
                    ));
                }
                frequencies[peak] = DIST_SUM;
            }
            (false, true) => {
                // Evenly split over the first `alphabet_size` symbols.
                let alphabet_size = reader.read_u8()? as usize + 1;
                if alphabet_size > table_size {
                    return Err(DecoderError::InvalidFrequencyTable("alphabet too large"));
                }
                let base = DIST_SUM / alphabet_size as u32;
                let bias = (DIST_SUM % alphabet_size as u32) as usize;
                for (i, frequency) in frequencies[..alphabet_size].iter_mut().enumerate() {
                    *frequency = if i < bias { base + 1 } else { base };
                }
            }
            (false, false) => {
                Self::read_general_frequencies(reader, &mut frequencies, table_size)?;
            }
        }

        Ok(frequencies)
    }

    /// The general form: per symbol log counts with run-length coding,
    /// one position omitted and reconstructed from the remainder.
    fn read_general_frequencies(
        reader: &mut BitReader<'_>,
        frequencies: &mut [u32],
        table_size: usize,
    ) -> Result<(), DecoderError> {
        let mut unary = 0;
        while unary < 3 && reader.read_bool()? {
            unary += 1;
        }
        let shift = (reader.read_bits(unary)? | (1 << unary)) - 1;
        if shift > 13 {
            return Err(DecoderError::InvalidFrequencyTable("shift exceeds 13"));
        }
        let alphabet_size = reader.read_u8()? as usize + 3;
        if alphabet_size > table_size {
            return Err(DecoderError::InvalidFrequencyTable("alphabet too large"));
        }

        let log_count_code = VlcTable::from_codes(&LOG_COUNT_CODE, 7);
        let mut log_counts = vec![0_u32; alphabet_size];
        let mut runs = vec![0_usize; alphabet_size];
        let mut omit_pos = None;
        let mut omit_log = -1_i64;
        let mut i = 0;
        while i < alphabet_size {
            let log_count = log_count_code.read_symbol(reader)?;
            log_counts[i] = log_count;
            if log_count == 13 {
                let run = reader.read_u8()? as usize + 4;
                if i + run > alphabet_size {
                    return Err(DecoderError::InvalidFrequencyTable(
                        "run past the alphabet",
                    ));
                }
                runs[i] = run;
                i += run;
                continue;
            }
            if i64::from(log_count) >= omit_log {
                omit_log = i64::from(log_count);
                omit_pos = Some(i);
            }
            i += 1;
        }
        let omit_pos = match omit_pos {
            Some(pos) => pos,
            None => {
                return Err(DecoderError::InvalidFrequencyTable("no omitted entry"));
            }
        };
        if log_counts.get(omit_pos + 1) == Some(&13) {
            return Err(DecoderError::InvalidFrequencyTable(
                "run follows the omitted entry",
            ));
        }

        let mut total = 0_u32;
        let mut previous = 0_u32;
        let mut i = 0;
        while i < alphabet_size {
            if runs[i] > 0 {
                let run = runs[i];
                for frequency in frequencies[i..i + run].iter_mut() {
                    *frequency = previous;
                }
                total += previous * run as u32;
                i += run;
                continue;
            }
            if i == omit_pos {
                i += 1;
                continue;
            }
            let log_count = log_counts[i];
            frequencies[i] = match log_count {
                0 => 0,
                1 => 1,
                _ => {
                    let bit_count = (shift as i64 - ((i64::from(DIST_BITS) + 1 - i64::from(log_count)) >> 1))
                        .max(0)
                        .min(i64::from(log_count) - 1) as u32;
                    (1 << (log_count - 1)) + (reader.read_bits(bit_count)? << (log_count - 1 - bit_count))
                }
            };
            total += frequencies[i];
            previous = frequencies[i];
            i += 1;
        }
        if total > DIST_SUM {
            return Err(DecoderError::InvalidFrequencyTable(
                "frequencies exceed the total",
            ));
        }
        frequencies[omit_pos] = DIST_SUM - total;
        Ok(())
    }

    /// Balances the frequencies over equally sized buckets so that one
    /// table lookup maps any state index to its symbol.
    fn build_alias_mapping(
        frequencies: &[u32],
        log_bucket_size: u32,
    ) -> Result<Vec<AliasBucket>, DecoderError> {
        let bucket_size = 1_u32 << log_bucket_size;
        let table_size = frequencies.len();
        let mut buckets = vec![AliasBucket::default(); table_size];

        let mut used = frequencies.iter().enumerate().filter(|(_, &f)| f != 0);
        let single = match (used.next(), used.next()) {
            (Some((symbol, _)), None) => Some(symbol),
            _ => None,
        };
        if let Some(symbol) = single {
            for (i, bucket) in buckets.iter_mut().enumerate() {
                bucket.symbol = symbol as u32;
                bucket.offset = (i as u32) << log_bucket_size;
                bucket.cutoff = 0;
            }
            return Ok(buckets);
        }

        let mut underfull = Vec::new();
        let mut overfull = Vec::new();
        for (i, bucket) in buckets.iter_mut().enumerate() {
            bucket.cutoff = frequencies[i];
            bucket.symbol = i as u32;
            if bucket.cutoff > bucket_size {
                overfull.push(i);
            } else if bucket.cutoff < bucket_size {
                underfull.push(i);
            }
        }

        while let Some(overfull_index) = overfull.pop() {
            loop {
                let underfull_index = match underfull.pop() {
                    Some(index) => index,
                    None => {
                        return Err(DecoderError::InvalidFrequencyTable(
                            "unbalanced alias mapping",
                        ));
                    }
                };
                let taken = bucket_size - buckets[underfull_index].cutoff;
                buckets[overfull_index].cutoff -= taken;
                buckets[underfull_index].symbol = overfull_index as u32;
                buckets[underfull_index].offset =
                    buckets[overfull_index].cutoff - buckets[underfull_index].cutoff;
                if buckets[overfull_index].cutoff < bucket_size {
                    underfull.push(overfull_index);
                    break;
                }
                if buckets[overfull_index].cutoff == bucket_size {
                    break;
                }
            }
        }

        Ok(buckets)
    }
}
