//! Implements the hybrid integer representation.
//!
//! Small values are coded directly as tokens. Larger values split into
//! a token carrying the magnitude and a few explicit mantissa bits
//! that follow the token in the stream.

use crate::math::Log;
use crate::{BitReader, DecoderError};

/// Describes how tokens of a distribution map to integer values.
///
/// Tokens below `2^split_exponent` are the value itself. Any other
/// token carries `msb_in_token` bits just below an implicit leading
/// one, `lsb_in_token` bits at the bottom, and the count of raw
/// mantissa bits read from the stream in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HybridIntegerConfig {
    pub(crate) split_exponent: u32,
    pub(crate) msb_in_token: u32,
    pub(crate) lsb_in_token: u32,
}

impl HybridIntegerConfig {
    /// Reads a configuration for a distribution over
    /// `2^log_alphabet_size` tokens.
    pub(crate) fn read(
        reader: &mut BitReader<'_>,
        log_alphabet_size: u32,
    ) -> Result<Self, DecoderError> {
        let split_exponent = reader.read_bits(log_alphabet_size.bit_len())?;
        if split_exponent > log_alphabet_size {
            return Err(DecoderError::InvalidBitstream(
                "split exponent exceeds the token range",
            ));
        }
        if split_exponent == log_alphabet_size {
            return Ok(Self {
                split_exponent,
                msb_in_token: 0,
                lsb_in_token: 0,
            });
        }

        let msb_in_token = reader.read_bits(split_exponent.bit_len())?;
        if msb_in_token > split_exponent {
            return Err(DecoderError::InvalidBitstream(
                "hybrid integer most significant bits exceed the split exponent",
            ));
        }
        let lsb_in_token = reader.read_bits((split_exponent - msb_in_token).bit_len())?;
        if msb_in_token + lsb_in_token > split_exponent {
            return Err(DecoderError::InvalidBitstream(
                "hybrid integer token bits exceed the split exponent",
            ));
        }

        Ok(Self {
            split_exponent,
            msb_in_token,
            lsb_in_token,
        })
    }

    /// Expands a token into its integer value, reading any mantissa
    /// bits the token calls for.
    pub(crate) fn expand(
        &self,
        reader: &mut BitReader<'_>,
        token: u32,
    ) -> Result<i64, DecoderError> {
        let split = 1_u32 << self.split_exponent;
        if token < split {
            return Ok(i64::from(token));
        }

        let bits_in_token = self.msb_in_token + self.lsb_in_token;
        let n = self.split_exponent - bits_in_token + ((token - split) >> bits_in_token);
        if n >= 32 {
            return Err(DecoderError::TooManyExtraBits);
        }

        let low = u64::from(token) & ((1 << self.lsb_in_token) - 1);
        let mid = ((u64::from(token) >> self.lsb_in_token) & ((1 << self.msb_in_token) - 1))
            | (1 << self.msb_in_token);
        let value = (((mid << n) | u64::from(reader.read_bits(n)?)) << self.lsb_in_token) | low;
        Ok(value as i64)
    }
}
