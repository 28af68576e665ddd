//! Implements the entropy decoding engine.
//!
//! A codestream section first describes how its symbols are coded: a
//! cluster map folding many decoding contexts onto few distributions,
//! the distributions themselves (either ANS with a shared state
//! register or canonical prefix codes), a hybrid integer configuration
//! per distribution, and an optional LZ77 layer that expands
//! back-references over the previously decoded values.

use log::trace;

use crate::entropy_coder::ans::{AnsDistribution, AnsState};
use crate::entropy_coder::prefix::PrefixDistribution;
use crate::{BitReader, DecoderError};

pub use crate::entropy_coder::hybrid_uint::HybridIntegerConfig;

mod ans;
mod hybrid_uint;
mod prefix;

const WINDOW_SIZE: usize = 1 << 20;

#[derive(Debug)]
enum SymbolCodes {
    Ans(Vec<AnsDistribution>),
    Prefix(Vec<PrefixDistribution>),
}

impl SymbolCodes {
    fn len(&self) -> usize {
        match self {
            SymbolCodes::Ans(distributions) => distributions.len(),
            SymbolCodes::Prefix(distributions) => distributions.len(),
        }
    }

    fn read_token(
        &self,
        reader: &mut BitReader<'_>,
        cluster: usize,
        state: &mut AnsState,
    ) -> Result<u32, DecoderError> {
        match self {
            SymbolCodes::Ans(distributions) => distributions[cluster].read_token(reader, state),
            SymbolCodes::Prefix(distributions) => distributions[cluster].read_token(reader),
        }
    }
}

#[derive(Debug)]
struct Lz77 {
    min_symbol: u32,
    min_length: u32,
    length_config: HybridIntegerConfig,
    window: Vec<i64>,
    num_to_copy: u64,
    copy_pos: usize,
    num_decoded: usize,
}

impl Lz77 {
    fn push(&mut self, value: i64) {
        self.window[self.num_decoded & (WINDOW_SIZE - 1)] = value;
        self.num_decoded += 1;
    }

    /// Copies the next value of the active run. Overlapping runs read
    /// values written earlier in the same run.
    fn copy_next(&mut self) -> i64 {
        self.num_to_copy -= 1;
        let value = self.window[self.copy_pos & (WINDOW_SIZE - 1)];
        self.copy_pos = self.copy_pos.wrapping_add(1);
        self.push(value);
        value
    }
}

/// Replaces each entry, an index into a most-recently-used list seeded
/// with the identity over 0..=255, by the value at that index and
/// rotates the value to the front.
fn mtf_decode(map: &mut [u8]) {
    let mut mru: Vec<u8> = (0_u8..=255).collect();
    for entry in map.iter_mut() {
        let index = *entry as usize;
        let value = mru[index];
        mru.copy_within(..index, 1);
        mru[0] = value;
        *entry = value;
    }
}

/// Decodes entropy coded symbols for a fixed set of contexts.
///
/// One decoder is built per codestream section from its code
/// description header and then queried once per symbol with the
/// context the surrounding format prescribes. After the last symbol,
/// [`Self::validate_final_state`] checks the ANS state register.
#[derive(Debug)]
pub struct EntropyDecoder {
    cluster_map: Vec<u8>,
    configs: Vec<HybridIntegerConfig>,
    codes: SymbolCodes,
    state: AnsState,
    lz77: Option<Lz77>,
    num_contexts: usize,
}

impl EntropyDecoder {
    /// Reads the code description for `num_distributions` contexts.
    pub fn new(
        reader: &mut BitReader<'_>,
        num_distributions: usize,
    ) -> Result<Self, DecoderError> {
        Self::read(reader, num_distributions, true, 0)
    }

    fn read(
        reader: &mut BitReader<'_>,
        num_distributions: usize,
        allow_lz77: bool,
        depth: u32,
    ) -> Result<Self, DecoderError> {
        if num_distributions == 0 {
            return Err(DecoderError::InvalidBitstream("no distributions requested"));
        }

        let mut num_contexts = num_distributions;
        let lz77_header = if allow_lz77 && reader.read_bool()? {
            let min_symbol = reader.read_u32([(224, 0), (512, 0), (4096, 0), (8, 15)])?;
            let min_length = reader.read_u32([(3, 0), (4, 0), (5, 2), (9, 8)])?;
            let length_config = HybridIntegerConfig::read(reader, 8)?;
            // The distance distribution uses one extra context.
            num_contexts += 1;
            Some((min_symbol, min_length, length_config))
        } else {
            None
        };

        let cluster_map = Self::read_cluster_map(reader, num_contexts, depth)?;
        let num_clusters = cluster_map.iter().map(|&c| c as usize).max().map_or(0, |m| m) + 1;
        if num_clusters > num_contexts {
            return Err(DecoderError::TooManyClusters);
        }

        let use_prefix_codes = reader.read_bool()?;
        let (configs, codes) = if use_prefix_codes {
            let mut configs = Vec::with_capacity(num_clusters);
            for _ in 0..num_clusters {
                configs.push(HybridIntegerConfig::read(reader, 15)?);
            }
            let mut alphabet_sizes = Vec::with_capacity(num_clusters);
            for _ in 0..num_clusters {
                let alphabet_size = if reader.read_bool()? {
                    let n = reader.read_bits(4)?;
                    1 + (1_usize << n) + reader.read_bits(n)? as usize
                } else {
                    1
                };
                if alphabet_size > 1 << 15 {
                    return Err(DecoderError::InvalidBitstream("prefix alphabet too large"));
                }
                alphabet_sizes.push(alphabet_size);
            }
            let mut distributions = Vec::with_capacity(num_clusters);
            for &alphabet_size in alphabet_sizes.iter() {
                distributions.push(PrefixDistribution::read(reader, alphabet_size)?);
            }
            (configs, SymbolCodes::Prefix(distributions))
        } else {
            let log_alphabet_size = 5 + reader.read_bits(2)?;
            let mut configs = Vec::with_capacity(num_clusters);
            for _ in 0..num_clusters {
                configs.push(HybridIntegerConfig::read(reader, log_alphabet_size)?);
            }
            let mut distributions = Vec::with_capacity(num_clusters);
            for _ in 0..num_clusters {
                distributions.push(AnsDistribution::read(reader, log_alphabet_size)?);
            }
            (configs, SymbolCodes::Ans(distributions))
        };

        trace!(
            "entropy code: {} contexts, {} clusters, prefix={}, lz77={}",
            num_contexts,
            num_clusters,
            use_prefix_codes,
            lz77_header.is_some()
        );

        let lz77 = lz77_header.map(|(min_symbol, min_length, length_config)| Lz77 {
            min_symbol,
            min_length,
            length_config,
            window: vec![0; WINDOW_SIZE],
            num_to_copy: 0,
            copy_pos: 0,
            num_decoded: 0,
        });

        Ok(Self {
            cluster_map,
            configs,
            codes,
            state: AnsState::new(),
            lz77,
            num_contexts,
        })
    }

    fn read_cluster_map(
        reader: &mut BitReader<'_>,
        size: usize,
        depth: u32,
    ) -> Result<Vec<u8>, DecoderError> {
        if size == 1 {
            return Ok(vec![0]);
        }

        if reader.read_bool()? {
            let width = reader.read_bits(2)?;
            let mut map = vec![0_u8; size];
            for entry in map.iter_mut() {
                *entry = reader.read_bits(width)? as u8;
            }
            return Ok(map);
        }

        if depth > 0 {
            return Err(DecoderError::InvalidBitstream("nested cluster map too deep"));
        }
        let use_mtf = reader.read_bool()?;
        let mut nested = Self::read(reader, 1, size > 2, depth + 1)?;
        let mut map = Vec::with_capacity(size);
        for _ in 0..size {
            let index = nested.read_symbol(reader, 0)?;
            if !(0..256).contains(&index) {
                return Err(DecoderError::InvalidBitstream("cluster index out of range"));
            }
            map.push(index as u8);
        }
        nested.validate_final_state()?;

        if use_mtf {
            mtf_decode(&mut map);
        }
        Ok(map)
    }

    /// Decodes the next symbol for the given context.
    ///
    /// While an LZ77 run is active the context is ignored and the next
    /// copied value is returned without reading from the stream.
    pub fn read_symbol(
        &mut self,
        reader: &mut BitReader<'_>,
        context: usize,
    ) -> Result<i64, DecoderError> {
        if let Some(lz77) = self.lz77.as_mut() {
            if lz77.num_to_copy > 0 {
                return Ok(lz77.copy_next());
            }
        }

        if context >= self.num_contexts {
            return Err(DecoderError::ContextOutOfRange);
        }
        let cluster = self.cluster_map[context] as usize;
        if cluster >= self.codes.len() {
            return Err(DecoderError::DistributionOutOfRange);
        }

        let token = self.codes.read_token(reader, cluster, &mut self.state)?;

        if let Some(min_symbol) = self.lz77.as_ref().map(|lz77| lz77.min_symbol) {
            if token >= min_symbol {
                return self.read_run(reader, token - min_symbol);
            }
        }

        let value = self.configs[cluster].expand(reader, token)?;
        if let Some(lz77) = self.lz77.as_mut() {
            lz77.push(value);
        }
        Ok(value)
    }

    /// Starts an LZ77 run and returns its first copied value. The run
    /// length comes from the triggering token, the distance from the
    /// dedicated distance context.
    fn read_run(
        &mut self,
        reader: &mut BitReader<'_>,
        length_token: u32,
    ) -> Result<i64, DecoderError> {
        let (min_length, length_config) = match self.lz77.as_ref() {
            Some(lz77) => (lz77.min_length, lz77.length_config),
            None => return Err(DecoderError::InvalidBitstream("run without a window")),
        };
        let run = u64::from(min_length) + length_config.expand(reader, length_token)? as u64;

        let distance_cluster = self.cluster_map[self.num_contexts - 1] as usize;
        if distance_cluster >= self.codes.len() {
            return Err(DecoderError::DistributionOutOfRange);
        }
        let distance_token = self.codes.read_token(reader, distance_cluster, &mut self.state)?;
        let distance = 1 + self.configs[distance_cluster].expand(reader, distance_token)?;

        trace!("lz77 run: length={}, distance={}", run, distance);

        match self.lz77.as_mut() {
            Some(lz77) => {
                let distance = distance
                    .min(lz77.num_decoded as i64)
                    .min(WINDOW_SIZE as i64)
                    .max(1) as usize;
                lz77.copy_pos = lz77.num_decoded.wrapping_sub(distance);
                lz77.num_to_copy = run;
                Ok(lz77.copy_next())
            }
            None => Err(DecoderError::InvalidBitstream("run without a window")),
        }
    }

    /// Checks that the ANS state register returned to its initial
    /// value after the last symbol.
    pub fn validate_final_state(&self) -> Result<(), DecoderError> {
        self.state.validate_final()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use nanorand::RNG;

    use super::*;
    use crate::test_support::BitWriter;

    #[test]
    fn test_mtf_round_trip() {
        let mut rng = nanorand::WyRand::new_seed(0x51C0_93A7);
        let values: Vec<u8> = (0..512).map(|_| rng.generate::<u8>()).collect();

        // Encode: emit the position of each value in the
        // most-recently-used list and rotate it to the front.
        let mut mru: Vec<u8> = (0_u8..=255).collect();
        let mut indices = Vec::with_capacity(values.len());
        for &value in values.iter() {
            let index = mru.iter().position(|&v| v == value).unwrap();
            indices.push(index as u8);
            mru.copy_within(..index, 1);
            mru[0] = value;
        }

        let mut decoded = indices;
        mtf_decode(&mut decoded);
        assert_eq!(decoded, values);
    }

    #[test]
    fn test_ans_single_context() {
        let mut writer = BitWriter::new();
        writer.write_bool(false); // no lz77
        writer.write_bool(false); // ans
        writer.write_bits(0, 2); // log alphabet size 5
        writer.write_bits(5, 3); // split exponent 5, tokens are values
        writer.write_bool(true); // single peak distribution
        writer.write_bool(false);
        writer.write_u8(7);
        writer.write_bits(0x0013_0000, 32); // initial state
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);

        let mut decoder = EntropyDecoder::new(&mut reader, 1).unwrap();
        for _ in 0..3 {
            assert_eq!(decoder.read_symbol(&mut reader, 0).unwrap(), 7);
        }
        decoder.validate_final_state().unwrap();
    }

    #[test]
    fn test_prefix_two_contexts() {
        let mut writer = BitWriter::new();
        writer.write_bool(false); // no lz77
        writer.write_bool(true); // simple cluster map
        writer.write_bits(1, 2); // one bit per entry
        writer.write_bits(0, 1); // context 0 -> cluster 0
        writer.write_bits(1, 1); // context 1 -> cluster 1
        writer.write_bool(true); // prefix codes
        writer.write_bits(15, 4); // cluster 0 config
        writer.write_bits(15, 4); // cluster 1 config
        writer.write_bool(false); // cluster 0 alphabet size 1
        writer.write_bool(true); // cluster 1 alphabet size 2
        writer.write_bits(0, 4);
        writer.write_bits(1, 2); // cluster 1: simple code
        writer.write_bits(1, 2); // two symbols
        writer.write_bits(0, 1);
        writer.write_bits(1, 1);

        writer.write_bool(true); // context 1 token 1
        writer.write_bool(false); // context 1 token 0
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);

        let mut decoder = EntropyDecoder::new(&mut reader, 2).unwrap();
        assert_eq!(decoder.read_symbol(&mut reader, 0).unwrap(), 0);
        assert_eq!(decoder.read_symbol(&mut reader, 1).unwrap(), 1);
        assert_eq!(decoder.read_symbol(&mut reader, 1).unwrap(), 0);
        assert_eq!(
            decoder.read_symbol(&mut reader, 2).unwrap_err(),
            DecoderError::ContextOutOfRange
        );
        decoder.validate_final_state().unwrap();
    }

    #[test]
    fn test_too_many_clusters() {
        let mut writer = BitWriter::new();
        writer.write_bool(false); // no lz77
        writer.write_bool(true); // simple cluster map
        writer.write_bits(2, 2);
        writer.write_bits(0, 2);
        writer.write_bits(2, 2); // three clusters for two contexts
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);

        assert_eq!(
            EntropyDecoder::new(&mut reader, 2).unwrap_err(),
            DecoderError::TooManyClusters
        );
    }

    fn write_nested_map_code(writer: &mut BitWriter) {
        // Nested engine over one context: prefix coded, alphabet of
        // three with lengths 1, 2, 2 for the symbols 2, 0, 1.
        writer.write_bool(false); // nested: no lz77
        writer.write_bool(true); // nested: prefix codes
        writer.write_bits(15, 4); // nested config
        writer.write_bool(true); // nested alphabet size 3
        writer.write_bits(1, 4);
        writer.write_bits(0, 1);
        writer.write_bits(1, 2); // simple code
        writer.write_bits(2, 2); // three symbols
        writer.write_bits(2, 2);
        writer.write_bits(0, 2);
        writer.write_bits(1, 2);
    }

    #[test]
    fn test_general_cluster_map() {
        let mut writer = BitWriter::new();
        writer.write_bool(false); // no lz77
        writer.write_bool(false); // general cluster map
        writer.write_bool(false); // no mtf
        write_nested_map_code(&mut writer);
        writer.write_bits(0b01, 2); // entry 0: symbol 0
        writer.write_bits(0b11, 2); // entry 1: symbol 1
        writer.write_bits(0b01, 2); // entry 2: symbol 0
        writer.write_bool(true); // prefix codes
        writer.write_bits(15, 4); // cluster 0 config
        writer.write_bits(15, 4); // cluster 1 config
        writer.write_bool(true); // cluster 0 alphabet size 2
        writer.write_bits(0, 4);
        writer.write_bool(false); // cluster 1 alphabet size 1
        writer.write_bits(1, 2); // cluster 0: simple code
        writer.write_bits(1, 2); // two symbols
        writer.write_bits(0, 1);
        writer.write_bits(1, 1);

        writer.write_bool(true); // context 0 token 1
        writer.write_bool(false); // context 2 token 0
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);

        let mut decoder = EntropyDecoder::new(&mut reader, 3).unwrap();
        assert_eq!(decoder.cluster_map, vec![0, 1, 0]);
        assert_eq!(decoder.read_symbol(&mut reader, 0).unwrap(), 1);
        assert_eq!(decoder.read_symbol(&mut reader, 1).unwrap(), 0);
        assert_eq!(decoder.read_symbol(&mut reader, 2).unwrap(), 0);
    }

    #[test]
    fn test_general_cluster_map_with_mtf() {
        let mut writer = BitWriter::new();
        writer.write_bool(false); // no lz77
        writer.write_bool(false); // general cluster map
        writer.write_bool(true); // mtf
        write_nested_map_code(&mut writer);
        writer.write_bits(0b11, 2); // entry 0: index 1 -> value 1
        writer.write_bits(0b11, 2); // entry 1: index 1 -> value 0
        writer.write_bits(0b01, 2); // entry 2: index 0 -> value 0
        writer.write_bool(true); // prefix codes
        writer.write_bits(15, 4); // cluster 0 config
        writer.write_bits(15, 4); // cluster 1 config
        writer.write_bool(true); // cluster 0 alphabet size 2
        writer.write_bits(0, 4);
        writer.write_bool(false); // cluster 1 alphabet size 1
        writer.write_bits(1, 2); // cluster 0: simple code
        writer.write_bits(1, 2); // two symbols
        writer.write_bits(0, 1);
        writer.write_bits(1, 1);

        writer.write_bool(true); // context 1 token 1
        writer.write_bool(false); // context 2 token 0
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);

        let mut decoder = EntropyDecoder::new(&mut reader, 3).unwrap();
        assert_eq!(decoder.cluster_map, vec![1, 0, 0]);
        assert_eq!(decoder.read_symbol(&mut reader, 0).unwrap(), 0);
        assert_eq!(decoder.read_symbol(&mut reader, 1).unwrap(), 1);
        assert_eq!(decoder.read_symbol(&mut reader, 2).unwrap(), 0);
    }

    #[test]
    fn test_nested_cluster_map_depth_capped() {
        let mut writer = BitWriter::new();
        writer.write_bool(false); // no lz77
        writer.write_bool(false); // general cluster map
        writer.write_bool(false); // no mtf
        writer.write_bool(true); // nested: lz77, adds a second context
        writer.write_u32([(224, 0), (512, 0), (4096, 0), (8, 15)], 224);
        writer.write_u32([(3, 0), (4, 0), (5, 2), (9, 8)], 3);
        writer.write_bits(8, 4); // nested length config
        writer.write_bool(false); // nested map is general itself
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);

        assert_eq!(
            EntropyDecoder::new(&mut reader, 3).unwrap_err(),
            DecoderError::InvalidBitstream("nested cluster map too deep")
        );
    }

    #[test]
    fn test_lz77_copy_semantics() {
        let mut lz77 = Lz77 {
            min_symbol: 224,
            min_length: 3,
            length_config: HybridIntegerConfig {
                split_exponent: 8,
                msb_in_token: 0,
                lsb_in_token: 0,
            },
            window: vec![0; WINDOW_SIZE],
            num_to_copy: 0,
            copy_pos: 0,
            num_decoded: 0,
        };
        for value in [10_i64, 20, 30, 40].iter() {
            lz77.push(*value);
        }

        // Distance 2, run 3: the run overlaps its own output.
        lz77.copy_pos = 2;
        lz77.num_to_copy = 3;
        assert_eq!(lz77.copy_next(), 30);
        assert_eq!(lz77.copy_next(), 40);
        assert_eq!(lz77.copy_next(), 30);
        assert_eq!(lz77.num_to_copy, 0);
        assert_eq!(lz77.num_decoded, 7);
    }

    #[test]
    fn test_lz77_run_end_to_end() {
        let mut writer = BitWriter::new();
        writer.write_bool(true); // lz77
        writer.write_u32([(224, 0), (512, 0), (4096, 0), (8, 15)], 224);
        writer.write_u32([(3, 0), (4, 0), (5, 2), (9, 8)], 3);
        writer.write_bits(8, 4); // length config
        writer.write_bool(true); // simple cluster map
        writer.write_bits(1, 2);
        writer.write_bits(0, 1); // context 0 -> cluster 0
        writer.write_bits(1, 1); // distance context -> cluster 1
        writer.write_bool(true); // prefix codes
        writer.write_bits(15, 4); // cluster 0 config
        writer.write_bits(15, 4); // cluster 1 config
        writer.write_bool(true); // cluster 0 alphabet size 225
        writer.write_bits(7, 4);
        writer.write_bits(96, 7);
        writer.write_bool(false); // cluster 1 alphabet size 1
        writer.write_bits(1, 2); // cluster 0: simple code
        writer.write_bits(1, 2); // two symbols
        writer.write_bits(5, 8);
        writer.write_bits(224, 8);

        writer.write_bool(false); // literal 5
        writer.write_bool(true); // run token 224: length 3, distance 1
        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);

        let mut decoder = EntropyDecoder::new(&mut reader, 1).unwrap();
        assert_eq!(decoder.read_symbol(&mut reader, 0).unwrap(), 5);
        assert_eq!(decoder.read_symbol(&mut reader, 0).unwrap(), 5);
        assert_eq!(decoder.read_symbol(&mut reader, 0).unwrap(), 5);
        assert_eq!(decoder.read_symbol(&mut reader, 0).unwrap(), 5);
        assert!(reader.bits_remaining() < 8);
        decoder.validate_final_state().unwrap();
    }
}
