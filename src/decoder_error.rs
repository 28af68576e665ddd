//! Decoder errors.

/// Errors thrown by the decoder.
///
/// All of these are fatal to the bitstream being decoded: a corrupt
/// entropy stream invalidates the whole frame and there is no local
/// recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderError {
    /// The bit source ran out of bits.
    UnexpectedEof,
    /// More than 32 bits were requested from the bit source in one read.
    InvalidBitCount(u32),
    /// A dual peak ANS distribution declared the same symbol twice.
    OverlappingPeaks,
    /// An ANS frequency table was malformed (frequencies not summing to
    /// 4096, an RLE run past the alphabet, a missing omitted slot, ...).
    InvalidFrequencyTable(&'static str),
    /// A hybrid integer expansion would need 32 or more extra bits.
    TooManyExtraBits,
    /// The cluster map referenced more clusters than distributions were
    /// declared.
    TooManyClusters,
    /// A symbol was requested for a context beyond the cluster map.
    ContextOutOfRange,
    /// The cluster map pointed at a distribution that does not exist.
    DistributionOutOfRange,
    /// A prefix code header was malformed.
    InvalidPrefixCode(&'static str),
    /// Any other malformed bitstream construct.
    InvalidBitstream(&'static str),
}

impl std::fmt::Display for DecoderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecoderError::UnexpectedEof => {
                write!(f, "unexpected end of the bitstream")
            }
            DecoderError::InvalidBitCount(count) => {
                write!(f, "can't read {} bits in one read", count)
            }
            DecoderError::OverlappingPeaks => {
                write!(f, "dual peak distribution declared overlapping peaks")
            }
            DecoderError::InvalidFrequencyTable(message) => {
                write!(f, "invalid ANS frequency table: {}", message)
            }
            DecoderError::TooManyExtraBits => {
                write!(f, "hybrid integer would need 32 or more extra bits")
            }
            DecoderError::TooManyClusters => {
                write!(f, "cluster map references too many clusters")
            }
            DecoderError::ContextOutOfRange => {
                write!(f, "context is out of range of the cluster map")
            }
            DecoderError::DistributionOutOfRange => {
                write!(f, "cluster index is out of range of the distributions")
            }
            DecoderError::InvalidPrefixCode(message) => {
                write!(f, "invalid prefix code: {}", message)
            }
            DecoderError::InvalidBitstream(message) => {
                write!(f, "{}", message)
            }
        }
    }
}

impl std::error::Error for DecoderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
