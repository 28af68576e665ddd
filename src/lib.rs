#![warn(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::panic)]
#![deny(clippy::unwrap_used)]
//! Implements the free and open image codec JPEG XL in Rust.
//!
//! JPEG XL is a raster image codec designed by the JPEG committee
//! (ISO/IEC 18181) as a royalty-free successor to JPEG, supporting both
//! lossy (VarDCT) and lossless (modular) compression, wide gamut and
//! high bit depth images, animation, and lossless recompression of
//! legacy JPEG files.
//!
//! Every coded section of a JPEG XL codestream (frame header
//! permutations, DC and AC coefficients, modular channel residuals,
//! spline and patch metadata, even the compressed ICC profile) is
//! ultimately a sequence of integers produced by one shared entropy
//! decoding engine. This crate implements that engine:
//!
//! * A [`BitReader`] over the raw codestream bytes (LSB-first bit
//!   order, with the `U32`/`U64` selector codes the format uses for
//!   header fields).
//! * An [`EntropyDecoder`] combining ANS-coded (alias table driven,
//!   shared 32 bit state register) and prefix-coded (canonical,
//!   Brotli-style) symbol distributions behind one interface, with
//!   context clustering, hybrid integer expansion and an optional LZ77
//!   layer that replays previously decoded symbols.
//!
//! The engine is strictly sequential per stream: one instance must not
//! be shared between threads, but independent instances (one per frame
//! group) decode concurrently without any locking.
pub use bit_reader::*;
pub use decoder_error::*;
pub use entropy_coder::*;

mod bit_reader;
mod decoder_error;
mod entropy_coder;
pub(crate) mod math;

// Affects the following targets: avr and msp430
#[cfg(any(target_pointer_width = "8", target_pointer_width = "16"))]
compile_error!("usize needs to be at least 32 bit wide");

#[cfg(test)]
pub(crate) mod test_support;
