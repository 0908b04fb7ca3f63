//! Perceptual image hashing.
//!
//! A hash is an opaque byte vector; similar images hash to nearby vectors
//! under Hamming distance. Two algorithms are provided: a 64-bit
//! block-mean hash and a DCT sign hash in four sizes. The index layer
//! never inspects hash bits, so any `Hasher` can feed it as long as it is
//! used consistently for one database.

pub mod block;
pub mod dct;
pub mod image;
pub mod ppm;

pub use block::BlockHash;
pub use dct::DctHash;
pub use image::{Image, Preprocess};

use crate::error::{HashError, HashResult};
use std::path::Path;

/// A perceptual hash algorithm over preprocessed single-plane images
pub trait Hasher {
    fn hash(&self, image: &Image<f32>) -> HashResult<Vec<u8>>;

    /// Stable algorithm name, recorded in the database so later opens can
    /// detect a mismatched algorithm
    fn name(&self) -> &'static str;
}

/// Look up a hasher by its stable name
pub fn create_hasher(name: &str) -> HashResult<Box<dyn Hasher>> {
    match name {
        "block" => Ok(Box::new(BlockHash::new())),
        "dct1" => Ok(Box::new(DctHash::with_size(1)?)),
        "dct2" => Ok(Box::new(DctHash::with_size(2)?)),
        "dct3" => Ok(Box::new(DctHash::with_size(3)?)),
        "dct4" => Ok(Box::new(DctHash::with_size(4)?)),
        other => Err(HashError::UnknownAlgorithm {
            name: other.to_string(),
        }),
    }
}

/// Decode a PPM file, preprocess it, and hash it
pub fn hash_ppm_file(
    path: &Path,
    prep: &Preprocess,
    hasher: &dyn Hasher,
) -> HashResult<Vec<u8>> {
    let img = ppm::load_ppm_file(path)?;
    hasher.hash(&prep.apply(&img))
}

/// Hamming distance between two byte vectors. Length differences count as
/// distance against zero padding, so comparing hashes from different
/// algorithms degrades instead of panicking.
pub fn hamming_distance(a: &[u8], b: &[u8]) -> u32 {
    let mut dist: u32 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| (x ^ y).count_ones())
        .sum();
    let (long, short) = if a.len() >= b.len() { (a, b) } else { (b, a) };
    for &byte in &long[short.len()..] {
        dist += byte.count_ones();
    }
    dist
}

/// Hamming metric over hash vectors, pluggable into the MVP index
#[derive(Debug, Clone, Copy, Default)]
pub struct Hamming;

impl crate::mvp::Metric for Hamming {
    fn distance(&self, a: &[u8], b: &[u8]) -> u32 {
        hamming_distance(a, b)
    }
}

/// Render a hash as lowercase hex
pub fn hex_string(hash: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(hash.len() * 2);
    for byte in hash {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

/// Parse a lowercase/uppercase hex string back into hash bytes
pub fn parse_hex(hex: &str) -> HashResult<Vec<u8>> {
    if hex.is_empty() || hex.len() % 2 != 0 || !hex.is_ascii() {
        return Err(HashError::InvalidHex {
            input: hex.to_string(),
        });
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| HashError::InvalidHex {
                input: hex.to_string(),
            })
        })
        .collect()
}

/// Append bits LSB-first into a byte vector
pub(crate) struct BitWriter {
    bytes: Vec<u8>,
    bit: usize,
}

impl BitWriter {
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            bit: 8,
        }
    }

    pub fn push(&mut self, set: bool) {
        if self.bit > 7 {
            self.bytes.push(0);
            self.bit = 0;
        }
        if set {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 1u8 << self.bit;
        }
        self.bit += 1;
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
