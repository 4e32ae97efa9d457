//! Fixed-width locality-sensitive digests and the Hamming metric over them.
//!
//! A digest is 256 bits written as 64 hex characters. Similar script text
//! produces digests that differ in few bits, so the bit-level Hamming distance
//! is the similarity measure for clustering.

use std::fmt;
use std::str::FromStr;

use crate::errors::EngineError;

pub const DIGEST_BITS: u32 = 256;
pub const DIGEST_HEX_LEN: usize = 64;

const WORDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest {
    words: [u64; WORDS],
}

impl Digest {
    /// Decode a 64-character hex string. Any other length or a non-hex
    /// character yields `EngineError::InvalidDigest`.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let bytes = raw.as_bytes();
        if bytes.len() != DIGEST_HEX_LEN {
            return Err(EngineError::InvalidDigest {
                reason: format!(
                    "expected {DIGEST_HEX_LEN} hex characters, got {}",
                    bytes.len()
                ),
            });
        }

        let mut words = [0u64; WORDS];
        for (word_idx, chunk) in bytes.chunks(16).enumerate() {
            let mut word = 0u64;
            for (offset, &byte) in chunk.iter().enumerate() {
                let nibble = hex_value(byte).ok_or_else(|| EngineError::InvalidDigest {
                    reason: format!(
                        "non-hex character {:?} at position {}",
                        byte as char,
                        word_idx * 16 + offset
                    ),
                })?;
                word = (word << 4) | u64::from(nibble);
            }
            words[word_idx] = word;
        }

        Ok(Self { words })
    }

    /// Number of differing bits, in `0..=DIGEST_BITS`.
    pub fn distance(&self, other: &Digest) -> u32 {
        self.words
            .iter()
            .zip(other.words.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

impl FromStr for Digest {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Digest::parse(s)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for word in &self.words {
            write!(f, "{word:016x}")?;
        }
        Ok(())
    }
}
