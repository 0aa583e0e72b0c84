//! Contactless tag codec for the seedlink pairing core.
//!
//! Pure, stateless helpers shared by both transports:
//! - hex block encoding/decoding with junk-tolerant input
//! - BIP-39 entropy → mnemonic derivation with checksum validation
//!
//! No I/O happens here; everything is safe to call from any thread.

pub mod hex;
pub mod mnemonic;

pub use hex::{bytes_to_hex, hex_to_bytes};
pub use mnemonic::{
    entropy_to_mnemonic, mnemonic_to_entropy, parse_seed_phrase, validate_mnemonic, MnemonicPhrase,
    RawEntropy,
};

use thiserror::Error;

/// Supported BIP-39 entropy lengths in bytes (128–256 bits).
pub const VALID_ENTROPY_LENGTHS: [usize; 5] = [16, 20, 24, 28, 32];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Malformed hex input: odd number of hex digits after filtering")]
    MalformedHex,

    #[error("Invalid entropy length: {0} bytes (must be 16, 20, 24, 28, or 32)")]
    InvalidEntropyLength(usize),

    #[error("Invalid mnemonic phrase: {0}")]
    InvalidMnemonic(String),
}

/// Result type alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;
