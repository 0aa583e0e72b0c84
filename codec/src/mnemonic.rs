//! BIP-39 entropy → mnemonic derivation.
//!
//! Entropy read from a tag is mapped to the standard English wordlist with
//! the checksum bits appended from its SHA-256 hash (word count = entropy
//! bits / 11). The mapping is deterministic: the same card always yields the
//! same phrase.

use bip39::{Language, Mnemonic};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{CodecError, CodecResult, VALID_ENTROPY_LENGTHS};

/// Raw entropy assembled from tag block reads. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RawEntropy(Vec<u8>);

impl RawEntropy {
    /// Wrap an entropy buffer, validating its length.
    pub fn new(bytes: Vec<u8>) -> CodecResult<Self> {
        if !VALID_ENTROPY_LENGTHS.contains(&bytes.len()) {
            return Err(CodecError::InvalidEntropyLength(bytes.len()));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for RawEntropy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print entropy bytes
        write!(f, "RawEntropy({} bytes)", self.0.len())
    }
}

/// A derived mnemonic phrase. Never persisted by this crate.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MnemonicPhrase {
    phrase: String,
}

impl MnemonicPhrase {
    /// Parse and validate an existing phrase.
    pub fn from_phrase(phrase: &str) -> CodecResult<Self> {
        let normalized = parse_seed_phrase(phrase);
        validate_mnemonic(&normalized)?;
        Ok(Self { phrase: normalized })
    }

    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    pub fn word_count(&self) -> usize {
        self.phrase.split_whitespace().count()
    }

    /// Derive the 64-byte BIP-39 seed for the downstream keyring.
    pub fn to_seed(&self, passphrase: &str) -> [u8; 64] {
        // Phrase was validated at construction
        let mnemonic = Mnemonic::parse_in(Language::English, &self.phrase)
            .expect("validated phrase must parse");
        mnemonic.to_seed(passphrase)
    }
}

impl std::fmt::Debug for MnemonicPhrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MnemonicPhrase({} words)", self.word_count())
    }
}

/// Derive a mnemonic from raw entropy.
///
/// Fails with [`CodecError::InvalidEntropyLength`] unless the input is
/// 16, 20, 24, 28, or 32 bytes.
pub fn entropy_to_mnemonic(entropy: &[u8]) -> CodecResult<MnemonicPhrase> {
    if !VALID_ENTROPY_LENGTHS.contains(&entropy.len()) {
        return Err(CodecError::InvalidEntropyLength(entropy.len()));
    }

    let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy)
        .map_err(|e| CodecError::InvalidMnemonic(e.to_string()))?;

    Ok(MnemonicPhrase {
        phrase: mnemonic.to_string(),
    })
}

/// Recover the entropy a mnemonic encodes (checksum is re-verified by parse).
pub fn mnemonic_to_entropy(phrase: &MnemonicPhrase) -> CodecResult<RawEntropy> {
    let mnemonic = Mnemonic::parse_in(Language::English, phrase.phrase())
        .map_err(|e| CodecError::InvalidMnemonic(e.to_string()))?;
    RawEntropy::new(mnemonic.to_entropy())
}

/// Validate a mnemonic phrase against the English wordlist and checksum.
pub fn validate_mnemonic(phrase: &str) -> CodecResult<()> {
    Mnemonic::parse_in(Language::English, phrase)
        .map_err(|e| CodecError::InvalidMnemonic(e.to_string()))?;
    Ok(())
}

/// Normalize user- or card-supplied phrase text: collapse whitespace,
/// lowercase every word.
pub fn parse_seed_phrase(input: &str) -> String {
    input
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex_to_bytes;

    // Entropy vector read from blocks 4 and 6 of the reference card
    const CARD_ENTROPY_HEX: &str = "30d1bd7478be8ec6cc094012bd0b6696";

    #[test]
    fn test_card_entropy_derives_12_words() {
        let entropy = hex_to_bytes(CARD_ENTROPY_HEX).unwrap();
        let mnemonic = entropy_to_mnemonic(&entropy).unwrap();
        assert_eq!(mnemonic.word_count(), 12);
    }

    #[test]
    fn test_card_entropy_deterministic() {
        let entropy = hex_to_bytes(CARD_ENTROPY_HEX).unwrap();
        let first = entropy_to_mnemonic(&entropy).unwrap();
        for _ in 0..5 {
            assert_eq!(entropy_to_mnemonic(&entropy).unwrap(), first);
        }
    }

    #[test]
    fn test_word_count_scales_with_entropy() {
        for (len, words) in [(16, 12), (20, 15), (24, 18), (28, 21), (32, 24)] {
            let entropy = vec![0xab; len];
            let mnemonic = entropy_to_mnemonic(&entropy).unwrap();
            assert_eq!(mnemonic.word_count(), words, "{} bytes", len);
        }
    }

    #[test]
    fn test_invalid_entropy_lengths() {
        for len in [0, 5, 15, 17, 33, 64] {
            let entropy = vec![0u8; len];
            assert_eq!(
                entropy_to_mnemonic(&entropy).unwrap_err(),
                CodecError::InvalidEntropyLength(len)
            );
        }
    }

    #[test]
    fn test_entropy_round_trip_identity() {
        for len in VALID_ENTROPY_LENGTHS {
            let entropy: Vec<u8> = (0..len as u8).map(|i| i.wrapping_mul(37)).collect();
            let mnemonic = entropy_to_mnemonic(&entropy).unwrap();
            let recovered = mnemonic_to_entropy(&mnemonic).unwrap();
            assert_eq!(recovered.as_bytes(), &entropy[..]);

            let again = entropy_to_mnemonic(recovered.as_bytes()).unwrap();
            assert_eq!(again, mnemonic);
        }
    }

    #[test]
    fn test_known_vector() {
        // Standard BIP-39 test vector: all-zero 16-byte entropy
        let mnemonic = entropy_to_mnemonic(&[0u8; 16]).unwrap();
        assert_eq!(
            mnemonic.phrase(),
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about"
        );
    }

    #[test]
    fn test_validate_rejects_bad_checksum() {
        // Valid words, broken checksum
        let result = validate_mnemonic(
            "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_seed_phrase_normalizes() {
        assert_eq!(
            parse_seed_phrase("  Abandon\tABANDON \n about "),
            "abandon abandon about"
        );
    }

    #[test]
    fn test_phrase_wrapper_round_trip() {
        let entropy = hex_to_bytes(CARD_ENTROPY_HEX).unwrap();
        let mnemonic = entropy_to_mnemonic(&entropy).unwrap();
        let reparsed = MnemonicPhrase::from_phrase(mnemonic.phrase()).unwrap();
        assert_eq!(reparsed, mnemonic);
    }

    #[test]
    fn test_seed_depends_on_passphrase() {
        let mnemonic = entropy_to_mnemonic(&[7u8; 16]).unwrap();
        assert_ne!(mnemonic.to_seed(""), mnemonic.to_seed("trezor"));
    }
}
