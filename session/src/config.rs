//! Controller configuration with named constants.
//!
//! Addressing and timeouts are runtime parameters. Authentication secrets
//! (sector keys, OTP codes) are deliberately NOT part of the config — they
//! are passed to the flow methods per call.

use std::time::Duration;

use seedlink_nfc::KeyRole;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long to wait for a tag to enter the field (default: 30 seconds)
    pub tag_detect_timeout: Duration,

    /// Bound on a whole NFC session; a stalled session is torn down so the
    /// reader is never left locked (default: 60 seconds)
    pub nfc_session_timeout: Duration,

    /// Bound on one OTP exchange (default: 10 seconds)
    pub otp_timeout: Duration,

    /// Absolute block indices holding the seed entropy, read in index order
    /// (default: blocks 4 and 6, the data blocks of sector 1)
    pub entropy_blocks: Vec<u16>,

    /// Entropy width in bytes taken from the concatenated block reads
    /// (default: 16 → 12-word mnemonic)
    pub entropy_len: usize,

    /// Which key slot to authenticate entropy sectors with (default: B)
    pub key_role: KeyRole,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tag_detect_timeout: Duration::from_secs(30),
            nfc_session_timeout: Duration::from_secs(60),
            otp_timeout: Duration::from_secs(10),
            entropy_blocks: vec![4, 6],
            entropy_len: 16,
            key_role: KeyRole::B,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configuration with short timeouts for tests.
    pub fn for_testing() -> Self {
        Self {
            tag_detect_timeout: Duration::from_millis(100),
            nfc_session_timeout: Duration::from_millis(500),
            otp_timeout: Duration::from_millis(200),
            ..Self::default()
        }
    }

    /// Sectors the entropy blocks span, deduplicated, for authentication.
    pub fn entropy_sectors(&self) -> Vec<u8> {
        let mut sectors: Vec<u8> = self
            .entropy_blocks
            .iter()
            .map(|&b| seedlink_nfc::block_to_sector(b))
            .collect();
        sectors.sort_unstable();
        sectors.dedup();
        sectors
    }
}
