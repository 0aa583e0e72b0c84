//! Tag reader driver interface.
//!
//! The platform NFC stack (Android `NfcManager`, an embedded PN532, ...) is
//! wrapped behind [`TagReader`] so the session state machine and its tests
//! never touch radio code. [`MockTagReader`] carries an in-memory card image
//! with programmable failures.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{NfcError, NfcResult};
use crate::{Block, KEY_SIZE};

/// Which of the two per-sector keys to authenticate with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyRole {
    A,
    B,
}

/// A 6-byte sector authentication key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SectorKey([u8; KEY_SIZE]);

impl SectorKey {
    pub fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse a key from its 12-digit hex form.
    pub fn from_hex(hex: &str) -> NfcResult<Self> {
        let bytes = seedlink_codec::hex_to_bytes(hex)?;
        let arr: [u8; KEY_SIZE] = bytes
            .try_into()
            .map_err(|_| NfcError::Codec(seedlink_codec::CodecError::MalformedHex))?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for SectorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SectorKey(..)")
    }
}

/// Contactless technology reported by the driver for a detected tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagTech {
    MifareClassic,
    MifareUltralight,
    IsoDep,
    Unknown,
}

/// Identity of a detected tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub uid: Vec<u8>,
    pub tech: TagTech,
}

/// Driver interface to the platform tag reader.
///
/// One reader exists per device; concurrent session arbitration happens a
/// level up in [`crate::NfcTransport`].
#[async_trait]
pub trait TagReader: Send + Sync {
    /// Resolve when a tag enters the field. The caller bounds this with a
    /// timeout; the future may be pending indefinitely.
    async fn detect_tag(&self) -> NfcResult<TagInfo>;

    /// Authenticate one sector with the given key and role.
    async fn authenticate(&self, sector: u8, key: &SectorKey, role: KeyRole) -> NfcResult<()>;

    async fn read_block(&self, block: u16) -> NfcResult<Block>;

    async fn write_block(&self, block: u16, data: Block) -> NfcResult<()>;

    /// Release the reader hardware. Idempotent.
    async fn release(&self);
}

// ── Mock implementation ──────────────────────────────────────────────

#[derive(Default)]
struct MockCardState {
    /// Sectors the card currently considers authenticated.
    authenticated: HashSet<u8>,
    auth_attempts: u32,
    release_count: u32,
}

/// In-memory card image for tests.
pub struct MockTagReader {
    tag: Option<TagInfo>,
    keys: HashMap<(u8, KeyRole), SectorKey>,
    blocks: Mutex<HashMap<u16, Block>>,
    read_failures: HashMap<u16, NfcError>,
    write_failures: HashMap<u16, NfcError>,
    hanging_reads: HashSet<u16>,
    state: Mutex<MockCardState>,
}

impl MockTagReader {
    /// A reader with no tag in the field; `detect_tag` stays pending.
    pub fn empty_field() -> Self {
        Self {
            tag: None,
            keys: HashMap::new(),
            blocks: Mutex::new(HashMap::new()),
            read_failures: HashMap::new(),
            write_failures: HashMap::new(),
            hanging_reads: HashSet::new(),
            state: Mutex::new(MockCardState::default()),
        }
    }

    /// A reader with a Mifare Classic tag present.
    pub fn with_tag(uid: &[u8]) -> Self {
        let mut reader = Self::empty_field();
        reader.tag = Some(TagInfo {
            uid: uid.to_vec(),
            tech: TagTech::MifareClassic,
        });
        reader
    }

    /// A reader with a tag of the wrong technology.
    pub fn with_foreign_tag(uid: &[u8], tech: TagTech) -> Self {
        let mut reader = Self::with_tag(uid);
        if let Some(tag) = reader.tag.as_mut() {
            tag.tech = tech;
        }
        reader
    }

    pub fn set_key(&mut self, sector: u8, role: KeyRole, key: SectorKey) -> &mut Self {
        self.keys.insert((sector, role), key);
        self
    }

    pub fn set_block(&mut self, block: u16, data: Block) -> &mut Self {
        self.blocks.lock().unwrap().insert(block, data);
        self
    }

    pub fn fail_read(&mut self, block: u16, err: NfcError) -> &mut Self {
        self.read_failures.insert(block, err);
        self
    }

    pub fn fail_write(&mut self, block: u16, err: NfcError) -> &mut Self {
        self.write_failures.insert(block, err);
        self
    }

    /// Make reads of `block` pend forever, simulating a card pulled from
    /// the field mid-operation.
    pub fn hang_read(&mut self, block: u16) -> &mut Self {
        self.hanging_reads.insert(block);
        self
    }

    pub fn block(&self, block: u16) -> Option<Block> {
        self.blocks.lock().unwrap().get(&block).copied()
    }

    pub fn auth_attempts(&self) -> u32 {
        self.state.lock().unwrap().auth_attempts
    }

    pub fn release_count(&self) -> u32 {
        self.state.lock().unwrap().release_count
    }
}

#[async_trait]
impl TagReader for MockTagReader {
    async fn detect_tag(&self) -> NfcResult<TagInfo> {
        match &self.tag {
            Some(tag) => Ok(tag.clone()),
            // No tag in the field: stay pending until the session times out
            None => std::future::pending().await,
        }
    }

    async fn authenticate(&self, sector: u8, key: &SectorKey, role: KeyRole) -> NfcResult<()> {
        let mut state = self.state.lock().unwrap();
        state.auth_attempts += 1;
        match self.keys.get(&(sector, role)) {
            Some(expected) if expected == key => {
                state.authenticated.insert(sector);
                Ok(())
            }
            _ => {
                // A failed auth drops the card's auth state for that sector
                state.authenticated.remove(&sector);
                Err(NfcError::AuthenticationRejected { sector })
            }
        }
    }

    async fn read_block(&self, block: u16) -> NfcResult<Block> {
        if self.hanging_reads.contains(&block) {
            std::future::pending::<()>().await;
        }
        if let Some(err) = self.read_failures.get(&block) {
            return Err(err.clone());
        }
        let sector = crate::layout::block_to_sector(block);
        if !self.state.lock().unwrap().authenticated.contains(&sector) {
            return Err(NfcError::IoRejected);
        }
        self.blocks
            .lock()
            .unwrap()
            .get(&block)
            .copied()
            .ok_or(NfcError::BlockOutOfRange(block))
    }

    async fn write_block(&self, block: u16, data: Block) -> NfcResult<()> {
        if let Some(err) = self.write_failures.get(&block) {
            return Err(err.clone());
        }
        let sector = crate::layout::block_to_sector(block);
        if !self.state.lock().unwrap().authenticated.contains(&sector) {
            return Err(NfcError::IoRejected);
        }
        self.blocks.lock().unwrap().insert(block, data);
        Ok(())
    }

    async fn release(&self) {
        let mut state = self.state.lock().unwrap();
        state.release_count += 1;
        state.authenticated.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_ff() -> SectorKey {
        SectorKey::from_hex("FFFFFFFFFFFF").unwrap()
    }

    #[test]
    fn test_sector_key_from_hex() {
        let key = key_ff();
        assert_eq!(key.as_bytes(), &[0xff; 6]);
        assert!(SectorKey::from_hex("FFFF").is_err());
    }

    #[tokio::test]
    async fn test_mock_auth_and_read() {
        let mut reader = MockTagReader::with_tag(&[0xde, 0xad]);
        reader.set_key(1, KeyRole::B, key_ff());
        reader.set_block(4, [0x11; 16]);

        reader.authenticate(1, &key_ff(), KeyRole::B).await.unwrap();
        assert_eq!(reader.read_block(4).await.unwrap(), [0x11; 16]);
    }

    #[tokio::test]
    async fn test_mock_rejects_wrong_key() {
        let mut reader = MockTagReader::with_tag(&[1]);
        reader.set_key(1, KeyRole::A, key_ff());

        let wrong = SectorKey::new([0u8; 6]);
        assert_eq!(
            reader.authenticate(1, &wrong, KeyRole::A).await.unwrap_err(),
            NfcError::AuthenticationRejected { sector: 1 }
        );
        // Card-side auth gone: reads rejected
        assert!(reader.read_block(4).await.is_err());
    }

    #[tokio::test]
    async fn test_release_clears_card_auth() {
        let mut reader = MockTagReader::with_tag(&[1]);
        reader.set_key(0, KeyRole::A, key_ff());
        reader.authenticate(0, &key_ff(), KeyRole::A).await.unwrap();

        reader.release().await;
        assert_eq!(reader.release_count(), 1);
        assert_eq!(reader.read_block(0).await.unwrap_err(), NfcError::IoRejected);
    }
}
