//! Bounded tag session state machine.
//!
//! `Idle -> SessionRequested -> TagDetected -> SectorAuthenticated ->
//! {Reading|Writing} -> Idle`. The reader is an exclusive singleton:
//! [`NfcTransport`] hands out at most one [`TagSession`] at a time and a
//! session must release it on every exit path.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{NfcError, NfcResult};
use crate::layout;
use crate::reader::{KeyRole, SectorKey, TagInfo, TagReader, TagTech};
use crate::{Block, BLOCK_SIZE};

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    SessionRequested,
    TagDetected,
    SectorAuthenticated,
    Reading,
    Writing,
}

/// Arbitrates access to the single tag reader.
pub struct NfcTransport {
    reader: Arc<dyn TagReader>,
    in_use: Arc<AtomicBool>,
}

impl NfcTransport {
    pub fn new(reader: Arc<dyn TagReader>) -> Self {
        Self {
            reader,
            in_use: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Begin a tag session: acquire the reader and wait for a tag.
    ///
    /// Fails with [`NfcError::TransportBusy`] if a session is already open,
    /// [`NfcError::NoTagDetected`] if nothing enters the field before the
    /// timeout, and [`NfcError::UnsupportedTag`] for non-Mifare-Classic tags.
    /// The reader is released on every failure path.
    pub async fn begin_session(&self, detect_timeout: Duration) -> NfcResult<TagSession> {
        if self.in_use.swap(true, Ordering::AcqRel) {
            return Err(NfcError::TransportBusy);
        }
        debug!("tag session requested");

        let tag = match tokio::time::timeout(detect_timeout, self.reader.detect_tag()).await {
            Ok(Ok(tag)) => tag,
            Ok(Err(e)) => {
                self.release_reader().await;
                return Err(e);
            }
            Err(_) => {
                self.release_reader().await;
                return Err(NfcError::NoTagDetected);
            }
        };

        if tag.tech != TagTech::MifareClassic {
            warn!(?tag.tech, "unsupported tag technology");
            self.release_reader().await;
            return Err(NfcError::UnsupportedTag);
        }

        debug!(uid_len = tag.uid.len(), "tag detected");
        Ok(TagSession {
            reader: Arc::clone(&self.reader),
            in_use: Arc::clone(&self.in_use),
            tag,
            authenticated: HashSet::new(),
            state: SessionState::TagDetected,
            closed: false,
        })
    }

    /// Whether a session currently holds the reader.
    pub fn is_busy(&self) -> bool {
        self.in_use.load(Ordering::Acquire)
    }

    async fn release_reader(&self) {
        self.reader.release().await;
        self.in_use.store(false, Ordering::Release);
    }
}

/// One open tag session. Must be closed on every exit path; the controller
/// guarantees this.
pub struct TagSession {
    reader: Arc<dyn TagReader>,
    in_use: Arc<AtomicBool>,
    tag: TagInfo,
    authenticated: HashSet<u8>,
    state: SessionState,
    closed: bool,
}

impl TagSession {
    pub fn tag(&self) -> &TagInfo {
        &self.tag
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Authenticate one sector. Required once per sector, not per block.
    ///
    /// A rejected key leaves the session open: the caller may retry with a
    /// different key without tearing the session down.
    pub async fn authenticate_sector(
        &mut self,
        sector: u8,
        key: &SectorKey,
        role: KeyRole,
    ) -> NfcResult<()> {
        self.ensure_open()?;
        match self.reader.authenticate(sector, key, role).await {
            Ok(()) => {
                self.authenticated.insert(sector);
                self.state = SessionState::SectorAuthenticated;
                debug!(sector, ?role, "sector authenticated");
                Ok(())
            }
            Err(e) => {
                // Card dropped auth for this sector; forget it on our side too
                self.authenticated.remove(&sector);
                Err(e)
            }
        }
    }

    /// Read one block. The owning sector must be authenticated first.
    pub async fn read_block(&mut self, block: u16) -> NfcResult<Block> {
        self.ensure_open()?;
        self.ensure_authenticated(block)?;
        self.state = SessionState::Reading;
        let result = self.reader.read_block(block).await;
        self.state = SessionState::SectorAuthenticated;
        result
    }

    /// Write one block. Trailer blocks are refused: overwriting a trailer
    /// bricks the sector's keys.
    pub async fn write_block(&mut self, block: u16, data: Block) -> NfcResult<()> {
        self.ensure_open()?;
        self.ensure_authenticated(block)?;
        if layout::is_trailer_block(block) {
            return Err(NfcError::TrailerBlock(block));
        }
        self.state = SessionState::Writing;
        let result = self.reader.write_block(block, data).await;
        self.state = SessionState::SectorAuthenticated;
        result
    }

    /// Read the given blocks in ascending block-index order and concatenate
    /// their payloads.
    pub async fn read_blocks(&mut self, blocks: &[u16]) -> NfcResult<Vec<u8>> {
        let mut ordered: Vec<u16> = blocks.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut out = Vec::with_capacity(ordered.len() * BLOCK_SIZE);
        for block in ordered {
            out.extend_from_slice(&self.read_block(block).await?);
        }
        Ok(out)
    }

    /// Write a payload across consecutive data blocks starting at
    /// `first_block`. The final partial block is zero-padded. Fails without
    /// writing anything if the span would cross a sector trailer.
    pub async fn write_payload(&mut self, first_block: u16, payload: &[u8]) -> NfcResult<()> {
        let block_count = payload.len().div_ceil(BLOCK_SIZE) as u16;
        for offset in 0..block_count {
            if layout::is_trailer_block(first_block + offset) {
                return Err(NfcError::TrailerBlock(first_block + offset));
            }
        }

        for (offset, chunk) in payload.chunks(BLOCK_SIZE).enumerate() {
            let mut block = [0u8; BLOCK_SIZE];
            block[..chunk.len()].copy_from_slice(chunk);
            self.write_block(first_block + offset as u16, block).await?;
        }
        Ok(())
    }

    /// Close the session and release the reader. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.state = SessionState::Idle;
        self.authenticated.clear();
        self.reader.release().await;
        self.in_use.store(false, Ordering::Release);
        debug!("tag session closed");
    }

    fn ensure_open(&self) -> NfcResult<()> {
        if self.closed {
            return Err(NfcError::SessionClosed);
        }
        Ok(())
    }

    fn ensure_authenticated(&self, block: u16) -> NfcResult<()> {
        let sector = layout::block_to_sector(block);
        if !self.authenticated.contains(&sector) {
            return Err(NfcError::SectorNotAuthenticated { sector });
        }
        Ok(())
    }
}

impl std::fmt::Debug for TagSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagSession")
            .field("tag", &self.tag)
            .field("state", &self.state)
            .field("authenticated", &self.authenticated)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for TagSession {
    fn drop(&mut self) {
        if !self.closed {
            // Last-resort unlock so a leaked session cannot wedge the
            // transport; the reader itself still needs an async release.
            warn!("tag session dropped without close()");
            self.in_use.store(false, Ordering::Release);
        }
    }
}
