//! NFC tag transport for the seedlink pairing core.
//!
//! Manages one bounded Mifare Classic tag session at a time: reader
//! acquisition, sector authentication, block I/O, and guaranteed release on
//! every exit path. The hardware driver sits behind the [`TagReader`] trait;
//! tests use [`MockTagReader`].

pub mod error;
pub mod layout;
pub mod reader;
pub mod session;

pub use error::{NfcError, NfcResult};
pub use layout::{block_to_sector, is_trailer_block, sector_block_count, sector_to_block};
pub use reader::{KeyRole, MockTagReader, SectorKey, TagInfo, TagReader, TagTech};
pub use session::{NfcTransport, SessionState, TagSession};

/// Payload size of one Mifare Classic block.
pub const BLOCK_SIZE: usize = 16;

/// Length of a sector authentication key.
pub const KEY_SIZE: usize = 6;

/// A single 16-byte block payload.
pub type Block = [u8; BLOCK_SIZE];
