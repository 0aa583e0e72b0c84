//! NFC transport error types.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NfcError {
    #[error("Tag reader is busy with another session")]
    TransportBusy,

    #[error("Detected tag is not a supported Mifare Classic tag")]
    UnsupportedTag,

    #[error("No tag detected before timeout")]
    NoTagDetected,

    #[error("Card rejected the key for sector {sector}")]
    AuthenticationRejected { sector: u8 },

    #[error("Sector {sector} has not been authenticated")]
    SectorNotAuthenticated { sector: u8 },

    #[error("Block I/O timed out")]
    IoTimeout,

    #[error("Card rejected the block operation")]
    IoRejected,

    #[error("Block index {0} is out of range for this tag")]
    BlockOutOfRange(u16),

    #[error("Block {0} is a sector trailer and cannot hold data")]
    TrailerBlock(u16),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Codec error: {0}")]
    Codec(#[from] seedlink_codec::CodecError),
}

/// Result type alias for NFC transport operations.
pub type NfcResult<T> = Result<T, NfcError>;
