//! Controller error types, aggregating the transport and codec taxonomies.

use thiserror::Error;

use crate::keyring::KeyringError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A session is already active; tear it down before starting a new flow")]
    SessionAlreadyActive,

    #[error("No session is active")]
    NoActiveSession,

    #[error("Device rejected the OTP code")]
    OtpRejected,

    #[error("BLE transport error: {0}")]
    Ble(#[from] seedlink_ble::BleError),

    #[error("NFC transport error: {0}")]
    Nfc(#[from] seedlink_nfc::NfcError),

    #[error("Codec error: {0}")]
    Codec(#[from] seedlink_codec::CodecError),

    #[error("Keyring error: {0}")]
    Keyring(#[from] KeyringError),
}

/// Result type alias for controller operations.
pub type SessionResult<T> = Result<T, SessionError>;
