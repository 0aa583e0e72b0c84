//! BLE transport error types.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BleError {
    #[error("A connection attempt is already in progress")]
    ConnectionInProgress,

    #[error("Device is unreachable")]
    DeviceUnreachable,

    #[error("OTP challenge was already consumed")]
    OtpAlreadyConsumed,

    #[error("Bluetooth radio is disabled or unavailable")]
    BluetoothDisabled,
}

/// Result type alias for BLE operations.
pub type BleResult<T> = Result<T, BleError>;
